//! Chart builder — pick a chart kind, pick column(s), render, and
//! optionally retitle via a sticky-flag sub-dialog.

use async_trait::async_trait;

use crate::collab::charts::ChartSpec;
use crate::context::VisualRecord;
use crate::engine::menu::SelectionMode;
use crate::engine::router::{MatchedInput, PatternKind, Route, TurnContext, Wizard};
use crate::engine::state::EngineState;
use crate::engine::turn::{Step, TurnReply};
use crate::error::EngineError;
use crate::wizards::{labels, main_menu};

const KIND_BAR: &str = "📊 Bar Chart";
const KIND_HISTOGRAM: &str = "📈 Histogram";
const KIND_SCATTER: &str = "🔵 Scatter Plot";
const KIND_HEATMAP: &str = "🔥 Heatmap";
const SET_TITLE: &str = "✏️ Set Custom Title";
const ANOTHER: &str = "📊 Another Chart";

const KEY_KIND: &str = "chart_kind";
const KEY_FIRST_COLUMN: &str = "chart_x";
const KEY_LAST_SPEC: &str = "last_chart_spec";

/// Sticky flag that borrows the next turn for free-text title entry.
pub const AWAITING_TITLE: &str = "awaiting_chart_title";

/// Enter at kind selection.
pub async fn entry(ctx: &mut TurnContext<'_>) -> Result<Step, EngineError> {
    ctx.session.context.reset_transient();
    ctx.dataset().await?;
    Ok(Step::go(EngineState::ChartKind, kind_menu("")))
}

fn kind_menu(prefix: &str) -> TurnReply {
    let text = if prefix.is_empty() {
        "📊 **Create Visuals**\n\nSelect a chart type:".to_string()
    } else {
        format!("{prefix}\n\nSelect a chart type:")
    };
    TurnReply::text(text).with_choices(vec![
        vec![KIND_BAR.into(), KIND_HISTOGRAM.into()],
        vec![KIND_SCATTER.into(), KIND_HEATMAP.into()],
        vec![labels::BACK_TO_MENU.into()],
    ])
}

fn after_render_menu() -> Vec<Vec<String>> {
    vec![
        vec![SET_TITLE.into(), ANOTHER.into()],
        vec![labels::BACK_TO_MENU.into()],
    ]
}

fn frequency_summary(outcome: &crate::collab::stats::AnalysisOutcome) -> String {
    let crate::collab::stats::AnalysisOutcome::Frequencies { column, entries } = outcome else {
        return String::new();
    };
    let mut out = format!("📊 **Frequencies: {column}**\n");
    for entry in entries.iter().take(10) {
        out.push_str(&format!(
            "• {}: {} ({:.1}%)\n",
            entry.value, entry.count, entry.percent
        ));
    }
    if entries.len() > 10 {
        out.push_str(&format!("… and {} more categories\n", entries.len() - 10));
    }
    out
}

pub struct ChartsWizard;

#[async_trait]
impl Wizard for ChartsWizard {
    fn name(&self) -> &'static str {
        "charts"
    }

    fn routes(&self) -> Vec<Route> {
        use EngineState::*;
        use PatternKind::*;
        vec![
            Route::new(ChartKind, Exact(KIND_BAR)),
            Route::new(ChartKind, Exact(KIND_HISTOGRAM)),
            Route::new(ChartKind, Exact(KIND_SCATTER)),
            Route::new(ChartKind, Exact(KIND_HEATMAP)),
            Route::new(ChartKind, Exact(SET_TITLE)),
            Route::new(ChartKind, Exact(ANOTHER)),
            Route::new(ChartColumn, Column),
        ]
    }

    fn sticky_flags(&self) -> &'static [&'static str] {
        &[AWAITING_TITLE]
    }

    async fn handle(
        &self,
        state: EngineState,
        input: MatchedInput,
        ctx: &mut TurnContext<'_>,
    ) -> Result<Step, EngineError> {
        match (state, input) {
            (EngineState::ChartKind, MatchedInput::Exact(ANOTHER)) => {
                ctx.session.context.remove(KEY_FIRST_COLUMN);
                Ok(Step::stay(EngineState::ChartKind, kind_menu("")))
            }
            (EngineState::ChartKind, MatchedInput::Exact(SET_TITLE)) => {
                if ctx.session.context.get(KEY_LAST_SPEC).is_none() {
                    return Ok(Step::stay(EngineState::ChartKind, kind_menu("⚠️ No chart yet.")));
                }
                // Borrow the next turn for the free-text title.
                ctx.session.context.set_sticky(AWAITING_TITLE);
                Ok(Step::stay(
                    EngineState::ChartKind,
                    TurnReply::text("✏️ Send the new chart title:"),
                ))
            }
            (EngineState::ChartKind, MatchedInput::Exact(kind)) => {
                ctx.session.context.set(KEY_KIND, kind);
                ctx.session.context.remove(KEY_FIRST_COLUMN);
                let (mode, what) = match kind {
                    KIND_HISTOGRAM => (SelectionMode::NumericOnly, "the numeric variable"),
                    KIND_SCATTER => (SelectionMode::NumericOnly, "the X-axis variable"),
                    KIND_HEATMAP => (SelectionMode::CategoricalOnly, "the row variable"),
                    _ => (SelectionMode::All, "the variable to count"),
                };
                Ok(Step::go(
                    EngineState::ChartColumn,
                    TurnReply::text(format!("Select {what}:")).with_choices(
                        main_menu::column_menu(ctx, mode, &[], &[]),
                    ),
                ))
            }
            (EngineState::ChartColumn, MatchedInput::Column(col)) => {
                self.select_column(col, ctx).await
            }
            (state, _) => self.reprompt(state, ctx).await,
        }
    }

    async fn on_sticky(
        &self,
        _flag: &str,
        input: &str,
        ctx: &mut TurnContext<'_>,
    ) -> Result<Step, EngineError> {
        let Some(spec_json) = ctx.session.context.get(KEY_LAST_SPEC) else {
            return Ok(Step::stay(EngineState::ChartKind, kind_menu("⚠️ No chart to retitle.")));
        };
        let Ok(spec) = serde_json::from_str::<ChartSpec>(spec_json) else {
            return Ok(Step::stay(
                EngineState::ChartKind,
                kind_menu("⚠️ No chart to retitle."),
            ));
        };
        let title = input.trim();
        if title.is_empty() {
            ctx.session.context.set_sticky(AWAITING_TITLE);
            return Ok(Step::stay(
                EngineState::ChartKind,
                TurnReply::text("Please send a non-empty title:"),
            ));
        }
        self.render(spec, Some(title.to_string()), ctx, true).await
    }

    async fn reprompt(
        &self,
        state: EngineState,
        ctx: &mut TurnContext<'_>,
    ) -> Result<Step, EngineError> {
        let step = match state {
            EngineState::ChartColumn => {
                let selected = ctx
                    .session
                    .context
                    .get(KEY_FIRST_COLUMN)
                    .map(|c| vec![c.to_string()])
                    .unwrap_or_default();
                Step::stay(
                    state,
                    TurnReply::text("Please select a variable from the menu:").with_choices(
                        main_menu::column_menu(ctx, SelectionMode::All, &selected, &[]),
                    ),
                )
            }
            _ => Step::stay(EngineState::ChartKind, kind_menu("")),
        };
        Ok(step)
    }
}

impl ChartsWizard {
    async fn select_column(
        &self,
        col: String,
        ctx: &mut TurnContext<'_>,
    ) -> Result<Step, EngineError> {
        let kind = ctx
            .session
            .context
            .get(KEY_KIND)
            .unwrap_or(KIND_BAR)
            .to_string();

        // Two-column kinds ask for the second axis before rendering.
        if kind == KIND_SCATTER || kind == KIND_HEATMAP {
            match ctx.session.context.get(KEY_FIRST_COLUMN) {
                None => {
                    ctx.session.context.set(KEY_FIRST_COLUMN, col);
                    let (mode, what) = if kind == KIND_SCATTER {
                        (SelectionMode::NumericOnly, "the Y-axis variable")
                    } else {
                        (SelectionMode::CategoricalOnly, "the column variable")
                    };
                    return Ok(Step::stay(
                        EngineState::ChartColumn,
                        TurnReply::text(format!("Now select {what}:")).with_choices(
                            main_menu::column_menu(ctx, mode, &[], &[]),
                        ),
                    ));
                }
                Some(first) => {
                    let first = first.to_string();
                    ctx.session.context.remove(KEY_FIRST_COLUMN);
                    let spec = if kind == KIND_SCATTER {
                        ChartSpec::Scatter { x: first, y: col }
                    } else {
                        ChartSpec::Heatmap { row: first, col }
                    };
                    return self.render(spec, None, ctx, false).await;
                }
            }
        }

        let spec = if kind == KIND_HISTOGRAM {
            ChartSpec::Histogram { column: col }
        } else {
            // Bar charts double as frequency tabulations: the counts go
            // into the analysis history alongside the visual.
            let dataset = ctx.dataset().await?;
            if let Ok(outcome) = ctx.deps.stats.frequencies(&dataset, &col) {
                let summary = frequency_summary(&outcome);
                ctx.session.context.push_history(crate::context::AnalysisRecord {
                    test_name: "Frequency Tabulation".into(),
                    variables: col.clone(),
                    summary,
                    outcome,
                });
            }
            ChartSpec::Bar { column: col }
        };
        self.render(spec, None, ctx, false).await
    }

    async fn render(
        &self,
        spec: ChartSpec,
        title: Option<String>,
        ctx: &mut TurnContext<'_>,
        replace_last: bool,
    ) -> Result<Step, EngineError> {
        let dataset = ctx.dataset().await?;
        let chart = match ctx
            .deps
            .charts
            .render(
                &dataset,
                &spec,
                title.as_deref(),
                &ctx.deps.config.data_dir.join("charts"),
            )
            .await
        {
            Ok(chart) => chart,
            Err(e) => {
                return Ok(Step::go(
                    EngineState::ChartKind,
                    kind_menu(&format!("❌ Could not render that chart: {e}")),
                ));
            }
        };

        let record = VisualRecord {
            file: chart.path.display().to_string(),
            title: chart.title.clone(),
            kind: chart.kind.clone(),
            data: serde_json::to_value(&spec).unwrap_or_default(),
        };
        if replace_last {
            ctx.session.context.visuals.pop();
        }
        ctx.session.context.push_visual(record);
        if let Ok(json) = serde_json::to_string(&spec) {
            ctx.session.context.set(KEY_LAST_SPEC, json);
        }

        let visuals = ctx.session.context.visuals.len();
        Ok(Step::go(
            EngineState::ChartKind,
            TurnReply::text(format!(
                "✅ **{}** rendered ({} visual{} this session).",
                chart.title,
                visuals,
                if visuals == 1 { "" } else { "s" }
            ))
            .with_choices(after_render_menu())
            .with_attachment(chart.path),
        ))
    }
}
