//! Guided crosstab — accumulate row variables, accumulate column
//! variables, toggle display options, generate on demand.

use async_trait::async_trait;

use crate::collab::charts::ChartSpec;
use crate::collab::stats::AnalysisOutcome;
use crate::context::{AnalysisRecord, VisualRecord};
use crate::engine::menu::SelectionMode;
use crate::engine::router::{MatchedInput, PatternKind, Route, TurnContext, Wizard};
use crate::engine::state::EngineState;
use crate::engine::turn::{Step, TurnReply};
use crate::error::EngineError;
use crate::wizards::{labels, main_menu};

const ACC_ROWS: &str = "crosstab_rows";
const ACC_COLS: &str = "crosstab_cols";
const OPT_ROW_PCT: &str = "opt_row_pct";
const OPT_COL_PCT: &str = "opt_col_pct";
const OPT_TOTAL_PCT: &str = "opt_total_pct";

const TOGGLE_ROW: &str = "Toggle Row %";
const TOGGLE_COL: &str = "Toggle Column %";
const TOGGLE_TOTAL: &str = "Toggle Total %";
const GENERATE: &str = "Generate Table";

/// Enter at row-variable selection.
pub async fn entry(ctx: &mut TurnContext<'_>) -> Result<Step, EngineError> {
    ctx.session.context.reset_transient();
    ctx.dataset().await?;
    Ok(Step::go(
        EngineState::CrosstabRows,
        accumulate_prompt(ctx, ACC_ROWS, "ROW"),
    ))
}

fn accumulate_prompt(ctx: &TurnContext<'_>, key: &str, dimension: &str) -> TurnReply {
    let selected = ctx.session.context.accumulator(key).to_vec();
    let status = if selected.is_empty() {
        String::new()
    } else {
        format!("\n✅ Selected: {}", selected.join(", "))
    };
    TurnReply::text(format!(
        "📋 Select **{dimension}** variable(s):{status}\n_Tap 'Done Selecting' when finished._"
    ))
    .with_choices(main_menu::column_menu(
        ctx,
        SelectionMode::All,
        &selected,
        &[labels::DONE_SELECTING],
    ))
}

fn options_prompt(ctx: &TurnContext<'_>) -> TurnReply {
    let rows = ctx.session.context.accumulator(ACC_ROWS).join(", ");
    let cols = ctx.session.context.accumulator(ACC_COLS).join(", ");
    let mark = |on: bool| if on { "x" } else { " " };
    TurnReply::text(format!(
        "Rows: {rows} × Cols: {cols}\n\n**Display options** (tap to toggle):\n\
         [x] Counts (always included)\n\
         [{}] Row %\n[{}] Column %\n[{}] Total %\n\n\
         Tap options to toggle, then 'Generate Table':",
        mark(ctx.session.context.flag(OPT_ROW_PCT)),
        mark(ctx.session.context.flag(OPT_COL_PCT)),
        mark(ctx.session.context.flag(OPT_TOTAL_PCT)),
    ))
    .with_choices(vec![
        vec![TOGGLE_ROW.into(), TOGGLE_COL.into()],
        vec![TOGGLE_TOTAL.into()],
        vec![GENERATE.into(), labels::BACK_TO_MENU.into()],
    ])
}

pub struct CrosstabWizard;

#[async_trait]
impl Wizard for CrosstabWizard {
    fn name(&self) -> &'static str {
        "crosstab"
    }

    fn routes(&self) -> Vec<Route> {
        use EngineState::*;
        use PatternKind::*;
        vec![
            Route::new(CrosstabRows, Exact(labels::DONE_SELECTING)),
            Route::new(CrosstabRows, Column),
            Route::new(CrosstabCols, Exact(labels::DONE_SELECTING)),
            Route::new(CrosstabCols, Column),
            Route::new(CrosstabOptions, Exact(TOGGLE_ROW)),
            Route::new(CrosstabOptions, Exact(TOGGLE_COL)),
            Route::new(CrosstabOptions, Exact(TOGGLE_TOTAL)),
            Route::new(CrosstabOptions, Exact(GENERATE)),
        ]
    }

    async fn handle(
        &self,
        state: EngineState,
        input: MatchedInput,
        ctx: &mut TurnContext<'_>,
    ) -> Result<Step, EngineError> {
        match (state, input) {
            (EngineState::CrosstabRows, MatchedInput::Column(col)) => {
                ctx.session.context.select(ACC_ROWS, col);
                Ok(Step::stay(state, accumulate_prompt(ctx, ACC_ROWS, "ROW")))
            }
            (EngineState::CrosstabRows, MatchedInput::Exact(labels::DONE_SELECTING)) => {
                if ctx.session.context.accumulator(ACC_ROWS).is_empty() {
                    let mut reply = accumulate_prompt(ctx, ACC_ROWS, "ROW");
                    reply.text = format!("⚠️ Please select at least one row variable.\n{}", reply.text);
                    return Ok(Step::stay(state, reply));
                }
                Ok(Step::go(
                    EngineState::CrosstabCols,
                    accumulate_prompt(ctx, ACC_COLS, "COLUMN"),
                ))
            }
            (EngineState::CrosstabCols, MatchedInput::Column(col)) => {
                ctx.session.context.select(ACC_COLS, col);
                Ok(Step::stay(state, accumulate_prompt(ctx, ACC_COLS, "COLUMN")))
            }
            (EngineState::CrosstabCols, MatchedInput::Exact(labels::DONE_SELECTING)) => {
                if ctx.session.context.accumulator(ACC_COLS).is_empty() {
                    let mut reply = accumulate_prompt(ctx, ACC_COLS, "COLUMN");
                    reply.text =
                        format!("⚠️ Please select at least one column variable.\n{}", reply.text);
                    return Ok(Step::stay(state, reply));
                }
                Ok(Step::go(EngineState::CrosstabOptions, options_prompt(ctx)))
            }
            (EngineState::CrosstabOptions, MatchedInput::Exact(label)) => match label {
                TOGGLE_ROW => {
                    ctx.session.context.toggle_flag(OPT_ROW_PCT);
                    Ok(Step::stay(state, options_prompt(ctx)))
                }
                TOGGLE_COL => {
                    ctx.session.context.toggle_flag(OPT_COL_PCT);
                    Ok(Step::stay(state, options_prompt(ctx)))
                }
                TOGGLE_TOTAL => {
                    ctx.session.context.toggle_flag(OPT_TOTAL_PCT);
                    Ok(Step::stay(state, options_prompt(ctx)))
                }
                GENERATE => self.generate(ctx).await,
                _ => self.reprompt(state, ctx).await,
            },
            (state, _) => self.reprompt(state, ctx).await,
        }
    }

    async fn reprompt(
        &self,
        state: EngineState,
        ctx: &mut TurnContext<'_>,
    ) -> Result<Step, EngineError> {
        let reply = match state {
            EngineState::CrosstabRows => accumulate_prompt(ctx, ACC_ROWS, "ROW"),
            EngineState::CrosstabCols => accumulate_prompt(ctx, ACC_COLS, "COLUMN"),
            _ => options_prompt(ctx),
        };
        Ok(Step::stay(state, reply))
    }
}

impl CrosstabWizard {
    /// Consume both accumulators and produce one table per row×col pair.
    async fn generate(&self, ctx: &mut TurnContext<'_>) -> Result<Step, EngineError> {
        let rows = ctx.session.context.take_accumulator(ACC_ROWS);
        let cols = ctx.session.context.take_accumulator(ACC_COLS);
        let show_row = ctx.session.context.flag(OPT_ROW_PCT);
        let show_col = ctx.session.context.flag(OPT_COL_PCT);
        let show_total = ctx.session.context.flag(OPT_TOTAL_PCT);

        let dataset = ctx.dataset().await?;
        let mut summaries = Vec::new();
        let mut first_chart = None;

        for row_var in &rows {
            for col_var in &cols {
                let outcome = match ctx.deps.stats.crosstab(&dataset, row_var, col_var) {
                    Ok(outcome) => outcome,
                    Err(e) => {
                        summaries.push(format!("❌ {row_var} × {col_var}: {e}"));
                        continue;
                    }
                };
                let summary =
                    format_crosstab(&outcome, show_row, show_col, show_total);
                summaries.push(summary.clone());

                if first_chart.is_none() {
                    match ctx
                        .deps
                        .charts
                        .render(
                            &dataset,
                            &ChartSpec::Heatmap {
                                row: row_var.clone(),
                                col: col_var.clone(),
                            },
                            None,
                            &ctx.deps.config.data_dir.join("charts"),
                        )
                        .await
                    {
                        Ok(chart) => {
                            ctx.session.context.push_visual(VisualRecord {
                                file: chart.path.display().to_string(),
                                title: chart.title.clone(),
                                kind: chart.kind.clone(),
                                data: serde_json::json!({"row": row_var, "col": col_var}),
                            });
                            first_chart = Some(chart.path);
                        }
                        Err(e) => tracing::warn!("Heatmap rendering failed: {e}"),
                    }
                }

                ctx.session.context.push_history(AnalysisRecord {
                    test_name: "Crosstab (Chi-Square)".into(),
                    variables: format!("{row_var} × {col_var}"),
                    summary,
                    outcome,
                });
            }
        }

        let analyses = ctx.session.context.history.len();
        let mut reply = main_menu::post_analysis_reply(&summaries.join("\n\n"), analyses);
        if let Some(path) = first_chart {
            reply = reply.with_attachment(path);
        }
        Ok(Step::go(EngineState::PostAnalysis, reply))
    }
}

fn format_crosstab(outcome: &AnalysisOutcome, row_pct: bool, col_pct: bool, total_pct: bool) -> String {
    let AnalysisOutcome::CrossTab {
        row_var,
        col_var,
        row_labels,
        col_labels,
        counts,
        chi2,
        p,
    } = outcome
    else {
        return String::new();
    };
    let grand: u64 = counts.iter().flatten().sum();
    let col_totals: Vec<u64> = (0..col_labels.len())
        .map(|ci| counts.iter().map(|r| r[ci]).sum())
        .collect();

    let mut out = format!("📋 **{row_var} × {col_var}**\n");
    out.push_str(&format!("         {}\n", col_labels.join("  ")));
    for (label, row) in row_labels.iter().zip(counts.iter()) {
        let row_total: u64 = row.iter().sum();
        let mut cells = Vec::new();
        for (ci, &count) in row.iter().enumerate() {
            let mut cell = count.to_string();
            if row_pct && row_total > 0 {
                cell.push_str(&format!(" ({:.0}%r)", 100.0 * count as f64 / row_total as f64));
            }
            if col_pct && col_totals[ci] > 0 {
                cell.push_str(&format!(" ({:.0}%c)", 100.0 * count as f64 / col_totals[ci] as f64));
            }
            if total_pct && grand > 0 {
                cell.push_str(&format!(" ({:.0}%t)", 100.0 * count as f64 / grand as f64));
            }
            cells.push(cell);
        }
        out.push_str(&format!("{label}: {}\n", cells.join("  ")));
    }
    out.push_str(&format!("\nχ² = {chi2:.3}, p = {p:.4}"));
    out
}
