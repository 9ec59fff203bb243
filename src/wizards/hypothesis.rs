//! Guided hypothesis testing — test family, grouping variable, measurement
//! variable, run, export.

use async_trait::async_trait;

use crate::collab::dataset::ColumnType;
use crate::collab::stats::{AnalysisOutcome, TwoGroupMethod};
use crate::context::AnalysisRecord;
use crate::engine::menu::SelectionMode;
use crate::engine::router::{MatchedInput, PatternKind, Route, TurnContext, Wizard};
use crate::engine::state::EngineState;
use crate::engine::turn::{Step, TurnReply};
use crate::error::EngineError;
use crate::wizards::{self, labels, main_menu};

const TTEST_LABEL: &str = "Independent T-Test (2 Groups)";
const ANOVA_LABEL: &str = "One-Way ANOVA (3+ Groups)";
const MWU_LABEL: &str = "Mann-Whitney U (Non-Parametric)";

const KEY_PENDING: &str = "pending_test";
const KEY_GROUP: &str = "group_col";

/// Enter the hypothesis-test wizard at the family menu.
pub async fn entry(ctx: &mut TurnContext<'_>) -> Result<Step, EngineError> {
    ctx.session.context.reset_transient();
    Ok(Step::go(EngineState::TestSelect, family_menu()))
}

fn family_menu() -> TurnReply {
    TurnReply::text("🆚 **Hypothesis Testing**\n\nSelect a test to learn more and proceed:")
        .with_choices(vec![
            vec![TTEST_LABEL.into(), ANOVA_LABEL.into()],
            vec![MWU_LABEL.into()],
            vec![labels::BACK_TO_MENU.into()],
        ])
}

struct Guide {
    name: &'static str,
    description: &'static str,
    variables: &'static str,
    use_case: &'static str,
}

fn guide(test: &str) -> Guide {
    match test {
        "anova" => Guide {
            name: "One-Way ANOVA",
            description: "Compares the means of three or more independent groups.",
            variables: "1 Categorical (3+ groups) + 1 Numeric.",
            use_case: "Comparing crop yields between four fertilizer types.",
        },
        "mwu" => Guide {
            name: "Mann-Whitney U",
            description: "A non-parametric comparison of two groups when the data \
                 is not normally distributed.",
            variables: "1 Categorical (2 groups) + 1 Ordinal/Numeric.",
            use_case: "Comparing non-normal satisfaction scores between two groups.",
        },
        _ => Guide {
            name: "Independent T-Test",
            description: "Compares the means of two independent groups to determine \
                 if they are significantly different.",
            variables: "1 Categorical (2 groups) + 1 Numeric.",
            use_case: "Comparing test scores between two classes.",
        },
    }
}

pub struct HypothesisWizard;

#[async_trait]
impl Wizard for HypothesisWizard {
    fn name(&self) -> &'static str {
        "hypothesis"
    }

    fn routes(&self) -> Vec<Route> {
        use EngineState::*;
        use PatternKind::*;
        vec![
            Route::new(TestSelect, Exact(TTEST_LABEL)),
            Route::new(TestSelect, Exact(ANOVA_LABEL)),
            Route::new(TestSelect, Exact(MWU_LABEL)),
            Route::new(TestGuide, Exact(labels::PROCEED)),
            Route::new(TestGuide, Exact(labels::CANCEL_ANALYSIS)),
            Route::new(GroupVarSelect, Column),
            Route::new(MeasureVarSelect, Column),
            Route::new(ExportOffer, Exact(labels::EXPORT_CSV)),
            Route::new(ExportOffer, FreeText),
        ]
    }

    async fn handle(
        &self,
        state: EngineState,
        input: MatchedInput,
        ctx: &mut TurnContext<'_>,
    ) -> Result<Step, EngineError> {
        match (state, input) {
            (EngineState::TestSelect, MatchedInput::Exact(label)) => {
                let test = match label {
                    ANOVA_LABEL => "anova",
                    MWU_LABEL => "mwu",
                    _ => "ttest",
                };
                ctx.session.context.set(KEY_PENDING, test);
                let g = guide(test);
                Ok(Step::go(
                    EngineState::TestGuide,
                    TurnReply::text(format!(
                        "🧪 **{}**\n\n📝 {}\n\n📊 Variables required: {}\n\n💡 _{}_\n\n\
                         Proceed with this analysis?",
                        g.name, g.description, g.variables, g.use_case
                    ))
                    .with_choices(vec![vec![
                        labels::PROCEED.into(),
                        labels::CANCEL_ANALYSIS.into(),
                    ]]),
                ))
            }
            (EngineState::TestGuide, MatchedInput::Exact(labels::CANCEL_ANALYSIS)) => {
                main_menu::entry(ctx).await
            }
            (EngineState::TestGuide, MatchedInput::Exact(labels::PROCEED)) => {
                // Make sure a dataset is actually loadable before asking
                // for variables.
                ctx.dataset().await?;
                Ok(Step::go(EngineState::GroupVarSelect, self.group_prompt(ctx)))
            }
            (EngineState::GroupVarSelect, MatchedInput::Column(col)) => {
                self.select_group(col, ctx).await
            }
            (EngineState::MeasureVarSelect, MatchedInput::Column(col)) => {
                self.select_measure(col, ctx).await
            }
            (EngineState::ExportOffer, MatchedInput::Exact(labels::EXPORT_CSV)) => {
                let Some(record) = ctx.session.context.history.last().cloned() else {
                    return Ok(Step::go(
                        EngineState::PostAnalysis,
                        main_menu::post_analysis_reply("⚠️ Nothing to export.", 0),
                    ));
                };
                let path = wizards::export_record_csv(&record, ctx).await?;
                let analyses = ctx.session.context.history.len();
                Ok(Step::go(
                    EngineState::PostAnalysis,
                    main_menu::post_analysis_reply("📥 Result exported to CSV.", analyses)
                        .with_attachment(path),
                ))
            }
            (EngineState::ExportOffer, _) => {
                let analyses = ctx.session.context.history.len();
                Ok(Step::go(
                    EngineState::PostAnalysis,
                    main_menu::post_analysis_reply("", analyses),
                ))
            }
            (state, _) => self.reprompt(state, ctx).await,
        }
    }

    async fn reprompt(
        &self,
        state: EngineState,
        ctx: &mut TurnContext<'_>,
    ) -> Result<Step, EngineError> {
        let step = match state {
            EngineState::TestSelect => Step::stay(state, family_menu()),
            EngineState::TestGuide => Step::stay(
                state,
                TurnReply::text("Proceed with this analysis?").with_choices(vec![vec![
                    labels::PROCEED.into(),
                    labels::CANCEL_ANALYSIS.into(),
                ]]),
            ),
            EngineState::GroupVarSelect => Step::stay(state, self.group_prompt(ctx)),
            EngineState::MeasureVarSelect => Step::stay(state, self.measure_prompt(ctx)),
            other => Step::stay(
                other,
                main_menu::post_analysis_reply("", ctx.session.context.history.len()),
            ),
        };
        Ok(step)
    }
}

impl HypothesisWizard {
    fn group_prompt(&self, ctx: &TurnContext<'_>) -> TurnReply {
        TurnReply::text("1️⃣ **Select the grouping variable** (categorical):").with_choices(
            main_menu::column_menu(ctx, SelectionMode::CategoricalOnly, &[], &[]),
        )
    }

    fn measure_prompt(&self, ctx: &TurnContext<'_>) -> TurnReply {
        TurnReply::text(
            "2️⃣ **Select the measurement variable** (numeric, e.g. a score or amount):",
        )
        .with_choices(main_menu::column_menu(ctx, SelectionMode::NumericOnly, &[], &[]))
    }

    async fn select_group(
        &self,
        col: String,
        ctx: &mut TurnContext<'_>,
    ) -> Result<Step, EngineError> {
        let dataset = ctx.dataset().await?;
        let groups = dataset.distinct_values(&col).map_err(EngineError::from)?;
        let test = ctx
            .session
            .context
            .get(KEY_PENDING)
            .unwrap_or("ttest")
            .to_string();

        let valid = if test == "anova" {
            groups.len() >= 3
        } else {
            groups.len() == 2
        };
        if !valid {
            // Validation failure: corrective text, same state, same menu.
            let mut preview = groups.iter().take(6).cloned().collect::<Vec<_>>().join(", ");
            if groups.len() > 6 {
                preview.push_str(", …");
            }
            let requirement = if test == "anova" {
                "ANOVA requires **3 or more groups**. Use a t-test for 2 groups."
            } else {
                "This test requires **exactly 2 groups**."
            };
            let mut reply = self.group_prompt(ctx);
            reply.text = format!(
                "⚠️ Variable '{col}' has {} distinct values: {preview}.\n{requirement}\n\
                 Please select a different grouping variable.",
                groups.len()
            );
            return Ok(Step::stay(EngineState::GroupVarSelect, reply));
        }

        ctx.session.context.set(KEY_GROUP, col);
        Ok(Step::go(EngineState::MeasureVarSelect, self.measure_prompt(ctx)))
    }

    async fn select_measure(
        &self,
        col: String,
        ctx: &mut TurnContext<'_>,
    ) -> Result<Step, EngineError> {
        let dataset = ctx.dataset().await?;
        if dataset.schema.column(&col).map(|c| c.ty) != Some(ColumnType::Numeric) {
            let mut reply = self.measure_prompt(ctx);
            reply.text = format!("⚠️ '{col}' is not numeric. Please pick a numeric variable.");
            return Ok(Step::stay(EngineState::MeasureVarSelect, reply));
        }

        let group_col = ctx
            .session
            .context
            .get(KEY_GROUP)
            .ok_or(EngineError::NoDataset)?
            .to_string();
        let test = ctx
            .session
            .context
            .get(KEY_PENDING)
            .unwrap_or("ttest")
            .to_string();

        let outcome = match test.as_str() {
            "anova" => ctx.deps.stats.anova(&dataset, &group_col, &col),
            "mwu" => ctx
                .deps
                .stats
                .two_group(&dataset, &group_col, &col, TwoGroupMethod::MannWhitney),
            _ => ctx
                .deps
                .stats
                .two_group(&dataset, &group_col, &col, TwoGroupMethod::Welch),
        };
        let outcome = match outcome {
            Ok(outcome) => outcome,
            Err(e) => {
                let mut reply = self.measure_prompt(ctx);
                reply.text = format!("❌ Analysis failed: {e}\nPlease pick another variable.");
                return Ok(Step::stay(EngineState::MeasureVarSelect, reply));
            }
        };

        let (test_name, result_lines) = match &outcome {
            AnalysisOutcome::TwoGroup {
                groups, t, p, cohen_d, ..
            } => (
                "Independent T-Test",
                format!(
                    "Groups: {}\n**t** = {t:.3}, **p** = {p:.4}, **Cohen's d** = {cohen_d:.3}\n{}",
                    groups.join(" vs "),
                    verdict(*p)
                ),
            ),
            AnalysisOutcome::RankSum { groups, u, p } => (
                "Mann-Whitney U",
                format!(
                    "Groups: {}\n**U** = {u:.1}, **p** = {p:.4}\n{}",
                    groups.join(" vs "),
                    verdict(*p)
                ),
            ),
            AnalysisOutcome::Anova {
                f,
                p,
                df_between,
                df_within,
                ..
            } => (
                "One-Way ANOVA",
                format!(
                    "**F**({df_between}, {df_within}) = {f:.3}, **p** = {p:.4}\n{}",
                    verdict(*p)
                ),
            ),
            _ => ("Hypothesis Test", String::new()),
        };

        let interpretation = ctx.deps.interpreter.interpret(&outcome).await;
        let summary = format!(
            "✅ **{test_name} Results**\n\n{col} by {group_col}\n{result_lines}\n\n📝 {interpretation}"
        );

        ctx.session.context.push_history(AnalysisRecord {
            test_name: test_name.into(),
            variables: format!("{col} by {group_col}"),
            summary: summary.clone(),
            outcome,
        });

        Ok(Step::go(
            EngineState::ExportOffer,
            TurnReply::text(format!("{summary}\n\n📥 Export this result?")).with_choices(vec![
                vec![labels::EXPORT_CSV.into()],
                vec![labels::BACK_TO_MENU.into()],
            ]),
        ))
    }
}

fn verdict(p: f64) -> &'static str {
    if p < 0.05 {
        "🌟 SIGNIFICANT difference!"
    } else {
        "Outcome: no significant difference."
    }
}
