//! Guided regression — pick the outcome, accumulate predictors, run on
//! "Done Selecting".

use async_trait::async_trait;

use crate::collab::stats::AnalysisOutcome;
use crate::context::AnalysisRecord;
use crate::engine::menu::SelectionMode;
use crate::engine::router::{MatchedInput, PatternKind, Route, TurnContext, Wizard};
use crate::engine::state::EngineState;
use crate::engine::turn::{Step, TurnReply};
use crate::error::EngineError;
use crate::wizards::{labels, main_menu};

const KEY_OUTCOME: &str = "regression_outcome";
const ACC_PREDICTORS: &str = "regression_predictors";

/// Enter at outcome selection.
pub async fn entry(ctx: &mut TurnContext<'_>) -> Result<Step, EngineError> {
    ctx.session.context.reset_transient();
    ctx.dataset().await?;
    Ok(Step::go(EngineState::OutcomeSelect, outcome_prompt(ctx)))
}

fn outcome_prompt(ctx: &TurnContext<'_>) -> TurnReply {
    TurnReply::text(
        "🔗 **Regression Analysis**\n\nSelect the **outcome (dependent)** variable — \
         what you want to predict:",
    )
    .with_choices(main_menu::column_menu(
        ctx,
        SelectionMode::NumericOnly,
        &[],
        &[],
    ))
}

fn predictor_prompt(ctx: &TurnContext<'_>, note: &str) -> TurnReply {
    let selected = ctx.session.context.accumulator(ACC_PREDICTORS).to_vec();
    let status = if selected.is_empty() {
        "Tap each predictor, then 'Done Selecting'.".to_string()
    } else {
        format!("Selected: {}\nSelect more or tap 'Done Selecting'.", selected.join(", "))
    };
    let text = if note.is_empty() {
        format!("Select **predictor variable(s)**:\n{status}")
    } else {
        format!("{note}\n\nSelect **predictor variable(s)**:\n{status}")
    };
    TurnReply::text(text).with_choices(main_menu::column_menu(
        ctx,
        SelectionMode::NumericOnly,
        &selected,
        &[labels::DONE_SELECTING],
    ))
}

pub struct RegressionWizard;

#[async_trait]
impl Wizard for RegressionWizard {
    fn name(&self) -> &'static str {
        "regression"
    }

    fn routes(&self) -> Vec<Route> {
        use EngineState::*;
        use PatternKind::*;
        vec![
            Route::new(OutcomeSelect, Column),
            Route::new(PredictorSelect, Exact(labels::DONE_SELECTING)),
            Route::new(PredictorSelect, Column),
        ]
    }

    async fn handle(
        &self,
        state: EngineState,
        input: MatchedInput,
        ctx: &mut TurnContext<'_>,
    ) -> Result<Step, EngineError> {
        match (state, input) {
            (EngineState::OutcomeSelect, MatchedInput::Column(col)) => {
                ctx.session.context.set(KEY_OUTCOME, col.clone());
                ctx.session.context.clear_accumulator(ACC_PREDICTORS);
                Ok(Step::go(
                    EngineState::PredictorSelect,
                    predictor_prompt(ctx, &format!("✅ Outcome: {col}")),
                ))
            }
            (EngineState::PredictorSelect, MatchedInput::Exact(labels::DONE_SELECTING)) => {
                self.run(ctx).await
            }
            (EngineState::PredictorSelect, MatchedInput::Column(col)) => {
                let outcome = ctx.session.context.get(KEY_OUTCOME).unwrap_or_default();
                if col == outcome {
                    return Ok(Step::stay(
                        EngineState::PredictorSelect,
                        predictor_prompt(ctx, "⚠️ That is the outcome variable."),
                    ));
                }
                // Dedup: re-selecting an item leaves the accumulator as-is.
                ctx.session.context.select(ACC_PREDICTORS, col);
                Ok(Step::stay(EngineState::PredictorSelect, predictor_prompt(ctx, "")))
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
            EngineState::OutcomeSelect => Step::stay(state, outcome_prompt(ctx)),
            _ => Step::stay(state, predictor_prompt(ctx, "")),
        };
        Ok(step)
    }
}

impl RegressionWizard {
    async fn run(&self, ctx: &mut TurnContext<'_>) -> Result<Step, EngineError> {
        let predictors = ctx.session.context.accumulator(ACC_PREDICTORS).to_vec();
        if predictors.is_empty() {
            // Empty accumulator is rejected in place.
            return Ok(Step::stay(
                EngineState::PredictorSelect,
                predictor_prompt(ctx, "⚠️ Please select at least one predictor first."),
            ));
        }
        let outcome_var = ctx
            .session
            .context
            .get(KEY_OUTCOME)
            .ok_or(EngineError::NoDataset)?
            .to_string();

        let dataset = ctx.dataset().await?;
        let result = match ctx.deps.stats.regression(&dataset, &outcome_var, &predictors) {
            Ok(result) => result,
            Err(e) => {
                return Ok(Step::stay(
                    EngineState::PredictorSelect,
                    predictor_prompt(ctx, &format!("❌ Regression failed: {e}")),
                ));
            }
        };
        ctx.session.context.take_accumulator(ACC_PREDICTORS);

        let mut lines = String::new();
        if let AnalysisOutcome::Regression {
            r_squared,
            f_p,
            n,
            coefficients,
            ..
        } = &result
        {
            lines.push_str(&format!(
                "**R²** = {r_squared:.4}, model p = {f_p:.4}, N = {n}\n\n"
            ));
            lines.push_str("Coefficients:\n");
            for c in coefficients {
                let star = if c.p < 0.05 { " *" } else { "" };
                lines.push_str(&format!("• {}: {:.4} (p = {:.4}){star}\n", c.name, c.estimate, c.p));
            }
            lines.push_str("\n\\* p < 0.05");
        }

        let interpretation = ctx.deps.interpreter.interpret(&result).await;
        let kind = if predictors.len() > 1 {
            format!("Multiple Regression ({} predictors)", predictors.len())
        } else {
            "Simple Linear Regression".to_string()
        };
        let summary = format!(
            "📈 **Regression Results**\n\nOutcome: {outcome_var}\nPredictors: {}\n\n{lines}\n\n📝 {interpretation}",
            predictors.join(", ")
        );

        ctx.session.context.push_history(AnalysisRecord {
            test_name: kind,
            variables: format!("{outcome_var} ~ {}", predictors.join(" + ")),
            summary: summary.clone(),
            outcome: result,
        });

        let analyses = ctx.session.context.history.len();
        Ok(Step::go(
            EngineState::PostAnalysis,
            main_menu::post_analysis_reply(&summary, analyses),
        ))
    }
}
