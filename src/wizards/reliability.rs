//! Reliability analysis — accumulate scale items, run Cronbach's alpha.

use async_trait::async_trait;

use crate::collab::stats::AnalysisOutcome;
use crate::context::AnalysisRecord;
use crate::engine::menu::SelectionMode;
use crate::engine::router::{MatchedInput, PatternKind, Route, TurnContext, Wizard};
use crate::engine::state::EngineState;
use crate::engine::turn::{Step, TurnReply};
use crate::error::EngineError;
use crate::wizards::{labels, main_menu};

const ACC_ITEMS: &str = "rel_items";

/// Enter at item selection.
pub async fn entry(ctx: &mut TurnContext<'_>) -> Result<Step, EngineError> {
    ctx.session.context.reset_transient();
    ctx.dataset().await?;
    Ok(Step::go(EngineState::ReliabilityItems, items_prompt(ctx, "")))
}

fn items_prompt(ctx: &TurnContext<'_>, note: &str) -> TurnReply {
    let selected = ctx.session.context.accumulator(ACC_ITEMS).to_vec();
    let status = if selected.is_empty() {
        "Click items one by one, then 'Done Selecting'.".to_string()
    } else {
        format!("✅ Items so far: {}", selected.join(", "))
    };
    let header = "🛡️ **Reliability Analysis (Cronbach's Alpha)**\n\nSelect the scale items \
         (numeric variables) to include.";
    let text = if note.is_empty() {
        format!("{header}\n{status}")
    } else {
        format!("{note}\n\n{header}\n{status}")
    };
    TurnReply::text(text).with_choices(main_menu::column_menu(
        ctx,
        SelectionMode::NumericOnly,
        &selected,
        &[labels::DONE_SELECTING],
    ))
}

pub struct ReliabilityWizard;

#[async_trait]
impl Wizard for ReliabilityWizard {
    fn name(&self) -> &'static str {
        "reliability"
    }

    fn routes(&self) -> Vec<Route> {
        use EngineState::*;
        use PatternKind::*;
        vec![
            Route::new(ReliabilityItems, Exact(labels::DONE_SELECTING)),
            Route::new(ReliabilityItems, Column),
        ]
    }

    async fn handle(
        &self,
        state: EngineState,
        input: MatchedInput,
        ctx: &mut TurnContext<'_>,
    ) -> Result<Step, EngineError> {
        match input {
            MatchedInput::Column(col) => {
                ctx.session.context.select(ACC_ITEMS, col);
                Ok(Step::stay(state, items_prompt(ctx, "")))
            }
            MatchedInput::Exact(labels::DONE_SELECTING) => self.run(ctx).await,
            _ => self.reprompt(state, ctx).await,
        }
    }

    async fn reprompt(
        &self,
        state: EngineState,
        ctx: &mut TurnContext<'_>,
    ) -> Result<Step, EngineError> {
        Ok(Step::stay(state, items_prompt(ctx, "")))
    }
}

impl ReliabilityWizard {
    async fn run(&self, ctx: &mut TurnContext<'_>) -> Result<Step, EngineError> {
        let items = ctx.session.context.accumulator(ACC_ITEMS).to_vec();
        if items.len() < 2 {
            // A scale needs at least two items; reject the done signal.
            return Ok(Step::stay(
                EngineState::ReliabilityItems,
                items_prompt(ctx, "⚠️ Reliability analysis needs at least **2 items**."),
            ));
        }

        let dataset = ctx.dataset().await?;
        let outcome = match ctx.deps.stats.reliability(&dataset, &items) {
            Ok(outcome) => outcome,
            Err(e) => {
                return Ok(Step::stay(
                    EngineState::ReliabilityItems,
                    items_prompt(ctx, &format!("❌ Analysis failed: {e}")),
                ));
            }
        };
        ctx.session.context.take_accumulator(ACC_ITEMS);

        let alpha_line = match &outcome {
            AnalysisOutcome::Reliability { alpha, n, .. } => {
                let grade = if *alpha >= 0.9 {
                    "excellent"
                } else if *alpha >= 0.8 {
                    "good"
                } else if *alpha >= 0.7 {
                    "acceptable"
                } else {
                    "questionable"
                };
                format!("**Cronbach's α** = {alpha:.3} ({grade}), N = {n}")
            }
            _ => String::new(),
        };
        let interpretation = ctx.deps.interpreter.interpret(&outcome).await;
        let summary = format!(
            "🛡️ **Reliability Analysis**\n\nItems: {}\n{alpha_line}\n\n📝 {interpretation}",
            items.join(", ")
        );

        ctx.session.context.push_history(AnalysisRecord {
            test_name: "Reliability (Cronbach's Alpha)".into(),
            variables: items.join(", "),
            summary: summary.clone(),
            outcome,
        });

        let analyses = ctx.session.context.history.len();
        Ok(Step::go(
            EngineState::PostAnalysis,
            main_menu::post_analysis_reply(&summary, analyses),
        ))
    }
}
