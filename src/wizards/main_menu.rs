//! Main menu hub — routes into every other wizard, handles dataset upload,
//! the one-shot descriptive summary, AI chat mode, and the post-analysis
//! hub.

use async_trait::async_trait;

use crate::collab::dataset::ColumnType;
use crate::context::{keys, AnalysisRecord};
use crate::engine::menu::SelectionMode;
use crate::engine::router::{MatchedInput, PatternKind, Route, TurnContext, Wizard};
use crate::engine::state::EngineState;
use crate::engine::turn::{Step, TurnReply};
use crate::error::EngineError;
use crate::wizards::{self, labels};

/// Enter the main menu, discarding transient selection state.
pub async fn entry(ctx: &mut TurnContext<'_>) -> Result<Step, EngineError> {
    ctx.session.context.reset_transient();
    Ok(Step::go(EngineState::MainMenu, menu_reply("")))
}

/// The main menu prompt, optionally prefixed with a status line.
pub fn menu_reply(prefix: &str) -> TurnReply {
    let text = if prefix.is_empty() {
        "**Main Menu** — select an action:".to_string()
    } else {
        format!("{prefix}\n\n**Main Menu** — select an action:")
    };
    TurnReply::text(text).with_choices(vec![
        vec![labels::ANALYSE_DATA.into(), labels::SAMPLE_SIZE.into()],
        vec![labels::DESCRIPTIVE.into(), labels::HYPOTHESIS.into()],
        vec![labels::REGRESSION.into(), labels::CROSSTAB.into()],
        vec![labels::RELIABILITY.into(), labels::VISUALS.into()],
        vec![labels::AI_CHAT.into(), labels::REPORT.into()],
        vec![labels::PROJECTS.into(), labels::SAVE_EXIT.into()],
        vec![labels::CANCEL.into()],
    ])
}

/// The post-analysis hub prompt.
pub fn post_analysis_reply(prefix: &str, analyses: usize) -> TurnReply {
    let counter = if analyses > 0 {
        format!("📊 Analyses saved this session: {analyses}\n\n")
    } else {
        String::new()
    };
    let text = if prefix.is_empty() {
        format!("{counter}**What would you like to do next?**")
    } else {
        format!("{prefix}\n\n{counter}**What would you like to do next?**")
    };
    TurnReply::text(text).with_choices(vec![
        vec![labels::RUN_ANOTHER.into(), labels::VISUALS.into()],
        vec![labels::REPORT.into(), labels::EXPORT_CSV.into()],
        vec![labels::SAVE_EXIT.into()],
        vec![labels::MAIN_MENU.into(), labels::FINISH.into()],
    ])
}

pub struct MainMenuWizard;

#[async_trait]
impl Wizard for MainMenuWizard {
    fn name(&self) -> &'static str {
        "main_menu"
    }

    fn routes(&self) -> Vec<Route> {
        use EngineState::*;
        use PatternKind::*;
        vec![
            Route::new(MainMenu, Exact(labels::ANALYSE_DATA)),
            Route::new(MainMenu, Exact(labels::SAMPLE_SIZE)),
            Route::new(MainMenu, Exact(labels::DESCRIPTIVE)),
            Route::new(MainMenu, Exact(labels::HYPOTHESIS)),
            Route::new(MainMenu, Exact(labels::REGRESSION)),
            Route::new(MainMenu, Exact(labels::CROSSTAB)),
            Route::new(MainMenu, Exact(labels::RELIABILITY)),
            Route::new(MainMenu, Exact(labels::VISUALS)),
            Route::new(MainMenu, Exact(labels::AI_CHAT)),
            Route::new(MainMenu, Exact(labels::REPORT)),
            Route::new(MainMenu, Exact(labels::PROJECTS)),
            Route::new(MainMenu, Exact(labels::SAVE_EXIT)),
            Route::new(MainMenu, Exact(labels::EXIT_CHAT)),
            Route::new(MainMenu, FreeText),
            Route::new(AwaitingUpload, Exact(labels::CANCEL_ANALYSIS)),
            Route::new(AwaitingUpload, FreeText),
            Route::new(PostAnalysis, Exact(labels::RUN_ANOTHER)),
            Route::new(PostAnalysis, Exact(labels::VISUALS)),
            Route::new(PostAnalysis, Exact(labels::REPORT)),
            Route::new(PostAnalysis, Exact(labels::EXPORT_CSV)),
            Route::new(PostAnalysis, Exact(labels::SAVE_EXIT)),
            Route::new(PostAnalysis, Exact(labels::FINISH)),
        ]
    }

    async fn handle(
        &self,
        state: EngineState,
        input: MatchedInput,
        ctx: &mut TurnContext<'_>,
    ) -> Result<Step, EngineError> {
        match state {
            EngineState::MainMenu => self.handle_menu(input, ctx).await,
            EngineState::AwaitingUpload => self.handle_upload(input, ctx).await,
            EngineState::PostAnalysis => self.handle_post(input, ctx).await,
            _ => Err(EngineError::UnroutableState(state.to_string())),
        }
    }

    async fn reprompt(
        &self,
        state: EngineState,
        ctx: &mut TurnContext<'_>,
    ) -> Result<Step, EngineError> {
        let step = match state {
            EngineState::AwaitingUpload => Step::stay(
                state,
                TurnReply::text("Please send the path of a CSV data file.")
                    .with_choice_column(&[labels::CANCEL_ANALYSIS]),
            ),
            EngineState::PostAnalysis => Step::stay(
                state,
                post_analysis_reply("", ctx.session.context.history.len()),
            ),
            _ => Step::stay(state, menu_reply("")),
        };
        Ok(step)
    }
}

impl MainMenuWizard {
    async fn handle_menu(
        &self,
        input: MatchedInput,
        ctx: &mut TurnContext<'_>,
    ) -> Result<Step, EngineError> {
        // AI chat mode captures free text until the user exits.
        if ctx.session.context.flag(keys::CHAT_MODE) {
            if let MatchedInput::FreeText(question) = &input {
                return self.handle_chat(question, ctx).await;
            }
        }

        let MatchedInput::Exact(label) = input else {
            return self.reprompt(EngineState::MainMenu, ctx).await;
        };
        match label {
            labels::ANALYSE_DATA => Ok(Step::go(
                EngineState::AwaitingUpload,
                TurnReply::text(
                    "📊 **Upload your data**\n\nSend the path of a CSV file to analyse \
                     (for example `data/survey.csv`).",
                )
                .with_choice_column(&[labels::CANCEL_ANALYSIS]),
            )),
            labels::SAMPLE_SIZE => wizards::sampling::entry(ctx).await,
            labels::DESCRIPTIVE => self.run_descriptives(ctx).await,
            labels::HYPOTHESIS => wizards::hypothesis::entry(ctx).await,
            labels::REGRESSION => wizards::regression::entry(ctx).await,
            labels::CROSSTAB => wizards::crosstab::entry(ctx).await,
            labels::RELIABILITY => wizards::reliability::entry(ctx).await,
            labels::VISUALS => wizards::charts::entry(ctx).await,
            labels::REPORT => wizards::manuscript::entry(ctx).await,
            labels::PROJECTS => wizards::projects::entry(ctx).await,
            labels::SAVE_EXIT => wizards::projects::save_entry(ctx).await,
            labels::AI_CHAT => {
                ctx.session.context.set_flag(keys::CHAT_MODE, true);
                Ok(Step::stay(
                    EngineState::MainMenu,
                    TurnReply::text(
                        "💬 **AI Analysis Chat**\n\nAsk me anything about your data — \
                         for example \"what is the mean score by gender?\".\n\n\
                         Type your question, or 'Exit Chat' to return.",
                    )
                    .with_choice_column(&[labels::EXIT_CHAT]),
                ))
            }
            labels::EXIT_CHAT => {
                ctx.session.context.set_flag(keys::CHAT_MODE, false);
                Ok(Step::stay(EngineState::MainMenu, menu_reply("Exited AI chat.")))
            }
            _ => self.reprompt(EngineState::MainMenu, ctx).await,
        }
    }

    async fn handle_chat(
        &self,
        question: &str,
        ctx: &mut TurnContext<'_>,
    ) -> Result<Step, EngineError> {
        if question.eq_ignore_ascii_case("exit") || question == labels::EXIT_CHAT {
            ctx.session.context.set_flag(keys::CHAT_MODE, false);
            return Ok(Step::stay(EngineState::MainMenu, menu_reply("Exited AI chat.")));
        }

        let summary = match ctx.cached_schema() {
            Some(schema) => {
                let mut text = format!("Columns: {}\n", schema.names().join(", "));
                let history = &ctx.session.context.history;
                if !history.is_empty() {
                    text.push_str("Analyses performed:\n");
                    for record in history.iter().rev().take(3) {
                        text.push_str(&format!(
                            "- {} ({}): {}\n",
                            record.test_name, record.variables, record.summary
                        ));
                    }
                }
                text
            }
            None => "No dataset loaded yet.".to_string(),
        };

        let answer = ctx.deps.interpreter.chat(question, &summary).await;
        Ok(Step::stay(
            EngineState::MainMenu,
            TurnReply::text(format!("💬 {answer}\n\nAsk another question, or exit:"))
                .with_choice_column(&[labels::EXIT_CHAT]),
        ))
    }

    async fn handle_upload(
        &self,
        input: MatchedInput,
        ctx: &mut TurnContext<'_>,
    ) -> Result<Step, EngineError> {
        let path = match input {
            MatchedInput::Exact(labels::CANCEL_ANALYSIS) => return entry(ctx).await,
            MatchedInput::FreeText(path) => path,
            _ => return self.reprompt(EngineState::AwaitingUpload, ctx).await,
        };

        let dataset = match ctx.deps.datasets.load(std::path::Path::new(&path)).await {
            Ok(dataset) => dataset,
            Err(e) => {
                // Validation failure: stay on the upload step with a
                // corrective message rather than bailing to the hub.
                return Ok(Step::stay(
                    EngineState::AwaitingUpload,
                    TurnReply::text(format!(
                        "❌ Could not load that file: {e}\nPlease try another file."
                    ))
                    .with_choice_column(&[labels::CANCEL_ANALYSIS]),
                ));
            }
        };

        // Fresh dataset — reset session tracking.
        ctx.session.context.history.clear();
        ctx.session.context.visuals.clear();
        ctx.session.context.set(keys::DATASET_PATH, path.clone());
        ctx.store_schema(&dataset.schema);

        // Mirror the live session so an alternate surface can pick it up.
        if let Ok(snapshot) = ctx.session.context.to_snapshot() {
            if let Err(e) = ctx
                .deps
                .store
                .upsert_active_session(&ctx.session.user_id, &path, &snapshot)
                .await
            {
                tracing::warn!("Failed to mirror active session: {e}");
            }
        }

        let numeric = dataset
            .schema
            .columns
            .iter()
            .filter(|c| c.ty == ColumnType::Numeric)
            .count();
        let overview = format!(
            "✅ **File loaded and cleaned**\n\n\
             • Rows: {}\n• Columns: {}\n• Numeric: {}\n• Categorical: {}",
            dataset.row_count,
            dataset.schema.columns.len(),
            numeric,
            dataset.schema.columns.len() - numeric,
        );
        Ok(Step::go(EngineState::MainMenu, menu_reply(&overview)))
    }

    async fn handle_post(
        &self,
        input: MatchedInput,
        ctx: &mut TurnContext<'_>,
    ) -> Result<Step, EngineError> {
        let MatchedInput::Exact(label) = input else {
            return self.reprompt(EngineState::PostAnalysis, ctx).await;
        };
        match label {
            labels::RUN_ANOTHER => wizards::hypothesis::entry(ctx).await,
            labels::VISUALS => wizards::charts::entry(ctx).await,
            labels::REPORT => wizards::manuscript::entry(ctx).await,
            labels::SAVE_EXIT => wizards::projects::save_entry(ctx).await,
            labels::EXPORT_CSV => {
                let Some(record) = ctx.session.context.history.last().cloned() else {
                    return Ok(Step::stay(
                        EngineState::PostAnalysis,
                        post_analysis_reply("⚠️ Nothing to export yet.", 0),
                    ));
                };
                let path = wizards::export_record_csv(&record, ctx).await?;
                let analyses = ctx.session.context.history.len();
                let mut reply =
                    post_analysis_reply("📥 Exported the latest analysis to CSV.", analyses);
                reply = reply.with_attachment(path);
                Ok(Step::stay(EngineState::PostAnalysis, reply))
            }
            labels::FINISH => {
                let analyses = ctx.session.context.history.len();
                Ok(Step::go(
                    EngineState::MainMenu,
                    menu_reply(&format!(
                        "✅ Session wrapped up — {analyses} analyses saved. \
                         Use Save & Exit to keep them as a project."
                    )),
                ))
            }
            _ => self.reprompt(EngineState::PostAnalysis, ctx).await,
        }
    }

    async fn run_descriptives(&self, ctx: &mut TurnContext<'_>) -> Result<Step, EngineError> {
        let dataset = ctx.dataset().await?;
        let numeric = dataset.schema.numeric_names();
        if numeric.is_empty() {
            return Ok(Step::stay(
                EngineState::MainMenu,
                menu_reply("⚠️ The dataset has no numeric columns to describe."),
            ));
        }

        let outcome = ctx.deps.stats.descriptives(&dataset, &numeric)?;
        let interpretation = ctx.deps.interpreter.interpret(&outcome).await;

        let mut summary = String::from("📉 **Descriptive Statistics**\n");
        if let crate::collab::stats::AnalysisOutcome::Descriptive { rows } = &outcome {
            for row in rows {
                summary.push_str(&format!(
                    "• {}: n={}, mean={:.2}, sd={:.2}, range {:.2}–{:.2}\n",
                    row.column, row.n, row.mean, row.sd, row.min, row.max
                ));
            }
        }
        summary.push_str(&format!("\n📖 {interpretation}"));

        ctx.session.context.push_history(AnalysisRecord {
            test_name: "Descriptive Statistics".into(),
            variables: numeric.join(", "),
            summary: summary.clone(),
            outcome,
        });

        let analyses = ctx.session.context.history.len();
        Ok(Step::go(
            EngineState::PostAnalysis,
            post_analysis_reply(&summary, analyses),
        ))
    }
}

// Menu selection modes used by other wizards when they re-enter the hub's
// column listings; kept here so the hub and wizards agree.
pub(crate) fn column_menu(
    ctx: &TurnContext<'_>,
    mode: SelectionMode,
    selected: &[String],
    extra: &[&str],
) -> Vec<Vec<String>> {
    match ctx.cached_schema() {
        Some(schema) => ctx
            .deps
            .menu
            .build(&schema, mode, selected, extra, labels::BACK_TO_MENU)
            .rows,
        None => vec![vec![labels::BACK_TO_MENU.to_string()]],
    }
}
