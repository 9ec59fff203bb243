//! Project management — list/open/rename/delete saved projects, plus the
//! four-question save flow (title, objectives, questions, hypotheses —
//! each skippable) ending in a persistence write.

use async_trait::async_trait;

use crate::context::{keys, SessionContext};
use crate::engine::router::{MatchedInput, PatternKind, Route, TurnContext, Wizard};
use crate::engine::state::EngineState;
use crate::engine::turn::{Step, TurnReply};
use crate::error::EngineError;
use crate::store::{ProjectStatus, ResearchMeta};
use crate::wizards::{labels, main_menu};

const OPEN: &str = "📂 Open / Load";
const RENAME: &str = "✏️ Rename";
const DELETE: &str = "🗑️ Delete";
const CONFIRM_DELETE: &str = "❌ Yes, Delete Forever";
const CANCEL_DELETE: &str = "🔙 No, Cancel";
const SAVE_CURRENT: &str = "💾 Save Current Session";
const BACK_TO_LIST: &str = "◀️ Back to List";

/// Sticky flag for free-text rename entry.
pub const AWAITING_RENAME: &str = "awaiting_project_rename";

const KEY_PROJECT_IDS: &str = "project_ids";
const KEY_SELECTED: &str = "selected_project";

/// Enter at the project list.
pub async fn entry(ctx: &mut TurnContext<'_>) -> Result<Step, EngineError> {
    ctx.session.context.reset_transient();
    list_step(ctx, "").await
}

/// Enter the save flow (Save & Exit) at its first question.
pub async fn save_entry(ctx: &mut TurnContext<'_>) -> Result<Step, EngineError> {
    ctx.session.context.reset_transient();
    let current = ctx
        .session
        .context
        .get(keys::RESEARCH_TITLE)
        .unwrap_or("untitled")
        .to_string();
    Ok(Step::go(
        EngineState::SaveTitle,
        TurnReply::text(format!(
            "💾 **Save your project**\n\nQuestion 1/4 — what is the **title** of \
             your study? (current: {current})"
        ))
        .with_choice_column(&[labels::SKIP]),
    ))
}

async fn list_step(ctx: &mut TurnContext<'_>, prefix: &str) -> Result<Step, EngineError> {
    let projects = ctx
        .deps
        .store
        .list_projects(&ctx.session.user_id, ctx.deps.config.project_list_limit)
        .await?;

    if projects.is_empty() {
        return Ok(Step::go(
            EngineState::ProjectsMenu,
            TurnReply::text(
                "📁 **My Projects**\n\nYou have no saved projects yet.\n\
                 To save one, run an analysis and use Save & Exit.",
            )
            .with_choices(vec![
                vec![SAVE_CURRENT.into()],
                vec![labels::BACK_TO_MENU.into()],
            ]),
        ));
    }

    let ids: Vec<String> = projects.iter().map(|p| p.id.clone()).collect();
    ctx.session
        .context
        .set(KEY_PROJECT_IDS, serde_json::to_string(&ids).unwrap_or_default());
    ctx.session.context.remove(KEY_SELECTED);

    let mut rows: Vec<Vec<String>> = projects
        .iter()
        .enumerate()
        .map(|(i, p)| {
            let icon = match p.status {
                ProjectStatus::Saved => "🟢",
                _ => "✅",
            };
            vec![format!(
                "{}. {icon} {} ({})",
                i + 1,
                p.title,
                p.created_at.format("%Y-%m-%d %H:%M")
            )]
        })
        .collect();
    rows.push(vec![SAVE_CURRENT.into()]);
    rows.push(vec![labels::BACK_TO_MENU.into()]);

    let text = if prefix.is_empty() {
        "📁 **My Projects**\n\nSelect a project to manage (open, rename, delete):".to_string()
    } else {
        format!("{prefix}\n\n📁 **My Projects**\n\nSelect a project to manage:")
    };
    Ok(Step::go(
        EngineState::ProjectsMenu,
        TurnReply::text(text).with_choices(rows),
    ))
}

fn options_prompt() -> TurnReply {
    TurnReply::text("📁 **Manage Project**\n\nSelect an action:").with_choices(vec![
        vec![OPEN.into()],
        vec![RENAME.into(), DELETE.into()],
        vec![BACK_TO_LIST.into()],
    ])
}

pub struct ProjectsWizard;

#[async_trait]
impl Wizard for ProjectsWizard {
    fn name(&self) -> &'static str {
        "projects"
    }

    fn routes(&self) -> Vec<Route> {
        use EngineState::*;
        use PatternKind::*;
        vec![
            Route::new(ProjectsMenu, Exact(OPEN)),
            Route::new(ProjectsMenu, Exact(RENAME)),
            Route::new(ProjectsMenu, Exact(DELETE)),
            Route::new(ProjectsMenu, Exact(CONFIRM_DELETE)),
            Route::new(ProjectsMenu, Exact(CANCEL_DELETE)),
            Route::new(ProjectsMenu, Exact(SAVE_CURRENT)),
            Route::new(ProjectsMenu, Exact(BACK_TO_LIST)),
            Route::new(ProjectsMenu, FreeText),
            Route::new(SaveTitle, Exact(labels::SKIP)),
            Route::new(SaveTitle, FreeText),
            Route::new(SaveObjectives, Exact(labels::SKIP)),
            Route::new(SaveObjectives, FreeText),
            Route::new(SaveQuestions, Exact(labels::SKIP)),
            Route::new(SaveQuestions, FreeText),
            Route::new(SaveHypotheses, Exact(labels::SKIP)),
            Route::new(SaveHypotheses, FreeText),
        ]
    }

    fn sticky_flags(&self) -> &'static [&'static str] {
        &[AWAITING_RENAME]
    }

    async fn handle(
        &self,
        state: EngineState,
        input: MatchedInput,
        ctx: &mut TurnContext<'_>,
    ) -> Result<Step, EngineError> {
        match state {
            EngineState::ProjectsMenu => self.handle_menu(input, ctx).await,
            EngineState::SaveTitle
            | EngineState::SaveObjectives
            | EngineState::SaveQuestions
            | EngineState::SaveHypotheses => self.handle_save(state, input, ctx).await,
            other => Err(EngineError::UnroutableState(other.to_string())),
        }
    }

    async fn on_sticky(
        &self,
        _flag: &str,
        input: &str,
        ctx: &mut TurnContext<'_>,
    ) -> Result<Step, EngineError> {
        let Some(id) = ctx.session.context.get(KEY_SELECTED).map(str::to_string) else {
            return list_step(ctx, "").await;
        };
        let title = input.trim();
        if title.is_empty() {
            ctx.session.context.set_sticky(AWAITING_RENAME);
            return Ok(Step::stay(
                EngineState::ProjectsMenu,
                TurnReply::text("Please send a non-empty project name:"),
            ));
        }
        let renamed = ctx
            .deps
            .store
            .rename_project(&id, &ctx.session.user_id, title)
            .await?;
        let note = if renamed {
            format!("✏️ Renamed to **{title}**.")
        } else {
            "⚠️ Could not rename that project.".to_string()
        };
        list_step(ctx, &note).await
    }

    async fn reprompt(
        &self,
        state: EngineState,
        ctx: &mut TurnContext<'_>,
    ) -> Result<Step, EngineError> {
        match state {
            EngineState::ProjectsMenu => list_step(ctx, "").await,
            _ => Ok(Step::stay(
                state,
                TurnReply::text("Type your answer, or skip:").with_choice_column(&[labels::SKIP]),
            )),
        }
    }
}

impl ProjectsWizard {
    fn selected_ids(&self, ctx: &TurnContext<'_>) -> Vec<String> {
        ctx.session
            .context
            .get(KEY_PROJECT_IDS)
            .and_then(|raw| serde_json::from_str(raw).ok())
            .unwrap_or_default()
    }

    async fn handle_menu(
        &self,
        input: MatchedInput,
        ctx: &mut TurnContext<'_>,
    ) -> Result<Step, EngineError> {
        match input {
            MatchedInput::Exact(SAVE_CURRENT) => save_entry(ctx).await,
            MatchedInput::Exact(BACK_TO_LIST) | MatchedInput::Exact(CANCEL_DELETE) => {
                list_step(ctx, "").await
            }
            MatchedInput::Exact(OPEN) => self.open_selected(ctx).await,
            MatchedInput::Exact(RENAME) => {
                if ctx.session.context.get(KEY_SELECTED).is_none() {
                    return list_step(ctx, "").await;
                }
                ctx.session.context.set_sticky(AWAITING_RENAME);
                Ok(Step::stay(
                    EngineState::ProjectsMenu,
                    TurnReply::text("✏️ Send the new name for this project:"),
                ))
            }
            MatchedInput::Exact(DELETE) => {
                if ctx.session.context.get(KEY_SELECTED).is_none() {
                    return list_step(ctx, "").await;
                }
                Ok(Step::stay(
                    EngineState::ProjectsMenu,
                    TurnReply::text(
                        "⚠️ **Confirm deletion**\n\nThis cannot be undone. Delete this project?",
                    )
                    .with_choices(vec![vec![CONFIRM_DELETE.into(), CANCEL_DELETE.into()]]),
                ))
            }
            MatchedInput::Exact(CONFIRM_DELETE) => {
                let Some(id) = ctx.session.context.get(KEY_SELECTED).map(str::to_string) else {
                    return list_step(ctx, "").await;
                };
                let deleted = ctx
                    .deps
                    .store
                    .delete_project(&id, &ctx.session.user_id)
                    .await?;
                let note = if deleted {
                    "🗑️ Project deleted."
                } else {
                    "⚠️ Could not delete that project."
                };
                list_step(ctx, note).await
            }
            MatchedInput::FreeText(text) => {
                // A numbered project row, e.g. "2. 🟢 Sleep study (2026-08-01)".
                let index = text
                    .trim()
                    .split('.')
                    .next()
                    .and_then(|n| n.trim().parse::<usize>().ok());
                let ids = self.selected_ids(ctx);
                match index.and_then(|i| i.checked_sub(1)).and_then(|i| ids.get(i)) {
                    Some(id) => {
                        ctx.session.context.set(KEY_SELECTED, id.clone());
                        Ok(Step::stay(EngineState::ProjectsMenu, options_prompt()))
                    }
                    None => list_step(ctx, "").await,
                }
            }
            _ => list_step(ctx, "").await,
        }
    }

    async fn open_selected(&self, ctx: &mut TurnContext<'_>) -> Result<Step, EngineError> {
        let Some(id) = ctx.session.context.get(KEY_SELECTED).map(str::to_string) else {
            return list_step(ctx, "").await;
        };
        let Some(project) = ctx.deps.store.get_project(&id).await? else {
            return list_step(ctx, "⚠️ Project not found.").await;
        };

        // Re-hydrate the context store from the snapshot. The restored
        // accumulators, history, and scalars must match what was saved.
        let restored = SessionContext::from_snapshot(&project.context)
            .map_err(|e| EngineError::Database(crate::error::DatabaseError::Serialization(e.to_string())))?;
        ctx.session.context = restored;
        if !project.dataset_path.is_empty() {
            ctx.session
                .context
                .set(keys::DATASET_PATH, project.dataset_path.clone());
        }
        ctx.deps
            .store
            .update_project_status(&id, ProjectStatus::InProgress)
            .await?;

        let analyses = ctx.session.context.history.len();
        Ok(Step::go(
            EngineState::MainMenu,
            main_menu::menu_reply(&format!(
                "📂 **Project loaded: {}**\n📊 Analyses restored: {analyses}\n\
                 Your previous session has been restored — continue your analysis.",
                project.title
            )),
        ))
    }

    async fn handle_save(
        &self,
        state: EngineState,
        input: MatchedInput,
        ctx: &mut TurnContext<'_>,
    ) -> Result<Step, EngineError> {
        let answer = match input {
            MatchedInput::Exact(labels::SKIP) => None,
            MatchedInput::FreeText(text) => Some(text),
            _ => None,
        };

        let (key, next, question) = match state {
            EngineState::SaveTitle => (
                keys::RESEARCH_TITLE,
                EngineState::SaveObjectives,
                "Question 2/4 — what are your **primary objectives**?",
            ),
            EngineState::SaveObjectives => (
                keys::RESEARCH_OBJECTIVES,
                EngineState::SaveQuestions,
                "Question 3/4 — what are your **research questions**?",
            ),
            EngineState::SaveQuestions => (
                keys::RESEARCH_QUESTIONS,
                EngineState::SaveHypotheses,
                "Question 4/4 — what are your **hypotheses**?",
            ),
            _ => (keys::RESEARCH_HYPOTHESES, EngineState::MainMenu, ""),
        };

        if let Some(answer) = answer {
            ctx.session.context.set(key, answer);
        }

        if state != EngineState::SaveHypotheses {
            return Ok(Step::go(
                next,
                TurnReply::text(question).with_choice_column(&[labels::SKIP]),
            ));
        }

        // Final question answered — persist the project.
        let get = |key: &str| {
            ctx.session
                .context
                .get(key)
                .unwrap_or_default()
                .to_string()
        };
        let research = ResearchMeta {
            title: get(keys::RESEARCH_TITLE),
            objectives: get(keys::RESEARCH_OBJECTIVES),
            questions: get(keys::RESEARCH_QUESTIONS),
            hypotheses: get(keys::RESEARCH_HYPOTHESES),
        };
        let title = if research.title.is_empty() {
            "Untitled Analysis".to_string()
        } else {
            research.title.clone()
        };
        let dataset_path = get(keys::DATASET_PATH);
        let snapshot = ctx
            .session
            .context
            .to_snapshot()
            .map_err(|e| EngineError::Database(crate::error::DatabaseError::Serialization(e.to_string())))?;

        match ctx
            .deps
            .store
            .save_project(&ctx.session.user_id, &title, &research, &dataset_path, &snapshot)
            .await
        {
            Ok(id) => Ok(Step::go(
                EngineState::MainMenu,
                main_menu::menu_reply(&format!(
                    "💾 **Project saved!**\n📄 Title: {title}\n🆔 Project ID: `{id}`\n\
                     Resume it anytime from My Projects."
                )),
            )),
            Err(e) => {
                // Persistence failure: surface it, leave the session state
                // unchanged so the user can retry.
                tracing::error!("Project save failed: {e}");
                Ok(Step::stay(
                    EngineState::SaveHypotheses,
                    TurnReply::text(
                        "❌ Saving failed. Your session is unchanged — send your \
                         hypotheses again to retry, or use the main menu.",
                    )
                    .with_choice_column(&[labels::SKIP, labels::MAIN_MENU]),
                ))
            }
        }
    }
}
