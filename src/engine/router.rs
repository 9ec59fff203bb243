//! State router — the single entry point for inbound turns.
//!
//! Routing order per turn: sticky-flag override, then global navigation
//! commands, then the `(state, pattern)` dispatch table of the wizard that
//! owns the current state. Unrecognized input re-prompts the current menu.
//! A failing transition never leaves the session unroutable: the error is
//! logged and the session returns to the main menu hub.

use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;

use crate::collab::charts::ChartEngine;
use crate::collab::dataset::{Dataset, DatasetLoader, Schema};
use crate::collab::document::DocumentEngine;
use crate::collab::stats::StatsEngine;
use crate::config::EngineConfig;
use crate::context::keys;
use crate::engine::menu::MenuBuilder;
use crate::engine::state::EngineState;
use crate::engine::turn::{Step, TurnReply};
use crate::error::{DatasetError, EngineError};
use crate::llm::Interpreter;
use crate::session::SessionManager;
use crate::store::ProjectStore;
use crate::wizards;

/// Shared collaborators handed to every transition.
pub struct EngineDeps {
    pub config: EngineConfig,
    pub store: Arc<dyn ProjectStore>,
    pub datasets: Arc<dyn DatasetLoader>,
    pub stats: Arc<dyn StatsEngine>,
    pub charts: Arc<dyn ChartEngine>,
    pub documents: Arc<dyn DocumentEngine>,
    pub interpreter: Arc<Interpreter>,
    pub menu: MenuBuilder,
}

/// Mutable view of one turn: the locked session plus the collaborators.
pub struct TurnContext<'a> {
    pub session: &'a mut crate::session::Session,
    pub deps: &'a EngineDeps,
}

impl TurnContext<'_> {
    /// The schema cached at upload time, if a dataset is loaded.
    pub fn cached_schema(&self) -> Option<Schema> {
        let raw = self.session.context.get(keys::SCHEMA)?;
        serde_json::from_str(raw).ok()
    }

    /// Cache the schema of a freshly loaded dataset.
    pub fn store_schema(&mut self, schema: &Schema) {
        if let Ok(json) = serde_json::to_string(schema) {
            self.session.context.set(keys::SCHEMA, json);
        }
    }

    /// Reload the active dataset and re-validate it against the cached
    /// schema. The dataset is never kept materialized between turns.
    pub async fn dataset(&self) -> Result<Dataset, EngineError> {
        let path = self
            .session
            .context
            .get(keys::DATASET_PATH)
            .ok_or(EngineError::NoDataset)?;
        let dataset = self.deps.datasets.load(Path::new(path)).await?;
        if let Some(cached) = self.cached_schema() {
            for column in &cached.columns {
                if dataset.schema.column(&column.name).is_none() {
                    return Err(EngineError::Dataset(DatasetError::SchemaMismatch {
                        expected: column.name.clone(),
                    }));
                }
            }
        }
        Ok(dataset)
    }
}

/// How a route recognizes input.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum PatternKind {
    /// Exact menu label.
    Exact(&'static str),
    /// Any known dataset column (exact, case-insensitive, or substring).
    Column,
    /// A parseable number.
    Number,
    /// Any non-empty text.
    FreeText,
}

/// One row of a wizard's dispatch table.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Route {
    pub state: EngineState,
    pub pattern: PatternKind,
}

impl Route {
    pub const fn new(state: EngineState, pattern: PatternKind) -> Self {
        Self { state, pattern }
    }
}

/// The resolved form of the user's input after pattern matching.
#[derive(Debug, Clone, PartialEq)]
pub enum MatchedInput {
    Exact(&'static str),
    Column(String),
    Number(f64),
    FreeText(String),
}

/// A named sub-graph of states implementing one guided task.
#[async_trait]
pub trait Wizard: Send + Sync {
    fn name(&self) -> &'static str;

    /// The dispatch table: every `(state, pattern)` pair this wizard
    /// handles, in matching order. Enumerable without running the engine.
    fn routes(&self) -> Vec<Route>;

    /// Sticky flags whose captured turns this wizard handles.
    fn sticky_flags(&self) -> &'static [&'static str] {
        &[]
    }

    async fn handle(
        &self,
        state: EngineState,
        input: MatchedInput,
        ctx: &mut TurnContext<'_>,
    ) -> Result<Step, EngineError>;

    async fn on_sticky(
        &self,
        flag: &str,
        _input: &str,
        _ctx: &mut TurnContext<'_>,
    ) -> Result<Step, EngineError> {
        Err(EngineError::UnhandledFlag(flag.to_string()))
    }

    /// Re-show the current state's choices after unrecognized input.
    async fn reprompt(
        &self,
        state: EngineState,
        ctx: &mut TurnContext<'_>,
    ) -> Result<Step, EngineError>;
}

/// Registry mapping states and sticky flags to their owning wizard.
pub struct WizardRegistry {
    wizards: Vec<Arc<dyn Wizard>>,
}

impl WizardRegistry {
    pub fn new(wizards: Vec<Arc<dyn Wizard>>) -> Self {
        Self { wizards }
    }

    pub fn owner_of(&self, state: EngineState) -> Option<&Arc<dyn Wizard>> {
        self.wizards
            .iter()
            .find(|w| w.routes().iter().any(|r| r.state == state))
    }

    pub fn sticky_owner(&self, flag: &str) -> Option<&Arc<dyn Wizard>> {
        self.wizards
            .iter()
            .find(|w| w.sticky_flags().contains(&flag))
    }

    /// All registered routes (for enumeration and tests).
    pub fn all_routes(&self) -> Vec<(&'static str, Route)> {
        self.wizards
            .iter()
            .flat_map(|w| w.routes().into_iter().map(move |r| (w.name(), r)))
            .collect()
    }
}

/// The core dispatcher.
pub struct StateRouter {
    deps: Arc<EngineDeps>,
    sessions: Arc<SessionManager>,
    registry: WizardRegistry,
}

impl StateRouter {
    pub fn new(deps: Arc<EngineDeps>) -> Self {
        let sessions = Arc::new(SessionManager::new(deps.config.session_idle_timeout));
        let registry = WizardRegistry::new(wizards::all());
        Self {
            deps,
            sessions,
            registry,
        }
    }

    pub fn sessions(&self) -> Arc<SessionManager> {
        Arc::clone(&self.sessions)
    }

    /// Handle one inbound turn. Infallible from the transport's point of
    /// view: any internal error becomes a recovery prompt.
    pub async fn handle_turn(&self, user_id: &str, text: &str) -> TurnReply {
        let handle = self
            .sessions
            .get_or_create(user_id, EngineState::MainMenu)
            .await;
        let mut session = handle.lock().await;
        let mut ctx = TurnContext {
            session: &mut *session,
            deps: self.deps.as_ref(),
        };

        let step = match self.route(&mut ctx, text.trim()).await {
            Ok(step) => step,
            Err(e) => {
                tracing::error!(user = user_id, state = %ctx.session.state, "Turn failed: {e}");
                ctx.session.context.reset_transient();
                recovery_step(&e)
            }
        };

        let Step { next, reply } = step;
        ctx.session.enter(next);
        reply
    }

    async fn route(&self, ctx: &mut TurnContext<'_>, input: &str) -> Result<Step, EngineError> {
        // Signup gate: no analysis wizard is reachable without a user row.
        let user = self.deps.store.get_user(&ctx.session.user_id).await?;
        if user.is_none() {
            if !ctx.session.state.is_signup() {
                ctx.session.state = EngineState::SignupName;
                return wizards::signup::entry(ctx).await;
            }
        } else if ctx.session.state.is_terminal() {
            // Any message after an explicit cancel starts a fresh menu.
            return wizards::main_menu::entry(ctx).await;
        }

        // 1. Sticky-flag override: a pending narrow sub-question borrows
        //    this turn, bypassing the state graph.
        if let Some(flag) = ctx.session.context.take_sticky() {
            if !is_global_command(input) {
                let wizard = self
                    .registry
                    .sticky_owner(&flag)
                    .ok_or_else(|| EngineError::UnhandledFlag(flag.clone()))?;
                return wizard.on_sticky(&flag, input, ctx).await;
            }
            // A global command cancels the sub-question along with the rest.
        }

        // 2. Global commands, recognized from any state.
        if let Some(step) = self.global_command(ctx, input).await? {
            return Ok(step);
        }

        // 3. Dispatch to the owning wizard's `(state, pattern)` table.
        let state = ctx.session.state;
        let wizard = self
            .registry
            .owner_of(state)
            .ok_or_else(|| EngineError::UnroutableState(state.to_string()))?;
        match self.match_input(wizard.as_ref(), state, input, ctx) {
            Some(matched) => wizard.handle(state, matched, ctx).await,
            None => wizard.reprompt(state, ctx).await,
        }
    }

    async fn global_command(
        &self,
        ctx: &mut TurnContext<'_>,
        input: &str,
    ) -> Result<Option<Step>, EngineError> {
        let lowered = input.to_lowercase();
        let is_cancel = input == wizards::labels::CANCEL
            || lowered == "cancel"
            || lowered == "/cancel";
        if is_cancel {
            ctx.session.context.reset_transient();
            return Ok(Some(Step::go(
                EngineState::Cancelled,
                TurnReply::text("Session cancelled. Send any message to start again."),
            )));
        }

        // Signup must run to completion; only cancel escapes it.
        if ctx.session.state.is_signup() {
            return Ok(None);
        }

        let is_menu = input == wizards::labels::MAIN_MENU
            || input == wizards::labels::BACK_TO_MENU
            || lowered == "/start"
            || lowered == "/menu";
        if is_menu {
            return wizards::main_menu::entry(ctx).await.map(Some);
        }
        Ok(None)
    }

    fn match_input(
        &self,
        wizard: &dyn Wizard,
        state: EngineState,
        input: &str,
        ctx: &TurnContext<'_>,
    ) -> Option<MatchedInput> {
        if input.is_empty() {
            return None;
        }
        let cleaned = input
            .trim_start_matches(crate::engine::menu::SELECTED_MARKER)
            .trim();
        let schema = ctx.cached_schema();
        for route in wizard.routes().iter().filter(|r| r.state == state) {
            match route.pattern {
                PatternKind::Exact(label) => {
                    if input == label || cleaned == label {
                        return Some(MatchedInput::Exact(label));
                    }
                }
                PatternKind::Column => {
                    if let Some(schema) = schema.as_ref() {
                        if let Some(column) = MenuBuilder::resolve_column(schema, input) {
                            return Some(MatchedInput::Column(column));
                        }
                    }
                }
                PatternKind::Number => {
                    if let Ok(value) = cleaned.replace(',', "").parse::<f64>() {
                        return Some(MatchedInput::Number(value));
                    }
                }
                PatternKind::FreeText => {
                    return Some(MatchedInput::FreeText(input.to_string()));
                }
            }
        }
        None
    }
}

fn is_global_command(input: &str) -> bool {
    let lowered = input.to_lowercase();
    input == wizards::labels::CANCEL
        || input == wizards::labels::MAIN_MENU
        || input == wizards::labels::BACK_TO_MENU
        || lowered == "cancel"
        || lowered == "/cancel"
        || lowered == "/start"
        || lowered == "/menu"
}

/// User-visible recovery after a failed transition. Internal error detail
/// stays in the logs.
fn recovery_step(error: &EngineError) -> Step {
    let text = match error {
        EngineError::NoDataset | EngineError::Dataset(DatasetError::FileNotFound(_)) => {
            "❌ No dataset is loaded. Please upload a data file first.".to_string()
        }
        EngineError::Dataset(DatasetError::SchemaMismatch { expected }) => format!(
            "⚠️ The data file changed since it was loaded (missing column {expected}). \
             Please upload it again."
        ),
        _ => "⚠️ That operation failed. Returning to the main menu.".to_string(),
    };
    Step::go(
        EngineState::MainMenu,
        wizards::main_menu::menu_reply(&text),
    )
}
