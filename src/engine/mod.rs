//! The workflow engine: states, menus, turn primitives, and the router.

pub mod menu;
pub mod router;
pub mod state;
pub mod turn;

pub use menu::{Menu, MenuBuilder, SelectionMode};
pub use router::{
    EngineDeps, MatchedInput, PatternKind, Route, StateRouter, TurnContext, Wizard, WizardRegistry,
};
pub use state::EngineState;
pub use turn::{Step, TurnReply};
