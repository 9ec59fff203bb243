//! quantabot — a session-scoped, multi-step workflow engine for guided
//! data analysis over turn-based text/menu exchanges.

pub mod channels;
pub mod collab;
pub mod config;
pub mod context;
pub mod engine;
pub mod error;
pub mod llm;
pub mod session;
pub mod store;
pub mod wizards;
