//! Persistence layer — libSQL-backed storage for users and projects.

pub mod libsql_backend;
pub mod migrations;
pub mod traits;

pub use libsql_backend::LibSqlBackend;
pub use traits::{
    ProjectRecord, ProjectStatus, ProjectStore, ProjectSummary, ResearchMeta, UserRecord,
};
