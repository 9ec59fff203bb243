//! `ProjectStore` trait — the persistence interface consumed by the
//! engine. One backend serves users, saved projects, and the live
//! "active session" mirror row.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::DatabaseError;

/// A registered user (created by the signup wizard).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserRecord {
    pub id: String,
    pub full_name: String,
    pub email: String,
    pub phone: String,
    pub country: String,
    pub currency: String,
    pub created_at: DateTime<Utc>,
}

/// Lifecycle status of a persisted project row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProjectStatus {
    /// Explicitly saved by the user.
    Saved,
    /// A saved project that has been resumed.
    InProgress,
    /// The silently-mirrored live session (one per user).
    ActiveSession,
}

impl ProjectStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Saved => "saved",
            Self::InProgress => "in_progress",
            Self::ActiveSession => "active_session",
        }
    }

    pub fn parse(s: &str) -> Self {
        match s {
            "in_progress" => Self::InProgress,
            "active_session" => Self::ActiveSession,
            _ => Self::Saved,
        }
    }
}

/// Free-text research metadata collected by the save wizard.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ResearchMeta {
    pub title: String,
    pub objectives: String,
    pub questions: String,
    pub hypotheses: String,
}

/// A full project row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProjectRecord {
    pub id: String,
    pub owner_id: String,
    pub title: String,
    pub research: ResearchMeta,
    pub dataset_path: String,
    /// Serialized `SessionContext` snapshot.
    pub context: serde_json::Value,
    pub status: ProjectStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Listing row (no context blob).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProjectSummary {
    pub id: String,
    pub title: String,
    pub status: ProjectStatus,
    pub created_at: DateTime<Utc>,
}

/// Backend-agnostic persistence trait.
#[async_trait]
pub trait ProjectStore: Send + Sync {
    /// Run all pending schema migrations.
    async fn run_migrations(&self) -> Result<(), DatabaseError>;

    // ── Users ───────────────────────────────────────────────────────

    async fn create_user(&self, user: &UserRecord) -> Result<(), DatabaseError>;

    async fn get_user(&self, id: &str) -> Result<Option<UserRecord>, DatabaseError>;

    // ── Projects ────────────────────────────────────────────────────

    /// Insert a new saved project. Returns the generated project id.
    async fn save_project(
        &self,
        owner_id: &str,
        title: &str,
        research: &ResearchMeta,
        dataset_path: &str,
        context: &serde_json::Value,
    ) -> Result<String, DatabaseError>;

    async fn get_project(&self, id: &str) -> Result<Option<ProjectRecord>, DatabaseError>;

    /// Most recently updated first. Excludes the active-session mirror.
    async fn list_projects(
        &self,
        owner_id: &str,
        limit: usize,
    ) -> Result<Vec<ProjectSummary>, DatabaseError>;

    /// Delete a project the caller owns. Returns false if no row matched.
    async fn delete_project(&self, id: &str, owner_id: &str) -> Result<bool, DatabaseError>;

    /// Rename a project the caller owns. Returns false if no row matched.
    async fn rename_project(
        &self,
        id: &str,
        owner_id: &str,
        title: &str,
    ) -> Result<bool, DatabaseError>;

    async fn update_project_status(
        &self,
        id: &str,
        status: ProjectStatus,
    ) -> Result<(), DatabaseError>;

    // ── Active session mirror ───────────────────────────────────────

    /// Upsert the single live-session row for a user (written on every
    /// dataset upload so another surface can mirror the session).
    async fn upsert_active_session(
        &self,
        owner_id: &str,
        dataset_path: &str,
        context: &serde_json::Value,
    ) -> Result<(), DatabaseError>;

    async fn get_active_session(
        &self,
        owner_id: &str,
    ) -> Result<Option<ProjectRecord>, DatabaseError>;
}
