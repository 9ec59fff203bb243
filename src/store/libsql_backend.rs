//! libSQL backend — async `ProjectStore` implementation.
//!
//! Supports local file and in-memory databases. Writes are single-row
//! statements, so each persistence operation is atomic.

use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use libsql::{Connection, Database as LibSqlDatabase, params};
use tracing::info;
use uuid::Uuid;

use crate::error::DatabaseError;
use crate::store::migrations;
use crate::store::traits::{
    ProjectRecord, ProjectStatus, ProjectStore, ProjectSummary, ResearchMeta, UserRecord,
};

/// libSQL database backend.
pub struct LibSqlBackend {
    #[allow(dead_code)]
    db: Arc<LibSqlDatabase>,
    conn: Connection,
}

impl LibSqlBackend {
    /// Open (or create) a local database file and run migrations.
    pub async fn new_local(path: &Path) -> Result<Self, DatabaseError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| {
                DatabaseError::Connection(format!("Failed to create database directory: {e}"))
            })?;
        }
        let db = libsql::Builder::new_local(path)
            .build()
            .await
            .map_err(|e| DatabaseError::Connection(format!("Failed to open database: {e}")))?;
        let conn = db
            .connect()
            .map_err(|e| DatabaseError::Connection(format!("Failed to create connection: {e}")))?;
        let backend = Self {
            db: Arc::new(db),
            conn,
        };
        backend.run_migrations().await?;
        info!(path = %path.display(), "Database opened");
        Ok(backend)
    }

    /// Create an in-memory database (for tests).
    pub async fn new_memory() -> Result<Self, DatabaseError> {
        let db = libsql::Builder::new_local(":memory:")
            .build()
            .await
            .map_err(|e| {
                DatabaseError::Connection(format!("Failed to create in-memory database: {e}"))
            })?;
        let conn = db
            .connect()
            .map_err(|e| DatabaseError::Connection(format!("Failed to create connection: {e}")))?;
        let backend = Self {
            db: Arc::new(db),
            conn,
        };
        backend.run_migrations().await?;
        Ok(backend)
    }

    fn conn(&self) -> &Connection {
        &self.conn
    }
}

/// Parse an RFC 3339 or SQLite datetime string into DateTime<Utc>.
fn parse_datetime(s: &str) -> DateTime<Utc> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return dt.with_timezone(&Utc);
    }
    if let Ok(ndt) = chrono::NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S%.f") {
        return ndt.and_utc();
    }
    DateTime::<Utc>::MIN_UTC
}

fn query_err(e: impl std::fmt::Display) -> DatabaseError {
    DatabaseError::Query(e.to_string())
}

fn row_to_project(row: &libsql::Row) -> Result<ProjectRecord, DatabaseError> {
    let context_str: String = row.get(8).map_err(query_err)?;
    let context = serde_json::from_str(&context_str)
        .map_err(|e| DatabaseError::Serialization(e.to_string()))?;
    Ok(ProjectRecord {
        id: row.get::<String>(0).map_err(query_err)?,
        owner_id: row.get::<String>(1).map_err(query_err)?,
        title: row.get::<String>(2).map_err(query_err)?,
        research: ResearchMeta {
            title: row.get::<String>(3).map_err(query_err)?,
            objectives: row.get::<String>(4).map_err(query_err)?,
            questions: row.get::<String>(5).map_err(query_err)?,
            hypotheses: row.get::<String>(6).map_err(query_err)?,
        },
        dataset_path: row.get::<String>(7).map_err(query_err)?,
        context,
        status: ProjectStatus::parse(&row.get::<String>(9).map_err(query_err)?),
        created_at: parse_datetime(&row.get::<String>(10).map_err(query_err)?),
        updated_at: parse_datetime(&row.get::<String>(11).map_err(query_err)?),
    })
}

const PROJECT_COLUMNS: &str = "id, owner_id, title, research_title, research_objectives, \
     research_questions, research_hypotheses, dataset_path, context, status, \
     created_at, updated_at";

#[async_trait]
impl ProjectStore for LibSqlBackend {
    async fn run_migrations(&self) -> Result<(), DatabaseError> {
        migrations::run_migrations(self.conn()).await
    }

    async fn create_user(&self, user: &UserRecord) -> Result<(), DatabaseError> {
        self.conn()
            .execute(
                "INSERT OR REPLACE INTO users (id, full_name, email, phone, country, currency, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                params![
                    user.id.as_str(),
                    user.full_name.as_str(),
                    user.email.as_str(),
                    user.phone.as_str(),
                    user.country.as_str(),
                    user.currency.as_str(),
                    user.created_at.to_rfc3339(),
                ],
            )
            .await
            .map_err(query_err)?;
        Ok(())
    }

    async fn get_user(&self, id: &str) -> Result<Option<UserRecord>, DatabaseError> {
        let mut rows = self
            .conn()
            .query(
                "SELECT id, full_name, email, phone, country, currency, created_at
                 FROM users WHERE id = ?1",
                params![id],
            )
            .await
            .map_err(query_err)?;
        match rows.next().await.map_err(query_err)? {
            Some(row) => Ok(Some(UserRecord {
                id: row.get::<String>(0).map_err(query_err)?,
                full_name: row.get::<String>(1).map_err(query_err)?,
                email: row.get::<String>(2).map_err(query_err)?,
                phone: row.get::<String>(3).map_err(query_err)?,
                country: row.get::<String>(4).map_err(query_err)?,
                currency: row.get::<String>(5).map_err(query_err)?,
                created_at: parse_datetime(&row.get::<String>(6).map_err(query_err)?),
            })),
            None => Ok(None),
        }
    }

    async fn save_project(
        &self,
        owner_id: &str,
        title: &str,
        research: &ResearchMeta,
        dataset_path: &str,
        context: &serde_json::Value,
    ) -> Result<String, DatabaseError> {
        let id = Uuid::new_v4().to_string();
        let now = Utc::now().to_rfc3339();
        let context_str = serde_json::to_string(context)
            .map_err(|e| DatabaseError::Serialization(e.to_string()))?;
        self.conn()
            .execute(
                "INSERT INTO projects (id, owner_id, title, research_title, research_objectives,
                    research_questions, research_hypotheses, dataset_path, context, status,
                    created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, 'saved', ?10, ?10)",
                params![
                    id.as_str(),
                    owner_id,
                    title,
                    research.title.as_str(),
                    research.objectives.as_str(),
                    research.questions.as_str(),
                    research.hypotheses.as_str(),
                    dataset_path,
                    context_str.as_str(),
                    now.as_str(),
                ],
            )
            .await
            .map_err(query_err)?;
        Ok(id)
    }

    async fn get_project(&self, id: &str) -> Result<Option<ProjectRecord>, DatabaseError> {
        let sql = format!("SELECT {PROJECT_COLUMNS} FROM projects WHERE id = ?1");
        let mut rows = self
            .conn()
            .query(&sql, params![id])
            .await
            .map_err(query_err)?;
        match rows.next().await.map_err(query_err)? {
            Some(row) => Ok(Some(row_to_project(&row)?)),
            None => Ok(None),
        }
    }

    async fn list_projects(
        &self,
        owner_id: &str,
        limit: usize,
    ) -> Result<Vec<ProjectSummary>, DatabaseError> {
        let mut rows = self
            .conn()
            .query(
                "SELECT id, title, status, created_at FROM projects
                 WHERE owner_id = ?1 AND status != 'active_session'
                 ORDER BY updated_at DESC LIMIT ?2",
                params![owner_id, limit as i64],
            )
            .await
            .map_err(query_err)?;
        let mut out = Vec::new();
        while let Some(row) = rows.next().await.map_err(query_err)? {
            out.push(ProjectSummary {
                id: row.get::<String>(0).map_err(query_err)?,
                title: row.get::<String>(1).map_err(query_err)?,
                status: ProjectStatus::parse(&row.get::<String>(2).map_err(query_err)?),
                created_at: parse_datetime(&row.get::<String>(3).map_err(query_err)?),
            });
        }
        Ok(out)
    }

    async fn delete_project(&self, id: &str, owner_id: &str) -> Result<bool, DatabaseError> {
        let affected = self
            .conn()
            .execute(
                "DELETE FROM projects WHERE id = ?1 AND owner_id = ?2",
                params![id, owner_id],
            )
            .await
            .map_err(query_err)?;
        Ok(affected > 0)
    }

    async fn rename_project(
        &self,
        id: &str,
        owner_id: &str,
        title: &str,
    ) -> Result<bool, DatabaseError> {
        let affected = self
            .conn()
            .execute(
                "UPDATE projects SET title = ?3, updated_at = ?4
                 WHERE id = ?1 AND owner_id = ?2",
                params![id, owner_id, title, Utc::now().to_rfc3339()],
            )
            .await
            .map_err(query_err)?;
        Ok(affected > 0)
    }

    async fn update_project_status(
        &self,
        id: &str,
        status: ProjectStatus,
    ) -> Result<(), DatabaseError> {
        self.conn()
            .execute(
                "UPDATE projects SET status = ?2, updated_at = ?3 WHERE id = ?1",
                params![id, status.as_str(), Utc::now().to_rfc3339()],
            )
            .await
            .map_err(query_err)?;
        Ok(())
    }

    async fn upsert_active_session(
        &self,
        owner_id: &str,
        dataset_path: &str,
        context: &serde_json::Value,
    ) -> Result<(), DatabaseError> {
        let now = Utc::now().to_rfc3339();
        let context_str = serde_json::to_string(context)
            .map_err(|e| DatabaseError::Serialization(e.to_string()))?;
        self.conn()
            .execute(
                "INSERT INTO projects (id, owner_id, title, dataset_path, context, status,
                    created_at, updated_at)
                 VALUES (?1, ?2, 'Current Session', ?3, ?4, 'active_session', ?5, ?5)
                 ON CONFLICT (owner_id) WHERE status = 'active_session'
                 DO UPDATE SET dataset_path = ?3, context = ?4, updated_at = ?5",
                params![
                    Uuid::new_v4().to_string(),
                    owner_id,
                    dataset_path,
                    context_str.as_str(),
                    now.as_str(),
                ],
            )
            .await
            .map_err(query_err)?;
        Ok(())
    }

    async fn get_active_session(
        &self,
        owner_id: &str,
    ) -> Result<Option<ProjectRecord>, DatabaseError> {
        let sql = format!(
            "SELECT {PROJECT_COLUMNS} FROM projects
             WHERE owner_id = ?1 AND status = 'active_session'"
        );
        let mut rows = self
            .conn()
            .query(&sql, params![owner_id])
            .await
            .map_err(query_err)?;
        match rows.next().await.map_err(query_err)? {
            Some(row) => Ok(Some(row_to_project(&row)?)),
            None => Ok(None),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::SessionContext;

    fn user(id: &str) -> UserRecord {
        UserRecord {
            id: id.into(),
            full_name: "Ada Analyst".into(),
            email: "ada@example.com".into(),
            phone: "+1234567".into(),
            country: "Kenya".into(),
            currency: "KES".into(),
            created_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn user_roundtrip() {
        let store = LibSqlBackend::new_memory().await.unwrap();
        store.create_user(&user("u1")).await.unwrap();
        let loaded = store.get_user("u1").await.unwrap().unwrap();
        assert_eq!(loaded.full_name, "Ada Analyst");
        assert_eq!(loaded.currency, "KES");
        assert!(store.get_user("missing").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn project_save_load_roundtrip_preserves_context() {
        let store = LibSqlBackend::new_memory().await.unwrap();
        store.create_user(&user("u1")).await.unwrap();

        let mut ctx = SessionContext::new();
        ctx.set("research_title", "Sleep and grades");
        ctx.select("predictors", "SleepHours");
        ctx.select("predictors", "Caffeine");
        let snapshot = ctx.to_snapshot().unwrap();

        let research = ResearchMeta {
            title: "Sleep and grades".into(),
            objectives: "Estimate the association".into(),
            questions: "Does sleep predict grades?".into(),
            hypotheses: "Sleep predicts grades".into(),
        };
        let id = store
            .save_project("u1", "Sleep study", &research, "data/sleep.csv", &snapshot)
            .await
            .unwrap();

        let project = store.get_project(&id).await.unwrap().unwrap();
        assert_eq!(project.status, ProjectStatus::Saved);
        assert_eq!(project.research.questions, "Does sleep predict grades?");

        // Byte-for-byte context equivalence after the round trip.
        let restored = SessionContext::from_snapshot(&project.context).unwrap();
        assert_eq!(restored, ctx);
        assert_eq!(
            serde_json::to_string(&restored).unwrap(),
            serde_json::to_string(&ctx).unwrap()
        );
    }

    #[tokio::test]
    async fn list_excludes_active_session_and_orders_recent_first() {
        let store = LibSqlBackend::new_memory().await.unwrap();
        store.create_user(&user("u1")).await.unwrap();
        let empty = serde_json::json!({});
        store
            .save_project("u1", "First", &ResearchMeta::default(), "", &empty)
            .await
            .unwrap();
        store
            .save_project("u1", "Second", &ResearchMeta::default(), "", &empty)
            .await
            .unwrap();
        store
            .upsert_active_session("u1", "data/x.csv", &empty)
            .await
            .unwrap();

        let listed = store.list_projects("u1", 10).await.unwrap();
        assert_eq!(listed.len(), 2);
        assert!(listed.iter().all(|p| p.status == ProjectStatus::Saved));
    }

    #[tokio::test]
    async fn delete_requires_matching_owner() {
        let store = LibSqlBackend::new_memory().await.unwrap();
        store.create_user(&user("u1")).await.unwrap();
        let id = store
            .save_project(
                "u1",
                "Mine",
                &ResearchMeta::default(),
                "",
                &serde_json::json!({}),
            )
            .await
            .unwrap();
        assert!(!store.delete_project(&id, "intruder").await.unwrap());
        assert!(store.delete_project(&id, "u1").await.unwrap());
        assert!(store.get_project(&id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn active_session_upsert_is_single_row() {
        let store = LibSqlBackend::new_memory().await.unwrap();
        store.create_user(&user("u1")).await.unwrap();
        store
            .upsert_active_session("u1", "a.csv", &serde_json::json!({"v": 1}))
            .await
            .unwrap();
        store
            .upsert_active_session("u1", "b.csv", &serde_json::json!({"v": 2}))
            .await
            .unwrap();
        let session = store.get_active_session("u1").await.unwrap().unwrap();
        assert_eq!(session.dataset_path, "b.csv");
        assert_eq!(session.context["v"], 2);
    }

    #[tokio::test]
    async fn resume_flips_status_to_in_progress() {
        let store = LibSqlBackend::new_memory().await.unwrap();
        store.create_user(&user("u1")).await.unwrap();
        let id = store
            .save_project(
                "u1",
                "Resumable",
                &ResearchMeta::default(),
                "",
                &serde_json::json!({}),
            )
            .await
            .unwrap();
        store
            .update_project_status(&id, ProjectStatus::InProgress)
            .await
            .unwrap();
        let project = store.get_project(&id).await.unwrap().unwrap();
        assert_eq!(project.status, ProjectStatus::InProgress);
    }
}
