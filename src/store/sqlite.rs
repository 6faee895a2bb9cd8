//! SQLite-backed store (sqlx)

use super::{
    Document, JobCompletion, Notification, Repository, StatusUpdate, Store, StoreError,
};
use crate::metrics::Scores;
use crate::pipeline::job::{AnalysisJob, DocType, JobStatus};
use crate::source::RepoCoordinates;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions, SqliteRow};
use sqlx::{Row, Sqlite, Transaction};
use std::path::Path;
use std::str::FromStr;
use tracing::debug;

const SCHEMA: &[&str] = &[
    r#"
    CREATE TABLE IF NOT EXISTS repositories (
        id TEXT PRIMARY KEY,
        owner_id TEXT NOT NULL,
        owner TEXT NOT NULL,
        name TEXT NOT NULL,
        default_branch TEXT NOT NULL
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS accounts (
        owner_id TEXT PRIMARY KEY,
        access_token TEXT NOT NULL
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS analyses (
        id TEXT PRIMARY KEY,
        repo_id TEXT NOT NULL,
        owner_id TEXT NOT NULL,
        status TEXT NOT NULL,
        progress INTEGER NOT NULL DEFAULT 0,
        message TEXT NOT NULL DEFAULT '',
        commit_sha TEXT,
        health_score INTEGER,
        security_score INTEGER,
        complexity_score INTEGER,
        onboarding_score INTEGER,
        tech_debt_score INTEGER,
        result_json TEXT,
        metrics_json TEXT,
        error TEXT,
        created_at INTEGER NOT NULL,
        updated_at INTEGER NOT NULL
    )
    "#,
    "CREATE INDEX IF NOT EXISTS idx_analyses_repo_status ON analyses(repo_id, status, updated_at)",
    r#"
    CREATE TABLE IF NOT EXISTS analysis_logs (
        seq INTEGER PRIMARY KEY AUTOINCREMENT,
        analysis_id TEXT NOT NULL,
        line TEXT NOT NULL,
        FOREIGN KEY (analysis_id) REFERENCES analyses(id)
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS documents (
        repo_id TEXT NOT NULL,
        version TEXT NOT NULL,
        doc_type TEXT NOT NULL,
        content TEXT NOT NULL,
        spec TEXT,
        updated_at INTEGER NOT NULL,
        UNIQUE(repo_id, version, doc_type)
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS notifications (
        id TEXT PRIMARY KEY,
        owner_id TEXT NOT NULL,
        analysis_id TEXT NOT NULL,
        title TEXT NOT NULL,
        body TEXT NOT NULL,
        created_at INTEGER NOT NULL
    )
    "#,
];

const UPSERT_DOCUMENT: &str = r#"
    INSERT INTO documents (repo_id, version, doc_type, content, spec, updated_at)
    VALUES (?, ?, ?, ?, ?, ?)
    ON CONFLICT(repo_id, version, doc_type) DO UPDATE SET
        content = excluded.content,
        spec = excluded.spec,
        updated_at = excluded.updated_at
"#;

pub struct SqliteStore {
    pool: SqlitePool,
}

fn timestamp(value: i64) -> DateTime<Utc> {
    DateTime::from_timestamp_millis(value).unwrap_or_default()
}

fn parse_json(text: Option<String>) -> Result<Option<serde_json::Value>, StoreError> {
    text.map(|t| serde_json::from_str(&t)).transpose().map_err(StoreError::from)
}

fn job_from_row(row: &SqliteRow, logs: Vec<String>) -> Result<AnalysisJob, StoreError> {
    let status: String = row.try_get("status")?;
    let status = JobStatus::from_str(&status).map_err(StoreError::Serialization)?;

    let health: Option<i64> = row.try_get("health_score")?;
    let scores = match health {
        Some(health) => Some(Scores {
            health: health as u8,
            security: row.try_get::<i64, _>("security_score")? as u8,
            complexity: row.try_get::<i64, _>("complexity_score")? as u8,
            onboarding: row.try_get::<i64, _>("onboarding_score")? as u8,
            tech_debt: row.try_get::<i64, _>("tech_debt_score")? as u8,
        }),
        None => None,
    };

    Ok(AnalysisJob {
        id: row.try_get("id")?,
        repo_id: row.try_get("repo_id")?,
        owner_id: row.try_get("owner_id")?,
        status,
        progress: row.try_get::<i64, _>("progress")? as u8,
        message: row.try_get("message")?,
        logs,
        commit_sha: row.try_get("commit_sha")?,
        scores,
        result_json: parse_json(row.try_get("result_json")?)?,
        metrics_json: parse_json(row.try_get("metrics_json")?)?,
        error: row.try_get("error")?,
        created_at: timestamp(row.try_get("created_at")?),
        updated_at: timestamp(row.try_get("updated_at")?),
    })
}

fn document_from_row(row: &SqliteRow) -> Result<Document, StoreError> {
    let doc_type: String = row.try_get("doc_type")?;
    Ok(Document {
        repo_id: row.try_get("repo_id")?,
        version: row.try_get("version")?,
        doc_type: DocType::from_str(&doc_type).map_err(StoreError::Serialization)?,
        content: row.try_get("content")?,
        spec: row.try_get("spec")?,
        updated_at: timestamp(row.try_get("updated_at")?),
    })
}

impl SqliteStore {
    /// Opens (creating if missing) a database file in WAL mode
    pub async fn connect(path: &Path) -> Result<Self, StoreError> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)
                    .map_err(|e| StoreError::Database(sqlx::Error::Io(e)))?;
            }
        }

        let options = SqliteConnectOptions::from_str(&format!("sqlite:{}", path.display()))?
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .foreign_keys(true);

        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(options)
            .await?;

        Ok(Self { pool })
    }

    /// Private in-memory database; one connection so every query sees the same data
    pub async fn in_memory() -> Result<Self, StoreError> {
        let options = SqliteConnectOptions::from_str("sqlite::memory:")?.foreign_keys(true);
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect_with(options)
            .await?;
        Ok(Self { pool })
    }

    pub async fn migrate(&self) -> Result<(), StoreError> {
        for statement in SCHEMA {
            sqlx::query(statement).execute(&self.pool).await?;
        }
        debug!("Database schema is up to date");
        Ok(())
    }

    async fn status_in(
        tx: &mut Transaction<'_, Sqlite>,
        job_id: &str,
    ) -> Result<JobStatus, StoreError> {
        let status: Option<String> = sqlx::query_scalar("SELECT status FROM analyses WHERE id = ?")
            .bind(job_id)
            .fetch_optional(&mut **tx)
            .await?;
        let status = status.ok_or_else(|| StoreError::not_found("analysis", job_id))?;
        JobStatus::from_str(&status).map_err(StoreError::Serialization)
    }

    async fn append_log(
        tx: &mut Transaction<'_, Sqlite>,
        job_id: &str,
        line: &str,
    ) -> Result<(), StoreError> {
        sqlx::query("INSERT INTO analysis_logs (analysis_id, line) VALUES (?, ?)")
            .bind(job_id)
            .bind(line)
            .execute(&mut **tx)
            .await?;
        Ok(())
    }

    async fn logs(&self, job_id: &str) -> Result<Vec<String>, StoreError> {
        let lines = sqlx::query_scalar(
            "SELECT line FROM analysis_logs WHERE analysis_id = ? ORDER BY seq",
        )
        .bind(job_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(lines)
    }
}

#[async_trait]
impl Store for SqliteStore {
    async fn create_job(&self, job: &AnalysisJob) -> Result<(), StoreError> {
        let mut tx = self.pool.begin().await?;
        sqlx::query(
            r#"
            INSERT INTO analyses (id, repo_id, owner_id, status, progress, message, commit_sha,
                                  created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&job.id)
        .bind(&job.repo_id)
        .bind(&job.owner_id)
        .bind(job.status.as_str())
        .bind(job.progress as i64)
        .bind(&job.message)
        .bind(&job.commit_sha)
        .bind(job.created_at.timestamp_millis())
        .bind(job.updated_at.timestamp_millis())
        .execute(&mut *tx)
        .await?;

        for line in &job.logs {
            Self::append_log(&mut tx, &job.id, line).await?;
        }
        tx.commit().await?;
        Ok(())
    }

    async fn get_job(&self, id: &str) -> Result<AnalysisJob, StoreError> {
        let row = sqlx::query("SELECT * FROM analyses WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| StoreError::not_found("analysis", id))?;
        let logs = self.logs(id).await?;
        job_from_row(&row, logs)
    }

    async fn upsert_repository(&self, repo: &Repository) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO repositories (id, owner_id, owner, name, default_branch)
            VALUES (?, ?, ?, ?, ?)
            ON CONFLICT(id) DO UPDATE SET
                owner_id = excluded.owner_id,
                owner = excluded.owner,
                name = excluded.name,
                default_branch = excluded.default_branch
            "#,
        )
        .bind(&repo.id)
        .bind(&repo.owner_id)
        .bind(&repo.coordinates.owner)
        .bind(&repo.coordinates.name)
        .bind(&repo.default_branch)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn repository(&self, repo_id: &str) -> Result<Repository, StoreError> {
        let row = sqlx::query("SELECT * FROM repositories WHERE id = ?")
            .bind(repo_id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| StoreError::not_found("repository", repo_id))?;

        Ok(Repository {
            id: row.try_get("id")?,
            owner_id: row.try_get("owner_id")?,
            coordinates: RepoCoordinates::new(
                row.try_get::<String, _>("owner")?,
                row.try_get::<String, _>("name")?,
            ),
            default_branch: row.try_get("default_branch")?,
        })
    }

    async fn set_access_token(&self, owner_id: &str, token: &str) -> Result<(), StoreError> {
        sqlx::query(
            "INSERT INTO accounts (owner_id, access_token) VALUES (?, ?) \
             ON CONFLICT(owner_id) DO UPDATE SET access_token = excluded.access_token",
        )
        .bind(owner_id)
        .bind(token)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn access_token(&self, owner_id: &str) -> Result<Option<String>, StoreError> {
        let token = sqlx::query_scalar("SELECT access_token FROM accounts WHERE owner_id = ?")
            .bind(owner_id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(token)
    }

    async fn set_commit(&self, job_id: &str, commit_sha: &str) -> Result<(), StoreError> {
        let result = sqlx::query("UPDATE analyses SET commit_sha = ?, updated_at = ? WHERE id = ?")
            .bind(commit_sha)
            .bind(Utc::now().timestamp_millis())
            .bind(job_id)
            .execute(&self.pool)
            .await?;
        if result.rows_affected() == 0 {
            return Err(StoreError::not_found("analysis", job_id));
        }
        Ok(())
    }

    async fn update_status(&self, job_id: &str, update: &StatusUpdate) -> Result<(), StoreError> {
        let mut tx = self.pool.begin().await?;
        let current = Self::status_in(&mut tx, job_id).await?;
        if current != update.status && !current.can_transition_to(update.status) {
            return Err(StoreError::InvalidTransition {
                from: current,
                to: update.status,
            });
        }

        sqlx::query(
            "UPDATE analyses SET status = ?, progress = ?, message = ?, updated_at = ? WHERE id = ?",
        )
        .bind(update.status.as_str())
        .bind(update.progress as i64)
        .bind(&update.message)
        .bind(Utc::now().timestamp_millis())
        .bind(job_id)
        .execute(&mut *tx)
        .await?;
        Self::append_log(&mut tx, job_id, &update.log_line).await?;

        tx.commit().await?;
        Ok(())
    }

    async fn latest_completed(
        &self,
        repo_id: &str,
        excluding_job: &str,
    ) -> Result<Option<AnalysisJob>, StoreError> {
        let row = sqlx::query(
            r#"
            SELECT * FROM analyses
            WHERE repo_id = ? AND status = 'DONE' AND id != ?
            ORDER BY updated_at DESC, rowid DESC
            LIMIT 1
            "#,
        )
        .bind(repo_id)
        .bind(excluding_job)
        .fetch_optional(&self.pool)
        .await?;

        match row {
            Some(row) => {
                let id: String = row.try_get("id")?;
                let logs = self.logs(&id).await?;
                Ok(Some(job_from_row(&row, logs)?))
            }
            None => Ok(None),
        }
    }

    async fn complete_job(&self, job_id: &str, completion: &JobCompletion) -> Result<(), StoreError> {
        let mut tx = self.pool.begin().await?;
        let current = Self::status_in(&mut tx, job_id).await?;
        if current == JobStatus::Done {
            return Err(StoreError::AlreadyCompleted(job_id.to_string()));
        }
        if !current.can_transition_to(JobStatus::Done) {
            return Err(StoreError::InvalidTransition {
                from: current,
                to: JobStatus::Done,
            });
        }

        let now = Utc::now().timestamp_millis();
        let scores = &completion.scores;
        sqlx::query(
            r#"
            UPDATE analyses SET
                status = 'DONE', progress = 100, message = ?, commit_sha = ?,
                health_score = ?, security_score = ?, complexity_score = ?,
                onboarding_score = ?, tech_debt_score = ?,
                result_json = ?, metrics_json = ?, error = NULL, updated_at = ?
            WHERE id = ?
            "#,
        )
        .bind(&completion.message)
        .bind(&completion.commit_sha)
        .bind(scores.health as i64)
        .bind(scores.security as i64)
        .bind(scores.complexity as i64)
        .bind(scores.onboarding as i64)
        .bind(scores.tech_debt as i64)
        .bind(serde_json::to_string(&completion.result_json)?)
        .bind(serde_json::to_string(&completion.metrics_json)?)
        .bind(now)
        .bind(job_id)
        .execute(&mut *tx)
        .await?;

        for document in &completion.documents {
            sqlx::query(UPSERT_DOCUMENT)
                .bind(&document.repo_id)
                .bind(&document.version)
                .bind(document.doc_type.as_str())
                .bind(&document.content)
                .bind(&document.spec)
                .bind(document.updated_at.timestamp_millis())
                .execute(&mut *tx)
                .await?;
        }

        let notification = &completion.notification;
        sqlx::query(
            "INSERT INTO notifications (id, owner_id, analysis_id, title, body, created_at) \
             VALUES (?, ?, ?, ?, ?, ?)",
        )
        .bind(&notification.id)
        .bind(&notification.owner_id)
        .bind(&notification.analysis_id)
        .bind(&notification.title)
        .bind(&notification.body)
        .bind(notification.created_at.timestamp_millis())
        .execute(&mut *tx)
        .await?;

        Self::append_log(&mut tx, job_id, &completion.log_line).await?;
        tx.commit().await?;
        Ok(())
    }

    async fn fail_job(&self, job_id: &str, error: &str, log_line: &str) -> Result<(), StoreError> {
        let mut tx = self.pool.begin().await?;
        let current = Self::status_in(&mut tx, job_id).await?;
        if !current.can_transition_to(JobStatus::Failed) {
            return Err(StoreError::InvalidTransition {
                from: current,
                to: JobStatus::Failed,
            });
        }

        sqlx::query(
            "UPDATE analyses SET status = 'FAILED', message = 'Analysis failed', error = ?, updated_at = ? WHERE id = ?",
        )
        .bind(error)
        .bind(Utc::now().timestamp_millis())
        .bind(job_id)
        .execute(&mut *tx)
        .await?;
        Self::append_log(&mut tx, job_id, log_line).await?;

        tx.commit().await?;
        Ok(())
    }

    async fn upsert_document(&self, document: &Document) -> Result<(), StoreError> {
        sqlx::query(UPSERT_DOCUMENT)
            .bind(&document.repo_id)
            .bind(&document.version)
            .bind(document.doc_type.as_str())
            .bind(&document.content)
            .bind(&document.spec)
            .bind(document.updated_at.timestamp_millis())
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn documents(&self, repo_id: &str) -> Result<Vec<Document>, StoreError> {
        let rows = sqlx::query(
            "SELECT * FROM documents WHERE repo_id = ? ORDER BY version, doc_type",
        )
        .bind(repo_id)
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(document_from_row).collect()
    }

    async fn notifications(&self, owner_id: &str) -> Result<Vec<Notification>, StoreError> {
        let rows = sqlx::query(
            "SELECT * FROM notifications WHERE owner_id = ? ORDER BY created_at",
        )
        .bind(owner_id)
        .fetch_all(&self.pool)
        .await?;

        rows.iter()
            .map(|row| -> Result<Notification, StoreError> {
                Ok(Notification {
                    id: row.try_get("id")?,
                    owner_id: row.try_get("owner_id")?,
                    analysis_id: row.try_get("analysis_id")?,
                    title: row.try_get("title")?,
                    body: row.try_get("body")?,
                    created_at: timestamp(row.try_get("created_at")?),
                })
            })
            .collect()
    }
}
