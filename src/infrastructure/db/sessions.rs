use crate::domain::error::{AppError, Result};
use crate::domain::test_case::TestCase;
use crate::domain::test_session::{
    PlatformDetails, SessionFieldUpdate, SessionStatus, SessionSummary, TestSession,
};
use async_trait::async_trait;
use sqlx::sqlite::SqlitePool;
use sqlx::{QueryBuilder, Sqlite};

/// Document-style storage for test sessions. Test cases are embedded in their session.
#[async_trait]
pub trait SessionStore: Send + Sync {
    async fn create_session(&self, session: &TestSession) -> Result<String>;
    async fn update_fields(&self, session_id: &str, update: &SessionFieldUpdate) -> Result<()>;
    async fn get_session(&self, session_id: &str) -> Result<TestSession>;
    /// All sessions owned by `owner_id`, newest first.
    async fn list_for_owner(&self, owner_id: &str) -> Result<Vec<TestSession>>;
}

pub struct SqliteSessionStore {
    pool: SqlitePool,
}

impl SqliteSessionStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

const SESSION_COLUMNS: &str = "id, user_id, user_name, platform_details_json, test_cases_json, status, created_at, updated_at, completed_at, summary_json, reason_for_incompletion";

#[async_trait]
impl SessionStore for SqliteSessionStore {
    async fn create_session(&self, session: &TestSession) -> Result<String> {
        let platform_json = to_json(&session.platform_details, "platform details")?;
        let cases_json = to_json(&session.test_cases, "test cases")?;
        let summary_json = session
            .summary
            .as_ref()
            .map(|summary| to_json(summary, "summary"))
            .transpose()?;

        sqlx::query(
            "INSERT INTO test_sessions (id, user_id, user_name, platform_details_json, test_cases_json, status, created_at, updated_at, completed_at, summary_json, reason_for_incompletion)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&session.id)
        .bind(&session.user_id)
        .bind(&session.user_name)
        .bind(platform_json)
        .bind(cases_json)
        .bind(session.status.label())
        .bind(session.created_at)
        .bind(session.updated_at)
        .bind(session.completed_at)
        .bind(summary_json)
        .bind(&session.reason_for_incompletion)
        .execute(&self.pool)
        .await
        .map_err(|e| AppError::DatabaseError(format!("Failed to insert test session: {e}")))?;

        Ok(session.id.clone())
    }

    async fn update_fields(&self, session_id: &str, update: &SessionFieldUpdate) -> Result<()> {
        if update.is_empty() {
            return Ok(());
        }

        let cases_json = update
            .test_cases
            .as_ref()
            .map(|cases| to_json(cases, "test cases"))
            .transpose()?;
        let summary_json = update
            .summary
            .as_ref()
            .map(|summary| to_json(summary, "summary"))
            .transpose()?;

        let mut builder: QueryBuilder<Sqlite> = QueryBuilder::new("UPDATE test_sessions SET ");
        let mut fields = builder.separated(", ");
        if let Some(json) = cases_json {
            fields.push("test_cases_json = ").push_bind_unseparated(json);
        }
        if let Some(json) = summary_json {
            fields.push("summary_json = ").push_bind_unseparated(json);
        }
        if let Some(status) = update.status {
            fields.push("status = ").push_bind_unseparated(status.label());
        }
        if let Some(completed_at) = update.completed_at {
            fields.push("completed_at = ").push_bind_unseparated(completed_at);
        }
        if let Some(reason) = &update.reason_for_incompletion {
            fields
                .push("reason_for_incompletion = ")
                .push_bind_unseparated(reason.clone());
        }
        if let Some(user_name) = &update.user_name {
            fields.push("user_name = ").push_bind_unseparated(user_name.clone());
        }
        if let Some(updated_at) = update.updated_at {
            fields.push("updated_at = ").push_bind_unseparated(updated_at);
        }
        builder.push(" WHERE id = ").push_bind(session_id.to_string());

        let result = builder
            .build()
            .execute(&self.pool)
            .await
            .map_err(|e| AppError::DatabaseError(format!("Failed to update test session: {e}")))?;

        if result.rows_affected() == 0 {
            return Err(AppError::NotFound(format!(
                "Test session not found: {}",
                session_id
            )));
        }
        Ok(())
    }

    async fn get_session(&self, session_id: &str) -> Result<TestSession> {
        let sql = format!("SELECT {SESSION_COLUMNS} FROM test_sessions WHERE id = ?");
        let entity = sqlx::query_as::<_, TestSessionEntity>(&sql)
            .bind(session_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| AppError::DatabaseError(format!("Failed to fetch test session: {e}")))?;

        match entity {
            Some(entity) => entity.try_into(),
            None => Err(AppError::NotFound(format!(
                "Test session not found: {}",
                session_id
            ))),
        }
    }

    async fn list_for_owner(&self, owner_id: &str) -> Result<Vec<TestSession>> {
        let sql = format!(
            "SELECT {SESSION_COLUMNS} FROM test_sessions WHERE user_id = ? ORDER BY created_at DESC, rowid DESC"
        );
        let entities = sqlx::query_as::<_, TestSessionEntity>(&sql)
            .bind(owner_id)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| AppError::DatabaseError(format!("Failed to list test sessions: {e}")))?;

        entities.into_iter().map(TestSession::try_from).collect()
    }
}

fn to_json<T: serde::Serialize + ?Sized>(value: &T, what: &str) -> Result<String> {
    serde_json::to_string(value)
        .map_err(|e| AppError::Internal(format!("Failed to serialize {what}: {e}")))
}

fn parse_status(value: &str) -> Result<SessionStatus> {
    match value {
        "In Progress" => Ok(SessionStatus::InProgress),
        "Completed" => Ok(SessionStatus::Completed),
        "Aborted" => Ok(SessionStatus::Aborted),
        other => Err(AppError::ParseError(format!(
            "Unknown session status stored: {other}"
        ))),
    }
}

#[derive(sqlx::FromRow)]
struct TestSessionEntity {
    id: String,
    user_id: String,
    user_name: String,
    platform_details_json: String,
    test_cases_json: String,
    status: String,
    created_at: i64,
    updated_at: i64,
    completed_at: Option<i64>,
    summary_json: Option<String>,
    reason_for_incompletion: Option<String>,
}

impl TryFrom<TestSessionEntity> for TestSession {
    type Error = AppError;

    fn try_from(entity: TestSessionEntity) -> Result<Self> {
        let platform_details: PlatformDetails = serde_json::from_str(&entity.platform_details_json)
            .map_err(|e| {
                AppError::ParseError(format!(
                    "Invalid platform details for session {}: {e}",
                    entity.id
                ))
            })?;
        let test_cases: Vec<TestCase> =
            serde_json::from_str(&entity.test_cases_json).map_err(|e| {
                AppError::ParseError(format!(
                    "Invalid test cases for session {}: {e}",
                    entity.id
                ))
            })?;
        let summary: Option<SessionSummary> = entity
            .summary_json
            .as_deref()
            .map(serde_json::from_str)
            .transpose()
            .map_err(|e| {
                AppError::ParseError(format!("Invalid summary for session {}: {e}", entity.id))
            })?;

        Ok(Self {
            status: parse_status(&entity.status)?,
            id: entity.id,
            user_id: entity.user_id,
            user_name: entity.user_name,
            platform_details,
            test_cases,
            created_at: entity.created_at,
            updated_at: entity.updated_at,
            completed_at: entity.completed_at,
            summary,
            reason_for_incompletion: entity.reason_for_incompletion,
        })
    }
}
