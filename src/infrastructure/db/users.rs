use crate::domain::error::{AppError, Result};
use crate::domain::user::UserProfile;
use sqlx::sqlite::SqlitePool;

/// Stored account row including password material. Never leaves the infrastructure layer.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct UserRecord {
    pub uid: String,
    pub email: String,
    pub display_name: Option<String>,
    pub photo_url: Option<String>,
    pub password_hash: String,
    pub created_at: i64,
}

impl From<UserRecord> for UserProfile {
    fn from(record: UserRecord) -> Self {
        Self {
            uid: record.uid,
            display_name: record.display_name,
            email: record.email,
            photo_url: record.photo_url,
        }
    }
}

pub struct UserRepository {
    pool: SqlitePool,
}

const USER_COLUMNS: &str =
    "uid, email, display_name, photo_url, password_hash, created_at";

impl UserRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub async fn insert_user(&self, record: &UserRecord) -> Result<()> {
        sqlx::query(
            "INSERT INTO users (uid, email, display_name, photo_url, password_hash, created_at)
             VALUES (?, ?, ?, ?, ?, ?)",
        )
        .bind(&record.uid)
        .bind(&record.email)
        .bind(&record.display_name)
        .bind(&record.photo_url)
        .bind(&record.password_hash)
        .bind(record.created_at)
        .execute(&self.pool)
        .await
        .map_err(|e| match e {
            sqlx::Error::Database(db) if db.is_unique_violation() => AppError::Conflict(
                "An account with this email already exists.".to_string(),
            ),
            other => AppError::DatabaseError(format!("Failed to insert user: {other}")),
        })?;

        Ok(())
    }

    pub async fn find_by_email(&self, email: &str) -> Result<Option<UserRecord>> {
        let sql = format!("SELECT {USER_COLUMNS} FROM users WHERE email = ?");
        sqlx::query_as::<_, UserRecord>(&sql)
            .bind(email)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| AppError::DatabaseError(format!("Failed to look up user: {e}")))
    }

    pub async fn get_user(&self, uid: &str) -> Result<UserRecord> {
        let sql = format!("SELECT {USER_COLUMNS} FROM users WHERE uid = ?");
        let record = sqlx::query_as::<_, UserRecord>(&sql)
            .bind(uid)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| AppError::DatabaseError(format!("Failed to fetch user: {e}")))?;

        record.ok_or_else(|| AppError::NotFound(format!("User not found: {}", uid)))
    }

    /// `None` leaves a column untouched; `Some(None)` clears it.
    pub async fn update_profile(
        &self,
        uid: &str,
        display_name: Option<Option<String>>,
        photo_url: Option<Option<String>>,
    ) -> Result<UserRecord> {
        let result = sqlx::query(
            "UPDATE users SET
                display_name = CASE WHEN ? THEN ? ELSE display_name END,
                photo_url = CASE WHEN ? THEN ? ELSE photo_url END
             WHERE uid = ?",
        )
        .bind(display_name.is_some())
        .bind(display_name.flatten())
        .bind(photo_url.is_some())
        .bind(photo_url.flatten())
        .bind(uid)
        .execute(&self.pool)
        .await
        .map_err(|e| AppError::DatabaseError(format!("Failed to update profile: {e}")))?;

        if result.rows_affected() == 0 {
            return Err(AppError::NotFound(format!("User not found: {}", uid)));
        }
        self.get_user(uid).await
    }

    pub async fn insert_credential(
        &self,
        token_hash: &str,
        uid: &str,
        created_at: i64,
        expires_at: i64,
    ) -> Result<()> {
        sqlx::query(
            "INSERT INTO auth_sessions (token_hash, uid, created_at, expires_at) VALUES (?, ?, ?, ?)",
        )
        .bind(token_hash)
        .bind(uid)
        .bind(created_at)
        .bind(expires_at)
        .execute(&self.pool)
        .await
        .map_err(|e| AppError::DatabaseError(format!("Failed to store credential: {e}")))?;

        Ok(())
    }

    /// Resolves an unexpired credential to its account.
    pub async fn find_user_by_token_hash(
        &self,
        token_hash: &str,
        now: i64,
    ) -> Result<Option<UserRecord>> {
        sqlx::query_as::<_, UserRecord>(
            "SELECT u.uid, u.email, u.display_name, u.photo_url, u.password_hash, u.created_at
             FROM auth_sessions s JOIN users u ON u.uid = s.uid
             WHERE s.token_hash = ? AND s.expires_at > ?",
        )
        .bind(token_hash)
        .bind(now)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| AppError::DatabaseError(format!("Failed to resolve credential: {e}")))
    }

    pub async fn delete_credential(&self, token_hash: &str) -> Result<()> {
        sqlx::query("DELETE FROM auth_sessions WHERE token_hash = ?")
            .bind(token_hash)
            .execute(&self.pool)
            .await
            .map_err(|e| AppError::DatabaseError(format!("Failed to revoke credential: {e}")))?;
        Ok(())
    }

    /// Drops expired credentials. Returns how many were removed.
    pub async fn purge_expired_credentials(&self, now: i64) -> Result<u64> {
        let result = sqlx::query("DELETE FROM auth_sessions WHERE expires_at <= ?")
            .bind(now)
            .execute(&self.pool)
            .await
            .map_err(|e| {
                AppError::DatabaseError(format!("Failed to purge expired credentials: {e}"))
            })?;
        Ok(result.rows_affected())
    }
}
