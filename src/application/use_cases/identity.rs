use crate::domain::error::{AppError, Result};
use crate::domain::user::{IssuedCredential, ProfileUpdate, SignInInput, SignUpInput, UserProfile};
use crate::infrastructure::db::users::{UserRecord, UserRepository};
use crate::infrastructure::security::credentials::{
    digest_token, generate_token, hash_password, verify_password, ServiceSecret,
};
use std::sync::Arc;
use tracing::{info, warn};
use uuid::Uuid;
use validator::Validate;

/// Local accounts with opaque, server-side session credentials.
pub struct IdentityUseCase {
    users: Arc<UserRepository>,
    secret: ServiceSecret,
    session_ttl_millis: i64,
}

impl IdentityUseCase {
    pub fn new(users: Arc<UserRepository>, secret: ServiceSecret, session_ttl_millis: i64) -> Self {
        Self {
            users,
            secret,
            session_ttl_millis,
        }
    }

    pub async fn sign_up(&self, input: SignUpInput) -> Result<(UserProfile, IssuedCredential)> {
        input.validate()?;

        let email = normalize_email(&input.email);
        if self.users.find_by_email(&email).await?.is_some() {
            return Err(AppError::Conflict(
                "An account with this email already exists.".to_string(),
            ));
        }

        let password_hash = hash_password_blocking(input.password.clone()).await?;
        let display_name = input.display_name.trim();
        let record = UserRecord {
            uid: Uuid::new_v4().to_string(),
            email,
            display_name: (!display_name.is_empty()).then(|| display_name.to_string()),
            photo_url: None,
            password_hash,
            created_at: now_millis(),
        };
        self.users.insert_user(&record).await?;
        info!(uid = %record.uid, "Account created");

        let credential = self.issue_credential(&record.uid).await?;
        Ok((record.into(), credential))
    }

    pub async fn sign_in(&self, input: SignInInput) -> Result<(UserProfile, IssuedCredential)> {
        input.validate()?;

        let email = normalize_email(&input.email);
        let found = match self.users.find_by_email(&email).await? {
            Some(record) => {
                let password = input.password.clone();
                let stored = record.password_hash.clone();
                let verified = tokio::task::spawn_blocking(move || verify_password(&password, &stored))
                    .await
                    .map_err(|e| AppError::Internal(format!("Password check failed: {}", e)))?;
                verified.then_some(record)
            }
            None => None,
        };
        let record = match found {
            Some(record) => record,
            None => {
                warn!("Rejected sign-in attempt");
                return Err(AppError::Unauthorized(
                    "Invalid email or password.".to_string(),
                ));
            }
        };

        let purged = self.users.purge_expired_credentials(now_millis()).await?;
        if purged > 0 {
            info!(purged, "Purged expired credentials");
        }

        let credential = self.issue_credential(&record.uid).await?;
        info!(uid = %record.uid, "Signed in");
        Ok((record.into(), credential))
    }

    /// A missing, blank, unknown or expired token all resolve to `None`.
    pub async fn current_user(&self, token: Option<&str>) -> Result<Option<UserProfile>> {
        let Some(token) = token.map(str::trim).filter(|t| !t.is_empty()) else {
            return Ok(None);
        };
        let token_hash = digest_token(&self.secret, token);
        let record = self
            .users
            .find_user_by_token_hash(&token_hash, now_millis())
            .await?;
        Ok(record.map(UserProfile::from))
    }

    pub async fn sign_out(&self, token: Option<&str>) -> Result<()> {
        if let Some(token) = token.map(str::trim).filter(|t| !t.is_empty()) {
            self.users
                .delete_credential(&digest_token(&self.secret, token))
                .await?;
        }
        Ok(())
    }

    pub async fn update_profile(&self, uid: &str, update: ProfileUpdate) -> Result<UserProfile> {
        update.validate()?;

        let display_name = update.display_name.map(|name| {
            let name = name.trim();
            (!name.is_empty()).then(|| name.to_string())
        });
        let photo_url = update.photo_url.map(|url| Some(url.trim().to_string()));
        if display_name.is_none() && photo_url.is_none() {
            return Err(AppError::ValidationError("Nothing to update.".to_string()));
        }

        let record = self.users.update_profile(uid, display_name, photo_url).await?;
        info!(uid = %uid, "Profile updated");
        Ok(record.into())
    }

    async fn issue_credential(&self, uid: &str) -> Result<IssuedCredential> {
        let token = generate_token();
        let created_at = now_millis();
        let expires_at = created_at + self.session_ttl_millis;
        self.users
            .insert_credential(&digest_token(&self.secret, &token), uid, created_at, expires_at)
            .await?;
        Ok(IssuedCredential { token, expires_at })
    }
}

async fn hash_password_blocking(password: String) -> Result<String> {
    tokio::task::spawn_blocking(move || hash_password(&password))
        .await
        .map_err(|e| AppError::Internal(format!("Password hashing task failed: {}", e)))?
}

fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

fn now_millis() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::db::connection::init_memory_db;

    async fn identity(ttl: i64) -> IdentityUseCase {
        let users = Arc::new(UserRepository::new(init_memory_db().await.unwrap()));
        IdentityUseCase::new(users, ServiceSecret::new("identity-test-secret"), ttl)
    }

    fn sign_up_input(email: &str) -> SignUpInput {
        SignUpInput {
            display_name: "Linus".to_string(),
            email: email.to_string(),
            password: "hunter2hunter2".to_string(),
        }
    }

    #[tokio::test]
    async fn test_sign_up_current_user_sign_out_round_trip() {
        let identity = identity(60_000).await;
        let (profile, credential) = identity.sign_up(sign_up_input("Linus@Example.com")).await.unwrap();
        assert_eq!(profile.email, "linus@example.com");

        let current = identity.current_user(Some(&credential.token)).await.unwrap();
        assert_eq!(current, Some(profile));

        identity.sign_out(Some(&credential.token)).await.unwrap();
        assert!(identity.current_user(Some(&credential.token)).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_duplicate_sign_up_is_conflict() {
        let identity = identity(60_000).await;
        identity.sign_up(sign_up_input("a@example.com")).await.unwrap();
        let err = identity.sign_up(sign_up_input("A@example.com")).await.unwrap_err();
        assert!(matches!(err, AppError::Conflict(_)));
    }

    #[tokio::test]
    async fn test_sign_in_checks_password() {
        let identity = identity(60_000).await;
        identity.sign_up(sign_up_input("a@example.com")).await.unwrap();

        let err = identity
            .sign_in(SignInInput {
                email: "a@example.com".to_string(),
                password: "wrong-password".to_string(),
            })
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Unauthorized(_)));

        let (profile, credential) = identity
            .sign_in(SignInInput {
                email: "a@example.com".to_string(),
                password: "hunter2hunter2".to_string(),
            })
            .await
            .unwrap();
        assert_eq!(profile.display_name.as_deref(), Some("Linus"));
        assert!(identity.current_user(Some(&credential.token)).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_stored_password_is_argon2id_phc() {
        let identity = identity(60_000).await;
        identity.sign_up(sign_up_input("a@example.com")).await.unwrap();

        let record = identity.users.find_by_email("a@example.com").await.unwrap().unwrap();
        assert!(record.password_hash.starts_with("$argon2id$"));
        assert!(!record.password_hash.contains("hunter2hunter2"));
    }

    #[tokio::test]
    async fn test_sign_up_validates_input() {
        let identity = identity(60_000).await;
        let mut input = sign_up_input("not-an-email");
        input.password = "short".to_string();
        let err = identity.sign_up(input).await.unwrap_err();
        assert!(matches!(err, AppError::ValidationError(_)));
    }

    #[tokio::test]
    async fn test_expired_and_blank_credentials_are_absent() {
        let identity = identity(-1).await;
        let (_, credential) = identity.sign_up(sign_up_input("a@example.com")).await.unwrap();

        assert!(identity.current_user(Some(&credential.token)).await.unwrap().is_none());
        assert!(identity.current_user(Some("   ")).await.unwrap().is_none());
        assert!(identity.current_user(None).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_update_profile() {
        let identity = identity(60_000).await;
        let (profile, _) = identity.sign_up(sign_up_input("a@example.com")).await.unwrap();

        let updated = identity
            .update_profile(
                &profile.uid,
                ProfileUpdate {
                    display_name: Some("Linus T.".to_string()),
                    photo_url: Some("https://example.com/me.png".to_string()),
                },
            )
            .await
            .unwrap();
        assert_eq!(updated.display_name.as_deref(), Some("Linus T."));
        assert_eq!(updated.photo_url.as_deref(), Some("https://example.com/me.png"));

        let err = identity
            .update_profile(&profile.uid, ProfileUpdate::default())
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::ValidationError(_)));
    }
}
