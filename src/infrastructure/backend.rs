use crate::domain::error::{AppError, Result};
use crate::infrastructure::config::AuthConfig;
use crate::infrastructure::security::credentials::{ServiceSecret, MIN_SECRET_LEN};
use crate::infrastructure::security::keyring::KeyringManager;
use once_cell::sync::OnceCell;
use tracing::{info, warn};

static BACKEND_CREDENTIAL: OnceCell<BackendCredential> = OnceCell::new();

/// One way of obtaining the service secret. Tried in order until one yields a usable value.
pub trait SecretSource {
    fn name(&self) -> &'static str;
    fn load(&self) -> Result<Option<String>>;
}

pub struct KeyringSecretSource {
    manager: KeyringManager,
    entry: String,
}

impl KeyringSecretSource {
    pub fn new(service: &str, entry: &str) -> Self {
        Self {
            manager: KeyringManager::new(service),
            entry: entry.to_string(),
        }
    }
}

impl SecretSource for KeyringSecretSource {
    fn name(&self) -> &'static str {
        "keyring"
    }

    fn load(&self) -> Result<Option<String>> {
        self.manager.read_secret(&self.entry)
    }
}

pub struct ExplicitSecretSource {
    value: Option<String>,
}

impl ExplicitSecretSource {
    pub fn new(value: Option<String>) -> Self {
        Self { value }
    }
}

impl SecretSource for ExplicitSecretSource {
    fn name(&self) -> &'static str {
        "explicit configuration"
    }

    fn load(&self) -> Result<Option<String>> {
        // Secrets pasted through env files often carry escaped newlines.
        Ok(self.value.as_ref().map(|value| value.replace("\\n", "\n")))
    }
}

#[derive(Debug, Clone)]
pub struct BackendCredential {
    pub secret: ServiceSecret,
    pub strategy: &'static str,
}

pub fn resolve_credential(sources: &[&dyn SecretSource]) -> Result<BackendCredential> {
    let mut attempts = Vec::with_capacity(sources.len());

    for source in sources {
        let outcome = match source.load() {
            Ok(Some(value)) => {
                let value = value.trim();
                if value.len() >= MIN_SECRET_LEN {
                    info!(strategy = source.name(), "Backend credential initialized");
                    return Ok(BackendCredential {
                        secret: ServiceSecret::new(value),
                        strategy: source.name(),
                    });
                }
                format!("secret shorter than {} characters", MIN_SECRET_LEN)
            }
            Ok(None) => "not configured".to_string(),
            Err(err) => err.to_string(),
        };
        warn!(strategy = source.name(), reason = %outcome, "Backend credential strategy failed");
        attempts.push(format!("{} ({})", source.name(), outcome));
    }

    Err(AppError::Configuration(format!(
        "Backend credential could not be initialized. Attempted strategies: {}",
        if attempts.is_empty() {
            "none".to_string()
        } else {
            attempts.join("; ")
        }
    )))
}

/// Resolves the process-wide credential once; later calls return the memoized value.
pub fn init_backend_credential(auth: &AuthConfig) -> Result<&'static BackendCredential> {
    BACKEND_CREDENTIAL.get_or_try_init(|| {
        let keyring = KeyringSecretSource::new(&auth.keyring_service, &auth.keyring_entry);
        let explicit = ExplicitSecretSource::new(auth.service_secret.clone());
        resolve_credential(&[&keyring, &explicit])
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    struct FixedSource {
        name: &'static str,
        result: Result<Option<String>>,
    }

    impl SecretSource for FixedSource {
        fn name(&self) -> &'static str {
            self.name
        }

        fn load(&self) -> Result<Option<String>> {
            self.result.clone()
        }
    }

    #[test]
    fn test_first_usable_strategy_wins() {
        let default = FixedSource {
            name: "default",
            result: Ok(Some("default-secret-0123456789".to_string())),
        };
        let explicit = ExplicitSecretSource::new(Some("explicit-secret-0123456789".to_string()));

        let credential = resolve_credential(&[&default, &explicit]).unwrap();
        assert_eq!(credential.strategy, "default");
        assert_eq!(credential.secret, ServiceSecret::new("default-secret-0123456789"));
    }

    #[test]
    fn test_falls_back_to_explicit_secret() {
        let default = FixedSource {
            name: "default",
            result: Err(AppError::SecurityError("no keyring daemon".to_string())),
        };
        let explicit = ExplicitSecretSource::new(Some("  explicit-secret-0123456789 ".to_string()));

        let credential = resolve_credential(&[&default, &explicit]).unwrap();
        assert_eq!(credential.strategy, "explicit configuration");
        assert_eq!(credential.secret, ServiceSecret::new("explicit-secret-0123456789"));
    }

    #[test]
    fn test_failure_names_every_attempted_strategy() {
        let default = FixedSource {
            name: "default",
            result: Ok(None),
        };
        let explicit = ExplicitSecretSource::new(Some("short".to_string()));

        let err = resolve_credential(&[&default, &explicit]).unwrap_err();
        let AppError::Configuration(message) = err else {
            panic!("expected configuration error");
        };
        assert!(message.contains("default (not configured)"));
        assert!(message.contains("explicit configuration (secret shorter than 16 characters)"));
    }

    #[test]
    fn test_explicit_source_unescapes_newlines() {
        let source = ExplicitSecretSource::new(Some("line-one\\nline-two".to_string()));
        assert_eq!(source.load().unwrap().as_deref(), Some("line-one\nline-two"));
    }
}
