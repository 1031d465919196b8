use std::sync::{Arc, Mutex};

use tracing::error;

use crate::application::{IdentityUseCase, TestSessionUseCase};
use crate::domain::error::{AppError, Result};
use crate::infrastructure::backend::init_backend_credential;
use crate::infrastructure::config::AppConfig;
use crate::infrastructure::db::connection::init_db;
use crate::infrastructure::db::sessions::{SessionStore, SqliteSessionStore};
use crate::infrastructure::db::users::UserRepository;
use crate::infrastructure::live_query::SessionFeed;
use crate::infrastructure::storage::ensure_parent_dir;
use crate::interfaces::http::{add_log, start_server, HttpState, LogBuffer};

/// Opens storage, resolves the backend credential and wires the use cases.
pub async fn build_state(config: &AppConfig, logs: LogBuffer) -> Result<HttpState> {
    ensure_parent_dir(&config.database.path).map_err(|err| {
        error!(
            error = %err,
            db_path = %config.database.path.display(),
            "Failed to create database directory"
        );
        AppError::from(err)
    })?;

    let pool = init_db(&config.database).await?;
    add_log(
        &logs,
        "INFO",
        "Database",
        &format!("Database ready at {}", config.database.path.display()),
    );

    let credential = init_backend_credential(&config.auth)?;
    add_log(
        &logs,
        "INFO",
        "Backend",
        &format!("Service secret loaded via {}", credential.strategy),
    );

    let store: Arc<dyn SessionStore> = Arc::new(SqliteSessionStore::new(pool.clone()));
    let feed = SessionFeed::new(Arc::clone(&store));
    let identity = IdentityUseCase::new(
        Arc::new(UserRepository::new(pool)),
        credential.secret.clone(),
        config.auth.session_ttl_millis(),
    );

    Ok(HttpState {
        identity: Arc::new(identity),
        sessions: Arc::new(TestSessionUseCase::new(store, feed)),
        auth: config.auth.clone(),
        logs,
    })
}

pub async fn serve(config: AppConfig) -> Result<()> {
    let logs: LogBuffer = Arc::new(Mutex::new(Vec::new()));
    let state = build_state(&config, logs).await?;

    let server = start_server(&config.server, state).map_err(|err| {
        error!(error = %err, host = %config.server.host, port = config.server.port, "Failed to bind HTTP server");
        AppError::from(err)
    })?;

    server.await.map_err(AppError::from)
}
