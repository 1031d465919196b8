pub mod api;
pub mod guard;
pub mod pages;

use crate::application::{IdentityUseCase, TestSessionUseCase};
use crate::infrastructure::config::{AuthConfig, ServerConfig};
use actix_cors::Cors;
use actix_web::middleware::{from_fn, Logger};
use actix_web::{dev::Server, http::header, web, App, HttpServer};
use chrono::Local;
use serde::{Deserialize, Serialize};
use std::sync::{Arc, Mutex};
use tracing::{error, info, warn};

const LOG_CAPACITY: usize = 100;

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct LogEntry {
    pub time: String,
    pub level: String,
    pub source: String,
    pub message: String,
    /// Account the entry belongs to. Process-level entries have none.
    #[serde(skip)]
    pub owner: Option<String>,
}

impl LogEntry {
    pub fn visible_to(&self, uid: &str) -> bool {
        self.owner.as_deref().map_or(true, |owner| owner == uid)
    }
}

pub type LogBuffer = Arc<Mutex<Vec<LogEntry>>>;

pub struct HttpState {
    pub identity: Arc<IdentityUseCase>,
    pub sessions: Arc<TestSessionUseCase>,
    pub auth: AuthConfig,
    pub logs: LogBuffer,
}

fn add_log_entry(
    logs: &Mutex<Vec<LogEntry>>,
    owner: Option<&str>,
    level: &str,
    source: &str,
    message: &str,
) {
    match level {
        "ERROR" => error!(source, owner, "{}", message),
        "WARN" => warn!(source, owner, "{}", message),
        _ => info!(source, owner, "{}", message),
    }

    let entry = LogEntry {
        time: Local::now().format("%H:%M:%S").to_string(),
        level: level.to_string(),
        source: source.to_string(),
        message: message.to_string(),
        owner: owner.map(str::to_string),
    };
    let mut logs = logs.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
    logs.push(entry);
    if logs.len() > LOG_CAPACITY {
        logs.remove(0);
    }
}

pub fn add_log(logs: &Mutex<Vec<LogEntry>>, level: &str, source: &str, message: &str) {
    add_log_entry(logs, None, level, source, message);
}

/// Entry only the given account can read back through the API.
pub fn add_user_log(
    logs: &Mutex<Vec<LogEntry>>,
    owner: &str,
    level: &str,
    source: &str,
    message: &str,
) {
    add_log_entry(logs, Some(owner), level, source, message);
}

/// Route table shared by the server and the HTTP tests. Pages go last: their
/// guarded scope matches every path the API and assets did not claim.
pub fn configure_routes(cfg: &mut web::ServiceConfig) {
    cfg.service(api::scope())
        .service(pages::service_worker)
        .service(pages::manifest)
        .service(
            web::scope("")
                .wrap(from_fn(guard::page_guard))
                .configure(pages::configure),
        );
}

fn build_cors(server: &ServerConfig) -> Cors {
    let cors = Cors::default()
        .allowed_methods(vec!["GET", "POST", "PATCH"])
        .allowed_headers(vec![header::CONTENT_TYPE, header::ACCEPT])
        .supports_credentials()
        .max_age(3600);

    server
        .allowed_origins
        .iter()
        .fold(cors, |cors, origin| cors.allowed_origin(origin))
}

pub fn start_server(server_config: &ServerConfig, state: HttpState) -> std::io::Result<Server> {
    let state = web::Data::new(state);
    let cors_config = server_config.clone();

    add_log(
        &state.logs,
        "INFO",
        "HttpApi",
        &format!(
            "Listening on http://{}:{}",
            server_config.host, server_config.port
        ),
    );

    let server = HttpServer::new(move || {
        App::new()
            .wrap(Logger::new("%r %s %Dms"))
            .wrap(build_cors(&cors_config))
            .app_data(state.clone())
            .configure(configure_routes)
    })
    .bind((server_config.host.as_str(), server_config.port))?
    .run();

    Ok(server)
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;
    use crate::infrastructure::db::connection::init_memory_db;
    use crate::infrastructure::db::sessions::{SessionStore, SqliteSessionStore};
    use crate::infrastructure::db::users::UserRepository;
    use crate::infrastructure::live_query::SessionFeed;
    use crate::infrastructure::security::credentials::ServiceSecret;

    pub async fn state() -> web::Data<HttpState> {
        let pool = init_memory_db().await.unwrap();
        let store: Arc<dyn SessionStore> = Arc::new(SqliteSessionStore::new(pool.clone()));
        let feed = SessionFeed::new(Arc::clone(&store));
        let auth = AuthConfig::default();

        web::Data::new(HttpState {
            identity: Arc::new(IdentityUseCase::new(
                Arc::new(UserRepository::new(pool)),
                ServiceSecret::new("http-test-service-secret"),
                auth.session_ttl_millis(),
            )),
            sessions: Arc::new(TestSessionUseCase::new(store, feed)),
            auth,
            logs: Arc::new(Mutex::new(Vec::new())),
        })
    }
}
