use super::{add_user_log, HttpState, LogBuffer, LogEntry};
use tracing::{debug, error, warn};
use crate::application::use_cases::aggregation::{dashboard_view, DashboardView};
use crate::domain::error::{AppError, Result};
use crate::domain::test_case::TestCaseUpdate;
use crate::domain::test_session::NewSessionInput;
use crate::domain::user::{IssuedCredential, ProfileUpdate, SignInInput, SignUpInput, UserProfile};
use crate::infrastructure::config::AuthConfig;
use actix_web::cookie::{time::Duration as CookieDuration, Cookie, SameSite};
use actix_web::http::{header, StatusCode};
use actix_web::{get, patch, post, web, HttpRequest, HttpResponse, ResponseError, Scope};
use serde::Deserialize;
use serde_json::json;

impl ResponseError for AppError {
    fn status_code(&self) -> StatusCode {
        match self {
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::ValidationError(_) | AppError::ParseError(_) => StatusCode::BAD_REQUEST,
            AppError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            AppError::SecurityError(_) => StatusCode::FORBIDDEN,
            AppError::Conflict(_) => StatusCode::CONFLICT,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn error_response(&self) -> HttpResponse {
        HttpResponse::build(self.status_code()).json(json!({ "error": self.to_string() }))
    }
}

pub fn scope() -> Scope {
    web::scope("/api")
        .service(sign_up)
        .service(sign_in)
        .service(sign_out)
        .service(me)
        .service(update_profile)
        .service(list_sessions)
        .service(create_session)
        .service(import_test_cases)
        .service(get_session)
        .service(update_test_case)
        .service(complete_session)
        .service(abort_session)
        .service(dashboard)
        .service(dashboard_live)
        .service(get_logs)
}

fn session_token(req: &HttpRequest, auth: &AuthConfig) -> Option<String> {
    req.cookie(&auth.cookie_name)
        .map(|cookie| cookie.value().to_string())
}

async fn require_user(req: &HttpRequest, state: &HttpState) -> Result<UserProfile> {
    let token = session_token(req, &state.auth);
    state
        .identity
        .current_user(token.as_deref())
        .await?
        .ok_or_else(|| AppError::Unauthorized("Sign in to continue.".to_string()))
}

fn credential_cookie(auth: &AuthConfig, credential: &IssuedCredential) -> Cookie<'static> {
    Cookie::build(auth.cookie_name.clone(), credential.token.clone())
        .path("/")
        .http_only(true)
        .same_site(SameSite::Lax)
        .secure(auth.secure_cookie)
        .max_age(CookieDuration::hours(auth.session_ttl_hours))
        .finish()
}

fn cleared_cookie(auth: &AuthConfig) -> Cookie<'static> {
    let mut cookie = Cookie::build(auth.cookie_name.clone(), "")
        .path("/")
        .http_only(true)
        .same_site(SameSite::Lax)
        .secure(auth.secure_cookie)
        .finish();
    cookie.make_removal();
    cookie
}

/// Records failures before they become HTTP errors. Failures of a signed-in
/// caller land in the recent-log buffer under their account; anonymous ones
/// only reach tracing.
fn logged<T>(logs: &LogBuffer, owner: Option<&str>, action: &str, result: Result<T>) -> Result<T> {
    if let Err(e) = &result {
        let level = match e {
            AppError::NotFound(_)
            | AppError::ValidationError(_)
            | AppError::ParseError(_)
            | AppError::Unauthorized(_)
            | AppError::Conflict(_) => "WARN",
            _ => "ERROR",
        };
        match owner {
            Some(uid) => add_user_log(logs, uid, level, "HttpApi", &format!("{} failed: {}", action, e)),
            None if level == "WARN" => warn!(action, error = %e, "Anonymous request failed"),
            None => error!(action, error = %e, "Anonymous request failed"),
        }
    }
    result
}

// ===== Identity =====

#[post("/auth/signup")]
async fn sign_up(
    data: web::Data<HttpState>,
    req: web::Json<SignUpInput>,
) -> Result<HttpResponse> {
    let (profile, credential) =
        logged(&data.logs, None, "Sign up", data.identity.sign_up(req.into_inner()).await)?;
    Ok(HttpResponse::Created()
        .cookie(credential_cookie(&data.auth, &credential))
        .json(profile))
}

#[post("/auth/login")]
async fn sign_in(
    data: web::Data<HttpState>,
    req: web::Json<SignInInput>,
) -> Result<HttpResponse> {
    let (profile, credential) =
        logged(&data.logs, None, "Sign in", data.identity.sign_in(req.into_inner()).await)?;
    Ok(HttpResponse::Ok()
        .cookie(credential_cookie(&data.auth, &credential))
        .json(profile))
}

#[post("/auth/logout")]
async fn sign_out(data: web::Data<HttpState>, req: HttpRequest) -> Result<HttpResponse> {
    let token = session_token(&req, &data.auth);
    logged(
        &data.logs,
        None,
        "Sign out",
        data.identity.sign_out(token.as_deref()).await,
    )?;
    Ok(HttpResponse::NoContent()
        .cookie(cleared_cookie(&data.auth))
        .finish())
}

#[get("/auth/me")]
async fn me(data: web::Data<HttpState>, req: HttpRequest) -> Result<HttpResponse> {
    let user = require_user(&req, &data).await?;
    Ok(HttpResponse::Ok().json(user))
}

#[patch("/profile")]
async fn update_profile(
    data: web::Data<HttpState>,
    req: HttpRequest,
    body: web::Json<ProfileUpdate>,
) -> Result<HttpResponse> {
    let user = require_user(&req, &data).await?;
    let profile = logged(
        &data.logs,
        Some(user.uid.as_str()),
        "Profile update",
        data.identity.update_profile(&user.uid, body.into_inner()).await,
    )?;

    if profile.tester_name() != user.tester_name() {
        logged(
            &data.logs,
            Some(user.uid.as_str()),
            "Tester rename",
            data.sessions
                .rename_tester(&profile.uid, &profile.tester_name())
                .await,
        )?;
    }
    Ok(HttpResponse::Ok().json(profile))
}

// ===== Sessions =====

#[get("/sessions")]
async fn list_sessions(data: web::Data<HttpState>, req: HttpRequest) -> Result<HttpResponse> {
    let user = require_user(&req, &data).await?;
    let sessions = logged(
        &data.logs,
        Some(user.uid.as_str()),
        "List sessions",
        data.sessions.list_sessions(&user.uid).await,
    )?;
    Ok(HttpResponse::Ok().json(sessions))
}

#[post("/sessions")]
async fn create_session(
    data: web::Data<HttpState>,
    req: HttpRequest,
    body: web::Json<NewSessionInput>,
) -> Result<HttpResponse> {
    let user = require_user(&req, &data).await?;
    let session = logged(
        &data.logs,
        Some(user.uid.as_str()),
        "Start session",
        data.sessions.start_session(&user, body.into_inner()).await,
    )?;
    add_user_log(
        &data.logs,
        &user.uid,
        "INFO",
        "HttpApi",
        &format!(
            "Session {} started on {} with {} test case(s)",
            session.id,
            session.platform_details.platform_name.label(),
            session.test_cases.len()
        ),
    );
    Ok(HttpResponse::Created().json(session))
}

#[derive(Deserialize)]
struct ImportQuery {
    delimiter: Option<String>,
}

/// Raw CSV upload (`text/csv`), answered with the parsed drafts.
#[post("/test-cases/import")]
async fn import_test_cases(
    data: web::Data<HttpState>,
    req: HttpRequest,
    query: web::Query<ImportQuery>,
    body: web::Bytes,
) -> Result<HttpResponse> {
    let user = require_user(&req, &data).await?;
    let drafts = logged(
        &data.logs,
        Some(user.uid.as_str()),
        "Import test cases",
        data.sessions
            .import_test_cases(&body, query.delimiter.as_deref()),
    )?;
    Ok(HttpResponse::Ok().json(drafts))
}

#[get("/sessions/{id}")]
async fn get_session(
    data: web::Data<HttpState>,
    req: HttpRequest,
    path: web::Path<String>,
) -> Result<HttpResponse> {
    let user = require_user(&req, &data).await?;
    let session = logged(
        &data.logs,
        Some(user.uid.as_str()),
        "Load session",
        data.sessions.get_session(&user.uid, &path).await,
    )?;
    Ok(HttpResponse::Ok().json(session))
}

#[patch("/sessions/{id}/test-cases/{case_id}")]
async fn update_test_case(
    data: web::Data<HttpState>,
    req: HttpRequest,
    path: web::Path<(String, String)>,
    body: web::Json<TestCaseUpdate>,
) -> Result<HttpResponse> {
    let user = require_user(&req, &data).await?;
    let (session_id, case_id) = path.into_inner();
    let session = logged(
        &data.logs,
        Some(user.uid.as_str()),
        "Update test case",
        data.sessions
            .update_test_case(&user.uid, &session_id, &case_id, body.into_inner())
            .await,
    )?;
    Ok(HttpResponse::Ok().json(session))
}

#[post("/sessions/{id}/complete")]
async fn complete_session(
    data: web::Data<HttpState>,
    req: HttpRequest,
    path: web::Path<String>,
) -> Result<HttpResponse> {
    let user = require_user(&req, &data).await?;
    let session = logged(
        &data.logs,
        Some(user.uid.as_str()),
        "Complete session",
        data.sessions.complete_session(&user.uid, &path).await,
    )?;
    Ok(HttpResponse::Ok().json(session))
}

#[derive(Deserialize)]
struct AbortRequest {
    #[serde(default)]
    reason: String,
}

#[post("/sessions/{id}/abort")]
async fn abort_session(
    data: web::Data<HttpState>,
    req: HttpRequest,
    path: web::Path<String>,
    body: web::Json<AbortRequest>,
) -> Result<HttpResponse> {
    let user = require_user(&req, &data).await?;
    let session = logged(
        &data.logs,
        Some(user.uid.as_str()),
        "Abort session",
        data.sessions
            .abort_session(&user.uid, &path, &body.reason)
            .await,
    )?;
    Ok(HttpResponse::Ok().json(session))
}

// ===== Dashboard =====

#[get("/dashboard")]
async fn dashboard(data: web::Data<HttpState>, req: HttpRequest) -> Result<HttpResponse> {
    let user = require_user(&req, &data).await?;
    let view = logged(
        &data.logs,
        Some(user.uid.as_str()),
        "Dashboard",
        data.sessions.dashboard(&user.uid).await,
    )?;
    Ok(HttpResponse::Ok().json(view))
}

fn sse_event(name: &str, view: &DashboardView) -> web::Bytes {
    let payload = serde_json::to_string(view).unwrap_or_else(|_| "{}".to_string());
    web::Bytes::from(format!("event: {name}\ndata: {payload}\n\n"))
}

/// One `dashboard` event per snapshot. The subscription lives inside the stream,
/// so a client disconnect drops it.
#[get("/dashboard/live")]
async fn dashboard_live(data: web::Data<HttpState>, req: HttpRequest) -> Result<HttpResponse> {
    let user = require_user(&req, &data).await?;
    let subscription = data.sessions.subscribe(&user.uid);
    debug!(
        uid = %user.uid,
        active = data.sessions.live_subscriptions(),
        "Live dashboard stream opened"
    );
    let logs = data.logs.clone();

    let stream = futures_util::stream::unfold(subscription, move |mut subscription| {
        let logs = logs.clone();
        async move {
            let event = match subscription.next_snapshot().await? {
                Ok(sessions) => sse_event("dashboard", &dashboard_view(&sessions)),
                Err(e) => {
                    add_user_log(
                        &logs,
                        subscription.owner_id(),
                        "ERROR",
                        "LiveFeed",
                        &format!(
                            "Snapshot for {} failed: {}",
                            subscription.owner_id(),
                            e
                        ),
                    );
                    sse_event("error", &DashboardView::default())
                }
            };
            Some((Ok::<_, std::convert::Infallible>(event), subscription))
        }
    });

    Ok(HttpResponse::Ok()
        .insert_header((header::CONTENT_TYPE, "text/event-stream"))
        .insert_header((header::CACHE_CONTROL, "no-cache"))
        .streaming(stream))
}

/// Process-level entries plus the caller's own.
#[get("/logs")]
async fn get_logs(data: web::Data<HttpState>, req: HttpRequest) -> Result<HttpResponse> {
    let user = require_user(&req, &data).await?;
    let logs = data
        .logs
        .lock()
        .unwrap_or_else(|poisoned| poisoned.into_inner());
    let visible: Vec<&LogEntry> = logs.iter().filter(|entry| entry.visible_to(&user.uid)).collect();
    Ok(HttpResponse::Ok().json(visible))
}
