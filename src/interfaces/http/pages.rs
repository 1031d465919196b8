use actix_web::http::header;
use actix_web::{get, web, HttpResponse};

const SERVICE_WORKER: &str = include_str!("../../../resources/public/sw.js");
const MANIFEST: &str = include_str!("../../../resources/public/manifest.json");

const LANDING_SCRIPT: &str = r#"
fetch('/api/auth/me', { credentials: 'same-origin' })
  .then((res) => { window.location.replace(res.ok ? '/dashboard' : '/login'); })
  .catch(() => { window.location.replace('/login'); });
"#;

const FORM_SCRIPT: &str = r#"
const form = document.querySelector('form[data-endpoint]');
form.addEventListener('submit', async (event) => {
  event.preventDefault();
  const body = Object.fromEntries(new FormData(form).entries());
  const res = await fetch(form.dataset.endpoint, {
    method: 'POST',
    credentials: 'same-origin',
    headers: { 'Content-Type': 'application/json' },
    body: JSON.stringify(body),
  });
  if (res.ok) {
    window.location.assign('/dashboard');
  } else {
    const err = await res.json().catch(() => ({ error: res.statusText }));
    document.querySelector('[data-error]').textContent = err.error;
  }
});
"#;

const VIEW_SCRIPT: &str = r#"
const view = document.querySelector('[data-source]');
fetch(view.dataset.source, { credentials: 'same-origin' })
  .then((res) => res.json())
  .then((data) => { view.textContent = JSON.stringify(data, null, 2); });
"#;

const LIVE_SCRIPT: &str = r#"
const view = document.querySelector('[data-live]');
const events = new EventSource(view.dataset.live);
const render = (event) => { view.textContent = JSON.stringify(JSON.parse(event.data), null, 2); };
events.addEventListener('dashboard', render);
events.addEventListener('error', (event) => { if (event.data) render(event); });
"#;

pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.service(landing)
        .service(login)
        .service(signup)
        .service(dashboard)
        .service(new_session)
        .service(session_detail)
        .service(session_results)
        .service(profile);
}

fn escape_html(value: &str) -> String {
    let mut escaped = String::with_capacity(value.len());
    for c in value.chars() {
        match c {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&#39;"),
            other => escaped.push(other),
        }
    }
    escaped
}

fn shell(title: &str, body: &str, script: &str) -> HttpResponse {
    let html = format!(
        r##"<!DOCTYPE html>
<html lang="en">
<head>
<meta charset="utf-8">
<meta name="viewport" content="width=device-width, initial-scale=1">
<meta name="theme-color" content="#1b2433">
<link rel="manifest" href="/manifest.json">
<title>{title} | Zenit QA Tracker</title>
</head>
<body>
{body}
<script>
if ('serviceWorker' in navigator) {{ navigator.serviceWorker.register('/sw.js'); }}
{script}
</script>
</body>
</html>"##
    );
    HttpResponse::Ok()
        .content_type("text/html; charset=utf-8")
        .body(html)
}

fn credentials_form(endpoint: &str, heading: &str, with_name: bool) -> String {
    let name_field = if with_name {
        r#"<label>Display name <input name="displayName" required></label>"#
    } else {
        ""
    };
    format!(
        r#"<main>
<h1>{heading}</h1>
<form data-endpoint="{endpoint}">
{name_field}
<label>Email <input name="email" type="email" required></label>
<label>Password <input name="password" type="password" required></label>
<button type="submit">{heading}</button>
<p data-error role="alert"></p>
</form>
</main>"#
    )
}

fn data_view(heading: &str, source: &str) -> String {
    format!(
        r#"<main><h1>{heading}</h1><pre data-source="{}"></pre></main>"#,
        escape_html(source)
    )
}

#[get("/")]
async fn landing() -> HttpResponse {
    shell("Welcome", "<main><p>Loading...</p></main>", LANDING_SCRIPT)
}

#[get("/login")]
async fn login() -> HttpResponse {
    shell(
        "Log in",
        &credentials_form("/api/auth/login", "Log in", false),
        FORM_SCRIPT,
    )
}

#[get("/signup")]
async fn signup() -> HttpResponse {
    shell(
        "Sign up",
        &credentials_form("/api/auth/signup", "Sign up", true),
        FORM_SCRIPT,
    )
}

#[get("/dashboard")]
async fn dashboard() -> HttpResponse {
    shell(
        "Dashboard",
        r#"<main><h1>Dashboard</h1><a href="/dashboard/new-session">New session</a><pre data-live="/api/dashboard/live"></pre></main>"#,
        LIVE_SCRIPT,
    )
}

#[get("/dashboard/new-session")]
async fn new_session() -> HttpResponse {
    shell(
        "New session",
        "<main><h1>New session</h1><p>Create sessions through <code>POST /api/sessions</code>.</p></main>",
        "",
    )
}

#[get("/dashboard/session/{id}")]
async fn session_detail(path: web::Path<String>) -> HttpResponse {
    shell(
        "Session",
        &data_view("Session", &format!("/api/sessions/{}", path.as_str())),
        VIEW_SCRIPT,
    )
}

#[get("/dashboard/session/{id}/results")]
async fn session_results(path: web::Path<String>) -> HttpResponse {
    shell(
        "Results",
        &data_view("Results", &format!("/api/sessions/{}", path.as_str())),
        VIEW_SCRIPT,
    )
}

#[get("/profile")]
async fn profile() -> HttpResponse {
    shell("Profile", &data_view("Profile", "/api/auth/me"), VIEW_SCRIPT)
}

#[get("/sw.js")]
pub async fn service_worker() -> HttpResponse {
    HttpResponse::Ok()
        .content_type("application/javascript; charset=utf-8")
        .insert_header((header::CACHE_CONTROL, "no-cache"))
        .body(SERVICE_WORKER)
}

#[get("/manifest.json")]
pub async fn manifest() -> HttpResponse {
    HttpResponse::Ok()
        .content_type("application/manifest+json")
        .body(MANIFEST)
}
