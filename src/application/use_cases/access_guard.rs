use once_cell::sync::Lazy;
use regex::Regex;
use serde::Serialize;

pub const LANDING_PATH: &str = "/";
pub const LOGIN_PATH: &str = "/login";
pub const SIGNUP_PATH: &str = "/signup";
pub const DASHBOARD_PATH: &str = "/dashboard";

const PUBLIC_PATHS: [&str; 2] = [LOGIN_PATH, SIGNUP_PATH];

/// Static assets, image optimization output and the well-known public files.
/// Requests matching this never reach the guard.
static EXCLUDED_PATH_PATTERN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^/(?:static/|_image/|logo\.svg|manifest\.json|sw\.js|favicon\.ico)")
        .expect("guard exclusion pattern is valid")
});

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum RouteClass {
    Landing,
    Public,
    Protected,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum GuardDecision {
    Allow,
    RedirectToLogin,
    RedirectToDashboard,
}

impl GuardDecision {
    pub fn redirect_target(&self) -> Option<&'static str> {
        match self {
            GuardDecision::Allow => None,
            GuardDecision::RedirectToLogin => Some(LOGIN_PATH),
            GuardDecision::RedirectToDashboard => Some(DASHBOARD_PATH),
        }
    }
}

pub fn is_excluded(path: &str) -> bool {
    EXCLUDED_PATH_PATTERN.is_match(path)
}

pub fn classify(path: &str) -> RouteClass {
    if path == LANDING_PATH {
        RouteClass::Landing
    } else if PUBLIC_PATHS.contains(&path) {
        RouteClass::Public
    } else {
        RouteClass::Protected
    }
}

/// Per-navigation decision. Only credential presence is consulted, never its validity.
pub fn decide(path: &str, credential_present: bool) -> GuardDecision {
    match (classify(path), credential_present) {
        (RouteClass::Landing, _) => GuardDecision::Allow,
        (RouteClass::Public, true) => GuardDecision::RedirectToDashboard,
        (RouteClass::Protected, false) => GuardDecision::RedirectToLogin,
        _ => GuardDecision::Allow,
    }
}

/// Blank or missing cookie values count as no credential.
pub fn credential_present(raw_value: Option<&str>) -> bool {
    raw_value.map(|value| !value.trim().is_empty()).unwrap_or(false)
}
