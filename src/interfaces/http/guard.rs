use super::HttpState;
use crate::application::use_cases::access_guard::{credential_present, decide, is_excluded};
use actix_web::body::MessageBody;
use actix_web::dev::{ServiceRequest, ServiceResponse};
use actix_web::http::header;
use actix_web::middleware::Next;
use actix_web::{web, HttpResponse};
use tracing::debug;

/// Applies the page access decision ahead of every page route.
pub async fn page_guard(
    req: ServiceRequest,
    next: Next<impl MessageBody + 'static>,
) -> Result<ServiceResponse<impl MessageBody>, actix_web::Error> {
    if is_excluded(req.path()) {
        return next.call(req).await.map(ServiceResponse::map_into_left_body);
    }

    // Without state there is no cookie name to look for; treat as signed out.
    let present = req
        .app_data::<web::Data<HttpState>>()
        .and_then(|state| req.cookie(&state.auth.cookie_name))
        .map(|cookie| credential_present(Some(cookie.value())))
        .unwrap_or(false);

    if let Some(target) = decide(req.path(), present).redirect_target() {
        debug!(path = %req.path(), location = target, "Guard redirect");
        let response = HttpResponse::Found()
            .insert_header((header::LOCATION, target))
            .finish();
        return Ok(req.into_response(response).map_into_right_body());
    }

    next.call(req).await.map(ServiceResponse::map_into_left_body)
}
