use actix_web::body::{EitherBody, MessageBody};
use actix_web::dev::{ServiceRequest, ServiceResponse};
use actix_web::http::header::AUTHORIZATION;
use actix_web::middleware::Next;
use actix_web::{web, ResponseError};

use crate::config::GatewayConfig;
use crate::error::{GatewayError, Result};
use crate::server::AppState;

pub const BEARER_PREFIX: &str = "Bearer ";

/// Checks gateway secrets and the caller's bearer token, in that order. Runs
/// before routing, so unknown paths are also rejected when unauthenticated.
pub fn check_authorization(config: &GatewayConfig, header: Option<&str>) -> Result<()> {
    let access_key = config.require_access_key()?;

    let token = header
        .and_then(|value| value.strip_prefix(BEARER_PREFIX))
        .ok_or_else(|| {
            GatewayError::Authentication(
                "Missing or invalid Authorization header. Expected 'Bearer YOUR_ACCESS_KEY'."
                    .into(),
            )
        })?;
    if token != access_key {
        return Err(GatewayError::Authentication("Invalid access token.".into()));
    }

    config.require_fal_api_key()?;
    Ok(())
}

pub async fn require_bearer<B: MessageBody>(
    req: ServiceRequest,
    next: Next<B>,
) -> std::result::Result<ServiceResponse<EitherBody<B>>, actix_web::Error> {
    let verdict = match req.app_data::<web::Data<AppState>>() {
        Some(state) => {
            let header = req
                .headers()
                .get(AUTHORIZATION)
                .and_then(|value| value.to_str().ok());
            check_authorization(&state.config, header)
        }
        None => Err(GatewayError::Internal("application state is not registered".into())),
    };

    match verdict {
        Ok(()) => next.call(req).await.map(ServiceResponse::map_into_left_body),
        Err(err) => {
            log::warn!("Rejected {} {}: {}", req.method(), req.path(), err);
            let response = err.error_response();
            Ok(req.into_response(response).map_into_right_body())
        }
    }
}
