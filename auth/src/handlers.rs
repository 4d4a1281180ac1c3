// ============================================================================
// Module: auth/src/handlers.rs
// Description: Auth HTTP handlers, spec §6 (login, me)
// ============================================================================

use std::sync::Arc;

use axum::extract::Extension;
use axum::response::IntoResponse;
use axum::Json;
use invoice_shared::database::DatabaseContext;
use invoice_shared::error::Error;
use validator::Validate;

use crate::models::{LoginRequest, LoginResponse};
use crate::services::AuthService;

pub async fn login(
    Extension(auth_service): Extension<Arc<AuthService>>,
    Json(request): Json<LoginRequest>,
) -> Result<impl IntoResponse, Error> {
    request.validate().map_err(|e| Error::BadRequest(e.to_string()))?;

    let (access_token, user) = auth_service.login(&request.username, &request.password).await?;
    Ok(Json(LoginResponse {
        access_token,
        token_type: "bearer".to_string(),
        user: user.to_response(),
    }))
}

pub async fn get_current_user(Extension(ctx): Extension<DatabaseContext>, Extension(auth_service): Extension<Arc<AuthService>>) -> Result<impl IntoResponse, Error> {
    let user = auth_service.get_user(&ctx.tenant).await?;
    Ok(Json(user.to_response()))
}

pub async fn health_check() -> impl IntoResponse {
    Json(serde_json::json!({ "status": "healthy", "service": "invoice-auth" }))
}
