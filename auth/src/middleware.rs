// ============================================================================
// Module: auth/src/middleware.rs
// Description: Bearer token verification, inserting a DatabaseContext
// ============================================================================

use std::sync::Arc;

use axum::extract::{Extension, Request};
use axum::http::StatusCode;
use axum::middleware::Next;
use axum::response::Response;
use invoice_shared::database::DatabaseContext;

use crate::services::AuthService;

/// Verifies the `Authorization: Bearer` header and inserts a
/// `DatabaseContext` extension so downstream handlers (in `invoice-core`,
/// `invoice-platform`) can read tenant/user/role without re-parsing the
/// token, spec §3/§6.
pub async fn auth_middleware(
    Extension(auth_service): Extension<Arc<AuthService>>,
    mut request: Request,
    next: Next,
) -> Result<Response, StatusCode> {
    let token = request
        .headers()
        .get(axum::http::header::AUTHORIZATION)
        .and_then(|header| header.to_str().ok())
        .and_then(|header| header.strip_prefix("Bearer "))
        .ok_or(StatusCode::UNAUTHORIZED)?;

    let claims = auth_service.verify_token(token).map_err(|_| StatusCode::UNAUTHORIZED)?;

    let ctx = DatabaseContext::new(claims.tenant.clone())
        .with_user(claims.sub.to_string())
        .with_role(claims.role.clone());
    request.extensions_mut().insert(ctx);
    request.extensions_mut().insert(claims);

    Ok(next.run(request).await)
}
