// ============================================================================
// Module: auth/src/models.rs
// Description: Login principal and JWT claim shapes, spec §6 auth endpoints
// ============================================================================

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;

/// A login principal. The tenant a user belongs to is the `tenant` column
/// itself (spec §3: "Tenant (__username__)") — there is no separate tenant
/// table, so `username` and `tenant` coincide for every row sqlx returns.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct User {
    pub id: Uuid,
    pub tenant: String,
    pub username: String,
    #[serde(skip_serializing)]
    pub password_hash: String,
    pub role: String,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
}

impl User {
    pub fn to_response(&self) -> UserResponse {
        UserResponse {
            id: self.id,
            tenant: self.tenant.clone(),
            username: self.username.clone(),
            role: self.role.clone(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserResponse {
    pub id: Uuid,
    pub tenant: String,
    pub username: String,
    pub role: String,
}

#[derive(Debug, Deserialize, Validate)]
pub struct LoginRequest {
    #[validate(length(min = 1, message = "username is required"))]
    pub username: String,
    #[validate(length(min = 1, message = "password is required"))]
    pub password: String,
}

#[derive(Debug, Serialize)]
pub struct LoginResponse {
    pub access_token: String,
    pub token_type: String,
    pub user: UserResponse,
}

/// Claims carried on the access token and reconstructed on every protected
/// request into a `DatabaseContext` (see `invoice_shared::database`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub sub: Uuid,
    pub tenant: String,
    pub role: String,
    pub iat: i64,
    pub exp: i64,
    pub iss: String,
}
