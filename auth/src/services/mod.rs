// ============================================================================
// Module: auth/src/services/mod.rs
// Description: Login verification and token issuance, spec §6
// ============================================================================

pub mod jwt;
pub mod password;

use invoice_shared::error::{Error, Result};
use sqlx::PgPool;

use crate::models::{Claims, User};
use jwt::JwtService;
use password::PasswordService;

#[derive(Clone)]
pub struct AuthService {
    pool: PgPool,
    jwt: JwtService,
    password: PasswordService,
}

impl AuthService {
    pub fn new(pool: PgPool, jwt: JwtService) -> Self {
        Self { pool, jwt, password: PasswordService::new() }
    }

    /// Verifies `username`/`password` against the `users` table and issues
    /// an access token on success, spec §6 `POST /auth/login`.
    pub async fn login(&self, username: &str, password: &str) -> Result<(String, User)> {
        let user: User = sqlx::query_as("SELECT * FROM users WHERE username = $1")
            .bind(username)
            .fetch_optional(&self.pool)
            .await?
            .ok_or(Error::Unauthorized)?;

        if !user.is_active {
            return Err(Error::Forbidden("account is inactive".to_string()));
        }
        if !self.password.verify_password(password, &user.password_hash)? {
            return Err(Error::Unauthorized);
        }

        let token = self.jwt.issue(user.id, &user.tenant, &user.role)?;
        Ok((token, user))
    }

    pub fn verify_token(&self, token: &str) -> Result<Claims> {
        self.jwt.verify(token)
    }

    /// Spec §6 `GET /auth/me`: re-reads the current row so a deactivated
    /// user's token stops resolving even before it expires.
    pub async fn get_user(&self, tenant: &str) -> Result<User> {
        sqlx::query_as("SELECT * FROM users WHERE tenant = $1")
            .bind(tenant)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| Error::NotFound("user".to_string()))
    }
}
