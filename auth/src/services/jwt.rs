// ============================================================================
// Module: auth/src/services/jwt.rs
// Description: Access token issuance and verification, spec §6
// ============================================================================

use invoice_shared::error::{Error, Result};
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use uuid::Uuid;

use crate::models::Claims;

/// Stateless access-token service. There is no refresh token or session
/// table in this system's scope — a token is valid until it expires.
#[derive(Clone)]
pub struct JwtService {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    algorithm: Algorithm,
    issuer: String,
    expire_minutes: i64,
    leeway: i64,
}

impl JwtService {
    pub fn new(secret: &str, issuer: &str, algorithm: &str, expire_minutes: i64, leeway: i64) -> Result<Self> {
        if secret.len() < 32 {
            return Err(Error::Internal("jwt secret must be at least 32 bytes".to_string()));
        }
        let algorithm = match algorithm {
            "HS384" => Algorithm::HS384,
            "HS512" => Algorithm::HS512,
            _ => Algorithm::HS256,
        };
        Ok(Self {
            encoding_key: EncodingKey::from_secret(secret.as_bytes()),
            decoding_key: DecodingKey::from_secret(secret.as_bytes()),
            algorithm,
            issuer: issuer.to_string(),
            expire_minutes,
            leeway,
        })
    }

    pub fn issue(&self, user_id: Uuid, tenant: &str, role: &str) -> Result<String> {
        let now = chrono::Utc::now().timestamp();
        let claims = Claims {
            sub: user_id,
            tenant: tenant.to_string(),
            role: role.to_string(),
            iat: now,
            exp: now + self.expire_minutes * 60,
            iss: self.issuer.clone(),
        };
        encode(&Header::new(self.algorithm), &claims, &self.encoding_key).map_err(Error::Jwt)
    }

    pub fn verify(&self, token: &str) -> Result<Claims> {
        let mut validation = Validation::new(self.algorithm);
        validation.set_issuer(&[&self.issuer]);
        validation.leeway = self.leeway.max(0) as u64;
        let data = decode::<Claims>(token, &self.decoding_key, &validation).map_err(Error::Jwt)?;
        Ok(data.claims)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn service() -> JwtService {
        JwtService::new("a-secret-at-least-32-bytes-long!!", "invoice-platform", "HS256", 60, 30).unwrap()
    }

    #[test]
    fn short_secret_is_rejected() {
        assert!(JwtService::new("short", "invoice-platform", "HS256", 60, 0).is_err());
    }

    #[test]
    fn issued_token_verifies_back_to_the_same_claims() {
        let svc = service();
        let user_id = Uuid::new_v4();
        let token = svc.issue(user_id, "acme", "member").unwrap();
        let claims = svc.verify(&token).unwrap();
        assert_eq!(claims.sub, user_id);
        assert_eq!(claims.tenant, "acme");
        assert_eq!(claims.role, "member");
    }

    #[test]
    fn tampered_token_fails_verification() {
        let svc = service();
        let token = svc.issue(Uuid::new_v4(), "acme", "member").unwrap();
        let mut tampered = token.clone();
        tampered.push('x');
        assert!(svc.verify(&tampered).is_err());
    }
}
