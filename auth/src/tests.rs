// ============================================================================
// Module: auth/src/tests.rs
// Description: Login/me integration tests against a real Postgres schema
// ============================================================================

use sqlx::PgPool;
use uuid::Uuid;

use crate::services::jwt::JwtService;
use crate::services::password::PasswordService;
use crate::services::AuthService;

fn jwt() -> JwtService {
    JwtService::new("a-secret-at-least-32-bytes-long!!", "invoice-platform", "HS256", 60, 0).unwrap()
}

async fn seed_user(pool: &PgPool, tenant: &str, password_hash: &str) {
    sqlx::query("INSERT INTO users (id, tenant, username, password_hash, role) VALUES ($1, $2, $2, $3, 'member')")
        .bind(Uuid::new_v4())
        .bind(tenant)
        .bind(password_hash)
        .execute(pool)
        .await
        .unwrap();
}

#[sqlx::test(migrations = "../migrations")]
async fn login_succeeds_with_correct_password_and_fails_otherwise(pool: PgPool) {
    let hash = PasswordService::new().hash_password("Str0ng&Secure!").unwrap();
    seed_user(&pool, "acme", &hash).await;

    let service = AuthService::new(pool.clone(), jwt());

    let (token, user) = service.login("acme", "Str0ng&Secure!").await.unwrap();
    assert!(!token.is_empty());
    assert_eq!(user.tenant, "acme");

    assert!(service.login("acme", "wrong-password").await.is_err());
}

#[sqlx::test(migrations = "../migrations")]
async fn verified_token_resolves_back_to_the_same_tenant(pool: PgPool) {
    let hash = PasswordService::new().hash_password("Str0ng&Secure!").unwrap();
    seed_user(&pool, "acme", &hash).await;

    let service = AuthService::new(pool.clone(), jwt());
    let (token, _user) = service.login("acme", "Str0ng&Secure!").await.unwrap();

    let claims = service.verify_token(&token).unwrap();
    assert_eq!(claims.tenant, "acme");

    let fetched = service.get_user(&claims.tenant).await.unwrap();
    assert_eq!(fetched.username, "acme");
}
