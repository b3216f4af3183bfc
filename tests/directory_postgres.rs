//! Runs against a real Postgres. Set `TEST_DATABASE_URL` and run with
//! `cargo test -- --ignored`.

use sqlx::PgPool;
use uuid::Uuid;

use authforge::auth::Role;
use authforge::directory::{PgUserDirectory, UserDirectory};
use authforge::error::AppError;
use authforge::models::NewUser;

async fn directory() -> PgUserDirectory {
    dotenv::dotenv().ok();
    let url = std::env::var("TEST_DATABASE_URL")
        .expect("TEST_DATABASE_URL must be set for Postgres tests");
    let pool = PgPool::connect(&url)
        .await
        .expect("Failed to connect to test DB");

    sqlx::query(
        "CREATE TABLE IF NOT EXISTS users (
            id              BIGSERIAL PRIMARY KEY,
            username        TEXT NOT NULL UNIQUE,
            email           TEXT NOT NULL UNIQUE,
            role            TEXT NOT NULL DEFAULT 'user',
            hashed_password TEXT NOT NULL,
            refresh_token   TEXT,
            created_at      TIMESTAMPTZ NOT NULL DEFAULT now()
        )",
    )
    .execute(&pool)
    .await
    .expect("Failed to create users table");

    PgUserDirectory::new(pool)
}

fn new_user(username: &str) -> NewUser {
    NewUser {
        username: username.to_string(),
        email: format!("{}@example.com", username),
        role: Role::User,
        hashed_password: "hash".to_string(),
    }
}

#[ignore]
#[actix_rt::test]
async fn test_concurrent_duplicate_registrations() {
    let directory = directory().await;
    let username = format!("dup_{}", Uuid::new_v4().simple());

    let attempts = (0..8).map(|_| directory.create(new_user(&username)));
    let results = futures::future::join_all(attempts).await;

    let created = results.iter().filter(|r| r.is_ok()).count();
    assert_eq!(created, 1, "Results: {:?}", results);
    for result in results.iter().filter(|r| r.is_err()) {
        assert!(
            matches!(result, Err(AppError::BadRequest(_))),
            "Expected 400 for a duplicate, got {:?}",
            result
        );
    }
}

#[ignore]
#[actix_rt::test]
async fn test_refresh_token_round_trip() {
    let directory = directory().await;
    let username = format!("rt_{}", Uuid::new_v4().simple());
    let user = directory.create(new_user(&username)).await.unwrap();
    let token = format!("token-{}", Uuid::new_v4());

    directory
        .set_refresh_token(user.id, Some(&token))
        .await
        .unwrap();
    let found = directory.find_by_refresh_token(&token).await.unwrap();
    assert_eq!(found.map(|u| u.id), Some(user.id));

    directory.set_refresh_token(user.id, None).await.unwrap();
    assert!(directory.find_by_refresh_token(&token).await.unwrap().is_none());
}
