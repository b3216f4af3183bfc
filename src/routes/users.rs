use crate::{
    auth::{require_ownership_or_admin, require_role, AuthenticatedUser, Role},
    directory::UserDirectory,
    error::AppError,
};
use actix_web::{get, web, HttpResponse, Responder};

/// Claims of the caller's verified access token.
#[get("/me")]
pub async fn me(user: AuthenticatedUser) -> impl Responder {
    HttpResponse::Ok().json(user.claims)
}

/// List all users. Admin only.
#[get("")]
pub async fn list_users(
    directory: web::Data<dyn UserDirectory>,
    user: AuthenticatedUser,
) -> Result<impl Responder, AppError> {
    require_role(&user.claims, Role::Admin)?;

    let users = directory.list().await?;
    Ok(HttpResponse::Ok().json(users))
}

/// Get a single user. Only the user themself or an admin may read it.
#[get("/{id}")]
pub async fn get_user(
    directory: web::Data<dyn UserDirectory>,
    user: AuthenticatedUser,
    path: web::Path<i64>,
) -> Result<impl Responder, AppError> {
    let id = path.into_inner();
    require_ownership_or_admin(id, &user.claims)?;

    let record = directory
        .find_by_id(id)
        .await?
        .ok_or_else(|| AppError::NotFound("User not found".into()))?;
    Ok(HttpResponse::Ok().json(record))
}
