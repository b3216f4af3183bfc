use crate::{
    auth::{
        hash_password, require_role, verify_password, AccessTokenResponse, AuthenticatedUser,
        ForgotPasswordRequest, ForgotPasswordResponse, LoginRequest, RefreshRequest,
        RegisterRequest, ResetPasswordRequest, Role, SessionManager, TokenClass,
    },
    auth::session::BEARER,
    directory::UserDirectory,
    error::AppError,
    models::{NewUser, User},
};
use actix_web::{post, web, HttpResponse, Responder};
use log::{info, warn};
use serde_json::json;
use validator::Validate;

fn role_of(user: &User) -> Result<Role, AppError> {
    user.role().ok_or_else(|| {
        warn!("User {} has unknown role {:?}", user.username, user.role);
        AppError::InternalServerError("User record has an unknown role".into())
    })
}

/// Register a new user
///
/// Creates a new account with the `user` role.
#[post("/register")]
pub async fn register(
    directory: web::Data<dyn UserDirectory>,
    register_data: web::Json<RegisterRequest>,
) -> Result<impl Responder, AppError> {
    register_data.validate()?;

    let hashed_password = hash_password(&register_data.password)?;
    let register_data = register_data.into_inner();
    let user = directory
        .create(NewUser {
            username: register_data.username,
            email: register_data.email,
            role: Role::User,
            hashed_password,
        })
        .await?;

    info!("Registered user {} (id {})", user.username, user.id);
    Ok(HttpResponse::Created().json(user))
}

/// Login user
///
/// Returns an access/refresh token pair and remembers the refresh token on the
/// user record.
#[post("/login")]
pub async fn login(
    sessions: web::Data<SessionManager>,
    directory: web::Data<dyn UserDirectory>,
    login_data: web::Json<LoginRequest>,
) -> Result<impl Responder, AppError> {
    login_data.validate()?;

    let user = match directory.find_by_username(&login_data.username).await? {
        Some(user) if verify_password(&login_data.password, &user.hashed_password)? => user,
        _ => return Err(AppError::Unauthorized("Invalid credentials".into())),
    };

    let tokens = sessions
        .issue_pair(&user.username, role_of(&user)?, Some(user.id))
        .await?;
    directory
        .set_refresh_token(user.id, Some(&tokens.refresh_token))
        .await?;

    info!("User {} logged in", user.username);
    Ok(HttpResponse::Ok().json(tokens))
}

/// Exchange a refresh token for a new access token.
///
/// The refresh token must be the one last handed out to its user at login.
#[post("/refresh")]
pub async fn refresh(
    sessions: web::Data<SessionManager>,
    directory: web::Data<dyn UserDirectory>,
    refresh_data: web::Json<RefreshRequest>,
) -> Result<impl Responder, AppError> {
    refresh_data.validate()?;

    let claims = sessions
        .authenticate(&refresh_data.refresh_token, TokenClass::Refresh)
        .await?;

    let user = directory
        .find_by_refresh_token(&refresh_data.refresh_token)
        .await?
        .filter(|user| user.username == claims.sub)
        .ok_or_else(|| {
            info!("Refresh token for {} is not the current one", claims.sub);
            AppError::invalid_token()
        })?;

    let access_token = sessions
        .issue_access_token(&user.username, role_of(&user)?, Some(user.id))
        .await?;

    Ok(HttpResponse::Ok().json(AccessTokenResponse {
        access_token,
        token_type: BEARER.to_string(),
    }))
}

/// Revoke the caller's access token and their current refresh token.
///
/// The stored refresh token is cleared first, which already retires it for
/// `/refresh`, and the access token is revoked last. A failure part way
/// therefore leaves the caller able to retry with the same access token.
#[post("/logout")]
pub async fn logout(
    sessions: web::Data<SessionManager>,
    directory: web::Data<dyn UserDirectory>,
    user: AuthenticatedUser,
) -> Result<impl Responder, AppError> {
    if let Some(record) = directory.find_by_username(&user.claims.sub).await? {
        if let Some(refresh_token) = record.refresh_token.as_deref() {
            directory.set_refresh_token(record.id, None).await?;
            sessions.revoke(refresh_token, TokenClass::Refresh).await?;
        }
    }

    sessions.revoke(&user.token, TokenClass::Access).await?;

    info!("User {} logged out", user.claims.sub);
    Ok(HttpResponse::Ok().json(json!({ "message": "Successfully logged out" })))
}

/// Issue a password-reset token for the account with the given email.
///
/// The token is returned in the response body.
#[post("/forgot-password")]
pub async fn forgot_password(
    sessions: web::Data<SessionManager>,
    directory: web::Data<dyn UserDirectory>,
    request: web::Json<ForgotPasswordRequest>,
) -> Result<impl Responder, AppError> {
    request.validate()?;

    let user = directory
        .find_by_email(&request.email)
        .await?
        .ok_or_else(|| AppError::NotFound("User not found".into()))?;

    let token = sessions.issue_reset_token(&user.email).await?;
    info!("Issued password reset token for user {}", user.username);

    Ok(HttpResponse::Ok().json(ForgotPasswordResponse {
        message: "Password reset token generated".to_string(),
        token,
    }))
}

/// Set a new password using a reset token. The token is single use.
#[post("/reset-password")]
pub async fn reset_password(
    sessions: web::Data<SessionManager>,
    directory: web::Data<dyn UserDirectory>,
    request: web::Json<ResetPasswordRequest>,
) -> Result<impl Responder, AppError> {
    request.validate()?;

    let claims = sessions
        .authenticate(&request.token, TokenClass::Access)
        .await?;
    require_role(&claims, Role::Reset)?;

    let user = directory
        .find_by_email(&claims.sub)
        .await?
        .ok_or_else(|| AppError::NotFound("User not found".into()))?;

    let hashed_password = hash_password(&request.new_password)?;
    directory.set_password_hash(user.id, &hashed_password).await?;
    sessions.revoke(&request.token, TokenClass::Access).await?;

    info!("Password reset for user {}", user.username);
    Ok(HttpResponse::Ok().json(json!({ "message": "Password has been reset" })))
}
