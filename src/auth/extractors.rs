use actix_web::dev::Payload;
use actix_web::{Error as ActixError, FromRequest, HttpMessage, HttpRequest};
use log::error;
use std::future::{ready, Ready};

use crate::auth::claims::Claims;
use crate::error::AppError;

/// The raw access token of the current request, stored next to its claims
/// so handlers such as logout can revoke it.
#[derive(Debug, Clone)]
pub struct BearerToken(pub String);

/// Verified claims and raw token of the caller.
///
/// Only populated on routes behind `AuthMiddleware`. If the middleware did not
/// run, extraction fails with `401 Unauthorized`.
#[derive(Debug, Clone)]
pub struct AuthenticatedUser {
    pub claims: Claims,
    pub token: String,
}

impl FromRequest for AuthenticatedUser {
    type Error = ActixError; // AppError will be converted into ActixError via ResponseError
    type Future = Ready<Result<Self, Self::Error>>;

    fn from_request(req: &HttpRequest, _payload: &mut Payload) -> Self::Future {
        let extensions = req.extensions();
        match (extensions.get::<Claims>(), extensions.get::<BearerToken>()) {
            (Some(claims), Some(BearerToken(token))) => ready(Ok(AuthenticatedUser {
                claims: claims.clone(),
                token: token.clone(),
            })),
            _ => {
                error!(
                    "No verified claims on {}; is AuthMiddleware wrapping this route?",
                    req.path()
                );
                ready(Err(AppError::invalid_token().into()))
            }
        }
    }
}
