use actix_web::{
    dev::{forward_ready, Service, ServiceRequest, ServiceResponse, Transform},
    http::header::{self, HeaderMap},
    web, Error, HttpMessage,
};
use futures::future::{ready, LocalBoxFuture, Ready};
use log::{debug, error, info};
use std::rc::Rc;

use crate::auth::claims::{Role, TokenClass};
use crate::auth::extractors::BearerToken;
use crate::auth::session::SessionManager;
use crate::error::AppError;

/// Paths under `/api` reachable without an access token.
const PUBLIC_PATHS: [&str; 5] = [
    "/api/auth/login",
    "/api/auth/register",
    "/api/auth/refresh",
    "/api/auth/forgot-password",
    "/api/auth/reset-password",
];

/// Pulls `<token>` out of `Authorization: Bearer <token>`.
pub fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|token| !token.is_empty())
}

/// Authenticates every non-public request with the [`SessionManager`] found in
/// app data and stores the verified claims and raw token in request
/// extensions.
pub struct AuthMiddleware;

impl<S, B> Transform<S, ServiceRequest> for AuthMiddleware
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error> + 'static,
    S::Future: 'static,
    B: 'static,
{
    type Response = ServiceResponse<B>;
    type Error = Error;
    type Transform = AuthMiddlewareService<S>;
    type InitError = ();
    type Future = Ready<Result<Self::Transform, Self::InitError>>;

    fn new_transform(&self, service: S) -> Self::Future {
        ready(Ok(AuthMiddlewareService {
            service: Rc::new(service),
        }))
    }
}

pub struct AuthMiddlewareService<S> {
    service: Rc<S>,
}

impl<S, B> Service<ServiceRequest> for AuthMiddlewareService<S>
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error> + 'static,
    S::Future: 'static,
    B: 'static,
{
    type Response = ServiceResponse<B>;
    type Error = Error;
    type Future = LocalBoxFuture<'static, Result<Self::Response, Self::Error>>;

    forward_ready!(service);

    fn call(&self, req: ServiceRequest) -> Self::Future {
        let service = Rc::clone(&self.service);

        if PUBLIC_PATHS.iter().any(|p| req.path() == *p) {
            return Box::pin(async move { service.call(req).await });
        }

        Box::pin(async move {
            let sessions = req
                .app_data::<web::Data<SessionManager>>()
                .cloned()
                .ok_or_else(|| {
                    error!("SessionManager missing from app data");
                    AppError::InternalServerError("Authentication is not configured".into())
                })?;

            let token = bearer_token(req.headers())
                .map(str::to_string)
                .ok_or_else(|| {
                    debug!("No bearer token on {}", req.path());
                    AppError::invalid_token()
                })?;

            let claims = sessions
                .authenticate(&token, TokenClass::Access)
                .await
                .map_err(AppError::from)?;

            // Reset tokens are only accepted by the public reset endpoint.
            if claims.has_role(Role::Reset) {
                info!("Reset token for {} presented on {}", claims.sub, req.path());
                return Err(AppError::invalid_token().into());
            }

            req.extensions_mut().insert(claims);
            req.extensions_mut().insert(BearerToken(token));
            service.call(req).await
        })
    }
}
