use super::jwt::JwtService;
use actix_web::{
    dev::{forward_ready, Service, ServiceRequest, ServiceResponse, Transform},
    Error, HttpMessage, HttpResponse,
};
use actix_web::{FromRequest, HttpRequest};
use futures::future::{ok, ready, Ready};
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use uuid::Uuid;

use crate::error::AppError;

/// Verifies bearer tokens when present. Requests without an
/// `Authorization` header pass through anonymously; handlers decide with
/// [`AuthenticatedFarmer`] or [`MaybeFarmer`] whether identity is needed.
/// A header that is present but invalid is rejected with 401.
#[derive(Clone)]
pub struct AuthMiddleware {
    jwt_service: Arc<JwtService>,
}

impl AuthMiddleware {
    pub fn new(jwt_service: JwtService) -> Self {
        Self {
            jwt_service: Arc::new(jwt_service),
        }
    }
}

impl<S, B> Transform<S, ServiceRequest> for AuthMiddleware
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error> + 'static,
    S::Future: 'static,
    B: 'static,
{
    type Response = ServiceResponse<actix_web::body::EitherBody<B>>;
    type Error = Error;
    type Transform = AuthMiddlewareService<S>;
    type InitError = ();
    type Future = Ready<Result<Self::Transform, Self::InitError>>;

    fn new_transform(&self, service: S) -> Self::Future {
        ok(AuthMiddlewareService {
            service: Arc::new(service),
            jwt_service: self.jwt_service.clone(),
        })
    }
}

pub struct AuthMiddlewareService<S> {
    service: Arc<S>,
    jwt_service: Arc<JwtService>,
}

#[derive(Debug)]
enum AuthError {
    InvalidHeaderFormat,
    NotBearerToken,
    VerificationFailed(String),
    InvalidUuidInClaims(String),
}

impl AuthError {
    fn log_message(&self, path: &str) -> String {
        match self {
            AuthError::InvalidHeaderFormat => {
                format!("Invalid Authorization header format (non-UTF-8) for path: {}", path)
            }
            AuthError::NotBearerToken => {
                format!("Authorization header for path {} doesn't start with 'Bearer '", path)
            }
            AuthError::VerificationFailed(e) => {
                format!("JWT token verification failed for path {}: {}", path, e)
            }
            AuthError::InvalidUuidInClaims(sub) => {
                format!("Invalid UUID in JWT claims.sub for path {}: {}", path, sub)
            }
        }
    }

    fn client_error_json(&self) -> serde_json::Value {
        let message = match self {
            AuthError::InvalidUuidInClaims(_) => "Invalid token claims",
            AuthError::VerificationFailed(_) => "Token verification failed",
            _ => "Invalid authorization header",
        };
        serde_json::json!({ "success": false, "message": message })
    }
}

/// `Ok(None)` when the request carries no `Authorization` header.
fn validate_request_token(
    req: &ServiceRequest,
    jwt_service: &JwtService,
) -> Result<Option<Uuid>, AuthError> {
    let Some(auth_header) = req.headers().get("Authorization") else {
        return Ok(None);
    };
    let auth_str = auth_header
        .to_str()
        .map_err(|_| AuthError::InvalidHeaderFormat)?;
    let token = auth_str
        .strip_prefix("Bearer ")
        .ok_or(AuthError::NotBearerToken)?;

    let claims = jwt_service
        .verify_token(token.trim())
        .map_err(|e| AuthError::VerificationFailed(e.to_string()))?;

    log::debug!("JWT token verified for farmer: {}", claims.sub);
    Uuid::parse_str(&claims.sub)
        .map(Some)
        .map_err(|_| AuthError::InvalidUuidInClaims(claims.sub.clone()))
}

impl<S, B> Service<ServiceRequest> for AuthMiddlewareService<S>
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error> + 'static,
    S::Future: 'static,
    B: 'static,
{
    type Response = ServiceResponse<actix_web::body::EitherBody<B>>;
    type Error = Error;
    type Future = Pin<Box<dyn Future<Output = Result<Self::Response, Self::Error>>>>;

    forward_ready!(service);

    fn call(&self, req: ServiceRequest) -> Self::Future {
        let service = self.service.clone();
        let jwt_service = self.jwt_service.clone();

        Box::pin(async move {
            let path_str = req.path().to_string();

            if path_str.starts_with("/media/") {
                let res = service.call(req).await?;
                return Ok(res.map_into_left_body());
            }

            match validate_request_token(&req, &jwt_service) {
                Ok(farmer_id) => {
                    if let Some(farmer_id) = farmer_id {
                        req.extensions_mut().insert(farmer_id);
                    }
                    let res = service.call(req).await?;
                    Ok(res.map_into_left_body())
                }
                Err(auth_error) => {
                    log::warn!("{}", auth_error.log_message(&path_str));

                    let (http_req, _payload) = req.into_parts();
                    let response = HttpResponse::Unauthorized()
                        .json(auth_error.client_error_json())
                        .map_into_right_body();
                    Ok(ServiceResponse::new(http_req, response))
                }
            }
        })
    }
}

/// Farmer id of a request that must be authenticated.
pub struct AuthenticatedFarmer(pub Uuid);

impl FromRequest for AuthenticatedFarmer {
    type Error = AppError;
    type Future = Ready<Result<Self, Self::Error>>;

    fn from_request(req: &HttpRequest, _payload: &mut actix_web::dev::Payload) -> Self::Future {
        let farmer_id = req.extensions().get::<Uuid>().copied();
        ready(match farmer_id {
            Some(id) => Ok(AuthenticatedFarmer(id)),
            None => {
                log::debug!("No authenticated farmer for path: {}", req.path());
                Err(AppError::Unauthorized(
                    "Authentication credentials were not provided".into(),
                ))
            }
        })
    }
}

/// Farmer id when the request was authenticated, `None` for anonymous
/// requests.
pub struct MaybeFarmer(pub Option<Uuid>);

impl FromRequest for MaybeFarmer {
    type Error = actix_web::Error;
    type Future = Ready<Result<Self, Self::Error>>;

    fn from_request(req: &HttpRequest, _payload: &mut actix_web::dev::Payload) -> Self::Future {
        ok(MaybeFarmer(req.extensions().get::<Uuid>().copied()))
    }
}
