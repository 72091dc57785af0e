/// HTTP middleware utilities for social-api
///
/// - `JwtAuthMiddleware`: resolves the bearer token to the viewer's user
///   record and stores it in request extensions
/// - `AuthenticatedUser`: extractor for that record
/// - `MetricsMiddleware`: request latency histogram plus debug timing
use crate::error::AppError;
use crate::metrics;
use crate::models::User;
use crate::services::auth::IdentityResolver;
use crate::services::projector::ViewerContext;
use actix_web::dev::{forward_ready, Service, ServiceRequest, ServiceResponse, Transform};
use actix_web::http::header::AUTHORIZATION;
use actix_web::{Error, FromRequest, HttpMessage, HttpRequest};
use futures::future::LocalBoxFuture;
use std::future::{ready, Ready};
use std::rc::Rc;
use std::sync::Arc;
use std::time::Instant;

// =====================================================================
// JWT Authentication
// =====================================================================

/// The viewer's user record, stored in request extensions after auth.
#[derive(Debug, Clone)]
pub struct AuthenticatedUser(pub User);

impl AuthenticatedUser {
    pub fn viewer(&self) -> ViewerContext {
        ViewerContext::from_user(&self.0)
    }
}

/// Actix middleware that resolves a Bearer token to the requesting user.
#[derive(Clone)]
pub struct JwtAuthMiddleware {
    resolver: Arc<IdentityResolver>,
}

impl JwtAuthMiddleware {
    pub fn new(resolver: Arc<IdentityResolver>) -> Self {
        Self { resolver }
    }
}

impl<S, B> Transform<S, ServiceRequest> for JwtAuthMiddleware
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error> + 'static,
    S::Future: 'static,
    B: 'static,
{
    type Response = ServiceResponse<B>;
    type Error = Error;
    type InitError = ();
    type Transform = JwtAuthMiddlewareService<S>;
    type Future = Ready<Result<Self::Transform, Self::InitError>>;

    fn new_transform(&self, service: S) -> Self::Future {
        ready(Ok(JwtAuthMiddlewareService {
            service: Rc::new(service),
            resolver: self.resolver.clone(),
        }))
    }
}

pub struct JwtAuthMiddlewareService<S> {
    service: Rc<S>,
    resolver: Arc<IdentityResolver>,
}

impl<S, B> Service<ServiceRequest> for JwtAuthMiddlewareService<S>
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
        let service = self.service.clone();
        let resolver = self.resolver.clone();

        Box::pin(async move {
            let header = req
                .headers()
                .get(AUTHORIZATION)
                .and_then(|h| h.to_str().ok())
                .map(str::to_owned);

            let user = match resolver.verify(header.as_deref()).await {
                Ok(user) => user,
                Err(err) => {
                    tracing::debug!(path = %req.path(), error = %err, "authentication rejected");
                    return Err(AppError::from(err).into());
                }
            };

            req.extensions_mut().insert(AuthenticatedUser(user));

            service.call(req).await
        })
    }
}

impl FromRequest for AuthenticatedUser {
    type Error = Error;
    type Future = Ready<Result<Self, Self::Error>>;

    fn from_request(req: &HttpRequest, _: &mut actix_web::dev::Payload) -> Self::Future {
        ready(
            req.extensions()
                .get::<AuthenticatedUser>()
                .cloned()
                .ok_or_else(|| AppError::Unauthorized("Authentication required".to_string()).into()),
        )
    }
}

// =====================================================================
// Metrics middleware
// =====================================================================

pub struct MetricsMiddleware;

impl<S, B> Transform<S, ServiceRequest> for MetricsMiddleware
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error> + 'static,
    S::Future: 'static,
    B: 'static,
{
    type Response = ServiceResponse<B>;
    type Error = Error;
    type InitError = ();
    type Transform = MetricsMiddlewareService<S>;
    type Future = Ready<Result<Self::Transform, Self::InitError>>;

    fn new_transform(&self, service: S) -> Self::Future {
        ready(Ok(MetricsMiddlewareService {
            service: Rc::new(service),
        }))
    }
}

pub struct MetricsMiddlewareService<S> {
    service: Rc<S>,
}

impl<S, B> Service<ServiceRequest> for MetricsMiddlewareService<S>
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
        let service = self.service.clone();
        let path = req.path().to_string();
        let method = req.method().to_string();
        let start = Instant::now();

        Box::pin(async move {
            let res = service.call(req).await;
            let elapsed = start.elapsed();

            let (route, status) = match &res {
                Ok(resp) => (
                    resp.request()
                        .match_pattern()
                        .unwrap_or_else(|| "unmatched".to_string()),
                    resp.status().as_u16(),
                ),
                Err(err) => (
                    "unmatched".to_string(),
                    err.as_response_error().status_code().as_u16(),
                ),
            };
            metrics::observe_http_request(&method, &route, status, elapsed.as_secs_f64());

            let elapsed_ms = elapsed.as_millis();
            tracing::debug!(%method, %path, %status, %elapsed_ms, "request completed");
            res
        })
    }
}
