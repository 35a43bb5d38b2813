// gateway/src/middleware/collapse_base_path.rs
use actix_web::{
    body::EitherBody,
    dev::{forward_ready, Service, ServiceRequest, ServiceResponse, Transform},
    http::header,
    Error, HttpResponse,
};
use futures_util::future::{ready, LocalBoxFuture, Ready};

use crate::paths;

/// Redirects (301) requests whose path repeats the base path, e.g.
/// `/app/app/dashboard`, to the collapsed path so the browser bar shows the
/// path actually being served.
#[derive(Debug, Clone, Default)]
pub struct CollapseBasePath {
    base_path: String,
}

impl CollapseBasePath {
    pub fn new(base_path: impl Into<String>) -> Self {
        Self {
            base_path: base_path.into(),
        }
    }

    /// Redirect target for `path` + `query`, or `None` if nothing repeats.
    fn redirect_target(&self, path: &str, query: &str) -> Option<String> {
        let normalized = paths::normalize(path, &self.base_path);
        if normalized.len() == path.len() {
            return None;
        }
        Some(if query.is_empty() {
            normalized.to_string()
        } else {
            format!("{}?{}", normalized, query)
        })
    }
}

impl<S, B> Transform<S, ServiceRequest> for CollapseBasePath
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error> + 'static,
    S::Future: 'static,
    B: 'static,
{
    type Response = ServiceResponse<EitherBody<B>>;
    type Error = Error;
    type Transform = CollapseBasePathMiddleware<S>;
    type InitError = ();
    type Future = Ready<Result<Self::Transform, Self::InitError>>;

    fn new_transform(&self, service: S) -> Self::Future {
        ready(Ok(CollapseBasePathMiddleware {
            service,
            rule: self.clone(),
        }))
    }
}

pub struct CollapseBasePathMiddleware<S> {
    service: S,
    rule: CollapseBasePath,
}

impl<S, B> Service<ServiceRequest> for CollapseBasePathMiddleware<S>
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error> + 'static,
    S::Future: 'static,
    B: 'static,
{
    type Response = ServiceResponse<EitherBody<B>>;
    type Error = Error;
    type Future = LocalBoxFuture<'static, Result<Self::Response, Error>>;

    forward_ready!(service);

    fn call(&self, req: ServiceRequest) -> Self::Future {
        if let Some(location) = self.rule.redirect_target(req.path(), req.query_string()) {
            tracing::debug!(from = %req.path(), to = %location, "Collapsing duplicated base path");
            let response = HttpResponse::MovedPermanently()
                .insert_header((header::LOCATION, location))
                .finish()
                .map_into_right_body();
            return Box::pin(ready(Ok(req.into_response(response))));
        }

        let fut = self.service.call(req);
        Box::pin(async move { fut.await.map(ServiceResponse::map_into_left_body) })
    }
}
