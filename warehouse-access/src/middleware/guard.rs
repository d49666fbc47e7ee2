//! Route guards built on [`AccessControl`].
//!
//! The authentication layer in front of this service puts a [`Caller`] into
//! the request extensions. These guards only read it; a request without one
//! is rejected as unauthenticated.

use service_core::{
    axum::{
        extract::{FromRequestParts, RawPathParams, Request, State},
        http::request::Parts,
        middleware::Next,
        response::Response,
    },
    error::AppError,
    middleware::tracing::REQUEST_ID_HEADER,
};

use crate::models::{Caller, RequestContext, ResourceType, Role};
use crate::services::{AccessControl, AccessError};

/// Extractor for the authenticated caller.
#[derive(Debug, Clone)]
pub struct CurrentCaller(pub Caller);

#[axum::async_trait]
impl<S> FromRequestParts<S> for CurrentCaller
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<Caller>()
            .cloned()
            .map(CurrentCaller)
            .ok_or_else(|| AccessError::Unauthenticated.into())
    }
}

/// Which resource a route serves and which path parameter carries its id.
#[derive(Debug, Clone)]
pub struct ResourceGuard {
    pub resource_type: ResourceType,
    pub id_param: &'static str,
}

impl ResourceGuard {
    pub fn new(resource_type: ResourceType, id_param: &'static str) -> Self {
        Self {
            resource_type,
            id_param,
        }
    }

    pub fn project(id_param: &'static str) -> Self {
        Self::new(ResourceType::Project, id_param)
    }

    pub fn customer(id_param: &'static str) -> Self {
        Self::new(ResourceType::Customer, id_param)
    }
}

/// Middleware to require one of `allowed_roles`.
pub async fn require_roles(
    allowed_roles: Vec<Role>,
    req: Request,
    next: Next,
) -> Result<Response, AppError> {
    AccessControl::require_role(req.extensions().get::<Caller>(), &allowed_roles)?;
    Ok(next.run(req).await)
}

/// Middleware to require a named permission.
pub async fn require_permission(
    permission: &'static str,
    req: Request,
    next: Next,
) -> Result<Response, AppError> {
    AccessControl::require_permission(req.extensions().get::<Caller>(), permission)?;
    Ok(next.run(req).await)
}

/// Middleware to gate a route on per-resource access.
///
/// Must be attached with `route_layer` (or on the method router) so the path
/// parameters are already matched. Denials are audited by [`AccessControl`].
pub async fn require_resource_access(
    State(access): State<AccessControl>,
    guard: ResourceGuard,
    req: Request,
    next: Next,
) -> Result<Response, AppError> {
    let (mut parts, body) = req.into_parts();

    let resource_id = match RawPathParams::from_request_parts(&mut parts, &()).await {
        Ok(params) => match params.iter().find(|(name, _)| *name == guard.id_param) {
            Some((_, raw)) => Some(
                raw.parse::<i64>()
                    .map_err(|_| AppError::from(AccessError::MissingResourceId))?,
            ),
            None => None,
        },
        Err(_) => None,
    };

    let caller = parts.extensions.get::<Caller>().cloned();
    let context = request_context(&parts);

    let reason = access
        .authorize_resource(
            caller.as_ref(),
            &guard.resource_type,
            resource_id,
            &context,
        )
        .await?;

    let mut req = Request::from_parts(parts, body);
    req.extensions_mut().insert(reason);
    Ok(next.run(req).await)
}

fn request_context(parts: &Parts) -> RequestContext {
    let header = |name: &str| {
        parts
            .headers
            .get(name)
            .and_then(|v| v.to_str().ok())
            .map(|v| v.to_string())
    };

    let mut context = RequestContext::new(parts.method.as_str(), parts.uri.path());
    // First hop of x-forwarded-for is the client.
    context.ip_address = header("x-forwarded-for")
        .and_then(|v| v.split(',').next().map(|ip| ip.trim().to_string()))
        .filter(|ip| !ip.is_empty());
    context.request_id = header(REQUEST_ID_HEADER);
    context
}
