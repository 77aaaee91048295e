//! Per-resource policy enforcement on the FHIR router.

use super::{CarePlanCache, PolicyAgent, PolicyError};
use crate::models::is_resource_type;
use crate::request_context::RequestContext;
use crate::state::AppState;
use crate::Error;
use axum::{
    body::{to_bytes, Body},
    extract::{Request, State},
    http::{request::Parts, Method},
    middleware::Next,
    response::{IntoResponse, Response},
};
use carelink_models::Bundle;
use serde_json::Value as JsonValue;

/// Evaluates the policy for the resource(s) a request touches.
///
/// - `GET|PUT|PATCH|DELETE /{type}/{id}`: the stored resource, before the handler runs.
///   A missing resource is left to the handler so it can answer 404.
/// - `POST /{type}`: the request body, before the handler runs.
/// - `GET /{type}`: every entry of the returned Bundle, after the handler ran. One denied
///   entry denies the whole response.
pub async fn policy_middleware(State(state): State<AppState>, req: Request, next: Next) -> Response {
    let Some(agent) = state.policy.clone() else {
        return next.run(req).await;
    };

    let (parts, body) = req.into_parts();
    let request_id = parts
        .extensions
        .get::<RequestContext>()
        .map(|ctx| ctx.request_id.clone())
        .unwrap_or_default();
    let segments: Vec<String> = parts
        .uri
        .path()
        .split('/')
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect();

    let result = match (parts.method.clone(), segments.as_slice()) {
        (Method::GET | Method::PUT | Method::PATCH | Method::DELETE, [resource_type, id])
            if is_resource_type(resource_type) =>
        {
            guard_instance(&state, &agent, parts, body, resource_type, id, next).await
        }
        (Method::POST, [resource_type]) if is_resource_type(resource_type) => {
            guard_create(&state, &agent, parts, body, resource_type, next).await
        }
        (Method::GET, [resource_type]) if is_resource_type(resource_type) => {
            guard_search(&agent, parts, body, resource_type, next).await
        }
        _ => Ok(next.run(Request::from_parts(parts, body)).await),
    };

    result.unwrap_or_else(|err| {
        tracing::debug!(request_id = %request_id, error = %err, "Policy guard rejected request");
        err.into_response()
    })
}

async fn guard_instance(
    state: &AppState,
    agent: &PolicyAgent,
    parts: Parts,
    body: Body,
    resource_type: &str,
    id: &str,
    next: Next,
) -> Result<Response, Error> {
    let preflight = agent.preflight(resource_type, Some(id), &parts)?;

    let resource = match state.client.read(resource_type, id).await {
        Ok(resource) => resource,
        Err(e) if e.is_not_found() => {
            return Ok(next.run(Request::from_parts(parts, body)).await);
        }
        Err(e) => return Err(e.into()),
    };

    let mut cache = CarePlanCache::new();
    let context = agent.prepare_context(&mut cache, &preflight, &resource).await?;
    agent.allow(&context)?;

    Ok(next.run(Request::from_parts(parts, body)).await)
}

async fn guard_create(
    state: &AppState,
    agent: &PolicyAgent,
    parts: Parts,
    body: Body,
    resource_type: &str,
    next: Next,
) -> Result<Response, Error> {
    let preflight = agent.preflight(resource_type, None, &parts)?;

    let bytes = to_bytes(body, state.config.server.max_request_body_size)
        .await
        .map_err(|e| Error::InvalidResource(format!("cannot read request body: {e}")))?;
    let resource: JsonValue = serde_json::from_slice(&bytes)
        .map_err(|e| Error::InvalidResource(format!("request body is not JSON: {e}")))?;

    let mut cache = CarePlanCache::new();
    let context = agent.prepare_context(&mut cache, &preflight, &resource).await?;
    agent.allow(&context)?;

    Ok(next.run(Request::from_parts(parts, Body::from(bytes))).await)
}

async fn guard_search(
    agent: &PolicyAgent,
    parts: Parts,
    body: Body,
    resource_type: &str,
    next: Next,
) -> Result<Response, Error> {
    let preflight = agent.preflight(resource_type, None, &parts)?;

    let response = next.run(Request::from_parts(parts, body)).await;
    if !response.status().is_success() {
        return Ok(response);
    }

    let (response_parts, response_body) = response.into_parts();
    let bytes = to_bytes(response_body, usize::MAX)
        .await
        .map_err(|e| Error::Internal(format!("cannot read search result: {e}")))?;
    let bundle = serde_json::from_slice::<JsonValue>(&bytes)
        .map_err(|e| Error::Internal(format!("search result is not JSON: {e}")))
        .and_then(|value| Bundle::from_value(&value).map_err(|e| Error::Internal(e.to_string())))?;

    let mut cache = CarePlanCache::new();
    let mut evaluated = 0usize;
    let mut denied = 0usize;
    for resource in bundle.resources() {
        let context = agent.prepare_context(&mut cache, &preflight, resource).await?;
        evaluated += 1;
        match agent.allow(&context) {
            Ok(()) => {}
            Err(PolicyError::AccessDenied) => denied += 1,
            Err(e) => return Err(e.into()),
        }
    }

    if denied > 0 {
        tracing::warn!(
            resource_type = %resource_type,
            evaluated,
            denied,
            "Search result contains denied entries, rejecting response"
        );
        return Err(PolicyError::AccessDenied.into());
    }

    tracing::debug!(
        resource_type = %resource_type,
        evaluated,
        subjects = cache.len(),
        "Search result allowed"
    );
    Ok(Response::from_parts(response_parts, Body::from(bytes)))
}
