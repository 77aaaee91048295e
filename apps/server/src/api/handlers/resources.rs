//! Resource interaction handlers

use super::fhir_response;
use crate::{
    api::extractors::FhirBody,
    auth::AuthenticatedPrincipal,
    models::{is_resource_type, parse_query},
    policy::PolicyError,
    state::AppState,
    Error, Result,
};
use axum::{
    extract::{Path, RawQuery, State},
    http::StatusCode,
    response::Response,
};

fn ensure_resource_type(resource_type: &str) -> Result<()> {
    if is_resource_type(resource_type) {
        Ok(())
    } else {
        Err(Error::NotFound(format!("Unknown resource type '{resource_type}'")))
    }
}

/// `GET /fhir/{type}/{id}`
pub async fn read_resource(
    State(state): State<AppState>,
    Path((resource_type, id)): Path<(String, String)>,
) -> Result<Response> {
    ensure_resource_type(&resource_type)?;
    let resource = state.client.read(&resource_type, &id).await?;
    Ok(fhir_response(StatusCode::OK, resource))
}

/// `GET /fhir/{type}?...`
pub async fn search_resources(
    State(state): State<AppState>,
    Path(resource_type): Path<String>,
    RawQuery(query): RawQuery,
) -> Result<Response> {
    ensure_resource_type(&resource_type)?;
    let params = query.as_deref().map(parse_query).unwrap_or_default();
    let bundle = state.client.search(&resource_type, &params).await?;
    tracing::debug!(
        resource_type = %resource_type,
        entries = bundle.entries().len(),
        "Search proxied"
    );
    Ok(fhir_response(StatusCode::OK, bundle.to_value()?))
}

/// `POST /fhir/{type}`: CarePlan and Task only.
pub async fn create_resource(
    State(state): State<AppState>,
    Path(resource_type): Path<String>,
    principal: Option<AuthenticatedPrincipal>,
    FhirBody(body): FhirBody,
) -> Result<Response> {
    let committed = match resource_type.as_str() {
        "Task" => state.tasks.create(body).await?,
        "CarePlan" => {
            let AuthenticatedPrincipal(principal) =
                principal.ok_or(Error::Policy(PolicyError::NotAuthenticated))?;
            state.care_plans.create(&principal, body).await?
        }
        other => {
            return Err(Error::MethodNotAllowed(format!(
                "create is not supported for '{other}'"
            )))
        }
    };
    Ok(fhir_response(StatusCode::CREATED, committed.resource))
}

/// `PUT /fhir/{type}/{id}`: Task only.
pub async fn update_resource(
    State(state): State<AppState>,
    Path((resource_type, id)): Path<(String, String)>,
    FhirBody(body): FhirBody,
) -> Result<Response> {
    if resource_type != "Task" {
        return Err(Error::MethodNotAllowed(format!(
            "update is not supported for '{resource_type}'"
        )));
    }
    let committed = state.tasks.update(&id, body).await?;
    Ok(fhir_response(StatusCode::OK, committed.resource))
}
