use super::{ClientError, FhirClient, SearchParams, FHIR_JSON};
use async_trait::async_trait;
use carelink_models::Bundle;
use reqwest::{header, Method, RequestBuilder};
use serde_json::Value as JsonValue;
use std::time::Duration;
use url::Url;

/// [`FhirClient`] over the FHIR RESTful API using `application/fhir+json`.
#[derive(Clone)]
pub struct HttpFhirClient {
    base_url: Url,
    http: reqwest::Client,
}

impl HttpFhirClient {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self, ClientError> {
        let mut base_url =
            Url::parse(base_url).map_err(|e| ClientError::InvalidUrl(format!("{base_url}: {e}")))?;
        // `Url::join` replaces the last path segment unless the base ends with a slash.
        if !base_url.path().ends_with('/') {
            let path = format!("{}/", base_url.path());
            base_url.set_path(&path);
        }

        let http = reqwest::Client::builder().timeout(timeout).build()?;

        Ok(Self { base_url, http })
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    fn endpoint(&self, path: &str) -> Result<Url, ClientError> {
        self.base_url
            .join(path)
            .map_err(|e| ClientError::InvalidUrl(format!("{path}: {e}")))
    }

    fn request(&self, method: Method, url: Url) -> RequestBuilder {
        self.http
            .request(method, url)
            .header(header::ACCEPT, FHIR_JSON)
    }

    fn with_body(builder: RequestBuilder, body: &JsonValue) -> Result<RequestBuilder, ClientError> {
        let bytes = serde_json::to_vec(body).map_err(|e| ClientError::Decode(e.to_string()))?;
        Ok(builder.header(header::CONTENT_TYPE, FHIR_JSON).body(bytes))
    }

    /// Send the request and decode the JSON body; non-2xx becomes `OperationOutcome`.
    async fn execute(&self, builder: RequestBuilder) -> Result<JsonValue, ClientError> {
        let request = builder.build()?;
        let method = request.method().to_string();
        let url = request.url().to_string();

        tracing::debug!(%method, %url, "FHIR request");
        let response = self.http.execute(request).await?;
        let status = response.status();
        let body = response.bytes().await?;

        if !status.is_success() {
            let outcome = serde_json::from_slice::<JsonValue>(&body).ok();
            tracing::debug!(%method, %url, status = status.as_u16(), "FHIR request failed");
            return Err(ClientError::OperationOutcome {
                method,
                url,
                status: status.as_u16(),
                outcome,
            });
        }

        if body.is_empty() {
            return Ok(JsonValue::Null);
        }
        serde_json::from_slice(&body).map_err(|e| ClientError::Decode(format!("{url}: {e}")))
    }
}

#[async_trait]
impl FhirClient for HttpFhirClient {
    async fn read(&self, resource_type: &str, id: &str) -> Result<JsonValue, ClientError> {
        let url = self.endpoint(&format!(
            "{resource_type}/{}",
            urlencoding::encode(id)
        ))?;
        self.execute(self.request(Method::GET, url)).await
    }

    async fn search(
        &self,
        resource_type: &str,
        params: &SearchParams,
    ) -> Result<Bundle, ClientError> {
        let url = self.endpoint(resource_type)?;
        let value = self
            .execute(self.request(Method::GET, url).query(params))
            .await?;
        Bundle::from_value(&value).map_err(|e| ClientError::Decode(e.to_string()))
    }

    async fn create(&self, resource: &JsonValue) -> Result<JsonValue, ClientError> {
        let resource_type = resource
            .get("resourceType")
            .and_then(JsonValue::as_str)
            .ok_or_else(|| ClientError::Decode("resource has no resourceType".to_string()))?;
        let url = self.endpoint(resource_type)?;
        let builder = Self::with_body(self.request(Method::POST, url), resource)?;
        self.execute(builder.header("Prefer", "return=representation"))
            .await
    }

    async fn update(
        &self,
        resource_type: &str,
        id: &str,
        resource: &JsonValue,
    ) -> Result<JsonValue, ClientError> {
        let url = self.endpoint(&format!(
            "{resource_type}/{}",
            urlencoding::encode(id)
        ))?;
        let builder = Self::with_body(self.request(Method::PUT, url), resource)?;
        self.execute(builder.header("Prefer", "return=representation"))
            .await
    }

    async fn delete(&self, resource_type: &str, id: &str) -> Result<(), ClientError> {
        let url = self.endpoint(&format!(
            "{resource_type}/{}",
            urlencoding::encode(id)
        ))?;
        self.execute(self.request(Method::DELETE, url)).await?;
        Ok(())
    }

    async fn transaction(&self, bundle: &Bundle) -> Result<Bundle, ClientError> {
        let url = self.base_url.clone();
        let body = bundle
            .to_value()
            .map_err(|e| ClientError::Decode(e.to_string()))?;
        let builder = Self::with_body(self.request(Method::POST, url), &body)?;
        let value = self.execute(builder).await?;
        Bundle::from_value(&value).map_err(|e| ClientError::Decode(e.to_string()))
    }
}
