//! Generic JSON REST adapter implementing [`PlatformClient`].
//!
//! Resources live at `{base}/{collection}` and `{base}/{collection}/{id}`
//! (`/products`, `/orders/42`). Listings accept `page`, `per_page` and
//! `updated_since` query parameters and answer either a bare JSON array or an
//! object with a `data` array. Records are JSON objects with `id` and
//! `updated_at` next to their business fields.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use serde_json::Value;
use url::Url;

use crate::entity::entity_type::EntityType;
use crate::http::{HttpMethod, HttpRequest, HttpResponse, HttpTransport};

use super::errors::{PlatformError, Result};
use super::types::{AuthProvider, EntityFilter, Page, Payload, PlatformClient, PlatformEntity};

const USER_AGENT: &str = concat!("tandem/", env!("CARGO_PKG_VERSION"));

/// REST client for one platform.
pub struct RestPlatformClient {
    name: String,
    base_url: Url,
    transport: Arc<dyn HttpTransport>,
    auth: Arc<dyn AuthProvider>,
}

impl RestPlatformClient {
    /// Create a client rooted at `base_url`.
    ///
    /// # Errors
    ///
    /// Returns [`PlatformError::Internal`] if `base_url` does not parse.
    pub fn new(
        name: impl Into<String>,
        base_url: &str,
        transport: Arc<dyn HttpTransport>,
        auth: Arc<dyn AuthProvider>,
    ) -> Result<Self> {
        let trimmed = base_url.trim_end_matches('/');
        let base_url = Url::parse(trimmed)
            .map_err(|e| PlatformError::internal(format!("invalid base URL {base_url}: {e}")))?;
        Ok(Self {
            name: name.into(),
            base_url,
            transport,
            auth,
        })
    }

    fn resource_url(&self, entity_type: EntityType, id: Option<&str>) -> Result<Url> {
        let mut url = self.base_url.clone();
        {
            let mut segments = url
                .path_segments_mut()
                .map_err(|()| PlatformError::internal("base URL cannot have a path"))?;
            segments.pop_if_empty().push(entity_type.collection());
            if let Some(id) = id {
                segments.push(id);
            }
        }
        Ok(url)
    }

    async fn send(
        &self,
        method: HttpMethod,
        url: Url,
        body: Option<&Payload>,
    ) -> Result<HttpResponse> {
        let token = self.auth.access_token().await?;
        let mut headers = vec![
            ("Authorization".to_string(), format!("Bearer {token}")),
            ("Accept".to_string(), "application/json".to_string()),
            ("User-Agent".to_string(), USER_AGENT.to_string()),
        ];
        let body = match body {
            Some(payload) => {
                headers.push(("Content-Type".to_string(), "application/json".to_string()));
                serde_json::to_vec(payload)
                    .map_err(|e| PlatformError::invalid_payload(e.to_string()))?
            }
            None => Vec::new(),
        };

        let request = HttpRequest {
            method,
            url: url.to_string(),
            headers,
            body,
        };

        tracing::debug!(
            platform = %self.name,
            method = method.as_str(),
            url = %request.url,
            "Sending request"
        );

        self.transport
            .send(request)
            .await
            .map_err(|e| PlatformError::network(e.to_string()))
    }
}

/// Map a non-2xx response onto the platform error taxonomy.
fn status_error(response: &HttpResponse) -> PlatformError {
    let retry_after = response.retry_after();
    let message = String::from_utf8_lossy(&response.body).trim().to_string();
    let message = if message.is_empty() {
        format!("HTTP {}", response.status)
    } else {
        message
    };
    PlatformError::from_status(response.status, retry_after, message)
}

fn parse_json(response: &HttpResponse) -> Result<Value> {
    serde_json::from_slice(&response.body)
        .map_err(|e| PlatformError::invalid_payload(format!("response is not JSON: {e}")))
}

/// Split a record object into envelope (`id`, `updated_at`) and business fields.
fn entity_from_value(entity_type: EntityType, value: Value) -> Result<PlatformEntity> {
    let Value::Object(mut fields) = value else {
        return Err(PlatformError::invalid_payload("record is not a JSON object"));
    };

    let id = match fields.remove("id") {
        Some(Value::String(s)) => s,
        Some(Value::Number(n)) => n.to_string(),
        _ => return Err(PlatformError::invalid_payload("record has no id")),
    };

    let updated_at = match fields.remove("updated_at") {
        Some(Value::String(s)) => DateTime::parse_from_rfc3339(&s)
            .map(|dt| dt.with_timezone(&Utc))
            .map_err(|e| {
                PlatformError::invalid_payload(format!("record {id} has bad updated_at: {e}"))
            })?,
        _ => {
            return Err(PlatformError::invalid_payload(format!(
                "record {id} has no updated_at"
            )));
        }
    };

    Ok(PlatformEntity {
        id,
        entity_type,
        updated_at,
        fields,
    })
}

#[async_trait]
impl PlatformClient for RestPlatformClient {
    fn name(&self) -> &str {
        &self.name
    }

    async fn fetch_entities(
        &self,
        entity_type: EntityType,
        filter: &EntityFilter,
        page: Page,
    ) -> Result<Vec<PlatformEntity>> {
        let mut url = self.resource_url(entity_type, None)?;
        {
            let mut query = url.query_pairs_mut();
            query.append_pair("page", &page.number.to_string());
            query.append_pair("per_page", &page.per_page.to_string());
            if let Some(since) = filter.updated_since {
                query.append_pair(
                    "updated_since",
                    &since.to_rfc3339_opts(SecondsFormat::Secs, true),
                );
            }
            for (key, value) in &filter.params {
                query.append_pair(key, value);
            }
        }

        let response = self.send(HttpMethod::Get, url, None).await?;
        if !response.is_success() {
            return Err(status_error(&response));
        }

        let items = match parse_json(&response)? {
            Value::Array(items) => items,
            Value::Object(mut envelope) => match envelope.remove("data") {
                Some(Value::Array(items)) => items,
                _ => {
                    return Err(PlatformError::invalid_payload(
                        "listing has no data array",
                    ));
                }
            },
            _ => return Err(PlatformError::invalid_payload("listing is not an array")),
        };

        items
            .into_iter()
            .map(|item| entity_from_value(entity_type, item))
            .collect()
    }

    async fn get_entity_by_id(
        &self,
        entity_type: EntityType,
        id: &str,
    ) -> Result<Option<PlatformEntity>> {
        let url = self.resource_url(entity_type, Some(id))?;
        let response = self.send(HttpMethod::Get, url, None).await?;
        if response.status == 404 {
            return Ok(None);
        }
        if !response.is_success() {
            return Err(status_error(&response));
        }
        entity_from_value(entity_type, parse_json(&response)?).map(Some)
    }

    async fn create_entity(
        &self,
        entity_type: EntityType,
        payload: &Payload,
    ) -> Result<PlatformEntity> {
        let url = self.resource_url(entity_type, None)?;
        let response = self.send(HttpMethod::Post, url, Some(payload)).await?;
        if !response.is_success() {
            return Err(status_error(&response));
        }
        entity_from_value(entity_type, parse_json(&response)?)
    }

    async fn update_entity(
        &self,
        entity_type: EntityType,
        id: &str,
        payload: &Payload,
    ) -> Result<PlatformEntity> {
        let url = self.resource_url(entity_type, Some(id))?;
        let response = self.send(HttpMethod::Put, url, Some(payload)).await?;
        if !response.is_success() {
            return Err(status_error(&response));
        }
        entity_from_value(entity_type, parse_json(&response)?)
    }
}
