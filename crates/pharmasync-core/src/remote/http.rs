//! Remote store over a JSON document API.
//!
//! Layout: `GET {base}/{collection}` lists documents, and
//! `PUT|PATCH|DELETE {base}/{collection}/{id}` create-or-replace, merge and
//! delete one document. A 404 on delete counts as success.

use reqwest::{Method, RequestBuilder, Response, StatusCode, Url};
use serde::{Deserialize, Serialize};

use super::{RemoteDocument, RemoteStore};
use crate::config::SyncConfig;
use crate::models::Fields;
use crate::util::{compact_text, is_http_url, normalize_text_option};
use crate::{Error, Result};

#[derive(Clone)]
pub struct HttpRemoteStore {
    base_url: Url,
    auth_token: Option<String>,
    client: reqwest::Client,
}

impl std::fmt::Debug for HttpRemoteStore {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        formatter
            .debug_struct("HttpRemoteStore")
            .field("base_url", &self.base_url.as_str())
            .field("auth_token", &self.auth_token.as_ref().map(|_| "[REDACTED]"))
            .finish_non_exhaustive()
    }
}

impl HttpRemoteStore {
    pub fn new(base_url: impl Into<String>, auth_token: Option<String>) -> Result<Self> {
        Ok(Self {
            base_url: normalize_endpoint(base_url.into())?,
            auth_token: normalize_text_option(auth_token),
            client: reqwest::Client::builder().build()?,
        })
    }

    /// Build a store from sync settings; `None` when no remote is configured.
    pub fn from_config(config: &SyncConfig) -> Result<Option<Self>> {
        config
            .remote_url
            .as_ref()
            .map(|url| Self::new(url.clone(), config.auth_token.clone()))
            .transpose()
    }

    fn url(&self, segments: &[&str]) -> Result<Url> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|()| {
                Error::InvalidInput(format!("remote URL cannot be a base: {}", self.base_url))
            })?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    fn request(&self, method: Method, url: Url) -> RequestBuilder {
        let builder = self
            .client
            .request(method, url)
            .header("Accept", "application/json");
        match &self.auth_token {
            Some(token) => builder.bearer_auth(token),
            None => builder,
        }
    }
}

/// Accepts a bare array or an object wrapping it.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum ListResponse {
    Documents(Vec<RemoteDocument>),
    Wrapped { documents: Vec<RemoteDocument> },
}

impl From<ListResponse> for Vec<RemoteDocument> {
    fn from(value: ListResponse) -> Self {
        match value {
            ListResponse::Documents(documents) | ListResponse::Wrapped { documents } => documents,
        }
    }
}

#[derive(Serialize)]
struct DocumentBody<'a> {
    id: &'a str,
    #[serde(flatten)]
    fields: &'a Fields,
}

#[derive(Debug, Deserialize)]
struct ApiErrorBody {
    error: Option<String>,
    message: Option<String>,
}

fn parse_api_error(status: StatusCode, body: &str) -> String {
    if let Ok(payload) = serde_json::from_str::<ApiErrorBody>(body) {
        if let Some(message) = payload.message.or(payload.error) {
            return format!("{} ({})", message.trim(), status.as_u16());
        }
    }

    let trimmed = body.trim();
    if trimmed.is_empty() {
        format!("HTTP {}", status.as_u16())
    } else {
        format!("{} ({})", compact_text(trimmed), status.as_u16())
    }
}

fn normalize_endpoint(raw: String) -> Result<Url> {
    let endpoint = normalize_text_option(Some(raw))
        .ok_or_else(|| Error::InvalidInput("remote URL must not be empty".to_string()))?;
    if !is_http_url(&endpoint) {
        return Err(Error::InvalidInput(
            "remote URL must include http:// or https://".to_string(),
        ));
    }
    Url::parse(endpoint.trim_end_matches('/'))
        .map_err(|err| Error::InvalidInput(format!("invalid remote URL: {err}")))
}

async fn check(response: Response) -> Result<Response> {
    if response.status().is_success() {
        return Ok(response);
    }
    let status = response.status();
    let body = response.text().await.unwrap_or_default();
    Err(Error::Remote(parse_api_error(status, &body)))
}

impl RemoteStore for HttpRemoteStore {
    async fn list_all(&self, collection: &str) -> Result<Vec<RemoteDocument>> {
        let url = self.url(&[collection])?;
        let response = check(self.request(Method::GET, url).send().await?).await?;
        let payload = response.json::<ListResponse>().await?;
        Ok(payload.into())
    }

    async fn create_with_id(&self, collection: &str, id: &str, fields: &Fields) -> Result<()> {
        let url = self.url(&[collection, id])?;
        let request = self.request(Method::PUT, url).json(&DocumentBody { id, fields });
        check(request.send().await?).await?;
        Ok(())
    }

    async fn update_fields(&self, collection: &str, id: &str, fields: &Fields) -> Result<()> {
        let url = self.url(&[collection, id])?;
        check(self.request(Method::PATCH, url).json(fields).send().await?).await?;
        Ok(())
    }

    async fn delete_by_id(&self, collection: &str, id: &str) -> Result<()> {
        let url = self.url(&[collection, id])?;
        let response = self.request(Method::DELETE, url).send().await?;
        if response.status() == StatusCode::NOT_FOUND {
            tracing::debug!("Remote {collection}/{id} already deleted");
            return Ok(());
        }
        check(response).await?;
        Ok(())
    }
}
