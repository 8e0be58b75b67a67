//! Publishing to a Wikibase instance through its action API

use async_trait::async_trait;
use lotus_common::types::RemoteEntityId;
use lotus_common::{LotusError, Result};
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use crate::publish::document::Document;
use crate::publish::Publisher;
use crate::reconcile::client::{ApiRequest, ApiResponse, RemoteApiClient};

/// Bot account used for edits
#[derive(Debug, Clone)]
pub struct Credentials {
    pub username: String,
    pub password: String,
}

#[derive(Debug, Deserialize)]
struct ApiError {
    code: String,
    #[serde(default)]
    info: String,
}

#[derive(Debug, Deserialize)]
struct ActionResponse {
    #[serde(default)]
    error: Option<ApiError>,
    #[serde(flatten)]
    rest: Value,
}

/// [`Publisher`] over the `api.php` endpoint of a Wikibase
pub struct WikibasePublisher {
    client: Arc<RemoteApiClient>,
    api_url: String,
    credentials: Option<Credentials>,
    csrf_token: RwLock<Option<String>>,
}

impl WikibasePublisher {
    pub fn new(client: Arc<RemoteApiClient>, api_url: impl Into<String>) -> Self {
        Self {
            client,
            api_url: api_url.into(),
            credentials: None,
            csrf_token: RwLock::new(None),
        }
    }

    pub fn with_credentials(mut self, credentials: Credentials) -> Self {
        self.credentials = Some(credentials);
        self
    }

    async fn get(&self, params: &[(&str, &str)]) -> Result<Value> {
        let mut request = ApiRequest::get(&self.api_url).query("format", "json");
        for (name, value) in params {
            request = request.query(*name, *value);
        }
        let response = self.client.call(&request).await?;
        unwrap_action(&response)
    }

    fn form(&self, params: &[(&str, &str)]) -> ApiRequest {
        let mut request = ApiRequest::post(&self.api_url).form("format", "json");
        for (name, value) in params {
            request = request.form(*name, *value);
        }
        request
    }

    async fn post(&self, params: &[(&str, &str)]) -> Result<Value> {
        let response = self.client.call(&self.form(params)).await?;
        unwrap_action(&response)
    }

    async fn token(&self, kind: &str) -> Result<String> {
        let body = self.get(&[("action", "query"), ("meta", "tokens"), ("type", kind)]).await?;
        body["query"]["tokens"][format!("{}token", kind)]
            .as_str()
            .map(str::to_string)
            .ok_or_else(|| LotusError::parse(format!("No {} token in response", kind)))
    }

    async fn csrf(&self) -> Result<String> {
        if let Some(token) = self.csrf_token.read().await.as_ref() {
            return Ok(token.clone());
        }
        let token = self.token("csrf").await?;
        *self.csrf_token.write().await = Some(token.clone());
        Ok(token)
    }

    /// Edits are sent once; callers decide whether a failed edit is tried again.
    async fn edit_entity(&self, new: &str, data: &Value, summary: &str) -> Result<String> {
        let token = self.csrf().await?;
        let data = data.to_string();
        let request = self.form(&[
            ("action", "wbeditentity"),
            ("new", new),
            ("data", data.as_str()),
            ("summary", summary),
            ("bot", "1"),
            ("token", token.as_str()),
        ]);
        let body = unwrap_action(&self.client.call_once(&request).await?)?;

        body["entity"]["id"]
            .as_str()
            .map(str::to_string)
            .ok_or_else(|| LotusError::parse("wbeditentity response without entity id"))
    }
}

/// Split an action API answer into its payload or its `error` object
fn unwrap_action(response: &ApiResponse) -> Result<Value> {
    let parsed: ActionResponse = response.json()?;
    match parsed.error {
        None => Ok(parsed.rest),
        Some(error) => Err(classify_api_error(response.status, error)),
    }
}

fn classify_api_error(status: u16, error: ApiError) -> LotusError {
    match error.code.as_str() {
        "maxlag" | "ratelimited" => {
            LotusError::RateLimitExceeded(format!("{}: {}", error.code, error.info))
        },
        _ => LotusError::Remote {
            status,
            message: format!("{}: {}", error.code, error.info),
        },
    }
}

#[async_trait]
impl Publisher for WikibasePublisher {
    async fn connect(&self) -> Result<()> {
        if let Some(credentials) = &self.credentials {
            let login_token = self.token("login").await?;
            let body = self
                .post(&[
                    ("action", "login"),
                    ("lgname", credentials.username.as_str()),
                    ("lgpassword", credentials.password.as_str()),
                    ("lgtoken", login_token.as_str()),
                ])
                .await?;

            let result = body["login"]["result"].as_str().unwrap_or("Unknown");
            if result != "Success" {
                let reason = body["login"]["reason"].as_str().unwrap_or(result);
                return Err(LotusError::config(format!(
                    "Wikibase login as {} failed: {}",
                    credentials.username, reason
                )));
            }
            info!(api = %self.api_url, user = %credentials.username, "Logged in");
        } else {
            warn!(api = %self.api_url, "No credentials configured, editing anonymously");
        }

        *self.csrf_token.write().await = Some(self.token("csrf").await?);
        Ok(())
    }

    async fn disconnect(&self) -> Result<()> {
        let Some(token) = self.csrf_token.write().await.take() else {
            return Ok(());
        };
        self.post(&[("action", "logout"), ("token", token.as_str())]).await?;
        debug!(api = %self.api_url, "Logged out");
        Ok(())
    }

    async fn new_property(&self, name: &str, description: &str) -> Result<String> {
        let data = json!({
            "labels": { "en": { "language": "en", "value": name } },
            "descriptions": { "en": { "language": "en", "value": description } },
            "datatype": "string",
        });
        let id = self
            .edit_entity("property", &data, &format!("Create property {}", name))
            .await?;
        info!(property = %id, name = %name, "Created property");
        Ok(id)
    }

    async fn publish(&self, document: &Document, summary: &str) -> Result<RemoteEntityId> {
        let id = self.edit_entity("item", &document.to_wikibase_json(), summary).await?;
        Ok(RemoteEntityId::new(id))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use lotus_common::ErrorKind;

    #[test]
    fn test_action_payload_passes_through() {
        let response = ApiResponse::new(200, r#"{"entity": {"id": "Q42"}, "success": 1}"#);
        let body = unwrap_action(&response).unwrap();
        assert_eq!(body["entity"]["id"], "Q42");
    }

    #[test]
    fn test_throttling_codes_are_rate_limits() {
        let response = ApiResponse::new(200, r#"{"error": {"code": "maxlag", "info": "Waiting for db"}}"#);
        assert_eq!(unwrap_action(&response).unwrap_err().kind(), ErrorKind::RateLimitExceeded);

        let response = ApiResponse::new(200, r#"{"error": {"code": "ratelimited", "info": "slow down"}}"#);
        assert_eq!(unwrap_action(&response).unwrap_err().kind(), ErrorKind::RateLimitExceeded);
    }

    #[test]
    fn test_other_codes_are_remote_rejections() {
        let response = ApiResponse::new(200, r#"{"error": {"code": "badtoken", "info": "Invalid CSRF token."}}"#);
        let err = unwrap_action(&response).unwrap_err();
        assert!(matches!(err, LotusError::Remote { status: 200, ref message } if message.starts_with("badtoken")));
    }
}
