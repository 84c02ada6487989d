//! The SendGrid API Key resource.
//!
//! API keys authenticate access to SendGrid services. The actual key value
//! is only returned on creation and can never be retrieved again, so it is
//! carried as a sensitive computed attribute and preserved from prior state
//! on read and update.

use serde::Deserialize;
use serde_json::{json, Value};

use crate::client::SendGridClient;
use crate::error::ProviderError;
use crate::registry::ResourceHandler;
use crate::schema::{Attribute, AttributeFlags, AttributeType, Schema};
use crate::types::{PropertyBag, ResourceState};

use super::require_str;

/// Handler for `api_key` resources.
pub struct ApiKeyHandler;

#[derive(Debug, Deserialize)]
struct ApiKeyResponse {
    #[serde(default)]
    api_key: Option<String>,
    api_key_id: String,
    name: String,
    #[serde(default)]
    scopes: Vec<String>,
}

impl ApiKeyHandler {
    fn state_from(resp: ApiKeyResponse, prior_key: Option<&Value>) -> ResourceState {
        let mut bag = PropertyBag::new();
        bag.insert("name".to_string(), json!(resp.name));
        bag.insert("scopes".to_string(), json!(resp.scopes));
        bag.insert("api_key_id".to_string(), json!(resp.api_key_id));
        // The secret is only present in the create response; afterwards we
        // keep whatever the prior state held.
        match resp.api_key {
            Some(key) => {
                bag.insert("api_key".to_string(), json!(key));
            },
            None => {
                if let Some(prior) = prior_key {
                    bag.insert("api_key".to_string(), prior.clone());
                }
            },
        }
        ResourceState::new("api_key", resp.api_key_id.clone(), bag)
    }

    fn request_body(properties: &PropertyBag, include_empty_scopes: bool) -> Result<Value, ProviderError> {
        let name = require_str(properties, "name")?;
        let mut body = json!({ "name": name });
        match properties.get("scopes") {
            Some(scopes @ Value::Array(list)) if !list.is_empty() => {
                body["scopes"] = scopes.clone();
            },
            _ if include_empty_scopes => {
                body["scopes"] = json!([]);
            },
            _ => {},
        }
        Ok(body)
    }
}

#[async_trait::async_trait]
impl ResourceHandler for ApiKeyHandler {
    fn type_name(&self) -> &'static str {
        "api_key"
    }

    fn schema(&self) -> Schema {
        Schema::v0()
            .with_attribute(
                "name",
                Attribute::required_string().with_description("The name of the API key"),
            )
            .with_attribute(
                "scopes",
                Attribute::new(
                    AttributeType::list(AttributeType::String),
                    AttributeFlags::optional(),
                )
                .with_description(
                    "Permissions granted to this key. Omitting scopes grants full access",
                ),
            )
            .with_attribute("api_key_id", Attribute::computed_string())
            .with_attribute(
                "api_key",
                Attribute::computed_string()
                    .sensitive()
                    .with_description("The key value; only returned on creation"),
            )
    }

    async fn create(
        &self,
        client: &SendGridClient,
        properties: &PropertyBag,
    ) -> Result<ResourceState, ProviderError> {
        let body = Self::request_body(properties, false)?;
        let resp: ApiKeyResponse = client.post("/v3/api_keys", &body).await?;
        Ok(Self::state_from(resp, None))
    }

    async fn read(
        &self,
        client: &SendGridClient,
        state: &ResourceState,
    ) -> Result<Option<ResourceState>, ProviderError> {
        let path = format!("/v3/api_keys/{}", state.id);
        match client.get::<ApiKeyResponse>(&path).await {
            Ok(resp) => Ok(Some(Self::state_from(resp, state.properties.get("api_key")))),
            Err(e) if e.is_not_found() => Ok(None),
            Err(e) => Err(e),
        }
    }

    async fn update(
        &self,
        client: &SendGridClient,
        state: &ResourceState,
        properties: &PropertyBag,
    ) -> Result<ResourceState, ProviderError> {
        // PUT replaces both name and scopes; an omitted scopes list must be
        // sent as empty or the API keeps the old one.
        let body = Self::request_body(properties, true)?;
        let path = format!("/v3/api_keys/{}", state.id);
        let resp: ApiKeyResponse = client.put(&path, &body).await?;
        Ok(Self::state_from(resp, state.properties.get("api_key")))
    }

    async fn delete(
        &self,
        client: &SendGridClient,
        state: &ResourceState,
    ) -> Result<(), ProviderError> {
        let path = format!("/v3/api_keys/{}", state.id);
        match client.delete(&path).await {
            Ok(()) => Ok(()),
            // Already deleted out-of-band is fine.
            Err(e) if e.is_not_found() => Ok(()),
            Err(e) => Err(e),
        }
    }
}
