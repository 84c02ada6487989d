//! The SendGrid IP pool resource.
//!
//! Pools are addressed by name, so the remote id follows a rename. The
//! name goes into the URL path and must be percent-encoded.

use serde::Deserialize;
use serde_json::json;

use crate::client::SendGridClient;
use crate::error::ProviderError;
use crate::registry::ResourceHandler;
use crate::schema::{Attribute, AttributeFlags, AttributeType, Diagnostic, Schema};
use crate::types::{PropertyBag, ResourceState};

use super::{opt_str, require_str};

/// Handler for `ip_pool` resources.
pub struct IpPoolHandler;

#[derive(Debug, Deserialize)]
struct IpPoolResponse {
    pool_name: String,
    #[serde(default)]
    ips: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct IpPoolNameResponse {
    name: String,
}

impl IpPoolHandler {
    fn state_from(name: String, ips: Vec<String>) -> ResourceState {
        let mut bag = PropertyBag::new();
        bag.insert("name".to_string(), json!(name));
        bag.insert("ips".to_string(), json!(ips));
        ResourceState::new("ip_pool", name, bag)
    }
}

#[async_trait::async_trait]
impl ResourceHandler for IpPoolHandler {
    fn type_name(&self) -> &'static str {
        "ip_pool"
    }

    fn schema(&self) -> Schema {
        Schema::v0()
            .with_attribute(
                "name",
                Attribute::required_string().with_description("The name of the IP pool"),
            )
            .with_attribute(
                "ips",
                Attribute::new(
                    AttributeType::list(AttributeType::String),
                    AttributeFlags::computed(),
                )
                .with_description("IP addresses assigned to this pool"),
            )
    }

    fn validate_extra(&self, properties: &PropertyBag) -> Vec<Diagnostic> {
        let mut diags = Vec::new();
        if let Some(name) = opt_str(properties, "name") {
            if name.len() > 64 {
                diags.push(
                    Diagnostic::error("IP pool name too long")
                        .with_detail("The name must be 64 characters or less")
                        .with_attribute("name"),
                );
            }
        }
        diags
    }

    async fn create(
        &self,
        client: &SendGridClient,
        properties: &PropertyBag,
    ) -> Result<ResourceState, ProviderError> {
        let body = json!({ "name": require_str(properties, "name")? });
        let resp: IpPoolNameResponse = client.post("/v3/ips/pools", &body).await?;
        Ok(Self::state_from(resp.name, Vec::new()))
    }

    async fn read(
        &self,
        client: &SendGridClient,
        state: &ResourceState,
    ) -> Result<Option<ResourceState>, ProviderError> {
        let path = format!(
            "/v3/ips/pools/{}",
            SendGridClient::encode_path_segment(&state.id)
        );
        match client.get::<IpPoolResponse>(&path).await {
            Ok(resp) => Ok(Some(Self::state_from(resp.pool_name, resp.ips))),
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
        // Renaming moves the pool to a new identity; the returned state
        // carries the new name as its id.
        let body = json!({ "name": require_str(properties, "name")? });
        let path = format!(
            "/v3/ips/pools/{}",
            SendGridClient::encode_path_segment(&state.id)
        );
        let resp: IpPoolNameResponse = client.put(&path, &body).await?;
        Ok(Self::state_from(resp.name, Vec::new()))
    }

    async fn delete(
        &self,
        client: &SendGridClient,
        state: &ResourceState,
    ) -> Result<(), ProviderError> {
        let path = format!(
            "/v3/ips/pools/{}",
            SendGridClient::encode_path_segment(&state.id)
        );
        match client.delete(&path).await {
            Ok(()) => Ok(()),
            Err(e) if e.is_not_found() => Ok(()),
            Err(e) => Err(e),
        }
    }
}
