//! The SendGrid link branding (link whitelabel) resource.

use serde::Deserialize;
use serde_json::{json, Value};

use crate::client::SendGridClient;
use crate::error::ProviderError;
use crate::registry::ResourceHandler;
use crate::schema::{Attribute, Schema};
use crate::types::{PropertyBag, ResourceState};

use super::{opt_bool, opt_str, require_str};

/// Handler for `link_branding` resources.
pub struct LinkBrandingHandler;

#[derive(Debug, Deserialize)]
struct LinkBrandingResponse {
    id: i64,
    domain: String,
    #[serde(default)]
    subdomain: Option<String>,
    #[serde(default)]
    default: bool,
    #[serde(default)]
    valid: bool,
}

impl LinkBrandingResponse {
    fn into_state(self) -> ResourceState {
        let mut bag = PropertyBag::new();
        bag.insert("domain".to_string(), json!(self.domain));
        if let Some(v) = self.subdomain {
            bag.insert("subdomain".to_string(), json!(v));
        }
        bag.insert("default".to_string(), json!(self.default));
        bag.insert("valid".to_string(), json!(self.valid));
        ResourceState::new("link_branding", self.id.to_string(), bag)
    }
}

#[async_trait::async_trait]
impl ResourceHandler for LinkBrandingHandler {
    fn type_name(&self) -> &'static str {
        "link_branding"
    }

    fn schema(&self) -> Schema {
        Schema::v0()
            .with_attribute(
                "domain",
                Attribute::required_string()
                    .with_force_new()
                    .with_description("The domain branded links are served from"),
            )
            .with_attribute(
                "subdomain",
                Attribute::optional_string().with_force_new(),
            )
            .with_attribute("region", Attribute::optional_string().with_force_new())
            .with_attribute(
                "default",
                Attribute::optional_bool().with_default(json!(false)),
            )
            .with_attribute("valid", Attribute::computed_bool())
    }

    async fn create(
        &self,
        client: &SendGridClient,
        properties: &PropertyBag,
    ) -> Result<ResourceState, ProviderError> {
        let mut body = PropertyBag::new();
        body.insert(
            "domain".to_string(),
            json!(require_str(properties, "domain")?),
        );
        if let Some(v) = opt_str(properties, "subdomain") {
            body.insert("subdomain".to_string(), json!(v));
        }
        if let Some(v) = opt_str(properties, "region") {
            body.insert("region".to_string(), json!(v));
        }
        body.insert(
            "default".to_string(),
            json!(opt_bool(properties, "default").unwrap_or(false)),
        );
        let resp: LinkBrandingResponse = client
            .post("/v3/whitelabel/links", &Value::Object(body))
            .await?;
        Ok(resp.into_state())
    }

    async fn read(
        &self,
        client: &SendGridClient,
        state: &ResourceState,
    ) -> Result<Option<ResourceState>, ProviderError> {
        let path = format!("/v3/whitelabel/links/{}", state.id);
        match client.get::<LinkBrandingResponse>(&path).await {
            Ok(resp) => Ok(Some(resp.into_state())),
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
        // The API only lets the default flag change in place.
        let body = json!({ "default": opt_bool(properties, "default").unwrap_or(false) });
        let path = format!("/v3/whitelabel/links/{}", state.id);
        let resp: LinkBrandingResponse = client.patch(&path, &body).await?;
        Ok(resp.into_state())
    }

    async fn delete(
        &self,
        client: &SendGridClient,
        state: &ResourceState,
    ) -> Result<(), ProviderError> {
        let path = format!("/v3/whitelabel/links/{}", state.id);
        match client.delete(&path).await {
            Ok(()) => Ok(()),
            Err(e) if e.is_not_found() => Ok(()),
            Err(e) => Err(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_only_default_is_mutable() {
        let schema = LinkBrandingHandler.schema();
        let force_new: Vec<_> = schema.force_new_attributes().collect();
        assert_eq!(force_new, vec!["domain", "region", "subdomain"]);
        assert!(!schema.attributes["default"].force_new);
    }
}
