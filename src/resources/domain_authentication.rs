//! The SendGrid domain authentication (domain whitelabel) resource.
//!
//! Authenticating a domain proves ownership via DNS records SendGrid hands
//! back. Almost everything about the domain is immutable once provisioned;
//! only `custom_spf` and `default` can be flipped in place.

use serde::Deserialize;
use serde_json::{json, Value};

use crate::client::SendGridClient;
use crate::error::ProviderError;
use crate::registry::ResourceHandler;
use crate::schema::{Attribute, AttributeFlags, AttributeType, Schema};
use crate::types::{PropertyBag, ResourceState};

use super::{opt_bool, opt_str, require_str};

/// Handler for `domain_authentication` resources.
pub struct DomainAuthenticationHandler;

#[derive(Debug, Deserialize)]
struct DomainResponse {
    id: i64,
    domain: String,
    #[serde(default)]
    subdomain: Option<String>,
    #[serde(default)]
    automatic_security: bool,
    #[serde(default)]
    custom_spf: bool,
    #[serde(default)]
    default: bool,
    #[serde(default)]
    valid: bool,
    #[serde(default)]
    dns: Option<Value>,
}

impl DomainResponse {
    fn into_state(self) -> ResourceState {
        let mut bag = PropertyBag::new();
        bag.insert("domain".to_string(), json!(self.domain));
        if let Some(v) = self.subdomain {
            bag.insert("subdomain".to_string(), json!(v));
        }
        bag.insert(
            "automatic_security".to_string(),
            json!(self.automatic_security),
        );
        bag.insert("custom_spf".to_string(), json!(self.custom_spf));
        bag.insert("default".to_string(), json!(self.default));
        bag.insert("valid".to_string(), json!(self.valid));
        if let Some(dns) = self.dns {
            bag.insert("dns".to_string(), dns);
        }
        ResourceState::new("domain_authentication", self.id.to_string(), bag)
    }
}

#[async_trait::async_trait]
impl ResourceHandler for DomainAuthenticationHandler {
    fn type_name(&self) -> &'static str {
        "domain_authentication"
    }

    fn schema(&self) -> Schema {
        Schema::v0()
            .with_attribute(
                "domain",
                Attribute::required_string()
                    .with_force_new()
                    .with_description("The domain to authenticate"),
            )
            .with_attribute(
                "subdomain",
                Attribute::optional_string()
                    .with_force_new()
                    .with_description("The subdomain used for the DNS records"),
            )
            .with_attribute(
                "automatic_security",
                Attribute::optional_bool()
                    .with_default(json!(true))
                    .with_force_new()
                    .with_description("Let SendGrid manage SPF and DKIM via CNAMEs"),
            )
            .with_attribute(
                "custom_dkim_selector",
                Attribute::optional_string().with_force_new(),
            )
            .with_attribute(
                "region",
                Attribute::optional_string().with_force_new(),
            )
            .with_attribute(
                "custom_spf",
                Attribute::optional_bool().with_default(json!(false)),
            )
            .with_attribute(
                "default",
                Attribute::optional_bool()
                    .with_default(json!(false))
                    .with_description("Use this domain as the default for the account"),
            )
            .with_attribute("valid", Attribute::computed_bool())
            .with_attribute(
                "dns",
                Attribute::new(
                    AttributeType::map(AttributeType::Dynamic),
                    AttributeFlags::computed(),
                )
                .with_description("The DNS records to install for this domain"),
            )
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
        body.insert(
            "automatic_security".to_string(),
            json!(opt_bool(properties, "automatic_security").unwrap_or(true)),
        );
        if let Some(v) = opt_str(properties, "custom_dkim_selector") {
            body.insert("custom_dkim_selector".to_string(), json!(v));
        }
        if let Some(v) = opt_str(properties, "region") {
            body.insert("region".to_string(), json!(v));
        }
        body.insert(
            "custom_spf".to_string(),
            json!(opt_bool(properties, "custom_spf").unwrap_or(false)),
        );
        body.insert(
            "default".to_string(),
            json!(opt_bool(properties, "default").unwrap_or(false)),
        );
        let resp: DomainResponse = client
            .post("/v3/whitelabel/domains", &Value::Object(body))
            .await?;
        Ok(resp.into_state())
    }

    async fn read(
        &self,
        client: &SendGridClient,
        state: &ResourceState,
    ) -> Result<Option<ResourceState>, ProviderError> {
        let path = format!("/v3/whitelabel/domains/{}", state.id);
        match client.get::<DomainResponse>(&path).await {
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
        let body = json!({
            "custom_spf": opt_bool(properties, "custom_spf").unwrap_or(false),
            "default": opt_bool(properties, "default").unwrap_or(false),
        });
        let path = format!("/v3/whitelabel/domains/{}", state.id);
        let resp: DomainResponse = client.patch(&path, &body).await?;
        Ok(resp.into_state())
    }

    async fn delete(
        &self,
        client: &SendGridClient,
        state: &ResourceState,
    ) -> Result<(), ProviderError> {
        let path = format!("/v3/whitelabel/domains/{}", state.id);
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
    fn test_immutable_attributes_force_replacement() {
        let schema = DomainAuthenticationHandler.schema();
        let force_new: Vec<_> = schema.force_new_attributes().collect();
        assert_eq!(
            force_new,
            vec![
                "automatic_security",
                "custom_dkim_selector",
                "domain",
                "region",
                "subdomain"
            ]
        );
        // custom_spf and default stay mutable.
        assert!(!schema.attributes["custom_spf"].force_new);
        assert!(!schema.attributes["default"].force_new);
    }

    #[test]
    fn test_numeric_id_becomes_string_state_id() {
        let resp: DomainResponse = serde_json::from_value(json!({
            "id": 1234567,
            "domain": "example.com",
            "subdomain": "em",
            "valid": false,
        }))
        .unwrap();
        let state = resp.into_state();
        assert_eq!(state.id, "1234567");
        assert_eq!(state.properties["valid"], json!(false));
    }
}
