//! The SendGrid unsubscribe (suppression) group resource.

use serde::Deserialize;
use serde_json::{json, Value};

use crate::client::SendGridClient;
use crate::error::ProviderError;
use crate::registry::ResourceHandler;
use crate::schema::{Attribute, Diagnostic, Schema};
use crate::types::{PropertyBag, ResourceState};

use super::{opt_bool, opt_str, require_str};

/// Handler for `unsubscribe_group` resources.
pub struct UnsubscribeGroupHandler;

#[derive(Debug, Deserialize)]
struct UnsubscribeGroupResponse {
    id: i64,
    name: String,
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    is_default: bool,
    #[serde(default)]
    unsubscribes: i64,
}

impl UnsubscribeGroupResponse {
    fn into_state(self) -> ResourceState {
        let mut bag = PropertyBag::new();
        bag.insert("name".to_string(), json!(self.name));
        if let Some(v) = self.description {
            bag.insert("description".to_string(), json!(v));
        }
        bag.insert("is_default".to_string(), json!(self.is_default));
        bag.insert("group_id".to_string(), json!(self.id));
        bag.insert("unsubscribes".to_string(), json!(self.unsubscribes));
        ResourceState::new("unsubscribe_group", self.id.to_string(), bag)
    }
}

fn request_body(properties: &PropertyBag) -> Result<Value, ProviderError> {
    let mut body = PropertyBag::new();
    body.insert("name".to_string(), json!(require_str(properties, "name")?));
    if let Some(v) = opt_str(properties, "description") {
        body.insert("description".to_string(), json!(v));
    }
    body.insert(
        "is_default".to_string(),
        json!(opt_bool(properties, "is_default").unwrap_or(false)),
    );
    Ok(Value::Object(body))
}

#[async_trait::async_trait]
impl ResourceHandler for UnsubscribeGroupHandler {
    fn type_name(&self) -> &'static str {
        "unsubscribe_group"
    }

    fn schema(&self) -> Schema {
        Schema::v0()
            .with_attribute(
                "name",
                Attribute::required_string()
                    .with_description("The name shown on the unsubscribe page"),
            )
            .with_attribute("description", Attribute::optional_string())
            .with_attribute(
                "is_default",
                Attribute::optional_bool().with_default(json!(false)),
            )
            .with_attribute("group_id", Attribute::computed_int64())
            .with_attribute("unsubscribes", Attribute::computed_int64())
    }

    fn validate_extra(&self, properties: &PropertyBag) -> Vec<Diagnostic> {
        let mut diags = Vec::new();
        if let Some(name) = opt_str(properties, "name") {
            if name.len() > 30 {
                diags.push(
                    Diagnostic::error("Group name too long")
                        .with_detail("The name must be 30 characters or less")
                        .with_attribute("name"),
                );
            }
        }
        if let Some(description) = opt_str(properties, "description") {
            if description.len() > 100 {
                diags.push(
                    Diagnostic::error("Group description too long")
                        .with_detail("The description must be 100 characters or less")
                        .with_attribute("description"),
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
        let body = request_body(properties)?;
        let resp: UnsubscribeGroupResponse = client.post("/v3/asm/groups", &body).await?;
        Ok(resp.into_state())
    }

    async fn read(
        &self,
        client: &SendGridClient,
        state: &ResourceState,
    ) -> Result<Option<ResourceState>, ProviderError> {
        let path = format!("/v3/asm/groups/{}", state.id);
        match client.get::<UnsubscribeGroupResponse>(&path).await {
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
        let body = request_body(properties)?;
        let path = format!("/v3/asm/groups/{}", state.id);
        let resp: UnsubscribeGroupResponse = client.patch(&path, &body).await?;
        Ok(resp.into_state())
    }

    async fn delete(
        &self,
        client: &SendGridClient,
        state: &ResourceState,
    ) -> Result<(), ProviderError> {
        let path = format!("/v3/asm/groups/{}", state.id);
        match client.delete(&path).await {
            Ok(()) => Ok(()),
            Err(e) if e.is_not_found() => Ok(()),
            Err(e) => Err(e),
        }
    }
}
