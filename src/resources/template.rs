//! The SendGrid transactional template resource.

use serde::Deserialize;
use serde_json::json;

use crate::client::SendGridClient;
use crate::error::ProviderError;
use crate::registry::ResourceHandler;
use crate::schema::{Attribute, Diagnostic, Schema};
use crate::types::{PropertyBag, ResourceState};

use super::{opt_str, require_str};

/// Handler for `template` resources.
pub struct TemplateHandler;

#[derive(Debug, Deserialize)]
struct TemplateResponse {
    id: String,
    name: String,
    generation: String,
}

impl TemplateResponse {
    fn into_state(self) -> ResourceState {
        let mut bag = PropertyBag::new();
        bag.insert("name".to_string(), json!(self.name));
        bag.insert("generation".to_string(), json!(self.generation));
        ResourceState::new("template", self.id, bag)
    }
}

#[async_trait::async_trait]
impl ResourceHandler for TemplateHandler {
    fn type_name(&self) -> &'static str {
        "template"
    }

    fn schema(&self) -> Schema {
        Schema::v0()
            .with_attribute(
                "name",
                Attribute::required_string().with_description("The name of the template"),
            )
            .with_attribute(
                "generation",
                Attribute::optional_string()
                    .with_default(json!("dynamic"))
                    .with_force_new()
                    .with_description("Template generation, either legacy or dynamic"),
            )
    }

    fn validate_extra(&self, properties: &PropertyBag) -> Vec<Diagnostic> {
        let mut diags = Vec::new();
        if let Some(name) = opt_str(properties, "name") {
            if name.len() > 100 {
                diags.push(
                    Diagnostic::error("Template name too long")
                        .with_detail("The name must be 100 characters or less")
                        .with_attribute("name"),
                );
            }
        }
        if let Some(generation) = opt_str(properties, "generation") {
            if generation != "legacy" && generation != "dynamic" {
                diags.push(
                    Diagnostic::error("Invalid template generation")
                        .with_detail("Generation must be either 'legacy' or 'dynamic'")
                        .with_attribute("generation"),
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
        let body = json!({
            "name": require_str(properties, "name")?,
            "generation": opt_str(properties, "generation").unwrap_or("dynamic"),
        });
        let resp: TemplateResponse = client.post("/v3/templates", &body).await?;
        Ok(resp.into_state())
    }

    async fn read(
        &self,
        client: &SendGridClient,
        state: &ResourceState,
    ) -> Result<Option<ResourceState>, ProviderError> {
        let path = format!("/v3/templates/{}", state.id);
        match client.get::<TemplateResponse>(&path).await {
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
        // Only the name is mutable; generation forces replacement.
        let body = json!({ "name": require_str(properties, "name")? });
        let path = format!("/v3/templates/{}", state.id);
        let resp: TemplateResponse = client.patch(&path, &body).await?;
        Ok(resp.into_state())
    }

    async fn delete(
        &self,
        client: &SendGridClient,
        state: &ResourceState,
    ) -> Result<(), ProviderError> {
        let path = format!("/v3/templates/{}", state.id);
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
    fn test_generation_forces_replacement() {
        let schema = TemplateHandler.schema();
        let force_new: Vec<_> = schema.force_new_attributes().collect();
        assert_eq!(force_new, vec!["generation"]);
        assert_eq!(schema.attributes["generation"].default, Some(json!("dynamic")));
    }

    #[test]
    fn test_rejects_long_name() {
        let bag = json!({"name": "x".repeat(101)}).as_object().unwrap().clone();
        let diags = TemplateHandler.validate_extra(&bag);
        assert_eq!(diags.len(), 1);
        assert_eq!(diags[0].attribute.as_deref(), Some("name"));
    }

    #[test]
    fn test_rejects_unknown_generation() {
        let bag = json!({"name": "welcome", "generation": "v3"})
            .as_object()
            .unwrap()
            .clone();
        let diags = TemplateHandler.validate_extra(&bag);
        assert_eq!(diags.len(), 1);
        assert_eq!(diags[0].attribute.as_deref(), Some("generation"));
    }

    #[test]
    fn test_accepts_valid_properties() {
        let bag = json!({"name": "welcome", "generation": "legacy"})
            .as_object()
            .unwrap()
            .clone();
        assert!(TemplateHandler.validate_extra(&bag).is_empty());
    }
}
