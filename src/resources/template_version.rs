//! The SendGrid template version resource.
//!
//! Versions live under a parent template; the parent cannot change without
//! replacing the version.

use serde::Deserialize;
use serde_json::{json, Value};

use crate::client::SendGridClient;
use crate::error::ProviderError;
use crate::registry::ResourceHandler;
use crate::schema::{Attribute, Diagnostic, Schema};
use crate::types::{PropertyBag, ResourceState};

use super::{copy_if_set, opt_str, require_str};

/// Handler for `template_version` resources.
pub struct TemplateVersionHandler;

#[derive(Debug, Deserialize)]
struct TemplateVersionResponse {
    id: String,
    template_id: String,
    name: String,
    #[serde(default)]
    subject: Option<String>,
    #[serde(default)]
    html_content: Option<String>,
    #[serde(default)]
    plain_content: Option<String>,
    #[serde(default)]
    active: i64,
    #[serde(default)]
    editor: Option<String>,
    #[serde(default)]
    generate_plain_content: Option<bool>,
    #[serde(default)]
    test_data: Option<String>,
}

impl TemplateVersionResponse {
    fn into_state(self) -> ResourceState {
        let mut bag = PropertyBag::new();
        bag.insert("template_id".to_string(), json!(self.template_id));
        bag.insert("name".to_string(), json!(self.name));
        bag.insert("active".to_string(), json!(self.active));
        if let Some(v) = self.subject {
            bag.insert("subject".to_string(), json!(v));
        }
        if let Some(v) = self.html_content {
            bag.insert("html_content".to_string(), json!(v));
        }
        if let Some(v) = self.plain_content {
            bag.insert("plain_content".to_string(), json!(v));
        }
        if let Some(v) = self.editor {
            bag.insert("editor".to_string(), json!(v));
        }
        if let Some(v) = self.generate_plain_content {
            bag.insert("generate_plain_content".to_string(), json!(v));
        }
        if let Some(v) = self.test_data {
            bag.insert("test_data".to_string(), json!(v));
        }
        ResourceState::new("template_version", self.id, bag)
    }
}

fn request_body(properties: &PropertyBag) -> Result<Value, ProviderError> {
    let mut body = PropertyBag::new();
    body.insert("name".to_string(), json!(require_str(properties, "name")?));
    for key in [
        "subject",
        "html_content",
        "plain_content",
        "active",
        "editor",
        "generate_plain_content",
        "test_data",
    ] {
        copy_if_set(&mut body, properties, key);
    }
    Ok(Value::Object(body))
}

#[async_trait::async_trait]
impl ResourceHandler for TemplateVersionHandler {
    fn type_name(&self) -> &'static str {
        "template_version"
    }

    fn schema(&self) -> Schema {
        Schema::v0()
            .with_attribute(
                "template_id",
                Attribute::required_string()
                    .with_force_new()
                    .with_description("The id of the parent template"),
            )
            .with_attribute(
                "name",
                Attribute::required_string().with_description("The name of the version"),
            )
            .with_attribute("subject", Attribute::optional_string())
            .with_attribute("html_content", Attribute::optional_string())
            .with_attribute("plain_content", Attribute::optional_string())
            .with_attribute(
                "active",
                Attribute::optional_int64()
                    .with_default(json!(0))
                    .with_description("Set to 1 to make this the active version"),
            )
            .with_attribute(
                "editor",
                Attribute::optional_string()
                    .with_description("The editor used in the UI, either code or design"),
            )
            .with_attribute("generate_plain_content", Attribute::optional_bool())
            .with_attribute(
                "test_data",
                Attribute::optional_string()
                    .with_description("JSON test data used when previewing a dynamic version"),
            )
    }

    fn validate_extra(&self, properties: &PropertyBag) -> Vec<Diagnostic> {
        let mut diags = Vec::new();
        if let Some(editor) = opt_str(properties, "editor") {
            if editor != "code" && editor != "design" {
                diags.push(
                    Diagnostic::error("Invalid editor")
                        .with_detail("Editor must be either 'code' or 'design'")
                        .with_attribute("editor"),
                );
            }
        }
        if let Some(active) = properties.get("active").and_then(Value::as_i64) {
            if active != 0 && active != 1 {
                diags.push(
                    Diagnostic::error("Invalid active flag")
                        .with_detail("Active must be 0 or 1")
                        .with_attribute("active"),
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
        let template_id = require_str(properties, "template_id")?;
        let body = request_body(properties)?;
        let path = format!("/v3/templates/{}/versions", template_id);
        let resp: TemplateVersionResponse = client.post(&path, &body).await?;
        Ok(resp.into_state())
    }

    async fn read(
        &self,
        client: &SendGridClient,
        state: &ResourceState,
    ) -> Result<Option<ResourceState>, ProviderError> {
        let template_id = require_str(&state.properties, "template_id")?;
        let path = format!("/v3/templates/{}/versions/{}", template_id, state.id);
        match client.get::<TemplateVersionResponse>(&path).await {
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
        let template_id = require_str(&state.properties, "template_id")?;
        let body = request_body(properties)?;
        let path = format!("/v3/templates/{}/versions/{}", template_id, state.id);
        let resp: TemplateVersionResponse = client.patch(&path, &body).await?;
        Ok(resp.into_state())
    }

    async fn delete(
        &self,
        client: &SendGridClient,
        state: &ResourceState,
    ) -> Result<(), ProviderError> {
        let template_id = require_str(&state.properties, "template_id")?;
        let path = format!("/v3/templates/{}/versions/{}", template_id, state.id);
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
    fn test_parent_forces_replacement() {
        let schema = TemplateVersionHandler.schema();
        let force_new: Vec<_> = schema.force_new_attributes().collect();
        assert_eq!(force_new, vec!["template_id"]);
    }

    #[test]
    fn test_rejects_invalid_editor_and_active() {
        let bag = json!({"template_id": "t", "name": "v1", "editor": "wysiwyg", "active": 2})
            .as_object()
            .unwrap()
            .clone();
        let diags = TemplateVersionHandler.validate_extra(&bag);
        assert_eq!(diags.len(), 2);
    }

    #[test]
    fn test_request_body_drops_null_fields() {
        let bag = json!({
            "template_id": "t",
            "name": "v1",
            "subject": "Hi {{name}}",
            "plain_content": null,
        })
        .as_object()
        .unwrap()
        .clone();
        let body = request_body(&bag).unwrap();
        assert_eq!(body["name"], json!("v1"));
        assert_eq!(body["subject"], json!("Hi {{name}}"));
        assert!(body.get("plain_content").is_none());
        // template_id travels in the path, not the body.
        assert!(body.get("template_id").is_none());
    }
}
