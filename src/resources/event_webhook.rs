//! The SendGrid event webhook resource.
//!
//! Event webhooks POST delivery and engagement events to a customer URL.
//! Every event toggle defaults to off so a plan only tracks the ones the
//! user declared.

use serde::Deserialize;
use serde_json::{json, Value};

use crate::client::SendGridClient;
use crate::error::ProviderError;
use crate::registry::ResourceHandler;
use crate::schema::{Attribute, Schema};
use crate::types::{PropertyBag, ResourceState};

use super::{opt_bool, opt_str, require_str};

/// Handler for `event_webhook` resources.
pub struct EventWebhookHandler;

const EVENT_FLAGS: &[&str] = &[
    "bounce",
    "click",
    "deferred",
    "delivered",
    "dropped",
    "group_resubscribe",
    "group_unsubscribe",
    "open",
    "processed",
    "spam_report",
    "unsubscribe",
];

#[derive(Debug, Deserialize)]
struct EventWebhookResponse {
    id: String,
    url: String,
    #[serde(default)]
    enabled: bool,
    #[serde(default)]
    friendly_name: Option<String>,
    #[serde(flatten)]
    rest: PropertyBag,
}

impl EventWebhookResponse {
    fn into_state(self) -> ResourceState {
        let mut bag = PropertyBag::new();
        bag.insert("url".to_string(), json!(self.url));
        bag.insert("enabled".to_string(), json!(self.enabled));
        if let Some(v) = self.friendly_name {
            bag.insert("friendly_name".to_string(), json!(v));
        }
        for flag in EVENT_FLAGS {
            let value = self
                .rest
                .get(*flag)
                .and_then(Value::as_bool)
                .unwrap_or(false);
            bag.insert((*flag).to_string(), json!(value));
        }
        ResourceState::new("event_webhook", self.id, bag)
    }
}

fn request_body(properties: &PropertyBag) -> Result<Value, ProviderError> {
    let mut body = PropertyBag::new();
    body.insert("url".to_string(), json!(require_str(properties, "url")?));
    body.insert(
        "enabled".to_string(),
        json!(opt_bool(properties, "enabled").unwrap_or(true)),
    );
    if let Some(name) = opt_str(properties, "friendly_name") {
        body.insert("friendly_name".to_string(), json!(name));
    }
    for flag in EVENT_FLAGS {
        body.insert(
            (*flag).to_string(),
            json!(opt_bool(properties, flag).unwrap_or(false)),
        );
    }
    Ok(Value::Object(body))
}

#[async_trait::async_trait]
impl ResourceHandler for EventWebhookHandler {
    fn type_name(&self) -> &'static str {
        "event_webhook"
    }

    fn schema(&self) -> Schema {
        let mut schema = Schema::v0()
            .with_attribute(
                "url",
                Attribute::required_string()
                    .with_description("The URL events are POSTed to"),
            )
            .with_attribute(
                "enabled",
                Attribute::optional_bool().with_default(json!(true)),
            )
            .with_attribute("friendly_name", Attribute::optional_string());
        for flag in EVENT_FLAGS {
            schema = schema.with_attribute(
                *flag,
                Attribute::optional_bool().with_default(json!(false)),
            );
        }
        schema
    }

    async fn create(
        &self,
        client: &SendGridClient,
        properties: &PropertyBag,
    ) -> Result<ResourceState, ProviderError> {
        let body = request_body(properties)?;
        let resp: EventWebhookResponse = client
            .post("/v3/user/webhooks/event/settings", &body)
            .await?;
        Ok(resp.into_state())
    }

    async fn read(
        &self,
        client: &SendGridClient,
        state: &ResourceState,
    ) -> Result<Option<ResourceState>, ProviderError> {
        let path = format!("/v3/user/webhooks/event/settings/{}", state.id);
        match client.get::<EventWebhookResponse>(&path).await {
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
        let path = format!("/v3/user/webhooks/event/settings/{}", state.id);
        let resp: EventWebhookResponse = client.patch(&path, &body).await?;
        Ok(resp.into_state())
    }

    async fn delete(
        &self,
        client: &SendGridClient,
        state: &ResourceState,
    ) -> Result<(), ProviderError> {
        let path = format!("/v3/user/webhooks/event/settings/{}", state.id);
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
    fn test_schema_covers_every_event_flag() {
        let schema = EventWebhookHandler.schema();
        for flag in EVENT_FLAGS {
            let attr = &schema.attributes[*flag];
            assert!(attr.flags.optional, "{} should be optional", flag);
            assert_eq!(attr.default, Some(json!(false)), "{} defaults off", flag);
        }
        assert_eq!(schema.attributes["enabled"].default, Some(json!(true)));
    }

    #[test]
    fn test_request_body_fills_event_defaults() {
        let bag = json!({"url": "https://example.com/hook", "bounce": true})
            .as_object()
            .unwrap()
            .clone();
        let body = request_body(&bag).unwrap();
        assert_eq!(body["enabled"], json!(true));
        assert_eq!(body["bounce"], json!(true));
        assert_eq!(body["click"], json!(false));
        assert_eq!(body["spam_report"], json!(false));
    }

    #[test]
    fn test_response_flattens_event_flags() {
        let resp: EventWebhookResponse = serde_json::from_value(json!({
            "id": "wh_1",
            "url": "https://example.com/hook",
            "enabled": true,
            "bounce": true,
            "delivered": false,
        }))
        .unwrap();
        let state = resp.into_state();
        assert_eq!(state.properties["bounce"], json!(true));
        assert_eq!(state.properties["open"], json!(false));
    }
}
