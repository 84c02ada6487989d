//! The SendGrid alert resource.
//!
//! Two kinds of alert exist: `usage_limit` fires when a percentage of the
//! monthly email quota is reached, `stats_notification` mails aggregate
//! stats on a schedule. Which extra field is required depends on the kind.

use serde::Deserialize;
use serde_json::{json, Value};

use crate::client::SendGridClient;
use crate::error::ProviderError;
use crate::registry::ResourceHandler;
use crate::schema::{Attribute, Diagnostic, Schema};
use crate::types::{PropertyBag, ResourceState};

use super::{opt_i64, opt_str, require_str};

/// Handler for `alert` resources.
pub struct AlertHandler;

#[derive(Debug, Deserialize)]
struct AlertResponse {
    id: i64,
    #[serde(rename = "type")]
    alert_type: String,
    email_to: String,
    #[serde(default)]
    frequency: Option<String>,
    #[serde(default)]
    percentage: Option<i64>,
    #[serde(default)]
    created_at: i64,
    #[serde(default)]
    updated_at: i64,
}

impl AlertResponse {
    fn into_state(self) -> ResourceState {
        let mut bag = PropertyBag::new();
        bag.insert("type".to_string(), json!(self.alert_type));
        bag.insert("email_to".to_string(), json!(self.email_to));
        if let Some(v) = self.frequency {
            bag.insert("frequency".to_string(), json!(v));
        }
        if let Some(v) = self.percentage {
            bag.insert("percentage".to_string(), json!(v));
        }
        bag.insert("created_at".to_string(), json!(self.created_at));
        bag.insert("updated_at".to_string(), json!(self.updated_at));
        ResourceState::new("alert", self.id.to_string(), bag)
    }
}

fn update_body(properties: &PropertyBag) -> Value {
    // Type is immutable; only the per-kind settings travel in an update.
    let mut body = PropertyBag::new();
    if let Some(v) = opt_str(properties, "email_to") {
        body.insert("email_to".to_string(), json!(v));
    }
    if let Some(v) = opt_str(properties, "frequency") {
        body.insert("frequency".to_string(), json!(v));
    }
    if let Some(v) = opt_i64(properties, "percentage") {
        body.insert("percentage".to_string(), json!(v));
    }
    Value::Object(body)
}

#[async_trait::async_trait]
impl ResourceHandler for AlertHandler {
    fn type_name(&self) -> &'static str {
        "alert"
    }

    fn schema(&self) -> Schema {
        Schema::v0()
            .with_attribute(
                "type",
                Attribute::required_string()
                    .with_force_new()
                    .with_description("Either usage_limit or stats_notification"),
            )
            .with_attribute(
                "email_to",
                Attribute::required_string().with_description("Where the alert is sent"),
            )
            .with_attribute(
                "frequency",
                Attribute::optional_string()
                    .with_description("How often stats are mailed: daily, weekly or monthly"),
            )
            .with_attribute(
                "percentage",
                Attribute::optional_int64()
                    .with_description("Usage percentage that triggers the alert"),
            )
            .with_attribute("created_at", Attribute::computed_int64())
            .with_attribute("updated_at", Attribute::computed_int64())
    }

    fn validate_extra(&self, properties: &PropertyBag) -> Vec<Diagnostic> {
        let mut diags = Vec::new();
        match opt_str(properties, "type") {
            Some("usage_limit") => {
                if opt_i64(properties, "percentage").is_none() {
                    diags.push(
                        Diagnostic::error("Missing percentage")
                            .with_detail("usage_limit alerts require a percentage")
                            .with_attribute("percentage"),
                    );
                }
            },
            Some("stats_notification") => match opt_str(properties, "frequency") {
                Some("daily") | Some("weekly") | Some("monthly") => {},
                Some(_) => {
                    diags.push(
                        Diagnostic::error("Invalid frequency")
                            .with_detail("Frequency must be daily, weekly or monthly")
                            .with_attribute("frequency"),
                    );
                },
                None => {
                    diags.push(
                        Diagnostic::error("Missing frequency")
                            .with_detail("stats_notification alerts require a frequency")
                            .with_attribute("frequency"),
                    );
                },
            },
            Some(other) => {
                diags.push(
                    Diagnostic::error("Invalid alert type")
                        .with_detail(format!(
                            "'{}' is not a valid alert type; use usage_limit or stats_notification",
                            other
                        ))
                        .with_attribute("type"),
                );
            },
            None => {},
        }
        diags
    }

    async fn create(
        &self,
        client: &SendGridClient,
        properties: &PropertyBag,
    ) -> Result<ResourceState, ProviderError> {
        let mut body = PropertyBag::new();
        body.insert("type".to_string(), json!(require_str(properties, "type")?));
        body.insert(
            "email_to".to_string(),
            json!(require_str(properties, "email_to")?),
        );
        if let Some(v) = opt_str(properties, "frequency") {
            body.insert("frequency".to_string(), json!(v));
        }
        if let Some(v) = opt_i64(properties, "percentage") {
            body.insert("percentage".to_string(), json!(v));
        }
        let resp: AlertResponse = client.post("/v3/alerts", &Value::Object(body)).await?;
        Ok(resp.into_state())
    }

    async fn read(
        &self,
        client: &SendGridClient,
        state: &ResourceState,
    ) -> Result<Option<ResourceState>, ProviderError> {
        let path = format!("/v3/alerts/{}", state.id);
        match client.get::<AlertResponse>(&path).await {
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
        let body = update_body(properties);
        let path = format!("/v3/alerts/{}", state.id);
        let resp: AlertResponse = client.patch(&path, &body).await?;
        Ok(resp.into_state())
    }

    async fn delete(
        &self,
        client: &SendGridClient,
        state: &ResourceState,
    ) -> Result<(), ProviderError> {
        let path = format!("/v3/alerts/{}", state.id);
        match client.delete(&path).await {
            Ok(()) => Ok(()),
            Err(e) if e.is_not_found() => Ok(()),
            Err(e) => Err(e),
        }
    }
}
