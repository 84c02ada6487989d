//! The SendGrid global suppression resource.
//!
//! A global suppression is the presence of one email address on the global
//! unsubscribe list. There is nothing to mutate: changing the address means
//! suppressing a different recipient, so every change is a replacement.

use serde::Deserialize;
use serde_json::json;

use crate::client::SendGridClient;
use crate::error::ProviderError;
use crate::registry::ResourceHandler;
use crate::schema::{Attribute, Schema};
use crate::types::{PropertyBag, ResourceState};

use super::require_str;

/// Handler for `global_suppression` resources.
pub struct GlobalSuppressionHandler;

#[derive(Debug, Deserialize)]
struct SuppressionCreateResponse {
    #[serde(default)]
    recipient_emails: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct SuppressionReadResponse {
    #[serde(default)]
    recipient_email: String,
}

fn state_for(email: &str) -> ResourceState {
    let mut bag = PropertyBag::new();
    bag.insert("email".to_string(), json!(email));
    ResourceState::new("global_suppression", email.to_string(), bag)
}

#[async_trait::async_trait]
impl ResourceHandler for GlobalSuppressionHandler {
    fn type_name(&self) -> &'static str {
        "global_suppression"
    }

    fn schema(&self) -> Schema {
        Schema::v0().with_attribute(
            "email",
            Attribute::required_string()
                .with_force_new()
                .with_description("The email address to suppress globally"),
        )
    }

    async fn create(
        &self,
        client: &SendGridClient,
        properties: &PropertyBag,
    ) -> Result<ResourceState, ProviderError> {
        let email = require_str(properties, "email")?;
        let body = json!({ "recipient_emails": [email] });
        let resp: SuppressionCreateResponse = client
            .post("/v3/asm/suppressions/global", &body)
            .await?;
        if !resp.recipient_emails.iter().any(|e| e == email) {
            return Err(ProviderError::RemoteRejected {
                status: 200,
                message: format!("address '{}' was not added to the suppression list", email),
                field: Some("email".to_string()),
            });
        }
        Ok(state_for(email))
    }

    async fn read(
        &self,
        client: &SendGridClient,
        state: &ResourceState,
    ) -> Result<Option<ResourceState>, ProviderError> {
        let path = format!(
            "/v3/asm/suppressions/global/{}",
            SendGridClient::encode_path_segment(&state.id)
        );
        match client.get::<SuppressionReadResponse>(&path).await {
            // The endpoint answers 200 with an empty body when the address
            // is not suppressed.
            Ok(resp) if resp.recipient_email.is_empty() => Ok(None),
            Ok(resp) => Ok(Some(state_for(&resp.recipient_email))),
            Err(e) if e.is_not_found() => Ok(None),
            Err(e) => Err(e),
        }
    }

    async fn update(
        &self,
        _client: &SendGridClient,
        _state: &ResourceState,
        _properties: &PropertyBag,
    ) -> Result<ResourceState, ProviderError> {
        // Unreachable through planning (email forces replacement), kept as a
        // hard failure for direct callers.
        Err(ProviderError::FailedPrecondition(
            "global suppressions cannot be updated in place".to_string(),
        ))
    }

    async fn delete(
        &self,
        client: &SendGridClient,
        state: &ResourceState,
    ) -> Result<(), ProviderError> {
        let path = format!(
            "/v3/asm/suppressions/global/{}",
            SendGridClient::encode_path_segment(&state.id)
        );
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
    use serde_json::from_value;

    #[test]
    fn test_every_change_is_a_replacement() {
        let schema = GlobalSuppressionHandler.schema();
        let force_new: Vec<_> = schema.force_new_attributes().collect();
        assert_eq!(force_new, vec!["email"]);
    }

    #[test]
    fn test_empty_read_response_means_gone() {
        let resp: SuppressionReadResponse = from_value(json!({})).unwrap();
        assert!(resp.recipient_email.is_empty());

        let resp: SuppressionReadResponse =
            from_value(json!({"recipient_email": "a@example.com"})).unwrap();
        assert_eq!(resp.recipient_email, "a@example.com");
    }

    #[test]
    fn test_state_identity_is_the_email() {
        let state = state_for("a@example.com");
        assert_eq!(state.id, "a@example.com");
        assert_eq!(state.logical_identity(), "global_suppression/a@example.com");
    }
}
