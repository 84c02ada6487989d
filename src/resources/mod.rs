//! Built-in SendGrid resource handlers.
//!
//! Each module maps one SendGrid resource type onto the
//! [`ResourceHandler`](crate::registry::ResourceHandler) contract: schema,
//! replace rules and the v3 API endpoints.

use std::sync::Arc;

use serde_json::Value;

use crate::error::ProviderError;
use crate::registry::SchemaRegistry;
use crate::types::PropertyBag;

pub mod alert;
pub mod api_key;
pub mod domain_authentication;
pub mod event_webhook;
pub mod global_suppression;
pub mod ip_pool;
pub mod link_branding;
pub mod template;
pub mod template_version;
pub mod unsubscribe_group;

/// Build the registry with every built-in resource type.
pub fn builtin_registry() -> SchemaRegistry {
    SchemaRegistry::new()
        .register(Arc::new(api_key::ApiKeyHandler))
        .register(Arc::new(template::TemplateHandler))
        .register(Arc::new(template_version::TemplateVersionHandler))
        .register(Arc::new(event_webhook::EventWebhookHandler))
        .register(Arc::new(domain_authentication::DomainAuthenticationHandler))
        .register(Arc::new(link_branding::LinkBrandingHandler))
        .register(Arc::new(ip_pool::IpPoolHandler))
        .register(Arc::new(unsubscribe_group::UnsubscribeGroupHandler))
        .register(Arc::new(global_suppression::GlobalSuppressionHandler))
        .register(Arc::new(alert::AlertHandler))
}

/// Fetch a required string property. Validation runs before handlers, so a
/// miss here is an internal invariant failure, not user error.
pub(crate) fn require_str<'a>(bag: &'a PropertyBag, key: &str) -> Result<&'a str, ProviderError> {
    bag.get(key)
        .and_then(Value::as_str)
        .ok_or_else(|| ProviderError::Internal(format!("missing required attribute '{}'", key)))
}

pub(crate) fn opt_str<'a>(bag: &'a PropertyBag, key: &str) -> Option<&'a str> {
    bag.get(key).and_then(Value::as_str)
}

pub(crate) fn opt_bool(bag: &PropertyBag, key: &str) -> Option<bool> {
    bag.get(key).and_then(Value::as_bool)
}

pub(crate) fn opt_i64(bag: &PropertyBag, key: &str) -> Option<i64> {
    bag.get(key).and_then(Value::as_i64)
}

/// Copy a property into an outgoing request body if it is present and
/// non-null.
pub(crate) fn copy_if_set(body: &mut PropertyBag, bag: &PropertyBag, key: &str) {
    if let Some(value) = bag.get(key) {
        if !value.is_null() {
            body.insert(key.to_string(), value.clone());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_builtin_registry_covers_catalog() {
        let registry = builtin_registry();
        let names = registry.type_names();
        for expected in [
            "alert",
            "api_key",
            "domain_authentication",
            "event_webhook",
            "global_suppression",
            "ip_pool",
            "link_branding",
            "template",
            "template_version",
            "unsubscribe_group",
        ] {
            assert!(names.contains(&expected.to_string()), "missing {}", expected);
        }
        assert_eq!(names.len(), 10);
    }

    #[test]
    fn test_all_schemas_validate_their_own_shape() {
        // Every schema must declare at least one required input.
        let registry = builtin_registry();
        for (name, schema) in registry.schemas() {
            assert!(
                schema.attributes.values().any(|a| a.flags.required),
                "{} has no required attribute",
                name
            );
        }
    }

    #[test]
    fn test_property_helpers() {
        let bag = json!({"name": "x", "enabled": true, "percentage": 90, "none": null})
            .as_object()
            .unwrap()
            .clone();

        assert_eq!(require_str(&bag, "name").unwrap(), "x");
        assert!(require_str(&bag, "missing").is_err());
        assert_eq!(opt_bool(&bag, "enabled"), Some(true));
        assert_eq!(opt_i64(&bag, "percentage"), Some(90));
        assert_eq!(opt_str(&bag, "none"), None);

        let mut body = PropertyBag::new();
        copy_if_set(&mut body, &bag, "name");
        copy_if_set(&mut body, &bag, "none");
        copy_if_set(&mut body, &bag, "missing");
        assert_eq!(body.len(), 1);
    }
}
