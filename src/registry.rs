//! The resource handler trait and the schema registry.
//!
//! Every resource type registers one [`ResourceHandler`]: its schema plus
//! the CRUD calls against the SendGrid API. The registry is an explicit
//! object handed to the orchestrator and server at construction; there is
//! no ambient global.

use std::collections::BTreeMap;
use std::sync::Arc;

use crate::client::SendGridClient;
use crate::error::ProviderError;
use crate::schema::{Diagnostic, Schema};
use crate::types::{PropertyBag, ReplaceOrder, ResourceState};

/// The per-resource-type contract: schema, replace rules and remote CRUD.
///
/// Handlers are stateless; the shared client carries auth. `read` returns
/// `Ok(None)` when the remote entity no longer exists (deleted out-of-band)
/// so the caller can surface the orphan instead of resurrecting it.
#[async_trait::async_trait]
pub trait ResourceHandler: Send + Sync + 'static {
    /// The registry key for this resource type (e.g. `api_key`).
    fn type_name(&self) -> &'static str;

    /// The property bag schema for this resource type.
    fn schema(&self) -> Schema;

    /// How a replacement plan is ordered for this resource.
    fn replace_order(&self) -> ReplaceOrder {
        ReplaceOrder::DeleteThenCreate
    }

    /// Cross-field validation beyond what the schema can express.
    fn validate_extra(&self, properties: &PropertyBag) -> Vec<Diagnostic> {
        let _ = properties;
        Vec::new()
    }

    /// Create a new remote entity from the desired properties.
    async fn create(
        &self,
        client: &SendGridClient,
        properties: &PropertyBag,
    ) -> Result<ResourceState, ProviderError>;

    /// Read the current remote state; `Ok(None)` means the entity is gone.
    async fn read(
        &self,
        client: &SendGridClient,
        state: &ResourceState,
    ) -> Result<Option<ResourceState>, ProviderError>;

    /// Apply an in-place update with the desired properties.
    async fn update(
        &self,
        client: &SendGridClient,
        state: &ResourceState,
        properties: &PropertyBag,
    ) -> Result<ResourceState, ProviderError>;

    /// Delete the remote entity.
    async fn delete(
        &self,
        client: &SendGridClient,
        state: &ResourceState,
    ) -> Result<(), ProviderError>;
}

/// Static table of resource types known to the provider.
#[derive(Default, Clone)]
pub struct SchemaRegistry {
    handlers: BTreeMap<String, Arc<dyn ResourceHandler>>,
}

impl SchemaRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a handler under its type name.
    pub fn register(mut self, handler: Arc<dyn ResourceHandler>) -> Self {
        self.handlers.insert(handler.type_name().to_string(), handler);
        self
    }

    /// Look up the handler for a resource type.
    pub fn lookup(&self, type_name: &str) -> Result<Arc<dyn ResourceHandler>, ProviderError> {
        self.handlers
            .get(type_name)
            .cloned()
            .ok_or_else(|| ProviderError::UnknownResource(type_name.to_string()))
    }

    /// Look up the schema for a resource type.
    pub fn schema(&self, type_name: &str) -> Result<Schema, ProviderError> {
        Ok(self.lookup(type_name)?.schema())
    }

    /// All registered type names, in stable order.
    pub fn type_names(&self) -> Vec<String> {
        self.handlers.keys().cloned().collect()
    }

    /// All schemas keyed by type name, in stable order.
    pub fn schemas(&self) -> BTreeMap<String, Schema> {
        self.handlers
            .iter()
            .map(|(name, handler)| (name.clone(), handler.schema()))
            .collect()
    }
}

impl std::fmt::Debug for SchemaRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SchemaRegistry")
            .field("types", &self.type_names())
            .finish()
    }
}
