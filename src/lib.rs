//! SendGrid resource provider core.
//!
//! This crate maps declarative resource specifications onto the SendGrid
//! v3 REST API: a schema registry describes each resource type, a diff
//! engine computes minimal change sets, and a CRUD orchestrator executes
//! them with per-identity locking and retry. A small protocol server
//! exposes the whole thing to an engine over newline-delimited JSON.
//!
//! # Overview
//!
//! - **Schema types**: attribute types, flags and per-resource schemas
//! - **ResourceHandler trait**: one implementation per SendGrid resource
//! - **Diff engine**: deterministic, schema-driven change classification
//! - **CRUD orchestrator**: validate, plan, lock, execute with retry
//! - **Protocol server**: JSON frames over TCP with the handshake protocol
//! - **Logging**: `tracing` to stderr, stdout stays clean for the handshake
//!
//! # Quick Start
//!
//! ```ignore
//! use sendgrid_provider::{init_logging, serve, CrudOrchestrator};
//! use sendgrid_provider::resources::builtin_registry;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     init_logging();
//!     serve(CrudOrchestrator::new(builtin_registry())).await
//! }
//! ```
//!
//! # Handshake Protocol
//!
//! When the server starts via [`serve`], it outputs a handshake string to
//! stdout:
//!
//! ```text
//! SENDGRID_PROVIDER|1|127.0.0.1:41713
//! ```
//!
//! Format: `SENDGRID_PROVIDER|<protocol_version>|<address>`. The engine
//! spawns the provider as a subprocess, parses this line and connects over
//! TCP.
//!
//! # Operations
//!
//! - **GetSchema**: Returns the schema for one or all resource types
//! - **Configure**: Installs the API credentials; required before anything
//!   remote
//! - **Validate**: Checks a spec against its schema without network calls
//! - **Plan**: Computes the change set between observed and desired state
//! - **Create/Read/Update/Delete**: Resource lifecycle operations

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod client;
pub mod config;
pub mod diff;
pub mod error;
pub mod logging;
pub mod orchestrator;
pub mod proto;
pub mod registry;
pub mod resources;
pub mod retry;
pub mod schema;
pub mod server;
pub mod testing;
pub mod types;
pub mod validation;

// Re-export main types at crate root
pub use client::SendGridClient;
pub use config::ProviderConfig;
pub use error::ProviderError;
pub use logging::{init_logging, init_logging_with_default, try_init_logging};
pub use orchestrator::CrudOrchestrator;
pub use proto::{ProviderRequest, ProviderResponse, HANDSHAKE_PREFIX, PROTOCOL_VERSION};
pub use registry::{ResourceHandler, SchemaRegistry};
pub use retry::RetryPolicy;
pub use server::{serve, serve_on, serve_with_options, ServeOptions};
pub use types::{
    ChangeKind, ChangeSet, PlanAction, PropertyBag, ReplaceOrder, ResourceSpec, ResourceState,
};
pub use validation::{is_valid, validate, validate_result};

// Re-export async_trait for handler implementations
pub use async_trait::async_trait;

// Re-export commonly used external types
pub use serde_json;
pub use tracing;
