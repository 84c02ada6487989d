//! The wire protocol: newline-delimited JSON frames exchanged with the
//! engine over TCP.
//!
//! Each request is one JSON object on one line, tagged by `op`; each
//! response is one JSON object tagged by `result`. Mutating requests carry
//! a `request_id` the server uses for exactly-once terminal reporting.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::config::ProviderConfig;
use crate::error::ProviderError;
use crate::orchestrator::OperationOutcome;
use crate::schema::{Diagnostic, Schema};
use crate::types::{ChangeSet, ResourceSpec, ResourceState};

/// Handshake prefix printed to stdout when the server is ready.
pub const HANDSHAKE_PREFIX: &str = "SENDGRID_PROVIDER";

/// Protocol version, second field of the handshake line.
pub const PROTOCOL_VERSION: u32 = 1;

/// A request frame from the engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "op")]
pub enum ProviderRequest {
    /// Fetch the schema for one resource type, or all of them.
    GetSchema {
        /// Restrict the response to this type.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        type_name: Option<String>,
    },
    /// Configure the provider; must succeed before any remote operation.
    Configure {
        /// Provider-level configuration.
        config: ProviderConfig,
    },
    /// Validate a spec without touching the remote API.
    Validate {
        /// The spec to validate.
        spec: ResourceSpec,
    },
    /// Compute the change set between observed and desired state.
    Plan {
        /// Observed state, absent when the resource does not exist yet.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        state: Option<ResourceState>,
        /// Desired spec.
        spec: ResourceSpec,
    },
    /// Create a remote entity.
    Create {
        /// Idempotency key for exactly-once reporting.
        request_id: String,
        /// Desired spec.
        spec: ResourceSpec,
    },
    /// Refresh observed state from the remote API.
    Read {
        /// The state to refresh.
        state: ResourceState,
    },
    /// Update a remote entity in place.
    Update {
        /// Idempotency key for exactly-once reporting.
        request_id: String,
        /// Observed state.
        state: ResourceState,
        /// Desired spec.
        spec: ResourceSpec,
    },
    /// Delete a remote entity.
    Delete {
        /// Idempotency key for exactly-once reporting.
        request_id: String,
        /// The state to delete.
        state: ResourceState,
    },
}

impl ProviderRequest {
    /// The idempotency key, for the requests that carry one.
    pub fn request_id(&self) -> Option<&str> {
        match self {
            Self::Create { request_id, .. }
            | Self::Update { request_id, .. }
            | Self::Delete { request_id, .. } => Some(request_id),
            _ => None,
        }
    }
}

/// A response frame to the engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "result")]
pub enum ProviderResponse {
    /// Schemas keyed by type name.
    Schemas {
        /// The requested schemas.
        schemas: BTreeMap<String, Schema>,
    },
    /// Configuration succeeded.
    Configured,
    /// Validation diagnostics (empty means valid).
    Diagnostics {
        /// All diagnostics found.
        diagnostics: Vec<Diagnostic>,
    },
    /// A computed change set.
    Plan {
        /// The change set.
        plan: ChangeSet,
    },
    /// Resulting observed state; `None` when the remote entity is gone.
    State {
        /// The state, if any.
        state: Option<ResourceState>,
    },
    /// A delete completed.
    Deleted,
    /// The operation failed.
    Error {
        /// Machine-readable error code.
        code: String,
        /// Human-readable message.
        message: String,
        /// The attribute the error points at, if any.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        field: Option<String>,
    },
}

impl From<&ProviderError> for ProviderResponse {
    fn from(err: &ProviderError) -> Self {
        Self::Error {
            code: err.code().to_string(),
            message: err.to_string(),
            field: err.field().map(str::to_string),
        }
    }
}

impl From<OperationOutcome> for ProviderResponse {
    fn from(outcome: OperationOutcome) -> Self {
        match outcome {
            OperationOutcome::State { state } => Self::State { state },
            OperationOutcome::Deleted => Self::Deleted,
            OperationOutcome::Failed {
                code,
                message,
                field,
            } => Self::Error {
                code,
                message,
                field,
            },
        }
    }
}
