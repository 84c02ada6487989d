//! The CRUD orchestrator: validation, planning, locking and retry around
//! the per-resource handlers.
//!
//! The orchestrator is the single entry point for resource lifecycles. It
//! validates specs before any network call, serializes mutations per
//! logical identity, retries transient remote failures, and records
//! terminal outcomes in a ledger so a retried request id observes the same
//! result instead of re-executing.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, RwLock};

use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument, warn};

use crate::client::SendGridClient;
use crate::config::ProviderConfig;
use crate::diff::{diff, plan_create, plan_delete, replacement_bag};
use crate::error::ProviderError;
use crate::registry::{ResourceHandler, SchemaRegistry};
use crate::retry::RetryPolicy;
use crate::schema::Diagnostic;
use crate::types::{
    ChangeSet, OperationStatus, PlanAction, PropertyBag, ReplaceOrder, ResourceSpec, ResourceState,
};
use crate::validation;

/// Tracks which logical identities have a mutation in flight.
///
/// Acquisition is non-blocking: a second mutation on the same identity gets
/// [`ProviderError::Conflict`] instead of queueing. Mutations on different
/// identities proceed in parallel.
#[derive(Debug, Default)]
pub struct LockManager {
    held: Arc<Mutex<HashSet<String>>>,
}

/// A held identity lock; released on drop.
#[derive(Debug)]
pub struct IdentityLock {
    key: String,
    held: Arc<Mutex<HashSet<String>>>,
}

impl LockManager {
    /// Create an empty lock manager.
    pub fn new() -> Self {
        Self::default()
    }

    /// Try to lock a logical identity, failing with `Conflict` if another
    /// operation already holds it.
    pub fn try_acquire(&self, key: &str) -> Result<IdentityLock, ProviderError> {
        let mut held = lock_table(&self.held);
        if !held.insert(key.to_string()) {
            return Err(ProviderError::Conflict(format!(
                "another operation on '{}' is in flight",
                key
            )));
        }
        Ok(IdentityLock {
            key: key.to_string(),
            held: Arc::clone(&self.held),
        })
    }

    /// Whether the identity is currently locked.
    pub fn is_held(&self, key: &str) -> bool {
        lock_table(&self.held).contains(key)
    }
}

impl Drop for IdentityLock {
    fn drop(&mut self) {
        lock_table(&self.held).remove(&self.key);
    }
}

// A panic while holding the table mutex cannot leave the set inconsistent;
// recover the guard instead of propagating the poison.
fn lock_table(held: &Mutex<HashSet<String>>) -> std::sync::MutexGuard<'_, HashSet<String>> {
    held.lock().unwrap_or_else(|e| e.into_inner())
}

/// The recorded terminal result of a mutating operation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "outcome")]
pub enum OperationOutcome {
    /// The operation produced a new observed state (`None` after a delete
    /// half of a replace that found nothing to recreate).
    State {
        /// The resulting state, if any.
        state: Option<ResourceState>,
    },
    /// The remote entity was deleted.
    Deleted,
    /// The operation failed.
    Failed {
        /// Machine-readable error code (see [`ProviderError::code`]).
        code: String,
        /// Human-readable message.
        message: String,
        /// The attribute the error points at, if any.
        field: Option<String>,
    },
}

impl OperationOutcome {
    /// Record a handler result as an outcome.
    pub fn from_result(result: &Result<Option<ResourceState>, ProviderError>) -> Self {
        match result {
            Ok(state) => Self::State {
                state: state.clone(),
            },
            Err(err) => Self::failure(err),
        }
    }

    /// Record a failure.
    pub fn failure(err: &ProviderError) -> Self {
        Self::Failed {
            code: err.code().to_string(),
            message: err.to_string(),
            field: err.field().map(str::to_string),
        }
    }

    fn terminal_status(&self) -> OperationStatus {
        match self {
            Self::Failed { .. } => OperationStatus::Failed,
            _ => OperationStatus::Succeeded,
        }
    }
}

/// What the ledger knows about a request id.
#[derive(Debug, Clone, PartialEq)]
pub enum LedgerCheck {
    /// First time this id is seen; the operation should execute.
    New,
    /// The id is mid-flight on another task.
    InFlight(OperationStatus),
    /// The id already finished; replay the recorded outcome.
    Done(OperationOutcome),
}

#[derive(Debug, Clone)]
struct LedgerEntry {
    status: OperationStatus,
    outcome: Option<OperationOutcome>,
}

/// Records operation lifecycles keyed by request id.
///
/// A retried request with an id the ledger has already driven to a terminal
/// state gets the recorded outcome back; it never re-executes the remote
/// calls. Ids only move forward: `Received -> Validated -> Executing ->
/// Succeeded | Failed`.
///
/// Entries are retained until [`forget`](Self::forget) is called for the id,
/// so replay keeps working however late a caller retries. Callers that know
/// an id will never be retried again can forget it to bound the ledger.
#[derive(Debug, Default)]
pub struct OperationLedger {
    entries: Mutex<HashMap<String, LedgerEntry>>,
}

impl OperationLedger {
    /// Create an empty ledger.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a request id, or report what is already known about it.
    pub fn begin(&self, request_id: &str) -> LedgerCheck {
        let mut entries = self.entries();
        match entries.get(request_id) {
            Some(entry) => match &entry.outcome {
                Some(outcome) => LedgerCheck::Done(outcome.clone()),
                None => LedgerCheck::InFlight(entry.status),
            },
            None => {
                entries.insert(
                    request_id.to_string(),
                    LedgerEntry {
                        status: OperationStatus::Received,
                        outcome: None,
                    },
                );
                LedgerCheck::New
            },
        }
    }

    /// Advance a non-terminal status (`Validated` or `Executing`).
    pub fn advance(&self, request_id: &str, status: OperationStatus) {
        debug_assert!(!status.is_terminal());
        if let Some(entry) = self.entries().get_mut(request_id) {
            if entry.outcome.is_none() {
                entry.status = status;
            }
        }
    }

    /// Record the terminal outcome for a request id.
    pub fn complete(&self, request_id: &str, outcome: OperationOutcome) {
        let mut entries = self.entries();
        let status = outcome.terminal_status();
        entries.insert(
            request_id.to_string(),
            LedgerEntry {
                status,
                outcome: Some(outcome),
            },
        );
    }

    /// The current status of a request id, if known.
    pub fn status(&self, request_id: &str) -> Option<OperationStatus> {
        self.entries().get(request_id).map(|e| e.status)
    }

    /// Drop a terminal entry once the caller no longer needs its replay.
    ///
    /// In-flight ids are kept so a concurrent retry still sees them.
    pub fn forget(&self, request_id: &str) {
        let mut entries = self.entries();
        if entries
            .get(request_id)
            .is_some_and(|e| e.outcome.is_some())
        {
            entries.remove(request_id);
        }
    }

    fn entries(&self) -> std::sync::MutexGuard<'_, HashMap<String, LedgerEntry>> {
        self.entries.lock().unwrap_or_else(|e| e.into_inner())
    }
}

/// Drives resource lifecycles: validate, plan, lock, execute with retry.
pub struct CrudOrchestrator {
    registry: SchemaRegistry,
    client: RwLock<Option<Arc<SendGridClient>>>,
    retry: RetryPolicy,
    locks: LockManager,
    ledger: OperationLedger,
}

impl CrudOrchestrator {
    /// Create an orchestrator over a registry with the default retry policy.
    ///
    /// No remote operation works until [`configure`](Self::configure) has
    /// succeeded.
    pub fn new(registry: SchemaRegistry) -> Self {
        Self {
            registry,
            client: RwLock::new(None),
            retry: RetryPolicy::default(),
            locks: LockManager::new(),
            ledger: OperationLedger::new(),
        }
    }

    /// Replace the retry policy.
    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// The registry this orchestrator serves.
    pub fn registry(&self) -> &SchemaRegistry {
        &self.registry
    }

    /// The operation ledger (used by the protocol server for replay).
    pub fn ledger(&self) -> &OperationLedger {
        &self.ledger
    }

    /// Build and install the shared client from provider configuration.
    pub fn configure(&self, config: &ProviderConfig) -> Result<(), ProviderError> {
        let client = config.build_client()?;
        info!(base_url = client.base_url(), "Provider configured");
        *self.client_slot() = Some(Arc::new(client));
        Ok(())
    }

    /// Install an already-built client (used by tests against a mock API).
    pub fn configure_with_client(&self, client: SendGridClient) {
        *self.client_slot() = Some(Arc::new(client));
    }

    fn client(&self) -> Result<Arc<SendGridClient>, ProviderError> {
        self.client
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
            .ok_or_else(|| {
                ProviderError::Configuration(
                    "provider is not configured; call Configure first".to_string(),
                )
            })
    }

    fn client_slot(&self) -> std::sync::RwLockWriteGuard<'_, Option<Arc<SendGridClient>>> {
        self.client.write().unwrap_or_else(|e| e.into_inner())
    }

    /// Validate a spec against its schema and the handler's cross-field
    /// rules. Returns all diagnostics; no network calls are made.
    pub fn validate(&self, spec: &ResourceSpec) -> Result<Vec<Diagnostic>, ProviderError> {
        let handler = self.registry.lookup(&spec.type_name)?;
        let mut diags = validation::validate(&handler.schema(), &spec.properties);
        // Cross-field rules only fire on a structurally valid bag.
        if diags.is_empty() {
            diags.extend(handler.validate_extra(&spec.properties));
        }
        Ok(diags)
    }

    fn validate_or_fail(&self, spec: &ResourceSpec) -> Result<Arc<dyn ResourceHandler>, ProviderError> {
        let handler = self.registry.lookup(&spec.type_name)?;
        let mut diags = validation::validate(&handler.schema(), &spec.properties);
        if diags.is_empty() {
            diags.extend(handler.validate_extra(&spec.properties));
        }
        if let Some(err) = validation::first_error(&diags) {
            return Err(ProviderError::Validation {
                message: err.summary.clone(),
                field: err.attribute.clone(),
            });
        }
        Ok(handler)
    }

    /// Compute the plan for bringing `old` to the desired `spec`.
    ///
    /// `None` observed state plans a create; otherwise the change set comes
    /// from the schema-driven diff. The spec must validate first.
    pub fn plan(
        &self,
        old: Option<&ResourceState>,
        spec: &ResourceSpec,
    ) -> Result<ChangeSet, ProviderError> {
        let handler = self.validate_or_fail(spec)?;
        let schema = handler.schema();
        let plan = match old {
            None => plan_create(&schema, spec),
            Some(old) => diff(&schema, old, spec, handler.replace_order()),
        };
        debug!(
            resource = %spec.logical_identity(),
            action = ?plan.action,
            changed = plan.changes.len(),
            "Planned"
        );
        Ok(plan)
    }

    /// Compute the plan for deleting an observed state.
    pub fn plan_removal(&self, old: &ResourceState) -> ChangeSet {
        plan_delete(old)
    }

    /// Create the remote entity described by `spec`.
    ///
    /// When the spec pins an identity, an existing remote entity with that
    /// identity fails with `AlreadyExists` before anything is created, so a
    /// retried create never produces a duplicate.
    #[instrument(skip(self, spec), fields(resource = %spec.logical_identity()))]
    pub async fn create(&self, spec: &ResourceSpec) -> Result<ResourceState, ProviderError> {
        let handler = self.validate_or_fail(spec)?;
        let client = self.client()?;
        let _lock = self.locks.try_acquire(&spec.logical_identity())?;

        if let Some(identity) = &spec.identity {
            let probe = ResourceState::new(
                spec.type_name.clone(),
                identity.clone(),
                spec.properties.clone(),
            );
            let existing = self
                .retry
                .run("read", || handler.read(&client, &probe))
                .await?;
            if existing.is_some() {
                return Err(ProviderError::AlreadyExists(spec.logical_identity()));
            }
        }

        let state = self
            .retry
            .run("create", || handler.create(&client, &spec.properties))
            .await?;
        info!(id = %state.id, "Created");
        Ok(state)
    }

    /// Refresh an observed state from the remote API.
    ///
    /// Returns `Ok(None)` when the remote entity no longer exists (deleted
    /// out-of-band); callers treat that as an orphan to recreate or forget.
    #[instrument(skip(self, state), fields(resource = %state.logical_identity()))]
    pub async fn read(&self, state: &ResourceState) -> Result<Option<ResourceState>, ProviderError> {
        let handler = self.registry.lookup(&state.type_name)?;
        let client = self.client()?;
        let observed = self
            .retry
            .run("read", || handler.read(&client, state))
            .await?;
        if observed.is_none() {
            warn!("Remote entity is gone");
        }
        Ok(observed)
    }

    /// Update the remote entity in place.
    ///
    /// A change set that requires replacement is rejected with
    /// `FailedPrecondition`; the caller must plan and apply a replace
    /// instead. An unchanged spec returns the old state without any remote
    /// call.
    #[instrument(skip(self, state, spec), fields(resource = %state.logical_identity()))]
    pub async fn update(
        &self,
        state: &ResourceState,
        spec: &ResourceSpec,
    ) -> Result<ResourceState, ProviderError> {
        let handler = self.validate_or_fail(spec)?;
        let schema = handler.schema();
        let plan = diff(&schema, state, spec, handler.replace_order());
        if plan.requires_replace() {
            return Err(ProviderError::FailedPrecondition(format!(
                "changes to [{}] require replacing {}",
                plan.replace_triggers().join(", "),
                state.logical_identity()
            )));
        }
        if !plan.has_changes() {
            debug!("No changes, skipping update");
            return Ok(state.clone());
        }

        let client = self.client()?;
        let _lock = self.locks.try_acquire(&state.logical_identity())?;
        let desired = validation::apply_defaults(&schema, &spec.properties);
        let updated = self
            .retry
            .run("update", || handler.update(&client, state, &desired))
            .await?;
        info!(id = %updated.id, "Updated");
        Ok(updated)
    }

    /// Delete the remote entity. A remote 404 counts as success.
    #[instrument(skip(self, state), fields(resource = %state.logical_identity()))]
    pub async fn delete(&self, state: &ResourceState) -> Result<(), ProviderError> {
        let handler = self.registry.lookup(&state.type_name)?;
        let client = self.client()?;
        let _lock = self.locks.try_acquire(&state.logical_identity())?;
        match self
            .retry
            .run("delete", || handler.delete(&client, state))
            .await
        {
            Ok(()) => {},
            Err(e) if e.is_not_found() => {
                debug!("Already gone");
            },
            Err(e) => return Err(e),
        }
        info!("Deleted");
        Ok(())
    }

    /// Execute a previously computed change set.
    ///
    /// Returns the resulting observed state, or `None` after a delete. A
    /// replace plan never calls the update endpoint: it deletes and
    /// recreates (or the reverse) per the plan's ordering, under a single
    /// identity lock so no concurrent mutation interleaves between the two
    /// halves.
    #[instrument(skip_all, fields(action = ?plan.action))]
    pub async fn apply(
        &self,
        plan: &ChangeSet,
        old: Option<&ResourceState>,
        spec: Option<&ResourceSpec>,
    ) -> Result<Option<ResourceState>, ProviderError> {
        match plan.action {
            PlanAction::NoOp => Ok(old.cloned()),
            PlanAction::Create => {
                let spec = require_spec(spec)?;
                Ok(Some(self.create(spec).await?))
            },
            PlanAction::Update => {
                let old = require_state(old)?;
                let spec = require_spec(spec)?;
                Ok(Some(self.update(old, spec).await?))
            },
            PlanAction::Replace { order } => {
                let old = require_state(old)?;
                let spec = require_spec(spec)?;
                self.replace(old, spec, order).await.map(Some)
            },
            PlanAction::Delete => {
                let old = require_state(old)?;
                self.delete(old).await?;
                Ok(None)
            },
        }
    }

    async fn replace(
        &self,
        old: &ResourceState,
        spec: &ResourceSpec,
        order: ReplaceOrder,
    ) -> Result<ResourceState, ProviderError> {
        let handler = self.validate_or_fail(spec)?;
        let client = self.client()?;
        let schema = handler.schema();
        let desired = replacement_bag(&schema, spec);
        // One lock spans both halves of the replacement.
        let _lock = self.locks.try_acquire(&old.logical_identity())?;

        let state = match order {
            ReplaceOrder::DeleteThenCreate => {
                self.delete_for_replace(&*handler, &client, old).await?;
                self.create_for_replace(&*handler, &client, &desired).await?
            },
            ReplaceOrder::CreateThenDelete => {
                let created = self.create_for_replace(&*handler, &client, &desired).await?;
                self.delete_for_replace(&*handler, &client, old).await?;
                created
            },
        };
        info!(old_id = %old.id, new_id = %state.id, "Replaced");
        Ok(state)
    }

    async fn create_for_replace(
        &self,
        handler: &dyn ResourceHandler,
        client: &SendGridClient,
        desired: &PropertyBag,
    ) -> Result<ResourceState, ProviderError> {
        self.retry
            .run("create", || handler.create(client, desired))
            .await
    }

    async fn delete_for_replace(
        &self,
        handler: &dyn ResourceHandler,
        client: &SendGridClient,
        old: &ResourceState,
    ) -> Result<(), ProviderError> {
        match self
            .retry
            .run("delete", || handler.delete(client, old))
            .await
        {
            Ok(()) => Ok(()),
            Err(e) if e.is_not_found() => Ok(()),
            Err(e) => Err(e),
        }
    }
}

fn require_spec(spec: Option<&ResourceSpec>) -> Result<&ResourceSpec, ProviderError> {
    spec.ok_or_else(|| {
        ProviderError::FailedPrecondition("this plan requires a desired spec".to_string())
    })
}

fn require_state(state: Option<&ResourceState>) -> Result<&ResourceState, ProviderError> {
    state.ok_or_else(|| {
        ProviderError::FailedPrecondition("this plan requires an observed state".to_string())
    })
}

impl std::fmt::Debug for CrudOrchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CrudOrchestrator")
            .field("registry", &self.registry)
            .field("retry", &self.retry)
            .finish_non_exhaustive()
    }
}
