//! Reconciliation engine.
//!
//! Keeps three projections of the routing table in step:
//!
//! | projection | owner |
//! |---|---|
//! | authoritative hash | [`RouteStore`] |
//! | table file | [`TableFile`] |
//! | live runtime map | [`ControlEndpoint`] |
//!
//! ## Event application order
//!
//! - add: append to table file → set in store → `add map`
//! - remove: rewrite table file without key → delete from store → `del map`
//!
//! Each change is checked against the store first: adding a present key and
//! removing an absent key are no-ops. The steps are not transactional. When a
//! step after the lookup fails, the key is marked for repair and the next
//! [`Reconciler::reconcile`] pass rebuilds the file from the store and re-sends
//! the key to the live map.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::time::Duration;

use serde::Serialize;

use mapway_core::{Action, ChangeEvent, ChangeRequest, InvalidEvent, RoutingEntry};
use mapway_table::{TableError, TableFile};

use crate::control::{ControlEndpoint, MapCommand};
use crate::deadline::with_deadline;
use crate::error::DaemonError;
use crate::store::RouteStore;

// ---------------------------------------------------------------------------
// Outcomes
// ---------------------------------------------------------------------------

/// Why a valid event changed nothing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    AlreadyExists,
    NotFound,
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SkipReason::AlreadyExists => f.write_str("already exists"),
            SkipReason::NotFound => f.write_str("not found"),
        }
    }
}

/// The step at which an event failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Lookup,
    TableFile,
    Store,
    ControlSocket,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Stage::Lookup => f.write_str("store lookup"),
            Stage::TableFile => f.write_str("table file"),
            Stage::Store => f.write_str("store"),
            Stage::ControlSocket => f.write_str("control socket"),
        }
    }
}

/// Result of handling one change event.
#[derive(Debug)]
pub enum EventOutcome {
    Applied {
        action: Action,
        key: String,
    },
    Skipped {
        action: Action,
        key: String,
        reason: SkipReason,
    },
    Invalid {
        reason: InvalidEvent,
    },
    Failed {
        action: Action,
        key: String,
        stage: Stage,
        error: DaemonError,
    },
}

impl EventOutcome {
    pub fn is_failure(&self) -> bool {
        matches!(self, EventOutcome::Failed { .. })
    }
}

/// What a reconciliation pass found and repaired.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ReconcileReport {
    /// In the store, missing from the table file.
    pub added: Vec<String>,
    /// In the table file, missing from the store.
    pub removed: Vec<String>,
    /// In both with a different value, or listed more than once in the file.
    pub updated: Vec<String>,
    /// Keys re-sent to the live map after an earlier failed event.
    pub refreshed: Vec<String>,
    /// Whether the table file was rewritten from the store.
    pub rewritten: bool,
}

impl ReconcileReport {
    pub fn is_clean(&self) -> bool {
        self.added.is_empty()
            && self.removed.is_empty()
            && self.updated.is_empty()
            && self.refreshed.is_empty()
    }
}

// ---------------------------------------------------------------------------
// Reconciler
// ---------------------------------------------------------------------------

pub struct Reconciler<S, C> {
    store: S,
    control: C,
    table: TableFile,
    /// Map name on the control socket: the table file path.
    map: String,
    op_timeout: Duration,
    /// Keys whose live-map state is unknown after a failed step.
    needs_repair: BTreeSet<String>,
}

impl<S: RouteStore, C: ControlEndpoint> Reconciler<S, C> {
    pub fn new(store: S, control: C, table: TableFile, op_timeout: Duration) -> Self {
        let map = table.path().display().to_string();
        Self {
            store,
            control,
            table,
            map,
            op_timeout,
            needs_repair: BTreeSet::new(),
        }
    }

    pub fn table(&self) -> &TableFile {
        &self.table
    }

    pub fn has_pending_repairs(&self) -> bool {
        !self.needs_repair.is_empty()
    }

    // -----------------------------------------------------------------------
    // Bootstrap
    // -----------------------------------------------------------------------

    /// Seed the table file from the whole store.
    ///
    /// An empty store leaves the file untouched. Returns the number of entries written.
    pub async fn bootstrap(&mut self) -> Result<usize, DaemonError> {
        let authoritative = self.store_get_all().await?;
        if authoritative.is_empty() {
            tracing::info!(
                path = %self.table.path().display(),
                "authoritative table is empty; table file left untouched",
            );
            return Ok(0);
        }

        let entries = to_entries(&authoritative);
        for entry in &entries {
            tracing::debug!(key = %entry.key, value = %entry.value, "seeding table entry");
        }
        let written = self.on_table(move |table| table.write_all(&entries)).await?;
        tracing::info!(
            path = %self.table.path().display(),
            entries = written,
            "table file seeded from authoritative store",
        );
        Ok(written)
    }

    // -----------------------------------------------------------------------
    // Events
    // -----------------------------------------------------------------------

    /// Decode, validate and apply one channel payload.
    pub async fn handle_payload(&mut self, payload: &str) -> EventOutcome {
        let request = match ChangeRequest::decode(payload) {
            Ok(request) => request,
            Err(err) => {
                tracing::warn!(error = %err, payload, "malformed change payload; treating as empty event");
                ChangeRequest::default()
            }
        };
        match ChangeEvent::try_from(request) {
            Ok(event) => self.apply(event).await,
            Err(reason) => EventOutcome::Invalid { reason },
        }
    }

    /// Apply one validated event across the three projections.
    pub async fn apply(&mut self, event: ChangeEvent) -> EventOutcome {
        let ChangeEvent { key, value, action } = event;

        let current = match self.store_get(&key).await {
            Ok(current) => current,
            Err(error) => {
                return EventOutcome::Failed {
                    action,
                    key,
                    stage: Stage::Lookup,
                    error,
                }
            }
        };

        let applied = match (action, current) {
            (Action::Add, Some(_)) => {
                return EventOutcome::Skipped {
                    action,
                    key,
                    reason: SkipReason::AlreadyExists,
                }
            }
            (Action::Remove, None) => {
                return EventOutcome::Skipped {
                    action,
                    key,
                    reason: SkipReason::NotFound,
                }
            }
            (Action::Add, None) => self.add(&key, &value).await,
            (Action::Remove, Some(_)) => self.remove(&key).await,
        };

        match applied {
            Ok(()) => EventOutcome::Applied { action, key },
            Err((stage, error)) => {
                self.needs_repair.insert(key.clone());
                EventOutcome::Failed {
                    action,
                    key,
                    stage,
                    error,
                }
            }
        }
    }

    async fn add(&mut self, key: &str, value: &str) -> Result<(), (Stage, DaemonError)> {
        let entry = RoutingEntry::new(key, value);
        self.on_table(move |table| table.append(&entry))
            .await
            .map_err(|e| (Stage::TableFile, e))?;
        self.store_set(key, value)
            .await
            .map_err(|e| (Stage::Store, e))?;
        let command = MapCommand::add(&self.map, key, value);
        self.control_send(&command)
            .await
            .map_err(|e| (Stage::ControlSocket, e))
    }

    async fn remove(&mut self, key: &str) -> Result<(), (Stage, DaemonError)> {
        let target = key.to_string();
        self.on_table(move |table| table.remove(&target))
            .await
            .map_err(|e| (Stage::TableFile, e))?;
        self.store_delete(key)
            .await
            .map_err(|e| (Stage::Store, e))?;
        let command = MapCommand::del(&self.map, key);
        self.control_send(&command)
            .await
            .map_err(|e| (Stage::ControlSocket, e))
    }

    // -----------------------------------------------------------------------
    // Reconciliation
    // -----------------------------------------------------------------------

    /// Rebuild the table file and live map from the store.
    ///
    /// The live map cannot be read back, so every key sent to it is deleted
    /// first and then re-added, which is safe whether or not it was present.
    pub async fn reconcile(&mut self) -> Result<ReconcileReport, DaemonError> {
        let authoritative = self.store_get_all().await?;
        let on_disk = self.on_table(|table| table.read_entries()).await?;

        let mut report = diff_against_store(&on_disk, &authoritative);
        let refreshed: Vec<String> = self
            .needs_repair
            .iter()
            .filter(|key| {
                !report.added.contains(*key)
                    && !report.removed.contains(*key)
                    && !report.updated.contains(*key)
            })
            .cloned()
            .collect();
        report.refreshed = refreshed;

        if report.is_clean() {
            tracing::debug!("reconciliation found no drift");
            return Ok(report);
        }

        if !(report.added.is_empty() && report.removed.is_empty() && report.updated.is_empty()) {
            let entries = to_entries(&authoritative);
            self.on_table(move |table| table.write_all(&entries)).await?;
            report.rewritten = true;
        }

        // Until every command lands, all touched keys stay marked.
        self.needs_repair.extend(report.added.iter().cloned());
        self.needs_repair.extend(report.removed.iter().cloned());
        self.needs_repair.extend(report.updated.iter().cloned());

        let touched: Vec<String> = self.needs_repair.iter().cloned().collect();
        for key in &touched {
            let del = MapCommand::del(&self.map, key);
            self.control_send(&del).await?;
            if let Some(value) = authoritative.get(key) {
                let add = MapCommand::add(&self.map, key, value);
                self.control_send(&add).await?;
            }
            self.needs_repair.remove(key);
        }

        tracing::info!(
            added = report.added.len(),
            removed = report.removed.len(),
            updated = report.updated.len(),
            refreshed = report.refreshed.len(),
            rewritten = report.rewritten,
            "reconciliation repaired drift",
        );
        Ok(report)
    }

    // -----------------------------------------------------------------------
    // Bounded calls
    // -----------------------------------------------------------------------

    async fn store_get(&mut self, key: &str) -> Result<Option<String>, DaemonError> {
        with_deadline("store get", self.op_timeout, self.store.get(key)).await
    }

    async fn store_set(&mut self, key: &str, value: &str) -> Result<(), DaemonError> {
        with_deadline("store set", self.op_timeout, self.store.set(key, value)).await
    }

    async fn store_delete(&mut self, key: &str) -> Result<(), DaemonError> {
        with_deadline("store delete", self.op_timeout, self.store.delete(key)).await
    }

    async fn store_get_all(&mut self) -> Result<BTreeMap<String, String>, DaemonError> {
        with_deadline("store get_all", self.op_timeout, self.store.get_all()).await
    }

    async fn control_send(&mut self, command: &MapCommand) -> Result<(), DaemonError> {
        with_deadline("control socket", self.op_timeout, self.control.send(command)).await
    }

    /// Run a table file operation on the blocking pool. Not bounded by a
    /// deadline: an abandoned rewrite would leave a second writer behind.
    async fn on_table<T, F>(&self, op: F) -> Result<T, DaemonError>
    where
        F: FnOnce(&TableFile) -> Result<T, TableError> + Send + 'static,
        T: Send + 'static,
    {
        let table = self.table.clone();
        tokio::task::spawn_blocking(move || op(&table))
            .await
            .map_err(|err| DaemonError::Runtime(format!("table task join error: {err}")))?
            .map_err(DaemonError::from)
    }
}

fn to_entries(table: &BTreeMap<String, String>) -> Vec<RoutingEntry> {
    table
        .iter()
        .map(|(key, value)| RoutingEntry::new(key.clone(), value.clone()))
        .collect()
}

fn diff_against_store(
    on_disk: &[RoutingEntry],
    authoritative: &BTreeMap<String, String>,
) -> ReconcileReport {
    let mut file: BTreeMap<&str, &str> = BTreeMap::new();
    let mut duplicated = BTreeSet::new();
    for entry in on_disk {
        if file.insert(&entry.key, &entry.value).is_some() {
            duplicated.insert(entry.key.as_str());
        }
    }

    let mut report = ReconcileReport::default();
    for (key, value) in authoritative {
        match file.get(key.as_str()) {
            None => report.added.push(key.clone()),
            Some(on_file) if *on_file != value.as_str() || duplicated.contains(key.as_str()) => {
                report.updated.push(key.clone())
            }
            Some(_) => {}
        }
    }
    for key in file.keys() {
        if !authoritative.contains_key(*key) {
            report.removed.push(key.to_string());
        }
    }
    report
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
