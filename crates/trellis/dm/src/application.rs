//! Applications tracked by the DM
//!
//! The DM does not own instances. It mirrors the statuses agents report and
//! the liveness of each root instance.

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use std::collections::BTreeMap;
use tracing::warn;
use trellis_model::{InstancePath, InstanceStatus, InstanceTree};

/// Liveness of the agent managing a root instance
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RootRecord {
    pub ip_address: Option<String>,
    pub last_heartbeat: Option<DateTime<Utc>>,
}

/// What the DM knows of one application
#[derive(Debug, Clone)]
pub struct ManagedApplication {
    name: String,
    statuses: BTreeMap<InstancePath, InstanceStatus>,
    roots: BTreeMap<InstancePath, RootRecord>,
}

impl ManagedApplication {
    pub fn new(name: impl Into<String>, tree: &InstanceTree) -> Self {
        Self {
            name: name.into(),
            statuses: tree.iter().map(|i| (i.path.clone(), i.status)).collect(),
            roots: tree
                .roots()
                .iter()
                .map(|root| (root.clone(), RootRecord::default()))
                .collect(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn status(&self, path: &InstancePath) -> Option<InstanceStatus> {
        self.statuses.get(path).copied()
    }

    pub fn statuses(&self) -> &BTreeMap<InstancePath, InstanceStatus> {
        &self.statuses
    }

    pub fn contains(&self, path: &InstancePath) -> bool {
        self.statuses.contains_key(path)
    }

    pub fn root(&self, path: &InstancePath) -> Option<&RootRecord> {
        self.roots.get(path)
    }

    pub fn root_paths(&self) -> impl Iterator<Item = &InstancePath> {
        self.roots.keys()
    }

    /// Record a reported status. Returns the previous one.
    pub fn set_status(
        &mut self,
        path: &InstancePath,
        status: InstanceStatus,
    ) -> Option<InstanceStatus> {
        self.statuses.insert(path.clone(), status)
    }

    /// Forget an instance and its descendants. Returns how many were dropped.
    pub fn remove_instance(&mut self, path: &InstancePath) -> usize {
        let before = self.statuses.len();
        self.statuses.retain(|p, _| !p.is_within(path));
        self.roots.retain(|p, _| !p.is_within(path));
        before - self.statuses.len()
    }

    /// Record a heartbeat for `root`.
    ///
    /// Returns `false` when `root` is not a root instance of the application.
    pub fn record_heartbeat(
        &mut self,
        root: &InstancePath,
        ip_address: Option<String>,
        at: DateTime<Utc>,
    ) -> bool {
        let Some(record) = self.roots.get_mut(root) else {
            return false;
        };
        record.last_heartbeat = Some(at);
        if ip_address.is_some() {
            record.ip_address = ip_address;
        }
        true
    }

    /// Roots whose last heartbeat is older than `timeout` and that are not
    /// already marked as a problem. Roots never heard from are not stale.
    pub fn stale_roots(&self, now: DateTime<Utc>, timeout: chrono::Duration) -> Vec<InstancePath> {
        self.roots
            .iter()
            .filter(|(path, record)| {
                record
                    .last_heartbeat
                    .is_some_and(|at| now.signed_duration_since(at) > timeout)
                    && self.status(path) != Some(InstanceStatus::Problem)
            })
            .map(|(path, _)| path.clone())
            .collect()
    }
}

/// Mark every stale root of every application as `PROBLEM`.
///
/// Returns the marked roots with their application name.
pub fn mark_stale_roots(
    applications: &DashMap<String, ManagedApplication>,
    now: DateTime<Utc>,
    timeout: chrono::Duration,
) -> Vec<(String, InstancePath)> {
    let mut marked = Vec::new();
    for mut entry in applications.iter_mut() {
        let application = entry.value_mut();
        for root in application.stale_roots(now, timeout) {
            warn!(
                application = %application.name(),
                root = %root,
                "No heartbeat received in time, root instance marked as a problem"
            );
            application.set_status(&root, InstanceStatus::Problem);
            marked.push((application.name().to_string(), root));
        }
    }
    marked
}
