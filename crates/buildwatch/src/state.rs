use std::sync::atomic::{AtomicU64, Ordering};

use tracing::{debug, warn};

use crate::error::Result;
use crate::events::{BuildEventSink, DiagnosticKind, Importance};
use crate::log_sanitize::sanitize_message;
use crate::messages::MessageTail;
use crate::nodes::{NodeSlot, NodeTable};
use crate::registry::{InstanceId, ProjectRegistry};

/// Counts behind the progress row.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Progress {
    pub completed: u64,
    pub total: u64,
}

impl Progress {
    /// Completed share in `0.0..=1.0`. Zero when nothing has started; clamped
    /// to one if more projects finished than started.
    pub fn fraction(self) -> f64 {
        if self.total == 0 {
            return 0.0;
        }
        (self.completed as f64 / self.total as f64).min(1.0)
    }

    pub fn percent(self) -> u16 {
        (self.fraction() * 100.0).round() as u16
    }
}

/// Everything the dashboard knows about the running build.
///
/// Written by event callbacks on build threads, read by the redraw loop
/// through [`BuildState::progress`], [`BuildState::node_snapshot`] and the
/// message tail.
pub struct BuildState {
    registry: ProjectRegistry,
    nodes: NodeTable,
    messages: MessageTail,
    importance_threshold: Importance,
    total_requests: AtomicU64,
    completed_requests: AtomicU64,
    dropped_events: AtomicU64,
}

impl BuildState {
    pub fn new(node_count: usize, message_cap: usize, importance_threshold: Importance) -> Self {
        Self {
            registry: ProjectRegistry::new(),
            nodes: NodeTable::new(node_count),
            messages: MessageTail::new(message_cap),
            importance_threshold,
            total_requests: AtomicU64::new(0),
            completed_requests: AtomicU64::new(0),
            dropped_events: AtomicU64::new(0),
        }
    }

    pub fn registry(&self) -> &ProjectRegistry {
        &self.registry
    }

    pub fn messages(&self) -> &MessageTail {
        &self.messages
    }

    pub fn node_snapshot(&self) -> Vec<NodeSlot> {
        self.nodes.snapshot()
    }

    pub fn busy_nodes(&self) -> usize {
        self.nodes.busy_count()
    }

    pub fn node_slots(&self) -> usize {
        self.nodes.slot_count()
    }

    pub fn progress(&self) -> Progress {
        Progress {
            completed: self.completed_requests.load(Ordering::Relaxed),
            total: self.total_requests.load(Ordering::Relaxed),
        }
    }

    /// Events that were rejected and logged instead of applied.
    pub fn dropped_events(&self) -> u64 {
        self.dropped_events.load(Ordering::Relaxed)
    }

    pub fn start_project(
        &self,
        instance_id: InstanceId,
        path: &str,
        global_properties: &[(String, String)],
    ) {
        self.total_requests.fetch_add(1, Ordering::Relaxed);
        self.registry
            .register_if_absent(instance_id, path, global_properties);
    }

    pub fn finish_project(&self, _instance_id: InstanceId) {
        self.completed_requests.fetch_add(1, Ordering::Relaxed);
    }

    pub fn start_target(
        &self,
        node_id: usize,
        instance_id: InstanceId,
        target: &str,
    ) -> Result<()> {
        let project = self.registry.lookup(instance_id)?;
        self.nodes.on_target_started(
            node_id,
            project.path(),
            &project.disambiguator(),
            target,
        )
    }

    pub fn finish_target(&self, node_id: usize, _instance_id: InstanceId) -> Result<()> {
        self.nodes.on_target_finished(node_id)
    }

    /// Buffer a diagnostic for display. Returns whether it was kept.
    ///
    /// Warnings and errors are always kept; plain messages only at or above
    /// the importance threshold.
    pub fn raise_diagnostic(
        &self,
        kind: DiagnosticKind,
        importance: Importance,
        text: &str,
    ) -> bool {
        if kind == DiagnosticKind::Message && importance < self.importance_threshold {
            return false;
        }
        let text = sanitize_message(text);
        let line = match kind {
            DiagnosticKind::Message => text,
            DiagnosticKind::Warning => format!("warning: {text}"),
            DiagnosticKind::Error => format!("error: {text}"),
        };
        self.messages.append(line);
        true
    }

    fn drop_event(&self, what: &str, err: &crate::Error) {
        self.dropped_events.fetch_add(1, Ordering::Relaxed);
        warn!(event = what, error = %err, "dropping build event");
    }
}

impl BuildEventSink for BuildState {
    fn project_started(
        &self,
        instance_id: InstanceId,
        path: &str,
        global_properties: &[(String, String)],
    ) {
        debug!(instance_id, path, "project started");
        self.start_project(instance_id, path, global_properties);
    }

    fn project_finished(&self, instance_id: InstanceId) {
        debug!(instance_id, "project finished");
        self.finish_project(instance_id);
    }

    fn target_started(&self, node_id: usize, instance_id: InstanceId, target: &str) {
        if let Err(e) = self.start_target(node_id, instance_id, target) {
            self.drop_event("target_started", &e);
        }
    }

    fn target_finished(&self, node_id: usize, instance_id: InstanceId) {
        if let Err(e) = self.finish_target(node_id, instance_id) {
            self.drop_event("target_finished", &e);
        }
    }

    fn diagnostic_raised(&self, kind: DiagnosticKind, importance: Importance, text: &str) {
        self.raise_diagnostic(kind, importance, text);
    }
}
