//! A synthetic parallel build.
//!
//! One worker thread per build node pulls project requests off a shared queue
//! and reports the usual lifecycle events, so the dashboard can be exercised
//! without a real build engine behind it.

use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::Mutex;
use std::thread;
use std::time::{Duration, Instant};

use serde::Deserialize;
use tracing::{debug, info};

use crate::config::ConfigDoc;
use crate::error::{Error, Result};
use crate::events::{BuildEventSink, DiagnosticKind, Importance};
use crate::registry::InstanceId;
use crate::sync::lock;

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SimulateConfig {
    /// Distinct project files.
    pub projects: usize,
    /// Each project is built once per configuration.
    pub configurations: Vec<String>,
    /// Targets run in order for every project build.
    pub targets: Vec<String>,
    /// Simulated duration of one target.
    pub target_ms: u64,
    /// Every n-th project build raises a warning; 0 disables warnings.
    pub warn_every: usize,
}

impl Default for SimulateConfig {
    fn default() -> Self {
        Self {
            projects: 12,
            configurations: vec!["Debug".into(), "Release".into()],
            targets: vec!["Restore".into(), "Compile".into(), "Link".into()],
            target_ms: 120,
            warn_every: 5,
        }
    }
}

impl SimulateConfig {
    pub fn from_doc(doc: &ConfigDoc) -> Result<Self> {
        Ok(doc.deserialize_path("simulate")?.unwrap_or_default())
    }

    fn requests(&self) -> VecDeque<Request> {
        let mut out = VecDeque::new();
        for p in 0..self.projects {
            for configuration in &self.configurations {
                let instance_id = out.len() as InstanceId + 1;
                out.push_back(Request {
                    instance_id,
                    project: p,
                    path: format!("src/Project{p}/Project{p}.proj"),
                    global_properties: vec![
                        ("Configuration".to_string(), configuration.clone()),
                        ("Platform".to_string(), "AnyCPU".to_string()),
                    ],
                    configuration: configuration.clone(),
                });
            }
        }
        out
    }
}

#[derive(Debug, Clone)]
struct Request {
    instance_id: InstanceId,
    project: usize,
    path: String,
    global_properties: Vec<(String, String)>,
    configuration: String,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SimulateReport {
    pub projects_built: usize,
    pub targets_run: usize,
    pub warnings: usize,
    pub elapsed: Duration,
}

#[derive(Default)]
struct WorkerTally {
    projects: usize,
    targets: usize,
    warnings: usize,
}

/// Run the synthetic build on `nodes` worker threads, reporting to `sink`.
///
/// Node ids handed to the sink are `1..=nodes`. Returns once every request
/// has been built.
pub fn run(
    cfg: &SimulateConfig,
    nodes: usize,
    sink: Arc<dyn BuildEventSink>,
) -> Result<SimulateReport> {
    if nodes == 0 {
        return Err(Error::config("simulate needs at least one node"));
    }
    let queue = Arc::new(Mutex::new(cfg.requests()));
    let total = lock(&queue).len();
    info!(requests = total, nodes, "starting simulated build");

    let started = Instant::now();
    let mut workers = Vec::with_capacity(nodes);
    for node_id in 1..=nodes {
        let queue = Arc::clone(&queue);
        let sink = Arc::clone(&sink);
        let cfg = cfg.clone();
        let handle = thread::Builder::new()
            .name(format!("node {node_id}"))
            .spawn(move || build_node(node_id, &cfg, &queue, sink.as_ref()))
            .map_err(|e| Error::msg(format!("failed to spawn node {node_id}: {e}")))?;
        workers.push((node_id, handle));
    }

    let mut report = SimulateReport::default();
    let mut first_err: Option<Error> = None;
    for (node_id, handle) in workers {
        match handle.join() {
            Ok(t) => {
                report.projects_built += t.projects;
                report.targets_run += t.targets;
                report.warnings += t.warnings;
            }
            Err(panic) => {
                if first_err.is_none() {
                    first_err = Some(Error::msg(format!("node {node_id} panicked: {panic:?}")));
                }
            }
        }
    }
    if let Some(e) = first_err {
        return Err(e);
    }

    report.elapsed = started.elapsed();
    info!(
        projects = report.projects_built,
        targets = report.targets_run,
        elapsed_ms = report.elapsed.as_millis() as u64,
        "simulated build finished"
    );
    Ok(report)
}

fn build_node(
    node_id: usize,
    cfg: &SimulateConfig,
    queue: &Mutex<VecDeque<Request>>,
    sink: &dyn BuildEventSink,
) -> WorkerTally {
    let mut tally = WorkerTally::default();
    let step = Duration::from_millis(cfg.target_ms);

    loop {
        // Pop under the lock, build without it.
        let Some(req) = lock(queue).pop_front() else {
            break;
        };
        debug!(node_id, instance_id = req.instance_id, path = %req.path, "building");

        sink.project_started(req.instance_id, &req.path, &req.global_properties);
        sink.diagnostic_raised(
            DiagnosticKind::Message,
            Importance::Low,
            &format!("Building {} ({})", req.path, req.configuration),
        );

        for target in &cfg.targets {
            sink.target_started(node_id, req.instance_id, target);
            if !step.is_zero() {
                thread::sleep(step);
            }
            sink.target_finished(node_id, req.instance_id);
            tally.targets += 1;
        }

        if cfg.warn_every > 0 && req.instance_id as usize % cfg.warn_every == 0 {
            sink.diagnostic_raised(
                DiagnosticKind::Warning,
                Importance::Normal,
                &format!(
                    "{}(12,17): CS0168: The variable 'ex' is declared but never used",
                    req.path
                ),
            );
            tally.warnings += 1;
        }
        sink.diagnostic_raised(
            DiagnosticKind::Message,
            Importance::High,
            &format!(
                "Project{p} -> bin/{c}/Project{p}.dll",
                p = req.project,
                c = req.configuration
            ),
        );
        sink.project_finished(req.instance_id);
        tally.projects += 1;
    }
    tally
}
