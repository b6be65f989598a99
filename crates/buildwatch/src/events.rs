//! Build lifecycle events and the callback interface that consumes them.

use serde::{Deserialize, Serialize};

use crate::registry::InstanceId;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DiagnosticKind {
    Message,
    Warning,
    Error,
}

/// Message importance as reported by the build engine. Ordered low to high.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum Importance {
    Low,
    #[default]
    Normal,
    High,
}

impl Importance {
    pub fn as_str(self) -> &'static str {
        match self {
            Importance::Low => "low",
            Importance::Normal => "normal",
            Importance::High => "high",
        }
    }
}

impl std::str::FromStr for Importance {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "low" => Ok(Importance::Low),
            "normal" => Ok(Importance::Normal),
            "high" => Ok(Importance::High),
            other => Err(format!(
                "unknown importance '{other}' (expected low, normal or high)"
            )),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum BuildEvent {
    ProjectStarted {
        instance_id: InstanceId,
        path: String,
        #[serde(default)]
        global_properties: Vec<(String, String)>,
    },
    ProjectFinished {
        instance_id: InstanceId,
    },
    TargetStarted {
        node_id: usize,
        instance_id: InstanceId,
        target: String,
    },
    TargetFinished {
        node_id: usize,
        instance_id: InstanceId,
    },
    DiagnosticRaised {
        kind: DiagnosticKind,
        #[serde(default)]
        importance: Importance,
        text: String,
    },
}

/// Receiver of build lifecycle callbacks.
///
/// The build engine calls these from any number of threads at once, with no
/// ordering across nodes. Implementations must not block.
pub trait BuildEventSink: Send + Sync {
    fn project_started(
        &self,
        instance_id: InstanceId,
        path: &str,
        global_properties: &[(String, String)],
    );

    fn project_finished(&self, instance_id: InstanceId);

    fn target_started(&self, node_id: usize, instance_id: InstanceId, target: &str);

    fn target_finished(&self, node_id: usize, instance_id: InstanceId);

    fn diagnostic_raised(&self, kind: DiagnosticKind, importance: Importance, text: &str);

    fn emit(&self, ev: &BuildEvent) {
        match ev {
            BuildEvent::ProjectStarted {
                instance_id,
                path,
                global_properties,
            } => self.project_started(*instance_id, path, global_properties),
            BuildEvent::ProjectFinished { instance_id } => self.project_finished(*instance_id),
            BuildEvent::TargetStarted {
                node_id,
                instance_id,
                target,
            } => self.target_started(*node_id, *instance_id, target),
            BuildEvent::TargetFinished {
                node_id,
                instance_id,
            } => self.target_finished(*node_id, *instance_id),
            BuildEvent::DiagnosticRaised {
                kind,
                importance,
                text,
            } => self.diagnostic_raised(*kind, *importance, text),
        }
    }
}
