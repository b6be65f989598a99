//! Project instances and same-path disambiguation.
//!
//! A project file can be built several times in one build, once per set of
//! global properties (`Configuration=Debug`, `Platform=x64`, ...). Instances
//! sharing a path form a sibling group; each member is labelled with the
//! properties that not every sibling shares.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, RwLock};

use tracing::debug;

use crate::error::{Error, Result};
use crate::sync::lock;

pub type InstanceId = i64;

#[derive(Debug)]
pub struct ProjectInstance {
    id: InstanceId,
    path: String,
    global_properties: Vec<String>,
    disambiguator: RwLock<String>,
}

impl ProjectInstance {
    fn new(id: InstanceId, path: &str, global_properties: &[(String, String)]) -> Self {
        Self {
            id,
            path: path.to_string(),
            global_properties: global_properties
                .iter()
                .map(|(k, v)| format!("{k}={v}"))
                .collect(),
            disambiguator: RwLock::new(String::new()),
        }
    }

    pub fn id(&self) -> InstanceId {
        self.id
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    /// `key=value` strings in declaration order.
    pub fn global_properties(&self) -> &[String] {
        &self.global_properties
    }

    pub fn disambiguator(&self) -> String {
        match self.disambiguator.read() {
            Ok(d) => d.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    pub fn label(&self) -> String {
        format_label(&self.path, &self.disambiguator())
    }

    fn set_disambiguator(&self, value: String) {
        match self.disambiguator.write() {
            Ok(mut d) => *d = value,
            Err(poisoned) => *poisoned.into_inner() = value,
        }
    }
}

pub fn format_label(path: &str, disambiguator: &str) -> String {
    if disambiguator.is_empty() {
        path.to_string()
    } else {
        format!("{path} [{disambiguator}]")
    }
}

#[derive(Default)]
struct SiblingGroup {
    members: Vec<Arc<ProjectInstance>>,
}

impl SiblingGroup {
    fn recompute(&self) {
        let props: Vec<&[String]> = self
            .members
            .iter()
            .map(|m| m.global_properties())
            .collect();
        let labels = disambiguate(&props);
        for (member, label) in self.members.iter().zip(labels) {
            member.set_disambiguator(label);
        }
    }
}

/// Compute the disambiguator of every member of one sibling group.
///
/// A property string is distinguishing when fewer than all members declare it.
/// Each member's result joins its own distinguishing properties, in its own
/// declaration order, with `", "`. Members that share every property with all
/// siblings get an empty string.
pub fn disambiguate(members: &[&[String]]) -> Vec<String> {
    let total = members.len();
    let mut declared_by: HashMap<&str, usize> = HashMap::new();
    for props in members {
        let mut seen = HashSet::new();
        for p in props.iter() {
            if seen.insert(p.as_str()) {
                *declared_by.entry(p.as_str()).or_default() += 1;
            }
        }
    }

    members
        .iter()
        .map(|props| {
            let mut seen = HashSet::new();
            props
                .iter()
                .filter(|p| seen.insert(p.as_str()))
                .filter(|p| declared_by.get(p.as_str()).copied().unwrap_or(0) < total)
                .map(String::as_str)
                .collect::<Vec<_>>()
                .join(", ")
        })
        .collect()
}

#[derive(Default)]
pub struct ProjectRegistry {
    by_id: Mutex<HashMap<InstanceId, Arc<ProjectInstance>>>,
    by_path: Mutex<HashMap<String, Arc<Mutex<SiblingGroup>>>>,
    recomputations: AtomicU64,
}

impl ProjectRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a project instance the first time its id is seen.
    ///
    /// A repeated id returns the existing instance without touching its sibling
    /// group. Joining a group that then has more than one member recomputes the
    /// whole group under that group's lock.
    pub fn register_if_absent(
        &self,
        id: InstanceId,
        path: &str,
        global_properties: &[(String, String)],
    ) -> Arc<ProjectInstance> {
        let instance = {
            let mut by_id = lock(&self.by_id);
            if let Some(existing) = by_id.get(&id) {
                return Arc::clone(existing);
            }
            let instance = Arc::new(ProjectInstance::new(id, path, global_properties));
            by_id.insert(id, Arc::clone(&instance));
            instance
        };

        let group = {
            let mut by_path = lock(&self.by_path);
            Arc::clone(by_path.entry(path.to_string()).or_default())
        };

        let mut group = lock(&group);
        group.members.push(Arc::clone(&instance));
        if group.members.len() > 1 {
            group.recompute();
            self.recomputations.fetch_add(1, Ordering::Relaxed);
            debug!(
                path,
                siblings = group.members.len(),
                "recomputed project disambiguators"
            );
        }
        instance
    }

    pub fn lookup(&self, id: InstanceId) -> Result<Arc<ProjectInstance>> {
        lock(&self.by_id)
            .get(&id)
            .cloned()
            .ok_or(Error::NotFound { instance_id: id })
    }

    /// Path plus current disambiguator, e.g. `app.proj [Config=Debug]`.
    pub fn label_for(&self, id: InstanceId) -> Result<String> {
        Ok(self.lookup(id)?.label())
    }

    pub fn len(&self) -> usize {
        lock(&self.by_id).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Number of sibling-group recomputations so far.
    pub fn recomputations(&self) -> u64 {
        self.recomputations.load(Ordering::Relaxed)
    }
}
