use std::sync::Mutex;

use crate::error::{Error, Result};
use crate::registry::format_label;
use crate::sync::lock;

/// What one build node is executing right now. All fields are empty when idle.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NodeSlot {
    pub project: String,
    pub disambiguator: String,
    pub target: String,
}

impl NodeSlot {
    pub fn is_idle(&self) -> bool {
        self.project.is_empty() && self.target.is_empty()
    }

    pub fn project_label(&self) -> String {
        if self.project.is_empty() {
            return String::new();
        }
        format_label(&self.project, &self.disambiguator)
    }
}

/// Fixed table of node slots, indexed by node id.
///
/// Holds `node_count + 1` slots so that both 0-based and 1-based node ids fit;
/// slot 0 is used by the orchestrating node when it runs targets itself.
/// Each slot has its own lock, so a slot is always read and written whole.
pub struct NodeTable {
    slots: Vec<Mutex<NodeSlot>>,
}

impl NodeTable {
    pub fn new(node_count: usize) -> Self {
        let slots = (0..=node_count)
            .map(|_| Mutex::new(NodeSlot::default()))
            .collect();
        Self { slots }
    }

    pub fn slot_count(&self) -> usize {
        self.slots.len()
    }

    fn slot(&self, node_id: usize) -> Result<&Mutex<NodeSlot>> {
        self.slots.get(node_id).ok_or(Error::OutOfRange {
            node_id,
            slots: self.slots.len(),
        })
    }

    pub fn on_target_started(
        &self,
        node_id: usize,
        project: &str,
        disambiguator: &str,
        target: &str,
    ) -> Result<()> {
        let next = NodeSlot {
            project: project.to_string(),
            disambiguator: disambiguator.to_string(),
            target: target.to_string(),
        };
        *lock(self.slot(node_id)?) = next;
        Ok(())
    }

    // Clears the slot whichever target is active: one target per node at a time.
    pub fn on_target_finished(&self, node_id: usize) -> Result<()> {
        *lock(self.slot(node_id)?) = NodeSlot::default();
        Ok(())
    }

    pub fn snapshot(&self) -> Vec<NodeSlot> {
        self.slots.iter().map(|s| lock(s).clone()).collect()
    }

    pub fn busy_count(&self) -> usize {
        self.slots.iter().filter(|s| !lock(s).is_idle()).count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn table_has_an_extra_slot_for_node_zero() {
        let table = NodeTable::new(4);
        assert_eq!(table.slot_count(), 5);
        table.on_target_started(0, "a.proj", "", "Build").unwrap();
        table.on_target_started(4, "b.proj", "", "Build").unwrap();
        assert_eq!(table.busy_count(), 2);
    }

    #[test]
    fn node_beyond_table_is_out_of_range() {
        let table = NodeTable::new(2);
        let err = table.on_target_started(3, "a.proj", "", "Build").unwrap_err();
        assert!(err.is_out_of_range(), "unexpected err: {err}");
        assert!(table.on_target_finished(99).unwrap_err().is_out_of_range());
    }

    #[test]
    fn finish_clears_whatever_target_is_active() {
        let table = NodeTable::new(1);
        table.on_target_started(1, "a.proj", "Config=Debug", "Restore").unwrap();
        table.on_target_started(1, "a.proj", "Config=Debug", "Compile").unwrap();
        table.on_target_finished(1).unwrap();
        let snap = table.snapshot();
        assert!(snap[1].is_idle());
        assert_eq!(snap[1].project_label(), "");
    }

    #[test]
    fn label_includes_disambiguator() {
        let table = NodeTable::new(1);
        table.on_target_started(1, "src/app.proj", "Config=Debug", "Build").unwrap();
        let snap = table.snapshot();
        assert_eq!(snap[1].project_label(), "src/app.proj [Config=Debug]");
        assert_eq!(snap[1].target, "Build");
    }

    #[test]
    fn snapshot_never_sees_a_torn_slot() {
        let table = Arc::new(NodeTable::new(1));
        let writers: Vec<_> = (0..4)
            .map(|w| {
                let table = Arc::clone(&table);
                std::thread::spawn(move || {
                    let project = format!("p{w}.proj");
                    let target = format!("t{w}");
                    for _ in 0..2000 {
                        table.on_target_started(1, &project, "", &target).unwrap();
                        table.on_target_finished(1).unwrap();
                    }
                })
            })
            .collect();

        for _ in 0..2000 {
            let snap = table.snapshot();
            let slot = &snap[1];
            if slot.is_idle() {
                assert!(slot.target.is_empty());
                continue;
            }
            let p = slot.project.trim_start_matches('p').trim_end_matches(".proj");
            let t = slot.target.trim_start_matches('t');
            assert_eq!(p, t, "torn slot: {slot:?}");
        }
        for w in writers {
            w.join().unwrap();
        }
    }
}
