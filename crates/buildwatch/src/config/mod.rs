use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};

use serde::Deserialize;
use serde::de::DeserializeOwned;
use toml::Value;

use crate::error::{Error, Result};
use crate::events::Importance;
use crate::messages::DEFAULT_MESSAGE_CAP;

pub const DEFAULT_REDRAW_INTERVAL_MS: u64 = 250;
pub const DEFAULT_MESSAGE_ROWS: u16 = 8;

/// A loaded TOML document plus the file it came from (`<mem>` when built in code).
#[derive(Debug, Clone)]
pub struct ConfigDoc {
    pub path: PathBuf,
    pub value: Value,
}

impl Default for ConfigDoc {
    fn default() -> Self {
        Self {
            path: PathBuf::from("<mem>"),
            value: Value::Table(Default::default()),
        }
    }
}

impl ConfigDoc {
    pub fn value_path(&self, path: &str) -> Option<&Value> {
        let path = path.trim();
        if path.is_empty() {
            return Some(&self.value);
        }
        let mut cur = &self.value;
        for seg in path.split('.') {
            cur = cur.as_table()?.get(seg)?;
        }
        Some(cur)
    }

    pub fn deserialize_path<T: DeserializeOwned>(&self, path: &str) -> Result<Option<T>> {
        let Some(v) = self.value_path(path) else {
            return Ok(None);
        };
        let parsed = v.clone().try_into().map_err(|e| {
            Error::config(format!(
                "invalid [{path}] in {}: {e}",
                self.path.display()
            ))
        })?;
        Ok(Some(parsed))
    }

    /// Overlay `overrides` (a table of dotted-path values) on this document.
    pub fn with_overrides(mut self, overrides: Value) -> Self {
        merge_values(&mut self.value, overrides);
        self
    }
}

/// Settings the dashboard core consumes.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct DashboardConfig {
    /// Parallel build nodes; 0 means one per CPU.
    pub nodes: usize,
    pub redraw_interval_ms: u64,
    /// Plain messages below this importance are not shown.
    pub importance: Importance,
    /// Rows reserved for recent messages above the progress row.
    pub message_rows: u16,
    /// Messages kept in memory.
    pub message_cap: usize,
    /// Skip the live display and print line-oriented progress.
    pub plain: bool,
}

impl Default for DashboardConfig {
    fn default() -> Self {
        Self {
            nodes: 0,
            redraw_interval_ms: DEFAULT_REDRAW_INTERVAL_MS,
            importance: Importance::High,
            message_rows: DEFAULT_MESSAGE_ROWS,
            message_cap: DEFAULT_MESSAGE_CAP,
            plain: false,
        }
    }
}

impl DashboardConfig {
    pub fn from_doc(doc: &ConfigDoc) -> Result<Self> {
        let cfg: DashboardConfig = doc.deserialize_path("dashboard")?.unwrap_or_default();
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn validate(&self) -> Result<()> {
        if self.redraw_interval_ms == 0 {
            return Err(Error::config("dashboard.redraw_interval_ms must be positive"));
        }
        if self.message_cap < self.message_rows as usize {
            return Err(Error::config(format!(
                "dashboard.message_cap ({}) must be at least dashboard.message_rows ({})",
                self.message_cap, self.message_rows
            )));
        }
        Ok(())
    }

    pub fn node_count(&self) -> usize {
        if self.nodes == 0 {
            num_cpus::get().max(1)
        } else {
            self.nodes
        }
    }

    pub fn redraw_interval(&self) -> std::time::Duration {
        std::time::Duration::from_millis(self.redraw_interval_ms)
    }
}

fn merge_values(base: &mut Value, overlay: Value) {
    match (base, overlay) {
        (Value::Table(base_tbl), Value::Table(overlay_tbl)) => {
            for (k, v) in overlay_tbl {
                match base_tbl.get_mut(&k) {
                    Some(existing) => merge_values(existing, v),
                    None => {
                        base_tbl.insert(k, v);
                    }
                }
            }
        }
        (slot, v) => *slot = v,
    }
}

/// Set `dashboard.nodes`-style dotted `path` inside an overrides table.
pub fn set_override(overrides: &mut Value, path: &str, v: Value) -> Result<()> {
    if !overrides.is_table() {
        *overrides = Value::Table(Default::default());
    }
    let segs: Vec<&str> = path.split('.').filter(|s| !s.is_empty()).collect();
    let Some((last, parents)) = segs.split_last() else {
        return Err(Error::config("empty override path"));
    };

    let mut cur = overrides
        .as_table_mut()
        .ok_or_else(|| Error::config("overrides must be a table"))?;
    for seg in parents {
        cur = cur
            .entry((*seg).to_string())
            .or_insert_with(|| Value::Table(Default::default()))
            .as_table_mut()
            .ok_or_else(|| Error::config(format!("override path collides at '{seg}'")))?;
    }
    cur.insert((*last).to_string(), v);
    Ok(())
}

/// Parse a `key.path=value` assignment. The value is read as a TOML literal
/// (`8`, `true`, `"x"`) and falls back to a bare string.
pub fn parse_assignment(raw: &str) -> Result<(String, Value)> {
    let Some((key, val)) = raw.split_once('=') else {
        return Err(Error::config(format!(
            "invalid override '{raw}' (expected key.path=value)"
        )));
    };
    let key = key.trim();
    if key.is_empty() {
        return Err(Error::config(format!("invalid override '{raw}' (empty key)")));
    }
    let val = val.trim();
    let parsed = toml::from_str::<toml::Table>(&format!("v = {val}"))
        .ok()
        .and_then(|mut t| t.remove("v"))
        .unwrap_or_else(|| Value::String(val.to_string()));
    Ok((key.to_string(), parsed))
}

fn resolve_ref_path(from_file: &Path, reference: &str) -> PathBuf {
    let p = PathBuf::from(reference);
    if p.is_absolute() {
        p
    } else {
        from_file.parent().unwrap_or_else(|| Path::new(".")).join(p)
    }
}

fn load_value_inner(path: &Path, stack: &mut HashSet<PathBuf>) -> Result<Value> {
    let canonical = path.canonicalize().unwrap_or_else(|_| path.to_path_buf());
    if !stack.insert(canonical.clone()) {
        return Err(Error::config(format!(
            "config extends cycle at {}",
            canonical.display()
        )));
    }

    let data = fs::read_to_string(path)
        .map_err(|e| Error::config(format!("failed to read {}: {e}", path.display())))?;
    let mut value: Value = toml::from_str(&data)
        .map_err(|e| Error::config(format!("TOML parse error in {}: {e}", path.display())))?;

    // A file may name one parent it overrides.
    let mut out = Value::Table(Default::default());
    if let Some(parent) = value.get("extends").and_then(Value::as_str) {
        out = load_value_inner(&resolve_ref_path(path, parent), stack)?;
    }
    if let Some(tbl) = value.as_table_mut() {
        tbl.remove("extends");
    }
    merge_values(&mut out, value);

    stack.remove(&canonical);
    Ok(out)
}

pub fn load(path: &Path) -> Result<ConfigDoc> {
    let mut stack = HashSet::new();
    let value = load_value_inner(path, &mut stack)?;
    Ok(ConfigDoc {
        path: path.to_path_buf(),
        value,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn doc(src: &str) -> ConfigDoc {
        ConfigDoc {
            path: PathBuf::from("<mem>"),
            value: toml::from_str(src).unwrap(),
        }
    }

    #[test]
    fn missing_table_gives_defaults() {
        let cfg = DashboardConfig::from_doc(&ConfigDoc::default()).unwrap();
        assert_eq!(cfg, DashboardConfig::default());
        assert_eq!(cfg.redraw_interval_ms, 250);
        assert_eq!(cfg.importance, Importance::High);
        assert!(cfg.node_count() >= 1);
    }

    #[test]
    fn dashboard_table_is_parsed() {
        let cfg = DashboardConfig::from_doc(&doc(
            r#"
[dashboard]
nodes = 6
redraw_interval_ms = 100
importance = "normal"
message_rows = 4
"#,
        ))
        .unwrap();
        assert_eq!(cfg.node_count(), 6);
        assert_eq!(cfg.redraw_interval().as_millis(), 100);
        assert_eq!(cfg.importance, Importance::Normal);
        assert_eq!(cfg.message_rows, 4);
        assert_eq!(cfg.message_cap, DEFAULT_MESSAGE_CAP);
    }

    #[test]
    fn zero_interval_is_rejected() {
        let err = DashboardConfig::from_doc(&doc("[dashboard]\nredraw_interval_ms = 0\n"))
            .unwrap_err()
            .to_string();
        assert!(err.contains("redraw_interval_ms"), "unexpected err: {err}");
    }

    #[test]
    fn unknown_keys_are_rejected() {
        let err = DashboardConfig::from_doc(&doc("[dashboard]\nnode = 3\n"))
            .unwrap_err()
            .to_string();
        assert!(err.contains("dashboard"), "unexpected err: {err}");
    }

    #[test]
    fn overrides_win_over_file_values() {
        let mut overrides = Value::Table(Default::default());
        let (k, v) = parse_assignment("dashboard.nodes=12").unwrap();
        set_override(&mut overrides, &k, v).unwrap();
        set_override(&mut overrides, "dashboard.plain", Value::Boolean(true)).unwrap();

        let d = doc("[dashboard]\nnodes = 2\nmessage_rows = 3\n").with_overrides(overrides);
        let cfg = DashboardConfig::from_doc(&d).unwrap();
        assert_eq!(cfg.nodes, 12);
        assert_eq!(cfg.message_rows, 3);
        assert!(cfg.plain);
    }

    #[test]
    fn assignment_values_fall_back_to_strings() {
        assert_eq!(
            parse_assignment("dashboard.importance = normal").unwrap().1,
            Value::String("normal".into())
        );
        assert_eq!(parse_assignment("a.b=true").unwrap().1, Value::Boolean(true));
        assert!(parse_assignment("novalue").is_err());
        assert!(parse_assignment("=3").is_err());
    }

    #[test]
    fn override_path_cannot_descend_into_a_value() {
        let mut overrides = Value::Table(Default::default());
        set_override(&mut overrides, "dashboard", Value::Integer(1)).unwrap();
        assert!(set_override(&mut overrides, "dashboard.nodes", Value::Integer(2)).is_err());
    }

    #[test]
    fn extends_merges_parent_first() {
        let dir = tempfile::tempdir().unwrap();
        let base = dir.path().join("base.toml");
        let child = dir.path().join("ci.toml");
        fs::write(&base, "[dashboard]\nnodes = 4\nmessage_rows = 2\n").unwrap();
        fs::write(&child, "extends = \"base.toml\"\n[dashboard]\nnodes = 16\n").unwrap();

        let cfg = DashboardConfig::from_doc(&load(&child).unwrap()).unwrap();
        assert_eq!(cfg.nodes, 16);
        assert_eq!(cfg.message_rows, 2);
    }

    #[test]
    fn extends_cycle_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let a = dir.path().join("a.toml");
        let b = dir.path().join("b.toml");
        fs::write(&a, "extends = \"b.toml\"\n").unwrap();
        fs::write(&b, "extends = \"a.toml\"\n").unwrap();
        let err = load(&a).unwrap_err().to_string();
        assert!(err.contains("cycle"), "unexpected err: {err}");
    }
}
