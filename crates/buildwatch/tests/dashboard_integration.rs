use std::fs;
use std::io::{self, Write};
use std::process::Command;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use buildwatch::config::{self, DashboardConfig};
use buildwatch::simulate::{self, SimulateConfig};
use buildwatch::ui::{Dashboard, PlainSurface};
use buildwatch::{BuildState, replay};

#[derive(Clone, Default)]
struct SharedBuf(Arc<Mutex<Vec<u8>>>);

impl SharedBuf {
    fn text(&self) -> String {
        String::from_utf8(self.0.lock().unwrap().clone()).unwrap()
    }
}

impl Write for SharedBuf {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.lock().unwrap().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

const EVENTS: &str = r#"{"event":"project_started","instance_id":1,"path":"app.proj","global_properties":[["Config","Debug"]]}
{"event":"project_started","instance_id":2,"path":"app.proj","global_properties":[["Config","Release"]]}
{"event":"target_started","node_id":1,"instance_id":1,"target":"Compile"}
{"event":"diagnostic_raised","kind":"warning","text":"CS0168: unused"}
{"event":"diagnostic_raised","kind":"message","importance":"low","text":"chatter"}
{"event":"target_finished","node_id":1,"instance_id":1}
{"event":"project_finished","instance_id":1}
{"event":"project_finished","instance_id":2}
"#;

#[test]
fn replay_through_plain_dashboard() {
    let dir = tempfile::tempdir().unwrap();
    let events = dir.path().join("events.jsonl");
    fs::write(&events, EVENTS).unwrap();

    let state = Arc::new(BuildState::new(2, 100, buildwatch::Importance::High));
    let out = SharedBuf::default();
    let dashboard = Dashboard::start_with_surface(
        Arc::clone(&state),
        Duration::from_millis(10),
        Box::new(PlainSurface::new(out.clone(), 0)),
    )
    .unwrap();

    let stats = replay::replay_file(&events, state.as_ref(), Duration::ZERO).unwrap();
    dashboard.shutdown();

    assert_eq!(stats.applied, 8);
    let text = out.text();
    assert!(text.contains("warning: CS0168: unused"), "output: {text}");
    assert!(!text.contains("chatter"));
    assert!(text.contains("finished: 2/2 projects (100%)"), "output: {text}");
}

#[test]
fn simulate_from_config_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("buildwatch.toml");
    fs::write(
        &path,
        r#"
[dashboard]
nodes = 3
redraw_interval_ms = 20

[simulate]
projects = 3
configurations = ["Debug"]
targets = ["Build"]
target_ms = 1
"#,
    )
    .unwrap();

    let doc = config::load(&path).unwrap();
    let cfg = DashboardConfig::from_doc(&doc).unwrap();
    let sim = SimulateConfig::from_doc(&doc).unwrap();
    let state = Arc::new(BuildState::new(cfg.node_count(), cfg.message_cap, cfg.importance));

    let report = simulate::run(&sim, cfg.node_count(), state.clone()).unwrap();
    assert_eq!(report.projects_built, 3);
    assert_eq!(state.progress().percent(), 100);
    // One configuration only, so no label needs a disambiguator.
    assert_eq!(
        state.registry().label_for(1).unwrap(),
        "src/Project0/Project0.proj"
    );
}

#[test]
fn binary_replays_in_plain_mode() {
    let dir = tempfile::tempdir().unwrap();
    let events = dir.path().join("events.jsonl");
    fs::write(&events, format!("# recorded\n{EVENTS}not json\n")).unwrap();

    let out = Command::new(env!("CARGO_BIN_EXE_buildwatch"))
        .args(["--plain", "--nodes", "2", "--interval-ms", "10", "replay"])
        .arg(&events)
        .args(["--pace-ms", "0"])
        .env("BUILDWATCH_LOG", "warn")
        .output()
        .unwrap();

    assert!(out.status.success(), "stderr: {}", String::from_utf8_lossy(&out.stderr));
    let stdout = String::from_utf8_lossy(&out.stdout);
    assert!(stdout.contains("warning: CS0168: unused"), "stdout: {stdout}");
    assert!(stdout.contains("finished: 2/2 projects (100%)"), "stdout: {stdout}");
    let stderr = String::from_utf8_lossy(&out.stderr);
    assert!(stderr.contains("skipping malformed event"), "stderr: {stderr}");
}

#[test]
fn binary_rejects_bad_override() {
    let out = Command::new(env!("CARGO_BIN_EXE_buildwatch"))
        .args(["--plain", "--set", "dashboard.redraw_interval_ms=0", "simulate"])
        .output()
        .unwrap();
    assert!(!out.status.success());
    assert!(String::from_utf8_lossy(&out.stderr).contains("redraw_interval_ms"));
}
