//! Feed a recorded JSON-lines event stream into a sink.

use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;
use std::thread;
use std::time::Duration;

use tracing::{info, warn};

use crate::error::{Error, Result};
use crate::events::{BuildEvent, BuildEventSink};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReplayStats {
    pub applied: usize,
    pub skipped: usize,
}

/// Parse one line. `Ok(None)` for blank lines and `#` comments.
pub fn parse_line(line: &str) -> Result<Option<BuildEvent>> {
    let line = line.trim();
    if line.is_empty() || line.starts_with('#') {
        return Ok(None);
    }
    Ok(Some(serde_json::from_str(line)?))
}

/// Read events from `reader` and dispatch each to `sink`, sleeping `pace`
/// between events. Malformed lines, including lines that are not UTF-8, are
/// logged and skipped. Read errors end the replay.
pub fn replay_reader<R: BufRead>(
    mut reader: R,
    sink: &dyn BuildEventSink,
    pace: Duration,
) -> Result<ReplayStats> {
    let mut stats = ReplayStats::default();
    let mut buf = Vec::new();
    let mut line_no = 0usize;
    loop {
        buf.clear();
        if reader.read_until(b'\n', &mut buf)? == 0 {
            break;
        }
        line_no += 1;
        let parsed = std::str::from_utf8(&buf)
            .map_err(|e| Error::msg(format!("line is not valid UTF-8: {e}")))
            .and_then(parse_line);
        match parsed {
            Ok(Some(ev)) => {
                sink.emit(&ev);
                stats.applied += 1;
                if !pace.is_zero() {
                    thread::sleep(pace);
                }
            }
            Ok(None) => {}
            Err(e) => {
                stats.skipped += 1;
                warn!(line = line_no, error = %e, "skipping malformed event");
            }
        }
    }
    Ok(stats)
}

pub fn replay_file(
    path: &Path,
    sink: &dyn BuildEventSink,
    pace: Duration,
) -> Result<ReplayStats> {
    let file = File::open(path)
        .map_err(|e| Error::msg(format!("failed to open {}: {e}", path.display())))?;
    let stats = replay_reader(BufReader::new(file), sink, pace)?;
    info!(
        path = %path.display(),
        applied = stats.applied,
        skipped = stats.skipped,
        "replay finished"
    );
    Ok(stats)
}
