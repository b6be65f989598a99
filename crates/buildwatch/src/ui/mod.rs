//! The redraw loop and the surfaces it paints on.
//!
//! A dashboard owns one thread. That thread wakes every redraw interval,
//! copies what it needs out of [`BuildState`] and repaints. Build threads only
//! ever touch `BuildState`, so a slow terminal never stalls the build.

pub mod render;

use std::io::{self, IsTerminal, Stdout, Write};
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use crossterm::cursor::{Hide, MoveTo, Show};
use crossterm::execute;
use ratatui::backend::CrosstermBackend;
use ratatui::layout::Rect;
use ratatui::{Terminal, TerminalOptions, Viewport};
use tracing::{debug, error, warn};

use crate::config::DashboardConfig;
use crate::error::{Error, Result};
use crate::state::{BuildState, Progress};

use self::render::{Snapshot, fit_region, format_elapsed_hms};

/// Something the redraw loop can paint the build state onto.
pub trait Surface: Send {
    fn paint(&mut self, state: &BuildState, elapsed: Duration) -> Result<()>;

    /// Last paint, then hand the terminal back.
    fn finish(&mut self, state: &BuildState, elapsed: Duration) -> Result<()>;

    /// Replacement surface after `paint` failed. `None` keeps this one.
    fn degrade(&mut self, _state: &BuildState) -> Option<Box<dyn Surface>> {
        None
    }
}

/// In-place region at the bottom of the terminal, repainted with ratatui diffing.
pub struct LiveSurface<W: Write + Send = Stdout> {
    terminal: Terminal<CrosstermBackend<W>>,
    message_rows: u16,
    /// Screen rows owned by the region; the cursor is parked below it on exit.
    area: Rect,
    restored: bool,
}

impl LiveSurface<Stdout> {
    /// Reserve an inline region on stdout sized for `slots` node rows.
    pub fn new(message_rows: u16, slots: usize) -> Result<Self> {
        let (_, term_rows) =
            crossterm::terminal::size().map_err(|e| Error::terminal(e.to_string()))?;
        let (height, message_rows) = fit_region(message_rows, slots, term_rows);

        let terminal = Terminal::with_options(
            CrosstermBackend::new(io::stdout()),
            TerminalOptions {
                viewport: Viewport::Inline(height),
            },
        )
        .map_err(|e| Error::terminal(e.to_string()))?;
        Self::from_terminal(terminal, message_rows)
    }
}

impl<W: Write + Send> LiveSurface<W> {
    /// Take over an already sized terminal and hide its cursor.
    pub fn from_terminal(
        mut terminal: Terminal<CrosstermBackend<W>>,
        message_rows: u16,
    ) -> Result<Self> {
        let area = terminal.get_frame().area();
        execute!(terminal.backend_mut(), Hide).map_err(|e| Error::terminal(e.to_string()))?;

        debug!(height = area.height, top = area.y, message_rows, "live region ready");
        Ok(Self {
            terminal,
            message_rows,
            area,
            restored: false,
        })
    }

    fn restore(&mut self) -> Result<()> {
        if self.restored {
            return Ok(());
        }
        self.restored = true;
        let row = self.area.bottom().saturating_sub(1);
        let backend = self.terminal.backend_mut();
        execute!(backend, MoveTo(0, row), Show).map_err(|e| Error::terminal(e.to_string()))?;
        backend
            .write_all(b"\r\n")
            .and_then(|_| backend.flush())
            .map_err(|e| Error::terminal(e.to_string()))
    }
}

impl<W: Write + Send> Surface for LiveSurface<W> {
    fn paint(&mut self, state: &BuildState, elapsed: Duration) -> Result<()> {
        let snap = Snapshot::capture(state, self.message_rows, elapsed);
        let mut draw_panicked = false;
        self.terminal
            .draw(|f| {
                if catch_unwind(AssertUnwindSafe(|| render::draw(f, &snap))).is_err() {
                    draw_panicked = true;
                }
            })
            .map_err(|e| Error::terminal(format!("repaint failed: {e}")))?;
        // The inline viewport moves when the terminal is resized.
        self.area = self.terminal.get_frame().area();
        if draw_panicked {
            return Err(Error::terminal("renderer panicked"));
        }
        Ok(())
    }

    fn finish(&mut self, state: &BuildState, elapsed: Duration) -> Result<()> {
        let painted = self.paint(state, elapsed);
        self.restore()?;
        painted
    }

    fn degrade(&mut self, state: &BuildState) -> Option<Box<dyn Surface>> {
        if let Err(e) = self.restore() {
            warn!(error = %e, "failed to restore terminal");
        }
        let from = state.messages().total_appended();
        Some(Box::new(PlainSurface::new(io::stdout(), from)))
    }
}

/// Line-oriented progress for pipes, CI logs and broken terminals.
pub struct PlainSurface<W: Write + Send> {
    out: W,
    next_seq: u64,
    last_progress: Option<Progress>,
}

impl<W: Write + Send> PlainSurface<W> {
    /// `from_seq` is the first message sequence number this surface prints.
    pub fn new(out: W, from_seq: u64) -> Self {
        Self {
            out,
            next_seq: from_seq,
            last_progress: None,
        }
    }

    fn write_progress(
        &mut self,
        state: &BuildState,
        p: Progress,
        elapsed: Duration,
    ) -> io::Result<()> {
        writeln!(
            self.out,
            "[{}] {}/{} projects ({}%), {}/{} nodes busy",
            format_elapsed_hms(elapsed),
            p.completed,
            p.total,
            p.percent(),
            state.busy_nodes(),
            state.node_slots(),
        )
    }
}

impl<W: Write + Send> Surface for PlainSurface<W> {
    fn paint(&mut self, state: &BuildState, elapsed: Duration) -> Result<()> {
        let (lines, next) = state.messages().since(self.next_seq);
        self.next_seq = next;
        for line in lines {
            writeln!(self.out, "{line}")?;
        }

        let p = state.progress();
        if self.last_progress != Some(p) {
            self.last_progress = Some(p);
            self.write_progress(state, p, elapsed)?;
        }
        self.out.flush()?;
        Ok(())
    }

    fn finish(&mut self, state: &BuildState, elapsed: Duration) -> Result<()> {
        self.paint(state, elapsed)?;
        let p = state.progress();
        writeln!(
            self.out,
            "finished: {}/{} projects ({}%) in {}",
            p.completed,
            p.total,
            p.percent(),
            format_elapsed_hms(elapsed)
        )?;
        self.out.flush()?;
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum LoopState {
    Running,
    Cancelled,
}

/// Handle to a running redraw loop. Dropping it cancels the loop without
/// waiting for the final repaint.
pub struct DashboardHandle {
    cancel: Sender<()>,
    done: Receiver<()>,
    thread: Option<JoinHandle<()>>,
    grace: Duration,
}

impl DashboardHandle {
    /// Cancel the loop and wait up to one redraw interval for its final repaint.
    ///
    /// Returns `false` if the loop did not acknowledge in time; the thread is
    /// then left to finish on its own.
    pub fn shutdown(mut self) -> bool {
        let _ = self.cancel.send(());
        match self.done.recv_timeout(self.grace) {
            Ok(()) | Err(RecvTimeoutError::Disconnected) => {
                if let Some(t) = self.thread.take() {
                    if t.join().is_err() {
                        error!("redraw thread panicked");
                    }
                }
                true
            }
            Err(RecvTimeoutError::Timeout) => {
                warn!(
                    grace_ms = self.grace.as_millis() as u64,
                    "redraw loop did not stop in time"
                );
                false
            }
        }
    }
}

/// Whether [`Dashboard::start`] will try the live region for `cfg`.
pub fn wants_live(cfg: &DashboardConfig) -> bool {
    !cfg.plain && io::stdout().is_terminal()
}

pub struct Dashboard;

impl Dashboard {
    /// Start painting `state` on stdout.
    ///
    /// Uses the live region when stdout is a terminal and `plain` is off;
    /// otherwise, or when the terminal cannot be set up, falls back to plain
    /// line output.
    pub fn start(state: Arc<BuildState>, cfg: &DashboardConfig) -> Result<DashboardHandle> {
        let surface: Box<dyn Surface> = if !wants_live(cfg) {
            Box::new(PlainSurface::new(io::stdout(), 0))
        } else {
            match LiveSurface::new(cfg.message_rows, state.node_slots()) {
                Ok(live) => Box::new(live),
                Err(e) => {
                    warn!(error = %e, "live display unavailable; using plain output");
                    Box::new(PlainSurface::new(io::stdout(), 0))
                }
            }
        };
        Self::start_with_surface(state, cfg.redraw_interval(), surface)
    }

    pub fn start_with_surface(
        state: Arc<BuildState>,
        interval: Duration,
        surface: Box<dyn Surface>,
    ) -> Result<DashboardHandle> {
        let (cancel_tx, cancel_rx) = mpsc::channel();
        let (done_tx, done_rx) = mpsc::channel();
        let thread = thread::Builder::new()
            .name("buildwatch redraw".into())
            .spawn(move || redraw_loop(&state, surface, interval, &cancel_rx, &done_tx))
            .map_err(|e| Error::msg(format!("failed to spawn redraw thread: {e}")))?;

        Ok(DashboardHandle {
            cancel: cancel_tx,
            done: done_rx,
            thread: Some(thread),
            grace: interval,
        })
    }
}

fn redraw_loop(
    state: &BuildState,
    mut surface: Box<dyn Surface>,
    interval: Duration,
    cancel: &Receiver<()>,
    done: &Sender<()>,
) {
    let started = Instant::now();
    let mut loop_state = LoopState::Running;

    while loop_state == LoopState::Running {
        if let Err(e) = surface.paint(state, started.elapsed()) {
            error!(error = %e, "repaint failed");
            if let Some(next) = surface.degrade(state) {
                surface = next;
            }
        }
        loop_state = match cancel.recv_timeout(interval) {
            Err(RecvTimeoutError::Timeout) => LoopState::Running,
            Ok(()) | Err(RecvTimeoutError::Disconnected) => LoopState::Cancelled,
        };
    }

    if let Err(e) = surface.finish(state, started.elapsed()) {
        error!(error = %e, "final repaint failed");
    }
    let _ = done.send(());
}
