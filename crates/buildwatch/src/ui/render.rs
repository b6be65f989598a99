use std::time::Duration;

use ratatui::Frame;
use ratatui::layout::{Constraint, Direction, Layout, Rect};
use ratatui::style::{Color, Modifier, Style};
use ratatui::text::{Line, Span, Text};
use ratatui::widgets::{Cell, Gauge, Paragraph, Row, Table};

use crate::nodes::NodeSlot;
use crate::state::{BuildState, Progress};

/// Progress row plus table header.
const FIXED_ROWS: u16 = 2;

/// Everything one repaint shows, copied out of [`BuildState`] before drawing.
#[derive(Debug, Clone)]
pub struct Snapshot {
    pub progress: Progress,
    pub nodes: Vec<NodeSlot>,
    pub messages: Vec<String>,
    pub message_rows: u16,
    pub elapsed: Duration,
    pub clock: String,
}

impl Snapshot {
    pub fn capture(state: &BuildState, message_rows: u16, elapsed: Duration) -> Self {
        Self {
            progress: state.progress(),
            nodes: state.node_snapshot(),
            messages: state.messages().last_n(message_rows as usize),
            message_rows,
            elapsed,
            clock: chrono::Local::now().format("%H:%M:%S").to_string(),
        }
    }

    pub fn busy(&self) -> usize {
        self.nodes.iter().filter(|n| !n.is_idle()).count()
    }
}

/// Height of the live region and the message rows that fit in it.
///
/// Message rows give way first when the terminal is short; the table is
/// clipped only when even the fixed rows do not fit.
pub fn fit_region(message_rows: u16, slots: usize, term_rows: u16) -> (u16, u16) {
    let term_rows = term_rows.max(1);
    let fixed = FIXED_ROWS.saturating_add(u16::try_from(slots).unwrap_or(u16::MAX));
    if fixed >= term_rows {
        return (term_rows, 0);
    }
    let messages = message_rows.min(term_rows - fixed);
    (fixed + messages, messages)
}

pub fn draw(f: &mut Frame, snap: &Snapshot) {
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(snap.message_rows),
            Constraint::Length(1),
            Constraint::Min(0),
        ])
        .split(f.area());

    draw_messages(f, chunks[0], &snap.messages);
    draw_progress(f, chunks[1], snap);
    draw_nodes(f, chunks[2], &snap.nodes);
}

fn draw_messages(f: &mut Frame, area: Rect, messages: &[String]) {
    if area.height == 0 {
        return;
    }
    let rows = area.height as usize;
    let shown = &messages[messages.len().saturating_sub(rows)..];
    // Bottom-align so the newest line sits right above the progress row.
    let mut lines: Vec<Line> = vec![Line::default(); rows - shown.len()];
    lines.extend(shown.iter().map(|m| message_line(m)));
    f.render_widget(Paragraph::new(Text::from(lines)), area);
}

fn message_line(msg: &str) -> Line<'static> {
    let style = if msg.starts_with("error:") {
        Style::default().fg(Color::Red)
    } else if msg.starts_with("warning:") {
        Style::default().fg(Color::Yellow)
    } else {
        Style::default()
    };
    Line::from(Span::styled(msg.to_string(), style))
}

fn draw_progress(f: &mut Frame, area: Rect, snap: &Snapshot) {
    let p = snap.progress;
    let label = format!(
        "{}/{} projects  {}%  |  {}/{} nodes busy  |  {}  |  {}",
        p.completed,
        p.total,
        p.percent(),
        snap.busy(),
        snap.nodes.len(),
        format_elapsed_hms(snap.elapsed),
        snap.clock,
    );
    let gauge = Gauge::default()
        .ratio(p.fraction())
        .label(label)
        .use_unicode(true)
        .gauge_style(Style::default().fg(Color::Green).bg(Color::Black));
    f.render_widget(gauge, area);
}

fn draw_nodes(f: &mut Frame, area: Rect, nodes: &[NodeSlot]) {
    let header = Row::new(["Node", "Project", "Target"])
        .style(Style::default().add_modifier(Modifier::BOLD | Modifier::UNDERLINED));
    let rows = nodes.iter().enumerate().map(|(i, slot)| {
        Row::new(vec![
            Cell::from(Span::styled(
                format!("{i:>4}"),
                Style::default().fg(Color::DarkGray),
            )),
            Cell::from(project_line(slot)),
            Cell::from(Span::styled(
                slot.target.clone(),
                Style::default().fg(Color::Cyan),
            )),
        ])
    });
    let table = Table::new(
        rows,
        [
            Constraint::Length(4),
            Constraint::Fill(3),
            Constraint::Fill(1),
        ],
    )
    .header(header)
    .column_spacing(2);
    f.render_widget(table, area);
}

/// `dir/` plain, file stem bold, extension plain, disambiguator italic.
pub fn project_line(slot: &NodeSlot) -> Line<'static> {
    if slot.project.is_empty() {
        return Line::default();
    }
    let path = slot.project.as_str();
    let (dir, file) = match path.rfind(|c: char| c == '/' || c == '\\') {
        Some(i) => path.split_at(i + 1),
        None => ("", path),
    };
    let (stem, ext) = match file.rfind('.') {
        Some(i) if i > 0 => file.split_at(i),
        _ => (file, ""),
    };

    let mut spans = vec![
        Span::raw(dir.to_string()),
        Span::styled(stem.to_string(), Style::default().add_modifier(Modifier::BOLD)),
        Span::raw(ext.to_string()),
    ];
    if !slot.disambiguator.is_empty() {
        spans.push(Span::styled(
            format!(" [{}]", slot.disambiguator),
            Style::default()
                .fg(Color::Magenta)
                .add_modifier(Modifier::ITALIC),
        ));
    }
    Line::from(spans)
}

pub fn format_elapsed_hms(elapsed: Duration) -> String {
    let total_secs = elapsed.as_secs();
    let hours = total_secs / 3600;
    let minutes = (total_secs % 3600) / 60;
    let seconds = total_secs % 60;
    format!("{hours:02}:{minutes:02}:{seconds:02}")
}
