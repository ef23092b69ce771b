//! Queues view rendering.
//!
//! Displays a table of every queue with type, state, depths colored by size,
//! message counters with rates, and a sparkline of ready depth.

use std::cmp::Ordering;

use ratatui::{
    layout::{Constraint, Rect},
    style::Style,
    text::Span,
    widgets::{Block, Borders, Cell, Row, Table, TableState},
    Frame,
};

use super::format_count;
use crate::app::App;
use crate::data::QueueSnapshot;

/// Sparkline characters (8 levels of height).
const SPARKLINE_CHARS: [char; 8] = ['▁', '▂', '▃', '▄', '▅', '▆', '▇', '█'];

/// Column to sort by in the Queues view.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SortColumn {
    /// Sort by vhost-qualified name.
    #[default]
    Name,
    Ready,
    Unacked,
    Total,
    /// Sort by publish rate.
    Incoming,
}

impl SortColumn {
    /// Cycle to the next sort column.
    pub fn next(self) -> Self {
        match self {
            SortColumn::Name => SortColumn::Ready,
            SortColumn::Ready => SortColumn::Unacked,
            SortColumn::Unacked => SortColumn::Total,
            SortColumn::Total => SortColumn::Incoming,
            SortColumn::Incoming => SortColumn::Name,
        }
    }

    fn label(self) -> &'static str {
        match self {
            SortColumn::Name => "name",
            SortColumn::Ready => "ready",
            SortColumn::Unacked => "unacked",
            SortColumn::Total => "total",
            SortColumn::Incoming => "in",
        }
    }
}

/// Render the Queues view.
pub fn render(frame: &mut Frame, app: &App, area: Rect) {
    let queues = app.visible_queues();

    let header = Row::new(vec![
        Cell::from(" "),
        Cell::from(format_header("Queue", SortColumn::Name, app)),
        Cell::from("T"),
        Cell::from("S"),
        Cell::from(format_header("Ready", SortColumn::Ready, app)),
        Cell::from(format_header("Unacked", SortColumn::Unacked, app)),
        Cell::from(format_header("Total", SortColumn::Total, app)),
        Cell::from(format_header("In", SortColumn::Incoming, app)),
        Cell::from("D/G"),
        Cell::from("Ack"),
        Cell::from("Trend"),
    ])
    .height(1)
    .style(app.theme.header);

    let rows: Vec<Row> = queues
        .iter()
        .map(|q| {
            let identity = q.identity();
            let marker = if app.is_monitored(q) {
                "◉"
            } else if app.marked.contains(&identity) {
                "+"
            } else {
                " "
            };
            let state = if q.is_running() {
                Cell::from("✓").style(Style::default().fg(app.theme.healthy))
            } else {
                Cell::from("✗").style(Style::default().fg(app.theme.critical))
            };
            let sparkline = render_sparkline(&app.history.ready_sparkline(&identity));
            let trend = match app.history.ready_growth(&identity) {
                Some(growth) if growth.abs() >= 0.05 => format!("{} {:+.1}/s", sparkline, growth),
                _ => sparkline,
            };

            Row::new(vec![
                Cell::from(marker).style(Style::default().fg(app.theme.highlight)),
                Cell::from(identity),
                Cell::from(type_initial(&q.queue_type)),
                state,
                Cell::from(format_count(q.counts.ready)).style(app.theme.depth_style(q.counts.ready)),
                Cell::from(format_count(q.counts.unacked))
                    .style(app.theme.depth_style(q.counts.unacked)),
                Cell::from(format_count(q.counts.total)).style(app.theme.depth_style(q.counts.total)),
                Cell::from(format_counter(q.rates.publish, q.rates.publish_rate)),
                Cell::from(format_counter(q.rates.deliver_get, q.rates.deliver_get_rate)),
                Cell::from(format_counter(q.rates.ack, q.rates.ack_rate)),
                Cell::from(trend),
            ])
        })
        .collect();

    let widths = [
        Constraint::Length(1),
        Constraint::Fill(3), // Queue
        Constraint::Length(1),
        Constraint::Length(1),
        Constraint::Fill(1), // Ready
        Constraint::Fill(1), // Unacked
        Constraint::Fill(1), // Total
        Constraint::Fill(2), // In
        Constraint::Fill(2), // D/G
        Constraint::Fill(2), // Ack
        Constraint::Min(16), // Trend
    ];

    let selected_visual_index = app.selected_queue_index.min(queues.len().saturating_sub(1));
    let sort_dir = if app.sort_ascending { "↑" } else { "↓" };

    let filter_info = if app.filter_active {
        format!(" /{}_", app.filter_text)
    } else if !app.filter_text.is_empty() {
        format!(" /{}/ [c:clear]", app.filter_text)
    } else {
        String::new()
    };

    let marked_info = if app.marked.is_empty() {
        String::new()
    } else {
        format!(" [{} marked, w:watch]", app.marked.len())
    };

    let position_info = if !queues.is_empty() {
        format!(" [{}/{}]", selected_visual_index + 1, queues.len())
    } else {
        String::new()
    };

    let title = format!(
        " Queues ({}/{}) [s:sort {}{}]{}{}{} ",
        queues.len(),
        app.view.queues().len(),
        app.sort_column.label(),
        sort_dir,
        filter_info,
        marked_info,
        position_info
    );

    let table = Table::new(rows, widths)
        .header(header)
        .block(
            Block::default()
                .title(title)
                .borders(Borders::ALL)
                .border_type(app.theme.border_type)
                .border_style(Style::default().fg(app.theme.border)),
        )
        .row_highlight_style(app.theme.selected)
        .highlight_symbol("▶ ");

    let mut state = TableState::default();
    state.select(Some(selected_visual_index));

    frame.render_stateful_widget(table, area, &mut state);
}

fn format_header(name: &str, col: SortColumn, app: &App) -> Span<'static> {
    if app.sort_column == col {
        let arrow = if app.sort_ascending { "↑" } else { "↓" };
        Span::raw(format!("{}{}", name, arrow))
    } else {
        Span::raw(name.to_string())
    }
}

/// Sort queues by the given column and direction, ties broken by identity.
pub fn sort_queues_by(queues: &mut [&QueueSnapshot], column: SortColumn, ascending: bool) {
    queues.sort_by(|a, b| {
        let primary = match column {
            SortColumn::Name => a.identity().cmp(&b.identity()),
            SortColumn::Ready => a.counts.ready.cmp(&b.counts.ready),
            SortColumn::Unacked => a.counts.unacked.cmp(&b.counts.unacked),
            SortColumn::Total => a.counts.total.cmp(&b.counts.total),
            SortColumn::Incoming => {
                let a_rate = a.rates.publish_rate.unwrap_or(0.0);
                let b_rate = b.rates.publish_rate.unwrap_or(0.0);
                a_rate.partial_cmp(&b_rate).unwrap_or(Ordering::Equal)
            }
        };

        let primary = if ascending {
            primary
        } else {
            primary.reverse()
        };

        if primary == Ordering::Equal {
            a.identity().cmp(&b.identity())
        } else {
            primary
        }
    });
}

fn type_initial(queue_type: &str) -> String {
    queue_type.chars().next().map(|c| c.to_ascii_uppercase().to_string()).unwrap_or_default()
}

/// A cumulative counter with its current rate, e.g. "600 (10.5/s)".
fn format_counter(count: u64, rate: Option<f64>) -> String {
    match rate {
        Some(rate) => format!("{} ({:.1}/s)", format_count(count), rate),
        None => format_count(count),
    }
}

fn render_sparkline(data: &[u8]) -> String {
    if data.is_empty() {
        return "        ".to_string(); // 8 spaces placeholder
    }

    // Take last 8 values
    let values: Vec<u8> = data.iter().rev().take(8).rev().copied().collect();

    values.iter().map(|&v| SPARKLINE_CHARS[v.min(7) as usize]).collect()
}
