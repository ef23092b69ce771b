//! Consumers view: one row per monitored queue, plus the selected queue's
//! buffered messages in receipt order.

use ratatui::{
    layout::{Constraint, Layout, Rect},
    style::{Modifier, Style},
    text::{Line, Span},
    widgets::{Block, Borders, Cell, Paragraph, Row, Table, TableState, Wrap},
    Frame,
};

use chrono::Local;

use super::format_count;
use crate::app::App;
use crate::data::duration::format_duration;

/// Characters of payload shown per message line.
const PREVIEW_CHARS: usize = 120;

pub fn render(frame: &mut Frame, app: &App, area: Rect) {
    if app.view.consumers.is_empty() {
        let hint = if app.marked.is_empty() {
            "No monitoring session. Mark queues with space in the Queues view, then press w."
        } else {
            "No monitoring session. Press w to watch the marked queues."
        };
        let block = Block::default()
            .title(" Consumers ")
            .borders(Borders::ALL)
            .border_type(app.theme.border_type)
            .border_style(Style::default().fg(app.theme.border));
        frame.render_widget(
            Paragraph::new(hint).block(block).style(Style::default().add_modifier(Modifier::DIM)),
            area,
        );
        return;
    }

    let chunks = Layout::vertical([
        Constraint::Length((app.view.consumers.len() as u16 + 3).min(area.height / 2)),
        Constraint::Min(4),
    ])
    .split(area);

    render_tasks(frame, app, chunks[0]);
    render_messages(frame, app, chunks[1]);
}

fn render_tasks(frame: &mut Frame, app: &App, area: Rect) {
    let header = Row::new(vec![
        "Queue", "Status", "Since", "Attempts", "Received", "Buffered", "Evicted", "Last error",
    ])
    .style(app.theme.header);

    let rows: Vec<Row> = app
        .view
        .consumers
        .values()
        .map(|task| {
            let buffer = app.view.buffers.get(&task.queue);
            let received = buffer.map(|b| b.received()).unwrap_or(0);
            let buffered = buffer.map(|b| b.len() as u64).unwrap_or(0);
            let evicted = buffer.map(|b| b.evicted()).unwrap_or(0);
            let evicted_style = if evicted > 0 {
                Style::default().fg(app.theme.warning)
            } else {
                Style::default()
            };

            let since = (Local::now() - task.updated_at)
                .to_std()
                .map(format_duration)
                .unwrap_or_else(|_| "-".to_string());

            Row::new(vec![
                Cell::from(task.queue.clone()),
                Cell::from(task.status.label()).style(app.theme.consumer_style(task.status)),
                Cell::from(since),
                Cell::from(task.attempts.to_string()),
                Cell::from(format_count(received)),
                Cell::from(format_count(buffered)),
                Cell::from(format_count(evicted)).style(evicted_style),
                Cell::from(task.last_error.clone().unwrap_or_else(|| "-".to_string())),
            ])
        })
        .collect();

    let widths = [
        Constraint::Fill(2),
        Constraint::Length(9),
        Constraint::Length(7),
        Constraint::Length(9),
        Constraint::Length(9),
        Constraint::Length(9),
        Constraint::Length(8),
        Constraint::Fill(4),
    ];

    let session_state = if !app.broker_connected() {
        "broker connection lost"
    } else if app.monitoring() {
        "active"
    } else {
        "stopped"
    };
    let title = format!(
        " Consumers (session {}, {}) [x:stop] ",
        app.view.session, session_state
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
    state.select(Some(app.selected_consumer_index));
    frame.render_stateful_widget(table, area, &mut state);
}

fn render_messages(frame: &mut Frame, app: &App, area: Rect) {
    let Some(queue) = app.selected_consumer() else {
        return;
    };
    let buffer = app.view.buffers.get(queue);

    // Newest at the bottom; keep only what fits.
    let visible = area.height.saturating_sub(2) as usize;
    let lines: Vec<Line> = buffer
        .map(|b| {
            let skip = b.len().saturating_sub(visible);
            b.iter()
                .skip(skip)
                .map(|m| {
                    let mut preview = m.payload_text().replace(['\n', '\r'], " ");
                    if preview.chars().count() > PREVIEW_CHARS {
                        preview = preview.chars().take(PREVIEW_CHARS).collect::<String>() + "…";
                    }
                    let key = if m.routing_key.is_empty() { "-" } else { m.routing_key.as_str() };
                    Line::from(vec![
                        Span::styled(
                            m.received_at.format("%H:%M:%S%.3f ").to_string(),
                            Style::default().add_modifier(Modifier::DIM),
                        ),
                        Span::styled(format!("{} ", key), Style::default().fg(app.theme.highlight)),
                        if m.redelivered {
                            Span::styled("(redelivered) ", Style::default().fg(app.theme.warning))
                        } else {
                            Span::raw("")
                        },
                        Span::raw(preview),
                    ])
                })
                .collect()
        })
        .unwrap_or_default();

    let count = buffer.map(|b| b.len()).unwrap_or(0);
    let capacity = buffer.map(|b| b.capacity()).unwrap_or(0);
    let title = format!(" Messages: {} ({}/{}) ", queue, count, capacity);

    let paragraph = if lines.is_empty() {
        Paragraph::new("No messages received yet")
            .style(Style::default().add_modifier(Modifier::DIM))
    } else {
        Paragraph::new(lines).wrap(Wrap { trim: false })
    };

    frame.render_widget(
        paragraph.block(
            Block::default()
                .title(title)
                .borders(Borders::ALL)
                .border_type(app.theme.border_type)
                .border_style(Style::default().fg(app.theme.border)),
        ),
        area,
    );
}
