//! Common UI components shared across views.
//!
//! This module contains the header bar, tab bar, alert bar, status bar, and
//! help overlay.

use ratatui::{
    layout::Rect,
    style::{Modifier, Style},
    text::{Line, Span},
    widgets::{Block, Borders, Clear, Paragraph, Tabs},
    Frame,
};

use super::format_count;
use crate::app::{App, View};
use crate::store::ConsumerStatus;

/// Render the header bar with a broker-wide overview.
///
/// Displays: alert indicator, source, queue count, summed depths, session size.
pub fn render_header(frame: &mut Frame, app: &App, area: Rect) {
    let queues = app.view.queues();
    if app.view.snapshot.generation == 0 {
        let line = Line::from(vec![
            Span::styled(" QUEUEWATCH ", Style::default().add_modifier(Modifier::BOLD)),
            Span::raw(format!("| {} | Waiting for first sample...", app.source_description())),
        ]);
        frame.render_widget(Paragraph::new(line), area);
        return;
    }

    let ready: u64 = queues.iter().map(|q| q.counts.ready).sum();
    let unacked: u64 = queues.iter().map(|q| q.counts.unacked).sum();
    let total: u64 = queues.iter().map(|q| q.counts.total).sum();

    let indicator = Span::styled(" ● ", app.theme.alert_style(!app.alerting.is_empty()));

    let running = app
        .view
        .consumers
        .values()
        .filter(|c| c.status == ConsumerStatus::Running)
        .count();
    let session = if app.view.consumers.is_empty() {
        "no session".to_string()
    } else {
        format!("{}/{} consuming", running, app.view.consumers.len())
    };

    let line = Line::from(vec![
        indicator,
        Span::styled("QUEUEWATCH ", Style::default().add_modifier(Modifier::BOLD)),
        Span::raw(format!("│ {} │ ", app.source_description())),
        Span::styled(
            format!("{}", queues.len()),
            Style::default().add_modifier(Modifier::BOLD),
        ),
        Span::raw(" queues │ "),
        Span::raw("R:"),
        Span::styled(format_count(ready), app.theme.depth_style(ready)),
        Span::raw(" U:"),
        Span::styled(format_count(unacked), app.theme.depth_style(unacked)),
        Span::raw(format!(" T:{} │ {}", format_count(total), session)),
    ]);

    frame.render_widget(Paragraph::new(line), area);
}

/// Render the tab bar showing available views.
pub fn render_tabs(frame: &mut Frame, app: &App, area: Rect) {
    let titles: Vec<Line> = vec![Line::from(" 1:Queues "), Line::from(" 2:Consumers ")];

    let selected = match app.current_view {
        View::Queues => 0,
        View::Consumers => 1,
    };

    let tabs = Tabs::new(titles)
        .select(selected)
        .style(app.theme.tab_inactive)
        .highlight_style(app.theme.tab_active)
        .divider("|");

    frame.render_widget(tabs, area);
}

/// Render the alert bar. It reflects the current snapshot on every frame,
/// independent of the alert cooldown.
pub fn render_alert_bar(frame: &mut Frame, app: &App, area: Rect) {
    let alerting = !app.alerting.is_empty();
    let text = if alerting {
        format!(" ALERT: Error queue(s) detected! {}", app.alerting.join(", "))
    } else {
        " No error queues detected.".to_string()
    };

    frame.render_widget(
        Paragraph::new(text).style(app.theme.alert_style(alerting)),
        area,
    );
}

/// Render the status bar at the bottom.
///
/// Shows: last update time, the latest sampling error, available controls.
/// Also displays temporary status messages.
pub fn render_status_bar(frame: &mut Frame, app: &App, area: Rect) {
    if let Some(msg) = app.get_status_message() {
        let paragraph =
            Paragraph::new(format!(" {} ", msg)).style(Style::default().fg(app.theme.highlight));
        frame.render_widget(paragraph, area);
        return;
    }

    let updated = match app.view.snapshot.fetched_at {
        Some(at) => format!("Last updated: {}", at.format("%Y-%m-%d %H:%M:%S")),
        None => "Last updated: never".to_string(),
    };

    let controls = if app.filter_active {
        "Type to search | Enter:apply Esc:cancel"
    } else {
        match app.current_view {
            View::Queues => "space:mark w:watch /:search s:sort r:refresh ?:help q:quit",
            View::Consumers => "↑↓:select x:stop Tab:switch ?:help q:quit",
        }
    };

    if let Some(ref err) = app.view.sampler.last_error {
        let line = Line::from(vec![
            Span::styled(format!(" {} ", updated), Style::default().add_modifier(Modifier::DIM)),
            Span::styled(
                format!("| Error: {} ", err),
                Style::default().fg(app.theme.critical),
            ),
            Span::styled(format!("| {}", controls), Style::default().add_modifier(Modifier::DIM)),
        ]);
        frame.render_widget(Paragraph::new(line), area);
        return;
    }

    let paragraph = Paragraph::new(format!(" {} | {}", updated, controls))
        .style(Style::default().add_modifier(Modifier::DIM));
    frame.render_widget(paragraph, area);
}

/// Render the help overlay with keyboard shortcuts.
///
/// Displayed as a centered modal on top of the current view.
pub fn render_help(frame: &mut Frame, app: &App, area: Rect) {
    let section = |title: &'static str| {
        Line::from(vec![Span::styled(title, Style::default().add_modifier(Modifier::BOLD))])
    };

    let help_text = vec![
        Line::from(vec![Span::styled("Keyboard Shortcuts", app.theme.header)]),
        Line::from(""),
        section(" Navigation"),
        Line::from("  Tab ←/→ 1/2  Switch views"),
        Line::from("  ↑/↓ j/k      Navigate list"),
        Line::from("  PgUp/PgDn    Jump 10 items"),
        Line::from("  Home/End     Jump to first/last"),
        Line::from(""),
        section(" Queues"),
        Line::from("  space        Mark/unmark queue"),
        Line::from("  w            Watch marked queues"),
        Line::from("  /            Start filter/search"),
        Line::from("  c            Clear filter"),
        Line::from("  s            Cycle sort column"),
        Line::from("  S            Toggle sort direction"),
        Line::from(""),
        section(" General"),
        Line::from("  x            Stop watching"),
        Line::from("  r            Sample now"),
        Line::from("  e            Export to JSON"),
        Line::from("  q Ctrl-C     Quit"),
        Line::from(""),
        Line::from(vec![Span::styled(
            "Press any key to close",
            Style::default().add_modifier(Modifier::DIM),
        )]),
    ];

    let block = Block::default()
        .title(" Help ")
        .borders(Borders::ALL)
        .border_type(app.theme.border_type)
        .border_style(Style::default().fg(app.theme.highlight));

    let paragraph = Paragraph::new(help_text).block(block);

    // Center the help overlay - responsive to terminal size
    let help_width = 44u16.min(area.width.saturating_sub(4));
    let help_height = 25u16.min(area.height.saturating_sub(2));
    let x = area.x + (area.width.saturating_sub(help_width)) / 2;
    let y = area.y + (area.height.saturating_sub(help_height)) / 2;
    let help_area = Rect::new(x, y, help_width, help_height);

    frame.render_widget(Clear, help_area);
    frame.render_widget(paragraph, help_area);
}
