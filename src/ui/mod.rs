//! Terminal UI rendering using ratatui.
//!
//! Drawing only ever sees the [`App`](crate::app::App) and the
//! [`TelemetryView`](crate::store::TelemetryView) it last read. Nothing here
//! touches the store, the network or the broker.
//!
//! ## Submodules
//!
//! - [`queues`]: Table of every queue with depth, rates and trend
//! - [`consumers`]: Consumer task states and the selected queue's buffer
//! - [`common`]: Shared components (header, tabs, alert bar, status bar, help)
//! - [`theme`]: Light/dark theme support with terminal auto-detection
//!
//! ## Layout
//!
//! ```text
//! ┌──────────────────────────────────────┐
//! │ Header (common::render_header)       │
//! ├──────────────────────────────────────┤
//! │ Tabs (common::render_tabs)           │
//! ├──────────────────────────────────────┤
//! │ Alert bar (common::render_alert_bar) │
//! ├──────────────────────────────────────┤
//! │                                      │
//! │ View Content                         │
//! │ (queues/consumers::render)           │
//! │                                      │
//! ├──────────────────────────────────────┤
//! │ Status Bar (common::render_status)   │
//! └──────────────────────────────────────┘
//!         ↑
//!    Overlay rendered on top:
//!    - common::render_help
//! ```

pub mod common;
pub mod consumers;
pub mod queues;
pub mod theme;

use ratatui::layout::{Alignment, Constraint, Layout, Rect};
use ratatui::style::{Color, Style};
use ratatui::widgets::Paragraph;
use ratatui::Frame;

use crate::app::{App, View};

pub use queues::SortColumn;
pub use theme::Theme;

/// Minimum terminal size for a usable display.
pub const MIN_WIDTH: u16 = 80;
pub const MIN_HEIGHT: u16 = 12;

/// Rows above the view content (header, tabs, alert bar).
pub const CONTENT_START_ROW: u16 = 3;

/// Draw one frame.
pub fn render(frame: &mut Frame, app: &App) {
    let area = frame.area();

    if area.width < MIN_WIDTH || area.height < MIN_HEIGHT {
        let msg = format!(
            "Terminal too small: {}x{}\nMinimum: {}x{}\n\nResize to continue",
            area.width, area.height, MIN_WIDTH, MIN_HEIGHT
        );
        let paragraph = Paragraph::new(msg)
            .alignment(Alignment::Center)
            .style(Style::default().fg(Color::Yellow));
        let centered = Rect::new(0, (area.height / 2).saturating_sub(2), area.width, 5.min(area.height));
        frame.render_widget(paragraph, centered);
        return;
    }

    let chunks = Layout::vertical([
        Constraint::Length(1), // Header bar
        Constraint::Length(1), // Tabs
        Constraint::Length(1), // Alert bar
        Constraint::Min(8),    // Content
        Constraint::Length(1), // Status bar
    ])
    .split(area);

    common::render_header(frame, app, chunks[0]);
    common::render_tabs(frame, app, chunks[1]);
    common::render_alert_bar(frame, app, chunks[2]);

    match app.current_view {
        View::Queues => queues::render(frame, app, chunks[3]),
        View::Consumers => consumers::render(frame, app, chunks[3]),
    }

    common::render_status_bar(frame, app, chunks[4]);

    if app.show_help {
        common::render_help(frame, app, area);
    }
}

/// Format a count for display (e.g., 1234 -> "1.2K", 1234567 -> "1.2M").
pub(crate) fn format_count(n: u64) -> String {
    if n >= 1_000_000 {
        format!("{:.1}M", n as f64 / 1_000_000.0)
    } else if n >= 1_000 {
        format!("{:.1}K", n as f64 / 1_000.0)
    } else {
        n.to_string()
    }
}

#[cfg(test)]
mod tests {
    use ratatui::backend::TestBackend;
    use ratatui::Terminal;

    use super::*;
    use crate::data::{QueueCounts, QueueSnapshot};
    use crate::store::SharedTelemetryStore;

    fn screen(app: &App, width: u16, height: u16) -> String {
        let mut terminal = Terminal::new(TestBackend::new(width, height)).unwrap();
        terminal.draw(|frame| render(frame, app)).unwrap();
        let buffer = terminal.backend().buffer().clone();
        let mut text = String::new();
        for y in 0..buffer.area.height {
            for x in 0..buffer.area.width {
                text.push_str(buffer[(x, y)].symbol());
            }
            text.push('\n');
        }
        text
    }

    fn app_with(queues: Vec<QueueSnapshot>) -> App {
        let store = SharedTelemetryStore::default();
        store.publish_snapshot(queues);
        let mut app = App::new(store, Theme::dark());
        app.refresh_view();
        app
    }

    #[test]
    fn test_format_count() {
        assert_eq!(format_count(999), "999");
        assert_eq!(format_count(1_234), "1.2K");
        assert_eq!(format_count(2_500_000), "2.5M");
    }

    #[test]
    fn test_queues_screen() {
        let app = app_with(vec![QueueSnapshot {
            name: "orders".to_string(),
            vhost: "/".to_string(),
            queue_type: "classic".to_string(),
            state: "running".to_string(),
            counts: QueueCounts {
                total: 5,
                ready: 3,
                unacked: 2,
            },
            ..Default::default()
        }]);

        let text = screen(&app, 120, 20);
        assert!(text.contains("1:Queues"));
        assert!(text.contains("/orders"));
        assert!(text.contains("No error queues detected."));
        assert!(text.contains("Last updated:"));
    }

    #[test]
    fn test_alert_bar_lists_error_queues() {
        let app = app_with(vec![QueueSnapshot {
            name: "ERROR-queue".to_string(),
            vhost: "/".to_string(),
            ..Default::default()
        }]);
        let text = screen(&app, 120, 20);
        assert!(text.contains("ALERT: Error queue(s) detected!"));
        assert!(text.contains("/ERROR-queue"));
    }

    #[test]
    fn test_consumers_screen_without_session() {
        let mut app = app_with(Vec::new());
        app.set_view(View::Consumers);
        let text = screen(&app, 120, 20);
        assert!(text.contains("No monitoring session"));
    }

    #[test]
    fn test_too_small() {
        let app = app_with(Vec::new());
        let text = screen(&app, 40, 10);
        assert!(text.contains("Terminal too small"));
    }
}
