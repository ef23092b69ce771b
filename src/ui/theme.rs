//! Theme configuration for the TUI.
//!
//! Supports light and dark themes with automatic terminal detection.

use ratatui::style::{Color, Modifier, Style};
use ratatui::widgets::block::BorderType;

use crate::store::ConsumerStatus;

/// Depth at or above which a count is shown as critical.
pub const DEPTH_CRITICAL: u64 = 100;

/// Color and style theme for the TUI.
///
/// Use [`Theme::auto_detect()`] for automatic theme selection based on
/// terminal background, or [`Theme::dark()`]/[`Theme::light()`] explicitly.
#[derive(Debug, Clone)]
pub struct Theme {
    /// Accent color for highlights and active elements.
    pub highlight: Color,
    /// Color for small but non-zero depths and retrying consumers.
    pub warning: Color,
    /// Color for deep queues, alerts and stopped consumers.
    pub critical: Color,
    /// Color for empty queues and running consumers.
    pub healthy: Color,
    /// Color for borders and separators.
    pub border: Color,
    /// Style for header rows in tables.
    pub header: Style,
    /// Style for selected/highlighted rows.
    pub selected: Style,
    /// Style for the active tab.
    pub tab_active: Style,
    /// Style for inactive tabs.
    pub tab_inactive: Style,
    /// Border style (rounded, plain, etc.).
    pub border_type: BorderType,
}

impl Theme {
    /// Create a dark theme suitable for dark terminal backgrounds.
    pub fn dark() -> Self {
        Self {
            highlight: Color::Cyan,
            warning: Color::Yellow,
            critical: Color::Red,
            healthy: Color::Green,
            border: Color::Gray,
            header: Style::default().fg(Color::Cyan).add_modifier(Modifier::BOLD),
            selected: Style::default().bg(Color::DarkGray).add_modifier(Modifier::BOLD),
            tab_active: Style::default().fg(Color::Cyan).add_modifier(Modifier::BOLD),
            tab_inactive: Style::default().fg(Color::Gray),
            border_type: BorderType::Rounded,
        }
    }

    /// Create a light theme suitable for light terminal backgrounds.
    pub fn light() -> Self {
        Self {
            highlight: Color::Blue,
            warning: Color::Yellow,
            critical: Color::Red,
            healthy: Color::Green,
            border: Color::DarkGray,
            header: Style::default().fg(Color::Blue).add_modifier(Modifier::BOLD),
            selected: Style::default().bg(Color::LightBlue).add_modifier(Modifier::BOLD),
            tab_active: Style::default().fg(Color::Blue).add_modifier(Modifier::BOLD),
            tab_inactive: Style::default().fg(Color::DarkGray),
            border_type: BorderType::Rounded,
        }
    }

    /// Auto-detect based on terminal background
    pub fn auto_detect() -> Self {
        // Use terminal-light crate to detect background luminance
        match terminal_light::luma() {
            Ok(luma) if luma > 0.5 => Self::light(),
            _ => Self::dark(),
        }
    }

    /// Style for a message count: green when empty, yellow below
    /// [`DEPTH_CRITICAL`], red otherwise.
    pub fn depth_style(&self, count: u64) -> Style {
        match count {
            0 => Style::default().fg(self.healthy),
            n if n < DEPTH_CRITICAL => Style::default().fg(self.warning),
            _ => Style::default().fg(self.critical).add_modifier(Modifier::BOLD),
        }
    }

    /// Style for a consumer task status.
    pub fn consumer_style(&self, status: ConsumerStatus) -> Style {
        match status {
            ConsumerStatus::Running => Style::default().fg(self.healthy),
            ConsumerStatus::Starting => Style::default().fg(self.highlight),
            ConsumerStatus::Retrying => Style::default().fg(self.warning),
            ConsumerStatus::Stopped => {
                Style::default().fg(self.critical).add_modifier(Modifier::BOLD)
            }
        }
    }

    /// Style for the alert bar.
    pub fn alert_style(&self, alerting: bool) -> Style {
        if alerting {
            Style::default().fg(self.critical).add_modifier(Modifier::BOLD)
        } else {
            Style::default().fg(self.healthy)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_depth_thresholds() {
        let theme = Theme::dark();
        assert_eq!(theme.depth_style(0).fg, Some(Color::Green));
        assert_eq!(theme.depth_style(99).fg, Some(Color::Yellow));
        assert_eq!(theme.depth_style(100).fg, Some(Color::Red));
    }

    #[test]
    fn test_stopped_consumer_is_critical() {
        let theme = Theme::light();
        assert_eq!(theme.consumer_style(ConsumerStatus::Stopped).fg, Some(theme.critical));
        assert_eq!(theme.consumer_style(ConsumerStatus::Running).fg, Some(theme.healthy));
    }
}
