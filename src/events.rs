use std::path::PathBuf;
use std::time::Duration;

use anyhow::Result;
use crossterm::event::{
    self, Event, KeyCode, KeyEvent, KeyModifiers, MouseButton, MouseEvent, MouseEventKind,
};

use crate::app::{App, View, EXPORT_PATH};

/// Poll for events with a timeout
pub fn poll_event(timeout: Duration) -> Result<Option<Event>> {
    if event::poll(timeout)? {
        Ok(Some(event::read()?))
    } else {
        Ok(None)
    }
}

/// Handle a key event
pub fn handle_key_event(app: &mut App, key: KeyEvent) {
    // Raw mode swallows SIGINT, so Ctrl-C arrives as a key
    if key.code == KeyCode::Char('c') && key.modifiers.contains(KeyModifiers::CONTROL) {
        app.quit();
        return;
    }

    // If help is shown, any key closes it
    if app.show_help {
        app.show_help = false;
        return;
    }

    if app.filter_active {
        handle_filter_input(app, key);
        return;
    }

    match key.code {
        KeyCode::Char('q') => app.quit(),

        // View switching
        KeyCode::Tab | KeyCode::BackTab => app.next_view(),
        KeyCode::Char('1') => app.set_view(View::Queues),
        KeyCode::Char('2') => app.set_view(View::Consumers),
        KeyCode::Left | KeyCode::Char('h') => app.prev_view(),
        KeyCode::Right | KeyCode::Char('l') => app.next_view(),

        // Navigation
        KeyCode::Up | KeyCode::Char('k') => app.select_prev(),
        KeyCode::Down | KeyCode::Char('j') => app.select_next(),
        KeyCode::PageUp => app.select_prev_n(10),
        KeyCode::PageDown => app.select_next_n(10),
        KeyCode::Home => app.select_first(),
        KeyCode::End => app.select_last(),

        // Monitoring session
        KeyCode::Char(' ') => {
            if app.current_view == View::Queues {
                app.toggle_mark();
            }
        }
        KeyCode::Char('w') => app.start_monitoring(),
        KeyCode::Char('x') => app.stop_monitoring(),

        KeyCode::Char('r') => app.request_refresh(),
        KeyCode::Char('?') => app.toggle_help(),

        // Sorting (Queues view)
        KeyCode::Char('s') => {
            if app.current_view == View::Queues {
                app.cycle_sort();
            }
        }
        KeyCode::Char('S') => {
            if app.current_view == View::Queues {
                app.toggle_sort_direction();
            }
        }

        KeyCode::Char('/') => app.start_filter(),
        KeyCode::Char('c') => {
            if !app.filter_text.is_empty() {
                app.clear_filter();
            }
        }
        KeyCode::Esc => {
            if app.current_view != View::Queues {
                app.set_view(View::Queues);
            }
        }

        KeyCode::Char('e') => {
            let export_path = PathBuf::from(EXPORT_PATH);
            match app.export_state(&export_path) {
                Ok(()) => {
                    app.set_status_message(format!("Exported to {}", export_path.display()));
                }
                Err(e) => {
                    app.set_status_message(format!("Export failed: {}", e));
                }
            }
        }

        _ => {}
    }
}

/// Handle key input while filter is active
fn handle_filter_input(app: &mut App, key: KeyEvent) {
    match key.code {
        // Confirm filter
        KeyCode::Enter => {
            app.filter_active = false;
        }

        // Cancel filter (keep text but exit input mode)
        KeyCode::Esc => {
            app.cancel_filter();
        }

        KeyCode::Backspace => {
            app.filter_pop();
            if app.filter_text.is_empty() {
                app.filter_active = false;
            }
        }

        KeyCode::Char(c) => {
            app.filter_push(c);
        }

        _ => {}
    }
}

/// Handle mouse events
pub fn handle_mouse_event(app: &mut App, mouse: MouseEvent, content_start_row: u16) {
    match mouse.kind {
        MouseEventKind::ScrollUp => app.select_prev(),
        MouseEventKind::ScrollDown => app.select_next(),

        MouseEventKind::Down(MouseButton::Left) => {
            let clicked_row = mouse.row;

            // Skip the table's top border and header row
            if clicked_row > content_start_row + 1 {
                let item_row = (clicked_row - content_start_row - 2) as usize;
                app.select_row(item_row);
            }

            // Tabs sit on row 1: " 1:Queues " then " 2:Consumers "
            if clicked_row == 1 {
                if mouse.column < 11 {
                    app.set_view(View::Queues);
                } else if mouse.column < 26 {
                    app.set_view(View::Consumers);
                }
            }
        }

        _ => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::QueueSnapshot;
    use crate::store::SharedTelemetryStore;
    use crate::ui::Theme;

    fn key(code: KeyCode) -> KeyEvent {
        KeyEvent::new(code, KeyModifiers::NONE)
    }

    fn test_app() -> App {
        let store = SharedTelemetryStore::default();
        store.publish_snapshot(
            ["orders", "payments", "shipping"]
                .iter()
                .map(|name| QueueSnapshot {
                    name: name.to_string(),
                    vhost: "/".to_string(),
                    ..Default::default()
                })
                .collect(),
        );
        let mut app = App::new(store, Theme::dark());
        app.refresh_view();
        app
    }

    #[test]
    fn test_quit_keys() {
        let mut app = test_app();
        handle_key_event(&mut app, key(KeyCode::Char('q')));
        assert!(!app.running);

        let mut app = test_app();
        handle_key_event(&mut app, KeyEvent::new(KeyCode::Char('c'), KeyModifiers::CONTROL));
        assert!(!app.running);
    }

    #[test]
    fn test_view_switching() {
        let mut app = test_app();
        handle_key_event(&mut app, key(KeyCode::Char('2')));
        assert_eq!(app.current_view, View::Consumers);
        handle_key_event(&mut app, key(KeyCode::Tab));
        assert_eq!(app.current_view, View::Queues);
        handle_key_event(&mut app, key(KeyCode::Right));
        assert_eq!(app.current_view, View::Consumers);
        handle_key_event(&mut app, key(KeyCode::Esc));
        assert_eq!(app.current_view, View::Queues);
    }

    #[test]
    fn test_space_marks_selected_queue() {
        let mut app = test_app();
        handle_key_event(&mut app, key(KeyCode::Down));
        handle_key_event(&mut app, key(KeyCode::Char(' ')));
        handle_key_event(&mut app, key(KeyCode::End));
        handle_key_event(&mut app, key(KeyCode::Char(' ')));
        let marked: Vec<&str> = app.marked.iter().map(String::as_str).collect();
        assert_eq!(marked, vec!["/payments", "/shipping"]);
    }

    #[test]
    fn test_filter_input_mode() {
        let mut app = test_app();
        handle_key_event(&mut app, key(KeyCode::Char('/')));
        assert!(app.filter_active);

        // Keys are text while filtering
        for c in "hq".chars() {
            handle_key_event(&mut app, key(KeyCode::Char(c)));
        }
        assert!(app.running);
        assert_eq!(app.current_view, View::Queues);
        handle_key_event(&mut app, key(KeyCode::Backspace));
        handle_key_event(&mut app, key(KeyCode::Backspace));
        handle_key_event(&mut app, key(KeyCode::Char('/')));
        for c in "ship".chars() {
            handle_key_event(&mut app, key(KeyCode::Char(c)));
        }
        handle_key_event(&mut app, key(KeyCode::Enter));
        assert!(!app.filter_active);
        assert_eq!(app.visible_queues().len(), 1);

        handle_key_event(&mut app, key(KeyCode::Char('c')));
        assert!(app.filter_text.is_empty());
        assert_eq!(app.visible_queues().len(), 3);
    }

    #[test]
    fn test_help_swallows_next_key() {
        let mut app = test_app();
        handle_key_event(&mut app, key(KeyCode::Char('?')));
        assert!(app.show_help);
        handle_key_event(&mut app, key(KeyCode::Char('q')));
        assert!(!app.show_help);
        assert!(app.running);
    }

    #[test]
    fn test_refresh_without_sampler() {
        let mut app = test_app();
        handle_key_event(&mut app, key(KeyCode::Char('r')));
        assert_eq!(app.get_status_message(), Some("No sampler attached"));
    }

    #[test]
    fn test_mouse_click_selects_row() {
        let mut app = test_app();
        let click = MouseEvent {
            kind: MouseEventKind::Down(MouseButton::Left),
            column: 10,
            row: 7,
            modifiers: KeyModifiers::NONE,
        };
        handle_mouse_event(&mut app, click, 3);
        assert_eq!(app.selected_queue_index, 2);
    }
}
