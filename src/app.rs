//! Application state and navigation logic.

use std::collections::BTreeSet;
use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::{DateTime, Local};
use tokio::sync::Notify;

use crate::alert::alerting_queues;
use crate::consumer::ConsumerManager;
use crate::data::{queue_identity, History, QueueSnapshot};
use crate::store::{SharedTelemetryStore, TelemetryView};
use crate::ui::queues::{sort_queues_by, SortColumn};
use crate::ui::Theme;

/// Default path for the in-app export.
pub const EXPORT_PATH: &str = "queuewatch_export.json";

/// The current view/tab in the TUI.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum View {
    /// Every queue reported by the management API.
    Queues,
    /// Consumer tasks and buffered messages of the monitoring session.
    Consumers,
}

impl View {
    /// Cycle to the next view.
    pub fn next(self) -> Self {
        match self {
            View::Queues => View::Consumers,
            View::Consumers => View::Queues,
        }
    }

    /// Cycle to the previous view. There are only two, so it is the same as `next`.
    pub fn prev(self) -> Self {
        self.next()
    }

    /// Returns the display label for this view.
    pub fn label(&self) -> &'static str {
        match self {
            View::Queues => "Queues",
            View::Consumers => "Consumers",
        }
    }
}

/// Main application state.
pub struct App {
    pub running: bool,
    pub current_view: View,
    pub show_help: bool,

    store: SharedTelemetryStore,
    consumers: Option<ConsumerManager>,
    refresh: Option<Arc<Notify>>,
    source: String,
    /// Virtual host the broker connection is bound to.
    vhost: String,

    /// Last view read from the store.
    pub view: TelemetryView,
    pub history: History,
    /// Queues matching the error pattern in the current snapshot.
    pub alerting: Vec<String>,
    seen_alert: Option<DateTime<Local>>,

    // Navigation state
    pub selected_queue_index: usize,
    pub selected_consumer_index: usize,
    /// Identities (`vhost/name`) marked for the next monitoring session.
    pub marked: BTreeSet<String>,

    // Sorting (Queues view)
    pub sort_column: SortColumn,
    pub sort_ascending: bool,

    // Search/filter
    pub filter_text: String,
    pub filter_active: bool,

    // UI
    pub theme: Theme,

    // Status message (temporary feedback)
    pub status_message: Option<(String, Instant)>,
}

impl App {
    /// Create an app reading from `store`.
    pub fn new(store: SharedTelemetryStore, theme: Theme) -> Self {
        let view = store.read_view();
        Self {
            running: true,
            current_view: View::Queues,
            show_help: false,
            store,
            consumers: None,
            refresh: None,
            source: String::new(),
            vhost: "/".to_string(),
            view,
            history: History::new(),
            alerting: Vec::new(),
            seen_alert: None,
            selected_queue_index: 0,
            selected_consumer_index: 0,
            marked: BTreeSet::new(),
            sort_column: SortColumn::default(),
            sort_ascending: true,
            filter_text: String::new(),
            filter_active: false,
            theme,
            status_message: None,
        }
    }

    /// Attach the consumer manager used for monitoring sessions.
    pub fn with_consumers(mut self, consumers: ConsumerManager) -> Self {
        self.consumers = Some(consumers);
        self
    }

    /// Attach the sampler's refresh handle.
    pub fn with_refresh(mut self, refresh: Arc<Notify>) -> Self {
        self.refresh = Some(refresh);
        self
    }

    /// Describe where the data comes from (shown in the header).
    pub fn with_source(mut self, description: impl Into<String>) -> Self {
        self.source = description.into();
        self
    }

    /// Bind monitoring to the broker connection's virtual host (default `/`).
    pub fn with_vhost(mut self, vhost: impl Into<String>) -> Self {
        self.vhost = vhost.into();
        self
    }

    /// Virtual host that monitoring sessions consume from.
    pub fn vhost(&self) -> &str {
        &self.vhost
    }

    /// Returns a description of the current data source.
    pub fn source_description(&self) -> &str {
        &self.source
    }

    /// Hand the consumer manager back for shutdown.
    pub fn take_consumers(&mut self) -> Option<ConsumerManager> {
        self.consumers.take()
    }

    /// Set a temporary status message that will be shown for a few seconds.
    pub fn set_status_message(&mut self, message: String) {
        self.status_message = Some((message, Instant::now()));
    }

    /// Get the current status message if it hasn't expired (3 seconds).
    pub fn get_status_message(&self) -> Option<&str> {
        if let Some((msg, time)) = &self.status_message {
            if time.elapsed() < Duration::from_secs(3) {
                return Some(msg);
            }
        }
        None
    }

    /// Read a fresh view from the store.
    ///
    /// Returns true if a new snapshot generation arrived.
    pub fn refresh_view(&mut self) -> bool {
        self.view = self.store.read_view();
        let generation = self.view.snapshot.generation;
        let fresh = generation > 0
            && self.history.record(generation, self.view.queues(), Instant::now());

        self.alerting = alerting_queues(self.view.queues());
        if let Some(at) = self.view.sampler.last_alert_at {
            if self.seen_alert != Some(at) {
                self.seen_alert = Some(at);
                self.set_status_message(format!("ALERT: {}", self.alerting.join(", ")));
            }
        }

        let queues = self.visible_queues().len();
        self.selected_queue_index = self.selected_queue_index.min(queues.saturating_sub(1));
        let consumers = self.view.consumers.len();
        self.selected_consumer_index =
            self.selected_consumer_index.min(consumers.saturating_sub(1));
        fresh
    }

    /// Ask the sampler for an immediate cycle.
    pub fn request_refresh(&mut self) {
        match self.refresh {
            Some(ref refresh) => {
                refresh.notify_one();
                self.set_status_message("Refreshing...".to_string());
            }
            None => self.set_status_message("No sampler attached".to_string()),
        }
    }

    /// Queues after filtering and sorting, in display order.
    pub fn visible_queues(&self) -> Vec<&QueueSnapshot> {
        let mut queues: Vec<&QueueSnapshot> = self
            .view
            .queues()
            .iter()
            .filter(|q| self.matches_filter(&q.identity()))
            .collect();
        sort_queues_by(&mut queues, self.sort_column, self.sort_ascending);
        queues
    }

    /// The queue under the cursor in the Queues view.
    pub fn selected_queue(&self) -> Option<&QueueSnapshot> {
        self.visible_queues().get(self.selected_queue_index).copied()
    }

    /// Name of the consumer under the cursor in the Consumers view.
    pub fn selected_consumer(&self) -> Option<&str> {
        self.view
            .consumers
            .keys()
            .nth(self.selected_consumer_index)
            .map(String::as_str)
    }

    /// Switch to the next view.
    pub fn next_view(&mut self) {
        self.current_view = self.current_view.next();
    }

    /// Switch to the previous view.
    pub fn prev_view(&mut self) {
        self.current_view = self.current_view.prev();
    }

    /// Switch to a specific view.
    pub fn set_view(&mut self, view: View) {
        self.current_view = view;
    }

    fn item_count(&self) -> usize {
        match self.current_view {
            View::Queues => self.visible_queues().len(),
            View::Consumers => self.view.consumers.len(),
        }
    }

    fn selection_mut(&mut self) -> &mut usize {
        match self.current_view {
            View::Queues => &mut self.selected_queue_index,
            View::Consumers => &mut self.selected_consumer_index,
        }
    }

    /// Move selection down by one item.
    pub fn select_next(&mut self) {
        self.select_next_n(1);
    }

    /// Move selection up by one item.
    pub fn select_prev(&mut self) {
        self.select_prev_n(1);
    }

    /// Move selection down by n items.
    pub fn select_next_n(&mut self, n: usize) {
        let max = self.item_count().saturating_sub(1);
        let selected = self.selection_mut();
        *selected = (*selected + n).min(max);
    }

    /// Move selection up by n items.
    pub fn select_prev_n(&mut self, n: usize) {
        let selected = self.selection_mut();
        *selected = selected.saturating_sub(n);
    }

    /// Jump to the first item in the list.
    pub fn select_first(&mut self) {
        *self.selection_mut() = 0;
    }

    /// Jump to the last item in the list.
    pub fn select_last(&mut self) {
        let last = self.item_count().saturating_sub(1);
        *self.selection_mut() = last;
    }

    /// Select a row by its visual position, ignoring rows past the end.
    pub fn select_row(&mut self, row: usize) {
        if row < self.item_count() {
            *self.selection_mut() = row;
        }
    }

    /// Mark or unmark the selected queue for monitoring.
    ///
    /// Only queues on the connected virtual host can be consumed, so others
    /// are refused with a status message.
    pub fn toggle_mark(&mut self) {
        let Some((identity, vhost)) = self.selected_queue().map(|q| (q.identity(), q.vhost.clone()))
        else {
            return;
        };
        if vhost != self.vhost {
            self.set_status_message(format!(
                "Cannot watch {}: connected to vhost {}",
                identity, self.vhost
            ));
            return;
        }
        if !self.marked.remove(&identity) {
            self.marked.insert(identity);
        }
    }

    /// Mark a queue of the connected virtual host by bare name.
    pub fn mark(&mut self, name: &str) {
        if !name.is_empty() {
            self.marked.insert(queue_identity(&self.vhost, name));
        }
    }

    /// Bare names of the marked queues on the connected virtual host.
    pub fn marked_names(&self) -> Vec<String> {
        let prefix = queue_identity(&self.vhost, "");
        self.marked
            .iter()
            .filter_map(|identity| identity.strip_prefix(&prefix))
            .filter(|name| !name.is_empty())
            .map(str::to_string)
            .collect()
    }

    /// Whether `queue` is consumed by the running session.
    pub fn is_monitored(&self, queue: &QueueSnapshot) -> bool {
        queue.vhost == self.vhost && self.view.consumers.contains_key(&queue.name)
    }

    /// Start a monitoring session for the marked queues.
    pub fn start_monitoring(&mut self) {
        let queues = self.marked_names();
        if queues.is_empty() {
            self.set_status_message("Mark queues with space first".to_string());
            return;
        }
        let Some(ref mut consumers) = self.consumers else {
            self.set_status_message("Live consumption is not available".to_string());
            return;
        };

        let count = queues.len();
        consumers.start_session(queues);
        self.selected_consumer_index = 0;
        self.current_view = View::Consumers;
        self.refresh_view();
        self.set_status_message(format!("Monitoring {} queue(s)", count));
    }

    /// Stop the running monitoring session, if any.
    pub fn stop_monitoring(&mut self) {
        let stopped = self.consumers.as_mut().map(|c| c.stop_session()).unwrap_or(false);
        if stopped {
            self.set_status_message("Monitoring stopped".to_string());
        } else {
            self.set_status_message("No monitoring session".to_string());
        }
    }

    /// Whether a monitoring session is running.
    pub fn monitoring(&self) -> bool {
        self.consumers.as_ref().is_some_and(|c| c.is_active())
    }

    /// Whether the broker transport is usable. True when no broker is attached.
    pub fn broker_connected(&self) -> bool {
        self.consumers.as_ref().map_or(true, |c| c.broker_connected())
    }

    /// Toggle the help overlay.
    pub fn toggle_help(&mut self) {
        self.show_help = !self.show_help;
    }

    /// Cycle to the next sort column.
    pub fn cycle_sort(&mut self) {
        self.sort_column = self.sort_column.next();
    }

    /// Toggle sort direction between ascending and descending.
    pub fn toggle_sort_direction(&mut self) {
        self.sort_ascending = !self.sort_ascending;
    }

    /// Enter filter input mode (starts capturing keystrokes for search).
    pub fn start_filter(&mut self) {
        self.filter_active = true;
    }

    /// Exit filter input mode without clearing the filter text.
    pub fn cancel_filter(&mut self) {
        self.filter_active = false;
    }

    /// Clear the filter text and exit filter mode.
    pub fn clear_filter(&mut self) {
        self.filter_text.clear();
        self.filter_active = false;
    }

    /// Append a character to the filter text.
    pub fn filter_push(&mut self, c: char) {
        self.filter_text.push(c);
        self.selected_queue_index = 0;
    }

    /// Remove the last character from the filter text.
    pub fn filter_pop(&mut self) {
        self.filter_text.pop();
    }

    /// Check if a queue identity matches the current filter.
    pub fn matches_filter(&self, name: &str) -> bool {
        if self.filter_text.is_empty() {
            return true;
        }
        name.to_lowercase().contains(&self.filter_text.to_lowercase())
    }

    /// Signal the application to quit.
    pub fn quit(&mut self) {
        self.running = false;
    }

    /// Export the current view to a file.
    pub fn export_state(&self, path: &Path) -> anyhow::Result<()> {
        if self.view.snapshot.generation == 0 && self.view.consumers.is_empty() {
            anyhow::bail!("No data to export");
        }
        write_export(&self.view, path)
    }
}

/// JSON document describing a telemetry view.
pub fn export_json(view: &TelemetryView) -> serde_json::Value {
    let consumers: Vec<serde_json::Value> = view
        .consumers
        .values()
        .map(|c| {
            let buffer = view.buffers.get(&c.queue);
            serde_json::json!({
                "queue": c.queue,
                "status": c.status.label(),
                "attempts": c.attempts,
                "last_error": c.last_error,
                "received": buffer.map(|b| b.received()).unwrap_or(0),
                "buffered": buffer.map(|b| b.len()).unwrap_or(0),
                "evicted": buffer.map(|b| b.evicted()).unwrap_or(0),
            })
        })
        .collect();

    serde_json::json!({
        "exported_at": Local::now().to_rfc3339(),
        "fetched_at": view.snapshot.fetched_at.map(|t| t.to_rfc3339()),
        "generation": view.snapshot.generation,
        "summary": {
            "queues": view.queues().len(),
            "ready": view.queues().iter().map(|q| q.counts.ready).sum::<u64>(),
            "unacked": view.queues().iter().map(|q| q.counts.unacked).sum::<u64>(),
            "total": view.queues().iter().map(|q| q.counts.total).sum::<u64>(),
        },
        "alerting": alerting_queues(view.queues()),
        "sampler_error": view.sampler.last_error,
        "queues": view.queues(),
        "consumers": consumers,
    })
}

/// Write [`export_json`] for `view` to `path`.
pub fn write_export(view: &TelemetryView, path: &Path) -> anyhow::Result<()> {
    let json = serde_json::to_string_pretty(&export_json(view))?;
    std::fs::write(path, json)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::QueueCounts;
    use crate::store::{ConsumerEvent, ConsumerStatus};

    fn queue(name: &str, ready: u64) -> QueueSnapshot {
        queue_in("/", name, ready)
    }

    fn queue_in(vhost: &str, name: &str, ready: u64) -> QueueSnapshot {
        QueueSnapshot {
            name: name.to_string(),
            vhost: vhost.to_string(),
            state: "running".to_string(),
            counts: QueueCounts {
                total: ready,
                ready,
                unacked: 0,
            },
            ..Default::default()
        }
    }

    fn app_with(queues: Vec<QueueSnapshot>) -> (App, SharedTelemetryStore) {
        let store = SharedTelemetryStore::default();
        store.publish_snapshot(queues);
        let mut app = App::new(store.clone(), Theme::dark());
        app.refresh_view();
        (app, store)
    }

    #[test]
    fn test_view_cycle() {
        assert_eq!(View::Queues.next(), View::Consumers);
        assert_eq!(View::Consumers.next(), View::Queues);
        assert_eq!(View::Queues.prev(), View::Consumers);
    }

    #[test]
    fn test_refresh_records_history_once_per_generation() {
        let (mut app, store) = app_with(vec![queue("orders", 3)]);
        assert!(!app.refresh_view());

        store.publish_snapshot(vec![queue("orders", 7)]);
        assert!(app.refresh_view());
        assert_eq!(app.history.queue_ready["/orders"], vec![3, 7]);
    }

    #[test]
    fn test_filter_and_sort() {
        let (mut app, _) =
            app_with(vec![queue("orders", 5), queue("billing", 50), queue("orders-dlq", 1)]);

        let names: Vec<&str> = app.visible_queues().iter().map(|q| q.name.as_str()).collect();
        assert_eq!(names, vec!["billing", "orders", "orders-dlq"]);

        app.sort_column = SortColumn::Ready;
        app.sort_ascending = false;
        let names: Vec<&str> = app.visible_queues().iter().map(|q| q.name.as_str()).collect();
        assert_eq!(names, vec!["billing", "orders", "orders-dlq"]);

        app.filter_text = "ORDERS".to_string();
        assert_eq!(app.visible_queues().len(), 2);
    }

    #[test]
    fn test_selection_is_clamped() {
        let (mut app, store) = app_with(vec![queue("a", 0), queue("b", 0), queue("c", 0)]);
        app.select_last();
        assert_eq!(app.selected_queue_index, 2);
        app.select_next_n(10);
        assert_eq!(app.selected_queue_index, 2);

        store.publish_snapshot(vec![queue("a", 0)]);
        app.refresh_view();
        assert_eq!(app.selected_queue_index, 0);
        assert_eq!(app.selected_queue().unwrap().name, "a");
    }

    #[test]
    fn test_toggle_mark() {
        let (mut app, _) = app_with(vec![queue("orders", 0), queue("payments", 0)]);
        app.select_next();
        app.toggle_mark();
        assert!(app.marked.contains("/payments"));
        assert_eq!(app.marked_names(), vec!["payments"]);
        app.toggle_mark();
        assert!(app.marked.is_empty());
    }

    #[test]
    fn test_same_name_in_other_vhost_is_not_marked() {
        let (mut app, _) = app_with(vec![queue_in("/", "orders", 0), queue_in("shop", "orders", 0)]);
        assert_eq!(app.selected_queue().unwrap().identity(), "/orders");
        app.select_next();
        assert_eq!(app.selected_queue().unwrap().identity(), "shop/orders");

        app.toggle_mark();
        assert!(app.marked.is_empty());
        assert_eq!(
            app.get_status_message(),
            Some("Cannot watch shop/orders: connected to vhost /")
        );

        app.select_first();
        app.toggle_mark();
        assert_eq!(app.marked.iter().collect::<Vec<_>>(), vec!["/orders"]);
        assert_eq!(app.marked_names(), vec!["orders"]);
    }

    #[test]
    fn test_marks_follow_connected_vhost() {
        let store = SharedTelemetryStore::default();
        store.publish_snapshot(vec![queue_in("/", "orders", 0), queue_in("shop", "orders", 0)]);
        let mut app = App::new(store.clone(), Theme::dark()).with_vhost("shop");
        app.refresh_view();

        app.select_next();
        app.toggle_mark();
        app.mark("audit");
        assert_eq!(
            app.marked.iter().collect::<Vec<_>>(),
            vec!["shop/audit", "shop/orders"]
        );
        assert_eq!(app.marked_names(), vec!["audit", "orders"]);

        store.begin_session(&["orders".to_string()]);
        app.refresh_view();
        let queues = app.view.queues().to_vec();
        assert!(!app.is_monitored(&queues[0]));
        assert!(app.is_monitored(&queues[1]));
    }

    #[test]
    fn test_start_monitoring_without_marks_or_manager() {
        let (mut app, _) = app_with(vec![queue("orders", 0)]);
        app.start_monitoring();
        assert_eq!(app.get_status_message(), Some("Mark queues with space first"));

        app.toggle_mark();
        app.start_monitoring();
        assert_eq!(app.get_status_message(), Some("Live consumption is not available"));
        assert!(!app.monitoring());
    }

    #[test]
    fn test_alert_sets_status_message_once() {
        let (mut app, store) = app_with(vec![queue("payments-error", 0)]);
        assert_eq!(app.alerting, vec!["/payments-error"]);
        assert!(app.get_status_message().is_none());

        store.record_alert(Local::now());
        app.refresh_view();
        assert_eq!(app.get_status_message(), Some("ALERT: /payments-error"));

        app.status_message = None;
        app.refresh_view();
        assert!(app.get_status_message().is_none());
    }

    #[test]
    fn test_consumer_selection() {
        let store = SharedTelemetryStore::default();
        let session = store.begin_session(&["q1".to_string(), "q2".to_string()]);
        store.apply(ConsumerEvent::Status {
            session,
            queue: "q2".to_string(),
            status: ConsumerStatus::Running,
            error: None,
            attempt: 1,
        });
        let mut app = App::new(store, Theme::dark());
        app.refresh_view();
        app.set_view(View::Consumers);
        app.select_next();
        assert_eq!(app.selected_consumer(), Some("q2"));
        app.select_next();
        assert_eq!(app.selected_consumer(), Some("q2"));
    }

    #[test]
    fn test_export_state() {
        let (app, _) = app_with(vec![queue("orders", 3), queue("ERROR-queue", 0)]);
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("export.json");

        app.export_state(&path).unwrap();

        let json: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(json["summary"]["queues"], 2);
        assert_eq!(json["summary"]["ready"], 3);
        assert_eq!(json["alerting"][0], "/ERROR-queue");
        assert_eq!(json["queues"][0]["name"], "orders");
    }

    #[test]
    fn test_export_without_data_fails() {
        let app = App::new(SharedTelemetryStore::default(), Theme::dark());
        let dir = tempfile::tempdir().unwrap();
        assert!(app.export_state(&dir.path().join("x.json")).is_err());
    }
}
