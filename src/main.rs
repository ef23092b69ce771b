use std::fs::OpenOptions;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use crossterm::{
    event::{DisableMouseCapture, EnableMouseCapture, Event},
    execute,
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
};
use ratatui::{backend::CrosstermBackend, Terminal};
use tokio::sync::Notify;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use queuewatch::alert::{AlertEvaluator, AlertSink, SilentSink, TerminalBell};
use queuewatch::app::{write_export, App};
use queuewatch::config::{MonitorSettings, Settings, DEFAULT_CONFIG_PATH};
use queuewatch::consumer::{Broker, ConsumerManager, ConsumerSettings, LapinBroker};
use queuewatch::data::duration::parse_duration;
use queuewatch::sampler::{ManagementClient, StatsSampler};
use queuewatch::store::SharedTelemetryStore;
use queuewatch::ui::{self, Theme, CONTENT_START_ROW};
use queuewatch::events;

/// How long quit waits for background tasks.
const SHUTDOWN_GRACE: Duration = Duration::from_secs(2);

/// Input poll timeout, which is also the redraw tick.
const TICK: Duration = Duration::from_millis(100);

#[derive(Parser, Debug)]
#[command(name = "queuewatch")]
#[command(about = "Live queue telemetry and consumption dashboard for RabbitMQ")]
struct Args {
    /// Path to the configuration file
    #[arg(short, long, default_value = DEFAULT_CONFIG_PATH)]
    config: PathBuf,

    /// Queues to consume from at startup (comma separated)
    #[arg(short, long, value_delimiter = ',')]
    watch: Vec<String>,

    /// Sampling interval (e.g., "5s", "500ms")
    #[arg(short, long)]
    refresh: Option<String>,

    /// Minimum time between two alerts (e.g., "60s", "5m")
    #[arg(long)]
    cooldown: Option<String>,

    /// Delay before a failed consumer retries
    #[arg(long)]
    retry_delay: Option<String>,

    /// Disable the audible alert
    #[arg(long)]
    silent: bool,

    /// Where to write logs (the terminal is taken by the dashboard)
    #[arg(long, default_value = "queuewatch.log")]
    log_file: PathBuf,

    /// Sample once, write the queue list as JSON to this file and exit
    #[arg(short, long)]
    export: Option<PathBuf>,
}

impl Args {
    /// Apply command-line overrides on top of the loaded settings.
    fn apply(&self, monitor: &mut MonitorSettings) -> Result<()> {
        if let Some(ref refresh) = self.refresh {
            monitor.refresh_interval = parse_duration(refresh).context("Invalid --refresh")?;
            anyhow::ensure!(!monitor.refresh_interval.is_zero(), "--refresh must be positive");
        }
        if let Some(ref cooldown) = self.cooldown {
            monitor.alert_cooldown = parse_duration(cooldown).context("Invalid --cooldown")?;
        }
        if let Some(ref retry) = self.retry_delay {
            monitor.retry_delay = parse_duration(retry).context("Invalid --retry-delay")?;
        }
        if self.silent {
            monitor.audible_alert = false;
        }
        Ok(())
    }
}

fn main() -> Result<()> {
    let args = Args::parse();
    init_logging(&args.log_file)?;

    let mut settings = Settings::load(&args.config)
        .with_context(|| format!("Failed to load configuration from {}", args.config.display()))?;
    args.apply(&mut settings.monitor)?;
    info!(broker = ?settings.rabbitmq, monitor = ?settings.monitor, "Configuration loaded");

    let client = ManagementClient::builder()
        .endpoint(settings.rabbitmq.management_url())
        .credentials(&settings.rabbitmq.username, &settings.rabbitmq.password)
        .timeout(settings.monitor.request_timeout)
        .build()?;

    let rt = tokio::runtime::Runtime::new()?;

    // Handle export mode (non-interactive)
    if let Some(ref export_path) = args.export {
        return rt.block_on(export_once(client, &settings.monitor, export_path));
    }

    let broker = rt
        .block_on(LapinBroker::connect(&settings.rabbitmq, settings.monitor.request_timeout))
        .context("Failed to connect to the broker")?;
    let broker = Arc::new(broker);

    let store = SharedTelemetryStore::new(settings.monitor.buffer_capacity);
    let shutdown = CancellationToken::new();

    let sink: Arc<dyn AlertSink> = if settings.monitor.audible_alert {
        Arc::new(TerminalBell)
    } else {
        Arc::new(SilentSink)
    };
    let sampler = StatsSampler::new(
        Arc::new(client),
        store.clone(),
        AlertEvaluator::new(settings.monitor.alert_cooldown),
        sink,
        settings.monitor.refresh_interval,
    );
    let refresh = sampler.refresh_handle();
    let sampler_task = rt.spawn(sampler.run(shutdown.clone()));
    rt.spawn(watch_interrupt(shutdown.clone()));

    let mut consumers = ConsumerManager::new(
        broker.clone(),
        store.clone(),
        ConsumerSettings {
            retry_delay: settings.monitor.retry_delay,
            op_timeout: settings.monitor.request_timeout,
        },
        shutdown.clone(),
        rt.handle().clone(),
    );
    if !args.watch.is_empty() {
        consumers.start_session(args.watch.clone());
    }

    let mut app = App::new(store, Theme::auto_detect())
        .with_consumers(consumers)
        .with_refresh(refresh.clone())
        .with_source(broker.description())
        .with_vhost(settings.rabbitmq.vhost.clone());
    for queue in &args.watch {
        app.mark(queue);
    }

    let result = run_tui(&mut app, &shutdown, &refresh);

    // Stop everything, bounded so a wedged broker cannot hang the exit
    shutdown.cancel();
    rt.block_on(async {
        if let Some(consumers) = app.take_consumers() {
            consumers.shutdown(SHUTDOWN_GRACE).await;
        }
        if tokio::time::timeout(SHUTDOWN_GRACE, sampler_task).await.is_err() {
            warn!("Sampler did not stop within {:?}", SHUTDOWN_GRACE);
        }
        let _ = tokio::time::timeout(SHUTDOWN_GRACE, broker.close()).await;
    });
    info!("Shut down");

    result
}

/// Route tracing output to a file; stdout belongs to the dashboard.
fn init_logging(path: &Path) -> Result<()> {
    let file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .with_context(|| format!("Failed to open log file {}", path.display()))?;

    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info,lapin=warn"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(Mutex::new(file))
        .with_ansi(false)
        .init();
    Ok(())
}

/// Cancel `shutdown` on SIGINT delivered outside raw mode (e.g. `kill -INT`).
async fn watch_interrupt(shutdown: CancellationToken) {
    tokio::select! {
        _ = shutdown.cancelled() => {}
        result = tokio::signal::ctrl_c() => match result {
            Ok(()) => {
                info!("Interrupt received");
                shutdown.cancel();
            }
            Err(e) => error!(error = %e, "Failed to listen for interrupt"),
        },
    }
}

/// Sample once and write the result without starting the dashboard.
async fn export_once(
    client: ManagementClient,
    monitor: &MonitorSettings,
    export_path: &Path,
) -> Result<()> {
    let store = SharedTelemetryStore::new(monitor.buffer_capacity);
    let mut sampler = StatsSampler::new(
        Arc::new(client),
        store.clone(),
        AlertEvaluator::new(monitor.alert_cooldown),
        Arc::new(SilentSink),
        monitor.refresh_interval,
    );
    sampler.sample_once().await.context("Failed to sample queues")?;

    write_export(&store.read_view(), export_path)?;
    println!("Exported queue state to: {}", export_path.display());
    Ok(())
}

/// Run the dashboard until quit or shutdown
fn run_tui(app: &mut App, shutdown: &CancellationToken, refresh: &Arc<Notify>) -> Result<()> {
    // Setup terminal
    enable_raw_mode()?;
    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen, EnableMouseCapture)?;
    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend)?;

    // Setup panic hook to restore terminal
    let original_hook = std::panic::take_hook();
    std::panic::set_hook(Box::new(move |panic| {
        let _ = disable_raw_mode();
        let _ = execute!(io::stdout(), LeaveAlternateScreen, DisableMouseCapture);
        original_hook(panic);
    }));

    let result = run_app(&mut terminal, app, shutdown, refresh);

    // Restore terminal
    disable_raw_mode()?;
    execute!(
        terminal.backend_mut(),
        LeaveAlternateScreen,
        DisableMouseCapture
    )?;
    terminal.show_cursor()?;

    result
}

fn run_app(
    terminal: &mut Terminal<CrosstermBackend<io::Stdout>>,
    app: &mut App,
    shutdown: &CancellationToken,
    refresh: &Arc<Notify>,
) -> Result<()> {
    while app.running && !shutdown.is_cancelled() {
        app.refresh_view();
        terminal.draw(|frame| ui::render(frame, app))?;

        if let Some(event) = events::poll_event(TICK)? {
            match event {
                Event::Key(key) => events::handle_key_event(app, key),
                Event::Mouse(mouse) => events::handle_mouse_event(app, mouse, CONTENT_START_ROW),
                Event::Resize(_, _) => refresh.notify_one(),
                _ => {}
            }
        }
    }

    Ok(())
}
