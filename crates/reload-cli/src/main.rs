mod config;

use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::{Arc, OnceLock};
use std::time::Duration;

use clap::{Parser, Subcommand};
use console::style;
use indicatif::{MultiProgress, ProgressBar, ProgressStyle};
use tokio::sync::watch;
use tracing_subscriber::{fmt, EnvFilter};

use reload_core::webhook::build_client;
use reload_core::{
    notification_channel, EventKind, MpvIpc, SessionStatus, WatchdogConfig, WatchdogSession,
    WebhookDispatcher,
};

use crate::config::AppConfig;

fn version_string() -> &'static str {
    static VERSION: OnceLock<String> = OnceLock::new();
    VERSION.get_or_init(|| {
        let hash = env!("MPV_RELOAD_GIT_HASH");
        if hash.is_empty() {
            env!("CARGO_PKG_VERSION").to_string()
        } else {
            format!("{} ({})", env!("CARGO_PKG_VERSION"), hash)
        }
    })
}

/// Watch a running mpv and reload streams that stall.
#[derive(Parser)]
#[command(name = "mpv-reload", version = version_string(), about)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Attach to mpv over its JSON IPC socket and run the watchdog.
    Attach {
        /// mpv `--input-ipc-server` socket. Overrides config file.
        #[arg(short, long)]
        socket: Option<PathBuf>,

        /// Path to TOML config file.
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Serve the HTTP API on this address. Overrides config file.
        #[arg(short, long)]
        listen: Option<SocketAddr>,

        /// Do not draw the live status line.
        #[arg(long, default_value_t = false)]
        no_status: bool,
    },
    /// Parse and validate a config file, then print the effective settings.
    CheckConfig {
        /// Path to TOML config file.
        config: PathBuf,
    },
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    match cli.command {
        Commands::Attach {
            socket,
            config,
            listen,
            no_status,
        } => run_attach(socket, config, listen, no_status).await,
        Commands::CheckConfig { config } => run_check_config(&config),
    }
}

fn load_config(path: Option<&Path>, default_level: &str) -> AppConfig {
    let Some(path) = path else {
        init_tracing("pretty", default_level);
        return AppConfig::default();
    };
    match AppConfig::load(path) {
        Ok(c) => {
            init_tracing(&c.server.log_format, default_level);
            tracing::info!(path = %path.display(), "Loaded config file");
            c
        }
        Err(e) => {
            init_tracing("pretty", default_level);
            tracing::error!("{}", e);
            std::process::exit(1);
        }
    }
}

async fn run_attach(
    socket_override: Option<PathBuf>,
    config_path: Option<PathBuf>,
    listen_override: Option<SocketAddr>,
    no_status: bool,
) {
    // Log lines would tear the status line apart, so only warnings by default.
    let default_level = if no_status { "info" } else { "warn" };
    let app_config = load_config(config_path.as_deref(), default_level);

    let Some(socket) = socket_override.or_else(|| app_config.mpv.socket.clone()) else {
        tracing::error!("No mpv socket given; pass --socket or set [mpv] socket");
        std::process::exit(1);
    };
    let listen = listen_override.or(app_config.server.listen);
    let watchdog_config = app_config.watchdog.to_watchdog_config();

    let (notification_tx, webhook_handle) = if app_config.webhook.is_empty() {
        (None, None)
    } else {
        let client = match build_client(watchdog_config.request_timeout) {
            Ok(c) => c,
            Err(e) => {
                tracing::error!(error = %e, "Failed to build HTTP client");
                std::process::exit(1);
            }
        };
        let (tx, rx) = notification_channel();
        let dispatcher = WebhookDispatcher::new(rx, app_config.webhook.clone(), client);
        tracing::info!(count = app_config.webhook.len(), "Webhook dispatcher started");
        (Some(tx), Some(tokio::spawn(dispatcher.run())))
    };

    let (ipc, host_events) = match MpvIpc::connect(&socket, &watchdog_config).await {
        Ok(connected) => connected,
        Err(e) => {
            tracing::error!(socket = %socket.display(), error = %e, "Failed to attach to mpv");
            std::process::exit(1);
        }
    };

    let session = WatchdogSession::new(watchdog_config.clone(), Arc::new(ipc), notification_tx);
    let handle = session.handle();
    let session_id = session.id();

    let (stop_tx, stop_rx) = watch::channel(false);

    let mut session_task = tokio::spawn(session.run(host_events, stopped(stop_rx.clone())));

    let api_task = listen.map(|addr| {
        let state = reload_api::state::AppState::new().with_session(handle.clone());
        let shutdown = stopped(stop_rx.clone());
        tracing::info!(%addr, "Starting HTTP API");
        tokio::spawn(async move {
            if let Err(e) = reload_api::serve_with_state(addr, state, shutdown).await {
                tracing::error!(error = %e, "Server failed");
            }
        })
    });

    let status_task = (!no_status).then(|| {
        let view = StatusView::new(&socket, &watchdog_config, listen);
        tokio::spawn(view.run(handle.subscribe(), stopped(stop_rx.clone())))
    });

    tracing::info!(%session_id, socket = %socket.display(), "Attached to mpv");

    let session_done = tokio::select! {
        _ = reload_api::shutdown_signal() => {
            tracing::info!("Shutdown signal received, stopping watchdog...");
            false
        }
        result = &mut session_task => {
            if let Err(e) = result {
                tracing::error!(error = %e, "Watchdog session task failed");
            }
            true
        }
    };

    let _ = stop_tx.send(true);
    if !session_done {
        match tokio::time::timeout(Duration::from_secs(5), session_task).await {
            Ok(_) => tracing::info!("Watchdog session stopped"),
            Err(_) => tracing::warn!("Watchdog session did not stop in time"),
        }
    }

    for task in [status_task, api_task].into_iter().flatten() {
        let _ = task.await;
    }

    if let Some(dispatcher_task) = webhook_handle {
        match tokio::time::timeout(Duration::from_secs(5), dispatcher_task).await {
            Ok(_) => tracing::info!("Webhook dispatcher shut down"),
            Err(_) => tracing::warn!("Webhook dispatcher did not shut down in time"),
        }
    }

    tracing::info!(reloads = handle.status().reload_count, "Shutdown complete");
}

fn run_check_config(path: &Path) {
    let config = match AppConfig::load(path) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("{} {}", style("error:").red().bold(), e);
            std::process::exit(1);
        }
    };
    let wd = config.watchdog.to_watchdog_config();

    println!("{} {}", style("valid").green().bold(), path.display());
    println!();
    let row = |name: &str, value: String| println!("  {:<34} {}", style(name).dim(), value);
    row("server.listen", config.server.listen.map_or("(disabled)".into(), |a| a.to_string()));
    row("server.log_format", config.server.log_format.clone());
    row(
        "mpv.socket",
        config
            .mpv
            .socket
            .as_ref()
            .map_or("(from --socket)".into(), |p| p.display().to_string()),
    );
    row("paused_for_cache_timer", toggle(wd.paused_for_cache_timer_enabled));
    row("paused_for_cache_timer_interval", seconds(wd.paused_for_cache_timer_interval));
    row("paused_for_cache_timer_timeout", seconds(wd.paused_for_cache_timer_timeout));
    row("demuxer_cache_timer", toggle(wd.demuxer_cache_timer_enabled));
    row("demuxer_cache_timer_interval", seconds(wd.demuxer_cache_timer_interval));
    row("demuxer_cache_timer_timeout", seconds(wd.demuxer_cache_timer_timeout));
    row("reload_eof", toggle(wd.reload_eof_enabled));
    row(
        "reload_key_binding",
        wd.reload_key_binding.clone().unwrap_or_else(|| "(none)".into()),
    );
    row("request_timeout", seconds(wd.request_timeout));
    row("event_limit", wd.event_limit.to_string());
    for wh in &config.webhook {
        let events = if wh.events.is_empty() {
            "all events".to_string()
        } else {
            wh.events.join(", ")
        };
        row("webhook", format!("{} ({})", wh.url, events));
    }
}

fn toggle(enabled: bool) -> String {
    let label = if enabled { "on" } else { "off" };
    label.to_string()
}

fn seconds(d: Duration) -> String {
    format!("{:.2}s", d.as_secs_f64())
}

async fn stopped(mut rx: watch::Receiver<bool>) {
    let _ = rx.wait_for(|stop| *stop).await;
}

/// Banner plus a live status line, with new events printed above it.
struct StatusView {
    multi: MultiProgress,
    bar: ProgressBar,
    last_event: Option<String>,
}

impl StatusView {
    fn new(socket: &Path, config: &WatchdogConfig, listen: Option<SocketAddr>) -> Self {
        let multi = MultiProgress::new();
        let msg_style = ProgressStyle::with_template("{wide_msg}").expect("valid template");

        multi
            .println(format!(
                "{} {}",
                style("mpv-reload").bold(),
                style(version_string()).dim()
            ))
            .ok();
        multi
            .println(format!(
                "  {} {}",
                style("socket: ").dim(),
                style(socket.display()).bold()
            ))
            .ok();
        multi
            .println(format!(
                "  {} {}",
                style("cache:  ").dim(),
                timer_summary(
                    config.demuxer_cache_timer_enabled,
                    config.demuxer_cache_timer_interval,
                    config.demuxer_cache_timer_timeout
                )
            ))
            .ok();
        multi
            .println(format!(
                "  {} {}",
                style("pause:  ").dim(),
                timer_summary(
                    config.paused_for_cache_timer_enabled,
                    config.paused_for_cache_timer_interval,
                    config.paused_for_cache_timer_timeout
                )
            ))
            .ok();
        multi
            .println(format!("  {} {}", style("eof:    ").dim(), toggle(config.reload_eof_enabled)))
            .ok();
        if let Some(addr) = listen {
            multi
                .println(format!("  {} http://{}", style("api:    ").dim(), addr))
                .ok();
        }
        multi.println("").ok();
        multi
            .println(format!("{}", style("Press Ctrl+C to stop").dim()))
            .ok();
        multi.println("").ok();

        let bar = multi.add(ProgressBar::new_spinner().with_style(msg_style));
        bar.set_message(format!("  {}", style("Waiting for mpv...").dim()));

        Self {
            multi,
            bar,
            last_event: None,
        }
    }

    async fn run(
        mut self,
        mut status: watch::Receiver<SessionStatus>,
        stop: impl std::future::Future<Output = ()>,
    ) {
        tokio::pin!(stop);
        loop {
            let snapshot = status.borrow_and_update().clone();
            self.render(&snapshot);
            tokio::select! {
                changed = status.changed() => {
                    if changed.is_err() {
                        break;
                    }
                }
                _ = &mut stop => break,
            }
        }
        let final_status = status.borrow().clone();
        self.render(&final_status);
        self.bar.finish_and_clear();
        self.multi
            .println(format!(
                "\n{} ({} reloads)",
                style("Watchdog stopped.").dim(),
                final_status.reload_count
            ))
            .ok();
    }

    fn render(&mut self, s: &SessionStatus) {
        let fresh: Vec<_> = s
            .events
            .iter()
            .take_while(|e| Some(&e.id) != self.last_event.as_ref())
            .collect();
        for ev in fresh.iter().rev() {
            let ts = ev.timestamp.format("%H:%M:%S");
            let kind_str = format!("{:<12}", ev.kind.to_string());
            let colored_kind = match ev.kind {
                EventKind::Reloaded | EventKind::CacheRecovered | EventKind::Resumed => {
                    style(kind_str).green()
                }
                EventKind::ReloadFailed | EventKind::CacheStuck => style(kind_str).red().bold(),
                _ => style(kind_str).yellow(),
            };
            let reason = ev.reason.map(|r| r.to_string()).unwrap_or_default();
            self.multi
                .println(format!(
                    "  {}  {} {:<14} {}",
                    style(ts).dim(),
                    colored_kind,
                    style(reason).dim(),
                    ev.details
                ))
                .ok();
        }
        if let Some(newest) = s.events.first() {
            self.last_event = Some(newest.id.clone());
        }

        let cache = if s.cache.enabled {
            format!("cache {} {:.0}s", s.cache.phase, s.cache.time_in_phase_secs)
        } else {
            "cache off".to_string()
        };
        let pause = match (s.pause.enabled, s.pause.active) {
            (false, _) => "pause off".to_string(),
            (true, false) => "playing".to_string(),
            (true, true) => format!("buffering {:.0}s", s.pause.elapsed_secs),
        };
        let path = s.path.as_deref().unwrap_or("-");
        self.bar.set_message(format!(
            "  {:<22} {:<16} reloads={:<4} {}",
            cache,
            pause,
            s.reload_count,
            style(path).dim()
        ));
    }
}

fn timer_summary(enabled: bool, interval: Duration, timeout: Duration) -> String {
    if !enabled {
        return "off".to_string();
    }
    format!(
        "every {:.1}s, reload after {:.1}s",
        interval.as_secs_f64(),
        timeout.as_secs_f64()
    )
}

fn init_tracing(log_format: &str, default_level: &str) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    match log_format {
        "json" => {
            fmt()
                .with_env_filter(filter)
                .json()
                .init();
        }
        _ => {
            fmt()
                .with_env_filter(filter)
                .init();
        }
    }
}
