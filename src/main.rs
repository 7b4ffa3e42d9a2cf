use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{anyhow, bail, Result};
use clap::{Parser, Subcommand};
use qlab_sync_monitor::alert::sink::{AlertSink, LogSink, WebhookSink};
use qlab_sync_monitor::alert::TransitionAlerter;
use qlab_sync_monitor::classify::TickReport;
use qlab_sync_monitor::config::{Config, ConfigOverrides};
use qlab_sync_monitor::fetch::http::{build_client, HttpSourceFetcher};
use qlab_sync_monitor::monitor::Monitor;
use qlab_sync_monitor::output::csv::{tick_to_csv, variables_to_csv};
use qlab_sync_monitor::output::json::render_json;
use qlab_sync_monitor::output::table::{
    render_settings_table, render_tick_table, render_variables_table, render_version_table,
};
use qlab_sync_monitor::output::OutputFormat;
use qlab_sync_monitor::poll::sink::{FanoutSink, PrintSink, StatusSink, WatchSink};
use qlab_sync_monitor::poll::{run_cycle, PollOrchestrator};
use qlab_sync_monitor::server::{run_server, ApiState};
use qlab_sync_monitor::settings::order::MoveDirection;
use qlab_sync_monitor::settings::store::SettingsStore;
use qlab_sync_monitor::settings::{Settings, SettingsDraft, RECOMMENDED_POLL_INTERVAL_MS};
use qlab_sync_monitor::variables::VariableRegistry;
use qlab_sync_monitor::version::{running_version, spawn_version_check, VersionAdvisory, VersionChecker};
use reqwest::Client;
use tokio::sync::watch;
use tracing::{debug, info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Debug, Parser)]
#[command(
    name = "qlab-sync-monitor",
    about = "Watch redundant QLab connections for drift"
)]
struct Cli {
    #[arg(short, long)]
    config: Option<PathBuf>,
    /// Settings record to use instead of the configured one.
    #[arg(short, long)]
    settings: Option<PathBuf>,
    /// Poll this endpoint for this run without saving it.
    #[arg(short, long = "base-url")]
    base_url: Option<String>,
    #[arg(short, long, value_enum, default_value_t = OutputFormat::Table)]
    output: OutputFormat,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Poll continuously and print every tick until interrupted.
    Watch {
        #[arg(long)]
        no_alerts: bool,
    },
    /// Run a single poll cycle.
    Once,
    /// Poll in the background and expose the control API.
    Serve {
        #[arg(long)]
        host: Option<String>,
        #[arg(long)]
        port: Option<u16>,
        /// Also print every tick to stdout.
        #[arg(long)]
        print: bool,
    },
    /// Show or change the saved monitor settings.
    Settings {
        #[arg(long)]
        url: Option<String>,
        #[arg(long = "poll-interval-ms")]
        poll_interval_ms: Option<f64>,
        #[arg(long)]
        tolerance: Option<f64>,
        /// Source label, repeat for each connection (primary first).
        #[arg(long = "source")]
        sources: Vec<String>,
        /// Variable id to compare, repeat for each one.
        #[arg(long = "variable")]
        variables: Vec<String>,
        #[arg(long = "move-up")]
        move_up: Option<String>,
        #[arg(long = "move-down")]
        move_down: Option<String>,
        /// Accept a poll interval other than the recommended one.
        #[arg(long)]
        force: bool,
    },
    /// List the variable catalog in display order.
    Variables,
    /// Check the release ledger for a newer version.
    Version,
    Config {
        #[arg(long)]
        init: bool,
        #[arg(long)]
        show: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();
    let cli = Cli::parse();

    let config_path = cli.config.clone().unwrap_or_else(Config::default_path);
    let mut config = Config::load(Some(&config_path))?;
    let (host, port) = match &cli.command {
        Commands::Serve { host, port, .. } => (host.clone(), *port),
        _ => (None, None),
    };
    config.apply_overrides(ConfigOverrides {
        settings_path: cli.settings.clone(),
        host,
        port,
    });

    if let Commands::Config { init, show } = &cli.command {
        return handle_config_command(*init, *show, &config, &config_path);
    }

    let registry = Arc::new(config.registry());
    let store = SettingsStore::new(config.resolved_settings_path(), Arc::clone(&registry));
    let (timeout, connect_timeout) = config.http_timeouts();
    let client = build_client(timeout, connect_timeout)?;

    match &cli.command {
        Commands::Watch { no_alerts } => {
            let settings = store.load();
            let mut sink = FanoutSink::new().with(Arc::new(PrintSink::new(cli.output)));
            if !*no_alerts {
                if let Some(alerter) = build_alerter(&config, &client) {
                    sink = sink.with(alerter);
                }
            }
            let monitor = build_monitor(store, &registry, &client, settings, Arc::new(sink))
                .with_base_url_override(cli.base_url.clone());
            start_version_check(&config, &client, |advisory| {
                debug!(?advisory, "version check finished");
            });
            monitor.start();
            tokio::signal::ctrl_c().await?;
            info!("interrupted, stopping");
        }
        Commands::Once => {
            let mut settings = store.load();
            if let Some(base_url) = &cli.base_url {
                settings = settings.with_base_url(base_url);
            }
            let fetcher = HttpSourceFetcher::with_client(client);
            let report = run_cycle(&fetcher, &registry, &settings).await;
            print_tick(&report, cli.output)?;
        }
        Commands::Serve { print, .. } => {
            let settings = store.load();
            let (watch_sink, latest) = WatchSink::channel();
            let mut sink = FanoutSink::new().with(Arc::new(watch_sink));
            if *print {
                sink = sink.with(Arc::new(PrintSink::new(cli.output)));
            }
            if let Some(alerter) = build_alerter(&config, &client) {
                sink = sink.with(alerter);
            }
            let monitor = Arc::new(
                build_monitor(store, &registry, &client, settings, Arc::new(sink))
                    .with_base_url_override(cli.base_url.clone()),
            );

            let (version_tx, version_rx) = watch::channel(None);
            start_version_check(&config, &client, move |advisory| {
                version_tx.send_replace(Some(advisory));
            });
            monitor.start();

            let bind = format!("{}:{}", config.server.host, config.server.port);
            let addr: SocketAddr = bind
                .parse()
                .map_err(|e| anyhow!("invalid bind address {bind}: {e}"))?;
            let current = running_version(config.resolved_descriptor_path().as_deref());
            run_server(ApiState::new(monitor, latest, version_rx, current), addr).await?;
        }
        Commands::Settings {
            url,
            poll_interval_ms,
            tolerance,
            sources,
            variables,
            move_up,
            move_down,
            force,
        } => {
            let mut settings = store.load();
            let draft = SettingsDraft {
                base_url: url.clone(),
                poll_interval_ms: *poll_interval_ms,
                tolerance_seconds: *tolerance,
                source_labels: (!sources.is_empty()).then(|| sources.clone()),
                selected_variable_ids: (!variables.is_empty()).then(|| variables.clone()),
                variable_display_order: None,
            };
            let mut changed = false;
            if !draft.is_empty() {
                let next = draft.apply(&settings, &registry)?;
                if settings.introduces_unrecommended_interval(&next) && !*force {
                    bail!(
                        "poll interval {} ms is not the recommended {RECOMMENDED_POLL_INTERVAL_MS} ms; pass --force to use it anyway",
                        next.poll_interval_ms
                    );
                }
                settings = next;
                changed = true;
            }
            for (id, direction) in [(move_up, MoveDirection::Up), (move_down, MoveDirection::Down)] {
                let Some(id) = id else {
                    continue;
                };
                if !registry.contains(id) {
                    bail!("unknown variable id: {id}");
                }
                changed |= settings.move_variable(id, direction);
            }
            if changed {
                settings = store.save(settings)?;
                info!("settings saved to {}", store.path().display());
            }
            print_settings(&settings, cli.output)?;
        }
        Commands::Variables => {
            let settings = store.load();
            print_variables(&registry, &settings, cli.output)?;
        }
        Commands::Version => {
            let checker = version_checker(&config, &client);
            let advisory = checker.check().await;
            print_version(&advisory, cli.output)?;
        }
        Commands::Config { .. } => {}
    }

    Ok(())
}

fn handle_config_command(init: bool, show: bool, config: &Config, config_path: &Path) -> Result<()> {
    if init {
        Config::write_template(config_path)?;
        println!("Wrote config template to {}", config_path.display());
    }
    if show || !init {
        println!("{}", render_json(config)?);
    }
    Ok(())
}

fn build_monitor(
    store: SettingsStore,
    registry: &Arc<VariableRegistry>,
    client: &Client,
    settings: Settings,
    sink: Arc<dyn StatusSink>,
) -> Monitor {
    let fetcher = Arc::new(HttpSourceFetcher::with_client(client.clone()));
    let orchestrator = PollOrchestrator::new(fetcher, Arc::clone(registry), sink);
    Monitor::new(store, orchestrator, settings)
}

fn build_alerter(config: &Config, client: &Client) -> Option<Arc<dyn StatusSink>> {
    let mut sinks: Vec<Arc<dyn AlertSink>> = Vec::new();
    if config.alerts.enable_log {
        sinks.push(Arc::new(LogSink));
    }
    let webhook = config.alerts.webhook.trim();
    if !webhook.is_empty() {
        sinks.push(Arc::new(WebhookSink::new(client.clone(), webhook)));
    }
    if sinks.is_empty() {
        return None;
    }
    Some(Arc::new(TransitionAlerter::new(config.alerts.rules, sinks)))
}

fn version_checker(config: &Config, client: &Client) -> VersionChecker {
    VersionChecker::new(
        client.clone(),
        config.version.app_name.clone(),
        config.version.ledger_url.clone(),
        running_version(config.resolved_descriptor_path().as_deref()),
    )
}

fn start_version_check<F>(config: &Config, client: &Client, on_result: F)
where
    F: FnOnce(VersionAdvisory) + Send + 'static,
{
    if !config.version.enabled || config.version.ledger_url.trim().is_empty() {
        debug!("version check disabled");
        return;
    }
    spawn_version_check(version_checker(config, client), on_result);
}

fn print_tick(report: &TickReport, format: OutputFormat) -> Result<()> {
    match format {
        OutputFormat::Table => println!("{}", render_tick_table(report)),
        OutputFormat::Json => println!("{}", render_json(report)?),
        OutputFormat::Csv => print!("{}", tick_to_csv(report, true)?),
    }
    Ok(())
}

fn print_settings(settings: &Settings, format: OutputFormat) -> Result<()> {
    match format {
        OutputFormat::Table => println!("{}", render_settings_table(settings)),
        OutputFormat::Json => println!("{}", render_json(settings)?),
        OutputFormat::Csv => {
            warn!("CSV output for settings not implemented, using JSON");
            println!("{}", render_json(settings)?);
        }
    }
    Ok(())
}

fn print_variables(
    registry: &VariableRegistry,
    settings: &Settings,
    format: OutputFormat,
) -> Result<()> {
    match format {
        OutputFormat::Table => println!("{}", render_variables_table(registry, settings)),
        OutputFormat::Json => {
            let catalog = registry
                .variables()
                .iter()
                .map(|variable| variable.as_ref())
                .collect::<Vec<_>>();
            println!("{}", render_json(&catalog)?);
        }
        OutputFormat::Csv => print!("{}", variables_to_csv(registry, settings)?),
    }
    Ok(())
}

fn print_version(advisory: &VersionAdvisory, format: OutputFormat) -> Result<()> {
    match format {
        OutputFormat::Table => println!("{}", render_version_table(advisory)),
        OutputFormat::Json => println!("{}", render_json(advisory)?),
        OutputFormat::Csv => {
            warn!("CSV output for version not implemented, using JSON");
            println!("{}", render_json(advisory)?);
        }
    }
    Ok(())
}
