use clap::{Args, CommandFactory, Parser, Subcommand};
use clap_complete::{generate, Shell};
use std::io;
use tracing_subscriber::{layer::SubscriberExt, reload, util::SubscriberInitExt, EnvFilter, Registry};

mod cli;
mod console;
mod core;
mod ui;
mod view;
mod views;

use crate::core::settings::Settings;

#[derive(Parser)]
#[command(name = "brooklyn-console")]
#[command(author, version, about = "Terminal console for watching a Brooklyn server")]
struct Cli {
    /// Log at debug level
    #[arg(long, global = true)]
    debug: bool,

    /// Emit logs as JSON lines on stderr
    #[arg(long, global = true)]
    log_json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Watch the server, a task or an entity's sensors until interrupted
    Watch(WatchArgs),

    /// Check once whether the server is up and list its applications
    Status {
        /// Output as JSON
        #[arg(long)]
        json: bool,

        /// Server URL (overrides server.url)
        #[arg(long)]
        server: Option<String>,
    },

    /// Generate shell completions
    Completions {
        /// Shell to generate completions for
        #[arg(value_enum)]
        shell: Shell,
    },
}

#[derive(Args)]
struct WatchArgs {
    /// Server URL (overrides server.url)
    #[arg(long)]
    server: Option<String>,

    /// Base polling period in milliseconds
    #[arg(long)]
    period_ms: Option<u64>,

    /// Task id or link to follow
    #[arg(long)]
    activity: Option<String>,

    /// Entity whose sensors to show, as `application/entity`
    #[arg(long)]
    sensors: Option<String>,

    /// Do not show the server status panel
    #[arg(long)]
    no_status: bool,
}

impl WatchArgs {
    fn apply(self, settings: &mut Settings) {
        if let Some(server) = self.server {
            settings.server.url = server;
        }
        if let Some(period_ms) = self.period_ms {
            settings.polling.period_ms = period_ms;
            settings.polling.backoff_max_period_ms =
                settings.polling.backoff_max_period_ms.max(period_ms);
        }
        if self.activity.is_some() {
            settings.watch.activity = self.activity;
        }
        if self.sensors.is_some() {
            settings.watch.sensors = self.sensors;
        }
        if self.no_status {
            settings.watch.status = false;
        }
    }
}

type FilterHandle = reload::Handle<EnvFilter, Registry>;

fn default_filter(debug: bool) -> EnvFilter {
    let default_level = if debug { "debug" } else { "info" };
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level))
}

/// Installs the subscriber. The returned handle swaps the filter once the
/// config file has been read.
fn init_logging(debug: bool, json: bool) -> FilterHandle {
    let (filter, handle) = reload::Layer::new(default_filter(debug));

    let registry = tracing_subscriber::registry().with(filter);
    if json {
        registry
            .with(tracing_subscriber::fmt::layer().json().with_writer(io::stderr))
            .init();
    } else {
        registry
            .with(tracing_subscriber::fmt::layer().with_writer(io::stderr))
            .init();
    }
    handle
}

fn enable_debug_logging(handle: &FilterHandle) {
    if let Err(e) = handle.modify(|filter| *filter = default_filter(true)) {
        tracing::warn!(error = %e, "Failed to raise log level");
    }
}

fn load_settings() -> anyhow::Result<Settings> {
    let settings = Settings::load()?;
    settings.validate()?;
    Ok(settings)
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Watch(args) => {
            let logging = init_logging(cli.debug, cli.log_json);
            let mut settings = Settings::load()?;
            if settings.debug && !cli.debug {
                enable_debug_logging(&logging);
            }
            args.apply(&mut settings);
            settings.validate()?;
            console::run(settings).await
        }
        Commands::Status { json, server } => {
            let _logging = init_logging(cli.debug, cli.log_json);
            let mut settings = load_settings()?;
            if let Some(server) = server {
                settings.server.url = server;
            }
            cli::status::run(&settings, json).await
        }
        Commands::Completions { shell } => {
            let mut cmd = Cli::command();
            let name = cmd.get_name().to_string();
            generate(shell, &mut cmd, name, &mut io::stdout());
            Ok(())
        }
    }
}
