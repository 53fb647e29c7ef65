mod cmd;
mod context;
mod output;

use clap::{Parser, Subcommand};
use cmd::config::ConfigSubcommand;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(
    name = "account-polld",
    about = "Poll enabled online accounts for notifications through sandboxed plugins",
    version,
    propagate_version = true
)]
struct Cli {
    /// Config file (default: $XDG_CONFIG_HOME/account-polld/config.yaml)
    #[arg(long, global = true, env = "ACCOUNT_POLLD_CONFIG")]
    config: Option<PathBuf>,

    /// Output as JSON
    #[arg(long, global = true, short = 'j')]
    json: bool,

    /// Log verbosity (error, warn, info, debug, trace); overrides AP_LOGGING_LEVEL
    #[arg(long, global = true)]
    log_level: Option<tracing::Level>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the daemon: control API plus optional periodic polling
    Serve {
        /// Port for the control API (default: control.port from config)
        #[arg(long)]
        port: Option<u16>,

        /// Poll every N seconds (default: poll_interval_secs from config)
        #[arg(long)]
        interval: Option<u64>,
    },

    /// Run exactly one poll cycle and print its summary
    Poll,

    /// List the plugins in the manifest
    Plugins,

    /// List enabled account/service pairs and the plugin each resolves to
    Accounts,

    /// Inspect the configuration
    Config {
        #[command(subcommand)]
        subcommand: ConfigSubcommand,
    },
}

/// Map `AP_LOGGING_LEVEL` (0 = warn, 1 = info, 2 = debug, 3+ = trace).
fn level_from_env(value: Option<&str>) -> Option<tracing::Level> {
    let n: u32 = value?.trim().parse().ok()?;
    Some(match n {
        0 => tracing::Level::WARN,
        1 => tracing::Level::INFO,
        2 => tracing::Level::DEBUG,
        _ => tracing::Level::TRACE,
    })
}

/// `RUST_LOG` wins when set; otherwise everything logs at `level`.
fn env_filter(rust_log: Option<&str>, level: tracing::Level) -> EnvFilter {
    let fallback = || EnvFilter::default().add_directive(level.into());
    match rust_log.map(str::trim).filter(|s| !s.is_empty()) {
        Some(spec) => EnvFilter::try_new(spec).unwrap_or_else(|_| fallback()),
        None => fallback(),
    }
}

fn main() {
    let cli = Cli::parse();

    let command_default = match &cli.command {
        Commands::Serve { .. } => tracing::Level::INFO,
        _ => tracing::Level::WARN,
    };
    let level = cli
        .log_level
        .or_else(|| level_from_env(std::env::var("AP_LOGGING_LEVEL").ok().as_deref()))
        .unwrap_or(command_default);

    tracing_subscriber::fmt()
        .with_env_filter(env_filter(std::env::var("RUST_LOG").ok().as_deref(), level))
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let result = context::Context::load(cli.config.as_deref()).and_then(|ctx| match cli.command {
        Commands::Serve { port, interval } => cmd::serve::run(&ctx, port, interval),
        Commands::Poll => cmd::poll::run(&ctx, cli.json),
        Commands::Plugins => cmd::plugins::run(&ctx, cli.json),
        Commands::Accounts => cmd::accounts::run(&ctx, cli.json),
        Commands::Config { subcommand } => cmd::config::run(&ctx, subcommand, cli.json),
    });

    if let Err(e) = result {
        // Print the full error chain (anyhow's alternate Display)
        eprintln!("error: {e:#}");
        std::process::exit(1);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn logging_level_env_mapping() {
        assert_eq!(level_from_env(Some("0")), Some(tracing::Level::WARN));
        assert_eq!(level_from_env(Some("1")), Some(tracing::Level::INFO));
        assert_eq!(level_from_env(Some("2")), Some(tracing::Level::DEBUG));
        assert_eq!(level_from_env(Some("7")), Some(tracing::Level::TRACE));
        assert_eq!(level_from_env(Some("loud")), None);
        assert_eq!(level_from_env(None), None);
    }

    #[test]
    fn rust_log_overrides_level() {
        use tracing_subscriber::filter::LevelFilter;

        let filter = env_filter(Some("debug"), tracing::Level::WARN);
        assert_eq!(filter.max_level_hint(), Some(LevelFilter::DEBUG));

        let filter = env_filter(None, tracing::Level::WARN);
        assert_eq!(filter.max_level_hint(), Some(LevelFilter::WARN));

        let filter = env_filter(Some("  "), tracing::Level::INFO);
        assert_eq!(filter.max_level_hint(), Some(LevelFilter::INFO));
    }
}
