/*!
Directory deletion monitor
*/

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use clap::{crate_version, value_parser, Arg, ArgMatches, Command};
use tokio::sync::Mutex;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use deletion_monitor::{
    core::{
        config::{ConfigOverrides, MonitorConfig, SourceKind},
        store::DeletionStore,
    },
    server, DeletionTracker, Result,
};

fn cli() -> Command {
    Command::new("deletion-monitor")
        .version(crate_version!())
        .about("Watches a directory for deletions and forwards alerts to a webhook")
        .arg(
            Arg::new("config")
                .short('c')
                .long("config")
                .env("DELETION_MONITOR_CONFIG")
                .help("Path to a TOML config file")
                .value_name("PATH")
                .value_parser(value_parser!(PathBuf))
                .global(true),
        )
        .arg(
            Arg::new("watch-dir")
                .short('w')
                .long("watch-dir")
                .env("WATCH_DIR")
                .help("Directory to watch for deletions")
                .value_name("PATH")
                .value_parser(value_parser!(PathBuf))
                .global(true),
        )
        .arg(
            Arg::new("webhook-url")
                .short('u')
                .long("webhook-url")
                .env("WEBHOOK_URL")
                .help("Webhook that receives deletion alerts")
                .value_name("URL")
                .global(true),
        )
        .arg(
            Arg::new("db-path")
                .short('d')
                .long("db-path")
                .env("DATABASE_PATH")
                .help("SQLite database for the deletion log (enables persistence)")
                .value_name("PATH")
                .value_parser(value_parser!(PathBuf))
                .global(true),
        )
        .arg(
            Arg::new("interval")
                .short('i')
                .long("interval")
                .env("POLL_INTERVAL_SECS")
                .help("Seconds to wait between polling cycles")
                .value_name("SECS")
                .value_parser(value_parser!(u64))
                .global(true),
        )
        .arg(
            Arg::new("source")
                .short('s')
                .long("source")
                .env("LOG_SOURCE")
                .help("Where delete records come from: audit or notify")
                .value_name("KIND")
                .global(true),
        )
        .arg(
            Arg::new("audit-key")
                .short('k')
                .long("audit-key")
                .env("AUDIT_KEY")
                .help("Audit rule key")
                .value_name("KEY")
                .global(true),
        )
        .arg(
            Arg::new("bind")
                .short('b')
                .long("bind")
                .env("BIND_ADDR")
                .help("Address for the log retrieval service")
                .value_name("ADDR")
                .value_parser(value_parser!(SocketAddr))
                .global(true),
        )
        .subcommand(Command::new("watch").about("Monitor the directory and send alerts (default)"))
        .subcommand(Command::new("serve").about("Serve the deletion log and handle ticks"))
}

fn overrides(matches: &ArgMatches) -> Result<ConfigOverrides> {
    let source_kind = matches
        .get_one::<String>("source")
        .map(|kind| kind.parse::<SourceKind>())
        .transpose()?;

    Ok(ConfigOverrides {
        watch_path: matches.get_one::<PathBuf>("watch-dir").cloned(),
        webhook_url: matches.get_one::<String>("webhook-url").cloned(),
        database_path: matches.get_one::<PathBuf>("db-path").cloned(),
        poll_interval_secs: matches.get_one::<u64>("interval").copied(),
        source_kind,
        audit_key: matches.get_one::<String>("audit-key").cloned(),
        bind_addr: matches.get_one::<SocketAddr>("bind").copied(),
    })
}

async fn load_config(matches: &ArgMatches) -> Result<MonitorConfig> {
    let mut config = match matches.get_one::<PathBuf>("config") {
        Some(path) => {
            info!("Loading config from {:?}", path);
            MonitorConfig::from_file(path).await?
        }
        None => MonitorConfig::default(),
    };
    config.apply(overrides(matches)?);
    config.validate()?;
    Ok(config)
}

fn open_store(config: &MonitorConfig) -> Result<Option<Arc<Mutex<DeletionStore>>>> {
    if !config.persistence.enabled {
        return Ok(None);
    }
    let store = DeletionStore::open(
        &config.persistence.database_path,
        &config.persistence.table_name,
    )?;
    Ok(Some(Arc::new(Mutex::new(store))))
}

async fn run(matches: ArgMatches) -> Result<()> {
    let config = load_config(&matches).await?;
    let store = open_store(&config)?;

    match matches.subcommand() {
        Some(("serve", _)) => {
            tokio::select! {
                result = server::serve(&config, store) => result?,
                _ = tokio::signal::ctrl_c() => info!("🛑 Shutdown"),
            }
        }
        _ => {
            let mut tracker = DeletionTracker::from_config(&config, store)?;
            info!("🔍 Watching {:?} for deletions", config.watch.path);

            tokio::select! {
                result = tracker.start() => result?,
                _ = tokio::signal::ctrl_c() => info!("🛑 Monitoring stopped by user"),
            }
        }
    }

    Ok(())
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    if let Err(e) = run(cli().get_matches()).await {
        error!("❌ {}", e);
        std::process::exit(1);
    }
}
