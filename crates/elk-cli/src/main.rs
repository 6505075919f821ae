use anyhow::{anyhow, Context, Result};
use clap::{Parser, Subcommand};
use elk_client::LocksClient;
use elk_config::{load_layered_yaml, CoordinatorConfig};
use elk_schemas::RecordType;

const DEFAULT_ADDR: &str = "http://127.0.0.1:8787";

#[derive(Parser)]
#[command(name = "elk")]
#[command(about = "Edit-lock coordinator CLI", long_about = None)]
struct Cli {
    #[command(subcommand)]
    cmd: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Compute layered config hash + print canonical JSON
    ConfigHash {
        /// Paths in merge order (base -> env -> local)
        #[arg(required = true)]
        paths: Vec<String>,
    },

    /// Parse and validate a layered coordinator config; print warnings
    ConfigCheck {
        /// Paths in merge order
        #[arg(required = true)]
        paths: Vec<String>,
    },

    /// Print the current lock snapshot for a topic (estimates | invoices)
    Locks {
        topic: String,

        /// Daemon base URL; falls back to ELK_DAEMON_URL, then localhost
        #[arg(long)]
        addr: Option<String>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let _ = dotenvy::from_filename(".env.local");

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "warn".into()),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    match cli.cmd {
        Commands::ConfigHash { paths } => {
            let path_refs: Vec<&str> = paths.iter().map(|s| s.as_str()).collect();
            let loaded = load_layered_yaml(&path_refs)?;
            println!("config_hash={}", loaded.config_hash);
            println!("{}", loaded.canonical_json);
        }

        Commands::ConfigCheck { paths } => {
            let path_refs: Vec<&str> = paths.iter().map(|s| s.as_str()).collect();
            let loaded = load_layered_yaml(&path_refs)?;
            let cfg = CoordinatorConfig::from_loaded(&loaded)?;
            let warnings = cfg.validate().context("config rejected")?;
            for w in &warnings {
                println!("warning: {w}");
            }
            println!("config_hash={}", loaded.config_hash);
            println!(
                "ok heartbeat_interval_ms={} ttl_ms={} sweep_interval_ms={} bind_addr={}",
                cfg.lease.heartbeat_interval_ms,
                cfg.lease.ttl_ms,
                cfg.lease.sweep_interval_ms,
                cfg.server.bind_addr
            );
        }

        Commands::Locks { topic, addr } => {
            let record_type = RecordType::from_topic(&topic)
                .ok_or_else(|| anyhow!("unknown topic: {topic} (expected estimates | invoices)"))?;
            let base = addr
                .or_else(|| std::env::var("ELK_DAEMON_URL").ok())
                .unwrap_or_else(|| DEFAULT_ADDR.to_string());

            let snapshot = LocksClient::new(base).fetch_locks(record_type).await?;
            if snapshot.is_empty() {
                println!("no locks on {}", record_type.topic());
            }
            for (record_id, holder) in &snapshot {
                println!(
                    "{}#{}\t{}\t{} <{}>",
                    record_type, record_id, holder.username, holder.fullname, holder.email
                );
            }
        }
    }

    Ok(())
}
