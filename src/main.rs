use binlog_relay::reader::JsonLineSource;
use binlog_relay::{Config, NormalizedEvent, Relay, Result};
use clap::Parser;
use serde_json::json;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::signal::unix::{signal, SignalKind};
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

#[derive(Parser, Debug)]
#[command(name = "binlog-relay")]
#[command(about = "MySQL binlog CDC relay", long_about = None)]
struct Args {
    #[arg(short, long, value_name = "FILE", default_value = "config.toml")]
    config: PathBuf,

    #[arg(short, long, help = "Enable JSON output for logs")]
    json_logs: bool,

    #[arg(short, long, help = "Verbose logging")]
    verbose: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    init_logging(args.json_logs, args.verbose);

    info!("Starting binlog-relay");
    info!("Loading configuration from {:?}", args.config);

    let config = match Config::from_file(&args.config) {
        Ok(cfg) => cfg,
        Err(e) => {
            error!("Failed to load configuration: {}", e);
            return Err(e.into());
        }
    };

    info!(
        start_at_end = config.source.start_at_end,
        retry_delay_ms = config.source.retry_delay_ms,
        subscriptions = ?config.subscriptions.keys().collect::<Vec<_>>(),
        "Configuration summary"
    );

    let mut relay = Relay::from_config(Arc::new(JsonLineSource::new()), &config);

    for database in config.subscriptions.keys() {
        let events = relay.subscribe(database);
        tokio::spawn(print_events(database.clone(), events));
    }

    relay.start();

    let mut sigterm = signal(SignalKind::terminate())?;
    tokio::select! {
        result = relay.run() => result?,
        _ = tokio::signal::ctrl_c() => {
            info!("Received interrupt, shutting down");
        }
        _ = sigterm.recv() => {
            info!("Received shutdown signal, closing connections");
        }
    }

    relay.stop().await?;
    info!("Shutdown complete");
    Ok(())
}

/// Prints one JSON line per normalized event on the given database.
async fn print_events(
    database: String,
    mut events: tokio::sync::mpsc::UnboundedReceiver<Arc<NormalizedEvent>>,
) {
    while let Some(event) = events.recv().await {
        let table = match event.table() {
            Ok(table) => table.to_string(),
            Err(e) => {
                error!(database = %database, error = %e, "undeliverable event");
                continue;
            }
        };
        let line = json!({
            "kind": event.kind_name(),
            "database": database,
            "table": table,
            "position": event.position().to_string(),
            "rows": event.rows(),
        });
        println!("{}", line);
    }
}

fn init_logging(json: bool, verbose: bool) {
    let env_filter = if verbose {
        EnvFilter::new("binlog_relay=debug,info")
    } else {
        EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new("binlog_relay=info,warn"))
    };

    // normalized events go to stdout; logs stay on stderr
    let fmt_layer = if json {
        tracing_subscriber::fmt::layer()
            .json()
            .flatten_event(true)
            .with_current_span(false)
            .with_span_list(false)
            .with_writer(std::io::stderr)
            .boxed()
    } else {
        tracing_subscriber::fmt::layer()
            .with_target(false)
            .with_thread_ids(false)
            .with_thread_names(false)
            .with_writer(std::io::stderr)
            .boxed()
    };

    tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt_layer)
        .init();
}
