use std::env;
use std::io;
use std::process::ExitCode;

use guper_cashback::config::Settings;
use guper_cashback::csv::{read_events, read_transactions, write_transactions};
use guper_cashback::{Engine, GuperClient, TransactionStore};
use tokio_stream::wrappers::ReceiverStream;
use tracing::{error, warn};
use tracing_subscriber::EnvFilter;

const DEFAULT_CONFIG: &str = "guper.toml";

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("warn".parse().unwrap()))
        .with_writer(std::io::stderr)
        .init();

    let mut args = env::args().skip(1);
    let (Some(transactions_path), Some(events_path)) = (args.next(), args.next()) else {
        eprintln!("usage: guper-cashback <transactions.csv> <events.csv>");
        return ExitCode::from(2);
    };

    let config_path = env::var("GUPER_CONFIG").unwrap_or_else(|_| DEFAULT_CONFIG.to_string());
    let settings = match Settings::load(&config_path) {
        Ok(settings) => settings,
        Err(e) => {
            error!(path = %config_path, "{e}");
            return ExitCode::FAILURE;
        }
    };
    let merchants = match settings.directory() {
        Ok(merchants) => merchants,
        Err(e) => {
            error!("{e}");
            return ExitCode::FAILURE;
        }
    };
    if merchants.is_empty() {
        warn!(path = %config_path, "no merchants configured, provider calls will fail");
    }

    let transactions = match read_transactions(&transactions_path) {
        Ok(transactions) => transactions,
        Err(e) => {
            error!("{e}");
            return ExitCode::FAILURE;
        }
    };
    let events = match read_events(events_path) {
        Ok(events) => events,
        Err(e) => {
            error!("{e}");
            return ExitCode::FAILURE;
        }
    };

    let client = match GuperClient::new() {
        Ok(client) => client,
        Err(e) => {
            error!("{e}");
            return ExitCode::FAILURE;
        }
    };

    let engine = Engine::new(client, merchants)
        .with_settings(settings.engine)
        .with_store(TransactionStore::from_transactions(transactions));
    let (event_sender, event_receiver) = tokio::sync::mpsc::channel(16);

    tokio::spawn(async move {
        for result in events {
            match result {
                Ok(event) => {
                    if event_sender.send(event).await.is_err() {
                        break;
                    }
                }
                Err(e) => {
                    warn!("{e}");
                }
            }
        }
    });

    engine.run(ReceiverStream::new(event_receiver)).await;

    let snapshot = engine.store().snapshot().await;
    if let Err(e) = write_transactions(&snapshot, io::stdout().lock()) {
        error!("{e}");
        return ExitCode::FAILURE;
    }
    ExitCode::SUCCESS
}
