//! Headless logger binary.
//!
//! Wires the core pieces together and mirrors pushed events to stdout.
//! A desktop frontend would hold a [`LoggerService`] the same way this
//! binary does.

use anyhow::Context;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use ardulog_core::prelude::*;
use ardulog_core::scanner::list_ports;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info,ardulog_core=debug")),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!(version = ardulog_core::VERSION, "starting ardulog");

    let config = LoggerConfig::default();
    for port in list_ports() {
        tracing::info!(
            port = %port.name,
            product = port.product.as_deref().unwrap_or("unknown"),
            candidate = port.is_arduino_candidate(),
            "detected serial port"
        );
    }

    let events = EventBus::new();
    let headers = HeaderRegistry::load(config.headers_path.clone());
    let writer = CsvLogWriter::new(config.log_dir.clone(), headers.clone(), events.clone());
    writer.initialize().await;

    let service = LoggerService::new(&config, headers, writer.clone(), events.clone());

    let opener = SerialOpener::new(config.baud_rate);
    let (scanner, handle) = Scanner::new(&config, opener, writer, events.clone());
    let scan_task = tokio::spawn(scanner.run());

    // Mirror pushed events to stdout until ctrl-c
    let mut rx = events.subscribe();
    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => break,
            event = rx.recv() => match event {
                Ok(AppEvent::LogMessage(message)) => println!("{message}"),
                Ok(AppEvent::DataRecord(record)) => {
                    println!("data: {}", record.fields.join(", "));
                }
                Err(tokio::sync::broadcast::error::RecvError::Lagged(missed)) => {
                    tracing::warn!(missed, "event consumer lagged");
                }
                Err(tokio::sync::broadcast::error::RecvError::Closed) => break,
            },
        }
    }

    tracing::info!("shutting down");
    handle.shutdown();
    scan_task.await.context("scanner task panicked")?;

    if let Some(info) = service.current_log_info() {
        tracing::info!(
            file = %info.file_name,
            entries = info.entry_count,
            bytes = info.size_bytes,
            "today's log"
        );
    }

    Ok(())
}
