use actix_web::{web, App, HttpServer};
use anyhow::Context;
use clap::Parser;
use regex::Regex;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

mod models;
mod services;
mod state;
mod api;
mod cli;
mod metrics;

use api::{flush_stale, list_stale, get_metrics, health};
use cli::CommandArgs;
use metrics::MetricsRegistry;
use services::{open_source, watch_signals, Monitor, MonitorConfig};
use state::AppState;

#[actix_web::main]
async fn main() -> anyhow::Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args = CommandArgs::parse();
    let bind_address = format!("{}:{}", args.address, args.port);

    let name_filter = args
        .name_filter
        .as_deref()
        .map(Regex::new)
        .transpose()
        .context("invalid --name-filter")?;

    let metrics = Arc::new(MetricsRegistry::new().context("failed to register metrics")?);
    let source = open_source(&args).await?;

    let monitor = Monitor::new(
        source,
        metrics.clone(),
        MonitorConfig {
            flush_threshold: args.flush_threshold,
            stop_offset: args.stop_offset,
            name_filter,
        },
    );

    let (command_tx, command_rx) = mpsc::channel(16);
    let cancel = CancellationToken::new();
    let state = AppState::new(metrics, command_tx.clone());

    // 信号由 watch_signals 处理，保证退出前完成 flush
    let server = HttpServer::new(move || {
        App::new()
            .app_data(web::Data::new(state.clone()))
            .route("/api/stale/list", web::get().to(list_stale))
            .route("/api/stale/flush", web::post().to(flush_stale))
            .route("/metrics", web::get().to(get_metrics))
            .route("/health", web::get().to(health))
    })
        .bind(&bind_address)
        .with_context(|| format!("failed to bind {}", bind_address))?
        .disable_signals()
        .run();
    let server_handle = server.handle();

    print_banner(&args);

    let signal_cancel = cancel.clone();
    tokio::spawn(async move {
        if let Err(e) = watch_signals(signal_cancel.clone(), command_tx).await {
            log::error!("❌ Failed to install signal handlers: {:#}", e);
            signal_cancel.cancel();
        }
    });

    let monitor_task = tokio::spawn(monitor.run(cancel.clone(), command_rx));
    tokio::spawn(async move {
        if let Err(e) = monitor_task.await {
            log::error!("❌ Monitor task failed: {}", e);
        }
        cancel.cancel();
        server_handle.stop(true).await;
    });

    server.await?;
    Ok(())
}

fn print_banner(args: &CommandArgs) {
    println!("╔═══════════════════════════════════════════════════════════╗");
    println!("║      Procmon Exporter v{:<35}║", env!("CARGO_PKG_VERSION"));
    println!("║      Process Telemetry to Prometheus                      ║");
    println!("╚═══════════════════════════════════════════════════════════╝");
    println!();
    println!("🚀 Server starting on http://{}:{}", args.address, args.port);
    println!();
    println!("📋 Available endpoints:");
    println!("  GET    /metrics                - Prometheus metrics");
    println!("  GET    /api/stale/list         - List processes pending deletion");
    println!("  POST   /api/stale/flush        - Delete metrics of gone processes");
    println!("  GET    /health                 - Health check");
    println!();
    println!("💡 Source: {:?} ({})", args.source, args.input);
    println!("  • Flush threshold: {}", args.flush_threshold);
    println!("  • SIGUSR1 flushes, SIGINT/SIGTERM flush and exit");
    println!("═══════════════════════════════════════════════════════════");
}
