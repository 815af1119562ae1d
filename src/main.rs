// ===============================
// src/main.rs
// ===============================
/*
 # backtest atas CSV (fallback ke feed bawaan kalau file tidak ada)
 cargo run --release -- run --csv data/sample_prices.csv

 # simulasi dengan jeda antar tick + JSONL + metrics
 cargo run --release -- run --mode sim --record-file out/events.jsonl --metrics-port 9898
 curl -s localhost:9898/metrics | egrep '^(fills_total|pnl_realized|equity)'

 # bikin data sintetis
 cargo run --release -- generate-data --rows 2000 --seed 7
*/
/*
=============================================================================
Project : sim_bot_rust — single-instrument trading simulator in Rust
Module  : <module_name>.rs
Version : 0.1.0
License : MIT (see LICENSE)

Summary : Replays a CSV (or built-in) price stream through an MA crossover
          strategy, gates entries/exits with a stop-loss/take-profit risk
          manager, fills orders on a paper venue that tracks cash, position,
          average entry and realized PnL, records JSONL events and prints a
          performance report.
=============================================================================
*/
mod domain;
mod config;
mod logging;
mod metrics;
mod recorder;
mod feed;
mod strategy;
mod risk;
mod positions;
mod venue;
mod sink;
mod runner;
mod report;

use std::sync::Arc;

use anyhow::Context;
use tracing::info;

use crate::config::{Command, GenerateArgs, RunArgs};
use crate::sink::{FanoutSink, SharedSink, TracingSink};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // ---- Load config (.env + CLI/ENV) ----
    let cli = config::load();

    // ---- Logging ----
    logging::init(&cli.log_level);

    match cli.command {
        Command::Run(args) => run(args).await,
        Command::GenerateData(args) => generate(args),
    }
}

async fn run(args: RunArgs) -> anyhow::Result<()> {
    let cfg = args.bot_config().context("invalid trading parameters")?;
    let mode = args.effective_mode();

    // ---- Sinks ----
    let mut sinks: Vec<SharedSink> = vec![Arc::new(TracingSink)];

    if let Some(port) = args.metrics_port {
        let m = Arc::new(metrics::Metrics::new().context("metrics registry")?);
        metrics::serve_metrics(m.clone(), port)
            .with_context(|| format!("binding metrics port {port}"))?;
        sinks.push(Arc::new(metrics::MetricsSink(m)));
    }

    // ---- Recorder (optional) ----
    let recorder = args.record_file.clone().map(recorder::spawn);
    if let Some((rec_sink, _)) = &recorder {
        sinks.push(Arc::new(rec_sink.clone()));
    }
    let sink: SharedSink = Arc::new(FanoutSink::new(sinks));

    // ---- Feed + strategy ----
    let feed = feed::load_price_feed(Some(args.csv.as_path()));
    let strategy = strategy::MaCrossover::new(cfg.fast_ma, cfg.slow_ma);

    let sim = runner::Simulation::new(cfg, strategy, sink);
    let shutdown = runner::until_signal(tokio::signal::ctrl_c());
    let result = runner::run_simulation(sim, feed, mode, shutdown).await;

    // sim (dan semua clone sink) sudah di-drop; tutup recorder dan tunggu flush
    if let Some((rec_sink, handle)) = recorder {
        drop(rec_sink);
        handle.await.context("recorder task")?;
    }

    report::print(&result);
    Ok(())
}

fn generate(args: GenerateArgs) -> anyhow::Result<()> {
    let ticks = feed::generate_synthetic(args.rows, args.seed);
    feed::write_csv(&args.out, &ticks)
        .with_context(|| format!("writing {}", args.out.display()))?;
    info!(rows = ticks.len(), seed = args.seed, path = %args.out.display(), "synthetic prices written");
    Ok(())
}
