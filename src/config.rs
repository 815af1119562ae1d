// ===============================
// src/config.rs
// ===============================
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
use std::num::NonZeroU32;
use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueEnum};
use dotenvy::dotenv;
use thiserror::Error;

#[derive(Parser, Debug)]
#[command(name = "sim_bot_rust", version, about = "Single-instrument trading simulator")]
pub struct Cli {
    /// tracing filter level (RUST_LOG wins if set)
    #[arg(long, global = true, env = "LOG_LEVEL", default_value = "info")]
    pub log_level: String,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Run a backtest / paced simulation over the price feed.
    Run(RunArgs),
    /// Write a synthetic `timestamp,price` CSV.
    GenerateData(GenerateArgs),
}

/// backtest = no delay, sim = paced ticks
#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub enum RunMode {
    Backtest,
    Sim,
}

impl RunMode {
    pub fn as_str(&self) -> &'static str {
        match self { RunMode::Backtest => "BACKTEST", RunMode::Sim => "SIMULATION" }
    }
}

#[derive(Args, Debug, Clone)]
pub struct RunArgs {
    #[arg(long, env = "SYMBOL", default_value = "SIM-ES")]
    pub symbol: String,
    #[arg(long, env = "QTY", default_value = "1")]
    pub qty: NonZeroU32,
    #[arg(long, env = "SL_PCT", default_value_t = 0.01)]
    pub sl_pct: f64,
    #[arg(long, env = "TP_PCT", default_value_t = 0.02)]
    pub tp_pct: f64,
    #[arg(long, env = "INITIAL_CASH", default_value_t = 100_000.0)]
    pub initial_cash: f64,
    #[arg(long, env = "ALLOW_SHORT")]
    pub allow_short: bool,
    #[arg(long, env = "FAST_MA", default_value_t = 10)]
    pub fast_ma: usize,
    #[arg(long, env = "SLOW_MA", default_value_t = 20)]
    pub slow_ma: usize,

    /// price CSV; falls back to the built-in feed if missing/unreadable
    #[arg(long, env = "CSV_PATH", default_value = "data/sample_prices.csv")]
    pub csv: PathBuf,
    #[arg(long, env = "RUN_MODE", value_enum, default_value_t = RunMode::Backtest)]
    pub mode: RunMode,
    /// legacy alias for `--mode backtest`
    #[arg(long)]
    pub fast: bool,

    #[arg(long, env = "RECORD_FILE")]
    pub record_file: Option<PathBuf>,
    #[arg(long, env = "METRICS_PORT")]
    pub metrics_port: Option<u16>,
}

impl RunArgs {
    pub fn effective_mode(&self) -> RunMode {
        if self.fast { RunMode::Backtest } else { self.mode }
    }

    pub fn bot_config(&self) -> Result<BotConfig, ConfigError> {
        let cfg = BotConfig {
            symbol: self.symbol.trim().to_string(),
            qty: self.qty,
            sl_pct: self.sl_pct,
            tp_pct: self.tp_pct,
            max_positions: 1,
            allow_short: self.allow_short,
            initial_cash: self.initial_cash,
            fast_ma: self.fast_ma,
            slow_ma: self.slow_ma,
        };
        cfg.validate()?;
        Ok(cfg)
    }
}

#[derive(Args, Debug, Clone)]
pub struct GenerateArgs {
    #[arg(long, default_value = "data/sample_prices.csv")]
    pub out: PathBuf,
    #[arg(long, default_value_t = 1000)]
    pub rows: usize,
    #[arg(long, default_value_t = 42)]
    pub seed: u64,
}

#[derive(Debug, Error, PartialEq)]
pub enum ConfigError {
    #[error("symbol must not be empty")]
    EmptySymbol,
    #[error("{name} must be in (0, 1), got {value}")]
    PctOutOfRange { name: &'static str, value: f64 },
    #[error("initial cash must be a finite value >= 0, got {0}")]
    InitialCash(f64),
    #[error("fast MA ({fast}) must be >= 1 and shorter than slow MA ({slow})")]
    MaWindows { fast: usize, slow: usize },
}

/// Trading parameters, fixed for the lifetime of a run.
#[derive(Clone, Debug, PartialEq)]
pub struct BotConfig {
    pub symbol: String,
    pub qty: NonZeroU32,
    pub sl_pct: f64,
    pub tp_pct: f64,
    /// Always 1: one position at a time.
    pub max_positions: u32,
    pub allow_short: bool,
    pub initial_cash: f64,
    pub fast_ma: usize,
    pub slow_ma: usize,
}

impl Default for BotConfig {
    fn default() -> Self {
        Self {
            symbol: "SIM-ES".to_string(),
            qty: NonZeroU32::MIN,
            sl_pct: 0.01,
            tp_pct: 0.02,
            max_positions: 1,
            allow_short: false,
            initial_cash: 100_000.0,
            fast_ma: 10,
            slow_ma: 20,
        }
    }
}

impl BotConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.symbol.is_empty() {
            return Err(ConfigError::EmptySymbol);
        }
        for (name, value) in [("sl_pct", self.sl_pct), ("tp_pct", self.tp_pct)] {
            if !(value > 0.0 && value < 1.0) {
                return Err(ConfigError::PctOutOfRange { name, value });
            }
        }
        if !(self.initial_cash.is_finite() && self.initial_cash >= 0.0) {
            return Err(ConfigError::InitialCash(self.initial_cash));
        }
        if self.fast_ma == 0 || self.fast_ma >= self.slow_ma {
            return Err(ConfigError::MaWindows { fast: self.fast_ma, slow: self.slow_ma });
        }
        Ok(())
    }
}

pub fn load() -> Cli {
    // Pastikan .env dibaca sebelum clap membaca ENV
    let _ = dotenv();
    Cli::parse()
}
