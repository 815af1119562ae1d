// ===============================
// src/feed.rs
// ===============================
//
// Price feed adapters:
// - load_price_feed    : CSV `timestamp,price` (ISO-8601), fallback ke feed bawaan
// - default_feed       : 20 harga tetap, 1 menit per tick
// - generate_synthetic : sinus + noise + drift (seeded), untuk data/sample_prices.csv
//
// Notes:
// - Baris yang rusak di-skip dengan warning, tidak pernah fatal.
// - Harga <= 0 atau non-finite dianggap baris rusak.
//
use std::fs;
use std::path::Path;

use chrono::{Duration, Local, NaiveDate, NaiveDateTime};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::Deserialize;
use thiserror::Error;
use tracing::{error, info, warn};

use crate::domain::PriceTick;

const DEFAULT_PRICES: [f64; 20] = [
    4000.0, 4005.0, 4010.0, 4008.0, 4012.0, 4015.0, 4020.0, 4018.0, 4025.0, 4030.0, 4028.0,
    4022.0, 4015.0, 4010.0, 4005.0, 4000.0, 3995.0, 3990.0, 3985.0, 3980.0,
];

const TS_FORMATS: [&str; 2] = ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"];

#[derive(Debug, Error)]
pub enum FeedError {
    #[error("csv: {0}")]
    Csv(#[from] csv::Error),
    #[error("io: {0}")]
    Io(#[from] std::io::Error),
    #[error("bad row: {0}")]
    BadRow(String),
}

#[derive(Debug, Deserialize)]
struct RawRow {
    timestamp: String,
    price: String,
}

pub fn parse_timestamp(s: &str) -> Option<NaiveDateTime> {
    let s = s.trim();
    TS_FORMATS
        .iter()
        .find_map(|f| NaiveDateTime::parse_from_str(s, f).ok())
        .or_else(|| NaiveDate::parse_from_str(s, "%Y-%m-%d").ok()?.and_hms_opt(0, 0, 0))
}

fn parse_row(row: RawRow) -> Result<PriceTick, FeedError> {
    let ts = parse_timestamp(&row.timestamp)
        .ok_or_else(|| FeedError::BadRow(format!("timestamp {:?}", row.timestamp)))?;
    let px: f64 = row
        .price
        .trim()
        .parse()
        .map_err(|_| FeedError::BadRow(format!("price {:?}", row.price)))?;
    if !(px.is_finite() && px > 0.0) {
        return Err(FeedError::BadRow(format!("price {px} not positive")));
    }
    Ok(PriceTick { ts, px })
}

/// Read every valid row of a `timestamp,price` CSV. Only a failure to open the
/// file is an error; bad rows are logged and skipped.
pub fn read_csv(path: &Path) -> Result<Vec<PriceTick>, FeedError> {
    let mut rdr = csv::ReaderBuilder::new().trim(csv::Trim::All).from_path(path)?;
    let mut out = Vec::new();
    for (i, rec) in rdr.deserialize::<RawRow>().enumerate() {
        // +2: header line + 1-based
        let line = i + 2;
        match rec.map_err(FeedError::from).and_then(parse_row) {
            Ok(tick) => out.push(tick),
            Err(e) => warn!(line, error = %e, "skipping invalid row"),
        }
    }
    Ok(out)
}

pub fn default_feed(start: NaiveDateTime) -> Vec<PriceTick> {
    DEFAULT_PRICES
        .iter()
        .enumerate()
        .map(|(i, &px)| PriceTick { ts: start + Duration::minutes(i as i64), px })
        .collect()
}

/// CSV when available, otherwise the built-in feed.
pub fn load_price_feed(path: Option<&Path>) -> Vec<PriceTick> {
    if let Some(path) = path.filter(|p| p.exists()) {
        info!(path = %path.display(), "loading prices from csv");
        match read_csv(path) {
            Ok(ticks) => return ticks,
            Err(e) => error!(error = %e, "failed to read csv, falling back to default feed"),
        }
    }
    info!("using default in-memory price feed");
    default_feed(Local::now().naive_local())
}

/// ES-like minute series: 4050 + 10*sin(i/50) + U(-1,1) + 0.02*i.
pub fn generate_synthetic(rows: usize, seed: u64) -> Vec<PriceTick> {
    let Some(start) = NaiveDate::from_ymd_opt(2023, 10, 27).and_then(|d| d.and_hms_opt(9, 30, 0)) else {
        return Vec::new();
    };
    let mut rng = StdRng::seed_from_u64(seed);
    (0..rows)
        .map(|i| {
            let x = i as f64;
            let cycle = (x / 50.0).sin() * 10.0;
            let noise = (rng.gen::<f64>() - 0.5) * 2.0;
            let px = 4050.0 + cycle + noise + x * 0.02;
            PriceTick { ts: start + Duration::minutes(i as i64), px: (px * 100.0).round() / 100.0 }
        })
        .collect()
}

pub fn write_csv(path: &Path, ticks: &[PriceTick]) -> Result<(), FeedError> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)?;
        }
    }
    let mut wtr = csv::Writer::from_path(path)?;
    wtr.write_record(["timestamp", "price"])?;
    for t in ticks {
        wtr.write_record([t.ts.format("%Y-%m-%dT%H:%M:%S").to_string(), format!("{:.2}", t.px)])?;
    }
    wtr.flush()?;
    Ok(())
}
