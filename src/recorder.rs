// ===============================
// src/recorder.rs
// ===============================
//
// JSONL recorder yang ringan & tahan banting:
// - Tulis setiap Event ke file .jsonl (append).
// - Bufer dengan BufWriter agar hemat syscall.
// - Flush periodik tiap 1s dan/atau tiap 1000 event.
// - Otomatis membuat parent directory jika belum ada.
// - Jika tulis gagal, coba reopen file dan lanjut.
//
// Aktif dengan `--record-file path.jsonl` / `RECORD_FILE=...`.
//
use std::path::{Path, PathBuf};

use tokio::{
    fs::{self, OpenOptions},
    io::{AsyncWriteExt, BufWriter},
    sync::mpsc,
    task::JoinHandle,
    time::{interval, Duration, MissedTickBehavior},
};
use tracing::{error, info, warn};

use crate::domain::Event;
use crate::sink::EventSink;

const FLUSH_EVERY_N_EVENTS: u32 = 1000;

/// Sink side of the recorder; cheap to clone. The task ends once every clone
/// is dropped.
///
/// Unbounded: a backtest never yields to the writer, so a capped queue would
/// lose events under backpressure.
#[derive(Clone)]
pub struct RecorderSink {
    tx: mpsc::UnboundedSender<Event>,
}

impl EventSink for RecorderSink {
    fn emit(&self, ev: &Event) {
        // only fails once the writer task is gone
        if self.tx.send(ev.clone()).is_err() {
            warn!("recorder: writer stopped, event dropped");
        }
    }
}

/// Start the writer task on the current tokio runtime.
pub fn spawn(path: PathBuf) -> (RecorderSink, JoinHandle<()>) {
    let (tx, rx) = mpsc::unbounded_channel::<Event>();
    let handle = tokio::spawn(run(rx, path));
    (RecorderSink { tx }, handle)
}

async fn open_writer(path: &Path) -> std::io::Result<BufWriter<fs::File>> {
    // Pastikan parent directory ada (kalau ada)
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent).await?;
        }
    }
    let file = OpenOptions::new().create(true).append(true).open(path).await?;
    Ok(BufWriter::new(file))
}

async fn write_line(writer: &mut BufWriter<fs::File>, line: &str) -> std::io::Result<()> {
    writer.write_all(line.as_bytes()).await?;
    writer.write_all(b"\n").await
}

pub async fn run(mut rx: mpsc::UnboundedReceiver<Event>, path: PathBuf) {
    let mut writer = match open_writer(&path).await {
        Ok(w) => w,
        Err(e) => {
            error!(error = %e, path = %path.display(), "recorder: open failed, recording disabled");
            // tetap drain channel supaya antrian tidak menumpuk
            while rx.recv().await.is_some() {}
            return;
        }
    };
    info!(path = %path.display(), "recorder: started");

    // Flush periodik (tiap 1 detik) + flush berbasis jumlah event
    let mut tick = interval(Duration::from_secs(1));
    tick.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let mut since_last_flush: u32 = 0;

    loop {
        tokio::select! {
            maybe_ev = rx.recv() => {
                let Some(ev) = maybe_ev else {
                    // Channel closed: flush dan keluar
                    let _ = writer.flush().await;
                    info!("recorder: channel closed, stopped");
                    break;
                };
                let line = match serde_json::to_string(&ev) {
                    Ok(s) => s,
                    Err(e) => {
                        error!(error = %e, "recorder: serialize error, skip event");
                        continue;
                    }
                };
                if let Err(e) = write_line(&mut writer, &line).await {
                    error!(error = %e, "recorder: write failed, attempting reopen");
                    let _ = writer.flush().await;
                    match open_writer(&path).await {
                        Ok(w) => writer = w,
                        Err(e2) => {
                            error!(error = %e2, "recorder: reopen failed, drop event");
                            continue;
                        }
                    }
                    // coba lagi sekali setelah reopen
                    if let Err(e2) = write_line(&mut writer, &line).await {
                        error!(error = %e2, "recorder: write failed again after reopen, drop event");
                        continue;
                    }
                }
                since_last_flush += 1;
                if since_last_flush >= FLUSH_EVERY_N_EVENTS {
                    let _ = writer.flush().await;
                    since_last_flush = 0;
                }
            }
            _ = tick.tick() => {
                let _ = writer.flush().await;
                since_last_flush = 0;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::config::{BotConfig, RunMode};
    use crate::domain::Signal;
    use crate::feed::generate_synthetic;
    use crate::runner::{run_simulation, Simulation};
    use crate::strategy::MaCrossover;
    use crate::venue::testing::ts;

    #[tokio::test]
    async fn writes_one_json_line_per_event() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out").join("events.jsonl");
        let (sink, handle) = spawn(path.clone());

        for i in 0..3 {
            sink.emit(&Event::Sig { ts: ts(i), signal: Signal::Buy });
        }
        drop(sink);
        handle.await.unwrap();

        let body = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<_> = body.lines().collect();
        assert_eq!(lines.len(), 3);
        let ev: Event = serde_json::from_str(lines[2]).unwrap();
        assert_eq!(ev, Event::Sig { ts: ts(2), signal: Signal::Buy });
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn backtest_records_every_mark() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("events.jsonl");
        let (rec, handle) = spawn(path.clone());

        let cfg = BotConfig { fast_ma: 3, slow_ma: 8, ..BotConfig::default() };
        let strat = MaCrossover::new(cfg.fast_ma, cfg.slow_ma);
        let sim = Simulation::new(cfg, strat, Arc::new(rec));
        let feed = generate_synthetic(50_000, 1);
        let r = run_simulation(sim, feed, RunMode::Backtest, std::future::pending()).await;
        // the simulation (and its sink) is gone; wait for the final flush
        handle.await.unwrap();

        let body = std::fs::read_to_string(&path).unwrap();
        let marks = body.lines().filter(|l| l.starts_with("{\"Mark\"")).count();
        let fills = body.lines().filter(|l| l.starts_with("{\"Fill\"")).count();
        assert_eq!(marks, r.equity_curve.len());
        assert_eq!(marks, 50_000);
        assert_eq!(fills, r.trades.len());
    }
}
