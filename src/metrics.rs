// ===============================
// src/metrics.rs
// ===============================
use std::io::{Read, Write};
use std::net::{TcpListener, TcpStream};
use std::sync::Arc;
use std::thread;

use prometheus::{Encoder, Gauge, IntCounter, IntCounterVec, IntGauge, Opts, Registry, TextEncoder};
use tracing::{error, info};

use crate::domain::{Event, TradePnl};
use crate::sink::EventSink;

/// Prometheus registry for one run. Owned, not a process global.
pub struct Metrics {
    registry: Registry,
    ticks: IntCounter,
    signals: IntCounterVec,
    fills: IntCounterVec,
    rejects: IntCounter,
    exits: IntCounterVec,
    position: IntGauge,
    realized_pnl: Gauge,
    equity: Gauge,
}

impl Metrics {
    pub fn new() -> prometheus::Result<Self> {
        let m = Self {
            registry: Registry::new(),
            ticks: IntCounter::new("ticks_total", "price ticks processed")?,
            signals: IntCounterVec::new(Opts::new("signals_total", "strategy signals (label: signal)"), &["signal"])?,
            fills: IntCounterVec::new(Opts::new("fills_total", "accepted fills (label: side)"), &["side"])?,
            rejects: IntCounter::new("orders_rejected_total", "orders rejected by venue policy")?,
            exits: IntCounterVec::new(Opts::new("risk_exits_total", "SL/TP exits (label: reason)"), &["reason"])?,
            position: IntGauge::new("position_qty", "net position of the traded symbol")?,
            realized_pnl: Gauge::new("pnl_realized", "realized PnL")?,
            equity: Gauge::new("equity", "cash + position * last price")?,
        };
        m.registry.register(Box::new(m.ticks.clone()))?;
        m.registry.register(Box::new(m.signals.clone()))?;
        m.registry.register(Box::new(m.fills.clone()))?;
        m.registry.register(Box::new(m.rejects.clone()))?;
        m.registry.register(Box::new(m.exits.clone()))?;
        m.registry.register(Box::new(m.position.clone()))?;
        m.registry.register(Box::new(m.realized_pnl.clone()))?;
        m.registry.register(Box::new(m.equity.clone()))?;
        Ok(m)
    }

    // Encode all metrics in Prometheus text format
    pub fn encode(&self) -> Vec<u8> {
        let encoder = TextEncoder::new();
        let families = self.registry.gather();
        let mut buf = Vec::new();
        if encoder.encode(&families, &mut buf).is_err() || buf.is_empty() {
            buf.extend_from_slice(b"# no metrics\n");
        }
        buf
    }

    fn observe(&self, ev: &Event) {
        match ev {
            Event::Mark(m) => {
                self.ticks.inc();
                self.position.set(m.position);
                self.equity.set(m.equity);
            }
            Event::Sig { signal, .. } => self.signals.with_label_values(&[signal.as_str()]).inc(),
            Event::Fill { trade, position } => {
                self.fills.with_label_values(&[trade.side.as_str()]).inc();
                self.position.set(*position);
                if let TradePnl::Realized(p) = trade.realized_pnl {
                    self.realized_pnl.add(p);
                }
            }
            Event::Rejected { .. } => self.rejects.inc(),
            Event::ExitTriggered { reason, .. } => self.exits.with_label_values(&[reason.as_str()]).inc(),
            Event::RiskLevelsSet(_) | Event::RiskLevelsRecovered(_) => {}
        }
    }
}

pub struct MetricsSink(pub Arc<Metrics>);

impl EventSink for MetricsSink {
    fn emit(&self, ev: &Event) { self.0.observe(ev); }
}

// Serve one HTTP request (GET / or /metrics): tiny HTTP 1.1 responder
fn handle_client(mut stream: TcpStream, metrics: &Metrics) {
    // Read a bit to consume headers (no full parse)
    let mut _req_buf = [0u8; 1024];
    let _ = stream.read(&mut _req_buf);

    let body = metrics.encode();
    let header = format!(
        "HTTP/1.1 200 OK\r\nContent-Type: text/plain; version=0.0.4; charset=utf-8\r\nContent-Length: {}\r\nConnection: close\r\n\r\n",
        body.len()
    );

    let _ = stream.write_all(header.as_bytes());
    let _ = stream.write_all(&body);
    let _ = stream.flush();
}

/// Bind now, then serve in a dedicated OS thread (keeps the tokio runtime clean).
pub fn serve_metrics(metrics: Arc<Metrics>, port: u16) -> std::io::Result<()> {
    let addr = format!("0.0.0.0:{port}");
    let listener = TcpListener::bind(&addr)?;
    info!(%addr, "metrics listening on / and /metrics");

    thread::spawn(move || {
        for conn in listener.incoming() {
            match conn {
                Ok(stream) => handle_client(stream, &metrics),
                Err(e) => error!(error = %e, "metrics accept error"),
            }
        }
    });
    Ok(())
}
