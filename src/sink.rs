// ===============================
// src/sink.rs
// ===============================
//
// Observer sinks yang di-inject ke venue, risk manager dan loop:
// - TracingSink : event -> structured tracing log
// - FanoutSink  : teruskan ke beberapa sink sekaligus
// - NullSink    : buang semua event
//
// RecorderSink (JSONL) ada di recorder.rs, MetricsSink di metrics.rs.
//
use std::sync::Arc;

use tracing::{debug, info, trace, warn};

use crate::domain::{Event, ExitReason};

pub trait EventSink: Send + Sync {
    fn emit(&self, ev: &Event);
}

pub type SharedSink = Arc<dyn EventSink>;

#[derive(Debug, Default, Clone, Copy)]
pub struct NullSink;

impl EventSink for NullSink {
    fn emit(&self, _ev: &Event) {}
}

#[derive(Debug, Default, Clone, Copy)]
pub struct TracingSink;

impl EventSink for TracingSink {
    fn emit(&self, ev: &Event) {
        match ev {
            Event::Mark(m) => trace!(
                ts=%m.ts, symbol=%m.symbol, px=m.px, pos=m.position, cash=m.cash, equity=m.equity, "mark"
            ),
            Event::Sig { ts, signal } => debug!(%ts, signal = signal.as_str(), "signal"),
            Event::Fill { trade, position } => match trade.realized_pnl.amount() {
                Some(pnl) => info!(
                    side=%trade.side, qty=trade.qty.get(), symbol=%trade.symbol, px=trade.px,
                    pnl=format_args!("{pnl:.2}"), id=%trade.order_id, pos=position, "FILLED"
                ),
                None => info!(
                    side=%trade.side, qty=trade.qty.get(), symbol=%trade.symbol, px=trade.px,
                    id=%trade.order_id, pos=position, "FILLED"
                ),
            },
            Event::Rejected { order, reason } => {
                warn!(side=%order.side, qty=order.qty.get(), symbol=%order.symbol, %reason, "REJECTED")
            }
            Event::RiskLevelsSet(m) => debug!(
                side=?m.side, entry=m.entry_price, sl=format_args!("{:.2}", m.stop_price),
                tp=format_args!("{:.2}", m.take_price), since=%m.ts, "risk params set"
            ),
            Event::RiskLevelsRecovered(m) => debug!(
                side=?m.side, avg_entry=m.entry_price, sl=format_args!("{:.2}", m.stop_price),
                tp=format_args!("{:.2}", m.take_price), "risk params recovered from venue"
            ),
            Event::ExitTriggered { px, reason, levels } => {
                let msg = match reason {
                    ExitReason::StopLoss => "STOP LOSS HIT",
                    ExitReason::TakeProfit => "TAKE PROFIT HIT",
                };
                debug!(
                    side=?levels.side, entry=levels.entry_price, sl=levels.stop_price,
                    tp=levels.take_price, curr=px, "{msg}"
                )
            }
        }
    }
}

pub struct FanoutSink {
    sinks: Vec<SharedSink>,
}

impl FanoutSink {
    pub fn new(sinks: Vec<SharedSink>) -> Self { Self { sinks } }
}

impl EventSink for FanoutSink {
    fn emit(&self, ev: &Event) {
        for s in &self.sinks {
            s.emit(ev);
        }
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use std::sync::Mutex;

    use super::*;

    /// Collects every event, for assertions in tests.
    #[derive(Default)]
    pub struct CaptureSink {
        events: Mutex<Vec<Event>>,
    }

    impl CaptureSink {
        pub fn events(&self) -> Vec<Event> {
            self.events.lock().map(|v| v.clone()).unwrap_or_default()
        }
    }

    impl EventSink for CaptureSink {
        fn emit(&self, ev: &Event) {
            if let Ok(mut v) = self.events.lock() {
                v.push(ev.clone());
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::testing::CaptureSink;
    use super::*;
    use chrono::NaiveDate;

    use crate::domain::Signal;

    #[test]
    fn fanout_reaches_every_sink() {
        let a = Arc::new(CaptureSink::default());
        let b = Arc::new(CaptureSink::default());
        let fan = FanoutSink::new(vec![a.clone(), b.clone(), Arc::new(NullSink), Arc::new(TracingSink)]);

        let ts = NaiveDate::from_ymd_opt(2024, 1, 2).unwrap().and_hms_opt(9, 30, 0).unwrap();
        fan.emit(&Event::Sig { ts, signal: Signal::Buy });

        assert_eq!(a.events().len(), 1);
        assert_eq!(b.events(), a.events());
    }
}
