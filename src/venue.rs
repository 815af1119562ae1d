// ===============================
// src/venue.rs (paper venue: fills, cash, positions, trade log)
// ===============================
use ahash::AHashMap as HashMap;
use thiserror::Error;

use crate::domain::{Event, Order, OrderId, Side, Trade, TradePnl};
use crate::positions::Position;
use crate::sink::SharedSink;

/// Read-only view of venue state. The risk manager and the loop only see this.
pub trait VenueView {
    fn cash(&self) -> f64;
    fn initial_cash(&self) -> f64;
    fn position(&self, symbol: &str) -> i64;
    fn average_entry(&self, symbol: &str) -> f64;
    fn realized_pnl(&self) -> f64;
    fn trades(&self) -> &[Trade];

    /// Mark-to-market account value: cash plus position valued at `mark`.
    fn equity(&self, symbol: &str, mark: f64) -> f64 {
        self.cash() + self.position(symbol) as f64 * mark
    }
}

/// Policy rejection. State is untouched and no order id is consumed.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Rejected {
    #[error("short selling disabled and no long position (pos {position})")]
    NoLongPosition { position: i64 },
    #[error("sell {qty} would flip net short (pos {position})")]
    WouldFlipShort { position: i64, qty: u32 },
}

pub struct PaperVenue {
    cash: f64,
    initial_cash: f64,
    long_only: bool,
    positions: HashMap<String, Position>,
    trades: Vec<Trade>,
    order_seq: u64,
    realized_pnl: f64,
    sink: SharedSink,
}

impl PaperVenue {
    pub fn new(initial_cash: f64, long_only: bool, sink: SharedSink) -> Self {
        Self {
            cash: initial_cash,
            initial_cash,
            long_only,
            positions: HashMap::new(),
            trades: Vec::new(),
            order_seq: 0,
            realized_pnl: 0.0,
            sink,
        }
    }

    fn check_long_only(&self, o: &Order, current: i64) -> Result<(), Rejected> {
        if !self.long_only || o.side == Side::Buy {
            return Ok(());
        }
        if current <= 0 {
            return Err(Rejected::NoLongPosition { position: current });
        }
        if current - i64::from(o.qty.get()) < 0 {
            return Err(Rejected::WouldFlipShort { position: current, qty: o.qty.get() });
        }
        Ok(())
    }

    /// Fill a market order at `o.px`. Every accepted order appends exactly one
    /// trade; a rejected one changes nothing.
    pub fn submit_fill(&mut self, o: &Order) -> Result<OrderId, Rejected> {
        let current = self.position(&o.symbol);
        if let Err(rej) = self.check_long_only(o, current) {
            self.sink.emit(&Event::Rejected { order: o.clone(), reason: rej.to_string() });
            return Err(rej);
        }

        self.order_seq += 1;
        let order_id = OrderId(self.order_seq);

        let qty = o.qty.get();
        let pos = self.positions.entry(o.symbol.clone()).or_default();
        let realized = pos.apply_fill(o.side, qty, o.px);
        let new_qty = pos.qty;

        let notional = f64::from(qty) * o.px;
        match o.side {
            Side::Buy => self.cash -= notional,
            Side::Sell => self.cash += notional,
        }
        if let Some(pnl) = realized {
            self.realized_pnl += pnl;
        }

        let trade = Trade {
            ts: o.ts,
            symbol: o.symbol.clone(),
            side: o.side,
            qty: o.qty,
            px: o.px,
            order_id,
            realized_pnl: TradePnl::from(realized),
        };
        self.sink.emit(&Event::Fill { trade: trade.clone(), position: new_qty });
        self.trades.push(trade);
        Ok(order_id)
    }
}

impl VenueView for PaperVenue {
    fn cash(&self) -> f64 { self.cash }
    fn initial_cash(&self) -> f64 { self.initial_cash }
    fn position(&self, symbol: &str) -> i64 { self.positions.get(symbol).map_or(0, |p| p.qty) }
    fn average_entry(&self, symbol: &str) -> f64 {
        self.positions.get(symbol).map_or(0.0, |p| p.avg_entry_px)
    }
    fn realized_pnl(&self) -> f64 { self.realized_pnl }
    fn trades(&self) -> &[Trade] { &self.trades }
}
