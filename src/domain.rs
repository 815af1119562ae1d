// ===============================
// src/domain.rs
// ===============================
use std::fmt;
use std::num::NonZeroU32;

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Side { Buy, Sell }
impl Side {
    pub fn sign(&self) -> i64 { match self { Side::Buy => 1, Side::Sell => -1 } }
    pub fn as_str(&self) -> &'static str { match self { Side::Buy => "BUY", Side::Sell => "SELL" } }
}
impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { f.write_str(self.as_str()) }
}

/// Strategy output per tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Signal { Buy, Sell, Hold }
impl Signal {
    /// Order side for an actionable signal, `None` for HOLD.
    pub fn side(&self) -> Option<Side> {
        match self { Signal::Buy => Some(Side::Buy), Signal::Sell => Some(Side::Sell), Signal::Hold => None }
    }
    pub fn as_str(&self) -> &'static str {
        match self { Signal::Buy => "BUY", Signal::Sell => "SELL", Signal::Hold => "HOLD" }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum PositionSide { Long, Short }
impl PositionSide {
    pub fn from_qty(qty: i64) -> Option<Self> {
        match qty.signum() { 1 => Some(PositionSide::Long), -1 => Some(PositionSide::Short), _ => None }
    }
    /// Side of the order that flattens this position.
    pub fn closing_side(&self) -> Side {
        match self { PositionSide::Long => Side::Sell, PositionSide::Short => Side::Buy }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PriceTick { pub ts: NaiveDateTime, pub px: f64 }

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct OrderId(pub u64);
impl fmt::Display for OrderId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { write!(f, "ORD-{:04}", self.0) }
}

/// Market order, assumed filled at `px`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Order { pub ts: NaiveDateTime, pub symbol: String, pub side: Side, pub px: f64, pub qty: NonZeroU32 }

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum TradePnl { NoPnl, Realized(f64) }
impl TradePnl {
    pub fn amount(&self) -> Option<f64> {
        match self { TradePnl::NoPnl => None, TradePnl::Realized(p) => Some(*p) }
    }
}
impl From<Option<f64>> for TradePnl {
    fn from(v: Option<f64>) -> Self { v.map_or(TradePnl::NoPnl, TradePnl::Realized) }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Trade {
    pub ts: NaiveDateTime,
    pub symbol: String,
    pub side: Side,
    pub qty: NonZeroU32,
    pub px: f64,
    pub order_id: OrderId,
    pub realized_pnl: TradePnl,
}

/// Stop/take levels cached by the risk manager for the open position.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PositionMetadata {
    pub entry_price: f64,
    pub ts: NaiveDateTime,
    pub side: PositionSide,
    pub stop_price: f64,
    pub take_price: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ExitReason { StopLoss, TakeProfit }
impl ExitReason {
    pub fn as_str(&self) -> &'static str {
        match self { ExitReason::StopLoss => "stop_loss", ExitReason::TakeProfit => "take_profit" }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Exit { pub side: Side, pub reason: ExitReason }

/// Account snapshot taken at the end of each tick.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MarkSnapshot {
    pub ts: NaiveDateTime,
    pub symbol: String,
    pub px: f64,
    pub position: i64,
    pub cash: f64,
    pub equity: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Event {
    Mark(MarkSnapshot),
    Sig { ts: NaiveDateTime, signal: Signal },
    Fill { trade: Trade, position: i64 },
    Rejected { order: Order, reason: String },
    RiskLevelsSet(PositionMetadata),
    RiskLevelsRecovered(PositionMetadata),
    ExitTriggered { px: f64, reason: ExitReason, levels: PositionMetadata },
}
