// ===============================
// src/risk.rs
// ===============================
use chrono::NaiveDateTime;

use crate::config::BotConfig;
use crate::domain::{Event, Exit, ExitReason, PositionMetadata, PositionSide, Side, Signal};
use crate::sink::SharedSink;
use crate::venue::VenueView;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RiskState {
    Flat,
    InPosition(PositionSide),
}

/// Stop and take prices for a position entered at `entry`.
pub fn levels_for(side: PositionSide, entry: f64, sl_pct: f64, tp_pct: f64) -> (f64, f64) {
    match side {
        PositionSide::Long => (entry * (1.0 - sl_pct), entry * (1.0 + tp_pct)),
        PositionSide::Short => (entry * (1.0 + sl_pct), entry * (1.0 - tp_pct)),
    }
}

/// Entry gate and SL/TP exit overlay for a single symbol.
///
/// Reactive: it never changes venue state and only reads it through
/// [`VenueView`]. Levels are fixed at the entry fill and held until the venue
/// shows the symbol flat again.
pub struct RiskManager {
    symbol: String,
    sl_pct: f64,
    tp_pct: f64,
    allow_short: bool,
    active: Option<PositionMetadata>,
    sink: SharedSink,
}

impl RiskState {
    pub fn as_str(&self) -> &'static str {
        match self {
            RiskState::Flat => "FLAT",
            RiskState::InPosition(PositionSide::Long) => "LONG",
            RiskState::InPosition(PositionSide::Short) => "SHORT",
        }
    }
}

impl RiskManager {
    pub fn new(cfg: &BotConfig, sink: SharedSink) -> Self {
        Self {
            symbol: cfg.symbol.clone(),
            sl_pct: cfg.sl_pct,
            tp_pct: cfg.tp_pct,
            allow_short: cfg.allow_short,
            active: None,
            sink,
        }
    }

    #[cfg(test)]
    pub fn active_position(&self) -> Option<&PositionMetadata> { self.active.as_ref() }

    pub fn state(&self) -> RiskState {
        self.active.map_or(RiskState::Flat, |m| RiskState::InPosition(m.side))
    }

    /// Drop cached levels, e.g. after a restart. The next `check_exit`
    /// rebuilds them from the venue.
    #[cfg(test)]
    pub fn forget(&mut self) { self.active = None; }

    fn metadata(&self, side: PositionSide, entry: f64, ts: NaiveDateTime) -> PositionMetadata {
        let (stop_price, take_price) = levels_for(side, entry, self.sl_pct, self.tp_pct);
        PositionMetadata { entry_price: entry, ts, side, stop_price, take_price }
    }

    /// One position at a time; shorts only when enabled.
    pub fn check_entry(&self, venue: &impl VenueView, signal: Signal, _px: f64, _ts: NaiveDateTime) -> bool {
        if venue.position(&self.symbol) != 0 {
            return false;
        }
        match signal {
            Signal::Buy => true,
            Signal::Sell => self.allow_short,
            Signal::Hold => false,
        }
    }

    /// Closing side when price crosses the stop or take level. The stop is
    /// checked first, so it wins when both are crossed on the same tick.
    pub fn check_exit(&mut self, venue: &impl VenueView, px: f64, ts: NaiveDateTime) -> Option<Exit> {
        let pos = venue.position(&self.symbol);
        let Some(side) = PositionSide::from_qty(pos) else {
            self.active = None;
            return None;
        };

        let levels = match self.active {
            Some(m) => m,
            None => {
                // levels lost (restart): rebuild from the venue avg entry, blended if there were adds
                let m = self.metadata(side, venue.average_entry(&self.symbol), ts);
                self.sink.emit(&Event::RiskLevelsRecovered(m));
                self.active = Some(m);
                m
            }
        };

        let reason = match levels.side {
            PositionSide::Long if px <= levels.stop_price => ExitReason::StopLoss,
            PositionSide::Long if px >= levels.take_price => ExitReason::TakeProfit,
            PositionSide::Short if px >= levels.stop_price => ExitReason::StopLoss,
            PositionSide::Short if px <= levels.take_price => ExitReason::TakeProfit,
            _ => return None,
        };
        self.sink.emit(&Event::ExitTriggered { px, reason, levels });
        Some(Exit { side: levels.side.closing_side(), reason })
    }

    /// Post-fill hook: record levels on the entry fill, clear them once flat.
    pub fn update_position_state(&mut self, venue: &impl VenueView, _side: Side, px: f64, ts: NaiveDateTime) {
        let pos = venue.position(&self.symbol);
        match (PositionSide::from_qty(pos), self.active) {
            (None, _) => self.active = None,
            (Some(side), None) => {
                let m = self.metadata(side, px, ts);
                self.sink.emit(&Event::RiskLevelsSet(m));
                self.active = Some(m);
            }
            // levels stay fixed until flat, adds and flips included
            (Some(_), Some(_)) => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use proptest::prelude::*;

    use super::*;
    use crate::sink::testing::CaptureSink;
    use crate::sink::NullSink;
    use crate::venue::testing::{order, ts};
    use crate::venue::PaperVenue;

    fn cfg(allow_short: bool) -> BotConfig {
        BotConfig { sl_pct: 0.01, tp_pct: 0.02, allow_short, ..BotConfig::default() }
    }

    fn setup(allow_short: bool) -> (PaperVenue, RiskManager) {
        (
            PaperVenue::new(100_000.0, !allow_short, Arc::new(NullSink)),
            RiskManager::new(&cfg(allow_short), Arc::new(NullSink)),
        )
    }

    fn enter(v: &mut PaperVenue, r: &mut RiskManager, side: Side, px: f64) {
        v.submit_fill(&order(side, 1, px)).unwrap();
        r.update_position_state(v, side, px, ts(0));
    }

    #[test]
    fn entry_gate_respects_short_flag() {
        let (v, r) = setup(false);
        assert!(r.check_entry(&v, Signal::Buy, 100.0, ts(0)));
        assert!(!r.check_entry(&v, Signal::Sell, 100.0, ts(0)));
        assert!(!r.check_entry(&v, Signal::Hold, 100.0, ts(0)));

        let (v, r) = setup(true);
        assert!(r.check_entry(&v, Signal::Sell, 100.0, ts(0)));
    }

    #[test]
    fn no_entry_while_in_position() {
        let (mut v, mut r) = setup(true);
        enter(&mut v, &mut r, Side::Buy, 100.0);
        assert!(!r.check_entry(&v, Signal::Buy, 100.0, ts(1)));
        assert!(!r.check_entry(&v, Signal::Sell, 100.0, ts(1)));
    }

    #[test]
    fn long_levels_and_triggers() {
        let (mut v, mut r) = setup(false);
        enter(&mut v, &mut r, Side::Buy, 100.0);
        let m = *r.active_position().unwrap();
        assert!((m.stop_price - 99.0).abs() < 1e-9);
        assert!((m.take_price - 102.0).abs() < 1e-9);
        assert_eq!(r.state(), RiskState::InPosition(PositionSide::Long));

        assert_eq!(r.check_exit(&v, 100.5, ts(1)), None);
        assert_eq!(
            r.check_exit(&v, 98.5, ts(2)),
            Some(Exit { side: Side::Sell, reason: ExitReason::StopLoss })
        );
        assert_eq!(
            r.check_exit(&v, 105.0, ts(3)),
            Some(Exit { side: Side::Sell, reason: ExitReason::TakeProfit })
        );
    }

    #[test]
    fn short_levels_and_triggers() {
        let (mut v, mut r) = setup(true);
        enter(&mut v, &mut r, Side::Sell, 200.0);
        let m = *r.active_position().unwrap();
        assert!((m.stop_price - 202.0).abs() < 1e-9);
        assert!((m.take_price - 196.0).abs() < 1e-9);

        assert_eq!(r.check_exit(&v, 199.0, ts(1)), None);
        assert_eq!(
            r.check_exit(&v, 202.5, ts(2)),
            Some(Exit { side: Side::Buy, reason: ExitReason::StopLoss })
        );
        assert_eq!(
            r.check_exit(&v, 195.0, ts(3)),
            Some(Exit { side: Side::Buy, reason: ExitReason::TakeProfit })
        );
    }

    #[test]
    fn stop_wins_when_both_levels_cross() {
        // sl 0 -> stop == take == entry, both conditions true at entry price
        let c = BotConfig { sl_pct: 0.0, tp_pct: 0.0, ..BotConfig::default() };
        let mut v = PaperVenue::new(1_000.0, true, Arc::new(NullSink));
        let mut r = RiskManager::new(&c, Arc::new(NullSink));
        enter(&mut v, &mut r, Side::Buy, 100.0);
        assert_eq!(r.check_exit(&v, 100.0, ts(1)).map(|e| e.reason), Some(ExitReason::StopLoss));
    }

    #[test]
    fn flat_clears_levels() {
        let (mut v, mut r) = setup(false);
        enter(&mut v, &mut r, Side::Buy, 100.0);
        v.submit_fill(&order(Side::Sell, 1, 101.0)).unwrap();
        r.update_position_state(&v, Side::Sell, 101.0, ts(1));
        assert!(r.active_position().is_none());
        assert_eq!(r.state().as_str(), "FLAT");
        assert_eq!(r.check_exit(&v, 50.0, ts(2)), None);
    }

    #[test]
    fn levels_not_moved_by_adds() {
        let (mut v, mut r) = setup(false);
        enter(&mut v, &mut r, Side::Buy, 100.0);
        v.submit_fill(&order(Side::Buy, 1, 120.0)).unwrap();
        r.update_position_state(&v, Side::Buy, 120.0, ts(1));
        assert_eq!(r.active_position().unwrap().entry_price, 100.0);
    }

    #[test]
    fn levels_held_through_flip_until_flat() {
        let (mut v, mut r) = setup(true);
        enter(&mut v, &mut r, Side::Buy, 100.0);
        v.submit_fill(&order(Side::Sell, 2, 110.0)).unwrap();
        r.update_position_state(&v, Side::Sell, 110.0, ts(1));
        let m = *r.active_position().unwrap();
        assert_eq!(m.side, PositionSide::Long);
        assert_eq!(m.entry_price, 100.0);

        v.submit_fill(&order(Side::Buy, 1, 108.0)).unwrap();
        r.update_position_state(&v, Side::Buy, 108.0, ts(2));
        assert_eq!(r.state(), RiskState::Flat);
    }

    #[test]
    fn reconstruction_is_idempotent() {
        let sink = Arc::new(CaptureSink::default());
        let mut v = PaperVenue::new(100_000.0, true, Arc::new(NullSink));
        let mut r = RiskManager::new(&cfg(false), sink.clone());
        enter(&mut v, &mut r, Side::Buy, 4050.0);
        let first = *r.active_position().unwrap();

        r.forget();
        assert_eq!(r.check_exit(&v, 4060.0, ts(5)), None);
        let rebuilt = *r.active_position().unwrap();
        assert_eq!(rebuilt.stop_price, first.stop_price);
        assert_eq!(rebuilt.take_price, first.take_price);
        assert_eq!(rebuilt.side, first.side);
        assert!(sink.events().iter().any(|e| matches!(e, Event::RiskLevelsRecovered(_))));
    }

    #[test]
    fn reconstruction_uses_blended_avg() {
        let (mut v, mut r) = setup(false);
        v.submit_fill(&order(Side::Buy, 1, 100.0)).unwrap();
        v.submit_fill(&order(Side::Buy, 1, 110.0)).unwrap();
        assert_eq!(r.check_exit(&v, 105.0, ts(1)), None);
        let m = r.active_position().unwrap();
        assert!((m.entry_price - 105.0).abs() < 1e-9);
        assert!((m.stop_price - 103.95).abs() < 1e-9);
    }

    proptest! {
        #[test]
        fn entry_never_allowed_with_open_position(
            qty in 1u32..10,
            short in any::<bool>(),
            signal in prop_oneof![Just(Signal::Buy), Just(Signal::Sell), Just(Signal::Hold)],
        ) {
            let (mut v, r) = setup(true);
            let side = if short { Side::Sell } else { Side::Buy };
            v.submit_fill(&order(side, qty, 100.0)).unwrap();
            prop_assert!(!r.check_entry(&v, signal, 100.0, ts(1)));
        }
    }
}
