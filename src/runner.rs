// ===============================
// src/runner.rs (simulation loop)
// ===============================
//
// Per tick, berurutan dan selesai sebelum tick berikutnya:
//   signal -> exit check (SL/TP) -> entry check -> fill -> equity snapshot
// Mode sim hanya menambah jeda antar tick; urutan & hasil fill tidak berubah.
//
use std::fmt::Display;
use std::future::Future;

use tokio::time::{sleep, Duration};
use tracing::{debug, info, warn};

use crate::config::{BotConfig, RunMode};
use crate::domain::{Event, MarkSnapshot, Order, OrderId, PriceTick, Side, Signal, Trade};
use crate::risk::RiskManager;
use crate::sink::SharedSink;
use crate::strategy::SignalGenerator;
use crate::venue::{PaperVenue, VenueView};

pub const SIM_TICK_DELAY: Duration = Duration::from_millis(50);

#[derive(Debug, Clone, PartialEq)]
pub struct SimulationResult {
    pub symbol: String,
    pub trades: Vec<Trade>,
    pub equity_curve: Vec<f64>,
    pub initial_cash: f64,
    pub final_cash: f64,
    pub realized_pnl: f64,
    pub final_position: i64,
}

pub struct Simulation<S> {
    cfg: BotConfig,
    venue: PaperVenue,
    risk: RiskManager,
    strategy: S,
    sink: SharedSink,
    equity_curve: Vec<f64>,
}

impl<S: SignalGenerator> Simulation<S> {
    pub fn new(cfg: BotConfig, strategy: S, sink: SharedSink) -> Self {
        let venue = PaperVenue::new(cfg.initial_cash, !cfg.allow_short, sink.clone());
        let risk = RiskManager::new(&cfg, sink.clone());
        Self { cfg, venue, risk, strategy, sink, equity_curve: Vec::new() }
    }

    #[cfg(test)]
    pub fn venue(&self) -> &PaperVenue { &self.venue }
    #[cfg(test)]
    pub fn risk(&self) -> &RiskManager { &self.risk }
    #[cfg(test)]
    pub fn risk_mut(&mut self) -> &mut RiskManager { &mut self.risk }
    #[cfg(test)]
    pub fn equity_curve(&self) -> &[f64] { &self.equity_curve }

    fn submit(&mut self, side: Side, tick: &PriceTick) -> Option<OrderId> {
        let order = Order { ts: tick.ts, symbol: self.cfg.symbol.clone(), side, px: tick.px, qty: self.cfg.qty };
        // rejection is already reported by the venue; the run goes on
        let id = self.venue.submit_fill(&order).ok();
        self.risk.update_position_state(&self.venue, side, tick.px, tick.ts);
        id
    }

    /// Process one tick to completion and return the equity after it.
    pub fn on_tick(&mut self, tick: &PriceTick) -> f64 {
        let signal = self.strategy.on_price(tick.ts, tick.px);
        if signal != Signal::Hold {
            self.sink.emit(&Event::Sig { ts: tick.ts, signal });
        }

        if let Some(exit) = self.risk.check_exit(&self.venue, tick.px, tick.ts) {
            debug!(reason = exit.reason.as_str(), side = %exit.side, "closing on risk exit");
            self.submit(exit.side, tick);
        } else if let Some(side) = signal.side() {
            if self.risk.check_entry(&self.venue, signal, tick.px, tick.ts) {
                self.submit(side, tick);
            }
            // sinyal berlawanan dengan posisi = exit karena trend reversal
            let pos = self.venue.position(&self.cfg.symbol);
            match side {
                Side::Sell if pos > 0 => {
                    self.submit(Side::Sell, tick);
                }
                Side::Buy if pos < 0 => {
                    self.submit(Side::Buy, tick);
                }
                _ => {}
            }
        }

        let position = self.venue.position(&self.cfg.symbol);
        let equity = self.venue.equity(&self.cfg.symbol, tick.px);
        self.equity_curve.push(equity);
        self.sink.emit(&Event::Mark(MarkSnapshot {
            ts: tick.ts,
            symbol: self.cfg.symbol.clone(),
            px: tick.px,
            position,
            cash: self.venue.cash(),
            equity,
        }));
        equity
    }

    pub fn finish(self) -> SimulationResult {
        SimulationResult {
            final_position: self.venue.position(&self.cfg.symbol),
            symbol: self.cfg.symbol,
            trades: self.venue.trades().to_vec(),
            initial_cash: self.venue.initial_cash(),
            final_cash: self.venue.cash(),
            realized_pnl: self.venue.realized_pnl(),
            equity_curve: self.equity_curve,
        }
    }
}

/// Resolve when `signal` fires. If the listener itself fails (e.g. no signal
/// handler could be installed) log it and never resolve, so a paced run is
/// not cut short by the error.
pub async fn until_signal<E, F>(signal: F)
where
    E: Display,
    F: Future<Output = Result<(), E>>,
{
    if let Err(e) = signal.await {
        warn!(error = %e, "shutdown listener unavailable, ctrl-c disabled");
        std::future::pending::<()>().await;
    }
}

/// Drive the simulation over the whole feed. In `Sim` mode ticks are paced by
/// [`SIM_TICK_DELAY`] and `shutdown` stops the run between ticks; the result
/// covers the ticks processed so far.
pub async fn run_simulation<S, F>(
    mut sim: Simulation<S>,
    feed: Vec<PriceTick>,
    mode: RunMode,
    shutdown: F,
) -> SimulationResult
where
    S: SignalGenerator,
    F: Future<Output = ()>,
{
    info!(
        mode = mode.as_str(),
        symbol = %sim.cfg.symbol,
        qty = sim.cfg.qty.get(),
        allow_short = sim.cfg.allow_short,
        max_positions = sim.cfg.max_positions,
        ticks = feed.len(),
        "starting"
    );
    tokio::pin!(shutdown);

    for tick in &feed {
        sim.on_tick(tick);
        if mode == RunMode::Sim {
            tokio::select! {
                _ = sleep(SIM_TICK_DELAY) => {}
                _ = &mut shutdown => {
                    warn!(processed = sim.equity_curve.len(), "interrupted, stopping early");
                    break;
                }
            }
        }
    }
    info!(
        ticks = sim.equity_curve.len(),
        trades = sim.venue.trades().len(),
        risk = sim.risk.state().as_str(),
        "finished"
    );
    sim.finish()
}

#[cfg(test)]
mod tests {
    use std::collections::VecDeque;
    use std::sync::Arc;

    use chrono::NaiveDateTime;

    use super::*;
    use crate::domain::{ExitReason, TradePnl};
    use crate::sink::testing::CaptureSink;
    use crate::sink::NullSink;
    use crate::strategy::MaCrossover;
    use crate::venue::testing::ts;

    /// Replays a fixed list of signals.
    struct Scripted(VecDeque<Signal>);

    impl SignalGenerator for Scripted {
        fn on_price(&mut self, _ts: NaiveDateTime, _px: f64) -> Signal {
            self.0.pop_front().unwrap_or(Signal::Hold)
        }
    }

    fn ticks(prices: &[f64]) -> Vec<PriceTick> {
        prices.iter().enumerate().map(|(i, &px)| PriceTick { ts: ts(i as i64), px }).collect()
    }

    fn sim(cfg: BotConfig, signals: &[Signal]) -> Simulation<Scripted> {
        Simulation::new(cfg, Scripted(signals.iter().copied().collect()), Arc::new(NullSink))
    }

    #[test]
    fn long_round_trip_via_strategy_exit() {
        let mut s = sim(BotConfig::default(), &[Signal::Buy, Signal::Sell]);
        let feed = ticks(&[4050.0, 4060.0]);
        s.on_tick(&feed[0]);
        assert_eq!(s.venue().position("SIM-ES"), 1);
        assert_eq!(s.venue().cash(), 95_950.0);

        s.on_tick(&feed[1]);
        let r = s.finish();
        assert_eq!(r.final_position, 0);
        assert_eq!(r.realized_pnl, 10.0);
        assert_eq!(r.final_cash, 100_010.0);
        assert_eq!(r.equity_curve, vec![100_000.0, 100_010.0]);
    }

    #[test]
    fn take_profit_exit_fires_before_signals() {
        // tp 2% of 4050 = 4131
        let mut s = sim(BotConfig::default(), &[Signal::Buy, Signal::Hold, Signal::Buy]);
        for t in &ticks(&[4050.0, 4100.0, 4140.0]) {
            s.on_tick(t);
        }
        let r = s.finish();
        assert_eq!(r.trades.len(), 2);
        assert_eq!(r.trades[1].side, Side::Sell);
        assert_eq!(r.trades[1].realized_pnl, TradePnl::Realized(90.0));
        assert_eq!(r.final_position, 0);
    }

    #[test]
    fn stop_loss_exit_on_short() {
        let cfg = BotConfig { allow_short: true, ..BotConfig::default() };
        let sink = Arc::new(CaptureSink::default());
        let mut s = Simulation::new(cfg, Scripted(VecDeque::from([Signal::Sell])), sink.clone());
        for t in &ticks(&[100.0, 100.5, 101.5]) {
            s.on_tick(t);
        }
        assert_eq!(s.venue().position("SIM-ES"), 0);
        assert!(sink.events().iter().any(|e| matches!(
            e,
            Event::ExitTriggered { reason: ExitReason::StopLoss, .. }
        )));
        let r = s.finish();
        assert!((r.realized_pnl - -1.5).abs() < 1e-9);
    }

    #[test]
    fn sell_signal_flat_long_only_does_nothing() {
        let mut s = sim(BotConfig::default(), &[Signal::Sell, Signal::Sell]);
        for t in &ticks(&[10.0, 11.0]) {
            s.on_tick(t);
        }
        let r = s.finish();
        assert!(r.trades.is_empty());
        assert_eq!(r.equity_curve, vec![100_000.0, 100_000.0]);
    }

    #[test]
    fn lost_levels_are_rebuilt_mid_run() {
        let mut s = sim(BotConfig::default(), &[Signal::Buy]);
        let feed = ticks(&[100.0, 100.5, 98.9]);
        s.on_tick(&feed[0]);
        s.on_tick(&feed[1]);
        s.risk_mut().forget();
        s.on_tick(&feed[2]);
        assert_eq!(s.venue().position("SIM-ES"), 0);
        assert!(s.risk().active_position().is_none());
    }

    #[test]
    fn equity_curve_matches_feed_length() {
        let cfg = BotConfig { fast_ma: 2, slow_ma: 4, ..BotConfig::default() };
        let strat = MaCrossover::new(cfg.fast_ma, cfg.slow_ma);
        let mut s = Simulation::new(cfg, strat, Arc::new(NullSink));
        let feed = crate::feed::generate_synthetic(300, 1);
        for t in &feed {
            s.on_tick(t);
        }
        assert_eq!(s.equity_curve().len(), feed.len());
        let r = s.finish();
        assert!(r.final_position >= 0);
        let buys = r.trades.iter().filter(|t| t.side == Side::Buy).count() as i64;
        let sells = r.trades.iter().filter(|t| t.side == Side::Sell).count() as i64;
        assert_eq!(buys - sells, r.final_position);
    }

    #[tokio::test(start_paused = true)]
    async fn sim_mode_paces_and_can_be_interrupted() {
        let s = sim(BotConfig::default(), &[]);
        let feed = ticks(&[1.0, 2.0, 3.0, 4.0]);
        let r = run_simulation(s, feed, RunMode::Sim, sleep(Duration::from_millis(120))).await;
        // ticks at t=0, 50, 100; shutdown fires at 120 during the 3rd delay
        assert_eq!(r.equity_curve.len(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn failed_shutdown_listener_does_not_stop_the_run() {
        let s = sim(BotConfig::default(), &[]);
        let feed = ticks(&[1.0, 2.0, 3.0, 4.0, 5.0]);
        let broken = until_signal(async { Err::<(), _>(std::io::Error::other("no handler")) });
        let r = run_simulation(s, feed, RunMode::Sim, broken).await;
        assert_eq!(r.equity_curve.len(), 5);
    }

    #[tokio::test(start_paused = true)]
    async fn shutdown_listener_fires_on_signal() {
        let s = sim(BotConfig::default(), &[]);
        let feed = ticks(&[1.0, 2.0, 3.0, 4.0]);
        let fired = until_signal(async {
            sleep(Duration::from_millis(70)).await;
            Ok::<(), std::io::Error>(())
        });
        let r = run_simulation(s, feed, RunMode::Sim, fired).await;
        assert_eq!(r.equity_curve.len(), 2);
    }

    #[tokio::test]
    async fn backtest_runs_to_exhaustion() {
        let s = sim(BotConfig::default(), &[Signal::Buy]);
        let r = run_simulation(s, ticks(&[4050.0, 4100.0]), RunMode::Backtest, std::future::pending()).await;
        assert_eq!(r.equity_curve.len(), 2);
        assert_eq!(r.equity_curve[1], 100_050.0);
        assert_eq!(r.final_position, 1);
    }
}
