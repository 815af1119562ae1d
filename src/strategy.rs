// ===============================
// src/strategy.rs
// ===============================
//
// MOVING AVERAGE CROSSOVER (Trend-Following)
//    Ide: MA cepat menembus ke atas MA lambat -> Buy (golden cross)
//         MA cepat menembus ke bawah MA lambat -> Sell (dead cross)
//    Cara kerja singkat:
//      - Simpan slow_w + 1 harga terakhir.
//      - Selama window slow belum penuh -> HOLD (warmup).
//      - Bandingkan (fast, slow) sekarang dengan tick sebelumnya.
//    Risiko:
//      - Choppy/ranging market bisa menghasilkan whipsaw (SL/TP di modul risk).
//
use std::collections::VecDeque;

use chrono::NaiveDateTime;

use crate::domain::Signal;

/// Stateful price -> signal function, called once per tick.
pub trait SignalGenerator {
    fn on_price(&mut self, ts: NaiveDateTime, px: f64) -> Signal;
}

pub struct MaCrossover {
    fast_w: usize,
    slow_w: usize,
    prices: VecDeque<f64>,
    prev: Option<(f64, f64)>,
}

impl MaCrossover {
    pub fn new(fast_w: usize, slow_w: usize) -> Self {
        Self { fast_w, slow_w, prices: VecDeque::with_capacity(slow_w + 1), prev: None }
    }

    fn push_window(&mut self, v: f64) {
        if self.prices.len() == self.slow_w + 1 {
            self.prices.pop_front();
        }
        self.prices.push_back(v);
    }

    fn sma(&self, w: usize) -> f64 {
        self.prices.iter().rev().take(w).sum::<f64>() / w as f64
    }
}

impl SignalGenerator for MaCrossover {
    fn on_price(&mut self, _ts: NaiveDateTime, px: f64) -> Signal {
        self.push_window(px);
        if self.prices.len() < self.slow_w {
            return Signal::Hold;
        }

        let fast = self.sma(self.fast_w);
        let slow = self.sma(self.slow_w);

        let signal = match self.prev {
            Some((pf, ps)) if pf <= ps && fast > slow => Signal::Buy,
            Some((pf, ps)) if pf >= ps && fast < slow => Signal::Sell,
            _ => Signal::Hold,
        };
        self.prev = Some((fast, slow));
        signal
    }
}
