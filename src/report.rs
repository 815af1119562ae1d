// ===============================
// src/report.rs
// ===============================
use tabled::settings::{Panel, Style};
use tabled::{Table, Tabled};

use crate::domain::Trade;
use crate::runner::SimulationResult;

const LAST_TRADES: usize = 5;

#[derive(Debug, Clone, PartialEq)]
pub struct Report {
    pub symbol: String,
    pub total_trades: usize,
    pub wins: usize,
    pub losses: usize,
    /// wins over all fills (entries included), in percent
    pub win_rate_pct: f64,
    pub realized_pnl: f64,
    pub final_equity: Option<f64>,
    pub max_drawdown_pct: f64,
    pub initial_cash: f64,
    pub final_cash: f64,
    pub final_position: i64,
}

#[derive(Tabled)]
struct MetricRow {
    #[tabled(rename = "Metric")]
    metric: &'static str,
    #[tabled(rename = "Value")]
    value: String,
}

#[derive(Tabled)]
struct TradeRow {
    #[tabled(rename = "Time")]
    time: String,
    #[tabled(rename = "Side")]
    side: String,
    #[tabled(rename = "Price")]
    price: String,
    #[tabled(rename = "PnL")]
    pnl: String,
}

/// Largest peak-to-trough drop as a fraction of the peak.
pub fn max_drawdown(equity: &[f64]) -> f64 {
    let mut peak = f64::NEG_INFINITY;
    let mut max_dd = 0.0_f64;
    for &e in equity {
        if e > peak {
            peak = e;
        }
        let dd = if peak > 0.0 { (peak - e) / peak } else { 0.0 };
        max_dd = max_dd.max(dd);
    }
    max_dd
}

fn fmt_money(v: f64) -> String {
    let s = format!("{:.2}", v.abs());
    let (int, frac) = s.split_once('.').unwrap_or((s.as_str(), "00"));
    let mut grouped = String::with_capacity(int.len() + int.len() / 3);
    for (i, c) in int.chars().enumerate() {
        if i > 0 && (int.len() - i) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(c);
    }
    format!("{}${grouped}.{frac}", if v < 0.0 { "-" } else { "" })
}

impl Report {
    pub fn from_result(r: &SimulationResult) -> Self {
        let pnls: Vec<f64> = r.trades.iter().filter_map(|t| t.realized_pnl.amount()).collect();
        let total_trades = r.trades.len();
        // breakeven closes count as neither
        let wins = pnls.iter().filter(|p| **p > 0.0).count();
        let losses = pnls.iter().filter(|p| **p < 0.0).count();
        let win_rate_pct = if total_trades > 0 { wins as f64 / total_trades as f64 * 100.0 } else { 0.0 };
        Self {
            symbol: r.symbol.clone(),
            total_trades,
            wins,
            losses,
            win_rate_pct,
            // venue total; equals the sum over closing trades
            realized_pnl: r.realized_pnl,
            final_equity: r.equity_curve.last().copied(),
            max_drawdown_pct: max_drawdown(&r.equity_curve) * 100.0,
            initial_cash: r.initial_cash,
            final_cash: r.final_cash,
            final_position: r.final_position,
        }
    }

    pub fn render(&self, trades: &[Trade]) -> String {
        let rows = vec![
            MetricRow { metric: "Total Trades", value: self.total_trades.to_string() },
            MetricRow {
                metric: "Win Rate",
                value: format!("{:.1}% ({} W / {} L)", self.win_rate_pct, self.wins, self.losses),
            },
            MetricRow { metric: "Realized PnL", value: fmt_money(self.realized_pnl) },
            MetricRow {
                metric: "Final Equity",
                value: self.final_equity.map_or_else(|| "N/A".to_string(), fmt_money),
            },
            MetricRow { metric: "Max Drawdown", value: format!("{:.2}%", self.max_drawdown_pct) },
            MetricRow { metric: "Initial Cash", value: fmt_money(self.initial_cash) },
            MetricRow { metric: "Final Cash", value: fmt_money(self.final_cash) },
            MetricRow { metric: "Final Position", value: self.final_position.to_string() },
        ];
        let mut out = Table::new(rows)
            .with(Style::rounded())
            .with(Panel::header(format!("Backtest Performance Report ({})", self.symbol)))
            .to_string();

        if !trades.is_empty() {
            let recent: Vec<TradeRow> = trades
                .iter()
                .skip(trades.len().saturating_sub(LAST_TRADES))
                .map(|t| TradeRow {
                    time: t.ts.to_string(),
                    side: t.side.to_string(),
                    price: format!("{:.2}", t.px),
                    pnl: t.realized_pnl.amount().map_or_else(|| "-".to_string(), fmt_money),
                })
                .collect();
            let tape = Table::new(recent)
                .with(Style::rounded())
                .with(Panel::header("Last trades (--log-level debug for the full list)"))
                .to_string();
            out.push('\n');
            out.push_str(&tape);
        }
        out
    }
}

pub fn print(result: &SimulationResult) {
    println!("{}", Report::from_result(result).render(&result.trades));
}
