// ===============================
// src/positions.rs (avg entry & realized PnL per symbol)
// ===============================

use crate::domain::Side;

/// Net position of one symbol. `avg_entry_px` is 0.0 whenever `qty == 0`.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Position {
    pub qty: i64,
    pub avg_entry_px: f64,
}

impl Position {
    /// Apply one fill. Returns the realized PnL when the fill closed or reduced
    /// an opposing position, `None` when it only opened or added.
    pub fn apply_fill(&mut self, side: Side, qty: u32, px: f64) -> Option<f64> {
        let signed_qty = side.sign() * i64::from(qty);
        let prev_qty = self.qty;
        let new_qty = prev_qty + signed_qty;

        if prev_qty == 0 || prev_qty.signum() == signed_qty.signum() {
            // arah sama -> blend avg entry
            self.avg_entry_px = if prev_qty == 0 {
                px
            } else {
                (prev_qty.abs() as f64 * self.avg_entry_px + f64::from(qty) * px) / new_qty.abs() as f64
            };
            self.qty = new_qty;
            return None;
        }

        // arah berlawanan -> realize PnL on the closed part
        let qty_closed = prev_qty.abs().min(i64::from(qty));
        let pnl = (px - self.avg_entry_px) * (prev_qty.signum() * qty_closed) as f64;

        self.qty = new_qty;
        if new_qty == 0 {
            self.avg_entry_px = 0.0;
        } else if new_qty.signum() != prev_qty.signum() {
            // flipped through zero: the excess is a fresh position at the fill price
            self.avg_entry_px = px;
        }
        Some(pnl)
    }
}
