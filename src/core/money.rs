// Monetary amounts are plain f64 everywhere, normalized to two decimals
// (round half-up) before they are persisted or compared against limits.
// All public amounts are non-negative, so `f64::round` (half away from
// zero) gives the same result as half-up.

/// Round an amount to two decimal places, half-up.
pub fn round2(amount: f64) -> f64 {
    (amount * 100.0).round() / 100.0
}

/// Format an amount for display with two decimal places.
pub fn format(amount: f64) -> String {
    format!("{:.2}", amount)
}
