use crate::models::Bar;

/// Session VWAP: cumulative typical-price × volume over bars at or after `session_start_ms`
///
/// Returns `None` when the session has no bars or no traded volume.
pub fn session_vwap(bars: &[Bar], session_start_ms: i64) -> Option<f64> {
    let (pv, volume) = bars
        .iter()
        .rev()
        .take_while(|b| b.timestamp >= session_start_ms)
        .fold((0.0, 0.0), |(pv, vol), b| {
            (pv + b.typical_price() * b.volume, vol + b.volume)
        });

    if volume > 0.0 {
        Some(pv / volume)
    } else {
        None
    }
}
