//! Exact-sum integer normalization.
//!
//! Converts floating-point weights into integers summing to exactly the
//! requested total, using the largest-remainder method. One unit is
//! reserved up front for every positive-weight entry (the on-chain
//! primitive rejects zero-weight receivers), then the remaining budget is
//! distributed proportionally: floor each ideal share, then hand out the
//! leftover units one at a time to the entries with the largest
//! fractional remainder.

use crate::{SplitsError, SplitsResult};

/// Normalize `weights` to integers summing to exactly `total`.
///
/// Every entry with a positive input weight gets an output of at least 1.
/// Inputs must be non-empty, with a positive sum, and no more entries
/// than `total` units to hand out.
pub fn largest_remainder(weights: &[f64], total: u32) -> SplitsResult<Vec<u32>> {
    if weights.is_empty() {
        return Err(SplitsError::EmptyLevel);
    }

    let raw_total: f64 = weights.iter().sum();
    if raw_total <= 0.0 {
        return Err(SplitsError::ZeroTotalWeight);
    }

    // Reserve the minimum of 1 per entry, then split the rest.
    let reserved = weights.len() as u32;
    if reserved > total {
        return Err(SplitsError::TooManyEntries {
            entries: weights.len(),
            total,
        });
    }
    let budget = total - reserved;

    let ideal: Vec<f64> = weights
        .iter()
        .map(|w| w / raw_total * f64::from(budget))
        .collect();

    let mut shares: Vec<u32> = ideal.iter().map(|v| 1 + v.floor() as u32).collect();
    let remaining = total - shares.iter().sum::<u32>();

    let mut by_remainder: Vec<usize> = (0..weights.len()).collect();
    by_remainder.sort_by(|&a, &b| {
        let ra = ideal[a] - ideal[a].floor();
        let rb = ideal[b] - ideal[b].floor();
        rb.partial_cmp(&ra).unwrap_or(std::cmp::Ordering::Equal)
    });

    for &i in by_remainder.iter().take(remaining as usize) {
        shares[i] += 1;
    }

    Ok(shares)
}
