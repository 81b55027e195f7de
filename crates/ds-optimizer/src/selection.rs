//! Elite-window selection over a ranked population.

use serde::{Deserialize, Serialize};
use std::ops::Range;

use crate::config::SelectionMode;

/// The contiguous block of ranked candidates chosen as the elite set.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct EliteWindow {
    pub start: usize,
    pub width: usize,
    /// Mean loss over the window.
    pub mean: f64,
    /// Population stddev of the window's losses.
    pub stddev: f64,
    /// Loss of the window's first candidate; this is what the improvement
    /// gate compares against the best loss so far.
    pub representative_loss: f64,
}

impl EliteWindow {
    pub fn range(&self) -> Range<usize> {
        self.start..self.start + self.width
    }
}

/// Mean and population stddev of a slice of losses.
pub fn window_stats(losses: &[f64]) -> (f64, f64) {
    if losses.is_empty() {
        return (0.0, 0.0);
    }
    let n = losses.len() as f64;
    let mean = losses.iter().sum::<f64>() / n;
    let variance = losses.iter().map(|l| (mean - l) * (mean - l)).sum::<f64>() / n;
    (mean, variance.sqrt())
}

/// Find the window of `width` consecutive losses with the smallest stddev.
///
/// `losses` must already be sorted ascending. Start positions `0..len - width`
/// are scanned; the window that would end exactly on the last element is not
/// a candidate. Ties keep the lowest start. When no start is scanned (`len ==
/// width`) or no window has a finite stddev, the window at 0 is used.
///
/// Returns `None` when `width` is zero or exceeds `losses.len()`.
pub fn select_window(losses: &[f64], width: usize) -> Option<EliteWindow> {
    if width == 0 || losses.len() < width {
        return None;
    }

    let mut best_start = 0;
    let mut min_stddev = f64::INFINITY;
    for start in 0..losses.len() - width {
        let (_, stddev) = window_stats(&losses[start..start + width]);
        if stddev < min_stddev {
            min_stddev = stddev;
            best_start = start;
        }
    }

    let (mean, stddev) = window_stats(&losses[best_start..best_start + width]);
    Some(EliteWindow {
        start: best_start,
        width,
        mean,
        stddev,
        representative_loss: losses[best_start],
    })
}

/// Choose the elite set for a generation.
///
/// `span`, when given, restricts the scan to the first `span` ranked losses
/// (never fewer than the window width).
pub fn select_elite(
    losses: &[f64],
    mode: SelectionMode,
    span: Option<usize>,
) -> Option<EliteWindow> {
    let width = mode.width();
    match mode {
        SelectionMode::Best => select_window(losses.get(..1)?, 1),
        SelectionMode::Window { .. } => {
            let limit = span.map_or(losses.len(), |s| s.max(width).min(losses.len()));
            select_window(&losses[..limit], width)
        }
    }
}
