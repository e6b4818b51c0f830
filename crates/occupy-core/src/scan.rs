//! Monotonic boundary scans over histogram bins.

use serde::{Deserialize, Serialize};

/// Direction a boundary scan walks in.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum ScanDirection {
    /// Toward higher bin indices.
    Up,
    /// Toward lower bin indices.
    Down,
}

/// Walk from `start` toward `far` one bin at a time and return the first index
/// where `stop` holds.
///
/// The far index itself is never examined: reaching it means the boundary was
/// not found and `None` is returned. The direction is implied by the order of
/// `start` and `far`; `start == far` is an immediate miss.
pub fn scan_boundary<F>(start: usize, far: usize, mut stop: F) -> Option<usize>
where
    F: FnMut(usize) -> bool,
{
    match direction(start, far)? {
        ScanDirection::Up => (start..far).find(|&i| stop(i)),
        ScanDirection::Down => (far + 1..=start).rev().find(|&i| stop(i)),
    }
}

fn direction(start: usize, far: usize) -> Option<ScanDirection> {
    match start.cmp(&far) {
        std::cmp::Ordering::Less => Some(ScanDirection::Up),
        std::cmp::Ordering::Greater => Some(ScanDirection::Down),
        std::cmp::Ordering::Equal => None,
    }
}
