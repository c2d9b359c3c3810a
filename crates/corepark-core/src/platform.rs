//! Services the controller consumes but does not implement.
//!
//! A `Platform` owns the physical state of the pool. The controller only
//! keeps a desired model of it and reconciles against `is_active` on every
//! tick, so a failed transition is simply observed again next time.

use crate::types::{UnitClass, UnitId, UnitTimes};

/// Topology, activation and signal access for a pool of units.
///
/// Implementations must be safe to call from the sampling task and from
/// configuration callers concurrently.
pub trait Platform: Send + Sync {
    /// Number of units in the pool. Static for the platform's lifetime.
    fn pool_size(&self) -> usize;

    /// Class of a unit. Static for the platform's lifetime.
    fn unit_class(&self, unit: UnitId) -> UnitClass;

    /// Whether the unit is currently active.
    fn is_active(&self, unit: UnitId) -> bool;

    /// Bring a parked unit up. Never called for the anchor.
    fn activate(&self, unit: UnitId) -> anyhow::Result<()>;

    /// Park an active unit. Never called for the anchor.
    fn deactivate(&self, unit: UnitId) -> anyhow::Result<()>;

    /// Cumulative busy-time counters, or `None` if unavailable right now.
    ///
    /// When `io_is_busy` is set, time spent waiting on I/O is not counted
    /// as idle.
    fn unit_times(&self, unit: UnitId, io_is_busy: bool) -> Option<UnitTimes>;

    /// Current clock frequency, or `None` if unavailable right now.
    fn unit_frequency(&self, unit: UnitId) -> Option<u32>;

    /// Pool-wide count of runnable work items.
    fn pending_work(&self) -> u64;
}

/// Derive a load percentage from two consecutive time samples.
///
/// Returns `None` when there is no previous sample or when more idle
/// time than wall time elapsed (the sample is re-evaluated next tick).
pub fn derive_load(prev: Option<UnitTimes>, cur: UnitTimes) -> Option<u32> {
    let prev = prev?;
    let wall = cur.wall.saturating_sub(prev.wall);
    let idle = cur.idle.saturating_sub(prev.idle);

    if wall < idle {
        return None;
    }
    if wall == idle {
        return Some(0);
    }
    Some((100 * (wall - idle) / wall) as u32)
}
