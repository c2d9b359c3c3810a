//! Decision engine: one tick of the sampling loop.
//!
//! Walks every active unit in ascending order and decides, per unit, at
//! most one transition. Global bounds are checked before local triggers:
//!
//! ```text
//! net = active + activations - deactivations (so far this tick)
//!
//! net > max and unit may go          -> deactivate unit
//! force or net < min                 -> activate candidate (if net < max)
//! candidate, net < max, load/freq/rq
//!   above the up thresholds          -> count up; activate at up_rate
//! may go, load low or freq+rq low    -> count down; deactivate at down_rate
//! otherwise                          -> reset counters
//! ```
//!
//! Planning never touches the physical pool; the caller applies the
//! returned [`DecisionVector`] after releasing the lock.

use tracing::{debug, trace};

use crate::platform::{Platform, derive_load};
use crate::selector::next_candidate;
use crate::state::ControllerState;
use crate::types::{ANCHOR, Decision, DecisionVector, UnitId};

/// Running tally of one tick's decisions.
struct Tally {
    online: usize,
    activated: usize,
    deactivated: usize,
}

impl Tally {
    fn net(&self) -> usize {
        (self.online + self.activated).saturating_sub(self.deactivated)
    }
}

/// Plan one tick against the pool's current state.
///
/// `pressure` is the queue pressure sampled once for the whole tick.
pub fn plan_tick(
    state: &mut ControllerState,
    platform: &dyn Platform,
    pressure: u32,
) -> DecisionVector {
    let pool_size = state.pool_size();
    let tuners = state.tuners.clone();
    let min_active = tuners.min_active;
    let max_active = tuners.effective_max();
    let force = tuners.force_activation;

    let online: Vec<bool> = (0..pool_size).map(|unit| platform.is_active(unit)).collect();
    // Online units plus activations decided so far.
    let mut view = online.clone();
    let mut decisions = DecisionVector::new(pool_size);
    let mut tally = Tally {
        online: online.iter().filter(|a| **a).count(),
        activated: 0,
        deactivated: 0,
    };

    for unit in (0..pool_size).filter(|u| online[*u]) {
        let times = platform.unit_times(unit, tuners.io_is_busy);
        let load = match times {
            Some(cur) => {
                let prev = state.units[unit].prev_times.replace(cur);
                derive_load(prev, cur)
            }
            None => None,
        };
        let (Some(load), Some(freq)) = (load, platform.unit_frequency(unit)) else {
            trace!(unit, "signals unavailable, skipping unit this tick");
            continue;
        };

        let candidate = next_candidate(
            &state.units,
            &view,
            unit,
            load,
            tuners.min_efficiency_load,
            force,
        );
        let has_target = candidate != ANCHOR && !view[candidate];

        let record = &mut state.units[unit];
        record.clamp_stale_counters();
        let up_due = record.up_due();
        let down_due = record.down_due();
        let t = record.tunables;

        // Ceiling.
        if unit != ANCHOR
            && tally.net() > max_active
            && (record.can_take_down || !record.can_bring_up)
        {
            record.reset_counters();
            decide(&mut decisions, &mut tally, &mut view, unit, Decision::Deactivate, "above ceiling");
            continue;
        }

        // Floor, or a pending wake-everyone after resume.
        if force || tally.net() < min_active {
            if has_target && tally.net() < max_active {
                record.reset_counters();
                decide(&mut decisions, &mut tally, &mut view, candidate, Decision::Activate, "below floor");
            }
            continue;
        }

        if has_target
            && tally.net() < max_active
            && load >= t.up_load
            && freq >= t.up_freq
            && pressure > t.up_rq
        {
            record.up_counter += 1;
            if up_due {
                record.reset_counters();
                decide(&mut decisions, &mut tally, &mut view, candidate, Decision::Activate, "up trigger");
            }
        } else if unit != ANCHOR
            && record.can_take_down
            && (load < t.down_load || (freq <= t.down_freq && pressure <= t.down_rq))
        {
            record.down_counter += 1;
            if down_due {
                record.reset_counters();
                decide(&mut decisions, &mut tally, &mut view, unit, Decision::Deactivate, "down trigger");
            }
        } else {
            record.reset_counters();
        }
    }

    decisions
}

fn decide(
    decisions: &mut DecisionVector,
    tally: &mut Tally,
    view: &mut [bool],
    unit: UnitId,
    decision: Decision,
    reason: &'static str,
) {
    decisions.set(unit, decision);
    match decision {
        Decision::Activate => {
            tally.activated += 1;
            view[unit] = true;
        }
        Decision::Deactivate => tally.deactivated += 1,
        Decision::Idle => {}
    }
    debug!(unit, ?decision, reason, net = tally.net(), "decision");
}
