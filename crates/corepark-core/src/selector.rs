//! Candidate selection: which unit a busy unit should bring up next.

use crate::types::{ANCHOR, UnitId};
use crate::unit::UnitState;

/// Pick the next activation target after `current`.
///
/// `active` is the tick's view of the pool, including activations already
/// decided earlier in the same tick. Returns [`ANCHOR`] when there is no
/// candidate; the anchor itself is never a target.
///
/// A reserved unit (not take-down eligible) that is parked is always
/// returned when reached, regardless of bring-up eligibility. Otherwise,
/// unless `force` is set, a lightly loaded `current` unit (its own `load`
/// below `min_efficiency_load`) prefers the first parked, eligible
/// efficiency unit in the pool.
pub fn next_candidate(
    units: &[UnitState],
    active: &[bool],
    current: UnitId,
    load: u32,
    min_efficiency_load: u32,
    force: bool,
) -> UnitId {
    let is_parked = |unit: UnitId| !active.get(unit).copied().unwrap_or(true);
    let must_restore = |unit: UnitId| !units[unit].can_take_down && is_parked(unit);

    let Some(candidate) = (current + 1..units.len())
        .find(|&unit| must_restore(unit) || units[unit].can_bring_up)
    else {
        return ANCHOR;
    };

    if must_restore(candidate) || force || load >= min_efficiency_load {
        return candidate;
    }

    (1..units.len())
        .find(|&unit| units[unit].is_efficiency() && is_parked(unit) && units[unit].can_bring_up)
        .unwrap_or(candidate)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::UnitTunables;
    use crate::reservation::{recompute_bring_up, recompute_take_down};
    use crate::types::UnitClass::{self, Efficiency as E, Performance as P};

    fn pool(classes: &[UnitClass], min_active: usize, max_active: usize) -> Vec<UnitState> {
        let mut units: Vec<UnitState> = classes
            .iter()
            .enumerate()
            .map(|(i, c)| UnitState::new(*c, UnitTunables::for_position(i)))
            .collect();
        recompute_take_down(&mut units, min_active);
        recompute_bring_up(&mut units, max_active);
        units
    }

    const BIG_LITTLE: [UnitClass; 8] = [P, P, P, P, E, E, E, E];

    #[test]
    fn picks_next_eligible_unit() {
        let units = pool(&BIG_LITTLE, 1, 8);
        let active = [true, false, false, false, false, false, false, false];
        assert_eq!(next_candidate(&units, &active, 0, 90, 85, false), 1);
        assert_eq!(next_candidate(&units, &active, 2, 90, 85, false), 3);
    }

    #[test]
    fn last_unit_has_no_candidate() {
        let units = pool(&BIG_LITTLE, 1, 8);
        let active = [true; 8];
        assert_eq!(next_candidate(&units, &active, 7, 90, 85, false), ANCHOR);
    }

    #[test]
    fn skips_ineligible_units() {
        // Ceiling 6 excludes units 2 and 3.
        let units = pool(&BIG_LITTLE, 1, 6);
        let active = [true, true, false, false, false, false, false, false];
        assert_eq!(next_candidate(&units, &active, 1, 90, 85, false), 4);
    }

    #[test]
    fn wraps_to_anchor_when_nothing_eligible() {
        // Ceiling 1 excludes every non-anchor unit.
        let units = pool(&BIG_LITTLE, 1, 1);
        let active = [true, false, false, false, false, false, false, false];
        assert_eq!(next_candidate(&units, &active, 0, 90, 85, false), ANCHOR);
    }

    #[test]
    fn light_load_prefers_parked_efficiency_unit() {
        let units = pool(&BIG_LITTLE, 1, 8);
        let active = [true, false, false, false, false, true, false, false];
        assert_eq!(next_candidate(&units, &active, 0, 40, 85, false), 4);
        // Busy inspector keeps the scan result.
        assert_eq!(next_candidate(&units, &active, 0, 90, 85, false), 1);
        // Forced activation keeps the scan result.
        assert_eq!(next_candidate(&units, &active, 0, 40, 85, true), 1);
    }

    #[test]
    fn parked_reserved_unit_overrides_eligibility() {
        // Floor 2 reserves unit 1; ceiling 1 makes it ineligible to bring up.
        let units = pool(&BIG_LITTLE, 2, 1);
        assert!(!units[1].can_take_down);
        assert!(!units[1].can_bring_up);
        let active = [true, false, false, false, false, false, false, false];
        assert_eq!(next_candidate(&units, &active, 0, 10, 85, false), 1);
    }

    #[test]
    fn anchor_is_never_returned_as_target() {
        let units = pool(&BIG_LITTLE, 1, 8);
        for current in 0..8 {
            let active = [false; 8];
            let picked = next_candidate(&units, &active, current, 0, 85, false);
            if current == 7 {
                assert_eq!(picked, ANCHOR);
            } else {
                assert_ne!(picked, 0);
            }
        }
    }
}
