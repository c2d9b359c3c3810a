//! Reservation maps: which units may be brought up or taken down.
//!
//! Both maps are recomputed from scratch whenever a bound changes rather
//! than maintained incrementally. The anchor is never touched.
//!
//! ```text
//! bring-up:  mark N - max units ineligible, scanning from the top,
//!            performance units first, then efficiency units
//! take-down: reserve (min - 1) units as always-up, split
//!            efficiency = (min - 1) / 2, performance = the rest,
//!            scanning from the bottom
//! ```

use crate::types::{ANCHOR, UnitClass};
use crate::unit::UnitState;

/// Recompute `can_bring_up` for an active ceiling of `max_active`.
///
/// Exactly `min(N - 1, N - max_active)` units end up ineligible.
pub fn recompute_bring_up(units: &mut [UnitState], max_active: usize) {
    let pool_size = units.len();
    for unit in units.iter_mut().skip(1) {
        unit.can_bring_up = true;
    }

    let mut to_exclude = pool_size
        .saturating_sub(max_active)
        .min(pool_size.saturating_sub(1));

    for class in [UnitClass::Performance, UnitClass::Efficiency] {
        for unit in units.iter_mut().skip(1).rev() {
            if to_exclude == 0 {
                return;
            }
            if unit.class == class && unit.can_bring_up {
                unit.can_bring_up = false;
                to_exclude -= 1;
            }
        }
    }
}

/// Recompute `can_take_down` for a floor of `min_active`, resetting every
/// unit's hysteresis counters.
///
/// A class that cannot fill its share hands the remainder to the other
/// class, so `min(min_active - 1, N - 1)` units end up reserved.
pub fn recompute_take_down(units: &mut [UnitState], min_active: usize) {
    let reserved = min_active.saturating_sub(1);
    let mut efficiency = reserved / 2;
    let mut performance = reserved - efficiency;

    for (index, unit) in units.iter_mut().enumerate() {
        unit.reset_counters();
        if index == ANCHOR {
            continue;
        }
        unit.can_take_down = true;

        let quota = match unit.class {
            UnitClass::Efficiency => &mut efficiency,
            UnitClass::Performance => &mut performance,
        };
        if *quota > 0 {
            unit.can_take_down = false;
            *quota -= 1;
        }
    }

    let mut leftover = efficiency + performance;
    for unit in units.iter_mut().skip(1) {
        if leftover == 0 {
            break;
        }
        if unit.can_take_down {
            unit.can_take_down = false;
            leftover -= 1;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::UnitTunables;

    use UnitClass::{Efficiency as E, Performance as P};

    fn pool(classes: &[UnitClass]) -> Vec<UnitState> {
        classes
            .iter()
            .enumerate()
            .map(|(i, c)| UnitState::new(*c, UnitTunables::for_position(i)))
            .collect()
    }

    fn big_little() -> Vec<UnitState> {
        pool(&[P, P, P, P, E, E, E, E])
    }

    fn ineligible_up(units: &[UnitState]) -> Vec<usize> {
        (1..units.len()).filter(|i| !units[*i].can_bring_up).collect()
    }

    fn reserved(units: &[UnitState]) -> Vec<usize> {
        (1..units.len()).filter(|i| !units[*i].can_take_down).collect()
    }

    #[test]
    fn bring_up_excludes_performance_first() {
        let mut units = big_little();
        recompute_bring_up(&mut units, 6);
        assert_eq!(ineligible_up(&units), vec![2, 3]);
    }

    #[test]
    fn bring_up_wraps_to_efficiency() {
        let mut units = big_little();
        recompute_bring_up(&mut units, 2);
        // Three performance units, then three efficiency units from the top.
        assert_eq!(ineligible_up(&units), vec![1, 2, 3, 5, 6, 7]);
    }

    #[test]
    fn bring_up_counts_match_for_every_ceiling() {
        for max_active in 1..=8 {
            let mut units = big_little();
            recompute_bring_up(&mut units, max_active);
            assert_eq!(
                ineligible_up(&units).len(),
                (8 - max_active).min(7),
                "max_active = {max_active}"
            );
            assert!(units[0].can_bring_up);
        }
    }

    #[test]
    fn bring_up_is_recomputed_not_accumulated() {
        let mut units = big_little();
        recompute_bring_up(&mut units, 1);
        recompute_bring_up(&mut units, 8);
        assert!(ineligible_up(&units).is_empty());
    }

    #[test]
    fn take_down_splits_reserved_slots() {
        let mut units = big_little();
        recompute_take_down(&mut units, 4);
        // 3 reserved: 1 efficiency, 2 performance, lowest indices first.
        assert_eq!(reserved(&units), vec![1, 2, 4]);
    }

    #[test]
    fn take_down_counts_match_for_every_floor() {
        for min_active in 1..=8 {
            let mut units = big_little();
            recompute_take_down(&mut units, min_active);
            assert_eq!(reserved(&units).len(), min_active - 1, "min_active = {min_active}");
        }
    }

    #[test]
    fn take_down_spills_into_other_class() {
        let mut units = pool(&[P, P, E, E, E]);
        recompute_take_down(&mut units, 5);
        // Performance share is 2 but only unit 1 exists; the rest spills.
        assert_eq!(reserved(&units), vec![1, 2, 3, 4]);
    }

    #[test]
    fn take_down_resets_counters() {
        let mut units = big_little();
        units[3].up_counter = 4;
        units[5].down_counter = 2;
        recompute_take_down(&mut units, 1);
        assert!(units.iter().all(|u| u.up_counter == 1 && u.down_counter == 1));
        assert!(reserved(&units).is_empty());
    }
}
