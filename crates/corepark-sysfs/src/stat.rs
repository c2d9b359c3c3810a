//! `/proc/stat` parsing.

use corepark_core::{UnitId, UnitTimes};

// user nice system idle iowait irq softirq steal. Guest time is already
// included in user.
const IDLE: usize = 3;
const IOWAIT: usize = 4;
const ACCOUNTED: usize = 8;

/// Cumulative counters for `cpu<unit>`, or `None` if the CPU has no line
/// (offline CPUs are omitted by the kernel).
pub(crate) fn cpu_times(stat: &str, unit: UnitId, io_is_busy: bool) -> Option<UnitTimes> {
    let label = format!("cpu{unit}");
    let line = stat
        .lines()
        .find(|line| line.split_whitespace().next() == Some(label.as_str()))?;

    let fields: Vec<u64> = line
        .split_whitespace()
        .skip(1)
        .take(ACCOUNTED)
        .map(str::parse::<u64>)
        .collect::<Result<_, _>>()
        .ok()?;
    if fields.len() <= IOWAIT {
        return None;
    }

    let wall = fields.iter().sum();
    let idle = if io_is_busy {
        fields[IDLE]
    } else {
        fields[IDLE] + fields[IOWAIT]
    };
    Some(UnitTimes { wall, idle })
}

pub(crate) fn procs_running(stat: &str) -> Option<u64> {
    stat.lines()
        .find_map(|line| line.strip_prefix("procs_running "))
        .and_then(|n| n.trim().parse().ok())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn aggregate_line_is_not_a_unit() {
        let stat = "cpu  10 0 0 90 0 0 0 0\ncpu0 1 0 0 9 0 0 0 0\n";
        assert_eq!(cpu_times(stat, 0, false), Some(UnitTimes { wall: 10, idle: 9 }));
        assert_eq!(cpu_times(stat, 1, false), None);
    }

    #[test]
    fn short_or_garbled_lines_are_unavailable() {
        assert_eq!(cpu_times("cpu0 1 2 3\n", 0, false), None);
        assert_eq!(cpu_times("cpu0 1 x 3 4 5 6 7 8\n", 0, false), None);
    }

    #[test]
    fn older_kernels_without_steal() {
        let stat = "cpu0 10 0 10 70 10\n";
        assert_eq!(cpu_times(stat, 0, false), Some(UnitTimes { wall: 100, idle: 80 }));
        assert_eq!(cpu_times(stat, 0, true), Some(UnitTimes { wall: 100, idle: 70 }));
    }

    #[test]
    fn running_count() {
        assert_eq!(procs_running("intr 1\nprocs_running 7\n"), Some(7));
        assert_eq!(procs_running("intr 1\n"), None);
    }
}
