//! corepark-sysfs: [`Platform`] backend for a Linux host.
//!
//! Unit `N` is logical CPU `N`. Signals come from two trees, both
//! injectable so the backend can run against a fake layout:
//!
//! ```text
//! <sys>/possible                          pool size ("0-7")
//! <sys>/cpuN/online                       activation ("1" / "0")
//! <sys>/cpuN/cpu_capacity                 class (highest = performance)
//! <sys>/cpuN/cpufreq/cpuinfo_max_freq     class fallback
//! <sys>/cpuN/cpufreq/scaling_cur_freq     frequency
//! <proc>/stat  "cpuN ..." lines           busy/idle counters
//! <proc>/stat  "procs_running N"          pending work
//! ```

pub mod error;
mod stat;

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use anyhow::Context;
use corepark_core::{ANCHOR, Platform, UnitClass, UnitId, UnitTimes};
use tracing::{debug, info, trace};

pub use error::{SysfsError, SysfsResult};

pub const DEFAULT_SYS_ROOT: &str = "/sys/devices/system/cpu";
pub const DEFAULT_PROC_ROOT: &str = "/proc";

/// Host CPU pool exposed through sysfs and procfs.
#[derive(Debug, Clone)]
pub struct SysfsPlatform {
    sys_root: PathBuf,
    proc_root: PathBuf,
    classes: Vec<UnitClass>,
}

impl SysfsPlatform {
    /// Open the host's real trees.
    pub fn host() -> SysfsResult<Self> {
        Self::with_roots(DEFAULT_SYS_ROOT, DEFAULT_PROC_ROOT)
    }

    /// Open an alternative layout. Topology is read once here.
    pub fn with_roots(sys_root: impl AsRef<Path>, proc_root: impl AsRef<Path>) -> SysfsResult<Self> {
        let sys_root = sys_root.as_ref().to_path_buf();
        let proc_root = proc_root.as_ref().to_path_buf();

        let possible = sys_root.join("possible");
        let content = read_trimmed(&possible)?;
        let pool_size = parse_cpu_list_len(&content).ok_or_else(|| SysfsError::Parse {
            path: possible.clone(),
            content: content.clone(),
        })?;

        let classes = detect_classes(&sys_root, pool_size);
        for (cpu, class) in classes.iter().enumerate() {
            debug!(cpu, class = class.label(), "cpu class");
        }
        info!(
            sys_root = %sys_root.display(),
            pool_size,
            performance = classes.iter().filter(|c| **c == UnitClass::Performance).count(),
            "cpu topology loaded"
        );

        Ok(Self {
            sys_root,
            proc_root,
            classes,
        })
    }

    fn cpu_path(&self, unit: UnitId, file: &str) -> PathBuf {
        self.sys_root.join(format!("cpu{unit}")).join(file)
    }

    fn set_online(&self, unit: UnitId, online: bool) -> anyhow::Result<()> {
        if unit == ANCHOR {
            anyhow::bail!("refusing to change the state of cpu{ANCHOR}");
        }
        let path = self.cpu_path(unit, "online");
        fs::write(&path, if online { "1" } else { "0" })
            .with_context(|| format!("failed to write {}", path.display()))?;
        debug!(unit, online, "cpu state written");
        Ok(())
    }
}

impl Platform for SysfsPlatform {
    fn pool_size(&self) -> usize {
        self.classes.len()
    }

    fn unit_class(&self, unit: UnitId) -> UnitClass {
        self.classes
            .get(unit)
            .copied()
            .unwrap_or(UnitClass::Performance)
    }

    fn is_active(&self, unit: UnitId) -> bool {
        // CPUs that cannot be hotplugged have no `online` file.
        match fs::read_to_string(self.cpu_path(unit, "online")) {
            Ok(content) => content.trim() == "1",
            Err(e) if e.kind() == io::ErrorKind::NotFound => true,
            Err(e) => {
                debug!(unit, error = %e, "cpu state unreadable");
                false
            }
        }
    }

    fn activate(&self, unit: UnitId) -> anyhow::Result<()> {
        self.set_online(unit, true)
    }

    fn deactivate(&self, unit: UnitId) -> anyhow::Result<()> {
        self.set_online(unit, false)
    }

    fn unit_times(&self, unit: UnitId, io_is_busy: bool) -> Option<UnitTimes> {
        let content = fs::read_to_string(self.proc_root.join("stat")).ok()?;
        let times = stat::cpu_times(&content, unit, io_is_busy);
        if times.is_none() {
            trace!(unit, "no stat line for cpu");
        }
        times
    }

    fn unit_frequency(&self, unit: UnitId) -> Option<u32> {
        read_number(&self.cpu_path(unit, "cpufreq/scaling_cur_freq"))
    }

    fn pending_work(&self) -> u64 {
        fs::read_to_string(self.proc_root.join("stat"))
            .ok()
            .and_then(|content| stat::procs_running(&content))
            .unwrap_or(0)
    }
}

fn read_trimmed(path: &Path) -> SysfsResult<String> {
    fs::read_to_string(path)
        .map(|s| s.trim().to_string())
        .map_err(|source| SysfsError::Io {
            path: path.to_path_buf(),
            source,
        })
}

fn read_number<T: std::str::FromStr>(path: &Path) -> Option<T> {
    fs::read_to_string(path).ok()?.trim().parse().ok()
}

/// Number of CPUs covered by a kernel cpu list such as `0-3,6-7`,
/// counted as highest index + 1.
fn parse_cpu_list_len(list: &str) -> Option<usize> {
    let mut highest = None;
    for range in list.split(',').map(str::trim).filter(|r| !r.is_empty()) {
        let last = match range.split_once('-') {
            Some((_, end)) => end.trim().parse::<usize>().ok()?,
            None => range.parse::<usize>().ok()?,
        };
        highest = highest.max(Some(last));
    }
    highest.map(|h| h + 1)
}

/// Units with the highest capacity are performance units. Falls back to
/// the maximum frequency when capacity is not exported. A homogeneous pool
/// is all performance.
fn detect_classes(sys_root: &Path, pool_size: usize) -> Vec<UnitClass> {
    let read_all = |file: &str| -> Option<Vec<u64>> {
        (0..pool_size)
            .map(|unit| read_number(&sys_root.join(format!("cpu{unit}")).join(file)))
            .collect()
    };

    let Some(scores) = read_all("cpu_capacity").or_else(|| read_all("cpufreq/cpuinfo_max_freq"))
    else {
        debug!("no capacity information, treating every cpu as performance");
        return vec![UnitClass::Performance; pool_size];
    };

    let top = scores.iter().copied().max().unwrap_or(0);
    scores
        .into_iter()
        .map(|score| {
            if score == top {
                UnitClass::Performance
            } else {
                UnitClass::Efficiency
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    const STAT: &str = "\
cpu  400 0 200 1600 100 0 0 0 0 0
cpu0 100 0 50 400 25 0 0 0 0 0
cpu1 100 0 50 400 25 0 0 0 0 0
cpu2 100 0 50 400 25 0 0 0 0 0
intr 12345
procs_running 3
procs_blocked 0
";

    /// A four-CPU layout: cpu0/cpu1 big, cpu2/cpu3 little, cpu3 offline
    /// and missing from /proc/stat.
    fn fake_host() -> (TempDir, TempDir) {
        let sys = TempDir::new().unwrap();
        let proc = TempDir::new().unwrap();
        fs::write(sys.path().join("possible"), "0-3\n").unwrap();
        let layout = [
            (0, 1024, None),
            (1, 1024, Some("1")),
            (2, 512, Some("1")),
            (3, 512, Some("0")),
        ];
        for (unit, capacity, online) in layout {
            let dir = sys.path().join(format!("cpu{unit}"));
            fs::create_dir_all(dir.join("cpufreq")).unwrap();
            fs::write(dir.join("cpu_capacity"), format!("{capacity}\n")).unwrap();
            fs::write(dir.join("cpufreq/scaling_cur_freq"), "1804800\n").unwrap();
            if let Some(state) = online {
                fs::write(dir.join("online"), format!("{state}\n")).unwrap();
            }
        }
        fs::write(proc.path().join("stat"), STAT).unwrap();
        (sys, proc)
    }

    #[test]
    fn cpu_list_parsing() {
        assert_eq!(parse_cpu_list_len("0-7"), Some(8));
        assert_eq!(parse_cpu_list_len("0"), Some(1));
        assert_eq!(parse_cpu_list_len("0-3,6-7"), Some(8));
        assert_eq!(parse_cpu_list_len(""), None);
        assert_eq!(parse_cpu_list_len("zero"), None);
    }

    #[test]
    fn topology_from_capacity() {
        let (sys, proc) = fake_host();
        let platform = SysfsPlatform::with_roots(sys.path(), proc.path()).unwrap();
        assert_eq!(platform.pool_size(), 4);
        assert_eq!(platform.unit_class(1), UnitClass::Performance);
        assert_eq!(platform.unit_class(2), UnitClass::Efficiency);
    }

    #[test]
    fn topology_falls_back_to_max_freq() {
        let (sys, proc) = fake_host();
        for unit in 0..4 {
            let dir = sys.path().join(format!("cpu{unit}"));
            fs::remove_file(dir.join("cpu_capacity")).unwrap();
            let freq = if unit < 2 { "2400000" } else { "1800000" };
            fs::write(dir.join("cpufreq/cpuinfo_max_freq"), freq).unwrap();
        }
        let platform = SysfsPlatform::with_roots(sys.path(), proc.path()).unwrap();
        assert_eq!(platform.unit_class(0), UnitClass::Performance);
        assert_eq!(platform.unit_class(3), UnitClass::Efficiency);
    }

    #[test]
    fn missing_possible_file_is_an_error() {
        let sys = TempDir::new().unwrap();
        let result = SysfsPlatform::with_roots(sys.path(), sys.path());
        assert!(matches!(result, Err(SysfsError::Io { .. })));
    }

    #[test]
    fn online_state_and_transitions() {
        let (sys, proc) = fake_host();
        let platform = SysfsPlatform::with_roots(sys.path(), proc.path()).unwrap();
        assert!(platform.is_active(0));
        assert!(platform.is_active(1));
        assert!(!platform.is_active(3));

        platform.activate(3).unwrap();
        assert!(platform.is_active(3));
        platform.deactivate(1).unwrap();
        assert!(!platform.is_active(1));

        assert!(platform.deactivate(ANCHOR).is_err());
    }

    #[test]
    fn signals_from_proc_and_cpufreq() {
        let (sys, proc) = fake_host();
        let platform = SysfsPlatform::with_roots(sys.path(), proc.path()).unwrap();

        assert_eq!(
            platform.unit_times(1, false),
            Some(UnitTimes { wall: 575, idle: 425 })
        );
        assert_eq!(
            platform.unit_times(1, true),
            Some(UnitTimes { wall: 575, idle: 400 })
        );
        assert_eq!(platform.unit_times(3, false), None);
        assert_eq!(platform.unit_frequency(2), Some(1_804_800));
        assert_eq!(platform.pending_work(), 3);
    }
}
