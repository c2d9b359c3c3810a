//! Controller: owns the shared state and the periodic sampling task.
//!
//! All tunables, unit records and reservation maps sit behind one mutex.
//! The sampling task only ever `try_lock`s it: when a configuration write
//! holds the lock, the tick is deferred by [`CONTENTION_RETRY`] instead of
//! blocking. Decisions are applied to the platform after the lock is
//! released, so slow transitions never stall configuration callers.
//!
//! # Lifecycle
//!
//! ```text
//! Controller::new ──enable()──▶ sampling task running
//!        ▲                            │
//!        └──────── disable() ◀────────┘  cancel + join, then restore
//! ```

use std::sync::{Arc, Mutex, MutexGuard, TryLockError};
use std::time::Duration;

use tokio::runtime::Handle;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::attr::{Tunable, UnitField};
use crate::config::{self, ControllerConfig};
use crate::engine::plan_tick;
use crate::error::{ConfigError, ConfigResult, ControllerResult};
use crate::platform::Platform;
use crate::pressure::QueuePressure;
use crate::reservation::{recompute_bring_up, recompute_take_down};
use crate::state::{ControllerState, Tuners};
use crate::types::{ANCHOR, Decision, DecisionVector, PoolStatus, PowerEvent, UnitId};

/// Delay before retrying a tick that found the controller lock held.
pub const CONTENTION_RETRY: Duration = Duration::from_millis(32);

/// Result of one tick.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TickOutcome {
    /// The controller lock was held; nothing was evaluated.
    Deferred,
    Completed(TickReport),
}

/// What a completed tick decided and applied.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TickReport {
    pub pressure: u32,
    /// Units successfully brought up.
    pub activated: Vec<UnitId>,
    /// Units successfully parked.
    pub deactivated: Vec<UnitId>,
    /// Units whose transition the platform refused.
    pub failed: Vec<UnitId>,
    pub next_delay: Duration,
}

struct Shared {
    platform: Arc<dyn Platform>,
    state: Mutex<ControllerState>,
    pressure: QueuePressure,
}

impl Shared {
    fn lock(&self) -> MutexGuard<'_, ControllerState> {
        self.state.lock().unwrap_or_else(|p| p.into_inner())
    }

    fn tick(&self) -> TickOutcome {
        let mut state = match self.state.try_lock() {
            Ok(guard) => guard,
            Err(TryLockError::Poisoned(p)) => p.into_inner(),
            Err(TryLockError::WouldBlock) => {
                debug!("controller busy, deferring tick");
                return TickOutcome::Deferred;
            }
        };

        let pressure = self.pressure.sample(self.platform.pending_work());
        state.last_pressure = pressure;
        let decisions = plan_tick(&mut state, self.platform.as_ref(), pressure);
        state.tuners.force_activation = false;
        let next_delay = Duration::from_millis(state.tuners.sampling_rate_ms as u64);
        drop(state);

        let (activated, deactivated, failed) = apply(self.platform.as_ref(), &decisions);
        TickOutcome::Completed(TickReport {
            pressure,
            activated,
            deactivated,
            failed,
            next_delay,
        })
    }
}

/// Apply a decision vector in ascending unit order.
fn apply(
    platform: &dyn Platform,
    decisions: &DecisionVector,
) -> (Vec<UnitId>, Vec<UnitId>, Vec<UnitId>) {
    let mut activated = Vec::new();
    let mut deactivated = Vec::new();
    let mut failed = Vec::new();

    for unit in 1..platform.pool_size() {
        let (result, done) = match decisions.get(unit) {
            Decision::Idle => continue,
            Decision::Activate => (platform.activate(unit), &mut activated),
            Decision::Deactivate => (platform.deactivate(unit), &mut deactivated),
        };
        match result {
            Ok(()) => done.push(unit),
            Err(e) => {
                warn!(unit, decision = ?decisions.get(unit), error = %e, "transition failed");
                failed.push(unit);
            }
        }
    }

    if !activated.is_empty() || !deactivated.is_empty() {
        info!(?activated, ?deactivated, "pool resized");
    }
    (activated, deactivated, failed)
}

/// Bring every parked unit back up.
fn restore_all(platform: &dyn Platform) {
    for unit in 1..platform.pool_size() {
        if platform.is_active(unit) {
            continue;
        }
        if let Err(e) = platform.activate(unit) {
            warn!(unit, error = %e, "failed to restore unit");
        }
    }
}

/// The periodic sampling loop. A tick always runs to completion; shutdown
/// is only observed between ticks.
async fn run_sampling_loop(
    shared: Arc<Shared>,
    first_delay: Duration,
    mut shutdown: watch::Receiver<bool>,
) {
    let mut delay = first_delay;
    debug!(delay_ms = delay.as_millis() as u64, "sampling loop starting");

    loop {
        tokio::select! {
            _ = tokio::time::sleep(delay) => {
                let tick_shared = shared.clone();
                delay = match tokio::task::spawn_blocking(move || tick_shared.tick()).await {
                    Ok(TickOutcome::Completed(report)) => report.next_delay,
                    Ok(TickOutcome::Deferred) => CONTENTION_RETRY,
                    Err(e) => {
                        error!(error = %e, "tick panicked");
                        CONTENTION_RETRY
                    }
                };
            }
            _ = shutdown.changed() => {
                debug!("sampling loop shutting down");
                break;
            }
        }
    }
}

struct SamplingTask {
    handle: JoinHandle<()>,
    shutdown_tx: watch::Sender<bool>,
}

/// Elasticity controller for one pool.
///
/// The owner holds the only handle; there is no global instance.
pub struct Controller {
    shared: Arc<Shared>,
    task: tokio::sync::Mutex<Option<SamplingTask>>,
}

impl Controller {
    /// Build a disabled controller. Topology is read from the platform once.
    pub fn new(platform: Arc<dyn Platform>, config: &ControllerConfig) -> ControllerResult<Self> {
        if platform.pool_size() == 0 {
            return Err(crate::error::ControllerError::EmptyPool);
        }
        let mut state = ControllerState::new(config, platform.as_ref())?;
        state.prime_load_samples(platform.as_ref());

        info!(
            pool_size = state.pool_size(),
            min_active = state.tuners.min_active,
            max_active = state.tuners.max_active,
            sampling_rate_ms = state.tuners.sampling_rate_ms,
            "controller initialized"
        );

        Ok(Self {
            shared: Arc::new(Shared {
                platform,
                state: Mutex::new(state),
                pressure: QueuePressure::new(),
            }),
            task: tokio::sync::Mutex::new(None),
        })
    }

    /// Build a controller and enable it if the config asks for it.
    pub async fn start(
        platform: Arc<dyn Platform>,
        config: &ControllerConfig,
    ) -> ControllerResult<Self> {
        let controller = Self::new(platform, config)?;
        if config.enabled {
            controller.enable().await?;
        }
        Ok(controller)
    }

    pub fn pool_size(&self) -> usize {
        self.shared.lock().pool_size()
    }

    pub fn is_enabled(&self) -> bool {
        self.shared.lock().tuners.enabled
    }

    /// Snapshot of the global tunables.
    pub fn tuners(&self) -> Tuners {
        self.shared.lock().tuners.clone()
    }

    pub fn status(&self) -> PoolStatus {
        self.shared.lock().status(self.shared.platform.as_ref())
    }

    /// Run one tick on the caller's thread.
    ///
    /// The sampling task does this on every interval; calling it directly
    /// is useful for stepping the controller deterministically.
    pub fn tick(&self) -> TickOutcome {
        self.shared.tick()
    }

    /// Start the sampling task. No-op if already running.
    ///
    /// Fails with `NoRuntime` outside a tokio runtime, leaving the
    /// controller disabled.
    pub async fn enable(&self) -> ControllerResult<()> {
        let mut task = self.task.lock().await;
        if task.is_some() {
            return Ok(());
        }
        let runtime =
            Handle::try_current().map_err(|_| crate::error::ControllerError::NoRuntime)?;

        let first_delay = {
            let mut state = self.shared.lock();
            state.tuners.suspended = false;
            state.tuners.force_activation = false;
            state.recompute_maps();
            state.prime_load_samples(self.shared.platform.as_ref());
            state.tuners.enabled = true;
            Duration::from_millis(state.tuners.sampling_rate_ms as u64)
        };
        self.shared.pressure.reset();

        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let handle = runtime.spawn(run_sampling_loop(
            self.shared.clone(),
            first_delay,
            shutdown_rx,
        ));
        *task = Some(SamplingTask {
            handle,
            shutdown_tx,
        });

        info!("controller enabled");
        Ok(())
    }

    /// Stop the sampling task and wait for it to finish, then bring every
    /// parked unit back up. No-op if not running.
    pub async fn disable(&self) -> ControllerResult<()> {
        let mut task = self.task.lock().await;
        let Some(slot) = task.take() else {
            return Ok(());
        };

        let _ = slot.shutdown_tx.send(true);
        let joined = slot.handle.await;

        {
            let mut state = self.shared.lock();
            state.tuners.enabled = false;
            state.tuners.suspended = false;
            state.tuners.force_activation = false;
        }

        let platform = self.shared.platform.clone();
        tokio::task::spawn_blocking(move || restore_all(platform.as_ref())).await?;

        info!("controller disabled");
        joined?;
        Ok(())
    }

    /// Enable or disable. Returns whether the state changed.
    pub async fn set_enabled(&self, enabled: bool) -> ControllerResult<bool> {
        if self.is_enabled() == enabled {
            return Ok(false);
        }
        if enabled {
            self.enable().await?;
        } else {
            self.disable().await?;
        }
        Ok(true)
    }

    /// Deliver a suspend/resume edge. Returns whether it was acted on.
    ///
    /// Ignored while the controller is disabled or suspend handling is off.
    pub fn notify(&self, event: PowerEvent) -> bool {
        let mut state = self.shared.lock();
        if !state.tuners.enabled || !state.tuners.suspend_enabled {
            debug!(?event, "power event ignored");
            return false;
        }

        match event {
            PowerEvent::Suspend => {
                state.tuners.suspended = true;
                let ceiling = state.tuners.max_active_suspended;
                recompute_bring_up(&mut state.units, ceiling);
            }
            PowerEvent::Resume => {
                state.tuners.suspended = false;
                state.tuners.force_activation = true;
                let ceiling = state.tuners.max_active;
                recompute_bring_up(&mut state.units, ceiling);
            }
        }
        info!(?event, ceiling = state.tuners.effective_max(), "power event handled");
        true
    }

    // ── Setters ────────────────────────────────────────────────────
    //
    // Each setter clamps its input, does nothing if the value is
    // unchanged, and returns whether anything changed.

    pub fn set_sampling_rate(&self, ms: u32) -> bool {
        let ms = config::clamp_sampling_rate(ms);
        self.update(Tunable::SamplingRate, ms as u64, |state| {
            replace(&mut state.tuners.sampling_rate_ms, ms)
        })
    }

    pub fn set_min_active(&self, n: usize) -> bool {
        self.update(Tunable::MinActive, n as u64, |state| {
            let n = config::clamp_count(n, state.pool_size());
            let changed = replace(&mut state.tuners.min_active, n);
            if changed {
                recompute_take_down(&mut state.units, n);
            }
            changed
        })
    }

    pub fn set_max_active(&self, n: usize) -> bool {
        self.update(Tunable::MaxActive, n as u64, |state| {
            let n = config::clamp_count(n, state.pool_size());
            let changed = replace(&mut state.tuners.max_active, n);
            if changed {
                let ceiling = state.tuners.effective_max();
                recompute_bring_up(&mut state.units, ceiling);
            }
            changed
        })
    }

    pub fn set_max_active_suspended(&self, n: usize) -> bool {
        self.update(Tunable::MaxActiveSuspended, n as u64, |state| {
            let n = config::clamp_count(n, state.pool_size());
            let changed = replace(&mut state.tuners.max_active_suspended, n);
            if changed && state.tuners.suspended {
                recompute_bring_up(&mut state.units, n);
            }
            changed
        })
    }

    pub fn set_io_is_busy(&self, busy: bool) -> bool {
        let platform = self.shared.platform.clone();
        self.update(Tunable::IoIsBusy, busy as u64, |state| {
            let changed = replace(&mut state.tuners.io_is_busy, busy);
            // Counters taken under the old accounting are not comparable.
            if changed && state.tuners.enabled {
                state.prime_load_samples(platform.as_ref());
            }
            changed
        })
    }

    pub fn set_min_efficiency_load(&self, load: u32) -> bool {
        let load = config::clamp_percent(load);
        self.update(Tunable::MinEfficiencyLoad, load as u64, |state| {
            replace(&mut state.tuners.min_efficiency_load, load)
        })
    }

    pub fn set_suspend_enabled(&self, enabled: bool) -> bool {
        self.update(Tunable::SuspendEnabled, enabled as u64, |state| {
            let changed = replace(&mut state.tuners.suspend_enabled, enabled);
            if changed && !enabled && state.tuners.suspended {
                state.tuners.suspended = false;
                let ceiling = state.tuners.max_active;
                recompute_bring_up(&mut state.units, ceiling);
            }
            changed
        })
    }

    pub fn set_unit_tunable(&self, unit: UnitId, field: UnitField, value: u32) -> ConfigResult<bool> {
        let tunable = Tunable::Unit { unit, field };
        let mut state = self.shared.lock();
        let pool_size = state.pool_size();
        if unit >= pool_size {
            return Err(ConfigError::UnitOutOfRange { unit, pool_size });
        }
        if unit == ANCHOR && field.is_down_side() {
            return Err(ConfigError::AnchorNotTunable {
                tunable: tunable.to_string(),
            });
        }

        let value = field.clamp(value);
        let changed = replace(field.slot(&mut state.units[unit].tunables), value);
        if changed {
            debug!(%tunable, value, "tunable updated");
        }
        Ok(changed)
    }

    /// Write a tunable by name from its string form.
    pub async fn store(&self, name: &str, value: &str) -> ControllerResult<bool> {
        let tunable: Tunable = name.parse()?;
        let v = tunable.parse_value(value)?;
        let changed = match tunable {
            Tunable::Enabled => self.set_enabled(v > 0).await?,
            Tunable::SamplingRate => self.set_sampling_rate(v),
            Tunable::MinActive => self.set_min_active(v as usize),
            Tunable::MaxActive => self.set_max_active(v as usize),
            Tunable::MaxActiveSuspended => self.set_max_active_suspended(v as usize),
            Tunable::IoIsBusy => self.set_io_is_busy(v > 0),
            Tunable::MinEfficiencyLoad => self.set_min_efficiency_load(v),
            Tunable::SuspendEnabled => self.set_suspend_enabled(v > 0),
            Tunable::Unit { unit, field } => self.set_unit_tunable(unit, field, v)?,
        };
        Ok(changed)
    }

    /// Read a tunable by name in its string form.
    pub fn show(&self, name: &str) -> ConfigResult<String> {
        let tunable: Tunable = name.parse()?;
        let state = self.shared.lock();
        let t = &state.tuners;
        let value = match tunable {
            Tunable::SamplingRate => t.sampling_rate_ms.to_string(),
            Tunable::Enabled => u8::from(t.enabled).to_string(),
            Tunable::MinActive => t.min_active.to_string(),
            Tunable::MaxActive => t.max_active.to_string(),
            Tunable::MaxActiveSuspended => t.max_active_suspended.to_string(),
            Tunable::IoIsBusy => u8::from(t.io_is_busy).to_string(),
            Tunable::MinEfficiencyLoad => t.min_efficiency_load.to_string(),
            Tunable::SuspendEnabled => u8::from(t.suspend_enabled).to_string(),
            Tunable::Unit { unit, field } => {
                let record = state.units.get(unit).ok_or(ConfigError::UnitOutOfRange {
                    unit,
                    pool_size: state.pool_size(),
                })?;
                field.get(&record.tunables).to_string()
            }
        };
        Ok(value)
    }

    fn update(
        &self,
        tunable: Tunable,
        requested: u64,
        f: impl FnOnce(&mut ControllerState) -> bool,
    ) -> bool {
        let mut state = self.shared.lock();
        let changed = f(&mut state);
        if changed {
            debug!(%tunable, requested, "tunable updated");
        }
        changed
    }
}

fn replace<T: PartialEq>(slot: &mut T, value: T) -> bool {
    if *slot == value {
        return false;
    }
    *slot = value;
    true
}
