//! corepark-core: load-driven elasticity controller for a pool of
//! processing units.
//!
//! A periodic sampling task observes per-unit load, frequency and a
//! pool-wide queue pressure estimate, then decides which units to bring
//! up or park. Unit 0 (the anchor) is always active.
//!
//! # Architecture
//!
//! ```text
//!   Platform ──signals──▶ engine::plan_tick ──DecisionVector──▶ Platform
//!      ▲                      │      ▲
//!      │                      ▼      │
//!   SimPool /           ControllerState (one lock)
//!   SysfsPlatform        tuners · units · reservation maps
//!                             ▲
//!   Controller ── setters / store / notify / enable / disable
//! ```
//!
//! The [`Platform`] trait is the only seam to the outside world. The
//! [`sim::SimPool`] implementation drives tests and dry runs.

pub mod attr;
pub mod config;
pub mod controller;
pub mod engine;
pub mod error;
pub mod platform;
pub mod pressure;
pub mod reservation;
pub mod selector;
pub mod sim;
pub mod state;
pub mod types;
pub mod unit;

pub use attr::{Tunable, UnitField};
pub use config::{ControllerConfig, UnitOverride, UnitTunables};
pub use controller::{CONTENTION_RETRY, Controller, TickOutcome, TickReport};
pub use error::{ConfigError, ConfigResult, ControllerError, ControllerResult};
pub use platform::{Platform, derive_load};
pub use pressure::QueuePressure;
pub use types::*;
