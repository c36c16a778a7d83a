//! Arbitration protocols for the dining philosophers resource-sharing problem.
//!
//! A ring of `R` workers ("philosophers") shares `R` mutually-exclusive resources
//! ("forks"). Worker `i` needs fork `i` and fork `(i + 1) % R` to eat. Two
//! interchangeable arbiters are provided:
//!
//! * [`probe::ProbeArbiter`] tries each fork without blocking, releases on partial
//!   acquisition and retries after a randomized backoff.
//! * [`state_vector::StateVectorArbiter`] keeps a shared state vector behind one
//!   mutex and grants the eating transition from a centralized admission test,
//!   waking the hungry worker through its private admission gate.
//!
//! Every worker runs on its own thread until the shared deadline and accumulates
//! how long it spent thinking, hungry and eating. The two arbiters account for the
//! hungry time differently (see [`timing::HungryAccounting`]).
//!
//! # Example
//!
//! ```rust,no_run
//! use std::{sync::Arc, time::Duration};
//!
//! use dining_arbiter::{Variant, config::SimulationConfig, simulation::Simulation, sink::MemorySink};
//!
//! let mut config = SimulationConfig::new();
//! config.workers(4).run_duration(Duration::from_millis(500)).seed(Some(7));
//!
//! let sink = Arc::new(MemorySink::new());
//! let simulation = Simulation::new(config, sink.clone()).unwrap();
//! let report = simulation.run(Variant::StateVector).unwrap();
//!
//! for worker in &report.workers {
//!     println!("{worker}");
//! }
//! ```

#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions)]

use serde::{Deserialize, Serialize};
use strum_macros::{AsRefStr, EnumString};

pub mod clock;
pub mod config;
pub mod fork;
pub mod interrupt;
pub mod probe;
pub mod report;
pub mod ring;
pub mod simulation;
pub mod sink;
pub mod state_vector;
pub mod table;
pub mod timing;

pub use ring::{ResourceId, WorkerId};

/// Which arbitration protocol drives the workers.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    EnumString,
    AsRefStr,
    strum_macros::Display,
)]
#[serde(rename_all = "kebab-case")]
#[strum(serialize_all = "kebab-case")]
pub enum Variant {
    /// Non-blocking fork probing with randomized backoff.
    ProbeAndBackoff,
    /// Shared state vector with a centralized admission test.
    StateVector,
}

impl Variant {
    /// Both variants, in the order the binary runs them.
    pub const ALL: [Self; 2] = [Self::ProbeAndBackoff, Self::StateVector];
}
