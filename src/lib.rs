//! # Radar Health Monitor
//!
//! Real-time health monitoring for a radar made of ten independent units
//! (transmitter, receiver, antenna/servo, RF front-end, signal and data
//! processors, power, cooling, timing and network). Raw telemetry is turned
//! into a bounded health state, a 0-100 score, an active-fault ledger and
//! derived analytics.
//!
//! ## Features
//!
//! - **Per-unit health**: threshold policies with linear score penalties and a reentrancy-guarded state machine
//! - **Fault registry**: deduplicated active faults, bounded history, MTBF estimates
//! - **Ingestion pipeline**: schema validation, sanitizing, threshold scoring, bounded per-tick batches
//! - **Trend analysis**: least-squares trends, z-score anomalies, short-horizon prediction
//! - **Uptime tracking**: availability accounting with periodic history snapshots
//! - **Update throttling**: bursts of changes collapse into one recompute pass per window
//!
//! ## Quick Start
//!
//! ```rust
//! use radar_health::{HealthMonitor, HealthState, MonitorConfig};
//! use serde_json::json;
//!
//! let mut monitor = HealthMonitor::with_default_units(MonitorConfig::default(), 0).unwrap();
//! monitor.start(0);
//!
//! let reading = json!({"inputVoltage": 170.0}).as_object().cloned().unwrap();
//! monitor.submit_telemetry("PSU-001", reading, 0).unwrap();
//!
//! for now in (0..=100).step_by(10) {
//!     monitor.tick(now);
//! }
//! assert_eq!(monitor.health_snapshot("PSU-001").unwrap().state, HealthState::Fail);
//! ```
//!
//! ## Architecture
//!
//! - [`monitor`] - facade and tick loop
//! - [`health`] - per-unit state machine
//! - [`subsystems`] - unit threshold policies
//! - [`fault`] - fault registry
//! - [`pipeline`] - telemetry ingestion
//! - [`trend`] - trend and anomaly analysis
//! - [`uptime`] - availability accounting
//! - [`scheduler`] - throttle, debounce and delayed tasks
//! - [`fault_injection`] - scripted fault scenarios
//! - [`protocol`] - JSON line protocol used by the binaries

#![deny(clippy::all)]
#![deny(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::cast_possible_truncation)]
#![allow(clippy::cast_sign_loss)]
#![allow(clippy::cast_precision_loss)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::must_use_candidate)]

pub mod analytics;
pub mod config;
pub mod error;
pub mod events;
pub mod fault;
pub mod fault_injection;
pub mod health;
pub mod monitor;
pub mod pipeline;
pub mod protocol;
pub mod scheduler;
pub mod subsystems;
pub mod telemetry;
pub mod trend;
pub mod uptime;

// Re-export main public types for convenience
pub use config::MonitorConfig;
pub use error::{MonitorError, Result, ValidationError};
pub use events::MonitorEvent;
pub use fault::{FaultRecord, FaultRegistry, FaultSeverity};
pub use fault_injection::{FaultInjection, FaultInjector, Scenario};
pub use health::{HealthEngine, HealthSnapshot, HealthState};
pub use monitor::HealthMonitor;
pub use pipeline::DataPipeline;
pub use subsystems::UnitKind;
pub use telemetry::{TelemetryStore, TelemetryValue};
pub use trend::{TrendAnalyzer, TrendDirection, TrendResult};
pub use uptime::UptimeTracker;
