//! Market Sentinel
//!
//! News-driven risk escalation for a daily equity forecasting pipeline.
//!
//! ## Architecture
//!
//! ```text
//! News feed → Classifier → Escalation Tracker → Mode Store (NORMAL / L3_WARNING / L4_ACTIVE)
//!                                                   │            ↑
//!                                                   ↓            │
//!                          Gate → Forecast / Explorer jobs     Sweep → Recovery reports
//!                                                   ↑
//!                          Performance review (hit-rate trend) ┘
//! ```

pub mod classifier;
pub mod client;
pub mod config;
pub mod error;
pub mod escalation;
pub mod gate;
pub mod jobs;
pub mod ml;
pub mod mode;
pub mod notify;
pub mod recovery;
pub mod storage;
pub mod types;

#[cfg(test)]
mod config_tests;
