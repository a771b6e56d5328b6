//! # Delta Farmer
//!
//! Multi-account delta-neutral trade cycling: one "main" account takes a
//! position and the remaining accounts take the offsetting side, so net
//! exposure stays near zero while each account builds organic-looking
//! volume.
//!
//! ## Architecture
//!
//! - `config`: Configuration management and validation
//! - `exchange`: Venue abstraction (`AccountClient`) and the paper-trading mock
//! - `strategy`: Sizing allocation, order execution, position monitoring, and
//!   the cycle controller
//! - `utils`: Shared utilities and decimal arithmetic

pub mod config;
pub mod exchange;
pub mod strategy;
pub mod utils;

pub use config::Config;
