//! Trading strategy implementation.
//!
//! Contains the core logic for:
//! - Sizing allocation across accounts with randomized noise
//! - Order execution with limit-order fill chasing
//! - Position safety monitoring during the hold window
//! - Cycle orchestration and the supervisory loop

mod allocator;
mod cycle;
mod executor;
mod monitor;

pub use allocator::{random_partition, AllocationError, SizingAllocator, USD_TICK};
pub use cycle::CycleController;
pub use executor::{ExecutorConfig, LimitOutcome, OrderExecutor};
pub use monitor::PositionMonitor;
