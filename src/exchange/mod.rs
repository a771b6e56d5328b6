//! Venue interface: shared types, the `AccountClient` seam and the
//! in-memory mock used for paper trading and tests.

pub mod mock;
pub mod traits;
pub mod types;

pub use mock::MockAccountClient;
pub use traits::AccountClient;
pub use types::{
    AccountBalance, Order, OrderSide, OrderStatus, Position, Quote, TimeInForce,
};
