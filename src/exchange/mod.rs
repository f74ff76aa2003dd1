//! Exchange abstraction layer.
//!
//! Defines the trait venue implementations must fulfil, the in-process
//! simulated venue, and the factory that builds clients from configuration.

mod factory;
mod simulated;
mod traits;

pub use factory::{ClientRegistry, ExchangeFactory};
pub use simulated::{SimulatedExchange, SimulatedSettings};
pub use traits::{
    Balance, BookStream, ExchangeClient, OrderFill, OrderId, OrderStatus, TimeInForce,
};
