pub mod core;
pub mod exchanges;
pub mod utils;

pub use crate::core::config::{AppConfig, ExchangeConfig};
pub use crate::core::error::ExchangeError;
pub use crate::core::exchange::{ExchangeAdapter, OrderTransport, SpecSource};
pub use crate::core::spec_cache::SpecCache;
pub use crate::core::types::*;
