// 核心模块 - 十进制运算、交易规则、下单校验与规范映射
pub mod config;
pub mod decimal;
pub mod error;
pub mod exchange;
pub mod filter;
pub mod mapper;
pub mod spec_cache;
pub mod types;

pub use error::{ErrorSeverity, ExchangeError};
pub use filter::{normalize_quantity_and_price, NormalizedOrder};
pub use spec_cache::{Clock, SpecCache, SystemClock};
