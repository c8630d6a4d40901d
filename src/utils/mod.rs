// 工具模块 - 通用工具函数
pub mod safe_macros;
pub mod symbol;
pub mod unified_logger;

pub use symbol::to_exchange_symbol;
pub use unified_logger::init_global_logger;
