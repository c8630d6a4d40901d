// 各交易所的响应解码与公共接口
pub mod binance;
pub mod gate;
pub mod okx;

pub use binance::BinanceSpecSource;
pub use gate::GateSpecSource;
