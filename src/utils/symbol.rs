use crate::core::types::{ExchangeId, MarketType};

/// 统一写法的计价货币，只转换以它计价的交易对
const QUOTE: &str = "USDT";

/// 统一写法（BTCUSDT）转换为交易所写法
///
/// - Binance: BTCUSDT
/// - Gate: BTC_USDT
/// - OKX: BTC-USDT，永续合约加 -SWAP
///
/// 交割合约的日期后缀原样保留（BTCUSDT20251227 -> BTC_USDT20251227）。
/// 不是 "大写字母 + USDT" 形式的输入原样返回。
pub fn to_exchange_symbol(symbol: &str, exchange: ExchangeId, market_type: MarketType) -> String {
    let (separator, futures_suffix) = match exchange {
        ExchangeId::Binance => ("", ""),
        ExchangeId::Gate => ("_", ""),
        ExchangeId::Okx => ("-", "-SWAP"),
    };

    let Some(index) = symbol.find(QUOTE) else {
        return symbol.to_string();
    };
    let base = &symbol[..index];
    let suffix = &symbol[index + QUOTE.len()..];
    if base.is_empty() || base.len() > 10 || !base.chars().all(|c| c.is_ascii_uppercase()) {
        return symbol.to_string();
    }

    let mut formatted = format!("{}{}{}{}", base, separator, QUOTE, suffix);
    if market_type == MarketType::Futures && suffix.is_empty() {
        formatted.push_str(futures_suffix);
    }
    formatted
}
