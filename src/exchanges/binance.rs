use async_trait::async_trait;
use serde::Deserialize;
use serde_json::Value;

use crate::core::{
    config::ExchangeConfig,
    decimal,
    error::ExchangeError,
    exchange::{HttpBase, SpecSource},
    mapper::{self, de_opt_string, de_string, decode},
    types::*,
};

// ============= 交易规则 =============

#[derive(Deserialize)]
struct RawExchangeInfo {
    symbols: Vec<Value>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawSymbol {
    symbol: String,
    status: String,
    base_asset: String,
    quote_asset: String,
    base_asset_precision: u32,
    /// 现货字段
    #[serde(default)]
    quote_asset_precision: Option<u32>,
    /// 合约字段
    #[serde(default)]
    quote_precision: Option<u32>,
    filters: Vec<Value>,
}

/// 不参与下单校验的过滤器
const IGNORED_FILTERS: &[&str] = &[
    "PERCENT_PRICE",
    "PERCENT_PRICE_BY_SIDE",
    "ICEBERG_PARTS",
    "MARKET_LOT_SIZE",
    "MAX_NUM_ORDERS",
    "MAX_NUM_ALGO_ORDERS",
    "MAX_NUM_ICEBERG_ORDERS",
    "MAX_NUM_ORDER_AMENDS",
    "MAX_NUM_ORDER_LISTS",
    "MAX_POSITION",
    "TRAILING_DELTA",
    "EXCHANGE_MAX_NUM_ORDERS",
    "EXCHANGE_MAX_NUM_ALGO_ORDERS",
    "EXCHANGE_MAX_NUM_ICEBERG_ORDERS",
    "POSITION_RISK_CONTROL",
];

fn is_trading(status: &str) -> Result<bool> {
    match status {
        "TRADING" => Ok(true),
        // 现货
        "HALT" | "BREAK" | "END_OF_DAY" | "PRE_TRADING" | "POST_TRADING" | "AUCTION_MATCH" => {
            Ok(false)
        }
        // 合约
        "PENDING_TRADING" | "PRE_DELIVERING" | "DELIVERING" | "DELIVERED" | "PRE_SETTLE"
        | "SETTLING" | "CLOSE" => Ok(false),
        other => Err(ExchangeError::unrecognized("status", other)),
    }
}

fn filter_field(symbol: &str, filter: &Value, name: &str) -> Result<String> {
    match filter.get(name) {
        Some(Value::String(s)) => Ok(s.clone()),
        Some(Value::Number(n)) => Ok(n.to_string()),
        _ => Err(ExchangeError::MalformedSpec {
            symbol: symbol.to_string(),
            reason: format!("过滤器缺少字段 {}", name),
        }),
    }
}

/// 解码单个交易对的规则
pub fn decode_symbol_spec(market_type: MarketType, raw: &Value) -> Result<SymbolSpec> {
    let info: RawSymbol = decode("binance 交易对规则", raw)?;
    let symbol = info.symbol.as_str();

    let quote_precision = match market_type {
        MarketType::Spot => info.quote_asset_precision,
        MarketType::Futures => info.quote_precision,
    }
    .ok_or_else(|| ExchangeError::MalformedSpec {
        symbol: symbol.to_string(),
        reason: "缺少计价资产精度".to_string(),
    })?;

    let mut price_filter = None;
    let mut lot_size = None;
    let mut min_notional = "0".to_string();

    // 解析过滤器
    for filter in &info.filters {
        let filter_type = filter
            .get("filterType")
            .and_then(|v| v.as_str())
            .ok_or_else(|| ExchangeError::MalformedSpec {
                symbol: symbol.to_string(),
                reason: "过滤器缺少 filterType".to_string(),
            })?;

        match filter_type {
            "PRICE_FILTER" => {
                price_filter = Some((
                    filter_field(symbol, filter, "minPrice")?,
                    filter_field(symbol, filter, "maxPrice")?,
                    filter_field(symbol, filter, "tickSize")?,
                ))
            }
            "LOT_SIZE" => {
                lot_size = Some((
                    filter_field(symbol, filter, "minQty")?,
                    filter_field(symbol, filter, "maxQty")?,
                    filter_field(symbol, filter, "stepSize")?,
                ))
            }
            "MIN_NOTIONAL" => {
                // 合约的字段名是 notional
                let field = match market_type {
                    MarketType::Spot => "minNotional",
                    MarketType::Futures => "notional",
                };
                min_notional = filter_field(symbol, filter, field)?;
            }
            "NOTIONAL" => min_notional = filter_field(symbol, filter, "minNotional")?,
            other if IGNORED_FILTERS.contains(&other) => {}
            other => return Err(ExchangeError::unrecognized("filterType", other)),
        }
    }

    let missing = |name: &str| ExchangeError::MalformedSpec {
        symbol: symbol.to_string(),
        reason: format!("缺少 {} 过滤器", name),
    };
    let (min_price, max_price, tick_size) = price_filter.ok_or_else(|| missing("PRICE_FILTER"))?;
    let (min_qty, max_qty, step_size) = lot_size.ok_or_else(|| missing("LOT_SIZE"))?;

    let spec = SymbolSpec {
        symbol: info.symbol.clone(),
        base_asset: info.base_asset,
        quote_asset: info.quote_asset,
        base_precision: info.base_asset_precision,
        quote_precision,
        min_qty,
        max_qty,
        step_size,
        min_price,
        max_price,
        tick_size,
        min_notional,
        trading_enabled: is_trading(&info.status)?,
        contract: None,
    };
    spec.validate()?;
    Ok(spec)
}

/// 解码 exchangeInfo，无法解析的交易对跳过并告警
pub fn decode_symbol_specs(market_type: MarketType, raw: &Value) -> Result<Vec<SymbolSpec>> {
    let info: RawExchangeInfo = decode("binance exchangeInfo", raw)?;
    let mut specs = Vec::with_capacity(info.symbols.len());

    for symbol in &info.symbols {
        let name = symbol.get("symbol").and_then(|v| v.as_str()).unwrap_or("?");
        // 交割合约带下划线，只保留永续
        if market_type == MarketType::Futures && name.contains('_') {
            log::debug!("跳过交割合约: {}", name);
            continue;
        }
        match decode_symbol_spec(market_type, symbol) {
            Ok(spec) => specs.push(spec),
            Err(e) => log::warn!("跳过无法解析的交易对 {}: {}", name, e),
        }
    }
    Ok(specs)
}

// ============= 订单 =============

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawOrder {
    symbol: String,
    #[serde(deserialize_with = "de_string")]
    order_id: String,
    price: String,
    orig_qty: String,
    executed_qty: String,
    /// 现货 cummulativeQuoteQty，合约 cumQuote
    #[serde(
        default,
        alias = "cumQuote",
        deserialize_with = "de_opt_string"
    )]
    cummulative_quote_qty: Option<String>,
    status: String,
    #[serde(default)]
    time_in_force: Option<String>,
    #[serde(rename = "type")]
    order_type: String,
    side: String,
    #[serde(default)]
    time: Option<i64>,
    #[serde(default)]
    transact_time: Option<i64>,
    #[serde(default)]
    update_time: Option<i64>,
    #[serde(default)]
    fills: Vec<RawOrderFill>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawOrderFill {
    price: String,
    qty: String,
    commission: String,
    commission_asset: String,
    #[serde(deserialize_with = "de_string")]
    trade_id: String,
}

fn parse_status(status: &str) -> Result<OrderStatus> {
    match status {
        "PENDING_NEW" => Ok(OrderStatus::New),
        "EXPIRED_IN_MATCH" => Ok(OrderStatus::Expired),
        other => other.parse(),
    }
}

/// LIMIT_MAKER 视为只做挂单的限价单
fn parse_order_type(order_type: &str) -> Result<(OrderType, Option<TimeInForce>)> {
    match order_type {
        "LIMIT_MAKER" => Ok((OrderType::Limit, Some(TimeInForce::GTX))),
        other => Ok((other.parse()?, None)),
    }
}

fn quote_of(field: &str, price: &str, qty: &str) -> Result<String> {
    let value = decimal::checked_mul(
        field,
        decimal::parse_decimal("price", price)?,
        decimal::parse_decimal("qty", qty)?,
    )?;
    Ok(value.normalize().to_string())
}

/// 订单响应转换为规范订单，附带响应里的成交明细
pub fn map_order(market_type: MarketType, raw: &Value) -> Result<(Order, Vec<Fill>)> {
    let response: RawOrder = decode("binance 订单", raw)?;

    let (order_type, forced_tif) = parse_order_type(&response.order_type)?;
    let time_in_force = match (forced_tif, response.time_in_force.as_deref()) {
        (Some(tif), _) => tif,
        (None, Some(tif)) => tif.parse()?,
        (None, None) => TimeInForce::GTC,
    };

    let create_ms = response
        .time
        .or(response.transact_time)
        .or(response.update_time)
        .ok_or_else(|| ExchangeError::ValidationError {
            field: "time".to_string(),
            reason: format!("订单 {} 缺少时间戳", response.order_id),
        })?;
    let update_ms = response
        .update_time
        .or(response.transact_time)
        .unwrap_or(create_ms);
    let create_time = mapper::millis_to_time("time", create_ms)?;
    let update_time = mapper::millis_to_time("updateTime", update_ms)?;

    let side: OrderSide = response.side.parse()?;
    let fills = response
        .fills
        .iter()
        .map(|f| {
            Ok(Fill {
                trade_id: f.trade_id.clone(),
                order_id: response.order_id.clone(),
                symbol: response.symbol.clone(),
                price: f.price.clone(),
                quantity: f.qty.clone(),
                quote_quantity: quote_of("quote_quantity", &f.price, &f.qty)?,
                commission: f.commission.clone(),
                commission_asset: f.commission_asset.clone(),
                is_buyer: side == OrderSide::Buy,
                time: update_time,
            })
        })
        .collect::<Result<Vec<_>>>()?;

    log::debug!(
        "binance {} 订单 {} 状态 {}",
        market_type,
        response.order_id,
        response.status
    );

    let order = Order {
        order_id: response.order_id,
        symbol: response.symbol,
        side,
        order_type,
        status: parse_status(&response.status)?,
        price: response.price,
        quantity: response.orig_qty,
        executed_quantity: response.executed_qty,
        actual_quantity: None,
        quote_quantity: response
            .cummulative_quote_qty
            .unwrap_or_else(|| "0".to_string()),
        time_in_force,
        create_time,
        update_time,
    };
    Ok((order, fills))
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawTrade {
    symbol: String,
    #[serde(deserialize_with = "de_string")]
    id: String,
    #[serde(deserialize_with = "de_string")]
    order_id: String,
    price: String,
    qty: String,
    quote_qty: String,
    commission: String,
    commission_asset: String,
    time: i64,
    /// 现货 isBuyer，合约 buyer
    #[serde(alias = "buyer")]
    is_buyer: bool,
}

/// 成交记录（现货 myTrades，合约 userTrades）
pub fn map_fills(raw: &Value) -> Result<Vec<Fill>> {
    let trades: Vec<RawTrade> = decode("binance 成交记录", raw)?;
    trades
        .into_iter()
        .map(|t| {
            Ok(Fill {
                time: mapper::millis_to_time("time", t.time)?,
                trade_id: t.id,
                order_id: t.order_id,
                symbol: t.symbol,
                price: t.price,
                quantity: t.qty,
                quote_quantity: t.quote_qty,
                commission: t.commission,
                commission_asset: t.commission_asset,
                is_buyer: t.is_buyer,
            })
        })
        .collect()
}

// ============= 持仓与余额 =============

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawPosition {
    symbol: String,
    position_amt: String,
    entry_price: String,
    mark_price: String,
    un_realized_profit: String,
    liquidation_price: String,
    #[serde(deserialize_with = "de_string")]
    leverage: String,
    margin_type: String,
    #[serde(default)]
    isolated_margin: Option<String>,
    position_side: String,
    #[serde(default)]
    notional: Option<String>,
}

fn parse_margin_type(margin_type: &str) -> Result<MarginType> {
    match margin_type.to_lowercase().as_str() {
        "isolated" => Ok(MarginType::Isolated),
        "cross" | "crossed" => Ok(MarginType::Crossed),
        _ => Err(ExchangeError::unrecognized("marginType", margin_type)),
    }
}

/// 持仓风险，单向持仓按数量符号判断方向，数量为 0 的跳过
pub fn map_positions(raw: &Value) -> Result<Vec<PositionRisk>> {
    let positions: Vec<RawPosition> = decode("binance 持仓", raw)?;
    let mut result = Vec::new();

    for p in positions {
        if decimal::parse_or_zero("positionAmt", &p.position_amt)?.is_zero() {
            continue;
        }
        let (negative, amount) = mapper::split_sign("positionAmt", &p.position_amt)?;
        let position_side = match p.position_side.as_str() {
            "LONG" => PositionSide::Long,
            "SHORT" => PositionSide::Short,
            "BOTH" if negative => PositionSide::Short,
            "BOTH" => PositionSide::Long,
            other => return Err(ExchangeError::unrecognized("positionSide", other)),
        };

        result.push(PositionRisk {
            symbol: p.symbol,
            position_side,
            position_amt: amount,
            entry_price: p.entry_price,
            mark_price: p.mark_price,
            unrealized_profit: p.un_realized_profit,
            leverage: p.leverage,
            liquidation_price: p.liquidation_price,
            margin_type: parse_margin_type(&p.margin_type)?,
            isolated_margin: p.isolated_margin.unwrap_or_else(|| "0".to_string()),
            notional: p.notional.unwrap_or_else(|| "0".to_string()),
        });
    }
    Ok(result)
}

#[derive(Deserialize)]
struct RawSpotAccount {
    balances: Vec<RawSpotBalance>,
}

#[derive(Deserialize)]
struct RawSpotBalance {
    asset: String,
    free: String,
    locked: String,
}

#[derive(Deserialize)]
struct RawFuturesAccount {
    assets: Vec<RawFuturesAsset>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawFuturesAsset {
    asset: String,
    available_balance: String,
    open_order_initial_margin: String,
}

/// 账户余额，合约以挂单占用保证金作为冻结部分
pub fn map_balances(market_type: MarketType, raw: &Value) -> Result<Vec<Balance>> {
    let entries: Vec<(String, String, String)> = match market_type {
        MarketType::Spot => decode::<RawSpotAccount>("binance 现货账户", raw)?
            .balances
            .into_iter()
            .map(|b| (b.asset, b.free, b.locked))
            .collect(),
        MarketType::Futures => decode::<RawFuturesAccount>("binance 合约账户", raw)?
            .assets
            .into_iter()
            .map(|a| (a.asset, a.available_balance, a.open_order_initial_margin))
            .collect(),
    };

    let mut balances = Vec::new();
    for (asset, free, locked) in entries {
        if mapper::is_empty_balance(&free, &locked)? {
            continue;
        }
        balances.push(mapper::make_balance(&asset, &free, &locked)?);
    }
    Ok(balances)
}

// ============= 行情 =============

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawTicker {
    symbol: String,
    price_change: String,
    price_change_percent: String,
    weighted_avg_price: String,
    last_price: String,
    last_qty: String,
    open_price: String,
    high_price: String,
    low_price: String,
    volume: String,
    quote_volume: String,
    count: i64,
}

/// 24小时行情，单个交易对的响应是对象，全部交易对是数组
pub fn map_tickers(raw: &Value) -> Result<Tickers> {
    let items: Vec<RawTicker> = match raw {
        Value::Array(_) => decode("binance 行情", raw)?,
        _ => vec![decode("binance 行情", raw)?],
    };

    Ok(Tickers {
        tickers: items
            .into_iter()
            .map(|t| Ticker {
                symbol: t.symbol,
                price_change: t.price_change,
                price_change_percent: t.price_change_percent,
                weighted_avg_price: t.weighted_avg_price,
                last_price: t.last_price,
                last_qty: t.last_qty,
                open_price: t.open_price,
                high_price: t.high_price,
                low_price: t.low_price,
                volume: t.volume,
                quote_volume: t.quote_volume,
                count: t.count,
            })
            .collect(),
    })
}

// ============= 公共接口 =============

/// Binance 公共接口：交易规则和行情
pub struct BinanceSpecSource {
    base: HttpBase,
}

impl BinanceSpecSource {
    pub fn new(config: &ExchangeConfig) -> Result<Self> {
        Ok(Self {
            base: HttpBase::new(config)?,
        })
    }

    /// 24小时行情，不指定交易对时返回全部
    pub async fn fetch_tickers(&self, market_type: MarketType, symbol: Option<&str>) -> Result<Tickers> {
        let path = match market_type {
            MarketType::Spot => "/api/v3/ticker/24hr",
            MarketType::Futures => "/fapi/v1/ticker/24hr",
        };
        let mut url = format!("{}{}", self.base.base_url(market_type), path);
        if let Some(symbol) = symbol {
            url.push_str(&format!("?symbol={}", symbol));
        }
        let raw = self.base.get_json(&url).await?;
        map_tickers(&raw)
    }
}

#[async_trait]
impl SpecSource for BinanceSpecSource {
    fn exchange(&self) -> ExchangeId {
        ExchangeId::Binance
    }

    async fn fetch_all_symbol_specs(&self, market_type: MarketType) -> Result<Vec<SymbolSpec>> {
        let path = match market_type {
            MarketType::Spot => "/api/v3/exchangeInfo",
            MarketType::Futures => "/fapi/v1/exchangeInfo",
        };
        let url = format!("{}{}", self.base.base_url(market_type), path);
        let raw = self.base.get_json(&url).await?;
        decode_symbol_specs(market_type, &raw)
    }
}
