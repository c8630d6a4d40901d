use async_trait::async_trait;
use rust_decimal::prelude::*;
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

/// 合约结算货币的精度
const SETTLE_PRECISION: u32 = 8;

/// 10^-precision 的十进制字符串，如 4 -> "0.0001"
fn step_from_precision(precision: u32) -> String {
    Decimal::new(1, precision).to_string()
}

/// 毫秒时间戳，允许带小数，如 "1646123456789.123"
fn millis_str_to_time(field: &str, value: &str) -> Result<chrono::DateTime<chrono::Utc>> {
    let ms = decimal::parse_decimal(field, value)?
        .trunc()
        .to_i64()
        .ok_or_else(|| ExchangeError::invalid_decimal(field, value))?;
    mapper::millis_to_time(field, ms)
}

fn parse_side(side: &str) -> Result<OrderSide> {
    match side {
        "buy" => Ok(OrderSide::Buy),
        "sell" => Ok(OrderSide::Sell),
        other => Err(ExchangeError::unrecognized("side", other)),
    }
}

fn parse_tif(tif: &str) -> Result<TimeInForce> {
    match tif {
        "gtc" => Ok(TimeInForce::GTC),
        "ioc" => Ok(TimeInForce::IOC),
        "poc" => Ok(TimeInForce::GTX),
        "fok" => Ok(TimeInForce::FOK),
        other => Err(ExchangeError::unrecognized("time_in_force", other)),
    }
}

/// 合约名称 BTC_USDT 拆分为 (BTC, USDT)
fn split_contract(name: &str) -> Result<(String, String)> {
    name.rsplit_once('_')
        .map(|(base, quote)| (base.to_string(), quote.to_string()))
        .ok_or_else(|| ExchangeError::MalformedSpec {
            symbol: name.to_string(),
            reason: "合约名称缺少下划线".to_string(),
        })
}

// ============= 交易规则 =============

#[derive(Deserialize)]
struct RawCurrencyPair {
    id: String,
    base: String,
    quote: String,
    #[serde(default, deserialize_with = "de_opt_string")]
    min_base_amount: Option<String>,
    #[serde(default, deserialize_with = "de_opt_string")]
    min_quote_amount: Option<String>,
    #[serde(default, deserialize_with = "de_opt_string")]
    max_base_amount: Option<String>,
    amount_precision: u32,
    precision: u32,
    trade_status: String,
}

#[derive(Deserialize)]
struct RawContract {
    name: String,
    #[serde(deserialize_with = "de_string")]
    quanto_multiplier: String,
    #[serde(deserialize_with = "de_string")]
    order_price_round: String,
    order_size_min: i64,
    order_size_max: i64,
    #[serde(default)]
    in_delisting: bool,
    #[serde(default)]
    status: Option<String>,
}

fn decode_currency_pair(raw: &Value) -> Result<SymbolSpec> {
    let pair: RawCurrencyPair = decode("gate 现货交易对", raw)?;

    // buyable/sellable 只允许单边交易，按不可交易处理
    let trading_enabled = match pair.trade_status.as_str() {
        "tradable" => true,
        "untradable" | "buyable" | "sellable" => false,
        other => return Err(ExchangeError::unrecognized("trade_status", other)),
    };

    let spec = SymbolSpec {
        symbol: pair.id,
        base_asset: pair.base,
        quote_asset: pair.quote,
        base_precision: pair.amount_precision,
        quote_precision: pair.precision,
        min_qty: pair.min_base_amount.unwrap_or_else(|| "0".to_string()),
        max_qty: pair.max_base_amount.unwrap_or_else(|| "0".to_string()),
        step_size: step_from_precision(pair.amount_precision),
        min_price: "0".to_string(),
        max_price: "0".to_string(),
        tick_size: step_from_precision(pair.precision),
        min_notional: pair.min_quote_amount.unwrap_or_else(|| "0".to_string()),
        trading_enabled,
        contract: None,
    };
    spec.validate()?;
    Ok(spec)
}

fn decode_contract(raw: &Value) -> Result<SymbolSpec> {
    let contract: RawContract = decode("gate 合约", raw)?;
    let (base_asset, quote_asset) = split_contract(&contract.name)?;

    let trading_enabled = match contract.status.as_deref() {
        None | Some("trading") => !contract.in_delisting,
        Some("prelaunch") | Some("delisting") | Some("delisted") => false,
        Some(other) => return Err(ExchangeError::unrecognized("status", other)),
    };

    let spec = SymbolSpec {
        symbol: contract.name,
        base_asset,
        quote_asset,
        // 数量单位为整数张
        base_precision: 0,
        quote_precision: SETTLE_PRECISION,
        min_qty: contract.order_size_min.to_string(),
        max_qty: contract.order_size_max.to_string(),
        step_size: "1".to_string(),
        min_price: "0".to_string(),
        max_price: "0".to_string(),
        tick_size: contract.order_price_round,
        min_notional: "0".to_string(),
        trading_enabled,
        contract: Some(ContractSpec {
            quanto_multiplier: contract.quanto_multiplier,
            order_size_min: contract.order_size_min,
            order_size_max: contract.order_size_max,
        }),
    };
    spec.validate()?;
    Ok(spec)
}

/// 解码单个交易对或合约的规则
pub fn decode_symbol_spec(market_type: MarketType, raw: &Value) -> Result<SymbolSpec> {
    match market_type {
        MarketType::Spot => decode_currency_pair(raw),
        MarketType::Futures => decode_contract(raw),
    }
}

/// 解码交易对列表，无法解析的条目跳过并告警
pub fn decode_symbol_specs(market_type: MarketType, raw: &Value) -> Result<Vec<SymbolSpec>> {
    let items: Vec<Value> = decode("gate 交易规则列表", raw)?;
    let mut specs = Vec::with_capacity(items.len());

    for item in &items {
        match decode_symbol_spec(market_type, item) {
            Ok(spec) => specs.push(spec),
            Err(e) => {
                let name = item
                    .get("id")
                    .or_else(|| item.get("name"))
                    .and_then(|v| v.as_str())
                    .unwrap_or("?");
                log::warn!("跳过无法解析的交易对 {}: {}", name, e);
            }
        }
    }
    Ok(specs)
}

// ============= 订单 =============

#[derive(Deserialize)]
struct RawSpotOrder {
    id: String,
    currency_pair: String,
    #[serde(rename = "type")]
    order_type: String,
    side: String,
    amount: String,
    #[serde(default)]
    price: Option<String>,
    time_in_force: String,
    filled_amount: String,
    filled_total: String,
    #[serde(default)]
    fee: Option<String>,
    #[serde(default)]
    fee_currency: Option<String>,
    status: String,
    #[serde(default)]
    finish_as: Option<String>,
    #[serde(deserialize_with = "de_string")]
    create_time_ms: String,
    #[serde(deserialize_with = "de_string")]
    update_time_ms: String,
}

#[derive(Deserialize)]
struct RawFuturesOrder {
    #[serde(deserialize_with = "de_string")]
    id: String,
    contract: String,
    size: i64,
    left: i64,
    price: String,
    #[serde(default)]
    fill_price: Option<String>,
    tif: String,
    status: String,
    #[serde(default)]
    finish_as: Option<String>,
    #[serde(deserialize_with = "de_string")]
    create_time: String,
    #[serde(default, deserialize_with = "de_opt_string")]
    finish_time: Option<String>,
}

fn open_status(executed_is_zero: bool) -> OrderStatus {
    if executed_is_zero {
        OrderStatus::New
    } else {
        OrderStatus::PartiallyFilled
    }
}

fn spot_status(order: &RawSpotOrder, executed_is_zero: bool) -> Result<OrderStatus> {
    match order.finish_as.as_deref() {
        Some("open") => Ok(open_status(executed_is_zero)),
        Some("filled") => Ok(OrderStatus::Filled),
        Some("cancelled") | Some("liquidate_cancelled") => Ok(OrderStatus::Canceled),
        Some("small") | Some("depth_not_enough") | Some("trader_not_enough") => {
            Ok(OrderStatus::Rejected)
        }
        Some("ioc") | Some("poc") | Some("fok") | Some("stp") => Ok(OrderStatus::Expired),
        Some(other) => Err(ExchangeError::unrecognized("finish_as", other)),
        None => match order.status.as_str() {
            "open" => Ok(open_status(executed_is_zero)),
            "closed" => Ok(OrderStatus::Filled),
            "cancelled" => Ok(OrderStatus::Canceled),
            other => Err(ExchangeError::unrecognized("status", other)),
        },
    }
}

fn futures_status(order: &RawFuturesOrder, executed_is_zero: bool) -> Result<OrderStatus> {
    match (order.status.as_str(), order.finish_as.as_deref()) {
        ("open", _) | (_, Some("_new")) | (_, Some("_update")) => {
            Ok(open_status(executed_is_zero))
        }
        ("finished", Some("filled")) => Ok(OrderStatus::Filled),
        (
            "finished",
            Some("cancelled") | Some("liquidated") | Some("auto_deleveraged")
            | Some("reduce_only") | Some("position_closed") | Some("reduce_out"),
        ) => Ok(OrderStatus::Canceled),
        ("finished", Some("ioc") | Some("stp")) => Ok(OrderStatus::Expired),
        // 没能挂上的订单
        ("finished", Some("small") | Some("depth_not_enough") | Some("trader_not_enough")) => {
            Ok(OrderStatus::Rejected)
        }
        ("finished", Some(other)) => Err(ExchangeError::unrecognized("finish_as", other)),
        (other, _) => Err(ExchangeError::unrecognized("status", other)),
    }
}

fn map_spot_order(raw: &Value) -> Result<(Order, Vec<Fill>)> {
    let order: RawSpotOrder = decode("gate 现货订单", raw)?;

    let side = parse_side(&order.side)?;
    let order_type = match order.order_type.as_str() {
        "limit" => OrderType::Limit,
        "market" => OrderType::Market,
        other => return Err(ExchangeError::unrecognized("type", other)),
    };
    let executed_is_zero = decimal::parse_or_zero("filled_amount", &order.filled_amount)?.is_zero();
    let status = spot_status(&order, executed_is_zero)?;
    let create_time = millis_str_to_time("create_time_ms", &order.create_time_ms)?;
    let update_time = millis_str_to_time("update_time_ms", &order.update_time_ms)?;

    // 市价买单的 amount 以计价货币计，数量只能取已成交数量
    let quantity = match (order_type, side) {
        (OrderType::Market, OrderSide::Buy) => order.filled_amount.clone(),
        _ => order.amount.clone(),
    };

    // 订单自带的手续费作为一条汇总成交
    let fills = match (&order.fee, &order.fee_currency) {
        (Some(fee), Some(currency)) if !executed_is_zero && !currency.is_empty() => vec![Fill {
            trade_id: String::new(),
            order_id: order.id.clone(),
            symbol: order.currency_pair.clone(),
            price: order.price.clone().unwrap_or_else(|| "0".to_string()),
            quantity: order.filled_amount.clone(),
            quote_quantity: order.filled_total.clone(),
            commission: fee.clone(),
            commission_asset: currency.clone(),
            is_buyer: side == OrderSide::Buy,
            time: update_time,
        }],
        _ => Vec::new(),
    };

    let mapped = Order {
        order_id: order.id,
        symbol: order.currency_pair,
        side,
        order_type,
        status,
        price: order.price.unwrap_or_else(|| "0".to_string()),
        quantity,
        executed_quantity: order.filled_amount,
        actual_quantity: None,
        quote_quantity: order.filled_total,
        time_in_force: parse_tif(&order.time_in_force)?,
        create_time,
        update_time,
    };
    Ok((mapped, fills))
}

fn map_futures_order(raw: &Value, spec: Option<&SymbolSpec>) -> Result<(Order, Vec<Fill>)> {
    let order: RawFuturesOrder = decode("gate 合约订单", raw)?;

    // 张数带符号，正数买入，负数卖出
    let side = if order.size < 0 {
        OrderSide::Sell
    } else {
        OrderSide::Buy
    };
    let quantity = order.size.unsigned_abs();
    let left = order.left.unsigned_abs();
    let executed = quantity.checked_sub(left).ok_or_else(|| ExchangeError::ValidationError {
        field: "left".to_string(),
        reason: format!("订单 {} 剩余张数 {} 大于委托张数 {}", order.id, left, quantity),
    })?;
    let status = futures_status(&order, executed == 0)?;

    let fill_price = order.fill_price.clone().unwrap_or_else(|| "0".to_string());
    let is_market = decimal::parse_or_zero("price", &order.price)?.is_zero();
    let (order_type, price) = if is_market {
        (OrderType::Market, fill_price.clone())
    } else {
        (OrderType::Limit, order.price.clone())
    };

    // 成交金额 = 成交均价 * 成交张数 * 合约乘数
    let quote_quantity = match spec.and_then(|s| s.contract.as_ref()) {
        Some(contract) => {
            let value = decimal::checked_mul(
                "quote_quantity",
                decimal::parse_or_zero("fill_price", &fill_price)?,
                Decimal::from(executed),
            )?;
            let value = decimal::checked_mul(
                "quote_quantity",
                value,
                decimal::parse_decimal("quanto_multiplier", &contract.quanto_multiplier)?,
            )?;
            value.normalize().to_string()
        }
        None => "0".to_string(),
    };

    let create_time = mapper::seconds_to_time("create_time", &order.create_time)?;
    let update_time = match &order.finish_time {
        Some(t) => mapper::seconds_to_time("finish_time", t)?,
        None => create_time,
    };

    let mapped = Order {
        order_id: order.id,
        symbol: order.contract,
        side,
        order_type,
        status,
        price,
        quantity: quantity.to_string(),
        executed_quantity: executed.to_string(),
        actual_quantity: None,
        quote_quantity,
        time_in_force: parse_tif(&order.tif)?,
        create_time,
        update_time,
    };
    Ok((mapped, Vec::new()))
}

/// 订单响应转换为规范订单，合约订单需要规则才能计算成交金额
pub fn map_order(
    market_type: MarketType,
    raw: &Value,
    spec: Option<&SymbolSpec>,
) -> Result<(Order, Vec<Fill>)> {
    match market_type {
        MarketType::Spot => map_spot_order(raw),
        MarketType::Futures => map_futures_order(raw, spec),
    }
}

#[derive(Deserialize)]
struct RawSpotTrade {
    #[serde(deserialize_with = "de_string")]
    id: String,
    #[serde(deserialize_with = "de_string")]
    create_time_ms: String,
    currency_pair: String,
    side: String,
    amount: String,
    price: String,
    #[serde(deserialize_with = "de_string")]
    order_id: String,
    fee: String,
    fee_currency: String,
}

#[derive(Deserialize)]
struct RawFuturesTrade {
    #[serde(deserialize_with = "de_string")]
    id: String,
    #[serde(deserialize_with = "de_string")]
    create_time: String,
    contract: String,
    #[serde(deserialize_with = "de_string")]
    order_id: String,
    size: i64,
    price: String,
    #[serde(default, deserialize_with = "de_opt_string")]
    fee: Option<String>,
}

/// 成交记录。合约成交以张数计，成交金额需要合约乘数，这里记为 0
pub fn map_fills(market_type: MarketType, raw: &Value) -> Result<Vec<Fill>> {
    match market_type {
        MarketType::Spot => {
            let trades: Vec<RawSpotTrade> = decode("gate 现货成交", raw)?;
            trades
                .into_iter()
                .map(|t| {
                    let quote = decimal::checked_mul(
                        "quote_quantity",
                        decimal::parse_decimal("price", &t.price)?,
                        decimal::parse_decimal("amount", &t.amount)?,
                    )?;
                    Ok(Fill {
                        time: millis_str_to_time("create_time_ms", &t.create_time_ms)?,
                        is_buyer: parse_side(&t.side)? == OrderSide::Buy,
                        trade_id: t.id,
                        order_id: t.order_id,
                        symbol: t.currency_pair,
                        price: t.price,
                        quantity: t.amount,
                        quote_quantity: quote.normalize().to_string(),
                        commission: t.fee,
                        commission_asset: t.fee_currency,
                    })
                })
                .collect()
        }
        MarketType::Futures => {
            let trades: Vec<RawFuturesTrade> = decode("gate 合约成交", raw)?;
            trades
                .into_iter()
                .map(|t| {
                    let (_, settle) = split_contract(&t.contract)?;
                    Ok(Fill {
                        time: mapper::seconds_to_time("create_time", &t.create_time)?,
                        is_buyer: t.size > 0,
                        trade_id: t.id,
                        order_id: t.order_id,
                        symbol: t.contract,
                        price: t.price,
                        quantity: t.size.unsigned_abs().to_string(),
                        quote_quantity: "0".to_string(),
                        commission: t.fee.unwrap_or_else(|| "0".to_string()),
                        commission_asset: settle,
                    })
                })
                .collect()
        }
    }
}

// ============= 持仓与余额 =============

#[derive(Deserialize)]
struct RawPosition {
    contract: String,
    size: i64,
    #[serde(deserialize_with = "de_string")]
    leverage: String,
    entry_price: String,
    mark_price: String,
    unrealised_pnl: String,
    liq_price: String,
    margin: String,
    value: String,
    #[serde(default)]
    mode: Option<String>,
}

/// 合约持仓。双向持仓按 mode 判断方向，单向持仓按张数符号判断，杠杆为 0 表示全仓
pub fn map_positions(raw: &Value) -> Result<Vec<PositionRisk>> {
    // 单个合约查询返回对象，双向持仓查询返回数组
    let positions: Vec<RawPosition> = match raw {
        Value::Array(_) => decode("gate 持仓", raw)?,
        _ => vec![decode("gate 持仓", raw)?],
    };

    let mut result = Vec::new();
    for p in positions {
        if p.size == 0 {
            continue;
        }
        let position_side = match p.mode.as_deref() {
            Some("dual_long") => PositionSide::Long,
            Some("dual_short") => PositionSide::Short,
            None | Some("single") if p.size < 0 => PositionSide::Short,
            None | Some("single") => PositionSide::Long,
            Some(other) => return Err(ExchangeError::unrecognized("mode", other)),
        };
        let margin_type = if p.leverage == "0" {
            MarginType::Crossed
        } else {
            MarginType::Isolated
        };

        result.push(PositionRisk {
            symbol: p.contract,
            position_side,
            position_amt: p.size.unsigned_abs().to_string(),
            entry_price: p.entry_price,
            mark_price: p.mark_price,
            unrealized_profit: p.unrealised_pnl,
            leverage: p.leverage,
            liquidation_price: p.liq_price,
            margin_type,
            isolated_margin: p.margin,
            notional: p.value,
        });
    }
    Ok(result)
}

#[derive(Deserialize)]
struct RawSpotAccount {
    currency: String,
    available: String,
    locked: String,
}

#[derive(Deserialize)]
struct RawFuturesAccount {
    currency: String,
    available: String,
    order_margin: String,
}

/// 账户余额。合约账户只有结算货币一条，以挂单保证金作为冻结部分
pub fn map_balances(market_type: MarketType, raw: &Value) -> Result<Vec<Balance>> {
    let entries: Vec<(String, String, String)> = match market_type {
        MarketType::Spot => decode::<Vec<RawSpotAccount>>("gate 现货账户", raw)?
            .into_iter()
            .map(|a| (a.currency, a.available, a.locked))
            .collect(),
        MarketType::Futures => {
            let account: RawFuturesAccount = decode("gate 合约账户", raw)?;
            vec![(account.currency, account.available, account.order_margin)]
        }
    };

    let mut balances = Vec::new();
    for (currency, free, locked) in entries {
        if mapper::is_empty_balance(&free, &locked)? {
            continue;
        }
        balances.push(mapper::make_balance(&currency, &free, &locked)?);
    }
    Ok(balances)
}

// ============= 行情 =============

#[derive(Deserialize)]
struct RawTicker {
    #[serde(alias = "contract")]
    currency_pair: String,
    last: String,
    change_percentage: String,
    high_24h: String,
    low_24h: String,
    /// 现货
    #[serde(default)]
    base_volume: Option<String>,
    #[serde(default)]
    quote_volume: Option<String>,
    /// 合约
    #[serde(default)]
    volume_24h_base: Option<String>,
    #[serde(default)]
    volume_24h: Option<String>,
    #[serde(default)]
    volume_24h_quote: Option<String>,
    #[serde(default)]
    volume_24h_settle: Option<String>,
}

/// 由最新价和涨跌幅反推开盘价：open = last / (1 + pct / 100)，change = last - open
pub fn open_and_change(last: &str, change_percentage: &str) -> Result<(String, String)> {
    let last_value = decimal::parse_decimal("last", last)?;
    let pct = decimal::parse_decimal("change_percentage", change_percentage)?;
    let ratio = decimal::checked_div("change_percentage", pct, Decimal::ONE_HUNDRED)?;
    let open = decimal::checked_div("open_price", last_value, Decimal::ONE + ratio)?;
    let dp = decimal::precision(last);
    Ok((
        decimal::render(open, dp),
        decimal::render(last_value - open, dp),
    ))
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.is_empty())
}

/// 24小时行情。Gate 不提供加权均价、最新成交量和成交笔数
pub fn map_tickers(market_type: MarketType, raw: &Value) -> Result<Tickers> {
    let items: Vec<RawTicker> = decode("gate 行情", raw)?;
    let mut tickers = Vec::with_capacity(items.len());

    for t in items {
        let (open_price, price_change) = match open_and_change(&t.last, &t.change_percentage) {
            Ok(pair) => pair,
            Err(e) => {
                log::warn!("{} 无法计算开盘价: {}", t.currency_pair, e);
                (String::new(), String::new())
            }
        };
        let (volume, quote_volume) = match market_type {
            MarketType::Spot => (t.base_volume, t.quote_volume),
            MarketType::Futures => (
                non_empty(t.volume_24h_base).or(t.volume_24h),
                non_empty(t.volume_24h_quote).or(t.volume_24h_settle),
            ),
        };

        tickers.push(Ticker {
            symbol: t.currency_pair,
            price_change,
            price_change_percent: t.change_percentage,
            weighted_avg_price: String::new(),
            last_price: t.last,
            last_qty: String::new(),
            open_price,
            high_price: t.high_24h,
            low_price: t.low_24h,
            volume: volume.unwrap_or_default(),
            quote_volume: quote_volume.unwrap_or_default(),
            count: 0,
        });
    }
    Ok(Tickers { tickers })
}

// ============= 公共接口 =============

/// Gate 公共接口：交易规则和行情
pub struct GateSpecSource {
    base: HttpBase,
    settle: String,
}

impl GateSpecSource {
    pub fn new(config: &ExchangeConfig) -> Result<Self> {
        Ok(Self {
            base: HttpBase::new(config)?,
            settle: config.settle.to_uppercase(),
        })
    }

    fn path(&self, market_type: MarketType, resource: &str) -> String {
        match market_type {
            MarketType::Spot => format!("{}/api/v4/spot/{}", self.base.spot_base_url, resource),
            MarketType::Futures => format!(
                "{}/api/v4/futures/{}/{}",
                self.base.futures_base_url,
                self.settle.to_lowercase(),
                resource
            ),
        }
    }

    /// 24小时行情，不指定交易对时返回全部
    pub async fn fetch_tickers(&self, market_type: MarketType, symbol: Option<&str>) -> Result<Tickers> {
        let mut url = self.path(market_type, "tickers");
        if let Some(symbol) = symbol {
            let param = match market_type {
                MarketType::Spot => "currency_pair",
                MarketType::Futures => "contract",
            };
            url.push_str(&format!("?{}={}", param, symbol));
        }
        let raw = self.base.get_json(&url).await?;
        map_tickers(market_type, &raw)
    }
}

#[async_trait]
impl SpecSource for GateSpecSource {
    fn exchange(&self) -> ExchangeId {
        ExchangeId::Gate
    }

    async fn fetch_all_symbol_specs(&self, market_type: MarketType) -> Result<Vec<SymbolSpec>> {
        let resource = match market_type {
            MarketType::Spot => "currency_pairs",
            MarketType::Futures => "contracts",
        };
        let raw = self.base.get_json(&self.path(market_type, resource)).await?;
        let mut specs = decode_symbol_specs(market_type, &raw)?;

        // 现货只保留以结算货币计价的交易对
        if market_type == MarketType::Spot {
            specs.retain(|s| s.quote_asset == self.settle);
        }
        Ok(specs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn currency_pair() -> Value {
        json!({
            "id": "ETH_USDT",
            "base": "ETH",
            "base_name": "Ethereum",
            "quote": "USDT",
            "quote_name": "Tether",
            "fee": "0.2",
            "min_base_amount": "0.001",
            "min_quote_amount": "1.0",
            "max_base_amount": "10000",
            "max_quote_amount": "10000000",
            "amount_precision": 3,
            "precision": 6,
            "trade_status": "tradable",
            "sell_start": 1516378650,
            "buy_start": 1516378650
        })
    }

    fn contract() -> Value {
        json!({
            "name": "BTC_USDT",
            "type": "direct",
            "quanto_multiplier": "0.0001",
            "order_price_round": "0.1",
            "mark_price_round": "0.01",
            "order_size_min": 1,
            "order_size_max": 1000000,
            "in_delisting": false,
            "status": "trading"
        })
    }

    #[test]
    fn test_decode_currency_pair() {
        let spec = decode_symbol_spec(MarketType::Spot, &currency_pair()).unwrap();
        assert_eq!(spec.step_size, "0.001");
        assert_eq!(spec.tick_size, "0.000001");
        assert_eq!(spec.min_qty, "0.001");
        assert_eq!(spec.min_notional, "1.0");
        assert_eq!(spec.base_precision, 3);
        assert_eq!(spec.quote_precision, 6);
        assert!(spec.trading_enabled);

        let mut sell_only = currency_pair();
        sell_only["trade_status"] = json!("sellable");
        assert!(!decode_symbol_spec(MarketType::Spot, &sell_only).unwrap().trading_enabled);

        let mut unknown = currency_pair();
        unknown["trade_status"] = json!("frozen");
        assert!(matches!(
            decode_symbol_spec(MarketType::Spot, &unknown).unwrap_err(),
            ExchangeError::UnrecognizedEnum { .. }
        ));
    }

    #[test]
    fn test_decode_contract() {
        let spec = decode_symbol_spec(MarketType::Futures, &contract()).unwrap();
        assert_eq!(spec.base_asset, "BTC");
        assert_eq!(spec.quote_asset, "USDT");
        assert_eq!(spec.step_size, "1");
        assert_eq!(spec.tick_size, "0.1");
        let contract_spec = spec.contract.unwrap();
        assert_eq!(contract_spec.quanto_multiplier, "0.0001");
        assert_eq!(contract_spec.order_size_max, 1000000);

        let mut delisting = contract();
        delisting["in_delisting"] = json!(true);
        assert!(!decode_symbol_spec(MarketType::Futures, &delisting).unwrap().trading_enabled);

        // 乘数为 0 的合约无法换算张数
        let mut broken = contract();
        broken["quanto_multiplier"] = json!("0");
        let raw = json!([contract(), broken]);
        assert_eq!(decode_symbol_specs(MarketType::Futures, &raw).unwrap().len(), 1);
    }

    fn spot_order() -> Value {
        json!({
            "id": "1852454420",
            "text": "t-abc123",
            "create_time": "1710488334",
            "update_time": "1710488334",
            "create_time_ms": 1710488334073i64,
            "update_time_ms": 1710488334074i64,
            "status": "closed",
            "currency_pair": "BTC_USDT",
            "type": "limit",
            "account": "spot",
            "side": "buy",
            "amount": "0.001",
            "price": "65000",
            "time_in_force": "gtc",
            "iceberg": "0",
            "left": "0",
            "filled_amount": "0.001",
            "fill_price": "65",
            "filled_total": "65",
            "fee": "0.000002",
            "fee_currency": "BTC",
            "point_fee": "0",
            "gt_fee": "0",
            "finish_as": "filled"
        })
    }

    #[test]
    fn test_map_spot_order() {
        let (order, fills) = map_order(MarketType::Spot, &spot_order(), None).unwrap();
        assert_eq!(order.order_id, "1852454420");
        assert_eq!(order.side, OrderSide::Buy);
        assert_eq!(order.status, OrderStatus::Filled);
        assert_eq!(order.quote_quantity, "65");
        assert_eq!(order.create_time.timestamp_millis(), 1710488334073);
        assert_eq!(fills.len(), 1);
        assert_eq!(fills[0].commission_asset, "BTC");
    }

    #[test]
    fn test_spot_order_statuses() {
        let cases = [
            (json!("open"), "0.0005", OrderStatus::PartiallyFilled),
            (json!("cancelled"), "0", OrderStatus::Canceled),
            (json!("small"), "0", OrderStatus::Rejected),
            (json!("poc"), "0", OrderStatus::Expired),
            (Value::Null, "0", OrderStatus::Filled),
        ];
        for (finish_as, filled, expected) in cases {
            let mut raw = spot_order();
            raw["finish_as"] = finish_as;
            raw["filled_amount"] = json!(filled);
            let (order, _) = map_order(MarketType::Spot, &raw, None).unwrap();
            assert_eq!(order.status, expected);
        }

        let mut raw = spot_order();
        raw["finish_as"] = json!("unknown");
        assert!(map_order(MarketType::Spot, &raw, None).is_err());
    }

    #[test]
    fn test_spot_market_buy_quantity() {
        let mut raw = spot_order();
        raw["type"] = json!("market");
        raw["time_in_force"] = json!("ioc");
        raw["amount"] = json!("65");
        let (order, _) = map_order(MarketType::Spot, &raw, None).unwrap();
        assert_eq!(order.order_type, OrderType::Market);
        assert_eq!(order.quantity, "0.001");
        assert_eq!(order.time_in_force, TimeInForce::IOC);
    }

    fn futures_order() -> Value {
        json!({
            "id": 15675394,
            "user": 100000,
            "contract": "BTC_USDT",
            "create_time": 1546569968.123,
            "finish_time": 1546569970.5,
            "finish_as": "filled",
            "status": "finished",
            "size": -6024,
            "iceberg": 0,
            "price": "3765",
            "close": false,
            "is_close": false,
            "reduce_only": false,
            "is_reduce_only": false,
            "is_liq": false,
            "tif": "gtc",
            "left": 0,
            "fill_price": "3765",
            "text": "t-my-custom-id",
            "tkfr": "0.0003",
            "mkfr": "-0.00025"
        })
    }

    #[test]
    fn test_map_futures_order() {
        let spec = decode_symbol_spec(MarketType::Futures, &contract()).unwrap();
        let (order, fills) = map_order(MarketType::Futures, &futures_order(), Some(&spec)).unwrap();
        assert_eq!(order.order_id, "15675394");
        assert_eq!(order.side, OrderSide::Sell);
        assert_eq!(order.quantity, "6024");
        assert_eq!(order.executed_quantity, "6024");
        assert_eq!(order.status, OrderStatus::Filled);
        assert_eq!(order.order_type, OrderType::Limit);
        // 3765 * 6024 * 0.0001
        assert_eq!(order.quote_quantity, "2268.036");
        assert_eq!(order.create_time.timestamp_millis(), 1546569968123);
        assert_eq!(order.update_time.timestamp_millis(), 1546569970500);
        assert!(fills.is_empty());

        let mut open = futures_order();
        open["status"] = json!("open");
        open["finish_as"] = json!("_new");
        open["left"] = json!(-6000);
        open["price"] = json!("0");
        open["tif"] = json!("ioc");
        let (order, _) = map_order(MarketType::Futures, &open, None).unwrap();
        assert_eq!(order.status, OrderStatus::PartiallyFilled);
        assert_eq!(order.executed_quantity, "24");
        assert_eq!(order.order_type, OrderType::Market);
        assert_eq!(order.quote_quantity, "0");
    }

    #[test]
    fn test_futures_order_statuses() {
        let cases = [
            ("small", OrderStatus::Rejected),
            ("depth_not_enough", OrderStatus::Rejected),
            ("trader_not_enough", OrderStatus::Rejected),
            ("cancelled", OrderStatus::Canceled),
            ("ioc", OrderStatus::Expired),
        ];
        for (finish_as, expected) in cases {
            let mut raw = futures_order();
            raw["finish_as"] = json!(finish_as);
            raw["left"] = json!(-6024);
            let (order, _) = map_order(MarketType::Futures, &raw, None).unwrap();
            assert_eq!(order.status, expected, "finish_as = {}", finish_as);
            assert_eq!(order.executed_quantity, "0");
        }

        let mut raw = futures_order();
        raw["finish_as"] = json!("unknown");
        assert!(matches!(
            map_order(MarketType::Futures, &raw, None).unwrap_err(),
            ExchangeError::UnrecognizedEnum { .. }
        ));
    }

    #[test]
    fn test_map_futures_fills() {
        let raw = json!([
            {"id": 121234231, "create_time": 1514764800.123, "contract": "BTC_USDT",
             "order_id": "21893289839", "size": -100, "price": "100.123",
             "role": "taker", "text": "t-123456", "fee": "0.01", "point_fee": "0"}
        ]);
        let fills = map_fills(MarketType::Futures, &raw).unwrap();
        assert_eq!(fills[0].quantity, "100");
        assert!(!fills[0].is_buyer);
        assert_eq!(fills[0].commission_asset, "USDT");
    }

    #[test]
    fn test_map_positions() {
        let raw = json!([
            {"contract": "BTC_USDT", "size": 10, "leverage": "0", "entry_price": "40000",
             "mark_price": "41000", "unrealised_pnl": "1", "liq_price": "20000",
             "margin": "4", "value": "41", "mode": "dual_long"},
            {"contract": "BTC_USDT", "size": 0, "leverage": "0", "entry_price": "0",
             "mark_price": "41000", "unrealised_pnl": "0", "liq_price": "0",
             "margin": "0", "value": "0", "mode": "dual_short"},
            {"contract": "ETH_USDT", "size": -3, "leverage": "5", "entry_price": "3000",
             "mark_price": "2900", "unrealised_pnl": "0.03", "liq_price": "3500",
             "margin": "1.8", "value": "0.87", "mode": "single"}
        ]);
        let positions = map_positions(&raw).unwrap();
        assert_eq!(positions.len(), 2);
        assert_eq!(positions[0].position_side, PositionSide::Long);
        assert_eq!(positions[0].margin_type, MarginType::Crossed);
        assert_eq!(positions[1].position_side, PositionSide::Short);
        assert_eq!(positions[1].position_amt, "3");
        assert_eq!(positions[1].margin_type, MarginType::Isolated);
    }

    #[test]
    fn test_map_balances() {
        let spot = json!([
            {"currency": "ETH", "available": "968.8", "locked": "0"},
            {"currency": "DOGE", "available": "0", "locked": "0"}
        ]);
        let balances = map_balances(MarketType::Spot, &spot).unwrap();
        assert_eq!(balances.len(), 1);
        assert_eq!(balances[0].total, "968.8");

        let futures = json!({"total": "9707.8", "unrealised_pnl": "3371.2",
            "available": "1000.5", "order_margin": "10.25", "currency": "USDT"});
        let balances = map_balances(MarketType::Futures, &futures).unwrap();
        assert_eq!(balances[0].total, "1010.75");
    }

    #[test]
    fn test_open_price_from_change() {
        assert_eq!(
            open_and_change("110", "10").unwrap(),
            ("100".to_string(), "10".to_string())
        );
        assert_eq!(
            open_and_change("0.5", "-50").unwrap(),
            ("1.0".to_string(), "-0.5".to_string())
        );
        assert!(open_and_change("1", "-100").is_err());

        let raw = json!([
            {"contract": "BTC_USDT", "last": "6432", "change_percentage": "0",
             "high_24h": "6500", "low_24h": "6400", "volume_24h": "200",
             "volume_24h_base": "", "volume_24h_settle": "1286400", "volume_24h_quote": ""}
        ]);
        let tickers = map_tickers(MarketType::Futures, &raw).unwrap();
        let ticker = tickers.get_ticker("BTC_USDT").unwrap();
        assert_eq!(ticker.open_price, "6432");
        assert_eq!(ticker.volume, "200");
        assert_eq!(ticker.quote_volume, "1286400");
    }
}
