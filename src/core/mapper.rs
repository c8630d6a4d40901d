//! 规范模型映射
//!
//! 各交易所的原始响应（`serde_json::Value`）在这里分发到对应交易所的解码逻辑，
//! 再统一计算扣费后数量、校验订单不变量。遇到无法识别的枚举值一律报错，不做猜测。

use chrono::{DateTime, Utc};
use rust_decimal::prelude::*;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer};
use serde_json::Value;

use crate::core::decimal::{self, parse_decimal, render};
use crate::core::error::ExchangeError;
use crate::core::types::{
    Balance, ExchangeId, ExchangeKey, Fill, Order, OrderSide, Result, SymbolPositionRisk,
    SymbolSpec, Tickers,
};
use crate::exchanges::{binance, gate, okx};

/// 原始订单转换为规范订单
///
/// `fills` 为空时使用响应里自带的成交明细（如果有）。传入 `spec` 才能计算扣费后数量。
pub fn to_canonical_order(
    key: ExchangeKey,
    raw: &Value,
    fills: &[Fill],
    spec: Option<&SymbolSpec>,
) -> Result<Order> {
    let (mut order, embedded) = match key.exchange {
        ExchangeId::Binance => binance::map_order(key.market_type, raw)?,
        ExchangeId::Gate => gate::map_order(key.market_type, raw, spec)?,
        ExchangeId::Okx => {
            return Err(ExchangeError::NotSupported(
                "okx 订单映射".to_string(),
            ))
        }
    };

    let fills = if fills.is_empty() { &embedded[..] } else { fills };
    if let Some(spec) = spec {
        order.actual_quantity = fee_adjusted_quantity(&order, fills, spec)?;
    }

    validate_order(&order)?;
    Ok(order)
}

/// 原始持仓列表转换为规范持仓，数量为 0 的持仓不输出
pub fn to_canonical_position_risk(exchange: ExchangeId, raw: &Value) -> Result<SymbolPositionRisk> {
    let data = match exchange {
        ExchangeId::Binance => binance::map_positions(raw)?,
        ExchangeId::Gate => gate::map_positions(raw)?,
        ExchangeId::Okx => okx::map_positions(raw)?,
    };
    Ok(SymbolPositionRisk { data })
}

/// 原始账户数据转换为余额列表，全为 0 的币种不输出
pub fn to_canonical_balances(key: ExchangeKey, raw: &Value) -> Result<Vec<Balance>> {
    match key.exchange {
        ExchangeId::Binance => binance::map_balances(key.market_type, raw),
        ExchangeId::Gate => gate::map_balances(key.market_type, raw),
        ExchangeId::Okx => okx::map_balances(raw),
    }
}

/// 原始成交记录转换为规范成交
pub fn to_canonical_fills(key: ExchangeKey, raw: &Value) -> Result<Vec<Fill>> {
    match key.exchange {
        ExchangeId::Binance => binance::map_fills(raw),
        ExchangeId::Gate => gate::map_fills(key.market_type, raw),
        ExchangeId::Okx => Err(ExchangeError::NotSupported("okx 成交映射".to_string())),
    }
}

/// 原始行情转换为规范行情
pub fn to_canonical_tickers(key: ExchangeKey, raw: &Value) -> Result<Tickers> {
    match key.exchange {
        ExchangeId::Binance => binance::map_tickers(raw),
        ExchangeId::Gate => gate::map_tickers(key.market_type, raw),
        ExchangeId::Okx => Err(ExchangeError::NotSupported("okx 行情映射".to_string())),
    }
}

/// 批量交易规则解码
pub fn decode_symbol_specs(key: ExchangeKey, raw: &Value) -> Result<Vec<SymbolSpec>> {
    match key.exchange {
        ExchangeId::Binance => binance::decode_symbol_specs(key.market_type, raw),
        ExchangeId::Gate => gate::decode_symbol_specs(key.market_type, raw),
        ExchangeId::Okx => Err(ExchangeError::NotSupported("okx 交易规则".to_string())),
    }
}

/// 扣除手续费后的实际数量
///
/// 买单：成交数量减去以基础资产计的手续费，按基础资产精度截断；
/// 卖单：成交金额减去以计价资产计的手续费，按计价资产精度截断。
/// 没有成交记录时返回 None，与 0 区分。
pub fn fee_adjusted_quantity(
    order: &Order,
    fills: &[Fill],
    spec: &SymbolSpec,
) -> Result<Option<String>> {
    let own: Vec<&Fill> = fills
        .iter()
        .filter(|f| f.order_id.is_empty() || f.order_id == order.order_id)
        .collect();
    if own.is_empty() {
        return Ok(None);
    }

    let (field, gross, fee_asset, dp) = match order.side {
        OrderSide::Buy => (
            "executed_quantity",
            &order.executed_quantity,
            &spec.base_asset,
            spec.base_precision,
        ),
        OrderSide::Sell => (
            "quote_quantity",
            &order.quote_quantity,
            &spec.quote_asset,
            spec.quote_precision,
        ),
    };

    let gross = parse_decimal(field, gross)?;
    let fee = decimal::sum(
        "commission",
        own.iter()
            .filter(|f| &f.commission_asset == fee_asset)
            .map(|f| f.commission.as_str()),
    )?;
    Ok(Some(render(gross - fee, dp)))
}

/// 校验规范订单的不变量
pub fn validate_order(order: &Order) -> Result<()> {
    let quantity = parse_decimal("quantity", &order.quantity)?;
    let executed = parse_decimal("executed_quantity", &order.executed_quantity)?;
    if executed > quantity {
        return Err(ExchangeError::ValidationError {
            field: "executed_quantity".to_string(),
            reason: format!(
                "订单 {} 成交数量 {} 大于委托数量 {}",
                order.order_id, order.executed_quantity, order.quantity
            ),
        });
    }

    // 卖单的实际数量以计价资产计，不与成交数量比较
    if let (OrderSide::Buy, Some(actual)) = (order.side, &order.actual_quantity) {
        let actual_value = parse_decimal("actual_quantity", actual)?;
        if actual_value > executed {
            return Err(ExchangeError::ValidationError {
                field: "actual_quantity".to_string(),
                reason: format!(
                    "订单 {} 实际数量 {} 大于成交数量 {}",
                    order.order_id, actual, order.executed_quantity
                ),
            });
        }
    }
    Ok(())
}

/// 由 free 和 locked 计算余额，total 不信任交易所单独给出的字段
pub fn make_balance(symbol: &str, free: &str, locked: &str) -> Result<Balance> {
    let free_value = decimal::parse_or_zero("free", free)?;
    let locked_value = decimal::parse_or_zero("locked", locked)?;
    let total = free_value
        .checked_add(locked_value)
        .ok_or_else(|| ExchangeError::invalid_decimal("total", &format!("{} + {}", free, locked)))?;
    let dp = free_value.scale().max(locked_value.scale());

    Ok(Balance {
        symbol: symbol.to_string(),
        free: free.to_string(),
        locked: locked.to_string(),
        total: render(total, dp),
    })
}

/// 余额全为 0 时跳过
pub(crate) fn is_empty_balance(free: &str, locked: &str) -> Result<bool> {
    Ok(decimal::parse_or_zero("free", free)?.is_zero()
        && decimal::parse_or_zero("locked", locked)?.is_zero())
}

// ============= 解码辅助 =============

/// 反序列化为具体结构体，失败时记录原始内容
pub(crate) fn decode<T: DeserializeOwned>(what: &str, raw: &Value) -> Result<T> {
    serde_json::from_value(raw.clone()).map_err(|e| {
        log::error!("{} 解析失败: {}, 原始数据: {}", what, e, raw);
        ExchangeError::SerdeError(e)
    })
}

/// 字符串或数字都按原文保留为字符串，订单ID等大整数不经过浮点
pub(crate) fn de_string<'de, D>(deserializer: D) -> std::result::Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    match Value::deserialize(deserializer)? {
        Value::String(s) => Ok(s),
        Value::Number(n) => Ok(n.to_string()),
        other => Err(serde::de::Error::custom(format!(
            "期望字符串或数字，实际为 {}",
            other
        ))),
    }
}

/// 可缺省的字符串或数字
pub(crate) fn de_opt_string<'de, D>(deserializer: D) -> std::result::Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    match Option::<Value>::deserialize(deserializer)? {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(s)) => Ok(Some(s)),
        Some(Value::Number(n)) => Ok(Some(n.to_string())),
        Some(other) => Err(serde::de::Error::custom(format!(
            "期望字符串或数字，实际为 {}",
            other
        ))),
    }
}

/// 毫秒时间戳
pub(crate) fn millis_to_time(field: &str, ms: i64) -> Result<DateTime<Utc>> {
    DateTime::from_timestamp_millis(ms)
        .ok_or_else(|| ExchangeError::invalid_decimal(field, &ms.to_string()))
}

/// 带小数的秒级时间戳，如 "1546569968.123"
pub(crate) fn seconds_to_time(field: &str, seconds: &str) -> Result<DateTime<Utc>> {
    let value = parse_decimal(field, seconds)?;
    let ms = decimal::checked_mul(field, value, Decimal::from(1000))?
        .trunc()
        .to_i64()
        .ok_or_else(|| ExchangeError::invalid_decimal(field, seconds))?;
    millis_to_time(field, ms)
}

/// 带符号的数量拆为 (是否为负, 绝对值字符串)
pub(crate) fn split_sign(field: &str, signed: &str) -> Result<(bool, String)> {
    let value = parse_decimal(field, signed)?;
    let negative = value.is_sign_negative() && !value.is_zero();
    let magnitude = signed.trim_start_matches(['-', '+']);
    Ok((negative, magnitude.to_string()))
}
