//! 下单规则校验
//!
//! 按交易规则校验价格和数量，并把数量截断到步长。现货与合约共用同一套流程，
//! 张数计价的合约额外把名义价值换算为整数张数。

use rust_decimal::prelude::*;
use serde::Serialize;

use crate::core::decimal::{self, floor_to_step, render};
use crate::core::error::ExchangeError;
use crate::core::types::{OrderSide, Result, SymbolSpec};

/// 校验并取整后的价格与数量
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NormalizedOrder {
    /// 未传价格或价格为 0（市价单）时为 None
    pub price: Option<String>,
    pub quantity: String,
}

/// 解析失败统一报 InvalidNumber
fn number(field: &str, value: &str) -> Result<Decimal> {
    decimal::parse_decimal(field, value).map_err(|_| ExchangeError::InvalidNumber {
        field: field.to_string(),
        value: value.to_string(),
    })
}

/// 上限为 0 表示不限
fn within(value: Decimal, min: Decimal, max: Decimal) -> bool {
    value >= min && (max.is_zero() || value <= max)
}

/// 只校验并取整价格
pub fn normalize_price(spec: &SymbolSpec, price: Option<&str>) -> Result<Option<String>> {
    let raw = match price {
        Some(p) => p,
        None => return Ok(None),
    };
    let price = number("price", raw)?;
    if price.is_zero() {
        return Ok(None);
    }

    let min_price = number("min_price", &spec.min_price)?;
    let max_price = number("max_price", &spec.max_price)?;
    let tick = number("tick_size", &spec.tick_size)?;

    let out_of_range = |value: String| ExchangeError::PriceOutOfRange {
        price: value,
        min: spec.min_price.clone(),
        max: spec.max_price.clone(),
    };
    if price.is_sign_negative() || !within(price, min_price, max_price) {
        return Err(out_of_range(raw.to_string()));
    }

    let rounded = floor_to_step(price, tick)?;
    if !within(rounded, min_price, max_price) || rounded.is_zero() {
        return Err(out_of_range(rounded.to_string()));
    }
    Ok(Some(render(rounded, tick.scale())))
}

/// 校验价格和数量，返回交易所可以接受的取整结果
pub fn normalize_quantity_and_price(
    spec: &SymbolSpec,
    price: Option<&str>,
    quantity: &str,
) -> Result<NormalizedOrder> {
    let qty = number("quantity", quantity)?;
    let min_qty = number("min_qty", &spec.min_qty)?;
    let max_qty = number("max_qty", &spec.max_qty)?;
    let step = number("step_size", &spec.step_size)?;
    let min_notional = number("min_notional", &spec.min_notional)?;

    let price = normalize_price(spec, price)?;

    // 原始数量先校验一次。下限按步长对齐，未对齐的最小值留给截断后的校验报告
    let raw_min = floor_to_step(min_qty, step)?;
    if qty.is_sign_negative() || !within(qty, raw_min, max_qty) {
        return Err(ExchangeError::QuantityOutOfRange {
            quantity: quantity.to_string(),
            min: spec.min_qty.clone(),
            max: spec.max_qty.clone(),
        });
    }

    // 截断后可能跌破最小值，需要再校验一次
    let rounded = floor_to_step(qty, step)?;
    if rounded < min_qty || rounded.is_zero() {
        return Err(ExchangeError::QuantityBelowMinimumAfterRounding {
            quantity: quantity.to_string(),
            rounded: rounded.to_string(),
            min: spec.min_qty.clone(),
        });
    }

    if let Some(p) = &price {
        if !min_notional.is_zero() {
            let notional = decimal::checked_mul("notional", number("price", p)?, rounded)?;
            if notional < min_notional {
                return Err(ExchangeError::NotionalBelowMinimum {
                    notional: notional.normalize().to_string(),
                    min: spec.min_notional.clone(),
                });
            }
        }
    }

    Ok(NormalizedOrder {
        price,
        quantity: render(rounded, step.scale()),
    })
}

/// 名义价值换算为合约张数
///
/// size = floor(notional / (price * quanto_multiplier))，方向由调用方决定。
pub fn futures_contract_size(spec: &SymbolSpec, price: &str, notional: &str) -> Result<i64> {
    let contract = spec
        .contract
        .as_ref()
        .ok_or_else(|| ExchangeError::ValidationError {
            field: "contract".to_string(),
            reason: format!("{} 不是张数计价合约", spec.symbol),
        })?;

    let price = number("price", price)?;
    let amount = number("notional", notional)?;
    let multiplier = number("quanto_multiplier", &contract.quanto_multiplier)?;

    let contract_value = decimal::checked_mul("contract_value", price, multiplier)?;
    if contract_value <= Decimal::ZERO {
        return Err(ExchangeError::ValidationError {
            field: "price".to_string(),
            reason: format!("合约面值必须为正: {}", contract_value),
        });
    }

    let size = decimal::checked_div("contract_value", amount, contract_value)?
        .floor()
        .to_i64()
        .ok_or_else(|| ExchangeError::ValidationError {
            field: "size".to_string(),
            reason: format!("张数溢出: {} / {}", amount, contract_value),
        })?;

    let max_ok = contract.order_size_max == 0 || size <= contract.order_size_max;
    if size < contract.order_size_min || !max_ok || size <= 0 {
        return Err(ExchangeError::SizeOutOfRange {
            size,
            min: contract.order_size_min,
            max: contract.order_size_max,
        });
    }
    Ok(size)
}

/// 按买卖方向给张数加符号，卖出为负
pub fn signed_size(side: OrderSide, size: i64) -> i64 {
    match side {
        OrderSide::Buy => size,
        OrderSide::Sell => -size,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::types::tests::sample_spec;
    use crate::core::types::ContractSpec;

    #[test]
    fn test_truncates_to_step() {
        // MinQty=1, MaxQty=100, StepSize=0.5
        let spec = sample_spec();
        let result = normalize_quantity_and_price(&spec, None, "2.37").unwrap();
        assert_eq!(result.quantity, "2.0");
        assert_eq!(result.price, None);
    }

    #[test]
    fn test_raw_quantity_below_min() {
        let spec = sample_spec();
        let err = normalize_quantity_and_price(&spec, None, "0.3").unwrap_err();
        match err {
            ExchangeError::QuantityOutOfRange { quantity, min, max } => {
                assert_eq!(quantity, "0.3");
                assert_eq!(min, "1");
                assert_eq!(max, "100");
            }
            other => panic!("意外的错误类型: {:?}", other),
        }

        let err = normalize_quantity_and_price(&spec, None, "100.5").unwrap_err();
        assert!(matches!(err, ExchangeError::QuantityOutOfRange { .. }));
    }

    #[test]
    fn test_below_min_after_rounding() {
        let mut spec = sample_spec();
        spec.min_qty = "1.5".to_string();
        spec.step_size = "1".to_string();

        // 1.4 截断为 1 后低于 1.5
        let err = normalize_quantity_and_price(&spec, None, "1.4").unwrap_err();
        match err {
            ExchangeError::QuantityBelowMinimumAfterRounding { rounded, min, .. } => {
                assert_eq!(rounded, "1");
                assert_eq!(min, "1.5");
            }
            other => panic!("意外的错误类型: {:?}", other),
        }

        // 低于对齐后的下限仍然在原始校验中拒绝
        let err = normalize_quantity_and_price(&spec, None, "0.9").unwrap_err();
        assert!(matches!(err, ExchangeError::QuantityOutOfRange { .. }));

        // 1.9 通过原始校验，但截断为 1 后低于 1.5
        let err = normalize_quantity_and_price(&spec, None, "1.9").unwrap_err();
        match err {
            ExchangeError::QuantityBelowMinimumAfterRounding {
                quantity,
                rounded,
                min,
            } => {
                assert_eq!(quantity, "1.9");
                assert_eq!(rounded, "1");
                assert_eq!(min, "1.5");
            }
            other => panic!("意外的错误类型: {:?}", other),
        }
    }

    #[test]
    fn test_rounding_only_failure_with_zero_min() {
        // 最小值为 0 时原始校验必然通过，截断为 0 只能在第二次校验中发现
        let mut spec = sample_spec();
        spec.min_qty = "0".to_string();
        spec.step_size = "1".to_string();
        let err = normalize_quantity_and_price(&spec, None, "0.4").unwrap_err();
        assert!(matches!(
            err,
            ExchangeError::QuantityBelowMinimumAfterRounding { .. }
        ));
    }

    #[test]
    fn test_price_range_and_tick() {
        let spec = sample_spec();

        let result = normalize_quantity_and_price(&spec, Some("42000.129"), "1").unwrap();
        assert_eq!(result.price.as_deref(), Some("42000.12"));
        assert_eq!(result.quantity, "1.0");

        let err = normalize_quantity_and_price(&spec, Some("0.001"), "1").unwrap_err();
        assert!(matches!(err, ExchangeError::PriceOutOfRange { .. }));

        let err = normalize_quantity_and_price(&spec, Some("2000000"), "1").unwrap_err();
        assert!(matches!(err, ExchangeError::PriceOutOfRange { .. }));

        // 价格为 0 按市价处理，不做价格校验
        let result = normalize_quantity_and_price(&spec, Some("0"), "1").unwrap();
        assert_eq!(result.price, None);
    }

    #[test]
    fn test_invalid_number() {
        let spec = sample_spec();
        let err = normalize_quantity_and_price(&spec, None, "abc").unwrap_err();
        assert!(matches!(err, ExchangeError::InvalidNumber { .. }));

        let err = normalize_quantity_and_price(&spec, Some("1,5"), "1").unwrap_err();
        assert!(matches!(err, ExchangeError::InvalidNumber { .. }));

        let mut broken = sample_spec();
        broken.step_size = "n/a".to_string();
        let err = normalize_quantity_and_price(&broken, None, "1").unwrap_err();
        match err {
            ExchangeError::InvalidNumber { field, .. } => assert_eq!(field, "step_size"),
            other => panic!("意外的错误类型: {:?}", other),
        }
    }

    #[test]
    fn test_exponent_step_rejected() {
        // 科学计数法的步长不能参与取整
        let mut spec = sample_spec();
        spec.step_size = "1e-3".to_string();
        spec.min_qty = "2.1".to_string();
        let err = normalize_quantity_and_price(&spec, None, "2.3456").unwrap_err();
        match err {
            ExchangeError::InvalidNumber { field, value } => {
                assert_eq!(field, "step_size");
                assert_eq!(value, "1e-3");
            }
            other => panic!("意外的错误类型: {:?}", other),
        }
        assert!(matches!(
            spec.validate(),
            Err(ExchangeError::MalformedSpec { .. })
        ));

        // 带尾零的步长按步长自身的小数位输出
        let mut spec = sample_spec();
        spec.step_size = "0.00100000".to_string();
        spec.min_qty = "2.1".to_string();
        let result = normalize_quantity_and_price(&spec, None, "2.3456").unwrap();
        assert_eq!(result.quantity, "2.34500000");
    }

    #[test]
    fn test_min_notional() {
        let mut spec = sample_spec();
        spec.min_notional = "5".to_string();
        let err = normalize_quantity_and_price(&spec, Some("2"), "2").unwrap_err();
        assert!(matches!(err, ExchangeError::NotionalBelowMinimum { .. }));

        let ok = normalize_quantity_and_price(&spec, Some("2.5"), "2").unwrap();
        assert_eq!(ok.quantity, "2.0");
    }

    fn gate_contract() -> SymbolSpec {
        let mut spec = sample_spec();
        spec.symbol = "BTC_USDT".to_string();
        spec.contract = Some(ContractSpec {
            quanto_multiplier: "0.0001".to_string(),
            order_size_min: 1,
            order_size_max: 1000,
        });
        spec
    }

    #[test]
    fn test_futures_contract_size() {
        let spec = gate_contract();
        // 每张 0.0001 BTC * 50000 = 5 USDT，23 USDT 可以开 4 张
        assert_eq!(futures_contract_size(&spec, "50000", "23").unwrap(), 4);

        let err = futures_contract_size(&spec, "50000", "4.99").unwrap_err();
        assert!(matches!(err, ExchangeError::SizeOutOfRange { size: 0, .. }));

        let err = futures_contract_size(&spec, "50000", "10000").unwrap_err();
        assert!(matches!(
            err,
            ExchangeError::SizeOutOfRange {
                size: 2000,
                min: 1,
                max: 1000
            }
        ));

        assert!(futures_contract_size(&sample_spec(), "50000", "23").is_err());
        assert_eq!(signed_size(OrderSide::Sell, 4), -4);
    }
}
