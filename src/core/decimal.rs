//! 十进制数值引擎
//!
//! 交易所下发的价格、数量全部是十进制字符串，这里统一用 `rust_decimal` 解析和运算，
//! 任何环节都不经过 f64。所有舍入都朝零截断，绝不向上取整。

use rust_decimal::prelude::*;
use std::cmp::Ordering;

use crate::core::error::ExchangeError;
use crate::core::types::Result;

/// 解析十进制字符串
///
/// 只接受普通十进制写法（可带符号和小数点），科学计数法一律拒绝，
/// 保证字符串的小数位数与解析结果的精度一致。
pub fn parse_decimal(field: &str, value: &str) -> Result<Decimal> {
    let well_formed = !value.is_empty()
        && value
            .chars()
            .all(|c| c.is_ascii_digit() || matches!(c, '.' | '-' | '+'));
    if !well_formed {
        return Err(ExchangeError::invalid_decimal(field, value));
    }

    Decimal::from_str_exact(value).map_err(|_| ExchangeError::invalid_decimal(field, value))
}

/// 空字符串按 0 处理的解析，用于交易所可能省略的字段
pub fn parse_or_zero(field: &str, value: &str) -> Result<Decimal> {
    if value.is_empty() {
        Ok(Decimal::ZERO)
    } else {
        parse_decimal(field, value)
    }
}

/// 向下取整到 step 的整数倍，结果的小数位数与 step 一致
pub fn floor_to_step(value: Decimal, step: Decimal) -> Result<Decimal> {
    if step <= Decimal::ZERO {
        return Err(ExchangeError::ValidationError {
            field: "step".to_string(),
            reason: format!("步长必须为正: {}", step),
        });
    }

    let remainder = value
        .checked_rem(step)
        .ok_or_else(|| ExchangeError::invalid_decimal("step", &step.to_string()))?;
    let mut floored = value - remainder;
    floored.rescale(step.scale());
    Ok(positive_zero(floored))
}

/// 截断到指定小数位并补齐尾部的 0
pub fn render(value: Decimal, dp: u32) -> String {
    let mut truncated = value.round_dp_with_strategy(dp, RoundingStrategy::ToZero);
    truncated.rescale(dp);
    positive_zero(truncated).to_string()
}

/// 精确比较两个十进制字符串，"0.00000000" 与 "0" 相等
pub fn compare(a: &str, b: &str) -> Result<Ordering> {
    let left = parse_decimal("a", a)?;
    let right = parse_decimal("b", b)?;
    Ok(left.cmp(&right))
}

/// 小数点后的位数，没有小数点时为 0
pub fn precision(value: &str) -> u32 {
    match value.trim().split_once('.') {
        Some((_, frac)) => frac.chars().take_while(|c| c.is_ascii_digit()).count() as u32,
        None => 0,
    }
}

/// 累加一组十进制字符串
pub fn sum<'a, I>(field: &str, values: I) -> Result<Decimal>
where
    I: IntoIterator<Item = &'a str>,
{
    values.into_iter().try_fold(Decimal::ZERO, |acc, v| {
        let d = parse_decimal(field, v)?;
        acc.checked_add(d)
            .ok_or_else(|| ExchangeError::invalid_decimal(field, v))
    })
}

/// 安全除法，除数为 0 或溢出时返回错误而不是 panic
pub fn checked_div(field: &str, numerator: Decimal, denominator: Decimal) -> Result<Decimal> {
    if denominator.is_zero() {
        return Err(ExchangeError::ValidationError {
            field: field.to_string(),
            reason: "除数为 0".to_string(),
        });
    }
    numerator
        .checked_div(denominator)
        .ok_or_else(|| ExchangeError::invalid_decimal(field, &numerator.to_string()))
}

/// 安全乘法
pub fn checked_mul(field: &str, a: Decimal, b: Decimal) -> Result<Decimal> {
    a.checked_mul(b)
        .ok_or_else(|| ExchangeError::invalid_decimal(field, &format!("{} * {}", a, b)))
}

/// 计价货币金额按价格换算为基础资产数量，截断到 dp 位
pub fn amount_to_quantity(amount: &str, price: &str, dp: u32) -> Result<String> {
    let amount = parse_decimal("amount", amount)?;
    let price = parse_decimal("price", price)?;
    let quantity = checked_div("price", amount, price)?;
    Ok(render(quantity, dp))
}

fn positive_zero(mut value: Decimal) -> Decimal {
    if value.is_zero() {
        value.set_sign_positive(true);
    }
    value
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_parse_decimal() {
        assert_eq!(parse_decimal("qty", "0.00100000").unwrap(), dec!(0.001));
        assert_eq!(parse_decimal("qty", "-5").unwrap(), dec!(-5));
        assert_eq!(parse_decimal("qty", "-2.50").unwrap().scale(), 2);

        for bad in ["", " 1", "abc", "1.2.3", "1_000", "--1", "1e-3", "1E8", "2.5e0"] {
            let err = parse_decimal("qty", bad).unwrap_err();
            match err {
                ExchangeError::InvalidDecimal { field, value } => {
                    assert_eq!(field, "qty");
                    assert_eq!(value, bad);
                }
                other => panic!("意外的错误类型: {:?}", other),
            }
        }
    }

    #[test]
    fn test_floor_to_step_scale() {
        // 第三位小数直接丢弃，按 step 的精度输出
        assert_eq!(floor_to_step(dec!(2.37), dec!(0.5)).unwrap().to_string(), "2.0");
        assert_eq!(
            floor_to_step(dec!(0.123456789), dec!(0.00001000))
                .unwrap()
                .to_string(),
            "0.12345000"
        );
        assert_eq!(floor_to_step(dec!(7), dec!(3)).unwrap().to_string(), "6");
        assert_eq!(floor_to_step(dec!(0.3), dec!(1)).unwrap().to_string(), "0");
        assert!(floor_to_step(dec!(1), dec!(0)).is_err());
    }

    #[test]
    fn test_floor_to_step_properties() {
        let values = [
            dec!(0),
            dec!(0.3),
            dec!(1.4),
            dec!(2.37),
            dec!(99.99999999),
            dec!(12345.6789),
            dec!(0.00000001),
        ];
        let steps = [dec!(0.5), dec!(1), dec!(0.001), dec!(0.00000001), dec!(0.25), dec!(10)];

        for q in values {
            for step in steps {
                let floored = floor_to_step(q, step).unwrap();
                assert!(floored >= Decimal::ZERO, "{} / {} 出现负数", q, step);
                assert!(floored <= q, "{} / {} 向上取整了", q, step);
                assert!((floored % step).is_zero(), "{} 不是 {} 的整数倍", floored, step);
                // 幂等
                assert_eq!(floor_to_step(floored, step).unwrap(), floored);
            }
        }
    }

    #[test]
    fn test_render_truncates() {
        assert_eq!(render(dec!(9.999999999), 8), "9.99999999");
        assert_eq!(render(dec!(1.5), 3), "1.500");
        assert_eq!(render(dec!(-0.0000001), 2), "0.00");
        assert_eq!(render(dec!(123.9), 0), "123");
    }

    #[test]
    fn test_compare_and_precision() {
        assert_eq!(compare("0.00000000", "0").unwrap(), Ordering::Equal);
        assert_eq!(compare("1.10", "1.1").unwrap(), Ordering::Equal);
        assert_eq!(compare("0.1", "0.09").unwrap(), Ordering::Greater);
        assert!(compare("x", "1").is_err());

        assert_eq!(precision("0.00100000"), 8);
        assert_eq!(precision("1"), 0);
        assert_eq!(precision("10.5"), 1);
    }

    #[test]
    fn test_sum_no_drift() {
        // 一千笔 0.001 累加必须正好等于 1
        let fills: Vec<String> = (0..1000).map(|_| "0.001".to_string()).collect();
        let total = sum("commission", fills.iter().map(|s| s.as_str())).unwrap();
        assert_eq!(total, dec!(1));
    }

    #[test]
    fn test_amount_to_quantity() {
        assert_eq!(amount_to_quantity("100", "3", 4).unwrap(), "33.3333");
        assert!(amount_to_quantity("100", "0", 4).is_err());
    }
}
