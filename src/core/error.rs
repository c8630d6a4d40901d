use thiserror::Error;

use crate::core::types::{ExchangeId, MarketType};

#[derive(Error, Debug)]
pub enum ExchangeError {
    #[error("网络请求错误: {0}")]
    NetworkError(#[from] reqwest::Error),

    #[error("JSON序列化错误: {0}")]
    SerdeError(#[from] serde_json::Error),

    #[error("YAML配置错误: {0}")]
    YamlError(#[from] serde_yaml::Error),

    #[error("配置加载错误: {0}")]
    ConfigLoadError(#[from] config::ConfigError),

    #[error("API错误: {code} - {message}")]
    ApiError { code: i32, message: String },

    #[error("无效的十进制数: 字段 {field} = {value:?}")]
    InvalidDecimal { field: String, value: String },

    #[error("无法解析的数值: 字段 {field} = {value:?}")]
    InvalidNumber { field: String, value: String },

    #[error("价格超出范围: {price} 不在 [{min}, {max}] 内")]
    PriceOutOfRange {
        price: String,
        min: String,
        max: String,
    },

    #[error("数量超出范围: {quantity} 不在 [{min}, {max}] 内")]
    QuantityOutOfRange {
        quantity: String,
        min: String,
        max: String,
    },

    #[error("数量按步长取整后低于最小值: {quantity} -> {rounded} < {min}")]
    QuantityBelowMinimumAfterRounding {
        quantity: String,
        rounded: String,
        min: String,
    },

    #[error("名义价值低于最小值: {notional} < {min}")]
    NotionalBelowMinimum { notional: String, min: String },

    #[error("合约张数超出范围: {size} 不在 [{min}, {max}] 内")]
    SizeOutOfRange { size: i64, min: i64, max: i64 },

    #[error("交易规则未找到: {exchange} {market_type} {symbol}")]
    SpecNotFound {
        exchange: ExchangeId,
        market_type: MarketType,
        symbol: String,
    },

    #[error("交易规则格式错误: {symbol} - {reason}")]
    MalformedSpec { symbol: String, reason: String },

    #[error("无法识别的枚举值: 字段 {field} = {value:?}")]
    UnrecognizedEnum { field: String, value: String },

    #[error("交易对暂停交易: {symbol}")]
    TradingDisabled { symbol: String },

    #[error("参数验证错误: {field} - {reason}")]
    ValidationError { field: String, reason: String },

    #[error("配置错误: {0}")]
    ConfigError(String),

    #[error("不支持的功能: {0}")]
    NotSupported(String),

    #[error("其他错误: {0}")]
    Other(String),
}

impl ExchangeError {
    pub(crate) fn invalid_decimal(field: &str, value: &str) -> Self {
        ExchangeError::InvalidDecimal {
            field: field.to_string(),
            value: value.to_string(),
        }
    }

    pub(crate) fn unrecognized(field: &str, value: &str) -> Self {
        ExchangeError::UnrecognizedEnum {
            field: field.to_string(),
            value: value.to_string(),
        }
    }

    /// 判断错误是否可以重试
    ///
    /// 规则类和映射类错误永远不重试，调用方必须调整输入。
    pub fn is_retryable(&self) -> bool {
        match self {
            ExchangeError::NetworkError(_) => true,
            ExchangeError::ApiError { code, .. } => {
                // HTTP 5xx 错误通常可以重试
                *code >= 500 && *code < 600
            }
            _ => false,
        }
    }

    /// 是否属于交易规则校验失败
    pub fn is_rule_violation(&self) -> bool {
        matches!(
            self,
            ExchangeError::PriceOutOfRange { .. }
                | ExchangeError::QuantityOutOfRange { .. }
                | ExchangeError::QuantityBelowMinimumAfterRounding { .. }
                | ExchangeError::NotionalBelowMinimum { .. }
                | ExchangeError::SizeOutOfRange { .. }
                | ExchangeError::TradingDisabled { .. }
        )
    }

    /// 获取错误的严重程度
    pub fn severity(&self) -> ErrorSeverity {
        match self {
            ExchangeError::NetworkError(_) => ErrorSeverity::Warning,
            ExchangeError::SpecNotFound { .. } => ErrorSeverity::Warning,
            ExchangeError::UnrecognizedEnum { .. } => ErrorSeverity::Critical,
            ExchangeError::MalformedSpec { .. } => ErrorSeverity::Critical,
            ExchangeError::ConfigError(_) | ExchangeError::ConfigLoadError(_) => {
                ErrorSeverity::Critical
            }
            _ if self.is_rule_violation() => ErrorSeverity::Info,
            _ => ErrorSeverity::Error,
        }
    }

    /// 获取用户友好的错误描述
    pub fn user_friendly_message(&self) -> String {
        match self {
            ExchangeError::NetworkError(_) => "网络连接问题，请检查网络状态".to_string(),
            ExchangeError::PriceOutOfRange { price, min, max } => {
                format!("价格{}不在允许范围{}~{}内", price, min, max)
            }
            ExchangeError::QuantityOutOfRange { quantity, min, max } => {
                format!("下单数量{}不在允许范围{}~{}内", quantity, min, max)
            }
            ExchangeError::QuantityBelowMinimumAfterRounding { rounded, min, .. } => {
                format!("数量按步长截断为{}后低于最小下单量{}", rounded, min)
            }
            ExchangeError::NotionalBelowMinimum { notional, min } => {
                format!("订单金额{}低于最小金额{}", notional, min)
            }
            ExchangeError::SpecNotFound { symbol, .. } => {
                format!("交易对{}不存在或未开放交易", symbol)
            }
            ExchangeError::TradingDisabled { symbol } => {
                format!("交易对{}当前暂停交易", symbol)
            }
            _ => self.to_string(),
        }
    }
}

/// 错误严重程度
#[derive(Debug, Clone, PartialEq)]
pub enum ErrorSeverity {
    Info,     // 输入不合规，调整后即可
    Warning,  // 可能是暂时性问题
    Error,    // 一般错误，需要用户处理
    Critical, // 交易所数据与预期不符，需要立即处理
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rule_violation_not_retryable() {
        let err = ExchangeError::QuantityOutOfRange {
            quantity: "0.3".to_string(),
            min: "1".to_string(),
            max: "100".to_string(),
        };
        assert!(!err.is_retryable());
        assert!(err.is_rule_violation());
        assert_eq!(err.severity(), ErrorSeverity::Info);
        // 错误信息里必须同时带上实际值和边界
        let msg = err.to_string();
        assert!(msg.contains("0.3"));
        assert!(msg.contains("100"));
    }

    #[test]
    fn test_api_error_retry() {
        let server = ExchangeError::ApiError {
            code: 503,
            message: "busy".to_string(),
        };
        let client = ExchangeError::ApiError {
            code: 400,
            message: "bad".to_string(),
        };
        assert!(server.is_retryable());
        assert!(!client.is_retryable());
    }

    #[test]
    fn test_unrecognized_enum_is_critical() {
        let err = ExchangeError::unrecognized("status", "HALTED");
        assert_eq!(err.severity(), ErrorSeverity::Critical);
        assert!(err.user_friendly_message().contains("HALTED"));
    }
}
