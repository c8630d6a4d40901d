use chrono::{DateTime, Utc};
/// 统一的类型定义模块
/// 所有交易所的响应最终都被映射为这里的规范类型
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::core::error::ExchangeError;

// ============= 基础类型定义 =============

/// 结果类型别名
pub type Result<T> = std::result::Result<T, crate::core::error::ExchangeError>;

/// 生成规范枚举：固定的字符串表示、Display 和严格的 FromStr
macro_rules! canonical_enum {
    ($(#[$meta:meta])* $name:ident, $field:literal { $($variant:ident => $text:literal),+ $(,)? }) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
        pub enum $name {
            $(
                #[serde(rename = $text)]
                $variant,
            )+
        }

        impl $name {
            pub fn as_str(&self) -> &'static str {
                match self {
                    $($name::$variant => $text,)+
                }
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl FromStr for $name {
            type Err = ExchangeError;

            fn from_str(s: &str) -> Result<Self> {
                match s {
                    $($text => Ok($name::$variant),)+
                    other => Err(ExchangeError::unrecognized($field, other)),
                }
            }
        }
    };
}

canonical_enum!(
    /// 支持的交易所
    ExchangeId, "exchange" {
        Binance => "binance",
        Gate => "gate",
        Okx => "okx",
    }
);

canonical_enum!(
    /// 市场类型
    MarketType, "market_type" {
        Spot => "spot",
        Futures => "futures",
    }
);

canonical_enum!(
    /// 订单方向
    OrderSide, "side" {
        Buy => "BUY",
        Sell => "SELL",
    }
);

canonical_enum!(
    /// 订单类型
    OrderType, "type" {
        Limit => "LIMIT",
        Market => "MARKET",
    }
);

canonical_enum!(
    /// 订单状态
    OrderStatus, "status" {
        New => "NEW",
        PartiallyFilled => "PARTIALLY_FILLED",
        Filled => "FILLED",
        Canceled => "CANCELED",
        PendingCancel => "PENDING_CANCEL",
        Rejected => "REJECTED",
        Expired => "EXPIRED",
    }
);

canonical_enum!(
    /// 订单有效期
    TimeInForce, "time_in_force" {
        GTC => "GTC", // 一直有效，直到手动取消或完全成交
        IOC => "IOC", // 立即成交，否则取消
        FOK => "FOK", // 全部立即成交，否则整单取消
        GTX => "GTX", // 只做挂单
    }
);

canonical_enum!(
    /// 持仓方向
    PositionSide, "position_side" {
        Long => "LONG",
        Short => "SHORT",
    }
);

canonical_enum!(
    /// 保证金模式
    MarginType, "margin_type" {
        Isolated => "ISOLATED",
        Crossed => "CROSSED",
    }
);

impl OrderStatus {
    /// 是否为终态
    pub fn is_final(&self) -> bool {
        matches!(
            self,
            OrderStatus::Filled
                | OrderStatus::Canceled
                | OrderStatus::Rejected
                | OrderStatus::Expired
        )
    }
}

impl OrderSide {
    /// 对冲模式下开仓方向对应的持仓方向
    pub fn opening_position_side(&self) -> PositionSide {
        match self {
            OrderSide::Buy => PositionSide::Long,
            OrderSide::Sell => PositionSide::Short,
        }
    }
}

/// 交易所 + 市场类型，规则缓存的分区键
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ExchangeKey {
    pub exchange: ExchangeId,
    pub market_type: MarketType,
}

impl ExchangeKey {
    pub fn new(exchange: ExchangeId, market_type: MarketType) -> Self {
        Self {
            exchange,
            market_type,
        }
    }
}

impl fmt::Display for ExchangeKey {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}:{}", self.exchange, self.market_type)
    }
}

// ============= 交易规则 =============

/// 张数计价合约的附加规则
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContractSpec {
    /// 每张合约代表的基础资产数量
    pub quanto_multiplier: String,
    pub order_size_min: i64,
    pub order_size_max: i64,
}

/// 单个交易对的交易规则
///
/// 所有数值都保留交易所原始的十进制字符串，避免二进制浮点误差。
/// 上限为 "0" 表示交易所未设上限。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SymbolSpec {
    pub symbol: String,
    pub base_asset: String,
    pub quote_asset: String,
    pub base_precision: u32,
    pub quote_precision: u32,
    pub min_qty: String,
    pub max_qty: String,
    pub step_size: String,
    pub min_price: String,
    pub max_price: String,
    pub tick_size: String,
    pub min_notional: String,
    pub trading_enabled: bool,
    pub contract: Option<ContractSpec>,
}

impl SymbolSpec {
    /// 校验规则自身的不变量，解码交易所数据后调用
    pub fn validate(&self) -> Result<()> {
        let malformed = |reason: String| ExchangeError::MalformedSpec {
            symbol: self.symbol.clone(),
            reason,
        };
        let parse = |field: &str, value: &str| {
            crate::core::decimal::parse_decimal(field, value)
                .map_err(|_| malformed(format!("{} 无法解析: {:?}", field, value)))
        };

        let step = parse("step_size", self.step_size.as_str())?;
        let tick = parse("tick_size", self.tick_size.as_str())?;
        if step.is_sign_negative() || step.is_zero() {
            return Err(malformed(format!("step_size 必须为正: {}", self.step_size)));
        }
        if tick.is_sign_negative() || tick.is_zero() {
            return Err(malformed(format!("tick_size 必须为正: {}", self.tick_size)));
        }

        for (min_field, min, max_field, max) in [
            ("min_qty", &self.min_qty, "max_qty", &self.max_qty),
            ("min_price", &self.min_price, "max_price", &self.max_price),
        ] {
            let lo = parse(min_field, min.as_str())?;
            let hi = parse(max_field, max.as_str())?;
            if !hi.is_zero() && lo > hi {
                return Err(malformed(format!(
                    "{} {} 大于 {} {}",
                    min_field, min, max_field, max
                )));
            }
        }
        parse("min_notional", self.min_notional.as_str())?;

        if let Some(contract) = &self.contract {
            let multiplier = parse("quanto_multiplier", contract.quanto_multiplier.as_str())?;
            if multiplier.is_sign_negative() || multiplier.is_zero() {
                return Err(malformed(format!(
                    "quanto_multiplier 必须为正: {}",
                    contract.quanto_multiplier
                )));
            }
            if contract.order_size_max != 0 && contract.order_size_min > contract.order_size_max
            {
                return Err(malformed(format!(
                    "order_size_min {} 大于 order_size_max {}",
                    contract.order_size_min, contract.order_size_max
                )));
            }
        }
        Ok(())
    }
}

// ============= 订单相关 =============

/// 下单金额：基础资产数量或计价货币金额
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum OrderAmount {
    Quantity(String),
    Notional(String),
}

/// 调用方的下单请求
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderRequest {
    pub symbol: String,
    pub side: OrderSide,
    pub order_type: OrderType,
    pub amount: OrderAmount,
    pub price: Option<String>,
    pub time_in_force: Option<TimeInForce>,
    pub position_side: Option<PositionSide>,
    pub client_order_id: Option<String>,
}

impl OrderRequest {
    pub fn limit(symbol: &str, side: OrderSide, price: &str, quantity: &str) -> Self {
        Self {
            symbol: symbol.to_string(),
            side,
            order_type: OrderType::Limit,
            amount: OrderAmount::Quantity(quantity.to_string()),
            price: Some(price.to_string()),
            time_in_force: Some(TimeInForce::GTC),
            position_side: None,
            client_order_id: None,
        }
    }

    pub fn market(symbol: &str, side: OrderSide, quantity: &str) -> Self {
        Self {
            symbol: symbol.to_string(),
            side,
            order_type: OrderType::Market,
            amount: OrderAmount::Quantity(quantity.to_string()),
            price: None,
            time_in_force: None,
            position_side: None,
            client_order_id: None,
        }
    }
}

/// 经过规则校验后发往交易所的订单
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutboundOrder {
    pub symbol: String,
    pub side: OrderSide,
    pub order_type: OrderType,
    pub price: Option<String>,
    pub quantity: String,
    /// 张数计价合约的带符号张数，卖出为负
    pub size: Option<i64>,
    pub time_in_force: Option<TimeInForce>,
    pub position_side: Option<PositionSide>,
    pub client_order_id: Option<String>,
}

/// 规范订单
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Order {
    /// 统一用字符串，部分交易所的整数ID超出 i64/f64 的无损范围
    pub order_id: String,
    pub symbol: String,
    pub side: OrderSide,
    pub order_type: OrderType,
    pub status: OrderStatus,
    pub price: String,
    pub quantity: String,
    pub executed_quantity: String,
    /// 扣除手续费后的实际数量，没有成交记录时为 None
    pub actual_quantity: Option<String>,
    pub quote_quantity: String,
    pub time_in_force: TimeInForce,
    pub create_time: DateTime<Utc>,
    pub update_time: DateTime<Utc>,
}

/// 单笔成交记录
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Fill {
    pub trade_id: String,
    pub order_id: String,
    pub symbol: String,
    pub price: String,
    pub quantity: String,
    pub quote_quantity: String,
    pub commission: String,
    pub commission_asset: String,
    pub is_buyer: bool,
    pub time: DateTime<Utc>,
}

// ============= 持仓与账户 =============

/// 单个方向的持仓风险
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PositionRisk {
    pub symbol: String,
    pub position_side: PositionSide,
    /// 无符号数量，方向只看 position_side
    pub position_amt: String,
    pub entry_price: String,
    pub mark_price: String,
    pub unrealized_profit: String,
    pub leverage: String,
    pub liquidation_price: String,
    pub margin_type: MarginType,
    pub isolated_margin: String,
    pub notional: String,
}

/// 交易对持仓风险，对冲模式下最多两条
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SymbolPositionRisk {
    pub data: Vec<PositionRisk>,
}

impl SymbolPositionRisk {
    /// 获取指定方向持仓风险
    pub fn get_side_position_risk(&self, side: PositionSide) -> Option<&PositionRisk> {
        self.data.iter().find(|risk| risk.position_side == side)
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

/// 账户余额
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Balance {
    pub symbol: String,
    pub free: String,
    pub locked: String,
    /// 始终由 free + locked 计算得出
    pub total: String,
}

// ============= 行情 =============

/// 24小时行情
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Ticker {
    pub symbol: String,
    pub price_change: String,
    pub price_change_percent: String,
    pub weighted_avg_price: String,
    pub last_price: String,
    pub last_qty: String,
    pub open_price: String,
    pub high_price: String,
    pub low_price: String,
    pub volume: String,
    pub quote_volume: String,
    pub count: i64,
}

/// 行情列表
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Tickers {
    pub tickers: Vec<Ticker>,
}

impl Tickers {
    /// 获取指定交易对的行情
    pub fn get_ticker(&self, symbol: &str) -> Option<&Ticker> {
        self.tickers.iter().find(|t| t.symbol == symbol)
    }
}
