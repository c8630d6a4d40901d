use crate::core::{
    config::ExchangeConfig,
    decimal,
    error::ExchangeError,
    filter::{self, NormalizedOrder},
    mapper,
    spec_cache::{spawn_invalidation_task, SpecCache},
    types::{
        Balance, ExchangeId, ExchangeKey, Fill, MarginType, MarketType, Order, OrderAmount,
        OrderRequest, OrderType, OutboundOrder, Result, SymbolPositionRisk, SymbolSpec,
        TimeInForce,
    },
};
use async_trait::async_trait;
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;

/// 交易规则来源：一次拉取某个市场的全部交易对规则
#[async_trait]
pub trait SpecSource: Send + Sync {
    fn exchange(&self) -> ExchangeId;

    async fn fetch_all_symbol_specs(&self, market_type: MarketType) -> Result<Vec<SymbolSpec>>;
}

/// 交易所传输层：负责签名和HTTP请求，返回原始响应
///
/// 杠杆、保证金模式、双向持仓的默认实现返回 NotSupported。
#[async_trait]
pub trait OrderTransport: Send + Sync {
    /// 提交订单
    async fn submit_order(&self, market_type: MarketType, order: &OutboundOrder) -> Result<Value>;

    /// 查询订单
    async fn fetch_order(&self, market_type: MarketType, symbol: &str, order_id: &str)
        -> Result<Value>;

    /// 撤销订单
    async fn cancel_order(
        &self,
        market_type: MarketType,
        symbol: &str,
        order_id: &str,
    ) -> Result<Value>;

    /// 查询订单的成交明细
    async fn fetch_fills(&self, market_type: MarketType, symbol: &str, order_id: &str)
        -> Result<Value>;

    /// 查询合约持仓
    async fn fetch_positions(&self, symbol: &str) -> Result<Value>;

    /// 查询账户余额
    async fn fetch_balances(&self, market_type: MarketType) -> Result<Value>;

    /// 设置杠杆倍数
    async fn set_leverage(&self, symbol: &str, leverage: u32) -> Result<()> {
        Err(ExchangeError::NotSupported(format!(
            "设置杠杆未实现: {} {}x",
            symbol, leverage
        )))
    }

    /// 设置保证金模式
    async fn set_margin_type(&self, symbol: &str, margin_type: MarginType) -> Result<()> {
        Err(ExchangeError::NotSupported(format!(
            "设置保证金模式未实现: {} {}",
            symbol, margin_type
        )))
    }

    /// 开启或关闭双向持仓
    async fn set_dual_position_mode(&self, enabled: bool) -> Result<()> {
        Err(ExchangeError::NotSupported(format!(
            "设置持仓模式未实现: dual={}",
            enabled
        )))
    }
}

/// 公共接口的HTTP基础设施
#[derive(Clone)]
pub struct HttpBase {
    pub name: String,
    pub spot_base_url: String,
    pub futures_base_url: String,
    pub client: reqwest::Client,
}

impl HttpBase {
    pub fn new(config: &ExchangeConfig) -> Result<Self> {
        let endpoints = config.endpoints()?;
        let client = reqwest::Client::builder()
            .user_agent(concat!("rustex/", env!("CARGO_PKG_VERSION")))
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()?;

        Ok(Self {
            name: config.name.clone(),
            spot_base_url: endpoints.spot_base_url,
            futures_base_url: endpoints.futures_base_url,
            client,
        })
    }

    pub fn base_url(&self, market_type: MarketType) -> &str {
        match market_type {
            MarketType::Spot => &self.spot_base_url,
            MarketType::Futures => &self.futures_base_url,
        }
    }

    /// GET 请求并返回 JSON，非 2xx 状态转换为 ApiError
    pub async fn get_json(&self, url: &str) -> Result<Value> {
        log::debug!("{} GET {}", self.name, url);
        let response = self.client.get(url).send().await?;
        let status = response.status();
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(ExchangeError::ApiError {
                code: status.as_u16() as i32,
                message,
            });
        }
        Ok(response.json().await?)
    }
}

/// 交易所适配器：规则缓存 + 下单校验 + 规范映射
pub struct ExchangeAdapter {
    exchange: ExchangeId,
    specs: Arc<dyn SpecSource>,
    transport: Option<Arc<dyn OrderTransport>>,
    cache: Arc<SpecCache>,
    spec_ttl: Duration,
}

impl ExchangeAdapter {
    /// 创建适配器，规则缓存归适配器所有
    pub fn new(specs: Arc<dyn SpecSource>, cache: Arc<SpecCache>, spec_ttl: Duration) -> Self {
        Self {
            exchange: specs.exchange(),
            specs,
            transport: None,
            cache,
            spec_ttl,
        }
    }

    pub fn with_transport(mut self, transport: Arc<dyn OrderTransport>) -> Self {
        self.transport = Some(transport);
        self
    }

    pub fn exchange(&self) -> ExchangeId {
        self.exchange
    }

    pub fn cache(&self) -> &Arc<SpecCache> {
        &self.cache
    }

    fn key(&self, market_type: MarketType) -> ExchangeKey {
        ExchangeKey::new(self.exchange, market_type)
    }

    fn transport(&self) -> Result<&Arc<dyn OrderTransport>> {
        self.transport.as_ref().ok_or_else(|| {
            ExchangeError::ConfigError(format!("交易所 {} 未配置交易通道", self.exchange))
        })
    }

    /// 获取交易规则，未命中时批量拉取整个市场
    pub async fn get_symbol_spec(
        &self,
        market_type: MarketType,
        symbol: &str,
    ) -> Result<Arc<SymbolSpec>> {
        let key = self.key(market_type);
        self.cache.invalidate_if_stale(key, self.spec_ttl)?;

        if let Some(spec) = self.cache.lookup(key, symbol)? {
            return Ok(spec);
        }

        // 网络请求在锁外进行，完成后一次性写入
        self.refresh_specs(market_type).await?;

        self.cache
            .lookup(key, symbol)?
            .ok_or_else(|| ExchangeError::SpecNotFound {
                exchange: self.exchange,
                market_type,
                symbol: symbol.to_string(),
            })
    }

    /// 强制批量刷新某个市场的交易规则
    pub async fn refresh_specs(&self, market_type: MarketType) -> Result<usize> {
        let key = self.key(market_type);
        log::info!("拉取交易规则: {}", key);
        let specs = self.specs.fetch_all_symbol_specs(market_type).await?;
        self.cache.populate_many(key, specs)
    }

    /// 启动定时失效任务，覆盖现货和合约两个分区
    pub fn spawn_spec_refresh(&self, interval: Duration) -> JoinHandle<()> {
        spawn_invalidation_task(
            self.cache.clone(),
            vec![self.key(MarketType::Spot), self.key(MarketType::Futures)],
            interval,
        )
    }

    /// 按交易规则校验下单请求，生成发往交易所的订单
    pub async fn prepare_order(
        &self,
        market_type: MarketType,
        request: &OrderRequest,
    ) -> Result<(OutboundOrder, Arc<SymbolSpec>)> {
        let spec = self.get_symbol_spec(market_type, &request.symbol).await?;
        let outbound = build_outbound(market_type, &spec, request)?;
        Ok((outbound, spec))
    }

    /// 下单
    pub async fn create_order(&self, market_type: MarketType, request: OrderRequest) -> Result<Order> {
        let (outbound, spec) = self.prepare_order(market_type, &request).await?;
        log::info!(
            "{} 下单: {} {} {} 数量={} 价格={:?} 张数={:?}",
            self.key(market_type),
            outbound.symbol,
            outbound.side,
            outbound.order_type,
            outbound.quantity,
            outbound.price,
            outbound.size
        );

        let raw = self.transport()?.submit_order(market_type, &outbound).await?;
        mapper::to_canonical_order(self.key(market_type), &raw, &[], Some(&spec))
    }

    /// 查询订单，同时拉取成交明细计算扣费后数量
    pub async fn get_order(
        &self,
        market_type: MarketType,
        symbol: &str,
        order_id: &str,
    ) -> Result<Order> {
        let transport = self.transport()?;
        let raw = transport.fetch_order(market_type, symbol, order_id).await?;
        let fills = self.fetch_fills(market_type, symbol, order_id).await?;
        let spec = self.get_symbol_spec(market_type, symbol).await?;
        mapper::to_canonical_order(self.key(market_type), &raw, &fills, Some(&spec))
    }

    /// 撤单
    pub async fn cancel_order(
        &self,
        market_type: MarketType,
        symbol: &str,
        order_id: &str,
    ) -> Result<Order> {
        let raw = self
            .transport()?
            .cancel_order(market_type, symbol, order_id)
            .await?;
        let spec = self.get_symbol_spec(market_type, symbol).await?;
        log::info!("{} 撤单完成: {} {}", self.key(market_type), symbol, order_id);
        mapper::to_canonical_order(self.key(market_type), &raw, &[], Some(&spec))
    }

    /// 订单的成交明细
    pub async fn fetch_fills(
        &self,
        market_type: MarketType,
        symbol: &str,
        order_id: &str,
    ) -> Result<Vec<Fill>> {
        let raw = self
            .transport()?
            .fetch_fills(market_type, symbol, order_id)
            .await?;
        mapper::to_canonical_fills(self.key(market_type), &raw)
    }

    /// 合约持仓风险，只保留指定交易对
    pub async fn get_position_risk(&self, symbol: &str) -> Result<SymbolPositionRisk> {
        let raw = self.transport()?.fetch_positions(symbol).await?;
        let mut risk = mapper::to_canonical_position_risk(self.exchange, &raw)?;
        risk.data.retain(|p| p.symbol == symbol);
        Ok(risk)
    }

    /// 账户余额
    pub async fn get_balances(&self, market_type: MarketType) -> Result<Vec<Balance>> {
        let raw = self.transport()?.fetch_balances(market_type).await?;
        mapper::to_canonical_balances(self.key(market_type), &raw)
    }

    /// 合约开仓前的账户设置：杠杆、保证金模式、双向持仓
    ///
    /// 各步骤相互独立，中途失败时已完成的步骤不会回滚，调用方需要先核对账户状态再重试。
    pub async fn prepare_futures_account(
        &self,
        symbol: &str,
        leverage: Option<u32>,
        margin_type: Option<MarginType>,
        dual_position: Option<bool>,
    ) -> Result<()> {
        let transport = self.transport()?;

        if let Some(leverage) = leverage {
            transport.set_leverage(symbol, leverage).await.map_err(|e| {
                log::error!("设置杠杆失败 {} {}x: {}", symbol, leverage, e);
                e
            })?;
            log::info!("杠杆已设置: {} {}x", symbol, leverage);
        }
        if let Some(margin_type) = margin_type {
            transport
                .set_margin_type(symbol, margin_type)
                .await
                .map_err(|e| {
                    log::error!("设置保证金模式失败 {} {}: {}", symbol, margin_type, e);
                    e
                })?;
            log::info!("保证金模式已设置: {} {}", symbol, margin_type);
        }
        if let Some(enabled) = dual_position {
            transport.set_dual_position_mode(enabled).await.map_err(|e| {
                log::error!("设置双向持仓失败 dual={}: {}", enabled, e);
                e
            })?;
            log::info!("双向持仓已设置: {}", enabled);
        }
        Ok(())
    }
}

/// 生成发往交易所的订单
///
/// 张数计价的合约只接受计价金额，换算为带符号张数；其他市场按数量走规则校验。
pub fn build_outbound(
    market_type: MarketType,
    spec: &SymbolSpec,
    request: &OrderRequest,
) -> Result<OutboundOrder> {
    if !spec.trading_enabled {
        return Err(ExchangeError::TradingDisabled {
            symbol: spec.symbol.clone(),
        });
    }

    let limit_price = match request.order_type {
        OrderType::Limit => Some(request.price.as_deref().ok_or_else(|| {
            ExchangeError::ValidationError {
                field: "price".to_string(),
                reason: "限价单必须提供价格".to_string(),
            }
        })?),
        OrderType::Market => None,
    };
    let time_in_force = match request.order_type {
        OrderType::Limit => Some(request.time_in_force.unwrap_or(TimeInForce::GTC)),
        OrderType::Market => None,
    };

    let reference_price = || {
        request
            .price
            .as_deref()
            .ok_or_else(|| ExchangeError::ValidationError {
                field: "price".to_string(),
                reason: "按金额下单必须提供参考价格".to_string(),
            })
    };

    let (normalized, size) = match (&spec.contract, &request.amount) {
        (Some(_), OrderAmount::Notional(notional)) => {
            let price = filter::normalize_price(spec, limit_price)?;
            let size = filter::futures_contract_size(spec, reference_price()?, notional)?;
            let normalized = NormalizedOrder {
                price,
                quantity: size.to_string(),
            };
            (normalized, Some(filter::signed_size(request.side, size)))
        }
        (Some(_), OrderAmount::Quantity(_)) => {
            return Err(ExchangeError::ValidationError {
                field: "amount".to_string(),
                reason: format!("{} 按张数计价，请按计价金额下单", spec.symbol),
            })
        }
        (None, OrderAmount::Quantity(quantity)) => (
            filter::normalize_quantity_and_price(spec, limit_price, quantity)?,
            None,
        ),
        (None, OrderAmount::Notional(notional)) => {
            let quantity = decimal::amount_to_quantity(
                notional,
                reference_price()?,
                decimal::precision(&spec.step_size),
            )?;
            (
                filter::normalize_quantity_and_price(spec, limit_price, &quantity)?,
                None,
            )
        }
    };

    // 非张数计价的合约按开仓方向指定持仓方向
    let position_side = match (market_type, &spec.contract) {
        (MarketType::Futures, None) => request
            .position_side
            .or_else(|| Some(request.side.opening_position_side())),
        _ => request.position_side,
    };

    Ok(OutboundOrder {
        symbol: request.symbol.clone(),
        side: request.side,
        order_type: request.order_type,
        price: normalized.price,
        quantity: normalized.quantity,
        size,
        time_in_force,
        position_side,
        client_order_id: request.client_order_id.clone(),
    })
}
