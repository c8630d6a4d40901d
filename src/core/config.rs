use crate::core::error::ExchangeError;
use crate::core::types::{ExchangeId, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs;

/// 环境变量前缀，例如 RUSTEX__SPEC_CACHE__REFRESH_INTERVAL_SECS=600
pub const ENV_PREFIX: &str = "RUSTEX";

fn default_settle() -> String {
    "USDT".to_string()
}

fn default_timeout_secs() -> u64 {
    30
}

fn default_refresh_interval_secs() -> u64 {
    3600
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_console_output() -> bool {
    true
}

fn default_log_pattern() -> String {
    "{d(%Y-%m-%d %H:%M:%S%.3f)} [{l}] [{M}] {m}{n}".to_string()
}

/// 单个交易所的配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExchangeConfig {
    pub name: String,
    #[serde(default)]
    pub testnet: bool,
    /// 不填时按 testnet 选择默认地址
    #[serde(default)]
    pub spot_base_url: Option<String>,
    #[serde(default)]
    pub futures_base_url: Option<String>,
    /// 现货只保留该计价货币的交易对，合约使用该结算货币
    #[serde(default = "default_settle")]
    pub settle: String,
    #[serde(default = "default_timeout_secs")]
    pub request_timeout_secs: u64,
}

/// 解析后的接口地址
#[derive(Debug, Clone, PartialEq)]
pub struct Endpoints {
    pub spot_base_url: String,
    pub futures_base_url: String,
}

impl ExchangeConfig {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            testnet: false,
            spot_base_url: None,
            futures_base_url: None,
            settle: default_settle(),
            request_timeout_secs: default_timeout_secs(),
        }
    }

    pub fn exchange_id(&self) -> Result<ExchangeId> {
        self.name.to_lowercase().parse()
    }

    /// 获取接口地址，显式配置优先
    pub fn endpoints(&self) -> Result<Endpoints> {
        let (spot, futures) = match (self.exchange_id()?, self.testnet) {
            (ExchangeId::Binance, true) => (
                "https://testnet.binance.vision",
                "https://testnet.binancefuture.com",
            ),
            (ExchangeId::Binance, false) => ("https://api.binance.com", "https://fapi.binance.com"),
            (ExchangeId::Gate, true) => (
                "https://api-testnet.gateapi.io",
                "https://fx-api-testnet.gateio.ws",
            ),
            (ExchangeId::Gate, false) => ("https://api.gateio.ws", "https://fx-api.gateio.ws"),
            // OKX 模拟盘与实盘共用域名，通过请求头区分
            (ExchangeId::Okx, _) => ("https://www.okx.com", "https://www.okx.com"),
        };

        Ok(Endpoints {
            spot_base_url: self
                .spot_base_url
                .clone()
                .unwrap_or_else(|| spot.to_string()),
            futures_base_url: self
                .futures_base_url
                .clone()
                .unwrap_or_else(|| futures.to_string()),
        })
    }
}

/// 交易规则缓存配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SpecCacheConfig {
    #[serde(default = "default_refresh_interval_secs")]
    pub refresh_interval_secs: u64,
}

impl Default for SpecCacheConfig {
    fn default() -> Self {
        Self {
            refresh_interval_secs: default_refresh_interval_secs(),
        }
    }
}

impl SpecCacheConfig {
    pub fn refresh_interval(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.refresh_interval_secs)
    }
}

/// 日志配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
    #[serde(default = "default_console_output")]
    pub console_output: bool,
    /// 不填则只输出到控制台
    #[serde(default)]
    pub file_path: Option<String>,
    #[serde(default = "default_log_pattern")]
    pub pattern: String,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            console_output: default_console_output(),
            file_path: None,
            pattern: default_log_pattern(),
        }
    }
}

/// 全局配置
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub exchanges: HashMap<String, ExchangeConfig>,
    #[serde(default)]
    pub spec_cache: SpecCacheConfig,
    #[serde(default)]
    pub log: LogConfig,
}

impl AppConfig {
    /// 从YAML文件加载配置
    pub fn from_file(path: &str) -> Result<Self> {
        let contents = fs::read_to_string(path)
            .map_err(|e| ExchangeError::ConfigError(format!("读取配置文件失败: {}", e)))?;
        Self::from_yaml_str(&contents)
    }

    pub fn from_yaml_str(contents: &str) -> Result<Self> {
        let config: AppConfig = serde_yaml::from_str(contents)?;
        Ok(config)
    }

    /// 配置文件叠加 RUSTEX__ 前缀的环境变量，文件不存在时只使用默认值和环境变量
    pub fn load(path: &str) -> Result<Self> {
        let settings = config::Config::builder()
            .add_source(config::File::with_name(path).required(false))
            .add_source(
                config::Environment::with_prefix(ENV_PREFIX)
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;
        Ok(settings.try_deserialize()?)
    }

    /// 获取指定交易所的配置，未配置时使用默认值
    pub fn exchange_config(&self, exchange: ExchangeId) -> ExchangeConfig {
        self.exchanges
            .get(exchange.as_str())
            .cloned()
            .unwrap_or_else(|| {
                log::debug!("交易所 {} 没有配置，使用默认设置", exchange);
                ExchangeConfig::new(exchange.as_str())
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_yaml_defaults() {
        let yaml = r#"
exchanges:
  binance:
    name: binance
    testnet: true
  gate:
    name: gate
    spot_base_url: "http://localhost:8080"
spec_cache:
  refresh_interval_secs: 600
"#;
        let config = AppConfig::from_yaml_str(yaml).unwrap();
        assert_eq!(config.spec_cache.refresh_interval_secs, 600);
        assert_eq!(config.log.level, "info");

        let binance = config.exchange_config(ExchangeId::Binance);
        assert_eq!(binance.settle, "USDT");
        assert_eq!(
            binance.endpoints().unwrap().spot_base_url,
            "https://testnet.binance.vision"
        );

        let gate = config.exchange_config(ExchangeId::Gate).endpoints().unwrap();
        assert_eq!(gate.spot_base_url, "http://localhost:8080");
        assert_eq!(gate.futures_base_url, "https://fx-api.gateio.ws");

        // 未配置的交易所回落到默认值
        let okx = config.exchange_config(ExchangeId::Okx);
        assert!(!okx.testnet);
        assert_eq!(okx.request_timeout_secs, 30);
    }

    #[test]
    fn test_unknown_exchange_name() {
        let config = ExchangeConfig::new("kraken");
        assert!(matches!(
            config.endpoints(),
            Err(ExchangeError::UnrecognizedEnum { .. })
        ));
    }

    #[test]
    fn test_load_without_file() {
        let config = AppConfig::load("does/not/exist").unwrap();
        assert_eq!(config.spec_cache.refresh_interval_secs, 3600);
        assert!(config.exchanges.is_empty());
    }
}
