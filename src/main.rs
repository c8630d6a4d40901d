use clap::{Arg, ArgMatches, Command};
use rustex::{
    core::{
        config::AppConfig,
        error::ExchangeError,
        exchange::{ExchangeAdapter, SpecSource},
        filter,
        spec_cache::SpecCache,
        types::{ExchangeId, MarketType, Tickers},
    },
    exchanges::{BinanceSpecSource, GateSpecSource},
    utils::{init_global_logger, to_exchange_symbol},
};
use std::sync::Arc;

type CliResult<T> = Result<T, Box<dyn std::error::Error>>;

fn cli() -> Command {
    let exchange = Arg::new("exchange")
        .help("交易所: binance, gate")
        .required(true);
    let market = Arg::new("market")
        .help("市场类型: spot, futures")
        .required(true);
    let symbol = Arg::new("symbol")
        .help("交易对，例如 BTCUSDT")
        .required(true);

    Command::new("rustex")
        .version(env!("CARGO_PKG_VERSION"))
        .about("交易所交易规则查询与下单参数校验")
        .arg(
            Arg::new("config")
                .short('c')
                .long("config")
                .value_name("FILE")
                .help("配置文件路径")
                .default_value("config/rustex.yml")
                .global(true),
        )
        .subcommand_required(true)
        .subcommand(
            Command::new("spec")
                .about("查询交易对的交易规则")
                .arg(exchange.clone())
                .arg(market.clone())
                .arg(symbol.clone()),
        )
        .subcommand(
            Command::new("normalize")
                .about("按交易规则校验并取整数量和价格")
                .arg(exchange.clone())
                .arg(market.clone())
                .arg(symbol.clone())
                .arg(Arg::new("quantity").help("下单数量").required(true))
                .arg(
                    Arg::new("price")
                        .short('p')
                        .long("price")
                        .value_name("PRICE")
                        .help("限价，不填按市价处理"),
                ),
        )
        .subcommand(
            Command::new("ticker")
                .about("查询24小时行情")
                .arg(exchange)
                .arg(market)
                .arg(Arg::new("symbol").help("交易对，不填返回全部")),
        )
}

fn required<'a>(matches: &'a ArgMatches, name: &str) -> CliResult<&'a str> {
    matches
        .get_one::<String>(name)
        .map(|s| s.as_str())
        .ok_or_else(|| format!("缺少参数: {}", name).into())
}

fn spec_source(config: &AppConfig, exchange: ExchangeId) -> CliResult<Arc<dyn SpecSource>> {
    let exchange_config = config.exchange_config(exchange);
    match exchange {
        ExchangeId::Binance => Ok(Arc::new(BinanceSpecSource::new(&exchange_config)?)),
        ExchangeId::Gate => Ok(Arc::new(GateSpecSource::new(&exchange_config)?)),
        ExchangeId::Okx => Err(ExchangeError::NotSupported("okx 交易规则查询".to_string()).into()),
    }
}

async fn fetch_tickers(
    config: &AppConfig,
    exchange: ExchangeId,
    market_type: MarketType,
    symbol: Option<&str>,
) -> CliResult<Tickers> {
    let exchange_config = config.exchange_config(exchange);
    let tickers = match exchange {
        ExchangeId::Binance => {
            BinanceSpecSource::new(&exchange_config)?
                .fetch_tickers(market_type, symbol)
                .await?
        }
        ExchangeId::Gate => {
            GateSpecSource::new(&exchange_config)?
                .fetch_tickers(market_type, symbol)
                .await?
        }
        ExchangeId::Okx => {
            return Err(ExchangeError::NotSupported("okx 行情查询".to_string()).into())
        }
    };
    Ok(tickers)
}

#[tokio::main]
async fn main() -> CliResult<()> {
    let matches = cli().get_matches();

    let config_path = required(&matches, "config")?;
    let config = AppConfig::load(config_path)?;
    init_global_logger(&config.log)?;
    log::debug!("已加载配置: {}", config_path);

    let (command, sub) = matches
        .subcommand()
        .ok_or("缺少子命令")?;

    let exchange: ExchangeId = required(sub, "exchange")?.to_lowercase().parse()?;
    let market_type: MarketType = required(sub, "market")?.to_lowercase().parse()?;
    let symbol = sub
        .get_one::<String>("symbol")
        .map(|s| to_exchange_symbol(s, exchange, market_type));

    match command {
        "spec" | "normalize" => {
            let symbol = symbol.ok_or("缺少参数: symbol")?;
            let adapter = ExchangeAdapter::new(
                spec_source(&config, exchange)?,
                Arc::new(SpecCache::default()),
                config.spec_cache.refresh_interval(),
            );
            let spec = adapter.get_symbol_spec(market_type, &symbol).await?;

            if command == "spec" {
                println!("{}", serde_json::to_string_pretty(spec.as_ref())?);
            } else {
                let quantity = required(sub, "quantity")?;
                let price = sub.get_one::<String>("price").map(|s| s.as_str());
                match filter::normalize_quantity_and_price(&spec, price, quantity) {
                    Ok(normalized) => println!("{}", serde_json::to_string_pretty(&normalized)?),
                    Err(e) => {
                        log::warn!("{} 校验未通过: {}", symbol, e);
                        return Err(e.user_friendly_message().into());
                    }
                }
            }
        }
        "ticker" => {
            let tickers = fetch_tickers(&config, exchange, market_type, symbol.as_deref()).await?;
            println!("{}", serde_json::to_string_pretty(&tickers)?);
        }
        other => return Err(format!("未知命令: {}", other).into()),
    }

    Ok(())
}
