/// 统一日志初始化
/// 基于 log4rs：控制台输出 + 可选的文件输出，共用同一个格式
use log::LevelFilter;
use log4rs::append::console::ConsoleAppender;
use log4rs::append::file::FileAppender;
use log4rs::config::{Appender, Config, Root};
use log4rs::encode::pattern::PatternEncoder;
use std::str::FromStr;

use crate::core::config::LogConfig;
use crate::core::error::ExchangeError;
use crate::core::types::Result;

/// 按配置生成 log4rs 配置，不注册全局日志器
pub fn build_log_config(config: &LogConfig) -> Result<Config> {
    let level = LevelFilter::from_str(&config.level).map_err(|_| {
        ExchangeError::ConfigError(format!("无效的日志级别: {}", config.level))
    })?;

    let mut builder = Config::builder();
    let mut root = Root::builder();

    if config.console_output {
        let console = ConsoleAppender::builder()
            .encoder(Box::new(PatternEncoder::new(&config.pattern)))
            .build();
        builder = builder.appender(Appender::builder().build("console", Box::new(console)));
        root = root.appender("console");
    }

    if let Some(path) = &config.file_path {
        let file = FileAppender::builder()
            .encoder(Box::new(PatternEncoder::new(&config.pattern)))
            .build(path)
            .map_err(|e| ExchangeError::ConfigError(format!("打开日志文件失败 {}: {}", path, e)))?;
        builder = builder.appender(Appender::builder().build("file", Box::new(file)));
        root = root.appender("file");
    }

    builder
        .build(root.build(level))
        .map_err(|e| ExchangeError::ConfigError(format!("日志配置错误: {}", e)))
}

/// 初始化全局日志器，进程内只能调用一次
pub fn init_global_logger(config: &LogConfig) -> Result<()> {
    let log_config = build_log_config(config)?;
    log4rs::init_config(log_config)
        .map_err(|e| ExchangeError::ConfigError(format!("日志器已初始化: {}", e)))?;
    log::debug!("日志级别: {}", config.level);
    Ok(())
}
