use std::sync::OnceLock;

use tracing::info;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::fmt::MakeWriter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::{fmt, EnvFilter, Layer, Registry};

use crate::config::environment::{env_is_true, env_or_default};

// 全局变量用于保持日志文件句柄
static INFO_GUARD: OnceLock<WorkerGuard> = OnceLock::new();
static ERROR_GUARD: OnceLock<WorkerGuard> = OnceLock::new();

type BoxedLayer = Box<dyn Layer<Registry> + Send + Sync + 'static>;

/// 日志输出格式
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Text,
    Json,
}

impl LogFormat {
    pub fn parse(s: &str) -> Self {
        if s.trim().eq_ignore_ascii_case("json") {
            LogFormat::Json
        } else {
            LogFormat::Text
        }
    }
}

/// 日志配置
#[derive(Debug, Clone)]
pub struct LogConfig {
    pub app_env: String,
    pub log_level: String,
    pub log_dir: String,
    pub log_rotation: String,
    pub log_format: LogFormat,
    pub info_file_name: String,
    pub error_file_name: String,
    pub enable_file_logging: bool,
    pub enable_console_logging: bool,
}

impl LogConfig {
    pub fn from_env() -> Self {
        Self {
            app_env: env_or_default("APP_ENV", "local"),
            log_level: env_or_default("LOG_LEVEL", "info"),
            log_dir: env_or_default("LOG_DIR", "log_files"),
            log_rotation: env_or_default("LOG_ROTATION", "daily"),
            log_format: LogFormat::parse(&env_or_default("LOG_FORMAT", "text")),
            info_file_name: env_or_default("LOG_INFO_FILE", "info.log"),
            error_file_name: env_or_default("LOG_ERROR_FILE", "error.log"),
            enable_file_logging: env_is_true("ENABLE_FILE_LOGGING", true),
            enable_console_logging: env_is_true("ENABLE_CONSOLE_LOGGING", true),
        }
    }

    fn is_local(&self) -> bool {
        self.app_env.eq_ignore_ascii_case("local")
    }
}

/// 解析时间轮转策略
pub fn parse_rotation(s: &str) -> Rotation {
    match s.to_lowercase().as_str() {
        "minutely" | "minute" | "min" => Rotation::MINUTELY,
        "hourly" | "hour" | "hr" => Rotation::HOURLY,
        "daily" | "day" => Rotation::DAILY,
        "never" => Rotation::NEVER,
        _ => Rotation::DAILY,
    }
}

fn fmt_layer<W>(writer: W, ansi: bool, format: LogFormat, filter: &str) -> BoxedLayer
where
    W: for<'w> MakeWriter<'w> + Send + Sync + 'static,
{
    let layer = fmt::layer()
        .with_ansi(ansi)
        .with_target(false)
        .with_thread_ids(true)
        .with_file(true)
        .with_line_number(true)
        .with_level(true)
        .with_writer(writer);

    match format {
        LogFormat::Json => layer
            .json()
            .with_current_span(false)
            .with_filter(EnvFilter::new(filter))
            .boxed(),
        LogFormat::Text => layer.with_filter(EnvFilter::new(filter)).boxed(),
    }
}

/// 设置日志
///
/// local 环境只输出到控制台；其他环境写 info/error 两个滚动文件，控制台可选
pub fn setup_logging() -> anyhow::Result<()> {
    let config = LogConfig::from_env();
    let mut layers: Vec<BoxedLayer> = Vec::new();

    let file_logging = !config.is_local() && config.enable_file_logging;

    if file_logging {
        std::fs::create_dir_all(&config.log_dir).map_err(|e| {
            anyhow::anyhow!("Failed to create log directory '{}': {}", config.log_dir, e)
        })?;

        let info_file = RollingFileAppender::new(
            parse_rotation(&config.log_rotation),
            &config.log_dir,
            &config.info_file_name,
        );
        let error_file = RollingFileAppender::new(
            parse_rotation(&config.log_rotation),
            &config.log_dir,
            &config.error_file_name,
        );

        let (info_non_blocking, info_guard) = tracing_appender::non_blocking(info_file);
        let (error_non_blocking, error_guard) = tracing_appender::non_blocking(error_file);

        // 保存guard到全局，防止被丢弃
        INFO_GUARD
            .set(info_guard)
            .map_err(|_| anyhow::anyhow!("Failed to set INFO_GUARD"))?;
        ERROR_GUARD
            .set(error_guard)
            .map_err(|_| anyhow::anyhow!("Failed to set ERROR_GUARD"))?;

        layers.push(fmt_layer(
            info_non_blocking,
            false,
            config.log_format,
            &config.log_level,
        ));
        layers.push(fmt_layer(error_non_blocking, false, config.log_format, "error"));
    }

    if config.is_local() || config.enable_console_logging || !file_logging {
        layers.push(fmt_layer(
            std::io::stdout,
            config.is_local(),
            config.log_format,
            &config.log_level,
        ));
    }

    tracing::subscriber::set_global_default(Registry::default().with(layers))?;

    info!("Log configuration setup successfully!");
    info!(
        "Environment: {}, Log Level: {}, Format: {:?}, File Logging: {}, Console Logging: {}",
        config.app_env,
        config.log_level,
        config.log_format,
        file_logging,
        config.enable_console_logging
    );
    Ok(())
}
