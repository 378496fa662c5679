use anyhow::Result;
use clap::{Parser, Subcommand};
use dotenv::dotenv;
use tracing::{error, info};

use quant_bot::app::bootstrap;
use quant_bot::AppConfig;

#[derive(Parser, Debug)]
#[command(name = "quant_bot", version, about = "交易机器人数据层")]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug, Clone, Copy)]
enum Command {
    /// 启动数据层，直到收到 SIGINT / SIGTERM
    Serve,
    /// 探测数据库与缓存，输出 JSON
    Health,
    /// 创建表结构
    Migrate,
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenv().ok();
    quant_bot_core::logger::setup_logging()?;

    let cli = Cli::parse();
    let config = AppConfig::from_env()?;
    info!("环境: {}, 数据库: {}", config.app_env, config.database.display_target());

    match cli.command.unwrap_or(Command::Serve) {
        Command::Serve => bootstrap::serve(config).await,
        Command::Health => {
            let report = bootstrap::health(config).await?;
            println!("{}", serde_json::to_string_pretty(&report.to_json())?);
            if !report.is_healthy() {
                error!("数据库不可用");
                std::process::exit(1);
            }
            Ok(())
        }
        Command::Migrate => {
            bootstrap::migrate(config).await?;
            info!("建表完成");
            Ok(())
        }
    }
}
