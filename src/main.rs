use anyhow::Result;
use bucketsync_lib::config::{default_config_dir, AppConfig, CONFIG_FILE};
use bucketsync_lib::{create_store, logging, InboundSyncSource};
use std::path::PathBuf;
use std::time::Duration;
use tracing::{error, info};

#[tokio::main]
async fn main() -> Result<()> {
    let config_dir = default_config_dir();
    let config_file = std::env::args()
        .nth(1)
        .map(PathBuf::from)
        .unwrap_or_else(|| config_dir.join(CONFIG_FILE));

    let config = AppConfig::load_file(&config_file)?;
    logging::init(&config.log, &config_dir)?;
    info!("使用配置文件: {:?}", config_file);

    let store = create_store(&config.store).await?;
    let source = InboundSyncSource::new(store, &config.sync)?;
    let interval = Duration::from_secs(config.sync.poll_interval_secs.max(1));

    let mut ticker = tokio::time::interval(interval);
    loop {
        tokio::select! {
            _ = ticker.tick() => {
                // 取完本轮所有新文件
                loop {
                    match source.receive().await {
                        Ok(Some(file)) => info!("收到新文件: {:?}", file),
                        Ok(None) => break,
                        Err(e) => {
                            error!("同步失败: {:#}", e);
                            break;
                        }
                    }
                }
            }
            _ = tokio::signal::ctrl_c() => {
                info!("收到退出信号，停止同步");
                break;
            }
        }
    }

    Ok(())
}
