mod runner;

use anyhow::Result;
use hif_core::config::{HifConfig, load_config_from_toml_str};
use std::sync::Arc;

// --- 1. 选择传输层实现 ---
#[cfg(feature = "transport_mock")]
fn get_transport() -> Arc<hif_core::transports::mock::MockTransport> {
    tracing::info!("🚀 Using mock transport");
    Arc::new(hif_core::transports::mock::MockTransport::new())
}

// 如果没有选择任何传输层，编译失败
#[cfg(not(feature = "transport_mock"))]
compile_error!("No transport feature selected. Please choose one, e.g., --features hif-daemon/transport_mock");

fn load_config() -> Result<HifConfig> {
    const CONFIG_TOML: &str = include_str!("../configs/hif.toml");
    Ok(load_config_from_toml_str(CONFIG_TOML)?)
}

#[tokio::main]
async fn main() -> Result<()> {
    // 1. 初始化日志
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    // 2. 在编译时决定实例化哪个传输层
    let config = load_config()?;
    let transport = get_transport();

    // 3. 跑一遍脚本化的会话
    if let Err(e) = runner::run_session(transport, config).await {
        tracing::error!("❌ Session failed: {:#}", e);
        std::process::exit(1);
    }
    Ok(())
}
