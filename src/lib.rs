pub mod cli;
pub mod core;
pub mod source;
pub mod storage;

use tracing::Level;

/// 初始化日志
///
/// `verbose` 为 `true` 时输出 debug 级别日志
pub fn init(verbose: bool) -> anyhow::Result<()> {
    let level = if verbose { Level::DEBUG } else { Level::INFO };
    tracing_subscriber::fmt()
        .with_max_level(level)
        .with_target(false)
        .try_init()
        .map_err(|e| anyhow::anyhow!("Failed to initialize logging: {}", e))?;
    Ok(())
}
