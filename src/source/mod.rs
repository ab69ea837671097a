//! 库来源模块
//!
//! 在遍历开始前准备好本地库目录：
//!
//! - [`VaultConfig::File`] - 直接使用本地目录
//! - [`VaultConfig::S3`] - 将对象存储中的全部文件下载到暂存目录

pub mod s3;

use crate::core::config::VaultConfig;
use anyhow::{bail, Result};
use std::path::PathBuf;
use tracing::info;

/// 准备库目录
///
/// 远程来源必须完整下载成功，否则整个构建失败
///
/// # Returns
///
/// 本地库根目录
pub fn prepare_vault(vault: &VaultConfig) -> Result<PathBuf> {
    match vault {
        VaultConfig::File { path } => {
            if !path.is_dir() {
                bail!("{}: not a valid vault", path.display());
            }
            info!("Using local vault {:?}", path);
            Ok(path.clone())
        }
        VaultConfig::S3(s3_config) => s3::fetch_vault(s3_config),
    }
}
