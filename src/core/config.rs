//! 构建配置模块
//!
//! 从 TOML 文件加载构建配置
//!
//! ## 配置格式
//!
//! ```toml
//! name = "我的笔记"
//! output = "dist"
//! ignore = [".", "_"]
//!
//! [vault]
//! type = "file"
//! path = "vault"
//!
//! [metadata]
//! hidden = ["private"]
//! ```

use crate::core::walker::DEFAULT_IGNORE;
use crate::storage::IndexMetadata;
use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

/// 默认配置文件名
pub const DEFAULT_CONFIG_FILE: &str = "vaultpack.toml";

/// 对象目录名（位于输出目录下）
pub const OBJECTS_DIR: &str = ".objects";

/// 索引文件名（位于对象目录下）
pub const INDEX_FILE: &str = "index";

/// 构建配置
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    /// 站点名称
    #[serde(default)]
    pub name: Option<String>,

    /// 站点描述
    #[serde(default)]
    pub description: Option<String>,

    /// 站点语言
    #[serde(default)]
    pub language: Option<String>,

    /// 输出目录
    #[serde(default = "default_output")]
    pub output: PathBuf,

    /// 忽略前缀列表
    ///
    /// 以这些前缀开头的文件和目录不会被索引
    #[serde(default = "default_ignore")]
    pub ignore: Vec<String>,

    /// 库来源
    pub vault: VaultConfig,

    /// 写入索引的元数据
    #[serde(default)]
    pub metadata: IndexMetadata,
}

/// 库来源配置
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum VaultConfig {
    /// 本地目录
    File {
        path: PathBuf,
    },
    /// S3 兼容对象存储（含 MinIO）
    #[serde(alias = "minio")]
    S3(S3Config),
}

/// S3 来源配置
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct S3Config {
    /// 桶名
    pub bucket: String,

    /// 对象键前缀
    #[serde(default)]
    pub prefix: String,

    /// 区域
    #[serde(default = "default_region")]
    pub region: String,

    /// 自定义端点（MinIO、LocalStack 等），使用路径风格访问
    #[serde(default)]
    pub endpoint: Option<String>,

    /// 本地暂存目录，每次构建前清空
    #[serde(default = "default_staging")]
    pub staging: PathBuf,

    /// 访问密钥，缺省时读取 `AWS_ACCESS_KEY_ID`
    #[serde(default)]
    pub access_key: Option<String>,

    /// 私有密钥，缺省时读取 `AWS_SECRET_ACCESS_KEY`
    #[serde(default)]
    pub secret_key: Option<String>,
}

fn default_output() -> PathBuf {
    PathBuf::from("dist")
}

fn default_ignore() -> Vec<String> {
    DEFAULT_IGNORE.iter().map(|s| s.to_string()).collect()
}

fn default_region() -> String {
    "us-east-1".to_string()
}

fn default_staging() -> PathBuf {
    PathBuf::from(".vault-staging")
}

impl Config {
    /// 以本地目录为来源的默认配置
    pub fn for_vault(path: impl Into<PathBuf>) -> Self {
        Self {
            name: None,
            description: None,
            language: None,
            output: default_output(),
            ignore: default_ignore(),
            vault: VaultConfig::File { path: path.into() },
            metadata: IndexMetadata::default(),
        }
    }

    /// 从 TOML 字符串解析
    pub fn parse(content: &str) -> Result<Self> {
        toml::from_str(content).context("Invalid configuration")
    }

    /// 从文件加载配置
    ///
    /// 相对路径以配置文件所在目录为基准
    ///
    /// # Arguments
    ///
    /// * `path` - 配置文件路径
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config {:?}", path))?;
        let config = Self::parse(&content)
            .with_context(|| format!("Failed to load config {:?}", path))?;

        let base = path
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .unwrap_or_else(|| Path::new("."));
        Ok(config.relative_to(base))
    }

    /// 将相对路径解析到 `base` 下
    pub fn relative_to(mut self, base: &Path) -> Self {
        let rebase = |p: &mut PathBuf| {
            if p.is_relative() {
                *p = base.join(&*p);
            }
        };

        rebase(&mut self.output);
        match &mut self.vault {
            VaultConfig::File { path } => rebase(path),
            VaultConfig::S3(s3) => rebase(&mut s3.staging),
        }
        self
    }

    /// 对象目录
    pub fn objects_dir(&self) -> PathBuf {
        self.output.join(OBJECTS_DIR)
    }

    /// 索引文件路径
    pub fn index_path(&self) -> PathBuf {
        self.objects_dir().join(INDEX_FILE)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_parse_file_vault() {
        let config = Config::parse(
            r#"
name = "笔记"

[vault]
type = "file"
path = "notes"

[metadata]
hidden = ["private"]
footer = "© notes"

[metadata.routes]
"/" = "index"

[metadata.theme]
accent = 3
"#,
        )
        .unwrap();

        assert_eq!(config.name.as_deref(), Some("笔记"));
        assert_eq!(config.output, PathBuf::from("dist"));
        assert_eq!(config.ignore, vec![".", "_"]);
        assert_eq!(config.vault, VaultConfig::File { path: PathBuf::from("notes") });
        assert_eq!(config.metadata.hidden, vec!["private"]);
        assert_eq!(config.metadata.routes["/"], "index");
        assert_eq!(config.metadata.extra["footer"], serde_json::json!("© notes"));
        assert_eq!(config.metadata.extra["theme"], serde_json::json!({ "accent": 3 }));
        assert_eq!(config.index_path(), PathBuf::from("dist/.objects/index"));
    }

    #[test]
    fn test_parse_minio_alias() {
        let config = Config::parse(
            r#"
[vault]
type = "minio"
bucket = "notes"
prefix = "vault/"
endpoint = "http://localhost:9000"
"#,
        )
        .unwrap();

        match config.vault {
            VaultConfig::S3(s3) => {
                assert_eq!(s3.bucket, "notes");
                assert_eq!(s3.prefix, "vault/");
                assert_eq!(s3.region, "us-east-1");
                assert_eq!(s3.staging, PathBuf::from(".vault-staging"));
            }
            other => panic!("Expected S3 vault, got {:?}", other),
        }
    }

    #[test]
    fn test_parse_unsupported_vault_type() {
        let result = Config::parse("[vault]\ntype = \"ftp\"\npath = \"x\"\n");
        assert!(result.is_err());
    }

    #[test]
    fn test_parse_missing_vault() {
        assert!(Config::parse("name = \"x\"\n").is_err());
    }

    #[test]
    fn test_load_resolves_relative_paths() {
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join(DEFAULT_CONFIG_FILE);
        std::fs::write(&config_path, "output = \"site\"\n[vault]\ntype = \"file\"\npath = \"vault\"\n").unwrap();

        let config = Config::load(&config_path).unwrap();
        assert_eq!(config.output, temp_dir.path().join("site"));
        assert_eq!(config.vault, VaultConfig::File { path: temp_dir.path().join("vault") });
    }
}
