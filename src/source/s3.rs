//! S3 兼容对象存储来源
//!
//! 通过 `ListObjectsV2` 分页列出前缀下的所有对象，逐个下载到本地暂存目录。
//! 请求使用 AWS Signature V4 签名（`hmac` + `sha2`），支持 AWS S3 以及
//! MinIO 等自定义端点（路径风格访问）。
//!
//! 每一页对象全部下载完成后才请求下一页；任一请求失败都会中止构建。
//! 下载后的文件修改时间设为对象的 `LastModified`，以便增量构建复用旧条目。

use crate::core::config::S3Config;
use anyhow::{bail, Context, Result};
use chrono::{DateTime, Utc};
use hmac::{Hmac, Mac};
use sha2::{Digest, Sha256};
use std::fs;
use std::path::{Component, Path, PathBuf};
use std::time::SystemTime;
use tracing::{debug, info};

type HmacSha256 = Hmac<Sha256>;

/// 将远程库下载到暂存目录
///
/// # Returns
///
/// 暂存目录路径
pub fn fetch_vault(config: &S3Config) -> Result<PathBuf> {
    let creds = Credentials::resolve(config)?;
    let endpoint = Endpoint::new(config);
    let client = reqwest::blocking::Client::new();
    let staging = &config.staging;

    if staging.exists() {
        fs::remove_dir_all(staging)
            .with_context(|| format!("Failed to clear staging directory {:?}", staging))?;
    }
    fs::create_dir_all(staging)
        .with_context(|| format!("Failed to create staging directory {:?}", staging))?;

    info!("Fetching s3://{}/{} into {:?}", config.bucket, config.prefix, staging);

    let mut continuation: Option<String> = None;
    let mut fetched = 0usize;
    loop {
        let page = list_page(&client, &endpoint, config, &creds, continuation.as_deref())?;

        for object in &page.objects {
            let Some(rel) = staging_relpath(&config.prefix, &object.key)? else {
                continue;
            };
            let dest = staging.join(&rel);

            if object.key.ends_with('/') {
                fs::create_dir_all(&dest)
                    .with_context(|| format!("Failed to create directory {:?}", dest))?;
                continue;
            }

            info!("{}", object.key);
            download_object(&client, &endpoint, config, &creds, object, &dest)?;
            fetched += 1;
        }

        match (page.is_truncated, page.next_token) {
            (true, Some(token)) => continuation = Some(token),
            _ => break,
        }
    }

    info!("Fetched {} objects from s3://{}", fetched, config.bucket);
    Ok(staging.clone())
}

// ============ Credentials ============

struct Credentials {
    access_key_id: String,
    secret_access_key: String,
    session_token: Option<String>,
}

impl Credentials {
    /// 优先使用配置中的密钥，其次读取环境变量
    fn resolve(config: &S3Config) -> Result<Self> {
        let access_key_id = match &config.access_key {
            Some(key) => key.clone(),
            None => std::env::var("AWS_ACCESS_KEY_ID")
                .context("AWS_ACCESS_KEY_ID environment variable not set")?,
        };
        let secret_access_key = match &config.secret_key {
            Some(key) => key.clone(),
            None => std::env::var("AWS_SECRET_ACCESS_KEY")
                .context("AWS_SECRET_ACCESS_KEY environment variable not set")?,
        };
        let session_token = std::env::var("AWS_SESSION_TOKEN").ok();

        Ok(Self {
            access_key_id,
            secret_access_key,
            session_token,
        })
    }
}

// ============ Endpoint ============

/// 请求地址：AWS 使用虚拟主机风格，自定义端点使用路径风格
#[derive(Debug, Clone, PartialEq)]
struct Endpoint {
    scheme: String,
    host: String,
    /// 路径风格时为 `/<bucket>`，否则为空
    base: String,
}

impl Endpoint {
    fn new(config: &S3Config) -> Self {
        match &config.endpoint {
            Some(url) => {
                let (scheme, rest) = url.split_once("://").unwrap_or(("https", url.as_str()));
                Self {
                    scheme: scheme.to_string(),
                    host: rest.trim_end_matches('/').to_string(),
                    base: format!("/{}", uri_encode(&config.bucket)),
                }
            }
            None => Self {
                scheme: "https".to_string(),
                host: format!("{}.s3.{}.amazonaws.com", config.bucket, config.region),
                base: String::new(),
            },
        }
    }

    fn list_uri(&self) -> String {
        if self.base.is_empty() {
            "/".to_string()
        } else {
            self.base.clone()
        }
    }

    fn object_uri(&self, key: &str) -> String {
        let encoded = key.split('/').map(uri_encode).collect::<Vec<_>>().join("/");
        format!("{}/{}", self.base, encoded)
    }

    fn url(&self, uri: &str, query: &str) -> String {
        if query.is_empty() {
            format!("{}://{}{}", self.scheme, self.host, uri)
        } else {
            format!("{}://{}{}?{}", self.scheme, self.host, uri, query)
        }
    }
}

// ============ Listing ============

/// `ListObjectsV2` 结果中的单个对象
#[derive(Debug, Clone, PartialEq)]
struct S3Object {
    key: String,
    last_modified: Option<DateTime<Utc>>,
    size: u64,
}

/// 一页列表结果
#[derive(Debug, Default)]
struct ListPage {
    objects: Vec<S3Object>,
    is_truncated: bool,
    next_token: Option<String>,
}

fn list_page(
    client: &reqwest::blocking::Client,
    endpoint: &Endpoint,
    config: &S3Config,
    creds: &Credentials,
    continuation: Option<&str>,
) -> Result<ListPage> {
    let mut params = vec![
        ("list-type".to_string(), "2".to_string()),
        ("max-keys".to_string(), "1000".to_string()),
    ];
    if !config.prefix.is_empty() {
        params.push(("prefix".to_string(), config.prefix.clone()));
    }
    if let Some(token) = continuation {
        params.push(("continuation-token".to_string(), token.to_string()));
    }
    params.sort();

    let query = params
        .iter()
        .map(|(k, v)| format!("{}={}", uri_encode(k), uri_encode(v)))
        .collect::<Vec<_>>()
        .join("&");

    let uri = endpoint.list_uri();
    let headers = sign_request(endpoint, &uri, &query, config, creds, Utc::now())?;

    let mut request = client.get(endpoint.url(&uri, &query));
    for (name, value) in &headers {
        request = request.header(name.as_str(), value.as_str());
    }

    let resp = request.send().with_context(|| {
        format!("Failed to list s3://{}/{}", config.bucket, config.prefix)
    })?;
    if !resp.status().is_success() {
        let status = resp.status();
        let body = resp.text().unwrap_or_default();
        bail!(
            "S3 ListObjectsV2 failed (HTTP {}): {}",
            status,
            body.chars().take(500).collect::<String>()
        );
    }

    let xml = resp.text()?;
    let page = parse_list_objects_response(&xml);
    debug!("Listed {} objects (truncated: {})", page.objects.len(), page.is_truncated);
    Ok(page)
}

fn download_object(
    client: &reqwest::blocking::Client,
    endpoint: &Endpoint,
    config: &S3Config,
    creds: &Credentials,
    object: &S3Object,
    dest: &Path,
) -> Result<()> {
    let uri = endpoint.object_uri(&object.key);
    let headers = sign_request(endpoint, &uri, "", config, creds, Utc::now())?;

    let mut request = client.get(endpoint.url(&uri, ""));
    for (name, value) in &headers {
        request = request.header(name.as_str(), value.as_str());
    }

    let mut resp = request
        .send()
        .with_context(|| format!("Failed to get s3://{}/{}", config.bucket, object.key))?;
    if !resp.status().is_success() {
        bail!("S3 GetObject failed (HTTP {}) for key '{}'", resp.status(), object.key);
    }

    if let Some(parent) = dest.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create directory {:?}", parent))?;
    }
    let mut file = fs::File::create(dest)
        .with_context(|| format!("Failed to create {:?}", dest))?;
    let written = resp
        .copy_to(&mut file)
        .with_context(|| format!("Failed to download s3://{}/{}", config.bucket, object.key))?;
    if written != object.size {
        debug!("Size mismatch for {}: listed {}, got {}", object.key, object.size, written);
    }

    if let Some(modified) = object.last_modified {
        file.set_modified(SystemTime::from(modified))
            .with_context(|| format!("Failed to set modification time of {:?}", dest))?;
    }

    Ok(())
}

/// 去掉前缀后的暂存相对路径
///
/// 前缀本身返回 `None`；包含 `..` 的键会被拒绝
fn staging_relpath(prefix: &str, key: &str) -> Result<Option<PathBuf>> {
    let rel = key.strip_prefix(prefix).unwrap_or(key).trim_start_matches('/');
    if rel.is_empty() {
        return Ok(None);
    }

    let path = PathBuf::from(rel);
    if path.components().any(|c| !matches!(c, Component::Normal(_))) {
        bail!("Refusing to stage object key outside the vault: {}", key);
    }
    Ok(Some(path))
}

// ============ AWS SigV4 ============

/// 生成 GET 请求的签名头
fn sign_request(
    endpoint: &Endpoint,
    canonical_uri: &str,
    canonical_query: &str,
    config: &S3Config,
    creds: &Credentials,
    now: DateTime<Utc>,
) -> Result<Vec<(String, String)>> {
    let date_stamp = now.format("%Y%m%d").to_string();
    let amz_date = now.format("%Y%m%dT%H%M%SZ").to_string();
    let payload_hash = hex_sha256(b"");

    let mut headers = vec![
        ("host".to_string(), endpoint.host.clone()),
        ("x-amz-content-sha256".to_string(), payload_hash.clone()),
        ("x-amz-date".to_string(), amz_date.clone()),
    ];
    if let Some(token) = &creds.session_token {
        headers.push(("x-amz-security-token".to_string(), token.clone()));
    }
    headers.sort();

    let signed_headers = headers
        .iter()
        .map(|(k, _)| k.as_str())
        .collect::<Vec<_>>()
        .join(";");
    let canonical_headers: String = headers
        .iter()
        .map(|(k, v)| format!("{}:{}\n", k, v.trim()))
        .collect();

    let canonical_request = format!(
        "GET\n{}\n{}\n{}\n{}\n{}",
        canonical_uri, canonical_query, canonical_headers, signed_headers, payload_hash
    );

    let credential_scope = format!("{}/{}/s3/aws4_request", date_stamp, config.region);
    let string_to_sign = format!(
        "AWS4-HMAC-SHA256\n{}\n{}\n{}",
        amz_date,
        credential_scope,
        hex_sha256(canonical_request.as_bytes())
    );

    let signing_key =
        derive_signing_key(&creds.secret_access_key, &date_stamp, &config.region, "s3")?;
    let signature = hex::encode(hmac_sha256(&signing_key, string_to_sign.as_bytes())?);

    let authorization = format!(
        "AWS4-HMAC-SHA256 Credential={}/{}, SignedHeaders={}, Signature={}",
        creds.access_key_id, credential_scope, signed_headers, signature
    );

    // reqwest 会自行设置 host 头
    let mut out: Vec<(String, String)> = headers.into_iter().filter(|(k, _)| k != "host").collect();
    out.push(("authorization".to_string(), authorization));
    Ok(out)
}

fn hex_sha256(data: &[u8]) -> String {
    hex::encode(Sha256::digest(data))
}

fn hmac_sha256(key: &[u8], data: &[u8]) -> Result<Vec<u8>> {
    let mut mac = HmacSha256::new_from_slice(key)
        .map_err(|e| anyhow::anyhow!("Invalid HMAC key: {}", e))?;
    mac.update(data);
    Ok(mac.finalize().into_bytes().to_vec())
}

/// 派生 SigV4 签名密钥
///
/// ```text
/// kDate    = HMAC("AWS4" + secret, dateStamp)
/// kRegion  = HMAC(kDate, region)
/// kService = HMAC(kRegion, service)
/// kSigning = HMAC(kService, "aws4_request")
/// ```
fn derive_signing_key(secret: &str, date_stamp: &str, region: &str, service: &str) -> Result<Vec<u8>> {
    let k_date = hmac_sha256(format!("AWS4{}", secret).as_bytes(), date_stamp.as_bytes())?;
    let k_region = hmac_sha256(&k_date, region.as_bytes())?;
    let k_service = hmac_sha256(&k_region, service.as_bytes())?;
    hmac_sha256(&k_service, b"aws4_request")
}

/// RFC 3986 编码，只保留非保留字符 `A-Z a-z 0-9 - _ . ~`
fn uri_encode(s: &str) -> String {
    let mut result = String::with_capacity(s.len());
    for byte in s.bytes() {
        match byte {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'_' | b'.' | b'~' => {
                result.push(byte as char)
            }
            _ => result.push_str(&format!("%{:02X}", byte)),
        }
    }
    result
}

// ============ XML ============

fn parse_list_objects_response(xml: &str) -> ListPage {
    let mut page = ListPage {
        is_truncated: extract_xml_value(xml, "IsTruncated").is_some_and(|v| v == "true"),
        next_token: extract_xml_value(xml, "NextContinuationToken"),
        ..Default::default()
    };

    let mut remaining = xml;
    while let Some(start) = remaining.find("<Contents>") {
        let block_start = start + "<Contents>".len();
        let Some(end) = remaining[block_start..].find("</Contents>") else {
            break;
        };
        let block = &remaining[block_start..block_start + end];

        if let Some(key) = extract_xml_value(block, "Key").filter(|k| !k.is_empty()) {
            let last_modified = extract_xml_value(block, "LastModified")
                .and_then(|s| DateTime::parse_from_rfc3339(&s).ok())
                .map(|dt| dt.with_timezone(&Utc));
            let size = extract_xml_value(block, "Size")
                .and_then(|s| s.parse().ok())
                .unwrap_or(0);

            page.objects.push(S3Object {
                key,
                last_modified,
                size,
            });
        }

        remaining = &remaining[block_start + end + "</Contents>".len()..];
    }

    page
}

/// 提取简单（不嵌套）标签的文本
fn extract_xml_value(xml: &str, tag: &str) -> Option<String> {
    let open = format!("<{}>", tag);
    let close = format!("</{}>", tag);
    let start = xml.find(&open)? + open.len();
    let end = xml[start..].find(&close)?;
    Some(xml_unescape(&xml[start..start + end]))
}

fn xml_unescape(s: &str) -> String {
    s.replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&apos;", "'")
        .replace("&amp;", "&")
}
