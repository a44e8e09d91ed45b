use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use serde::Deserialize;
use std::path::Path;
use tokio::io::AsyncReadExt;
use tracing::{debug, info};

use crate::config::PipelineConfig;
use crate::error::{PipelineError, Result};
use crate::pipeline::Publisher;
use async_trait::async_trait;

const DEFAULT_CHUNK_SIZE: usize = 5 * 1024 * 1024;

#[derive(Debug, Deserialize)]
struct RequestUploadResponse {
    #[serde(rename = "tusEndpoint")]
    tus_endpoint: String,
    asset: UploadAsset,
}

#[derive(Debug, Deserialize)]
struct UploadAsset {
    #[serde(rename = "playbackId")]
    playback_id: String,
}

/// 把成片分片上传到视频托管服务并换取播放地址
pub struct HttpPublisher {
    api_url: String,
    api_key: String,
    client: reqwest::Client,
    chunk_size: usize,
}

impl HttpPublisher {
    pub fn new(config: &PipelineConfig) -> Self {
        Self {
            api_url: config.publish_api_url.clone(),
            api_key: config.api_key.clone(),
            client: reqwest::Client::new(),
            chunk_size: DEFAULT_CHUNK_SIZE,
        }
    }

    /// 向托管服务申请一次上传，拿到 tus 端点和播放 id
    async fn request_upload(&self) -> Result<RequestUploadResponse> {
        let response = self
            .client
            .post(format!("{}/asset/request-upload", self.api_url))
            .bearer_auth(&self.api_key)
            .json(&serde_json::json!({ "name": "AI Generated Movie Scene" }))
            .send()
            .await?;
        if !response.status().is_success() {
            return Err(PipelineError::Service(format!(
                "申请上传失败，状态 {}",
                response.status()
            )));
        }
        Ok(response.json().await?)
    }

    /// 分片推送文件内容到 tus 端点
    ///
    /// 每个分片从文件句柄按需读取，成片不整体进内存。
    async fn upload_chunks(&self, endpoint: &str, artifact: &Path, total: u64) -> Result<()> {
        let response = self
            .client
            .post(endpoint)
            .header("Tus-Resumable", "1.0.0")
            .header("Upload-Length", total.to_string())
            .header("Upload-Metadata", upload_metadata("movie_scene.mp4"))
            .send()
            .await?;
        if !response.status().is_success() {
            return Err(PipelineError::Service(format!(
                "创建上传会话失败，状态 {}",
                response.status()
            )));
        }
        let location = response
            .headers()
            .get("Location")
            .and_then(|v| v.to_str().ok())
            .map(|s| s.to_string())
            .unwrap_or_else(|| endpoint.to_string());

        let mut file = tokio::fs::File::open(artifact).await?;
        let mut buf = vec![0u8; self.chunk_size];
        let mut offset = 0u64;
        while offset < total {
            let mut filled = 0usize;
            while filled < buf.len() {
                let n = file.read(&mut buf[filled..]).await?;
                if n == 0 {
                    break;
                }
                filled += n;
            }
            if filled == 0 {
                break;
            }
            debug!("上传分片 {}..{} / {}", offset, offset + filled as u64, total);
            let response = self
                .client
                .patch(&location)
                .header("Tus-Resumable", "1.0.0")
                .header("Upload-Offset", offset.to_string())
                .header("Content-Type", "application/offset+octet-stream")
                .body(buf[..filled].to_vec())
                .send()
                .await?;
            if !response.status().is_success() {
                return Err(PipelineError::Service(format!(
                    "分片上传失败，偏移 {}，状态 {}",
                    offset,
                    response.status()
                )));
            }
            offset += filled as u64;
        }
        Ok(())
    }
}

/// tus Upload-Metadata 头：逗号分隔的 `键 base64(值)` 对
fn upload_metadata(filename: &str) -> String {
    format!(
        "filename {},filetype {}",
        BASE64.encode(filename),
        BASE64.encode("video/mp4")
    )
}

#[async_trait]
impl Publisher for HttpPublisher {
    async fn publish(&self, artifact: &Path) -> Result<String> {
        let total = tokio::fs::metadata(artifact).await?.len();
        info!("📤 申请上传成片 ({} 字节)", total);
        let upload = self.request_upload().await?;
        self.upload_chunks(&upload.tus_endpoint, artifact, total)
            .await?;
        let url = format!("https://lvpr.tv/?v={}", upload.asset.playback_id);
        info!("🔗 成片已发布: {}", url);
        Ok(url)
    }
}
