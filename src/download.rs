use std::path::Path;
use tokio::io::AsyncWriteExt;
use tracing::{debug, info};

use crate::error::{PipelineError, Result};

/// 网关已知的畸形 URL 前缀
///
/// 生成网关返回的资源 URL 有时会在真实地址前多拼一段 scheme+端口，
/// 必须剥掉才能访问。这是一条未在文档中出现的外部契约，单独成规则，
/// 供应商修复后可独立删除；在未经实测确认前不要猜测它是否仍然需要。
const MALFORMED_GATEWAY_PREFIX: &str = "https://dream-gateway.livepeer.cloud:";

/// 资源 URL 归一化规则
///
/// 只处理已知的网关前缀问题；归一化一次之后只做单次下载，
/// 重试是调用方（生成调用边界）的事。
pub fn normalize_asset_url(url: &str) -> String {
    url.replacen(MALFORMED_GATEWAY_PREFIX, "", 1)
}

/// 把远端资产流式写入本地文件
///
/// 响应体逐块落盘，整份资产不进内存。
/// 失败语义：传输失败或非成功状态返回 Download，本地写入失败返回 Write；
/// 流中断时留下的半成品文件由调用方决定是否丢弃，本函数不代为删除。
pub async fn download_to_file(
    client: &reqwest::Client,
    remote_url: &str,
    dest: &Path,
) -> Result<()> {
    let url = normalize_asset_url(remote_url);
    if url != remote_url {
        debug!("已归一化资源 URL: {} -> {}", remote_url, url);
    }
    info!("开始下载: {} -> {}", url, dest.display());

    let mut response = client
        .get(&url)
        .send()
        .await
        .map_err(|e| PipelineError::Download(format!("请求 {} 失败: {}", url, e)))?;

    if !response.status().is_success() {
        return Err(PipelineError::Download(format!(
            "下载 {} 返回状态 {}",
            url,
            response.status()
        )));
    }

    let mut file = tokio::fs::File::create(dest)
        .await
        .map_err(PipelineError::Write)?;

    while let Some(chunk) = response
        .chunk()
        .await
        .map_err(|e| PipelineError::Download(format!("读取 {} 响应流失败: {}", url, e)))?
    {
        file.write_all(&chunk).await.map_err(PipelineError::Write)?;
    }
    file.flush().await.map_err(PipelineError::Write)?;

    info!("下载完成: {}", dest.display());
    Ok(())
}
