use axum::{extract::Json, http::StatusCode, response::Json as ResponseJson};
use serde::{Deserialize, Serialize};
use tracing::{error, info, warn};

use crate::config::ConfigLoader;
use crate::generation::HttpGenerationBackend;
use crate::pipeline::ScenePipeline;
use crate::publisher::HttpPublisher;
use crate::scene::SceneSpec;
use crate::script::parse_scene_script;

/// 成片生成请求：结构化场景列表和自由文本脚本二选一
#[derive(Debug, Deserialize)]
pub struct GenerateRequest {
    /// 结构化场景列表（优先使用）
    pub scenes: Option<Vec<SceneSpec>>,

    /// 脚本协作方的自由文本响应，内嵌 JSON 场景数组
    pub script_text: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct GenerateResponse {
    pub success: bool,
    pub message: String,
    pub playback_url: Option<String>,
}

/// 健康检查 Handler
pub async fn health_check() -> &'static str {
    "OK"
}

/// 成片生成 Handler
///
/// 每个请求使用独立的工作目录，互不干扰；
/// 管线自身保证无论成败都清空该目录下本次运行的文件。
pub async fn handle_generate(
    Json(request): Json<GenerateRequest>,
) -> Result<ResponseJson<GenerateResponse>, (StatusCode, String)> {
    info!("收到成片生成请求");

    let scenes = match (request.scenes, request.script_text) {
        (Some(scenes), _) => scenes,
        (None, Some(text)) => parse_scene_script(&text)
            .map_err(|e| (StatusCode::BAD_REQUEST, format!("解析脚本失败: {}", e)))?,
        (None, None) => {
            return Err((
                StatusCode::BAD_REQUEST,
                "必须提供 scenes 或 script_text".to_string(),
            ));
        }
    };

    // 以请求维度隔离工作目录
    let request_id = uuid::Uuid::new_v4().to_string();
    let working_dir = std::env::temp_dir().join("movie-gen").join(&request_id);

    let config = ConfigLoader::load_config(None, Some(working_dir)).map_err(|e| {
        (
            StatusCode::INTERNAL_SERVER_ERROR,
            format!("加载配置失败: {}", e),
        )
    })?;

    let backend = HttpGenerationBackend::new(&config);
    let publisher = HttpPublisher::new(&config);
    let mut pipeline = ScenePipeline::new(&backend, &publisher, &config);

    let result = pipeline.run(&scenes).await;
    // 管线已清理自己落盘的文件，这里再移除请求级目录本身
    remove_request_dir(&config.working_dir).await;

    match result {
        Ok(url) => Ok(ResponseJson(GenerateResponse {
            success: true,
            message: format!("成片已发布，共 {} 个场景", scenes.len()),
            playback_url: Some(url),
        })),
        Err(e) => {
            error!("成片生成失败: {}", e);
            Err((
                StatusCode::INTERNAL_SERVER_ERROR,
                format!("成片生成失败: {}", e),
            ))
        }
    }
}

/// 移除请求级工作目录，失败只记日志
async fn remove_request_dir(dir: &std::path::Path) {
    if !dir.exists() {
        return;
    }
    if let Err(e) = tokio::fs::remove_dir_all(dir).await {
        warn!("移除请求工作目录失败: {}: {}", dir.display(), e);
    }
}
