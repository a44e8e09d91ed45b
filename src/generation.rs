use async_trait::async_trait;
use serde::Deserialize;
use std::path::Path;
use tracing::info;

use crate::config::PipelineConfig;
use crate::error::{PipelineError, Result};

/// 外部生成服务的统一入口
///
/// 契约：不透明请求进、资产引用或原始字节出，可能瞬时失败。
/// 重试由调用方在生成调用边界（retry 模块）负责，这里只做单次调用。
#[async_trait]
pub trait GenerationBackend: Send + Sync {
    /// 文生图，返回远端图片 URL
    async fn generate_image(&self, prompt: &str) -> Result<String>;

    /// 图生视频，返回远端视频 URL
    async fn image_to_video(&self, image_path: &Path) -> Result<String>;

    /// 语音合成，返回音频字节
    async fn text_to_speech(&self, voice_id: &str, text: &str) -> Result<Vec<u8>>;

    /// 音效合成，返回音频字节
    async fn sound_effect(&self, prompt: &str) -> Result<Vec<u8>>;
}

/// 生成接口返回的远端资产引用
#[derive(Debug, Clone, Deserialize)]
pub struct RemoteAssetRef {
    pub url: String,
}

#[derive(Debug, Deserialize)]
struct MediaGenerationResponse {
    images: Vec<RemoteAssetRef>,
}

/// 基于 HTTP 的生成后端实现
///
/// 图像/视频走生成网关（Bearer 认证），语音/音效走语音服务（xi-api-key 认证），
/// 接口路径与载荷形状都是固定的外部契约。
pub struct HttpGenerationBackend {
    client: reqwest::Client,
    gateway_url: String,
    speech_api_url: String,
    api_key: String,
    speech_api_key: String,
}

impl HttpGenerationBackend {
    pub fn new(config: &PipelineConfig) -> Self {
        Self {
            client: reqwest::Client::new(),
            gateway_url: config.gateway_url.clone(),
            speech_api_url: config.speech_api_url.clone(),
            api_key: config.api_key.clone(),
            speech_api_key: config.speech_api_key.clone(),
        }
    }

    async fn first_asset_url(response: reqwest::Response, what: &str) -> Result<String> {
        if !response.status().is_success() {
            let status = response.status();
            let text = response.text().await.unwrap_or_default();
            return Err(PipelineError::Service(format!(
                "{} 接口返回 {}: {}",
                what, status, text
            )));
        }
        let parsed: MediaGenerationResponse = response.json().await?;
        parsed
            .images
            .first()
            .map(|asset| asset.url.clone())
            .ok_or_else(|| PipelineError::Service(format!("{} 响应中没有资产 URL", what)))
    }

    async fn audio_bytes(response: reqwest::Response, what: &str) -> Result<Vec<u8>> {
        if !response.status().is_success() {
            let status = response.status();
            let text = response.text().await.unwrap_or_default();
            return Err(PipelineError::Service(format!(
                "{} 接口返回 {}: {}",
                what, status, text
            )));
        }
        Ok(response.bytes().await?.to_vec())
    }
}

#[async_trait]
impl GenerationBackend for HttpGenerationBackend {
    async fn generate_image(&self, prompt: &str) -> Result<String> {
        info!("请求文生图: {}", prompt);
        let body = serde_json::json!({
            "model_id": "ByteDance/SDXL-Lightning",
            "prompt": prompt,
            "width": 1280,
            "height": 720,
        });
        let response = self
            .client
            .post(format!("{}/text-to-image", self.gateway_url))
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await?;
        Self::first_asset_url(response, "文生图").await
    }

    async fn image_to_video(&self, image_path: &Path) -> Result<String> {
        info!("请求图生视频: {}", image_path.display());
        let image_bytes = tokio::fs::read(image_path).await?;
        let part = reqwest::multipart::Part::bytes(image_bytes)
            .file_name("image.png")
            .mime_str("image/png")?;
        let form = reqwest::multipart::Form::new()
            .part("image", part)
            .text("model_id", "stabilityai/stable-video-diffusion-img2vid-xt-1-1");
        let response = self
            .client
            .post(format!("{}/image-to-video", self.gateway_url))
            .bearer_auth(&self.api_key)
            .multipart(form)
            .send()
            .await?;
        Self::first_asset_url(response, "图生视频").await
    }

    async fn text_to_speech(&self, voice_id: &str, text: &str) -> Result<Vec<u8>> {
        info!("请求语音合成（音色 {}）", voice_id);
        let body = serde_json::json!({
            "text": text,
            "voice_settings": {
                "stability": 0.5,
                "similarity_boost": 0.5,
            },
        });
        let response = self
            .client
            .post(format!("{}/text-to-speech/{}", self.speech_api_url, voice_id))
            .header("xi-api-key", &self.speech_api_key)
            .json(&body)
            .send()
            .await?;
        Self::audio_bytes(response, "语音合成").await
    }

    async fn sound_effect(&self, prompt: &str) -> Result<Vec<u8>> {
        info!("请求音效合成: {}", prompt);
        let body = serde_json::json!({
            "text": prompt,
            "duration_seconds": 5.0,
            "prompt_influence": 0.5,
        });
        let response = self
            .client
            .post(format!("{}/sound-generation", self.speech_api_url))
            .header("xi-api-key", &self.speech_api_key)
            .json(&body)
            .send()
            .await?;
        Self::audio_bytes(response, "音效合成").await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::routing::{get, post};
    use axum::Router;

    async fn spawn_gateway(app: Router) -> String {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        format!("http://{}", addr)
    }

    fn backend_for(gateway_url: String) -> HttpGenerationBackend {
        let mut config = PipelineConfig::default();
        config.gateway_url = gateway_url.clone();
        config.speech_api_url = gateway_url;
        HttpGenerationBackend::new(&config)
    }

    #[tokio::test]
    async fn test_generate_image_returns_first_asset_url() {
        let app = Router::new().route(
            "/text-to-image",
            post(|| async {
                axum::Json(serde_json::json!({
                    "images": [
                        { "url": "https://obj-store.example/one.png" },
                        { "url": "https://obj-store.example/two.png" }
                    ]
                }))
            }),
        );
        let backend = backend_for(spawn_gateway(app).await);
        let url = backend.generate_image("a starship").await.unwrap();
        assert_eq!(url, "https://obj-store.example/one.png");
    }

    #[tokio::test]
    async fn test_generate_image_empty_result_is_service_error() {
        let app = Router::new().route(
            "/text-to-image",
            post(|| async { axum::Json(serde_json::json!({ "images": [] })) }),
        );
        let backend = backend_for(spawn_gateway(app).await);
        let result = backend.generate_image("a starship").await;
        assert!(matches!(result, Err(PipelineError::Service(_))));
    }

    #[tokio::test]
    async fn test_sound_effect_returns_raw_bytes() {
        let app = Router::new().route(
            "/sound-generation",
            post(|| async { vec![1u8, 2, 3, 4] }),
        );
        let backend = backend_for(spawn_gateway(app).await);
        let bytes = backend.sound_effect("whoosh").await.unwrap();
        assert_eq!(bytes, vec![1, 2, 3, 4]);
    }

    #[tokio::test]
    async fn test_non_success_status_is_service_error() {
        // 未注册任何路由，网关对一切请求返回 404
        let app = Router::new().route("/health", get(|| async { "ok" }));
        let backend = backend_for(spawn_gateway(app).await);
        let result = backend.text_to_speech("voice-a", "hello").await;
        assert!(matches!(result, Err(PipelineError::Service(_))));
    }
}
