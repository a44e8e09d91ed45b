use async_trait::async_trait;
use std::path::{Path, PathBuf};
use tracing::{error, info, warn};

use crate::composer::CompositionPlan;
use crate::config::PipelineConfig;
use crate::error::{PipelineError, Result};
use crate::generation::GenerationBackend;
use crate::scene::{ClipPair, SceneSpec};
use crate::scene_builder::{SceneAssetBuilder, ScratchFiles};

/// 管线的生命周期状态，只能前进不能回退
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineState {
    Idle,
    BuildingScenes,
    Composing,
    Publishing,
    CleaningUp,
    Done,
    Failed,
}

/// 成片的发布端
#[async_trait]
pub trait Publisher: Send + Sync {
    /// 上传成片并返回可播放地址
    async fn publish(&self, artifact: &Path) -> Result<String>;
}

/// 场景合成管线
///
/// 顺序推进：逐场景构建 -> 拼接成片 -> 发布 -> 清理。
/// 任一阶段失败都会清理本次运行已落盘的全部文件再返回错误；
/// 清理本身的失败只记日志，永远不会盖过业务结果。
pub struct ScenePipeline<'a> {
    backend: &'a dyn GenerationBackend,
    publisher: &'a dyn Publisher,
    config: &'a PipelineConfig,
    http: reqwest::Client,
    state: PipelineState,
}

impl<'a> ScenePipeline<'a> {
    pub fn new(
        backend: &'a dyn GenerationBackend,
        publisher: &'a dyn Publisher,
        config: &'a PipelineConfig,
    ) -> Self {
        Self {
            backend,
            publisher,
            config,
            http: reqwest::Client::new(),
            state: PipelineState::Idle,
        }
    }

    pub fn state(&self) -> PipelineState {
        self.state
    }

    /// 运行整条管线，返回发布后的播放地址
    pub async fn run(&mut self, scenes: &[SceneSpec]) -> Result<String> {
        let started_at = chrono::Local::now();
        info!(
            "🚀 管线启动于 {}，共 {} 个场景",
            started_at.format("%Y-%m-%d %H:%M:%S"),
            scenes.len()
        );
        let result = self.run_inner(scenes).await;
        match &result {
            Ok(url) => {
                self.state = PipelineState::Done;
                let elapsed = chrono::Local::now() - started_at;
                info!("🎉 管线完成（耗时 {} 秒）: {}", elapsed.num_seconds(), url);
            }
            Err(e) => {
                self.state = PipelineState::Failed;
                error!("💥 管线失败: {}", e);
            }
        }
        result
    }

    async fn run_inner(&mut self, scenes: &[SceneSpec]) -> Result<String> {
        if scenes.is_empty() {
            return Err(PipelineError::Configuration("场景列表为空".to_string()));
        }
        for pair in scenes.windows(2) {
            if pair[0].order >= pair[1].order {
                return Err(PipelineError::Configuration(format!(
                    "场景顺序必须严格递增: {} 之后出现 {}",
                    pair[0].order, pair[1].order
                )));
            }
        }
        tokio::fs::create_dir_all(&self.config.working_dir).await?;

        // 逐场景构建
        self.state = PipelineState::BuildingScenes;
        let http = self.http.clone();
        let builder = SceneAssetBuilder::new(self.backend, &http, self.config);
        let mut clips: Vec<ClipPair> = Vec::with_capacity(scenes.len());
        for scene in scenes {
            info!("📍 进度 {}/{}", clips.len() + 1, scenes.len());
            match builder.build(scene).await {
                Ok(clip) => clips.push(clip),
                Err(e) => {
                    warn!("场景 {} 构建失败，清理已完成的片段", scene.order);
                    self.state = PipelineState::CleaningUp;
                    self.cleanup(clips, None).await;
                    return Err(e);
                }
            }
        }

        // 拼接成片
        self.state = PipelineState::Composing;
        let artifact = self.config.working_dir.join("movie_scene.mp4");
        let plan = match CompositionPlan::build(
            &clips,
            self.config.output_width,
            self.config.output_height,
        ) {
            Ok(plan) => plan,
            Err(e) => {
                self.state = PipelineState::CleaningUp;
                self.cleanup(clips, None).await;
                return Err(e);
            }
        };
        if let Err(e) = plan.execute(&artifact).await {
            self.state = PipelineState::CleaningUp;
            self.cleanup(clips, Some(artifact)).await;
            return Err(e);
        }

        // 发布
        self.state = PipelineState::Publishing;
        info!("📤 开始发布成片");
        let publish_result = self.publisher.publish(&artifact).await;

        // 发布成败与否都要清理本次运行的全部落盘文件
        self.state = PipelineState::CleaningUp;
        self.cleanup(clips, Some(artifact)).await;
        publish_result
    }

    async fn cleanup(&self, clips: Vec<ClipPair>, artifact: Option<PathBuf>) {
        info!("🧹 清理本次运行的落盘文件");
        let mut scratch = ScratchFiles::new();
        for clip in clips {
            scratch.track(clip.video.path);
            if let Some(audio) = clip.audio {
                scratch.track(audio.path);
            }
        }
        if let Some(artifact) = artifact {
            scratch.track(artifact);
        }
        scratch.cleanup().await;
    }
}
