use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

use crate::audio_mixer;
use crate::config::PipelineConfig;
use crate::download::download_to_file;
use crate::duration;
use crate::error::Result;
use crate::generation::GenerationBackend;
use crate::retry::with_retry;
use crate::scene::{AssetKind, ClipPair, GeneratedAsset, SceneSpec};

/// 构建过程中落盘的临时文件清单
///
/// 所有中间产物先登记再写入；成品在成功返回前显式移出清单，
/// 其余的无论成功失败都在 cleanup 里删除。删除失败只记日志。
#[derive(Debug, Default)]
pub struct ScratchFiles {
    files: Vec<PathBuf>,
}

impl ScratchFiles {
    pub fn new() -> Self {
        Self::default()
    }

    /// 登记一个待清理路径并原样返回
    pub fn track(&mut self, path: impl Into<PathBuf>) -> PathBuf {
        let path = path.into();
        self.files.push(path.clone());
        path
    }

    /// 把成品移出清理清单
    pub fn untrack(&mut self, path: &Path) {
        self.files.retain(|p| p != path);
    }

    /// 删除清单中仍存在的文件，失败只告警不中断
    pub async fn cleanup(&mut self) {
        for path in self.files.drain(..) {
            if !path.exists() {
                continue;
            }
            match tokio::fs::remove_file(&path).await {
                Ok(()) => debug!("已删除临时文件: {}", path.display()),
                Err(e) => warn!("删除临时文件失败: {}: {}", path.display(), e),
            }
        }
    }
}

/// 单场景资产构建器：文生图 -> 图生视频 -> 调速 -> 配音轨
pub struct SceneAssetBuilder<'a> {
    backend: &'a dyn GenerationBackend,
    http: &'a reqwest::Client,
    config: &'a PipelineConfig,
}

impl<'a> SceneAssetBuilder<'a> {
    pub fn new(
        backend: &'a dyn GenerationBackend,
        http: &'a reqwest::Client,
        config: &'a PipelineConfig,
    ) -> Self {
        Self {
            backend,
            http,
            config,
        }
    }

    /// 构建一个场景的成品片段
    ///
    /// 任一步骤失败时，本场景已落盘的所有文件（包括半成品）都会被清理；
    /// 成功时只留下成品视频与音轨，中间产物同样清理。
    pub async fn build(&self, scene: &SceneSpec) -> Result<ClipPair> {
        scene.validate()?;
        info!("🎬 开始构建场景 {}: {}", scene.order, scene.visual_prompt);

        let mut scratch = ScratchFiles::new();
        let result = self.build_inner(scene, &mut scratch).await;
        if let Ok(clip) = &result {
            scratch.untrack(&clip.video.path);
            if let Some(audio) = &clip.audio {
                scratch.untrack(&audio.path);
            }
        }
        scratch.cleanup().await;
        result
    }

    /// 下载远端资产并落为带类型标注的本地资产
    async fn acquire(
        &self,
        remote_url: &str,
        path: PathBuf,
        kind: AssetKind,
        origin: usize,
    ) -> Result<GeneratedAsset> {
        download_to_file(self.http, remote_url, &path).await?;
        Ok(GeneratedAsset { path, kind, origin })
    }

    async fn build_inner(&self, scene: &SceneSpec, scratch: &mut ScratchFiles) -> Result<ClipPair> {
        let dir = &self.config.working_dir;

        // 文生图
        let image_url = with_retry("文生图", || self.backend.generate_image(&scene.visual_prompt))
            .await?;
        let image = self
            .acquire(
                &image_url,
                scratch.track(dir.join(format!("scene_{}_image.png", scene.order))),
                AssetKind::Image,
                scene.order,
            )
            .await?;
        info!("🖼️ 场景 {} 静帧已就绪", scene.order);

        // 图生视频
        let video_url = with_retry("图生视频", || self.backend.image_to_video(&image.path)).await?;
        let raw_video = self
            .acquire(
                &video_url,
                scratch.track(dir.join(format!("scene_{}_raw.mp4", scene.order))),
                AssetKind::Video,
                scene.order,
            )
            .await?;

        // 调速到脚本指定时长
        let video_path = scratch.track(dir.join(format!("scene_{}.mp4", scene.order)));
        duration::retime(&raw_video.path, &video_path, scene.duration_seconds)?;
        info!(
            "🎞️ 场景 {} 视频已调速到 {}s",
            scene.order, scene.duration_seconds
        );

        let audio = self.build_audio(scene, scratch).await?;

        Ok(ClipPair {
            order: scene.order,
            duration_seconds: scene.duration_seconds,
            video: GeneratedAsset {
                path: video_path,
                kind: AssetKind::Video,
                origin: scene.order,
            },
            audio: Some(audio),
        })
    }

    /// 组装场景音轨：台词、音效各自可缺席
    ///
    /// 两者都有 -> 混音成一轨；只有一个 -> 直接采用；
    /// 都没有 -> 生成与场景等长的静音轨，保证所有片段的音轨形态一致。
    async fn build_audio(
        &self,
        scene: &SceneSpec,
        scratch: &mut ScratchFiles,
    ) -> Result<GeneratedAsset> {
        let dir = &self.config.working_dir;

        let dialogue_path = match &scene.dialogue {
            Some(dialogue) => {
                let voice_id = self.config.voice_for(&dialogue.actor_id);
                let bytes = with_retry("语音合成", || {
                    self.backend.text_to_speech(&voice_id, &dialogue.text)
                })
                .await?;
                let path = scratch.track(dir.join(format!("scene_{}_dialogue.mp3", scene.order)));
                tokio::fs::write(&path, &bytes).await?;
                info!("🗣️ 场景 {} 台词音频已就绪", scene.order);
                Some(path)
            }
            None => None,
        };

        let effect_path = match &scene.sound_effect_prompt {
            Some(prompt) => {
                let bytes = with_retry("音效合成", || self.backend.sound_effect(prompt)).await?;
                let path = scratch.track(dir.join(format!("scene_{}_effect.mp3", scene.order)));
                tokio::fs::write(&path, &bytes).await?;
                info!("🔊 场景 {} 音效已就绪", scene.order);
                Some(path)
            }
            None => None,
        };

        let audio_path = match (dialogue_path, effect_path) {
            (Some(dialogue), Some(effect)) => {
                let mixed = scratch.track(dir.join(format!("scene_{}_audio.m4a", scene.order)));
                audio_mixer::mix_tracks(&dialogue, &effect, &mixed)?;
                mixed
            }
            (Some(single), None) | (None, Some(single)) => single,
            (None, None) => {
                let silent = scratch.track(dir.join(format!("scene_{}_audio.m4a", scene.order)));
                audio_mixer::silent_track(scene.duration_seconds, &silent)?;
                silent
            }
        };

        Ok(GeneratedAsset {
            path: audio_path,
            kind: AssetKind::Audio,
            origin: scene.order,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::PipelineError;
    use crate::media_tool::{ffmpeg_available, probe_duration};
    use crate::scene::Dialogue;
    use async_trait::async_trait;
    use axum::{routing::get, Router};
    use std::process::Command;
    use tokio::net::TcpListener;

    /// 把预先准备好的静帧和视频通过回环 HTTP 提供出去的假后端
    struct FileBackend {
        base_url: String,
        audio_bytes: Vec<u8>,
    }

    #[async_trait]
    impl GenerationBackend for FileBackend {
        async fn generate_image(&self, _prompt: &str) -> Result<String> {
            Ok(format!("{}/image.png", self.base_url))
        }
        async fn image_to_video(&self, _image_path: &Path) -> Result<String> {
            Ok(format!("{}/clip.mp4", self.base_url))
        }
        async fn text_to_speech(&self, _voice_id: &str, _text: &str) -> Result<Vec<u8>> {
            Ok(self.audio_bytes.clone())
        }
        async fn sound_effect(&self, _prompt: &str) -> Result<Vec<u8>> {
            Ok(self.audio_bytes.clone())
        }
    }

    fn make_nominal_clip(path: &Path) {
        let status = Command::new("ffmpeg")
            .args(["-loglevel", "error", "-y", "-f", "lavfi"])
            .args(["-i", "color=c=blue:s=320x240:d=3.57"])
            .args(["-pix_fmt", "yuv420p"])
            .arg(path)
            .status()
            .expect("无法启动 ffmpeg");
        assert!(status.success());
    }

    fn make_wav_bytes(assets_dir: &Path) -> Vec<u8> {
        let path = assets_dir.join("tone.wav");
        let status = Command::new("ffmpeg")
            .args(["-loglevel", "error", "-y", "-f", "lavfi"])
            .args(["-i", "sine=frequency=440:duration=2"])
            .arg(&path)
            .status()
            .expect("无法启动 ffmpeg");
        assert!(status.success());
        std::fs::read(path).unwrap()
    }

    async fn spawn_asset_server(assets_dir: PathBuf) -> String {
        let app = Router::new()
            .route(
                "/image.png",
                get({
                    let dir = assets_dir.clone();
                    move || async move { std::fs::read(dir.join("image.png")).unwrap() }
                }),
            )
            .route(
                "/clip.mp4",
                get(move || async move { std::fs::read(assets_dir.join("clip.mp4")).unwrap() }),
            );
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        format!("http://{}", addr)
    }

    fn prepare_assets(assets_dir: &Path) {
        make_nominal_clip(&assets_dir.join("clip.mp4"));
        let status = Command::new("ffmpeg")
            .args(["-loglevel", "error", "-y", "-f", "lavfi"])
            .args(["-i", "color=c=red:s=320x240:d=1", "-frames:v", "1"])
            .arg(assets_dir.join("image.png"))
            .status()
            .expect("无法启动 ffmpeg");
        assert!(status.success());
    }

    #[tokio::test]
    async fn test_build_produces_retimed_clip_with_audio() {
        if !ffmpeg_available() {
            eprintln!("跳过: 系统中没有 ffmpeg");
            return;
        }
        let assets = tempfile::tempdir().unwrap();
        prepare_assets(assets.path());
        let audio_bytes = make_wav_bytes(assets.path());
        let base_url = spawn_asset_server(assets.path().to_path_buf()).await;

        let working = tempfile::tempdir().unwrap();
        let config = PipelineConfig {
            working_dir: working.path().to_path_buf(),
            ..Default::default()
        };
        let backend = FileBackend {
            base_url,
            audio_bytes,
        };
        let http = reqwest::Client::new();
        let builder = SceneAssetBuilder::new(&backend, &http, &config);

        let scene = SceneSpec {
            order: 3,
            duration_seconds: 5.0,
            visual_prompt: "A blue field".to_string(),
            sound_effect_prompt: None,
            dialogue: Some(Dialogue {
                actor_id: "Tom Hanks".to_string(),
                text: "Hello".to_string(),
            }),
        };
        let clip = builder.build(&scene).await.unwrap();

        assert_eq!(clip.order, 3);
        assert!(clip.video.path.exists());
        assert!(clip.has_audio());
        let measured = probe_duration(&clip.video.path).unwrap();
        assert!((measured - 5.0).abs() < 0.2, "实测时长 {}", measured);

        // 成品之外不留任何文件
        let leftover: Vec<_> = std::fs::read_dir(working.path())
            .unwrap()
            .map(|e| e.unwrap().path())
            .filter(|p| *p != clip.video.path && Some(p.as_path()) != clip.audio.as_ref().map(|a| a.path.as_path()))
            .collect();
        assert!(leftover.is_empty(), "残留文件: {:?}", leftover);
    }

    #[tokio::test]
    async fn test_build_cleans_up_everything_on_audio_failure() {
        if !ffmpeg_available() {
            eprintln!("跳过: 系统中没有 ffmpeg");
            return;
        }
        let assets = tempfile::tempdir().unwrap();
        prepare_assets(assets.path());
        let base_url = spawn_asset_server(assets.path().to_path_buf()).await;

        let working = tempfile::tempdir().unwrap();
        let config = PipelineConfig {
            working_dir: working.path().to_path_buf(),
            ..Default::default()
        };
        // 返回的“音频”是垃圾字节，混音阶段必然失败
        let backend = FileBackend {
            base_url,
            audio_bytes: b"not audio at all".to_vec(),
        };
        let http = reqwest::Client::new();
        let builder = SceneAssetBuilder::new(&backend, &http, &config);

        let scene = SceneSpec {
            order: 0,
            duration_seconds: 4.0,
            visual_prompt: "A doomed scene".to_string(),
            sound_effect_prompt: Some("Explosion".to_string()),
            dialogue: Some(Dialogue {
                actor_id: "Unknown".to_string(),
                text: "Boom".to_string(),
            }),
        };
        let result = builder.build(&scene).await;
        assert!(matches!(result, Err(PipelineError::CompositionTool(_))));

        // 失败后工作目录不残留任何文件
        let leftover: Vec<_> = std::fs::read_dir(working.path())
            .unwrap()
            .map(|e| e.unwrap().path())
            .collect();
        assert!(leftover.is_empty(), "残留文件: {:?}", leftover);
    }

    #[tokio::test]
    async fn test_acquire_tags_downloaded_asset_with_kind_and_origin() {
        let app = Router::new().route("/frame.png", get(|| async { "fake-image-bytes" }));
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        let working = tempfile::tempdir().unwrap();
        let config = PipelineConfig {
            working_dir: working.path().to_path_buf(),
            ..Default::default()
        };
        let backend = FileBackend {
            base_url: String::new(),
            audio_bytes: Vec::new(),
        };
        let http = reqwest::Client::new();
        let builder = SceneAssetBuilder::new(&backend, &http, &config);

        let asset = builder
            .acquire(
                &format!("http://{}/frame.png", addr),
                working.path().join("scene_4_image.png"),
                AssetKind::Image,
                4,
            )
            .await
            .unwrap();

        // 落盘的静帧是带类型标注的资产，而不是裸路径
        assert_eq!(asset.kind, AssetKind::Image);
        assert_eq!(asset.origin, 4);
        assert!(asset.path.exists());
    }

    #[tokio::test]
    async fn test_scratch_untrack_keeps_final_artifacts() {
        let dir = tempfile::tempdir().unwrap();
        let keep = dir.path().join("keep.mp4");
        let drop_me = dir.path().join("drop.mp4");
        std::fs::write(&keep, b"k").unwrap();
        std::fs::write(&drop_me, b"d").unwrap();

        let mut scratch = ScratchFiles::new();
        scratch.track(&keep);
        scratch.track(&drop_me);
        scratch.untrack(&keep);
        scratch.cleanup().await;

        assert!(keep.exists());
        assert!(!drop_me.exists());
    }
}
