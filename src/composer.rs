use std::ffi::OsString;
use std::path::{Path, PathBuf};
use tracing::info;

use crate::error::{PipelineError, Result};
use crate::media_tool::run_ffmpeg;
use crate::scene::ClipPair;
use crate::scene_builder::ScratchFiles;

/// 拼接模式：全部片段都带音轨时走音画拼接，全部不带时走纯视频拼接
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConcatMode {
    VideoOnly,
    VideoWithAudio,
}

#[derive(Debug)]
struct ConcatInput {
    video: PathBuf,
    audio: Option<PathBuf>,
}

/// 一次成片拼接的完整计划
///
/// 构建阶段只做校验与滤镜图生成，不碰外部工具；
/// 所有配置类错误（空列表、音轨形态混杂、顺序乱序）都在这里拦下。
#[derive(Debug)]
pub struct CompositionPlan {
    mode: ConcatMode,
    inputs: Vec<ConcatInput>,
    filter_graph: String,
    width: u32,
    height: u32,
}

impl CompositionPlan {
    /// 校验片段列表并生成滤镜图
    pub fn build(clips: &[ClipPair], width: u32, height: u32) -> Result<Self> {
        if clips.is_empty() {
            return Err(PipelineError::Configuration(
                "没有可拼接的片段".to_string(),
            ));
        }
        let with_audio = clips.iter().filter(|c| c.has_audio()).count();
        if with_audio != 0 && with_audio != clips.len() {
            return Err(PipelineError::Configuration(format!(
                "音轨配置不一致: {} 个片段带音轨，{} 个不带，必须全有或全无",
                with_audio,
                clips.len() - with_audio
            )));
        }
        for pair in clips.windows(2) {
            if pair[0].order >= pair[1].order {
                return Err(PipelineError::Configuration(format!(
                    "片段顺序必须严格递增: {} 之后出现 {}",
                    pair[0].order, pair[1].order
                )));
            }
        }

        let mode = if with_audio == 0 {
            ConcatMode::VideoOnly
        } else {
            ConcatMode::VideoWithAudio
        };
        let inputs = clips
            .iter()
            .map(|clip| ConcatInput {
                video: clip.video.path.clone(),
                audio: clip.audio.as_ref().map(|a| a.path.clone()),
            })
            .collect::<Vec<_>>();
        let filter_graph = Self::build_filter_graph(mode, inputs.len(), width, height);

        Ok(Self {
            mode,
            inputs,
            filter_graph,
            width,
            height,
        })
    }

    /// 按拼接模式生成 filter_complex 字符串
    ///
    /// 每路视频先归零时间戳，再等比缩放并居中补边到目标分辨率，
    /// 保证不同来源的片段在 concat 时分辨率与时间基一致。
    fn build_filter_graph(mode: ConcatMode, count: usize, width: u32, height: u32) -> String {
        let mut graph = String::new();
        for i in 0..count {
            graph.push_str(&format!(
                "[{i}:v]setpts=PTS-STARTPTS,scale={w}:{h}:force_original_aspect_ratio=decrease,\
                 pad={w}:{h}:(ow-iw)/2:(oh-ih)/2[v{i}];",
                i = i,
                w = width,
                h = height
            ));
            if mode == ConcatMode::VideoWithAudio {
                graph.push_str(&format!("[{i}:a]asetpts=PTS-STARTPTS[a{i}];", i = i));
            }
        }
        match mode {
            ConcatMode::VideoOnly => {
                for i in 0..count {
                    graph.push_str(&format!("[v{}]", i));
                }
                graph.push_str(&format!("concat=n={}:v=1:a=0[outv]", count));
            }
            ConcatMode::VideoWithAudio => {
                for i in 0..count {
                    graph.push_str(&format!("[v{}][a{}]", i, i));
                }
                graph.push_str(&format!("concat=n={}:v=1:a=1[outv][outa]", count));
            }
        }
        graph
    }

    pub fn mode(&self) -> ConcatMode {
        self.mode
    }

    pub fn filter_graph(&self) -> &str {
        &self.filter_graph
    }

    /// 执行拼接，产出单个成片
    ///
    /// 音画模式先把每对视频/音轨封装成中间片段再拼接，
    /// 中间片段无论成败都会被清理。
    pub async fn execute(&self, output: &Path) -> Result<()> {
        info!(
            "🎬 开始拼接 {} 个片段 ({:?}) -> {}",
            self.inputs.len(),
            self.mode,
            output.display()
        );
        match self.mode {
            ConcatMode::VideoOnly => {
                let videos: Vec<&Path> = self.inputs.iter().map(|i| i.video.as_path()).collect();
                self.run_concat(&videos, output)
            }
            ConcatMode::VideoWithAudio => {
                let mut scratch = ScratchFiles::new();
                let result = self.mux_and_concat(&mut scratch, output).await;
                scratch.cleanup().await;
                result
            }
        }
    }

    async fn mux_and_concat(&self, scratch: &mut ScratchFiles, output: &Path) -> Result<()> {
        let dir = output.parent().unwrap_or_else(|| Path::new("."));
        let mut muxed = Vec::with_capacity(self.inputs.len());
        for (i, input) in self.inputs.iter().enumerate() {
            let audio = input
                .audio
                .as_deref()
                .ok_or_else(|| PipelineError::Configuration("片段缺少音轨".to_string()))?;
            let path = scratch.track(dir.join(format!("mux_{}.mp4", i)));
            run_ffmpeg(
                [
                    OsString::from("-i"),
                    input.video.clone().into(),
                    OsString::from("-i"),
                    audio.to_path_buf().into(),
                    OsString::from("-c:v"),
                    OsString::from("copy"),
                    OsString::from("-c:a"),
                    OsString::from("aac"),
                    path.clone().into(),
                ],
                &path,
            )?;
            muxed.push(path);
        }
        let refs: Vec<&Path> = muxed.iter().map(|p| p.as_path()).collect();
        self.run_concat(&refs, output)
    }

    fn run_concat(&self, inputs: &[&Path], output: &Path) -> Result<()> {
        let mut args: Vec<OsString> = Vec::new();
        for input in inputs {
            args.push("-i".into());
            args.push(input.as_os_str().to_owned());
        }
        args.push("-filter_complex".into());
        args.push(self.filter_graph.clone().into());
        args.push("-map".into());
        args.push("[outv]".into());
        if self.mode == ConcatMode::VideoWithAudio {
            args.push("-map".into());
            args.push("[outa]".into());
        }
        args.push("-c:v".into());
        args.push("libx264".into());
        args.push("-pix_fmt".into());
        args.push("yuv420p".into());
        args.push(output.as_os_str().to_owned());

        run_ffmpeg(args, output)?;
        info!("✅ 成片已生成: {} ({}x{})", output.display(), self.width, self.height);
        Ok(())
    }
}

/// 一步完成校验、滤镜图生成与拼接
pub async fn compose(clips: &[ClipPair], width: u32, height: u32, output: &Path) -> Result<()> {
    CompositionPlan::build(clips, width, height)?.execute(output).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::media_tool::{ffmpeg_available, probe_duration};
    use crate::scene::{AssetKind, GeneratedAsset};
    use std::process::Command;

    fn asset(path: &Path, kind: AssetKind, origin: usize) -> GeneratedAsset {
        GeneratedAsset {
            path: path.to_path_buf(),
            kind,
            origin,
        }
    }

    fn clip(order: usize, duration: f64, video: &Path, audio: Option<&Path>) -> ClipPair {
        ClipPair {
            order,
            duration_seconds: duration,
            video: asset(video, AssetKind::Video, order),
            audio: audio.map(|a| asset(a, AssetKind::Audio, order)),
        }
    }

    #[test]
    fn test_build_rejects_empty_clip_list() {
        assert!(matches!(
            CompositionPlan::build(&[], 1280, 720),
            Err(PipelineError::Configuration(_))
        ));
    }

    #[test]
    fn test_build_rejects_mixed_audio_presence_before_any_tool_runs() {
        let dir = tempfile::tempdir().unwrap();
        let v0 = dir.path().join("v0.mp4");
        let v1 = dir.path().join("v1.mp4");
        let a0 = dir.path().join("a0.m4a");
        let clips = vec![
            clip(0, 3.0, &v0, Some(&a0)),
            clip(1, 3.0, &v1, None),
        ];
        let err = CompositionPlan::build(&clips, 1280, 720).unwrap_err();
        assert!(matches!(err, PipelineError::Configuration(_)));
        // 被拦在计划阶段，目录里没有任何工具产物
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
    }

    #[test]
    fn test_build_rejects_non_ascending_order() {
        let dir = tempfile::tempdir().unwrap();
        let v = dir.path().join("v.mp4");
        let clips = vec![clip(1, 3.0, &v, None), clip(0, 3.0, &v, None)];
        assert!(matches!(
            CompositionPlan::build(&clips, 1280, 720),
            Err(PipelineError::Configuration(_))
        ));
        let dup = vec![clip(2, 3.0, &v, None), clip(2, 3.0, &v, None)];
        assert!(CompositionPlan::build(&dup, 1280, 720).is_err());
    }

    #[test]
    fn test_filter_graph_video_only() {
        let dir = tempfile::tempdir().unwrap();
        let v = dir.path().join("v.mp4");
        let clips = vec![clip(0, 3.0, &v, None), clip(1, 3.0, &v, None)];
        let plan = CompositionPlan::build(&clips, 640, 360).unwrap();

        assert_eq!(plan.mode(), ConcatMode::VideoOnly);
        let graph = plan.filter_graph();
        assert!(graph.contains("[0:v]setpts=PTS-STARTPTS"));
        assert!(graph.contains("scale=640:360:force_original_aspect_ratio=decrease"));
        assert!(graph.contains("pad=640:360:(ow-iw)/2:(oh-ih)/2"));
        assert!(graph.ends_with("concat=n=2:v=1:a=0[outv]"));
        assert!(!graph.contains(":a]"));
    }

    #[test]
    fn test_filter_graph_with_audio() {
        let dir = tempfile::tempdir().unwrap();
        let v = dir.path().join("v.mp4");
        let a = dir.path().join("a.m4a");
        let clips = vec![
            clip(0, 3.0, &v, Some(&a)),
            clip(1, 3.0, &v, Some(&a)),
            clip(2, 3.0, &v, Some(&a)),
        ];
        let plan = CompositionPlan::build(&clips, 1280, 720).unwrap();

        assert_eq!(plan.mode(), ConcatMode::VideoWithAudio);
        let graph = plan.filter_graph();
        assert!(graph.contains("[0:a]asetpts=PTS-STARTPTS[a0];"));
        assert!(graph.contains("[2:a]asetpts=PTS-STARTPTS[a2];"));
        assert!(graph.contains("[v0][a0][v1][a1][v2][a2]"));
        assert!(graph.ends_with("concat=n=3:v=1:a=1[outv][outa]"));
    }

    fn make_clip_file(path: &Path, color: &str, seconds: f64) {
        let status = Command::new("ffmpeg")
            .args(["-loglevel", "error", "-y", "-f", "lavfi"])
            .arg("-i")
            .arg(format!("color=c={}:s=320x240:d={}", color, seconds))
            .args(["-pix_fmt", "yuv420p"])
            .arg(path)
            .status()
            .expect("无法启动 ffmpeg");
        assert!(status.success());
    }

    #[tokio::test]
    async fn test_video_only_concat_sums_durations() {
        if !ffmpeg_available() {
            eprintln!("跳过: 系统中没有 ffmpeg");
            return;
        }
        let dir = tempfile::tempdir().unwrap();
        let v0 = dir.path().join("v0.mp4");
        let v1 = dir.path().join("v1.mp4");
        make_clip_file(&v0, "red", 2.0);
        make_clip_file(&v1, "blue", 3.0);

        let clips = vec![clip(0, 2.0, &v0, None), clip(1, 3.0, &v1, None)];
        let output = dir.path().join("movie.mp4");
        compose(&clips, 640, 360, &output).await.unwrap();

        assert!(output.exists());
        let measured = probe_duration(&output).unwrap();
        assert!((measured - 5.0).abs() < 0.3, "实测时长 {}", measured);
        // 纯视频模式不应留下中间封装文件
        assert!(!dir.path().join("mux_0.mp4").exists());
    }
}
