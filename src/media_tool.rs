use std::ffi::{OsStr, OsString};
use std::path::Path;
use std::process::{Command, Stdio};
use tracing::debug;

use crate::error::{PipelineError, Result};

/// 统一的 ffmpeg 调用入口
///
/// 成败以“预期输出文件是否真的生成”为准，而不是只看退出码：
/// 某些 filter-graph 错误下工具会以 0 退出却不落盘，
/// 在实测确认该行为消失之前不要放宽这条检查。
pub fn run_ffmpeg<I, S>(args: I, expected_output: &Path) -> Result<()>
where
    I: IntoIterator<Item = S>,
    S: AsRef<OsStr>,
{
    let args: Vec<OsString> = args
        .into_iter()
        .map(|a| a.as_ref().to_os_string())
        .collect();
    debug!(
        "执行 ffmpeg {}",
        args.iter()
            .map(|a| a.to_string_lossy().into_owned())
            .collect::<Vec<_>>()
            .join(" ")
    );

    let output = Command::new("ffmpeg")
        .arg("-loglevel")
        .arg("error")
        .arg("-y")
        .args(&args)
        .output()
        .map_err(|e| {
            PipelineError::CompositionTool(format!("启动 ffmpeg 失败（是否已安装？）: {}", e))
        })?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        return Err(PipelineError::CompositionTool(format!(
            "ffmpeg 退出状态 {}: {}",
            output.status,
            stderr.trim()
        )));
    }
    if !expected_output.exists() {
        return Err(PipelineError::CompositionTool(format!(
            "ffmpeg 正常退出但未生成输出文件: {}",
            expected_output.display()
        )));
    }
    Ok(())
}

/// 探测媒体文件的总时长（秒）
pub fn probe_duration(path: &Path) -> Result<f64> {
    let output = Command::new("ffprobe")
        .args([
            "-v",
            "error",
            "-show_entries",
            "format=duration",
            "-of",
            "default=noprint_wrappers=1:nokey=1",
        ])
        .arg(path)
        .output()
        .map_err(|e| PipelineError::CompositionTool(format!("启动 ffprobe 失败: {}", e)))?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        return Err(PipelineError::CompositionTool(format!(
            "ffprobe 探测 {} 失败: {}",
            path.display(),
            stderr.trim()
        )));
    }

    String::from_utf8_lossy(&output.stdout)
        .trim()
        .parse::<f64>()
        .map_err(|e| {
            PipelineError::CompositionTool(format!("解析 ffprobe 输出失败: {}", e))
        })
}

fn tool_on_path(name: &str) -> bool {
    Command::new(name)
        .arg("-version")
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status()
        .map(|s| s.success())
        .unwrap_or(false)
}

/// ffmpeg/ffprobe 是否都在 PATH 上；依赖媒体工具的测试据此决定是否跳过
pub fn ffmpeg_available() -> bool {
    tool_on_path("ffmpeg") && tool_on_path("ffprobe")
}
