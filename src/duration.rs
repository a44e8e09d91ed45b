use std::ffi::OsStr;
use std::path::Path;

use crate::error::{PipelineError, Result};
use crate::media_tool;

/// 图生视频服务固定输出的名义时长（秒），实测常量
pub const NOMINAL_SOURCE_DURATION: f64 = 3.57;

/// 把片段重定速到目标时长
///
/// 视频流按 target/名义时长 缩放 PTS；若存在音频流，按倒数调整 atempo，
/// 两者一起让总时长等于 target。输入不满足约束时在调用工具前失败。
pub fn retime(input: &Path, output: &Path, target_duration: f64) -> Result<()> {
    if !(target_duration.is_finite() && target_duration > 0.0) {
        return Err(PipelineError::Configuration(format!(
            "重定速目标时长必须为正有限值，实际为 {}",
            target_duration
        )));
    }

    let video_filter = format!(
        "setpts=({}/{})*PTS",
        target_duration, NOMINAL_SOURCE_DURATION
    );
    let audio_filter = format!(
        "atempo=({}/{})",
        NOMINAL_SOURCE_DURATION, target_duration
    );

    media_tool::run_ffmpeg(
        [
            OsStr::new("-i"),
            input.as_os_str(),
            OsStr::new("-filter:v"),
            OsStr::new(&video_filter),
            OsStr::new("-filter:a"),
            OsStr::new(&audio_filter),
            output.as_os_str(),
        ],
        output,
    )
}
