use std::ffi::OsStr;
use std::path::Path;

use crate::error::{PipelineError, Result};
use crate::media_tool;

/// 等权混合两条音轨，总时长取较长者
pub fn mix_tracks(first: &Path, second: &Path, output: &Path) -> Result<()> {
    media_tool::run_ffmpeg(
        [
            OsStr::new("-i"),
            first.as_os_str(),
            OsStr::new("-i"),
            second.as_os_str(),
            OsStr::new("-filter_complex"),
            OsStr::new("[0:a][1:a]amix=inputs=2:duration=longest"),
            OsStr::new("-c:a"),
            OsStr::new("aac"),
            output.as_os_str(),
        ],
        output,
    )
}

/// 生成指定时长的静音轨，作为无声场景的占位音轨
pub fn silent_track(duration_seconds: f64, output: &Path) -> Result<()> {
    if !(duration_seconds.is_finite() && duration_seconds > 0.0) {
        return Err(PipelineError::Configuration(format!(
            "静音轨时长必须为正有限值，实际为 {}",
            duration_seconds
        )));
    }
    let duration = duration_seconds.to_string();
    media_tool::run_ffmpeg(
        [
            OsStr::new("-f"),
            OsStr::new("lavfi"),
            OsStr::new("-i"),
            OsStr::new("anullsrc=r=44100:cl=stereo"),
            OsStr::new("-t"),
            OsStr::new(&duration),
            OsStr::new("-c:a"),
            OsStr::new("aac"),
            output.as_os_str(),
        ],
        output,
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_silent_track_has_requested_duration() {
        if !media_tool::ffmpeg_available() {
            eprintln!("跳过: 未检测到 ffmpeg");
            return;
        }
        let dir = tempfile::tempdir().unwrap();
        let track = dir.path().join("silence.m4a");
        silent_track(2.0, &track).unwrap();
        let measured = media_tool::probe_duration(&track).unwrap();
        assert!((measured - 2.0).abs() <= 0.15, "实测时长 {}", measured);
    }

    #[test]
    fn test_mix_keeps_longest_duration() {
        if !media_tool::ffmpeg_available() {
            eprintln!("跳过: 未检测到 ffmpeg");
            return;
        }
        let dir = tempfile::tempdir().unwrap();
        let short = dir.path().join("short.m4a");
        let long = dir.path().join("long.m4a");
        silent_track(1.0, &short).unwrap();
        silent_track(3.0, &long).unwrap();

        let mixed = dir.path().join("mixed.m4a");
        mix_tracks(&short, &long, &mixed).unwrap();
        let measured = media_tool::probe_duration(&mixed).unwrap();
        assert!((measured - 3.0).abs() <= 0.2, "实测时长 {}", measured);
    }

    #[test]
    fn test_mix_fails_on_garbage_input() {
        if !media_tool::ffmpeg_available() {
            eprintln!("跳过: 未检测到 ffmpeg");
            return;
        }
        let dir = tempfile::tempdir().unwrap();
        let garbage = dir.path().join("garbage.mp3");
        std::fs::write(&garbage, b"not really audio").unwrap();
        let output = dir.path().join("mixed.m4a");
        let result = mix_tracks(&garbage, &garbage, &output);
        assert!(matches!(result, Err(PipelineError::CompositionTool(_))));
    }
}
