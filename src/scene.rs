use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::error::{PipelineError, Result};

/// 场景中的一句台词
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Dialogue {
    /// 说话的演员，用于解析音色
    #[serde(rename = "actorId", alias = "actor")]
    pub actor_id: String,

    /// 台词文本
    pub text: String,
}

/// 单个场景的描述
///
/// 由脚本协作方在管线启动前生成，进入管线后不再修改。
/// `order` 在整个脚本内唯一且单调，播放顺序以它为准。
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SceneSpec {
    /// 播放顺序
    pub order: usize,

    /// 场景时长（秒），必须为正有限值
    #[serde(rename = "durationSeconds", alias = "duration")]
    pub duration_seconds: f64,

    /// 画面提示词
    #[serde(rename = "visualPrompt", alias = "prompt")]
    pub visual_prompt: String,

    /// 音效提示词（可选）
    #[serde(rename = "soundEffectPrompt", alias = "soundEffect", default)]
    pub sound_effect_prompt: Option<String>,

    /// 台词（可选）
    #[serde(default)]
    pub dialogue: Option<Dialogue>,
}

impl SceneSpec {
    /// 进入构建前的字段校验
    pub fn validate(&self) -> Result<()> {
        if !(self.duration_seconds.is_finite() && self.duration_seconds > 0.0) {
            return Err(PipelineError::Configuration(format!(
                "场景 {} 的时长必须为正有限值，实际为 {}",
                self.order, self.duration_seconds
            )));
        }
        if self.visual_prompt.trim().is_empty() {
            return Err(PipelineError::Configuration(format!(
                "场景 {} 缺少画面提示词",
                self.order
            )));
        }
        Ok(())
    }
}

/// 资产类型
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AssetKind {
    Image,
    Video,
    Audio,
}

/// 已在本地落盘的生成资产
///
/// 创建它的组件独占所有权，交给下一阶段后由接收方负责最终删除；
/// 所有权只转移、不共享，因此不派生 Clone。
#[derive(Debug)]
pub struct GeneratedAsset {
    pub path: PathBuf,
    pub kind: AssetKind,
    /// 产生该资产的场景 order
    pub origin: usize,
}

/// 一个场景的成品：时长匹配的视频资产 + 音轨资产
///
/// 不变式：视频时长在调速算法的误差范围内等于 SceneSpec 的 duration_seconds。
/// 无声场景的音轨是生成的静音占位轨。
#[derive(Debug)]
pub struct ClipPair {
    pub order: usize,
    pub duration_seconds: f64,
    pub video: GeneratedAsset,
    pub audio: Option<GeneratedAsset>,
}

impl ClipPair {
    pub fn has_audio(&self) -> bool {
        self.audio.is_some()
    }
}
