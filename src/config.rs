use anyhow::Result;
use std::collections::HashMap;
use std::env;
use std::path::{Path, PathBuf};
use tracing::debug;

/// 合成管线配置
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// 工作目录，所有中间文件与最终产物都落在这里
    pub working_dir: PathBuf,
    /// 输出分辨率（宽）
    pub output_width: u32,
    /// 输出分辨率（高）
    pub output_height: u32,
    /// 生成网关地址（文生图 / 图生视频）
    pub gateway_url: String,
    /// 语音服务地址（语音合成 / 音效合成）
    pub speech_api_url: String,
    /// 发布服务地址
    pub publish_api_url: String,
    /// 生成网关与发布服务共用的 API Key
    pub api_key: String,
    /// 语音服务 API Key
    pub speech_api_key: String,
    /// 演员 -> 音色映射（由配置注入，选角策略不写死在构建代码里）
    pub voice_map: HashMap<String, String>,
    /// 未知演员回退使用的音色
    pub default_voice: String,
}

impl PipelineConfig {
    /// 解析演员对应的音色
    ///
    /// 未知演员回退到默认音色，这是策略选择，不视为错误。
    pub fn voice_for(&self, actor_id: &str) -> String {
        match self.voice_map.get(actor_id) {
            Some(voice) => voice.clone(),
            None => {
                debug!("未知演员 {}，回退默认音色", actor_id);
                self.default_voice.clone()
            }
        }
    }
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            working_dir: env::temp_dir().join("movie-gen"),
            output_width: 1280,
            output_height: 720,
            gateway_url: "https://dream-gateway.livepeer.cloud".to_string(),
            speech_api_url: "https://api.elevenlabs.io/v1".to_string(),
            publish_api_url: "https://livepeer.studio/api".to_string(),
            api_key: String::new(),
            speech_api_key: String::new(),
            voice_map: default_voice_map(),
            default_voice: "pMsXgVXv3BLzUgSXRplE".to_string(),
        }
    }
}

/// 内置的演员 -> 音色映射，可被配置文件 [voices] 节覆盖或扩充
fn default_voice_map() -> HashMap<String, String> {
    [
        ("Tom Hanks", "tkOyqGbCSr2yWYLucS6Y"),
        ("Leonardo DiCaprio", "bIHbv24MWmeRgasZH58o"),
        ("Brad Pitt", "cjVigY5qzO86Huf0OWal"),
        ("Samuel L. Jackson", "nPczCjzI2devNBz1zQrb"),
        ("Meryl Streep", "Xb7hH8MSUJpSbSDYk0k2"),
        ("Scarlett Johansson", "PG7cZldM4iWlbugny2fe"),
        ("Gal Gadot", "FGY2WhTYpPnrIDTdsKH5"),
        ("Tina Fey", "XrExE9yKIg1WjnnlVkGX"),
    ]
    .into_iter()
    .map(|(actor, voice)| (actor.to_string(), voice.to_string()))
    .collect()
}

/// 配置加载器
pub struct ConfigLoader;

impl ConfigLoader {
    /// 从多个源加载配置，优先级：命令行参数 > 环境变量 > 配置文件 > 默认值
    pub fn load_config(
        config_file: Option<&Path>,
        working_dir: Option<PathBuf>,
    ) -> Result<PipelineConfig> {
        let mut config = PipelineConfig::default();

        // 1. 先套用配置文件（如果存在）
        if let Some(config_path) = config_file {
            Self::apply_file(&mut config, config_path)?;
        } else if let Some(default_path) = Self::find_default_config() {
            Self::apply_file(&mut config, &default_path)?;
        }

        // 2. 环境变量覆盖配置文件
        Self::apply_env(&mut config);

        // 3. 命令行参数优先级最高
        if let Some(dir) = working_dir {
            config.working_dir = dir;
        }

        Ok(config)
    }

    fn apply_env(config: &mut PipelineConfig) {
        if let Some(dir) = env::var("MOVIE_GEN_WORKING_DIR").ok().filter(|v| !v.is_empty()) {
            config.working_dir = PathBuf::from(dir);
        }
        if let Some(width) = env::var("MOVIE_GEN_OUTPUT_WIDTH")
            .ok()
            .and_then(|v| v.parse().ok())
        {
            config.output_width = width;
        }
        if let Some(height) = env::var("MOVIE_GEN_OUTPUT_HEIGHT")
            .ok()
            .and_then(|v| v.parse().ok())
        {
            config.output_height = height;
        }
        if let Ok(url) = env::var("MOVIE_GEN_GATEWAY_URL") {
            config.gateway_url = url;
        }
        if let Ok(url) = env::var("MOVIE_GEN_SPEECH_API_URL") {
            config.speech_api_url = url;
        }
        if let Ok(url) = env::var("MOVIE_GEN_PUBLISH_API_URL") {
            config.publish_api_url = url;
        }
        if let Ok(key) = env::var("MOVIE_GEN_API_KEY") {
            config.api_key = key;
        }
        if let Ok(key) = env::var("MOVIE_GEN_SPEECH_API_KEY") {
            config.speech_api_key = key;
        }
        if let Ok(voice) = env::var("MOVIE_GEN_DEFAULT_VOICE") {
            config.default_voice = voice;
        }
    }

    /// 从 INI 配置文件读取配置
    ///
    /// 演员名是区分大小写的键，解析器必须以区分大小写的模式工作。
    fn apply_file(config: &mut PipelineConfig, config_path: &Path) -> Result<()> {
        if !config_path.exists() {
            anyhow::bail!("配置文件不存在: {}", config_path.display());
        }

        let mut parser = configparser::ini::Ini::new_cs();
        parser
            .load(config_path)
            .map_err(|e| anyhow::anyhow!("读取配置文件失败: {}: {}", config_path.display(), e))?;

        if let Some(dir) = parser.get("movie_gen", "working_dir").filter(|v| !v.is_empty()) {
            config.working_dir = PathBuf::from(dir);
        }
        if let Some(width) = parser
            .get("movie_gen", "output_width")
            .and_then(|v| v.parse().ok())
        {
            config.output_width = width;
        }
        if let Some(height) = parser
            .get("movie_gen", "output_height")
            .and_then(|v| v.parse().ok())
        {
            config.output_height = height;
        }

        if let Some(url) = parser.get("gateway", "url").filter(|v| !v.is_empty()) {
            config.gateway_url = url;
        }
        if let Some(key) = parser.get("gateway", "api_key").filter(|v| !v.is_empty()) {
            config.api_key = key;
        }
        if let Some(url) = parser.get("speech", "url").filter(|v| !v.is_empty()) {
            config.speech_api_url = url;
        }
        if let Some(key) = parser.get("speech", "api_key").filter(|v| !v.is_empty()) {
            config.speech_api_key = key;
        }
        if let Some(url) = parser.get("publish", "url").filter(|v| !v.is_empty()) {
            config.publish_api_url = url;
        }

        // [voices] 节：default 键设置回退音色，其余键按 演员名 = 音色 合并
        if let Some(voices) = parser.get_map_ref().get("voices") {
            for (actor, voice) in voices {
                let Some(voice) = voice.as_ref().filter(|v| !v.is_empty()) else {
                    continue;
                };
                if actor == "default" {
                    config.default_voice = voice.clone();
                } else {
                    config.voice_map.insert(actor.clone(), voice.clone());
                }
            }
        }

        Ok(())
    }

    /// 从默认位置查找配置文件
    fn find_default_config() -> Option<PathBuf> {
        let mut candidates = vec![
            PathBuf::from("movie-gen.ini"),
            PathBuf::from(".movie-gen.ini"),
        ];
        if let Some(home) = env::var_os("HOME") {
            candidates.push(PathBuf::from(home).join(".movie-gen.ini"));
        }
        candidates.push(PathBuf::from("/etc/movie-gen.ini"));
        candidates.into_iter().find(|p| p.exists())
    }
}
