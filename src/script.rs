use serde::Deserialize;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::oneshot;
use tracing::{debug, info, warn};

use crate::error::{PipelineError, Result};
use crate::scene::{Dialogue, SceneSpec};

/// 等待脚本协作方响应的固定超时
pub const RESPONSE_TIMEOUT: Duration = Duration::from_secs(60);

/// 脚本协作方返回的原始场景条目，字段尽量宽容，缺省在解析阶段补齐
#[derive(Debug, Deserialize)]
struct RawScene {
    #[serde(default)]
    duration: f64,
    #[serde(default)]
    prompt: String,
    #[serde(rename = "soundEffect", default)]
    sound_effect: Option<String>,
    #[serde(default)]
    dialogue: Option<RawDialogue>,
}

#[derive(Debug, Deserialize)]
struct RawDialogue {
    #[serde(default)]
    actor: String,
    #[serde(default)]
    text: String,
}

/// 从协作方的自由文本响应中解析场景脚本
///
/// 响应里往往混着说明文字或 markdown 代码块，取第一个 `[` 到最后一个 `]`
/// 之间的 JSON 数组。字段校验与缺省值和协作方的约定保持宽容：
/// 非法时长回退 5 秒，空提示词给默认描述，空台词视为没有台词。
/// `order` 按数组位置赋值，天然唯一且单调。
pub fn parse_scene_script(raw: &str) -> Result<Vec<SceneSpec>> {
    let json = extract_json_array(raw)
        .ok_or_else(|| PipelineError::Script("响应中没有找到 JSON 数组".to_string()))?;
    let entries: Vec<RawScene> = serde_json::from_str(json)
        .map_err(|e| PipelineError::Script(format!("场景脚本 JSON 无效: {}", e)))?;
    if entries.is_empty() {
        return Err(PipelineError::Script("场景列表为空".to_string()));
    }

    let scenes = entries
        .into_iter()
        .enumerate()
        .map(|(order, entry)| SceneSpec {
            order,
            duration_seconds: if entry.duration.is_finite() && entry.duration > 0.0 {
                entry.duration
            } else {
                5.0
            },
            visual_prompt: if entry.prompt.trim().is_empty() {
                "Default scene description".to_string()
            } else {
                entry.prompt
            },
            sound_effect_prompt: entry.sound_effect.filter(|s| !s.trim().is_empty()),
            dialogue: entry.dialogue.and_then(|d| {
                if d.text.trim().is_empty() {
                    None
                } else {
                    Some(Dialogue {
                        actor_id: if d.actor.trim().is_empty() {
                            "Unknown Actor".to_string()
                        } else {
                            d.actor
                        },
                        text: d.text,
                    })
                }
            }),
        })
        .collect::<Vec<_>>();

    info!("解析出 {} 个场景", scenes.len());
    Ok(scenes)
}

fn extract_json_array(raw: &str) -> Option<&str> {
    let start = raw.find('[')?;
    let end = raw.rfind(']')?;
    (end > start).then(|| &raw[start..=end])
}

/// 请求/响应关联表
///
/// 脚本是“提交请求、等待异步响应”得到的；每个在途请求只允许一个未决等待，
/// 成功与超时两条路径都保证从表中注销，避免跨次运行累积订阅。
#[derive(Debug, Clone, Default)]
pub struct ResponseRouter {
    pending: Arc<Mutex<HashMap<u64, oneshot::Sender<String>>>>,
}

impl ResponseRouter {
    pub fn new() -> Self {
        Self::default()
    }

    /// 登记一次等待，返回未决响应句柄；同一请求 id 重复登记是配置错误
    pub fn register(&self, request_id: u64) -> Result<PendingResponse> {
        let mut pending = self.pending.lock().expect("关联表锁中毒");
        if pending.contains_key(&request_id) {
            return Err(PipelineError::Configuration(format!(
                "请求 {} 已存在未决等待",
                request_id
            )));
        }
        let (sender, receiver) = oneshot::channel();
        pending.insert(request_id, sender);
        debug!("登记脚本等待: 请求 {}", request_id);
        Ok(PendingResponse {
            request_id,
            receiver,
            router: self.clone(),
        })
    }

    /// 投递一条响应；没有对应等待时返回 false
    pub fn complete(&self, request_id: u64, payload: String) -> bool {
        let sender = self.pending.lock().expect("关联表锁中毒").remove(&request_id);
        match sender {
            Some(sender) => sender.send(payload).is_ok(),
            None => {
                warn!("请求 {} 没有未决等待，响应被丢弃", request_id);
                false
            }
        }
    }

    /// 当前未决等待数，测试用来验证注销
    pub fn pending_count(&self) -> usize {
        self.pending.lock().expect("关联表锁中毒").len()
    }

    fn deregister(&self, request_id: u64) {
        self.pending.lock().expect("关联表锁中毒").remove(&request_id);
    }
}

/// 一次脚本请求的未决响应句柄
///
/// Drop 时保证从关联表注销，因此等待成功、超时、被提前丢弃三种情况
/// 都不会留下悬挂的监听。
#[derive(Debug)]
pub struct PendingResponse {
    request_id: u64,
    receiver: oneshot::Receiver<String>,
    router: ResponseRouter,
}

impl PendingResponse {
    /// 阻塞等待响应，超过固定超时后放弃
    pub async fn wait(mut self) -> Result<String> {
        match tokio::time::timeout(RESPONSE_TIMEOUT, &mut self.receiver).await {
            Ok(Ok(payload)) => Ok(payload),
            Ok(Err(_)) => Err(PipelineError::Script(
                "响应通道被对端关闭".to_string(),
            )),
            Err(_) => Err(PipelineError::ResponseTimeout(RESPONSE_TIMEOUT.as_secs())),
        }
    }
}

impl Drop for PendingResponse {
    fn drop(&mut self) {
        self.router.deregister(self.request_id);
    }
}
