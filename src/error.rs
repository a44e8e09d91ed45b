use thiserror::Error;

/// 合成管线的统一错误类型
///
/// 重试只发生在生成调用边界（retry 模块），其余组件不在内部重试；
/// 任何阶段失败都会中止后续阶段，但不会阻止尽力清理。
#[derive(Error, Debug)]
pub enum PipelineError {
    /// 生成服务重试耗尽后带着尝试次数向上传播的最后一次失败
    #[error("生成服务调用失败（共尝试 {attempts} 次）: {source}")]
    TransientService {
        attempts: u32,
        #[source]
        source: Box<PipelineError>,
    },

    /// 传输失败或远端返回非成功状态
    #[error("下载资源失败: {0}")]
    Download(String),

    /// 本地落盘失败（无法创建或写入目标文件）
    #[error("写入本地文件失败: {0}")]
    Write(#[source] std::io::Error),

    /// 媒体工具调用失败，或退出码为零但未生成输出文件
    #[error("媒体合成工具执行失败: {0}")]
    CompositionTool(String),

    /// 进入合成前的输入不满足约束（如音轨配置不一致）
    #[error("配置错误: {0}")]
    Configuration(String),

    /// 等待脚本协作方响应超时
    #[error("等待脚本响应超时（{0} 秒）")]
    ResponseTimeout(u64),

    /// 生成服务返回了无法使用的响应
    #[error("生成服务返回异常响应: {0}")]
    Service(String),

    /// 场景脚本缺失或格式无效
    #[error("场景脚本无效: {0}")]
    Script(String),

    #[error("IO 错误: {0}")]
    Io(#[from] std::io::Error),

    #[error("HTTP 请求失败: {0}")]
    Http(#[from] reqwest::Error),

    #[error("JSON 解析失败: {0}")]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, PipelineError>;
