use std::future::Future;
use std::time::Duration;
use tracing::warn;

use crate::error::{PipelineError, Result};

/// 首次调用之外最多追加的重试次数
pub const MAX_RETRIES: u32 = 3;

/// 固定的重试间隔（不做指数退避，也不加抖动）
pub const RETRY_DELAY: Duration = Duration::from_secs(5);

/// 用有界重试包装一次外部生成调用
///
/// 失败后固定间隔重试，最多 MAX_RETRIES 次；重试耗尽后把最后一次失败
/// 连同总尝试次数向上传播。单个场景的构建内没有并发，重试自然串行。
/// 外部调用只有网络副作用，失败不会留下本地半成品。
pub async fn with_retry<T, F, Fut>(what: &str, mut call: F) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let mut attempts = 0u32;
    loop {
        attempts += 1;
        match call().await {
            Ok(value) => return Ok(value),
            Err(e) if attempts <= MAX_RETRIES => {
                warn!(
                    "{} 调用失败（第 {} 次尝试）: {}，{} 秒后重试",
                    what,
                    attempts,
                    e,
                    RETRY_DELAY.as_secs()
                );
                tokio::time::sleep(RETRY_DELAY).await;
            }
            Err(e) => {
                return Err(PipelineError::TransientService {
                    attempts,
                    source: Box::new(e),
                });
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    #[tokio::test(start_paused = true)]
    async fn test_succeeds_after_transient_failures() {
        let calls = Arc::new(AtomicU32::new(0));
        let counter = calls.clone();

        let result = with_retry("测试调用", move || {
            let counter = counter.clone();
            async move {
                let n = counter.fetch_add(1, Ordering::SeqCst) + 1;
                if n <= 2 {
                    Err(PipelineError::Service("暂时不可用".to_string()))
                } else {
                    Ok(n)
                }
            }
        })
        .await;

        // 失败 2 次后第 3 次成功
        assert_eq!(result.unwrap(), 3);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_exhausts_retries_after_four_attempts() {
        let calls = Arc::new(AtomicU32::new(0));
        let counter = calls.clone();
        let start = tokio::time::Instant::now();

        let result: Result<()> = with_retry("测试调用", move || {
            let counter = counter.clone();
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
                Err(PipelineError::Service("一直失败".to_string()))
            }
        })
        .await;

        // 1 次首发 + 3 次重试，每次重试前等待固定间隔
        assert_eq!(calls.load(Ordering::SeqCst), 4);
        assert_eq!(start.elapsed(), RETRY_DELAY * 3);
        match result {
            Err(PipelineError::TransientService { attempts, .. }) => assert_eq!(attempts, 4),
            other => panic!("预期 TransientService 错误，实际为 {:?}", other),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_success_on_first_attempt_does_not_sleep() {
        let start = tokio::time::Instant::now();
        let result = with_retry("测试调用", || async { Ok(7) }).await;
        assert_eq!(result.unwrap(), 7);
        assert_eq!(start.elapsed(), Duration::ZERO);
    }
}
