//! 备份执行
//!
//! 调用克隆 API 创建备份环境，并把成功、失败、错误、panic 与超时统一为 `ExecutionOutcome`。

use crate::api::EnvironmentApi;
use futures::FutureExt;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, warn};

/// 一次克隆调用的归一化结果
#[derive(Debug, Clone, PartialEq)]
pub struct ExecutionOutcome {
    pub success: bool,
    pub environment_id: Option<String>,
    pub error: Option<String>,
    /// 毫秒
    pub duration_ms: u64,
}

impl ExecutionOutcome {
    pub fn failure(error: impl Into<String>, duration_ms: u64) -> Self {
        Self {
            success: false,
            environment_id: None,
            error: Some(error.into()),
            duration_ms,
        }
    }
}

/// 备份执行器：调用外部克隆接口并计时，任何错误都不会越过这里
#[derive(Clone)]
pub struct BackupExecutor {
    api: Arc<dyn EnvironmentApi>,
    timeout: Option<Duration>,
}

impl BackupExecutor {
    pub fn new(api: Arc<dyn EnvironmentApi>) -> Self {
        Self { api, timeout: None }
    }

    /// 为单次调用设置超时
    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn api(&self) -> &Arc<dyn EnvironmentApi> {
        &self.api
    }

    pub async fn execute(
        &self,
        api_token: &str,
        source_environment: &str,
        target_environment: &str,
    ) -> ExecutionOutcome {
        let started = Instant::now();
        let call = AssertUnwindSafe(self.api.create_backup(
            api_token,
            source_environment,
            target_environment,
        ))
        .catch_unwind();

        let result = match self.timeout {
            Some(limit) => match tokio::time::timeout(limit, call).await {
                Ok(result) => result,
                Err(_) => {
                    let elapsed = elapsed_ms(started);
                    warn!(environment = %target_environment, timeout_secs = limit.as_secs(), "克隆调用超时");
                    return ExecutionOutcome::failure(
                        format!("克隆调用超时 ({}s)", limit.as_secs()),
                        elapsed,
                    );
                }
            },
            None => call.await,
        };
        let duration_ms = elapsed_ms(started);

        match result {
            Ok(Ok(clone)) if clone.success => {
                debug!(environment = %target_environment, duration_ms, "克隆完成");
                ExecutionOutcome {
                    success: true,
                    environment_id: clone.environment_id,
                    error: None,
                    duration_ms,
                }
            }
            Ok(Ok(clone)) => ExecutionOutcome::failure(
                clone.error.unwrap_or_else(|| "克隆失败（未返回错误信息）".to_string()),
                duration_ms,
            ),
            Ok(Err(e)) => ExecutionOutcome::failure(e.to_string(), duration_ms),
            Err(panic) => {
                let message = panic
                    .downcast_ref::<&str>()
                    .map(|s| s.to_string())
                    .or_else(|| panic.downcast_ref::<String>().cloned())
                    .unwrap_or_else(|| "未知错误".to_string());
                warn!(environment = %target_environment, "克隆调用发生 panic: {}", message);
                ExecutionOutcome::failure(format!("克隆调用异常: {message}"), duration_ms)
            }
        }
    }
}

fn elapsed_ms(started: Instant) -> u64 {
    u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{CreateBehavior, MockEnvironmentApi};

    #[tokio::test]
    async fn test_success_carries_environment_id() {
        let api = Arc::new(MockEnvironmentApi::default());
        let executor = BackupExecutor::new(api.clone());
        let outcome = executor.execute("tok", "main", "backup-daily-x").await;
        assert!(outcome.success);
        assert_eq!(outcome.environment_id.as_deref(), Some("backup-daily-x"));
        assert!(outcome.error.is_none());
        assert_eq!(api.created(), vec!["backup-daily-x"]);
    }

    #[tokio::test]
    async fn test_reported_failure() {
        let api = Arc::new(MockEnvironmentApi::default());
        api.set_create(CreateBehavior::Fail("rate limited".into()));
        let outcome = BackupExecutor::new(api).execute("tok", "main", "t").await;
        assert!(!outcome.success);
        assert_eq!(outcome.error.as_deref(), Some("rate limited"));
    }

    #[tokio::test]
    async fn test_error_is_normalized() {
        let api = Arc::new(MockEnvironmentApi::default());
        api.set_create(CreateBehavior::Error("503".into()));
        let outcome = BackupExecutor::new(api).execute("tok", "main", "t").await;
        assert!(!outcome.success);
        assert!(outcome.error.unwrap().contains("503"));
    }

    #[tokio::test]
    async fn test_panic_is_caught() {
        let api = Arc::new(MockEnvironmentApi::default());
        api.set_create(CreateBehavior::Panic);
        let outcome = BackupExecutor::new(api).execute("tok", "main", "t").await;
        assert!(!outcome.success);
        assert!(outcome.error.unwrap().contains("boom"));
    }

    #[tokio::test]
    async fn test_timeout_becomes_failure() {
        let api = Arc::new(MockEnvironmentApi::default());
        api.set_create(CreateBehavior::Hang);
        let outcome = BackupExecutor::new(api)
            .with_timeout(Some(Duration::from_millis(20)))
            .execute("tok", "main", "t")
            .await;
        assert!(!outcome.success);
        assert!(outcome.error.unwrap().contains("超时"));
    }
}
