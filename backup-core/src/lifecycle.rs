//! 运行记录生命周期
//!
//! 运行从 `in_progress` 开始，只能转为 `completed` 或 `failed`。
//! 终态写入失败时保留执行结果，错误记在 `persistence_error` 中。

use crate::error::{BackupError, Result};
use crate::executor::ExecutionOutcome;
use crate::models::{BackupRun, BackupType, RunMetadata, RunStatus, TriggeredBy};
use crate::store::RunHistoryStore;
use chrono::Utc;
use std::sync::Arc;
use tracing::{error, info, instrument};
use uuid::Uuid;

/// 开始一次运行所需的参数
#[derive(Debug, Clone)]
pub struct BeginRun {
    pub project_id: String,
    pub backup_type: BackupType,
    pub source_environment: String,
    pub target_environment: String,
    pub triggered_by: TriggeredBy,
    pub note: Option<String>,
}

/// 终态记录；写入失败时 `persistence_error` 记录原因，但不改变 `run.status`
#[derive(Debug, Clone)]
pub struct CompletedRun {
    pub run: BackupRun,
    pub persistence_error: Option<String>,
}

/// 运行记录状态机：in_progress -> completed | failed
#[derive(Clone)]
pub struct RunLifecycle {
    history: Arc<dyn RunHistoryStore>,
}

impl RunLifecycle {
    pub fn new(history: Arc<dyn RunHistoryStore>) -> Self {
        Self { history }
    }

    /// 创建 in_progress 记录并持久化；写入失败时调用方不得继续执行备份
    #[instrument(skip(self, request), fields(project_id = %request.project_id, backup_type = %request.backup_type))]
    pub async fn begin(&self, request: BeginRun) -> Result<BackupRun> {
        let run = BackupRun {
            id: Uuid::new_v4().to_string(),
            project_id: request.project_id,
            backup_type: request.backup_type,
            status: RunStatus::InProgress,
            source_environment: request.source_environment,
            target_environment: request.target_environment,
            started_at: Utc::now(),
            completed_at: None,
            duration: None,
            error: None,
            metadata: RunMetadata {
                triggered_by: request.triggered_by,
                note: request.note,
                environment_id: None,
            },
        };

        self.history
            .add_run(&run)
            .await
            .map_err(BackupError::into_persistence)?;

        info!(run_id = %run.id, target = %run.target_environment, "运行已开始");
        Ok(run)
    }

    /// 根据执行结果生成终态记录并持久化
    pub async fn complete(&self, run: BackupRun, outcome: ExecutionOutcome) -> Result<CompletedRun> {
        let next = if outcome.success {
            RunStatus::Completed
        } else {
            RunStatus::Failed
        };
        let error = if outcome.success {
            None
        } else {
            Some(outcome.error.unwrap_or_else(|| "未知错误".to_string()))
        };
        self.finish(run, next, error, Some(outcome.duration_ms), outcome.environment_id)
            .await
    }

    /// 在执行之外的意外错误后把运行标记为失败
    pub async fn fail(&self, run: BackupRun, message: impl Into<String>) -> Result<CompletedRun> {
        let message = message.into();
        self.finish(run, RunStatus::Failed, Some(message), None, None)
            .await
    }

    async fn finish(
        &self,
        mut run: BackupRun,
        next: RunStatus,
        error: Option<String>,
        duration_ms: Option<u64>,
        environment_id: Option<String>,
    ) -> Result<CompletedRun> {
        if !run.status.can_transition_to(next) {
            return Err(BackupError::InvalidTransition {
                from: run.status.to_string(),
                to: next.to_string(),
            });
        }

        let completed_at = Utc::now().max(run.started_at);
        let elapsed = completed_at
            .signed_duration_since(run.started_at)
            .num_milliseconds()
            .max(0) as u64;

        run.status = next;
        run.completed_at = Some(completed_at);
        run.duration = Some(duration_ms.unwrap_or(elapsed));
        run.error = error;
        if environment_id.is_some() {
            run.metadata.environment_id = environment_id;
        }

        let persistence_error = match self.history.update_run(&run).await {
            Ok(()) => None,
            Err(e) => {
                error!(run_id = %run.id, status = %run.status, "写入运行终态失败: {}", e);
                Some(e.to_string())
            }
        };

        info!(run_id = %run.id, status = %run.status, duration_ms = ?run.duration, "运行已结束");
        Ok(CompletedRun {
            run,
            persistence_error,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::MemoryStore;

    fn request() -> BeginRun {
        BeginRun {
            project_id: "p1".into(),
            backup_type: BackupType::Daily,
            source_environment: "main".into(),
            target_environment: "backup-daily-x".into(),
            triggered_by: TriggeredBy::Cron,
            note: None,
        }
    }

    fn success(duration_ms: u64) -> ExecutionOutcome {
        ExecutionOutcome {
            success: true,
            environment_id: Some("env-1".into()),
            error: None,
            duration_ms,
        }
    }

    #[tokio::test]
    async fn test_begin_then_complete_success() {
        let store = Arc::new(MemoryStore::default());
        let lifecycle = RunLifecycle::new(store.clone());

        let run = lifecycle.begin(request()).await.unwrap();
        assert_eq!(run.status, RunStatus::InProgress);
        assert_eq!(store.runs()[0].status, RunStatus::InProgress);

        let done = lifecycle.complete(run, success(12)).await.unwrap();
        assert!(done.persistence_error.is_none());
        assert_eq!(done.run.status, RunStatus::Completed);
        assert!(done.run.completed_at.unwrap() >= done.run.started_at);
        assert_eq!(done.run.duration, Some(12));
        assert!(done.run.error.is_none());
        assert_eq!(done.run.metadata.environment_id.as_deref(), Some("env-1"));
        assert_eq!(store.runs()[0].status, RunStatus::Completed);
    }

    #[tokio::test]
    async fn test_failure_records_error() {
        let store = Arc::new(MemoryStore::default());
        let lifecycle = RunLifecycle::new(store.clone());
        let run = lifecycle.begin(request()).await.unwrap();

        let done = lifecycle
            .complete(run, ExecutionOutcome::failure("rate limited", 5))
            .await
            .unwrap();
        assert_eq!(done.run.status, RunStatus::Failed);
        assert_eq!(done.run.error.as_deref(), Some("rate limited"));
    }

    #[tokio::test]
    async fn test_begin_failure_is_persistence_error() {
        let store = Arc::new(MemoryStore::default());
        store.fail_add_run(true);
        let lifecycle = RunLifecycle::new(store.clone());

        let err = lifecycle.begin(request()).await.unwrap_err();
        assert!(matches!(err, BackupError::Persistence(_)));
        assert!(store.runs().is_empty());
    }

    #[tokio::test]
    async fn test_update_failure_does_not_overturn_outcome() {
        let store = Arc::new(MemoryStore::default());
        let lifecycle = RunLifecycle::new(store.clone());
        let run = lifecycle.begin(request()).await.unwrap();

        store.fail_update_run(true);
        let done = lifecycle.complete(run, success(1)).await.unwrap();
        assert_eq!(done.run.status, RunStatus::Completed);
        assert!(done.persistence_error.is_some());
        // 存储中仍是 in_progress
        assert_eq!(store.runs()[0].status, RunStatus::InProgress);
    }

    #[tokio::test]
    async fn test_terminal_run_cannot_transition_again() {
        let store = Arc::new(MemoryStore::default());
        let lifecycle = RunLifecycle::new(store.clone());
        let run = lifecycle.begin(request()).await.unwrap();
        let done = lifecycle.complete(run, success(1)).await.unwrap();

        let err = lifecycle.fail(done.run, "again").await.unwrap_err();
        assert!(matches!(err, BackupError::InvalidTransition { .. }));
    }
}
