//! 巡检控制器
//!
//! 遍历全部活跃项目，对每个到期的备份类型依次执行：认领、开始运行、克隆、
//! 写入终态、成功后清理旧环境。项目之间可以并发，同一项目内的类型严格串行。
//! 单个项目或类型的失败只记录在结果里，不会中断其他项目。

use crate::api::EnvironmentApi;
use crate::config::AppConfig;
use crate::constants::sweep;
use crate::error::BackupError;
use crate::executor::BackupExecutor;
use crate::lifecycle::{BeginRun, RunLifecycle};
use crate::models::{BackupConfig, BackupType, RunStatus, TriggeredBy, generate_backup_environment_id};
use crate::retention::{RetentionEnforcer, RetentionSummary};
use crate::schedule::{DueBackup, due_backups, last_completed_by_type};
use crate::store::{
    BackupStore, ConfigStore, ProjectRegistry, RunClaim, RunClaimStore, RunHistoryStore,
};
use chrono::{DateTime, Utc};
use futures::stream::{self, StreamExt};
use serde::Serialize;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{error, info, instrument, warn};
use uuid::Uuid;

/// 时间预算耗尽时未开始的类型记录的错误
pub const DEADLINE_EXCEEDED: &str = "时间预算耗尽，推迟到下次巡检";

/// 巡检参数
#[derive(Debug, Clone)]
pub struct SweepSettings {
    pub max_concurrency: usize,
    /// 超过该时长后不再开始新的项目或类型
    pub deadline: Option<Duration>,
    pub history_window: u32,
    pub claim_ttl: chrono::Duration,
    pub execute_timeout: Option<Duration>,
}

impl Default for SweepSettings {
    fn default() -> Self {
        Self {
            max_concurrency: sweep::DEFAULT_MAX_CONCURRENCY,
            deadline: Some(Duration::from_secs(sweep::DEFAULT_DEADLINE_SECS)),
            history_window: sweep::DEFAULT_HISTORY_WINDOW,
            claim_ttl: chrono::Duration::minutes(sweep::DEFAULT_CLAIM_TTL_MINUTES),
            execute_timeout: Some(Duration::from_secs(sweep::DEFAULT_EXECUTE_TIMEOUT_SECS)),
        }
    }
}

impl From<&AppConfig> for SweepSettings {
    fn from(config: &AppConfig) -> Self {
        Self {
            max_concurrency: config.sweep.max_concurrency.max(1),
            deadline: config.sweep_deadline(),
            history_window: config.sweep.history_window,
            claim_ttl: chrono::Duration::minutes(config.sweep.claim_ttl_minutes),
            execute_timeout: config.execute_timeout(),
        }
    }
}

/// 单个结果的状态
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum OutcomeStatus {
    Completed,
    Failed,
    /// 其他巡检持有认领
    Skipped,
    /// 未能进入执行阶段（认领、开始运行或项目级错误）
    Error,
}

/// 单个 (项目, 类型) 的处理结果；项目级错误时 `backup_type` 为空
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SweepOutcome {
    pub project_id: String,
    #[serde(rename = "type", skip_serializing_if = "Option::is_none")]
    pub backup_type: Option<BackupType>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub run_id: Option<String>,
    pub status: OutcomeStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub persistence_error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub retention: Option<RetentionSummary>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub retention_error: Option<String>,
}

impl SweepOutcome {
    fn new(project_id: &str, backup_type: Option<BackupType>, status: OutcomeStatus) -> Self {
        Self {
            project_id: project_id.to_string(),
            backup_type,
            run_id: None,
            status,
            error: None,
            persistence_error: None,
            retention: None,
            retention_error: None,
        }
    }

    fn with_error(mut self, error: impl Into<String>) -> Self {
        self.error = Some(error.into());
        self
    }
}

/// 一次巡检的汇总
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SweepReport {
    pub success: bool,
    pub executed: Vec<SweepOutcome>,
    /// 因时间预算耗尽而未开始的项目
    pub deferred_projects: Vec<String>,
    pub timestamp: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

enum ProjectResult {
    Processed(Vec<SweepOutcome>),
    Deferred(String),
}

/// 巡检控制器
#[derive(Clone)]
pub struct SweepController {
    configs: Arc<dyn ConfigStore>,
    projects: Arc<dyn ProjectRegistry>,
    history: Arc<dyn RunHistoryStore>,
    claims: Arc<dyn RunClaimStore>,
    lifecycle: RunLifecycle,
    executor: BackupExecutor,
    retention: RetentionEnforcer,
    settings: SweepSettings,
}

impl SweepController {
    pub fn new<S>(store: Arc<S>, api: Arc<dyn EnvironmentApi>, settings: SweepSettings) -> Self
    where
        S: BackupStore + 'static,
    {
        Self {
            configs: store.clone(),
            projects: store.clone(),
            history: store.clone(),
            claims: store.clone(),
            lifecycle: RunLifecycle::new(store),
            executor: BackupExecutor::new(api.clone()).with_timeout(settings.execute_timeout),
            retention: RetentionEnforcer::new(api),
            settings,
        }
    }

    pub fn settings(&self) -> &SweepSettings {
        &self.settings
    }

    /// 执行一次巡检
    #[instrument(skip(self))]
    pub async fn run_sweep(&self) -> SweepReport {
        let timestamp = Utc::now();
        let deadline = self.settings.deadline.map(|limit| Instant::now() + limit);
        let owner = Uuid::new_v4().to_string();
        info!(owner = %owner, "巡检开始");

        let project_ids = match self.projects.get_active_projects().await {
            Ok(ids) => ids,
            Err(e) => {
                let err = BackupError::SweepInfrastructure(e.to_string());
                error!("巡检中止: {}", err);
                return SweepReport {
                    success: false,
                    executed: Vec::new(),
                    deferred_projects: Vec::new(),
                    timestamp,
                    error: Some(err.to_string()),
                };
            }
        };
        info!(projects = project_ids.len(), "找到活跃项目");

        let results: Vec<ProjectResult> = stream::iter(project_ids)
            .map(|project_id| self.process_project(project_id, &owner, deadline))
            .buffered(self.settings.max_concurrency.max(1))
            .collect()
            .await;

        let mut executed = Vec::new();
        let mut deferred_projects = Vec::new();
        for result in results {
            match result {
                ProjectResult::Processed(outcomes) => executed.extend(outcomes),
                ProjectResult::Deferred(project_id) => deferred_projects.push(project_id),
            }
        }

        if !deferred_projects.is_empty() {
            warn!(deferred = deferred_projects.len(), "时间预算耗尽，剩余项目留到下一次巡检");
        }
        info!(outcomes = executed.len(), "巡检完成");

        SweepReport {
            success: true,
            executed,
            deferred_projects,
            timestamp,
            error: None,
        }
    }

    async fn process_project(
        &self,
        project_id: String,
        owner: &str,
        deadline: Option<Instant>,
    ) -> ProjectResult {
        if past(deadline) {
            return ProjectResult::Deferred(project_id);
        }

        match self.try_process_project(&project_id, owner, deadline).await {
            Ok(outcomes) => ProjectResult::Processed(outcomes),
            Err(e) => {
                error!(project_id = %project_id, "处理项目失败: {}", e);
                ProjectResult::Processed(vec![
                    SweepOutcome::new(&project_id, None, OutcomeStatus::Error)
                        .with_error(e.to_string()),
                ])
            }
        }
    }

    #[instrument(skip(self, owner, deadline))]
    async fn try_process_project(
        &self,
        project_id: &str,
        owner: &str,
        deadline: Option<Instant>,
    ) -> crate::Result<Vec<SweepOutcome>> {
        let Some(config) = self.configs.get_config(project_id).await? else {
            info!("项目没有备份配置，跳过");
            return Ok(Vec::new());
        };

        let page = self
            .history
            .get_run_history(project_id, self.settings.history_window, 0)
            .await?;
        let last_completed = last_completed_by_type(&page.runs);
        let due = due_backups(&config, &last_completed, Utc::now());
        info!(due = due.len(), "到期备份");

        let mut outcomes = Vec::with_capacity(due.len());
        for backup in due {
            if past(deadline) {
                warn!(backup_type = %backup.backup_type, "时间预算耗尽，该类型推迟到下次巡检");
                outcomes.push(
                    SweepOutcome::new(project_id, Some(backup.backup_type), OutcomeStatus::Skipped)
                        .with_error(DEADLINE_EXCEEDED),
                );
                continue;
            }
            outcomes.push(self.run_claimed(&config, backup, owner).await);
        }

        if let Err(e) = self
            .projects
            .update_project_activity(project_id, Utc::now())
            .await
        {
            warn!("更新项目活跃时间失败: {}", e);
        }

        Ok(outcomes)
    }

    /// 认领后执行，结束时释放认领
    async fn run_claimed(&self, config: &BackupConfig, backup: DueBackup, owner: &str) -> SweepOutcome {
        let project_id = config.project_id.as_str();
        let backup_type = backup.backup_type;
        let now = Utc::now();
        let claim = RunClaim {
            project_id: project_id.to_string(),
            backup_type,
            owner: owner.to_string(),
            claimed_at: now,
        };

        match self.claims.try_claim(&claim, now - self.settings.claim_ttl).await {
            Ok(true) => {}
            Ok(false) => {
                info!(backup_type = %backup_type, "已有其他巡检认领，跳过");
                return SweepOutcome::new(project_id, Some(backup_type), OutcomeStatus::Skipped)
                    .with_error("已被其他巡检认领");
            }
            Err(e) => {
                error!(backup_type = %backup_type, "认领失败: {}", e);
                return SweepOutcome::new(project_id, Some(backup_type), OutcomeStatus::Error)
                    .with_error(e.into_persistence().to_string());
            }
        }

        let outcome = self.run_due(config, backup).await;

        if let Err(e) = self
            .claims
            .release_claim(project_id, backup_type, owner)
            .await
        {
            warn!(backup_type = %backup_type, "释放认领失败: {}", e);
        }
        outcome
    }

    async fn run_due(&self, config: &BackupConfig, backup: DueBackup) -> SweepOutcome {
        let project_id = config.project_id.as_str();
        let backup_type = backup.backup_type;
        let target = generate_backup_environment_id(&backup.schedule.prefix, Utc::now());

        let run = match self
            .lifecycle
            .begin(BeginRun {
                project_id: project_id.to_string(),
                backup_type,
                source_environment: config.source_environment.clone(),
                target_environment: target.clone(),
                triggered_by: TriggeredBy::Cron,
                note: None,
            })
            .await
        {
            Ok(run) => run,
            Err(e) => {
                error!(backup_type = %backup_type, "无法创建运行记录，放弃执行: {}", e);
                return SweepOutcome::new(project_id, Some(backup_type), OutcomeStatus::Error)
                    .with_error(e.to_string());
            }
        };
        let run_id = run.id.clone();

        let execution = self
            .executor
            .execute(&config.api_token, &config.source_environment, &target)
            .await;

        let completed = match self.lifecycle.complete(run, execution).await {
            Ok(completed) => completed,
            Err(e) => {
                let mut outcome =
                    SweepOutcome::new(project_id, Some(backup_type), OutcomeStatus::Error)
                        .with_error(e.to_string());
                outcome.run_id = Some(run_id);
                return outcome;
            }
        };

        let status = match completed.run.status {
            RunStatus::Completed => OutcomeStatus::Completed,
            _ => OutcomeStatus::Failed,
        };
        let mut outcome = SweepOutcome::new(project_id, Some(backup_type), status);
        outcome.run_id = Some(run_id);
        outcome.error = completed.run.error.clone();
        outcome.persistence_error = completed.persistence_error;

        info!(backup_type = %backup_type, status = %completed.run.status, "备份结束");

        if status == OutcomeStatus::Completed {
            match self.retention.enforce(config, backup_type).await {
                Ok(summary) => {
                    info!(
                        backup_type = %backup_type,
                        deleted = summary.deleted_environments.len(),
                        "旧环境清理完成"
                    );
                    outcome.retention = Some(summary);
                }
                Err(e) => {
                    warn!(backup_type = %backup_type, "旧环境清理失败: {}", e);
                    outcome.retention_error = Some(e.to_string());
                }
            }
        }

        outcome
    }
}

fn past(deadline: Option<Instant>) -> bool {
    deadline.is_some_and(|d| Instant::now() >= d)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::EnvironmentInfo;
    use crate::test_support::{CreateBehavior, MemoryStore, MockEnvironmentApi, sample_config};

    fn settings() -> SweepSettings {
        SweepSettings {
            max_concurrency: 2,
            deadline: None,
            ..SweepSettings::default()
        }
    }

    /// 只启用每日备份的配置
    fn daily_only(project_id: &str) -> BackupConfig {
        let mut config = sample_config(project_id);
        config.schedules.weekly.enabled = false;
        config.schedules.monthly.enabled = false;
        config
    }

    async fn store_with(projects: &[&str]) -> Arc<MemoryStore> {
        let store = Arc::new(MemoryStore::default());
        for id in projects {
            store.seed_project(id, Some(daily_only(id)));
        }
        store
    }

    #[tokio::test]
    async fn test_failing_project_is_isolated() {
        let store = store_with(&["a", "b", "c"]).await;
        store.fail_config_for("b");
        let api = Arc::new(MockEnvironmentApi::default());
        let controller = SweepController::new(store.clone(), api, settings());

        let report = controller.run_sweep().await;
        assert!(report.success);
        assert_eq!(report.executed.len(), 3);

        let ids: Vec<_> = report.executed.iter().map(|o| o.project_id.as_str()).collect();
        assert_eq!(ids, vec!["a", "b", "c"]);

        let b = &report.executed[1];
        assert_eq!(b.status, OutcomeStatus::Error);
        assert!(b.backup_type.is_none());
        assert!(b.run_id.is_none());
        assert!(b.error.is_some());

        for outcome in [&report.executed[0], &report.executed[2]] {
            assert_eq!(outcome.status, OutcomeStatus::Completed);
            assert_eq!(outcome.backup_type, Some(BackupType::Daily));
            assert!(outcome.run_id.is_some());
        }
    }

    #[tokio::test]
    async fn test_missing_config_produces_no_outcome() {
        let store = store_with(&["a"]).await;
        store.seed_project("ghost", None);
        let api = Arc::new(MockEnvironmentApi::default());
        let report = SweepController::new(store, api, settings()).run_sweep().await;
        assert_eq!(report.executed.len(), 1);
        assert_eq!(report.executed[0].project_id, "a");
    }

    #[tokio::test]
    async fn test_all_cadences_due_for_new_project() {
        let store = Arc::new(MemoryStore::default());
        store.seed_project("p", Some(sample_config("p")));
        let api = Arc::new(MockEnvironmentApi::default());
        let report = SweepController::new(store.clone(), api.clone(), settings())
            .run_sweep()
            .await;

        let types: Vec<_> = report.executed.iter().filter_map(|o| o.backup_type).collect();
        assert_eq!(
            types,
            vec![BackupType::Daily, BackupType::Weekly, BackupType::Monthly]
        );
        assert_eq!(api.created().len(), 3);
        assert!(store.runs().iter().all(|r| r.status == RunStatus::Completed));
        assert!(store.activity_updated("p"));
    }

    #[tokio::test]
    async fn test_second_sweep_finds_nothing_due() {
        let store = store_with(&["p"]).await;
        let api = Arc::new(MockEnvironmentApi::default());
        let controller = SweepController::new(store.clone(), api.clone(), settings());

        controller.run_sweep().await;
        let report = controller.run_sweep().await;
        assert!(report.executed.is_empty());
        assert_eq!(api.created().len(), 1);
    }

    #[tokio::test]
    async fn test_failed_execution_skips_retention() {
        let store = store_with(&["p"]).await;
        let api = Arc::new(MockEnvironmentApi::default());
        api.set_create(CreateBehavior::Fail("rate limited".into()));
        let report = SweepController::new(store.clone(), api.clone(), settings())
            .run_sweep()
            .await;

        let outcome = &report.executed[0];
        assert_eq!(outcome.status, OutcomeStatus::Failed);
        assert_eq!(outcome.error.as_deref(), Some("rate limited"));
        assert!(outcome.retention.is_none());
        assert_eq!(api.list_calls(), 0);

        let run = &store.runs()[0];
        assert_eq!(run.status, RunStatus::Failed);
        assert_eq!(run.error.as_deref(), Some("rate limited"));
    }

    #[tokio::test]
    async fn test_successful_run_enforces_retention() {
        let store = Arc::new(MemoryStore::default());
        let mut config = daily_only("p");
        config.schedules.daily.retention.retention_count = Some(2);
        store.seed_project("p", Some(config));

        let old = Utc::now() - chrono::Duration::days(3);
        let older = old - chrono::Duration::days(1);
        let older_name = generate_backup_environment_id("backup-daily", older);
        let api = Arc::new(MockEnvironmentApi::with_environments(vec![
            EnvironmentInfo {
                name: generate_backup_environment_id("backup-daily", old),
                created_at: old,
            },
            EnvironmentInfo {
                name: older_name.clone(),
                created_at: older,
            },
        ]));

        let report = SweepController::new(store, api.clone(), settings())
            .run_sweep()
            .await;
        let retention = report.executed[0].retention.as_ref().unwrap();
        assert_eq!(retention.deleted_environments, vec![older_name]);
        assert_eq!(api.environment_names().len(), 2);
    }

    #[tokio::test]
    async fn test_held_claim_skips_run() {
        let store = store_with(&["p"]).await;
        store.seed_claim("p", BackupType::Daily, "other-sweep", Utc::now());
        let api = Arc::new(MockEnvironmentApi::default());

        let report = SweepController::new(store.clone(), api.clone(), settings())
            .run_sweep()
            .await;
        assert_eq!(report.executed[0].status, OutcomeStatus::Skipped);
        assert!(store.runs().is_empty());
        assert!(api.created().is_empty());
    }

    #[tokio::test]
    async fn test_stale_claim_is_taken_over() {
        let store = store_with(&["p"]).await;
        store.seed_claim(
            "p",
            BackupType::Daily,
            "crashed-sweep",
            Utc::now() - chrono::Duration::hours(5),
        );
        let api = Arc::new(MockEnvironmentApi::default());

        let report = SweepController::new(store.clone(), api, settings())
            .run_sweep()
            .await;
        assert_eq!(report.executed[0].status, OutcomeStatus::Completed);
        // 结束后认领已释放
        assert!(!store.has_claim("p", BackupType::Daily));
    }

    #[tokio::test]
    async fn test_begin_failure_prevents_execution() {
        let store = store_with(&["p"]).await;
        store.fail_add_run(true);
        let api = Arc::new(MockEnvironmentApi::default());

        let report = SweepController::new(store.clone(), api.clone(), settings())
            .run_sweep()
            .await;
        let outcome = &report.executed[0];
        assert_eq!(outcome.status, OutcomeStatus::Error);
        assert!(outcome.run_id.is_none());
        assert!(api.created().is_empty());
        assert!(!store.has_claim("p", BackupType::Daily));
    }

    #[tokio::test]
    async fn test_terminal_write_failure_keeps_execution_status() {
        let store = store_with(&["p"]).await;
        store.fail_update_run(true);
        let api = Arc::new(MockEnvironmentApi::default());

        let report = SweepController::new(store, api, settings()).run_sweep().await;
        let outcome = &report.executed[0];
        assert_eq!(outcome.status, OutcomeStatus::Completed);
        assert!(outcome.persistence_error.is_some());
    }

    #[tokio::test]
    async fn test_expired_deadline_defers_projects() {
        let store = store_with(&["a", "b"]).await;
        let api = Arc::new(MockEnvironmentApi::default());
        let settings = SweepSettings {
            deadline: Some(Duration::ZERO),
            ..settings()
        };

        let report = SweepController::new(store.clone(), api.clone(), settings)
            .run_sweep()
            .await;
        assert!(report.success);
        assert!(report.executed.is_empty());
        assert_eq!(report.deferred_projects, vec!["a", "b"]);
        assert!(store.runs().is_empty());
    }

    #[tokio::test]
    async fn test_deadline_between_types_reports_remaining() {
        let store = Arc::new(MemoryStore::default());
        store.seed_project("p", Some(sample_config("p")));
        let api = Arc::new(MockEnvironmentApi::default());
        api.set_create(CreateBehavior::Hang);
        let settings = SweepSettings {
            deadline: Some(Duration::from_millis(50)),
            execute_timeout: Some(Duration::from_millis(200)),
            ..settings()
        };

        let report = SweepController::new(store.clone(), api, settings)
            .run_sweep()
            .await;

        assert!(report.deferred_projects.is_empty());
        let statuses: Vec<_> = report
            .executed
            .iter()
            .map(|o| (o.backup_type, o.status))
            .collect();
        assert_eq!(
            statuses,
            vec![
                (Some(BackupType::Daily), OutcomeStatus::Failed),
                (Some(BackupType::Weekly), OutcomeStatus::Skipped),
                (Some(BackupType::Monthly), OutcomeStatus::Skipped),
            ]
        );
        assert_eq!(report.executed[1].error.as_deref(), Some(DEADLINE_EXCEEDED));
        assert!(report.executed[2].run_id.is_none());
        // 只有开始执行的类型留下运行记录
        assert_eq!(store.runs().len(), 1);
    }

    #[tokio::test]
    async fn test_enumeration_failure_is_reported() {
        let store = store_with(&["a"]).await;
        store.fail_list_projects(true);
        let api = Arc::new(MockEnvironmentApi::default());

        let report = SweepController::new(store, api, settings()).run_sweep().await;
        assert!(!report.success);
        assert!(report.executed.is_empty());
        assert!(report.error.is_some());
    }

    #[tokio::test]
    async fn test_report_json_shape() {
        let store = store_with(&["a"]).await;
        let api = Arc::new(MockEnvironmentApi::default());
        let report = SweepController::new(store, api, settings()).run_sweep().await;

        let value = serde_json::to_value(&report).unwrap();
        assert_eq!(value["success"], true);
        assert_eq!(value["executed"][0]["type"], "daily");
        assert_eq!(value["executed"][0]["status"], "completed");
        assert!(value["deferredProjects"].as_array().unwrap().is_empty());
    }
}
