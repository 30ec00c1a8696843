//! 对外调用入口
//!
//! 每个操作都按固定顺序处理：输入校验、查找配置、凭据校验，全部通过后才进入引擎逻辑。
//! 在此之前的任何失败都不会产生状态变更。

use crate::api::EnvironmentApi;
use crate::auth::{authorize_token, verify_secret};
use crate::constants::{schedule, version};
use crate::error::{BackupError, Result};
use crate::executor::BackupExecutor;
use crate::lifecycle::{BeginRun, RunLifecycle};
use crate::models::{
    BackupConfig, BackupRun, BackupType, NotificationSettings, ProjectRegistration, RunStatus,
    ScheduleSpec, Schedules, SchedulesPatch, TriggeredBy, generate_backup_environment_id,
};
use crate::store::{BackupStore, ConfigStore, ProjectRegistry, RunHistoryStore, StoreProbe};
use crate::sweep::{SweepController, SweepReport, SweepSettings};
use crate::validation::{
    validate_api_token_format, validate_backup_type, validate_environment_prefix, validate_limit,
    validate_note, validate_offset, validate_project_id, validate_status,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{error, info, instrument, warn};

/// 手动触发的可选参数
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TriggerOptions {
    #[serde(default, rename = "type")]
    pub backup_type: Option<String>,
    #[serde(default)]
    pub environment_prefix: Option<String>,
    #[serde(default)]
    pub note: Option<String>,
}

/// 手动触发的结果
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TriggerResponse {
    pub success: bool,
    pub run: BackupRun,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub persistence_error: Option<String>,
}

/// 历史查询条件
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HistoryQuery {
    #[serde(default, rename = "type")]
    pub backup_type: Option<String>,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub limit: Option<u32>,
    #[serde(default)]
    pub offset: Option<i64>,
}

/// 历史查询结果
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HistoryResponse {
    pub runs: Vec<BackupRun>,
    pub total: u64,
    pub has_more: bool,
}

/// 配置的部分更新
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConfigUpdate {
    #[serde(default)]
    pub source_environment: Option<String>,
    #[serde(default)]
    pub schedules: Option<SchedulesPatch>,
    #[serde(default)]
    pub notifications: Option<NotificationSettings>,
}

/// 写入配置的请求
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PutConfigRequest {
    pub project_id: String,
    pub api_token: String,
    #[serde(default)]
    pub config: Option<ConfigUpdate>,
}

/// 健康检查结果
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthReport {
    pub status: String,
    pub version: String,
    pub store_connected: bool,
    pub timestamp: DateTime<Utc>,
}

/// 备份引擎对外服务
#[derive(Clone)]
pub struct BackupService {
    configs: Arc<dyn ConfigStore>,
    projects: Arc<dyn ProjectRegistry>,
    history: Arc<dyn RunHistoryStore>,
    probe: Arc<dyn StoreProbe>,
    lifecycle: RunLifecycle,
    executor: BackupExecutor,
    sweep: SweepController,
    cron_secret: Option<String>,
    api_secret: Option<String>,
}

impl BackupService {
    pub fn new<S>(store: Arc<S>, api: Arc<dyn EnvironmentApi>, settings: SweepSettings) -> Self
    where
        S: BackupStore + 'static,
    {
        let executor = BackupExecutor::new(api.clone()).with_timeout(settings.execute_timeout);
        Self {
            configs: store.clone(),
            projects: store.clone(),
            history: store.clone(),
            probe: store.clone(),
            lifecycle: RunLifecycle::new(store.clone()),
            executor,
            sweep: SweepController::new(store, api, settings),
            cron_secret: None,
            api_secret: None,
        }
    }

    /// 设置巡检密钥与管理密钥
    pub fn with_secrets(mut self, cron_secret: Option<String>, api_secret: Option<String>) -> Self {
        self.cron_secret = cron_secret;
        self.api_secret = api_secret;
        self
    }

    async fn load_config(&self, project_id: &str) -> Result<BackupConfig> {
        self.configs
            .get_config(project_id)
            .await
            .map_err(BackupError::into_persistence)?
            .ok_or_else(|| BackupError::not_found(format!("项目未配置: {project_id}")))
    }

    /// 手动触发一次备份
    #[instrument(skip(self, credential, options))]
    pub async fn trigger_manual_backup(
        &self,
        project_id: &str,
        credential: Option<&str>,
        options: TriggerOptions,
    ) -> Result<TriggerResponse> {
        validate_project_id(project_id)?;
        let backup_type = match validate_backup_type(options.backup_type.as_deref()) {
            Ok(parsed) => parsed.unwrap_or(BackupType::Manual),
            Err(e) => {
                warn!("{}，按手动备份处理", e);
                BackupType::Manual
            }
        };
        let prefix = validate_environment_prefix(options.environment_prefix.as_deref())?;
        let note = validate_note(options.note.as_deref());

        let config = self.load_config(project_id).await?;
        authorize_token(&config.api_token, credential)?;

        let prefix = prefix.unwrap_or_else(|| {
            format!("{}-{}", backup_type.as_str(), schedule::MANUAL_PREFIX_SUFFIX)
        });
        let target = generate_backup_environment_id(&prefix, Utc::now());

        let run = self
            .lifecycle
            .begin(BeginRun {
                project_id: project_id.to_string(),
                backup_type,
                source_environment: config.source_environment.clone(),
                target_environment: target.clone(),
                triggered_by: TriggeredBy::Manual,
                note,
            })
            .await?;

        let outcome = self
            .executor
            .execute(&config.api_token, &config.source_environment, &target)
            .await;

        let pending = run.clone();
        let completed = match self.lifecycle.complete(run, outcome).await {
            Ok(completed) => completed,
            Err(e) => {
                error!(run_id = %pending.id, "结束运行时出现意外错误: {}", e);
                if let Err(mark_err) = self.lifecycle.fail(pending, e.to_string()).await {
                    warn!("标记运行失败也未成功: {}", mark_err);
                }
                return Err(e);
            }
        };

        info!(run_id = %completed.run.id, status = %completed.run.status, "手动备份结束");
        Ok(TriggerResponse {
            success: completed.run.status == RunStatus::Completed,
            error: completed.run.error.clone(),
            persistence_error: completed.persistence_error,
            run: completed.run,
        })
    }

    /// 执行一次巡检，需提供巡检密钥
    pub async fn run_sweep(&self, secret: Option<&str>) -> Result<SweepReport> {
        verify_secret(self.cron_secret.as_deref(), secret)?;
        Ok(self.sweep.run_sweep().await)
    }

    /// 查询运行历史
    #[instrument(skip(self, credential, query))]
    pub async fn list_history(
        &self,
        project_id: &str,
        credential: Option<&str>,
        query: HistoryQuery,
    ) -> Result<HistoryResponse> {
        validate_project_id(project_id)?;
        let limit = validate_limit(query.limit)?;
        let offset = validate_offset(query.offset)?;
        let type_filter = validate_backup_type(query.backup_type.as_deref())?;
        let status_filter = validate_status(query.status.as_deref())?;

        let config = self.load_config(project_id).await?;
        authorize_token(&config.api_token, credential)?;

        // 多取一条用于判断是否还有下一页；过滤发生在分页之后
        let page = self
            .history
            .get_run_history(project_id, limit + 1, offset)
            .await
            .map_err(BackupError::into_persistence)?;
        let has_more = page.runs.len() > limit as usize;

        let runs = page
            .runs
            .into_iter()
            .filter(|run| type_filter.is_none_or(|t| run.backup_type == t))
            .filter(|run| status_filter.is_none_or(|s| run.status == s))
            .take(limit as usize)
            .collect();

        Ok(HistoryResponse {
            runs,
            total: page.total,
            has_more,
        })
    }

    /// 读取配置（Token 已隐藏）
    pub async fn get_config(&self, project_id: &str) -> Result<Option<BackupConfig>> {
        validate_project_id(project_id)?;
        let config = self
            .configs
            .get_config(project_id)
            .await
            .map_err(BackupError::into_persistence)?;
        Ok(config.map(|c| c.masked()))
    }

    /// 创建或更新配置，返回隐藏 Token 后的结果
    ///
    /// 覆盖已有配置时需要与已存储 Token 一致的凭据；未提供凭据时用请求中的 Token 比较。
    #[instrument(skip(self, request, credential), fields(project_id = %request.project_id))]
    pub async fn put_config(
        &self,
        request: PutConfigRequest,
        credential: Option<&str>,
    ) -> Result<BackupConfig> {
        validate_project_id(&request.project_id)?;
        validate_api_token_format(&request.api_token)?;
        let update = request.config.unwrap_or_default();
        let source_override = match update.source_environment.as_deref().map(str::trim) {
            Some("") => return Err(BackupError::validation("源环境名不能为空")),
            other => other.map(str::to_string),
        };
        let patch = normalize_patch(update.schedules.unwrap_or_default())?;

        let existing = self
            .configs
            .get_config(&request.project_id)
            .await
            .map_err(BackupError::into_persistence)?;
        if let Some(existing) = &existing {
            authorize_token(
                &existing.api_token,
                credential.or(Some(request.api_token.as_str())),
            )?;
        }

        let now = Utc::now();
        let existing_schedules = existing.as_ref().map(|c| &c.schedules);
        let defaults = Schedules::default();
        let pick = |patched: Option<ScheduleSpec>, backup_type: BackupType| -> ScheduleSpec {
            patched
                .or_else(|| existing_schedules.and_then(|s| s.get(backup_type)).cloned())
                .or_else(|| defaults.get(backup_type).cloned())
                .unwrap_or_else(|| defaults.daily.clone())
        };

        let config = BackupConfig {
            project_id: request.project_id.clone(),
            api_token: request.api_token,
            source_environment: source_override
                .or_else(|| existing.as_ref().map(|c| c.source_environment.clone()))
                .unwrap_or_else(|| schedule::DEFAULT_SOURCE_ENVIRONMENT.to_string()),
            schedules: Schedules {
                daily: pick(patch.daily, BackupType::Daily),
                weekly: pick(patch.weekly, BackupType::Weekly),
                monthly: pick(patch.monthly, BackupType::Monthly),
            },
            notifications: update
                .notifications
                .or_else(|| existing.as_ref().and_then(|c| c.notifications.clone())),
            created_at: existing.as_ref().map_or(now, |c| c.created_at),
            updated_at: now,
        };
        check_distinct_prefixes(&config.schedules)?;

        self.configs
            .set_config(&config)
            .await
            .map_err(BackupError::into_persistence)?;

        let registered = if existing.is_none() {
            self.projects
                .register_project(&ProjectRegistration {
                    project_id: config.project_id.clone(),
                    site_name: config.project_id.clone(),
                    registered_at: now,
                    last_active_at: now,
                })
                .await
        } else {
            self.projects
                .update_project_activity(&config.project_id, now)
                .await
        };
        registered.map_err(BackupError::into_persistence)?;

        info!(created = existing.is_none(), "配置已保存");
        Ok(config.masked())
    }

    /// 删除配置并注销项目
    #[instrument(skip(self, credential))]
    pub async fn delete_config(&self, project_id: &str, credential: Option<&str>) -> Result<()> {
        validate_project_id(project_id)?;
        let config = self.load_config(project_id).await?;
        authorize_token(&config.api_token, credential)?;

        self.configs
            .delete_config(project_id)
            .await
            .map_err(BackupError::into_persistence)?;
        self.projects
            .unregister_project(project_id)
            .await
            .map_err(BackupError::into_persistence)?;

        info!("配置已删除，项目已注销");
        Ok(())
    }

    /// 健康检查，需提供管理密钥
    pub async fn health(&self, secret: Option<&str>) -> Result<HealthReport> {
        verify_secret(self.api_secret.as_deref(), secret)?;

        let store_connected = match self.probe.ping().await {
            Ok(()) => true,
            Err(e) => {
                warn!("存储连通性检查失败: {}", e);
                false
            }
        };

        Ok(HealthReport {
            status: if store_connected { "ok" } else { "error" }.to_string(),
            version: version::API_VERSION.to_string(),
            store_connected,
            timestamp: Utc::now(),
        })
    }
}

/// 规范化调度更新中的前缀
fn normalize_patch(patch: SchedulesPatch) -> Result<SchedulesPatch> {
    let normalize = |spec: Option<ScheduleSpec>| -> Result<Option<ScheduleSpec>> {
        spec.map(|mut spec| {
            spec.prefix = validate_environment_prefix(Some(&spec.prefix))?
                .ok_or_else(|| BackupError::validation("调度前缀不能为空"))?;
            Ok(spec)
        })
        .transpose()
    };

    Ok(SchedulesPatch {
        daily: normalize(patch.daily)?,
        weekly: normalize(patch.weekly)?,
        monthly: normalize(patch.monthly)?,
    })
}

/// 各定时类型的前缀不能相同，也不能以 `-` 为界互为前缀
fn check_distinct_prefixes(schedules: &Schedules) -> Result<()> {
    let prefixes: Vec<(BackupType, &str)> = BackupType::SCHEDULED
        .iter()
        .filter_map(|t| schedules.get(*t).map(|s| (*t, s.prefix.as_str())))
        .collect();

    for (i, (left_type, left)) in prefixes.iter().enumerate() {
        for (right_type, right) in &prefixes[i + 1..] {
            let overlaps = left == right
                || right.starts_with(&format!("{left}-"))
                || left.starts_with(&format!("{right}-"));
            if overlaps {
                return Err(BackupError::validation(format!(
                    "{left_type} 前缀 '{left}' 与 {right_type} 前缀 '{right}' 冲突"
                )));
            }
        }
    }
    Ok(())
}
