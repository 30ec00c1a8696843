//! 保留策略执行
//!
//! 成功备份后清理同类型的旧环境。只处理名称形如 `{prefix}-{时间戳}` 的环境，
//! 即本类型自己生成的备份；源环境无论如何都不会被删除。删除逐个进行，单个失败不影响其余环境。

use crate::api::EnvironmentApi;
use crate::error::{BackupError, Result};
use crate::models::{BackupConfig, BackupType, EnvironmentInfo, is_backup_environment_of};
use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use std::sync::Arc;
use tracing::{info, instrument, warn};

/// 至少保留的环境数量（最新的一个）
const MIN_KEEP: usize = 1;

/// 删除失败的环境
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RetentionFailure {
    pub environment: String,
    pub error: String,
}

/// 一次清理的结果
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RetentionSummary {
    pub deleted_environments: Vec<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub failures: Vec<RetentionFailure>,
}

/// 保留策略执行器
#[derive(Clone)]
pub struct RetentionEnforcer {
    api: Arc<dyn EnvironmentApi>,
}

impl RetentionEnforcer {
    pub fn new(api: Arc<dyn EnvironmentApi>) -> Self {
        Self { api }
    }

    pub async fn enforce(
        &self,
        config: &BackupConfig,
        backup_type: BackupType,
    ) -> Result<RetentionSummary> {
        self.enforce_at(config, backup_type, Utc::now()).await
    }

    /// 按指定时间计算年龄并清理
    #[instrument(skip(self, config, now), fields(project_id = %config.project_id))]
    pub async fn enforce_at(
        &self,
        config: &BackupConfig,
        backup_type: BackupType,
        now: DateTime<Utc>,
    ) -> Result<RetentionSummary> {
        let schedule = config.schedules.get(backup_type).ok_or_else(|| {
            BackupError::validation(format!("{backup_type} 类型没有保留策略"))
        })?;

        let pattern = format!("{}-", schedule.prefix.trim_end_matches('-'));
        let listed = self
            .api
            .list_environments(&config.api_token, &pattern)
            .await?;

        let keep = usize::try_from(schedule.effective_retention_count(backup_type))
            .unwrap_or(usize::MAX)
            .max(MIN_KEEP);
        let max_age = schedule
            .retention
            .max_age_days
            .map(|days| Duration::days(i64::from(days)));

        let doomed = select_for_deletion(
            listed,
            &schedule.prefix,
            &config.source_environment,
            keep,
            max_age,
            now,
        );

        let mut summary = RetentionSummary::default();
        for env in doomed {
            match self.api.delete_environment(&config.api_token, &env.name).await {
                Ok(()) => {
                    info!(environment = %env.name, "已删除过期备份环境");
                    summary.deleted_environments.push(env.name);
                }
                Err(e) => {
                    warn!(environment = %env.name, "删除备份环境失败: {}", e);
                    summary.failures.push(RetentionFailure {
                        environment: env.name,
                        error: e.to_string(),
                    });
                }
            }
        }

        Ok(summary)
    }
}

/// 选出要删除的环境，按创建时间从旧到新排列
fn select_for_deletion(
    listed: Vec<EnvironmentInfo>,
    prefix: &str,
    source_environment: &str,
    keep: usize,
    max_age: Option<Duration>,
    now: DateTime<Utc>,
) -> Vec<EnvironmentInfo> {
    let mut candidates: Vec<EnvironmentInfo> = listed
        .into_iter()
        .filter(|env| {
            is_backup_environment_of(&env.name, prefix) && env.name != source_environment
        })
        .collect();

    // 新的在前
    candidates.sort_by(|a, b| b.created_at.cmp(&a.created_at));

    let mut doomed: Vec<EnvironmentInfo> = candidates
        .into_iter()
        .enumerate()
        .filter(|(index, env)| {
            let over_count = *index >= keep;
            let too_old = *index >= MIN_KEEP
                && max_age.is_some_and(|age| now.signed_duration_since(env.created_at) > age);
            over_count || too_old
        })
        .map(|(_, env)| env)
        .collect();

    doomed.reverse();
    doomed
}
