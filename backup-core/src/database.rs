use crate::db::{ClaimRow, DuckDbManager, ProjectRow, RunRow};
use crate::error::{BackupError, Result};
use crate::models::{BackupConfig, BackupRun, BackupType, ProjectRegistration, RunMetadata};
use crate::store::{
    ConfigStore, ProjectRegistry, RunClaim, RunClaimStore, RunHistoryStore, RunPage, StoreProbe,
};
use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use std::path::Path;

/// 数据库 - DuckDB适配器，实现引擎所需的全部存储接口
#[derive(Debug, Clone)]
pub struct Database {
    manager: DuckDbManager,
}

/// 定宽 RFC 3339 格式，保证字典序与时间序一致
pub(crate) fn format_timestamp(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Micros, true)
}

pub(crate) fn parse_timestamp(value: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| BackupError::persistence(format!("无效的时间字段 {value}: {e}")))
}

impl Database {
    /// 连接到数据库
    pub async fn connect<P: AsRef<Path>>(db_path: P) -> Result<Self> {
        let manager = DuckDbManager::new(db_path).await?;
        Ok(Database { manager })
    }

    /// 连接到内存数据库 (主要用于测试，生产环境建议使用connect()以确保数据持久化)
    pub async fn connect_memory() -> Result<Self> {
        let manager = DuckDbManager::new_memory().await?;
        Ok(Database { manager })
    }

    /// 列出全部注册信息
    pub async fn list_registrations(&self) -> Result<Vec<ProjectRegistration>> {
        self.manager
            .list_projects()
            .await?
            .into_iter()
            .map(|row| {
                Ok(ProjectRegistration {
                    registered_at: parse_timestamp(&row.registered_at)?,
                    last_active_at: parse_timestamp(&row.last_active_at)?,
                    project_id: row.project_id,
                    site_name: row.site_name,
                })
            })
            .collect()
    }

    fn run_to_row(run: &BackupRun) -> Result<RunRow> {
        Ok(RunRow {
            id: run.id.clone(),
            project_id: run.project_id.clone(),
            backup_type: run.backup_type.as_str().to_string(),
            status: run.status.as_str().to_string(),
            source_environment: run.source_environment.clone(),
            target_environment: run.target_environment.clone(),
            started_at: format_timestamp(run.started_at),
            completed_at: run.completed_at.map(format_timestamp),
            duration_ms: run.duration.map(|d| i64::try_from(d).unwrap_or(i64::MAX)),
            error: run.error.clone(),
            metadata_json: serde_json::to_string(&run.metadata)?,
        })
    }

    fn row_to_run(row: RunRow) -> Result<BackupRun> {
        let metadata: RunMetadata = serde_json::from_str(&row.metadata_json)?;
        Ok(BackupRun {
            backup_type: row.backup_type.parse()?,
            status: row.status.parse()?,
            started_at: parse_timestamp(&row.started_at)?,
            completed_at: row.completed_at.as_deref().map(parse_timestamp).transpose()?,
            duration: row.duration_ms.map(|d| d.max(0) as u64),
            id: row.id,
            project_id: row.project_id,
            source_environment: row.source_environment,
            target_environment: row.target_environment,
            error: row.error,
            metadata,
        })
    }
}

#[async_trait]
impl ConfigStore for Database {
    async fn get_config(&self, project_id: &str) -> Result<Option<BackupConfig>> {
        match self.manager.get_config(project_id).await? {
            Some(json) => Ok(Some(serde_json::from_str(&json)?)),
            None => Ok(None),
        }
    }

    async fn set_config(&self, config: &BackupConfig) -> Result<()> {
        let json = serde_json::to_string(config)?;
        self.manager
            .set_config(
                config.project_id.clone(),
                json,
                format_timestamp(config.updated_at),
            )
            .await
    }

    async fn delete_config(&self, project_id: &str) -> Result<()> {
        self.manager.delete_config(project_id).await
    }
}

#[async_trait]
impl ProjectRegistry for Database {
    async fn get_active_projects(&self) -> Result<Vec<String>> {
        let rows = self.manager.list_projects().await?;
        Ok(rows.into_iter().map(|row| row.project_id).collect())
    }

    async fn register_project(&self, registration: &ProjectRegistration) -> Result<()> {
        self.manager
            .register_project(ProjectRow {
                project_id: registration.project_id.clone(),
                site_name: registration.site_name.clone(),
                registered_at: format_timestamp(registration.registered_at),
                last_active_at: format_timestamp(registration.last_active_at),
            })
            .await
    }

    async fn unregister_project(&self, project_id: &str) -> Result<()> {
        self.manager.unregister_project(project_id).await
    }

    async fn update_project_activity(&self, project_id: &str, at: DateTime<Utc>) -> Result<()> {
        let updated = self
            .manager
            .touch_project(project_id, format_timestamp(at))
            .await?;
        if updated == 0 {
            tracing::debug!(project_id = %project_id, "项目未注册，跳过活跃时间更新");
        }
        Ok(())
    }
}

#[async_trait]
impl RunHistoryStore for Database {
    async fn add_run(&self, run: &BackupRun) -> Result<()> {
        self.manager.insert_run(Self::run_to_row(run)?).await
    }

    async fn update_run(&self, run: &BackupRun) -> Result<()> {
        let updated = self.manager.update_run(Self::run_to_row(run)?).await?;
        if updated == 0 {
            return Err(BackupError::persistence(format!("运行记录不存在: {}", run.id)));
        }
        Ok(())
    }

    async fn get_run_history(&self, project_id: &str, limit: u32, offset: u32) -> Result<RunPage> {
        let (rows, total) = self
            .manager
            .get_run_history(project_id, limit, offset)
            .await?;
        let runs = rows
            .into_iter()
            .map(Self::row_to_run)
            .collect::<Result<Vec<_>>>()?;
        Ok(RunPage { runs, total })
    }
}

#[async_trait]
impl RunClaimStore for Database {
    async fn try_claim(&self, claim: &RunClaim, stale_before: DateTime<Utc>) -> Result<bool> {
        self.manager
            .try_claim(
                ClaimRow {
                    project_id: claim.project_id.clone(),
                    backup_type: claim.backup_type.as_str().to_string(),
                    owner: claim.owner.clone(),
                    claimed_at: format_timestamp(claim.claimed_at),
                },
                format_timestamp(stale_before),
            )
            .await
    }

    async fn release_claim(
        &self,
        project_id: &str,
        backup_type: BackupType,
        owner: &str,
    ) -> Result<()> {
        self.manager
            .release_claim(
                project_id.to_string(),
                backup_type.as_str().to_string(),
                owner.to_string(),
            )
            .await
    }
}

#[async_trait]
impl StoreProbe for Database {
    async fn ping(&self) -> Result<()> {
        self.manager.ping().await
    }
}
