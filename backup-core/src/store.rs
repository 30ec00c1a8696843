//! 引擎依赖的外部协作者接口
//!
//! 引擎只依赖这些抽象操作，不关心具体实现；默认实现见 [`crate::database::Database`]。

use crate::error::Result;
use crate::models::{BackupConfig, BackupRun, BackupType, ProjectRegistration};
use async_trait::async_trait;
use chrono::{DateTime, Utc};

/// 项目配置存储
#[async_trait]
pub trait ConfigStore: Send + Sync {
    async fn get_config(&self, project_id: &str) -> Result<Option<BackupConfig>>;
    async fn set_config(&self, config: &BackupConfig) -> Result<()>;
    async fn delete_config(&self, project_id: &str) -> Result<()>;
}

/// 项目注册表
#[async_trait]
pub trait ProjectRegistry: Send + Sync {
    async fn get_active_projects(&self) -> Result<Vec<String>>;
    async fn register_project(&self, registration: &ProjectRegistration) -> Result<()>;
    async fn unregister_project(&self, project_id: &str) -> Result<()>;
    async fn update_project_activity(&self, project_id: &str, at: DateTime<Utc>) -> Result<()>;
}

/// 一页运行记录，按开始时间倒序
#[derive(Debug, Clone, Default)]
pub struct RunPage {
    pub runs: Vec<BackupRun>,
    pub total: u64,
}

/// 运行历史存储
#[async_trait]
pub trait RunHistoryStore: Send + Sync {
    async fn add_run(&self, run: &BackupRun) -> Result<()>;
    async fn update_run(&self, run: &BackupRun) -> Result<()>;
    async fn get_run_history(&self, project_id: &str, limit: u32, offset: u32) -> Result<RunPage>;
}

/// (项目, 类型) 上的运行认领
#[derive(Debug, Clone, PartialEq)]
pub struct RunClaim {
    pub project_id: String,
    pub backup_type: BackupType,
    pub owner: String,
    pub claimed_at: DateTime<Utc>,
}

/// 认领存储：同一 (项目, 类型) 同时只能有一个有效认领
#[async_trait]
pub trait RunClaimStore: Send + Sync {
    /// 原子地认领；早于 `stale_before` 的旧认领视为失效。返回是否认领成功
    async fn try_claim(&self, claim: &RunClaim, stale_before: DateTime<Utc>) -> Result<bool>;
    /// 释放认领，只释放属于 `owner` 的那一条
    async fn release_claim(&self, project_id: &str, backup_type: BackupType, owner: &str)
    -> Result<()>;
}

/// 存储连通性探测
#[async_trait]
pub trait StoreProbe: Send + Sync {
    async fn ping(&self) -> Result<()>;
}

/// 引擎所需的全部存储能力
pub trait BackupStore:
    ConfigStore + ProjectRegistry + RunHistoryStore + RunClaimStore + StoreProbe
{
}

impl<T> BackupStore for T where
    T: ConfigStore + ProjectRegistry + RunHistoryStore + RunClaimStore + StoreProbe
{
}
