use crate::{BackupError, Result};
use std::path::Path;
use tokio::sync::{mpsc, oneshot};

use super::actor::DuckDbActor;
use super::messages::DbMessage;
use super::models::{ClaimRow, ProjectRow, RunRow};

/// DuckDB数据库管理器
#[derive(Debug, Clone)]
pub struct DuckDbManager {
    sender: mpsc::Sender<DbMessage>,
}

impl DuckDbManager {
    /// 创建新的DuckDB管理器
    pub async fn new<P: AsRef<Path>>(db_path: P) -> Result<Self> {
        let db_path = db_path.as_ref().to_path_buf();

        // 确保数据库文件的父目录存在
        if let Some(parent) = db_path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await?;
        }

        let (sender, receiver) = mpsc::channel(100);

        // 启动DuckDB Actor
        let actor = DuckDbActor::new(db_path)?;
        tokio::spawn(actor.run(receiver));

        let manager = Self { sender };
        manager.init_tables().await?;

        Ok(manager)
    }

    /// 创建内存数据库管理器
    pub async fn new_memory() -> Result<Self> {
        let (sender, receiver) = mpsc::channel(100);

        // 启动DuckDB Actor（内存模式）
        let actor = DuckDbActor::new_memory()?;
        tokio::spawn(actor.run(receiver));

        let manager = Self { sender };
        manager.init_tables().await?;

        Ok(manager)
    }

    /// 发送消息并等待 Actor 响应
    async fn request<T>(
        &self,
        build: impl FnOnce(oneshot::Sender<Result<T>>) -> DbMessage,
    ) -> Result<T> {
        let (respond_to, receiver) = oneshot::channel();

        self.sender
            .send(build(respond_to))
            .await
            .map_err(|_| BackupError::persistence("数据库Actor已关闭"))?;

        receiver
            .await
            .map_err(|_| BackupError::persistence("等待数据库响应失败"))?
    }

    /// 初始化数据库表
    async fn init_tables(&self) -> Result<()> {
        self.request(|respond_to| DbMessage::InitTables { respond_to })
            .await
    }

    /// 连通性探测
    pub async fn ping(&self) -> Result<()> {
        self.request(|respond_to| DbMessage::Ping { respond_to }).await
    }

    /// 读取项目配置 JSON
    pub async fn get_config(&self, project_id: &str) -> Result<Option<String>> {
        let project_id = project_id.to_string();
        self.request(|respond_to| DbMessage::GetConfig {
            project_id,
            respond_to,
        })
        .await
    }

    /// 写入项目配置 JSON
    pub async fn set_config(
        &self,
        project_id: String,
        config_json: String,
        updated_at: String,
    ) -> Result<()> {
        self.request(|respond_to| DbMessage::SetConfig {
            project_id,
            config_json,
            updated_at,
            respond_to,
        })
        .await
    }

    /// 删除项目配置
    pub async fn delete_config(&self, project_id: &str) -> Result<()> {
        let project_id = project_id.to_string();
        self.request(|respond_to| DbMessage::DeleteConfig {
            project_id,
            respond_to,
        })
        .await
    }

    /// 列出已注册项目
    pub async fn list_projects(&self) -> Result<Vec<ProjectRow>> {
        self.request(|respond_to| DbMessage::ListProjects { respond_to })
            .await
    }

    /// 注册项目
    pub async fn register_project(&self, row: ProjectRow) -> Result<()> {
        self.request(|respond_to| DbMessage::RegisterProject { row, respond_to })
            .await
    }

    /// 注销项目
    pub async fn unregister_project(&self, project_id: &str) -> Result<()> {
        let project_id = project_id.to_string();
        self.request(|respond_to| DbMessage::UnregisterProject {
            project_id,
            respond_to,
        })
        .await
    }

    /// 更新项目活跃时间，返回受影响行数
    pub async fn touch_project(&self, project_id: &str, last_active_at: String) -> Result<usize> {
        let project_id = project_id.to_string();
        self.request(|respond_to| DbMessage::TouchProject {
            project_id,
            last_active_at,
            respond_to,
        })
        .await
    }

    /// 新增运行记录
    pub async fn insert_run(&self, row: RunRow) -> Result<()> {
        self.request(|respond_to| DbMessage::InsertRun { row, respond_to })
            .await
    }

    /// 更新运行记录，返回受影响行数
    pub async fn update_run(&self, row: RunRow) -> Result<usize> {
        self.request(|respond_to| DbMessage::UpdateRun { row, respond_to })
            .await
    }

    /// 分页读取运行记录
    pub async fn get_run_history(
        &self,
        project_id: &str,
        limit: u32,
        offset: u32,
    ) -> Result<(Vec<RunRow>, u64)> {
        let project_id = project_id.to_string();
        self.request(|respond_to| DbMessage::GetRunHistory {
            project_id,
            limit,
            offset,
            respond_to,
        })
        .await
    }

    /// 认领 (项目, 类型)
    pub async fn try_claim(&self, row: ClaimRow, stale_before: String) -> Result<bool> {
        self.request(|respond_to| DbMessage::TryClaim {
            row,
            stale_before,
            respond_to,
        })
        .await
    }

    /// 释放认领
    pub async fn release_claim(
        &self,
        project_id: String,
        backup_type: String,
        owner: String,
    ) -> Result<()> {
        self.request(|respond_to| DbMessage::ReleaseClaim {
            project_id,
            backup_type,
            owner,
            respond_to,
        })
        .await
    }
}
