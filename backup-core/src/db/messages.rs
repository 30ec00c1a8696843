use crate::Result;
use tokio::sync::oneshot;

use super::models::{ClaimRow, ProjectRow, RunRow};

/// DuckDB数据库操作消息
#[derive(Debug)]
pub enum DbMessage {
    /// 初始化数据库表
    InitTables {
        respond_to: oneshot::Sender<Result<()>>,
    },
    /// 连通性探测
    Ping {
        respond_to: oneshot::Sender<Result<()>>,
    },

    // ========== 项目配置 ==========
    /// 读取项目配置 JSON
    GetConfig {
        project_id: String,
        respond_to: oneshot::Sender<Result<Option<String>>>,
    },
    /// 写入项目配置 JSON
    SetConfig {
        project_id: String,
        config_json: String,
        updated_at: String,
        respond_to: oneshot::Sender<Result<()>>,
    },
    /// 删除项目配置
    DeleteConfig {
        project_id: String,
        respond_to: oneshot::Sender<Result<()>>,
    },

    // ========== 项目注册 ==========
    /// 列出所有已注册项目
    ListProjects {
        respond_to: oneshot::Sender<Result<Vec<ProjectRow>>>,
    },
    /// 注册项目（已存在则覆盖）
    RegisterProject {
        row: ProjectRow,
        respond_to: oneshot::Sender<Result<()>>,
    },
    /// 注销项目
    UnregisterProject {
        project_id: String,
        respond_to: oneshot::Sender<Result<()>>,
    },
    /// 更新项目活跃时间
    TouchProject {
        project_id: String,
        last_active_at: String,
        respond_to: oneshot::Sender<Result<usize>>,
    },

    // ========== 运行记录 ==========
    /// 新增运行记录
    InsertRun {
        row: RunRow,
        respond_to: oneshot::Sender<Result<()>>,
    },
    /// 更新运行记录，返回受影响行数
    UpdateRun {
        row: RunRow,
        respond_to: oneshot::Sender<Result<usize>>,
    },
    /// 分页读取运行记录（按开始时间倒序）及总数
    GetRunHistory {
        project_id: String,
        limit: u32,
        offset: u32,
        respond_to: oneshot::Sender<Result<(Vec<RunRow>, u64)>>,
    },

    // ========== 运行认领 ==========
    /// 认领 (项目, 类型)，早于 stale_before 的旧认领会被清除
    TryClaim {
        row: ClaimRow,
        stale_before: String,
        respond_to: oneshot::Sender<Result<bool>>,
    },
    /// 释放认领
    ReleaseClaim {
        project_id: String,
        backup_type: String,
        owner: String,
        respond_to: oneshot::Sender<Result<()>>,
    },
}
