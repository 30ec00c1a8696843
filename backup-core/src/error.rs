use serde::Serialize;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, BackupError>;

#[derive(Error, Debug)]
pub enum BackupError {
    #[error("参数校验失败: {0}")]
    Validation(String),

    #[error("未授权")]
    Unauthorized,

    #[error("资源不存在: {0}")]
    NotFound(String),

    #[error("备份执行失败: {0}")]
    Execution(String),

    #[error("持久化失败: {0}")]
    Persistence(String),

    #[error("无法枚举活跃项目: {0}")]
    SweepInfrastructure(String),

    #[error("非法的状态转换: {from} -> {to}")]
    InvalidTransition { from: String, to: String },

    #[error("配置错误: {0}")]
    Config(#[from] toml::de::Error),

    #[error("配置序列化错误: {0}")]
    ConfigSerialize(#[from] toml::ser::Error),

    #[error("DuckDB数据库错误: {0}")]
    DuckDb(String),

    #[error("HTTP 请求错误: {0}")]
    Http(#[from] reqwest::Error),

    #[error("IO 错误: {0}")]
    Io(#[from] std::io::Error),

    #[error("序列化错误: {0}")]
    Serde(#[from] serde_json::Error),

    #[error("任务执行错误: {0}")]
    Join(#[from] tokio::task::JoinError),

    #[error("API请求失败: {0}")]
    Api(String),

    #[error("配置文件未找到")]
    ConfigNotFound,
}

/// 错误分类，对应对外暴露的错误语义
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    Validation,
    Authorization,
    NotFound,
    Execution,
    Persistence,
    SweepInfrastructure,
    Internal,
}

// 为DuckDB错误实现From trait
impl From<duckdb::Error> for BackupError {
    fn from(err: duckdb::Error) -> Self {
        BackupError::DuckDb(err.to_string())
    }
}

impl BackupError {
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::NotFound(msg.into())
    }

    pub fn execution(msg: impl Into<String>) -> Self {
        Self::Execution(msg.into())
    }

    pub fn persistence(msg: impl Into<String>) -> Self {
        Self::Persistence(msg.into())
    }

    pub fn api(msg: impl Into<String>) -> Self {
        Self::Api(msg.into())
    }

    /// 归类到对外的错误语义
    pub fn kind(&self) -> ErrorKind {
        match self {
            BackupError::Validation(_) => ErrorKind::Validation,
            BackupError::Unauthorized => ErrorKind::Authorization,
            BackupError::NotFound(_) => ErrorKind::NotFound,
            BackupError::Execution(_) | BackupError::Api(_) | BackupError::Http(_) => {
                ErrorKind::Execution
            }
            BackupError::Persistence(_) | BackupError::DuckDb(_) => ErrorKind::Persistence,
            BackupError::SweepInfrastructure(_) => ErrorKind::SweepInfrastructure,
            _ => ErrorKind::Internal,
        }
    }

    /// 将存储层错误统一包装为持久化错误，其他错误保持不变
    pub fn into_persistence(self) -> Self {
        match self {
            BackupError::Persistence(_) => self,
            other => BackupError::Persistence(other.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_kind_mapping() {
        assert_eq!(BackupError::validation("x").kind(), ErrorKind::Validation);
        assert_eq!(BackupError::Unauthorized.kind(), ErrorKind::Authorization);
        assert_eq!(BackupError::DuckDb("x".into()).kind(), ErrorKind::Persistence);
        assert_eq!(BackupError::api("503").kind(), ErrorKind::Execution);
        assert_eq!(BackupError::ConfigNotFound.kind(), ErrorKind::Internal);
    }

    #[test]
    fn test_into_persistence_keeps_message() {
        let err = BackupError::DuckDb("disk full".into()).into_persistence();
        assert!(matches!(err, BackupError::Persistence(ref m) if m.contains("disk full")));
    }
}
