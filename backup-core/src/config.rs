use crate::constants::{api, config, sweep};
use crate::error::{BackupError, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// 应用配置结构
#[derive(Debug, Serialize, Deserialize, Clone, Default, PartialEq)]
#[serde(default)]
pub struct AppConfig {
    pub database: DatabaseConfig,
    pub api: ApiConfig,
    pub sweep: SweepConfig,
    pub security: SecurityConfig,
}

/// 数据库相关配置
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(default)]
pub struct DatabaseConfig {
    pub path: String,
}

/// 克隆 API 相关配置
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(default)]
pub struct ApiConfig {
    pub base_url: String,
    pub request_timeout_secs: u64,
}

/// 巡检相关配置
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(default)]
pub struct SweepConfig {
    pub max_concurrency: usize,
    pub deadline_secs: u64,
    pub history_window: u32,
    pub claim_ttl_minutes: i64,
    pub interval_minutes: u64,
    pub execute_timeout_secs: u64,
}

/// 凭据来源配置（只记录环境变量名）
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(default)]
pub struct SecurityConfig {
    pub cron_secret_env: String,
    pub api_secret_env: String,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: config::DEFAULT_DATABASE_PATH.to_string(),
        }
    }
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            base_url: api::DEFAULT_BASE_URL.to_string(),
            request_timeout_secs: api::DEFAULT_REQUEST_TIMEOUT_SECS,
        }
    }
}

impl Default for SweepConfig {
    fn default() -> Self {
        Self {
            max_concurrency: sweep::DEFAULT_MAX_CONCURRENCY,
            deadline_secs: sweep::DEFAULT_DEADLINE_SECS,
            history_window: sweep::DEFAULT_HISTORY_WINDOW,
            claim_ttl_minutes: sweep::DEFAULT_CLAIM_TTL_MINUTES,
            interval_minutes: sweep::DEFAULT_INTERVAL_MINUTES,
            execute_timeout_secs: sweep::DEFAULT_EXECUTE_TIMEOUT_SECS,
        }
    }
}

impl Default for SecurityConfig {
    fn default() -> Self {
        Self {
            cron_secret_env: config::DEFAULT_CRON_SECRET_ENV.to_string(),
            api_secret_env: config::DEFAULT_API_SECRET_ENV.to_string(),
        }
    }
}

impl AppConfig {
    /// 智能查找并加载配置文件
    /// 按优先级查找：config.toml -> env-backup.toml -> .env-backup.toml
    pub fn find_and_load_config() -> Result<Self> {
        match Self::find_config_file() {
            Some(path) => {
                tracing::info!(path = %path.display(), "找到配置文件");
                Self::load_from_file(path)
            }
            None => {
                tracing::warn!("未找到配置文件，使用默认配置");
                Ok(Self::default())
            }
        }
    }

    /// 在当前目录查找第一个存在的配置文件
    pub fn find_config_file() -> Option<PathBuf> {
        config::CONFIG_FILE_CANDIDATES
            .iter()
            .map(PathBuf::from)
            .find(|p| p.exists())
    }

    /// 从指定文件加载配置
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(BackupError::ConfigNotFound);
        }
        let content = fs::read_to_string(path)?;
        let config: AppConfig = toml::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// 保存配置到文件
    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        if let Some(parent) = path.as_ref().parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }
        fs::write(&path, self.to_toml_with_comments())?;
        Ok(())
    }

    /// 生成带注释的TOML配置
    fn to_toml_with_comments(&self) -> String {
        const TEMPLATE: &str = include_str!("../templates/config.toml.template");

        TEMPLATE
            .replace("{database_path}", &self.database.path)
            .replace("{api_base_url}", &self.api.base_url)
            .replace(
                "{request_timeout_secs}",
                &self.api.request_timeout_secs.to_string(),
            )
            .replace("{max_concurrency}", &self.sweep.max_concurrency.to_string())
            .replace("{deadline_secs}", &self.sweep.deadline_secs.to_string())
            .replace("{history_window}", &self.sweep.history_window.to_string())
            .replace(
                "{claim_ttl_minutes}",
                &self.sweep.claim_ttl_minutes.to_string(),
            )
            .replace("{interval_minutes}", &self.sweep.interval_minutes.to_string())
            .replace(
                "{execute_timeout_secs}",
                &self.sweep.execute_timeout_secs.to_string(),
            )
            .replace("{cron_secret_env}", &self.security.cron_secret_env)
            .replace("{api_secret_env}", &self.security.api_secret_env)
    }

    /// 检查数值配置是否合理
    pub fn validate(&self) -> Result<()> {
        if self.sweep.max_concurrency == 0 {
            return Err(BackupError::validation("sweep.max_concurrency 必须大于 0"));
        }
        if self.sweep.history_window == 0 {
            return Err(BackupError::validation("sweep.history_window 必须大于 0"));
        }
        if self.sweep.claim_ttl_minutes <= 0 {
            return Err(BackupError::validation("sweep.claim_ttl_minutes 必须大于 0"));
        }
        if self.sweep.interval_minutes == 0 {
            return Err(BackupError::validation("sweep.interval_minutes 必须大于 0"));
        }
        if self.api.base_url.trim().is_empty() {
            return Err(BackupError::validation("api.base_url 不能为空"));
        }
        Ok(())
    }

    /// 获取数据库文件路径
    pub fn database_path(&self) -> PathBuf {
        PathBuf::from(&self.database.path)
    }

    /// 单次巡检的时间预算
    pub fn sweep_deadline(&self) -> Option<Duration> {
        (self.sweep.deadline_secs > 0).then(|| Duration::from_secs(self.sweep.deadline_secs))
    }

    /// 单次克隆调用的超时
    pub fn execute_timeout(&self) -> Option<Duration> {
        (self.sweep.execute_timeout_secs > 0)
            .then(|| Duration::from_secs(self.sweep.execute_timeout_secs))
    }

    /// 从环境变量读取巡检密钥
    pub fn cron_secret(&self) -> Option<String> {
        read_secret(&self.security.cron_secret_env)
    }

    /// 从环境变量读取管理密钥
    pub fn api_secret(&self) -> Option<String> {
        read_secret(&self.security.api_secret_env)
    }
}

fn read_secret(var: &str) -> Option<String> {
    std::env::var(var).ok().filter(|v| !v.is_empty())
}
