use crate::constants::{config::MASKED_TOKEN, schedule};
use crate::error::{BackupError, Result};
use chrono::{DateTime, Duration, Utc};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// 备份类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackupType {
    Daily,
    Weekly,
    Monthly,
    Manual,
}

impl BackupType {
    /// 参与定时调度的类型，按优先级排列
    pub const SCHEDULED: [BackupType; 3] = [BackupType::Daily, BackupType::Weekly, BackupType::Monthly];

    pub fn as_str(&self) -> &'static str {
        match self {
            BackupType::Daily => "daily",
            BackupType::Weekly => "weekly",
            BackupType::Monthly => "monthly",
            BackupType::Manual => "manual",
        }
    }

    /// 该类型固定的调度间隔，手动备份没有间隔
    pub fn default_interval(&self) -> Option<Duration> {
        match self {
            BackupType::Daily => Some(schedule::daily_interval()),
            BackupType::Weekly => Some(schedule::weekly_interval()),
            BackupType::Monthly => Some(schedule::monthly_interval()),
            BackupType::Manual => None,
        }
    }
}

impl fmt::Display for BackupType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for BackupType {
    type Err = BackupError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "daily" => Ok(BackupType::Daily),
            "weekly" => Ok(BackupType::Weekly),
            "monthly" => Ok(BackupType::Monthly),
            "manual" => Ok(BackupType::Manual),
            other => Err(BackupError::validation(format!("未知的备份类型: {other}"))),
        }
    }
}

/// 运行状态
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    InProgress,
    Completed,
    Failed,
}

impl RunStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RunStatus::InProgress => "in_progress",
            RunStatus::Completed => "completed",
            RunStatus::Failed => "failed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, RunStatus::InProgress)
    }

    /// 仅允许 in_progress -> completed / failed
    pub fn can_transition_to(&self, next: RunStatus) -> bool {
        matches!(
            (self, next),
            (RunStatus::InProgress, RunStatus::Completed) | (RunStatus::InProgress, RunStatus::Failed)
        )
    }
}

impl fmt::Display for RunStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RunStatus {
    type Err = BackupError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "in_progress" => Ok(RunStatus::InProgress),
            "completed" => Ok(RunStatus::Completed),
            "failed" => Ok(RunStatus::Failed),
            other => Err(BackupError::validation(format!("未知的运行状态: {other}"))),
        }
    }
}

/// 触发来源
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TriggeredBy {
    Manual,
    Cron,
}

/// 运行附加信息
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunMetadata {
    pub triggered_by: TriggeredBy,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub environment_id: Option<String>,
}

/// 一次备份尝试的记录
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BackupRun {
    pub id: String,
    pub project_id: String,
    #[serde(rename = "type")]
    pub backup_type: BackupType,
    pub status: RunStatus,
    pub source_environment: String,
    pub target_environment: String,
    pub started_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
    /// 毫秒
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub metadata: RunMetadata,
}

impl BackupRun {
    /// 用于计算调度的“完成时间”：优先 completed_at，缺失时回退到 started_at
    pub fn finished_at(&self) -> DateTime<Utc> {
        self.completed_at.unwrap_or(self.started_at)
    }
}

/// 保留策略
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RetentionPolicy {
    /// 最多保留的环境数量，未设置时使用该类型的默认值
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub retention_count: Option<u32>,
    /// 最长保留天数
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_age_days: Option<u32>,
}

/// 调度规格
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScheduleSpec {
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    pub prefix: String,
    /// 覆盖固定周期的间隔（小时）
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub interval_hours: Option<u32>,
    #[serde(flatten)]
    pub retention: RetentionPolicy,
}

fn default_enabled() -> bool {
    true
}

impl ScheduleSpec {
    fn with_defaults(prefix: &str, retention_count: u32) -> Self {
        Self {
            enabled: true,
            prefix: prefix.to_string(),
            interval_hours: None,
            retention: RetentionPolicy {
                retention_count: Some(retention_count),
                max_age_days: None,
            },
        }
    }

    /// 实际生效的调度间隔
    pub fn interval_for(&self, backup_type: BackupType) -> Option<Duration> {
        match self.interval_hours {
            Some(hours) if hours > 0 => Some(Duration::hours(i64::from(hours))),
            _ => backup_type.default_interval(),
        }
    }

    /// 实际生效的保留数量
    pub fn effective_retention_count(&self, backup_type: BackupType) -> u32 {
        self.retention
            .retention_count
            .unwrap_or_else(|| default_retention_count(backup_type))
    }
}

/// 各类型的默认保留数量
pub fn default_retention_count(backup_type: BackupType) -> u32 {
    match backup_type {
        BackupType::Daily => schedule::DEFAULT_DAILY_RETENTION,
        BackupType::Weekly => schedule::DEFAULT_WEEKLY_RETENTION,
        BackupType::Monthly => schedule::DEFAULT_MONTHLY_RETENTION,
        BackupType::Manual => 0,
    }
}

/// 三种周期的调度配置，三个键始终存在
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Schedules {
    pub daily: ScheduleSpec,
    pub weekly: ScheduleSpec,
    pub monthly: ScheduleSpec,
}

impl Default for Schedules {
    fn default() -> Self {
        Self {
            daily: ScheduleSpec::with_defaults(
                schedule::DEFAULT_DAILY_PREFIX,
                schedule::DEFAULT_DAILY_RETENTION,
            ),
            weekly: ScheduleSpec::with_defaults(
                schedule::DEFAULT_WEEKLY_PREFIX,
                schedule::DEFAULT_WEEKLY_RETENTION,
            ),
            monthly: ScheduleSpec::with_defaults(
                schedule::DEFAULT_MONTHLY_PREFIX,
                schedule::DEFAULT_MONTHLY_RETENTION,
            ),
        }
    }
}

impl Schedules {
    pub fn get(&self, backup_type: BackupType) -> Option<&ScheduleSpec> {
        match backup_type {
            BackupType::Daily => Some(&self.daily),
            BackupType::Weekly => Some(&self.weekly),
            BackupType::Monthly => Some(&self.monthly),
            BackupType::Manual => None,
        }
    }
}

/// 部分更新时使用的调度配置，缺失的键沿用已有值或默认值
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SchedulesPatch {
    #[serde(default)]
    pub daily: Option<ScheduleSpec>,
    #[serde(default)]
    pub weekly: Option<ScheduleSpec>,
    #[serde(default)]
    pub monthly: Option<ScheduleSpec>,
}

/// 通知设置（仅存储，不负责投递）
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NotificationSettings {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub webhook_url: Option<String>,
    #[serde(default)]
    pub on_success: bool,
    #[serde(default = "default_enabled")]
    pub on_failure: bool,
}

/// 项目备份配置
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BackupConfig {
    pub project_id: String,
    pub api_token: String,
    pub source_environment: String,
    pub schedules: Schedules,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notifications: Option<NotificationSettings>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl BackupConfig {
    /// 返回隐藏了 API Token 的副本
    pub fn masked(&self) -> Self {
        Self {
            api_token: MASKED_TOKEN.to_string(),
            ..self.clone()
        }
    }
}

/// 项目注册信息
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProjectRegistration {
    pub project_id: String,
    pub site_name: String,
    pub registered_at: DateTime<Utc>,
    pub last_active_at: DateTime<Utc>,
}

/// 外部系统中的环境
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EnvironmentInfo {
    pub name: String,
    pub created_at: DateTime<Utc>,
}

/// 克隆调用的结果
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CloneResult {
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub environment_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// 生成备份环境名：{prefix}-{YYYY-MM-DD-HHMMSS}
pub fn generate_backup_environment_id(prefix: &str, now: DateTime<Utc>) -> String {
    format!(
        "{}-{}",
        prefix.trim_end_matches('-'),
        now.format(schedule::ENVIRONMENT_TIMESTAMP_FORMAT)
    )
    .to_lowercase()
}

static ENVIRONMENT_STAMP_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\d{4}-\d{2}-\d{2}-\d{6}$").expect("环境时间戳正则无效"));

/// 判断环境名是否为该前缀生成的备份：`{prefix}-` 之后只能是时间戳
pub fn is_backup_environment_of(name: &str, prefix: &str) -> bool {
    let prefix = prefix.trim_end_matches('-').to_lowercase();
    name.strip_prefix(prefix.as_str())
        .and_then(|rest| rest.strip_prefix('-'))
        .is_some_and(|stamp| ENVIRONMENT_STAMP_RE.is_match(stamp))
}
