//! 边界输入校验
//!
//! 所有校验都发生在任何状态变更之前；失败时返回 `BackupError::Validation`。

use crate::constants::validation::*;
use crate::error::{BackupError, Result};
use crate::models::{BackupType, RunStatus};
use once_cell::sync::Lazy;
use regex::Regex;

static PROJECT_ID_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[A-Za-z0-9][A-Za-z0-9_-]*$").expect("项目ID正则无效"));

static API_TOKEN_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[A-Za-z0-9_-]+$").expect("Token正则无效"));

static PREFIX_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[a-z0-9][a-z0-9-]*$").expect("前缀正则无效"));

/// 校验项目ID
pub fn validate_project_id(project_id: &str) -> Result<&str> {
    if project_id.is_empty() || project_id.len() > MAX_PROJECT_ID_LEN {
        return Err(BackupError::validation("项目ID缺失或长度无效"));
    }
    if !PROJECT_ID_RE.is_match(project_id) {
        return Err(BackupError::validation("项目ID格式无效"));
    }
    Ok(project_id)
}

/// 校验 API Token 格式（不校验其是否有效）
pub fn validate_api_token_format(token: &str) -> Result<&str> {
    if token.len() < MIN_API_TOKEN_LEN || token.len() > MAX_API_TOKEN_LEN {
        return Err(BackupError::validation("API Token 长度无效"));
    }
    if !API_TOKEN_RE.is_match(token) {
        return Err(BackupError::validation("API Token 格式无效"));
    }
    Ok(token)
}

/// 规范化环境名前缀；空值视为未设置
pub fn validate_environment_prefix(prefix: Option<&str>) -> Result<Option<String>> {
    let Some(prefix) = prefix.map(str::trim).filter(|p| !p.is_empty()) else {
        return Ok(None);
    };

    let normalized = prefix.to_lowercase();
    let normalized = normalized.trim_end_matches('-');
    if normalized.is_empty() || normalized.len() > MAX_PREFIX_LEN || !PREFIX_RE.is_match(normalized)
    {
        return Err(BackupError::validation(format!("环境名前缀无效: {prefix}")));
    }
    Ok(Some(normalized.to_string()))
}

/// 清理备注：去掉控制字符并截断
pub fn validate_note(note: Option<&str>) -> Option<String> {
    let cleaned: String = note?
        .chars()
        .filter(|c| !c.is_control())
        .take(MAX_NOTE_LEN)
        .collect();
    let cleaned = cleaned.trim();
    if cleaned.is_empty() {
        None
    } else {
        Some(cleaned.to_string())
    }
}

/// 校验分页大小，缺省为默认值
pub fn validate_limit(limit: Option<u32>) -> Result<u32> {
    match limit {
        None => Ok(DEFAULT_HISTORY_LIMIT),
        Some(l) if (1..=MAX_HISTORY_LIMIT).contains(&l) => Ok(l),
        Some(l) => Err(BackupError::validation(format!(
            "limit 超出范围 (1..={MAX_HISTORY_LIMIT}): {l}"
        ))),
    }
}

/// 校验分页偏移
pub fn validate_offset(offset: Option<i64>) -> Result<u32> {
    match offset {
        None => Ok(0),
        Some(o) if o >= 0 && o <= i64::from(u32::MAX) => Ok(o as u32),
        Some(o) => Err(BackupError::validation(format!("offset 无效: {o}"))),
    }
}

/// 解析可选的备份类型过滤条件
pub fn validate_backup_type(value: Option<&str>) -> Result<Option<BackupType>> {
    value
        .filter(|v| !v.is_empty())
        .map(str::parse::<BackupType>)
        .transpose()
}

/// 解析可选的运行状态过滤条件
pub fn validate_status(value: Option<&str>) -> Result<Option<RunStatus>> {
    value
        .filter(|v| !v.is_empty())
        .map(str::parse::<RunStatus>)
        .transpose()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_project_id() {
        assert!(validate_project_id("12345").is_ok());
        assert!(validate_project_id("site_a-1").is_ok());
        assert!(validate_project_id("").is_err());
        assert!(validate_project_id("../etc").is_err());
        assert!(validate_project_id("-leading").is_err());
        assert!(validate_project_id(&"a".repeat(65)).is_err());
    }

    #[test]
    fn test_api_token_format() {
        assert!(validate_api_token_format("abcdef0123456789abcd").is_ok());
        assert!(validate_api_token_format("short").is_err());
        assert!(validate_api_token_format("abcdef0123456789 abcd").is_err());
    }

    #[test]
    fn test_prefix() {
        assert_eq!(validate_environment_prefix(None).unwrap(), None);
        assert_eq!(validate_environment_prefix(Some("  ")).unwrap(), None);
        assert_eq!(
            validate_environment_prefix(Some("Release-")).unwrap(),
            Some("release".to_string())
        );
        assert!(validate_environment_prefix(Some("bad prefix")).is_err());
        assert!(validate_environment_prefix(Some("main/evil")).is_err());
    }

    #[test]
    fn test_note() {
        assert_eq!(validate_note(None), None);
        assert_eq!(validate_note(Some(" \n ")), None);
        assert_eq!(validate_note(Some("before\u{0}deploy")), Some("beforedeploy".into()));
        assert_eq!(validate_note(Some(&"x".repeat(900))).unwrap().chars().count(), MAX_NOTE_LEN);
    }

    #[test]
    fn test_pagination_bounds() {
        assert_eq!(validate_limit(None).unwrap(), DEFAULT_HISTORY_LIMIT);
        assert_eq!(validate_limit(Some(100)).unwrap(), 100);
        assert!(validate_limit(Some(0)).is_err());
        assert!(validate_limit(Some(101)).is_err());
        assert_eq!(validate_offset(None).unwrap(), 0);
        assert!(validate_offset(Some(-1)).is_err());
    }

    #[test]
    fn test_filters() {
        assert_eq!(validate_backup_type(Some("daily")).unwrap(), Some(BackupType::Daily));
        assert_eq!(validate_backup_type(None).unwrap(), None);
        assert!(validate_backup_type(Some("yearly")).is_err());
        assert_eq!(validate_status(Some("failed")).unwrap(), Some(RunStatus::Failed));
    }
}
