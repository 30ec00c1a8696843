//! 凭据校验
//!
//! 所有特权操作在进入引擎逻辑之前都必须先经过这里的比较。

use crate::error::{BackupError, Result};

/// 常量时间比较，避免通过耗时推断凭据内容
pub fn secure_compare(expected: &str, provided: &str) -> bool {
    let expected = expected.as_bytes();
    let provided = provided.as_bytes();

    // 长度差异也计入结果，循环次数只取决于 expected 的长度
    let mut diff = u8::from(expected.len() != provided.len());
    for (i, byte) in expected.iter().enumerate() {
        let other = provided.get(i).copied().unwrap_or(0);
        diff |= byte ^ other;
    }
    diff == 0
}

/// 校验调用方提供的凭据与项目 Token 一致
pub fn authorize_token(expected: &str, provided: Option<&str>) -> Result<()> {
    match provided {
        Some(token) if !token.is_empty() && secure_compare(expected, token) => Ok(()),
        _ => Err(BackupError::Unauthorized),
    }
}

/// 校验共享密钥；未配置密钥时一律拒绝
pub fn verify_secret(configured: Option<&str>, provided: Option<&str>) -> Result<()> {
    match configured.filter(|s| !s.is_empty()) {
        Some(secret) => authorize_token(secret, provided.map(strip_bearer)),
        None => {
            tracing::warn!("未配置共享密钥，拒绝请求");
            Err(BackupError::Unauthorized)
        }
    }
}

/// 兼容 `Bearer <secret>` 形式的凭据
fn strip_bearer(value: &str) -> &str {
    value.strip_prefix("Bearer ").unwrap_or(value).trim()
}
