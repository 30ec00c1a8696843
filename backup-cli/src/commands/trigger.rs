use crate::app::CliApp;
use crate::utils::print_json;
use anyhow::bail;
use backup_core::service::TriggerOptions;
use tracing::{info, instrument, warn};

/// 手动触发一次备份
#[instrument(skip(app, token, note))]
pub async fn run_trigger(
    app: &CliApp,
    project_id: &str,
    token: Option<String>,
    backup_type: Option<String>,
    prefix: Option<String>,
    note: Option<String>,
) -> anyhow::Result<()> {
    let options = TriggerOptions {
        backup_type,
        environment_prefix: prefix,
        note,
    };

    let response = app
        .service
        .trigger_manual_backup(project_id, token.as_deref(), options)
        .await?;

    if let Some(persistence_error) = &response.persistence_error {
        warn!("备份结果未能写入历史: {}", persistence_error);
    }
    print_json(&response)?;

    if !response.success {
        bail!(
            "备份失败: {}",
            response.error.as_deref().unwrap_or("未知错误")
        );
    }
    info!(target_environment = %response.run.target_environment, "手动备份完成");
    Ok(())
}
