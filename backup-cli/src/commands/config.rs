use crate::app::CliApp;
use crate::utils::print_json;
use anyhow::Context;
use backup_core::service::{ConfigUpdate, PutConfigRequest};
use serde_json::json;
use std::path::PathBuf;
use tracing::{info, instrument};

/// 显示项目配置
pub async fn show_config(app: &CliApp, project_id: &str) -> anyhow::Result<()> {
    let config = app.service.get_config(project_id).await?;
    print_json(&json!({ "config": config }))
}

/// 读取 JSON 格式的配置更新，命令行参数优先
fn load_update(file: Option<PathBuf>, source: Option<String>) -> anyhow::Result<ConfigUpdate> {
    let mut update = match file {
        Some(path) => {
            let content = std::fs::read_to_string(&path)
                .with_context(|| format!("读取配置更新文件失败: {}", path.display()))?;
            serde_json::from_str::<ConfigUpdate>(&content)
                .with_context(|| format!("解析配置更新文件失败: {}", path.display()))?
        }
        None => ConfigUpdate::default(),
    };
    if source.is_some() {
        update.source_environment = source;
    }
    Ok(update)
}

/// 创建或更新项目配置
#[instrument(skip(app, api_token, current_token, file))]
pub async fn put_config(
    app: &CliApp,
    project_id: String,
    api_token: String,
    current_token: Option<String>,
    source: Option<String>,
    file: Option<PathBuf>,
) -> anyhow::Result<()> {
    let update = load_update(file, source)?;
    let request = PutConfigRequest {
        project_id,
        api_token,
        config: Some(update),
    };

    let saved = app
        .service
        .put_config(request, current_token.as_deref())
        .await?;
    info!(project_id = %saved.project_id, "配置已保存");
    print_json(&json!({ "success": true, "config": saved }))
}

/// 删除项目配置
#[instrument(skip(app, token))]
pub async fn delete_config(
    app: &CliApp,
    project_id: &str,
    token: Option<String>,
) -> anyhow::Result<()> {
    app.service.delete_config(project_id, token.as_deref()).await?;
    print_json(&json!({ "success": true }))
}
