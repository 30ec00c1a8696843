use crate::app::CliApp;
use crate::utils::print_json;
use anyhow::Context;
use serde_json::json;

/// 健康检查
pub async fn run_health(app: &CliApp, secret: Option<String>) -> anyhow::Result<()> {
    let secret = secret.or_else(|| app.config.api_secret());
    let report = app
        .service
        .health(secret.as_deref())
        .await
        .with_context(|| {
            format!(
                "健康检查被拒绝，请检查环境变量 {}",
                app.config.security.api_secret_env
            )
        })?;
    print_json(&report)?;

    if !report.store_connected {
        anyhow::bail!("存储不可用");
    }
    Ok(())
}

/// 列出已注册项目
pub async fn list_projects(app: &CliApp) -> anyhow::Result<()> {
    let projects = app.database.list_registrations().await?;
    let total = projects.len();
    print_json(&json!({ "projects": projects, "total": total }))
}
