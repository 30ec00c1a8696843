use backup_core::{config::AppConfig, constants::config, database::Database, error::Result};
use std::path::{Path, PathBuf};
use tracing::{info, warn};

/// 运行独立的初始化流程
pub async fn run_init(force: bool, config_path: Option<&Path>) -> Result<()> {
    info!("Env Backup 初始化");

    let config_path = config_path
        .map(Path::to_path_buf)
        .unwrap_or_else(|| PathBuf::from(config::DEFAULT_CONFIG_FILE));

    info!("步骤 1: 创建配置文件");
    let Some(app_config) = write_config(force, &config_path)? else {
        warn!(path = %config_path.display(), "配置文件已存在");
        info!("如果您要重新初始化，请使用 --force 参数");
        return Ok(());
    };
    info!(path = %config_path.display(), "   创建配置文件");

    info!("步骤 2: 初始化数据库");
    let db_path = app_config.database_path();
    let database = Database::connect(&db_path).await?;
    database.list_registrations().await?;
    info!(path = %db_path.display(), "   创建DuckDB数据库");

    info!(
        "初始化完成。请设置环境变量 {} 与 {} 后再执行 sweep / health",
        app_config.security.cron_secret_env, app_config.security.api_secret_env
    );
    Ok(())
}

/// 写入默认配置；文件已存在且未指定 force 时返回 None
fn write_config(force: bool, config_path: &Path) -> Result<Option<AppConfig>> {
    if config_path.exists() && !force {
        return Ok(None);
    }
    let app_config = AppConfig::default();
    app_config.save_to_file(config_path)?;
    Ok(Some(app_config))
}
