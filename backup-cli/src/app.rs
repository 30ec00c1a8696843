use backup_core::{
    api::CloneApiClient, config::AppConfig, database::Database, error::Result,
    service::BackupService, sweep::SweepSettings,
};
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, info};

use crate::cli::{Commands, ConfigCommand};
use crate::commands;

#[derive(Clone)]
pub struct CliApp {
    pub config: AppConfig,
    pub database: Arc<Database>,
    pub service: BackupService,
}

impl CliApp {
    /// 使用指定配置文件初始化；未指定时智能查找
    pub async fn new_with_config(config_path: Option<&Path>) -> Result<Self> {
        let config = match config_path {
            Some(path) => AppConfig::load_from_file(path)?,
            None => AppConfig::find_and_load_config()?,
        };
        Self::new(config).await
    }

    pub async fn new(config: AppConfig) -> Result<Self> {
        let database = Arc::new(Database::connect(config.database_path()).await?);
        debug!(path = %config.database.path, "数据库已连接");

        let api = Arc::new(CloneApiClient::new(&config.api)?);
        let service = BackupService::new(database.clone(), api, SweepSettings::from(&config))
            .with_secrets(config.cron_secret(), config.api_secret());

        info!(api = %config.api.base_url, "Env Backup 已就绪");
        Ok(Self {
            config,
            database,
            service,
        })
    }

    /// 运行应用命令
    pub async fn run_command(&self, command: Commands) -> anyhow::Result<()> {
        match command {
            Commands::Init { .. } => unreachable!(), // 已经在 main.rs 中处理
            Commands::Sweep { secret } => commands::run_sweep(self, secret).await,
            Commands::Serve {
                interval_minutes,
                secret,
            } => commands::run_serve(self, interval_minutes, secret).await,
            Commands::Trigger {
                project_id,
                token,
                backup_type,
                prefix,
                note,
            } => {
                commands::run_trigger(self, &project_id, token, backup_type, prefix, note).await
            }
            Commands::History {
                project_id,
                token,
                backup_type,
                status,
                limit,
                offset,
            } => {
                commands::run_history(self, &project_id, token, backup_type, status, limit, offset)
                    .await
            }
            Commands::Config(config_cmd) => match config_cmd {
                ConfigCommand::Get { project_id } => {
                    commands::show_config(self, &project_id).await
                }
                ConfigCommand::Put {
                    project_id,
                    api_token,
                    current_token,
                    source,
                    file,
                } => {
                    commands::put_config(self, project_id, api_token, current_token, source, file)
                        .await
                }
                ConfigCommand::Delete { project_id, token } => {
                    commands::delete_config(self, &project_id, token).await
                }
            },
            Commands::Projects => commands::list_projects(self).await,
            Commands::Health { secret } => commands::run_health(self, secret).await,
        }
    }
}
