use backup_cli::{Cli, CliApp, Commands, run_init, setup_logging};
use backup_core::BackupError;
use clap::Parser;
use tracing::error;

#[tokio::main]
async fn main() {
    // 解析命令行参数
    let cli = Cli::parse();

    // 设置日志记录；guard 需存活到进程结束
    let _log_guard = setup_logging(cli.verbose);

    // `init` 命令是特例，它不需要预先加载配置
    if let Commands::Init { force } = cli.command {
        if let Err(e) = run_init(force, cli.config.as_deref()).await {
            error!("初始化失败: {}", e);
            std::process::exit(1);
        }
        return;
    }

    let app = match CliApp::new_with_config(cli.config.as_deref()).await {
        Ok(app) => app,
        Err(BackupError::ConfigNotFound) => {
            let path = cli
                .config
                .as_ref()
                .map(|p| p.display().to_string())
                .unwrap_or_default();
            error!("配置文件 '{}' 未找到。", path);
            error!("请先运行 'env-backup init' 命令来创建配置文件。");
            std::process::exit(1);
        }
        Err(e) => {
            error!("应用初始化失败: {}", e);
            std::process::exit(1);
        }
    };

    // 运行命令
    if let Err(e) = app.run_command(cli.command).await {
        error!("操作失败: {:#}", e);
        std::process::exit(1);
    }
}
