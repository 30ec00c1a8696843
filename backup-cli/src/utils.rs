use serde::Serialize;
use tracing_appender::non_blocking::WorkerGuard;

/// # 日志
///
/// 标准输出只用于命令结果（JSON），诊断信息全部通过 `tracing` 写到标准错误或日志文件。
///
/// - `-v, --verbose`：DEBUG 级别
/// - `RUST_LOG`：按模块控制级别，优先于 `-v`
/// - `ENV_BACKUP_LOG_FILE`：设置后日志追加写入该文件（非阻塞）
///
/// ```bash
/// ENV_BACKUP_LOG_FILE=backup.log env-backup serve
/// RUST_LOG=backup_core::sweep=debug env-backup sweep
/// ```
///
/// 返回的 guard 需要保持到进程结束，否则缓冲中的日志会丢失。
pub fn setup_logging(verbose: bool) -> Option<WorkerGuard> {
    use tracing_subscriber::{EnvFilter, fmt};

    let default_level = if verbose { "debug" } else { "info" };
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    match std::env::var("ENV_BACKUP_LOG_FILE") {
        Ok(log_file) if !log_file.is_empty() => {
            let path = std::path::Path::new(&log_file);
            let directory = path
                .parent()
                .filter(|p| !p.as_os_str().is_empty())
                .unwrap_or_else(|| std::path::Path::new("."));
            let file_name = path
                .file_name()
                .map(|n| n.to_os_string())
                .unwrap_or_else(|| "env-backup.log".into());

            let appender = tracing_appender::rolling::never(directory, file_name);
            let (writer, guard) = tracing_appender::non_blocking(appender);

            // 文件输出使用详细格式便于排查
            fmt()
                .with_env_filter(env_filter)
                .with_writer(writer)
                .with_ansi(false)
                .with_target(true)
                .with_thread_names(true)
                .with_line_number(true)
                .init();
            Some(guard)
        }
        _ => {
            fmt()
                .with_env_filter(env_filter)
                .with_writer(std::io::stderr)
                .with_target(false)
                .with_thread_names(false)
                .with_line_number(false)
                .compact()
                .init();
            None
        }
    }
}

/// 以格式化 JSON 输出命令结果
pub fn print_json<T: Serialize>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
