use crate::app::CliApp;
use crate::utils::print_json;
use anyhow::{Context, bail};
use backup_core::sweep::{OutcomeStatus, SweepReport};
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, instrument, warn};

/// 命令行未提供密钥时使用配置中指定的环境变量
fn resolve_secret(app: &CliApp, secret: Option<String>) -> Option<String> {
    secret.or_else(|| app.config.cron_secret())
}

fn log_summary(report: &SweepReport) {
    let count = |status: OutcomeStatus| {
        report
            .executed
            .iter()
            .filter(|o| o.status == status)
            .count()
    };
    info!(
        completed = count(OutcomeStatus::Completed),
        failed = count(OutcomeStatus::Failed),
        skipped = count(OutcomeStatus::Skipped),
        errors = count(OutcomeStatus::Error),
        deferred = report.deferred_projects.len(),
        "巡检结果"
    );
}

/// 执行一次巡检并输出结果
#[instrument(skip(app, secret))]
pub async fn run_sweep(app: &CliApp, secret: Option<String>) -> anyhow::Result<()> {
    let secret = resolve_secret(app, secret);
    let report = app
        .service
        .run_sweep(secret.as_deref())
        .await
        .with_context(|| {
            format!(
                "巡检被拒绝，请检查环境变量 {}",
                app.config.security.cron_secret_env
            )
        })?;

    log_summary(&report);
    print_json(&report)?;

    if !report.success {
        bail!(
            "巡检失败: {}",
            report.error.as_deref().unwrap_or("未知错误")
        );
    }
    Ok(())
}

/// 常驻模式：按固定间隔巡检，收到 Ctrl-C 后在两次巡检之间退出
#[instrument(skip(app, secret))]
pub async fn run_serve(
    app: &CliApp,
    interval_minutes: Option<u64>,
    secret: Option<String>,
) -> anyhow::Result<()> {
    let minutes = interval_minutes
        .unwrap_or(app.config.sweep.interval_minutes)
        .max(1);
    let interval = Duration::from_secs(minutes * 60);
    let secret = resolve_secret(app, secret);

    // 启动前先校验一次密钥，避免常驻后每轮都被拒绝
    if secret.is_none() {
        bail!(
            "未提供巡检密钥，请设置环境变量 {} 或使用 --secret",
            app.config.security.cron_secret_env
        );
    }

    let shutdown = CancellationToken::new();
    let signal_token = shutdown.clone();
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => info!("收到退出信号，当前巡检结束后退出"),
            Err(e) => error!("监听退出信号失败: {}", e),
        }
        signal_token.cancel();
    });

    info!(interval_minutes = minutes, "进入常驻巡检模式");
    loop {
        match app.service.run_sweep(secret.as_deref()).await {
            Ok(report) => {
                log_summary(&report);
                if !report.success {
                    warn!(
                        "巡检失败，将在下一轮重试: {}",
                        report.error.as_deref().unwrap_or("未知错误")
                    );
                }
            }
            Err(e) => {
                return Err(e).context("巡检被拒绝，停止常驻模式");
            }
        }

        tokio::select! {
            _ = shutdown.cancelled() => break,
            _ = tokio::time::sleep(interval) => {}
        }
    }

    info!("常驻巡检已停止");
    Ok(())
}
