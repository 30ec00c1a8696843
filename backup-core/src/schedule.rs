//! 调度判定
//!
//! 纯函数：根据项目配置与各类型上次完成时间，算出当前到期的备份类型。
//! 不读写任何状态，每次巡检都从持久化的运行记录重新计算。

use crate::models::{BackupConfig, BackupRun, BackupType, RunStatus, ScheduleSpec};
use chrono::{DateTime, Utc};
use std::collections::HashMap;

/// 一个到期的备份
#[derive(Debug, Clone, PartialEq)]
pub struct DueBackup {
    pub backup_type: BackupType,
    pub schedule: ScheduleSpec,
}

/// 各类型最近一次完成的时间
pub type LastCompleted = HashMap<BackupType, DateTime<Utc>>;

/// 从按时间倒序排列的运行记录中提取各类型最近一次完成时间
///
/// 只看 completed 状态；in_progress 与 failed 不会压制下一次调度。
pub fn last_completed_by_type(runs: &[BackupRun]) -> LastCompleted {
    let mut last = LastCompleted::new();
    for run in runs.iter().filter(|r| r.status == RunStatus::Completed) {
        last.entry(run.backup_type).or_insert_with(|| run.finished_at());
    }
    last
}

/// 计算当前到期的备份，按 daily、weekly、monthly 顺序返回
pub fn due_backups(
    config: &BackupConfig,
    last_completed: &LastCompleted,
    now: DateTime<Utc>,
) -> Vec<DueBackup> {
    BackupType::SCHEDULED
        .iter()
        .filter_map(|&backup_type| {
            let schedule = config.schedules.get(backup_type)?;
            if !schedule.enabled {
                return None;
            }
            let interval = schedule.interval_for(backup_type)?;

            let due = match last_completed.get(&backup_type) {
                None => true,
                Some(last) => now.signed_duration_since(*last) >= interval,
            };

            due.then(|| DueBackup {
                backup_type,
                schedule: schedule.clone(),
            })
        })
        .collect()
}
