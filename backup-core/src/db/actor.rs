use crate::Result;
use duckdb::{Connection, params};
use std::path::PathBuf;
use tokio::sync::mpsc;
use tracing::{debug, info};

use super::messages::DbMessage;
use super::models::{ClaimRow, ProjectRow, RunRow};

const RUN_COLUMNS: &str = "id, project_id, backup_type, status, source_environment, target_environment, \
     started_at, completed_at, duration_ms, error, metadata_json";

/// DuckDB Actor - 确保单线程访问DuckDB
pub struct DuckDbActor {
    connection: Connection,
}

impl DuckDbActor {
    /// 创建新的DuckDB Actor
    pub fn new(db_path: PathBuf) -> Result<Self> {
        let connection = Connection::open(db_path)?;
        Ok(Self { connection })
    }

    /// 创建内存DuckDB Actor
    pub fn new_memory() -> Result<Self> {
        let connection = Connection::open_in_memory()?;
        Ok(Self { connection })
    }

    /// 运行Actor消息循环
    pub async fn run(mut self, mut receiver: mpsc::Receiver<DbMessage>) {
        info!("DuckDB Actor 已启动");

        while let Some(message) = receiver.recv().await {
            self.handle_message(message);
        }

        info!("DuckDB Actor 已关闭");
    }

    /// 处理数据库消息
    fn handle_message(&mut self, message: DbMessage) {
        match message {
            DbMessage::InitTables { respond_to } => {
                let _ = respond_to.send(self.init_tables());
            }
            DbMessage::Ping { respond_to } => {
                let result: Result<()> = self
                    .connection
                    .query_row("SELECT 1", [], |row| row.get::<_, i32>(0))
                    .map(|_| ())
                    .map_err(Into::into);
                let _ = respond_to.send(result);
            }
            DbMessage::GetConfig {
                project_id,
                respond_to,
            } => {
                let _ = respond_to.send(self.get_config(&project_id));
            }
            DbMessage::SetConfig {
                project_id,
                config_json,
                updated_at,
                respond_to,
            } => {
                let _ = respond_to.send(self.set_config(&project_id, &config_json, &updated_at));
            }
            DbMessage::DeleteConfig {
                project_id,
                respond_to,
            } => {
                let result: Result<()> = self
                    .connection
                    .execute(
                        "DELETE FROM backup_configs WHERE project_id = ?",
                        params![project_id],
                    )
                    .map(|_| ())
                    .map_err(Into::into);
                let _ = respond_to.send(result);
            }
            DbMessage::ListProjects { respond_to } => {
                let _ = respond_to.send(self.list_projects());
            }
            DbMessage::RegisterProject { row, respond_to } => {
                let _ = respond_to.send(self.register_project(&row));
            }
            DbMessage::UnregisterProject {
                project_id,
                respond_to,
            } => {
                let result: Result<()> = self
                    .connection
                    .execute("DELETE FROM projects WHERE project_id = ?", params![project_id])
                    .map(|_| ())
                    .map_err(Into::into);
                let _ = respond_to.send(result);
            }
            DbMessage::TouchProject {
                project_id,
                last_active_at,
                respond_to,
            } => {
                let result: Result<usize> = self
                    .connection
                    .execute(
                        "UPDATE projects SET last_active_at = ? WHERE project_id = ?",
                        params![last_active_at, project_id],
                    )
                    .map_err(Into::into);
                let _ = respond_to.send(result);
            }
            DbMessage::InsertRun { row, respond_to } => {
                let _ = respond_to.send(self.insert_run(&row));
            }
            DbMessage::UpdateRun { row, respond_to } => {
                let _ = respond_to.send(self.update_run(&row));
            }
            DbMessage::GetRunHistory {
                project_id,
                limit,
                offset,
                respond_to,
            } => {
                let _ = respond_to.send(self.get_run_history(&project_id, limit, offset));
            }
            DbMessage::TryClaim {
                row,
                stale_before,
                respond_to,
            } => {
                let _ = respond_to.send(self.try_claim(&row, &stale_before));
            }
            DbMessage::ReleaseClaim {
                project_id,
                backup_type,
                owner,
                respond_to,
            } => {
                let result: Result<()> = self
                    .connection
                    .execute(
                        "DELETE FROM run_claims WHERE project_id = ? AND backup_type = ? AND owner = ?",
                        params![project_id, backup_type, owner],
                    )
                    .map(|_| ())
                    .map_err(Into::into);
                let _ = respond_to.send(result);
            }
        }
    }

    /// 初始化数据库表
    fn init_tables(&mut self) -> Result<()> {
        debug!("正在初始化DuckDB表...");

        let sql_content = include_str!("../../migrations/init_duckdb.sql");

        // 按分号分割SQL语句并执行
        for statement in sql_content.split(';').filter(|s| !s.trim().is_empty()) {
            self.connection.execute(statement.trim(), [])?;
        }

        info!("DuckDB表初始化完成");
        Ok(())
    }

    fn get_config(&mut self, project_id: &str) -> Result<Option<String>> {
        let mut stmt = self
            .connection
            .prepare("SELECT config_json FROM backup_configs WHERE project_id = ?")?;
        let mut rows = stmt.query(params![project_id])?;

        if let Some(row) = rows.next()? {
            Ok(Some(row.get(0)?))
        } else {
            Ok(None)
        }
    }

    fn set_config(&mut self, project_id: &str, config_json: &str, updated_at: &str) -> Result<()> {
        self.connection.execute(
            "INSERT OR REPLACE INTO backup_configs (project_id, config_json, updated_at) VALUES (?, ?, ?)",
            params![project_id, config_json, updated_at],
        )?;
        Ok(())
    }

    fn list_projects(&mut self) -> Result<Vec<ProjectRow>> {
        let mut stmt = self.connection.prepare(
            "SELECT project_id, site_name, registered_at, last_active_at
             FROM projects ORDER BY registered_at, project_id",
        )?;

        let rows = stmt.query_map([], |row| {
            Ok(ProjectRow {
                project_id: row.get(0)?,
                site_name: row.get(1)?,
                registered_at: row.get(2)?,
                last_active_at: row.get(3)?,
            })
        })?;

        let mut projects = Vec::new();
        for project in rows {
            projects.push(project?);
        }
        Ok(projects)
    }

    fn register_project(&mut self, row: &ProjectRow) -> Result<()> {
        self.connection.execute(
            "INSERT OR REPLACE INTO projects (project_id, site_name, registered_at, last_active_at)
             VALUES (?, ?, ?, ?)",
            params![row.project_id, row.site_name, row.registered_at, row.last_active_at],
        )?;
        Ok(())
    }

    fn insert_run(&mut self, row: &RunRow) -> Result<()> {
        self.connection.execute(
            &format!("INSERT INTO backup_runs ({RUN_COLUMNS}) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)"),
            params![
                row.id,
                row.project_id,
                row.backup_type,
                row.status,
                row.source_environment,
                row.target_environment,
                row.started_at,
                row.completed_at,
                row.duration_ms,
                row.error,
                row.metadata_json
            ],
        )?;
        Ok(())
    }

    fn update_run(&mut self, row: &RunRow) -> Result<usize> {
        let updated = self.connection.execute(
            "UPDATE backup_runs
             SET status = ?, target_environment = ?, completed_at = ?, duration_ms = ?,
                 error = ?, metadata_json = ?
             WHERE id = ?",
            params![
                row.status,
                row.target_environment,
                row.completed_at,
                row.duration_ms,
                row.error,
                row.metadata_json,
                row.id
            ],
        )?;
        Ok(updated)
    }

    fn get_run_history(
        &mut self,
        project_id: &str,
        limit: u32,
        offset: u32,
    ) -> Result<(Vec<RunRow>, u64)> {
        let total: i64 = self.connection.query_row(
            "SELECT COUNT(*) FROM backup_runs WHERE project_id = ?",
            params![project_id],
            |row| row.get(0),
        )?;

        let mut stmt = self.connection.prepare(&format!(
            "SELECT {RUN_COLUMNS} FROM backup_runs WHERE project_id = ?
             ORDER BY started_at DESC, id DESC LIMIT ? OFFSET ?"
        ))?;

        let rows = stmt.query_map(params![project_id, i64::from(limit), i64::from(offset)], |row| {
            Ok(RunRow {
                id: row.get(0)?,
                project_id: row.get(1)?,
                backup_type: row.get(2)?,
                status: row.get(3)?,
                source_environment: row.get(4)?,
                target_environment: row.get(5)?,
                started_at: row.get(6)?,
                completed_at: row.get(7)?,
                duration_ms: row.get(8)?,
                error: row.get(9)?,
                metadata_json: row.get(10)?,
            })
        })?;

        let mut runs = Vec::new();
        for run in rows {
            runs.push(run?);
        }

        Ok((runs, total.max(0) as u64))
    }

    /// 认领 (项目, 类型)；在单线程 Actor 内执行，清理与插入之间不会被其他请求打断
    fn try_claim(&mut self, row: &ClaimRow, stale_before: &str) -> Result<bool> {
        let released = self.connection.execute(
            "DELETE FROM run_claims WHERE project_id = ? AND backup_type = ? AND claimed_at < ?",
            params![row.project_id, row.backup_type, stale_before],
        )?;
        if released > 0 {
            debug!(
                project_id = %row.project_id,
                backup_type = %row.backup_type,
                "清理过期认领"
            );
        }

        let inserted = self.connection.execute(
            "INSERT INTO run_claims (project_id, backup_type, owner, claimed_at)
             VALUES (?, ?, ?, ?) ON CONFLICT DO NOTHING",
            params![row.project_id, row.backup_type, row.owner, row.claimed_at],
        )?;
        Ok(inserted > 0)
    }
}
