/// 运行记录行
#[derive(Debug, Clone, PartialEq)]
pub struct RunRow {
    pub id: String,
    pub project_id: String,
    pub backup_type: String,
    pub status: String,
    pub source_environment: String,
    pub target_environment: String,
    pub started_at: String,
    pub completed_at: Option<String>,
    pub duration_ms: Option<i64>,
    pub error: Option<String>,
    pub metadata_json: String,
}

/// 项目注册行
#[derive(Debug, Clone, PartialEq)]
pub struct ProjectRow {
    pub project_id: String,
    pub site_name: String,
    pub registered_at: String,
    pub last_active_at: String,
}

/// 认领行
#[derive(Debug, Clone, PartialEq)]
pub struct ClaimRow {
    pub project_id: String,
    pub backup_type: String,
    pub owner: String,
    pub claimed_at: String,
}
