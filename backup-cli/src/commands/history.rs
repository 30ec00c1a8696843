use crate::app::CliApp;
use crate::utils::print_json;
use backup_core::service::HistoryQuery;
use tracing::{debug, instrument};

/// 查询运行历史
#[instrument(skip(app, token))]
pub async fn run_history(
    app: &CliApp,
    project_id: &str,
    token: Option<String>,
    backup_type: Option<String>,
    status: Option<String>,
    limit: Option<u32>,
    offset: Option<i64>,
) -> anyhow::Result<()> {
    let query = HistoryQuery {
        backup_type,
        status,
        limit,
        offset,
    };
    let response = app
        .service
        .list_history(project_id, token.as_deref(), query)
        .await?;

    debug!(returned = response.runs.len(), total = response.total, "历史记录");
    print_json(&response)
}
