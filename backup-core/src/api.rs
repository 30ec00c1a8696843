use crate::config::ApiConfig as ApiSettings;
use crate::constants::api;
use crate::error::{BackupError, Result};
use crate::models::{CloneResult, EnvironmentInfo};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::{Client, RequestBuilder};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, error, warn};

/// 外部环境克隆接口
#[async_trait]
pub trait EnvironmentApi: Send + Sync {
    /// 从源环境克隆出新环境
    async fn create_backup(
        &self,
        api_token: &str,
        source_environment: &str,
        target_environment: &str,
    ) -> Result<CloneResult>;

    /// 列出名称以 `prefix` 开头的环境
    async fn list_environments(&self, api_token: &str, prefix: &str)
    -> Result<Vec<EnvironmentInfo>>;

    /// 删除指定环境
    async fn delete_environment(&self, api_token: &str, name: &str) -> Result<()>;
}

/// 克隆请求体
#[derive(Debug, Serialize)]
struct ForkRequest<'a> {
    data: ForkData<'a>,
}

#[derive(Debug, Serialize)]
struct ForkData<'a> {
    #[serde(rename = "type")]
    kind: &'static str,
    id: &'a str,
}

/// 环境资源
#[derive(Debug, Deserialize)]
struct EnvironmentResource {
    id: String,
    #[serde(default)]
    meta: EnvironmentMeta,
}

#[derive(Debug, Default, Deserialize)]
struct EnvironmentMeta {
    #[serde(default)]
    created_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Deserialize)]
struct EnvironmentResponse {
    data: EnvironmentResource,
}

#[derive(Debug, Deserialize)]
struct EnvironmentListResponse {
    data: Vec<EnvironmentResource>,
}

/// 环境克隆 API 客户端
#[derive(Debug, Clone)]
pub struct CloneApiClient {
    client: Client,
    base_url: String,
}

impl CloneApiClient {
    /// 创建新的 API 客户端
    pub fn new(settings: &ApiSettings) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(settings.request_timeout_secs))
            .build()?;

        Ok(Self {
            client,
            base_url: settings.base_url.trim_end_matches('/').to_string(),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    /// 构建带认证信息的请求
    fn authorized(&self, builder: RequestBuilder, api_token: &str) -> RequestBuilder {
        builder
            .bearer_auth(api_token)
            .header(api::API_VERSION_HEADER, api::API_VERSION_VALUE)
            .header(reqwest::header::ACCEPT, api::CONTENT_TYPE)
            .header(reqwest::header::CONTENT_TYPE, api::CONTENT_TYPE)
    }

    /// 非 2xx 响应转为 Api 错误
    async fn check_status(response: reqwest::Response, action: &str) -> Result<reqwest::Response> {
        if response.status().is_success() {
            return Ok(response);
        }
        let status = response.status();
        let text = response.text().await.unwrap_or_default();
        error!(status = %status, "{}失败", action);
        Err(BackupError::api(format!("{action}失败: {status} - {text}")))
    }
}

/// 按前缀过滤并转换环境列表；缺少创建时间的环境不参与清理
fn filter_environments(resources: Vec<EnvironmentResource>, prefix: &str) -> Vec<EnvironmentInfo> {
    resources
        .into_iter()
        .filter(|env| env.id.starts_with(prefix))
        .filter_map(|env| match env.meta.created_at {
            Some(created_at) => Some(EnvironmentInfo {
                name: env.id,
                created_at,
            }),
            None => {
                warn!(environment = %env.id, "环境缺少创建时间，跳过");
                None
            }
        })
        .collect()
}

#[async_trait]
impl EnvironmentApi for CloneApiClient {
    async fn create_backup(
        &self,
        api_token: &str,
        source_environment: &str,
        target_environment: &str,
    ) -> Result<CloneResult> {
        let url = self.url(&format!("/environments/{source_environment}/fork"));
        debug!(source = %source_environment, target = %target_environment, "请求克隆环境");

        let body = ForkRequest {
            data: ForkData {
                kind: "environment",
                id: target_environment,
            },
        };
        let response = self
            .authorized(self.client.post(&url), api_token)
            .json(&body)
            .send()
            .await?;
        let response = Self::check_status(response, "克隆环境").await?;

        // 部分部署的克隆接口以异步任务形式返回，不携带环境资源
        let text = response.text().await?;
        let environment_id = serde_json::from_str::<EnvironmentResponse>(&text)
            .map(|r| r.data.id)
            .unwrap_or_else(|_| target_environment.to_string());

        Ok(CloneResult {
            success: true,
            environment_id: Some(environment_id),
            error: None,
        })
    }

    async fn list_environments(
        &self,
        api_token: &str,
        prefix: &str,
    ) -> Result<Vec<EnvironmentInfo>> {
        let url = self.url("/environments");
        let response = self
            .authorized(self.client.get(&url), api_token)
            .send()
            .await?;
        let response = Self::check_status(response, "列出环境").await?;
        let list: EnvironmentListResponse = response.json().await?;
        Ok(filter_environments(list.data, prefix))
    }

    async fn delete_environment(&self, api_token: &str, name: &str) -> Result<()> {
        let url = self.url(&format!("/environments/{name}"));
        let response = self
            .authorized(self.client.delete(&url), api_token)
            .send()
            .await?;
        Self::check_status(response, "删除环境").await?;
        Ok(())
    }
}
