//! 测试用的内存存储与可编排的环境 API

use crate::api::EnvironmentApi;
use crate::error::{BackupError, Result};
use crate::models::{
    BackupConfig, BackupRun, BackupType, CloneResult, EnvironmentInfo, ProjectRegistration,
    Schedules,
};
use crate::store::{
    ConfigStore, ProjectRegistry, RunClaim, RunClaimStore, RunHistoryStore, RunPage, StoreProbe,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::{HashMap, HashSet};
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

pub const SAMPLE_TOKEN: &str = "token-0123456789abcdef";

pub fn sample_config(project_id: &str) -> BackupConfig {
    let now = Utc::now();
    BackupConfig {
        project_id: project_id.to_string(),
        api_token: SAMPLE_TOKEN.to_string(),
        source_environment: "main".to_string(),
        schedules: Schedules::default(),
        notifications: None,
        created_at: now,
        updated_at: now,
    }
}

#[derive(Default)]
struct StoreState {
    configs: HashMap<String, BackupConfig>,
    projects: Vec<ProjectRegistration>,
    activity: HashSet<String>,
    runs: Vec<BackupRun>,
    claims: HashMap<(String, BackupType), RunClaim>,
    failing_configs: HashSet<String>,
}

/// 内存存储，可按操作注入失败
#[derive(Default)]
pub struct MemoryStore {
    state: Mutex<StoreState>,
    fail_add_run: AtomicBool,
    fail_update_run: AtomicBool,
    fail_list_projects: AtomicBool,
    fail_ping: AtomicBool,
}

impl MemoryStore {
    /// 注册项目并可选写入配置
    pub fn seed_project(&self, project_id: &str, config: Option<BackupConfig>) {
        let now = Utc::now();
        let mut state = self.state.lock().unwrap();
        state.projects.push(ProjectRegistration {
            project_id: project_id.to_string(),
            site_name: project_id.to_string(),
            registered_at: now,
            last_active_at: now,
        });
        if let Some(config) = config {
            state.configs.insert(project_id.to_string(), config);
        }
    }

    pub fn seed_claim(&self, project_id: &str, backup_type: BackupType, owner: &str, at: DateTime<Utc>) {
        self.state.lock().unwrap().claims.insert(
            (project_id.to_string(), backup_type),
            RunClaim {
                project_id: project_id.to_string(),
                backup_type,
                owner: owner.to_string(),
                claimed_at: at,
            },
        );
    }

    pub fn fail_config_for(&self, project_id: &str) {
        self.state
            .lock()
            .unwrap()
            .failing_configs
            .insert(project_id.to_string());
    }

    pub fn fail_add_run(&self, fail: bool) {
        self.fail_add_run.store(fail, Ordering::SeqCst);
    }

    pub fn fail_update_run(&self, fail: bool) {
        self.fail_update_run.store(fail, Ordering::SeqCst);
    }

    pub fn fail_list_projects(&self, fail: bool) {
        self.fail_list_projects.store(fail, Ordering::SeqCst);
    }

    pub fn fail_ping(&self, fail: bool) {
        self.fail_ping.store(fail, Ordering::SeqCst);
    }

    pub fn runs(&self) -> Vec<BackupRun> {
        self.state.lock().unwrap().runs.clone()
    }

    pub fn config(&self, project_id: &str) -> Option<BackupConfig> {
        self.state.lock().unwrap().configs.get(project_id).cloned()
    }

    pub fn is_registered(&self, project_id: &str) -> bool {
        self.state
            .lock()
            .unwrap()
            .projects
            .iter()
            .any(|p| p.project_id == project_id)
    }

    pub fn activity_updated(&self, project_id: &str) -> bool {
        self.state.lock().unwrap().activity.contains(project_id)
    }

    pub fn has_claim(&self, project_id: &str, backup_type: BackupType) -> bool {
        self.state
            .lock()
            .unwrap()
            .claims
            .contains_key(&(project_id.to_string(), backup_type))
    }
}

fn injected(what: &str) -> BackupError {
    BackupError::persistence(format!("注入的{what}失败"))
}

#[async_trait]
impl ConfigStore for MemoryStore {
    async fn get_config(&self, project_id: &str) -> Result<Option<BackupConfig>> {
        let state = self.state.lock().unwrap();
        if state.failing_configs.contains(project_id) {
            return Err(injected("配置读取"));
        }
        Ok(state.configs.get(project_id).cloned())
    }

    async fn set_config(&self, config: &BackupConfig) -> Result<()> {
        self.state
            .lock()
            .unwrap()
            .configs
            .insert(config.project_id.clone(), config.clone());
        Ok(())
    }

    async fn delete_config(&self, project_id: &str) -> Result<()> {
        self.state.lock().unwrap().configs.remove(project_id);
        Ok(())
    }
}

#[async_trait]
impl ProjectRegistry for MemoryStore {
    async fn get_active_projects(&self) -> Result<Vec<String>> {
        if self.fail_list_projects.load(Ordering::SeqCst) {
            return Err(injected("项目枚举"));
        }
        let state = self.state.lock().unwrap();
        Ok(state.projects.iter().map(|p| p.project_id.clone()).collect())
    }

    async fn register_project(&self, registration: &ProjectRegistration) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        state.projects.retain(|p| p.project_id != registration.project_id);
        state.projects.push(registration.clone());
        Ok(())
    }

    async fn unregister_project(&self, project_id: &str) -> Result<()> {
        self.state
            .lock()
            .unwrap()
            .projects
            .retain(|p| p.project_id != project_id);
        Ok(())
    }

    async fn update_project_activity(&self, project_id: &str, at: DateTime<Utc>) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        if let Some(project) = state.projects.iter_mut().find(|p| p.project_id == project_id) {
            project.last_active_at = at;
        }
        state.activity.insert(project_id.to_string());
        Ok(())
    }
}

#[async_trait]
impl RunHistoryStore for MemoryStore {
    async fn add_run(&self, run: &BackupRun) -> Result<()> {
        if self.fail_add_run.load(Ordering::SeqCst) {
            return Err(injected("运行记录写入"));
        }
        self.state.lock().unwrap().runs.push(run.clone());
        Ok(())
    }

    async fn update_run(&self, run: &BackupRun) -> Result<()> {
        if self.fail_update_run.load(Ordering::SeqCst) {
            return Err(injected("运行记录更新"));
        }
        let mut state = self.state.lock().unwrap();
        match state.runs.iter_mut().find(|r| r.id == run.id) {
            Some(stored) => {
                *stored = run.clone();
                Ok(())
            }
            None => Err(BackupError::persistence("运行记录不存在")),
        }
    }

    async fn get_run_history(&self, project_id: &str, limit: u32, offset: u32) -> Result<RunPage> {
        let state = self.state.lock().unwrap();
        let mut runs: Vec<BackupRun> = state
            .runs
            .iter()
            .filter(|r| r.project_id == project_id)
            .cloned()
            .collect();
        runs.sort_by(|a, b| b.started_at.cmp(&a.started_at).then_with(|| b.id.cmp(&a.id)));
        let total = runs.len() as u64;
        let runs = runs
            .into_iter()
            .skip(offset as usize)
            .take(limit as usize)
            .collect();
        Ok(RunPage { runs, total })
    }
}

#[async_trait]
impl RunClaimStore for MemoryStore {
    async fn try_claim(&self, claim: &RunClaim, stale_before: DateTime<Utc>) -> Result<bool> {
        let mut state = self.state.lock().unwrap();
        let key = (claim.project_id.clone(), claim.backup_type);
        match state.claims.get(&key) {
            Some(existing) if existing.claimed_at >= stale_before => Ok(false),
            _ => {
                state.claims.insert(key, claim.clone());
                Ok(true)
            }
        }
    }

    async fn release_claim(&self, project_id: &str, backup_type: BackupType, owner: &str) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        let key = (project_id.to_string(), backup_type);
        if state.claims.get(&key).is_some_and(|c| c.owner == owner) {
            state.claims.remove(&key);
        }
        Ok(())
    }
}

#[async_trait]
impl StoreProbe for MemoryStore {
    async fn ping(&self) -> Result<()> {
        if self.fail_ping.load(Ordering::SeqCst) {
            return Err(injected("连通性检查"));
        }
        Ok(())
    }
}

/// 克隆调用的预设行为
#[derive(Debug, Clone, Default)]
pub enum CreateBehavior {
    #[default]
    Succeed,
    /// 返回 success = false
    Fail(String),
    /// 返回错误
    Error(String),
    Panic,
    /// 永不返回
    Hang,
}

/// 可编排的环境 API
#[derive(Default)]
pub struct MockEnvironmentApi {
    create: Mutex<CreateBehavior>,
    environments: Mutex<Vec<EnvironmentInfo>>,
    created: Mutex<Vec<String>>,
    deleted: Mutex<Vec<String>>,
    delete_failures: Mutex<HashSet<String>>,
    fail_list: AtomicBool,
    list_calls: AtomicUsize,
}

impl MockEnvironmentApi {
    pub fn with_environments(environments: Vec<EnvironmentInfo>) -> Self {
        Self {
            environments: Mutex::new(environments),
            ..Self::default()
        }
    }

    pub fn set_create(&self, behavior: CreateBehavior) {
        *self.create.lock().unwrap() = behavior;
    }

    pub fn fail_delete(&self, name: &str) {
        self.delete_failures.lock().unwrap().insert(name.to_string());
    }

    pub fn fail_list(&self, fail: bool) {
        self.fail_list.store(fail, Ordering::SeqCst);
    }

    pub fn created(&self) -> Vec<String> {
        self.created.lock().unwrap().clone()
    }

    pub fn deleted(&self) -> Vec<String> {
        self.deleted.lock().unwrap().clone()
    }

    pub fn list_calls(&self) -> usize {
        self.list_calls.load(Ordering::SeqCst)
    }

    pub fn environment_names(&self) -> Vec<String> {
        self.environments
            .lock()
            .unwrap()
            .iter()
            .map(|e| e.name.clone())
            .collect()
    }
}

#[async_trait]
impl EnvironmentApi for MockEnvironmentApi {
    async fn create_backup(
        &self,
        _api_token: &str,
        _source_environment: &str,
        target_environment: &str,
    ) -> Result<CloneResult> {
        let behavior = self.create.lock().unwrap().clone();
        match behavior {
            CreateBehavior::Succeed => {
                self.created
                    .lock()
                    .unwrap()
                    .push(target_environment.to_string());
                self.environments.lock().unwrap().push(EnvironmentInfo {
                    name: target_environment.to_string(),
                    created_at: Utc::now(),
                });
                Ok(CloneResult {
                    success: true,
                    environment_id: Some(target_environment.to_string()),
                    error: None,
                })
            }
            CreateBehavior::Fail(message) => Ok(CloneResult {
                success: false,
                environment_id: None,
                error: Some(message),
            }),
            CreateBehavior::Error(message) => Err(BackupError::api(message)),
            CreateBehavior::Panic => panic!("boom"),
            CreateBehavior::Hang => futures::future::pending().await,
        }
    }

    async fn list_environments(&self, _api_token: &str, prefix: &str) -> Result<Vec<EnvironmentInfo>> {
        self.list_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_list.load(Ordering::SeqCst) {
            return Err(BackupError::api("list failed"));
        }
        Ok(self
            .environments
            .lock()
            .unwrap()
            .iter()
            .filter(|e| e.name.starts_with(prefix))
            .cloned()
            .collect())
    }

    async fn delete_environment(&self, _api_token: &str, name: &str) -> Result<()> {
        if self.delete_failures.lock().unwrap().contains(name) {
            return Err(BackupError::api(format!("refused to delete {name}")));
        }
        self.environments.lock().unwrap().retain(|e| e.name != name);
        self.deleted.lock().unwrap().push(name.to_string());
        Ok(())
    }
}
