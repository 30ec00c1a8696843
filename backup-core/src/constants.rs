/// 版本信息
pub mod version {
    /// 对外报告的 API 版本
    pub const API_VERSION: &str = env!("CARGO_PKG_VERSION");
}

/// 调度周期相关常量
pub mod schedule {
    use chrono::Duration;

    /// 每日备份间隔
    pub fn daily_interval() -> Duration {
        Duration::days(1)
    }

    /// 每周备份间隔
    pub fn weekly_interval() -> Duration {
        Duration::days(7)
    }

    /// 每月备份间隔（按 30 天计）
    pub fn monthly_interval() -> Duration {
        Duration::days(30)
    }

    /// 默认保留数量
    pub const DEFAULT_DAILY_RETENTION: u32 = 7;
    pub const DEFAULT_WEEKLY_RETENTION: u32 = 4;
    pub const DEFAULT_MONTHLY_RETENTION: u32 = 12;

    /// 默认环境名前缀
    pub const DEFAULT_DAILY_PREFIX: &str = "backup-daily";
    pub const DEFAULT_WEEKLY_PREFIX: &str = "backup-weekly";
    pub const DEFAULT_MONTHLY_PREFIX: &str = "backup-monthly";

    /// 环境名中的时间戳格式
    pub const ENVIRONMENT_TIMESTAMP_FORMAT: &str = "%Y-%m-%d-%H%M%S";

    /// 未配置时克隆的源环境
    pub const DEFAULT_SOURCE_ENVIRONMENT: &str = "main";

    /// 手动备份默认前缀的后缀，完整前缀为 `{type}-backup`
    pub const MANUAL_PREFIX_SUFFIX: &str = "backup";
}

/// 巡检（sweep）相关常量
pub mod sweep {
    /// 默认并发处理的项目数
    pub const DEFAULT_MAX_CONCURRENCY: usize = 4;

    /// 单次巡检的默认时间预算（秒）
    pub const DEFAULT_DEADLINE_SECS: u64 = 280;

    /// 计算上次完成时间时读取的历史记录条数
    pub const DEFAULT_HISTORY_WINDOW: u32 = 100;

    /// 认领记录过期时间（分钟）
    pub const DEFAULT_CLAIM_TTL_MINUTES: i64 = 120;

    /// serve 模式下两次巡检的间隔（分钟）
    pub const DEFAULT_INTERVAL_MINUTES: u64 = 60;

    /// 单次克隆调用超时（秒）
    pub const DEFAULT_EXECUTE_TIMEOUT_SECS: u64 = 240;
}

/// 输入校验相关常量
pub mod validation {
    /// 项目ID最大长度
    pub const MAX_PROJECT_ID_LEN: usize = 64;

    /// API Token 长度范围
    pub const MIN_API_TOKEN_LEN: usize = 16;
    pub const MAX_API_TOKEN_LEN: usize = 256;

    /// 环境名前缀最大长度
    pub const MAX_PREFIX_LEN: usize = 40;

    /// 备注最大长度（字符）
    pub const MAX_NOTE_LEN: usize = 500;

    /// 历史记录分页
    pub const DEFAULT_HISTORY_LIMIT: u32 = 20;
    pub const MAX_HISTORY_LIMIT: u32 = 100;
}

/// 配置文件相关常量
pub mod config {
    /// 按优先级查找的配置文件名
    pub const CONFIG_FILE_CANDIDATES: [&str; 3] =
        ["config.toml", "env-backup.toml", ".env-backup.toml"];

    /// 默认配置文件名
    pub const DEFAULT_CONFIG_FILE: &str = "config.toml";

    /// 默认数据库文件
    pub const DEFAULT_DATABASE_PATH: &str = "env-backup.db";

    /// 保存凭据的环境变量名
    pub const DEFAULT_CRON_SECRET_ENV: &str = "CRON_SECRET";
    pub const DEFAULT_API_SECRET_ENV: &str = "API_SECRET";

    /// 配置输出时替换 API Token 的掩码
    pub const MASKED_TOKEN: &str = "***";
}

/// 克隆 API 相关常量
pub mod api {
    /// 默认 API 地址
    pub const DEFAULT_BASE_URL: &str = "https://site-api.datocms.com";

    /// 默认请求超时（秒）
    pub const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 60;

    /// API 版本头
    pub const API_VERSION_HEADER: &str = "X-Api-Version";
    pub const API_VERSION_VALUE: &str = "3";

    /// JSON:API 内容类型
    pub const CONTENT_TYPE: &str = "application/vnd.api+json";
}
