use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// 项目配置相关命令
#[derive(Subcommand, Debug)]
pub enum ConfigCommand {
    /// 显示项目配置（Token 已隐藏）
    Get {
        /// 项目ID
        project_id: String,
    },
    /// 创建或更新项目配置
    Put {
        /// 项目ID
        project_id: String,
        /// 要保存的 API Token
        #[arg(long, env = "ENV_BACKUP_TOKEN", hide_env_values = true)]
        api_token: String,
        /// 覆盖已有配置时使用的当前 Token（缺省时使用 --api-token）
        #[arg(long, hide_env_values = true)]
        current_token: Option<String>,
        /// 源环境名
        #[arg(long)]
        source: Option<String>,
        /// JSON 格式的配置更新（sourceEnvironment / schedules / notifications）
        #[arg(long)]
        file: Option<PathBuf>,
    },
    /// 删除项目配置并注销项目
    Delete {
        /// 项目ID
        project_id: String,
        /// 项目 API Token
        #[arg(long, env = "ENV_BACKUP_TOKEN", hide_env_values = true)]
        token: Option<String>,
    },
}

#[derive(Parser)]
#[command(name = "env-backup")]
#[command(about = "定时备份编排工具：按日/周/月克隆环境并清理旧备份")]
#[command(version)]
pub struct Cli {
    /// 配置文件路径（缺省时依次查找 config.toml、env-backup.toml、.env-backup.toml）
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// 详细输出
    #[arg(short, long)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// 首次使用时初始化，创建配置文件和数据库
    Init {
        /// 如果配置文件已存在，强制覆盖
        #[arg(long)]
        force: bool,
    },
    /// 对全部活跃项目执行一次巡检
    Sweep {
        /// 巡检密钥（缺省时读取配置中指定的环境变量）
        #[arg(long, hide_env_values = true)]
        secret: Option<String>,
    },
    /// 常驻运行，按固定间隔巡检，Ctrl-C 退出
    Serve {
        /// 巡检间隔（分钟），覆盖配置文件中的值
        #[arg(long)]
        interval_minutes: Option<u64>,
        /// 巡检密钥（缺省时读取配置中指定的环境变量）
        #[arg(long, hide_env_values = true)]
        secret: Option<String>,
    },
    /// 立即为项目执行一次手动备份
    Trigger {
        /// 项目ID
        project_id: String,
        /// 项目 API Token
        #[arg(long, env = "ENV_BACKUP_TOKEN", hide_env_values = true)]
        token: Option<String>,
        /// 备份类型：daily / weekly / monthly / manual（默认 manual）
        #[arg(long = "type")]
        backup_type: Option<String>,
        /// 环境名前缀（默认 {type}-backup）
        #[arg(long)]
        prefix: Option<String>,
        /// 备注
        #[arg(long)]
        note: Option<String>,
    },
    /// 查询项目的运行历史
    History {
        /// 项目ID
        project_id: String,
        /// 项目 API Token
        #[arg(long, env = "ENV_BACKUP_TOKEN", hide_env_values = true)]
        token: Option<String>,
        /// 按类型过滤
        #[arg(long = "type")]
        backup_type: Option<String>,
        /// 按状态过滤：in_progress / completed / failed
        #[arg(long)]
        status: Option<String>,
        /// 每页条数（1-100，默认 20）
        #[arg(long)]
        limit: Option<u32>,
        /// 偏移量
        #[arg(long, allow_negative_numbers = true)]
        offset: Option<i64>,
    },
    /// 项目配置管理
    #[command(subcommand)]
    Config(ConfigCommand),
    /// 列出已注册项目
    Projects,
    /// 健康检查
    Health {
        /// 管理密钥（缺省时读取配置中指定的环境变量）
        #[arg(long, hide_env_values = true)]
        secret: Option<String>,
    },
}
