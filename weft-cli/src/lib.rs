//! Weft 命令行
//!
//! 缓存预热、缓存清空和连接点检查三个命令。
//! 诊断行写到标准输出，日志写到标准错误。

use clap::{Parser, Subcommand};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use weft_aop::AdvisorRegistry;
use weft_core::config::{standard_resolver, PropertyResolver, WeaverConfig};

pub mod commands;

/// 预热超时的配置键
pub const WARMUP_TIMEOUT_KEY: &str = "weaver.warmup_timeout_ms";

/// 默认的单类预热超时
pub const DEFAULT_WARMUP_TIMEOUT_MS: u64 = 5000;

/// 成功
pub const EXIT_OK: u8 = 0;

/// 至少一个类失败，或检查不成立
pub const EXIT_FAILURE: u8 = 1;

/// 配置或 I/O 错误
pub const EXIT_ERROR: u8 = 2;

/// 命令行参数
///
/// 通知注册表由调用方提供。独立的 `weft` 可执行文件不链接任何
/// `#[derive(Aspect)]` 声明，注册表为空，预热写出的清单中没有被织入的成员。
/// 宿主程序应在链接了自己切面的二进制中解析 `Cli`，再以自己的注册表调用
/// [`run`]。
#[derive(Debug, Parser)]
#[command(name = "weft")]
#[command(about = "Aspect weaving cache tools", long_about = None)]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// TOML configuration file
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Artifact cache directory (overrides configuration)
    #[arg(long, global = true)]
    pub cache_dir: Option<PathBuf>,

    /// Increase log verbosity (-v info, -vv debug, -vvv trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Clear the cache, then weave and store every class
    Warmup {
        /// Directory of class descriptors (one <Class>.json per class)
        #[arg(long)]
        classes: PathBuf,
        /// Per-class timeout in milliseconds
        #[arg(long)]
        timeout_ms: Option<u64>,
    },

    /// Remove every cached artifact
    Clear,

    /// Check whether a join point is woven, e.g. Account::withdraw/method@logging#0
    Inspect {
        /// Join point address
        address: String,
        /// Directory of class descriptors; when given, stale cache entries are reported
        #[arg(long)]
        classes: Option<PathBuf>,
    },
}

/// 命令运行时需要的配置
#[derive(Debug, Clone)]
pub struct Settings {
    pub weaver: WeaverConfig,
    pub warmup_timeout: Duration,
}

impl Settings {
    /// 命令行参数 > 环境变量 > 配置文件 > 默认值
    pub fn resolve(cli: &Cli) -> anyhow::Result<Self> {
        let resolver = standard_resolver(cli.config.as_deref())?;
        Self::from_resolver(&resolver, cli.cache_dir.as_deref())
    }

    pub fn from_resolver(
        resolver: &PropertyResolver,
        cache_dir: Option<&Path>,
    ) -> anyhow::Result<Self> {
        let mut weaver = WeaverConfig::from_resolver(resolver);
        if let Some(dir) = cache_dir {
            weaver = weaver.with_cache_dir(dir);
        }
        let timeout_ms = resolver
            .get_u64(WARMUP_TIMEOUT_KEY)?
            .unwrap_or(DEFAULT_WARMUP_TIMEOUT_MS);

        Ok(Self {
            weaver,
            warmup_timeout: Duration::from_millis(timeout_ms),
        })
    }
}

/// 执行命令，返回进程退出码
pub async fn run(cli: Cli, registry: Arc<AdvisorRegistry>, out: &mut dyn Write) -> u8 {
    let settings = match Settings::resolve(&cli) {
        Ok(settings) => settings,
        Err(e) => {
            tracing::error!("Invalid configuration: {:#}", e);
            return EXIT_ERROR;
        }
    };
    tracing::debug!("Using cache directory {}", settings.weaver.cache_dir.display());

    let result = match cli.command {
        Commands::Warmup {
            classes,
            timeout_ms,
        } => {
            let timeout = timeout_ms
                .map(Duration::from_millis)
                .unwrap_or(settings.warmup_timeout);
            commands::warmup::execute(&settings.weaver, registry, &classes, timeout, out).await
        }
        Commands::Clear => commands::clear::execute(&settings.weaver, out),
        Commands::Inspect { address, classes } => commands::inspect::execute(
            &settings.weaver,
            &registry,
            &address,
            classes.as_deref(),
            out,
        ),
    };

    match result {
        Ok(code) => code,
        Err(e) => {
            tracing::error!("{:#}", e);
            let _ = writeln!(out, "error: {:#}", e);
            EXIT_ERROR
        }
    }
}
