//! `weft` 命令入口

use clap::Parser;
use std::process::ExitCode;
use std::sync::Arc;
use weft_aop::AdvisorRegistry;
use weft_cli::{Cli, EXIT_ERROR};
use weft_core::logging::{LogLevel, LoggingConfig};

fn main() -> ExitCode {
    let cli = Cli::parse();

    let mut logging = LoggingConfig::from_env();
    if cli.verbose > 0 {
        logging = logging.level(LogLevel::from_verbosity(cli.verbose));
    }
    if let Err(e) = logging.init() {
        eprintln!("weft: {}", e);
    }

    // 链接进来的所有 #[derive(Aspect)] 声明；本二进制不含切面时注册表为空
    let registry = match AdvisorRegistry::from_declarations() {
        Ok(registry) => Arc::new(registry),
        Err(e) => {
            tracing::error!("Advisor bootstrap failed: {}", e);
            eprintln!("weft: {}", e);
            return ExitCode::from(EXIT_ERROR);
        }
    };
    if registry.len() == 0 {
        tracing::warn!("No advisor declarations are linked into this binary; nothing will be woven");
    }

    let runtime = match tokio::runtime::Builder::new_multi_thread().enable_all().build() {
        Ok(runtime) => runtime,
        Err(e) => {
            eprintln!("weft: failed to start runtime: {}", e);
            return ExitCode::from(EXIT_ERROR);
        }
    };

    let mut stdout = std::io::stdout().lock();
    let code = runtime.block_on(weft_cli::run(cli, registry, &mut stdout));
    // 超时类的织入线程可能仍在运行，不等待其结束
    runtime.shutdown_background();
    ExitCode::from(code)
}
