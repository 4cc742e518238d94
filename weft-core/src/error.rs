/// 统一的错误处理类型
///
/// 原始成员实现和通知（advice）都使用 anyhow::Result 作为返回类型。
/// 织入引擎只负责传递这些错误，不会改变它们的具体类型，
/// 调用方可以通过 `downcast_ref` 取回原始错误。
///
/// # 示例
///
/// ```rust,ignore
/// use weft_core::Result;
///
/// fn withdraw(balance: &mut i64, amount: i64) -> Result<i64> {
///     if amount > *balance {
///         anyhow::bail!("insufficient funds");
///     }
///     *balance -= amount;
///     Ok(*balance)
/// }
/// ```
pub use anyhow::Result;

/// 配置加载错误
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse TOML in {name}: {source}")]
    Parse {
        name: String,
        #[source]
        source: toml::de::Error,
    },

    #[error("Invalid value '{value}' for config key '{key}'")]
    InvalidValue { key: String, value: String },
}

/// 日志初始化错误
#[derive(Debug, thiserror::Error)]
#[error("Failed to initialize logging: {0}")]
pub struct LoggingInitError(pub String);
