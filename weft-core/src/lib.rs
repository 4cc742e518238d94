// weft-core: 织入引擎的基础设施
//
// 提供：
// - 分层配置源与织入配置（缓存目录）
// - 日志订阅者初始化
// - 统一的错误类型

pub mod config;
pub mod error;
pub mod logging;

pub use config::{
    standard_resolver, EnvironmentPropertySource, MapPropertySource, PropertyResolver,
    PropertySource, TomlPropertySource, WeaverConfig,
};
pub use error::{ConfigError, LoggingInitError, Result};
pub use logging::{LogFormat, LogLevel, LoggingConfig};

/// Prelude 模块
pub mod prelude {
    pub use crate::config::{PropertyResolver, WeaverConfig};
    pub use crate::error::Result;
    pub use crate::logging::{LogFormat, LogLevel, LoggingConfig};
    pub use anyhow::{anyhow, bail, Context};
}
