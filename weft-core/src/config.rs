//! 配置
//!
//! 织入引擎本身只消费一个配置项：构件缓存目录。
//! 配置值来自多个按优先级排列的配置源（环境变量、TOML 文件、内存）。

use crate::error::ConfigError;
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

/// 缓存目录的配置键
pub const CACHE_DIR_KEY: &str = "weaver.cache_dir";

/// 默认缓存目录（相对于工作目录）
pub const DEFAULT_CACHE_DIR: &str = ".weft/cache";

/// 默认环境变量前缀
pub const DEFAULT_ENV_PREFIX: &str = "WEFT_";

/// 配置源 trait
pub trait PropertySource: Send + Sync {
    /// 配置源名称
    fn name(&self) -> &str;

    /// 获取配置值
    fn get(&self, key: &str) -> Option<String>;

    /// 配置源优先级（数字越大优先级越高）
    fn priority(&self) -> i32 {
        0
    }
}

/// 按优先级查询多个配置源
#[derive(Default)]
pub struct PropertyResolver {
    sources: Vec<Box<dyn PropertySource>>,
}

impl std::fmt::Debug for PropertyResolver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PropertyResolver")
            .field(
                "sources",
                &self.sources.iter().map(|s| s.name()).collect::<Vec<_>>(),
            )
            .finish()
    }
}

impl PropertyResolver {
    pub fn new() -> Self {
        Self::default()
    }

    /// 添加配置源
    pub fn add_source(&mut self, source: Box<dyn PropertySource>) {
        self.sources.push(source);
        // 按优先级降序排序，排序是稳定的，同优先级保持添加顺序
        self.sources.sort_by(|a, b| b.priority().cmp(&a.priority()));
    }

    /// 链式添加配置源
    pub fn with_source(mut self, source: impl PropertySource + 'static) -> Self {
        self.add_source(Box::new(source));
        self
    }

    /// 获取配置值，返回第一个包含该键的配置源中的值
    pub fn get(&self, key: &str) -> Option<String> {
        for source in &self.sources {
            if let Some(value) = source.get(key) {
                tracing::debug!("Config '{}' found in source '{}'", key, source.name());
                return Some(value);
            }
        }
        tracing::debug!("Config '{}' not found in any source", key);
        None
    }

    /// 获取无符号整数配置
    pub fn get_u64(&self, key: &str) -> Result<Option<u64>, ConfigError> {
        match self.get(key) {
            None => Ok(None),
            Some(raw) => raw
                .trim()
                .parse()
                .map(Some)
                .map_err(|_| ConfigError::InvalidValue {
                    key: key.to_string(),
                    value: raw,
                }),
        }
    }
}

/// 环境变量配置源
///
/// 配置键 `weaver.cache_dir` 对应环境变量 `WEFT_WEAVER_CACHE_DIR`
pub struct EnvironmentPropertySource {
    prefix: String,
}

impl EnvironmentPropertySource {
    pub fn new(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
        }
    }

    /// 将配置键转换为环境变量名
    pub fn key_to_env(&self, key: &str) -> String {
        format!("{}{}", self.prefix, key.replace('.', "_").to_uppercase())
    }
}

impl PropertySource for EnvironmentPropertySource {
    fn name(&self) -> &str {
        "environment"
    }

    fn get(&self, key: &str) -> Option<String> {
        std::env::var(self.key_to_env(key)).ok()
    }

    fn priority(&self) -> i32 {
        100
    }
}

/// TOML 文件配置源
///
/// 嵌套表会被展平为点分隔的键，例如 `[weaver] cache_dir = "x"` 对应 `weaver.cache_dir`
pub struct TomlPropertySource {
    name: String,
    properties: BTreeMap<String, String>,
}

impl TomlPropertySource {
    /// 从文件加载
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.display().to_string(),
            source,
        })?;
        Self::parse(&content, path.display().to_string())
    }

    /// 从字符串解析
    pub fn parse(content: &str, name: impl Into<String>) -> Result<Self, ConfigError> {
        let name = name.into();
        let value: toml::Value = toml::from_str(content).map_err(|source| ConfigError::Parse {
            name: name.clone(),
            source,
        })?;

        let mut properties = BTreeMap::new();
        Self::flatten(&value, String::new(), &mut properties);
        Ok(Self { name, properties })
    }

    fn flatten(value: &toml::Value, prefix: String, out: &mut BTreeMap<String, String>) {
        match value {
            toml::Value::Table(table) => {
                for (key, val) in table {
                    let next = if prefix.is_empty() {
                        key.clone()
                    } else {
                        format!("{}.{}", prefix, key)
                    };
                    Self::flatten(val, next, out);
                }
            }
            toml::Value::String(s) => {
                out.insert(prefix, s.clone());
            }
            other => {
                out.insert(prefix, other.to_string());
            }
        }
    }
}

impl PropertySource for TomlPropertySource {
    fn name(&self) -> &str {
        &self.name
    }

    fn get(&self, key: &str) -> Option<String> {
        self.properties.get(key).cloned()
    }
}

/// 内存配置源（用于测试或代码中的显式设置）
pub struct MapPropertySource {
    name: String,
    properties: BTreeMap<String, String>,
    priority: i32,
}

impl MapPropertySource {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            properties: BTreeMap::new(),
            priority: 200,
        }
    }

    pub fn with_property(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.properties.insert(key.into(), value.into());
        self
    }

    pub fn with_priority(mut self, priority: i32) -> Self {
        self.priority = priority;
        self
    }
}

impl PropertySource for MapPropertySource {
    fn name(&self) -> &str {
        &self.name
    }

    fn get(&self, key: &str) -> Option<String> {
        self.properties.get(key).cloned()
    }

    fn priority(&self) -> i32 {
        self.priority
    }
}

/// 织入引擎配置
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WeaverConfig {
    /// 构件缓存目录，可整体删除
    pub cache_dir: PathBuf,
}

impl Default for WeaverConfig {
    fn default() -> Self {
        Self {
            cache_dir: PathBuf::from(DEFAULT_CACHE_DIR),
        }
    }
}

impl WeaverConfig {
    pub fn new(cache_dir: impl Into<PathBuf>) -> Self {
        Self {
            cache_dir: cache_dir.into(),
        }
    }

    /// 从配置源解析
    pub fn from_resolver(resolver: &PropertyResolver) -> Self {
        let cache_dir = resolver
            .get(CACHE_DIR_KEY)
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from(DEFAULT_CACHE_DIR));
        Self { cache_dir }
    }

    /// 标准加载流程：环境变量 > TOML 文件 > 默认值
    pub fn load(config_file: Option<&Path>) -> Result<Self, ConfigError> {
        Ok(Self::from_resolver(&standard_resolver(config_file)?))
    }

    /// 覆盖缓存目录
    pub fn with_cache_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.cache_dir = dir.into();
        self
    }
}

/// 构建标准配置源链：`WEFT_` 环境变量，加上可选的 TOML 文件
pub fn standard_resolver(config_file: Option<&Path>) -> Result<PropertyResolver, ConfigError> {
    let mut resolver =
        PropertyResolver::new().with_source(EnvironmentPropertySource::new(DEFAULT_ENV_PREFIX));
    if let Some(path) = config_file {
        resolver.add_source(Box::new(TomlPropertySource::from_file(path)?));
    }
    Ok(resolver)
}
