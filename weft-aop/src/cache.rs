//! 构件缓存
//!
//! 每个类在缓存目录下对应一个 JSON 条目，包含指纹、写入时间和织入构件。
//! 写入先落到同目录的临时文件，刷盘后原子替换，读者永远看不到写了一半的条目。
//! 目录可以随时整体删除，效果等同于清空后重新预热。

use crate::artifact::WovenClassArtifact;
use crate::error::{WeaveError, WeaveResult};
use crate::fingerprint::Fingerprint;
use crate::registry::AdvisorRegistry;
use crate::source::ClassSource;
use crate::weaver::ProxyWeaver;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;
use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

const ENTRY_EXTENSION: &str = "json";
const TEMP_PREFIX: &str = ".weft-";
const TEMP_SUFFIX: &str = ".tmp";

/// 缓存条目
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CacheEntry {
    pub class: String,
    pub fingerprint: Fingerprint,
    pub written_at: DateTime<Utc>,
    pub artifact: WovenClassArtifact,
}

/// 未命中的原因
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MissReason {
    /// 没有条目
    Absent,
    /// 条目的指纹与请求不一致
    Stale,
    /// 条目无法反序列化
    Corrupt,
}

/// 查询结果
#[derive(Debug)]
pub enum CacheLookup {
    Hit(Box<CacheEntry>),
    Miss(MissReason),
}

impl CacheLookup {
    pub fn is_hit(&self) -> bool {
        matches!(self, CacheLookup::Hit(_))
    }

    /// 命中时取出构件
    pub fn into_artifact(self) -> Option<WovenClassArtifact> {
        match self {
            CacheLookup::Hit(entry) => Some(entry.artifact),
            CacheLookup::Miss(_) => None,
        }
    }
}

/// 构件缓存
#[derive(Debug, Clone)]
pub struct ArtifactCache {
    root: PathBuf,
}

impl ArtifactCache {
    /// 创建缓存，不触碰文件系统
    ///
    /// 目录在第一次写入时创建
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// 创建缓存并确保目录存在
    pub fn open(root: impl Into<PathBuf>) -> WeaveResult<Self> {
        let cache = Self::new(root);
        fs::create_dir_all(&cache.root)?;
        Ok(cache)
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// 类对应的条目路径
    ///
    /// 类名本身可以作为文件名时直接使用，否则替换不安全字符并附加名称哈希
    pub fn entry_path(&self, class: &str) -> PathBuf {
        self.root.join(format!("{}.{}", entry_file_stem(class), ENTRY_EXTENSION))
    }

    /// 读取条目，不检查指纹
    ///
    /// 条目不存在时返回 `Ok(None)`，无法反序列化时返回 `CacheCorruption`
    pub fn load_entry(&self, class: &str) -> WeaveResult<Option<CacheEntry>> {
        let bytes = match fs::read(self.entry_path(class)) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };

        let entry: CacheEntry =
            serde_json::from_slice(&bytes).map_err(|e| WeaveError::CacheCorruption {
                class: class.to_string(),
                reason: e.to_string(),
            })?;

        if entry.class != class || entry.artifact.class != class {
            return Err(WeaveError::CacheCorruption {
                class: class.to_string(),
                reason: format!("entry belongs to class '{}'", entry.class),
            });
        }
        Ok(Some(entry))
    }

    /// 按类名和指纹查询
    ///
    /// 损坏的条目视为未命中，调用方重新织入后覆盖即可
    pub fn get(&self, class: &str, fingerprint: &Fingerprint) -> WeaveResult<CacheLookup> {
        match self.load_entry(class) {
            Ok(Some(entry)) if entry.fingerprint == *fingerprint => {
                tracing::debug!("Cache hit for '{}' ({})", class, fingerprint.short());
                Ok(CacheLookup::Hit(Box::new(entry)))
            }
            Ok(Some(entry)) => {
                tracing::debug!(
                    "Cache entry for '{}' is stale ({} != {})",
                    class,
                    entry.fingerprint.short(),
                    fingerprint.short()
                );
                Ok(CacheLookup::Miss(MissReason::Stale))
            }
            Ok(None) => Ok(CacheLookup::Miss(MissReason::Absent)),
            Err(e @ WeaveError::CacheCorruption { .. }) => {
                tracing::warn!("{}; treating as a miss", e);
                Ok(CacheLookup::Miss(MissReason::Corrupt))
            }
            Err(e) => Err(e),
        }
    }

    /// 持久化构件
    ///
    /// 写入临时文件、刷盘，再原子重命名到条目路径；
    /// 并发写入同一个确定性构件时，后到的写入只是一次无害的覆盖
    pub fn put(
        &self,
        class: &str,
        fingerprint: &Fingerprint,
        artifact: &WovenClassArtifact,
    ) -> WeaveResult<()> {
        let path = self.entry_path(class);
        let write_failure = |source: io::Error| WeaveError::CacheWriteFailure {
            class: class.to_string(),
            path: path.clone(),
            source,
        };

        let entry = CacheEntry {
            class: class.to_string(),
            fingerprint: *fingerprint,
            written_at: Utc::now(),
            artifact: artifact.clone(),
        };
        let bytes = serde_json::to_vec_pretty(&entry)
            .map_err(|e| write_failure(io::Error::new(io::ErrorKind::InvalidData, e)))?;

        fs::create_dir_all(&self.root).map_err(write_failure)?;
        let mut temp = tempfile::Builder::new()
            .prefix(TEMP_PREFIX)
            .suffix(TEMP_SUFFIX)
            .tempfile_in(&self.root)
            .map_err(write_failure)?;
        temp.write_all(&bytes).map_err(write_failure)?;
        temp.as_file().sync_all().map_err(write_failure)?;
        temp.persist(&path).map_err(|e| write_failure(e.error))?;

        tracing::debug!("Stored artifact for '{}' at {}", class, path.display());
        Ok(())
    }

    /// 删除所有条目和残留的临时文件，返回删除的文件数
    pub fn clear(&self) -> WeaveResult<usize> {
        let entries = match fs::read_dir(&self.root) {
            Ok(entries) => entries,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(0),
            Err(e) => return Err(e.into()),
        };

        let mut removed = 0;
        for entry in entries {
            let path = entry?.path();
            if !path.is_file() || !is_cache_file(&path) {
                continue;
            }
            match fs::remove_file(&path) {
                Ok(()) => removed += 1,
                // 并发清理
                Err(e) if e.kind() == io::ErrorKind::NotFound => {}
                Err(e) => return Err(e.into()),
            }
        }

        tracing::info!("Cleared {} cache file(s) from {}", removed, self.root.display());
        Ok(removed)
    }

    /// 预热
    ///
    /// 为类全集中的每个类织入并写入缓存。每个类在阻塞线程池上执行，
    /// 超时的类标记为失败；单个类失败不会中止其余类的预热
    pub async fn warmup(
        &self,
        source: Arc<dyn ClassSource>,
        registry: Arc<AdvisorRegistry>,
        timeout: Duration,
    ) -> WeaveResult<WarmupReport> {
        let names = source.class_names()?;
        tracing::info!(
            "Warming up {} class(es) into {}",
            names.len(),
            self.root.display()
        );

        let mut classes = Vec::with_capacity(names.len());
        for name in names {
            let source = Arc::clone(&source);
            let registry = Arc::clone(&registry);
            let class = name.clone();

            // 阻塞任务只负责织入，写入缓存在超时判定之后进行
            let task = tokio::task::spawn_blocking(move || {
                weave_class(source.as_ref(), &registry, &class)
            });

            let outcome = match tokio::time::timeout(timeout, task).await {
                Ok(Ok(Ok((fingerprint, artifact)))) => {
                    match self.put(&name, &fingerprint, &artifact) {
                        Ok(()) => WarmupOutcome::Woven { fingerprint },
                        Err(e) => {
                            tracing::warn!("Warmup failed for '{}': {}", name, e);
                            WarmupOutcome::Failed(e.to_string())
                        }
                    }
                }
                Ok(Ok(Err(e))) => {
                    tracing::warn!("Warmup failed for '{}': {}", name, e);
                    WarmupOutcome::Failed(e.to_string())
                }
                Ok(Err(join_error)) => {
                    tracing::warn!("Warmup task for '{}' aborted: {}", name, join_error);
                    WarmupOutcome::Failed(join_error.to_string())
                }
                Err(_) => {
                    tracing::warn!("Warmup timed out for '{}' after {:?}", name, timeout);
                    WarmupOutcome::TimedOut
                }
            };
            classes.push(ClassWarmup {
                class: name,
                outcome,
            });
        }

        let report = WarmupReport { classes };
        tracing::info!(
            "Warmup finished: {} woven, {} failed",
            report.woven_count(),
            report.failures().count()
        );
        Ok(report)
    }
}

/// 织入单个类，不写入缓存
fn weave_class(
    source: &dyn ClassSource,
    registry: &AdvisorRegistry,
    class: &str,
) -> WeaveResult<(Fingerprint, WovenClassArtifact)> {
    let descriptor = source.describe(class)?;
    let weaver = ProxyWeaver::new(registry);
    let artifact = weaver.weave(&descriptor)?;
    let fingerprint = weaver.fingerprint(&descriptor)?;
    Ok((fingerprint, artifact))
}

fn entry_file_stem(class: &str) -> String {
    let safe = !class.is_empty()
        && !class.starts_with('.')
        && class
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '.' | '$'));
    if safe {
        return class.to_string();
    }

    let sanitised: String = class
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() { c } else { '_' })
        .collect();
    let digest = hex::encode(Sha256::digest(class.as_bytes()));
    format!("{}-{}", sanitised, &digest[..8])
}

fn is_cache_file(path: &Path) -> bool {
    let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
        return false;
    };
    let is_entry = path.extension().and_then(|e| e.to_str()) == Some(ENTRY_EXTENSION);
    let is_temp = name.starts_with(TEMP_PREFIX) && name.ends_with(TEMP_SUFFIX);
    is_entry || is_temp
}

/// 单个类的预热结果
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WarmupOutcome {
    Woven { fingerprint: Fingerprint },
    Failed(String),
    TimedOut,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClassWarmup {
    pub class: String,
    pub outcome: WarmupOutcome,
}

impl fmt::Display for ClassWarmup {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.outcome {
            WarmupOutcome::Woven { fingerprint } => write!(f, "ok {} {}", self.class, fingerprint),
            WarmupOutcome::Failed(reason) => write!(f, "FAILED {}: {}", self.class, reason),
            WarmupOutcome::TimedOut => write!(f, "FAILED {}: timed out", self.class),
        }
    }
}

/// 预热报告
#[derive(Debug, Clone, Default)]
pub struct WarmupReport {
    pub classes: Vec<ClassWarmup>,
}

impl WarmupReport {
    /// 所有类都织入成功
    pub fn is_success(&self) -> bool {
        self.failures().next().is_none()
    }

    pub fn failures(&self) -> impl Iterator<Item = &ClassWarmup> {
        self.classes
            .iter()
            .filter(|c| !matches!(c.outcome, WarmupOutcome::Woven { .. }))
    }

    pub fn woven_count(&self) -> usize {
        self.classes.len() - self.failures().count()
    }

    pub fn outcome(&self, class: &str) -> Option<&WarmupOutcome> {
        self.classes
            .iter()
            .find(|c| c.class == class)
            .map(|c| &c.outcome)
    }
}
