//! 织入流水线
//!
//! 宿主程序在第一次引用某个类时调用 `resolve_class`：
//! 计算指纹、查询缓存，未命中时织入并写入缓存，然后返回构件。
//! 注册表由流水线持有并以引用传给织入器，没有全局状态。

use crate::address::JoinPointAddress;
use crate::artifact::WovenClassArtifact;
use crate::cache::{ArtifactCache, CacheLookup, MissReason, WarmupReport};
use crate::class::ClassDescriptor;
use crate::error::{WeaveError, WeaveResult};
use crate::fingerprint::Fingerprint;
use crate::registry::AdvisorRegistry;
use crate::runtime::{ClassBehavior, WovenClass};
use crate::source::ClassSource;
use crate::weaver::ProxyWeaver;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use weft_core::config::WeaverConfig;

/// 织入流水线
pub struct WeavingPipeline {
    registry: Arc<AdvisorRegistry>,
    source: Arc<dyn ClassSource>,
    cache: ArtifactCache,
    resolved: RwLock<HashMap<String, Arc<WovenClassArtifact>>>,
    degraded: AtomicBool,
}

impl WeavingPipeline {
    pub fn new(
        config: &WeaverConfig,
        registry: Arc<AdvisorRegistry>,
        source: Arc<dyn ClassSource>,
    ) -> Self {
        Self::with_cache(ArtifactCache::new(&config.cache_dir), registry, source)
    }

    pub fn with_cache(
        cache: ArtifactCache,
        registry: Arc<AdvisorRegistry>,
        source: Arc<dyn ClassSource>,
    ) -> Self {
        Self {
            registry,
            source,
            cache,
            resolved: RwLock::new(HashMap::new()),
            degraded: AtomicBool::new(false),
        }
    }

    pub fn registry(&self) -> &Arc<AdvisorRegistry> {
        &self.registry
    }

    pub fn cache(&self) -> &ArtifactCache {
        &self.cache
    }

    /// 缓存写入失败过，当前处于每次加载都重新织入的降级模式
    pub fn is_degraded(&self) -> bool {
        self.degraded.load(Ordering::Acquire)
    }

    /// 类在当前注册表下的指纹
    pub fn fingerprint(&self, class: &ClassDescriptor) -> WeaveResult<Fingerprint> {
        ProxyWeaver::new(&self.registry).fingerprint(class)
    }

    /// 解析类的织入构件
    ///
    /// 同一进程内只在第一次引用时访问缓存；缓存不可写时不做记忆，
    /// 之后每次加载都重新织入
    pub fn resolve_class(&self, name: &str) -> WeaveResult<Arc<WovenClassArtifact>> {
        if let Some(artifact) = self.resolved.read().get(name) {
            return Ok(Arc::clone(artifact));
        }

        let descriptor = self.source.describe(name)?;
        let weaver = ProxyWeaver::new(&self.registry);
        let fingerprint = weaver.fingerprint(&descriptor)?;

        let lookup = match self.cache.get(name, &fingerprint) {
            Ok(lookup) => lookup,
            Err(e) => {
                tracing::warn!("Cache read failed for '{}': {}; weaving instead", name, e);
                CacheLookup::Miss(MissReason::Absent)
            }
        };

        let (artifact, cacheable) = match lookup {
            CacheLookup::Hit(entry) => (entry.artifact, true),
            CacheLookup::Miss(reason) => {
                tracing::debug!("Cache miss for '{}' ({:?}), weaving", name, reason);
                let artifact = weaver.weave(&descriptor)?;
                let stored = self.store(name, &fingerprint, &artifact);
                (artifact, stored)
            }
        };

        let artifact = Arc::new(artifact);
        if cacheable {
            let mut resolved = self.resolved.write();
            // 并发的首次引用得到的是同一个确定性构件，保留先到的那个
            let entry = resolved
                .entry(name.to_string())
                .or_insert_with(|| Arc::clone(&artifact));
            return Ok(Arc::clone(entry));
        }
        Ok(artifact)
    }

    /// 解析并绑定原始行为
    pub fn load(&self, name: &str, behavior: &ClassBehavior) -> WeaveResult<WovenClass> {
        let artifact = self.resolve_class(name)?;
        WovenClass::bind(artifact, &self.registry, behavior)
    }

    /// 按地址检查成员是否被织入
    pub fn is_member_woven(&self, address: &JoinPointAddress) -> WeaveResult<bool> {
        Ok(self.resolve_class(&address.class)?.is_member_woven(address))
    }

    /// 预热整个类全集
    pub async fn warmup(&self, timeout: Duration) -> WeaveResult<WarmupReport> {
        self.resolved.write().clear();
        self.cache
            .warmup(Arc::clone(&self.source), Arc::clone(&self.registry), timeout)
            .await
    }

    /// 清空缓存与进程内记忆
    pub fn clear(&self) -> WeaveResult<usize> {
        self.resolved.write().clear();
        self.cache.clear()
    }

    fn store(&self, name: &str, fingerprint: &Fingerprint, artifact: &WovenClassArtifact) -> bool {
        match self.cache.put(name, fingerprint, artifact) {
            Ok(()) => true,
            Err(e @ WeaveError::CacheWriteFailure { .. }) => {
                if !self.degraded.swap(true, Ordering::AcqRel) {
                    tracing::warn!("{}; falling back to weaving on every load", e);
                }
                false
            }
            Err(e) => {
                tracing::warn!("Failed to store artifact for '{}': {}", name, e);
                false
            }
        }
    }
}

impl std::fmt::Debug for WeavingPipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WeavingPipeline")
            .field("registry", &self.registry)
            .field("cache", &self.cache.root())
            .field("resolved", &self.resolved.read().len())
            .field("degraded", &self.is_degraded())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::address::MemberKind;
    use crate::advice::{Advisor, LoggingAdvice};
    use crate::class::MemberDescriptor;
    use crate::source::InMemoryClassSource;
    use serde_json::json;
    use std::fs;
    use std::sync::atomic::AtomicUsize;

    /// 记录 describe 调用次数
    struct CountingSource {
        inner: InMemoryClassSource,
        calls: AtomicUsize,
    }

    impl ClassSource for CountingSource {
        fn class_names(&self) -> WeaveResult<Vec<String>> {
            self.inner.class_names()
        }

        fn describe(&self, name: &str) -> WeaveResult<ClassDescriptor> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.inner.describe(name)
        }
    }

    fn account() -> ClassDescriptor {
        ClassDescriptor::new("Account")
            .member(MemberDescriptor::method("withdraw", &["amount"]))
            .member(MemberDescriptor::method("deposit", &["amount"]))
    }

    fn source() -> Arc<CountingSource> {
        Arc::new(CountingSource {
            inner: InMemoryClassSource::new().with_class(account()),
            calls: AtomicUsize::new(0),
        })
    }

    fn registry(pattern: &str) -> Arc<AdvisorRegistry> {
        let mut registry = AdvisorRegistry::new();
        registry
            .register(
                pattern,
                MemberKind::Method,
                Advisor::new("logging", LoggingAdvice::new()),
                Some(0),
            )
            .unwrap();
        Arc::new(registry)
    }

    fn pipeline(
        dir: &std::path::Path,
        registry: Arc<AdvisorRegistry>,
        source: Arc<CountingSource>,
    ) -> WeavingPipeline {
        let config = WeaverConfig::new(dir);
        WeavingPipeline::new(&config, registry, source)
    }

    #[test]
    fn test_first_reference_weaves_and_stores() {
        let dir = tempfile::tempdir().unwrap();
        let source = source();
        let pipeline = pipeline(dir.path(), registry("Account.withdraw"), Arc::clone(&source));

        let artifact = pipeline.resolve_class("Account").unwrap();
        assert!(artifact.is_member_woven(
            &JoinPointAddress::method("Account", "withdraw")
                .with_advisor("logging")
                .at_index(0)
        ));

        let fingerprint = pipeline.fingerprint(&account()).unwrap();
        assert!(pipeline.cache().get("Account", &fingerprint).unwrap().is_hit());

        // 第二次引用走进程内记忆
        let again = pipeline.resolve_class("Account").unwrap();
        assert!(Arc::ptr_eq(&artifact, &again));
        assert_eq!(source.calls.load(Ordering::SeqCst), 1);
        assert!(!pipeline.is_degraded());
    }

    #[test]
    fn test_registry_change_invalidates_cached_artifact() {
        let dir = tempfile::tempdir().unwrap();
        let first = pipeline(dir.path(), registry("Account.withdraw"), source());
        first.resolve_class("Account").unwrap();

        let second = pipeline(dir.path(), registry("Account.deposit"), source());
        let artifact = second.resolve_class("Account").unwrap();
        assert!(artifact.is_member_woven(&JoinPointAddress::method("Account", "deposit")));
        assert!(artifact.is_member_not_woven(&JoinPointAddress::method("Account", "withdraw")));
    }

    #[test]
    fn test_corrupt_entry_is_rewoven_and_overwritten() {
        let dir = tempfile::tempdir().unwrap();
        let pipeline = pipeline(dir.path(), registry("Account.withdraw"), source());
        fs::create_dir_all(dir.path()).unwrap();
        fs::write(pipeline.cache().entry_path("Account"), b"garbage").unwrap();

        pipeline.resolve_class("Account").unwrap();
        let fingerprint = pipeline.fingerprint(&account()).unwrap();
        assert!(pipeline.cache().get("Account", &fingerprint).unwrap().is_hit());
    }

    #[test]
    fn test_unwritable_cache_degrades_to_weaving_on_every_load() {
        let dir = tempfile::tempdir().unwrap();
        let blocker = dir.path().join("file");
        fs::write(&blocker, b"").unwrap();

        let source = source();
        let pipeline = pipeline(
            &blocker.join("cache"),
            registry("Account.withdraw"),
            Arc::clone(&source),
        );

        let first = pipeline.resolve_class("Account").unwrap();
        let second = pipeline.resolve_class("Account").unwrap();
        assert!(pipeline.is_degraded());
        assert_eq!(first, second);
        assert_eq!(source.calls.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_unknown_class() {
        let dir = tempfile::tempdir().unwrap();
        let pipeline = pipeline(dir.path(), registry("Account.withdraw"), source());
        assert!(matches!(
            pipeline.resolve_class("Ledger"),
            Err(WeaveError::ClassNotFound(_))
        ));
    }

    #[test]
    fn test_concurrent_first_references_agree() {
        let dir = tempfile::tempdir().unwrap();
        let registry = registry("Account.*");
        let pipelines: Vec<_> = (0..4)
            .map(|_| pipeline(dir.path(), Arc::clone(&registry), source()))
            .collect();

        let artifacts: Vec<_> = std::thread::scope(|scope| {
            let handles: Vec<_> = pipelines
                .iter()
                .map(|p| scope.spawn(move || p.resolve_class("Account").unwrap()))
                .collect();
            handles.into_iter().map(|h| h.join().unwrap()).collect()
        });

        for artifact in &artifacts[1..] {
            assert_eq!(artifact.to_bytes().unwrap(), artifacts[0].to_bytes().unwrap());
        }
        let fingerprint = pipelines[0].fingerprint(&account()).unwrap();
        assert!(pipelines[0].cache().get("Account", &fingerprint).unwrap().is_hit());
    }

    #[test]
    fn test_load_binds_behavior() {
        let dir = tempfile::tempdir().unwrap();
        let pipeline = pipeline(dir.path(), registry("Account.withdraw"), source());
        let behavior = ClassBehavior::new()
            .method("withdraw", |_, args| Ok(json!(-args[0].as_i64().unwrap_or(0))))
            .method("deposit", |_, args| Ok(args[0].clone()));

        let class = pipeline.load("Account", &behavior).unwrap();
        let mut account = class.instantiate();
        assert_eq!(class.invoke(&mut account, "withdraw", vec![json!(3)]).unwrap(), json!(-3));
        assert!(pipeline
            .is_member_woven(&JoinPointAddress::method("Account", "withdraw"))
            .unwrap());
    }

    #[tokio::test]
    async fn test_warmup_then_clear() {
        let dir = tempfile::tempdir().unwrap();
        let pipeline = pipeline(dir.path(), registry("Account.withdraw"), source());

        let report = pipeline.warmup(Duration::from_secs(5)).await.unwrap();
        assert!(report.is_success());
        let fingerprint = pipeline.fingerprint(&account()).unwrap();
        assert!(pipeline.cache().get("Account", &fingerprint).unwrap().is_hit());

        assert_eq!(pipeline.clear().unwrap(), 1);
        assert!(!pipeline.cache().get("Account", &fingerprint).unwrap().is_hit());
    }
}
