//! `weft warmup`: 清空缓存后为类目录中的每个类织入并写入缓存

use crate::{EXIT_FAILURE, EXIT_OK};
use std::io::Write;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use weft_aop::{AdvisorRegistry, DirectoryClassSource, WeavingPipeline};
use weft_core::config::WeaverConfig;

pub async fn execute(
    config: &WeaverConfig,
    registry: Arc<AdvisorRegistry>,
    classes: &Path,
    timeout: Duration,
    out: &mut dyn Write,
) -> anyhow::Result<u8> {
    let source = Arc::new(DirectoryClassSource::new(classes));
    let pipeline = WeavingPipeline::new(config, registry, source);

    let removed = pipeline.clear()?;
    tracing::info!("Removed {} stale cache file(s) before warmup", removed);

    let report = pipeline.warmup(timeout).await?;
    for class in &report.classes {
        writeln!(out, "{}", class)?;
    }
    writeln!(
        out,
        "warmed {}/{} class(es) into {}",
        report.woven_count(),
        report.classes.len(),
        config.cache_dir.display()
    )?;

    Ok(if report.is_success() { EXIT_OK } else { EXIT_FAILURE })
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use std::fs;
    use weft_aop::{Advisor, ArtifactCache, LoggingAdvice, MemberKind, ProxyWeaver};
    use weft_aop::ClassSource;

    pub(crate) fn registry() -> Arc<AdvisorRegistry> {
        let mut registry = AdvisorRegistry::new();
        registry
            .register(
                "*.*",
                MemberKind::Method,
                Advisor::new("logging", LoggingAdvice::new()),
                Some(0),
            )
            .unwrap();
        Arc::new(registry)
    }

    pub(crate) fn write_classes(dir: &Path) {
        fs::write(
            dir.join("Account.json"),
            r#"{"name":"Account","members":[
                {"name":"withdraw","kind":"method","params":["amount"]},
                {"name":"deposit","kind":"method","params":["amount"]}
            ]}"#,
        )
        .unwrap();
        fs::write(
            dir.join("Ledger.json"),
            r#"{"name":"Ledger","members":[{"name":"post","kind":"method"}]}"#,
        )
        .unwrap();
        fs::write(
            dir.join("Broken.json"),
            r#"{"name":"Broken","members":[
                {"name":"run","kind":"method"},
                {"name":"run","kind":"method"}
            ]}"#,
        )
        .unwrap();
    }

    #[tokio::test]
    async fn test_warmup_reports_each_class() {
        let classes = tempfile::tempdir().unwrap();
        let cache_dir = tempfile::tempdir().unwrap();
        write_classes(classes.path());
        let config = WeaverConfig::new(cache_dir.path());
        let registry = registry();

        let mut out = Vec::new();
        let code = execute(
            &config,
            Arc::clone(&registry),
            classes.path(),
            Duration::from_secs(5),
            &mut out,
        )
        .await
        .unwrap();
        let output = String::from_utf8(out).unwrap();

        assert_eq!(code, EXIT_FAILURE);
        assert!(output.contains("FAILED Broken: "));
        assert!(output.contains("ok Account "));
        assert!(output.contains("ok Ledger "));
        assert!(output.contains("warmed 2/3 class(es)"));

        // 有效的类仍然可以命中
        let source = DirectoryClassSource::new(classes.path());
        let cache = ArtifactCache::new(cache_dir.path());
        for name in ["Account", "Ledger"] {
            let class = source.describe(name).unwrap();
            let fingerprint = ProxyWeaver::new(&registry).fingerprint(&class).unwrap();
            assert!(cache.get(name, &fingerprint).unwrap().is_hit());
        }
    }

    #[tokio::test]
    async fn test_warmup_succeeds_when_all_classes_weave() {
        let classes = tempfile::tempdir().unwrap();
        let cache_dir = tempfile::tempdir().unwrap();
        write_classes(classes.path());
        fs::remove_file(classes.path().join("Broken.json")).unwrap();

        let mut out = Vec::new();
        let code = execute(
            &WeaverConfig::new(cache_dir.path()),
            registry(),
            classes.path(),
            Duration::from_secs(5),
            &mut out,
        )
        .await
        .unwrap();
        assert_eq!(code, EXIT_OK);
    }
}
