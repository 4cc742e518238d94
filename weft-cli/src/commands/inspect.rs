//! `weft inspect`: 根据缓存中的清单检查连接点是否被织入

use crate::{EXIT_FAILURE, EXIT_OK};
use std::io::Write;
use std::path::Path;
use weft_aop::{
    AdvisorRegistry, ArtifactCache, CacheEntry, CacheLookup, ClassSource, DirectoryClassSource,
    JoinPointAddress, MissReason, ProxyWeaver,
};
use weft_core::config::WeaverConfig;

/// 检查连接点
///
/// 给出 `classes` 时按当前指纹读取缓存，过期条目视为失败；
/// 否则直接读取已有条目，并在输出中附带其指纹和写入时间
pub fn execute(
    config: &WeaverConfig,
    registry: &AdvisorRegistry,
    address: &str,
    classes: Option<&Path>,
    out: &mut dyn Write,
) -> anyhow::Result<u8> {
    let address: JoinPointAddress = address.parse().map_err(anyhow::Error::msg)?;
    let cache = ArtifactCache::new(&config.cache_dir);

    let entry = match classes {
        Some(dir) => {
            let descriptor = DirectoryClassSource::new(dir).describe(&address.class)?;
            let fingerprint = ProxyWeaver::new(registry).fingerprint(&descriptor)?;
            match cache.get(&address.class, &fingerprint)? {
                CacheLookup::Hit(entry) => Some(*entry),
                CacheLookup::Miss(MissReason::Stale) => {
                    writeln!(
                        out,
                        "{}: cached artifact is stale (current fingerprint {}), run `weft warmup`",
                        address,
                        fingerprint.short()
                    )?;
                    return Ok(EXIT_FAILURE);
                }
                CacheLookup::Miss(_) => None,
            }
        }
        None => cache.load_entry(&address.class)?,
    };

    let Some(entry) = entry else {
        writeln!(out, "{}: class not cached, run `weft warmup` first", address)?;
        return Ok(EXIT_FAILURE);
    };

    if !entry.artifact.is_member_woven(&address) {
        writeln!(out, "not woven {} {}", address, provenance(&entry))?;
        return Ok(EXIT_FAILURE);
    }

    let chain = entry
        .artifact
        .manifest
        .entry(&address.member, address.kind)
        .map(|e| {
            e.advisors
                .iter()
                .map(|a| format!("{}#{}", a.id, a.index))
                .collect::<Vec<_>>()
                .join(", ")
        })
        .unwrap_or_default();
    writeln!(out, "woven {} [{}] {}", address, chain, provenance(&entry))?;
    Ok(EXIT_OK)
}

fn provenance(entry: &CacheEntry) -> String {
    format!(
        "(fingerprint {}, written {})",
        entry.fingerprint.short(),
        entry.written_at.format("%Y-%m-%dT%H:%M:%SZ")
    )
}
