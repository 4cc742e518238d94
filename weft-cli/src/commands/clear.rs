//! `weft clear`: 删除缓存目录中的所有构件

use crate::EXIT_OK;
use std::io::Write;
use weft_aop::ArtifactCache;
use weft_core::config::WeaverConfig;

pub fn execute(config: &WeaverConfig, out: &mut dyn Write) -> anyhow::Result<u8> {
    let removed = ArtifactCache::new(&config.cache_dir).clear()?;
    writeln!(
        out,
        "removed {} file(s) from {}",
        removed,
        config.cache_dir.display()
    )?;
    Ok(EXIT_OK)
}
