//! 构件指纹
//!
//! 组合目标类的结构哈希与已解析通知清单的哈希，
//! 源码变化或通知配置变化都会让缓存条目失效。

use crate::artifact::{Manifest, ARTIFACT_FORMAT_VERSION};
use crate::class::ClassDescriptor;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use sha2::{Digest, Sha256};
use std::fmt;
use std::str::FromStr;

/// SHA-256 指纹
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Fingerprint([u8; 32]);

impl Fingerprint {
    /// 计算 (类结构, 清单) 的指纹
    pub fn compute(class: &ClassDescriptor, manifest: &Manifest) -> serde_json::Result<Self> {
        let structural = structural_hash(class)?;
        let advice = Sha256::digest(serde_json::to_vec(manifest)?);

        let mut hasher = Sha256::new();
        hasher.update(b"weft-artifact:");
        hasher.update(ARTIFACT_FORMAT_VERSION.to_be_bytes());
        hasher.update(structural);
        hasher.update(advice);
        Ok(Self(hasher.finalize().into()))
    }

    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    /// 前 12 位十六进制，用于日志
    pub fn short(&self) -> String {
        self.to_hex()[..12].to_string()
    }
}

/// 类描述的结构哈希
pub fn structural_hash(class: &ClassDescriptor) -> serde_json::Result<[u8; 32]> {
    Ok(Sha256::digest(serde_json::to_vec(class)?).into())
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl fmt::Debug for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Fingerprint({})", self.short())
    }
}

impl FromStr for Fingerprint {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let bytes = hex::decode(s).map_err(|e| format!("Invalid fingerprint: {}", e))?;
        let bytes: [u8; 32] = bytes
            .try_into()
            .map_err(|_| "Invalid fingerprint: expected 32 bytes".to_string())?;
        Ok(Self(bytes))
    }
}

impl Serialize for Fingerprint {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_hex())
    }
}

impl<'de> Deserialize<'de> for Fingerprint {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}
