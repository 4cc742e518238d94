//! 织入构件
//!
//! 代理定义（结构化的类定义，被拦截成员替换为分派桩）加上清单。
//! 清单按连接点列出实际应用的通知 id 与序号，是“成员是否被织入”检查的唯一依据。

use crate::address::{JoinPointAddress, MemberKind};
use crate::class::Visibility;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// 构件格式版本，变化时所有缓存条目失效
pub const ARTIFACT_FORMAT_VERSION: u32 = 1;

/// 分派桩捕获的内容
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum Capture {
    /// 方法调用参数
    Arguments { params: Vec<String> },
    /// 属性读写：读取时可替换返回值，写入时可替换传入值
    PropertyAccess { read: bool, write: bool },
}

/// 成员体
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "body", rename_all = "camelCase")]
pub enum MemberBody {
    /// 原样复制
    Original,
    /// 经由通知链分派
    Dispatch(DispatchStub),
}

/// 分派桩
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DispatchStub {
    /// 按执行顺序排列的通知 id
    pub chain: Vec<String>,
    pub captures: Capture,
    /// 静态方法不需要实例上下文
    pub instance_context: bool,
}

/// 代理定义中的成员
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WovenMember {
    pub name: String,
    pub kind: MemberKind,
    pub visibility: Visibility,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub params: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default: Option<Value>,
    #[serde(flatten)]
    pub body: MemberBody,
}

impl WovenMember {
    pub fn is_woven(&self) -> bool {
        matches!(self.body, MemberBody::Dispatch(_))
    }

    pub fn stub(&self) -> Option<&DispatchStub> {
        match &self.body {
            MemberBody::Dispatch(stub) => Some(stub),
            MemberBody::Original => None,
        }
    }
}

/// 代理定义
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProxyDefinition {
    pub name: String,
    pub members: Vec<WovenMember>,
}

impl ProxyDefinition {
    pub fn member(&self, name: &str, kind: MemberKind) -> Option<&WovenMember> {
        self.members.iter().find(|m| m.name == name && m.kind == kind)
    }
}

/// 清单中记录的一个已应用通知
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AppliedAdvisor {
    pub id: String,
    pub index: u32,
}

/// 清单条目：一个被织入的连接点
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ManifestEntry {
    pub member: String,
    pub kind: MemberKind,
    pub advisors: Vec<AppliedAdvisor>,
}

/// 织入清单
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Manifest {
    pub class: String,
    /// 按（成员名，种类）排序
    pub entries: Vec<ManifestEntry>,
}

impl Manifest {
    pub fn entry(&self, member: &str, kind: MemberKind) -> Option<&ManifestEntry> {
        self.entries
            .iter()
            .find(|e| e.member == member && e.kind == kind)
    }

    /// 成员是否被织入
    ///
    /// 给出通知 id 时要求该通知挂在此成员上；给出序号时要求序号一致
    pub fn is_member_woven(&self, address: &JoinPointAddress) -> bool {
        if address.class != self.class {
            return false;
        }
        let Some(entry) = self.entry(&address.member, address.kind) else {
            return false;
        };

        entry.advisors.iter().any(|applied| {
            address
                .advisor_id
                .as_deref()
                .map_or(true, |id| applied.id == id)
                && address.index.map_or(true, |index| applied.index == index)
        })
    }

    /// 成员是否未被（指定的通知）织入，类名不符时返回 false
    pub fn is_member_not_woven(&self, address: &JoinPointAddress) -> bool {
        address.class == self.class && !self.is_member_woven(address)
    }

    /// 被织入的连接点数量
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// 织入构件
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WovenClassArtifact {
    pub format_version: u32,
    pub class: String,
    pub definition: ProxyDefinition,
    pub manifest: Manifest,
}

impl WovenClassArtifact {
    /// 规范化的字节表示，相同输入总是得到相同的字节
    pub fn to_bytes(&self) -> serde_json::Result<Vec<u8>> {
        serde_json::to_vec(self)
    }

    pub fn from_bytes(bytes: &[u8]) -> serde_json::Result<Self> {
        serde_json::from_slice(bytes)
    }

    pub fn is_member_woven(&self, address: &JoinPointAddress) -> bool {
        self.manifest.is_member_woven(address)
    }

    pub fn is_member_not_woven(&self, address: &JoinPointAddress) -> bool {
        self.manifest.is_member_not_woven(address)
    }
}
