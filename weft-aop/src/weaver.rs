//! 代理织入器
//!
//! 把目标类的结构描述转换为织入构件：没有匹配通知的成员原样复制，
//! 匹配到通知的成员替换为分派桩，并把实际应用的通知记录进清单。
//! 织入是纯函数，相同的类和未变化的注册表总是得到字节一致的构件。

use crate::address::MemberKind;
use crate::artifact::{
    AppliedAdvisor, Capture, DispatchStub, Manifest, ManifestEntry, MemberBody, ProxyDefinition,
    WovenClassArtifact, WovenMember, ARTIFACT_FORMAT_VERSION,
};
use crate::class::{ClassDescriptor, MemberDescriptor};
use crate::error::{WeaveError, WeaveResult};
use crate::fingerprint::Fingerprint;
use crate::registry::{AdvisorRegistry, ResolvedAdvisor};

/// 代理织入器
#[derive(Debug, Clone, Copy)]
pub struct ProxyWeaver<'r> {
    registry: &'r AdvisorRegistry,
}

impl<'r> ProxyWeaver<'r> {
    pub fn new(registry: &'r AdvisorRegistry) -> Self {
        Self { registry }
    }

    /// 只计算清单，不生成代理定义
    ///
    /// 指纹需要清单哈希，缓存命中时可以跳过完整织入
    pub fn manifest_for(&self, class: &ClassDescriptor) -> Manifest {
        let mut entries: Vec<ManifestEntry> = class
            .members
            .iter()
            .filter_map(|member| {
                let resolved = self.resolve(class, member);
                (!resolved.is_empty()).then(|| ManifestEntry {
                    member: member.name.clone(),
                    kind: member.kind,
                    advisors: applied(&resolved),
                })
            })
            .collect();
        entries.sort_by(|a, b| (&a.member, a.kind).cmp(&(&b.member, b.kind)));

        Manifest {
            class: class.name.clone(),
            entries,
        }
    }

    /// 类在当前注册表下的指纹
    pub fn fingerprint(&self, class: &ClassDescriptor) -> WeaveResult<Fingerprint> {
        Fingerprint::compute(class, &self.manifest_for(class))
            .map_err(|e| WeaveError::weaving(&class.name, e.to_string()))
    }

    /// 织入一个类
    ///
    /// 元数据无法转换时返回 `WeavingFailure`
    pub fn weave(&self, class: &ClassDescriptor) -> WeaveResult<WovenClassArtifact> {
        class.validate()?;

        let mut members = Vec::with_capacity(class.members.len());
        let mut entries = Vec::new();

        for member in &class.members {
            let resolved = self.resolve(class, member);
            if resolved.is_empty() {
                members.push(woven_member(member, MemberBody::Original));
                continue;
            }

            tracing::debug!(
                "Weaving {}::{} ({}) with {} advisor(s)",
                class.name,
                member.name,
                member.kind,
                resolved.len()
            );

            let stub = DispatchStub {
                chain: resolved.iter().map(|r| r.id().to_string()).collect(),
                captures: capture_for(member),
                instance_context: member.kind.needs_instance(),
            };
            members.push(woven_member(member, MemberBody::Dispatch(stub)));
            entries.push(ManifestEntry {
                member: member.name.clone(),
                kind: member.kind,
                advisors: applied(&resolved),
            });
        }
        entries.sort_by(|a, b| (&a.member, a.kind).cmp(&(&b.member, b.kind)));

        tracing::info!(
            "Woven class '{}': {} of {} member(s) intercepted",
            class.name,
            entries.len(),
            members.len()
        );

        Ok(WovenClassArtifact {
            format_version: ARTIFACT_FORMAT_VERSION,
            class: class.name.clone(),
            definition: ProxyDefinition {
                name: class.name.clone(),
                members,
            },
            manifest: Manifest {
                class: class.name.clone(),
                entries,
            },
        })
    }

    fn resolve(&self, class: &ClassDescriptor, member: &MemberDescriptor) -> Vec<ResolvedAdvisor> {
        self.registry.resolve(&class.name, &member.name, member.kind)
    }
}

fn applied(resolved: &[ResolvedAdvisor]) -> Vec<AppliedAdvisor> {
    resolved
        .iter()
        .map(|r| AppliedAdvisor {
            id: r.id().to_string(),
            index: r.index,
        })
        .collect()
}

fn capture_for(member: &MemberDescriptor) -> Capture {
    match member.kind {
        MemberKind::Method | MemberKind::StaticMethod => Capture::Arguments {
            params: member.params.clone(),
        },
        MemberKind::Property => Capture::PropertyAccess {
            read: true,
            write: true,
        },
    }
}

fn woven_member(member: &MemberDescriptor, body: MemberBody) -> WovenMember {
    WovenMember {
        name: member.name.clone(),
        kind: member.kind,
        visibility: member.visibility,
        params: member.params.clone(),
        default: member.default.clone(),
        body,
    }
}
