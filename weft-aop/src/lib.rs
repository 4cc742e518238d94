//! Weft AOP - 织入引擎
//!
//! 提供：
//! - 连接点地址与文本/元组两种外部格式
//! - 通知注册表（启动时填充，之后只读共享）
//! - 代理织入器：把类的结构描述转换为带分派桩的代理定义和清单
//! - 构件缓存：按类名与指纹持久化，原子写入，支持清空与预热
//! - 织入流水线与运行时分派表

pub mod address;
pub mod advice;
pub mod artifact;
pub mod aspect;
pub mod cache;
pub mod class;
pub mod error;
pub mod fingerprint;
pub mod joinpoint;
pub mod pipeline;
pub mod pointcut;
pub mod registry;
pub mod runtime;
pub mod source;
pub mod weaver;

// 重新导出核心类型
pub use address::{JoinPointAddress, MemberKind};
pub use advice::{Advice, Advisor, LoggingAdvice, TimingAdvice};
pub use artifact::{
    AppliedAdvisor, Capture, DispatchStub, Manifest, ManifestEntry, MemberBody, ProxyDefinition,
    WovenClassArtifact, WovenMember, ARTIFACT_FORMAT_VERSION,
};
pub use aspect::{all_declarations, AdvisorDeclaration};
pub use cache::{
    ArtifactCache, CacheEntry, CacheLookup, ClassWarmup, MissReason, WarmupOutcome, WarmupReport,
};
pub use class::{ClassDescriptor, MemberDescriptor, Visibility};
pub use error::{WeaveError, WeaveResult};
pub use fingerprint::Fingerprint;
pub use joinpoint::{Access, JoinPoint, Proceed};
pub use pipeline::WeavingPipeline;
pub use pointcut::Pointcut;
pub use registry::{is_valid_advisor_id, AdvisorRegistry, ResolvedAdvisor};
pub use runtime::{ClassBehavior, Instance, WovenClass};
pub use source::{ClassSource, DirectoryClassSource, InMemoryClassSource};
pub use weaver::ProxyWeaver;

pub use serde_json::Value;

// 导出 inventory 供宏使用
pub use inventory;

/// 预导入模块
pub mod prelude {
    pub use crate::address::{JoinPointAddress, MemberKind};
    pub use crate::advice::{Advice, Advisor};
    pub use crate::class::{ClassDescriptor, MemberDescriptor};
    pub use crate::joinpoint::{JoinPoint, Proceed};
    pub use crate::pipeline::WeavingPipeline;
    pub use crate::registry::AdvisorRegistry;
    pub use crate::runtime::{ClassBehavior, WovenClass};
    pub use serde_json::{json, Value};
}
