//! 织入引擎错误

use crate::address::MemberKind;
use std::path::PathBuf;

/// 织入引擎的结果类型
pub type WeaveResult<T> = Result<T, WeaveError>;

/// 织入引擎错误
#[derive(Debug, thiserror::Error)]
pub enum WeaveError {
    /// 同一连接点上两个通知使用了相同的显式序号，注册阶段立即失败
    #[error(
        "Conflicting order: advisor '{advisor}' requested index {index} on '{pointcut}' ({kind}), already taken by '{existing}'"
    )]
    ConflictingOrder {
        advisor: String,
        existing: String,
        pointcut: String,
        kind: MemberKind,
        index: u32,
    },

    /// 同一 id 绑定了不同的通知实例
    #[error("Advisor id '{0}' is already bound to a different advice instance")]
    DuplicateAdvisor(String),

    /// 通知 id 无法写入连接点地址的文本形式
    #[error("Invalid advisor id '{0}': must be non-empty without '@', '#' or whitespace")]
    InvalidAdvisorId(String),

    #[error("Invalid pointcut pattern '{pattern}': {reason}")]
    InvalidPattern { pattern: String, reason: String },

    /// 目标类的结构描述无法转换
    #[error("Weaving failed for class '{class}': {reason}")]
    WeavingFailure { class: String, reason: String },

    /// 存储层无法持久化构件
    #[error("Failed to persist artifact for class '{class}' at {}: {source}", path.display())]
    CacheWriteFailure {
        class: String,
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// 已持久化的构件无法反序列化
    #[error("Cached artifact for class '{class}' is corrupt: {reason}")]
    CacheCorruption { class: String, reason: String },

    #[error("Class '{0}' not found")]
    ClassNotFound(String),

    #[error("Class '{class}' has no {kind} member '{member}'")]
    UnknownMember {
        class: String,
        member: String,
        kind: MemberKind,
    },

    #[error("No original behavior bound for {class}::{member} ({kind})")]
    MissingBehavior {
        class: String,
        member: String,
        kind: MemberKind,
    },

    #[error("Advisor '{0}' is not registered")]
    UnknownAdvisor(String),

    #[error("Cache I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl WeaveError {
    pub(crate) fn weaving(class: impl Into<String>, reason: impl Into<String>) -> Self {
        WeaveError::WeavingFailure {
            class: class.into(),
            reason: reason.into(),
        }
    }
}
