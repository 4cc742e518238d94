//! 切面声明
//!
//! 切面是横切关注点的模块化。`#[derive(Aspect)]` 为每个 `#[advise(...)]`
//! 属性提交一条 `AdvisorDeclaration`，启动时由
//! `AdvisorRegistry::from_declarations` 统一收集注册。

use crate::address::MemberKind;
use crate::advice::{Advice, Advisor};
use crate::error::{WeaveError, WeaveResult};
use std::sync::Arc;

/// 通知声明
///
/// 用于 inventory 自动收集和注册通知
pub struct AdvisorDeclaration {
    /// 通知 id
    pub id: &'static str,

    /// 切点表达式，`Class.member`
    pub pointcut: &'static str,

    /// 成员种类标签：method / staticMethod / property
    pub kind: &'static str,

    /// 显式序号
    pub index: Option<u32>,

    /// 创建通知实例的函数
    pub creator: fn() -> Arc<dyn Advice>,
}

impl AdvisorDeclaration {
    pub const fn new(
        id: &'static str,
        pointcut: &'static str,
        kind: &'static str,
        index: Option<u32>,
        creator: fn() -> Arc<dyn Advice>,
    ) -> Self {
        Self {
            id,
            pointcut,
            kind,
            index,
            creator,
        }
    }

    /// 解析成员种类
    pub fn member_kind(&self) -> WeaveResult<MemberKind> {
        self.kind
            .parse()
            .map_err(|reason| WeaveError::InvalidPattern {
                pattern: self.pointcut.to_string(),
                reason,
            })
    }

    /// 创建通知实例
    pub fn create_advisor(&self) -> Advisor {
        Advisor::from_arc(self.id, (self.creator)())
    }

    /// inventory 不保证顺序，注册前按此键排序；显式序号排在追加的声明之前
    pub(crate) fn sort_key(&self) -> (bool, Option<u32>, &'static str, &'static str, &'static str) {
        (self.index.is_none(), self.index, self.pointcut, self.kind, self.id)
    }
}

// 使用 inventory 收集所有通知声明
inventory::collect!(AdvisorDeclaration);

/// 获取所有通知声明
pub fn all_declarations() -> impl Iterator<Item = &'static AdvisorDeclaration> {
    inventory::iter::<AdvisorDeclaration>()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::advice::LoggingAdvice;
    use crate::registry::AdvisorRegistry;

    fn logging() -> Arc<dyn Advice> {
        Arc::new(LoggingAdvice::new())
    }

    static DECLARATIONS: [AdvisorDeclaration; 3] = [
        AdvisorDeclaration::new("trace", "Account.*", "method", None, logging),
        AdvisorDeclaration::new("audit", "Account.withdraw", "method", Some(1), logging),
        AdvisorDeclaration::new("audit", "Account.withdraw", "method", Some(0), logging),
    ];

    #[test]
    fn test_declarations_register_in_stable_order() {
        let mut registry = AdvisorRegistry::new();
        registry.register_declarations(DECLARATIONS.iter()).unwrap();

        let resolved = registry.resolve("Account", "withdraw", MemberKind::Method);
        let order: Vec<_> = resolved.iter().map(|r| (r.id(), r.index)).collect();
        assert_eq!(order, vec![("audit", 0), ("audit", 1), ("trace", 2)]);

        // 同一个 id 只实例化一次
        assert!(resolved[0].advisor.same_advice(&resolved[1].advisor));
    }

    #[test]
    fn test_invalid_kind() {
        let declaration = AdvisorDeclaration::new("x", "Account.withdraw", "field", None, logging);
        assert!(declaration.member_kind().is_err());
    }
}
