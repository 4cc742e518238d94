//! 通知注册表
//!
//! 负责管理（切点，成员种类）到有序通知列表的映射。
//! 在启动阶段一次性填充，之后只读，可以通过 `Arc` 在多个读者之间共享。

use crate::address::MemberKind;
use crate::advice::Advisor;
use crate::aspect::AdvisorDeclaration;
use crate::error::{WeaveError, WeaveResult};
use crate::pointcut::Pointcut;
use std::collections::BTreeMap;
use std::fmt;

/// 一条注册规则
#[derive(Clone)]
struct Rule {
    pointcut: Pointcut,
    kind: MemberKind,
    advisor_id: String,
    index: u32,
}

/// 解析到某个连接点上的通知及其序号
#[derive(Debug, Clone)]
pub struct ResolvedAdvisor {
    pub index: u32,
    pub advisor: Advisor,
}

impl ResolvedAdvisor {
    pub fn id(&self) -> &str {
        self.advisor.id()
    }
}

/// 通知注册表
#[derive(Default)]
pub struct AdvisorRegistry {
    advisors: BTreeMap<String, Advisor>,
    rules: Vec<Rule>,
}

impl AdvisorRegistry {
    /// 创建空的注册表
    pub fn new() -> Self {
        Self::default()
    }

    /// 注册通知
    ///
    /// 为所有匹配 `pattern` 和 `kind` 的成员添加通知。省略 `index` 时追加到
    /// 所有可能重叠的已注册通知之后；显式给出的 `index` 不能与同一连接点上
    /// 已有的序号冲突，否则返回 `ConflictingOrder`。返回实际使用的序号。
    pub fn register(
        &mut self,
        pattern: &str,
        kind: MemberKind,
        advisor: Advisor,
        index: Option<u32>,
    ) -> WeaveResult<u32> {
        if !is_valid_advisor_id(advisor.id()) {
            return Err(WeaveError::InvalidAdvisorId(advisor.id().to_string()));
        }
        let pointcut = Pointcut::parse(pattern)?;

        if let Some(existing) = self.advisors.get(advisor.id()) {
            if !existing.same_advice(&advisor) {
                return Err(WeaveError::DuplicateAdvisor(advisor.id().to_string()));
            }
        }

        let overlapping: Vec<&Rule> = self
            .rules
            .iter()
            .filter(|rule| rule.kind == kind && rule.pointcut.overlaps(&pointcut))
            .collect();

        let index = index.unwrap_or_else(|| {
            overlapping
                .iter()
                .map(|rule| rule.index.saturating_add(1))
                .max()
                .unwrap_or(0)
        });

        if let Some(taken) = overlapping.iter().find(|rule| rule.index == index) {
            return Err(WeaveError::ConflictingOrder {
                advisor: advisor.id().to_string(),
                existing: taken.advisor_id.clone(),
                pointcut: pattern.to_string(),
                kind,
                index,
            });
        }

        tracing::debug!(
            "Registering advisor '{}' on {} ({}) at index {}",
            advisor.id(),
            pointcut,
            kind,
            index
        );

        self.rules.push(Rule {
            pointcut,
            kind,
            advisor_id: advisor.id().to_string(),
            index,
        });
        self.advisors
            .entry(advisor.id().to_string())
            .or_insert(advisor);

        Ok(index)
    }

    /// 批量注册声明
    ///
    /// 声明先按确定的顺序排序（显式序号在前），每个 id 只实例化一次
    pub fn register_declarations<'a>(
        &mut self,
        declarations: impl IntoIterator<Item = &'a AdvisorDeclaration>,
    ) -> WeaveResult<()> {
        let mut declarations: Vec<&AdvisorDeclaration> = declarations.into_iter().collect();
        declarations.sort_by(|a, b| a.sort_key().cmp(&b.sort_key()));

        let mut instances: BTreeMap<&str, Advisor> = BTreeMap::new();
        for declaration in declarations {
            let kind = declaration.member_kind()?;
            let advisor = match instances.get(declaration.id) {
                Some(advisor) => advisor.clone(),
                None => {
                    let advisor = declaration.create_advisor();
                    instances.insert(declaration.id, advisor.clone());
                    advisor
                }
            };
            self.register(declaration.pointcut, kind, advisor, declaration.index)?;
        }
        Ok(())
    }

    /// 从 inventory 收集的声明构建注册表
    ///
    /// 任何序号冲突都会中止启动
    pub fn from_declarations() -> WeaveResult<Self> {
        let declarations: Vec<_> = crate::aspect::all_declarations().collect();
        tracing::info!("Loading {} advisor declaration(s)", declarations.len());

        let mut registry = Self::new();
        registry.register_declarations(declarations)?;

        tracing::info!(
            "Loaded {} advisor(s) across {} rule(s)",
            registry.advisors.len(),
            registry.rules.len()
        );
        Ok(registry)
    }

    /// 解析某个连接点上的所有通知，按序号升序排列
    ///
    /// 为空表示该成员不被织入
    pub fn resolve(&self, class: &str, member: &str, kind: MemberKind) -> Vec<ResolvedAdvisor> {
        let mut resolved: Vec<ResolvedAdvisor> = self
            .rules
            .iter()
            .filter(|rule| rule.kind == kind && rule.pointcut.matches(class, member))
            .filter_map(|rule| {
                self.advisors.get(&rule.advisor_id).map(|advisor| ResolvedAdvisor {
                    index: rule.index,
                    advisor: advisor.clone(),
                })
            })
            .collect();
        resolved.sort_by_key(|r| r.index);
        resolved
    }

    /// 给定范围内是否有任何通知
    ///
    /// 不需要生成代理就能回答“这个类/成员是否会被织入”
    pub fn is_woven(&self, class: &str, member: Option<&str>, kind: Option<MemberKind>) -> bool {
        self.rules.iter().any(|rule| {
            kind.map_or(true, |k| rule.kind == k)
                && match member {
                    Some(member) => rule.pointcut.matches(class, member),
                    None => rule.pointcut.matches_class(class),
                }
        })
    }

    /// 按 id 查找通知
    pub fn advisor(&self, id: &str) -> Option<&Advisor> {
        self.advisors.get(id)
    }

    pub fn advisor_ids(&self) -> impl Iterator<Item = &str> {
        self.advisors.keys().map(String::as_str)
    }

    /// 注册规则的数量
    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }
}

impl fmt::Debug for AdvisorRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AdvisorRegistry")
            .field("advisors", &self.advisors.keys().collect::<Vec<_>>())
            .field("rules", &self.rules.len())
            .finish()
    }
}

/// `@` 和 `#` 是地址文本形式 `Class::member/kind@advisor#index` 的分隔符
pub fn is_valid_advisor_id(id: &str) -> bool {
    !id.is_empty() && !id.chars().any(|c| c == '@' || c == '#' || c.is_whitespace())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::address::JoinPointAddress;
    use crate::advice::LoggingAdvice;

    fn advisor(id: &str) -> Advisor {
        Advisor::new(id, LoggingAdvice::new())
    }

    fn ids(resolved: &[ResolvedAdvisor]) -> Vec<(&str, u32)> {
        resolved.iter().map(|r| (r.id(), r.index)).collect()
    }

    #[test]
    fn test_resolve_orders_by_index() {
        let mut registry = AdvisorRegistry::new();
        registry
            .register("Account.withdraw", MemberKind::Method, advisor("second"), Some(1))
            .unwrap();
        registry
            .register("Account.withdraw", MemberKind::Method, advisor("first"), Some(0))
            .unwrap();

        let resolved = registry.resolve("Account", "withdraw", MemberKind::Method);
        assert_eq!(ids(&resolved), vec![("first", 0), ("second", 1)]);
    }

    #[test]
    fn test_unmatched_member_resolves_empty() {
        let mut registry = AdvisorRegistry::new();
        registry
            .register("Account.withdraw", MemberKind::Method, advisor("logging"), None)
            .unwrap();

        assert!(registry.resolve("Account", "deposit", MemberKind::Method).is_empty());
        assert!(registry
            .resolve("Account", "withdraw", MemberKind::StaticMethod)
            .is_empty());
    }

    #[test]
    fn test_append_goes_after_existing() {
        let mut registry = AdvisorRegistry::new();
        registry
            .register("Account.withdraw", MemberKind::Method, advisor("a"), Some(4))
            .unwrap();
        let appended = registry
            .register("Account.*", MemberKind::Method, advisor("b"), None)
            .unwrap();
        assert_eq!(appended, 5);

        let resolved = registry.resolve("Account", "withdraw", MemberKind::Method);
        assert_eq!(ids(&resolved), vec![("a", 4), ("b", 5)]);

        let resolved = registry.resolve("Account", "deposit", MemberKind::Method);
        assert_eq!(ids(&resolved), vec![("b", 5)]);
    }

    #[test]
    fn test_same_advisor_at_two_indices() {
        let mut registry = AdvisorRegistry::new();
        let audit = advisor("audit");
        registry
            .register("Account.withdraw", MemberKind::Method, audit.clone(), Some(0))
            .unwrap();
        registry
            .register("Account.withdraw", MemberKind::Method, audit.clone(), Some(1))
            .unwrap();

        let resolved = registry.resolve("Account", "withdraw", MemberKind::Method);
        assert_eq!(ids(&resolved), vec![("audit", 0), ("audit", 1)]);

        let err = registry
            .register("Account.withdraw", MemberKind::Method, advisor("late"), Some(0))
            .unwrap_err();
        assert!(matches!(
            err,
            WeaveError::ConflictingOrder { ref existing, index: 0, .. } if existing == "audit"
        ));
    }

    #[test]
    fn test_conflict_through_wildcard() {
        let mut registry = AdvisorRegistry::new();
        let b = advisor("b");
        registry
            .register("*.withdraw", MemberKind::Method, advisor("a"), Some(0))
            .unwrap();

        let err = registry
            .register("Account.with*", MemberKind::Method, b.clone(), Some(0))
            .unwrap_err();
        assert!(matches!(err, WeaveError::ConflictingOrder { .. }));

        // 不同种类互不冲突
        registry
            .register("Account.withdraw", MemberKind::StaticMethod, b.clone(), Some(0))
            .unwrap();
        // 不重叠的切点互不冲突
        registry
            .register("Account.deposit", MemberKind::Method, b, Some(0))
            .unwrap();
    }

    #[test]
    fn test_overlap_is_judged_on_patterns() {
        // 即使不存在名为 BarFoo 的类，两个模式仍可能同时匹配同一连接点
        let mut registry = AdvisorRegistry::new();
        registry
            .register("*Foo.run", MemberKind::Method, advisor("a"), Some(0))
            .unwrap();

        let err = registry
            .register("Bar*.run", MemberKind::Method, advisor("b"), Some(0))
            .unwrap_err();
        assert!(matches!(
            err,
            WeaveError::ConflictingOrder { ref existing, index: 0, .. } if existing == "a"
        ));

        // 追加时排在所有可能重叠的通知之后
        let index = registry
            .register("Bar*.run", MemberKind::Method, advisor("b"), None)
            .unwrap();
        assert_eq!(index, 1);
        assert_eq!(
            ids(&registry.resolve("BarFoo", "run", MemberKind::Method)),
            vec![("a", 0), ("b", 1)]
        );
    }

    #[test]
    fn test_advisor_id_must_fit_address_form() {
        let mut registry = AdvisorRegistry::new();
        for id in ["", "audit@v2", "audit#1", "audit log"] {
            let err = registry
                .register("Account.withdraw", MemberKind::Method, advisor(id), None)
                .unwrap_err();
            assert!(matches!(err, WeaveError::InvalidAdvisorId(ref bad) if bad == id));
        }
        assert_eq!(registry.len(), 0);

        registry
            .register("Account.withdraw", MemberKind::Method, advisor("audit-v2.1"), Some(3))
            .unwrap();
        let resolved = registry.resolve("Account", "withdraw", MemberKind::Method);
        let address = JoinPointAddress::method("Account", "withdraw")
            .with_advisor(resolved[0].id())
            .at_index(resolved[0].index);
        let parsed: JoinPointAddress = address.to_string().parse().unwrap();
        assert_eq!(parsed.advisor_id.as_deref(), Some("audit-v2.1"));
        assert_eq!(parsed.index, Some(3));
    }

    #[test]
    fn test_duplicate_advisor_id() {
        let mut registry = AdvisorRegistry::new();
        registry
            .register("Account.withdraw", MemberKind::Method, advisor("logging"), None)
            .unwrap();

        let err = registry
            .register("Account.deposit", MemberKind::Method, advisor("logging"), None)
            .unwrap_err();
        assert!(matches!(err, WeaveError::DuplicateAdvisor(ref id) if id == "logging"));
    }

    #[test]
    fn test_failed_registration_leaves_registry_unchanged() {
        let mut registry = AdvisorRegistry::new();
        registry
            .register("Account.withdraw", MemberKind::Method, advisor("a"), Some(0))
            .unwrap();
        assert!(registry
            .register("Account.withdraw", MemberKind::Method, advisor("b"), Some(0))
            .is_err());

        assert_eq!(registry.len(), 1);
        assert!(registry.advisor("b").is_none());
    }

    #[test]
    fn test_is_woven_scopes() {
        let mut registry = AdvisorRegistry::new();
        registry
            .register("Account.balance", MemberKind::Property, advisor("audit"), None)
            .unwrap();

        assert!(registry.is_woven("Account", None, None));
        assert!(registry.is_woven("Account", Some("balance"), None));
        assert!(registry.is_woven("Account", Some("balance"), Some(MemberKind::Property)));
        assert!(!registry.is_woven("Account", Some("balance"), Some(MemberKind::Method)));
        assert!(!registry.is_woven("Account", Some("owner"), None));
        assert!(!registry.is_woven("Ledger", None, None));
    }
}
