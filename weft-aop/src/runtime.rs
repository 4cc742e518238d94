//! 运行时分派表
//!
//! 织入构件是结构化的类定义，运行时把它和宿主提供的原始行为绑定成 `WovenClass`，
//! 被拦截的成员经由通知链分派，其余成员直接调用原始行为。

use crate::address::{JoinPointAddress, MemberKind};
use crate::advice::Advisor;
use crate::artifact::WovenClassArtifact;
use crate::error::{WeaveError, WeaveResult};
use crate::joinpoint::{run_chain, JoinPoint};
use crate::registry::AdvisorRegistry;
use serde_json::Value;
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::sync::Arc;

/// 实例方法的原始实现
pub type MethodFn = Arc<dyn Fn(&mut Instance, &[Value]) -> anyhow::Result<Value> + Send + Sync>;

/// 静态方法的原始实现，没有实例上下文
pub type StaticFn = Arc<dyn Fn(&[Value]) -> anyhow::Result<Value> + Send + Sync>;

/// 宿主程序提供的原始行为
#[derive(Clone, Default)]
pub struct ClassBehavior {
    methods: HashMap<String, MethodFn>,
    statics: HashMap<String, StaticFn>,
}

impl ClassBehavior {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn method<F>(mut self, name: impl Into<String>, f: F) -> Self
    where
        F: Fn(&mut Instance, &[Value]) -> anyhow::Result<Value> + Send + Sync + 'static,
    {
        self.methods.insert(name.into(), Arc::new(f));
        self
    }

    pub fn static_method<F>(mut self, name: impl Into<String>, f: F) -> Self
    where
        F: Fn(&[Value]) -> anyhow::Result<Value> + Send + Sync + 'static,
    {
        self.statics.insert(name.into(), Arc::new(f));
        self
    }
}

impl fmt::Debug for ClassBehavior {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClassBehavior")
            .field("methods", &self.methods.keys().collect::<Vec<_>>())
            .field("statics", &self.statics.keys().collect::<Vec<_>>())
            .finish()
    }
}

/// 织入类的实例，属性保存在字段表中
#[derive(Debug, Clone, PartialEq)]
pub struct Instance {
    class: String,
    fields: BTreeMap<String, Value>,
}

impl Instance {
    pub fn class(&self) -> &str {
        &self.class
    }

    /// 直接读取字段，不经过通知
    pub fn field(&self, name: &str) -> Option<&Value> {
        self.fields.get(name)
    }

    /// 直接写入字段，不经过通知
    ///
    /// 原始方法体用它修改自身状态
    pub fn set_field(&mut self, name: impl Into<String>, value: Value) {
        self.fields.insert(name.into(), value);
    }
}

enum Original {
    Method(MethodFn),
    Static(StaticFn),
    Property,
}

struct BoundMember {
    chain: Vec<Advisor>,
    original: Original,
}

/// 绑定了原始行为的织入类
pub struct WovenClass {
    artifact: Arc<WovenClassArtifact>,
    members: HashMap<(String, MemberKind), BoundMember>,
}

impl WovenClass {
    /// 绑定构件与原始行为
    ///
    /// 每个方法都必须有实现，每个分派桩中的通知 id 都必须能在注册表中找到
    pub fn bind(
        artifact: Arc<WovenClassArtifact>,
        registry: &AdvisorRegistry,
        behavior: &ClassBehavior,
    ) -> WeaveResult<Self> {
        let class = artifact.class.as_str();
        let mut members = HashMap::with_capacity(artifact.definition.members.len());

        for member in &artifact.definition.members {
            let missing = || WeaveError::MissingBehavior {
                class: class.to_string(),
                member: member.name.clone(),
                kind: member.kind,
            };
            let original = match member.kind {
                MemberKind::Method => behavior
                    .methods
                    .get(&member.name)
                    .cloned()
                    .map(Original::Method)
                    .ok_or_else(missing)?,
                MemberKind::StaticMethod => behavior
                    .statics
                    .get(&member.name)
                    .cloned()
                    .map(Original::Static)
                    .ok_or_else(missing)?,
                MemberKind::Property => Original::Property,
            };

            let chain = match member.stub() {
                Some(stub) => stub
                    .chain
                    .iter()
                    .map(|id| {
                        registry
                            .advisor(id)
                            .cloned()
                            .ok_or_else(|| WeaveError::UnknownAdvisor(id.clone()))
                    })
                    .collect::<WeaveResult<Vec<_>>>()?,
                None => Vec::new(),
            };

            members.insert((member.name.clone(), member.kind), BoundMember { chain, original });
        }

        tracing::debug!("Bound woven class '{}' ({} member(s))", class, members.len());
        Ok(Self { artifact, members })
    }

    pub fn name(&self) -> &str {
        &self.artifact.class
    }

    pub fn artifact(&self) -> &WovenClassArtifact {
        &self.artifact
    }

    pub fn is_member_woven(&self, address: &JoinPointAddress) -> bool {
        self.artifact.is_member_woven(address)
    }

    /// 创建实例，属性取描述中的初始值
    pub fn instantiate(&self) -> Instance {
        let fields = self
            .artifact
            .definition
            .members
            .iter()
            .filter(|m| m.kind == MemberKind::Property)
            .map(|m| (m.name.clone(), m.default.clone().unwrap_or(Value::Null)))
            .collect();
        Instance {
            class: self.name().to_string(),
            fields,
        }
    }

    /// 调用实例方法
    ///
    /// 原始行为或通知的错误原样返回给调用方
    pub fn invoke(
        &self,
        instance: &mut Instance,
        method: &str,
        args: Vec<Value>,
    ) -> anyhow::Result<Value> {
        self.check_instance(instance)?;
        let bound = self.member(method, MemberKind::Method)?;
        let Original::Method(body) = &bound.original else {
            return Err(self.unknown(method, MemberKind::Method).into());
        };

        let mut join_point = JoinPoint::call(self.name(), method, MemberKind::Method, args);
        let mut original = |jp: &JoinPoint| body(&mut *instance, &jp.args);
        run_chain(&bound.chain, &mut join_point, &mut original)
    }

    /// 调用静态方法
    pub fn invoke_static(&self, method: &str, args: Vec<Value>) -> anyhow::Result<Value> {
        let bound = self.member(method, MemberKind::StaticMethod)?;
        let Original::Static(body) = &bound.original else {
            return Err(self.unknown(method, MemberKind::StaticMethod).into());
        };

        let mut join_point = JoinPoint::call(self.name(), method, MemberKind::StaticMethod, args);
        let mut original = |jp: &JoinPoint| body(&jp.args);
        run_chain(&bound.chain, &mut join_point, &mut original)
    }

    /// 读取属性，通知可以替换返回值
    pub fn get(&self, instance: &Instance, property: &str) -> anyhow::Result<Value> {
        self.check_instance(instance)?;
        let bound = self.member(property, MemberKind::Property)?;

        let mut join_point = JoinPoint::read(self.name(), property);
        let mut original = |_: &JoinPoint| {
            Ok::<_, anyhow::Error>(instance.field(property).cloned().unwrap_or(Value::Null))
        };
        run_chain(&bound.chain, &mut join_point, &mut original)
    }

    /// 写入属性
    ///
    /// 通知看到即将写入的值并可以在存储前替换它；存储发生在链的末端
    pub fn set(&self, instance: &mut Instance, property: &str, value: Value) -> anyhow::Result<()> {
        self.check_instance(instance)?;
        let bound = self.member(property, MemberKind::Property)?;

        let mut join_point = JoinPoint::write(self.name(), property, value);
        let mut original = |jp: &JoinPoint| {
            let stored = jp.incoming_value().cloned().unwrap_or(Value::Null);
            instance.set_field(property, stored.clone());
            Ok::<_, anyhow::Error>(stored)
        };
        run_chain(&bound.chain, &mut join_point, &mut original)?;
        Ok(())
    }

    fn member(&self, name: &str, kind: MemberKind) -> WeaveResult<&BoundMember> {
        self.members
            .get(&(name.to_string(), kind))
            .ok_or_else(|| self.unknown(name, kind))
    }

    fn unknown(&self, name: &str, kind: MemberKind) -> WeaveError {
        WeaveError::UnknownMember {
            class: self.name().to_string(),
            member: name.to_string(),
            kind,
        }
    }

    fn check_instance(&self, instance: &Instance) -> anyhow::Result<()> {
        if instance.class != self.name() {
            anyhow::bail!(
                "Instance of '{}' used with class '{}'",
                instance.class,
                self.name()
            );
        }
        Ok(())
    }
}

impl fmt::Debug for WovenClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WovenClass")
            .field("name", &self.name())
            .field("members", &self.members.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::advice::{Advice, LoggingAdvice};
    use crate::class::{ClassDescriptor, MemberDescriptor};
    use crate::joinpoint::Proceed;
    use crate::weaver::ProxyWeaver;
    use serde_json::json;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[derive(Debug, thiserror::Error)]
    #[error("insufficient funds: balance {balance}, requested {requested}")]
    struct InsufficientFunds {
        balance: i64,
        requested: i64,
    }

    fn account() -> ClassDescriptor {
        ClassDescriptor::new("Account")
            .member(MemberDescriptor::method("withdraw", &["amount"]))
            .member(MemberDescriptor::method("deposit", &["amount"]))
            .member(MemberDescriptor::static_method("open", &["owner"]))
            .member(MemberDescriptor::property("balance", json!(100)))
    }

    fn behavior(calls: Arc<AtomicU32>) -> ClassBehavior {
        ClassBehavior::new()
            .method("withdraw", move |this, args| {
                calls.fetch_add(1, Ordering::SeqCst);
                let balance = this.field("balance").and_then(Value::as_i64).unwrap_or(0);
                let requested = args.first().and_then(Value::as_i64).unwrap_or(0);
                if requested > balance {
                    return Err(InsufficientFunds { balance, requested }.into());
                }
                this.set_field("balance", json!(balance - requested));
                Ok(json!(balance - requested))
            })
            .method("deposit", |this, args| {
                let balance = this.field("balance").and_then(Value::as_i64).unwrap_or(0);
                let amount = args.first().and_then(Value::as_i64).unwrap_or(0);
                this.set_field("balance", json!(balance + amount));
                Ok(json!(balance + amount))
            })
            .static_method("open", |args| Ok(json!({ "owner": args[0] })))
    }

    fn bind(registry: &AdvisorRegistry, calls: Arc<AtomicU32>) -> WovenClass {
        let artifact = ProxyWeaver::new(registry).weave(&account()).unwrap();
        WovenClass::bind(Arc::new(artifact), registry, &behavior(calls)).unwrap()
    }

    fn register(
        registry: &mut AdvisorRegistry,
        pattern: &str,
        kind: MemberKind,
        id: &str,
        advice: impl Advice + 'static,
    ) {
        registry
            .register(pattern, kind, Advisor::new(id, advice), None)
            .unwrap();
    }

    #[test]
    fn test_unwoven_members_call_original() {
        let registry = AdvisorRegistry::new();
        let class = bind(&registry, Arc::new(AtomicU32::new(0)));
        let mut account = class.instantiate();

        assert_eq!(class.invoke(&mut account, "deposit", vec![json!(5)]).unwrap(), json!(105));
        assert_eq!(class.get(&account, "balance").unwrap(), json!(105));
        assert_eq!(
            class.invoke_static("open", vec![json!("ada")]).unwrap(),
            json!({ "owner": "ada" })
        );
    }

    #[test]
    fn test_error_type_survives_the_chain() {
        let mut registry = AdvisorRegistry::new();
        register(&mut registry, "Account.withdraw", MemberKind::Method, "logging", LoggingAdvice::new());
        let class = bind(&registry, Arc::new(AtomicU32::new(0)));
        let mut account = class.instantiate();

        let err = class
            .invoke(&mut account, "withdraw", vec![json!(500)])
            .unwrap_err();
        let funds = err.downcast_ref::<InsufficientFunds>().unwrap();
        assert_eq!(funds.requested, 500);
        assert_eq!(account.field("balance"), Some(&json!(100)));
    }

    struct Forgiving;

    impl Advice for Forgiving {
        fn after_throwing(&self, _jp: &JoinPoint, error: anyhow::Error) -> anyhow::Result<Value> {
            if error.is::<InsufficientFunds>() {
                return Ok(json!(0));
            }
            Err(error)
        }
    }

    #[test]
    fn test_advisor_may_suppress_error() {
        let mut registry = AdvisorRegistry::new();
        register(&mut registry, "Account.withdraw", MemberKind::Method, "forgiving", Forgiving);
        let class = bind(&registry, Arc::new(AtomicU32::new(0)));
        let mut account = class.instantiate();

        assert_eq!(
            class.invoke(&mut account, "withdraw", vec![json!(500)]).unwrap(),
            json!(0)
        );
    }

    struct ShortCircuit;

    impl Advice for ShortCircuit {
        fn around(&self, _jp: &mut JoinPoint, _proceed: &mut Proceed<'_, '_>) -> anyhow::Result<Value> {
            Ok(json!("skipped"))
        }
    }

    struct Twice;

    impl Advice for Twice {
        fn around(&self, jp: &mut JoinPoint, proceed: &mut Proceed<'_, '_>) -> anyhow::Result<Value> {
            proceed.proceed(jp)?;
            let second = proceed.proceed(jp)?;
            assert_eq!(proceed.calls(), 2);
            Ok(second)
        }
    }

    #[test]
    fn test_proceed_zero_times() {
        let mut registry = AdvisorRegistry::new();
        register(&mut registry, "Account.withdraw", MemberKind::Method, "skip", ShortCircuit);
        let calls = Arc::new(AtomicU32::new(0));
        let class = bind(&registry, Arc::clone(&calls));
        let mut account = class.instantiate();

        let result = class.invoke(&mut account, "withdraw", vec![json!(10)]).unwrap();
        assert_eq!(result, json!("skipped"));
        assert_eq!(calls.load(Ordering::SeqCst), 0);
        assert_eq!(account.field("balance"), Some(&json!(100)));
    }

    #[test]
    fn test_proceed_twice_runs_original_twice() {
        let mut registry = AdvisorRegistry::new();
        register(&mut registry, "Account.withdraw", MemberKind::Method, "twice", Twice);
        let calls = Arc::new(AtomicU32::new(0));
        let class = bind(&registry, Arc::clone(&calls));
        let mut account = class.instantiate();

        let result = class.invoke(&mut account, "withdraw", vec![json!(10)]).unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 2);
        assert_eq!(result, json!(80));
    }

    /// 写入负数时改为 0，读取时加上币种
    struct Guard;

    impl Advice for Guard {
        fn before(&self, jp: &mut JoinPoint) -> anyhow::Result<()> {
            if jp.incoming_value().and_then(Value::as_i64).is_some_and(|v| v < 0) {
                jp.replace_incoming(json!(0));
            }
            Ok(())
        }

        fn after_returning(&self, jp: &JoinPoint, value: Value) -> anyhow::Result<Value> {
            if jp.is_write() {
                return Ok(value);
            }
            Ok(json!(format!("{} EUR", value)))
        }
    }

    #[test]
    fn test_property_read_and_write_substitution() {
        let mut registry = AdvisorRegistry::new();
        register(&mut registry, "Account.balance", MemberKind::Property, "guard", Guard);
        let class = bind(&registry, Arc::new(AtomicU32::new(0)));
        let mut account = class.instantiate();

        class.set(&mut account, "balance", json!(-20)).unwrap();
        assert_eq!(account.field("balance"), Some(&json!(0)));

        class.set(&mut account, "balance", json!(42)).unwrap();
        assert_eq!(class.get(&account, "balance").unwrap(), json!("42 EUR"));
    }

    #[test]
    fn test_static_dispatch_has_no_instance() {
        let mut registry = AdvisorRegistry::new();
        register(&mut registry, "Account.open", MemberKind::StaticMethod, "skip", ShortCircuit);
        let class = bind(&registry, Arc::new(AtomicU32::new(0)));

        assert_eq!(class.invoke_static("open", vec![json!("ada")]).unwrap(), json!("skipped"));
        let err = class.invoke_static("withdraw", vec![]).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<WeaveError>(),
            Some(WeaveError::UnknownMember { .. })
        ));
    }

    #[test]
    fn test_bind_requires_behavior_and_advisors() {
        let registry = AdvisorRegistry::new();
        let artifact = Arc::new(ProxyWeaver::new(&registry).weave(&account()).unwrap());
        let partial = ClassBehavior::new().method("withdraw", |_, _| Ok(Value::Null));
        assert!(matches!(
            WovenClass::bind(Arc::clone(&artifact), &registry, &partial),
            Err(WeaveError::MissingBehavior { .. })
        ));

        let mut with_advice = AdvisorRegistry::new();
        register(&mut with_advice, "Account.*", MemberKind::Method, "logging", LoggingAdvice::new());
        let woven = Arc::new(ProxyWeaver::new(&with_advice).weave(&account()).unwrap());
        let calls = Arc::new(AtomicU32::new(0));
        assert!(matches!(
            WovenClass::bind(woven, &registry, &behavior(calls)),
            Err(WeaveError::UnknownAdvisor(ref id)) if id == "logging"
        ));
    }
}
