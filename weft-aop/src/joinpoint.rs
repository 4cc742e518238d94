//! 连接点（JoinPoint）定义
//!
//! 连接点表示被拦截的一次调用：方法调用、静态方法调用或属性读写

use crate::address::{JoinPointAddress, MemberKind};
use crate::advice::Advisor;
use serde_json::Value;
use std::fmt;
use std::time::Instant;

/// 属性访问方向
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Access {
    Read,
    Write,
}

/// 连接点信息
///
/// 通知可以修改参数；对属性写入而言 `args[0]` 就是即将写入的值
#[derive(Clone)]
pub struct JoinPoint {
    /// 目标类名称
    pub target_type: String,

    /// 成员名称
    pub member: String,

    /// 成员种类
    pub kind: MemberKind,

    /// 调用参数
    pub args: Vec<Value>,

    /// 属性访问方向，非属性成员为 None
    pub access: Option<Access>,

    /// 调用时间戳
    pub timestamp: Instant,
}

impl JoinPoint {
    /// 方法或静态方法调用
    pub fn call(
        target_type: impl Into<String>,
        member: impl Into<String>,
        kind: MemberKind,
        args: Vec<Value>,
    ) -> Self {
        Self {
            target_type: target_type.into(),
            member: member.into(),
            kind,
            args,
            access: None,
            timestamp: Instant::now(),
        }
    }

    /// 属性读取
    pub fn read(target_type: impl Into<String>, property: impl Into<String>) -> Self {
        Self {
            target_type: target_type.into(),
            member: property.into(),
            kind: MemberKind::Property,
            args: Vec::new(),
            access: Some(Access::Read),
            timestamp: Instant::now(),
        }
    }

    /// 属性写入
    pub fn write(target_type: impl Into<String>, property: impl Into<String>, value: Value) -> Self {
        Self {
            target_type: target_type.into(),
            member: property.into(),
            kind: MemberKind::Property,
            args: vec![value],
            access: Some(Access::Write),
            timestamp: Instant::now(),
        }
    }

    /// 获取完整签名
    pub fn signature(&self) -> String {
        format!("{}::{}", self.target_type, self.member)
    }

    /// 对应的连接点地址
    pub fn address(&self) -> JoinPointAddress {
        JoinPointAddress::new(self.target_type.clone(), self.member.clone(), self.kind)
    }

    pub fn arg(&self, index: usize) -> Option<&Value> {
        self.args.get(index)
    }

    pub fn is_write(&self) -> bool {
        self.access == Some(Access::Write)
    }

    /// 属性写入时即将存储的值
    pub fn incoming_value(&self) -> Option<&Value> {
        if self.is_write() {
            self.args.first()
        } else {
            None
        }
    }

    /// 替换即将写入的值，非写入访问时返回 false
    pub fn replace_incoming(&mut self, value: Value) -> bool {
        if !self.is_write() {
            return false;
        }
        match self.args.first_mut() {
            Some(slot) => {
                *slot = value;
                true
            }
            None => false,
        }
    }
}

impl fmt::Debug for JoinPoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("JoinPoint")
            .field("signature", &self.signature())
            .field("kind", &self.kind)
            .field("access", &self.access)
            .field("args", &self.args)
            .finish()
    }
}

impl fmt::Display for JoinPoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.signature())
    }
}

/// 原始行为
pub type Original<'f> = dyn FnMut(&JoinPoint) -> anyhow::Result<Value> + 'f;

/// 环绕通知的继续执行句柄
///
/// 代表通知链的剩余部分加上原始行为。可以调用零次、一次或多次：
/// 每次调用都会针对连接点的当前状态重新执行剩余的链和原始行为。
pub struct Proceed<'a, 'f> {
    chain: &'a [Advisor],
    original: &'a mut Original<'f>,
    calls: u32,
}

impl<'a, 'f> Proceed<'a, 'f> {
    pub(crate) fn new(chain: &'a [Advisor], original: &'a mut Original<'f>) -> Self {
        Self {
            chain,
            original,
            calls: 0,
        }
    }

    /// 继续执行剩余的通知链和原始行为
    pub fn proceed(&mut self, join_point: &mut JoinPoint) -> anyhow::Result<Value> {
        self.calls += 1;
        match self.chain.split_first() {
            Some((head, rest)) => {
                tracing::trace!("→ advisor '{}' on {}", head.id(), join_point.signature());
                let mut next = Proceed::new(rest, &mut *self.original);
                head.advice().around(join_point, &mut next)
            }
            None => (self.original)(&*join_point),
        }
    }

    /// 本句柄已被调用的次数
    pub fn calls(&self) -> u32 {
        self.calls
    }

    /// 剩余通知的 id
    pub fn remaining(&self) -> impl Iterator<Item = &str> {
        self.chain.iter().map(|a| a.id())
    }
}

impl fmt::Debug for Proceed<'_, '_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Proceed")
            .field("remaining", &self.remaining().collect::<Vec<_>>())
            .field("calls", &self.calls)
            .finish()
    }
}

/// 执行整条通知链
pub(crate) fn run_chain(
    chain: &[Advisor],
    join_point: &mut JoinPoint,
    original: &mut Original<'_>,
) -> anyhow::Result<Value> {
    Proceed::new(chain, original).proceed(join_point)
}
