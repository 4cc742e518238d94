//! 连接点地址
//!
//! 一个不可变的标识，指向单个可拦截的位置：类、成员名、成员种类，
//! 以及可选的通知 id 和序号。外部检查工具通过它询问
//! “这个成员是否被织入”或“这个通知是否恰好挂在这个位置”。

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// 成员种类
///
/// 静态方法与实例方法分开寻址，同名时也能区分
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum MemberKind {
    Method,
    StaticMethod,
    Property,
}

impl MemberKind {
    /// 线上格式中的标签
    pub fn tag(&self) -> &'static str {
        match self {
            MemberKind::Method => "method",
            MemberKind::StaticMethod => "staticMethod",
            MemberKind::Property => "property",
        }
    }

    /// 分派时是否需要实例上下文
    pub fn needs_instance(&self) -> bool {
        !matches!(self, MemberKind::StaticMethod)
    }
}

impl fmt::Display for MemberKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.tag())
    }
}

impl FromStr for MemberKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "method" => Ok(MemberKind::Method),
            "staticMethod" | "static" => Ok(MemberKind::StaticMethod),
            "property" => Ok(MemberKind::Property),
            _ => Err(format!("Invalid member kind: {}", s)),
        }
    }
}

/// 连接点地址
///
/// 文本形式：`Class::member/kind[@advisor][#index]`，
/// 线上格式：五元组 `[class, member, kind, advisor|null, index|null]`
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(from = "WireAddress", into = "WireAddress")]
pub struct JoinPointAddress {
    pub class: String,
    pub member: String,
    pub kind: MemberKind,
    pub advisor_id: Option<String>,
    pub index: Option<u32>,
}

impl JoinPointAddress {
    pub fn new(class: impl Into<String>, member: impl Into<String>, kind: MemberKind) -> Self {
        Self {
            class: class.into(),
            member: member.into(),
            kind,
            advisor_id: None,
            index: None,
        }
    }

    pub fn method(class: impl Into<String>, member: impl Into<String>) -> Self {
        Self::new(class, member, MemberKind::Method)
    }

    pub fn static_method(class: impl Into<String>, member: impl Into<String>) -> Self {
        Self::new(class, member, MemberKind::StaticMethod)
    }

    pub fn property(class: impl Into<String>, member: impl Into<String>) -> Self {
        Self::new(class, member, MemberKind::Property)
    }

    /// 限定通知 id
    pub fn with_advisor(mut self, advisor_id: impl Into<String>) -> Self {
        self.advisor_id = Some(advisor_id.into());
        self
    }

    /// 限定序号
    pub fn at_index(mut self, index: u32) -> Self {
        self.index = Some(index);
        self
    }

    /// 去掉通知与序号，只保留连接点本身
    pub fn join_point(&self) -> JoinPointAddress {
        JoinPointAddress::new(self.class.clone(), self.member.clone(), self.kind)
    }

    /// `Class::member` 形式的签名
    pub fn signature(&self) -> String {
        format!("{}::{}", self.class, self.member)
    }
}

impl fmt::Display for JoinPointAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}::{}/{}", self.class, self.member, self.kind)?;
        if let Some(advisor) = &self.advisor_id {
            write!(f, "@{}", advisor)?;
        }
        if let Some(index) = self.index {
            write!(f, "#{}", index)?;
        }
        Ok(())
    }
}

impl FromStr for JoinPointAddress {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || format!("Invalid join point address '{}'", s);

        let (rest, index) = match s.rsplit_once('#') {
            Some((rest, idx)) => (rest, Some(idx.parse::<u32>().map_err(|_| invalid())?)),
            None => (s, None),
        };
        let (rest, advisor_id) = match rest.rsplit_once('@') {
            Some((rest, advisor)) if !advisor.is_empty() => (rest, Some(advisor.to_string())),
            Some(_) => return Err(invalid()),
            None => (rest, None),
        };
        let (target, kind) = rest.rsplit_once('/').ok_or_else(invalid)?;
        let kind = kind.parse::<MemberKind>()?;
        let (class, member) = target.rsplit_once("::").ok_or_else(invalid)?;
        if class.is_empty() || member.is_empty() {
            return Err(invalid());
        }

        Ok(Self {
            class: class.to_string(),
            member: member.to_string(),
            kind,
            advisor_id,
            index,
        })
    }
}

#[derive(Serialize, Deserialize)]
struct WireAddress(String, String, MemberKind, Option<String>, Option<u32>);

impl From<WireAddress> for JoinPointAddress {
    fn from(w: WireAddress) -> Self {
        Self {
            class: w.0,
            member: w.1,
            kind: w.2,
            advisor_id: w.3,
            index: w.4,
        }
    }
}

impl From<JoinPointAddress> for WireAddress {
    fn from(a: JoinPointAddress) -> Self {
        WireAddress(a.class, a.member, a.kind, a.advisor_id, a.index)
    }
}
