//! 目标类的结构描述
//!
//! 织入器的输入：类名、成员、每个成员的种类与可见性。

use crate::address::MemberKind;
use crate::error::{WeaveError, WeaveResult};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeSet;

/// 成员可见性
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Visibility {
    #[default]
    Public,
    Protected,
    Private,
}

/// 成员描述
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MemberDescriptor {
    pub name: String,
    pub kind: MemberKind,
    #[serde(default)]
    pub visibility: Visibility,
    /// 方法参数名，属性为空
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub params: Vec<String>,
    /// 属性初始值
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default: Option<Value>,
}

impl MemberDescriptor {
    pub fn method(name: impl Into<String>, params: &[&str]) -> Self {
        Self::with_kind(name, MemberKind::Method, params)
    }

    pub fn static_method(name: impl Into<String>, params: &[&str]) -> Self {
        Self::with_kind(name, MemberKind::StaticMethod, params)
    }

    pub fn property(name: impl Into<String>, default: Value) -> Self {
        Self {
            name: name.into(),
            kind: MemberKind::Property,
            visibility: Visibility::Public,
            params: Vec::new(),
            default: Some(default),
        }
    }

    fn with_kind(name: impl Into<String>, kind: MemberKind, params: &[&str]) -> Self {
        Self {
            name: name.into(),
            kind,
            visibility: Visibility::Public,
            params: params.iter().map(|p| p.to_string()).collect(),
            default: None,
        }
    }

    pub fn with_visibility(mut self, visibility: Visibility) -> Self {
        self.visibility = visibility;
        self
    }
}

/// 类描述
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassDescriptor {
    pub name: String,
    #[serde(default)]
    pub members: Vec<MemberDescriptor>,
}

impl ClassDescriptor {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            members: Vec::new(),
        }
    }

    pub fn member(mut self, member: MemberDescriptor) -> Self {
        self.members.push(member);
        self
    }

    pub fn find(&self, name: &str, kind: MemberKind) -> Option<&MemberDescriptor> {
        self.members.iter().find(|m| m.name == name && m.kind == kind)
    }

    /// 检查元数据是否可以被转换
    ///
    /// 类名与成员名必须是非空且不含空白、`/`、`@`、`#` 的标识符；
    /// (名称, 种类) 不能重复；属性不能有参数；方法不能有初始值
    pub fn validate(&self) -> WeaveResult<()> {
        if !is_valid_name(&self.name) {
            return Err(WeaveError::weaving(&self.name, "invalid class name"));
        }

        let mut seen = BTreeSet::new();
        for member in &self.members {
            if !is_valid_name(&member.name) || member.name.contains("::") {
                return Err(WeaveError::weaving(
                    &self.name,
                    format!("invalid member name '{}'", member.name),
                ));
            }
            if !seen.insert((member.name.as_str(), member.kind)) {
                return Err(WeaveError::weaving(
                    &self.name,
                    format!("duplicate {} member '{}'", member.kind, member.name),
                ));
            }
            match member.kind {
                MemberKind::Property if !member.params.is_empty() => {
                    return Err(WeaveError::weaving(
                        &self.name,
                        format!("property '{}' declares parameters", member.name),
                    ));
                }
                MemberKind::Method | MemberKind::StaticMethod if member.default.is_some() => {
                    return Err(WeaveError::weaving(
                        &self.name,
                        format!("method '{}' declares a default value", member.name),
                    ));
                }
                _ => {}
            }
        }
        Ok(())
    }
}

fn is_valid_name(name: &str) -> bool {
    !name.is_empty()
        && !name
            .chars()
            .any(|c| c.is_whitespace() || c.is_control() || matches!(c, '/' | '@' | '#' | '*'))
}
