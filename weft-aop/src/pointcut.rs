//! 切点（Pointcut）模式
//!
//! 只实现寻址所需的最小形式：`类模式.成员模式`，`*` 匹配任意字符序列。
//! 在最后一个 `.` 处拆分，因此带点的类名（如 `bank.ledger.Account.withdraw`）同样可用。

use crate::error::{WeaveError, WeaveResult};
use regex::Regex;
use std::fmt;

/// 单段通配符模式
#[derive(Clone)]
struct Glob {
    pattern: String,
    regex: Regex,
}

impl Glob {
    fn compile(pattern: &str, full: &str) -> WeaveResult<Self> {
        if pattern.is_empty() {
            return Err(WeaveError::InvalidPattern {
                pattern: full.to_string(),
                reason: "empty segment".to_string(),
            });
        }
        if pattern.chars().any(char::is_whitespace) {
            return Err(WeaveError::InvalidPattern {
                pattern: full.to_string(),
                reason: "whitespace is not allowed".to_string(),
            });
        }

        let body = pattern
            .split('*')
            .map(regex::escape)
            .collect::<Vec<_>>()
            .join(".*");
        let regex = Regex::new(&format!("^{}$", body)).map_err(|e| WeaveError::InvalidPattern {
            pattern: full.to_string(),
            reason: e.to_string(),
        })?;

        Ok(Self {
            pattern: pattern.to_string(),
            regex,
        })
    }

    fn is_match(&self, target: &str) -> bool {
        self.regex.is_match(target)
    }

    fn is_literal(&self) -> bool {
        !self.pattern.contains('*')
    }

    /// 是否存在同时匹配两个模式的字符串
    fn intersects(&self, other: &Glob) -> bool {
        let a: Vec<char> = self.pattern.chars().collect();
        let b: Vec<char> = other.pattern.chars().collect();
        let mut memo = vec![None; (a.len() + 1) * (b.len() + 1)];
        glob_intersect(&a, &b, 0, 0, &mut memo)
    }
}

fn glob_intersect(a: &[char], b: &[char], i: usize, j: usize, memo: &mut [Option<bool>]) -> bool {
    let slot = i * (b.len() + 1) + j;
    if let Some(known) = memo[slot] {
        return known;
    }

    let a_star = i < a.len() && a[i] == '*';
    let b_star = j < b.len() && b[j] == '*';

    let result = if i == a.len() && j == b.len() {
        true
    } else if a_star
        && (glob_intersect(a, b, i + 1, j, memo)
            || (j < b.len() && glob_intersect(a, b, i, j + 1, memo)))
    {
        true
    } else if b_star
        && (glob_intersect(a, b, i, j + 1, memo)
            || (i < a.len() && glob_intersect(a, b, i + 1, j, memo)))
    {
        true
    } else if i < a.len() && j < b.len() && !a_star && !b_star && a[i] == b[j] {
        glob_intersect(a, b, i + 1, j + 1, memo)
    } else {
        false
    };

    memo[slot] = Some(result);
    result
}

/// 切点：类模式 + 成员模式
#[derive(Clone)]
pub struct Pointcut {
    class: Glob,
    member: Glob,
}

impl Pointcut {
    /// 解析 `Class.member` 形式的表达式
    pub fn parse(expression: &str) -> WeaveResult<Self> {
        let (class, member) =
            expression
                .rsplit_once('.')
                .ok_or_else(|| WeaveError::InvalidPattern {
                    pattern: expression.to_string(),
                    reason: "expected 'Class.member'".to_string(),
                })?;
        Ok(Self {
            class: Glob::compile(class, expression)?,
            member: Glob::compile(member, expression)?,
        })
    }

    pub fn new(class_pattern: &str, member_pattern: &str) -> WeaveResult<Self> {
        let full = format!("{}.{}", class_pattern, member_pattern);
        Ok(Self {
            class: Glob::compile(class_pattern, &full)?,
            member: Glob::compile(member_pattern, &full)?,
        })
    }

    /// 精确匹配一个成员
    pub fn exact(class: &str, member: &str) -> WeaveResult<Self> {
        if class.contains('*') || member.contains('*') {
            return Err(WeaveError::InvalidPattern {
                pattern: format!("{}.{}", class, member),
                reason: "exact pointcut cannot contain '*'".to_string(),
            });
        }
        Self::new(class, member)
    }

    pub fn matches(&self, class: &str, member: &str) -> bool {
        self.class.is_match(class) && self.member.is_match(member)
    }

    pub fn matches_class(&self, class: &str) -> bool {
        self.class.is_match(class)
    }

    /// 两个切点是否可能命中同一个（类，成员）
    pub fn overlaps(&self, other: &Pointcut) -> bool {
        self.class.intersects(&other.class) && self.member.intersects(&other.member)
    }

    /// 是否不含通配符
    pub fn is_exact(&self) -> bool {
        self.class.is_literal() && self.member.is_literal()
    }

    pub fn class_pattern(&self) -> &str {
        &self.class.pattern
    }

    pub fn member_pattern(&self) -> &str {
        &self.member.pattern
    }
}

impl fmt::Display for Pointcut {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.class.pattern, self.member.pattern)
    }
}

impl fmt::Debug for Pointcut {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Pointcut({})", self)
    }
}
