//! 通知（Advice）定义
//!
//! 定义了在连接点执行的各种动作

use crate::joinpoint::{JoinPoint, Proceed};
use serde_json::Value;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

/// 通知 Trait
///
/// 每个钩子都有默认实现，只需覆盖关心的部分。
/// 默认的 `around` 按 before → proceed → after_returning / after_throwing → after 的顺序组合其它钩子。
pub trait Advice: Send + Sync {
    /// 前置通知，可以修改参数；返回错误时直接传给调用方，不再执行目标
    fn before(&self, _join_point: &mut JoinPoint) -> anyhow::Result<()> {
        Ok(())
    }

    /// 返回后通知，可以替换返回值
    fn after_returning(&self, _join_point: &JoinPoint, value: Value) -> anyhow::Result<Value> {
        Ok(value)
    }

    /// 异常通知
    ///
    /// 默认原样重新抛出。覆盖此方法可以有意地吞掉或替换错误
    fn after_throwing(&self, _join_point: &JoinPoint, error: anyhow::Error) -> anyhow::Result<Value> {
        Err(error)
    }

    /// 后置通知（无论成功还是失败都执行）
    fn after(&self, _join_point: &JoinPoint) {}

    /// 环绕通知
    ///
    /// `proceed` 可以调用零次、一次或多次
    fn around(&self, join_point: &mut JoinPoint, proceed: &mut Proceed<'_, '_>) -> anyhow::Result<Value> {
        self.before(join_point)?;
        let outcome = match proceed.proceed(join_point) {
            Ok(value) => self.after_returning(join_point, value),
            Err(error) => self.after_throwing(join_point, error),
        };
        self.after(join_point);
        outcome
    }
}

/// 已注册的通知：稳定的 id 加上行为
#[derive(Clone)]
pub struct Advisor {
    id: Arc<str>,
    advice: Arc<dyn Advice>,
}

impl Advisor {
    pub fn new(id: impl AsRef<str>, advice: impl Advice + 'static) -> Self {
        Self::from_arc(id, Arc::new(advice))
    }

    pub fn from_arc(id: impl AsRef<str>, advice: Arc<dyn Advice>) -> Self {
        Self {
            id: Arc::from(id.as_ref()),
            advice,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn advice(&self) -> &dyn Advice {
        self.advice.as_ref()
    }

    /// 两个 Advisor 是否共享同一个通知实例
    pub fn same_advice(&self, other: &Advisor) -> bool {
        Arc::ptr_eq(&self.advice, &other.advice)
    }
}

impl fmt::Debug for Advisor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Advisor").field("id", &self.id).finish()
    }
}

// ============================================================================
// 预定义的常用通知
// ============================================================================

/// 日志通知 - 记录成员调用
#[derive(Debug, Default)]
pub struct LoggingAdvice {
    log_args: bool,
}

impl LoggingAdvice {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_args(mut self) -> Self {
        self.log_args = true;
        self
    }
}

impl Advice for LoggingAdvice {
    fn before(&self, join_point: &mut JoinPoint) -> anyhow::Result<()> {
        if self.log_args {
            tracing::info!("→ Entering: {} {:?}", join_point.signature(), join_point.args);
        } else {
            tracing::info!("→ Entering: {}", join_point.signature());
        }
        Ok(())
    }

    fn after_throwing(&self, join_point: &JoinPoint, error: anyhow::Error) -> anyhow::Result<Value> {
        tracing::error!("❌ Error in {}: {:#}", join_point.signature(), error);
        Err(error)
    }

    fn after(&self, join_point: &JoinPoint) {
        tracing::info!(
            "← Exiting: {} (took {:?})",
            join_point.signature(),
            join_point.timestamp.elapsed()
        );
    }
}

/// 性能监控通知
#[derive(Debug)]
pub struct TimingAdvice {
    threshold: Duration,
}

impl TimingAdvice {
    pub fn new(threshold: Duration) -> Self {
        Self { threshold }
    }

    /// 耗时是否超过阈值
    pub fn is_slow(&self, elapsed: Duration) -> bool {
        elapsed > self.threshold
    }
}

impl Advice for TimingAdvice {
    fn after(&self, join_point: &JoinPoint) {
        let elapsed = join_point.timestamp.elapsed();
        if self.is_slow(elapsed) {
            tracing::warn!(
                "⚠️ Slow member detected: {} took {:?} (threshold: {:?})",
                join_point.signature(),
                elapsed,
                self.threshold
            );
        }
    }
}
