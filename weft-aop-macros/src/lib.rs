//! Weft AOP 过程宏
//!
//! - `#[derive(Aspect)]` 配合一个或多个 `#[advise(...)]` 属性声明通知

extern crate proc_macro;

use proc_macro::TokenStream;
use syn::{parse_macro_input, DeriveInput};

mod aspect;

/// `#[derive(Aspect)]` 宏
///
/// 为每个 `#[advise(...)]` 属性向 inventory 提交一条通知声明，
/// 由 `AdvisorRegistry::from_declarations()` 在启动时统一注册。
/// 结构体需要实现 `Default` 和 `weft_aop::Advice`，同一结构体的所有声明共享一个实例。
///
/// 属性参数：
/// - `pointcut = "Class.member"`（必填）
/// - `kind = "method" | "staticMethod" | "property"`，默认 `method`
/// - `index = 0`，省略时追加到已有通知之后
/// - `id = "..."`，默认为结构体名
///
/// 使用示例：
/// ```ignore
/// use weft_aop::prelude::*;
/// use weft_aop_macros::Aspect;
///
/// #[derive(Default, Aspect)]
/// #[advise(pointcut = "Account.withdraw", index = 0, id = "audit")]
/// #[advise(pointcut = "Account.balance", kind = "property", id = "audit")]
/// pub struct AuditAspect;
///
/// impl Advice for AuditAspect {
///     fn before(&self, jp: &mut JoinPoint) -> anyhow::Result<()> {
///         tracing::info!("audit {}", jp.signature());
///         Ok(())
///     }
/// }
/// ```
#[proc_macro_derive(Aspect, attributes(advise))]
pub fn derive_aspect(input: TokenStream) -> TokenStream {
    let input = parse_macro_input!(input as DeriveInput);
    aspect::impl_aspect_derive(&input)
        .unwrap_or_else(|err| err.to_compile_error())
        .into()
}
