//! Aspect 宏实现

use proc_macro2::TokenStream;
use quote::quote;
use syn::{DeriveInput, Error, LitInt, LitStr, Result};

const KINDS: [&str; 4] = ["method", "staticMethod", "static", "property"];

/// 一个 `#[advise(...)]` 属性
struct Advise {
    pointcut: LitStr,
    kind: String,
    index: Option<u32>,
    id: Option<String>,
}

pub fn impl_aspect_derive(input: &DeriveInput) -> Result<TokenStream> {
    let name = &input.ident;

    if !input.generics.params.is_empty() {
        return Err(Error::new_spanned(
            &input.generics,
            "#[derive(Aspect)] does not support generic types",
        ));
    }

    let advises = extract_advise_attrs(input)?;
    if advises.is_empty() {
        return Err(Error::new_spanned(
            input,
            "#[derive(Aspect)] requires at least one #[advise(pointcut = \"Class.member\")] attribute",
        ));
    }

    let default_id = name.to_string();
    let submissions = advises.iter().map(|advise| {
        let id = advise.id.clone().unwrap_or_else(|| default_id.clone());
        let pointcut = &advise.pointcut;
        let kind = &advise.kind;
        let index = match advise.index {
            Some(index) => quote! { ::core::option::Option::Some(#index) },
            None => quote! { ::core::option::Option::None },
        };

        quote! {
            weft_aop::inventory::submit! {
                weft_aop::AdvisorDeclaration::new(
                    #id,
                    #pointcut,
                    #kind,
                    #index,
                    || ::std::sync::Arc::new(<#name as ::core::default::Default>::default())
                        as ::std::sync::Arc<dyn weft_aop::Advice>
                )
            }
        }
    });

    Ok(quote! {
        #(#submissions)*
    })
}

fn extract_advise_attrs(input: &DeriveInput) -> Result<Vec<Advise>> {
    let mut advises = Vec::new();

    for attr in &input.attrs {
        if !attr.path().is_ident("advise") {
            continue;
        }

        let mut pointcut: Option<LitStr> = None;
        let mut kind = "method".to_string();
        let mut index = None;
        let mut id = None;

        attr.parse_nested_meta(|meta| {
            if meta.path.is_ident("pointcut") {
                let value: LitStr = meta.value()?.parse()?;
                if !value.value().contains('.') {
                    return Err(meta.error("pointcut must be written as \"Class.member\""));
                }
                pointcut = Some(value);
            } else if meta.path.is_ident("kind") {
                let value: LitStr = meta.value()?.parse()?;
                if !KINDS.contains(&value.value().as_str()) {
                    return Err(meta.error(format!(
                        "unknown member kind '{}', expected one of: method, staticMethod, property",
                        value.value()
                    )));
                }
                kind = value.value();
            } else if meta.path.is_ident("index") {
                let value: LitInt = meta.value()?.parse()?;
                index = Some(value.base10_parse::<u32>()?);
            } else if meta.path.is_ident("id") {
                let value: LitStr = meta.value()?.parse()?;
                let raw = value.value();
                if raw.is_empty() {
                    return Err(meta.error("advisor id must not be empty"));
                }
                // 与连接点地址 `Class::member/kind@advisor#index` 的分隔符冲突
                if raw.chars().any(|c| c == '@' || c == '#' || c.is_whitespace()) {
                    return Err(meta.error(format!(
                        "advisor id '{}' must not contain '@', '#' or whitespace",
                        raw
                    )));
                }
                id = Some(value.value());
            } else {
                return Err(meta.error("expected `pointcut`, `kind`, `index` or `id`"));
            }
            Ok(())
        })?;

        let pointcut = pointcut.ok_or_else(|| {
            Error::new_spanned(attr, "#[advise] requires `pointcut = \"Class.member\"`")
        })?;

        advises.push(Advise {
            pointcut,
            kind,
            index,
            id,
        });
    }

    Ok(advises)
}
