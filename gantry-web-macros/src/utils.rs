//! 宏辅助工具函数

use syn::{Attribute, Expr, LitStr, Meta};

/// 可选的字符串参数：`#[name]` 或 `#[name("value")]`
pub fn optional_string(attr: &Attribute) -> syn::Result<Option<String>> {
    match &attr.meta {
        Meta::Path(_) => Ok(None),
        Meta::List(_) => Ok(Some(attr.parse_args::<LitStr>()?.value())),
        Meta::NameValue(_) => Err(syn::Error::new_spanned(
            attr,
            "expected #[name] or #[name(\"value\")]",
        )),
    }
}

/// 必需的字符串参数：`#[name("value")]`
pub fn required_string(attr: &Attribute) -> syn::Result<String> {
    optional_string(attr)?.ok_or_else(|| {
        syn::Error::new_spanned(attr, "expected a string argument, e.g. #[name(\"value\")]")
    })
}

/// 表达式参数：`#[name(expr)]`
pub fn expression(attr: &Attribute) -> syn::Result<Expr> {
    attr.parse_args::<Expr>()
}

/// 属性名（单个标识符）
pub fn attr_name(attr: &Attribute) -> Option<String> {
    attr.path().get_ident().map(|ident| ident.to_string())
}

/// 合并多个错误
pub fn combine(errors: Vec<syn::Error>) -> Option<syn::Error> {
    errors.into_iter().reduce(|mut all, error| {
        all.combine(error);
        all
    })
}
