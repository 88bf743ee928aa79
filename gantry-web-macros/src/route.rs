//! 方法/参数属性解析

use proc_macro2::TokenStream;
use quote::quote;
use syn::{Attribute, Expr, GenericArgument, PathArguments, Type};

use crate::utils::{attr_name, expression, optional_string, required_string};

/// 方法上可用的属性
pub const METHOD_ATTRIBUTES: &[&str] = &[
    "get_mapping",
    "post_mapping",
    "put_mapping",
    "delete_mapping",
    "patch_mapping",
    "requires_role",
    "json",
    "content_body",
    "send_redirect",
    "returns_mapped_by",
];

/// 参数上可用的属性
pub const PARAMETER_ATTRIBUTES: &[&str] = &[
    "path_param",
    "request_param",
    "http_header",
    "cookie",
    "cookie_cell",
    "json_body",
    "request_body",
    "mapped_by",
];

/// 返回值映射方式
pub enum ReturnKind {
    /// 按类型查默认映射表
    Registry,
    Json,
    ContentBody(Option<String>),
    SendRedirect,
    Custom(Expr),
}

/// 一个路由方法的属性
pub struct RouteAttrs {
    pub http_method: &'static str,
    pub path: String,
    pub role: Option<String>,
    pub returns: ReturnKind,
}

/// 解析方法属性；没有 `*_mapping` 的方法返回 `None`
pub fn parse_route_attrs(attrs: &[Attribute]) -> syn::Result<Option<RouteAttrs>> {
    let mut route: Option<(&'static str, String)> = None;
    let mut role = None;
    let mut returns: Option<ReturnKind> = None;

    for attr in attrs {
        let Some(name) = attr_name(attr) else { continue };

        let http_method = match name.as_str() {
            "get_mapping" => Some("GET"),
            "post_mapping" => Some("POST"),
            "put_mapping" => Some("PUT"),
            "delete_mapping" => Some("DELETE"),
            "patch_mapping" => Some("PATCH"),
            _ => None,
        };
        if let Some(http_method) = http_method {
            if route.is_some() {
                return Err(syn::Error::new_spanned(
                    attr,
                    "only one HTTP method mapping is allowed",
                ));
            }
            let path = optional_string(attr)?.unwrap_or_else(|| "/".to_string());
            route = Some((http_method, path));
            continue;
        }

        let kind = match name.as_str() {
            "requires_role" => {
                role = Some(required_string(attr)?);
                continue;
            }
            "json" => ReturnKind::Json,
            "content_body" => ReturnKind::ContentBody(optional_string(attr)?),
            "send_redirect" => ReturnKind::SendRedirect,
            "returns_mapped_by" => ReturnKind::Custom(expression(attr)?),
            _ => continue,
        };
        if returns.is_some() {
            return Err(syn::Error::new_spanned(attr, "only one return mapping is allowed"));
        }
        returns = Some(kind);
    }

    let Some((http_method, path)) = route else {
        if let Some(attr) = attrs
            .iter()
            .find(|attr| attr_name(attr).is_some_and(|n| METHOD_ATTRIBUTES.contains(&n.as_str())))
        {
            return Err(syn::Error::new_spanned(
                attr,
                "requires an HTTP method mapping such as #[get_mapping(\"/path\")]",
            ));
        }
        return Ok(None);
    };

    Ok(Some(RouteAttrs {
        http_method,
        path,
        role,
        returns: returns.unwrap_or(ReturnKind::Registry),
    }))
}

/// 参数映射方式
pub enum ParameterKind {
    Registry,
    PathParam(String),
    RequestParam(String),
    HttpHeader(String),
    Cookie(String),
    CookieCell(String),
    JsonBody,
    RequestBody,
    Custom(Expr),
}

/// 解析参数属性；`ident` 为参数名，用作默认名称
pub fn parse_parameter_attrs(
    attrs: &[Attribute],
    ident: Option<String>,
) -> syn::Result<ParameterKind> {
    let mut kind: Option<ParameterKind> = None;

    for attr in attrs {
        let Some(name) = attr_name(attr) else { continue };
        if !PARAMETER_ATTRIBUTES.contains(&name.as_str()) {
            continue;
        }
        if kind.is_some() {
            return Err(syn::Error::new_spanned(attr, "only one parameter mapping is allowed"));
        }

        let named = |default: Option<String>| -> syn::Result<String> {
            optional_string(attr)?.or(default).ok_or_else(|| {
                syn::Error::new_spanned(attr, "a name is required when the parameter is a pattern")
            })
        };

        kind = Some(match name.as_str() {
            "path_param" => ParameterKind::PathParam(named(ident.clone())?),
            "request_param" => ParameterKind::RequestParam(named(ident.clone())?),
            "http_header" => {
                ParameterKind::HttpHeader(named(ident.as_ref().map(|i| i.replace('_', "-")))?)
            }
            "cookie" => ParameterKind::Cookie(named(ident.clone())?),
            "cookie_cell" => ParameterKind::CookieCell(named(ident.clone())?),
            "json_body" => ParameterKind::JsonBody,
            "request_body" => ParameterKind::RequestBody,
            _ => ParameterKind::Custom(expression(attr)?),
        });
    }

    Ok(kind.unwrap_or(ParameterKind::Registry))
}

/// 生成 `ParameterSpec` 表达式
pub fn parameter_spec(kind: &ParameterKind, ty: &Type) -> TokenStream {
    let mapping = quote!(::gantry_core::mapping);
    let mapped_by = match kind {
        ParameterKind::Registry => None,
        ParameterKind::PathParam(name) => Some(quote!(#mapping::PathParam::<#ty>::new(#name))),
        ParameterKind::RequestParam(name) => {
            Some(quote!(#mapping::RequestParam::<#ty>::new(#name)))
        }
        ParameterKind::HttpHeader(name) => Some(quote!(#mapping::HttpHeader::<#ty>::new(#name))),
        ParameterKind::Cookie(name) => Some(quote!(#mapping::Cookie::<#ty>::new(#name))),
        ParameterKind::CookieCell(name) => Some(quote!(#mapping::CookieCellMapping::new(#name))),
        ParameterKind::JsonBody => Some(quote!(#mapping::JsonBody::<#ty>::new())),
        ParameterKind::RequestBody => Some(quote!(#mapping::RequestBody)),
        ParameterKind::Custom(expr) => Some(quote!(#expr)),
    };

    match mapped_by {
        Some(mapped_by) => quote!(#mapping::ParameterSpec::of::<#ty>().mapped_by(#mapped_by)),
        None => quote!(#mapping::ParameterSpec::of::<#ty>()),
    }
}

/// 生成 `ReturnSpec` 表达式
pub fn return_spec(kind: &ReturnKind, ty: &TokenStream) -> TokenStream {
    let mapping = quote!(::gantry_core::mapping);
    let mapped_by = match kind {
        ReturnKind::Registry => None,
        ReturnKind::Json => Some(quote!(#mapping::Json::<#ty>::new())),
        ReturnKind::ContentBody(None) => Some(quote!(#mapping::ContentBody::<#ty>::new())),
        ReturnKind::ContentBody(Some(content_type)) => {
            Some(quote!(#mapping::ContentBody::<#ty>::with_content_type(#content_type)))
        }
        ReturnKind::SendRedirect => Some(quote!(#mapping::SendRedirect::<#ty>::new())),
        ReturnKind::Custom(expr) => Some(quote!(#expr)),
    };

    match mapped_by {
        Some(mapped_by) => quote!(#mapping::ReturnSpec::of::<#ty>().mapped_by(#mapped_by)),
        None => quote!(#mapping::ReturnSpec::of::<#ty>()),
    }
}

/// `Result<T, E>` / `Result<T>` 返回 `T`
pub fn result_ok_type(ty: &Type) -> Option<&Type> {
    let Type::Path(path) = ty else { return None };
    let last = path.path.segments.last()?;
    if last.ident != "Result" {
        return None;
    }
    let PathArguments::AngleBracketed(args) = &last.arguments else {
        return None;
    };
    args.args.iter().find_map(|arg| match arg {
        GenericArgument::Type(ty) => Some(ty),
        _ => None,
    })
}

/// 去掉宏自身的属性
pub fn strip_attrs(attrs: &mut Vec<Attribute>, names: &[&str]) {
    attrs.retain(|attr| !attr_name(attr).is_some_and(|name| names.contains(&name.as_str())));
}
