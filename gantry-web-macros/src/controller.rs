//! `#[controller]` 宏实现

use proc_macro::TokenStream;
use proc_macro2::Span;
use quote::{format_ident, quote};
use syn::{
    parse_macro_input, FnArg, ImplItem, ImplItemFn, ItemImpl, LitStr, Pat, ReturnType, Type,
};

use crate::route::{
    parse_parameter_attrs, parse_route_attrs, parameter_spec, result_ok_type, return_spec,
    strip_attrs, METHOD_ATTRIBUTES, PARAMETER_ATTRIBUTES,
};
use crate::utils::combine;

pub fn controller_impl(attr: TokenStream, item: TokenStream) -> TokenStream {
    let base_path = if attr.is_empty() {
        String::new()
    } else {
        parse_macro_input!(attr as LitStr).value()
    };
    let mut input = parse_macro_input!(item as ItemImpl);

    match expand(&base_path, &mut input) {
        Ok(expanded) => expanded.into(),
        Err(error) => {
            // 保留原始 impl，避免额外的 "方法不存在" 错误
            for item in &mut input.items {
                if let ImplItem::Fn(method) = item {
                    strip_method(method);
                }
            }
            let error = error.to_compile_error();
            quote!(#input #error).into()
        }
    }
}

fn expand(base_path: &str, input: &mut ItemImpl) -> syn::Result<proc_macro2::TokenStream> {
    if input.trait_.is_some() {
        return Err(syn::Error::new_spanned(
            &input.self_ty,
            "#[controller] must be placed on an inherent impl block",
        ));
    }
    if !input.generics.params.is_empty() {
        return Err(syn::Error::new_spanned(
            &input.generics,
            "#[controller] does not support generic controllers",
        ));
    }

    let self_ty = input.self_ty.clone();
    let controller_name = controller_name(&self_ty)?;
    let base_path = base_path.trim_end_matches('/');

    let mut actions = Vec::new();
    let mut errors = Vec::new();
    for item in &mut input.items {
        let ImplItem::Fn(method) = item else { continue };
        match action(&controller_name, base_path, method) {
            Ok(Some(action)) => actions.push(action),
            Ok(None) => {}
            Err(error) => errors.push(error),
        }
        strip_method(method);
    }
    if let Some(error) = combine(errors) {
        return Err(error);
    }

    Ok(quote! {
        #input

        impl ::gantry_core::Controller for #self_ty {
            fn controller_name(&self) -> &str {
                #controller_name
            }

            fn actions(
                self: ::std::sync::Arc<Self>,
            ) -> ::std::vec::Vec<::gantry_core::ActionSpec> {
                ::std::vec![#(#actions),*]
            }
        }
    })
}

/// 为一个路由方法生成 `ActionSpec` 表达式
fn action(
    controller_name: &str,
    base_path: &str,
    method: &ImplItemFn,
) -> syn::Result<Option<proc_macro2::TokenStream>> {
    let Some(route) = parse_route_attrs(&method.attrs)? else {
        return Ok(None);
    };

    let sig = &method.sig;
    if let Some(asyncness) = &sig.asyncness {
        return Err(syn::Error::new_spanned(
            asyncness,
            "controller actions are dispatched synchronously and cannot be async",
        ));
    }
    match sig.inputs.first() {
        Some(FnArg::Receiver(receiver))
            if receiver.reference.is_some() && receiver.mutability.is_none() => {}
        _ => {
            return Err(syn::Error::new_spanned(
                sig,
                "controller actions must take &self as their first parameter",
            ))
        }
    }

    let mut parameters = Vec::new();
    let mut bindings = Vec::new();
    let mut names = Vec::new();
    for (index, input) in sig.inputs.iter().skip(1).enumerate() {
        let FnArg::Typed(typed) = input else { continue };
        let ty = &*typed.ty;
        if let Type::Reference(reference) = ty {
            return Err(syn::Error::new_spanned(
                reference,
                "controller action parameters must be owned values",
            ));
        }

        let ident = match &*typed.pat {
            Pat::Ident(pat) => Some(pat.ident.to_string()),
            _ => None,
        };
        let kind = parse_parameter_attrs(&typed.attrs, ident)?;
        parameters.push(parameter_spec(&kind, ty));

        let name = format_ident!("__arg{}", index);
        bindings.push(quote!(let #name: #ty = __arguments.take(#index)?;));
        names.push(name);
    }

    let method_ident = &sig.ident;
    let action_name = format!("{}::{}", controller_name, method_ident);
    let full_path = format!("{}{}", base_path, route.path);
    let http_method = syn::Ident::new(route.http_method, Span::call_site());

    let (value_type, invoke) = match &sig.output {
        ReturnType::Default => (
            quote!(()),
            quote! {
                controller.#method_ident(#(#names),*);
                ::std::result::Result::Ok(::gantry_core::mapping::ReturnValue::new(()))
            },
        ),
        ReturnType::Type(_, ty) => match result_ok_type(ty) {
            Some(ok) => (
                quote!(#ok),
                quote! {
                    match controller.#method_ident(#(#names),*) {
                        ::std::result::Result::Ok(value) => ::std::result::Result::Ok(
                            ::gantry_core::mapping::ReturnValue::new::<#ok>(value),
                        ),
                        ::std::result::Result::Err(error) => {
                            ::std::result::Result::Err(::gantry_core::anyhow::Error::from(error))
                        }
                    }
                },
            ),
            None => (
                quote!(#ty),
                quote! {
                    ::std::result::Result::Ok(::gantry_core::mapping::ReturnValue::new::<#ty>(
                        controller.#method_ident(#(#names),*),
                    ))
                },
            ),
        },
    };

    let returns = return_spec(&route.returns, &value_type);
    let role = route.role.map(|role| quote!(.requires_role(#role)));

    Ok(Some(quote! {{
        let controller = ::std::sync::Arc::clone(&self);
        ::gantry_core::ActionSpec::new(
            ::gantry_core::http::Method::#http_method,
            #full_path,
            #action_name,
        )
        #(.parameter(#parameters))*
        .returns(#returns)
        #role
        .invoker(move |mut __arguments: ::gantry_core::mapping::Arguments| {
            #(#bindings)*
            #invoke
        })
    }}))
}

fn strip_method(method: &mut ImplItemFn) {
    strip_attrs(&mut method.attrs, METHOD_ATTRIBUTES);
    for input in &mut method.sig.inputs {
        if let FnArg::Typed(typed) = input {
            strip_attrs(&mut typed.attrs, PARAMETER_ATTRIBUTES);
        }
    }
}

fn controller_name(self_ty: &Type) -> syn::Result<String> {
    match self_ty {
        Type::Path(path) => path
            .path
            .segments
            .last()
            .map(|segment| segment.ident.to_string())
            .ok_or_else(|| syn::Error::new_spanned(self_ty, "expected a named type")),
        other => Err(syn::Error::new_spanned(other, "expected a named type")),
    }
}
