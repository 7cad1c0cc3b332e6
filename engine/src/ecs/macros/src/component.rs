use proc_macro::TokenStream;
use quote::quote;
use syn::{parse_macro_input, DeriveInput};

pub fn derive_component(input: TokenStream) -> TokenStream {
    // Parse the input tokens into a syntax tree
    let ast = parse_macro_input!(input as DeriveInput);

    // Get the struct name we are annotating
    let struct_name = &ast.ident;

    let mut ignore_in_filter = false;
    let mut auto_reset: Option<syn::Path> = None;

    for attr in &ast.attrs {
        if !attr.path().is_ident("component") {
            continue;
        }
        let result = attr.parse_nested_meta(|meta| {
            if meta.path.is_ident("ignore_in_filter") {
                ignore_in_filter = true;
                return Ok(());
            }
            if meta.path.is_ident("auto_reset") {
                auto_reset = Some(meta.value()?.parse()?);
                return Ok(());
            }
            Err(meta.error("expected `ignore_in_filter` or `auto_reset = <path>`"))
        });
        if let Err(error) = result {
            return error.to_compile_error().into();
        }
    }

    let reset = match auto_reset {
        Some(path) => quote! { Some(#path) },
        None => quote! { None },
    };

    // Use ::strata_ecs::ecs::Component which works both inside and outside
    // the crate. Inside the crate, this works because of
    // `extern crate self as strata_ecs;` in lib.rs. Outside the crate, this
    // naturally resolves to the strata_ecs dependency.
    TokenStream::from(quote! {
        impl ::strata_ecs::ecs::Component for #struct_name {
            const IGNORE_IN_FILTER: bool = #ignore_in_filter;
            const AUTO_RESET: Option<fn(&mut Self)> = #reset;
        }
    })
}
