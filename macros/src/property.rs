use proc_macro2::{Span, TokenStream};
use quote::{format_ident, quote};
use syn::{
    ext::IdentExt, parse::Parser, parse2, Attribute, Error, Expr, ExprLit, FnArg,
    GenericArgument, ImplItemFn, Lit, LitStr, Meta, PathArguments, Result, ReturnType, Type,
    TypePath,
};

#[derive(Default)]
struct Options {
    fallible: bool,
    storage: Option<LitStr>,
    // For one-argument aliases like `io::Result<T>`.
    error: Option<Type>,
}

impl Options {
    fn parse(args: TokenStream) -> Result<Self> {
        let mut options = Options::default();
        let parser = syn::meta::parser(|meta| {
            if meta.path.is_ident("fallible") {
                options.fallible = true;
            } else if meta.path.is_ident("storage") {
                options.storage = Some(meta.value()?.parse()?);
            } else if meta.path.is_ident("error") {
                options.error = Some(meta.value()?.parse()?);
            } else {
                return Err(meta.error(
                    "unknown option, expected `fallible`, `storage = \"...\"` or `error = Type`",
                ));
            }
            Ok(())
        });
        parser.parse2(args)?;

        if let (Some(error), false) = (&options.error, options.fallible) {
            return Err(Error::new_spanned(error, "`error` requires `fallible`"));
        }
        Ok(options)
    }
}

/// Where a method attribute ends up among the generated items.
enum Placement {
    /// `cfg` and lint levels apply to every generated item.
    Everywhere,
    /// `deprecated` marks every public entry point, but not the hidden body.
    Accessors,
    /// `expect` is about the user's code, it would be unfulfilled on generated items.
    Body,
    /// Anything else (`must_use`, `inline`, ...) belongs to the getter.
    Getter,
}

fn placement(attr: &Attribute) -> Placement {
    let path = attr.path();
    if ["cfg", "allow", "warn", "deny", "forbid"]
        .iter()
        .any(|name| path.is_ident(name))
    {
        Placement::Everywhere
    } else if path.is_ident("deprecated") {
        Placement::Accessors
    } else if path.is_ident("expect") {
        Placement::Body
    } else {
        Placement::Getter
    }
}

pub fn expand(args: TokenStream, item: TokenStream, writable: bool) -> TokenStream {
    match expand_int(args, item, writable) {
        Ok(output) => output,
        Err(err) => err.to_compile_error(),
    }
}

fn expand_int(args: TokenStream, item: TokenStream, writable: bool) -> Result<TokenStream> {
    let options = Options::parse(args)?;
    let method: ImplItemFn = parse2(item)?;
    check_signature(&method)?;

    let ReturnType::Type(_, return_ty) = &method.sig.output else {
        return Err(Error::new_spanned(
            &method.sig,
            "lazy properties must return a value",
        ));
    };

    let (value_ty, error_ty) = if options.fallible {
        let (value_ty, error_ty) =
            split_result(return_ty, options.error.as_ref()).ok_or_else(|| {
                Error::new_spanned(
                    return_ty,
                    "fallible lazy properties must return `Result<T, E>`, \
                     or name the error type with `error = Type`",
                )
            })?;
        (quote!(#value_ty), quote!(#error_ty))
    } else {
        (quote!(#return_ty), quote!(::core::convert::Infallible))
    };

    let ident = &method.sig.ident;
    let name = ident.unraw().to_string();
    let vis = &method.vis;
    let const_ident = format_ident!("{}", name.to_uppercase());
    let body_ident = format_ident!("__lazy_property_{}", name);
    let setter_ident = format_ident!("set_{}", name);
    let clear_ident = format_ident!("clear_{}", name);

    let name_lit = LitStr::new(&name, ident.span());
    let storage_lit = options
        .storage
        .unwrap_or_else(|| LitStr::new(&format!("_{name}"), ident.span()));
    let (docs, attrs): (Vec<&Attribute>, Vec<&Attribute>) = method
        .attrs
        .iter()
        .partition(|attr| attr.path().is_ident("doc"));
    let doc_lit = LitStr::new(&doc_text(&docs), Span::call_site());

    let mut shared = Vec::new();
    let mut deprecated = Vec::new();
    let mut body_attrs = Vec::new();
    let mut getter_attrs = Vec::new();
    for attr in attrs {
        match placement(attr) {
            Placement::Everywhere => shared.push(attr),
            Placement::Accessors => deprecated.push(attr),
            Placement::Body => body_attrs.push(attr),
            Placement::Getter => getter_attrs.push(attr),
        }
    }
    // Generated items call each other, and may all be deprecated.
    let shared = quote! {
        #(#shared)*
        #[allow(deprecated)]
    };

    // The original body, under a name that does not clash with the accessor.
    let mut body_sig = method.sig.clone();
    body_sig.ident = body_ident.clone();
    let block = &method.block;
    let body = quote! {
        #shared
        #(#body_attrs)*
        #[doc(hidden)]
        #body_sig #block
    };

    let (compute, compute_ident) = if options.fallible {
        (TokenStream::new(), body_ident)
    } else {
        let compute_ident = format_ident!("__lazy_property_compute_{}", name);
        let compute = quote! {
            #shared
            #[doc(hidden)]
            fn #compute_ident(&self) -> ::core::result::Result<#value_ty, #error_ty> {
                ::core::result::Result::Ok(self.#body_ident())
            }
        };
        (compute, compute_ident)
    };

    let mode = writable.then(|| quote!(.writable()));
    let descriptor = quote! {
        #(#docs)*
        #shared
        #(#deprecated)*
        #vis const #const_ident: ::lazy_property::LazyProperty<Self, #value_ty, #error_ty> =
            ::lazy_property::LazyProperty::new(#name_lit, #storage_lit, Self::#compute_ident)
                .with_doc(#doc_lit)
                #mode;
    };

    let getter = if options.fallible {
        quote! {
            #(#docs)*
            #shared
            #(#deprecated)*
            #(#getter_attrs)*
            #vis fn #ident(&self) -> ::lazy_property::LazyResult<#value_ty, #error_ty> {
                Self::#const_ident.try_get(self)
            }
        }
    } else {
        quote! {
            #(#docs)*
            #shared
            #(#deprecated)*
            #(#getter_attrs)*
            #vis fn #ident(&self) -> #value_ty {
                Self::#const_ident.get(self)
            }
        }
    };

    let setter = writable.then(|| {
        quote! {
            #shared
            #(#deprecated)*
            #[allow(dead_code)]
            #vis fn #setter_ident(
                &self,
                value: #value_ty,
            ) -> ::lazy_property::LazyResult<(), #error_ty> {
                Self::#const_ident.set(self, value)
            }
        }
    });

    Ok(quote! {
        #body
        #compute
        #descriptor
        #getter
        #setter

        #shared
        #(#deprecated)*
        #[allow(dead_code)]
        #vis fn #clear_ident(&self) -> bool {
            Self::#const_ident.invalidate(self)
        }
    })
}

fn check_signature(method: &ImplItemFn) -> Result<()> {
    let sig = &method.sig;
    if let Some(asyncness) = &sig.asyncness {
        return Err(Error::new_spanned(asyncness, "lazy properties can not be async"));
    }
    if let Some(constness) = &sig.constness {
        return Err(Error::new_spanned(constness, "lazy properties can not be const"));
    }
    if !sig.generics.params.is_empty() || sig.generics.where_clause.is_some() {
        return Err(Error::new_spanned(
            &sig.generics,
            "lazy properties can not be generic",
        ));
    }

    let mut inputs = sig.inputs.iter();
    match inputs.next() {
        Some(FnArg::Receiver(receiver))
            if receiver.reference.is_some() && receiver.mutability.is_none() => {}
        Some(other) => {
            return Err(Error::new_spanned(
                other,
                "lazy properties must take `&self`",
            ));
        }
        None => {
            return Err(Error::new_spanned(sig, "lazy properties must take `&self`"));
        }
    }
    if let Some(extra) = inputs.next() {
        return Err(Error::new_spanned(
            extra,
            "lazy properties can not take arguments",
        ));
    }
    Ok(())
}

/// Split `Result<T, E>` (or any path type with exactly two type arguments) into `T` and `E`.
///
/// With an explicit `error`, a one-argument alias such as `io::Result<T>` is accepted too.
fn split_result<'a>(ty: &'a Type, error: Option<&'a Type>) -> Option<(&'a Type, &'a Type)> {
    let Type::Path(TypePath { qself: None, path }) = ty else {
        return None;
    };
    let PathArguments::AngleBracketed(args) = &path.segments.last()?.arguments else {
        return None;
    };
    let mut types = args.args.iter().filter_map(|arg| match arg {
        GenericArgument::Type(ty) => Some(ty),
        _ => None,
    });
    match (types.next(), types.next(), types.next(), error) {
        (Some(value), _, None, Some(error)) => Some((value, error)),
        (Some(value), Some(error), None, None) => Some((value, error)),
        _ => None,
    }
}

/// The text of `///` comments, one line per attribute.
fn doc_text(docs: &[&Attribute]) -> String {
    let lines: Vec<String> = docs
        .iter()
        .filter_map(|attr| match &attr.meta {
            Meta::NameValue(nv) => match &nv.value {
                Expr::Lit(ExprLit {
                    lit: Lit::Str(line),
                    ..
                }) => Some(line.value()),
                _ => None,
            },
            _ => None,
        })
        .map(|line| match line.strip_prefix(' ') {
            Some(stripped) => stripped.to_string(),
            None => line,
        })
        .collect();
    lines.join("\n")
}
