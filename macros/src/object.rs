use proc_macro2::TokenStream;
use quote::quote;
use syn::{parse2, Data, DeriveInput, Error, Field, Index, Member, Result, Type};

pub fn derive(input: TokenStream) -> TokenStream {
    match derive_int(input) {
        Ok(output) => output,
        Err(err) => err.to_compile_error(),
    }
}

fn derive_int(input: TokenStream) -> Result<TokenStream> {
    let input: DeriveInput = parse2(input)?;
    let Data::Struct(data) = &input.data else {
        return Err(Error::new_spanned(
            &input.ident,
            "LazyObject can only be derived for structs",
        ));
    };

    let fields: Vec<(Member, &Field)> = data
        .fields
        .iter()
        .enumerate()
        .map(|(i, field)| {
            let member = match &field.ident {
                Some(ident) => Member::Named(ident.clone()),
                None => Member::Unnamed(Index::from(i)),
            };
            (member, field)
        })
        .collect();

    let member = cache_member(&input, &fields)?;
    let ident = &input.ident;
    let (impl_generics, ty_generics, where_clause) = input.generics.split_for_impl();

    Ok(quote! {
        impl #impl_generics ::lazy_property::LazyObject for #ident #ty_generics #where_clause {
            fn lazy_cache(&self) -> &::lazy_property::LazyCache {
                &self.#member
            }
        }
    })
}

/// The field marked `#[lazy_cache]`, or else the only field of type `LazyCache`.
fn cache_member(input: &DeriveInput, fields: &[(Member, &Field)]) -> Result<Member> {
    let marked: Vec<_> = fields
        .iter()
        .filter(|(_, field)| {
            field
                .attrs
                .iter()
                .any(|attr| attr.path().is_ident("lazy_cache"))
        })
        .collect();
    match marked.as_slice() {
        [(member, _)] => return Ok(member.clone()),
        [_, (_, second), ..] => {
            return Err(Error::new_spanned(
                second,
                "only one field can be marked #[lazy_cache]",
            ));
        }
        [] => {}
    }

    let typed: Vec<_> = fields
        .iter()
        .filter(|(_, field)| is_lazy_cache(&field.ty))
        .collect();
    match typed.as_slice() {
        [(member, _)] => Ok(member.clone()),
        [] => Err(Error::new_spanned(
            &input.ident,
            "LazyObject needs a field of type `LazyCache`",
        )),
        _ => Err(Error::new_spanned(
            &input.ident,
            "several `LazyCache` fields, mark one with #[lazy_cache]",
        )),
    }
}

fn is_lazy_cache(ty: &Type) -> bool {
    match ty {
        Type::Path(path) => path
            .path
            .segments
            .last()
            .is_some_and(|segment| segment.ident == "LazyCache"),
        _ => false,
    }
}
