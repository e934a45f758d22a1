use proc_macro::TokenStream;

mod object;
mod property;

/// Turn a `&self` method into a read-only lazy property.
///
/// See `lazy_property::LazyProperty` for what gets generated.
#[proc_macro_attribute]
pub fn lazy_property(args: TokenStream, item: TokenStream) -> TokenStream {
    property::expand(args.into(), item.into(), false).into()
}

/// Turn a `&self` method into a lazy property that can also be assigned.
#[proc_macro_attribute]
pub fn lazy_writable_property(args: TokenStream, item: TokenStream) -> TokenStream {
    property::expand(args.into(), item.into(), true).into()
}

#[proc_macro_derive(LazyObject, attributes(lazy_cache))]
pub fn derive_lazy_object(input: TokenStream) -> TokenStream {
    object::derive(input.into()).into()
}
