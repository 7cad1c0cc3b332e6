mod component;

use proc_macro::TokenStream;

/// Derive the `Component` trait, filling the metadata constants from
/// `#[component(...)]` attributes:
///
/// ```rust,ignore
/// #[derive(Component, Clone, Default)]
/// #[component(ignore_in_filter)]
/// struct Dirty;
///
/// #[derive(Component, Clone, Default)]
/// #[component(auto_reset = Connection::reset)]
/// struct Connection { socket: Option<u64> }
/// ```
#[proc_macro_derive(Component, attributes(component))]
pub fn derive_component(item: TokenStream) -> TokenStream {
    component::derive_component(item)
}
