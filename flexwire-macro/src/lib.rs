/*
 * Copyright (c) 2024. Govcraft
 *
 * Licensed under either of
 *   * Apache License, Version 2.0 (the "License");
 *     you may not use this file except in compliance with the License.
 *     You may obtain a copy of the License at http://www.apache.org/licenses/LICENSE-2.0
 *   * MIT license: http://opensource.org/licenses/MIT
 *
 * Unless required by applicable law or agreed to in writing, software
 * distributed under the License is distributed on an "AS IS" BASIS,
 * WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
 * See the applicable License for the specific language governing permissions and
 * limitations under that License.
 */
#![forbid(unsafe_code)]

//! Flexwire Macro Library
//!
//! Provides [`flex_message`], the attribute that prepares a type for use as a payload
//! on flexwire connections.
//!
//! ```ignore
//! #[flex_message]
//! pub struct PowerMeasurement {
//!     pub watts: f64,
//! }
//!
//! // Also derive serde traits, e.g. for snapshots or test fixtures.
//! #[flex_message(serde)]
//! pub struct Allocation {
//!     pub id: String,
//! }
//! ```

use proc_macro::TokenStream;

use quote::quote;
use syn::{parse_macro_input, DeriveInput};

fn has_derive(input: &DeriveInput, trait_name: &str) -> bool {
    input.attrs.iter().any(|attr| {
        if attr.path().is_ident("derive") {
            let mut found = false;
            let _ = attr.parse_nested_meta(|meta| {
                if meta.path.is_ident(trait_name) {
                    found = true;
                }
                Ok(())
            });
            found
        } else {
            false
        }
    })
}

/// Options accepted by `#[flex_message(...)]`.
#[derive(Default)]
struct MessageOptions {
    /// Also derive `serde::Serialize` and `serde::Deserialize`.
    serde: bool,
}

impl MessageOptions {
    fn parse(attr: &TokenStream) -> Self {
        let mut options = Self::default();
        for part in attr.to_string().split(',') {
            if part.trim() == "serde" {
                options.serde = true;
            }
        }
        options
    }
}

/// Derives what a type needs to travel over a flexwire connection.
///
/// Payloads are shared between the receiving handler and any traffic listeners, so
/// they must be `Clone + Debug + Send + Sync + 'static`. The macro adds
/// `#[derive(Clone, Debug)]` for whichever of the two is missing and emits a
/// compile-time assertion for the thread-safety bounds at the declaration.
///
/// With `#[flex_message(serde)]` the serde derives are added too; `serde` must then
/// be in scope for the annotated crate.
#[proc_macro_attribute]
pub fn flex_message(attr: TokenStream, item: TokenStream) -> TokenStream {
    let options = MessageOptions::parse(&attr);
    let input = parse_macro_input!(item as DeriveInput);

    let name = &input.ident;
    let generics = &input.generics;
    let (impl_generics, ty_generics, where_clause) = generics.split_for_impl();

    let derives = {
        let mut traits = Vec::new();
        if !has_derive(&input, "Clone") {
            traits.push(quote!(Clone));
        }
        if !has_derive(&input, "Debug") {
            traits.push(quote!(Debug));
        }
        if options.serde {
            if !has_derive(&input, "Serialize") {
                traits.push(quote!(serde::Serialize));
            }
            if !has_derive(&input, "Deserialize") {
                traits.push(quote!(serde::Deserialize));
            }
        }
        if traits.is_empty() {
            quote!()
        } else {
            quote!(#[derive(#(#traits),*)])
        }
    };

    let assert_ident = quote::format_ident!("_AssertFlexMessage_{}", name);

    let expanded = quote! {
        #derives
        #input

        #[doc(hidden)]
        #[allow(dead_code, non_camel_case_types, non_snake_case, clippy::needless_lifetimes)]
        const _: () = {
            fn #assert_ident #impl_generics () #where_clause {
                fn assert_bounds<T: Send + Sync + 'static>() {}
                assert_bounds::<#name #ty_generics>();
            }
        };
    };

    TokenStream::from(expanded)
}
