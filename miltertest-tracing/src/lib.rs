//! `#[traced]` emits `OnEnter`/`OnExit` trace events around a function body,
//! optionally attaching a `tracing::instrument` span and the elapsed time.
//!
//! ```ignore
//! #[traced(instrument(level = tracing::Level::DEBUG, skip(self)), timing(precision = "ms"))]
//! async fn start(&self) -> Result<(), StartError> { .. }
//! ```

extern crate proc_macro;

use proc_macro2::TokenStream;
use quote::quote;
use syn::{ItemFn, parse::Parse, parse_macro_input, parse_quote};

#[derive(PartialEq, Eq, Clone, Copy, Debug, Default)]
enum Precision {
    #[default]
    Nanos,
    Micros,
    Millis,
    Seconds,
}

impl Precision {
    fn from_name(value: &str) -> Option<Self> {
        match value {
            "ns" | "nano" | "nanos" | "nanoseconds" => Some(Self::Nanos),
            "us" | "micro" | "micros" | "microseconds" => Some(Self::Micros),
            "ms" | "milli" | "millis" | "milliseconds" => Some(Self::Millis),
            "s" | "sec" | "secs" | "seconds" => Some(Self::Seconds),
            _ => None,
        }
    }

    /// Expression formatting a `Duration` bound to `elapsed`.
    fn render(self) -> TokenStream {
        match self {
            Self::Nanos => quote!(format!("{} ns elapsed", elapsed.as_nanos())),
            Self::Micros => quote!(format!("{} us elapsed", elapsed.as_micros())),
            Self::Millis => quote!(format!("{} ms elapsed", elapsed.as_millis())),
            Self::Seconds => quote!(format!("{:.3} s elapsed", elapsed.as_secs_f64())),
        }
    }
}

mod keywords {
    syn::custom_keyword!(timing);
    syn::custom_keyword!(precision);
    syn::custom_keyword!(instrument);
}

#[derive(Default)]
struct Attributes {
    timing: Option<Precision>,
    instrument: Option<TokenStream>,
}

impl Attributes {
    fn parse_timing(input: syn::parse::ParseStream) -> syn::Result<Precision> {
        if !input.peek(syn::token::Paren) {
            return Ok(Precision::default());
        }

        let content;
        let _ = syn::parenthesized!(content in input);
        let _ = content.parse::<keywords::precision>()?;
        let _ = content.parse::<syn::Token![=]>()?;
        let name = content.parse::<syn::LitStr>()?;

        Precision::from_name(&name.value())
            .ok_or_else(|| syn::Error::new(name.span(), "unknown timing precision"))
    }
}

impl Parse for Attributes {
    fn parse(input: syn::parse::ParseStream) -> syn::Result<Self> {
        let mut attributes = Self::default();

        while !input.is_empty() {
            let lookahead = input.lookahead1();
            if lookahead.peek(keywords::timing) {
                let keyword = input.parse::<keywords::timing>()?;
                if attributes.timing.is_some() {
                    return Err(syn::Error::new(keyword.span, "duplicate `timing` argument"));
                }
                attributes.timing = Some(Self::parse_timing(input)?);
            } else if lookahead.peek(keywords::instrument) {
                let keyword = input.parse::<keywords::instrument>()?;
                if attributes.instrument.is_some() {
                    return Err(syn::Error::new(
                        keyword.span,
                        "duplicate `instrument` argument",
                    ));
                }
                let mut fields = TokenStream::new();
                if input.peek(syn::token::Paren) {
                    let content;
                    let _ = syn::parenthesized!(content in input);
                    fields = content.parse()?;
                }
                attributes.instrument = Some(fields);
            } else if lookahead.peek(syn::Token![,]) {
                let _ = input.parse::<syn::Token![,]>()?;
            } else {
                return Err(lookahead.error());
            }
        }

        Ok(attributes)
    }
}

/// Adds `tracing::trace!` events at the start and end of the attributed function.
///
/// The exit event fires from a drop guard, so it is emitted on every return
/// path, including `?` and the completion of an `async fn` future.
#[proc_macro_attribute]
pub fn traced(
    args: proc_macro::TokenStream,
    item: proc_macro::TokenStream,
) -> proc_macro::TokenStream {
    let args = parse_macro_input!(args as Attributes);
    let mut item_fn = parse_macro_input!(item as ItemFn);

    item_fn
        .attrs
        .push(parse_quote!(#[allow(clippy::items_after_statements)]));

    if let Some(fields) = args.instrument {
        item_fn
            .attrs
            .push(parse_quote!(#[tracing::instrument(#fields)]));
    }

    let id = item_fn.sig.ident.to_string();
    let on_exit = args.timing.map_or_else(
        || quote! { tracing::trace!("OnExit: {}", #id); },
        |precision| {
            let rendered = precision.render();
            quote! {
                let elapsed = self.started.elapsed();
                tracing::trace!("OnExit: {} ({})", #id, #rendered);
            }
        },
    );

    let guard: syn::Block = match syn::parse2(quote! {{
        #[allow(dead_code)]
        struct __TracedGuard {
            started: std::time::Instant,
        }

        impl std::ops::Drop for __TracedGuard {
            fn drop(&mut self) {
                #on_exit
            }
        }

        tracing::trace!("OnEnter: {}", #id);
        let __traced_guard = __TracedGuard {
            started: std::time::Instant::now(),
        };
    }}) {
        Ok(block) => block,
        Err(err) => return err.to_compile_error().into(),
    };

    for stmt in guard.stmts.into_iter().rev() {
        item_fn.block.stmts.insert(0, stmt);
    }

    proc_macro::TokenStream::from(quote! { #item_fn })
}
