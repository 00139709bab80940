use proc_macro::TokenStream;
use proc_macro2::TokenStream as TokenStream2;
use quote::{format_ident, quote};
use syn::{parse_macro_input, spanned::Spanned, FnArg, ItemFn, Pat, Signature, Type};

/// Transform an asynchronous test into a synchronous one and inject
/// dependencies.
///
/// Injectable dependencies are [`rocket::local::asynchronous::Client`],
/// `crate::storage::MemoryStorage` and `crate::ledger::MemoryLedger`. The
/// storage and ledger are the same ones the client's server runs over, so
/// tests can arrange and inspect state directly.
#[proc_macro_attribute]
pub fn backend_test(args: TokenStream, input: TokenStream) -> TokenStream {
    if !args.is_empty() {
        return syn::Error::new(
            proc_macro2::Span::call_site(),
            "`backend_test` takes no arguments",
        )
        .into_compile_error()
        .into();
    }

    let mut item_fn = parse_macro_input!(input as ItemFn);

    // Extract the injected arguments and reject invalid function signatures.
    let test_args = match check_sig(item_fn.sig.clone()) {
        Ok(args) => args,
        Err(err) => {
            return err.into_compile_error().into();
        }
    };

    // Rename the future so the test can have its original name.
    let name = item_fn.sig.ident.clone();
    let new_name = format_ident!("{}_fut", name);
    item_fn.sig.ident = new_name.clone();

    // Rewrite the test function.
    quote! {
        #[test]
        fn #name() {
            log4rs_test_utils::test_logging::init_logging_once_for(
                ["evote_backend"],
                None,
                None,
            );

            /// Test setup.
            async fn setup() -> (
                rocket::local::asynchronous::Client,
                crate::storage::MemoryStorage,
                crate::ledger::MemoryLedger,
            ) {
                let storage = crate::storage::MemoryStorage::new();
                let ledger = crate::ledger::MemoryLedger::new();
                let rocket = crate::rocket_for_backends(
                    crate::config::Config::example(),
                    std::sync::Arc::new(storage.clone()),
                    std::sync::Arc::new(ledger.clone()),
                );
                let rocket_client = rocket::local::asynchronous::Client::tracked(rocket)
                    .await
                    .unwrap();
                (rocket_client, storage, ledger)
            }

            /// The test itself.
            #item_fn

            let runtime = rocket::tokio::runtime::Builder::new_multi_thread()
                .thread_name("rocket-worker-test-thread")
                .worker_threads(2)
                .enable_all()
                .build()
                .unwrap();

            runtime.block_on(async {
                #[allow(unused_variables)]
                let (rocket_client, storage, ledger) = setup().await;
                #new_name(#(#test_args),*).await;
            });
        }
    }
    .into()
}

/// Ensure the wrapped test is async, extract parameters to inject, and reject unknown parameters.
fn check_sig(sig: Signature) -> Result<Vec<TokenStream2>, syn::Error> {
    if sig.asyncness.is_none() {
        return Err(syn::Error::new(sig.span(), "Test must be marked `async`"));
    }

    let mut has_client = false;
    let mut has_storage = false;
    let mut has_ledger = false;
    let mut args = vec![];

    for input in &sig.inputs {
        if let FnArg::Typed(pat_type) = input {
            if let (Pat::Ident(_), Type::Path(type_path)) = (&*pat_type.pat, &*pat_type.ty) {
                // Valid as the last path segment for any type is itself.
                let type_ident = &type_path.path.segments.last().unwrap().ident;
                let (seen, injected) = if type_ident == "Client" {
                    (&mut has_client, quote! { rocket_client })
                } else if type_ident == "MemoryStorage" {
                    (&mut has_storage, quote! { storage })
                } else if type_ident == "MemoryLedger" {
                    (&mut has_ledger, quote! { ledger })
                } else {
                    return Err(unexpected(input));
                };
                if *seen {
                    return Err(syn::Error::new(
                        input.span(),
                        format!("Test cannot accept more than one `{type_ident}`"),
                    ));
                }
                *seen = true;
                args.push(injected);
                continue;
            }
        }

        return Err(unexpected(input));
    }

    Ok(args)
}

fn unexpected(input: &FnArg) -> syn::Error {
    syn::Error::new(
        input.span(),
        "Expected one of `client_ident: Client`, `storage_ident: MemoryStorage` or `ledger_ident: MemoryLedger`",
    )
}
