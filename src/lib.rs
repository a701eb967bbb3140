//! Method handlers for Language Server Protocol (LSP) servers built on [Tower].
//!
//! [Tower]: https://github.com/tower-rs/tower
//!
//! Each remote method is described by a [`Method`] type and implemented by a [`MethodHandler`].
//! Handlers are added to a [`HandlerRegistry`], either as named types or as closures, and receive
//! with every call:
//!
//! * a [`PartialResults`] emitter streaming pieces of the result under the caller's
//!   `partialResultToken`,
//! * a [`WorkDoneProgressReporter`] correlated to the caller's `workDoneToken`,
//! * a [`CancellationToken`] fired by `$/cancelRequest`.
//!
//! The registry schedules calls according to each method's [`DispatchPolicy`] and tells handlers
//! what the client supports through [`MethodHandler::set_capability`]. [`HandlerService`] exposes
//! the registry as a [`tower_service::Service`].
//!
//! ```
//! use lspower_handlers::{lsp, methods::References, Client, HandlerRegistry, HandlerService, MethodBundle};
//!
//! let (client, _messages) = Client::new();
//! let registry = HandlerRegistry::new(client);
//!
//! let _references = registry.on_references(
//!     MethodBundle::<References>::new(|params, partial_results, _progress, _token| async move {
//!         let uri = params.text_document_position.text_document.uri;
//!         let location = lsp::Location::new(uri, lsp::Range::default());
//!         partial_results.emit(vec![location.clone()]);
//!         Ok(Some(vec![location]))
//!     }),
//!     None,
//! );
//!
//! let service = HandlerService::new(registry);
//! # drop(service);
//! ```

#![deny(missing_debug_implementations)]
#![deny(missing_docs)]
#![forbid(unsafe_code)]

pub extern crate lsp;

mod capability;
mod client;
mod config;
mod delegate;
mod error;
mod handler;
pub mod jsonrpc;
mod method;
pub mod methods;
mod progress;
mod registry;
mod service;

pub use self::{
    capability::CapabilitySlot,
    client::{Client, MessageStream},
    config::HandlerConfig,
    delegate::{DelegatingHandler, DelegatingResolveHandler, MethodBundle, ResolveBundle},
    error::{ClosedError, HandlerError},
    handler::{execute, resolve, MethodHandler, ResolveHandler},
    method::{DispatchPolicy, Method},
    progress::{PartialResults, ProgressChannel, ProgressManager, WorkDoneProgressReporter},
    registry::{HandlerRegistry, OrderedQueue, RegistrationHandle, ResolveOptions, Slot, Turn},
    service::HandlerService,
};
pub use async_trait::async_trait;
pub use tokio_util::sync::CancellationToken;
