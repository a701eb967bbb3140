//! Static descriptions of the remote methods a server exposes.

use serde::{de::DeserializeOwned, Serialize};

/// Whether calls to a method may overlap.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum DispatchPolicy {
    /// Calls may run concurrently with each other and with calls to other methods.
    Independent,
    /// Calls run to completion one at a time, in the order they were submitted.
    Ordered,
}

/// A named remote method with fixed parameter, result, registration and capability shapes.
///
/// Implemented on uninhabited marker types, in the same way as [`lsp::request::Request`]:
///
/// ```
/// use lspower_handlers::{lsp, DispatchPolicy, Method};
///
/// enum Rename {}
///
/// impl Method for Rename {
///     type Capability = lsp::DynamicRegistrationClientCapabilities;
///     type Params = lsp::RenameParams;
///     type Partial = ();
///     type RegistrationOptions = ();
///     type Result = Option<lsp::WorkspaceEdit>;
///
///     const METHOD: &'static str = "textDocument/rename";
///     const POLICY: DispatchPolicy = DispatchPolicy::Ordered;
///
///     fn work_done_token(params: &Self::Params) -> Option<&lsp::ProgressToken> {
///         params.work_done_progress_params.work_done_token.as_ref()
///     }
/// }
/// ```
pub trait Method: 'static {
    /// Parameters of a call.
    type Params: DeserializeOwned + Send + 'static;
    /// Final result of a call.
    type Result: Serialize + Send + 'static;
    /// A piece of the result streamed before the final result.
    type Partial: Serialize + Send + 'static;
    /// Options sent to the client when the method is registered.
    type RegistrationOptions: Clone + Serialize + Send + Sync + 'static;
    /// What the client declared it supports for this method.
    type Capability: Serialize + DeserializeOwned + Send + Sync + 'static;

    /// The method name, unique within a registry.
    const METHOD: &'static str;
    /// How concurrent calls to this method are scheduled.
    const POLICY: DispatchPolicy = DispatchPolicy::Independent;

    /// Returns the token work-done progress is reported under, if the caller supplied one.
    fn work_done_token(_params: &Self::Params) -> Option<&lsp::ProgressToken> {
        None
    }

    /// Returns the token partial results are streamed under, if the caller supplied one.
    fn partial_result_token(_params: &Self::Params) -> Option<&lsp::ProgressToken> {
        None
    }
}
