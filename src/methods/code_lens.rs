use crate::{
    delegate::{MethodBundle, ResolveBundle},
    method::Method,
    registry::{HandlerRegistry, RegistrationHandle, ResolveOptions},
};
use serde::{Deserialize, Serialize};

/// The [`textDocument/codeLens`] request.
///
/// [`textDocument/codeLens`]: https://microsoft.github.io/language-server-protocol/specification#textDocument_codeLens
#[derive(Debug)]
pub enum CodeLens {}

impl Method for CodeLens {
    type Capability = lsp::DynamicRegistrationClientCapabilities;
    type Params = lsp::CodeLensParams;
    type Partial = Vec<lsp::CodeLens>;
    type RegistrationOptions = CodeLensRegistrationOptions;
    type Result = Option<Vec<lsp::CodeLens>>;

    const METHOD: &'static str = "textDocument/codeLens";

    fn work_done_token(params: &Self::Params) -> Option<&lsp::ProgressToken> {
        params.work_done_progress_params.work_done_token.as_ref()
    }

    fn partial_result_token(params: &Self::Params) -> Option<&lsp::ProgressToken> {
        params.partial_result_params.partial_result_token.as_ref()
    }
}

/// The [`codeLens/resolve`] request, which fills in the command of a single code lens.
///
/// [`codeLens/resolve`]: https://microsoft.github.io/language-server-protocol/specification#codeLens_resolve
#[derive(Debug)]
pub enum CodeLensResolve {}

impl Method for CodeLensResolve {
    type Capability = ();
    type Params = lsp::CodeLens;
    type Partial = ();
    type RegistrationOptions = ();
    type Result = lsp::CodeLens;

    const METHOD: &'static str = "codeLens/resolve";
}

/// Registration options for [`CodeLens`].
#[derive(Clone, Debug, Default, Deserialize, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CodeLensRegistrationOptions {
    /// Documents the registration applies to. `None` uses the client's own selector.
    pub document_selector: Option<lsp::DocumentSelector>,
    /// Whether the server answers `codeLens/resolve`.
    #[serde(default)]
    pub resolve_provider: bool,
}

impl ResolveOptions for CodeLensRegistrationOptions {
    fn set_resolve_provider(&mut self, offered: bool) {
        self.resolve_provider = offered;
    }

    fn resolve_provider(&self) -> bool {
        self.resolve_provider
    }
}

impl HandlerRegistry {
    /// Registers `textDocument/codeLens`, and `codeLens/resolve` if `resolve` is complete.
    ///
    /// Only the document selector is taken from `options`; `resolveProvider` is derived from
    /// `resolve`.
    pub fn on_code_lens(
        &self,
        bundle: MethodBundle<CodeLens>,
        resolve: ResolveBundle<CodeLensResolve>,
        options: Option<CodeLensRegistrationOptions>,
    ) -> RegistrationHandle {
        let options = CodeLensRegistrationOptions {
            document_selector: options.and_then(|options| options.document_selector),
            resolve_provider: false,
        };
        self.delegate_resolvable(bundle, resolve, options)
    }
}
