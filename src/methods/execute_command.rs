use crate::{
    delegate::MethodBundle,
    method::{DispatchPolicy, Method},
    registry::{HandlerRegistry, RegistrationHandle},
};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// The [`workspace/executeCommand`] request.
///
/// Commands usually edit the workspace, so calls run one at a time in arrival order.
///
/// [`workspace/executeCommand`]: https://microsoft.github.io/language-server-protocol/specification#workspace_executeCommand
#[derive(Debug)]
pub enum ExecuteCommand {}

impl Method for ExecuteCommand {
    type Capability = lsp::DynamicRegistrationClientCapabilities;
    type Params = lsp::ExecuteCommandParams;
    type Partial = ();
    type RegistrationOptions = ExecuteCommandRegistrationOptions;
    type Result = Option<Value>;

    const METHOD: &'static str = "workspace/executeCommand";
    const POLICY: DispatchPolicy = DispatchPolicy::Ordered;

    fn work_done_token(params: &Self::Params) -> Option<&lsp::ProgressToken> {
        params.work_done_progress_params.work_done_token.as_ref()
    }
}

/// Registration options for [`ExecuteCommand`].
#[derive(Clone, Debug, Default, Deserialize, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecuteCommandRegistrationOptions {
    /// The commands the server executes.
    pub commands: Vec<String>,
}

impl HandlerRegistry {
    /// Registers `workspace/executeCommand`.
    pub fn on_execute_command(
        &self,
        bundle: MethodBundle<ExecuteCommand>,
        options: Option<ExecuteCommandRegistrationOptions>,
    ) -> RegistrationHandle {
        self.delegate(bundle, options.unwrap_or_default())
    }
}
