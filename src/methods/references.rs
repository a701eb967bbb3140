use crate::{
    delegate::MethodBundle,
    method::Method,
    registry::{HandlerRegistry, RegistrationHandle},
};
use serde::{Deserialize, Serialize};

/// The [`textDocument/references`] request.
///
/// Locations may be streamed as partial results; the final result is then the complete list.
///
/// [`textDocument/references`]: https://microsoft.github.io/language-server-protocol/specification#textDocument_references
#[derive(Debug)]
pub enum References {}

impl Method for References {
    type Capability = lsp::DynamicRegistrationClientCapabilities;
    type Params = lsp::ReferenceParams;
    type Partial = Vec<lsp::Location>;
    type RegistrationOptions = ReferenceRegistrationOptions;
    type Result = Option<Vec<lsp::Location>>;

    const METHOD: &'static str = "textDocument/references";

    fn work_done_token(params: &Self::Params) -> Option<&lsp::ProgressToken> {
        params.work_done_progress_params.work_done_token.as_ref()
    }

    fn partial_result_token(params: &Self::Params) -> Option<&lsp::ProgressToken> {
        params.partial_result_params.partial_result_token.as_ref()
    }
}

/// Registration options for [`References`].
#[derive(Clone, Debug, Default, Deserialize, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReferenceRegistrationOptions {
    /// Documents the registration applies to. `None` uses the client's own selector.
    pub document_selector: Option<lsp::DocumentSelector>,
}

impl HandlerRegistry {
    /// Registers `textDocument/references`.
    pub fn on_references(
        &self,
        bundle: MethodBundle<References>,
        options: Option<ReferenceRegistrationOptions>,
    ) -> RegistrationHandle {
        self.delegate(bundle, options.unwrap_or_default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Client;
    use serde_json::json;
    use tokio_util::sync::CancellationToken;

    fn location(line: u32) -> lsp::Location {
        lsp::Location::new(
            lsp::Url::parse("file:///demo.rs").unwrap(),
            lsp::Range::new(lsp::Position::new(line, 4), lsp::Position::new(line, 9)),
        )
    }

    fn references() -> MethodBundle<References> {
        MethodBundle::<References>::new(|_, partial_results, progress, _| async move {
            let mut all = Vec::new();
            for batch in vec![vec![location(1), location(2)], vec![location(7)]] {
                progress.report("searching", None);
                partial_results.emit(batch.clone());
                all.extend(batch);
            }
            Ok(Some(all))
        })
    }

    #[tokio::test]
    async fn streams_batches_then_full_result() {
        let (client, mut messages) = Client::new();
        let registry = HandlerRegistry::new(client);
        let _handle = registry.on_references(references(), None);

        let params = json!({
            "textDocument": { "uri": "file:///demo.rs" },
            "position": { "line": 1, "character": 5 },
            "context": { "includeDeclaration": true },
            "partialResultToken": "refs",
        });
        let result = registry
            .dispatch(References::METHOD, Some(params), CancellationToken::new())
            .await
            .unwrap();
        let result: Vec<lsp::Location> = serde_json::from_value(result).unwrap();
        assert_eq!(result, vec![location(1), location(2), location(7)]);

        let batches: Vec<Vec<lsp::Location>> = messages
            .drain()
            .into_iter()
            .map(|message| {
                let params = message.params().cloned().unwrap();
                assert_eq!(params["token"], json!("refs"));
                serde_json::from_value(params["value"].clone()).unwrap()
            })
            .collect();
        assert_eq!(batches, vec![vec![location(1), location(2)], vec![location(7)]]);
    }

    #[tokio::test]
    async fn without_tokens_only_result_is_sent() {
        let (client, mut messages) = Client::new();
        let registry = HandlerRegistry::new(client);
        let _handle = registry.on_references(references(), None);

        let params = json!({
            "textDocument": { "uri": "file:///demo.rs" },
            "position": { "line": 1, "character": 5 },
            "context": { "includeDeclaration": false },
        });
        let result = registry.dispatch(References::METHOD, Some(params), CancellationToken::new());
        assert_eq!(result.await.map(|r| r.as_array().map(Vec::len)), Ok(Some(3)));
        assert!(messages.drain().is_empty());
    }

    #[tokio::test]
    async fn no_references_is_null() {
        let (client, _) = Client::new();
        let registry = HandlerRegistry::new(client);
        let bundle = MethodBundle::<References>::new(|_, _, _, _| async move { Ok(None) });
        let _handle = registry.on_references(bundle, None);

        let params = json!({
            "textDocument": { "uri": "file:///demo.rs" },
            "position": { "line": 0, "character": 0 },
            "context": { "includeDeclaration": true },
        });
        let result = registry.dispatch(References::METHOD, Some(params), CancellationToken::new());
        assert_eq!(result.await, Ok(serde_json::Value::Null));
    }

    #[test]
    fn default_options() {
        let (client, _) = Client::new();
        let registry = HandlerRegistry::new(client);
        let _handle = registry.on_references(references(), None);
        assert_eq!(
            registry.registrations()[0].register_options,
            Some(json!({ "documentSelector": null }))
        );
    }

    #[test]
    fn locations_compare_structurally() {
        assert_eq!(location(3), location(3));
        assert_ne!(location(3), location(4));
    }
}
