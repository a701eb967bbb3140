use futures::StreamExt;
use lspower_handlers::{
    jsonrpc::{Id, Request, Result},
    lsp,
    methods::{CodeLens, CodeLensRegistrationOptions, CodeLensResolve, ExecuteCommand, ExecuteCommandRegistrationOptions},
    CancellationToken,
    CapabilitySlot,
    Client,
    HandlerRegistry,
    HandlerService,
    Method,
    MethodBundle,
    MethodHandler,
    PartialResults,
    ResolveHandler,
    WorkDoneProgressReporter,
};
use serde_json::json;
use std::sync::Arc;
use tower_service::Service;

/// Puts a "run" lens on every `fn main` and resolves its command lazily.
#[derive(Debug, Default)]
struct Lenses {
    capability: CapabilitySlot<lsp::DynamicRegistrationClientCapabilities>,
}

#[lspower_handlers::async_trait]
impl MethodHandler<CodeLens> for Lenses {
    fn registration_options(&self) -> CodeLensRegistrationOptions {
        CodeLensRegistrationOptions {
            document_selector: Some(vec![lsp::DocumentFilter {
                language: Some("rust".into()),
                scheme: None,
                pattern: None,
            }]),
            resolve_provider: true,
        }
    }

    fn set_capability(&self, capability: lsp::DynamicRegistrationClientCapabilities) {
        self.capability.set(capability);
    }

    async fn handle(
        &self,
        params: lsp::CodeLensParams,
        partial_results: PartialResults<Vec<lsp::CodeLens>>,
        progress: WorkDoneProgressReporter,
        _: CancellationToken,
    ) -> Result<Option<Vec<lsp::CodeLens>>> {
        log::info!("listing lenses for {}", params.text_document.uri);
        if let Some(capability) = self.capability.get() {
            log::debug!("client capability: {:?}", capability);
        }
        let source = ["fn helper() {}", "fn main() {", "    helper();", "}"];

        let mut lenses = Vec::new();
        for (line, text) in source.iter().enumerate() {
            progress.report(format!("scanning line {}", line), Some((line * 100 / source.len()) as u32));
            if text.starts_with("fn ") {
                let lens = lsp::CodeLens {
                    range: lsp::Range::new(lsp::Position::new(line as u32, 0), lsp::Position::new(line as u32, 2)),
                    command: None,
                    data: text.starts_with("fn main").then(|| json!({ "line": line })),
                };
                partial_results.emit(vec![lens.clone()]);
                lenses.push(lens);
            }
        }
        Ok(Some(lenses))
    }
}

#[lspower_handlers::async_trait]
impl ResolveHandler<CodeLensResolve> for Lenses {
    fn can_resolve(&self, lens: &lsp::CodeLens) -> bool {
        lens.data.is_some()
    }

    async fn resolve(&self, mut lens: lsp::CodeLens, _: CancellationToken) -> Result<lsp::CodeLens> {
        lens.command = Some(lsp::Command {
            title: "▶ Run".into(),
            command: "demo.run".into(),
            arguments: lens.data.take().map(|data| vec![data]),
        });
        Ok(lens)
    }
}

#[tokio::main]
async fn main() {
    env_logger::init();

    let (client, mut messages) = Client::new();
    let registry = HandlerRegistry::new(client);

    let _lenses = registry.register_resolvable::<CodeLens, CodeLensResolve, _>(Arc::new(Lenses::default()));
    let _commands = registry.on_execute_command(
        MethodBundle::<ExecuteCommand>::progress_only(|params, progress, _| async move {
            progress.begin(format!("Running {}", params.command));
            Ok(Some(json!({ "ran": params.command, "arguments": params.arguments })))
        }),
        Some(ExecuteCommandRegistrationOptions {
            commands: vec!["demo.run".into()],
        }),
    );

    if let Err(e) = registry.apply_capability(CodeLens::METHOD, json!({ "dynamicRegistration": true })) {
        log::warn!("capability rejected: {}", e);
    }
    for registration in registry.registrations() {
        log::info!("register {} with {:?}", registration.method, registration.register_options);
    }

    let mut service = HandlerService::new(registry);
    let list = Request::new(
        Id::Number(1),
        CodeLens::METHOD,
        Some(json!({
            "textDocument": { "uri": "file:///demo/src/main.rs" },
            "workDoneToken": "scan",
            "partialResultToken": "lenses",
        })),
    );

    let mut lenses = Vec::new();
    if let Ok(Some(response)) = service.call(list).await {
        if let Some(result) = response.result() {
            lenses = serde_json::from_value::<Vec<lsp::CodeLens>>(result.clone()).unwrap_or_default();
        }
    }

    for (n, lens) in lenses.into_iter().enumerate() {
        let item = serde_json::to_value(lens).ok();
        let resolve = Request::new(Id::Number(n as i64 + 2), CodeLensResolve::METHOD, item);
        if let Ok(Some(response)) = service.call(resolve).await {
            println!("{}", serde_json::to_string(&response).unwrap_or_default());
        }
    }

    let run = Request::new(
        Id::Number(100),
        ExecuteCommand::METHOD,
        Some(json!({ "command": "demo.run", "arguments": [{ "line": 1 }] })),
    );
    if let Ok(Some(response)) = service.call(run).await {
        println!("{}", serde_json::to_string(&response).unwrap_or_default());
    }

    service.shutdown();
    drop(service);
    while let Some(message) = messages.next().await {
        println!("{}", message);
    }
}
