//! Service abstraction over a handler registry.

use crate::{
    error::ClosedError,
    jsonrpc::{Id, Request, Response, ServerRequests},
    registry::HandlerRegistry,
};
use futures::{
    future::{self, BoxFuture},
    FutureExt,
};
use std::{
    fmt::{self, Debug, Formatter},
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
    task::{Context, Poll},
};
use tower_service::Service;

const CANCEL_REQUEST: &str = "$/cancelRequest";

/// Service routing incoming JSON-RPC messages to the handlers of a [`HandlerRegistry`].
///
/// Requests produce a [`Response`]; notifications produce `None`. Each request gets its own
/// cancellation token, which the [`$/cancelRequest`] notification fires.
///
/// [`$/cancelRequest`]: https://microsoft.github.io/language-server-protocol/specification#cancelRequest
///
/// This implements [`tower_service::Service`] in order to remain independent from the underlying
/// transport and to facilitate further abstraction with middleware.
pub struct HandlerService {
    registry: HandlerRegistry,
    pending: ServerRequests,
    closed: Arc<AtomicBool>,
}

impl HandlerService {
    /// Creates a service dispatching to `registry`.
    pub fn new(registry: HandlerRegistry) -> Self {
        HandlerService {
            registry,
            pending: ServerRequests::new(),
            closed: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Returns the registry calls are dispatched to.
    pub fn registry(&self) -> &HandlerRegistry {
        &self.registry
    }

    /// Returns the number of requests currently running.
    pub fn pending(&self) -> usize {
        self.pending.len()
    }

    /// Cancels every running request and refuses further messages.
    pub fn shutdown(&self) {
        if !self.closed.swap(true, Ordering::SeqCst) {
            log::info!("shutting down, cancelling {} pending requests", self.pending.len());
            self.pending.cancel_all();
        }
    }

    /// Returns `true` once [`shutdown`](HandlerService::shutdown) has been called.
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    fn notify(&self, method: &str, params: Option<serde_json::Value>) {
        if method != CANCEL_REQUEST {
            log::warn!("ignoring unhandled notification {}", method);
            return;
        }

        match params.map(serde_json::from_value::<lsp::CancelParams>) {
            Some(Ok(params)) => self.pending.cancel(&Id::from(params.id)),
            Some(Err(e)) => log::warn!("invalid {} parameters: {}", CANCEL_REQUEST, e),
            None => log::warn!("missing {} parameters", CANCEL_REQUEST),
        }
    }
}

impl Service<Request> for HandlerService {
    type Error = ClosedError;
    type Future = BoxFuture<'static, Result<Self::Response, Self::Error>>;
    type Response = Option<Response>;

    fn poll_ready(&mut self, _: &mut Context) -> Poll<Result<(), Self::Error>> {
        if self.is_closed() {
            Poll::Ready(Err(ClosedError))
        } else {
            Poll::Ready(Ok(()))
        }
    }

    fn call(&mut self, request: Request) -> Self::Future {
        if self.is_closed() {
            return future::err(ClosedError).boxed();
        }

        log::trace!("received request: {}", request.method());
        match request.into_parts() {
            (method, params, Some(id)) => {
                let registry = self.registry.clone();
                self.pending
                    .execute(id, move |token| registry.dispatch(&method, params, token))
                    .map(|response| Ok(Some(response)))
                    .boxed()
            },
            (method, params, None) => {
                self.notify(&method, params);
                future::ok(None).boxed()
            },
        }
    }
}

impl Debug for HandlerService {
    fn fmt(&self, f: &mut Formatter) -> fmt::Result {
        f.debug_struct(stringify!(HandlerService))
            .field("registry", &self.registry)
            .field("pending", &self.pending)
            .field("closed", &self.is_closed())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        jsonrpc,
        methods::{ExecuteCommand, References},
        Client,
        MethodBundle,
        RegistrationHandle,
    };
    use serde_json::json;
    use tower_test::mock::Spawn;

    const REFERENCES_REQUEST: &str = r#"{
        "jsonrpc": "2.0",
        "method": "textDocument/references",
        "params": {
            "textDocument": { "uri": "file:///demo.rs" },
            "position": { "line": 0, "character": 0 },
            "context": { "includeDeclaration": true }
        },
        "id": 1
    }"#;
    const EXECUTE_REQUEST: &str = r#"{
        "jsonrpc": "2.0",
        "method": "workspace/executeCommand",
        "params": { "command": "demo.wait", "arguments": [] },
        "id": "wait"
    }"#;
    const CANCEL_NOTIF: &str = r#"{ "jsonrpc": "2.0", "method": "$/cancelRequest", "params": { "id": "wait" } }"#;
    const INITIALIZED_NOTIF: &str = r#"{ "jsonrpc": "2.0", "method": "initialized", "params": {} }"#;

    fn service() -> (HandlerService, Vec<RegistrationHandle>) {
        let (client, _) = Client::new();
        let registry = HandlerRegistry::new(client);
        let handles = vec![
            registry.on_references(MethodBundle::<References>::new(|_, _, _, _| async { Ok(Some(Vec::new())) }), None),
            registry.on_execute_command(
                MethodBundle::<ExecuteCommand>::progress_only(|_, _, _| future::pending()),
                None,
            ),
        ];
        (HandlerService::new(registry), handles)
    }

    #[tokio::test]
    async fn call_response() {
        let (service, _handles) = service();
        let mut service = Spawn::new(service);

        let request: Request = serde_json::from_str(REFERENCES_REQUEST).unwrap();
        let ok = serde_json::from_value(json!({ "jsonrpc": "2.0", "result": [], "id": 1 })).unwrap();
        assert_eq!(service.poll_ready(), Poll::Ready(Ok(())));
        assert_eq!(service.call(request).await, Ok(Some(ok)));
    }

    #[tokio::test]
    async fn unknown_method() {
        let (service, _handles) = service();
        let mut service = Spawn::new(service);

        let request = Request::new(Id::Number(2), "textDocument/hover", None);
        let raw = json!({ "jsonrpc": "2.0", "error": { "code": -32601, "message": "Method not found" }, "id": 2 });
        let err = serde_json::from_value(raw).unwrap();
        assert_eq!(service.call(request).await, Ok(Some(err)));
    }

    #[tokio::test]
    async fn null_id_gets_response() {
        let (service, _handles) = service();
        let mut service = Spawn::new(service);

        let raw = json!({ "jsonrpc": "2.0", "method": "textDocument/hover", "id": null });
        let request: Request = serde_json::from_value(raw).unwrap();
        let response = service.call(request).await.unwrap().unwrap();
        assert_eq!(response.id(), &Id::Null);
        assert_eq!(response.error_value(), Some(&jsonrpc::Error::method_not_found()));
    }

    #[tokio::test]
    async fn cancel_request() {
        let (service, _handles) = service();
        let mut service = Spawn::new(service);

        let request: Request = serde_json::from_str(EXECUTE_REQUEST).unwrap();
        let running = tokio::spawn(service.call(request));
        assert_eq!(service.get_ref().pending(), 1);

        let cancel: Request = serde_json::from_str(CANCEL_NOTIF).unwrap();
        assert_eq!(service.call(cancel).await, Ok(None));

        let response = running.await.unwrap().unwrap().unwrap();
        assert_eq!(response.id(), &Id::String("wait".into()));
        assert_eq!(response.error_value(), Some(&jsonrpc::Error::request_cancelled()));
        assert_eq!(service.get_ref().pending(), 0);
    }

    #[tokio::test]
    async fn notifications_are_ignored() {
        let (service, _handles) = service();
        let mut service = Spawn::new(service);

        let initialized: Request = serde_json::from_str(INITIALIZED_NOTIF).unwrap();
        assert_eq!(service.call(initialized).await, Ok(None));

        let malformed = Request::notification(CANCEL_REQUEST, Some(json!({ "id": [] })));
        assert_eq!(service.call(malformed).await, Ok(None));
    }

    #[tokio::test]
    async fn refuses_requests_after_shutdown() {
        let (service, _handles) = service();
        let mut service = Spawn::new(service);

        let request: Request = serde_json::from_str(EXECUTE_REQUEST).unwrap();
        let running = tokio::spawn(service.call(request));

        service.get_ref().shutdown();
        assert!(service.get_ref().is_closed());
        let response = running.await.unwrap().unwrap().unwrap();
        assert_eq!(response.error_value(), Some(&jsonrpc::Error::request_cancelled()));

        let request: Request = serde_json::from_str(REFERENCES_REQUEST).unwrap();
        assert_eq!(service.poll_ready(), Poll::Ready(Err(ClosedError)));
        assert_eq!(service.call(request).await, Err(ClosedError));
    }

    #[test]
    fn debug() {
        let (service, _handles) = service();
        format!("{:?}", service);
    }

    mod closed_error {
        use super::*;

        #[test]
        fn display() {
            let error = ClosedError;
            let display = format!("{}", error);
            assert_eq!("handler service has shut down", display);
        }
    }
}
