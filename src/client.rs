//! Types for sending notifications back to the language client.

use crate::jsonrpc::Notification;
use futures::{
    channel::mpsc,
    stream::{FusedStream, Stream},
};
use serde_json::{json, Value};
use std::{
    fmt::{self, Debug, Formatter},
    pin::Pin,
    sync::Arc,
    task::{Context, Poll},
};

struct ClientInner {
    sender: mpsc::UnboundedSender<Notification>,
}

/// Handle for sending notifications to the language client.
///
/// Sending never blocks: messages are queued and delivered in the order they were sent through the
/// paired [`MessageStream`]. Once the stream is dropped, further messages are discarded.
///
/// This type provides a very cheap implementation of [`Clone`] so API consumers can cheaply clone
/// and pass it around as needed.
///
/// [`Clone`]: trait@std::clone::Clone
#[derive(Clone)]
pub struct Client {
    inner: Arc<ClientInner>,
}

impl Client {
    /// Creates a new client handle together with the stream of messages it produces.
    pub fn new() -> (Self, MessageStream) {
        let (sender, receiver) = mpsc::unbounded();
        let client = Client {
            inner: Arc::new(ClientInner { sender }),
        };
        (client, MessageStream(receiver))
    }

    /// Sends a typed notification to the client.
    pub fn send_notification<N>(&self, params: N::Params)
    where
        N: lsp::notification::Notification,
    {
        if let Some(message) = Notification::new::<N>(params) {
            self.send(message);
        }
    }

    /// Sends a `$/progress` notification carrying an arbitrary value.
    ///
    /// Partial results travel this way: the value is a piece of the method's result rather than a
    /// work-done progress payload.
    pub fn send_progress(&self, token: &lsp::ProgressToken, value: Value) {
        let method = <lsp::notification::Progress as lsp::notification::Notification>::METHOD;
        self.send(Notification::raw(method, json!({ "token": token, "value": value })));
    }

    /// Returns `true` if the paired message stream has been dropped.
    pub fn is_closed(&self) -> bool {
        self.inner.sender.is_closed()
    }

    fn send(&self, message: Notification) {
        if let Err(e) = self.inner.sender.unbounded_send(message) {
            log::trace!("message stream closed, dropping: {}", e.into_inner());
        }
    }
}

impl Debug for Client {
    fn fmt(&self, f: &mut Formatter) -> fmt::Result {
        f.debug_struct(stringify!(Client))
            .field("closed", &self.is_closed())
            .finish()
    }
}

/// Stream of notifications produced by the server.
#[derive(Debug)]
#[must_use = "streams do nothing unless polled"]
pub struct MessageStream(mpsc::UnboundedReceiver<Notification>);

impl MessageStream {
    /// Returns all notifications queued so far without waiting for new ones.
    pub fn drain(&mut self) -> Vec<Notification> {
        let mut messages = Vec::new();
        while let Ok(Some(message)) = self.0.try_next() {
            messages.push(message);
        }
        messages
    }
}

impl Stream for MessageStream {
    type Item = Notification;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context) -> Poll<Option<Self::Item>> {
        let recv = &mut self.as_mut().0;
        Pin::new(recv).poll_next(cx)
    }
}

impl FusedStream for MessageStream {
    fn is_terminated(&self) -> bool {
        self.0.is_terminated()
    }
}
