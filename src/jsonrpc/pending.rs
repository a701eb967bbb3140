//! Hashmap for tracking in-flight server requests.

use super::{Error, Id, Response};
use crate::HandlerError;
use dashmap::{mapref::entry::Entry, DashMap};
use futures::future;
use serde_json::Value;
use std::{
    fmt::{self, Debug, Formatter},
    future::Future,
    sync::Arc,
};
use tokio_util::sync::CancellationToken;

/// A hashmap containing in-flight server requests, keyed by request ID.
///
/// Each request owns a [`CancellationToken`] which `$/cancelRequest` fires.
pub struct ServerRequests(Arc<DashMap<Id, CancellationToken>>);

impl ServerRequests {
    /// Creates a new pending server requests map.
    pub fn new() -> Self {
        ServerRequests(Arc::new(DashMap::new()))
    }

    /// Starts the request produced by `start`, keyed by the given request ID.
    ///
    /// `start` is invoked immediately with the token for this request, so any ordering decided
    /// while starting follows the order in which `execute` is called. A cancelled request resolves
    /// to a "canceled" error response. A second request reusing an in-flight ID is rejected with an
    /// "invalid request" error.
    pub fn execute<F, Fut>(&self, id: Id, start: F) -> impl Future<Output = Response> + Send + 'static
    where
        F: FnOnce(CancellationToken) -> Fut,
        Fut: Future<Output = Result<Value, HandlerError>> + Send + 'static,
    {
        let token = match self.0.entry(id.clone()) {
            Entry::Vacant(entry) => entry.insert(CancellationToken::new()).clone(),
            Entry::Occupied(_) => {
                log::warn!("request ID {} is already in flight, rejecting duplicate", id);
                return future::Either::Right(async { Response::error(Some(id), Error::invalid_request()) });
            },
        };

        let fut = start(token);
        let guard = Forget {
            requests: self.0.clone(),
            id: id.clone(),
        };

        future::Either::Left(async move {
            let result = fut.await;
            drop(guard);
            Response::from_parts(id, result.map_err(HandlerError::into_rpc_error))
        })
    }

    /// Attempts to cancel the running request corresponding to this ID.
    ///
    /// If the request has already completed, this method call will do nothing.
    pub fn cancel(&self, id: &Id) {
        if let Some((_, token)) = self.0.remove(id) {
            token.cancel();
            log::info!("successfully cancelled request with ID: {}", id);
        } else {
            log::warn!(
                "client asked to cancel request {}, but no such pending request exists, ignoring",
                id
            );
        }
    }

    /// Cancels all in-flight requests, if any.
    pub fn cancel_all(&self) {
        self.0.retain(|_, token| {
            token.cancel();
            false
        });
    }

    /// Returns the number of requests currently in flight.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Returns `true` if no request is in flight.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl Default for ServerRequests {
    fn default() -> Self {
        ServerRequests::new()
    }
}

impl Debug for ServerRequests {
    fn fmt(&self, f: &mut Formatter) -> fmt::Result {
        f.debug_set()
            .entries(self.0.iter().map(|entry| entry.key().clone()))
            .finish()
    }
}

// Removes the request from the map once its future completes or is dropped.
struct Forget {
    requests: Arc<DashMap<Id, CancellationToken>>,
    id: Id,
}

impl Drop for Forget {
    fn drop(&mut self) {
        self.requests.remove(&self.id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::time::Duration;

    #[test]
    fn debug() {
        let server_requests = ServerRequests::new();
        format!("{:?}", server_requests);
    }

    #[tokio::test]
    async fn execute() {
        let pending = ServerRequests::new();

        let id = Id::Number(1);
        let response = pending.execute(id.clone(), |_| async { Ok(json!({})) }).await;

        assert_eq!(response, Response::ok(id, json!({})));
        assert!(pending.is_empty());
    }

    #[tokio::test]
    async fn execute_concurrent() {
        let pending = ServerRequests::new();
        let id = Id::Number(1);
        let fut0 = pending.execute(id.clone(), |_| async { Ok(json!({})) });
        let fut1 = pending.execute(id.clone(), |_| async { Ok(json!({})) });
        assert_eq!(fut0.await, Response::ok(id.clone(), json!({})));
        assert_eq!(fut1.await, Response::error(Some(id), Error::invalid_request()));
    }

    #[tokio::test]
    async fn failure_is_reported() {
        let pending = ServerRequests::new();
        let id = Id::Number(3);
        let response = pending
            .execute(id.clone(), |_| async {
                Err(HandlerError::Failed(Error::content_modified()))
            })
            .await;
        assert_eq!(response, Response::error(Some(id), Error::content_modified()));
    }

    #[tokio::test]
    async fn cancel() {
        let pending = ServerRequests::new();

        let id = Id::Number(1);
        let handler_fut = tokio::spawn(pending.execute(id.clone(), |token| async move {
            token.cancelled().await;
            Err(HandlerError::Cancelled)
        }));

        tokio::time::sleep(Duration::from_millis(30)).await;
        assert_eq!(pending.len(), 1);
        pending.cancel(&id);

        let res = handler_fut.await.expect("task panicked");
        assert_eq!(res, Response::error(Some(id), Error::request_cancelled()));
        assert!(pending.is_empty());
    }

    #[tokio::test]
    async fn cancel_non_existent() {
        let pending = ServerRequests::new();
        let id = Id::Number(1);
        pending.cancel(&id);
    }

    #[tokio::test]
    async fn cancel_all() {
        let pending = ServerRequests::new();

        let mut handles = Vec::new();
        for n in 1 ..= 2 {
            handles.push(tokio::spawn(pending.execute(Id::Number(n), |token| async move {
                token.cancelled().await;
                Err(HandlerError::Cancelled)
            })));
        }

        tokio::time::sleep(Duration::from_millis(30)).await;
        pending.cancel_all();

        for (n, handle) in (1 ..= 2).zip(handles) {
            let res = handle.await.expect("task panicked");
            assert_eq!(res, Response::error(Some(Id::Number(n)), Error::request_cancelled()));
        }
    }

    #[tokio::test]
    async fn dropped_request_is_forgotten() {
        let pending = ServerRequests::new();
        let fut = pending.execute(Id::Number(9), |_| future::pending());
        assert_eq!(pending.len(), 1);
        drop(fut);
        assert!(pending.is_empty());
    }
}
