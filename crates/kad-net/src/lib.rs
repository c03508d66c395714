//! # kad-net
//!
//! The request dispatcher: decodes inbound envelopes, updates the routing
//! table from every sender, dispatches `FIND_NODE` / `STORE_VALUE` /
//! `GET_VALUE`, and exposes the outbound `call` primitive the lookup
//! engine drives.
//!
//! The wire transport is abstracted behind [`Transport`] so the dispatch
//! logic can be exercised against an in-process stub in tests; [`tcp`]
//! provides the concrete TCP implementation used in production.

pub mod framing;
pub mod tcp;

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use kad_proto::{Envelope, Message, ProtoError, Reply, Request};
use kad_table::{Peer, RoutingTable, K};
use thiserror::Error;
use tokio::sync::{broadcast, Mutex};

pub use tcp::TcpTransport;

/// Errors surfaced by the dispatcher's inbound and outbound paths.
#[derive(Debug, Error)]
pub enum DispatchError {
    /// An outbound `call` exceeded its deadline.
    #[error("call timed out")]
    Timeout,
    /// A transport-level I/O failure (connection refused, reset, etc).
    #[error("transport i/o error: {0}")]
    Io(String),
    /// Envelope encoding or decoding failed.
    #[error(transparent)]
    Proto(#[from] ProtoError),
    /// The decoded message did not match what was expected in context
    /// (e.g. a request arrived where a reply was expected).
    #[error("malformed message: {0}")]
    Malformed(String),
}

/// The opaque request/reply socket the dispatcher is built on.
///
/// `serve_one` waits up to `timeout` for one inbound connection, returning
/// its raw (still-encoded) bytes and a handle used to send exactly one
/// reply back; `Ok(None)` means the timeout elapsed with nothing to serve.
/// `call` opens an independent connection per attempt -- implementations
/// MUST NOT reuse a connection whose prior call timed out.
pub trait Transport: Send + Sync + 'static {
    type Conn: Send;

    fn serve_one(
        &self,
        timeout: Duration,
    ) -> impl Future<Output = Result<Option<(Vec<u8>, Self::Conn)>, DispatchError>> + Send;

    fn reply(
        &self,
        conn: Self::Conn,
        bytes: &[u8],
    ) -> impl Future<Output = Result<(), DispatchError>> + Send;

    fn call(
        &self,
        peer: &Peer,
        bytes: &[u8],
        timeout: Duration,
    ) -> impl Future<Output = Result<Vec<u8>, DispatchError>> + Send;
}

/// Binds a [`Transport`] to a peer's routing table and value store,
/// running the inbound serve loop and exposing the outbound `call`
/// primitive.
pub struct Dispatcher<T: Transport> {
    transport: T,
    self_peer: Peer,
    table: Arc<Mutex<RoutingTable>>,
    store: Arc<Mutex<kad_store::ValueStore>>,
    call_timeout: Duration,
    poll_tick: Duration,
}

impl<T: Transport> Dispatcher<T> {
    pub fn new(
        transport: T,
        self_peer: Peer,
        table: Arc<Mutex<RoutingTable>>,
        store: Arc<Mutex<kad_store::ValueStore>>,
        call_timeout: Duration,
        poll_tick: Duration,
    ) -> Self {
        Self {
            transport,
            self_peer,
            table,
            store,
            call_timeout,
            poll_tick,
        }
    }

    /// Run the inbound serve loop until `shutdown` fires. Observes the
    /// shutdown signal once per `poll_tick`; outstanding outbound calls
    /// made through [`Dispatcher::call`] are unaffected and complete or
    /// time out naturally.
    pub async fn serve(&self, mut shutdown: broadcast::Receiver<()>) {
        loop {
            tokio::select! {
                biased;
                _ = shutdown.recv() => {
                    tracing::info!("dispatcher observed shutdown signal, exiting serve loop");
                    break;
                }
                result = self.transport.serve_one(self.poll_tick) => {
                    match result {
                        Ok(Some((bytes, conn))) => self.handle_inbound(bytes, conn).await,
                        Ok(None) => {}
                        Err(e) => tracing::warn!(error = %e, "serve_one failed"),
                    }
                }
            }
        }
    }

    async fn handle_inbound(&self, bytes: Vec<u8>, conn: T::Conn) {
        let envelope = match Envelope::from_bytes(&bytes) {
            Ok(envelope) => envelope,
            Err(e) => {
                tracing::warn!(error = %e, "malformed inbound envelope, routing table not updated");
                let error_reply =
                    Envelope::new_reply(self.self_peer.clone(), [0u8; 16], Reply::Error(e.to_string()));
                if let Ok(reply_bytes) = error_reply.to_bytes() {
                    let _ = self.transport.reply(conn, &reply_bytes).await;
                }
                return;
            }
        };

        let request = match envelope.body {
            Message::Request(request) => request,
            Message::Reply(_) => {
                tracing::warn!("received a reply on the inbound serve path, ignoring");
                return;
            }
        };

        {
            let mut table = self.table.lock().await;
            table.update(envelope.from.clone());
        }

        let reply = self.handle_request(request).await;
        let reply_envelope = Envelope::new_reply(self.self_peer.clone(), envelope.msg_id, reply);
        match reply_envelope.to_bytes() {
            Ok(reply_bytes) => {
                if let Err(e) = self.transport.reply(conn, &reply_bytes).await {
                    tracing::warn!(error = %e, "failed to send reply");
                }
            }
            Err(e) => tracing::warn!(error = %e, "failed to encode reply"),
        }
    }

    /// Apply one decoded `request` against this peer's routing table and
    /// store, producing its reply. Exposed (rather than kept private)
    /// because in-process transports used in tests need to invoke a
    /// peer's handler directly without a real connection.
    pub async fn handle_request(&self, request: Request) -> Reply {
        match request {
            Request::FindNode { target } => {
                let table = self.table.lock().await;
                Reply::Nodes(table.find_closest(&target, K))
            }
            Request::StoreValue { key, value } => {
                let mut store = self.store.lock().await;
                match store.put(key, value) {
                    Ok(()) => Reply::Ok,
                    Err(e) => Reply::Error(e.to_string()),
                }
            }
            Request::GetValue { data_key, target } => {
                let found = {
                    let store = self.store.lock().await;
                    store.get(&data_key).cloned()
                };
                match found {
                    Some(value) => Reply::Value(value),
                    None => {
                        let table = self.table.lock().await;
                        Reply::Nodes(table.find_closest(&target, K))
                    }
                }
            }
        }
    }

    /// Send `request` to `peer` and await its reply up to `call_timeout`.
    pub async fn call(&self, peer: &Peer, request: Request) -> Result<Reply, DispatchError> {
        let envelope = Envelope::new_request(self.self_peer.clone(), request);
        let bytes = envelope.to_bytes()?;
        let reply_bytes = self.transport.call(peer, &bytes, self.call_timeout).await?;
        let reply_envelope = Envelope::from_bytes(&reply_bytes)?;
        match reply_envelope.body {
            Message::Reply(reply) => Ok(reply),
            Message::Request(_) => {
                Err(DispatchError::Malformed("expected a reply, got a request".into()))
            }
        }
    }

    pub fn self_peer(&self) -> &Peer {
        &self.self_peer
    }

    pub fn table(&self) -> &Arc<Mutex<RoutingTable>> {
        &self.table
    }

    pub fn store(&self) -> &Arc<Mutex<kad_store::ValueStore>> {
        &self.store
    }
}
