//! # kad-lookup
//!
//! The iterative shortlist lookup engine: drives `FIND_NODE` / `GET_VALUE`
//! across a growing shortlist of candidate peers under the
//! monotone-progress guard, and the `bootstrap` entry point that seeds a
//! fresh routing table from a single contact.

use std::collections::HashSet;
use std::sync::Arc;

use kad_id::{Distance, Id};
use kad_net::{Dispatcher, Transport};
use kad_proto::{Reply, Request};
use kad_table::{Peer, K};
use tokio::sync::Mutex;

/// The result of an [`LookupEngine::iterative_get`] call.
#[derive(Debug, Clone)]
pub enum LookupOutcome {
    /// The value was found somewhere along the shortlist.
    Value(String),
    /// No peer had the value; the K closest live peers to the target are
    /// returned instead.
    Peers(Vec<Peer>),
}

/// Defensive cap on shortlist growth, guarding against pathological
/// networks that keep returning fresh peers forever.
const MAX_SHORTLIST: usize = K * K;

/// Drives iterative `FIND_NODE`/`GET_VALUE` lookups for one peer.
pub struct LookupEngine<T: Transport> {
    dispatcher: Arc<Dispatcher<T>>,
    alpha: usize,
}

impl<T: Transport> LookupEngine<T> {
    /// `alpha` is the per-round fan-out; the spec's default is `K`
    /// (rather than the classical 3), configurable by the caller.
    pub fn new(dispatcher: Arc<Dispatcher<T>>, alpha: usize) -> Self {
        Self { dispatcher, alpha }
    }

    /// Populate the routing table by running `iterative_find` against the
    /// local peer's own id.
    pub async fn bootstrap(&self) -> Vec<Peer> {
        let self_id = self.dispatcher.self_peer().id;
        self.iterative_find(self_id).await
    }

    /// Return the K closest live peers to `target`.
    pub async fn iterative_find(&self, target: Id) -> Vec<Peer> {
        match self.run(target, None).await {
            LookupOutcome::Peers(peers) => peers,
            LookupOutcome::Value(_) => {
                unreachable!("iterative_find never issues GetValue requests")
            }
        }
    }

    /// Attempt to retrieve `data_key`, routed toward `target` (typically
    /// `hash(data_key)`). On a miss, returns the K closest live peers.
    pub async fn iterative_get(&self, data_key: &str, target: Id) -> LookupOutcome {
        self.run(target, Some(data_key.to_string())).await
    }

    async fn run(&self, target: Id, data_key: Option<String>) -> LookupOutcome {
        let self_id = self.dispatcher.self_peer().id;
        let mut shortlist: Vec<Peer> = {
            let table = self.dispatcher.table().lock().await;
            table.find_closest(&target, K)
        };
        let mut queried: HashSet<Id> = HashSet::new();
        let mut dead: HashSet<Id> = HashSet::new();
        let mut best: Option<Distance> = None;
        let mut round = 0usize;

        loop {
            round += 1;
            shortlist.sort_by_key(|p| Distance::between(&target, &p.id));

            let candidates: Vec<Peer> = shortlist
                .iter()
                .filter(|p| !queried.contains(&p.id))
                .take(self.alpha)
                .cloned()
                .collect();

            if candidates.is_empty() {
                tracing::debug!(round, "shortlist exhausted, terminating lookup");
                break;
            }

            let top_distance = Distance::between(&target, &candidates[0].id);
            let progressed = match best {
                None => true,
                Some(b) => top_distance < b,
            };
            if !progressed {
                tracing::debug!(round, "no progress this round, terminating lookup");
                break;
            }
            best = Some(top_distance);

            for peer in candidates {
                queried.insert(peer.id);
                let request = match &data_key {
                    Some(key) => Request::GetValue {
                        data_key: key.clone(),
                        target,
                    },
                    None => Request::FindNode { target },
                };

                match self.dispatcher.call(&peer, request).await {
                    Ok(Reply::Value(value)) => {
                        tracing::debug!(round, peer_id = %peer.id, "lookup hit");
                        return LookupOutcome::Value(value);
                    }
                    Ok(Reply::Nodes(nodes)) => {
                        let mut table = self.dispatcher.table().lock().await;
                        for node in nodes {
                            if node.id == self_id {
                                continue;
                            }
                            table.update(node.clone());
                            if shortlist.len() < MAX_SHORTLIST
                                && !shortlist.iter().any(|p| p.id == node.id)
                            {
                                shortlist.push(node);
                            }
                        }
                    }
                    Ok(Reply::Ok) | Ok(Reply::Error(_)) => {
                        tracing::warn!(peer_id = %peer.id, "unexpected reply shape during lookup");
                    }
                    Err(e) => {
                        tracing::debug!(peer_id = %peer.id, error = %e, "lookup call failed");
                        let mut table = self.dispatcher.table().lock().await;
                        table.mark_unavailable(&peer.id);
                        dead.insert(peer.id);
                    }
                }
            }
        }

        shortlist.retain(|p| !dead.contains(&p.id) && p.id != self_id);
        shortlist.sort_by_key(|p| Distance::between(&target, &p.id));
        shortlist.truncate(K);
        LookupOutcome::Peers(shortlist)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use kad_net::DispatchError;
    use kad_table::RoutingTable;
    use std::collections::HashMap;
    use std::time::Duration;
    use tokio::sync::Mutex as AsyncMutex;

    /// A transport whose `call` behavior is entirely scripted per target
    /// peer id: either a fixed reply or an always-timeout marker. No real
    /// sockets are ever touched.
    struct ScriptedTransport {
        replies: HashMap<Id, Reply>,
        always_timeout: HashSet<Id>,
        call_count: AsyncMutex<HashMap<Id, u32>>,
    }

    impl Transport for ScriptedTransport {
        type Conn = ();

        async fn serve_one(
            &self,
            _timeout: Duration,
        ) -> Result<Option<(Vec<u8>, Self::Conn)>, DispatchError> {
            Ok(None)
        }

        async fn reply(&self, _conn: Self::Conn, _bytes: &[u8]) -> Result<(), DispatchError> {
            Ok(())
        }

        async fn call(
            &self,
            peer: &Peer,
            _bytes: &[u8],
            _timeout: Duration,
        ) -> Result<Vec<u8>, DispatchError> {
            *self
                .call_count
                .lock()
                .await
                .entry(peer.id)
                .or_insert(0) += 1;

            if self.always_timeout.contains(&peer.id) {
                return Err(DispatchError::Timeout);
            }
            let reply = self
                .replies
                .get(&peer.id)
                .cloned()
                .unwrap_or(Reply::Nodes(vec![]));
            let envelope = kad_proto::Envelope::new_reply(peer.clone(), [0u8; 16], reply);
            envelope.to_bytes().map_err(DispatchError::from)
        }
    }

    fn peer(byte: u8) -> Peer {
        Peer::new(Id::from_bytes([byte; kad_id::B]), "127.0.0.1", 9000)
    }

    fn engine(
        self_peer: Peer,
        seed: Option<Peer>,
        transport: ScriptedTransport,
    ) -> (LookupEngine<ScriptedTransport>, Arc<Dispatcher<ScriptedTransport>>) {
        let table = Arc::new(Mutex::new(RoutingTable::new(self_peer.id, seed)));
        let store = Arc::new(Mutex::new(kad_store::ValueStore::new()));
        let dispatcher = Arc::new(Dispatcher::new(
            transport,
            self_peer,
            table,
            store,
            Duration::from_millis(200),
            Duration::from_millis(200),
        ));
        (LookupEngine::new(dispatcher.clone(), K), dispatcher)
    }

    #[tokio::test]
    async fn test_iterative_find_terminates_and_excludes_self() {
        let self_peer = peer(0x00);
        let seed = peer(0x01);
        let transport = ScriptedTransport {
            replies: HashMap::new(),
            always_timeout: HashSet::new(),
            call_count: AsyncMutex::new(HashMap::new()),
        };
        let (engine, _dispatcher) = engine(self_peer.clone(), Some(seed.clone()), transport);

        let result = engine.iterative_find(Id::from_bytes([0x02; kad_id::B])).await;
        assert!(result.len() <= K);
        assert!(!result.iter().any(|p| p.id == self_peer.id));
    }

    #[tokio::test]
    async fn test_property_8_dead_peers_excluded() {
        let self_peer = peer(0x00);
        let seed = peer(0x01);
        let mut always_timeout = HashSet::new();
        always_timeout.insert(seed.id);
        let transport = ScriptedTransport {
            replies: HashMap::new(),
            always_timeout,
            call_count: AsyncMutex::new(HashMap::new()),
        };
        let (engine, dispatcher) = engine(self_peer, Some(seed.clone()), transport);

        let result = engine.iterative_find(Id::from_bytes([0x02; kad_id::B])).await;
        assert!(!result.iter().any(|p| p.id == seed.id));

        let table = dispatcher.table().lock().await;
        assert_eq!(table.unavailability_count(&seed.id), 1);
    }

    #[tokio::test]
    async fn test_s7_timeout_accounting_evicts_after_r_failures() {
        let self_peer = peer(0x00);
        let seed = peer(0x01);
        let mut always_timeout = HashSet::new();
        always_timeout.insert(seed.id);
        let transport = ScriptedTransport {
            replies: HashMap::new(),
            always_timeout,
            call_count: AsyncMutex::new(HashMap::new()),
        };
        let (engine, dispatcher) = engine(self_peer, Some(seed.clone()), transport);

        for _ in 0..kad_table::R {
            engine.iterative_find(Id::from_bytes([0x02; kad_id::B])).await;
        }

        let final_lookup = engine.iterative_find(Id::from_bytes([0x02; kad_id::B])).await;
        assert!(!final_lookup.iter().any(|p| p.id == seed.id));
    }

    #[tokio::test]
    async fn test_bootstrap_seeds_from_single_peer() {
        let self_peer = peer(0x00);
        let seed = peer(0x01);
        let transport = ScriptedTransport {
            replies: HashMap::new(),
            always_timeout: HashSet::new(),
            call_count: AsyncMutex::new(HashMap::new()),
        };
        let (engine, _dispatcher) = engine(self_peer, Some(seed), transport);
        let discovered = engine.bootstrap().await;
        assert!(discovered.len() <= K);
    }
}
