//! # kad-table
//!
//! The routing table: a bank of `B * 8` fixed-capacity buckets indexed by
//! leading-zero-bit distance from the local peer, plus the unavailability
//! bookkeeping that evicts peers after repeated timeouts.

use std::collections::{HashMap, VecDeque};

use kad_id::{Distance, Id, NUM_BUCKETS};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Bucket and shortlist capacity.
pub const K: usize = 20;

/// Consecutive-timeout threshold before a peer is evicted.
pub const R: u32 = 3;

/// A contact: an [`Id`] plus the host/port the peer is currently reachable
/// at. Identity and equality are taken from `id` alone -- `(host, port)`
/// is refreshable metadata, not part of a peer's identity.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Peer {
    pub id: Id,
    pub host: String,
    pub port: u16,
}

impl Peer {
    pub fn new(id: Id, host: impl Into<String>, port: u16) -> Self {
        Self {
            id,
            host: host.into(),
            port,
        }
    }
}

impl PartialEq for Peer {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for Peer {}

impl std::hash::Hash for Peer {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}

/// The outcome of an [`RoutingTable::update`] call, for callers that want
/// to observe whether a peer was actually admitted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpdateOutcome {
    /// The peer was new and the bucket had room.
    Inserted,
    /// The peer was already present; membership is identity-based so this
    /// is a no-op (metadata refresh is not performed).
    AlreadyPresent,
    /// The peer's bucket was at capacity `K`; the sighting is dropped
    /// (tail-drop, least-recently-seen-wins).
    BucketFull,
    /// `peer.id == self_id`; the local peer is never inserted into its own
    /// table.
    SelfId,
}

/// Errors raised by [`RoutingTable::insert`], the checked counterpart of
/// [`RoutingTable::update`] for callers (configured bootstrap peers, admin
/// tooling) that need to know a sighting was actually admitted rather than
/// silently dropped.
#[derive(Debug, Error)]
pub enum TableError {
    #[error("cannot insert the local peer's own id into its routing table")]
    SelfInsertion,
    #[error("bucket full, no room for new peer")]
    BucketFull,
}

struct Bucket {
    entries: VecDeque<Peer>,
}

impl Bucket {
    fn new() -> Self {
        Self {
            entries: VecDeque::new(),
        }
    }

    fn contains(&self, id: &Id) -> bool {
        self.entries.iter().any(|p| &p.id == id)
    }

    fn remove(&mut self, id: &Id) -> bool {
        if let Some(pos) = self.entries.iter().position(|p| &p.id == id) {
            self.entries.remove(pos);
            true
        } else {
            false
        }
    }
}

/// The per-peer routing table: `self_id` plus `NUM_BUCKETS` queues of
/// contacts, and a consecutive-failure counter used for eviction.
///
/// Invariants (see spec §8 properties 1-6, enforced by construction):
/// a peer appears in at most one bucket, and only in the bucket equal to
/// `bucket_index(self_id XOR peer.id)`; `self_id` is never present;
/// every bucket's length is bounded by [`K`].
pub struct RoutingTable {
    self_id: Id,
    buckets: Vec<Bucket>,
    unavailability: HashMap<Id, u32>,
}

impl RoutingTable {
    /// Create an empty table for `self_id`, optionally seeded with a
    /// single bootstrap peer.
    pub fn new(self_id: Id, bootstrap_peer: Option<Peer>) -> Self {
        let mut table = Self {
            self_id,
            buckets: (0..NUM_BUCKETS).map(|_| Bucket::new()).collect(),
            unavailability: HashMap::new(),
        };
        if let Some(peer) = bootstrap_peer {
            table.update(peer);
        }
        table
    }

    pub fn self_id(&self) -> &Id {
        &self.self_id
    }

    /// The bucket index a peer with identifier `id` belongs in, relative
    /// to this table's `self_id`.
    fn bucket_index_for(&self, id: &Id) -> usize {
        Distance::between(&self.self_id, id).bucket_index()
    }

    /// Admit a sighting of `peer` into the table.
    ///
    /// Ignored if `peer.id == self_id`. If already present, this is a
    /// no-op (identity-based membership). Otherwise appended to the tail
    /// of its bucket if there is room, or dropped if the bucket is full --
    /// no liveness probe of the bucket head is performed, per the
    /// documented tail-drop policy.
    pub fn update(&mut self, peer: Peer) -> UpdateOutcome {
        if peer.id == self.self_id {
            tracing::debug!(peer_id = %peer.id, "ignoring self-sighting");
            return UpdateOutcome::SelfId;
        }

        let idx = self.bucket_index_for(&peer.id);
        let bucket = &mut self.buckets[idx];

        if bucket.contains(&peer.id) {
            tracing::debug!(peer_id = %peer.id, bucket = idx, "peer already present");
            return UpdateOutcome::AlreadyPresent;
        }

        if bucket.entries.len() >= K {
            tracing::debug!(peer_id = %peer.id, bucket = idx, "bucket full, dropping sighting");
            return UpdateOutcome::BucketFull;
        }

        tracing::debug!(peer_id = %peer.id, bucket = idx, "inserted peer");
        bucket.entries.push_back(peer);
        UpdateOutcome::Inserted
    }

    /// Checked counterpart of [`Self::update`]: admits `peer` the same
    /// way, but turns the two non-exceptional-for-a-passive-sighting
    /// outcomes that ARE exceptional for a caller deliberately adding a
    /// known peer (a misconfigured bootstrap contact, an admin seed) into
    /// an `Err` instead of a silently ignored outcome.
    pub fn insert(&mut self, peer: Peer) -> Result<(), TableError> {
        match self.update(peer) {
            UpdateOutcome::Inserted | UpdateOutcome::AlreadyPresent => Ok(()),
            UpdateOutcome::BucketFull => Err(TableError::BucketFull),
            UpdateOutcome::SelfId => Err(TableError::SelfInsertion),
        }
    }

    /// Return up to `n` peers ordered by distance to `target`, closest
    /// first.
    ///
    /// Sweeps outward from `i0 = bucket_index(self_id, target)`,
    /// gathering `i0 - shift` and `i0 + shift` (each visited at most
    /// once), until both directions are exhausted or enough candidates
    /// have been collected; the gathered set is then sorted globally by
    /// distance to `target` and truncated.
    pub fn find_closest(&self, target: &Id, n: usize) -> Vec<Peer> {
        let i0 = self.bucket_index_for(target) as isize;
        let mut collected: Vec<Peer> = Vec::new();
        let mut shift: isize = 0;

        loop {
            let lo = i0 - shift;
            let hi = i0 + shift;
            let lo_in_range = lo >= 0 && (lo as usize) < NUM_BUCKETS;
            let hi_in_range = hi >= 0 && (hi as usize) < NUM_BUCKETS && hi != lo;

            if !lo_in_range && !hi_in_range {
                break;
            }
            if lo_in_range {
                collected.extend(self.buckets[lo as usize].entries.iter().cloned());
            }
            if hi_in_range {
                collected.extend(self.buckets[hi as usize].entries.iter().cloned());
            }

            if collected.len() >= n {
                // Keep sweeping one more step only if additional buckets at
                // this radius might still contain closer entries is not
                // possible once both directions are in range and collected
                // has met n; stop here.
                break;
            }
            shift += 1;
        }

        collected.sort_by_key(|p| Distance::between(target, &p.id));
        collected.truncate(n);
        collected
    }

    /// Record a failed call to `peer_id`. After [`R`] consecutive failures
    /// the peer is removed from its bucket and the counter is cleared.
    /// Returns `true` if the peer was evicted by this call.
    pub fn mark_unavailable(&mut self, peer_id: &Id) -> bool {
        let count = self.unavailability.entry(*peer_id).or_insert(0);
        *count += 1;

        if *count >= R {
            let idx = self.bucket_index_for(peer_id);
            let removed = self.buckets[idx].remove(peer_id);
            self.unavailability.remove(peer_id);
            if removed {
                tracing::warn!(peer_id = %peer_id, "peer evicted after repeated timeouts");
            }
            removed
        } else {
            tracing::debug!(peer_id = %peer_id, failures = *count, "peer marked unavailable");
            false
        }
    }

    /// Current consecutive-failure count for `peer_id` (0 if never
    /// reported unavailable, or if it was just reset by an eviction).
    pub fn unavailability_count(&self, peer_id: &Id) -> u32 {
        self.unavailability.get(peer_id).copied().unwrap_or(0)
    }

    /// Total number of peers across all buckets.
    pub fn len(&self) -> usize {
        self.buckets.iter().map(|b| b.entries.len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
