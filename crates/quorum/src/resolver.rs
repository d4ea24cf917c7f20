// Copyright 2024 RustFS Team
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Quorum tag resolution
//!
//! Folds the tags and shares reported by a set of replicas into two certified
//! outcomes: the largest tag seen by at least `intersection` voters (durably
//! written, since any write quorum overlaps any read quorum that much) and the
//! largest tag for which at least `recovery` shares arrived (decodable). The
//! two are independent and the recoverable tag may lag the durable one.

use crate::error::QuorumError;
use crate::observation::ReplicaObservation;
use crate::thresholds::QuorumThresholds;
use hashbrown::hash_map::Entry;
use hashbrown::{HashMap, HashSet};
use metrics::counter;
use std::sync::Arc;
use tracing::{debug, warn};
use treas_common::globals::{GLOBAL_TAG_STORE, local_node_name};
use treas_common::{LocalTagStore, Share, TableId, Tag, ValueRecord};

/// Certified result of one resolution call
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolutionOutcome {
    pub key: String,
    pub table: TableId,
    /// Largest tag seen by an intersection's worth of voters
    pub quorum_max_tag: Tag,
    /// Largest tag with enough shares to decode
    pub recover_max_tag: Tag,
    /// Every share collected for `recover_max_tag`, ordered by fragment index
    pub recover_shares: Vec<Share>,
}

impl ResolutionOutcome {
    /// Whether the decodable value is the latest durable one
    pub fn is_current(&self) -> bool {
        self.recover_max_tag >= self.quorum_max_tag
    }
}

/// Per-call aggregation state
#[derive(Debug)]
struct AggregationState {
    intersection: usize,
    recovery: usize,
    quorum_count: HashMap<Tag, usize>,
    share_set: HashMap<Tag, Vec<Share>>,
    quorum_max_tag: Tag,
    recover_max_tag: Tag,
}

impl AggregationState {
    fn new(thresholds: &QuorumThresholds) -> Self {
        Self {
            intersection: thresholds.intersection(),
            recovery: thresholds.recovery(),
            quorum_count: HashMap::new(),
            share_set: HashMap::new(),
            quorum_max_tag: Tag::SENTINEL,
            recover_max_tag: Tag::SENTINEL,
        }
    }

    /// The resolving node is itself a replica and votes with its local record
    fn seed_local(&mut self, record: &ValueRecord) {
        if record.is_empty() {
            return;
        }
        self.observe_marker(record.max_tag);
        if let (Some(tag), Some(share)) = (record.share_tag(), record.share.clone()) {
            self.observe_share(tag, share);
        }
    }

    fn observe_marker(&mut self, tag: Tag) {
        let count = self.quorum_count.entry(tag).or_insert(0);
        *count += 1;
        // exactly at the crossing; later sightings cannot change the verdict
        if *count == self.intersection && tag.is_larger_than(&self.quorum_max_tag) {
            self.quorum_max_tag = tag;
        }
    }

    fn observe_share(&mut self, tag: Tag, share: Share) {
        let shares = self.share_set.entry(tag).or_default();
        shares.push(share);
        if shares.len() == self.recovery && tag.is_larger_than(&self.recover_max_tag) {
            self.recover_max_tag = tag;
        }
    }

    fn observe(&mut self, observation: &ReplicaObservation) {
        let mut shares_taken = 0;
        let mut voted: HashSet<Tag> = HashSet::new();
        for seen in &observation.tags {
            match &seen.share {
                // one vote per replica per tag
                None if !voted.insert(seen.tag) => {}
                None => self.observe_marker(seen.tag),
                Some(_) if shares_taken > 0 => {
                    warn!(
                        replica = %observation.replica,
                        key = %observation.key,
                        tag = %seen.tag,
                        "Ignoring extra share in replica response"
                    );
                }
                Some(share) => {
                    shares_taken += 1;
                    self.observe_share(seen.tag, share.clone());
                }
            }
        }
    }

    fn finish(mut self, table: &TableId, key: &str) -> Result<ResolutionOutcome, QuorumError> {
        if self.quorum_max_tag.is_sentinel() || self.recover_max_tag.is_sentinel() {
            return Err(QuorumError::InsufficientEvidence {
                key: key.to_string(),
                quorum_max_tag: self.quorum_max_tag,
                recover_max_tag: self.recover_max_tag,
            });
        }

        let mut recover_shares = self.share_set.remove(&self.recover_max_tag).unwrap_or_default();
        recover_shares.sort_by(|a, b| a.index.cmp(&b.index).then_with(|| a.data.cmp(&b.data)));

        Ok(ResolutionOutcome {
            key: key.to_string(),
            table: table.clone(),
            quorum_max_tag: self.quorum_max_tag,
            recover_max_tag: self.recover_max_tag,
            recover_shares,
        })
    }
}

/// Total order over one replica's evidence; the largest copy of a duplicated response wins
fn evidence_rank(observation: &ReplicaObservation) -> (Tag, Vec<(usize, Tag, Option<(u32, &[u8])>)>) {
    let tags = observation
        .tags
        .iter()
        .map(|t| (t.slot, t.tag, t.share.as_ref().map(|s| (s.index, s.data.as_ref()))))
        .collect();
    (observation.max_tag(), tags)
}

/// Resolves replica observations for one key into a [`ResolutionOutcome`]
#[derive(Debug, Clone)]
pub struct QuorumTagResolver {
    thresholds: QuorumThresholds,
    store: Arc<LocalTagStore>,
    local_node: Option<String>,
}

impl QuorumTagResolver {
    /// Resolver voting with the process-wide local tag store as the process-wide local node
    pub fn new(thresholds: QuorumThresholds) -> Self {
        Self::with_store(thresholds, GLOBAL_TAG_STORE.clone()).with_local_node(&local_node_name())
    }

    pub fn with_store(thresholds: QuorumThresholds, store: Arc<LocalTagStore>) -> Self {
        Self {
            thresholds,
            store,
            local_node: None,
        }
    }

    /// Name the resolving node answers under when it is also one of the replicas.
    ///
    /// An empty name clears it.
    pub fn with_local_node(mut self, name: &str) -> Self {
        self.local_node = (!name.is_empty()).then(|| name.to_string());
        self
    }

    pub fn with_thresholds(mut self, thresholds: QuorumThresholds) -> Self {
        self.thresholds = thresholds;
        self
    }

    pub fn thresholds(&self) -> &QuorumThresholds {
        &self.thresholds
    }

    /// Local tag store this resolver votes with
    pub fn store(&self) -> &Arc<LocalTagStore> {
        &self.store
    }

    pub fn local_node(&self) -> Option<&str> {
        self.local_node.as_deref()
    }

    /// Fold every replica's observations for `key` into certified tags.
    ///
    /// Observations for another key or table are skipped. A replica is counted
    /// once even if its response shows up twice. The local record votes only
    /// when the local node's own response is absent, so a node is never more
    /// than one voter. Fails with [`QuorumError::InsufficientEvidence`] when
    /// either tag is still the sentinel; the shares are never handed out in
    /// that case.
    pub fn resolve<'a, I>(&self, table: &TableId, key: &str, observations: I) -> Result<ResolutionOutcome, QuorumError>
    where
        I: IntoIterator<Item = &'a ReplicaObservation>,
    {
        let mut by_replica: HashMap<&'a str, &'a ReplicaObservation> = HashMap::new();
        for observation in observations {
            if observation.key != key || observation.table != *table {
                warn!(
                    replica = %observation.replica,
                    expected = %key,
                    got = %observation.key,
                    table = %observation.table,
                    "Skipping response for a different key"
                );
                continue;
            }
            match by_replica.entry(observation.replica.as_str()) {
                Entry::Vacant(slot) => {
                    slot.insert(observation);
                }
                Entry::Occupied(mut slot) => {
                    debug!(replica = %observation.replica, "Collapsing duplicate replica response");
                    if evidence_rank(observation) > evidence_rank(slot.get()) {
                        slot.insert(observation);
                    }
                }
            }
        }

        let mut state = AggregationState::new(&self.thresholds);
        let local_responded = self.local_node.as_deref().is_some_and(|node| by_replica.contains_key(node));
        if local_responded {
            debug!(key = %key, "Local node answered as a replica, its record does not vote again");
        } else {
            let local = self.store.read_tag(key);
            debug!(key = %key, local_tag = %local.max_tag, "Seeding resolution with local record");
            state.seed_local(&local);
        }

        for observation in by_replica.values() {
            state.observe(observation);
        }

        counter!("treas_resolutions_total").increment(1);
        let outcome = state.finish(table, key);
        match &outcome {
            Ok(outcome) => debug!(
                key = %outcome.key,
                quorum_max = %outcome.quorum_max_tag,
                recover_max = %outcome.recover_max_tag,
                shares = outcome.recover_shares.len(),
                "Resolved tags"
            ),
            Err(err) => {
                counter!("treas_resolution_failures_total").increment(1);
                debug!(error = %err, "Failed to certify tags");
            }
        }
        outcome
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tag(time: i64, writer: i32) -> Tag {
        Tag::new(writer, time)
    }

    fn table() -> TableId {
        TableId::new("ycsb", "usertable")
    }

    fn replica(name: &str) -> ReplicaObservation {
        ReplicaObservation::new(name, "user1", table())
    }

    fn resolver(intersection: usize, recovery: usize) -> QuorumTagResolver {
        QuorumTagResolver::with_store(
            QuorumThresholds::new(intersection, recovery).unwrap(),
            Arc::new(LocalTagStore::new()),
        )
    }

    fn share(index: u32) -> Share {
        Share::new(index, format!("fragment-{index}"))
    }

    #[test]
    fn test_first_tag_to_reach_intersection_wins() {
        let (t1, t2) = (tag(1, 1), tag(2, 1));
        let observations = vec![
            replica("r1").marker(1, t1),
            replica("r2").marker(1, t1),
            replica("r3").marker(1, t2),
        ];

        let err = resolver(2, 1).resolve(&table(), "user1", &observations).unwrap_err();
        // no shares at all, so recovery never certifies
        assert_eq!(
            err,
            QuorumError::InsufficientEvidence {
                key: String::from("user1"),
                quorum_max_tag: t1,
                recover_max_tag: Tag::SENTINEL,
            }
        );
    }

    #[test]
    fn test_two_shares_certify_recovery() {
        let t3 = tag(3, 2);
        let observations = vec![
            replica("r1").marker(1, t3).share(2, t3, share(1)),
            replica("r2").marker(1, t3).share(2, t3, share(0)),
        ];

        let outcome = resolver(2, 2).resolve(&table(), "user1", &observations).unwrap();
        assert_eq!(outcome.recover_max_tag, t3);
        assert_eq!(outcome.quorum_max_tag, t3);
        assert_eq!(outcome.recover_shares, vec![share(0), share(1)]);
        assert_eq!(outcome.key, "user1");
        assert_eq!(outcome.table, table());
        assert!(outcome.is_current());
    }

    #[test]
    fn test_single_response_cannot_certify() {
        let observations = vec![replica("r1").marker(1, tag(5, 1)).share(2, tag(5, 1), share(0))];
        let err = resolver(2, 1).resolve(&table(), "user1", &observations).unwrap_err();
        assert!(matches!(
            err,
            QuorumError::InsufficientEvidence { quorum_max_tag, .. } if quorum_max_tag.is_sentinel()
        ));
    }

    #[test]
    fn test_no_responses_fails_for_requested_key() {
        let err = resolver(1, 1).resolve(&table(), "user1", &Vec::<ReplicaObservation>::new()).unwrap_err();
        assert_eq!(
            err,
            QuorumError::InsufficientEvidence {
                key: String::from("user1"),
                quorum_max_tag: Tag::SENTINEL,
                recover_max_tag: Tag::SENTINEL,
            }
        );
    }

    #[test]
    fn test_recover_tag_lags_quorum_tag() {
        let (old, new) = (tag(4, 1), tag(7, 1));
        let observations = vec![
            replica("r1").marker(1, new).share(2, old, share(0)),
            replica("r2").marker(1, new).share(2, old, share(1)),
            replica("r3").marker(1, new).share(2, new, share(2)),
        ];

        let outcome = resolver(2, 2).resolve(&table(), "user1", &observations).unwrap();
        assert_eq!(outcome.quorum_max_tag, new);
        assert_eq!(outcome.recover_max_tag, old);
        assert_eq!(outcome.recover_shares, vec![share(0), share(1)]);
        assert!(!outcome.is_current());
    }

    #[test]
    fn test_smaller_tags_never_retract_certification() {
        let (high, low) = (tag(9, 1), tag(3, 1));
        let mut observations = vec![replica("r1").marker(1, high), replica("r2").marker(1, high)];
        for i in 0..5 {
            observations.push(replica(&format!("late{i}")).marker(1, low).share(2, high, share(i)));
        }

        let outcome = resolver(2, 1).resolve(&table(), "user1", &observations).unwrap();
        assert_eq!(outcome.quorum_max_tag, high);
        assert_eq!(outcome.recover_max_tag, high);
        // shares keep accumulating after the crossing
        assert_eq!(outcome.recover_shares.len(), 5);
    }

    #[test]
    fn test_local_record_votes_once() {
        let store = Arc::new(LocalTagStore::new());
        let t = tag(6, 3);
        store.write("user1", ValueRecord::from_history(vec![t], Some((0, share(2)))));
        let resolver = QuorumTagResolver::with_store(QuorumThresholds::new(2, 2).unwrap(), store);

        let observations = vec![replica("r1").marker(1, t).share(2, t, share(0))];
        let outcome = resolver.resolve(&table(), "user1", &observations).unwrap();
        assert_eq!(outcome.quorum_max_tag, t);
        assert_eq!(outcome.recover_max_tag, t);
        assert_eq!(outcome.recover_shares, vec![share(0), share(2)]);
    }

    #[test]
    fn test_never_seen_local_key_seeds_nothing() {
        let store = Arc::new(LocalTagStore::new());
        let resolver = QuorumTagResolver::with_store(QuorumThresholds::new(1, 1).unwrap(), store.clone());

        let t = tag(1, 1);
        let outcome = resolver.resolve(&table(), "user1", &[replica("r1").marker(1, t).share(2, t, share(0))]).unwrap();
        assert_eq!(outcome.quorum_max_tag, t);
        assert!(store.get("user1").unwrap().is_empty());
    }

    #[test]
    fn test_duplicate_replica_counted_once() {
        let t = tag(2, 2);
        let r1 = replica("r1").marker(1, t).share(2, t, share(0));
        let observations = vec![r1.clone(), r1];

        let err = resolver(2, 2).resolve(&table(), "user1", &observations).unwrap_err();
        assert!(matches!(err, QuorumError::InsufficientEvidence { .. }));
    }

    #[test]
    fn test_extra_shares_in_one_response_ignored() {
        let t = tag(2, 2);
        let observations = vec![replica("r1").share(1, t, share(0)).share(2, t, share(1))];
        let err = resolver(1, 2).resolve(&table(), "user1", &observations).unwrap_err();
        assert!(matches!(
            err,
            QuorumError::InsufficientEvidence { recover_max_tag, .. } if recover_max_tag.is_sentinel()
        ));
    }

    #[test]
    fn test_foreign_key_responses_skipped() {
        let t = tag(2, 2);
        let observations = vec![
            replica("r1").marker(1, t).share(2, t, share(0)),
            ReplicaObservation::new("r2", "user2", table()).marker(1, t).share(2, t, share(1)),
        ];
        let err = resolver(2, 1).resolve(&table(), "user1", &observations).unwrap_err();
        assert!(matches!(err, QuorumError::InsufficientEvidence { .. }));
    }

    #[test]
    fn test_resolution_is_repeatable() {
        let t = tag(8, 1);
        let observations = vec![
            replica("r1").marker(1, t).share(2, t, share(1)),
            replica("r2").marker(1, t).share(2, t, share(0)),
            replica("r3").marker(1, tag(9, 9)),
        ];
        let resolver = resolver(2, 2);
        assert_eq!(resolver.resolve(&table(), "user1", &observations), resolver.resolve(&table(), "user1", &observations));
    }

    #[test]
    fn test_repeated_marker_votes_once_per_replica() {
        let t = tag(4, 1);
        let observations = vec![replica("r1").marker(1, t).marker(2, t).share(3, t, share(0))];
        let err = resolver(2, 1).resolve(&table(), "user1", &observations).unwrap_err();
        assert!(matches!(
            err,
            QuorumError::InsufficientEvidence { quorum_max_tag, .. } if quorum_max_tag.is_sentinel()
        ));
    }

    #[test]
    fn test_local_node_is_one_voter() {
        let store = Arc::new(LocalTagStore::new());
        let t = tag(7, 1);
        store.write("user1", ValueRecord::from_history(vec![t], Some((0, share(0)))));
        let resolver = QuorumTagResolver::with_store(QuorumThresholds::new(2, 1).unwrap(), store).with_local_node("self");

        let own = vec![ReplicaObservation::new("self", "user1", table()).marker(1, t).share(2, t, share(0))];
        let err = resolver.resolve(&table(), "user1", &own).unwrap_err();
        assert!(matches!(
            err,
            QuorumError::InsufficientEvidence { quorum_max_tag, .. } if quorum_max_tag.is_sentinel()
        ));

        // another replica's response leaves room for the local vote
        let other = vec![replica("r2").marker(1, t).share(2, t, share(1))];
        let outcome = resolver.resolve(&table(), "user1", &other).unwrap();
        assert_eq!(outcome.quorum_max_tag, t);
    }

    #[test]
    fn test_foreign_key_first_does_not_hijack_resolution() {
        let t = tag(3, 3);
        let observations = vec![
            ReplicaObservation::new("r0", "user2", table()).marker(1, tag(9, 9)).share(2, tag(9, 9), share(5)),
            replica("r1").marker(1, t).share(2, t, share(0)),
        ];
        let outcome = resolver(1, 1).resolve(&table(), "user1", &observations).unwrap();
        assert_eq!(outcome.key, "user1");
        assert_eq!(outcome.quorum_max_tag, t);
    }

    #[test]
    fn test_differing_duplicates_resolve_in_any_order() {
        let (old, new) = (tag(1, 1), tag(2, 1));
        let stale = replica("r1").marker(1, old).share(2, old, share(0));
        let fresh = replica("r1").marker(1, new).share(2, new, share(0));
        let resolver = resolver(1, 1);

        let forward = resolver.resolve(&table(), "user1", &[stale.clone(), fresh.clone()]).unwrap();
        let backward = resolver.resolve(&table(), "user1", &[fresh, stale]).unwrap();
        assert_eq!(forward, backward);
        assert_eq!(forward.recover_max_tag, new);
    }
}
