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

//! Order independence and idempotence of tag resolution

use proptest::prelude::*;
use std::sync::Arc;
use treas_common::{LocalTagStore, Share, TableId, Tag, ValueRecord};
use treas_quorum::{QuorumThresholds, QuorumTagResolver, ReplicaObservation};

fn observation_strategy() -> impl Strategy<Value = Vec<ReplicaObservation>> {
    // each replica: a few marker tags and optionally one share; names repeat
    // and some responses are for another key
    let replica = (
        prop::collection::vec((0i64..6, 0i32..3), 0..4),
        prop::option::of(((0i64..6, 0i32..3), 0u32..8)),
    );
    prop::collection::vec(replica, 0..10).prop_map(|replicas| {
        replicas
            .into_iter()
            .enumerate()
            .map(|(i, (markers, share))| {
                let key = if i % 7 == 6 { "other" } else { "key" };
                let mut observation = ReplicaObservation::new(&format!("r{}", i % 5), key, table());
                for (slot, (time, writer)) in markers.into_iter().enumerate() {
                    observation = observation.marker(slot + 1, Tag::new(writer, time));
                }
                if let Some(((time, writer), index)) = share {
                    observation = observation.share(9, Tag::new(writer, time), Share::new(index, format!("s{index}")));
                }
                observation
            })
            .collect()
    })
}

fn table() -> TableId {
    TableId::new("ks", "t")
}

fn resolver(intersection: usize, recovery: usize, local: Option<Tag>) -> QuorumTagResolver {
    let store = Arc::new(LocalTagStore::new());
    if let Some(tag) = local {
        store.write("key", ValueRecord::from_history(vec![tag], Some((0, Share::new(99, "local")))));
    }
    QuorumTagResolver::with_store(QuorumThresholds::new(intersection, recovery).unwrap(), store)
}

proptest! {
    #[test]
    fn permutation_does_not_change_outcome(
        (observations, shuffled) in observation_strategy()
            .prop_flat_map(|observations| (Just(observations.clone()), Just(observations).prop_shuffle())),
        intersection in 1usize..4,
        recovery in 1usize..4,
        local in prop::option::of((0i64..6, 0i32..3)),
    ) {
        let resolver = resolver(intersection, recovery, local.map(|(t, w)| Tag::new(w, t)));
        let expected = resolver.resolve(&table(), "key", &observations);

        prop_assert_eq!(resolver.resolve(&table(), "key", &shuffled), expected.clone());
        prop_assert_eq!(resolver.resolve(&table(), "key", &observations), expected);
    }

    #[test]
    fn certified_tags_respect_thresholds(
        observations in observation_strategy(),
        intersection in 1usize..4,
        recovery in 1usize..4,
    ) {
        let resolver = resolver(intersection, recovery, None);
        if let Ok(outcome) = resolver.resolve(&table(), "key", &observations) {
            let voters = observations
                .iter()
                .filter(|o| o.tags.iter().any(|t| !t.carries_share() && t.tag == outcome.quorum_max_tag))
                .count();
            prop_assert!(voters >= intersection);

            prop_assert!(outcome.recover_shares.len() >= recovery);
            prop_assert!(outcome.recover_shares.len() <= observations.len());

            let max_share_tag = observations
                .iter()
                .flat_map(|o| o.tags.iter())
                .filter(|t| t.carries_share())
                .map(|t| t.tag)
                .max()
                .unwrap_or(Tag::SENTINEL);
            prop_assert!(outcome.recover_max_tag <= max_share_tag);
        }
    }
}
