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

//! Certification thresholds and response-count verification

use crate::error::QuorumError;
use treas_common::TreasConfig;

/// Thresholds a resolution call certifies tags against
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QuorumThresholds {
    intersection: usize,
    recovery: usize,
    read_quorum: usize,
}

impl QuorumThresholds {
    /// Thresholds from explicit values.
    ///
    /// The read quorum defaults to the larger of the two thresholds, the fewest
    /// responses that could possibly certify both tags.
    pub fn new(intersection: usize, recovery: usize) -> Result<Self, QuorumError> {
        if intersection == 0 || recovery == 0 {
            return Err(QuorumError::InvalidConfiguration {
                reason: format!("thresholds must be positive (intersection {intersection}, recovery {recovery})"),
            });
        }
        Ok(Self {
            intersection,
            recovery,
            read_quorum: intersection.max(recovery),
        })
    }

    /// Thresholds for `replicas` nodes, quorums of `quorum_size`, and a code
    /// needing `code_dimension` fragments to decode.
    ///
    /// Any two quorums overlap in at least `2q - n` replicas, which becomes the
    /// intersection threshold. That overlap must hold a decodable share set.
    pub fn for_cluster(replicas: usize, quorum_size: usize, code_dimension: usize) -> Result<Self, QuorumError> {
        if replicas == 0 || quorum_size == 0 || code_dimension == 0 {
            return Err(QuorumError::InvalidConfiguration {
                reason: String::from("replica count, quorum size and code dimension must be positive"),
            });
        }
        if quorum_size > replicas {
            return Err(QuorumError::InvalidConfiguration {
                reason: format!("quorum size {quorum_size} exceeds replica count {replicas}"),
            });
        }
        if code_dimension > replicas {
            return Err(QuorumError::InvalidConfiguration {
                reason: format!("code dimension {code_dimension} exceeds replica count {replicas}"),
            });
        }

        let overlap = (2 * quorum_size).saturating_sub(replicas);
        if overlap < code_dimension {
            return Err(QuorumError::InvalidConfiguration {
                reason: format!(
                    "quorums of {quorum_size}/{replicas} overlap in {overlap} replicas, need at least {code_dimension}"
                ),
            });
        }

        Ok(Self {
            intersection: overlap,
            recovery: code_dimension,
            read_quorum: quorum_size,
        })
    }

    pub fn from_config(config: &TreasConfig) -> Result<Self, QuorumError> {
        Self::new(config.intersection_threshold, config.recovery_threshold)
    }

    /// Override the number of responses required before resolving
    pub fn with_read_quorum(mut self, read_quorum: usize) -> Self {
        self.read_quorum = read_quorum.max(1);
        self
    }

    /// Sightings needed to certify a tag as durably written
    pub fn intersection(&self) -> usize {
        self.intersection
    }

    /// Shares needed to certify a tag as recoverable
    pub fn recovery(&self) -> usize {
        self.recovery
    }

    /// Get read quorum size
    pub fn read_quorum_size(&self) -> usize {
        self.read_quorum
    }

    /// Check if read quorum is met
    pub fn check_read_quorum(&self, responses: usize) -> bool {
        responses >= self.read_quorum
    }

    /// Verify read quorum or return error
    pub fn verify_read_quorum(&self, responses: usize) -> Result<(), QuorumError> {
        if self.check_read_quorum(responses) {
            Ok(())
        } else {
            Err(QuorumError::InsufficientReadQuorum {
                required: self.read_quorum,
                available: responses,
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_explicit_thresholds() {
        let thresholds = QuorumThresholds::new(2, 3).unwrap();
        assert_eq!(thresholds.intersection(), 2);
        assert_eq!(thresholds.recovery(), 3);
        assert_eq!(thresholds.read_quorum_size(), 3);

        assert!(QuorumThresholds::new(0, 1).is_err());
        assert!(QuorumThresholds::new(1, 0).is_err());
    }

    #[test]
    fn test_cluster_thresholds() {
        // 5 replicas, quorums of 4, 3-of-5 code: quorums share 3 replicas
        let thresholds = QuorumThresholds::for_cluster(5, 4, 3).unwrap();
        assert_eq!(thresholds.intersection(), 3);
        assert_eq!(thresholds.recovery(), 3);
        assert_eq!(thresholds.read_quorum_size(), 4);

        assert!(QuorumThresholds::for_cluster(5, 3, 3).is_err());
        assert!(QuorumThresholds::for_cluster(3, 4, 1).is_err());
        assert!(QuorumThresholds::for_cluster(3, 3, 4).is_err());
        assert!(QuorumThresholds::for_cluster(0, 0, 0).is_err());
    }

    #[test]
    fn test_read_quorum() {
        let thresholds = QuorumThresholds::for_cluster(4, 3, 2).unwrap();
        assert_eq!(thresholds.read_quorum_size(), 3);

        assert!(thresholds.check_read_quorum(3));
        assert!(thresholds.check_read_quorum(4));
        assert!(!thresholds.check_read_quorum(2));
        assert_eq!(
            thresholds.verify_read_quorum(1),
            Err(QuorumError::InsufficientReadQuorum {
                required: 3,
                available: 1
            })
        );
    }

    #[test]
    fn test_from_config() {
        let thresholds = QuorumThresholds::from_config(&TreasConfig::default()).unwrap();
        assert_eq!(thresholds.intersection(), 2);
        assert_eq!(thresholds.recovery(), 2);
        assert_eq!(thresholds.with_read_quorum(0).read_quorum_size(), 1);
    }
}
