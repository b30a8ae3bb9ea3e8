//! Invariant checks over the replicas of a finished run.
//!
//! # Invariants checked
//!
//! 1. **Convergence**: every replica materializes the same entry sequence.
//! 2. **Heads**: a replica's heads are exactly its entries no other entry
//!    points to.
//! 3. **Length**: the reported length equals the number of distinct entries.
//! 4. **Idempotence**: joining a log that was already joined changes nothing.
//! 5. **Commutativity**: joining the replicas into a fresh log in any order
//!    yields the same sequence.

use std::collections::{BTreeSet, HashSet};
use std::sync::Arc;

use weft_core::{Log, LogError, LogOptions};

use crate::replica::ReplicaState;
use crate::rng::DeterministicRng;

/// Outcome of one or more invariant checks.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OracleResult {
    pub passed: bool,
    pub violations: Vec<InvariantViolation>,
}

impl OracleResult {
    const fn pass() -> Self {
        Self {
            passed: true,
            violations: Vec::new(),
        }
    }

    fn from_violations(violations: Vec<InvariantViolation>) -> Self {
        Self {
            passed: violations.is_empty(),
            violations,
        }
    }

    #[must_use]
    fn merge(mut self, other: Self) -> Self {
        if !other.passed {
            self.passed = false;
            self.violations.extend(other.violations);
        }
        self
    }
}

/// Diagnostic for a failed invariant.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InvariantViolation {
    Convergence {
        replica_a: usize,
        replica_b: usize,
        /// First position at which the two sequences differ.
        first_difference: usize,
        len_a: usize,
        len_b: usize,
    },
    Heads {
        replica: usize,
        expected: Vec<String>,
        actual: Vec<String>,
    },
    Length {
        replica: usize,
        reported: usize,
        distinct: usize,
    },
    Idempotence {
        replica: usize,
        other: usize,
        before: usize,
        after: usize,
    },
    Commutativity {
        permutation_index: usize,
        order: Vec<usize>,
    },
}

impl std::fmt::Display for InvariantViolation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Convergence {
                replica_a,
                replica_b,
                first_difference,
                len_a,
                len_b,
            } => write!(
                f,
                "Convergence: replicas {replica_a} and {replica_b} diverge at position \
                 {first_difference} (lengths {len_a} and {len_b})"
            ),
            Self::Heads {
                replica,
                expected,
                actual,
            } => write!(
                f,
                "Heads: replica {replica} reports {} heads, expected {} ({actual:?} vs {expected:?})",
                actual.len(),
                expected.len()
            ),
            Self::Length {
                replica,
                reported,
                distinct,
            } => write!(
                f,
                "Length: replica {replica} reports {reported} entries but holds {distinct}"
            ),
            Self::Idempotence {
                replica,
                other,
                before,
                after,
            } => write!(
                f,
                "Idempotence: re-joining replica {other} into {replica} changed the log \
                 ({before} -> {after} entries)"
            ),
            Self::Commutativity {
                permutation_index,
                order,
            } => write!(
                f,
                "Commutativity: permutation {permutation_index} (join order {order:?}) diverges"
            ),
        }
    }
}

/// Checker for log CRDT invariants after a simulation run.
pub struct ConvergenceOracle;

impl ConvergenceOracle {
    #[must_use]
    pub fn check_convergence(states: &[ReplicaState]) -> OracleResult {
        let mut violations = Vec::new();
        for i in 0..states.len() {
            for j in (i + 1)..states.len() {
                let (a, b) = (&states[i], &states[j]);
                if a.values == b.values {
                    continue;
                }
                let first_difference = a
                    .values
                    .iter()
                    .zip(&b.values)
                    .position(|(x, y)| x != y)
                    .unwrap_or_else(|| a.values.len().min(b.values.len()));
                violations.push(InvariantViolation::Convergence {
                    replica_a: a.id,
                    replica_b: b.id,
                    first_difference,
                    len_a: a.values.len(),
                    len_b: b.values.len(),
                });
            }
        }
        OracleResult::from_violations(violations)
    }

    #[must_use]
    pub fn check_heads(logs: &[Log]) -> OracleResult {
        let mut violations = Vec::new();
        for (replica, log) in logs.iter().enumerate() {
            let values = log.values();
            let referenced: HashSet<&str> = values
                .iter()
                .flat_map(|e| e.next.iter().map(String::as_str))
                .collect();
            let expected: BTreeSet<String> = values
                .iter()
                .filter(|e| !referenced.contains(e.hash.as_str()))
                .map(|e| e.hash.clone())
                .collect();
            let actual: BTreeSet<String> = log.heads().iter().map(|e| e.hash.clone()).collect();
            if expected != actual {
                violations.push(InvariantViolation::Heads {
                    replica,
                    expected: expected.into_iter().collect(),
                    actual: actual.into_iter().collect(),
                });
            }
        }
        OracleResult::from_violations(violations)
    }

    #[must_use]
    pub fn check_length(logs: &[Log]) -> OracleResult {
        let mut violations = Vec::new();
        for (replica, log) in logs.iter().enumerate() {
            let distinct: HashSet<String> = log.values().iter().map(|e| e.hash.clone()).collect();
            if distinct.len() != log.len() {
                violations.push(InvariantViolation::Length {
                    replica,
                    reported: log.len(),
                    distinct: distinct.len(),
                });
            }
        }
        OracleResult::from_violations(violations)
    }

    /// Join every ordered pair twice; the second join must be a no-op.
    ///
    /// # Errors
    ///
    /// Returns any join error.
    pub async fn check_idempotence(logs: &[Log]) -> Result<OracleResult, LogError> {
        let mut violations = Vec::new();
        for (replica, log) in logs.iter().enumerate() {
            for (other, peer) in logs.iter().enumerate() {
                let mut once = log.clone();
                once.join(peer, None).await?;
                let before = hashes(&once);
                let mut twice = once.clone();
                twice.join(peer, None).await?;
                if hashes(&twice) != before || twice.clock() != once.clock() {
                    violations.push(InvariantViolation::Idempotence {
                        replica,
                        other,
                        before: before.len(),
                        after: twice.len(),
                    });
                }
            }
        }
        Ok(OracleResult::from_violations(violations))
    }

    /// Join the replicas into fresh logs in `iterations` shuffled orders and
    /// compare each result with the in-order join.
    ///
    /// # Errors
    ///
    /// Returns any construction or join error.
    pub async fn check_commutativity(
        logs: &[Log],
        rng: &mut DeterministicRng,
        iterations: usize,
    ) -> Result<OracleResult, LogError> {
        if logs.len() < 2 || iterations == 0 {
            return Ok(OracleResult::pass());
        }

        let identity: Vec<usize> = (0..logs.len()).collect();
        let canonical = hashes(&join_in_order(logs, &identity).await?);

        let mut violations = Vec::new();
        for permutation_index in 0..iterations {
            let order = rng.shuffled(&identity);
            let merged = join_in_order(logs, &order).await?;
            if hashes(&merged) != canonical {
                violations.push(InvariantViolation::Commutativity {
                    permutation_index,
                    order,
                });
            }
        }
        Ok(OracleResult::from_violations(violations))
    }

    /// Run all five checks.
    ///
    /// # Errors
    ///
    /// Returns any join error raised while checking.
    pub async fn check_all(
        states: &[ReplicaState],
        logs: &[Log],
        rng: &mut DeterministicRng,
    ) -> Result<OracleResult, LogError> {
        let idempotence = Self::check_idempotence(logs).await?;
        let commutativity = Self::check_commutativity(logs, rng, 4).await?;
        Ok(Self::check_convergence(states)
            .merge(Self::check_heads(logs))
            .merge(Self::check_length(logs))
            .merge(idempotence)
            .merge(commutativity))
    }
}

fn hashes(log: &Log) -> Vec<String> {
    log.values().iter().map(|e| e.hash.clone()).collect()
}

async fn join_in_order(logs: &[Log], order: &[usize]) -> Result<Log, LogError> {
    let Some(first) = logs.first() else {
        return Err(LogError::Validation("no logs to join".into()));
    };
    let mut merged = Log::new(
        Arc::clone(first.store()),
        Arc::clone(first.identity()),
        LogOptions {
            sort_fn: Some(first.sort().inner()),
            ..LogOptions::with_id(first.id())
        },
    )?;
    for &i in order {
        merged.join(&logs[i], None).await?;
    }
    Ok(merged)
}

#[cfg(test)]
mod tests {
    use serde_json::json;
    use weft_core::{BlockStore, Ed25519Identity, MemoryStore};

    use super::*;

    fn state(id: usize, values: &[&str]) -> ReplicaState {
        ReplicaState {
            id,
            values: values.iter().map(|v| (*v).to_owned()).collect(),
            heads: Vec::new(),
            clock_time: 0,
            len: values.len(),
        }
    }

    async fn writers(count: u8, appends: usize) -> Vec<Log> {
        let store: Arc<dyn BlockStore> = Arc::new(MemoryStore::new());
        let mut logs = Vec::new();
        for i in 0..count {
            let identity = Arc::new(Ed25519Identity::from_seed(format!("w{i}"), [i + 1; 32]));
            let mut log =
                Log::new(Arc::clone(&store), identity, LogOptions::with_id("oracle")).expect("log");
            for n in 0..appends {
                log.append(json!(format!("{i}-{n}")), 2).await.expect("append");
            }
            logs.push(log);
        }
        logs
    }

    #[test]
    fn identical_sequences_converge() {
        let result = ConvergenceOracle::check_convergence(&[
            state(0, &["a", "b"]),
            state(1, &["a", "b"]),
            state(2, &["a", "b"]),
        ]);
        assert!(result.passed);
    }

    #[test]
    fn divergence_reports_position() {
        let result =
            ConvergenceOracle::check_convergence(&[state(0, &["a", "b", "c"]), state(1, &["a", "c"])]);
        assert!(!result.passed);
        assert_eq!(
            result.violations,
            vec![InvariantViolation::Convergence {
                replica_a: 0,
                replica_b: 1,
                first_difference: 1,
                len_a: 3,
                len_b: 2,
            }]
        );
    }

    #[test]
    fn prefix_divergence_points_past_the_shorter() {
        let result =
            ConvergenceOracle::check_convergence(&[state(0, &["a"]), state(1, &["a", "b"])]);
        assert!(matches!(
            result.violations.as_slice(),
            [InvariantViolation::Convergence {
                first_difference: 1,
                ..
            }]
        ));
    }

    #[test]
    fn violation_messages_are_readable() {
        let text = InvariantViolation::Length {
            replica: 2,
            reported: 5,
            distinct: 4,
        }
        .to_string();
        assert!(text.starts_with("Length"));
        assert!(text.contains("replica 2"));
    }

    #[tokio::test]
    async fn real_logs_satisfy_structural_checks() {
        let logs = writers(3, 3).await;
        assert!(ConvergenceOracle::check_heads(&logs).passed);
        assert!(ConvergenceOracle::check_length(&logs).passed);
        let idempotence = ConvergenceOracle::check_idempotence(&logs)
            .await
            .expect("idempotence");
        assert!(idempotence.passed, "{:?}", idempotence.violations);
    }

    #[tokio::test]
    async fn join_order_does_not_matter() {
        let logs = writers(3, 4).await;
        let mut rng = DeterministicRng::new(3);
        let result = ConvergenceOracle::check_commutativity(&logs, &mut rng, 6)
            .await
            .expect("commutativity");
        assert!(result.passed, "{:?}", result.violations);
    }

    #[tokio::test]
    async fn unconverged_replicas_fail_check_all() {
        let logs = writers(2, 2).await;
        let states: Vec<ReplicaState> = logs
            .iter()
            .enumerate()
            .map(|(id, log)| ReplicaState {
                id,
                values: hashes(log),
                heads: Vec::new(),
                clock_time: log.clock().time,
                len: log.len(),
            })
            .collect();
        let mut rng = DeterministicRng::new(1);
        let result = ConvergenceOracle::check_all(&states, &logs, &mut rng)
            .await
            .expect("check");
        assert!(!result.passed);
        assert!(result
            .violations
            .iter()
            .all(|v| matches!(v, InvariantViolation::Convergence { .. })));
    }
}
