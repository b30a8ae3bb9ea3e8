//! weft-sim library.
//!
//! Deterministic replication simulator for weft logs. Replicas append
//! entries and gossip their log manifests over a lossy simulated network;
//! after the run the [`oracle`] checks the CRDT invariants. Every random
//! choice comes from a seeded [`rng::DeterministicRng`], so a failing seed
//! replays exactly.
//!
//! # Conventions
//!
//! - **Errors**: `anyhow::Result` at this layer; log errors pass through.
//! - **Logging**: `tracing` macros (`info!`, `debug!`, `trace!`).

pub mod campaign;
pub mod network;
pub mod oracle;
pub mod replica;
pub mod rng;

use std::sync::Arc;

use anyhow::{Result, bail};
use serde::{Deserialize, Serialize};
use weft_core::config::WeftConfig;
use weft_core::{BlockStore, Log, MemoryStore};

use crate::network::{FaultConfig, NetworkMessage, SimulatedNetwork};
use crate::replica::{ReplicaId, ReplicaState, SimulatedReplica};
use crate::rng::DeterministicRng;

/// Log id shared by every replica of a run.
pub const SIM_LOG_ID: &str = "weft-sim";

/// Parameters of one simulation run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SimulationConfig {
    pub seed: u64,
    pub replica_count: usize,
    pub rounds: u64,
    /// Peers each publishing replica sends its manifest to.
    pub fanout: usize,
    /// Chance per round that a replica appends.
    pub append_rate_percent: u8,
    /// Skip-link reach of each append.
    pub pointer_count: usize,
    pub fault: FaultConfig,
    /// Run a full pairwise exchange after the network drains.
    pub anti_entropy: bool,
    /// Sort, fetch and join settings of every replica's log.
    #[serde(default)]
    pub weft: WeftConfig,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            seed: 0,
            replica_count: 3,
            rounds: 12,
            fanout: 2,
            append_rate_percent: 50,
            pointer_count: 4,
            fault: FaultConfig::default(),
            anti_entropy: true,
            weft: WeftConfig::default(),
        }
    }
}

/// One step of a run, in execution order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TraceEvent {
    pub round: u64,
    pub kind: TraceEventKind,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TraceEventKind {
    Append {
        replica: ReplicaId,
        hash: String,
        time: u64,
    },
    Send {
        from: ReplicaId,
        to: ReplicaId,
        manifest: String,
        dropped: bool,
        duplicated: bool,
        delay_rounds: u8,
    },
    Deliver {
        from: ReplicaId,
        to: ReplicaId,
        manifest: String,
        merged: usize,
    },
    Reorder {
        count: usize,
    },
    Partition {
        replica: ReplicaId,
        isolated: bool,
    },
    Heal,
    AntiEntropy {
        replica: ReplicaId,
        merged: usize,
    },
}

/// Everything a finished run produced.
#[derive(Debug, Clone)]
pub struct SimulationResult {
    pub trace: Vec<TraceEvent>,
    pub states: Vec<ReplicaState>,
    /// Final logs, one per replica.
    pub logs: Vec<Log>,
    pub converged: bool,
    /// Whether any fault actually fired.
    pub interesting_state_reached: bool,
}

impl SimulationResult {
    /// Hashes of every entry appended during the run.
    #[must_use]
    pub fn appended(&self) -> Vec<String> {
        self.trace
            .iter()
            .filter_map(|event| match &event.kind {
                TraceEventKind::Append { hash, .. } => Some(hash.clone()),
                _ => None,
            })
            .collect()
    }
}

/// Deterministic simulator for one seed.
#[derive(Debug)]
pub struct Simulator {
    config: SimulationConfig,
    rng: DeterministicRng,
    network: SimulatedNetwork,
    replicas: Vec<SimulatedReplica>,
    trace: Vec<TraceEvent>,
    round: u64,
}

impl Simulator {
    /// # Errors
    ///
    /// Fails on zero replicas or zero rounds, or if a replica's log cannot
    /// be built.
    pub fn new(config: SimulationConfig) -> Result<Self> {
        if config.replica_count == 0 {
            bail!("replica_count must be > 0");
        }
        if config.rounds == 0 {
            bail!("rounds must be > 0");
        }
        config.weft.validate()?;

        let store: Arc<dyn BlockStore> = Arc::new(MemoryStore::new());
        let replicas = (0..config.replica_count)
            .map(|id| {
                SimulatedReplica::new(id, config.seed, Arc::clone(&store), SIM_LOG_ID, &config.weft)
            })
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self {
            rng: DeterministicRng::new(config.seed),
            network: SimulatedNetwork::new(config.fault),
            replicas,
            trace: Vec::new(),
            round: 0,
            config,
        })
    }

    /// Run every round, drain the network and return the final state.
    ///
    /// # Errors
    ///
    /// Returns the first append, load or join error.
    #[tracing::instrument(skip(self), fields(seed = self.config.seed))]
    pub async fn run(&mut self) -> Result<SimulationResult> {
        for round in 0..self.config.rounds {
            self.round = round;
            self.maybe_partition();
            let delivery = self.network.deliver_ready(round, &mut self.rng);
            if delivery.reordered {
                self.record(TraceEventKind::Reorder {
                    count: delivery.delivered.len(),
                });
            }
            self.deliver(delivery.delivered).await?;
            self.write_and_publish().await?;
        }

        self.round = self.config.rounds;
        self.network.heal();
        self.record(TraceEventKind::Heal);
        let rest = self.network.drain(&mut self.rng);
        self.deliver(rest.delivered).await?;

        if self.config.anti_entropy {
            self.anti_entropy().await?;
        }

        let states: Vec<ReplicaState> = self.replicas.iter().map(SimulatedReplica::snapshot).collect();
        let converged = states.windows(2).all(|w| w[0].values == w[1].values);
        let interesting_state_reached = self.trace.iter().any(|event| {
            matches!(
                event.kind,
                TraceEventKind::Send { dropped: true, .. }
                    | TraceEventKind::Send {
                        duplicated: true,
                        ..
                    }
                    | TraceEventKind::Reorder { .. }
                    | TraceEventKind::Partition { .. }
            )
        });

        tracing::info!(
            events = self.trace.len(),
            entries = states.first().map_or(0, |s| s.len),
            converged,
            "simulation complete"
        );

        Ok(SimulationResult {
            trace: self.trace.clone(),
            logs: self.replicas.iter().map(|r| r.log().clone()).collect(),
            states,
            converged,
            interesting_state_reached,
        })
    }

    fn record(&mut self, kind: TraceEventKind) {
        tracing::trace!(round = self.round, ?kind, "trace");
        self.trace.push(TraceEvent {
            round: self.round,
            kind,
        });
    }

    fn maybe_partition(&mut self) {
        if !self
            .rng
            .hit_rate_percent(self.config.fault.partition_rate_percent)
        {
            return;
        }
        let replica = self.rng.next_index(self.replicas.len());
        let isolated = !self.network.is_partitioned(replica);
        self.network.set_partitioned(replica, isolated);
        self.record(TraceEventKind::Partition { replica, isolated });
    }

    async fn deliver(&mut self, messages: Vec<NetworkMessage>) -> Result<()> {
        for message in messages {
            let merged = self.replicas[message.to].receive(&message.manifest).await?;
            self.record(TraceEventKind::Deliver {
                from: message.from,
                to: message.to,
                manifest: message.manifest,
                merged,
            });
        }
        Ok(())
    }

    async fn write_and_publish(&mut self) -> Result<()> {
        let count = self.replicas.len();
        for from in 0..count {
            if !self.rng.hit_rate_percent(self.config.append_rate_percent) {
                continue;
            }
            let entry = self.replicas[from].append(self.config.pointer_count).await?;
            self.record(TraceEventKind::Append {
                replica: from,
                hash: entry.hash,
                time: entry.clock.time,
            });

            let (manifest, seq) = self.replicas[from].publish().await?;
            for to in self.peers(from) {
                let message = NetworkMessage {
                    from,
                    to,
                    manifest: manifest.clone(),
                    seq,
                };
                let outcome = self.network.send(&message, self.round, &mut self.rng);
                self.record(TraceEventKind::Send {
                    from,
                    to,
                    manifest: manifest.clone(),
                    dropped: outcome.dropped,
                    duplicated: outcome.duplicated,
                    delay_rounds: outcome.delay_rounds,
                });
            }
        }
        Ok(())
    }

    /// `fanout` distinct peers other than `from`, starting at a random offset.
    fn peers(&mut self, from: ReplicaId) -> Vec<ReplicaId> {
        let count = self.replicas.len();
        if count < 2 {
            return Vec::new();
        }
        let others = count - 1;
        let offset = self.rng.next_index(others);
        (0..self.config.fanout.min(others))
            .map(|k| (from + 1 + (offset + k) % others) % count)
            .collect()
    }

    /// Replica 0 pulls from everyone, then everyone pulls from replica 0.
    async fn anti_entropy(&mut self) -> Result<()> {
        for i in 1..self.replicas.len() {
            let peer = self.replicas[i].log().clone();
            let merged = self.replicas[0].join(&peer).await?;
            self.record(TraceEventKind::AntiEntropy { replica: 0, merged });
        }
        let hub = self.replicas[0].log().clone();
        for i in 1..self.replicas.len() {
            let merged = self.replicas[i].join(&hub).await?;
            self.record(TraceEventKind::AntiEntropy { replica: i, merged });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lossless() -> FaultConfig {
        FaultConfig {
            max_delay_rounds: 1,
            drop_rate_percent: 0,
            duplicate_rate_percent: 0,
            reorder_rate_percent: 0,
            partition_rate_percent: 0,
        }
    }

    #[test]
    fn zero_replicas_rejected() {
        let config = SimulationConfig {
            replica_count: 0,
            ..SimulationConfig::default()
        };
        assert!(Simulator::new(config).is_err());
    }

    #[test]
    fn invalid_log_config_rejected() {
        let mut config = SimulationConfig::default();
        config.weft.log.sort = "newest-first".into();
        let err = Simulator::new(config).err().expect("unknown sort");
        assert!(err.to_string().contains("newest-first"));
    }

    #[test]
    fn peers_are_distinct_and_exclude_sender() {
        let mut sim = Simulator::new(SimulationConfig {
            replica_count: 5,
            fanout: 3,
            ..SimulationConfig::default()
        })
        .expect("sim");
        for from in 0..5 {
            let peers = sim.peers(from);
            assert_eq!(peers.len(), 3);
            assert!(!peers.contains(&from));
            let mut unique = peers.clone();
            unique.sort_unstable();
            unique.dedup();
            assert_eq!(unique.len(), 3);
        }
    }

    #[tokio::test]
    async fn gossip_alone_converges_without_faults() {
        let config = SimulationConfig {
            seed: 4,
            replica_count: 3,
            fanout: 2,
            append_rate_percent: 60,
            fault: lossless(),
            anti_entropy: false,
            ..SimulationConfig::default()
        };
        let result = Simulator::new(config)
            .expect("sim")
            .run()
            .await
            .expect("run");

        assert!(result.converged, "{:?}", result.states);
        assert!(!result.interesting_state_reached);
        let appended = result.appended().len();
        assert!(appended > 0);
        assert!(result.states.iter().all(|s| s.len == appended));
    }

    #[tokio::test]
    async fn anti_entropy_repairs_dropped_gossip() {
        let config = SimulationConfig {
            seed: 8,
            replica_count: 4,
            fanout: 1,
            fault: FaultConfig {
                drop_rate_percent: 40,
                partition_rate_percent: 20,
                ..FaultConfig::default()
            },
            ..SimulationConfig::default()
        };
        let result = Simulator::new(config)
            .expect("sim")
            .run()
            .await
            .expect("run");

        assert!(result.converged);
        assert!(result.interesting_state_reached);
        assert!(
            result
                .trace
                .iter()
                .any(|e| matches!(e.kind, TraceEventKind::AntiEntropy { .. }))
        );
    }

    #[tokio::test]
    async fn same_seed_same_trace() {
        let config = SimulationConfig {
            seed: 21,
            ..SimulationConfig::default()
        };
        let first = Simulator::new(config.clone())
            .expect("sim")
            .run()
            .await
            .expect("run");
        let second = Simulator::new(config).expect("sim").run().await.expect("run");
        assert_eq!(first.trace, second.trace);
        assert_eq!(first.states, second.states);
    }
}
