use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use crate::replica::ReplicaId;
use crate::rng::DeterministicRng;

/// Fault injection knobs for manifest gossip.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FaultConfig {
    /// Maximum delivery delay in rounds.
    pub max_delay_rounds: u8,
    pub drop_rate_percent: u8,
    pub duplicate_rate_percent: u8,
    /// Chance of reversing the batch delivered in one round.
    pub reorder_rate_percent: u8,
    /// Chance per round of isolating or reconnecting a random replica.
    pub partition_rate_percent: u8,
}

impl Default for FaultConfig {
    fn default() -> Self {
        Self {
            max_delay_rounds: 2,
            drop_rate_percent: 5,
            duplicate_rate_percent: 3,
            reorder_rate_percent: 5,
            partition_rate_percent: 2,
        }
    }
}

/// A published log manifest on its way to one peer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NetworkMessage {
    pub from: ReplicaId,
    pub to: ReplicaId,
    /// Address of the sender's log manifest.
    pub manifest: String,
    /// Sender-local publish counter.
    pub seq: u64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct PendingMessage {
    deliver_at_round: u64,
    message: NetworkMessage,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SendOutcome {
    pub dropped: bool,
    pub duplicated: bool,
    pub delay_rounds: u8,
}

impl SendOutcome {
    const DROPPED: Self = Self {
        dropped: true,
        duplicated: false,
        delay_rounds: 0,
    };
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeliverOutcome {
    pub delivered: Vec<NetworkMessage>,
    pub reordered: bool,
}

/// Deterministic lossy network between replicas.
///
/// Messages to or from an isolated replica are dropped at send time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SimulatedNetwork {
    pending: Vec<PendingMessage>,
    partitioned: BTreeSet<ReplicaId>,
    fault: FaultConfig,
}

impl SimulatedNetwork {
    #[must_use]
    pub const fn new(fault: FaultConfig) -> Self {
        Self {
            pending: Vec::new(),
            partitioned: BTreeSet::new(),
            fault,
        }
    }

    #[must_use]
    pub const fn fault_config(&self) -> FaultConfig {
        self.fault
    }

    pub fn set_partitioned(&mut self, replica: ReplicaId, isolated: bool) {
        if isolated {
            self.partitioned.insert(replica);
        } else {
            self.partitioned.remove(&replica);
        }
    }

    #[must_use]
    pub fn is_partitioned(&self, replica: ReplicaId) -> bool {
        self.partitioned.contains(&replica)
    }

    /// Reconnect every isolated replica.
    pub fn heal(&mut self) {
        self.partitioned.clear();
    }

    #[must_use]
    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    #[must_use]
    pub fn send(
        &mut self,
        message: &NetworkMessage,
        round: u64,
        rng: &mut DeterministicRng,
    ) -> SendOutcome {
        if self.is_partitioned(message.from) || self.is_partitioned(message.to) {
            return SendOutcome::DROPPED;
        }
        if rng.hit_rate_percent(self.fault.drop_rate_percent) {
            return SendOutcome::DROPPED;
        }

        let delay_bound = u64::from(self.fault.max_delay_rounds).saturating_add(1);
        let delay = u8::try_from(rng.next_bounded(delay_bound)).unwrap_or(self.fault.max_delay_rounds);
        let deliver_at_round = round.saturating_add(u64::from(delay));

        self.pending.push(PendingMessage {
            deliver_at_round,
            message: message.clone(),
        });
        let duplicated = rng.hit_rate_percent(self.fault.duplicate_rate_percent);
        if duplicated {
            self.pending.push(PendingMessage {
                deliver_at_round,
                message: message.clone(),
            });
        }

        SendOutcome {
            dropped: false,
            duplicated,
            delay_rounds: delay,
        }
    }

    /// Take every message due by `round`, oldest send first unless reordered.
    #[must_use]
    pub fn deliver_ready(&mut self, round: u64, rng: &mut DeterministicRng) -> DeliverOutcome {
        let (ready, future): (Vec<_>, Vec<_>) = self
            .pending
            .drain(..)
            .partition(|p| p.deliver_at_round <= round);
        self.pending = future;

        let mut delivered: Vec<NetworkMessage> = ready.into_iter().map(|p| p.message).collect();
        let reordered =
            delivered.len() > 1 && rng.hit_rate_percent(self.fault.reorder_rate_percent);
        if reordered {
            delivered.reverse();
        }

        DeliverOutcome {
            delivered,
            reordered,
        }
    }

    /// Deliver everything still in flight regardless of delay.
    #[must_use]
    pub fn drain(&mut self, rng: &mut DeterministicRng) -> DeliverOutcome {
        self.deliver_ready(u64::MAX, rng)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn message(from: ReplicaId, to: ReplicaId) -> NetworkMessage {
        NetworkMessage {
            from,
            to,
            manifest: format!("blake3:{from}{to}"),
            seq: 0,
        }
    }

    fn lossless() -> FaultConfig {
        FaultConfig {
            max_delay_rounds: 0,
            drop_rate_percent: 0,
            duplicate_rate_percent: 0,
            reorder_rate_percent: 0,
            partition_rate_percent: 0,
        }
    }

    #[test]
    fn lossless_delivers_same_round() {
        let mut net = SimulatedNetwork::new(lossless());
        let mut rng = DeterministicRng::new(1);
        let outcome = net.send(&message(0, 1), 3, &mut rng);
        assert!(!outcome.dropped);
        assert_eq!(net.pending_len(), 1);

        let delivered = net.deliver_ready(3, &mut rng);
        assert_eq!(delivered.delivered, vec![message(0, 1)]);
        assert_eq!(net.pending_len(), 0);
    }

    #[test]
    fn partitioned_replica_drops_both_directions() {
        let mut net = SimulatedNetwork::new(lossless());
        let mut rng = DeterministicRng::new(1);
        net.set_partitioned(1, true);
        assert!(net.send(&message(0, 1), 0, &mut rng).dropped);
        assert!(net.send(&message(1, 2), 0, &mut rng).dropped);
        assert!(!net.send(&message(0, 2), 0, &mut rng).dropped);

        net.heal();
        assert!(!net.is_partitioned(1));
    }

    #[test]
    fn delayed_messages_wait_for_their_round() {
        let mut net = SimulatedNetwork::new(FaultConfig {
            max_delay_rounds: 3,
            ..lossless()
        });
        let mut rng = DeterministicRng::new(5);
        let mut latest = 0;
        for seq in 0..10 {
            let outcome = net.send(&NetworkMessage { seq, ..message(0, 1) }, 0, &mut rng);
            assert!(outcome.delay_rounds <= 3);
            latest = latest.max(outcome.delay_rounds);
        }

        let early = net.deliver_ready(0, &mut rng).delivered.len();
        let rest = net.drain(&mut rng).delivered.len();
        assert_eq!(early + rest, 10);
        assert_eq!(net.pending_len(), 0);
        assert!(latest > 0 || rest == 0);
    }

    #[test]
    fn certain_duplication_enqueues_twice() {
        let mut net = SimulatedNetwork::new(FaultConfig {
            duplicate_rate_percent: 100,
            ..lossless()
        });
        let mut rng = DeterministicRng::new(2);
        assert!(net.send(&message(0, 1), 0, &mut rng).duplicated);
        assert_eq!(net.drain(&mut rng).delivered.len(), 2);
    }

    #[test]
    fn certain_drop_never_enqueues() {
        let mut net = SimulatedNetwork::new(FaultConfig {
            drop_rate_percent: 100,
            ..lossless()
        });
        let mut rng = DeterministicRng::new(2);
        assert!(net.send(&message(0, 1), 0, &mut rng).dropped);
        assert_eq!(net.pending_len(), 0);
    }
}
