use proptest::prelude::*;
use serde_json::json;
use std::sync::Arc;
use weft_core::{BlockStore, Ed25519Identity, Log, LogOptions, MemoryStore};

pub const REPLICAS: usize = 3;

/// One step of a replication script.
#[derive(Debug, Clone, Copy)]
pub enum Op {
    Append(usize),
    Join { into: usize, from: usize },
}

pub fn arb_op() -> impl Strategy<Value = Op> + Clone {
    prop_oneof![
        3 => (0..REPLICAS).prop_map(Op::Append),
        1 => (0..REPLICAS, 0..REPLICAS).prop_map(|(into, from)| Op::Join { into, from }),
    ]
}

pub fn arb_script() -> impl Strategy<Value = Vec<Op>> + Clone {
    prop::collection::vec(arb_op(), 1..24)
}

pub fn runtime() -> tokio::runtime::Runtime {
    tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .expect("runtime must build")
}

pub fn replicas(store: &Arc<dyn BlockStore>) -> Vec<Log> {
    (0..REPLICAS)
        .map(|i| {
            let seed = [u8::try_from(i).expect("few replicas") + 1; 32];
            let identity = Arc::new(Ed25519Identity::from_seed(format!("replica-{i}"), seed));
            Log::new(Arc::clone(store), identity, LogOptions::with_id("prop")).expect("log")
        })
        .collect()
}

/// Run a script against fresh replicas sharing one store.
pub async fn play(script: &[Op]) -> Vec<Log> {
    let store: Arc<dyn BlockStore> = Arc::new(MemoryStore::new());
    let mut logs = replicas(&store);
    for (step, op) in script.iter().enumerate() {
        match *op {
            Op::Append(i) => {
                logs[i]
                    .append(json!(format!("{i}-{step}")), 4)
                    .await
                    .expect("append");
            }
            Op::Join { into, from } if into != from => {
                let other = logs[from].clone();
                logs[into].join(&other, None).await.expect("join");
            }
            Op::Join { .. } => {}
        }
    }
    logs
}

pub fn hashes(log: &Log) -> Vec<String> {
    log.values().iter().map(|e| e.hash.clone()).collect()
}

pub fn head_hashes(log: &Log) -> Vec<String> {
    log.heads().iter().map(|e| e.hash.clone()).collect()
}
