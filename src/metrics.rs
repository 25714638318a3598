//! `PrometheusMetrics`-style instrumentation (spec SPEC_FULL §10 ambient
//! stack, grounded in the teacher's `prometheus = "0.9.0"` dependency).
//! The teacher's own `util/stats` crate — the usual home for this trait —
//! was retrieved into the pack without its source, so `EngineMetrics`
//! registers directly against a `prometheus::Registry` instead; see
//! DESIGN.md.

use prometheus::{IntCounter, IntGauge, Registry};

pub struct EngineMetrics {
    pub txns_accepted: IntCounter,
    pub txns_dropped: IntCounter,
    pub txns_failed: IntCounter,
    pub committed_root_updates: IntCounter,
    pub purge_runs: IntCounter,
    pub live_node_count: IntGauge,
}

impl EngineMetrics {
    pub fn register(registry: &Registry) -> prometheus::Result<Self> {
        let txns_accepted = IntCounter::new("engine_txns_accepted_total", "Transactions accepted into a block")?;
        let txns_dropped = IntCounter::new("engine_txns_dropped_total", "Transactions dropped pre-commit")?;
        let txns_failed = IntCounter::new("engine_txns_failed_total", "Transactions accepted but receipt-failed")?;
        let committed_root_updates = IntCounter::new("engine_root_updates_total", "commit_temp calls that changed the root")?;
        let purge_runs = IntCounter::new("engine_purge_runs_total", "Completed node-store purge cycles")?;
        let live_node_count = IntGauge::new("engine_live_node_count", "Trie nodes with refcount > 0")?;

        registry.register(Box::new(txns_accepted.clone()))?;
        registry.register(Box::new(txns_dropped.clone()))?;
        registry.register(Box::new(txns_failed.clone()))?;
        registry.register(Box::new(committed_root_updates.clone()))?;
        registry.register(Box::new(purge_runs.clone()))?;
        registry.register(Box::new(live_node_count.clone()))?;

        Ok(EngineMetrics { txns_accepted, txns_dropped, txns_failed, committed_root_updates, purge_runs, live_node_count })
    }
}
