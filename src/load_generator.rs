use rand::rngs::StdRng;
use rand::Rng;
use rand::SeedableRng;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::backend::{ApiCall, InMemoryBackend};
use crate::metrics::AggregateKey;

// ─── Endpoint catalog ────────────────────────────────────────────

/// (resource, subresource, verb, scope, typical latency in ms)
const ENDPOINTS: &[(&str, &str, &str, &str, u64)] = &[
    ("pods", "", "GET", "resource", 15),
    ("pods", "", "POST", "resource", 40),
    ("pods", "status", "PATCH", "resource", 25),
    ("pods", "", "LIST", "namespace", 120),
    ("pods", "", "LIST", "cluster", 900),
    ("nodes", "", "GET", "resource", 10),
    ("nodes", "", "LIST", "cluster", 400),
    ("configmaps", "", "PUT", "resource", 30),
    ("events", "", "POST", "resource", 5),
    ("pods", "", "WATCH", "namespace", 1_000),
];

/// Shape of the synthetic traffic.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LoadProfile {
    /// Number of concurrent Tokio tasks generating calls
    pub concurrency: u32,
    pub duration: Duration,
    /// Percentage of calls (0–100) pushed past their latency objective
    pub slow_pct: u8,
}

impl Default for LoadProfile {
    fn default() -> Self {
        Self {
            concurrency: 8,
            duration: Duration::from_secs(5),
            slow_pct: 0,
        }
    }
}

// ─── Public entry point ──────────────────────────────────────────

/// Spawns `profile.concurrency` Tokio tasks that record synthetic API calls
/// into `backend` until the deadline or `running` goes false.
pub async fn run(running: Arc<AtomicBool>, backend: Arc<InMemoryBackend>, profile: LoadProfile) {
    let deadline = Instant::now() + profile.duration;

    let mut handles = Vec::with_capacity(profile.concurrency as usize);

    for worker_id in 0..profile.concurrency {
        let running = running.clone();
        let backend = backend.clone();

        handles.push(tokio::spawn(async move {
            worker(worker_id, running, backend, deadline, profile.slow_pct).await;
        }));
    }

    // Wait for all workers to finish
    for h in handles {
        let _ = h.await;
    }

    running.store(false, Ordering::SeqCst);
}

// ─── Worker loop ─────────────────────────────────────────────────

async fn worker(
    id: u32,
    running: Arc<AtomicBool>,
    backend: Arc<InMemoryBackend>,
    deadline: Instant,
    slow_pct: u8,
) {
    // Each worker gets its own deterministic RNG seeded uniquely.
    let mut rng = StdRng::seed_from_u64(1000 + id as u64);

    while running.load(Ordering::Relaxed) && Instant::now() < deadline {
        backend.record(synthesize(&mut rng, slow_pct));
        tokio::time::sleep(Duration::from_millis(1)).await;
    }
}

/// One call from the catalog with jittered latency.
pub fn synthesize(rng: &mut impl Rng, slow_pct: u8) -> ApiCall {
    let &(resource, subresource, verb, scope, typical_ms) =
        &ENDPOINTS[rng.gen_range(0..ENDPOINTS.len())];

    let latency = if rng.gen_range(0u8..100) < slow_pct {
        // Past every objective, cluster LIST included
        Duration::from_millis(rng.gen_range(31_000..=45_000))
    } else {
        // ±50 % around the typical latency
        let jitter = rng.gen_range(0.5..1.5);
        Duration::from_secs_f64(typical_ms as f64 * jitter / 1_000.0)
    };

    ApiCall {
        key: AggregateKey::new(resource, subresource, verb, scope),
        latency,
    }
}
