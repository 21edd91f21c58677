use std::sync::{Arc, Barrier};
use std::time::{Duration, Instant};

use tonescore::rate_limit::{Admission, CooldownLimiter, RateLimit};

const THREADS: usize = 16;
const ROUNDS: usize = 50;

// Simultaneous requests from one identity must never both get through.
#[test]
fn simultaneous_admissions_for_one_identity_admit_exactly_one() {
    let limiter = Arc::new(CooldownLimiter::new(Duration::from_secs(8), 10_000));
    for round in 0..ROUNDS {
        let identity = format!("203.0.113.{}", round);
        let now = Instant::now();
        let barrier = Arc::new(Barrier::new(THREADS));
        let handles: Vec<_> = (0..THREADS)
            .map(|_| {
                let limiter = limiter.clone();
                let barrier = barrier.clone();
                let identity = identity.clone();
                std::thread::spawn(move || {
                    barrier.wait();
                    limiter.admit(&identity, now)
                })
            })
            .collect();
        let decisions: Vec<Admission> = handles.into_iter().map(|h| h.join().unwrap()).collect();
        let admitted = decisions
            .iter()
            .filter(|d| **d == Admission::Allowed)
            .count();
        assert_eq!(admitted, 1, "round {} admitted {}", round, admitted);
        assert!(decisions
            .iter()
            .all(|d| matches!(d, Admission::Allowed | Admission::Denied { retry_after_secs: 8 })));
    }
    assert_eq!(limiter.len(), ROUNDS);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_tasks_share_one_slot_per_identity() {
    let limiter = Arc::new(CooldownLimiter::new(Duration::from_secs(8), 10_000));
    let now = Instant::now();
    let tasks: Vec<_> = (0..THREADS)
        .map(|_| {
            let limiter = limiter.clone();
            tokio::spawn(async move { limiter.admit("shared", now) })
        })
        .collect();
    let mut admitted = 0;
    for task in tasks {
        if task.await.unwrap() == Admission::Allowed {
            admitted += 1;
        }
    }
    assert_eq!(admitted, 1);
}
