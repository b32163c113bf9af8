//! The in-process store that request handlers write into and the exporter
//! drains. See [`Accumulator`].

use dashmap::DashMap;
use parking_lot::Mutex;
use std::{
    sync::atomic::{AtomicI64, AtomicU64, Ordering},
    time::Duration,
};

/// How a pizza purchase attempt resolved.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum TransactionOutcome {
    /// The order went through. `amount` is added to revenue.
    Success {
        /// Price of the order.
        amount: f64,
    },
    /// The order failed. Nothing is added to revenue.
    Failure,
}

/// Process-wide counters, revenue total and latency sample lists.
///
/// Construct one at startup, wrap it in an [`Arc`] and hand clones to both the
/// request layer (see [`crate::middleware`]) and the [`Exporter`]. Every
/// mutation takes `&self` and is safe to call from any number of tasks or
/// threads at once. None of them block for longer than a short uncontended
/// lock, and none of them can fail.
///
/// Counters are cumulative and are never reset by [`Accumulator::snapshot`].
/// Sample lists are interval-scoped: a snapshot swaps each list out for an
/// empty one and reports only its maximum.
///
/// Caller discipline is not checked here. Ending more sessions than were
/// started drives the active-user count negative, and negative amounts reduce
/// revenue.
///
/// [`Arc`]: std::sync::Arc
/// [`Exporter`]: crate::Exporter
#[derive(Debug, Default)]
pub struct Accumulator {
    requests: DashMap<String, u64>,
    active_users: AtomicI64,
    auth_successes: AtomicU64,
    auth_failures: AtomicU64,
    pizzas_sold: AtomicU64,
    purchase_failures: AtomicU64,
    /// f64 bit pattern, updated with a CAS loop.
    revenue: AtomicU64,
    request_latencies: Mutex<Vec<f64>>,
    domain_latencies: Mutex<Vec<f64>>,
}

impl Accumulator {
    /// Create an empty accumulator. All counters start at zero.
    pub fn new() -> Self {
        Self::default()
    }

    /// Count one inbound request for `method`. The key is created on first
    /// use.
    pub fn record_request(&self, method: &str) {
        *self.requests.entry(method.to_owned()).or_insert(0) += 1;
    }

    /// A user logged in. Bumps both the active-user count and the
    /// auth-success counter.
    pub fn user_session_started(&self) {
        self.active_users.fetch_add(1, Ordering::Relaxed);
        self.auth_successes.fetch_add(1, Ordering::Relaxed);
    }

    /// A user logged out.
    pub fn user_session_ended(&self) {
        self.active_users.fetch_sub(1, Ordering::Relaxed);
    }

    /// A login attempt was rejected.
    pub fn auth_failed(&self) {
        self.auth_failures.fetch_add(1, Ordering::Relaxed);
    }

    /// A purchase attempt resolved.
    pub fn transaction_completed(&self, outcome: TransactionOutcome) {
        match outcome {
            TransactionOutcome::Success { amount } => {
                self.pizzas_sold.fetch_add(1, Ordering::Relaxed);
                self.add_revenue(amount);
            }
            TransactionOutcome::Failure => {
                self.purchase_failures.fetch_add(1, Ordering::Relaxed);
            }
        }
    }

    /// Record how long a request took, measured once its response completed.
    pub fn record_request_latency(&self, elapsed: Duration) {
        self.request_latencies.lock().push(as_millis(elapsed));
    }

    /// Record how long a pizza-creation call to the factory took.
    pub fn record_domain_latency(&self, elapsed: Duration) {
        self.domain_latencies.lock().push(as_millis(elapsed));
    }

    fn add_revenue(&self, amount: f64) {
        // The closure always returns Some, so this cannot fail.
        let _ = self
            .revenue
            .fetch_update(Ordering::Relaxed, Ordering::Relaxed, |bits| {
                Some((f64::from_bits(bits) + amount).to_bits())
            });
    }

    /// Read every counter and drain both sample lists.
    ///
    /// Each sample list is swapped for an empty one under its lock, so a
    /// sample appended concurrently lands either in this snapshot or in the
    /// next one, never in both and never lost. Counters are read field by
    /// field; a snapshot taken while producers are active may be torn across
    /// fields but every individual value is exact.
    pub fn snapshot(&self) -> Snapshot {
        let mut requests: Vec<(String, u64)> = self
            .requests
            .iter()
            .map(|entry| (entry.key().clone(), *entry.value()))
            .collect();
        requests.sort_by(|a, b| a.0.cmp(&b.0));

        let request_latencies = std::mem::take(&mut *self.request_latencies.lock());
        let domain_latencies = std::mem::take(&mut *self.domain_latencies.lock());

        Snapshot {
            requests,
            active_users: self.active_users.load(Ordering::Relaxed),
            auth_successes: self.auth_successes.load(Ordering::Relaxed),
            auth_failures: self.auth_failures.load(Ordering::Relaxed),
            pizzas_sold: self.pizzas_sold.load(Ordering::Relaxed),
            purchase_failures: self.purchase_failures.load(Ordering::Relaxed),
            revenue: f64::from_bits(self.revenue.load(Ordering::Relaxed)),
            max_request_latency: max_of(&request_latencies),
            max_domain_latency: max_of(&domain_latencies),
        }
    }
}

/// A point-in-time read of an [`Accumulator`].
#[derive(Debug, Clone, PartialEq)]
pub struct Snapshot {
    /// Request counts by HTTP method, sorted by method.
    pub requests: Vec<(String, u64)>,
    /// Logged-in users. May be negative if callers are unbalanced.
    pub active_users: i64,
    /// Successful logins.
    pub auth_successes: u64,
    /// Rejected logins.
    pub auth_failures: u64,
    /// Successful purchases.
    pub pizzas_sold: u64,
    /// Failed purchases.
    pub purchase_failures: u64,
    /// Total price of successful purchases.
    pub revenue: f64,
    /// Largest request latency in milliseconds since the previous snapshot,
    /// or `None` if no request completed.
    pub max_request_latency: Option<f64>,
    /// Largest pizza-creation latency in milliseconds since the previous
    /// snapshot, or `None` if none were recorded.
    pub max_domain_latency: Option<f64>,
}

impl Snapshot {
    /// Request count for `method`, zero if it was never seen.
    pub fn requests_for(&self, method: &str) -> u64 {
        self.requests
            .iter()
            .find(|(m, _)| m == method)
            .map_or(0, |(_, count)| *count)
    }
}

fn as_millis(elapsed: Duration) -> f64 {
    elapsed.as_secs_f64() * 1000.0
}

fn max_of(samples: &[f64]) -> Option<f64> {
    samples.iter().copied().reduce(f64::max)
}

#[cfg(test)]
mod test {
    use super::*;
    use std::{sync::Arc, thread};

    #[test]
    fn interleaved_requests_are_all_counted() {
        let acc = Arc::new(Accumulator::new());
        let handles: Vec<_> = (0..8)
            .map(|i| {
                let acc = acc.clone();
                thread::spawn(move || {
                    for _ in 0..500 {
                        acc.record_request(if i % 2 == 0 { "GET" } else { "POST" });
                    }
                    if i == 0 {
                        acc.record_request("DELETE");
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        let snap = acc.snapshot();
        assert_eq!(snap.requests_for("GET"), 2000);
        assert_eq!(snap.requests_for("POST"), 2000);
        assert_eq!(snap.requests_for("DELETE"), 1);
        assert_eq!(snap.requests_for("PATCH"), 0);
        let methods: Vec<_> = snap.requests.iter().map(|(m, _)| m.as_str()).collect();
        assert_eq!(methods, ["DELETE", "GET", "POST"]);
    }

    #[test]
    fn transactions_split_sold_and_failed() {
        let acc = Accumulator::new();
        acc.transaction_completed(TransactionOutcome::Success { amount: 12.5 });
        acc.transaction_completed(TransactionOutcome::Success { amount: 7.5 });

        let snap = acc.snapshot();
        assert_eq!(snap.pizzas_sold, 2);
        assert_eq!(snap.revenue, 20.0);
        assert_eq!(snap.purchase_failures, 0);

        acc.transaction_completed(TransactionOutcome::Failure);
        let snap = acc.snapshot();
        assert_eq!(snap.pizzas_sold, 2);
        assert_eq!(snap.revenue, 20.0);
        assert_eq!(snap.purchase_failures, 1);
    }

    #[test]
    fn concurrent_revenue_is_exact() {
        let acc = Arc::new(Accumulator::new());
        let handles: Vec<_> = (0..4)
            .map(|_| {
                let acc = acc.clone();
                thread::spawn(move || {
                    for _ in 0..1000 {
                        acc.transaction_completed(TransactionOutcome::Success { amount: 0.5 });
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        let snap = acc.snapshot();
        assert_eq!(snap.pizzas_sold, 4000);
        assert_eq!(snap.revenue, 2000.0);
    }

    #[test]
    fn sessions_and_auth() {
        let acc = Accumulator::new();
        for _ in 0..3 {
            acc.user_session_started();
        }
        acc.user_session_ended();
        acc.auth_failed();

        let snap = acc.snapshot();
        assert_eq!(snap.active_users, 2);
        assert_eq!(snap.auth_successes, 3);
        assert_eq!(snap.auth_failures, 1);
    }

    #[test]
    fn latency_reports_max_then_clears() {
        let acc = Accumulator::new();
        for ms in [50, 120, 30] {
            acc.record_request_latency(Duration::from_millis(ms));
        }
        acc.record_domain_latency(Duration::from_millis(900));

        let snap = acc.snapshot();
        assert_eq!(snap.max_request_latency, Some(120.0));
        assert_eq!(snap.max_domain_latency, Some(900.0));

        let snap = acc.snapshot();
        assert_eq!(snap.max_request_latency, None);
        assert_eq!(snap.max_domain_latency, None);
    }

    #[test]
    fn counters_survive_repeated_snapshots() {
        let acc = Accumulator::new();
        acc.record_request("GET");
        acc.user_session_started();
        acc.transaction_completed(TransactionOutcome::Success { amount: 3.0 });

        let first = acc.snapshot();
        let second = acc.snapshot();
        assert_eq!(first, second);
        assert_eq!(second.requests_for("GET"), 1);
    }

    #[test]
    fn drains_racing_appends_never_repeat_a_sample() {
        const SAMPLES: u64 = 10_000;

        let acc = Arc::new(Accumulator::new());
        let writer = {
            let acc = acc.clone();
            thread::spawn(move || {
                for ms in 1..=SAMPLES {
                    acc.record_request_latency(Duration::from_millis(ms));
                }
            })
        };

        // Samples only grow, so every drain must report a larger max than
        // the one before. A sample seen by two drains would repeat a max.
        let mut last = 0.0;
        let mut check = |max: Option<f64>| {
            if let Some(max) = max {
                assert!(max > last, "max {max} after {last} was reported twice");
                last = max;
            }
        };
        while !writer.is_finished() {
            check(acc.snapshot().max_request_latency);
        }
        writer.join().unwrap();
        check(acc.snapshot().max_request_latency);

        assert_eq!(last, SAMPLES as f64);
        assert_eq!(acc.snapshot().max_request_latency, None);
    }
}
