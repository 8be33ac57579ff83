use std::sync::{
    atomic::{AtomicU64, Ordering},
    Arc,
};

/// Metrics collector, if active, it provides Counters and Timers
#[derive(Clone)]
pub struct Metrics {
    metrics: Option<Arc<ActiveMetrics>>,
}

/// Metrics that can be collected during execution
#[derive(Debug, PartialEq, Eq, Hash)]
pub enum Metric {
    /// Counter of reservations recorded in the ledger
    Reservations,
    /// Counter of reservations that were dropped because the context already held one
    NestedReservations,
    /// Counter of releases that retired an active reservation
    Releases,
    /// Counter of calls made to grow a tree's node pool
    Growths,
    /// Counter of growth calls that returned an error
    GrowthFailures,
    /// Timer used to record average time spent growing node pools
    GrowthTime,
}

struct ActiveMetrics {
    reservations: AtomicU64,
    nested_reservations: AtomicU64,
    releases: AtomicU64,
    growths: AtomicU64,
    growth_failures: AtomicU64,
    growth_time: Timer,
}

impl ActiveMetrics {
    fn counter(&self, metric: Metric) -> &AtomicU64 {
        match metric {
            Metric::Reservations => &self.reservations,
            Metric::NestedReservations => &self.nested_reservations,
            Metric::Releases => &self.releases,
            Metric::Growths => &self.growths,
            Metric::GrowthFailures => &self.growth_failures,
            Metric::GrowthTime => panic!("Specified metric is not a Counter"),
        }
    }
}

impl Metrics {
    /// Returns the Metrics object, active or not based on the specified input
    pub fn new(active: bool) -> Self {
        Self {
            metrics: if active {
                Some(Arc::new(ActiveMetrics {
                    reservations: AtomicU64::new(0),
                    nested_reservations: AtomicU64::new(0),
                    releases: AtomicU64::new(0),
                    growths: AtomicU64::new(0),
                    growth_failures: AtomicU64::new(0),
                    growth_time: Timer::new(),
                }))
            } else {
                None
            },
        }
    }

    /// Increase the Counter specified by the input
    ///
    /// panics if the specified [`Metric`] is not a Counter
    pub fn count(&self, metric: Metric) {
        if let Some(ref metrics) = self.metrics {
            metrics.counter(metric).fetch_add(1, Ordering::Relaxed);
        }
    }

    /// The current value of a Counter, or `None` if collection is off.
    ///
    /// panics if the specified [`Metric`] is not a Counter
    pub fn get(&self, metric: Metric) -> Option<u64> {
        self.metrics
            .as_ref()
            .map(|metrics| metrics.counter(metric).load(Ordering::Relaxed))
    }

    /// Returns a guard that, when dropped, will record the time passed since creation
    ///
    /// panics if the specified [`Metric`] is not a Timer
    pub fn record<'a>(&'a self, metric: Metric) -> Option<impl Drop + 'a> {
        self.metrics.as_ref().map(|metrics| {
            let timer = match metric {
                Metric::GrowthTime => &metrics.growth_time,
                _ => panic!("Specified metric is not a Timer"),
            };

            timer.record()
        })
    }

    /// Print collected metrics to stdout
    pub fn print(&self) {
        if let Some(ref metrics) = self.metrics {
            println!("metrics");

            let reservations = metrics.reservations.load(Ordering::Relaxed);
            println!("  reservations          {}", reservations);

            let nested = metrics.nested_reservations.load(Ordering::Relaxed);
            println!("  nested reservations   {}", nested);

            let releases = metrics.releases.load(Ordering::Relaxed);
            println!("  releases              {}", releases);

            let growths = metrics.growths.load(Ordering::Relaxed);
            println!("  pool growths          {}", growths);

            if growths != 0 {
                let failures = metrics.growth_failures.load(Ordering::Relaxed);
                let percentage_failures = (failures as f64 / growths as f64) * 100.0;

                println!(
                    "  growth failures       {} - {:.2}% of pool growths",
                    failures, percentage_failures
                );
            }

            if let Some(mean) = metrics.growth_time.mean() {
                println!("  growth mean           {}", pretty_display_ns(mean));
            }
        } else {
            println!("Metrics collection was not activated")
        }
    }
}

fn pretty_display_ns(ns: u64) -> String {
    // preserve 3 sig figs at minimum.
    let (val, unit) = if ns > 100 * 1_000_000_000 {
        (ns / 1_000_000_000, "s")
    } else if ns > 100 * 1_000_000 {
        (ns / 1_000_000, "ms")
    } else if ns > 100 * 1_000 {
        (ns / 1_000, "us")
    } else {
        (ns, "ns")
    };

    format!("{val} {unit}")
}

struct Timer {
    number_of_records: AtomicU64,
    sum: AtomicU64,
}

impl Timer {
    fn new() -> Self {
        Timer {
            number_of_records: AtomicU64::new(0),
            sum: AtomicU64::new(0),
        }
    }

    fn mean(&self) -> Option<u64> {
        let n = self.number_of_records.load(Ordering::Relaxed);
        let sum = self.sum.load(Ordering::Relaxed);
        sum.checked_div(n)
    }

    fn record<'a>(&'a self) -> impl Drop + 'a {
        struct TimerGuard<'a> {
            start: std::time::Instant,
            n: &'a AtomicU64,
            sum: &'a AtomicU64,
        }

        impl Drop for TimerGuard<'_> {
            fn drop(&mut self) {
                let elapsed = self.start.elapsed().as_nanos() as u64;
                self.n.fetch_add(1, Ordering::Relaxed);
                self.sum.fetch_add(elapsed, Ordering::Relaxed);
            }
        }

        TimerGuard {
            start: std::time::Instant::now(),
            n: &self.number_of_records,
            sum: &self.sum,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{pretty_display_ns, Metric, Metrics};

    #[test]
    fn inactive_metrics_count_nothing() {
        let metrics = Metrics::new(false);
        metrics.count(Metric::Reservations);
        assert_eq!(metrics.get(Metric::Reservations), None);
        assert!(metrics.record(Metric::GrowthTime).is_none());
    }

    #[test]
    fn counters_are_shared_between_clones() {
        let metrics = Metrics::new(true);
        let other = metrics.clone();
        metrics.count(Metric::Growths);
        other.count(Metric::Growths);
        other.count(Metric::GrowthFailures);
        assert_eq!(metrics.get(Metric::Growths), Some(2));
        assert_eq!(metrics.get(Metric::GrowthFailures), Some(1));
        assert_eq!(metrics.get(Metric::Releases), Some(0));
    }

    #[test]
    #[should_panic(expected = "not a Counter")]
    fn timer_is_not_a_counter() {
        Metrics::new(true).count(Metric::GrowthTime);
    }

    #[test]
    fn display_units() {
        assert_eq!(pretty_display_ns(512), "512 ns");
        assert_eq!(pretty_display_ns(250_000), "250 us");
        assert_eq!(pretty_display_ns(300_000_000), "300 ms");
    }
}
