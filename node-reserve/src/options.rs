/// Options when setting up a [`crate::NodeReserve`] instance.
#[derive(Debug, Clone)]
pub struct Options {
    /// The number of hash buckets in the reservation ledger.
    pub(crate) buckets: usize,
    /// Enable or disable metrics collection.
    pub(crate) metrics: bool,
}

impl Options {
    /// Create a new `Options` instance with the default values.
    pub fn new() -> Self {
        Self {
            buckets: 17,
            metrics: false,
        }
    }

    /// Set the number of hash buckets in the reservation ledger.
    ///
    /// Active reservations are chained per bucket, so the bucket count should be in the order of
    /// the number of contexts expected to hold a reservation at the same time.
    ///
    /// May not be zero.
    ///
    /// Default: 17.
    pub fn buckets(&mut self, buckets: usize) {
        assert!(buckets > 0);
        self.buckets = buckets;
    }

    /// Set metrics collection on or off.
    ///
    /// Default: off.
    pub fn metrics(&mut self, metrics: bool) {
        self.metrics = metrics;
    }
}

impl Default for Options {
    fn default() -> Self {
        Self::new()
    }
}
