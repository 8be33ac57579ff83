use clap::Parser;

#[derive(Parser, Debug)]
pub struct Cli {
    /// The 8-byte seed to use for the random number generator.
    ///
    /// If not provided, a random seed will be generated.
    pub seed: Option<u64>,

    /// The number of worker threads, each acting as its own execution context.
    #[clap(default_value = "8")]
    #[arg(long = "workers", short = 'w')]
    pub workers: usize,

    /// The number of batches each worker reserves for.
    #[clap(default_value = "10000")]
    #[arg(long = "iterations", short = 'i')]
    pub iterations: usize,

    /// The maximum number of inserts in a single batch.
    #[clap(default_value = "32")]
    #[arg(long = "max-inserts")]
    pub max_inserts: u32,

    /// The maximum number of deletes in a single batch.
    #[clap(default_value = "32")]
    #[arg(long = "max-deletes")]
    pub max_deletes: u32,

    /// The depth of the tree.
    #[clap(default_value = "3")]
    #[arg(long = "depth", short = 'd')]
    pub depth: u16,

    /// The number of nodes the tree starts with.
    #[clap(default_value = "64")]
    #[arg(long = "initial-nodes")]
    pub initial_nodes: u64,

    /// The number of nodes the tree can grow to. Once reached, reservations that need the tree
    /// to grow fail.
    #[clap(default_value = "65536")]
    #[arg(long = "capacity", short = 'c')]
    pub capacity: u64,

    /// The probability of keeping the nodes consumed by a batch allocated after it is done, as
    /// opposed to freeing them again.
    ///
    /// Accepted values are in the range of 0 to 100
    #[clap(default_value = "20")]
    #[clap(value_parser=clap::value_parser!(u8).range(0..=100))]
    #[arg(long = "retain-bias", short = 'r')]
    pub retain: u8,

    /// The probability of reserving a second time while a reservation is held.
    ///
    /// Accepted values are in the range of 0 to 100
    #[clap(default_value = "10")]
    #[clap(value_parser=clap::value_parser!(u8).range(0..=100))]
    #[arg(long = "nested-bias", short = 'n')]
    pub nested: u8,

    /// The probability of reserving without recording the reservation.
    ///
    /// Accepted values are in the range of 0 to 100
    #[clap(default_value = "5")]
    #[clap(value_parser=clap::value_parser!(u8).range(0..=100))]
    #[arg(long = "unrecorded-bias", short = 'u')]
    pub unrecorded: u8,

    /// The number of hash buckets in the reservation ledger. May not be zero.
    #[clap(default_value = "17")]
    #[arg(long = "buckets")]
    pub buckets: usize,

    /// Whether to collect and print metrics at the end of the run.
    #[clap(default_value = "false")]
    #[arg(long = "metrics")]
    pub metrics: bool,
}
