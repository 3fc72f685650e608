// =============================================================================
// MNIST smoke test: vole dataset loader
// =============================================================================
//
// Loads an MNIST split (downloading it on first use) and draws samples from
// it, counting failed draws instead of aborting.
//
// Features demonstrated:
//   1. MnistConfig: split, output dtype, one-hot labels, seed, cache dir
//   2. Dataset::test smoke harness with error handling
//   3. build_shards: one partitioned instance per worker, built in parallel
//   4. ErrorHandlingDataset retry wrapper
//
// Usage:
//   cargo run -p mnist-smoke                              # train split, float32, 1000 samples
//   cargo run -p mnist-smoke -- --test --dtype int8       # test split
//   cargo run -p mnist-smoke -- --workers 4               # sample from 4 shards
//   RUST_LOG=debug cargo run -p mnist-smoke               # verbose logging

use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;
use vole_data::{
    build_shards, DType, Dataset, ErrorHandlingConfig, ErrorHandlingDataset, Mnist, MnistConfig,
    TestOptions,
};

#[derive(Debug, Parser)]
#[command(about = "Draw samples from MNIST to check the loader end to end")]
struct Args {
    /// Load the test split instead of the training split.
    #[arg(long)]
    test: bool,

    /// Output dtype: int8 or float32.
    #[arg(long, default_value = "float32")]
    dtype: DType,

    /// Encode labels as one-hot rows.
    #[arg(long)]
    one_hot: bool,

    /// Number of samples to draw per worker.
    #[arg(long, default_value_t = 1000)]
    samples: usize,

    /// Seed for the sampling generator.
    #[arg(long, default_value_t = 0)]
    seed: u64,

    /// Cache directory (defaults to $VOLE_DATA_DIR or the system temp dir).
    #[arg(long)]
    data_dir: Option<PathBuf>,

    /// Partition the data across this many workers (0 = no partitioning).
    #[arg(long, default_value_t = 0)]
    workers: usize,

    /// Wrap each dataset in the retrying error handler.
    #[arg(long)]
    retry: bool,
}

impl Args {
    fn config(&self) -> MnistConfig {
        let config = MnistConfig::default()
            .train(!self.test)
            .dtype(self.dtype)
            .one_hot(self.one_hot)
            .seed(self.seed);
        match &self.data_dir {
            Some(dir) => config.data_dir(dir),
            None => config,
        }
    }

    fn options(&self) -> TestOptions {
        TestOptions::default()
            .max_samples(self.samples)
            .handle_errors(true)
            .log_every(self.samples.max(10) / 10)
    }
}

fn smoke<D: Dataset>(ds: D, args: &Args) -> vole_data::Result<usize> {
    let summary = if args.retry {
        let mut ds = ErrorHandlingDataset::new(ds, ErrorHandlingConfig::default())?;
        let summary = ds.test(args.options())?;
        if !ds.summary().is_empty() {
            log::warn!("{}", ds.summary());
        }
        summary
    } else {
        let mut ds = ds;
        ds.test(args.options())?
    };
    Ok(summary.error_count())
}

fn run(args: &Args) -> vole_data::Result<usize> {
    if args.workers == 0 {
        let ds = Mnist::new(args.config())?;
        log::info!("{} examples of {:?}", ds.len(), ds.image_dims());
        return smoke(ds, args);
    }

    let shards = build_shards(args.workers, |worker_id| {
        Mnist::new(args.config().log_target(format!("mnist::worker{worker_id}")))
    })?;
    let mut errors = 0;
    for (worker_id, shard) in shards.into_iter().enumerate() {
        log::info!("worker {worker_id}: {} examples", shard.len());
        errors += smoke(shard, args)?;
    }
    Ok(errors)
}

fn main() -> ExitCode {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = Args::parse();

    match run(&args) {
        Ok(0) => ExitCode::SUCCESS,
        Ok(errors) => {
            log::warn!("{errors} draws failed");
            ExitCode::FAILURE
        }
        Err(e) => {
            log::error!("{e}");
            ExitCode::FAILURE
        }
    }
}
