//! Publish a routing dataset into shared memory.

use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Duration;

use clap::Parser;
use tracing::error;
use tracing_subscriber::EnvFilter;

use osrm_datastore::{Monitor, Publisher, RegionStamp, StorageConfig};

#[derive(Parser)]
#[command(name = "osrm-datastore", version, about = "Shared memory snapshot publisher")]
struct Args {
    /// Common prefix of the dataset files, e.g. /data/map.osrm
    base_path: PathBuf,

    /// Namespace for the shared memory objects of this dataset
    #[arg(long, default_value = StorageConfig::DEFAULT_DATASET)]
    dataset_name: String,

    /// Seconds to wait for the region lock before resetting the monitor;
    /// negative means wait forever
    #[arg(long, default_value_t = -1)]
    max_wait: i64,

    /// Print the currently announced region and exit
    #[arg(long)]
    list: bool,
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();
    let config = StorageConfig::new(args.base_path).with_dataset_name(args.dataset_name);

    if args.list {
        return match Monitor::open_or_create(&config.monitor_name(), RegionStamp::INITIAL) {
            Ok(monitor) => {
                let stamp = monitor.peek();
                println!("{} {}", stamp.region, stamp.timestamp);
                ExitCode::SUCCESS
            }
            Err(e) => {
                error!("{e}");
                ExitCode::FAILURE
            }
        };
    }

    let max_wait = if args.max_wait < 0 {
        None
    } else {
        Some(Duration::from_secs(args.max_wait as u64))
    };

    match Publisher::new(config).run(max_wait) {
        Ok(stamp) => {
            println!("published {} with timestamp {}", stamp.region, stamp.timestamp);
            ExitCode::SUCCESS
        }
        Err(e) => {
            error!("{e}");
            ExitCode::FAILURE
        }
    }
}
