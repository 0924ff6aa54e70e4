use std::path::{PathBuf};
use std::process::{ExitCode};
use std::time::{Duration};

use clap::Parser;

use tracing_subscriber::EnvFilter;

use vkbatch::data_conv::*;
use vkbatch::*;

/// Runs a pre-compiled compute kernel over one batch of field elements
#[derive(Debug, Parser)]
#[command(version, about)]
struct Args {
    /// Kernel module to run
    kernel : Option<PathBuf>,

    /// JSON config file, command line flags take precedence
    #[arg(long)]
    config : Option<PathBuf>,

    #[arg(long)]
    work_items : Option<u32>,

    #[arg(long)]
    workgroup_size : Option<u32>,

    #[arg(long)]
    timeout_ms : Option<u64>,

    #[arg(long, overrides_with = "no_validation")]
    validation : bool,

    #[arg(long, overrides_with = "validation")]
    no_validation : bool,

    /// Index of the physical device to use
    #[arg(long)]
    adapter : Option<u32>,

    /// JSON file with one input record per work item
    #[arg(long)]
    inputs : Option<PathBuf>,

    /// JSON file to write all output records to
    #[arg(long)]
    outputs : Option<PathBuf>,
}

impl Args {
    fn dispatch_config(&self) -> Result<DispatchConfig> {
        let mut config = match &self.config {
            Some(path) => DispatchConfig::from_json_file(path)?,
            None => DispatchConfig::new(),
        };

        if let Some(kernel) = &self.kernel {
            config = config.kernel_path(kernel);
        }

        if let Some(n) = self.work_items {
            config = config.total_work_items(n);
        }

        if let Some(n) = self.workgroup_size {
            config = config.workgroup_size(n);
        }

        if let Some(ms) = self.timeout_ms {
            config = config.timeout(Duration::from_millis(ms));
        }

        if self.validation || self.no_validation {
            config = config.validation(self.validation);
        }

        if self.adapter.is_some() {
            config = config.adapter_index(self.adapter);
        }

        Ok(config)
    }
}

fn run_app(args : &Args) -> Result<()> {
    let config = args.dispatch_config()?;
    let count = config.total_work_items as usize;

    let inputs = match &args.inputs {
        Some(path) => load_records::<DoubleFe25519>(path)?,
        None => vec![DoubleFe25519::test_pattern(); count],
    };

    if inputs.len() != count {
        return Err(Error::Config(format!(
            "Input file holds {} records, expected {count}", inputs.len())));
    }

    let mut session = ComputeSession::new(&config, BatchLayout::fe25519(count))?;
    let outputs : Vec<Fe25519> = session.run_batch(&inputs)?;

    if let Some(first) = outputs.first() {
        for limb in first.value {
            println!("Output was {limb}");
        }
    }

    if let Some(path) = &args.outputs {
        store_records(path, &outputs)?;
    }

    Ok(())
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let args = Args::parse();

    match run_app(&args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!(class = ?e.class(), "{e}");
            ExitCode::FAILURE
        },
    }
}
