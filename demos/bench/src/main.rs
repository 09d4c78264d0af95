mod model;

use std::process::ExitCode;
use std::time::Duration;
use clap::{Parser, ValueEnum};
use tracing::{error, Level};
use tracing_subscriber::FmtSubscriber;
use brazier::{
    run_benchmark, BenchmarkReport, EngineError, FakeEngine, FaultPolicy, PipelineConfig,
    WorkerId,
};
use crate::model::Dense;

#[derive(Debug, Clone, Copy, ValueEnum)]
enum Policy {
    ClosePipeline,
    IsolateWorker,
}

impl From<Policy> for FaultPolicy {
    fn from(policy: Policy) -> Self {
        match policy {
            Policy::ClosePipeline => FaultPolicy::ClosePipeline,
            Policy::IsolateWorker => FaultPolicy::IsolateWorker,
        }
    }
}

#[derive(Parser, Debug)]
#[command(name = "brazier-bench")]
#[command(about = "Closed-loop throughput benchmark of a brazier worker pool")]
struct Args {
    /// Number of engine workers
    #[arg(short = 'w', long, default_value = "2")]
    num_workers: usize,

    #[arg(short, long, default_value = "8")]
    batch_size: usize,

    /// Elements per input sample
    #[arg(short, long, default_value = "784")]
    input_size: usize,

    /// Elements per output sample
    #[arg(short, long, default_value = "10")]
    output_size: usize,

    #[arg(long, default_value = "10")]
    num_warmup_batches: usize,

    #[arg(short = 'n', long, default_value = "1000")]
    num_batches: usize,

    /// Skip computation and measure pipeline overhead only
    #[arg(long)]
    fake_inference: bool,

    /// Simulated per-batch latency of the fake engine, in microseconds
    #[arg(long, requires = "fake_inference")]
    fake_latency_us: Option<u64>,

    /// Bound on the request queue; unbounded when omitted
    #[arg(long)]
    request_capacity: Option<usize>,

    /// Bound on the response queue; unbounded when omitted
    #[arg(long)]
    response_capacity: Option<usize>,

    #[arg(long, value_enum, default_value = "close-pipeline")]
    fault_policy: Policy,

    /// Seed of the dense model's weights
    #[arg(long, default_value = "42")]
    seed: u64,

    #[arg(short, long)]
    verbose: bool,
}

impl Args {
    fn config(&self) -> PipelineConfig {
        PipelineConfig::new(self.num_workers, self.batch_size, self.input_size, self.output_size)
            .with_warmup_batches(self.num_warmup_batches)
            .with_batches(self.num_batches)
            .with_fake_inference(self.fake_inference)
            .with_request_capacity(self.request_capacity)
            .with_response_capacity(self.response_capacity)
            .with_fault_policy(self.fault_policy.into())
    }
}

fn run(args: &Args) -> brazier::Result<BenchmarkReport> {
    let config = args.config();

    if config.fake_inference {
        let engine = match args.fake_latency_us {
            Some(us) => FakeEngine::with_latency(Duration::from_micros(us)),
            None => FakeEngine::new(),
        };
        return run_benchmark(config, move |_: WorkerId| Ok::<_, EngineError>(engine));
    }

    let (input_size, output_size, seed) = (args.input_size, args.output_size, args.seed);
    run_benchmark(config, move |_: WorkerId| {
        Ok::<_, EngineError>(Dense::new(input_size, output_size, seed))
    })
}

fn main() -> ExitCode {
    let args = Args::parse();

    let log_level = if args.verbose { Level::DEBUG } else { Level::INFO };
    let subscriber = FmtSubscriber::builder()
        .with_max_level(log_level)
        .with_target(false)
        .finish();
    let _ = tracing::subscriber::set_global_default(subscriber);

    match run(&args) {
        Ok(report) => {
            print!("{}", report);
            ExitCode::SUCCESS
        }
        Err(err) => {
            error!(error = %err, "benchmark failed");
            ExitCode::FAILURE
        }
    }
}
