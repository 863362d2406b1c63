//! stridekit command-line driver.
//!
//! Plans a strided batched layout for the requested operation, executes
//! it on the selected kernel provider, validates the output against the
//! CPU reference, and maps the verdict to an exit status: 0 on success,
//! 2 when the numerical check found mismatches, 1 for any fatal shape,
//! resource, or kernel failure.

use anyhow::Result;
use clap::{Parser, Subcommand, ValueEnum};
use tracing::{error, info};

use stridekit_common::{
    GemmSpec, Placement, TransformDirection, TransformSpec, DEFAULT_SEED,
};
use stridekit_kernels::{run_gemm, run_transform, GemmFill, KernelManager, RunReport};

mod exit;

/// stridekit - strided batched layout verification for accelerated
/// GEMM and DFT kernels
#[derive(Parser)]
#[command(name = "stridekit")]
#[command(about = "Verify strided batched kernel layouts against a CPU reference")]
#[command(version)]
struct Cli {
    /// Log level (trace, debug, info, warn, error)
    #[arg(long, value_name = "LEVEL", default_value = "info", global = true)]
    log_level: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Verify a batched dense product C := alpha*op(A)*op(B) + beta*C
    Gemm {
        /// Number of rows of matrices op(A_i) and C_i
        #[arg(short, long, default_value_t = 5)]
        m: usize,

        /// Number of columns of matrices op(B_i) and C_i
        #[arg(short, long, default_value_t = 5)]
        n: usize,

        /// Number of columns of op(A_i) and rows of op(B_i)
        #[arg(short, long, default_value_t = 5)]
        k: usize,

        /// Batch count
        #[arg(short = 'c', long, default_value_t = 3)]
        batch: usize,

        /// Alpha scalar
        #[arg(short = 'a', long, default_value_t = 1.0)]
        alpha: f32,

        /// Beta scalar
        #[arg(short = 'b', long, default_value_t = 1.0)]
        beta: f32,

        /// Interpret A as transposed
        #[arg(long)]
        transpose_a: bool,

        /// Interpret B as transposed
        #[arg(long)]
        transpose_b: bool,

        /// Fill operands with seeded uniform values instead of the
        /// ones/identity pattern
        #[arg(long)]
        random: bool,

        /// Seed for the random fill
        #[arg(long, default_value_t = DEFAULT_SEED)]
        seed: u64,
    },

    /// Verify a batched discrete transform
    Transform {
        /// Logical extents, slowest dimension first (rank 1 to 3)
        #[arg(long, num_args = 1..=3, value_delimiter = ',', default_values_t = [4, 5])]
        extents: Vec<usize>,

        /// Transform domain
        #[arg(long, value_enum, default_value_t = DomainArg::R2c)]
        domain: DomainArg,

        /// Transform direction (complex-to-complex only)
        #[arg(long, value_enum, default_value_t = DirectionArg::Forward)]
        direction: DirectionArg,

        /// Batch count
        #[arg(short = 'c', long, default_value_t = 3)]
        batch: usize,

        /// Write the result into a separate output buffer
        #[arg(long)]
        out_of_place: bool,

        /// Seed for the input fill
        #[arg(long, default_value_t = DEFAULT_SEED)]
        seed: u64,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum DomainArg {
    /// Real input, half-spectrum complex output
    R2c,
    /// Complex input and output
    C2c,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum DirectionArg {
    Forward,
    Inverse,
}

impl From<DirectionArg> for TransformDirection {
    fn from(arg: DirectionArg) -> Self {
        match arg {
            DirectionArg::Forward => TransformDirection::Forward,
            DirectionArg::Inverse => TransformDirection::Inverse,
        }
    }
}

fn init_tracing(level: &str) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(level));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

fn run(command: Commands) -> Result<RunReport> {
    let manager = KernelManager::new();
    let provider = manager.select_best()?;
    info!("kernel provider: {}", provider.name());

    let report = match command {
        Commands::Gemm {
            m,
            n,
            k,
            batch,
            alpha,
            beta,
            transpose_a,
            transpose_b,
            random,
            seed,
        } => {
            let spec = GemmSpec::for_shape(m, n, k)?
                .with_batch_count(batch)?
                .with_transpose(transpose_a, transpose_b)
                .with_alpha_beta(alpha, beta);
            let fill = if random { GemmFill::Uniform { seed } } else { GemmFill::UnitIdentity };
            run_gemm(&spec, fill, provider)?
        }
        Commands::Transform { extents, domain, direction, batch, out_of_place, seed } => {
            let spec = match domain {
                DomainArg::R2c => TransformSpec::real_to_complex(&extents)?,
                DomainArg::C2c => TransformSpec::complex_to_complex(&extents, direction.into())?,
            };
            let placement =
                if out_of_place { Placement::OutOfPlace } else { Placement::InPlace };
            let spec = spec.with_placement(placement).with_batch_count(batch)?;
            run_transform(&spec, seed, provider)?
        }
    };
    Ok(report)
}

fn main() {
    let cli = Cli::parse();
    init_tracing(&cli.log_level);

    let code = match run(cli.command) {
        Ok(report) if report.passed() => {
            info!(
                "validation passed: {} elements checked, max deviation {:.3e}",
                report.elements_checked, report.verdict.max_deviation
            );
            println!("Validation passed.");
            exit::EXIT_SUCCESS
        }
        Ok(report) => {
            error!(
                "validation failed: {} of {} elements mismatched, max deviation {:.3e}",
                report.verdict.mismatch_count,
                report.elements_checked,
                report.verdict.max_deviation
            );
            println!("Validation failed: {} errors.", report.verdict.mismatch_count);
            exit::EXIT_MISMATCH
        }
        Err(e) => {
            error!("run failed: {e:#}");
            exit::EXIT_FATAL
        }
    };
    std::process::exit(code);
}
