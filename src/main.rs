use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand};
use mixcall::compare::{render_summary, ExpectedRegion, DEFAULT_PERCENT_THRESHOLDS};
use mixcall::config::{CallerParams, PipelineConfig, StrandMode, SweepAxis, SweepSpec, DEFAULT_MAX_DEPTH};
use mixcall::genomics::{variation_table_path, AlignmentSource, KmerVariantCaller, ReadSource};
use mixcall::pipeline::{run_pipeline, SampleReport};
use mixcall::sweep::{load_regions, ParameterSweep};

#[derive(Parser, Debug)]
#[command(name = "mixcall", about = "K-mer context variant caller for multiplexed HIV samples")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Call per-position base frequencies for one sample.
    Call {
        /// Coordinate-sorted BAM.
        alignment: PathBuf,
        /// Corrected reads (FASTA/FASTQ, optionally gzipped).
        reads: PathBuf,
        /// Output table; defaults to `<out-dir>/<bam stem>-variations.tsv`.
        #[arg(long, short)]
        output: Option<PathBuf>,
        /// Directory for the default output table.
        #[arg(long, default_value = "variation")]
        out_dir: PathBuf,
        #[command(flatten)]
        params: ParamArgs,
    },
    /// Sweep caller parameters for one sample and score every combination.
    Sweep {
        /// Coordinate-sorted BAM.
        alignment: PathBuf,
        /// Corrected reads (FASTA/FASTQ, optionally gzipped).
        reads: PathBuf,
        /// Expected-call TSV scored against each table.
        #[arg(long)]
        expected: PathBuf,
        /// Region label used in the report.
        #[arg(long, default_value = "expected")]
        name: String,
        /// Added to expected positions to reach reference coordinates.
        #[arg(long, default_value_t = 0, allow_hyphen_values = true)]
        offset: i64,
        /// Candidate k-mer sizes.
        #[arg(long, value_delimiter = ',')]
        kmer_sizes: Vec<usize>,
        /// Candidate detection thresholds.
        #[arg(long, value_delimiter = ',')]
        thresholds: Vec<f64>,
        /// Candidate minimum base qualities.
        #[arg(long, value_delimiter = ',')]
        min_quals: Vec<u8>,
        #[command(flatten)]
        params: ParamArgs,
    },
    /// Run every sample of a TOML pipeline file.
    Run {
        /// Pipeline configuration.
        config: PathBuf,
    },
}

#[derive(Args, Debug)]
struct ParamArgs {
    /// Context k-mer length (odd).
    #[arg(long, short = 'k', default_value_t = 13)]
    kmer_size: usize,
    /// Fraction of a column's context abundance a k-mer must exceed.
    #[arg(long, default_value_t = 0.01)]
    detection_thresh: f64,
    /// Minimum Phred base quality of the call.
    #[arg(long, default_value_t = 20)]
    min_qual: u8,
    /// Reverse-strand keying.
    #[arg(long, value_enum, default_value_t = StrandMode::Legacy)]
    strand_mode: StrandMode,
    /// Pileup depth cap per column.
    #[arg(long, default_value_t = DEFAULT_MAX_DEPTH)]
    max_depth: u32,
    /// Worker threads for index construction (0 = all cores).
    #[arg(long, default_value_t = 0)]
    threads: usize,
}

impl ParamArgs {
    fn params(&self) -> CallerParams {
        CallerParams {
            kmer_size: self.kmer_size,
            detection_thresh: self.detection_thresh,
            min_qual: self.min_qual,
            strand_mode: self.strand_mode,
            max_depth: self.max_depth,
        }
    }

    fn install_thread_pool(&self) -> Result<()> {
        if self.threads > 0 {
            rayon::ThreadPoolBuilder::new()
                .num_threads(self.threads)
                .build_global()
                .context("failed to configure worker threads")?;
        }
        Ok(())
    }
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Call {
            alignment,
            reads,
            output,
            out_dir,
            params,
        } => {
            params.install_thread_pool()?;
            let output = output.unwrap_or_else(|| variation_table_path(&out_dir, &alignment));
            run_call(&alignment, &reads, &output, params.params())?
        }
        Commands::Sweep {
            alignment,
            reads,
            expected,
            name,
            offset,
            kmer_sizes,
            thresholds,
            min_quals,
            params,
        } => {
            params.install_thread_pool()?;
            let region = ExpectedRegion {
                name,
                file: expected,
                offset,
                space: None,
            };
            let spec = sweep_spec(kmer_sizes, thresholds, min_quals);
            run_sweep(&alignment, &reads, region, params.params(), spec)?
        }
        Commands::Run { config } => run_config(&config)?,
    }

    Ok(())
}

fn run_call(alignment: &Path, reads: &Path, output: &Path, params: CallerParams) -> Result<()> {
    let caller = KmerVariantCaller::from_reads(params, ReadSource::File(reads))
        .with_context(|| format!("failed to index reads from {}", reads.display()))?;
    let summary = caller
        .write_table(AlignmentSource::Bam(alignment), output)
        .with_context(|| format!("failed to call variants from {}", alignment.display()))?;
    println!(
        "{}\tcolumns={}\trows={}",
        summary.table.display(),
        summary.columns,
        summary.rows
    );
    Ok(())
}

/// Axes are swept in the fixed order k, threshold, quality; empty lists are skipped.
fn sweep_spec(kmer_size: Vec<usize>, detection_thresh: Vec<f64>, min_qual: Vec<u8>) -> SweepSpec {
    let mut range_params = Vec::new();
    if !kmer_size.is_empty() {
        range_params.push(SweepAxis::KmerSize);
    }
    if !detection_thresh.is_empty() {
        range_params.push(SweepAxis::DetectionThresh);
    }
    if !min_qual.is_empty() {
        range_params.push(SweepAxis::MinQual);
    }
    SweepSpec {
        range_params,
        kmer_size,
        detection_thresh,
        min_qual,
    }
}

fn run_sweep(
    alignment: &Path,
    reads: &Path,
    region: ExpectedRegion,
    params: CallerParams,
    spec: SweepSpec,
) -> Result<()> {
    let regions = load_regions(std::slice::from_ref(&region))
        .with_context(|| format!("failed to load expected calls {}", region.file.display()))?;
    let sweep = ParameterSweep::new(params, spec)
        .context("invalid sweep")?
        .with_thresholds(DEFAULT_PERCENT_THRESHOLDS.to_vec());
    let entries = sweep
        .run(ReadSource::File(reads), AlignmentSource::Bam(alignment), &regions)
        .with_context(|| format!("sweep failed for {}", alignment.display()))?;

    for entry in entries {
        println!("* {} (rows={})", entry.params, entry.rows);
        for score in &entry.regions {
            print!("{}", render_summary(score));
        }
    }
    Ok(())
}

fn run_config(path: &Path) -> Result<()> {
    let config = PipelineConfig::from_path(path)
        .with_context(|| format!("failed to load pipeline {}", path.display()))?;
    let outcomes = run_pipeline(&config).context("pipeline failed to start")?;

    let mut failed = 0usize;
    for outcome in outcomes {
        println!("# {}", outcome.alignment.display());
        match outcome.result {
            Ok(SampleReport::Called {
                table,
                rows,
                reused,
                regions,
            }) => {
                println!("table={} rows={} reused={}", table.display(), rows, reused);
                for score in &regions {
                    print!("{}", render_summary(score));
                }
            }
            Ok(SampleReport::Swept { entries }) => {
                for entry in entries {
                    println!("* {} (rows={})", entry.params, entry.rows);
                    for score in &entry.regions {
                        print!("{}", render_summary(score));
                    }
                }
            }
            Err(err) => {
                failed += 1;
                println!("failed: {err}");
            }
        }
    }

    if failed > 0 {
        bail!("{failed} sample(s) failed");
    }
    Ok(())
}
