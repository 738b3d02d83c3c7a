use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand, ValueEnum};
use segyconv::compression::{CompressionLevel, CompressionMethod};
use segyconv::pipeline::{ConversionWorker, RunReport, Strategy, WorkerEvent, WorkerStatus};
use segyconv::segy::{self, ReadOptions, WriteOptions};
use segyconv::{snapshot, utils, ConvertConfig, WindowPolicy};
use std::path::PathBuf;
use tracing::{info, warn};

#[derive(Parser, Debug)]
#[command(
    author,
    version,
    about = "Convert geophone recordings to SEG-Y and inspect SEG-Y files",
    long_about = None,
    arg_required_else_help = true,
    after_help = "Examples:\n  segyconv minute raw/ sgy/ --parallelism 4\n  segyconv lapse lapse/ sgy/ --window-policy complete-only\n  segyconv merge a.sgy b.sgy -o ab.sgy\n  segyconv info sgy/20191111_100500.sgy --headers\n"
)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Convert `<receiver>/<YYYYMMDD>/<HH>/<MM>T.dat` minute files
    Minute(ConvertArgs),
    /// Align and window free-running single-channel recordings
    Lapse(ConvertArgs),
    /// Concatenate SEG-Y files with matching sample counts
    Merge {
        inputs: Vec<PathBuf>,
        #[arg(short, long)]
        output: PathBuf,
        /// DataSampleFormat to write
        #[arg(long, default_value_t = segy::DSF_IEEE)]
        format: i16,
    },
    /// Print a summary of a SEG-Y file
    Info {
        file: PathBuf,
        /// Also print non-zero binary header values
        #[arg(long)]
        headers: bool,
        /// Force the DataSampleFormat instead of the header's
        #[arg(long)]
        format: Option<i16>,
    },
    /// Save a SEG-Y file as a compressed snapshot, or restore one
    Snapshot {
        input: PathBuf,
        output: PathBuf,
        /// Convert a snapshot back to SEG-Y
        #[arg(long)]
        restore: bool,
        #[arg(long, default_value = "zstd")]
        compression: String,
        #[arg(long, default_value_t = 6)]
        level: u8,
    },
}

#[derive(Args, Debug)]
struct ConvertArgs {
    input: PathBuf,
    output: PathBuf,
    /// TOML or JSON settings file
    #[arg(short, long)]
    config: Option<PathBuf>,
    #[arg(long)]
    parallelism: Option<usize>,
    #[arg(long)]
    skip_existing: bool,
    #[arg(long, value_enum)]
    window_policy: Option<PolicyArg>,
}

#[derive(ValueEnum, Clone, Copy, Debug)]
enum PolicyArg {
    DropTrailing,
    CompleteOnly,
}

impl From<PolicyArg> for WindowPolicy {
    fn from(arg: PolicyArg) -> Self {
        match arg {
            PolicyArg::DropTrailing => WindowPolicy::DropTrailing,
            PolicyArg::CompleteOnly => WindowPolicy::CompleteOnly,
        }
    }
}

fn setup_logging() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .try_init();
}

fn load_config(args: &ConvertArgs) -> Result<ConvertConfig> {
    let mut config = match &args.config {
        Some(path) => ConvertConfig::load(path).with_context(|| format!("loading {}", path.display()))?,
        None => ConvertConfig::default(),
    };
    if let Some(parallelism) = args.parallelism {
        config = config.with_parallelism(parallelism);
    }
    if let Some(policy) = args.window_policy {
        config = config.with_window_policy(policy.into());
    }
    config.skip_existing |= args.skip_existing;
    Ok(config)
}

fn print_event(event: &WorkerEvent) {
    match event {
        WorkerEvent::Started { strategy, input } => info!(?strategy, input = %input.display(), "Started"),
        WorkerEvent::Progress { done, total } => info!("Progress {}/{}", done, total),
        WorkerEvent::Label(label) => info!("Converting {}", label),
        WorkerEvent::Warning(skipped) => warn!(path = %skipped.path.display(), "Skipped: {}", skipped.reason),
        WorkerEvent::Finished(_) => {}
    }
}

fn print_report(report: &RunReport) {
    println!(
        "{} of {} buckets written, {} already present, {} empty, {} inputs skipped",
        report.written.len(),
        report.total,
        report.existing,
        report.empty,
        report.skipped.len()
    );
}

async fn convert(strategy: Strategy, args: ConvertArgs) -> Result<()> {
    let config = load_config(&args)?;
    let (worker, mut events) = ConversionWorker::spawn(strategy, &args.input, &args.output, config);

    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);
    let mut interrupted = false;
    loop {
        tokio::select! {
            event = events.recv() => match event {
                Some(event) => print_event(&event),
                None => break,
            },
            _ = &mut ctrl_c, if !interrupted => {
                interrupted = true;
                warn!("Interrupt received, stopping after the current bucket");
                worker.cancel();
            }
        }
    }

    let report = worker.join().await?;
    print_report(&report);
    if let WorkerStatus::Cancelled(_) = worker.status() {
        bail!("conversion cancelled");
    }
    Ok(())
}

fn info_command(file: PathBuf, headers: bool, format: Option<i16>) -> Result<()> {
    let mut options = ReadOptions::default();
    if let Some(format) = format {
        options = options.with_data_sample_format(format);
    }
    let size = std::fs::metadata(&file)
        .with_context(|| format!("reading {}", file.display()))?
        .len();
    let container = segy::read_file(&file, &options)?;
    println!("{} ({})", file.display(), utils::format_bytes(size as usize));
    println!("{}", container.stats());
    if headers {
        for (name, value) in container.volume_header().iter().filter(|(_, v)| *v != 0) {
            println!("  {:<32} {}", name, value);
        }
    }
    Ok(())
}

fn snapshot_command(input: PathBuf, output: PathBuf, restore: bool, compression: &str, level: u8) -> Result<()> {
    if restore {
        let container = snapshot::load(&input)?;
        segy::write_file(&container, &output, &WriteOptions::default())?;
    } else {
        let method: CompressionMethod = compression.parse()?;
        let container = segy::read_file(&input, &ReadOptions::default())?;
        snapshot::save(&container, &output, method, CompressionLevel::new(level))?;
    }
    println!("{} -> {}", input.display(), output.display());
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    setup_logging();
    let cli = Cli::parse();

    match cli.command {
        Command::Minute(args) => convert(Strategy::Minute, args).await,
        Command::Lapse(args) => convert(Strategy::Lapse, args).await,
        Command::Merge { inputs, output, format } => {
            if inputs.is_empty() {
                bail!("no input files");
            }
            let merged = segy::merge_to_file(
                &inputs,
                &output,
                &ReadOptions::default(),
                &WriteOptions::default().with_data_sample_format(format),
            )?;
            println!("{} traces written to {}", merged.ntraces(), output.display());
            Ok(())
        }
        Command::Info { file, headers, format } => info_command(file, headers, format),
        Command::Snapshot {
            input,
            output,
            restore,
            compression,
            level,
        } => snapshot_command(input, output, restore, &compression, level),
    }
}
