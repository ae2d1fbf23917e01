// shuffle-cli/src/main.rs

//! Record Shuffle command-line tool.
//!
//! # Usage
//!
//! ```bash
//! # Shuffle a framed record file with default settings
//! recshuffle shuffle train.rec train.shuffled.rec
//!
//! # Reproducible run over a newline-delimited file
//! recshuffle shuffle data.jsonl shuffled.jsonl --layout newline --seed 7
//!
//! # Show what a record file holds
//! recshuffle inspect train.shuffled.rec
//! ```

use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use shuffle_core::records::{open_source, RecordFileReader, RecordLayout, RecordSource};
use shuffle_core::{LocalStorage, ShuffleConfig, ShuffleJob};

/// Record Shuffle
#[derive(Parser, Debug)]
#[command(name = "recshuffle")]
#[command(about = "Shuffle record files larger than memory")]
struct Args {
    #[command(subcommand)]
    command: Command,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info", global = true)]
    log_level: String,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Write a randomly permuted copy of INPUT to OUTPUT
    Shuffle(ShuffleArgs),

    /// Print the record count and framing details of a file
    Inspect {
        file: PathBuf,

        /// Record layout (framed, newline, length-prefixed, fixed:N)
        #[arg(long, default_value = "framed")]
        layout: String,
    },
}

#[derive(clap::Args, Debug)]
struct ShuffleArgs {
    input: PathBuf,

    output: PathBuf,

    /// Target records per bucket
    #[arg(short, long)]
    bucket_size: Option<u64>,

    /// Seed for a reproducible permutation
    #[arg(short, long)]
    seed: Option<u64>,

    /// Directory for temporary buckets (defaults to the output's directory)
    #[arg(short, long)]
    working_dir: Option<PathBuf>,

    /// Record layout of input and output (framed, newline, length-prefixed, fixed:N)
    #[arg(long)]
    layout: Option<String>,

    /// Block compression for framed files (none, lz4, zstd)
    #[arg(long)]
    compression: Option<String>,

    /// Uncompressed output block size in bytes
    #[arg(long)]
    block_size: Option<usize>,

    /// Configuration file path
    #[arg(short, long)]
    config: Option<PathBuf>,
}

fn main() -> ExitCode {
    let args = Args::parse();

    // Initialize logging
    let filter = tracing_subscriber::filter::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::filter::EnvFilter::new(&args.log_level));

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let result = match args.command {
        Command::Shuffle(shuffle_args) => run_shuffle(shuffle_args),
        Command::Inspect { file, layout } => run_inspect(&file, &layout),
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("error: {e}");
            ExitCode::FAILURE
        }
    }
}

fn load_config(args: &ShuffleArgs) -> shuffle_core::Result<ShuffleConfig> {
    let mut config = match &args.config {
        Some(path) => {
            tracing::info!("Loading configuration from {}", path.display());
            ShuffleConfig::from_file(path)?
        }
        None => ShuffleConfig::default(),
    }
    .with_env_overrides();

    if let Some(bucket_size) = args.bucket_size {
        config.shuffle.bucket_size = bucket_size;
    }
    if let Some(seed) = args.seed {
        config.shuffle.seed = Some(seed);
    }
    if let Some(dir) = &args.working_dir {
        config.shuffle.working_dir = Some(dir.clone());
    }
    if let Some(layout) = &args.layout {
        config.records.layout = layout.clone();
    }
    if let Some(compression) = &args.compression {
        config.records.compression = compression.clone();
    }
    if let Some(block_size) = args.block_size {
        config.records.block_size = block_size;
    }

    config.validate()?;
    Ok(config)
}

fn run_shuffle(args: ShuffleArgs) -> shuffle_core::Result<()> {
    let config = load_config(&args)?;
    let storage = Arc::new(LocalStorage::new(&config.storage)?);

    tracing::info!(
        input = %args.input.display(),
        output = %args.output.display(),
        bucket_size = config.shuffle.bucket_size,
        layout = %config.records.layout,
        "recshuffle starting"
    );

    let mut job = ShuffleJob::new(storage, config);
    let report = match job.run(&args.input, &args.output) {
        Ok(report) => report,
        Err(e) => {
            for error in job.cleanup_errors() {
                tracing::warn!("Cleanup after failure: {}", error);
            }
            return Err(e);
        }
    };

    println!(
        "Shuffled {} records into {} ({} buckets, largest {}, seed {}, {:.2}s)",
        report.output_records,
        args.output.display(),
        report.bucket_count,
        report.peak_bucket_records,
        report.seed,
        report.elapsed.as_secs_f64()
    );
    for error in &report.cleanup_errors {
        tracing::warn!("Cleanup: {}", error);
    }
    tracing::info!(
        records = report.output_records,
        peak_partition_buffer_bytes = report.peak_partition_buffer_bytes,
        "recshuffle finished"
    );
    Ok(())
}

fn run_inspect(file: &Path, layout: &str) -> shuffle_core::Result<()> {
    let layout: RecordLayout = layout.parse()?;
    let config = ShuffleConfig::default().with_env_overrides();
    let storage = LocalStorage::new(&config.storage)?;

    println!("File:     {}", file.display());
    println!("Layout:   {layout}");

    if layout == RecordLayout::Framed {
        let reader = RecordFileReader::open(&storage, file)?;
        let trailer = reader.trailer();
        println!("Records:  {}", trailer.record_count);
        println!("Blocks:   {}", trailer.block_count);
        println!("Payload:  {} bytes", trailer.payload_bytes);
        println!("Codec:    {}", reader.compression().as_str());
        println!("Checksum: {:016x}", trailer.checksum);
    } else {
        let source = open_source(&storage, file, layout)?;
        println!("Records:  {}", source.record_count());
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use shuffle_core::records::{Record, RecordFileWriter, WriterOptions};
    use std::io::Write;
    use std::sync::Mutex;
    use tempfile::TempDir;

    #[derive(Clone, Default)]
    struct CapturedLogs(Arc<Mutex<Vec<u8>>>);

    impl Write for CapturedLogs {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    fn shuffle_args(input: PathBuf, output: PathBuf) -> ShuffleArgs {
        ShuffleArgs {
            input,
            output,
            bucket_size: Some(10),
            seed: Some(5),
            working_dir: None,
            layout: None,
            compression: None,
            block_size: None,
            config: None,
        }
    }

    #[test]
    fn test_cli_overrides_win_over_defaults() {
        let mut args = shuffle_args(PathBuf::from("in.rec"), PathBuf::from("out.rec"));
        args.layout = Some("newline".to_string());
        args.block_size = Some(4096);

        let config = load_config(&args).unwrap();
        assert_eq!(config.shuffle.bucket_size, 10);
        assert_eq!(config.shuffle.seed, Some(5));
        assert_eq!(config.records.layout, "newline");
        assert_eq!(config.records.block_size, 4096);
    }

    #[test]
    fn test_shuffle_logs_start_and_finish() {
        let temp = TempDir::new().unwrap();
        let input = temp.path().join("in.rec");
        let output = temp.path().join("out.rec");

        let storage = LocalStorage::new(&ShuffleConfig::default().storage).unwrap();
        let mut writer = RecordFileWriter::create(&storage, &input, WriterOptions::default()).unwrap();
        for i in 0..25 {
            writer.write_record(&Record::from(format!("r{i}").as_str())).unwrap();
        }
        writer.finish().unwrap();

        let logs = CapturedLogs::default();
        let make_writer = {
            let logs = logs.clone();
            move || logs.clone()
        };
        let subscriber = tracing_subscriber::fmt()
            .with_writer(make_writer)
            .with_ansi(false)
            .finish();

        tracing::subscriber::with_default(subscriber, || {
            run_shuffle(shuffle_args(input.clone(), output.clone())).unwrap();
        });

        let text = String::from_utf8(logs.0.lock().unwrap().clone()).unwrap();
        assert!(text.contains("recshuffle starting"), "{text}");
        assert!(text.contains("recshuffle finished"), "{text}");
        assert!(output.exists());
    }
}
