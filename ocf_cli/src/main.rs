use std::fs::File;
use std::io::{self, BufRead, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::time::Instant;

use anyhow::Context;
use clap::{Parser, Subcommand};
use tracing::info;
use tracing_subscriber::EnvFilter;

use ocf_codecs::{codec_by_name, BundledCodecs};
use ocf_core::{
    block_index, plan_splits, ContainerReader, ContainerWriter, FileSplit, Header, JobConfig,
    LocalFs, Schema, Slot, SplitReader, Value, ValueReader, ValueWriter,
};

// ── CLI definition ─────────────────────────────────────────────────────────

#[derive(Parser)]
#[command(
    name = "ocf",
    about = "Write, inspect, and split-read object container files",
    version
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Write each input line as a `string` record
    Write {
        /// Source text file ("-" reads stdin)
        input: PathBuf,
        /// Destination container file
        output: PathBuf,
        /// Job configuration JSON; flags below override it
        #[arg(long)]
        config: Option<PathBuf>,
        /// Codec to use: null | deflate | zstandard | lz4
        #[arg(short, long)]
        codec: Option<String>,
        /// Codec level (deflate 0–9, zstandard 1–22)
        #[arg(long)]
        level: Option<i32>,
        /// Uncompressed bytes per block before it is flushed
        #[arg(long)]
        block_bytes: Option<usize>,
        /// Records per block before it is flushed
        #[arg(long)]
        block_records: Option<u64>,
    },
    /// Print every record in file order
    Cat {
        file: PathBuf,
    },
    /// Print header metadata and block statistics
    Inspect {
        file: PathBuf,
        /// Print per-block details
        #[arg(long)]
        blocks: bool,
    },
    /// Print the records owned by one byte-range split
    ReadSplit {
        file: PathBuf,
        /// First byte of the split
        #[arg(short, long)]
        start: u64,
        /// Split length in bytes
        #[arg(short, long)]
        length: u64,
    },
    /// Read the file as N parallel splits and check every record is seen once
    Splits {
        file: PathBuf,
        /// Number of splits
        #[arg(short, long, conflicts_with = "split_size")]
        count: Option<u64>,
        /// Bytes per split
        #[arg(long)]
        split_size: Option<u64>,
    },
}

// ── Helpers ────────────────────────────────────────────────────────────────

fn human_bytes(n: u64) -> String {
    const UNITS: &[&str] = &["B", "KB", "MB", "GB", "TB"];
    let mut v = n as f64;
    let mut unit = 0;
    while v >= 1024.0 && unit < UNITS.len() - 1 {
        v /= 1024.0;
        unit += 1;
    }
    if unit == 0 {
        format!("{} B", n)
    } else {
        format!("{:.2} {}", v, UNITS[unit])
    }
}

fn read_header(path: &Path) -> anyhow::Result<Header> {
    let file = File::open(path).with_context(|| format!("opening {:?}", path))?;
    let header = Header::read_from(&mut BufReader::new(file))
        .with_context(|| format!("reading header of {:?}", path))?;
    Ok(header)
}

/// Reader bound to the file's own schema.
fn value_reader_for(path: &Path) -> anyhow::Result<ValueReader> {
    let header = read_header(path)?;
    let schema = Schema::parse(&header.schema)
        .with_context(|| format!("unsupported schema in {:?}", path))?;
    Ok(ValueReader::new(schema))
}

fn open_reader(path: &Path) -> anyhow::Result<ContainerReader<File, ValueReader>> {
    let datum_reader = value_reader_for(path)?;
    let file = File::open(path).with_context(|| format!("opening {:?}", path))?;
    let reader = ContainerReader::open(file, datum_reader, &BundledCodecs)
        .with_context(|| format!("opening container {:?}", path))?;
    Ok(reader)
}

struct SplitOutcome {
    split: FileSplit,
    start: u64,
    records: u64,
    progress: f32,
}

fn count_split(split: FileSplit, datum_reader: ValueReader) -> anyhow::Result<SplitOutcome> {
    let mut reader: SplitReader<File, ValueReader> = SplitReader::new(datum_reader, Slot::Key);
    let result = (|| {
        reader.initialize(&split, &LocalFs, &BundledCodecs)?;
        let mut records = 0u64;
        while reader.advance()? {
            records += 1;
        }
        Ok::<_, ocf_core::Error>(records)
    })();
    let progress = reader.progress();
    let start = reader.start_position();
    reader.close();
    let records = result.with_context(|| {
        format!("reading split [{}, {})", split.start, split.end())
    })?;
    Ok(SplitOutcome {
        split,
        start,
        records,
        progress,
    })
}

// ── Subcommand implementations ─────────────────────────────────────────────

struct WriteArgs {
    config: Option<PathBuf>,
    codec: Option<String>,
    level: Option<i32>,
    block_bytes: Option<usize>,
    block_records: Option<u64>,
}

fn job_config(args: WriteArgs) -> anyhow::Result<JobConfig> {
    let mut cfg = match &args.config {
        Some(path) => {
            let json = std::fs::read_to_string(path)
                .with_context(|| format!("reading config {:?}", path))?;
            JobConfig::from_json(&json)?
        }
        None => JobConfig::default(),
    };
    if args.codec.is_some() {
        cfg.output_codec = args.codec;
    }
    if args.level.is_some() {
        cfg.output_codec_level = args.level;
    }
    if args.block_bytes.is_some() {
        cfg.max_block_bytes = args.block_bytes;
    }
    if args.block_records.is_some() {
        cfg.max_block_records = args.block_records;
    }
    if cfg.output_key_schema.is_none() {
        cfg.set_output_schema(Slot::Key, Schema::String);
    }
    Ok(cfg)
}

fn run_write(input: PathBuf, output: PathBuf, args: WriteArgs) -> anyhow::Result<()> {
    let cfg = job_config(args)?;
    let schema = cfg.output_schema(Slot::Key)?;
    if schema != Schema::String {
        anyhow::bail!("write only produces string records, config asks for {}", schema);
    }
    let codec = codec_by_name(cfg.output_codec(), cfg.output_codec_level)?;
    let codec_display = codec.name();

    let sink = File::create(&output).with_context(|| format!("creating output file {:?}", output))?;
    let mut writer = ContainerWriter::create(
        BufWriter::new(sink),
        ValueWriter::new(schema),
        codec,
        cfg.writer_options()?,
    )?;

    let src: Box<dyn BufRead> = if input.to_str() == Some("-") {
        Box::new(io::stdin().lock())
    } else {
        let file = File::open(&input).with_context(|| format!("opening input file {:?}", input))?;
        Box::new(BufReader::new(file))
    };

    let t0 = Instant::now();
    let mut records = 0u64;
    let mut raw_bytes = 0u64;
    for line in src.lines() {
        let line = line.context("reading input line")?;
        raw_bytes += line.len() as u64;
        writer.append(&Value::String(line))?;
        records += 1;
    }
    writer.close()?;
    let elapsed = t0.elapsed();
    let file_size = writer.position();

    eprintln!("  codec       : {}", codec_display);
    eprintln!("  records     : {}", records);
    eprintln!("  blocks      : {}", writer.blocks_written());
    eprintln!("  raw text    : {}", human_bytes(raw_bytes));
    eprintln!("  file size   : {}", human_bytes(file_size));
    eprintln!("  elapsed     : {:.3}s", elapsed.as_secs_f64());
    Ok(())
}

fn run_cat(file: PathBuf) -> anyhow::Result<()> {
    let reader = open_reader(&file)?;
    let stdout = io::stdout();
    let mut out = BufWriter::new(stdout.lock());
    for record in reader {
        writeln!(out, "{}", record?)?;
    }
    out.flush()?;
    Ok(())
}

fn run_inspect(file: PathBuf, show_blocks: bool) -> anyhow::Result<()> {
    let input = File::open(&file).with_context(|| format!("opening {:?}", file))?;
    let file_size = input.metadata()?.len();
    let (header, blocks) = block_index(input).with_context(|| format!("indexing {:?}", file))?;

    let records: u64 = blocks.iter().map(|b| b.record_count).sum();
    let payload: u64 = blocks.iter().map(|b| b.payload_len).sum();
    let header_len = blocks.first().map(|b| b.offset).unwrap_or(file_size);

    println!("=== Container: {:?} ===", file);
    println!();
    println!("  schema         : {}", header.schema);
    println!("  codec          : {}", header.codec);
    println!("  sync marker    : {}", header.sync);
    println!("  header         : {}", human_bytes(header_len));
    println!("  block count    : {}", blocks.len());
    println!("  record count   : {}", records);
    println!("  payload        : {}", human_bytes(payload));
    println!("  file on disk   : {}", human_bytes(file_size));
    for (key, value) in &header.metadata {
        println!("  meta {:<10}: {}", key, String::from_utf8_lossy(value));
    }

    if show_blocks {
        println!();
        println!(
            "  {:>8}  {:>14}  {:>10}  {:>12}  {:>14}",
            "block", "file offset", "records", "payload", "sync offset"
        );
        println!("  {}", "-".repeat(66));
        for (i, b) in blocks.iter().enumerate() {
            println!(
                "  {:>8}  {:>14}  {:>10}  {:>12}  {:>14}",
                i,
                b.offset,
                b.record_count,
                human_bytes(b.payload_len),
                b.sync_offset
            );
        }
    }
    Ok(())
}

fn run_read_split(file: PathBuf, start: u64, length: u64) -> anyhow::Result<()> {
    let split = FileSplit::new(&file, start, length);
    let mut reader: SplitReader<File, ValueReader> =
        SplitReader::new(value_reader_for(&file)?, Slot::Key);
    let result = (|| {
        reader.initialize(&split, &LocalFs, &BundledCodecs)?;
        let stdout = io::stdout();
        let mut out = BufWriter::new(stdout.lock());
        let mut records = 0u64;
        while reader.advance()? {
            if let Some(key) = reader.current_key() {
                writeln!(out, "{}", key)?;
            }
            records += 1;
        }
        out.flush()?;
        Ok::<_, anyhow::Error>(records)
    })();
    let effective_start = reader.start_position();
    reader.close();
    let records = result?;

    eprintln!("  split       : [{}, {})", split.start, split.end());
    eprintln!("  first block : {}", effective_start);
    eprintln!("  records     : {}", records);
    Ok(())
}

fn run_splits(file: PathBuf, count: Option<u64>, split_size: Option<u64>) -> anyhow::Result<()> {
    let file_len = std::fs::metadata(&file)
        .with_context(|| format!("reading metadata of {:?}", file))?
        .len();
    let split_size = match (count, split_size) {
        (_, Some(size)) => size,
        (Some(n), None) => file_len.div_ceil(n.max(1)),
        (None, None) => file_len.div_ceil(4),
    };
    let splits = plan_splits(&file, file_len, split_size);
    let datum_reader = value_reader_for(&file)?;
    info!(splits = splits.len(), split_size, "reading splits in parallel");

    let t0 = Instant::now();
    let outcomes: Vec<anyhow::Result<SplitOutcome>> = std::thread::scope(|scope| {
        let handles: Vec<_> = splits
            .into_iter()
            .map(|split| {
                let datum_reader = datum_reader.clone();
                scope.spawn(move || count_split(split, datum_reader))
            })
            .collect();
        handles
            .into_iter()
            .map(|h| {
                h.join()
                    .unwrap_or_else(|_| Err(anyhow::anyhow!("split worker panicked")))
            })
            .collect()
    });
    let elapsed = t0.elapsed();

    println!(
        "  {:>6}  {:>12}  {:>12}  {:>12}  {:>10}  {:>8}",
        "split", "start", "end", "first block", "records", "progress"
    );
    println!("  {}", "-".repeat(70));
    let mut total = 0u64;
    for (i, outcome) in outcomes.into_iter().enumerate() {
        let o = outcome?;
        total += o.records;
        println!(
            "  {:>6}  {:>12}  {:>12}  {:>12}  {:>10}  {:>7.1}%",
            i,
            o.split.start,
            o.split.end(),
            o.start,
            o.records,
            o.progress * 100.0
        );
    }

    let mut sequential = 0u64;
    for record in open_reader(&file)? {
        record?;
        sequential += 1;
    }

    eprintln!("  split total : {}", total);
    eprintln!("  sequential  : {}", sequential);
    eprintln!("  elapsed     : {:.3}s", elapsed.as_secs_f64());
    if total != sequential {
        anyhow::bail!(
            "splits read {} records but the file holds {}",
            total,
            sequential
        );
    }
    Ok(())
}

// ── Entry point ────────────────────────────────────────────────────────────

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(io::stderr)
        .init();

    let cli = Cli::parse();
    match cli.command {
        Commands::Write {
            input,
            output,
            config,
            codec,
            level,
            block_bytes,
            block_records,
        } => run_write(
            input,
            output,
            WriteArgs {
                config,
                codec,
                level,
                block_bytes,
                block_records,
            },
        ),
        Commands::Cat { file } => run_cat(file),
        Commands::Inspect { file, blocks } => run_inspect(file, blocks),
        Commands::ReadSplit {
            file,
            start,
            length,
        } => run_read_split(file, start, length),
        Commands::Splits {
            file,
            count,
            split_size,
        } => run_splits(file, count, split_size),
    }
}
