use anyhow::{Context, Result};
use cape_eeprom::{CapeDecoder, DecodeOutcome, DecoderConfig, MemorySink};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::time::{Duration, Instant};
use tracing_subscriber::{filter::LevelFilter, EnvFilter};

/// Number of payload bytes shown by `sections`
const PREVIEW_LEN: usize = 16;

/// Cape EEPROM decoder and payload extractor
#[derive(Parser)]
#[command(name = "cape-eeprom")]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Decode an EEPROM image and extract its files next to it
    Decode {
        /// Input EEPROM image
        #[arg(value_name = "FILE")]
        input: PathBuf,

        /// Extract under DIR/<image stem> instead of beside the image
        #[arg(short, long, value_name = "DIR")]
        output_root: Option<PathBuf>,

        /// Do not run 7z/tar on archive sections
        #[arg(long)]
        no_extract: bool,

        /// Seconds to wait for each archive tool
        #[arg(long, default_value_t = 60)]
        timeout: u64,

        /// Largest buffered section in bytes
        #[arg(long, default_value_t = cape_eeprom::config::DEFAULT_MAX_SECTION_LEN)]
        max_section: usize,

        /// Reject flag-98 sections whose length is not 2
        #[arg(long)]
        strict: bool,

        /// 7z executable
        #[arg(long, value_name = "PROGRAM")]
        seven_zip: Option<PathBuf>,

        /// tar executable
        #[arg(long, value_name = "PROGRAM")]
        tar: Option<PathBuf>,
    },

    /// Show the identity header of an EEPROM image
    Info {
        /// Input EEPROM image
        #[arg(value_name = "FILE")]
        input: PathBuf,
    },

    /// List the sections of an EEPROM image without writing anything
    Sections {
        /// Input EEPROM image
        #[arg(value_name = "FILE")]
        input: PathBuf,
    },
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::builder()
                .with_default_directive(LevelFilter::INFO.into())
                .from_env_lossy(),
        )
        .compact()
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Decode {
            input,
            output_root,
            no_extract,
            timeout,
            max_section,
            strict,
            seven_zip,
            tar,
        } => {
            let mut config = DecoderConfig::default()
                .with_extract_archives(!no_extract)
                .with_extract_timeout(Duration::from_secs(timeout))
                .with_max_section_len(max_section)
                .with_strict_short_skip(strict);
            if let Some(root) = output_root {
                config = config.with_output_root(root);
            }
            if let Some(program) = seven_zip {
                config = config.with_seven_zip_program(program);
            }
            if let Some(program) = tar {
                config = config.with_tar_program(program);
            }
            decode_command(input, config)?
        }

        Commands::Info { input } => info_command(input)?,

        Commands::Sections { input } => sections_command(input)?,
    }

    Ok(())
}

fn decode_command(input: PathBuf, config: DecoderConfig) -> Result<()> {
    let decoder = CapeDecoder::new(config);
    let out_dir = decoder.config().output_dir_for(&input);

    let start = Instant::now();
    let report = decoder.decode_report(&input);
    let duration = start.elapsed();

    println!("Cape Information:");
    println!("  Name:           {}", report.info.name);
    println!("  Version:        {}", report.info.version);
    println!("  Serial:         {}", report.info.serial_number);
    match report.info.folder() {
        Some(folder) => println!("  Folder:         {}", folder.display()),
        None => println!("  Folder:         (none)"),
    }
    println!("  Output:         {}", out_dir.display());
    println!("  Sections:       {}", report.sections.len());
    println!("  Result:         {} ({:.3}s)", report.outcome, duration.as_secs_f64());

    if !report.diagnostics.is_empty() {
        println!("\nDiagnostics:");
        for diagnostic in &report.diagnostics {
            println!("  {}", diagnostic);
        }
    }

    match report.outcome {
        DecodeOutcome::Complete(_) => Ok(()),
        DecodeOutcome::NotACape => {
            anyhow::bail!("{} is not a cape EEPROM image", input.display())
        }
        DecodeOutcome::Partial(err) => {
            Err(err).with_context(|| format!("Failed to decode {}", input.display()))
        }
    }
}

fn info_command(input: PathBuf) -> Result<()> {
    let data =
        std::fs::read(&input).with_context(|| format!("Failed to read {}", input.display()))?;
    let info = cape_eeprom::read_header(&data)
        .with_context(|| format!("{} is not a cape EEPROM image", input.display()))?;

    println!("File Information:");
    println!("  Path:           {}", input.display());
    println!("  Size:           {} bytes", data.len());
    println!("\nCape Information:");
    println!("  Name:           {}", info.name);
    println!("  Version:        {}", info.version);
    println!("  Serial:         {}", info.serial_number);

    Ok(())
}

fn sections_command(input: PathBuf) -> Result<()> {
    let data =
        std::fs::read(&input).with_context(|| format!("Failed to read {}", input.display()))?;
    let decoder = CapeDecoder::default();
    let out_dir = decoder.config().output_dir_for(&input);

    let mut sink = MemorySink::new();
    let report = decoder.decode_with(&data, &out_dir, &mut sink);
    if let DecodeOutcome::NotACape = report.outcome {
        anyhow::bail!("{} is not a cape EEPROM image", input.display());
    }

    println!("{} ({})\n", report.info, input.display());
    println!(
        "  {:>8}  {:>4}  {:20}  {:>8}  Path",
        "Offset", "Flag", "Kind", "Length"
    );
    println!("  {}", "-".repeat(80));

    for section in &report.sections {
        println!(
            "  {:>#8x}  {:>4}  {:20}  {:>8}  {}",
            section.offset,
            section.kind.flag(),
            section.kind.name(),
            section.length,
            section.path.as_deref().unwrap_or("-")
        );
    }

    if !sink.files.is_empty() {
        println!("\nPayloads:");
        for file in &sink.files {
            let preview = &file.data[..file.data.len().min(PREVIEW_LEN)];
            println!(
                "  {} ({} bytes) {}{}",
                file.path.strip_prefix(&out_dir).unwrap_or(&file.path).display(),
                file.data.len(),
                hex::encode(preview),
                if file.data.len() > PREVIEW_LEN { "..." } else { "" }
            );
        }
    }

    println!("\nResult: {}", report.outcome);
    for diagnostic in &report.diagnostics {
        println!("  {}", diagnostic);
    }

    Ok(())
}
