//! avchash CLI
//!
//! Fingerprint still images through an H.264 encoder and compare the
//! results. Raw Annex B files are hashed directly; with the `encoder`
//! feature, image files are encoded with OpenH264 first.

use std::path::{Path, PathBuf};

use anyhow::{bail, Context};
use clap::{Parser, Subcommand, ValueEnum};
use rayon::prelude::*;
use tracing::info;

use avchash::{init, Config, Fingerprint};

/// File extension for stored fingerprints
const FINGERPRINT_EXT: &str = "afp";

#[derive(Parser)]
#[command(name = "avchash")]
#[command(about = "Perceptual image fingerprints from H.264 encoder decisions", long_about = None)]
#[command(version)]
struct Cli {
    /// Enable verbose output
    #[arg(short, long)]
    verbose: bool,

    /// Enable debug output
    #[arg(short, long)]
    debug: bool,

    /// Number of threads to use
    #[arg(short = 't', long)]
    threads: Option<usize>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Fingerprint one or more inputs, writing .afp files
    Hash {
        /// Input files (.h264/.264/.avc, or images with the encoder feature)
        inputs: Vec<PathBuf>,

        /// Output directory (defaults to next to each input)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Compare two inputs and print distances
    Compare {
        /// First input (.afp, raw bitstream, or image)
        a: PathBuf,

        /// Second input
        b: PathBuf,

        /// Metric to print (all when omitted)
        #[arg(short, long)]
        metric: Option<Metric>,
    },

    /// Print the summary fields of a stored fingerprint
    Info {
        /// Fingerprint file
        input: PathBuf,
    },
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum Metric {
    Fast,
    Pyramid,
    Full,
    Cosine,
    Hamming,
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    init(Config {
        max_threads: cli.threads,
        verbose: cli.verbose,
        debug: cli.debug,
    })?;

    match cli.command {
        Commands::Hash { inputs, output } => cmd_hash(&inputs, output.as_deref()),
        Commands::Compare { a, b, metric } => cmd_compare(&a, &b, metric),
        Commands::Info { input } => cmd_info(&input),
    }
}

fn cmd_hash(inputs: &[PathBuf], output: Option<&Path>) -> anyhow::Result<()> {
    if inputs.is_empty() {
        bail!("no inputs given");
    }

    if let Some(dir) = output {
        std::fs::create_dir_all(dir)
            .with_context(|| format!("creating output directory {}", dir.display()))?;
    }

    let results: Vec<anyhow::Result<PathBuf>> = inputs
        .par_iter()
        .map(|input| {
            let fp = load_fingerprint(input)?;
            let target = output_path(input, output);
            fp.write_to(&target)
                .with_context(|| format!("writing {}", target.display()))?;
            Ok(target)
        })
        .collect();

    let mut failed = 0;
    for (input, result) in inputs.iter().zip(results) {
        match result {
            Ok(target) => info!(input = %input.display(), output = %target.display(), "hashed"),
            Err(e) => {
                failed += 1;
                eprintln!("{}: {:#}", input.display(), e);
            }
        }
    }

    if failed > 0 {
        bail!("{failed} of {} inputs failed", inputs.len());
    }
    Ok(())
}

fn cmd_compare(a: &Path, b: &Path, metric: Option<Metric>) -> anyhow::Result<()> {
    let fa = load_fingerprint(a)?;
    let fb = load_fingerprint(b)?;

    match metric {
        Some(Metric::Fast) => println!("{}", avchash::distance_fast(&fa, &fb)),
        Some(Metric::Pyramid) => println!("{}", avchash::distance_pyramid(&fa, &fb)),
        Some(Metric::Full) => println!("{}", avchash::distance_full(&fa, &fb)),
        Some(Metric::Cosine) => println!("{}", avchash::cosine_similarity(&fa, &fb)),
        Some(Metric::Hamming) => println!("{}", avchash::hamming_distance(&fa, &fb)),
        None => {
            println!("fast:       {}", avchash::distance_fast(&fa, &fb));
            println!("pyramid:    {}", avchash::distance_pyramid(&fa, &fb));
            println!("full:       {}", avchash::distance_full(&fa, &fb));
            println!("cosine:     {}", avchash::cosine_similarity(&fa, &fb));
            println!("hamming:    {}", avchash::hamming_distance(&fa, &fb));
            println!("similarity: {}", avchash::similarity(&fa, &fb));
        }
    }
    Ok(())
}

fn cmd_info(input: &Path) -> anyhow::Result<()> {
    let fp = Fingerprint::read_from(input)
        .with_context(|| format!("reading fingerprint {}", input.display()))?;

    println!("dimensions:   {}x{} px", fp.width, fp.height);
    println!("grid:         {}x{} macroblocks", fp.width_mbs, fp.height_mbs);
    println!("qp_avg:       {}", fp.qp_avg);
    println!("skip_ratio:   {:.4}", fp.skip_ratio);
    println!("intra_ratio:  {:.4}", fp.intra_ratio);
    println!("dc_mean:      {}", fp.dc_mean);
    println!("dc_std:       {:.2}", fp.dc_std);
    println!("edge_density: {:.4}", fp.edge_density);
    println!("size:         {} bytes", fp.serialized_len());
    Ok(())
}

/// Load a fingerprint from any supported input kind
fn load_fingerprint(path: &Path) -> anyhow::Result<Fingerprint> {
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase())
        .unwrap_or_default();

    match ext.as_str() {
        FINGERPRINT_EXT => Ok(Fingerprint::read_from(path)
            .with_context(|| format!("reading fingerprint {}", path.display()))?),
        "h264" | "264" | "avc" => {
            let data =
                std::fs::read(path).with_context(|| format!("reading {}", path.display()))?;
            Ok(avchash::extract(&data)
                .with_context(|| format!("extracting from {}", path.display()))?)
        }
        _ => hash_image(path),
    }
}

/// Hash an image file by encoding it first (requires the encoder feature)
#[cfg(feature = "encoder")]
fn hash_image(path: &Path) -> anyhow::Result<Fingerprint> {
    use avchash::encoder::RasterImage;
    use avchash::Hasher;

    let decoded = image::open(path)
        .with_context(|| format!("decoding image {}", path.display()))?
        .to_rgb8();
    let raster = RasterImage::from_rgb(
        decoded.as_raw(),
        decoded.width(),
        decoded.height(),
    )?;

    let shared = Hasher::shared()?;
    let fp = shared.lock().hash_raster(&raster)?;
    Ok(fp)
}

#[cfg(not(feature = "encoder"))]
fn hash_image(path: &Path) -> anyhow::Result<Fingerprint> {
    bail!(
        "{}: image inputs need the `encoder` feature; raw .h264/.264/.avc \
         bitstreams and .afp fingerprints work without it",
        path.display()
    )
}

/// Where the .afp for `input` goes
fn output_path(input: &Path, output_dir: Option<&Path>) -> PathBuf {
    let mut name = input
        .file_stem()
        .map(|s| s.to_os_string())
        .unwrap_or_else(|| "fingerprint".into());
    name.push(".");
    name.push(FINGERPRINT_EXT);

    match output_dir {
        Some(dir) => dir.join(name),
        None => input.with_file_name(name),
    }
}
