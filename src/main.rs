use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use manga_page_pipeline::core::CancellationToken;
use manga_page_pipeline::{
    PageDecode, PageDecoder, PageId, ReaderConfig, SamplerPreset, SamplerRegistry, Size,
};

/// Inspect sampler backends and run single pages through the page decoder.
#[derive(Parser, Debug)]
#[command(name = "pagepipe")]
#[command(about = "Decode and resample manga pages with the reader's sampler backends")]
struct Args {
    /// JSON configuration snapshot (defaults are used for missing keys)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Log filter when RUST_LOG is unset
    #[arg(long, global = true, default_value = "manga_page_pipeline=info")]
    log: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// List sampler backends with availability and filters
    Backends,
    /// Decode one page image to fit a bounding box
    Decode {
        /// Page image (PNG, JPEG, WebP, ...)
        file: PathBuf,
        #[arg(long, help = "Bounding box width in pixels")]
        width: u32,
        #[arg(long, help = "Bounding box height in pixels")]
        height: u32,
        /// Sampler preset; overrides the configuration
        #[arg(short, long, value_enum)]
        preset: Option<SamplerPreset>,
        /// Write the decoded page as PNG
        #[arg(short, long)]
        out: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    manga_page_pipeline::logging::init(&args.log).context("Failed to install log subscriber")?;

    let config = match &args.config {
        Some(path) => {
            let json = std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read {}", path.display()))?;
            ReaderConfig::from_json_str(&json)?
        }
        None => ReaderConfig::default(),
    };
    let registry = Arc::new(SamplerRegistry::probe(&config.decode.disabled_backends));

    match args.command {
        Command::Backends => print_backends(&registry),
        Command::Decode {
            file,
            width,
            height,
            preset,
            out,
        } => {
            let preset = preset.unwrap_or(config.decode.preset);
            decode_file(registry, &file, Size::new(width, height), preset, out.as_deref()).await?;
        }
    }
    Ok(())
}

fn print_backends(registry: &SamplerRegistry) {
    let default = registry.default_backend();
    println!("Sampler backends (best first):");
    for status in registry.statuses() {
        let filters: Vec<String> = status
            .backend
            .supported_filters()
            .iter()
            .map(ToString::to_string)
            .collect();
        let marker = if status.backend == default { "*" } else { " " };
        match &status.reason {
            None => println!(" {marker} {:<15} available    [{}]", status.backend, filters.join(", ")),
            Some(reason) => println!(" {marker} {:<15} unavailable  ({reason})", status.backend),
        }
    }
}

async fn decode_file(
    registry: Arc<SamplerRegistry>,
    file: &std::path::Path,
    target: Size,
    preset: SamplerPreset,
    out: Option<&std::path::Path>,
) -> Result<()> {
    let bytes = tokio::fs::read(file)
        .await
        .with_context(|| format!("Failed to read {}", file.display()))?;
    let backend = registry.resolve(preset.backend());
    let decoder = PageDecoder::new(registry);
    let page_id = PageId::new(file.display().to_string(), 0);

    let started = Instant::now();
    let page = tokio::task::spawn_blocking(move || {
        decoder.decode(&page_id, &bytes, target, backend, preset.filter(), &CancellationToken::new())
    })
    .await??;

    println!(
        "{}: {}x{} -> {}x{} via {} ({}) in {:.1} ms",
        file.display(),
        page.natural_size().w,
        page.natural_size().h,
        page.width(),
        page.height(),
        backend,
        page.filter(),
        started.elapsed().as_secs_f64() * 1000.0
    );

    if let Some(out) = out {
        page.image()
            .save_with_format(out, image::ImageFormat::Png)
            .with_context(|| format!("Failed to write {}", out.display()))?;
        println!("Wrote {}", out.display());
    }
    Ok(())
}
