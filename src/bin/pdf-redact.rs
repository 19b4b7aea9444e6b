//! PDF Redact CLI tool
//!
//! A command-line tool for removing content under regions of PDF pages.

use anyhow::{bail, Context};
use clap::{Parser, Subcommand};
use glob::glob;
use lopdf::Document;
use std::path::{Path, PathBuf};
use std::process;
use tracing_subscriber::EnvFilter;

use pdf_cleanup::pdf::{
    clean_up_annotations_file, clean_up_file, redact_annotations, CleanupLocation, CleanupOptions, CleanupReport,
    Color,
};

/// PDF Redact - Remove text, graphics and images under regions of PDF pages
#[derive(Parser)]
#[command(name = "pdf-redact")]
#[command(author, version, about, long_about = None)]
#[command(after_help = "EXAMPLES:
    # Remove everything inside a box on page 1 and paint it black
    pdf-redact regions input.pdf -o output.pdf --region 1:72,700,300,720:#000000

    # Apply the redaction annotations of several files
    pdf-redact annotations --suffix _redacted \"contracts/*.pdf\"

    # List the redaction annotations of a file
    pdf-redact info input.pdf

Set RUST_LOG=debug for per-page details.")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Clean explicit regions
    Regions {
        /// Input PDF file
        input: PathBuf,

        /// Output PDF file path
        #[arg(short, long)]
        output: PathBuf,

        /// Region to clean: PAGE:LLX,LLY,URX,URY[:#RRGGBB] (repeatable)
        #[arg(long = "region", required = true, value_parser = parse_location)]
        regions: Vec<CleanupLocation>,

        /// Colour painted over covered pixels of partially covered images
        #[arg(long, value_parser = parse_color)]
        image_fill: Option<Color>,
    },

    /// Apply the redaction annotations of one or more PDFs
    Annotations {
        /// Input PDF files. Supports glob patterns like "*.pdf"
        #[arg(required = true)]
        inputs: Vec<String>,

        /// Output PDF file path (single input only)
        #[arg(short, long, conflicts_with = "suffix")]
        output: Option<PathBuf>,

        /// Suffix appended to each input's file stem to name its output
        #[arg(long, default_value = "_redacted")]
        suffix: String,

        /// Keep the redaction annotations in the output
        #[arg(long)]
        keep_annotations: bool,

        /// Do not draw overlay text or replacement appearances
        #[arg(long)]
        no_overlay: bool,
    },

    /// List the redaction annotations of a PDF file
    Info {
        /// PDF file to inspect
        input: PathBuf,
    },
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .with_target(false)
        .with_writer(std::io::stderr)
        .compact()
        .init();

    let cli = Cli::parse();

    let result = match cli.command {
        Commands::Regions {
            input,
            output,
            regions,
            image_fill,
        } => cmd_regions(input, output, regions, image_fill),
        Commands::Annotations {
            inputs,
            output,
            suffix,
            keep_annotations,
            no_overlay,
        } => cmd_annotations(inputs, output, suffix, keep_annotations, no_overlay),
        Commands::Info { input } => cmd_info(input),
    };

    if let Err(e) = result {
        eprintln!("Error: {:#}", e);
        process::exit(1);
    }
}

fn parse_location(s: &str) -> Result<CleanupLocation, String> {
    s.parse().map_err(|e: pdf_cleanup::Error| e.to_string())
}

fn parse_color(s: &str) -> Result<Color, String> {
    Color::from_hex(s).map_err(|e| e.to_string())
}

/// Expand glob patterns in input paths
fn expand_globs(patterns: Vec<String>) -> anyhow::Result<Vec<PathBuf>> {
    let mut paths = Vec::new();

    for pattern in patterns {
        // Check if pattern contains glob characters
        if pattern.contains('*') || pattern.contains('?') || pattern.contains('[') {
            let mut matched = false;
            let entries = glob(&pattern).map_err(|e| pdf_cleanup::Error::InvalidGlob(e.to_string()))?;
            for entry in entries {
                match entry {
                    Ok(path) => {
                        paths.push(path);
                        matched = true;
                    }
                    Err(e) => eprintln!("Warning: glob error for {}: {}", pattern, e),
                }
            }
            if !matched {
                return Err(pdf_cleanup::Error::NoFilesMatched(pattern).into());
            }
        } else {
            // No glob characters, treat as literal path
            paths.push(PathBuf::from(pattern));
        }
    }

    // Sort paths for consistent ordering
    paths.sort();

    Ok(paths)
}

/// `report.pdf` + `_redacted` -> `report_redacted.pdf`, next to the input
fn suffixed_output(input: &Path, suffix: &str) -> PathBuf {
    let stem = input.file_stem().map(|s| s.to_string_lossy().into_owned()).unwrap_or_default();
    let extension = input.extension().map(|e| e.to_string_lossy().into_owned());
    let name = match extension {
        Some(extension) => format!("{}{}.{}", stem, suffix, extension),
        None => format!("{}{}", stem, suffix),
    };
    input.with_file_name(name)
}

fn print_report(report: &CleanupReport) {
    for page in &report.pages {
        eprintln!(
            "  Page {}: {} region(s){}{}",
            page.page,
            page.regions,
            if page.content_modified { ", content rewritten" } else { "" },
            if page.annotations_removed > 0 {
                format!(", {} annotation(s) removed", page.annotations_removed)
            } else {
                String::new()
            }
        );
    }
}

/// Clean explicit regions out of a PDF
fn cmd_regions(
    input: PathBuf,
    output: PathBuf,
    regions: Vec<CleanupLocation>,
    image_fill: Option<Color>,
) -> anyhow::Result<()> {
    let mut options = CleanupOptions::default();
    if let Some(color) = image_fill {
        options.cleaned_area_color = color;
    }

    eprintln!("Cleaning {} region(s) from {}...", regions.len(), input.display());
    let report = clean_up_file(&input, &output, &regions, &options)
        .with_context(|| format!("cleaning {}", input.display()))?;
    print_report(&report);
    eprintln!("Output: {}", output.display());

    Ok(())
}

/// Apply redaction annotations
fn cmd_annotations(
    inputs: Vec<String>,
    output: Option<PathBuf>,
    suffix: String,
    keep_annotations: bool,
    no_overlay: bool,
) -> anyhow::Result<()> {
    // Expand glob patterns
    let inputs = expand_globs(inputs)?;
    if output.is_some() && inputs.len() != 1 {
        bail!("--output needs exactly one input; use --suffix for {} files", inputs.len());
    }

    let options = CleanupOptions {
        remove_annotations: !keep_annotations,
        draw_overlays: !no_overlay,
        ..CleanupOptions::default()
    };

    for input in &inputs {
        let target = output.clone().unwrap_or_else(|| suffixed_output(input, &suffix));
        eprintln!("Applying redactions in {}...", input.display());
        let report = clean_up_annotations_file(input, &target, &options)
            .with_context(|| format!("cleaning {}", input.display()))?;
        if report.pages.is_empty() {
            eprintln!("  No redaction annotations found");
        }
        print_report(&report);
        eprintln!("Output: {}", target.display());
    }

    Ok(())
}

/// Show the redaction annotations of a PDF
fn cmd_info(input: PathBuf) -> anyhow::Result<()> {
    if !input.exists() {
        return Err(pdf_cleanup::Error::FileNotFound(input).into());
    }

    let doc = Document::load(&input).with_context(|| format!("loading {}", input.display()))?;
    let pages = doc.get_pages();

    println!("File: {}", input.display());
    println!("Pages: {}", pages.len());

    let mut total = 0;
    for (page, page_id) in pages {
        let annotations = redact_annotations(&doc, page_id)?;
        for annotation in &annotations {
            let regions: Vec<String> = annotation
                .regions
                .iter()
                .map(|r| format!("[{} {} {} {}]", r.llx, r.lly, r.urx, r.ury))
                .collect();
            println!(
                "Page {}: redaction {}{}",
                page,
                regions.join(" "),
                if annotation.overlay.is_some() { " (overlay)" } else { "" }
            );
        }
        total += annotations.len();
    }
    println!("Redaction annotations: {}", total);

    Ok(())
}
