use anyhow::Result;
use clap::{Parser, Subcommand};
use colored::Colorize;
use nepatch::config::{check_patch_set, load_from_path, PatchSet};
use nepatch::{apply_patch_set, DirAssembler, Image, ImageAssembler, MtoolsAssembler};
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

#[derive(Parser)]
#[command(name = "nepatch")]
#[command(about = "Verified in-place resource patcher for fixed-layout NE executables", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Apply patch sets to a source image, producing one output per set
    Apply {
        /// Path to the source executable image
        #[arg(short, long)]
        image: PathBuf,

        /// Patch set file, or a directory of .toml patch sets
        #[arg(short, long)]
        patches: PathBuf,

        /// Directory to stage output variants into
        #[arg(short, long, default_value = ".")]
        out_dir: PathBuf,

        /// FAT floppy image to copy outputs into via mtools
        #[arg(long)]
        floppy: Option<PathBuf>,

        /// Report what would be applied without writing any output
        #[arg(short = 'n', long)]
        dry_run: bool,

        /// Persist outputs where at least one patch applied, instead of
        /// requiring a clean run
        #[arg(long)]
        allow_partial: bool,
    },

    /// Check which patches currently match the image, without writing
    Verify {
        /// Path to the source executable image
        #[arg(short, long)]
        image: PathBuf,

        /// Patch set file, or a directory of .toml patch sets
        #[arg(short, long)]
        patches: PathBuf,
    },

    /// List patch sets and their patch counts
    List {
        /// Patch set file, or a directory of .toml patch sets
        #[arg(short, long)]
        patches: PathBuf,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Apply {
            image,
            patches,
            out_dir,
            floppy,
            dry_run,
            allow_partial,
        } => cmd_apply(image, patches, out_dir, floppy, dry_run, allow_partial),

        Commands::Verify { image, patches } => cmd_verify(image, patches),

        Commands::List { patches } => cmd_list(patches),
    }
}

/// Collect .toml patch set files: the path itself, or every .toml directly
/// inside it, sorted for a stable application order.
fn discover_patch_sets(path: &Path) -> Result<Vec<PathBuf>> {
    if path.is_file() {
        return Ok(vec![path.to_path_buf()]);
    }

    let mut files = Vec::new();
    for entry in WalkDir::new(path).max_depth(1) {
        let entry = entry?;
        if entry.file_type().is_file()
            && entry.path().extension().and_then(|s| s.to_str()) == Some("toml")
        {
            files.push(entry.path().to_path_buf());
        }
    }
    files.sort();

    if files.is_empty() {
        anyhow::bail!("no .toml patch sets found in {}", path.display());
    }
    Ok(files)
}

fn set_title(set: &PatchSet, path: &Path) -> String {
    if set.meta.name.is_empty() {
        path.display().to_string()
    } else {
        set.meta.name.clone()
    }
}

fn cmd_apply(
    image_path: PathBuf,
    patches: PathBuf,
    out_dir: PathBuf,
    floppy: Option<PathBuf>,
    dry_run: bool,
    allow_partial: bool,
) -> Result<()> {
    let source = Image::load(&image_path)?;
    let patch_files = discover_patch_sets(&patches)?;

    println!("Source: {} ({} bytes)", image_path.display(), source.len());
    println!();

    let mut assemblers: Vec<Box<dyn ImageAssembler>> = Vec::new();
    if !dry_run {
        assemblers.push(Box::new(DirAssembler::new(&out_dir)));
        if let Some(floppy) = &floppy {
            assemblers.push(Box::new(MtoolsAssembler::new(floppy)));
        }
    }

    let mut total_applied = 0;
    let mut total_failed = 0;
    let mut outputs_written = 0;

    for patch_file in patch_files {
        let set = load_from_path(&patch_file)?;
        let title = set_title(&set, &patch_file);
        println!("{}", format!("Patch set: {title}").bold());

        let run = apply_patch_set(&set, &source)?;

        for (patch_id, result) in &run.results {
            match result {
                Ok(outcome) if outcome.is_applied() => {
                    if dry_run {
                        println!("{} {}: would apply", "✓".green(), patch_id);
                    } else {
                        println!("{} {}: applied", "✓".green(), patch_id);
                    }
                    total_applied += 1;
                }
                Ok(outcome) => {
                    eprintln!("{} {}: {}", "✗".red(), patch_id, outcome);
                    total_failed += 1;
                }
                Err(e) => {
                    eprintln!("{} {}: {}", "✗".red(), patch_id, e);
                    total_failed += 1;
                }
            }
        }

        let accepted = if allow_partial {
            run.any_applied()
        } else {
            run.all_applied()
        };

        if !accepted {
            println!(
                "  {}",
                "output rejected: not every patch applied cleanly".yellow()
            );
        } else if dry_run {
            println!("  {}", "[dry run - no output written]".cyan());
        } else {
            let output_name = set
                .meta
                .output
                .clone()
                .unwrap_or_else(|| format!("{title}.out"));
            for assembler in &mut assemblers {
                assembler.add_file(&output_name, run.image.as_bytes())?;
            }
            println!("  wrote {}", out_dir.join(&output_name).display());
            outputs_written += 1;
        }
        println!();
    }

    println!("{}", "Summary:".bold());
    println!("  {} applied", format!("{total_applied}").green());
    println!("  {} failed", format!("{total_failed}").red());
    if !dry_run {
        println!("  {outputs_written} output(s) written");
    }

    if total_failed > 0 && !allow_partial {
        std::process::exit(1);
    }

    Ok(())
}

fn cmd_verify(image_path: PathBuf, patches: PathBuf) -> Result<()> {
    let source = Image::load(&image_path)?;
    let patch_files = discover_patch_sets(&patches)?;

    println!("{}", "Verifying patch sets...".bold());
    println!("Source: {} ({} bytes)", image_path.display(), source.len());
    println!();

    let mut matching = 0;
    let mut mismatched = 0;

    for patch_file in patch_files {
        let set = load_from_path(&patch_file)?;
        println!("{}", format!("Patch set: {}", set_title(&set, &patch_file)).bold());

        let results = check_patch_set(&set, &source)?;
        for (patch_id, result) in results {
            match result {
                Ok(outcome) if outcome.is_applied() => {
                    println!("{} {}: pre-image matches", "✓".green(), patch_id);
                    matching += 1;
                }
                Ok(outcome) => {
                    eprintln!("{} {}: {}", "✗".red(), patch_id, outcome);
                    mismatched += 1;
                }
                Err(e) => {
                    eprintln!("{} {}: {}", "✗".red(), patch_id, e);
                    mismatched += 1;
                }
            }
        }
        println!();
    }

    println!("{}", "Summary:".bold());
    println!("  {} matching", format!("{matching}").green());
    println!("  {} mismatched", format!("{mismatched}").red());

    if mismatched > 0 {
        std::process::exit(1);
    }

    Ok(())
}

fn cmd_list(patches: PathBuf) -> Result<()> {
    let patch_files = discover_patch_sets(&patches)?;

    for patch_file in patch_files {
        let set = load_from_path(&patch_file)?;
        let title = set_title(&set, &patch_file);
        println!("{} ({} patches)", title.bold(), set.patches.len());
        if let Some(description) = &set.meta.description {
            println!("  {}", description.dimmed());
        }
        if let Some(output) = &set.meta.output {
            println!("  output: {output}");
        }
    }

    Ok(())
}
