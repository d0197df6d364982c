//! Store subcommands

use anyhow::{Context as _, Result, bail};
use crossterm::style::Stylize;
use depot_core::extract::ArchiveFileInfo;
use depot_core::manifest::{self, Manifest};
use depot_schema::{Archive, ManifestDigest, ManifestFormat};
use std::path::Path;
use tokio_util::sync::CancellationToken;

use super::Context;
use crate::StoreCommands;

pub fn run(ctx: &Context, command: &StoreCommands) -> Result<()> {
    match command {
        StoreCommands::List => list(ctx),
        StoreCommands::Add { digest, dir } => add(ctx, digest, dir),
        StoreCommands::AddArchive {
            digest,
            archive,
            mime_type,
            extract,
        } => add_archive(ctx, digest, archive, mime_type.clone(), extract.clone()),
        StoreCommands::Remove { digests } => remove(ctx, digests),
        StoreCommands::Verify { digests } => verify(ctx, digests),
        StoreCommands::Audit => audit(ctx),
        StoreCommands::Path { digest } => path(ctx, digest),
        StoreCommands::Manifest { dir, algorithm } => print_manifest(dir, *algorithm),
        StoreCommands::Digest { dir, algorithms } => digest(dir, algorithms),
        StoreCommands::Purge => purge(ctx),
    }
}

fn parse_digest(text: &str) -> Result<ManifestDigest> {
    ManifestDigest::parse(text).with_context(|| format!("Invalid digest '{text}'"))
}

fn list(ctx: &Context) -> Result<()> {
    let store = ctx.store()?;
    let mut entries: Vec<String> = store
        .list_all()?
        .iter()
        .filter_map(ManifestDigest::best_id)
        .collect();
    entries.sort();

    if entries.is_empty() {
        eprintln!("  Store at {} is empty.", store.root().display());
        return Ok(());
    }
    for id in &entries {
        println!("{id}");
    }
    Ok(())
}

fn add(ctx: &Context, digest: &str, dir: &Path) -> Result<()> {
    let digest = parse_digest(digest)?;
    let path = ctx
        .store()?
        .add_directory(dir, &digest)
        .with_context(|| format!("Failed to add {}", dir.display()))?;
    println!("{}", path.display());
    Ok(())
}

fn add_archive(
    ctx: &Context,
    digest: &str,
    archive: &Path,
    mime_type: Option<String>,
    extract: Option<String>,
) -> Result<()> {
    let digest = parse_digest(digest)?;
    let descriptor = Archive {
        mime_type,
        extract,
        ..Archive::new(archive.to_string_lossy())
    };
    let info = ArchiveFileInfo::from_archive(archive.to_path_buf(), &descriptor)?;
    let path = ctx
        .store()?
        .add_archive(&info, &digest, &CancellationToken::new())
        .with_context(|| format!("Failed to add {}", archive.display()))?;
    println!("{}", path.display());
    Ok(())
}

fn remove(ctx: &Context, digests: &[String]) -> Result<()> {
    let store = ctx.store()?;
    for text in digests {
        store.remove(&parse_digest(text)?)?;
        eprintln!("  {} {text}", "removed".dark_grey());
    }
    Ok(())
}

fn verify(ctx: &Context, digests: &[String]) -> Result<()> {
    let store = ctx.store()?;
    let mut failed = 0;
    for text in digests {
        match store.verify(&parse_digest(text)?) {
            Ok(()) => println!("{} {text}", "✓".green()),
            Err(e) => {
                println!("{} {text}: {e}", "✗".red());
                failed += 1;
            }
        }
    }
    if failed > 0 {
        bail!("{failed} implementation(s) failed verification");
    }
    Ok(())
}

fn audit(ctx: &Context) -> Result<()> {
    let store = ctx.store()?;
    let failures = store.audit()?;
    for failure in &failures {
        println!("{} {}: {}", "✗".red(), failure.digest, failure.error);
    }
    if !failures.is_empty() {
        bail!("{} implementation(s) failed verification", failures.len());
    }
    eprintln!("  {}", "All implementations verified.".green());
    Ok(())
}

fn path(ctx: &Context, digest: &str) -> Result<()> {
    let path = ctx.store()?.get_path(&parse_digest(digest)?)?;
    println!("{}", path.display());
    Ok(())
}

fn print_manifest(dir: &Path, algorithm: ManifestFormat) -> Result<()> {
    let manifest = Manifest::generate(dir, algorithm)
        .with_context(|| format!("Failed to read {}", dir.display()))?;
    print!("{}", manifest.serialize());
    eprintln!("{}={}", algorithm, manifest.digest_value());
    Ok(())
}

fn digest(dir: &Path, algorithms: &[ManifestFormat]) -> Result<()> {
    let algorithms = if algorithms.is_empty() {
        &[ManifestFormat::Sha256New][..]
    } else {
        algorithms
    };
    let digest = manifest::digest_tree(dir, algorithms)
        .with_context(|| format!("Failed to read {}", dir.display()))?;
    for id in digest.ids() {
        println!("{id}");
    }
    Ok(())
}

fn purge(ctx: &Context) -> Result<()> {
    let removed = ctx.store()?.purge_staging()?;
    eprintln!("  Removed {removed} leftover temporary item(s).");
    Ok(())
}
