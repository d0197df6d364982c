//! Download command

use anyhow::{Context as _, Result};
use depot_core::Fetcher;
use depot_core::fetch::HttpTransport;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

use super::Context;
use crate::SelectArgs;
use crate::ui::{ConsoleReporter, print_selections};

/// Solve the requirements, then fetch whatever the store is missing
pub async fn download(ctx: &Context, args: &SelectArgs) -> Result<()> {
    let requirements = args.requirements()?;
    let store = ctx.store()?;
    let selections = super::solve_blocking(ctx.solver(&store), requirements).await?;

    let cancel = CancellationToken::new();
    let on_interrupt = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            on_interrupt.cancel();
        }
    });

    let transport = HttpTransport::new().context("Failed to create HTTP client")?;
    let fetcher = Fetcher::new(store.clone(), Arc::new(transport))
        .with_reporter(Arc::new(ConsoleReporter::new()))
        .with_max_parallel(ctx.config.max_parallel_downloads)
        .with_cancellation(cancel);
    fetcher
        .fetch_uncached(&selections)
        .await
        .context("Download failed")?;

    if args.json {
        println!("{}", selections.to_json()?);
    } else {
        print_selections(&store, &selections);
    }
    Ok(())
}
