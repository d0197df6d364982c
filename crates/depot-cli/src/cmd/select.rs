//! Select command

use anyhow::Result;

use super::Context;
use crate::SelectArgs;
use crate::ui::print_selections;

/// Solve the requirements and print the result
pub async fn select(ctx: &Context, args: &SelectArgs) -> Result<()> {
    let requirements = args.requirements()?;
    let store = ctx.store()?;
    let selections = super::solve_blocking(ctx.solver(&store), requirements).await?;

    if args.json {
        println!("{}", selections.to_json()?);
    } else {
        print_selections(&store, &selections);
    }
    Ok(())
}
