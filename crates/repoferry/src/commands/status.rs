//! Status command implementation.

use anyhow::{bail, Context, Result};

use repoferry_core::persist::RunLayout;
use repoferry_core::status::show_status;

use super::StatusArgs;
use crate::ui::{clear_screen, parse_duration, print_suggestion};

/// Run the status command.
pub async fn run(args: StatusArgs) -> Result<()> {
    let run_dir = args
        .run_dir
        .unwrap_or_else(|| super::load_config().run_dir());
    let layout = RunLayout::new(run_dir);

    let Some(watch) = args.watch.as_deref() else {
        return print_status(&layout);
    };

    let period = parse_duration(watch)
        .context("Invalid watch interval. Use formats like '5s', '1m', '1m30s'")?;
    if period.is_zero() {
        bail!("Watch interval must be greater than zero");
    }

    tracing::debug!(run_dir = %layout.root().display(), ?period, "Watching transfer status");

    let mut ticker = tokio::time::interval(period);
    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                clear_screen();
                print_status(&layout)?;
            }
            _ = &mut ctrl_c => {
                println!();
                return Ok(());
            }
        }
    }
}

fn print_status(layout: &RunLayout) -> Result<()> {
    match show_status(layout) {
        Ok(output) => {
            print!("{}", output);
            Ok(())
        }
        Err(e) => {
            print_suggestion(&e);
            Err(e).with_context(|| {
                format!(
                    "Failed to read transfer status from {}",
                    layout.root().display()
                )
            })
        }
    }
}
