//! `monarch purge`: start over with an empty database and image directory.

use std::io::{self, BufRead, IsTerminal, Write};

use anyhow::{Context, bail};
use monarch_store::{AssetStore, DuckStore};

pub fn run(store: &DuckStore, assets: &AssetStore, yes: bool) -> anyhow::Result<()> {
    if !yes {
        if !io::stdin().is_terminal() {
            bail!("refusing to purge without --yes when not running interactively");
        }
        eprint!("This deletes ALL observations, labels and downloaded images. Type 'yes' to confirm: ");
        io::stderr().flush()?;
        let mut answer = String::new();
        io::stdin().lock().read_line(&mut answer)?;
        if !confirmed(&answer) {
            println!("Aborted.");
            return Ok(());
        }
    }

    let stats = store.purge().context("purging database")?;
    let removed = assets.purge().context("deleting images")?;

    println!("Purged:");
    println!("  observations: {}", stats.observations);
    println!("  labels:       {}", stats.labels);
    println!("  images:       {removed} from {}", assets.dir().display());
    Ok(())
}

fn confirmed(answer: &str) -> bool {
    answer.trim().eq_ignore_ascii_case("yes")
}
