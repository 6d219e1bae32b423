mod cli;
mod driver;
mod input;
mod run;
mod signal;
mod state;

use anyhow::Result;

fn main() -> Result<()> {
    let cli = cli::parse();
    run::run(cli)
}
