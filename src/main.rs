use anyhow::{self, Context};
use clap::Parser;

use qunfold::interfaces::cli::{log_heading, setup_logger, Cli};
use qunfold::interfaces::input::Input;
use qunfold::interfaces::InputHandle;
use qunfold::io::read_qunfold_yaml;

fn main() -> Result<(), anyhow::Error> {
    let cli = Cli::parse();
    setup_logger(cli.output.as_ref(), cli.verbose)?;
    log_heading();

    let inp = read_qunfold_yaml::<Input, _>(&cli.config)
        .with_context(|| format!("Unable to read the input file {}", cli.config.display()))?;
    inp.handle()
}
