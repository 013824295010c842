mod cli;
mod paths;
mod run;

use anyhow::Result;
use cli::Command;

fn main() -> Result<()> {
    let cli = cli::parse();
    run::initialise_tracing();

    match cli.command {
        Some(Command::Config) => run::print_config(&cli.run),
        Some(Command::Shader(args)) => run::print_shader(&cli.run, args.stage),
        None => run::run(cli.run),
    }
}
