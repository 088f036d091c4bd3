mod cli;

use clap::Parser;
use cli::Cli;
use simple_logger::SimpleLogger;
use std::error::Error;
use std::process::ExitCode;

fn main() -> ExitCode {
    let cli = Cli::parse();
    if let Err(e) = SimpleLogger::new().with_level(cli.log_level()).init() {
        eprintln!("warning: logger unavailable: {e}");
    }

    let result = cli
        .params()
        .and_then(|params| ct_veil::deidentify_with(&cli.input, cli.out.as_deref(), &params));

    match result {
        Ok(summary) => {
            println!(
                "{} slice(s) written to {} ({} voxel(s) replaced)",
                summary.slices(),
                summary.output.display(),
                summary.replaced_voxels
            );
            ExitCode::SUCCESS
        }
        Err(e) => {
            eprintln!("error: {e}");
            let mut source = e.source();
            while let Some(cause) = source {
                eprintln!("  caused by: {cause}");
                source = cause.source();
            }
            ExitCode::FAILURE
        }
    }
}
