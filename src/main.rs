use std::path::PathBuf;

use clap::Parser;
use color_eyre::eyre::{eyre, Result};
use log::LevelFilter;
use simple_logger::SimpleLogger;

use xtoy::console::StdConsole;
use xtoy::memory::Memory;
use xtoy::processor::{Processor, RunOptions};
use xtoy::trace;

/// Runs a TOY machine memory image
#[derive(Debug, Parser)]
#[command(version, about)]
struct Args {
    /// Memory image, one `AA:DDDD` cell per line
    image: PathBuf,
    /// Wait for Enter after every cycle
    #[arg(short, long)]
    step: bool,
    /// Only show console input and output
    #[arg(short, long)]
    quiet: bool,
    /// Cells shown on each side of a memory window
    #[arg(short, long, default_value_t = trace::DEFAULT_WINDOW)]
    window: u16,
    /// One of off, error, warn, info, debug, trace
    #[arg(long, default_value = "info")]
    log_level: String,
}

fn main() -> Result<()> {
    color_eyre::install()?; // rust error handling

    let args = Args::parse();
    let level: LevelFilter = args
        .log_level
        .parse()
        .map_err(|err| eyre!("invalid log level `{}`: {}", args.log_level, err))?;
    SimpleLogger::new()
        .with_level(level)
        .init()
        .map_err(|err| eyre!("failed to install logger: {}", err))?; // logging

    let mut cpu = Processor::default();
    let mut mem = Memory::from_file(&args.image)?;

    let options = RunOptions {
        trace: !args.quiet,
        single_step: args.step,
        window: args.window,
    };
    let mut console = StdConsole::stdio();

    if options.trace {
        trace::render_cycle(&mut console, &cpu, &mem, options.window)?;
    }

    cpu.execute_until_halt(&mut mem, &mut console, &options)
}
