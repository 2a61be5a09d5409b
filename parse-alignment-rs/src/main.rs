use anyhow::Result;
use clap::Parser;
use mimalloc::MiMalloc;
use parse_alignment_rs::cli::Args;
use parse_alignment_rs::pipeline::{self, Interrupt};
use tracing_subscriber::EnvFilter;

#[global_allocator]
static GLOBAL: MiMalloc = MiMalloc;

fn main() -> Result<()> {
    let args = Args::parse();

    // Initialize tracing subscriber
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| {
            if args.quiet {
                EnvFilter::new("error")
            } else if args.very_verbose {
                EnvFilter::new("debug")
            } else if args.verbose {
                EnvFilter::new("info")
            } else {
                EnvFilter::new("warn")
            }
        });
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let interrupt = Interrupt::new();
    {
        let interrupt = interrupt.clone();
        ctrlc::set_handler(move || interrupt.trigger())?;
    }

    let summary = pipeline::run(&args, &interrupt)?;
    tracing::info!(
        n_total = summary.pass_one.n_total,
        n_map = summary.pass_one.n_map,
        ignored = summary.ignored,
        lines = summary.pass_two.lines,
        "parse-alignment: processing complete"
    );
    Ok(())
}
