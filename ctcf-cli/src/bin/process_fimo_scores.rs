use clap::Parser;
use ctcf_cli::{init_logger, ProcessFimoArgs};

fn main() -> anyhow::Result<()> {
    // Usage errors exit with 1; help and version requests exit with 0.
    let args = ProcessFimoArgs::try_parse().unwrap_or_else(|e| {
        let _ = e.print();
        std::process::exit(if e.use_stderr() { 1 } else { 0 })
    });
    init_logger();
    args.run()
}
