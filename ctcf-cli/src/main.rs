use clap::{Parser, Subcommand};
use ctcf_cli::{init_logger, BuildDatasetArgs, DownsampleArgs, FitArgs, PredictArgs, ProcessFimoArgs};

#[derive(Parser, Debug)]
#[command(
    version = env!("CARGO_PKG_VERSION"),
    about = env!("CARGO_PKG_DESCRIPTION"),
    long_about = None,)]
struct Cli {
    #[command(subcommand)]
    command: MainMenu,
}

#[derive(Subcommand, Debug)]
enum MainMenu {
    /// Extract the best motif score of every region from FIMO output
    ProcessFimo(ProcessFimoArgs),
    /// Build the labelled feature table and its train/test split
    BuildDataset(BuildDatasetArgs),
    /// Randomly sample rows of a feature table
    Downsample(DownsampleArgs),
    /// Fit model variants with CmdStan and predict binding probabilities
    Fit(FitArgs),
    /// Predict binding probabilities from saved posterior draws
    Predict(PredictArgs),
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_logger();

    match cli.command {
        MainMenu::ProcessFimo(args) => args.run()?,
        MainMenu::BuildDataset(args) => args.run()?,
        MainMenu::Downsample(args) => args.run()?,
        MainMenu::Fit(args) => args.run()?,
        MainMenu::Predict(args) => args.run()?,
    }
    Ok(())
}
