use clap::Parser;
use diapred::commands::Command;
use tracing::Level;

#[derive(Debug, Parser)]
#[command(name = "diapred", about = "Diabetes risk classification pipeline")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

fn main() {
    // Log diagnostics to stderr so predict output stays clean on stdout
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .pretty()
        .with_thread_ids(true)
        .with_max_level(Level::INFO)
        .init();

    let cli = Cli::parse();

    if let Err(e) = cli.command.execute() {
        eprintln!("Error: {:#}", e);
        std::process::exit(1);
    }
}
