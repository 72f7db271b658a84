use crate::demo::{run_demo, run_schema, DemoArgs, SchemaArgs};
use crate::server;
use clap::{Args, Parser, Subcommand};
use compliance_intake::error::AppError;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(
    name = "Compliance Intake",
    about = "Serve and explore cross-border compliance applications from the command line",
    version
)]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Start the HTTP service (default command)
    Serve(ServeArgs),
    /// Print the form schema for a country and compliance type
    Schema(SchemaArgs),
    /// Walk through upload, submission, and listing against in-memory storage
    Demo(DemoArgs),
}

#[derive(Args, Debug, Default)]
pub(crate) struct ServeArgs {
    /// Override the configured host for the HTTP server
    #[arg(long)]
    pub(crate) host: Option<String>,
    /// Override the configured port for the HTTP server
    #[arg(long)]
    pub(crate) port: Option<u16>,
    /// Load form schemas from a JSON document instead of the built-in set
    #[arg(long)]
    pub(crate) schema_path: Option<PathBuf>,
}

pub(crate) async fn run() -> Result<(), AppError> {
    let cli = Cli::parse();
    let command = cli
        .command
        .unwrap_or_else(|| Command::Serve(ServeArgs::default()));

    match command {
        Command::Serve(args) => server::run(args).await,
        Command::Schema(args) => run_schema(args),
        Command::Demo(args) => run_demo(args),
    }
}
