use clap::Parser;
use snafu::{ResultExt, Snafu};
use talm::{
    cli::{self, Cli, Command},
    logging,
};

#[derive(Debug, Snafu)]
enum Error {
    #[snafu(display("failed to initialize logging"))]
    InitializeLogging { source: logging::Error },

    #[snafu(display("failed to generate the node configuration"))]
    Template { source: cli::Error },
}

#[snafu::report]
fn main() -> Result<(), Error> {
    let cli = Cli::parse();
    logging::initialize_logging(logging::LOG_ENV, "talm").context(InitializeLoggingSnafu)?;

    match cli.command {
        Command::Template(arguments) => arguments.run().context(TemplateSnafu),
    }
}
