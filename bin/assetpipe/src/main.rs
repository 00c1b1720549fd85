//! assetpipe CLI
//!
//! Front-end asset build pipeline with a live-reload development server.
//!
//! This is the binary entry point. The library functionality is in `lib.rs`.

use assetpipe::TaskName;
use clap::Parser;
use color_eyre::eyre::Result;

/// Command-line interface for assetpipe.
#[derive(Parser)]
#[command(
    name = "assetpipe",
    version,
    about = "Front-end asset build pipeline with live reload"
)]
struct Cli {
    /// Path to configuration file
    #[arg(short, long, default_value = "assetpipe.toml")]
    config: std::path::PathBuf,

    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Command to run (defaults to watch)
    #[command(subcommand)]
    command: Option<Commands>,
}

/// Available CLI commands.
#[derive(clap::Subcommand, Debug, PartialEq, Eq)]
enum Commands {
    /// Process HTML pages
    Html,
    /// Compile Pug templates
    Pug,
    /// Compile, prefix and minify stylesheets
    Css,
    /// Resolve includes and minify scripts
    Js,
    /// Copy PHP files
    Php,
    /// Copy favicons
    Favicon,
    /// Compress images and create WebP derivatives
    Images,
    /// Convert OpenType fonts to TrueType in the source tree
    #[command(name = "fonts_otf")]
    FontsOtf,
    /// Convert TrueType fonts to WOFF and WOFF2
    Fonts,
    /// Regenerate the SCSS font manifest from the converted fonts
    #[command(name = "add_fonts_to_scss")]
    AddFontsToScss,
    /// Delete the build directory
    Clean,
    /// Clean and run every task
    Build,
    /// Build, watch sources and serve with live reload
    Watch {
        /// Port to listen on (overrides server.port)
        #[arg(short, long)]
        port: Option<u16>,
        /// Open browser automatically
        #[arg(long)]
        open: bool,
    },
}

impl Commands {
    /// Transform task run by this command, if it is one.
    fn task(&self) -> Option<TaskName> {
        match self {
            Self::Html => Some(TaskName::Html),
            Self::Pug => Some(TaskName::Pug),
            Self::Css => Some(TaskName::Css),
            Self::Js => Some(TaskName::Js),
            Self::Php => Some(TaskName::Php),
            Self::Favicon => Some(TaskName::Favicon),
            Self::Images => Some(TaskName::Images),
            Self::FontsOtf => Some(TaskName::FontsOtf),
            Self::Fonts => Some(TaskName::Fonts),
            Self::AddFontsToScss | Self::Clean | Self::Build | Self::Watch { .. } => None,
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    color_eyre::install()?;

    let cli = Cli::parse();
    assetpipe::init_tracing(cli.verbose);

    let command = cli.command.unwrap_or(Commands::Watch {
        port: None,
        open: false,
    });

    match command {
        Commands::AddFontsToScss => assetpipe::cmd::fonts::run(&cli.config)?,
        Commands::Clean => assetpipe::cmd::clean::run(&cli.config)?,
        Commands::Build => assetpipe::cmd::build::run(&cli.config)?,
        Commands::Watch { port, open } => {
            assetpipe::cmd::watch::run(&cli.config, port, open).await?;
        }
        other => {
            if let Some(task) = other.task() {
                assetpipe::cmd::task::run(&cli.config, task)?;
            }
        }
    }

    Ok(())
}
