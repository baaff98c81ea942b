use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(name = "tubevault")]
#[command(author, version, about = "Self-hosted video grabber with live download progress", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand, Debug, PartialEq)]
pub enum Commands {
    /// Run the HTTP server (default)
    Serve {
        /// Override WEB_PORT
        #[arg(short, long)]
        port: Option<u16>,
    },

    /// Download a single URL and follow its progress in the terminal
    Download {
        /// Video URL
        url: String,

        /// Merge best video and audio and re-encode (slower, larger file)
        #[arg(long)]
        high_quality: bool,
    },

    /// Mark jobs left pending by a previous run as failed, then exit
    Sweep,
}

impl Cli {
    pub fn parse_args() -> Self {
        Self::parse()
    }
}
