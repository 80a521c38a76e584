use clap::Parser;
use seqstream_pipeline::{ClassificationMode, VerifierKind};
use std::path::PathBuf;

#[derive(Parser, Debug, Default)]
#[command(name = "seqstream-server")]
#[command(about = "Streaming sequence clustering and verification server", long_about = None)]
pub struct Cli {
    /// Configuration file path
    #[arg(short, long, env = "SEQSTREAM_CONFIG", default_value = "config.yaml")]
    pub config: String,

    /// Listen address
    #[arg(short = 'l', long)]
    pub listen: Option<String>,

    /// Listen port
    #[arg(short = 'P', long, env = "SEQSTREAM_PORT")]
    pub port: Option<u16>,

    /// Directory holding uploads until they are analysed
    #[arg(long, env = "SEQSTREAM_UPLOAD_DIR")]
    pub upload_dir: Option<PathBuf>,

    /// Classification mode: local or remote
    #[arg(short, long, env = "SEQSTREAM_MODE")]
    pub mode: Option<ClassificationMode>,

    /// Base URL of the remote prediction service
    #[arg(short, long, env = "SEQSTREAM_REMOTE_URL")]
    pub remote_url: Option<String>,

    /// Verification backend: blast or disabled
    #[arg(long, env = "SEQSTREAM_VERIFIER")]
    pub verifier: Option<VerifierKind>,

    /// Number of groups to verify per session
    #[arg(long)]
    pub top_n: Option<usize>,

    /// Enable verbose logging
    #[arg(short, long)]
    pub verbose: bool,
}
