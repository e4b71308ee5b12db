use clap::{Args, Parser, Subcommand};

#[derive(Parser)]
#[command(name = "go-analysis", about = "Offline Go position analysis lookup")]
pub struct Cli {
    /// Path to the HOCON config file.
    #[arg(long, default_value = "analysis.conf", global = true)]
    pub config: String,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Analyze a position, falling back to the live engine on a miss.
    Analyze(AnalyzeArgs),
    /// Look a position up in the opening book and cache only.
    Query(PositionArgs),
    /// Analyze the final position of an SGF game record.
    ImportSgf(ImportSgfArgs),
    /// Show opening book and cache statistics.
    Stats,
}

#[derive(Args)]
pub struct PositionArgs {
    /// Board size: 9, 13, or 19.
    #[arg(short = 's', long, default_value_t = 19)]
    pub size: usize,

    /// Moves in GTP form, e.g. -m "B Q16" -m "W D4".
    #[arg(short = 'm', long = "move")]
    pub moves: Vec<String>,

    /// Number of handicap stones (0-9).
    #[arg(long, default_value_t = 0)]
    pub handicap: usize,

    /// Komi; defaults to 7.5, or 0.5 with handicap.
    #[arg(short, long)]
    pub komi: Option<f32>,
}

#[derive(Args)]
pub struct AnalyzeArgs {
    #[command(flatten)]
    pub position: PositionArgs,

    /// Minimum visits a cached result must have to be accepted.
    #[arg(long, default_value_t = 0)]
    pub lookup_visits: u32,

    /// Visit budget for a live engine run.
    #[arg(short, long)]
    pub visits: Option<u32>,

    /// Ignore book and cache and always run the engine.
    #[arg(long)]
    pub force_refresh: bool,

    /// Fail instead of falling back to the live engine.
    #[arg(long)]
    pub no_engine: bool,
}

#[derive(Args)]
pub struct ImportSgfArgs {
    /// Path to the SGF file.
    pub file: String,

    /// Visit budget for a live engine run.
    #[arg(short, long)]
    pub visits: Option<u32>,

    /// Fail instead of falling back to the live engine.
    #[arg(long)]
    pub no_engine: bool,
}
