//! CLI argument parsing with clap derive macros.

use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};
use termlens_core::region::{RegionBounds, RegionMode, WindowRegion};

const INPUT_HELP: &str = "Text file to read as the terminal buffer ('-' for stdin)";

/// Screen review for terminal text.
///
/// Maps positions to rows and columns, extracts rectangles and linear
/// selections with escape sequences stripped, describes text attributes and
/// watches named screen regions for changes.
#[derive(Debug, Parser)]
#[command(name = "termlens", version)]
pub struct Cli {
    /// Settings file [default: see TERMLENS_CONFIG / XDG_CONFIG_HOME]
    #[arg(long, global = true, value_name = "PATH")]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Row and column of a character offset
    #[command(after_help = "\
Examples:
  termlens position build.log 0          # First character: row 1, column 1
  termlens position build.log 120        # 121st character of the buffer")]
    Position(PositionArgs),

    /// Extract the text between two corners
    #[command(after_help = "\
Corners may be given in any order. Columns are display columns and the
right edge is exclusive, so 1 1 3 10 reads columns 1-9 of rows 1-3.

Examples:
  termlens rect screen.txt 1 1 3 10
  termlens rect --format text build.log 500 1 1 80   # Large: runs in the background")]
    Rect(RectArgs),

    /// Extract the text between two character offsets
    Linear(LinearArgs),

    /// Describe color and format attributes of a line
    #[command(after_help = "\
Examples:
  termlens attrs colored.log --line 3
  printf '\\033[1;31mFAIL\\033[0m ok' | termlens attrs - --brief")]
    Attrs(AttrsArgs),

    /// Remove escape sequences
    Strip(StripArgs),

    /// Measure display width of text
    Width(WidthArgs),

    /// Watch named regions and report changes
    #[command(after_long_help = "\
Region format:
  NAME=TOP,LEFT,BOTTOM,RIGHT[@MODE]
  Bounds are 1-based rows/columns or 'last'. MODE is announce (default),
  silent or monitor.

Examples:
  termlens watch --file status.txt --region status=1,1,1,last
  termlens watch --region tail=last,1,last,last -- cargo build
  termlens watch --profile build.json -- make
  termlens watch --file app.log --region top=1,1,5,last --save-profile app.json")]
    Watch(WatchArgs),
}

#[derive(Debug, Clone, Copy, Default, ValueEnum)]
pub enum OutputFormat {
    /// Pretty-printed JSON
    #[default]
    Json,
    /// Plain text
    Text,
}

#[derive(Debug, clap::Args)]
pub struct PositionArgs {
    #[arg(help = INPUT_HELP)]
    pub input: PathBuf,

    /// Character offset from the start of the buffer (0-based)
    pub offset: u64,
}

#[derive(Debug, clap::Args)]
pub struct RectArgs {
    #[arg(help = INPUT_HELP)]
    pub input: PathBuf,

    /// First corner row (1-based)
    pub top: u32,
    /// First corner column (1-based)
    pub left: u32,
    /// Second corner row
    pub bottom: u32,
    /// Second corner column (exclusive edge)
    pub right: u32,

    #[arg(short, long, value_enum, default_value_t = OutputFormat::Json)]
    pub format: OutputFormat,
}

#[derive(Debug, clap::Args)]
pub struct LinearArgs {
    #[arg(help = INPUT_HELP)]
    pub input: PathBuf,

    /// Start character offset (0-based)
    pub start: u64,

    /// End character offset, inclusive
    pub end: u64,

    #[arg(short, long, value_enum, default_value_t = OutputFormat::Json)]
    pub format: OutputFormat,
}

#[derive(Debug, clap::Args)]
pub struct AttrsArgs {
    #[arg(help = INPUT_HELP)]
    pub input: PathBuf,

    /// Only this line (1-based) [default: every line]
    #[arg(short, long)]
    pub line: Option<u32>,

    /// Colors only, no format flags
    #[arg(long)]
    pub brief: bool,

    #[arg(short, long, value_enum, default_value_t = OutputFormat::Json)]
    pub format: OutputFormat,
}

#[derive(Debug, clap::Args)]
pub struct StripArgs {
    #[arg(help = INPUT_HELP)]
    pub input: PathBuf,
}

#[derive(Debug, clap::Args)]
pub struct WidthArgs {
    /// Text to measure
    pub text: String,
}

#[derive(Debug, clap::Args)]
pub struct WatchArgs {
    /// Watch a file, re-read every poll interval
    #[arg(long, value_name = "FILE", conflicts_with = "command")]
    pub file: Option<PathBuf>,

    /// Region to watch: NAME=TOP,LEFT,BOTTOM,RIGHT[@MODE] (repeatable)
    #[arg(short, long = "region", value_name = "SPEC", value_parser = parse_region)]
    pub regions: Vec<WindowRegion>,

    /// Load regions from a profile JSON file
    #[arg(long, value_name = "PATH")]
    pub profile: Option<PathBuf>,

    /// Write the active regions to a profile JSON file and continue
    #[arg(long, value_name = "PATH")]
    pub save_profile: Option<PathBuf>,

    /// Poll interval in milliseconds [default: from settings]
    #[arg(short, long, value_name = "MS")]
    pub interval: Option<u64>,

    /// PTY width for commands
    #[arg(long, default_value_t = 80)]
    pub cols: u16,

    /// PTY height for commands
    #[arg(long, default_value_t = 24)]
    pub rows: u16,

    /// Print each change as a JSON line
    #[arg(long)]
    pub json: bool,

    /// Command to run in a PTY (after --)
    #[arg(
        num_args = 1..,
        trailing_var_arg = true,
        allow_hyphen_values = true,
        value_name = "COMMAND"
    )]
    pub command: Vec<String>,
}

/// Parse `NAME=TOP,LEFT,BOTTOM,RIGHT[@MODE]`.
pub fn parse_region(spec: &str) -> Result<WindowRegion, String> {
    let (name, rest) = spec
        .split_once('=')
        .ok_or_else(|| format!("expected NAME=TOP,LEFT,BOTTOM,RIGHT[@MODE], got '{}'", spec))?;
    let (bounds, mode) = match rest.split_once('@') {
        Some((bounds, mode)) => (bounds, mode.parse::<RegionMode>().map_err(|e| e.to_string())?),
        None => (rest, RegionMode::default()),
    };
    let bounds = bounds.parse::<RegionBounds>().map_err(|e| e.to_string())?;
    WindowRegion::new(name, bounds, mode).map_err(|e| e.to_string())
}

#[cfg(test)]
mod tests {
    use super::{parse_region, Cli, Commands};
    use clap::Parser;
    use termlens_core::region::{Bound, RegionMode};

    #[test]
    fn test_watch_parses_trailing_command() {
        let cli = Cli::parse_from([
            "termlens",
            "watch",
            "--region",
            "status=1,1,1,last",
            "--",
            "bash",
            "-c",
            "echo hi",
        ]);

        match cli.command {
            Commands::Watch(args) => {
                assert_eq!(args.command, vec!["bash", "-c", "echo hi"]);
                assert_eq!(args.regions.len(), 1);
                assert_eq!(args.regions[0].name, "status");
            }
            _ => panic!("Expected watch command"),
        }
    }

    #[test]
    fn test_watch_rejects_file_and_command_together() {
        let result = Cli::try_parse_from(["termlens", "watch", "--file", "a.txt", "--", "ls"]);
        assert!(result.is_err());
    }

    #[test]
    fn test_parse_region_with_mode() {
        let region = parse_region("log=2,1,last,80@silent").unwrap();
        assert_eq!(region.name, "log");
        assert_eq!(region.mode, RegionMode::Silent);
        assert_eq!(region.bounds.bottom(), Bound::Last);
        assert_eq!(region.bounds.right(), Bound::Index(80));
    }

    #[test]
    fn test_parse_region_errors() {
        assert!(parse_region("no-equals").is_err());
        assert!(parse_region("x=1,1,1").is_err());
        assert!(parse_region("x=1,1,1,1@loud").is_err());
        assert!(parse_region("=1,1,1,1").is_err());
        assert!(parse_region("x=0,1,1,1").is_err());
    }

    #[test]
    fn test_global_config_flag() {
        let cli = Cli::parse_from(["termlens", "strip", "-", "--config", "/tmp/c.json"]);
        assert_eq!(cli.config.unwrap().to_str(), Some("/tmp/c.json"));
    }
}
