//! CLI argument definitions using clap derive macros.

use std::path::PathBuf;

use clap::Parser;

/// Watch folders for dropped .torrent and .magnet files.
///
/// Dropfolder monitors configured directories, parses every descriptor or
/// magnet-list file dropped into them, and reports the results. Watched
/// folders persist across runs in the configuration directory.
#[derive(Parser, Debug)]
#[command(name = "dropfolder")]
#[command(author, version, about)]
pub struct Args {
    /// Increase output verbosity (-v for debug, -vv for trace)
    #[arg(short, long, action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Suppress non-error output
    #[arg(short, long)]
    pub quiet: bool,

    /// Configuration directory holding the watched-folder store
    #[arg(short = 'd', long, default_value = ".")]
    pub config_dir: PathBuf,

    /// Watch an additional folder (absolute path, repeatable)
    #[arg(short = 'w', long = "watch")]
    pub watch: Vec<PathBuf>,

    /// Save path recorded for files found in folders added via --watch
    #[arg(short = 's', long)]
    pub save_path: Option<PathBuf>,

    /// Watch folders added via --watch recursively
    #[arg(short = 'r', long)]
    pub recursive: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_default_args_parses_successfully() {
        let args = Args::try_parse_from(["dropfolder"]).unwrap();
        assert_eq!(args.verbose, 0);
        assert!(!args.quiet);
        assert_eq!(args.config_dir, PathBuf::from("."));
        assert!(args.watch.is_empty());
        assert!(args.save_path.is_none());
        assert!(!args.recursive);
    }

    #[test]
    fn test_cli_verbose_flag_increments_count() {
        let args = Args::try_parse_from(["dropfolder", "-v"]).unwrap();
        assert_eq!(args.verbose, 1);

        let args = Args::try_parse_from(["dropfolder", "-vv"]).unwrap();
        assert_eq!(args.verbose, 2);
    }

    #[test]
    fn test_cli_quiet_flag_sets_quiet() {
        let args = Args::try_parse_from(["dropfolder", "-q"]).unwrap();
        assert!(args.quiet);
    }

    #[test]
    fn test_cli_watch_flag_repeatable() {
        let args =
            Args::try_parse_from(["dropfolder", "-w", "/drop/a", "--watch", "/drop/b"]).unwrap();
        assert_eq!(
            args.watch,
            [PathBuf::from("/drop/a"), PathBuf::from("/drop/b")]
        );
    }

    #[test]
    fn test_cli_save_path_and_recursive() {
        let args = Args::try_parse_from([
            "dropfolder",
            "-w",
            "/drop",
            "--save-path",
            "/downloads",
            "--recursive",
        ])
        .unwrap();
        assert_eq!(args.save_path, Some(PathBuf::from("/downloads")));
        assert!(args.recursive);
    }

    #[test]
    fn test_cli_config_dir_flag() {
        let args = Args::try_parse_from(["dropfolder", "-d", "/etc/dropfolder"]).unwrap();
        assert_eq!(args.config_dir, PathBuf::from("/etc/dropfolder"));
    }

    #[test]
    fn test_cli_help_flag_shows_usage() {
        // --help causes early exit, so we check it returns an error with Help kind
        let result = Args::try_parse_from(["dropfolder", "--help"]);
        assert!(result.is_err());
        let err = result.unwrap_err();
        assert_eq!(err.kind(), clap::error::ErrorKind::DisplayHelp);
    }

    #[test]
    fn test_cli_invalid_flag_returns_error() {
        let result = Args::try_parse_from(["dropfolder", "--invalid-flag"]);
        assert!(result.is_err());
        let err = result.unwrap_err();
        assert_eq!(err.kind(), clap::error::ErrorKind::UnknownArgument);
    }
}
