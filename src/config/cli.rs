//! Command-line parsing.
//!
//! Usage: `http-splitter [:port] production [staging] [options]`.
//! A first positional that is numeric or starts with `:` is the listen
//! port; otherwise the port keeps its default and the positionals are the
//! production and staging URLs. Option values may be attached with `=` or
//! given as the following argument.

use clap::Parser;
use std::path::PathBuf;

use crate::config::loader;
use crate::config::schema::SplitterConfig;
use crate::morf::DEFAULT_MORF_URI_BASE;

#[derive(Parser, Debug, Default)]
#[command(
    name = "http-splitter",
    about = "Traffic-forking reverse proxy: relay to production, duplicate to staging",
    disable_help_flag = true,
    ignore_errors = true
)]
pub struct Cli {
    /// `[:port] production [staging]`
    #[arg(value_name = "ARG")]
    pub positionals: Vec<String>,

    /// Perform URI morfing; an optional value overrides the base prefix.
    #[arg(
        short = 'U',
        long = "morfUri",
        value_name = "PREFIX",
        num_args = 0..=1,
        default_missing_value = DEFAULT_MORF_URI_BASE
    )]
    pub morf_uri: Option<String>,

    /// Make one change in a single random header value.
    #[arg(short = 'H', long = "morfHeader")]
    pub morf_header: bool,

    /// Log format keyword: date, time, microsec, longfile, shortfile, UTC.
    #[arg(short = 'l', long = "logLevel", value_name = "FLAG")]
    pub log_level: Vec<String>,

    /// Read program parameters from a JSON configuration file.
    #[arg(
        short = 'f',
        long = "file",
        value_name = "PATH",
        num_args = 0..=1,
        default_missing_value = "./redirector.json"
    )]
    pub file: Option<PathBuf>,

    /// Write a CPU profile to this path.
    #[arg(long = "CpuProfileFilename", value_name = "PATH")]
    pub cpu_profile_filename: Option<String>,

    /// Write a heap profile to this path.
    #[arg(long = "HeapProfileFilename", value_name = "PATH")]
    pub heap_profile_filename: Option<String>,

    /// Display this help and exit.
    #[arg(short = '?', long = "help", action = clap::ArgAction::Help)]
    pub help: Option<bool>,
}

/// Known option names, used to warn about unrecognized input before the
/// lenient parse skips it.
const KNOWN_OPTIONS: &[&str] = &[
    "-U",
    "--morfUri",
    "-H",
    "--morfHeader",
    "-l",
    "--logLevel",
    "-f",
    "--file",
    "--CpuProfileFilename",
    "--HeapProfileFilename",
    "-?",
    "--help",
];

fn warn_unknown_options<I: IntoIterator<Item = String>>(args: I) {
    for arg in args {
        if !arg.starts_with('-') {
            continue;
        }
        let name = arg.split('=').next().unwrap_or(&arg);
        if !KNOWN_OPTIONS.contains(&name) {
            tracing::warn!(option = %arg, "invalid input option, continuing with defaults");
        }
    }
}

/// Extract just the `-l/--logLevel` values without a full parse, so
/// logging can be initialized before parse warnings are emitted.
pub fn peek_log_flags(args: &[String]) -> Vec<String> {
    let mut flags = Vec::new();
    let mut iter = args.iter().skip(1).peekable();
    while let Some(arg) = iter.next() {
        if let Some(value) = arg
            .strip_prefix("--logLevel=")
            .or_else(|| arg.strip_prefix("-l="))
        {
            flags.push(value.to_string());
        } else if arg == "-l" || arg == "--logLevel" {
            if let Some(value) = iter.peek() {
                if !value.starts_with('-') {
                    flags.push(iter.next().map(String::clone).unwrap_or_default());
                }
            }
        }
    }
    flags
}

/// Parse the command line and produce the effective configuration.
///
/// Precedence, lowest to highest: built-in defaults, the JSON config file
/// (only when `-f/--file` was given), then command-line options.
pub fn parse_args<I>(args: I) -> SplitterConfig
where
    I: IntoIterator<Item = String> + Clone,
{
    // The lenient parse below swallows parse errors wholesale, so help
    // and unknown-option warnings are handled up front.
    let argv: Vec<String> = args.clone().into_iter().skip(1).collect();
    if argv.iter().any(|a| a == "-?" || a == "--help") {
        use clap::CommandFactory;
        let _ = Cli::command().print_help();
        std::process::exit(0);
    }
    warn_unknown_options(argv);

    let cli = Cli::parse_from(args);
    build_config(cli)
}

fn build_config(cli: Cli) -> SplitterConfig {
    let mut config = SplitterConfig::default();

    if let Some(path) = &cli.file {
        match loader::load_config(path, &config) {
            Ok(loaded) => config = loaded,
            Err(err) => {
                tracing::warn!(path = %path.display(), error = %err, "configuration file unreadable, continuing");
            }
        }
    }

    apply_positionals(&mut config, &cli.positionals);

    if let Some(base) = cli.morf_uri {
        config.morf_uri = true;
        if !base.is_empty() {
            config.morf_uri_base = base;
        }
    }
    if cli.morf_header {
        config.morf_header = true;
    }
    if !cli.log_level.is_empty() {
        config.log_flags = cli.log_level;
    }
    if let Some(path) = cli.cpu_profile_filename {
        config.cpu_profile_filename = path;
    }
    if let Some(path) = cli.heap_profile_filename {
        config.heap_profile_filename = path;
    }

    config
}

fn apply_positionals(config: &mut SplitterConfig, positionals: &[String]) {
    let mut rest = positionals;

    if let Some(first) = rest.first() {
        if first.starts_with(':') || first.chars().all(|c| c.is_ascii_digit()) {
            config.port = first.clone();
            rest = &rest[1..];
        }
    }

    if let Some(production) = rest.first() {
        config.production = production.clone();
    }
    if let Some(staging) = rest.get(1) {
        config.staging = staging.clone();
    }
    if rest.len() > 2 {
        tracing::warn!("too many positional arguments, extra values ignored");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn argv(args: &[&str]) -> Vec<String> {
        std::iter::once("http-splitter")
            .chain(args.iter().copied())
            .map(String::from)
            .collect()
    }

    #[test]
    fn positional_port_production_staging() {
        let config = parse_args(argv(&[":9000", "http://prod/", "http://stage/"]));
        assert_eq!(config.port, ":9000");
        assert_eq!(config.production, "http://prod/");
        assert_eq!(config.staging, "http://stage/");
    }

    #[test]
    fn port_positional_is_optional() {
        let config = parse_args(argv(&["http://prod/", "http://stage/"]));
        assert_eq!(config.port, ":8888");
        assert_eq!(config.production, "http://prod/");
        assert_eq!(config.staging, "http://stage/");
    }

    #[test]
    fn bare_numeric_port_is_accepted() {
        let config = parse_args(argv(&["9001", "http://prod/"]));
        assert_eq!(config.port, "9001");
        assert_eq!(config.production, "http://prod/");
        assert!(config.staging.is_empty());
    }

    #[test]
    fn morf_uri_flag_with_and_without_value() {
        let config = parse_args(argv(&["http://prod/", "--morfUri"]));
        assert!(config.morf_uri);
        assert_eq!(config.morf_uri_base, DEFAULT_MORF_URI_BASE);

        let config = parse_args(argv(&["http://prod/", "--morfUri=/api/ui/"]));
        assert!(config.morf_uri);
        assert_eq!(config.morf_uri_base, "/api/ui/");
    }

    #[test]
    fn morf_header_short_flag() {
        let config = parse_args(argv(&["http://prod/", "-H"]));
        assert!(config.morf_header);
    }

    #[test]
    fn log_level_keywords_accumulate() {
        let config = parse_args(argv(&["http://prod/", "-l", "date", "-l", "UTC"]));
        assert_eq!(config.log_flags, vec!["date".to_string(), "UTC".to_string()]);
    }

    #[test]
    fn profile_filenames_pass_through() {
        let config = parse_args(argv(&[
            "http://prod/",
            "--CpuProfileFilename",
            "/tmp/cpu.prof",
            "--HeapProfileFilename=/tmp/heap.prof",
        ]));
        assert_eq!(config.cpu_profile_filename, "/tmp/cpu.prof");
        assert_eq!(config.heap_profile_filename, "/tmp/heap.prof");
    }
}
