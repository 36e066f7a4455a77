use anyhow::{Context, Result};
use clap::builder::FalseyValueParser;
use clap::{Parser, ValueEnum};
use std::io;
use std::path::PathBuf;
use tmplmv_core::{
    compile_template, current_working_dir, load_config, reporter_for, AppConfig, BatchOptions,
    BatchRunner, OutputFormat, Separator,
};
use tracing::debug;
use tracing_subscriber::EnvFilter;

const AFTER_HELP: &str = r#"Paths to move are read from standard input, typically piped from `ls` or `find`.

<PATTERN> is a template describing how to turn each source path into its destination.
Fields: .I .N .Raw .Abs .Dir .Base .Ext .BaseName
Lookups: .Stat (.Name .Size .Mode .ModTime .IsDir)
         .Times (.ModTime .AccessTime .ChangeTime .BirthTime)
         .Exif (.DateTime .Make .Model .Tag "Name"), nil for non-images
Times format with strftime layouts: {{.Times.ModTime.Format "%Y_%m_%d"}}
A pattern that renders to nothing leaves that file alone.

Examples:

$ find . -name '*.go' -print0 | tmplmv -0 '{{.Dir}}/{{.BaseName}}_bak.go'
mv "./app/app.go" "/src/proj/app/app_bak.go"
mv "./main.go" "/src/proj/main_bak.go"

$ ls *.jpg | tmplmv --dryrun '{{if .Exif}}{{.Dir}}/{{.Exif.DateTime.Format "%Y/%m"}}/{{.Base}}{{end}}'
"#;

#[derive(Debug, Parser)]
#[command(name = "tmplmv", version)]
#[command(about = "Moves files listed on standard input to paths rendered from a template")]
#[command(after_help = AFTER_HELP)]
struct Cli {
    /// Destination template rendered once per input path
    pattern: String,
    /// Only print the moves, change nothing
    #[arg(long, env = "TMPLMV_DRYRUN", value_parser = FalseyValueParser::new())]
    dryrun: bool,
    /// Do not print what changed
    #[arg(long, env = "TMPLMV_SILENT", value_parser = FalseyValueParser::new())]
    silent: bool,
    /// Input paths are separated by NUL instead of newline
    #[arg(short = '0', long = "null", env = "TMPLMV_NULL", value_parser = FalseyValueParser::new())]
    null: bool,
    /// Log debug output to standard error
    #[arg(long, env = "TMPLMV_VERBOSE", value_parser = FalseyValueParser::new())]
    verbose: bool,
    #[arg(long, value_enum, env = "TMPLMV_OUTPUT")]
    output: Option<OutputArg>,
    /// Config file to use instead of the per-user one
    #[arg(long, env = "TMPLMV_CONFIG")]
    config: Option<PathBuf>,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum OutputArg {
    Text,
    Json,
}

impl From<OutputArg> for OutputFormat {
    fn from(arg: OutputArg) -> Self {
        match arg {
            OutputArg::Text => OutputFormat::Text,
            OutputArg::Json => OutputFormat::Json,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct Settings {
    dryrun: bool,
    silent: bool,
    separator: Separator,
    verbose: bool,
    output: OutputFormat,
}

impl Settings {
    fn resolve(cli: &Cli, config: &AppConfig) -> Self {
        let null = cli.null || config.null_separator;
        Self {
            dryrun: cli.dryrun || config.dryrun,
            silent: cli.silent || config.silent,
            separator: if null {
                Separator::Null
            } else {
                Separator::Newline
            },
            verbose: cli.verbose || config.verbose,
            output: cli.output.map(Into::into).unwrap_or(config.output),
        }
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = load_config(cli.config.as_deref())?;
    let settings = Settings::resolve(&cli, &config);
    init_logging(settings.verbose);
    debug!("settings: {settings:?}");

    let template = compile_template(&cli.pattern).context("invalid <PATTERN>")?;
    let options = BatchOptions {
        dryrun: settings.dryrun,
        separator: settings.separator,
        working_dir: current_working_dir()?,
    };
    let reporter = reporter_for(settings.silent, settings.output);

    let mut runner = BatchRunner::new(template, options, reporter);
    runner
        .run_reader(io::stdin().lock())
        .context("runtime error")?;
    Ok(())
}

fn init_logging(verbose: bool) {
    let fallback = if verbose { "debug" } else { "warn" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(fallback));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .with_target(false)
        .compact()
        .init();
}

#[cfg(test)]
mod tests {
    use super::{Cli, OutputArg, Settings};
    use clap::{CommandFactory, Parser};
    use tmplmv_core::{AppConfig, OutputFormat, Separator};

    #[test]
    fn cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn cli_requires_exactly_one_pattern() {
        assert!(Cli::try_parse_from(["tmplmv"]).is_err());
        assert!(Cli::try_parse_from(["tmplmv", "a", "b"]).is_err());
        let cli = Cli::try_parse_from(["tmplmv", "-0", "--dryrun", "{{.Base}}"]).expect("parse");
        assert!(cli.null && cli.dryrun);
        assert_eq!(cli.pattern, "{{.Base}}");
    }

    #[test]
    fn settings_merge_flags_over_config() {
        let cli = Cli::try_parse_from(["tmplmv", "--silent", "--output", "text", "{{.Base}}"])
            .expect("parse");
        let config = AppConfig {
            dryrun: true,
            null_separator: true,
            output: OutputFormat::Json,
            ..AppConfig::default()
        };

        let settings = Settings::resolve(&cli, &config);
        assert!(settings.dryrun);
        assert!(settings.silent);
        assert!(!settings.verbose);
        assert_eq!(settings.separator, Separator::Null);
        assert_eq!(settings.output, OutputFormat::Text);
        assert!(matches!(cli.output, Some(OutputArg::Text)));
    }
}
