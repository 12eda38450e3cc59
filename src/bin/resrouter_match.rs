//! `resrouter-match`: compile URI templates, show their precedence order and
//! match paths or media types against them.

use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use serde::Serialize;

use resrouter::config::DispatcherConfig;
use resrouter::logging::{init_logging_with_config, LogConfig};
use resrouter::media::{best_producer, parse_accept, MediaType};
use resrouter::router::PathMatcher;

#[derive(Parser)]
#[command(name = "resrouter-match")]
#[command(about = "Inspect URI templates, path matching and media type negotiation", long_about = None)]
struct Cli {
    /// Output format
    #[arg(long, value_enum, default_value_t = Format::Text, global = true)]
    format: Format,

    #[command(subcommand)]
    command: Command,
}

#[derive(Clone, Copy, ValueEnum)]
enum Format {
    Text,
    Json,
}

#[derive(Subcommand)]
enum Command {
    /// Compile templates and print them most specific first
    Compile {
        #[arg(required = true)]
        templates: Vec<String>,
    },
    /// Match a path against templates; the first listed match wins
    Match {
        /// Candidate template (repeatable)
        #[arg(short, long = "template", required = true)]
        templates: Vec<String>,
        /// Request path
        path: String,
    },
    /// Choose a response media type
    Negotiate {
        /// Declared media types, comma-separated (empty means any)
        #[arg(short, long, value_delimiter = ',')]
        produces: Vec<String>,
        /// Accept header value
        #[arg(short, long, default_value = "*/*")]
        accept: String,
    },
    /// Print the dispatcher configuration in effect
    Config {
        /// YAML file to start from instead of the defaults
        #[arg(short, long)]
        file: Option<PathBuf>,
    },
}

#[derive(Serialize)]
struct CompiledReport {
    template: String,
    regex: String,
    literal_chars: usize,
    params: Vec<String>,
    /// Template this one cannot be ordered against, if any
    #[serde(skip_serializing_if = "Option::is_none")]
    ties_with: Option<String>,
}

#[derive(Serialize)]
struct MatchReport {
    template: String,
    params: Vec<(String, String)>,
    remainder: Option<String>,
    exact: bool,
}

#[derive(Serialize)]
struct NegotiateReport {
    media_type: Option<String>,
    quality: Option<f32>,
}

fn compile_all(templates: &[String]) -> Result<Vec<PathMatcher>> {
    let mut matchers = templates
        .iter()
        .map(|t| PathMatcher::new(t).with_context(|| format!("cannot compile '{t}'")))
        .collect::<Result<Vec<_>>>()?;
    matchers.sort();
    Ok(matchers)
}

fn compile(templates: &[String]) -> Result<Vec<CompiledReport>> {
    let matchers = compile_all(templates)?;
    Ok(matchers
        .iter()
        .enumerate()
        .map(|(i, m)| CompiledReport {
            template: m.as_str().to_string(),
            regex: m.template().regex().to_string(),
            literal_chars: m.template().literal_chars(),
            params: m.template().param_names().iter().map(ToString::to_string).collect(),
            ties_with: matchers
                .iter()
                .enumerate()
                .find(|(j, other)| *j != i && other.ties_with(m))
                .map(|(_, other)| other.as_str().to_string()),
        })
        .collect())
}

fn match_path(templates: &[String], path: &str) -> Result<Vec<MatchReport>> {
    let matchers = compile_all(templates)?;
    Ok(matchers
        .iter()
        .filter_map(|m| {
            let found = m.matches(path)?;
            Some(MatchReport {
                template: m.as_str().to_string(),
                exact: found.is_exact(),
                params: found
                    .params
                    .iter()
                    .map(|(k, v)| (k.to_string(), v.clone()))
                    .collect(),
                remainder: found.remainder,
            })
        })
        .collect())
}

fn negotiate(produces: &[String], accept: &str) -> Result<NegotiateReport> {
    let declared = produces
        .iter()
        .filter(|p| !p.trim().is_empty())
        .map(|p| p.parse::<MediaType>().with_context(|| format!("invalid media type '{p}'")))
        .collect::<Result<Vec<_>>>()?;
    let accept = parse_accept([accept]).context("invalid Accept value")?;
    let chosen = best_producer(&declared, &accept);
    Ok(NegotiateReport {
        media_type: chosen.as_ref().map(|n| n.media_type.to_string()),
        quality: chosen.map(|n| n.score.quality),
    })
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn run(cli: Cli) -> Result<bool> {
    match cli.command {
        Command::Compile { templates } => {
            let report = compile(&templates)?;
            match cli.format {
                Format::Json => print_json(&report)?,
                Format::Text => {
                    for (i, r) in report.iter().enumerate() {
                        println!(
                            "{:>2}. {}  literal={} params=[{}] regex={}",
                            i + 1,
                            r.template,
                            r.literal_chars,
                            r.params.join(","),
                            r.regex
                        );
                        if let Some(other) = &r.ties_with {
                            println!("    ties with {other}: cannot be registered side by side");
                        }
                    }
                }
            }
            Ok(report.iter().all(|r| r.ties_with.is_none()))
        }
        Command::Match { templates, path } => {
            let report = match_path(&templates, &path)?;
            match cli.format {
                Format::Json => print_json(&report)?,
                Format::Text => {
                    if report.is_empty() {
                        println!("no template matches {path}");
                    }
                    for (i, r) in report.iter().enumerate() {
                        let marker = if i == 0 { "*" } else { " " };
                        let params: Vec<String> =
                            r.params.iter().map(|(k, v)| format!("{k}={v}")).collect();
                        println!(
                            "{marker} {}  [{}] remainder={}",
                            r.template,
                            params.join(", "),
                            r.remainder.as_deref().unwrap_or("<none>")
                        );
                    }
                }
            }
            Ok(!report.is_empty())
        }
        Command::Negotiate { produces, accept } => {
            let report = negotiate(&produces, &accept)?;
            match cli.format {
                Format::Json => print_json(&report)?,
                Format::Text => match (&report.media_type, report.quality) {
                    (Some(media), Some(q)) => println!("{media} (q={q})"),
                    _ => println!("not acceptable"),
                },
            }
            Ok(report.media_type.is_some())
        }
        Command::Config { file } => {
            let base = match file {
                Some(path) => DispatcherConfig::from_file(&path)?,
                None => DispatcherConfig::default(),
            };
            let config = base.with_env_overrides();
            match cli.format {
                Format::Json => print_json(&config)?,
                Format::Text => print!("{}", serde_yaml::to_string(&config)?),
            }
            Ok(true)
        }
    }
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    let mut log_config = LogConfig {
        stderr: true,
        ..LogConfig::from_env()
    };
    if std::env::var_os("RESR_LOG_LEVEL").is_none() {
        log_config.log_level = "warn".to_string();
    }
    if let Err(e) = init_logging_with_config(&log_config) {
        eprintln!("warning: {e:#}");
    }
    match run(cli) {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::from(1),
        Err(e) => {
            eprintln!("error: {e:#}");
            ExitCode::from(2)
        }
    }
}
