//! Log Viewer CLI
//!
//! Command-line interface for querying log files:
//! - Run a query over one or more files
//! - Show the index tokens of a phrase pattern
//! - Generate a default config file

use anyhow::Context;
use clap::{Parser, Subcommand, ValueEnum};
use logviewer::config::{generate_default_config, Config};
use logviewer::log::{LogItem, LogSource, MemoryLog, Value};
use logviewer::pattern::{extract_tokens, Pattern};
use logviewer::query::{compile, Cancellation, Executor, Node, ResultSet};
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::fmt::writer::BoxMakeWriter;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[derive(Parser)]
#[command(name = "logviewer")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Query log files with phrase patterns and pipelines")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Config file (default: user config dir, /etc/logviewer, ./config.toml)
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run a query over log files
    Query {
        /// Query text, e.g. '"error {code:number}" | group by code compute count()'
        query: String,
        /// Log files to read
        #[arg(required = true)]
        files: Vec<PathBuf>,
        /// Output format
        #[arg(short, long, value_enum, default_value = "table")]
        format: OutputFormat,
        /// Print the compiled plan before running it
        #[arg(long)]
        explain: bool,
    },

    /// Show the index tokens extracted from a phrase pattern
    Tokens {
        /// Phrase pattern, e.g. 'took {ms:number} ms'
        pattern: String,
    },

    /// Generate default config file
    Config {
        /// Output path (default: stdout)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
}

#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum OutputFormat {
    Table,
    Json,
    Csv,
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => Config::load_with_env(path)?,
        None => Config::load_default(),
    };

    init_logging(&config)?;

    match cli.command {
        Commands::Query {
            query,
            files,
            format,
            explain,
        } => {
            let plan = compile(&query, &config.query)?;
            if explain {
                eprintln!("plan: {}", plan);
            }

            let logs = files
                .iter()
                .map(|path| {
                    MemoryLog::load(path).with_context(|| format!("Failed to read {:?}", path))
                })
                .collect::<anyhow::Result<Vec<_>>>()?;

            let executor = Executor::new(config.execution.clone());
            let result = executor.execute(&plan, logs.read(), &Cancellation::new())?;

            tracing::info!(
                rows = result.len(),
                scanned = result.records_scanned,
                elapsed_ms = result.elapsed_ms,
                "Query finished"
            );

            let table = Table::from_result(&plan, &result);
            match format {
                OutputFormat::Table => table.print(),
                OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&table.json())?),
                OutputFormat::Csv => table.write_csv()?,
            }
        }

        Commands::Tokens { pattern } => {
            let pattern = Pattern::new(&pattern)?;
            let set = extract_tokens(&pattern, false);

            for token in &set.tokens {
                println!(
                    "{:<4} {:<10} exact={:<5} {:?}",
                    token.position,
                    format!("{:?}", token.kind),
                    token.exact,
                    token.data
                );
            }
            println!(
                "{} token(s); {}",
                set.tokens.len(),
                if set.exact {
                    "full scan"
                } else {
                    "index prefilter"
                }
            );
        }

        Commands::Config { output } => {
            let config = generate_default_config();

            match output {
                Some(path) => {
                    // Create parent directory if needed
                    if let Some(parent) = path.parent() {
                        std::fs::create_dir_all(parent)?;
                    }
                    std::fs::write(&path, &config)?;
                    println!("Config written to {:?}", path);
                }
                None => {
                    print!("{}", config);
                }
            }
        }
    }

    Ok(())
}

/// Log to stderr (or `logging.file`) so query output on stdout stays clean;
/// `RUST_LOG` wins over the configured level
fn init_logging(config: &Config) -> anyhow::Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("logviewer={}", config.logging.level)));

    let writer = || -> anyhow::Result<BoxMakeWriter> {
        Ok(match &config.logging.file {
            Some(path) => {
                let file = std::fs::OpenOptions::new()
                    .create(true)
                    .append(true)
                    .open(path)
                    .with_context(|| format!("Failed to open log file {}", path))?;
                BoxMakeWriter::new(Arc::new(file))
            }
            None => BoxMakeWriter::new(std::io::stderr),
        })
    };

    let json = config.logging.format.eq_ignore_ascii_case("json");
    let (json_layer, pretty_layer) = if json {
        (Some(tracing_subscriber::fmt::layer().json().with_writer(writer()?)), None)
    } else {
        (None, Some(tracing_subscriber::fmt::layer().with_writer(writer()?)))
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(json_layer)
        .with(pretty_layer)
        .init();

    Ok(())
}

/// Result rendered as named columns
///
/// Plans that end in a match or parse stage return whole records, shown
/// with their location and message before any captured fields.
struct Table {
    headers: Vec<String>,
    rows: Vec<Vec<Value>>,
}

fn returns_records(plan: &Node) -> bool {
    match plan {
        Node::OrderBy { inner, .. } | Node::Limit { inner, .. } => returns_records(inner),
        Node::Parse { .. } => true,
        other => other.is_match(),
    }
}

impl Table {
    fn from_result(plan: &Node, result: &ResultSet) -> Self {
        let mut headers: Vec<String> = Vec::new();
        let records = returns_records(plan);
        if records {
            headers.extend(["file", "line", "message"].map(String::from));
        }
        headers.extend(result.columns.iter().map(|c| c.name.clone()));

        // Parse stages add fields not known at compile time
        if records {
            let mut extra: Vec<&String> = result
                .rows
                .iter()
                .flat_map(|r| r.fields.keys())
                .filter(|k| !headers.contains(*k))
                .collect();
            extra.sort();
            extra.dedup();
            let extra: Vec<String> = extra.into_iter().cloned().collect();
            headers.extend(extra);
        }

        let rows = result
            .rows
            .iter()
            .map(|item| {
                headers
                    .iter()
                    .enumerate()
                    .map(|(idx, name)| cell(item, name, records && idx < 3))
                    .collect()
            })
            .collect();

        Self { headers, rows }
    }

    fn print(&self) {
        if self.rows.is_empty() {
            println!("No matching records");
            return;
        }

        let text: Vec<Vec<String>> = self
            .rows
            .iter()
            .map(|row| row.iter().map(|v| v.to_string()).collect())
            .collect();

        let widths: Vec<usize> = self
            .headers
            .iter()
            .enumerate()
            .map(|(i, h)| {
                text.iter()
                    .map(|row| row[i].chars().count())
                    .chain(std::iter::once(h.chars().count()))
                    .max()
                    .unwrap_or(0)
            })
            .collect();

        let line = |cells: &[String]| {
            cells
                .iter()
                .zip(&widths)
                .map(|(c, w)| format!("{:<width$}", c, width = *w))
                .collect::<Vec<_>>()
                .join(" | ")
        };

        println!("{}", line(&self.headers));
        println!(
            "{}",
            "-".repeat(widths.iter().sum::<usize>() + 3 * widths.len().saturating_sub(1))
        );
        for row in &text {
            println!("{}", line(row));
        }
    }

    fn json(&self) -> Vec<serde_json::Map<String, serde_json::Value>> {
        self.rows
            .iter()
            .map(|row| {
                self.headers
                    .iter()
                    .cloned()
                    .zip(row.iter().map(|v| serde_json::to_value(v).unwrap_or_default()))
                    .collect()
            })
            .collect()
    }

    fn write_csv(&self) -> anyhow::Result<()> {
        let mut writer = csv::Writer::from_writer(std::io::stdout());
        writer.write_record(&self.headers)?;
        for row in &self.rows {
            writer.write_record(row.iter().map(|v| match v {
                Value::Null => String::new(),
                other => other.to_string(),
            }))?;
        }
        writer.flush()?;
        Ok(())
    }
}

fn cell(item: &LogItem, name: &str, location: bool) -> Value {
    if location {
        return match name {
            "file" => Value::from(item.file.as_str()),
            "line" => Value::Integer(item.line as i64),
            _ => Value::from(item.message.as_str()),
        };
    }
    item.get(name).cloned().unwrap_or(Value::Null)
}
