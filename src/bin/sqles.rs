//! sqles: query a search engine with SQL
//!
//! # Usage
//!
//! ```bash
//! # Run a query against the configured server
//! sqles "SELECT * FROM bank WHERE age > 25 LIMIT 10"
//!
//! # Dry run (show the request only)
//! sqles "SELECT COUNT(*) FROM bank WHERE gender = 'F'" --dry-run
//!
//! # Take field types from the index mapping
//! sqles "SELECT * FROM bank WHERE state = 'TN'" --mapping
//! ```

use std::collections::BTreeSet;
use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};
use colored::*;
use sqles::config::Config;
use sqles::engine::Hit;
use sqles::prelude::*;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "sqles")]
#[command(version)]
#[command(about = "Query Elasticsearch with SQL", long_about = None)]
#[command(after_help = "EXAMPLES:
    sqles \"SELECT * FROM bank WHERE city = 'Nogal'\"
    sqles \"SELECT age FROM bank WHERE age NOT IN (20, 22) LIMIT 100\" --format json
    sqles \"SELECT COUNT(*) FROM doc/accounts,bank/doc\" --dry-run")]
struct Cli {
    /// The SQL query to run
    query: Option<String>,

    /// Don't execute, just show the request
    #[arg(short, long)]
    dry_run: bool,

    /// Output format
    #[arg(short, long, value_enum, default_value = "table")]
    format: OutputFormat,

    /// Search server URL (overrides the config file)
    #[arg(long, env = "SQLES_URL")]
    url: Option<String>,

    /// Config file (default: ./sqles.toml, then the user config dir)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Fetch field types from the target index mappings
    #[arg(short, long)]
    mapping: bool,

    /// Verbose output
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Clone, ValueEnum)]
enum OutputFormat {
    Table,
    Json,
}

#[derive(Subcommand)]
enum Commands {
    /// Parse and explain a query without running it
    Explain {
        /// The SQL query to explain
        query: String,
    },
    /// Show the field types known for an index
    Fields {
        /// Index name (fetched from the server's mapping)
        index: String,
    },
    /// Show the supported SQL and what each construct compiles to
    Syntax,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let result = match &cli.command {
        Some(Commands::Explain { query }) => explain_query(query, &cli),
        Some(Commands::Fields { index }) => show_fields(index, &cli).await,
        Some(Commands::Syntax) => {
            show_syntax();
            Ok(())
        }
        None => match &cli.query {
            Some(query) => execute_query(query, &cli).await,
            None => {
                println!("{}", "sqles: SQL for search engines".cyan().bold());
                println!();
                println!("Usage: sqles <QUERY> [OPTIONS]");
                println!();
                println!("Try: sqles --help");
                Ok(())
            }
        },
    };

    if let Err(e) = result {
        eprintln!("{} {}", "Error:".red().bold(), e);
        std::process::exit(1);
    }
}

fn init_logging(verbose: bool) {
    let default = if verbose { "sqles=debug" } else { "sqles=warn" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn load_config(cli: &Cli) -> anyhow::Result<Config> {
    let mut config = Config::load(cli.config.as_deref())?;
    if let Some(url) = &cli.url {
        config.backend.url = url.clone();
    }
    Ok(config)
}

/// Config fields, on top of the index mappings when `--mapping` is set.
async fn build_schema(query: &str, config: &Config, cli: &Cli) -> anyhow::Result<Schema> {
    if !cli.mapping {
        return Ok(config.fields.clone());
    }

    let stmt = sqles::parse(query)?;
    let indices: BTreeSet<&str> = stmt.sources.iter().map(|s| s.index.as_str()).collect();
    let backend = HttpBackend::new(&config.backend)?;
    let mut schema = Schema::new();
    for index in indices {
        schema = schema.merge(&backend.mapping(index).await?);
    }
    Ok(schema.merge(&config.fields))
}

async fn execute_query(query: &str, cli: &Cli) -> anyhow::Result<()> {
    if cli.verbose {
        println!("{} {}", "Input:".dimmed(), query.yellow());
    }

    let config = load_config(cli)?;
    let schema = build_schema(query, &config, cli).await?;
    let compiler = Compiler::new(schema).with_options(config.compile);
    let compiled = compiler.compile(query)?;

    print_notes(&compiled.notes);

    if cli.dry_run {
        print_request(&compiled)?;
        return Ok(());
    }

    if cli.verbose {
        println!("{} {}", "Server:".dimmed(), config.backend.url);
    }

    let backend = HttpBackend::new(&config.backend)?;
    let response = run(&backend, &compiled).await?;

    if compiled.is_aggregate_only() {
        format_aggregations(&compiled, &response, &cli.format)?;
    } else {
        format_hits(&response, &cli.format)?;
    }
    Ok(())
}

async fn run<B: SearchBackend>(
    backend: &B,
    compiled: &CompiledQuery,
) -> SqlesResult<SearchResponse> {
    backend.execute(compiled).await
}

fn print_request(compiled: &CompiledQuery) -> anyhow::Result<()> {
    println!("{} /{}", "POST".green().bold(), compiled.search_path().white());
    println!("{}", serde_json::to_string_pretty(&compiled.body())?);
    Ok(())
}

fn print_notes(notes: &[SemanticNote]) {
    for note in notes {
        eprintln!("{} {}", "note:".yellow().bold(), note);
    }
}

fn format_hits(response: &SearchResponse, format: &OutputFormat) -> anyhow::Result<()> {
    match format {
        OutputFormat::Json => {
            println!("{}", serde_json::to_string_pretty(&response.hits)?);
        }
        OutputFormat::Table => {
            if response.hits.is_empty() {
                println!("{}", "(no results)".dimmed());
            } else {
                print_table(&response.hits);
            }
            println!();
            println!(
                "{} of {} hit(s) returned",
                response.hits.len().to_string().cyan(),
                response.total.to_string().cyan()
            );
        }
    }
    Ok(())
}

fn print_table(hits: &[Hit]) {
    // Columns in first-seen order across all hits
    let mut columns: Vec<&String> = Vec::new();
    for hit in hits {
        for key in hit.source.keys() {
            if !columns.contains(&key) {
                columns.push(key);
            }
        }
    }

    let mut widths: Vec<usize> = columns.iter().map(|c| c.len()).collect();
    for hit in hits {
        for (i, col) in columns.iter().enumerate() {
            let len = hit.source.get(*col).map(val_to_string).unwrap_or_default().len();
            widths[i] = widths[i].max(len);
        }
    }

    let header: Vec<String> = columns
        .iter()
        .zip(&widths)
        .map(|(c, w)| format!("{:width$}", c, width = w))
        .collect();
    println!("{}", header.join(" │ ").white().bold());

    let sep: Vec<String> = widths.iter().map(|w| "─".repeat(*w)).collect();
    println!("{}", sep.join("─┼─").dimmed());

    for hit in hits {
        let cells: Vec<String> = columns
            .iter()
            .zip(&widths)
            .map(|(c, w)| {
                let val = hit.source.get(*c).map(val_to_string).unwrap_or_default();
                format!("{:width$}", val, width = w)
            })
            .collect();
        println!("{}", cells.join(" │ "));
    }
}

fn format_aggregations(
    compiled: &CompiledQuery,
    response: &SearchResponse,
    format: &OutputFormat,
) -> anyhow::Result<()> {
    match format {
        OutputFormat::Json => {
            let aggs = response.aggregations.clone().unwrap_or_default();
            println!("{}", serde_json::to_string_pretty(&aggs)?);
        }
        OutputFormat::Table => {
            for agg in &compiled.aggregations {
                let value = response
                    .aggregation_value(&agg.name)
                    .map(val_to_string)
                    .unwrap_or_else(|| "NULL".to_string());
                println!("{} {}", format!("{}:", agg.name).white().bold(), value.cyan());
            }
        }
    }
    Ok(())
}

fn val_to_string(val: &serde_json::Value) -> String {
    match val {
        serde_json::Value::Null => "NULL".to_string(),
        serde_json::Value::Bool(b) => b.to_string(),
        serde_json::Value::Number(n) => n.to_string(),
        serde_json::Value::String(s) => s.clone(),
        _ => val.to_string(),
    }
}

fn explain_query(query: &str, cli: &Cli) -> anyhow::Result<()> {
    println!("{}", "sqles Query Explanation".cyan().bold());
    println!();
    println!("{} {}", "Query:".dimmed(), query.yellow());
    println!();

    let config = load_config(cli)?;
    let stmt = sqles::parse(query)?;

    println!("{}", "Parsed Structure:".green().bold());
    let items: Vec<String> = stmt.projection.iter().map(|i| i.to_string()).collect();
    println!("  {} {}", "Select:".dimmed(), items.join(", ").white());
    println!("  {}", "Targets:".dimmed());
    for source in &stmt.sources {
        println!("    • {}", source.to_string().white());
    }
    if let Some(pred) = &stmt.predicate {
        println!("  {} {}", "Where:".dimmed(), pred.to_string().white());
    }
    for key in &stmt.order_by {
        println!(
            "  {} {} {}",
            "Order:".dimmed(),
            key.field.white(),
            key.direction.as_str().cyan()
        );
    }
    match stmt.limit {
        Some(n) => println!("  {} {}", "Limit:".dimmed(), n.to_string().cyan()),
        None => println!("  {} {}", "Limit:".dimmed(), "server default".dimmed()),
    }

    let compiled = Compiler::new(config.fields.clone())
        .with_options(config.compile)
        .compile(query)?;

    if !compiled.notes.is_empty() {
        println!();
        println!("{}", "Notes:".yellow().bold());
        for note in &compiled.notes {
            println!("  • {}", note);
        }
    }

    println!();
    println!("{}", "Request:".green().bold());
    print_request(&compiled)
}

async fn show_fields(index: &str, cli: &Cli) -> anyhow::Result<()> {
    let config = load_config(cli)?;
    let backend = HttpBackend::new(&config.backend)?;
    let schema = backend.mapping(index).await?.merge(&config.fields);

    if schema.is_empty() {
        println!("{}", "(no mapped fields)".dimmed());
        return Ok(());
    }

    for (field, ty) in schema.entries() {
        println!("{:40} {}", field.white(), ty.to_string().cyan());
    }
    Ok(())
}

fn show_syntax() {
    println!("{}", "sqles Syntax Reference".cyan().bold());
    println!();

    let rows = [
        ("f = v", "term (exact) / match_phrase (text)"),
        ("f != v", "must_not [ f = v ]"),
        ("f > v, >=, <, <=", "range gt / gte / lt / lte"),
        ("f BETWEEN a AND b", "range gte a, lte b"),
        ("f NOT BETWEEN a AND b", "must_not [ range ]"),
        ("f IN (a, b)", "terms (exact) / should of match_phrase (text)"),
        ("f NOT IN (a, b)", "must_not [ terms ]"),
        ("f LIKE 'ab%'", "wildcard ab*"),
        ("f IS NOT MISS", "exists"),
        ("f IS MISS", "must_not [ exists ]"),
        ("a AND b", "bool filter / must"),
        ("a OR b", "bool should, minimum_should_match 1"),
        ("NOT a", "bool must_not"),
        ("SELECT a, b", "_source [a, b]"),
        ("SELECT COUNT(*)", "size 0 + value_count agg"),
        ("FROM i/t, j/t", "/i,j/t/_search"),
        ("FROM i/t, j", "/i,j/_search + _index/_type filter"),
        ("ORDER BY f DESC", "sort [ { f: desc } ]"),
        ("LIMIT [o,] n", "from o, size n"),
    ];

    println!("{:28} {}", "SQL".white().bold(), "Query DSL".white().bold());
    println!("{}", "─".repeat(72).dimmed());

    for (sql, dsl) in rows {
        println!("{:28} {}", sql.yellow(), dsl.dimmed());
    }
}
