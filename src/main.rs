//! Program that converts query-by-example definitions to SQL.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use tracing::debug;

use qbe2sql::codec;
use qbe2sql::query::QueryDefinition;
use qbe2sql::schema::{self, Schema};
use qbe2sql::sql::{self, Style};
use qbe2sql::tier::{self, Tier};

#[derive(Parser, Debug)]
#[command(name = "qbe2sql", version)]
#[command(about = "Read, rewrite and render query-by-example definitions")]
struct Cli {
    /// Log debug output to stderr
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Validate a schema and print it back in canonical form
    Schema {
        /// Schema XML file
        #[arg(short, long)]
        schema: PathBuf,
    },
    /// Print a query definition back in canonical form
    Fmt {
        /// Schema XML file
        #[arg(short, long)]
        schema: PathBuf,
        /// Query XML file
        #[arg(short, long)]
        query: PathBuf,
    },
    /// Render a query definition as SQL
    Sql {
        /// Schema XML file
        #[arg(short, long)]
        schema: PathBuf,
        /// Query XML file
        #[arg(short, long)]
        query: PathBuf,
        /// Use SELECT DISTINCT
        #[arg(long)]
        distinct: bool,
        /// Put each clause on its own line
        #[arg(long)]
        pretty: bool,
    },
    /// Move a query definition to another builder tier
    Tier {
        /// Schema XML file
        #[arg(short, long)]
        schema: PathBuf,
        /// Query XML file
        #[arg(short, long)]
        query: PathBuf,
        /// Target tier
        #[arg(long, value_enum)]
        to: TierArg,
    },
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum TierArg {
    /// Flat rows with one connective and implicit joins
    Standard,
    /// Flat rows with explicit joins
    Intermediate,
    /// Arbitrary WHERE tree
    Advanced,
}

impl From<TierArg> for Tier {
    fn from(arg: TierArg) -> Self {
        match arg {
            TierArg::Standard => Tier::Standard,
            TierArg::Intermediate => Tier::Intermediate,
            TierArg::Advanced => Tier::Advanced,
        }
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    setup_tracing(cli.verbose);

    match cli.command {
        Command::Schema { schema } => {
            let schema = load_schema(&schema)?;
            print!("{}", schema::emit(&schema));
        }
        Command::Fmt { schema, query } => {
            let schema = load_schema(&schema)?;
            let def = load_query(&schema, &query)?;
            print!("{}", codec::emit(&def));
        }
        Command::Sql {
            schema,
            query,
            distinct,
            pretty,
        } => {
            let schema = load_schema(&schema)?;
            let def = load_query(&schema, &query)?;
            let style = Style { distinct, pretty };
            match sql::to_sql_with(&schema, &def, style) {
                Some(text) => println!("{}", text),
                None => bail!("no displayed fields in {}", query.display()),
            }
        }
        Command::Tier { schema, query, to } => {
            let schema = load_schema(&schema)?;
            let def = load_query(&schema, &query)?;
            let from = if def.is_advanced {
                Tier::Advanced
            } else {
                Tier::Intermediate
            };
            let state = tier::build(&schema, &def, from)
                .with_context(|| format!("cannot load {} at the {} tier", query.display(), from))?;
            let state = state.switch(&schema, to.into())?;
            debug!(tier = %state.tier(), "switched tier");
            print!("{}", codec::emit(&state.fill(&schema)));
        }
    }
    Ok(())
}

/// Initializes logging to stderr, honoring `RUST_LOG` unless `verbose`.
fn setup_tracing(verbose: bool) {
    use tracing_subscriber::EnvFilter;

    let filter = if verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"))
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

fn load_schema(path: &Path) -> Result<Schema> {
    let text = fs::read_to_string(path)
        .with_context(|| format!("failed to read schema {}", path.display()))?;
    schema::parse(&text).with_context(|| format!("invalid schema {}", path.display()))
}

fn load_query(schema: &Schema, path: &Path) -> Result<QueryDefinition> {
    let text = fs::read_to_string(path)
        .with_context(|| format!("failed to read query {}", path.display()))?;
    codec::parse(schema, &text).with_context(|| format!("invalid query {}", path.display()))
}
