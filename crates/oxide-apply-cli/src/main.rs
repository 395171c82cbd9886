//! oxide-apply CLI
//!
//! Applies or previews change sets and schema operations on a SQLite
//! database.

use std::path::{Path, PathBuf};

use anyhow::Context;
use clap::{Parser, Subcommand};
use tracing::{info, warn, Level};
use tracing_subscriber::FmtSubscriber;

use oxide_apply::prelude::*;
use oxide_apply::ExecutionResult;
use oxide_apply_sqlite::SqliteConnection;

/// Apply row edits and schema changes atomically.
#[derive(Parser)]
#[command(name = "oxide-apply")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Database URL.
    #[arg(short, long, env = "DATABASE_URL", default_value = "sqlite:db.sqlite3")]
    database: String,

    /// Refuse every write.
    #[arg(long, env = "OXIDE_READ_ONLY")]
    read_only: bool,

    /// Schema used when an entry names none.
    #[arg(short, long)]
    schema: Option<String>,

    /// Session configuration file (JSON).
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Enable verbose output.
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Apply a batch read from a JSON file.
    Apply {
        /// Batch file.
        file: PathBuf,

        /// Show SQL without executing.
        #[arg(long)]
        dry_run: bool,
    },

    /// Show the SQL a batch file would run.
    Render {
        /// Batch file.
        file: PathBuf,
    },

    /// List tables.
    Tables,

    /// List the columns of a table.
    Columns {
        /// Table name.
        table: String,
    },

    /// Drop a table.
    DropTable {
        /// Table name.
        table: String,
    },

    /// Remove every row of a table.
    TruncateTable {
        /// Table name.
        table: String,
    },

    /// Copy a table with its rows.
    DuplicateTable {
        /// Source table.
        table: String,

        /// Name of the copy.
        new_name: String,

        /// Show SQL without executing.
        #[arg(long)]
        sql: bool,
    },

    /// Rename a table.
    RenameTable {
        /// Current name.
        table: String,

        /// New name.
        new_name: String,
    },

    /// Create an index.
    CreateIndex {
        /// Table name.
        table: String,

        /// Index name.
        name: String,

        /// Indexed columns, comma separated.
        #[arg(short = 'C', long, value_delimiter = ',', required = true)]
        columns: Vec<String>,

        /// Create a unique index.
        #[arg(short, long)]
        unique: bool,
    },

    /// Drop an index.
    DropIndex {
        /// Table the index belongs to.
        table: String,

        /// Index name.
        name: String,
    },

    /// Create a database.
    CreateDatabase {
        /// Database name.
        name: String,
    },

    /// Drop a database.
    DropDatabase {
        /// Database name.
        name: String,
    },

    /// Run a SQL statement and print its rows.
    Query {
        /// SQL text.
        sql: String,
    },
}

fn load_config(cli: &Cli) -> anyhow::Result<SessionConfig> {
    let mut config = match cli.config {
        Some(ref path) => SessionConfig::from_file(path)?,
        None => SessionConfig::new(DialectKind::Sqlite),
    };
    if let Some(ref schema) = cli.schema {
        config.default_schema = Some(schema.clone());
    }
    if cli.read_only {
        config.read_only = true;
    }
    check_dialect(config.dialect, &cli.command)?;
    Ok(config)
}

/// Only SQLite can be executed against. Other dialects may still be
/// rendered from the SQLite schema.
fn check_dialect(dialect: DialectKind, command: &Commands) -> anyhow::Result<()> {
    if dialect == DialectKind::Sqlite {
        return Ok(());
    }
    let renders_only = matches!(
        command,
        Commands::Render { .. }
            | Commands::Apply { dry_run: true, .. }
            | Commands::DuplicateTable { sql: true, .. }
    );
    if !renders_only {
        anyhow::bail!(
            "dialect '{dialect}' can only be rendered; this tool executes against SQLite"
        );
    }
    info!(%dialect, "Rendering for a dialect other than the connected one");
    Ok(())
}

fn load_batch(path: &Path) -> anyhow::Result<Batch> {
    let json = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read {}", path.display()))?;
    serde_json::from_str(&json).with_context(|| format!("Invalid batch in {}", path.display()))
}

fn report(result: &ExecutionResult) {
    info!(
        statements = result.rows_affected.len(),
        rows = result.total_rows(),
        "Applied"
    );
    for origin in result.unmatched() {
        warn!(op = %origin.phase, index = origin.index, "No row matched");
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Setup logging
    let log_level = if cli.verbose {
        Level::DEBUG
    } else {
        Level::INFO
    };
    let subscriber = FmtSubscriber::builder()
        .with_max_level(log_level)
        .with_target(false)
        .without_time()
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    let config = load_config(&cli)?;
    let conn = SqliteConnection::connect(&cli.database)
        .await
        .with_context(|| format!("Failed to open {}", cli.database))?;
    let mut session = Session::new(conn, config);

    match cli.command {
        Commands::Apply { ref file, dry_run } => {
            let batch = load_batch(file)?;
            if dry_run {
                info!("Dry run mode - SQL will be printed but not executed.");
                println!("{}", session.render(&batch).await?);
            } else {
                report(&session.apply(&batch).await?);
            }
        }
        Commands::Render { ref file } => {
            let batch = load_batch(file)?;
            println!("{}", session.render(&batch).await?);
        }
        Commands::Tables => {
            for table in session.list_tables(None).await? {
                println!("{}", table.name);
            }
        }
        Commands::Columns { ref table } => {
            let meta = session.table_metadata(None, table).await?;
            for column in &meta.columns {
                let mut flags = Vec::new();
                if meta.primary_key_columns.contains(&column.name) {
                    flags.push("primary key");
                }
                if !column.nullable {
                    flags.push("not null");
                }
                if column.generated {
                    flags.push("generated");
                }
                println!("{}\t{}\t{}", column.name, column.data_type, flags.join(", "));
            }
        }
        Commands::DropTable { ref table } => report(&session.drop_table(None, table).await?),
        Commands::TruncateTable { ref table } => {
            report(&session.truncate_table(None, table).await?);
        }
        Commands::DuplicateTable {
            ref table,
            ref new_name,
            sql,
        } => {
            if sql {
                println!("{}", session.duplicate_table_sql(None, table, new_name).await?);
            } else {
                report(&session.duplicate_table(None, table, new_name).await?);
            }
        }
        Commands::RenameTable {
            ref table,
            ref new_name,
        } => report(&session.rename_table(None, table, new_name).await?),
        Commands::CreateIndex {
            ref table,
            ref name,
            ref columns,
            unique,
        } => {
            let columns: Vec<&str> = columns.iter().map(String::as_str).collect();
            report(
                &session
                    .create_index(None, table, name, &columns, unique)
                    .await?,
            );
        }
        Commands::DropIndex {
            ref table,
            ref name,
        } => report(&session.drop_index(None, table, name).await?),
        Commands::CreateDatabase { ref name } => report(&session.create_database(name).await?),
        Commands::DropDatabase { ref name } => report(&session.drop_database(name).await?),
        Commands::Query { ref sql } => {
            let result = session.query(sql, &[]).await?;
            println!("{}", result.columns.join("\t"));
            for row in &result.rows {
                println!("{}", serde_json::to_string(row)?);
            }
        }
    }

    session.close().await?;
    Ok(())
}
