//! slotdb Admin Binary
//!
//! Operator tool for inspecting and maintaining tables.

use clap::{Parser, Subcommand};
use slotdb::{paginate, record, Config, Engine, FindOptions, Record};
use tracing_subscriber::{fmt, EnvFilter};

/// slotdb admin
#[derive(Parser, Debug)]
#[command(name = "slotdb-admin")]
#[command(about = "Inspect and maintain slotdb tables")]
#[command(version)]
struct Args {
    /// Storage root
    #[arg(short, long, default_value = "./slotdb_data")]
    data_dir: String,

    /// Lock acquisition timeout in milliseconds
    #[arg(long, default_value = "5000")]
    lock_timeout_ms: u64,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Create a table, e.g. `create-table users name:50 email:100`
    CreateTable {
        table: String,
        /// Columns as name:capacity
        #[arg(required = true)]
        columns: Vec<String>,
    },

    /// Append a row, e.g. `insert users name=Alice email=a@x.com`
    Insert {
        table: String,
        /// Fields as name=value
        fields: Vec<String>,
    },

    /// Print ids of rows matching every name=pattern
    Find {
        table: String,
        fields: Vec<String>,
        #[arg(short = 'i', long)]
        case_insensitive: bool,
        #[arg(short = 'p', long)]
        partial: bool,
        #[arg(long)]
        page_size: Option<usize>,
        #[arg(long, default_value = "1")]
        page: usize,
    },

    /// Print full rows
    Get {
        table: String,
        #[arg(required = true)]
        ids: Vec<u64>,
    },

    /// Tombstone rows
    Delete {
        table: String,
        #[arg(required = true)]
        ids: Vec<u64>,
    },

    /// List tables, or show one table's schema and row counts
    Info { table: Option<String> },

    /// Decode every slot and check column alignment
    Verify { table: String },

    /// Remove tombstoned rows
    Optimise {
        table: String,
        /// Snapshot the table to backups/ first
        #[arg(long)]
        backup: bool,
    },

    /// Add a column filled with a default value
    AddColumn {
        table: String,
        name: String,
        capacity: usize,
        #[arg(long, default_value = "")]
        default: String,
    },

    /// Rename a column
    RenameColumn {
        table: String,
        old: String,
        new: String,
    },

    /// Change a column's capacity
    ResizeColumn {
        table: String,
        name: String,
        capacity: usize,
    },
}

fn main() {
    // Initialize tracing/logging
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,slotdb=debug"));

    fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();

    let config = Config::builder()
        .data_dir(&args.data_dir)
        .lock_timeout_ms(args.lock_timeout_ms)
        .build();

    let engine = match Engine::new(config) {
        Ok(e) => e,
        Err(e) => {
            tracing::error!("Failed to open storage root {}: {}", args.data_dir, e);
            std::process::exit(1);
        }
    };

    if let Err(e) = run(&engine, args.command) {
        tracing::error!("{}", e);
        std::process::exit(1);
    }
}

fn run(engine: &Engine, command: Commands) -> Result<(), Box<dyn std::error::Error>> {
    match command {
        Commands::CreateTable { table, columns } => {
            let parsed = columns
                .iter()
                .map(|c| parse_column(c))
                .collect::<Result<Vec<_>, _>>()?;
            let columns: Vec<(&str, usize)> =
                parsed.iter().map(|(n, c)| (n.as_str(), *c)).collect();
            engine.create_table(&table, &columns)?;
            println!("created {}", table);
        }
        Commands::Insert { table, fields } => {
            let table = engine.open(&table)?;
            let id = table.create(&parse_fields(&fields)?)?;
            println!("{}", id);
        }
        Commands::Find {
            table,
            fields,
            case_insensitive,
            partial,
            page_size,
            page,
        } => {
            let table = engine.open(&table)?;
            let options = FindOptions::exact()
                .case_insensitive(case_insensitive)
                .partial_match(partial);
            let mut ids = table.find(&parse_fields(&fields)?, options)?;
            if let Some(size) = page_size {
                ids = paginate(&ids, size, page)?;
            }
            for id in ids {
                println!("{}", id);
            }
        }
        Commands::Get { table, ids } => {
            let table = engine.open(&table)?;
            for row in table.get(&ids)? {
                let fields: Vec<String> = row
                    .fields
                    .iter()
                    .map(|(name, value)| format!("{}={:?}", name, value))
                    .collect();
                println!("{}\t{}", row.id, fields.join("\t"));
            }
        }
        Commands::Delete { table, ids } => {
            let table = engine.open(&table)?;
            println!("deleted {}", table.delete(&ids)?);
        }
        Commands::Info { table: None } => {
            for name in engine.table_names()? {
                println!("{}", name);
            }
        }
        Commands::Info { table: Some(name) } => {
            let table = engine.open(&name)?;
            let schema = table.schema()?;
            println!("table       {}", name);
            println!("generation  {}", schema.generation());
            println!("rows        {}", table.row_count()?);
            println!("live rows   {}", table.live_count()?);
            for column in schema.columns() {
                println!("column      {} ({} bytes, {})", column.name, column.capacity, column.file_name());
            }
        }
        Commands::Verify { table } => {
            let stats = engine.open(&table)?.verify()?;
            println!(
                "ok: {} rows ({} live) across {} columns, generation {}",
                stats.rows, stats.live_rows, stats.columns, stats.generation
            );
        }
        Commands::Optimise { table, backup } => {
            let report = engine.open(&table)?.optimise(backup)?;
            println!(
                "{} -> {} rows ({} removed)",
                report.rows_before,
                report.rows_after,
                report.rows_removed()
            );
            if let Some(dir) = report.backup_dir {
                println!("backup at {}", dir.display());
            }
        }
        Commands::AddColumn {
            table,
            name,
            capacity,
            default,
        } => {
            engine.open(&table)?.add_column(&name, capacity, &default)?;
        }
        Commands::RenameColumn { table, old, new } => {
            engine.open(&table)?.rename_column(&old, &new)?;
        }
        Commands::ResizeColumn {
            table,
            name,
            capacity,
        } => {
            engine.open(&table)?.resize_column(&name, capacity)?;
        }
    }
    Ok(())
}

/// "name:50" → ("name", 50)
fn parse_column(arg: &str) -> Result<(String, usize), String> {
    let (name, capacity) = arg
        .rsplit_once(':')
        .ok_or_else(|| format!("expected name:capacity, got '{}'", arg))?;
    let capacity = capacity
        .parse()
        .map_err(|_| format!("invalid capacity in '{}'", arg))?;
    Ok((name.to_string(), capacity))
}

/// ["name=Alice", ...] → Record
fn parse_fields(fields: &[String]) -> Result<Record, String> {
    let pairs = fields
        .iter()
        .map(|f| {
            f.split_once('=')
                .ok_or_else(|| format!("expected name=value, got '{}'", f))
        })
        .collect::<Result<Vec<_>, _>>()?;
    Ok(record(pairs))
}
