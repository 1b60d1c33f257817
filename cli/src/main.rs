use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};
use colored::Colorize;
use rusqlite::Connection;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::filter::LevelFilter;

#[derive(Debug, Parser)]
#[command(name = "calljmp")]
#[command(about = "Developer CLI for the calljmp mobile backend")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Database schema and migration operations.
    Database(DatabaseArgs),
}

#[derive(Debug, Args)]
struct DatabaseArgs {
    #[command(subcommand)]
    operation: DatabaseOperation,
}

#[derive(Debug, Subcommand)]
enum DatabaseOperation {
    /// Preview the SQL that would migrate the database to the target schema.
    Plan(PlanArgs),
    /// Migrate the database to the target schema in one transaction.
    Apply(ApplyArgs),
    /// Write the pending schema changes as a new migration file.
    New(NewArgs),
    /// Run pending migration files against the database.
    Migrate(MigrateArgs),
    /// Show applied, pending, and modified migrations.
    Status(StatusArgs),
    /// Push the target schema to the control plane.
    Push(PushArgs),
}

#[derive(Debug, Args)]
struct PlanArgs {
    /// Database file path.
    #[arg(long)]
    db: PathBuf,
    /// Directory containing the target schema .sql files.
    #[arg(long, default_value = "schema")]
    schema: PathBuf,
}

#[derive(Debug, Args)]
struct ApplyArgs {
    /// Database file path.
    #[arg(long)]
    db: PathBuf,
    /// Directory containing the target schema .sql files.
    #[arg(long, default_value = "schema")]
    schema: PathBuf,
}

#[derive(Debug, Args)]
struct NewArgs {
    /// Database file path.
    #[arg(long)]
    db: PathBuf,
    /// Directory containing the target schema .sql files.
    #[arg(long, default_value = "schema")]
    schema: PathBuf,
    /// Directory the migration file is written to.
    #[arg(long, default_value = "migrations")]
    migrations: PathBuf,
    /// Migration name (letters, digits, '-' and '_').
    name: String,
    /// Use a Unix-seconds prefix instead of the next sequential number.
    #[arg(long)]
    timestamp: bool,
}

#[derive(Debug, Args)]
struct MigrateArgs {
    /// Database file path.
    #[arg(long)]
    db: PathBuf,
    /// Directory containing versioned migration files.
    #[arg(long, default_value = "migrations")]
    migrations: PathBuf,
}

#[derive(Debug, Args)]
struct StatusArgs {
    /// Database file path.
    #[arg(long)]
    db: PathBuf,
    /// Directory containing versioned migration files.
    #[arg(long, default_value = "migrations")]
    migrations: PathBuf,
}

#[derive(Debug, Args)]
struct PushArgs {
    /// Directory containing the target schema .sql files.
    #[arg(long, default_value = "schema")]
    schema: PathBuf,
    /// Control-plane API root.
    #[arg(long, default_value = "https://api.calljmp.com/v1")]
    api_url: String,
    /// API token; falls back to the CALLJMP_API_TOKEN environment variable.
    #[arg(long)]
    token: Option<String>,
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::builder()
                .with_default_directive(LevelFilter::WARN.into())
                .from_env_lossy(),
        )
        .init();

    let cli = Cli::parse();

    let result = match cli.command {
        Command::Database(args) => match args.operation {
            DatabaseOperation::Plan(a) => run_plan(a),
            DatabaseOperation::Apply(a) => run_apply(a),
            DatabaseOperation::New(a) => run_new(a),
            DatabaseOperation::Migrate(a) => run_migrate(a),
            DatabaseOperation::Status(a) => run_status(a),
            DatabaseOperation::Push(a) => run_push(a),
        },
    };

    if let Err(err) = result {
        eprintln!("error: {err}");
        std::process::exit(1);
    }
}

fn open_db(path: &PathBuf) -> Result<Connection, String> {
    let conn = Connection::open(path)
        .map_err(|e| format!("Failed to open database '{}': {e}", path.display()))?;
    conn.execute_batch("PRAGMA foreign_keys = ON;")
        .map_err(|e| format!("Failed to enable foreign keys: {e}"))?;
    Ok(conn)
}

fn plan_for(conn: &Connection, schema_dir: &PathBuf) -> Result<calljmp_sqlite::MigrationPlan, String> {
    let target = calljmp_db::load_schema_sql(schema_dir)
        .map_err(|e| format!("Failed to load schema from '{}': {e}", schema_dir.display()))?;
    calljmp_sqlite::plan_against(conn, &target).map_err(|e| format!("Planning failed: {e}"))
}

fn run_plan(args: PlanArgs) -> Result<(), String> {
    let conn = open_db(&args.db)?;
    let plan = plan_for(&conn, &args.schema)?;
    if plan.is_empty() {
        println!("{}", "Database schema is up to date.".green());
        return Ok(());
    }
    for line in calljmp_sqlite::render_plan(&plan, true) {
        if line.starts_with("--") {
            println!("{}", line.dimmed());
        } else {
            println!("{line}");
        }
    }
    Ok(())
}

fn run_apply(args: ApplyArgs) -> Result<(), String> {
    let mut conn = open_db(&args.db)?;
    let plan = plan_for(&conn, &args.schema)?;
    if plan.is_empty() {
        println!("{}", "Database schema is up to date.".green());
        return Ok(());
    }

    let steps = plan.steps.len();
    let tx = conn
        .transaction()
        .map_err(|e| format!("Failed to start transaction: {e}"))?;
    calljmp_sqlite::apply(&tx, &plan).map_err(|e| format!("Migration failed: {e}"))?;
    calljmp_sqlite::check_foreign_keys(&tx).map_err(|e| e.to_string())?;
    tx.commit()
        .map_err(|e| format!("Failed to commit migration: {e}"))?;

    println!(
        "{}",
        format!("✓ Applied {steps} step(s) to '{}'.", args.db.display()).green()
    );
    Ok(())
}

fn run_new(args: NewArgs) -> Result<(), String> {
    let conn = open_db(&args.db)?;
    let plan = plan_for(&conn, &args.schema)?;
    if plan.is_empty() {
        println!("{}", "No schema changes; nothing to write.".green());
        return Ok(());
    }

    let file_name = if args.timestamp {
        calljmp_db::timestamp_file_name(&args.name)
    } else {
        let existing = calljmp_db::load_migrations(&args.migrations)
            .map_err(|e| format!("Failed to read '{}': {e}", args.migrations.display()))?;
        calljmp_db::sequential_file_name(calljmp_db::next_version(&existing), &args.name)
    }
    .map_err(|e| e.to_string())?;

    let script = compose_migration_script(&calljmp_sqlite::render_plan(&plan, true));
    let path = calljmp_db::write_migration(&args.migrations, &file_name, &script)
        .map_err(|e| format!("Failed to write migration: {e}"))?;
    println!("{}", format!("✓ Wrote {}", path.display()).green());
    Ok(())
}

fn run_migrate(args: MigrateArgs) -> Result<(), String> {
    let mut conn = open_db(&args.db)?;
    let files = calljmp_db::load_migrations(&args.migrations)
        .map_err(|e| format!("Failed to read '{}': {e}", args.migrations.display()))?;
    if files.is_empty() {
        println!("No migration files in '{}'.", args.migrations.display());
        return Ok(());
    }

    let report = calljmp_sqlite::run_migrations(&mut conn, &files, calljmp_sqlite::MIGRATIONS_TABLE)
        .map_err(|e| format!("Migration run failed: {e}"))?;
    println!(
        "{} applied, {} skipped, {} modified",
        report.applied, report.skipped, report.tampered
    );
    Ok(())
}

fn run_status(args: StatusArgs) -> Result<(), String> {
    let conn = open_db(&args.db)?;
    let applied = calljmp_sqlite::applied_hashes(&conn, calljmp_sqlite::MIGRATIONS_TABLE)
        .map_err(|e| format!("Failed to read migration history: {e}"))?;
    let files = calljmp_db::load_migrations(&args.migrations)
        .map_err(|e| format!("Failed to read '{}': {e}", args.migrations.display()))?;

    if files.is_empty() && applied.is_empty() {
        println!("No migrations found.");
        return Ok(());
    }

    let mut pending = 0usize;
    for file in &files {
        let hash = calljmp_db::sha256_hex(file.content.as_bytes());
        let line = format!("{}: {}", file.version, file.name);
        match applied.get(&file.name) {
            Some(recorded) if *recorded == hash => println!("  {} {line}", "applied ".green()),
            Some(_) => println!("  {} {line}", "modified".red()),
            None => {
                pending += 1;
                println!("  {} {line}", "pending ".yellow());
            }
        }
    }
    if pending > 0 {
        println!("\nRun {} to apply pending migrations.", "calljmp database migrate".cyan());
    }
    Ok(())
}

fn run_push(args: PushArgs) -> Result<(), String> {
    let sql = calljmp_db::load_schema_sql(&args.schema)
        .map_err(|e| format!("Failed to load schema from '{}': {e}", args.schema.display()))?;
    let token = args
        .token
        .or_else(|| std::env::var("CALLJMP_API_TOKEN").ok())
        .ok_or_else(|| "No API token: pass --token or set CALLJMP_API_TOKEN".to_string())?;

    let client = calljmp_remote::RemoteClient::new(calljmp_remote::RemoteConfig {
        base_url: args.api_url,
        token,
    })
    .map_err(|e| format!("Failed to build HTTP client: {e}"))?;
    client
        .push_schema(&sql)
        .map_err(|e| format!("Push failed: {e}"))?;

    println!("{}", "✓ Schema pushed.".green());
    Ok(())
}

/// Joins rendered plan lines into a migration script, terminating each
/// executable statement with a semicolon while leaving comments and
/// blank separator lines as they are.
fn compose_migration_script(lines: &[String]) -> String {
    let mut script = String::new();
    for line in lines {
        if line.is_empty() || line.starts_with("--") {
            script.push_str(line);
        } else {
            script.push_str(line);
            script.push(';');
        }
        script.push('\n');
    }
    script
}
