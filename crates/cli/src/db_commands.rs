use {clap::Subcommand, std::path::PathBuf};

#[derive(Subcommand)]
pub enum DbAction {
    /// Delete all database files completely (moltis.db and memory.db).
    Reset,
    /// Clear all data from tables but keep the schema intact.
    Clear,
    /// Run all pending database migrations.
    Migrate,
}

/// Returns the paths to the database files.
fn db_paths() -> (PathBuf, PathBuf) {
    let data_dir = moltis_config::data_dir();
    let main_db = data_dir.join("moltis.db");
    let memory_db = data_dir.join("memory.db");
    (main_db, memory_db)
}

pub async fn handle_db(action: DbAction) -> anyhow::Result<()> {
    match action {
        DbAction::Reset => reset_databases().await,
        DbAction::Clear => clear_databases().await,
        DbAction::Migrate => run_migrations().await,
    }
}

/// Delete all database files completely.
async fn reset_databases() -> anyhow::Result<()> {
    let (main_db, memory_db) = db_paths();

    let mut deleted = false;

    // Also delete WAL and SHM files that SQLite may have created.
    for base in [&main_db, &memory_db] {
        for suffix in ["", "-wal", "-shm"] {
            let path = if suffix.is_empty() {
                base.clone()
            } else {
                base.with_extension(format!("db{}", suffix))
            };
            if path.exists() {
                std::fs::remove_file(&path)?;
                println!("Deleted: {}", path.display());
                deleted = true;
            }
        }
    }

    if deleted {
        println!("Database files deleted. Run `moltis db migrate` to recreate them.");
    } else {
        println!("No database files found.");
    }

    Ok(())
}

/// Clear all data from tables but keep the schema intact.
async fn clear_databases() -> anyhow::Result<()> {
    let (main_db, memory_db) = db_paths();

    // Clear main database
    if main_db.exists() {
        let db_url = format!("sqlite:{}?mode=rwc", main_db.display());
        let pool = sqlx::SqlitePool::connect(&db_url).await?;

        // Order matters due to foreign key constraints.
        // Delete from child tables first.
        let tables = [
            // Sessions/channels (depends on projects)
            "channel_sessions",
            "sessions",
            // Cron (cron_runs depends on cron_jobs)
            "cron_runs",
            "cron_jobs",
            // Gateway tables (no dependencies between them)
            "auth_sessions",
            "api_keys",
            "passkeys",
            "auth_password",
            "env_variables",
            "message_log",
            "channels",
            // Projects (other tables depend on this)
            "projects",
        ];

        for table in tables {
            // Use raw query to avoid compile-time checks
            let query = format!("DELETE FROM {table}");
            if let Err(e) = sqlx::query(&query).execute(&pool).await {
                // Table might not exist if migrations haven't run
                eprintln!("Warning: could not clear {table}: {e}");
            } else {
                println!("Cleared table: {table}");
            }
        }

        pool.close().await;
        println!("Main database cleared.");
    } else {
        println!("Main database not found: {}", main_db.display());
    }

    // Clear memory database
    if memory_db.exists() {
        let db_url = format!("sqlite:{}?mode=rwc", memory_db.display());
        let pool = sqlx::SqlitePool::connect(&db_url).await?;

        // Order matters: chunks depends on files
        let tables = ["embedding_cache", "chunks", "files"];

        for table in tables {
            let query = format!("DELETE FROM {table}");
            if let Err(e) = sqlx::query(&query).execute(&pool).await {
                eprintln!("Warning: could not clear {table}: {e}");
            } else {
                println!("Cleared table: {table}");
            }
        }

        pool.close().await;
        println!("Memory database cleared.");
    } else {
        println!("Memory database not found: {}", memory_db.display());
    }

    Ok(())
}

/// Run all pending database migrations.
async fn run_migrations() -> anyhow::Result<()> {
    let (main_db, memory_db) = db_paths();

    // Ensure data directory exists
    if let Some(parent) = main_db.parent() {
        std::fs::create_dir_all(parent)?;
    }

    // Run main database migrations
    println!("Running migrations for main database...");
    let db_url = format!("sqlite:{}?mode=rwc", main_db.display());
    let pool = sqlx::SqlitePool::connect(&db_url).await?;

    // Run migrations in dependency order (same as server.rs)
    moltis_projects::run_migrations(&pool)
        .await
        .map_err(|e| anyhow::anyhow!("projects migrations failed: {e}"))?;
    println!("  - projects migrations complete");

    moltis_sessions::run_migrations(&pool)
        .await
        .map_err(|e| anyhow::anyhow!("sessions migrations failed: {e}"))?;
    println!("  - sessions migrations complete");

    moltis_cron::run_migrations(&pool)
        .await
        .map_err(|e| anyhow::anyhow!("cron migrations failed: {e}"))?;
    println!("  - cron migrations complete");

    moltis_gateway::run_migrations(&pool)
        .await
        .map_err(|e| anyhow::anyhow!("gateway migrations failed: {e}"))?;
    println!("  - gateway migrations complete");

    pool.close().await;

    // Run memory database migrations
    println!("Running migrations for memory database...");
    let memory_url = format!("sqlite:{}?mode=rwc", memory_db.display());
    let memory_pool = sqlx::SqlitePool::connect(&memory_url).await?;

    moltis_memory::schema::run_migrations(&memory_pool)
        .await
        .map_err(|e| anyhow::anyhow!("memory migrations failed: {e}"))?;
    println!("  - memory migrations complete");

    memory_pool.close().await;

    println!("All migrations complete.");
    Ok(())
}
