use clap::Subcommand;

#[derive(Subcommand)]
pub enum MemoryAction {
    /// Search memories using keyword (FTS5) search.
    Search {
        /// The search query.
        query: String,
        /// Maximum number of results to return.
        #[arg(long, default_value_t = 5)]
        limit: usize,
        /// Output results as JSON for scripting.
        #[arg(long, default_value_t = false)]
        json: bool,
    },
    /// Show memory system status (files, chunks, database size).
    Status,
}

pub async fn handle_memory(action: MemoryAction) -> anyhow::Result<()> {
    match action {
        MemoryAction::Search { query, limit, json } => search_memory(&query, limit, json).await,
        MemoryAction::Status => show_status().await,
    }
}

/// Resolve the memory.db path using the data directory.
fn memory_db_path() -> std::path::PathBuf {
    moltis_config::data_dir().join("memory.db")
}

/// Open a read-only SQLite connection pool to memory.db.
async fn open_memory_pool() -> anyhow::Result<sqlx::SqlitePool> {
    let db_path = memory_db_path();
    if !db_path.exists() {
        anyhow::bail!(
            "Memory database not found at {}. Start the gateway first to index memories.",
            db_path.display()
        );
    }
    let db_url = format!("sqlite:{}?mode=ro", db_path.display());
    let pool = sqlx::SqlitePool::connect(&db_url).await?;
    Ok(pool)
}

async fn search_memory(query: &str, limit: usize, json: bool) -> anyhow::Result<()> {
    let pool = open_memory_pool().await?;
    let store = moltis_memory::store_sqlite::SqliteMemoryStore::new(pool);
    let results = moltis_memory::search::keyword_only_search(&store, query, limit).await?;

    if results.is_empty() {
        if json {
            println!("[]");
        } else {
            println!("No results found.");
        }
        return Ok(());
    }

    if json {
        print_json(&results)?;
    } else {
        print_human(&results);
    }

    Ok(())
}

fn print_json(results: &[moltis_memory::search::SearchResult]) -> anyhow::Result<()> {
    let items: Vec<serde_json::Value> = results
        .iter()
        .map(|r| {
            serde_json::json!({
                "score": r.score,
                "path": r.path,
                "start_line": r.start_line,
                "end_line": r.end_line,
                "text": r.text,
            })
        })
        .collect();
    println!("{}", serde_json::to_string_pretty(&items)?);
    Ok(())
}

fn print_human(results: &[moltis_memory::search::SearchResult]) {
    for (i, r) in results.iter().enumerate() {
        if i > 0 {
            println!();
        }
        println!(
            "[{:.2}] {} (lines {}-{})",
            r.score, r.path, r.start_line, r.end_line
        );
        // Indent the text snippet
        let snippet = r.text.trim();
        let preview: String = snippet.chars().take(200).collect();
        for line in preview.lines() {
            println!("  {line}");
        }
        if snippet.len() > 200 {
            println!("  ...");
        }
    }
}

async fn show_status() -> anyhow::Result<()> {
    let db_path = memory_db_path();
    if !db_path.exists() {
        println!("Memory database not found at {}.", db_path.display());
        println!("Start the gateway to begin indexing memories.");
        return Ok(());
    }

    let pool = open_memory_pool().await?;
    let store = moltis_memory::store_sqlite::SqliteMemoryStore::new(pool);

    let config = moltis_memory::config::MemoryConfig {
        db_path: db_path.to_string_lossy().to_string(),
        ..Default::default()
    };
    let manager = moltis_memory::manager::MemoryManager::keyword_only(config, Box::new(store));
    let status = manager.status().await?;

    println!("Memory status:");
    println!("  Files:           {}", status.total_files);
    println!("  Chunks:          {}", status.total_chunks);
    println!("  Embedding model: {}", status.embedding_model);
    println!("  Database size:   {}", status.db_size_display());
    println!("  Database path:   {}", db_path.display());

    Ok(())
}
