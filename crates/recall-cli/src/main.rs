// ============================================================================
// recall-db - CLI inspection tool for the memory database
// ============================================================================
// Usage:
//   recall-db stats                          Show totals and popular tags
//   recall-db list [--tag TAG] [--limit N]   List memories, newest first
//   recall-db show <ID>                      Print one memory in full
//   recall-db search <QUERY> [--limit N]     Semantic search (keyword fallback)
//   recall-db delete <ID> [--yes]            Delete a memory
//   recall-db export --format json           Export every memory as JSON
//
// The bot holds an exclusive lock on the database file while running.
// ============================================================================

use anyhow::{anyhow, Result};
use chrono::{DateTime, Utc};
use clap::{Parser, Subcommand};
use std::io::{self, BufRead, Write};
use std::sync::Arc;

use recall_core::memory::{
    EmbeddingService, Embedder, NoEmbeddings, QdrantIndex, DEFAULT_EMBEDDING_BASE_URL,
    DEFAULT_EMBEDDING_MODEL,
};
use recall_core::{Memory, MemoryDb, RetrievalEngine};

/// Memory database inspection tool
#[derive(Parser)]
#[command(name = "recall-db", version, about = "Inspect and manage the memory database")]
struct Cli {
    /// Path to the database file (default: ~/.recall/memories.redb)
    #[arg(long, global = true, env = "RECALL_DB_PATH")]
    db_path: Option<String>,

    /// Qdrant gRPC URL; keeps the vector index in step with deletions
    #[arg(long, global = true, env = "QDRANT_URL")]
    qdrant_url: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show total memories and the most used tags
    Stats {
        /// Number of tags to show
        #[arg(long, default_value = "10")]
        top: usize,
    },

    /// List memories, newest first
    List {
        /// Only memories carrying this tag
        #[arg(long)]
        tag: Option<String>,

        #[arg(long, default_value = "20")]
        limit: usize,
    },

    /// Print one memory in full
    Show { id: String },

    /// Search memories by meaning (keyword search without OPENAI_API_KEY)
    Search {
        query: String,

        #[arg(long, default_value = "5")]
        limit: usize,
    },

    /// Delete a memory
    Delete {
        id: String,

        /// Do not ask for confirmation
        #[arg(long)]
        yes: bool,
    },

    /// Export every memory as JSON
    Export {
        /// Output format (currently only json is supported)
        #[arg(long, default_value = "json")]
        format: String,
    },
}

fn format_timestamp(ts: &DateTime<Utc>) -> String {
    ts.format("%Y-%m-%d %H:%M:%S UTC").to_string()
}

/// Embedder from the environment, or none when no API key is configured
fn embedder_from_env() -> Arc<dyn Embedder> {
    match std::env::var("OPENAI_API_KEY") {
        Ok(key) if !key.trim().is_empty() => {
            let base_url = std::env::var("EMBEDDING_BASE_URL")
                .unwrap_or_else(|_| DEFAULT_EMBEDDING_BASE_URL.to_string());
            let model = std::env::var("EMBEDDING_MODEL")
                .unwrap_or_else(|_| DEFAULT_EMBEDDING_MODEL.to_string());
            Arc::new(EmbeddingService::new_custom(key, base_url, model))
        }
        _ => Arc::new(NoEmbeddings),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    let cli = Cli::parse();
    let mut db = MemoryDb::open(cli.db_path.as_deref())?;
    if let Some(url) = cli.qdrant_url.as_deref() {
        match QdrantIndex::connect(url).await {
            Ok(index) => {
                db = db.with_index(Arc::new(index));
                let pending = db.sync_index().await?;
                if pending > 0 {
                    eprintln!("Warning: {} memories not yet in the vector index", pending);
                }
            }
            Err(e) => eprintln!("Warning: Qdrant unavailable ({}), index not updated", e),
        }
    }
    let db = Arc::new(db);
    let engine = RetrievalEngine::new(db.clone(), embedder_from_env());

    match cli.command {
        Commands::Stats { top } => cmd_stats(&db, &engine, top).await,
        Commands::List { tag, limit } => cmd_list(&engine, tag, limit).await,
        Commands::Show { id } => cmd_show(&engine, &id).await,
        Commands::Search { query, limit } => cmd_search(&engine, &query, limit).await,
        Commands::Delete { id, yes } => cmd_delete(&engine, &id, yes).await,
        Commands::Export { format } => cmd_export(&db, &format),
    }
}

async fn cmd_stats(db: &MemoryDb, engine: &RetrievalEngine, top: usize) -> Result<()> {
    let stats = engine.stats(top).await?;

    println!("=== Memory Database Stats ===");
    if let Some(path) = db.path() {
        println!("Database: {}", path.display());
    }
    println!();
    println!("Memories: {} total", stats.total);
    if !stats.top_tags.is_empty() {
        println!("Top tags:");
        for tag in &stats.top_tags {
            println!("  {:20} {}", tag.tag, tag.count);
        }
    }

    Ok(())
}

fn print_table(memories: &[Memory]) {
    println!("{:<36}  {:<23}  {:<24}  {}", "ID", "CREATED AT", "TAGS", "TITLE");
    println!("{}", "-".repeat(110));

    for memory in memories {
        let tags = memory.tags.join(",").chars().take(24).collect::<String>();
        let title = memory.title.chars().take(40).collect::<String>();
        println!(
            "{:<36}  {:<23}  {:<24}  {}",
            memory.id,
            format_timestamp(&memory.created_at),
            tags,
            title
        );
    }
}

async fn cmd_list(engine: &RetrievalEngine, tag: Option<String>, limit: usize) -> Result<()> {
    let memories = match tag.as_deref() {
        Some(tag) => engine.by_tag(tag, limit).await?,
        None => engine.recent(limit).await?,
    };

    if memories.is_empty() {
        println!("No memories found.");
        return Ok(());
    }

    print_table(&memories);
    println!("\nTotal: {} memories", memories.len());
    Ok(())
}

async fn cmd_show(engine: &RetrievalEngine, id: &str) -> Result<()> {
    let memory = engine
        .get(id)
        .await?
        .ok_or_else(|| anyhow!("Memory '{}' not found", id))?;

    println!("{}", memory.title);
    println!("{}", "=".repeat(memory.title.chars().count().max(3)));
    println!("ID:      {}", memory.id);
    if !memory.tags.is_empty() {
        println!("Tags:    {}", memory.tags.join(", "));
    }
    println!("Created: {}", format_timestamp(&memory.created_at));
    println!("Vector:  {} dims", memory.embedding.len());
    println!();
    println!("{}", memory.solution);
    if !memory.context.is_empty() {
        println!("\n--- context ---\n{}", memory.context);
    }
    if !memory.code.is_empty() {
        println!("\n--- code ---\n{}", memory.code);
    }

    Ok(())
}

async fn cmd_search(engine: &RetrievalEngine, query: &str, limit: usize) -> Result<()> {
    let hits = engine.search(query, limit).await?;

    if hits.is_empty() {
        println!("No matches.");
        return Ok(());
    }

    for (i, hit) in hits.iter().enumerate() {
        let score = hit
            .score
            .map(|s| format!("{:>4.0}%", s * 100.0))
            .unwrap_or_else(|| "    -".to_string());
        println!("{:>2}. {}  {}  {}", i + 1, score, hit.memory.id, hit.memory.title);
    }
    Ok(())
}

fn confirm(prompt: &str) -> Result<bool> {
    print!("{} [y/N] ", prompt);
    io::stdout().flush()?;

    let mut answer = String::new();
    io::stdin().lock().read_line(&mut answer)?;
    Ok(matches!(answer.trim().to_lowercase().as_str(), "y" | "yes"))
}

async fn cmd_delete(engine: &RetrievalEngine, id: &str, yes: bool) -> Result<()> {
    let memory = engine
        .get(id)
        .await?
        .ok_or_else(|| anyhow!("Memory '{}' not found", id))?;

    if !yes && !confirm(&format!("Delete \"{}\"?", memory.title))? {
        println!("Aborted.");
        return Ok(());
    }

    if engine.delete(id).await? {
        println!("Deleted {}", id);
        Ok(())
    } else {
        anyhow::bail!("Could not delete '{}'", id)
    }
}

fn cmd_export(db: &MemoryDb, format: &str) -> Result<()> {
    if format != "json" {
        anyhow::bail!("Unsupported format '{}'. Only 'json' is supported.", format);
    }

    let memories: Vec<Memory> = db
        .list_all()?
        .into_iter()
        .map(Memory::without_embedding)
        .collect();

    let export = serde_json::json!({
        "exported_at": Utc::now().to_rfc3339(),
        "total": memories.len(),
        "memories": memories,
    });

    println!("{}", serde_json::to_string_pretty(&export)?);
    Ok(())
}
