use std::env;
use std::path::{Path, PathBuf};

use coderag_core::language::{is_indexable_path, MAX_DOCUMENT_BYTES};
use coderag_core::{Config, Document};
use coderag_hybrid::Retriever;
use coderag_vector::LanceStore;
use tracing_subscriber::EnvFilter;
use walkdir::WalkDir;

// Index a source tree as a snapshot, then answer one query against it.
// Usage:
//   cargo run -p coderag-hybrid --example retrieve -- <query> \
//     [--root DIR] [--snapshot NAME] [--db DIR] [--repo LABEL] [--no-ingest]
//   APP_USE_FAKE_EMBEDDINGS=1 skips loading the embedding model.

fn collect_documents(root: &Path, repo: Option<&str>) -> Vec<Document> {
    let mut docs = Vec::new();
    for entry in WalkDir::new(root).into_iter().filter_map(|e| e.ok()) {
        if !entry.file_type().is_file() {
            continue;
        }
        let rel = entry.path().strip_prefix(root).unwrap_or(entry.path()).to_string_lossy().to_string();
        if !is_indexable_path(&rel) {
            continue;
        }
        if entry.metadata().map(|m| m.len() as usize > MAX_DOCUMENT_BYTES).unwrap_or(true) {
            continue;
        }
        let Ok(text) = std::fs::read_to_string(entry.path()) else { continue };
        let doc = Document::new(&rel, text);
        docs.push(match repo {
            Some(r) => doc.with_repository(r),
            None => doc,
        });
    }
    docs
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt().with_env_filter(EnvFilter::from_default_env()).init();

    let args: Vec<String> = env::args().skip(1).collect();
    let mut query = String::new();
    let mut root = PathBuf::from(".");
    let mut snapshot = "default".to_string();
    let mut db_dir: Option<PathBuf> = None;
    let mut repo: Option<String> = None;
    let mut ingest = true;

    let mut i = 0;
    while i < args.len() {
        let value = args.get(i + 1).cloned();
        match (args[i].as_str(), value) {
            ("--root", Some(v)) => { root = PathBuf::from(v); i += 2; }
            ("--snapshot", Some(v)) => { snapshot = v; i += 2; }
            ("--db", Some(v)) => { db_dir = Some(PathBuf::from(v)); i += 2; }
            ("--repo", Some(v)) => { repo = Some(v); i += 2; }
            ("--no-ingest", _) => { ingest = false; i += 1; }
            (s, _) if s.starts_with("--") => {
                eprintln!("Unknown or incomplete flag: {}", s);
                std::process::exit(2);
            }
            (s, _) => {
                if query.is_empty() { query = s.to_string(); }
                i += 1;
            }
        }
    }
    if query.is_empty() {
        eprintln!("Usage: cargo run -p coderag-hybrid --example retrieve -- <query> [--root DIR] [--snapshot NAME] [--db DIR]");
        std::process::exit(1);
    }

    let settings = Config::load()?.settings()?;
    let db_dir = db_dir.unwrap_or_else(|| {
        let ws_root = Path::new(env!("CARGO_MANIFEST_DIR")).ancestors().nth(2).unwrap_or(Path::new("."));
        ws_root.join("dev_data/lancedb")
    });
    let store = LanceStore::connect(&db_dir.to_string_lossy(), &settings).await?;
    let retriever = Retriever::new(store, settings)?;

    if ingest {
        let docs = collect_documents(&root, repo.as_deref());
        let report = retriever.ingest(&snapshot, &docs).await?;
        println!(
            "indexed {} documents into {} chunks ({} skipped) as '{}'",
            report.documents, report.chunks, report.skipped.len(), report.snapshot
        );
    }

    let outcome = retriever.retrieve(&query, &snapshot).await?;
    println!("reranked: {}", outcome.reranked);
    for (rank, r) in outcome.results.iter().enumerate() {
        println!(
            "{:>2}. {:.4}  {}  lines {}-{}",
            rank + 1, r.score, r.chunk.display_label(), r.chunk.start_line, r.chunk.end_line
        );
    }
    println!("sources: {}", outcome.sources().join(", "));
    Ok(())
}
