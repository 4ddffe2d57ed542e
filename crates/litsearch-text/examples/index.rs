use std::env;
use std::path::{Path, PathBuf};

use litsearch_core::config::IndexSettings;
use litsearch_core::loader::DocumentLoader;
use litsearch_core::traits::Shard;
use litsearch_text::TantivyShard;

// Load .jsonl/.json documents into a single shard index, bypassing the coordinator.
// Usage:
//   cargo run -p litsearch-text --example index -- [--dir ../dev_data/docs] [--index ../dev_data/indexes/single]
// Notes:
//   - Existing indexes are appended to; newer revisions replace older copies.
//   - Defaults resolve relative to the workspace root so you can run from anywhere.

fn main() -> anyhow::Result<()> {
    let args: Vec<String> = env::args().skip(1).collect();
    let mut data_dir: Option<PathBuf> = None;
    let mut index_dir: Option<PathBuf> = None;
    let mut i = 0;
    while i < args.len() {
        match args[i].as_str() {
            "--dir" => {
                if i + 1 >= args.len() { eprintln!("--dir requires a path"); std::process::exit(2); }
                data_dir = Some(PathBuf::from(&args[i + 1]));
                i += 2; continue;
            }
            "--index" => {
                if i + 1 >= args.len() { eprintln!("--index requires a path"); std::process::exit(2); }
                index_dir = Some(PathBuf::from(&args[i + 1]));
                i += 2; continue;
            }
            s if s.starts_with('-') => {
                eprintln!("Unknown flag: {}", s); std::process::exit(2);
            }
            _ => { i += 1; }
        }
    }

    let ws_root = Path::new(env!("CARGO_MANIFEST_DIR")).ancestors().nth(2).unwrap_or(Path::new("."));
    let data_dir = data_dir
        .or_else(|| env::var("LITSEARCH_DATA_DIR").ok().map(PathBuf::from))
        .unwrap_or_else(|| ws_root.join("dev_data/docs"));
    let index_dir = index_dir
        .or_else(|| env::var("LITSEARCH_INDEX_DIR").ok().map(PathBuf::from))
        .unwrap_or_else(|| ws_root.join("dev_data/indexes/single"));

    println!("Single shard index\n==================");
    println!("Data dir : {}", data_dir.display());
    println!("Index dir: {}", index_dir.display());

    let documents = DocumentLoader::new().load_directory(&data_dir)?;
    let shard = TantivyShard::open("single", &index_dir, IndexSettings::default())?;
    let (mut added, mut skipped) = (0usize, 0usize);
    for doc in &documents {
        shard.delete_older_than(doc.id, doc.revision)?;
        if shard.has_at_least_as_new_as(doc.id, doc.revision)? { skipped += 1; continue; }
        shard.insert(doc)?;
        added += 1;
    }
    shard.commit()?;
    println!("Done. Added {} documents, {} already current, {} in index.", added, skipped, shard.size()?);
    Ok(())
}
