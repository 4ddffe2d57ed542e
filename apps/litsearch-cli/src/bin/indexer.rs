use std::{env, path::PathBuf};

use indicatif::{ProgressBar, ProgressStyle};

use litsearch_cli::{index_dir, init_tracing, open_coordinator};
use litsearch_coordinator::IngestReport;
use litsearch_core::config::{expand_path, Config};
use litsearch_core::loader::DocumentLoader;

const BATCH_SIZE: usize = 1000;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
	init_tracing();
	let config = Config::load().map_err(|e| { eprintln!("Error loading config: {}", e); e })?;
	let args: Vec<String> = env::args().skip(1).collect();
	let mut data_dir = None; let mut file_limit = None;
	let mut i = 0; while i < args.len() { match args[i].as_str() {
		"--limit" => { match args.get(i + 1).and_then(|v| v.parse::<usize>().ok()) { Some(limit) => { file_limit = Some(limit); i += 1; } None => { eprintln!("Error: --limit requires a number"); std::process::exit(1); } } }
		_ if !args[i].starts_with('-') => data_dir = Some(PathBuf::from(&args[i])), _ => {} } i += 1; }
	let data_dir = data_dir.unwrap_or_else(|| { let dir: String = config.get("data.raw_docs_dir").unwrap_or_else(|_| "../dev_data/docs".to_string()); expand_path(dir) });
	println!("litsearch indexer\n=================");
	println!("Data directory: {}", data_dir.display());
	println!("Index directory: {}", index_dir(&config).display());

	let loader = match file_limit { Some(limit) => DocumentLoader::new().with_file_limit(limit), None => DocumentLoader::new() };
	let documents = loader.load_directory(&data_dir)?;
	if documents.is_empty() { println!("No documents to index"); return Ok(()); }
	let coordinator = open_coordinator(&config)?;

	let pb = ProgressBar::new(documents.len() as u64);
	pb.set_style(ProgressStyle::default_bar().template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} documents ({percent}%) {msg}")?.progress_chars("#>-"));
	let mut total = IngestReport::default();
	for batch in documents.chunks(BATCH_SIZE) {
		let report = coordinator.update(batch.to_vec()).await?;
		pb.inc(batch.len() as u64);
		pb.set_message(format!("{} inserted, {} failed", total.inserted.len() + report.inserted.len(), total.failed.len() + report.failed.len()));
		total.deleted_older += report.deleted_older;
		total.already_current.extend(report.already_current);
		total.inserted.extend(report.inserted);
		total.failed.extend(report.failed);
	}
	pb.finish_with_message("✅ indexing completed");

	println!("📊 Inserted {} documents", total.inserted.len());
	println!("📊 Replaced {} stale copies, {} already current", total.deleted_older, total.already_current.len());
	if !total.failed.is_empty() {
		println!("⚠️  {} documents failed:", total.failed.len());
		for (id, reason) in &total.failed { println!("  {id}: {reason}"); }
	}
	println!("📊 Corpus size: {}", coordinator.size().await?);
	println!("\n💡 To search, use: cargo run --bin litsearch query '<text>'");
	Ok(())
}
