use std::env;

use anyhow::{anyhow, bail, Result};
use serde::Serialize;

use litsearch_cli::{init_tracing, open_coordinator};
use litsearch_core::config::Config;
use litsearch_core::query::{FacetFilter, SearchQuery};

const USAGE: &str = "Usage: litsearch <query|facets|doc|batch|ngrams|discover|size> [args...]
  query \"<text>\" [--field F] [--facet dim=value]... [--skip N] [--top N] [--fdim N]
  facets [\"<text>\"] [--facet dim=value]...
  doc <id>
  batch <id,id,...>
  ngrams \"<text>\" [--fdim N]
  discover \"<topic A>\" \"<topic B>\"
  size";

/// Positional arguments and `--flag value` options, in order.
struct Args {
    positional: Vec<String>,
    field: Option<String>,
    facets: Vec<String>,
    skip: usize,
    top: Option<usize>,
    fdim: Option<usize>,
}

fn number(flag: &str, value: Option<&String>) -> Result<usize> {
    value
        .ok_or_else(|| anyhow!("{flag} requires a number"))?
        .parse::<usize>()
        .map_err(|e| anyhow!("{flag}: {e}"))
}

fn parse_args(args: &[String]) -> Result<Args> {
    let mut parsed = Args { positional: Vec::new(), field: None, facets: Vec::new(), skip: 0, top: None, fdim: None };
    let mut i = 0;
    while i < args.len() {
        match args[i].as_str() {
            "--field" => { parsed.field = Some(args.get(i + 1).cloned().ok_or_else(|| anyhow!("--field requires a name"))?); i += 1; }
            "--facet" => { parsed.facets.push(args.get(i + 1).cloned().ok_or_else(|| anyhow!("--facet requires dim=value"))?); i += 1; }
            "--skip" => { parsed.skip = number("--skip", args.get(i + 1))?; i += 1; }
            "--top" => { parsed.top = Some(number("--top", args.get(i + 1))?); i += 1; }
            "--fdim" => { parsed.fdim = Some(number("--fdim", args.get(i + 1))?); i += 1; }
            flag if flag.starts_with("--") => bail!("unknown option {flag}"),
            _ => parsed.positional.push(args[i].clone()),
        }
        i += 1;
    }
    Ok(parsed)
}

fn print<T: Serialize + ?Sized>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();
    let config = Config::load().map_err(|e| { eprintln!("Error loading config: {}", e); e })?;
    let mut argv: Vec<String> = env::args().skip(1).collect();
    if argv.is_empty() { eprintln!("{USAGE}"); std::process::exit(1); }
    let cmd = argv.remove(0);
    let args = parse_args(&argv)?;
    let coordinator = open_coordinator(&config)?;
    let settings = coordinator.settings().clone();

    let build_query = |text: Option<&String>| -> Result<SearchQuery> {
        let mut facets = FacetFilter::new();
        for spec in &args.facets {
            facets.select_spec(spec, |dim| settings.index.is_hierarchical(dim))?;
        }
        let query = match (&args.field, text) {
            (Some(field), Some(value)) => SearchQuery::field(field, value),
            (Some(field), None) => bail!("--field {field} needs a value"),
            (None, Some(text)) => SearchQuery::free_text(text),
            (None, None) if !facets.is_empty() => SearchQuery::drilldown(FacetFilter::new()),
            (None, None) => SearchQuery::all(),
        };
        Ok(query
            .with_facets(facets)
            .with_page(args.skip, args.top.unwrap_or(settings.max_hits))
            .with_fdim(args.fdim.unwrap_or(settings.default_fdim))
            .with_slop(settings.default_slop))
    };

    match cmd.as_str() {
        "query" => {
            let query = build_query(args.positional.first())?;
            print(coordinator.execute(&query).await?.as_ref())?;
        }
        "facets" => {
            let result = if args.positional.is_empty() && args.facets.is_empty() {
                coordinator.all_facets().await?
            } else {
                coordinator.facets(&build_query(args.positional.first())?).await?
            };
            print(&result.facets)?;
        }
        "doc" => {
            let id: u64 = args.positional.first().ok_or_else(|| anyhow!("doc requires an id"))?.parse()?;
            match coordinator.fetch_by_id(id).await? {
                Some(doc) => print(&doc)?,
                None => { eprintln!("No document with id {id}"); std::process::exit(2); }
            }
        }
        "batch" => {
            let raw = args.positional.first().ok_or_else(|| anyhow!("batch requires a comma-separated id list"))?;
            let ids = raw.split(',').map(|s| s.trim().parse::<u64>()).collect::<Result<Vec<_>, _>>()?;
            print(coordinator.fetch_batch(&ids).await?.as_ref())?;
        }
        "ngrams" => {
            let query = build_query(args.positional.first())?;
            print(coordinator.ngram_values(&query).await?.as_ref())?;
        }
        "discover" => {
            let (Some(a), Some(b)) = (args.positional.first(), args.positional.get(1)) else {
                bail!("discover requires two topics");
            };
            let terms = coordinator.common_disconnected(&build_query(Some(a))?, &build_query(Some(b))?).await?;
            print(terms.as_ref())?;
        }
        "size" => println!("{}", coordinator.size().await?),
        _ => { eprintln!("Unknown command: {}\n{USAGE}", cmd); std::process::exit(1); }
    }
    Ok(())
}
