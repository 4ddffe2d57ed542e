use std::fs;
use std::io::Write;
use tempfile::TempDir;

use litsearch_core::loader::DocumentLoader;

#[test]
fn load_directory_reads_jsonl_lines() {
    let tmp = TempDir::new().unwrap();
    let dir = tmp.path();
    let file_path = dir.join("batch.jsonl");
    let mut f = fs::File::create(&file_path).unwrap();
    writeln!(f, r#"{{"id": 1, "title": "Asthma in children", "revision": 10, "source": "pubmed"}}"#).unwrap();
    writeln!(f).unwrap();
    writeln!(f, r#"{{"id": 2, "title": "Heart failure", "abstract": "Outcomes.", "year": 2019, "revision": 11, "source": "pubmed"}}"#).unwrap();

    let docs = DocumentLoader::new().load_directory(dir).expect("load");

    assert_eq!(docs.len(), 2, "blank lines are skipped");
    assert_eq!(docs[1].abstract_text, "Outcomes.");
    assert_eq!(docs[1].year, Some(2019));
}

#[test]
fn load_directory_skips_malformed_lines() {
    let tmp = TempDir::new().unwrap();
    let dir = tmp.path();
    fs::write(
        dir.join("mixed.jsonl"),
        "{\"id\": 1, \"title\": \"ok\", \"revision\": 1, \"source\": \"s\"}\nnot json\n{\"title\": \"no id\"}\n",
    )
    .unwrap();

    let docs = DocumentLoader::new().load_directory(dir).expect("load");
    assert_eq!(docs.iter().map(|d| d.id).collect::<Vec<_>>(), vec![1]);
}

#[test]
fn source_defaults_to_directory() {
    let tmp = TempDir::new().unwrap();
    let dir = tmp.path();
    fs::create_dir_all(dir.join("medline")).unwrap();
    fs::write(dir.join("medline/a.json"), r#"[{"id": 5, "title": "t", "revision": 1}, {"id": 6, "title": "u", "revision": 1, "source": "pmc"}]"#).unwrap();
    fs::write(dir.join("top.json"), r#"{"id": 7, "title": "v", "revision": 1}"#).unwrap();

    let mut docs = DocumentLoader::new().load_directory(dir).expect("load");
    docs.sort_by_key(|d| d.id);
    let sources: Vec<_> = docs.iter().map(|d| d.source.as_str()).collect();
    assert_eq!(sources, ["medline", "pmc", "misc"]);
}

#[test]
fn file_limit_two_files_limit_one() {
    let tmp = TempDir::new().unwrap();
    let dir = tmp.path();
    fs::write(dir.join("a.jsonl"), "{\"id\": 1, \"title\": \"alpha\", \"revision\": 1}\n").unwrap();
    fs::write(dir.join("b.jsonl"), "{\"id\": 2, \"title\": \"bravo\", \"revision\": 1}\n").unwrap();

    let docs = DocumentLoader::new().with_file_limit(1).load_directory(dir).expect("load limited");

    assert_eq!(docs.len(), 1, "limited to one source file");
    assert_eq!(docs[0].id, 1);
}

#[test]
fn empty_directory_yields_nothing() {
    let tmp = TempDir::new().unwrap();
    fs::write(tmp.path().join("notes.txt"), "ignored").unwrap();
    assert!(DocumentLoader::new().load_directory(tmp.path()).expect("load").is_empty());
}
