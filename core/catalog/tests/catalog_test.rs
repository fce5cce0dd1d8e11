use anyhow::Result;
use labeled_files_catalog::{
    Config, Database, IntakeRequest, Session, TreeQuery, DB_FILE_NAME, DEFAULT_SEARCH_LIMIT,
};
use labeled_files_hierarchy::{DisplayNode, OutlineStyle};
use labeled_files_schemas::{FileId, PathKind};
use tempfile::TempDir;

fn request(location: &str, tags: &[&str]) -> IntakeRequest {
    IntakeRequest {
        location: location.to_string(),
        kind: Some(PathKind::File),
        tags: tags.iter().map(|t| t.to_string()).collect(),
        ..IntakeRequest::default()
    }
}

fn find<'a>(rows: &'a [DisplayNode], path: &str) -> Option<&'a DisplayNode> {
    rows.iter()
        .flat_map(|row| row.walk())
        .find(|row| row.path == path)
}

#[test]
fn test_catalog_workflow() -> Result<()> {
    let dir = TempDir::new()?;
    let config = Config::from_json(&format!(
        r#"{{"default": "main", "workspaces": {{"main": "{}"}}, "tree_expand_threshold": 5}}"#,
        dir.path().display()
    ))?;
    let db_path = config.database_path(None)?.unwrap();
    assert_eq!(db_path, dir.path().join(DB_FILE_NAME));

    let session = Session::open(&db_path, config)?;

    println!("Step 1: add records");
    session.add(request("/srv/docs/q1.pdf", &["work/reports/2024", "finance"]))?;
    session.add(request("/srv/docs/q2.pdf", &["work/reports/2024"]))?;
    session.add(request("/srv/docs/notes.md", &["work/notes"]))?;
    session.add(IntakeRequest {
        location: "https://example.com/budget".to_string(),
        tags: vec!["finance/budget".to_string()],
        ..IntakeRequest::default()
    })?;
    assert_eq!(session.db.count_files()?, 4);

    println!("Step 2: tag tree over the whole catalog");
    let rows = session.tag_tree(&TreeQuery::default())?;
    let work = find(&rows, "work").unwrap();
    assert_eq!(work.count, 3);
    assert!(work.expand_hint);
    let reports = find(&rows, "work/reports/2024").unwrap();
    assert_eq!(reports.display_label, "reports/2024");
    assert_eq!(reports.count, 2);
    assert_eq!(find(&rows, "finance").unwrap().count, 2);

    println!("Step 3: filter composition");
    let now = chrono::Utc::now();
    let filters = vec!["work".to_string(), "finance".to_string()];
    let listing = session.search(None, &filters, DEFAULT_SEARCH_LIMIT, now)?;
    assert_eq!(listing.lines().count(), 1);
    assert!(listing.contains("q1.pdf"));

    let listing = session.search(None, &["work/rep".to_string()], DEFAULT_SEARCH_LIMIT, now)?;
    assert_eq!(listing, "No files found");

    println!("Step 4: visiting moves a record and its tags to the front");
    let notes = session.db.search_files(Some("notes"), &[], 1)?[0].id.unwrap();
    session.visit(notes)?;
    let rows = session.tag_tree(&TreeQuery::default())?;
    assert_eq!(rows[0].path, "work");
    assert_eq!(rows[0].children[0].path, "work/notes");

    println!("Step 5: collapsed outline");
    let text = session.tree_text(
        &TreeQuery {
            threshold: Some(1),
            ..TreeQuery::default()
        },
        OutlineStyle::Initial,
    )?;
    assert_eq!(text, "+ work  3\n+ finance  2");

    println!("Step 6: delete and reopen");
    session.remove(&[notes])?;
    drop(session);

    let db = Database::new(&db_path)?;
    assert_eq!(db.count_files()?, 3);
    assert!(db.get_file(notes)?.is_none());
    assert!(db.get_file(FileId(1))?.is_some());

    Ok(())
}

#[test]
fn test_tree_json_round_trips_rows() -> Result<()> {
    let dir = TempDir::new()?;
    let session = Session::open(dir.path().join(DB_FILE_NAME), Config::default())?;
    session.add(request("/a", &["x/y", "z"]))?;

    let query = TreeQuery::default();
    let parsed: Vec<DisplayNode> = serde_json::from_str(&session.tree_json(&query)?)?;
    assert_eq!(parsed, session.tag_tree(&query)?);
    Ok(())
}
