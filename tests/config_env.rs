//! Runs in its own binary so the environment is set before the global config loads.

use refdiff::config::Config;
use refdiff::db::Db;
use refdiff::fingerprint::LineFingerprintSequence;
use refdiff::model::{Unit, UnitKind};
use refdiff::tracking::DiffInputFactory;
use std::path::PathBuf;
use std::sync::Arc;

fn temp_db_path() -> PathBuf {
    let mut path = std::env::temp_dir();
    let nanos = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_nanos();
    path.push(format!(
        "refdiff_config_env_{}_{nanos}.sqlite",
        std::process::id()
    ));
    path
}

fn cleanup(db_path: &PathBuf) {
    let _ = std::fs::remove_file(db_path);
    let _ = std::fs::remove_file(PathBuf::from(format!("{}-wal", db_path.display())));
    let _ = std::fs::remove_file(PathBuf::from(format!("{}-shm", db_path.display())));
}

#[test]
fn environment_selects_reference_branch_and_ignores_bad_pool_size() {
    // SAFETY: the only test in this binary, run before anything reads the environment.
    unsafe {
        std::env::set_var("REFDIFF_REFERENCE_BRANCH", " main ");
        std::env::set_var("REFDIFF_POOL_SIZE", "not-a-number");
    }
    refdiff::logging::init();

    let config = Config::get();
    assert_eq!(config.pool_size, 10);
    assert_eq!(config.reference_branch.as_deref(), Some("main"));

    let db_path = temp_db_path();
    let db = Arc::new(Db::new(&db_path).unwrap());
    assert_eq!(db.db_path(), db_path.as_path());

    db.upsert_branch("main", Some(3)).unwrap();
    db.insert_component("U1", "src/lib.rs", "main", UnitKind::File)
        .unwrap();
    db.upsert_file_source("U1", &LineFingerprintSequence::from_source("pub fn f() {}\n"))
        .unwrap();

    let factory = DiffInputFactory::from_config(db.clone()).unwrap();
    assert!(factory.has_reference_analysis());
    let input = factory.create_input(&Unit::new("PR-U1", "src/lib.rs", UnitKind::File));
    assert_eq!(input.reference_id(), Some("U1"));
    assert_eq!(input.fingerprints().unwrap().len(), 1);

    drop(input);
    drop(factory);
    drop(db);
    cleanup(&db_path);
}
