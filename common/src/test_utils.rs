use std::path::{Path, PathBuf};

/// Directory shared by all crates for files written by tests.
fn test_output_root() -> PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR"))
        .parent()
        .map(|workspace| workspace.join("test_output"))
        .unwrap_or_else(|| PathBuf::from("test_output"))
}

/// Returns a path for a test output file, creating `test_output/<group>` on demand.
pub fn test_output_path(group: &str, name: &str) -> PathBuf {
    let dir = test_output_root().join(group);
    std::fs::create_dir_all(&dir)
        .unwrap_or_else(|e| panic!("Failed to create {}: {}", dir.display(), e));
    dir.join(name)
}
