//! Blob operations for object definitions.
//!
//! Each schema object definition is stored as one normalized SQL blob.
//! Normalization happens before hashing so that two definitions that
//! differ only in line endings or trailing whitespace share one blob.

use crate::storage::error::{StorageError, StorageResult};
use crate::storage::types::BlobId;

/// Normalize a definition before it is hashed and stored.
///
/// - CRLF and lone CR become LF
/// - trailing whitespace is stripped from every line
/// - the content ends with exactly one newline
///
/// Idempotent: normalizing twice yields the same bytes, which is what
/// makes `put_blob` referentially transparent.
pub fn normalize_definition(definition: &str) -> String {
    let unified = definition.replace("\r\n", "\n").replace('\r', "\n");

    let mut out = String::with_capacity(unified.len() + 1);
    for line in unified.lines() {
        out.push_str(line.trim_end());
        out.push('\n');
    }

    // drop trailing blank lines, keep exactly one terminator
    while out.ends_with("\n\n") {
        out.pop();
    }
    if out.is_empty() {
        out.push('\n');
    }
    out
}

/// write a normalized definition as a blob, returning its content hash
///
/// idempotent: writing the same definition twice converges on one row
pub fn write_definition(repo: &git2::Repository, definition: &str) -> StorageResult<BlobId> {
    let normalized = normalize_definition(definition);
    let oid = repo.blob(normalized.as_bytes())?;
    Ok(BlobId::new(oid))
}

/// read a definition back from the repository
pub fn read_definition(repo: &git2::Repository, blob_id: BlobId) -> StorageResult<String> {
    let blob = repo
        .find_blob(blob_id.raw())
        .map_err(|_| StorageError::BlobNotFound(blob_id.to_string()))?;
    let text = std::str::from_utf8(blob.content())?;
    Ok(text.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn setup_repo() -> (TempDir, git2::Repository) {
        let dir = TempDir::new().unwrap();
        let repo = git2::Repository::init(dir.path()).unwrap();
        (dir, repo)
    }

    #[test]
    fn test_normalize_line_endings() {
        assert_eq!(
            normalize_definition("CREATE TABLE t (\r\n  id INT\r\n)"),
            "CREATE TABLE t (\n  id INT\n)\n"
        );
    }

    #[test]
    fn test_normalize_trailing_whitespace() {
        assert_eq!(
            normalize_definition("CREATE VIEW v AS   \nSELECT 1;  \n\n\n"),
            "CREATE VIEW v AS\nSELECT 1;\n"
        );
    }

    #[test]
    fn test_normalize_idempotent() {
        let once = normalize_definition("SELECT 1;\r\n");
        assert_eq!(normalize_definition(&once), once);
    }

    #[test]
    fn test_write_is_deterministic() {
        let (_dir, repo) = setup_repo();

        let a = write_definition(&repo, "CREATE TABLE t (id INT);").unwrap();
        let b = write_definition(&repo, "CREATE TABLE t (id INT);\r\n").unwrap();

        // same normalized content, same hash, one row
        assert_eq!(a, b);
    }

    #[test]
    fn test_different_content_different_hash() {
        let (_dir, repo) = setup_repo();

        let a = write_definition(&repo, "CREATE TABLE t (id INT);").unwrap();
        let b = write_definition(&repo, "CREATE TABLE t (id BIGINT);").unwrap();
        assert_ne!(a, b);
    }

    #[test]
    fn test_round_trip() {
        let (_dir, repo) = setup_repo();

        let id = write_definition(&repo, "CREATE TABLE t (id INT);").unwrap();
        let back = read_definition(&repo, id).unwrap();
        assert_eq!(back, "CREATE TABLE t (id INT);\n");
    }
}
