// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;

#[test]
fn clean_tree_removes_only_old_files() -> anyhow::Result<()> {
    let tmp = tempfile::tempdir()?;
    let nested = tmp.path().join("u/c");
    std::fs::create_dir_all(&nested)?;
    std::fs::write(nested.join("old.mp4"), b"x")?;
    std::fs::write(nested.join("fresh.mp4"), b"y")?;

    // Backdate one file beyond the TTL.
    let old_mtime = SystemTime::now() - Duration::from_secs(600);
    let file = std::fs::File::options().write(true).open(nested.join("old.mp4"))?;
    file.set_modified(old_mtime)?;
    drop(file);

    let removed = clean_tree(tmp.path(), Duration::from_secs(60))?;
    assert_eq!(removed, 1);
    assert!(!nested.join("old.mp4").exists());
    assert!(nested.join("fresh.mp4").exists());
    Ok(())
}

#[test]
fn list_tree_returns_relative_paths() -> anyhow::Result<()> {
    let tmp = tempfile::tempdir()?;
    std::fs::create_dir_all(tmp.path().join("u/c"))?;
    std::fs::write(tmp.path().join("u/c/one.mp4"), b"1")?;
    std::fs::write(tmp.path().join("u/two.mp4"), b"2")?;

    let mut listed = list_tree(tmp.path(), tmp.path()).unwrap_or_default();
    listed.sort();
    assert_eq!(listed, vec!["/u/c/one.mp4".to_owned(), "/u/two.mp4".to_owned()]);
    Ok(())
}

#[test]
fn list_tree_missing_directory_is_none() {
    assert!(list_tree(Path::new("/no/such/dir"), Path::new("/no")).is_none());
}
