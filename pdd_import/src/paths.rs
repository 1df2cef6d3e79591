//! Case-insensitive lookups over the bundle tree. CD-ROM images are usually
//! copied with whatever case the mastering tool chose.

use std::fs;
use std::path::{Path, PathBuf};

use walkdir::WalkDir;

use crate::error::{ImportError, Result};

/// Finds the child of `dir` whose name matches `name` ignoring ASCII case.
pub fn find_child(dir: &Path, name: &str) -> Result<Option<PathBuf>> {
    let exact = dir.join(name);
    if exact.exists() {
        return Ok(Some(exact));
    }
    if !dir.is_dir() {
        return Ok(None);
    }
    for entry in fs::read_dir(dir).map_err(|err| ImportError::io(dir, err))? {
        let entry = entry.map_err(|err| ImportError::io(dir, err))?;
        if entry
            .file_name()
            .to_str()
            .is_some_and(|candidate| candidate.eq_ignore_ascii_case(name))
        {
            return Ok(Some(entry.path()));
        }
    }
    Ok(None)
}

/// Resolves `components` below `root` one level at a time.
pub fn find_path(root: &Path, components: &[&str]) -> Result<Option<PathBuf>> {
    let mut current = root.to_path_buf();
    for component in components {
        match find_child(&current, component)? {
            Some(next) => current = next,
            None => return Ok(None),
        }
    }
    Ok(Some(current))
}

pub fn require_path(root: &Path, components: &[&str]) -> Result<PathBuf> {
    find_path(root, components)?.ok_or_else(|| ImportError::MissingFile(components.join("/")))
}

/// Regular files directly inside `dir`, sorted by name.
pub fn list_files(dir: &Path) -> Result<Vec<PathBuf>> {
    let mut files = Vec::new();
    for entry in WalkDir::new(dir).min_depth(1).max_depth(1) {
        let entry = entry.map_err(|err| {
            let source = err
                .into_io_error()
                .unwrap_or_else(|| std::io::Error::other("directory walk failed"));
            ImportError::io(dir, source)
        })?;
        if entry.file_type().is_file() {
            files.push(entry.into_path());
        }
    }
    files.sort();
    Ok(files)
}

/// Files directly inside `dir` with extension `ext` (any case).
pub fn files_with_extension(dir: &Path, ext: &str) -> Result<Vec<PathBuf>> {
    Ok(list_files(dir)?
        .into_iter()
        .filter(|path| {
            path.extension()
                .and_then(|found| found.to_str())
                .is_some_and(|found| found.eq_ignore_ascii_case(ext))
        })
        .collect())
}

pub fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn resolves_paths_ignoring_case() {
        let dir = tempdir().unwrap();
        fs::create_dir_all(dir.path().join("TICKETS").join("Comments")).unwrap();
        fs::write(dir.path().join("TICKETS/Comments/COMMENTS.DAT"), b"").unwrap();

        let found = find_path(dir.path(), &["tickets", "comments", "comments.dat"])
            .unwrap()
            .unwrap();
        assert!(found.ends_with("TICKETS/Comments/COMMENTS.DAT"));
        assert!(find_path(dir.path(), &["tickets", "missing"]).unwrap().is_none());

        let err = require_path(dir.path(), &["tickets", "traffreg", "traffreg.dat"]).unwrap_err();
        assert!(err.to_string().contains("tickets/traffreg/traffreg.dat"));
    }

    #[test]
    fn lists_files_by_extension_sorted() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join("b.DAT"), b"").unwrap();
        fs::write(dir.path().join("a.dat"), b"").unwrap();
        fs::write(dir.path().join("c.txt"), b"").unwrap();
        fs::create_dir(dir.path().join("nested.dat")).unwrap();

        let names: Vec<String> = files_with_extension(dir.path(), "dat")
            .unwrap()
            .iter()
            .map(|path| file_name(path))
            .collect();
        assert_eq!(names, vec!["a.dat", "b.DAT"]);
    }
}
