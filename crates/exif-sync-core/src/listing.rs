use std::fs;
use std::path::Path;

/// Names of the files directly inside `dir`, sorted.
///
/// Sub-directories are skipped and nothing is filtered by extension. Names
/// that are not valid UTF-8 cannot take part in prefix matching and are left
/// out.
pub fn list_dir(dir: &Path) -> std::io::Result<Vec<String>> {
    let mut names = Vec::new();
    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        if entry.file_type()?.is_dir() {
            continue;
        }
        if let Ok(name) = entry.file_name().into_string() {
            names.push(name);
        }
    }
    names.sort();
    Ok(names)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs::File;
    use tempfile::tempdir;

    #[test]
    fn test_list_dir_flat_and_sorted() {
        let dir = tempdir().unwrap();
        for name in ["b.mov", "a.mp4", "notes.txt", ".hidden"] {
            File::create(dir.path().join(name)).unwrap();
        }
        fs::create_dir(dir.path().join("nested")).unwrap();
        File::create(dir.path().join("nested").join("c.mov")).unwrap();

        let names = list_dir(dir.path()).unwrap();
        assert_eq!(names, vec![".hidden", "a.mp4", "b.mov", "notes.txt"]);
    }

    #[test]
    fn test_list_missing_dir() {
        let dir = tempdir().unwrap();
        assert!(list_dir(&dir.path().join("missing")).is_err());
    }
}
