use std::path::Path;

use crate::error::{Result, SyncError};
use crate::timestamp::{instant_of, TimezoneOffset};

/// Set the modification time of `path` to the instant `raw` denotes.
///
/// `raw` is read in `offset` when given, otherwise as local time.
pub fn touch_mtime(path: &Path, raw: &str, offset: Option<&TimezoneOffset>) -> Result<()> {
    let instant = instant_of(raw, offset)?;
    let ft = filetime::FileTime::from_unix_time(instant.timestamp(), 0);
    filetime::set_file_mtime(path, ft).map_err(|source| SyncError::Touch {
        path: path.to_path_buf(),
        source,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs::File;
    use tempfile::tempdir;

    #[test]
    fn test_touch_with_offset() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("clip.mov");
        File::create(&path).unwrap();

        let tz = TimezoneOffset::parse("+00:00").unwrap();
        touch_mtime(&path, "2021:05:01 10:00:00", Some(&tz)).unwrap();
        let meta = std::fs::metadata(&path).unwrap();
        let mtime = filetime::FileTime::from_last_modification_time(&meta);
        assert_eq!(mtime.unix_seconds(), 1_619_863_200);
    }

    #[test]
    fn test_touch_rejects_bad_timestamp() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("clip.mov");
        File::create(&path).unwrap();
        assert!(matches!(touch_mtime(&path, "soon", None), Err(SyncError::Timestamp(_))));
    }

    #[test]
    fn test_touch_missing_file() {
        let dir = tempdir().unwrap();
        let tz = TimezoneOffset::parse("+00:00").unwrap();
        let result = touch_mtime(&dir.path().join("gone.mov"), "2021:05:01 10:00:00", Some(&tz));
        assert!(matches!(result, Err(SyncError::Touch { .. })));
    }
}
