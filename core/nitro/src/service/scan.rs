// Copyright (c) 2022 Huawei Technologies Co.,Ltd. All rights reserved.
//
// sysMaster is licensed under Mulan PSL v2.
// You can use this software according to the terms and conditions of the Mulan
// PSL v2.
// You may obtain a copy of Mulan PSL v2 at:
//         http://license.coscl.org.cn/MulanPSL2
// THIS SOFTWARE IS PROVIDED ON AN "AS IS" BASIS, WITHOUT WARRANTIES OF ANY
// KIND, EITHER EXPRESS OR IMPLIED, INCLUDING BUT NOT LIMITED TO
// NON-INFRINGEMENT, MERCHANTABILITY OR FIT FOR A PARTICULAR PURPOSE.
// See the Mulan PSL v2 for more details.

//! Enumerate a supervision root
use super::name::{self, Kind};
use crate::error::*;
use std::fs;
use std::path::{Path, PathBuf};

/// One service definition found on disk
#[derive(Debug, PartialEq, Eq)]
pub(crate) struct ScanEntry {
    pub(crate) name: String,
    /// directory the scripts are read from
    pub(crate) path: PathBuf,
    pub(crate) kind: Kind,
    /// the `down` marker was present
    pub(crate) down: bool,
}

/// Walk the entries directly below `root`. Hidden entries, entries that are
/// not directories and invalid names are skipped.
pub(crate) fn scan(root: &Path) -> Result<Vec<ScanEntry>> {
    let mut entries = Vec::new();
    for dirent in fs::read_dir(root).context(IoSnafu)? {
        let dirent = match dirent {
            Ok(d) => d,
            Err(e) => {
                log::warn!("failed to read an entry of {:?}: {}", root, e);
                continue;
            }
        };
        let file_name = dirent.file_name();
        let name = match file_name.to_str() {
            Some(n) => n,
            None => continue,
        };
        if name.starts_with('.') {
            continue;
        }

        // follows symlinks, an instance may point to its template
        let path = dirent.path();
        match fs::metadata(&path) {
            Ok(m) if m.is_dir() => {}
            _ => continue,
        }

        let kind = match name::parse(name) {
            Ok(k) => k,
            Err(e) => {
                log::debug!("skipping {:?}: {}", path, e);
                continue;
            }
        };
        let path = fs::canonicalize(&path).unwrap_or(path);
        entries.push(ScanEntry {
            name: name.to_string(),
            down: path.join("down").exists(),
            path,
            kind,
        });
    }
    entries.sort_by(|a, b| a.name.cmp(&b.name));
    Ok(entries)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::os::unix::fs::symlink;

    #[test]
    fn test_scan() {
        let root = tempfile::tempdir().unwrap();
        let r = root.path();
        fs::create_dir(r.join("sv_a")).unwrap();
        fs::create_dir(r.join("sv_b")).unwrap();
        fs::write(r.join("sv_b/down"), "").unwrap();
        fs::create_dir(r.join("getty@")).unwrap();
        symlink("getty@", r.join("getty@tty1")).unwrap();
        fs::create_dir(r.join("SYS")).unwrap();
        fs::create_dir(r.join(".hidden")).unwrap();
        fs::write(r.join("README"), "").unwrap();

        let entries = scan(r).unwrap();
        let names: Vec<&str> = entries.iter().map(|e| e.name.as_str()).collect();
        assert_eq!(names, vec!["SYS", "getty@", "getty@tty1", "sv_a", "sv_b"]);

        let tty1 = &entries[2];
        assert_eq!(tty1.path, fs::canonicalize(r.join("getty@")).unwrap());
        assert_eq!(tty1.kind.instance(), Some("tty1"));
        assert!(entries[4].down);
        assert!(!entries[3].down);
        assert_eq!(entries[0].kind, Kind::Sys);
    }

    #[test]
    fn test_scan_missing_root() {
        assert!(scan(Path::new("/nonexistent/nitro")).is_err());
    }
}
