// Copyright 2025 Crrow
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//      http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

use std::path::{Path, PathBuf};

use crate::Result;

/// Returns the path of a slab's data file: `<dir>/<name>-<id>.data`.
pub(crate) fn slab_data_path(dir: &Path, name: &str, slab: u32) -> PathBuf {
    dir.join(format!("{name}-{slab}.data"))
}

/// Returns the path of a slab's index file: `<dir>/<name>-<id>.index`.
pub(crate) fn slab_index_path(dir: &Path, name: &str, slab: u32) -> PathBuf {
    dir.join(format!("{name}-{slab}.index"))
}

/// Returns the path of the cursor file: `<dir>/<name>.position`.
pub(crate) fn position_path(dir: &Path, name: &str) -> PathBuf {
    dir.join(format!("{name}.position"))
}

/// Extracts the slab id from a filename of the form `<name>-<digits>.index`.
///
/// Only `.index` files identify a slab; the digits must be non-empty, unsigned
/// and base-10. Leading zeros are accepted. Anything else is `None`.
pub(crate) fn parse_slab_id(name: &str, filename: &str) -> Option<u32> {
    let digits = filename
        .strip_prefix(name)?
        .strip_prefix('-')?
        .strip_suffix(".index")?;
    if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    digits.parse().ok()
}

/// Scans the storage directory for this queue's slab ids, sorted ascending.
pub(crate) fn live_slab_ids(dir: &Path, name: &str) -> Result<Vec<u32>> {
    let mut ids = Vec::new();
    for entry in std::fs::read_dir(dir)? {
        let entry = entry?;
        if !entry.file_type()?.is_file() {
            continue;
        }
        let filename = entry.file_name();
        let Some(filename) = filename.to_str() else {
            continue;
        };
        if let Some(id) = parse_slab_id(name, filename) {
            ids.push(id);
        }
    }
    ids.sort_unstable();
    Ok(ids)
}

/// Lowest live slab id, or `None` when the directory holds no slab.
pub(crate) fn head_slab_id(dir: &Path, name: &str) -> Result<Option<u32>> {
    Ok(live_slab_ids(dir, name)?.first().copied())
}

/// Highest live slab id; 0 when the directory holds no slab.
pub(crate) fn tail_slab_id(dir: &Path, name: &str) -> Result<u32> {
    Ok(live_slab_ids(dir, name)?.last().copied().unwrap_or(0))
}

#[cfg(test)]
mod tests {
    use tempfile::TempDir;
    use test_case::test_case;

    use super::*;

    #[test_case("simple-1.index", Some(1))]
    #[test_case("simple-01.index", Some(1))]
    #[test_case("simple-32131231.index", Some(32131231))]
    #[test_case("simple-01.data", None)]
    #[test_case("simple--1.data", None)]
    #[test_case("simple--1.index", None)]
    #[test_case("notsimple-32131231.index", None)]
    #[test_case("simple-dsas.index", None)]
    #[test_case("simple-.index", None)]
    #[test_case("simple.position", None)]
    fn test_parse_slab_id(filename: &str, expected: Option<u32>) {
        assert_eq!(parse_slab_id("simple", filename), expected);
    }

    #[test]
    fn test_slab_paths() {
        let dir = Path::new("/queue");
        assert_eq!(
            slab_data_path(dir, "q", 3),
            PathBuf::from("/queue/q-3.data")
        );
        assert_eq!(
            slab_index_path(dir, "q", 3),
            PathBuf::from("/queue/q-3.index")
        );
        assert_eq!(position_path(dir, "q"), PathBuf::from("/queue/q.position"));
    }

    #[test]
    fn test_scan_orders_numerically() {
        let temp_dir = TempDir::new().unwrap();
        for id in [10, 2, 1] {
            std::fs::File::create(slab_index_path(temp_dir.path(), "q", id)).unwrap();
            std::fs::File::create(slab_data_path(temp_dir.path(), "q", id)).unwrap();
        }
        // Files of another queue in the same directory are invisible.
        std::fs::File::create(temp_dir.path().join("other-5.index")).unwrap();

        let ids = live_slab_ids(temp_dir.path(), "q").unwrap();
        assert_eq!(ids, vec![1, 2, 10]);
        assert_eq!(head_slab_id(temp_dir.path(), "q").unwrap(), Some(1));
        assert_eq!(tail_slab_id(temp_dir.path(), "q").unwrap(), 10);
    }

    #[test]
    fn test_empty_directory() {
        let temp_dir = TempDir::new().unwrap();
        assert!(live_slab_ids(temp_dir.path(), "q").unwrap().is_empty());
        assert_eq!(head_slab_id(temp_dir.path(), "q").unwrap(), None);
        assert_eq!(tail_slab_id(temp_dir.path(), "q").unwrap(), 0);
    }
}
