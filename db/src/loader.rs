//! Migration loading from a directory or a YAML bundle.
//!
//! A directory holds one pair of files per migration:
//!
//! ```text
//! migrations/
//!   0001_create_cluster.up.sql
//!   0001_create_cluster.down.sql
//!   0002_cluster_state_index.up.sql
//! ```
//!
//! The leading digits are the version; the rest of the stem is a free-form
//! name. A missing `.down.sql` yields an empty down script. Other files are
//! ignored.
//!
//! A bundle is a single YAML file:
//!
//! ```yaml
//! migrations:
//!   - version: 1
//!     up: CREATE TABLE cluster (id TEXT PRIMARY KEY, version BIGINT NOT NULL);
//!     down: DROP TABLE cluster;
//! ```

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use simplesql_core::Migration;
use tracing::debug;

use crate::error::{DatabaseError, Result};

/// Describes where a [`MigrationSet`] was loaded from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MigrationSource {
    /// A directory of `.up.sql` / `.down.sql` files.
    Directory(PathBuf),
    /// A single YAML bundle.
    Bundle(PathBuf),
}

#[derive(Debug, Serialize, Deserialize)]
struct BundleEntry {
    version: i64,
    up: String,
    #[serde(default)]
    down: String,
}

#[derive(Debug, Serialize, Deserialize)]
struct Bundle {
    migrations: Vec<BundleEntry>,
}

/// Migrations loaded from disk, sorted by version.
#[derive(Debug, Clone)]
pub struct MigrationSet {
    migrations: Vec<Migration>,
    source: MigrationSource,
}

#[derive(Default)]
struct Pair {
    up: Option<String>,
    down: Option<String>,
}

/// Splits `0003_add_zone.up.sql` into `(3, true)`; `true` marks an up script.
fn parse_file_name(name: &str) -> Option<(i64, bool)> {
    let (stem, is_up) = if let Some(stem) = name.strip_suffix(".up.sql") {
        (stem, true)
    } else if let Some(stem) = name.strip_suffix(".down.sql") {
        (stem, false)
    } else {
        return None;
    };
    let digits: &str = stem
        .split(|c: char| !c.is_ascii_digit())
        .next()
        .unwrap_or_default();
    if digits.is_empty() {
        return None;
    }
    digits.parse().ok().map(|v| (v, is_up))
}

impl MigrationSet {
    /// Loads from `path`, treating a directory as a script directory and a
    /// file as a YAML bundle.
    ///
    /// # Errors
    ///
    /// See [`from_dir`](Self::from_dir) and [`from_bundle`](Self::from_bundle).
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if path.is_dir() {
            Self::from_dir(path)
        } else {
            Self::from_bundle(path)
        }
    }

    /// Loads every `<version>_<name>.up.sql` file in `path` with its
    /// matching `.down.sql`.
    ///
    /// # Errors
    ///
    /// Returns [`DatabaseError::IoError`] if the directory or a file cannot
    /// be read, and [`DatabaseError::InvalidMigration`] if a version has two
    /// scripts of the same direction, a down script without an up script,
    /// or a non-positive version.
    pub fn from_dir(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let mut pairs: BTreeMap<i64, Pair> = BTreeMap::new();

        for entry in std::fs::read_dir(path)? {
            let entry = entry?;
            let file_path = entry.path();
            let Some(name) = file_path.file_name().and_then(|n| n.to_str()) else {
                continue;
            };
            let Some((version, is_up)) = parse_file_name(name) else {
                continue;
            };
            let sql = std::fs::read_to_string(&file_path)?;
            let pair = pairs.entry(version).or_default();
            let slot = if is_up { &mut pair.up } else { &mut pair.down };
            if slot.is_some() {
                return Err(DatabaseError::InvalidMigration(format!(
                    "version {version} has more than one {} script",
                    if is_up { "up" } else { "down" }
                )));
            }
            *slot = Some(sql);
        }

        let mut migrations = Vec::with_capacity(pairs.len());
        for (version, pair) in pairs {
            let Some(up) = pair.up else {
                return Err(DatabaseError::InvalidMigration(format!(
                    "version {version} has a down script but no up script"
                )));
            };
            migrations.push(Migration::new(version, up, pair.down.unwrap_or_default()));
        }
        debug!(path = %path.display(), count = migrations.len(), "loaded migration scripts");
        Self::validated(migrations, MigrationSource::Directory(path.to_path_buf()))
    }

    /// Loads a YAML bundle.
    ///
    /// # Errors
    ///
    /// Returns [`DatabaseError::IoError`] if the file cannot be read,
    /// [`DatabaseError::YamlError`] if it does not parse, and
    /// [`DatabaseError::InvalidMigration`] for duplicate or non-positive
    /// versions.
    pub fn from_bundle(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let file = std::fs::File::open(path)?;
        let reader = std::io::BufReader::new(file);
        let bundle: Bundle = serde_yaml::from_reader(reader)?;
        let migrations = bundle
            .migrations
            .into_iter()
            .map(|e| Migration::new(e.version, e.up, e.down))
            .collect();
        Self::validated(migrations, MigrationSource::Bundle(path.to_path_buf()))
    }

    fn validated(mut migrations: Vec<Migration>, source: MigrationSource) -> Result<Self> {
        migrations.sort_by_key(|m| m.version);
        if let Some(m) = migrations.iter().find(|m| m.version <= 0) {
            return Err(DatabaseError::InvalidMigration(format!(
                "version must be positive, got {}",
                m.version
            )));
        }
        if let Some(pair) = migrations.windows(2).find(|w| w[0].version == w[1].version) {
            return Err(DatabaseError::InvalidMigration(format!(
                "version {} appears twice",
                pair[0].version
            )));
        }
        Ok(Self { migrations, source })
    }

    pub fn migrations(&self) -> &[Migration] {
        &self.migrations
    }

    pub fn into_migrations(self) -> Vec<Migration> {
        self.migrations
    }

    pub fn versions(&self) -> impl Iterator<Item = i64> + '_ {
        self.migrations.iter().map(|m| m.version)
    }

    /// Highest version in the set, `0` when empty.
    pub fn latest(&self) -> i64 {
        self.migrations.last().map_or(0, |m| m.version)
    }

    pub fn len(&self) -> usize {
        self.migrations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.migrations.is_empty()
    }

    pub fn source(&self) -> &MigrationSource {
        &self.source
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn write(dir: &Path, name: &str, body: &str) {
        std::fs::write(dir.join(name), body).unwrap();
    }

    #[test]
    fn test_parse_file_name() {
        assert_eq!(parse_file_name("0001_create.up.sql"), Some((1, true)));
        assert_eq!(parse_file_name("12_x.down.sql"), Some((12, false)));
        assert_eq!(parse_file_name("7.up.sql"), Some((7, true)));
        assert_eq!(parse_file_name("create.up.sql"), None);
        assert_eq!(parse_file_name("0001_create.sql"), None);
        assert_eq!(parse_file_name("README.md"), None);
    }

    #[test]
    fn test_from_dir_pairs_scripts() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "0002_index.up.sql", "CREATE INDEX i ON t (n);");
        write(dir.path(), "0001_create.up.sql", "CREATE TABLE t (n INTEGER);");
        write(dir.path(), "0001_create.down.sql", "DROP TABLE t;");
        write(dir.path(), "notes.txt", "ignored");

        let set = MigrationSet::from_dir(dir.path()).unwrap();
        assert_eq!(set.versions().collect::<Vec<_>>(), vec![1, 2]);
        assert_eq!(set.migrations()[0].down, "DROP TABLE t;");
        assert_eq!(set.migrations()[1].down, "");
        assert_eq!(set.latest(), 2);
        assert_eq!(
            set.source(),
            &MigrationSource::Directory(dir.path().to_path_buf())
        );
    }

    #[test]
    fn test_from_dir_rejects_orphan_down() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "0003_x.down.sql", "DROP TABLE x;");
        let err = MigrationSet::from_dir(dir.path()).unwrap_err();
        assert!(matches!(err, DatabaseError::InvalidMigration(_)));
    }

    #[test]
    fn test_from_dir_rejects_duplicate_version() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "0001_a.up.sql", "SELECT 1;");
        write(dir.path(), "1_b.up.sql", "SELECT 2;");
        let err = MigrationSet::from_dir(dir.path()).unwrap_err();
        assert!(err.to_string().contains("more than one up"));
    }

    #[test]
    fn test_from_dir_rejects_zero_version() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "0000_init.up.sql", "SELECT 1;");
        assert!(MigrationSet::from_dir(dir.path()).is_err());
    }

    #[test]
    fn test_from_bundle() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("migrations.yml");
        write(
            dir.path(),
            "migrations.yml",
            "migrations:\n  - version: 2\n    up: CREATE INDEX i ON t (n);\n  - version: 1\n    up: CREATE TABLE t (n INTEGER);\n    down: DROP TABLE t;\n",
        );

        let set = MigrationSet::load(&path).unwrap();
        assert_eq!(set.versions().collect::<Vec<_>>(), vec![1, 2]);
        assert_eq!(set.migrations()[0].down, "DROP TABLE t;");
        assert_eq!(set.source(), &MigrationSource::Bundle(path));
    }

    #[test]
    fn test_from_bundle_rejects_duplicates() {
        let dir = tempfile::tempdir().unwrap();
        write(
            dir.path(),
            "m.yml",
            "migrations:\n  - version: 1\n    up: a\n  - version: 1\n    up: b\n",
        );
        let err = MigrationSet::from_bundle(dir.path().join("m.yml")).unwrap_err();
        assert!(err.to_string().contains("appears twice"));
    }

    #[test]
    fn test_missing_source_is_io_error() {
        let err = MigrationSet::load("/nonexistent/migrations.yml").unwrap_err();
        assert!(matches!(err, DatabaseError::IoError(_)));
    }
}
