use std::cmp::Ordering;
use std::path::{Path, PathBuf};

use chrono::{Local, NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};
use serde_yaml::Value;
use tracing::{debug, info};

use super::{Version, VersionError};

/// A validated release record.
#[derive(Debug, Clone, PartialEq)]
pub struct VersionInfo {
    version: Version,
    release_date: NaiveDateTime,
    changes: Vec<String>,
    author: String,
}

impl VersionInfo {
    /// Validates and builds a release record.
    ///
    /// Rejects malformed versions, release dates in the future, an empty
    /// change list, and a blank author.
    pub fn new(
        version: &str,
        release_date: NaiveDateTime,
        changes: Vec<String>,
        author: impl Into<String>,
    ) -> Result<Self, VersionError> {
        let version = parse_version(version)?;
        if release_date > Local::now().naive_local() {
            return Err(VersionError::FutureReleaseDate(release_date));
        }
        if changes.is_empty() {
            return Err(VersionError::NoChanges);
        }
        let author = author.into();
        if author.trim().is_empty() {
            return Err(VersionError::EmptyAuthor);
        }

        Ok(Self {
            version,
            release_date,
            changes,
            author,
        })
    }

    pub fn version(&self) -> &Version {
        &self.version
    }

    pub fn release_date(&self) -> NaiveDateTime {
        self.release_date
    }

    pub fn changes(&self) -> &[String] {
        &self.changes
    }

    pub fn author(&self) -> &str {
        &self.author
    }
}

// On-disk layout; field order is the order written.
#[derive(Debug, Serialize, Deserialize)]
struct HistoryFile {
    versions: Vec<VersionRecord>,
}

#[derive(Debug, Serialize, Deserialize)]
struct VersionRecord {
    version: String,
    date: String,
    changes: Vec<String>,
    author: String,
}

impl From<&VersionInfo> for VersionRecord {
    fn from(info: &VersionInfo) -> Self {
        Self {
            version: info.version.to_string(),
            date: info.release_date.format("%Y-%m-%dT%H:%M:%S%.f").to_string(),
            changes: info.changes.clone(),
            author: info.author.clone(),
        }
    }
}

impl TryFrom<VersionRecord> for VersionInfo {
    type Error = VersionError;

    fn try_from(record: VersionRecord) -> Result<Self, Self::Error> {
        let date = parse_date(&record.date)?;
        VersionInfo::new(&record.version, date, record.changes, record.author)
    }
}

fn parse_version(s: &str) -> Result<Version, VersionError> {
    Version::parse(s).map_err(|source| VersionError::InvalidVersion {
        version: s.to_string(),
        source,
    })
}

/// Parses `YYYY-MM-DD`, `YYYY-MM-DDTHH:MM:SS[.f]` or the same with a space
/// separator. A bare date means midnight.
fn parse_date(s: &str) -> Result<NaiveDateTime, VersionError> {
    NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S%.f")
        .ok()
        .or_else(|| NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S%.f").ok())
        .or_else(|| {
            NaiveDate::parse_from_str(s, "%Y-%m-%d")
                .ok()
                .and_then(|d| d.and_hms_opt(0, 0, 0))
        })
        .ok_or_else(|| VersionError::InvalidDate(s.to_string()))
}

/// Project release history backed by a YAML file.
///
/// The file holds a `versions` list, newest first:
///
/// ```yaml
/// versions:
/// - version: 1.1.0
///   date: 2024-03-01T09:30:00
///   changes:
///   - Added dark mode
///   author: Site Team
/// ```
#[derive(Debug)]
pub struct VersionHistory {
    path: PathBuf,
    versions: Vec<VersionInfo>,
}

impl VersionHistory {
    /// Loads the history at `path`.
    ///
    /// A missing file, an empty document, or a document without a
    /// `versions` key is an empty history. Any invalid entry fails the load.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, VersionError> {
        let path = path.as_ref().to_path_buf();
        let versions = load_versions(&path)?;
        debug!(path = %path.display(), count = versions.len(), "loaded version history");
        Ok(Self { path, versions })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn versions(&self) -> &[VersionInfo] {
        &self.versions
    }

    /// The release with the highest precedence. Build metadata is ignored.
    pub fn current(&self) -> Result<&VersionInfo, VersionError> {
        self.versions
            .iter()
            .max_by(|a, b| a.version.cmp_precedence(&b.version))
            .ok_or(VersionError::Empty)
    }

    pub fn get(&self, version: &str) -> Result<&VersionInfo, VersionError> {
        let wanted = parse_version(version)?;
        self.versions
            .iter()
            .find(|v| v.version == wanted)
            .ok_or_else(|| VersionError::NotFound(version.to_string()))
    }

    /// Appends a release and writes the history back to disk.
    ///
    /// The new version must be unique and take precedence over the current
    /// one, so `1.0.0+b` is not newer than `1.0.0+a`. If the write fails the
    /// in-memory history is left unchanged.
    pub fn add(&mut self, info: VersionInfo) -> Result<(), VersionError> {
        if self.versions.iter().any(|v| v.version == info.version) {
            return Err(VersionError::Duplicate(info.version.to_string()));
        }
        if let Ok(current) = self.current() {
            if info.version.cmp_precedence(&current.version) != Ordering::Greater {
                return Err(VersionError::NotNewer {
                    new: info.version.to_string(),
                    current: current.version.to_string(),
                });
            }
        }

        self.versions.push(info);
        if let Err(e) = self.save() {
            self.versions.pop();
            return Err(e);
        }
        Ok(())
    }

    fn save(&self) -> Result<(), VersionError> {
        let mut sorted: Vec<&VersionInfo> = self.versions.iter().collect();
        sorted.sort_by(|a, b| b.version.cmp_precedence(&a.version));

        let file = HistoryFile {
            versions: sorted.into_iter().map(VersionRecord::from).collect(),
        };
        let contents = serde_yaml::to_string(&file).map_err(VersionError::SerializeError)?;
        std::fs::write(&self.path, contents).map_err(|source| VersionError::WriteError {
            path: self.path.clone(),
            source,
        })?;

        info!(path = %self.path.display(), count = self.versions.len(), "saved version history");
        Ok(())
    }
}

fn load_versions(path: &Path) -> Result<Vec<VersionInfo>, VersionError> {
    let contents = match std::fs::read_to_string(path) {
        Ok(contents) => contents,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(source) => {
            return Err(VersionError::ReadError {
                path: path.to_path_buf(),
                source,
            })
        }
    };

    let parse_error = |source| VersionError::ParseError {
        path: path.to_path_buf(),
        source,
    };
    let document: Value = serde_yaml::from_str(&contents).map_err(parse_error)?;
    let Some(versions) = document
        .as_mapping()
        .and_then(|m| m.get("versions"))
        .filter(|v| !v.is_null())
    else {
        return Ok(Vec::new());
    };
    let records: Vec<VersionRecord> =
        serde_yaml::from_value(versions.clone()).map_err(parse_error)?;

    records
        .into_iter()
        .enumerate()
        .map(|(index, record)| {
            VersionInfo::try_from(record).map_err(|e| VersionError::InvalidEntry {
                index,
                source: Box::new(e),
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn date(y: i32, m: u32, d: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(y, m, d)
            .unwrap()
            .and_hms_opt(10, 0, 0)
            .unwrap()
    }

    fn info(version: &str) -> VersionInfo {
        VersionInfo::new(version, date(2024, 1, 15), vec!["Initial release".into()], "Site Team")
            .unwrap()
    }

    #[test]
    fn test_version_info_validation() {
        let future = Local::now().naive_local() + chrono::Duration::days(1);
        let changes = || vec!["change".to_string()];

        assert!(matches!(
            VersionInfo::new("1.0", date(2024, 1, 1), changes(), "me"),
            Err(VersionError::InvalidVersion { .. })
        ));
        assert!(matches!(
            VersionInfo::new("1.0.0", future, changes(), "me"),
            Err(VersionError::FutureReleaseDate(_))
        ));
        assert!(matches!(
            VersionInfo::new("1.0.0", date(2024, 1, 1), vec![], "me"),
            Err(VersionError::NoChanges)
        ));
        assert!(matches!(
            VersionInfo::new("1.0.0", date(2024, 1, 1), changes(), "   "),
            Err(VersionError::EmptyAuthor)
        ));
    }

    #[test]
    fn test_parse_date_formats() {
        assert_eq!(parse_date("2024-01-15T10:00:00").unwrap(), date(2024, 1, 15));
        assert_eq!(parse_date("2024-01-15 10:00:00").unwrap(), date(2024, 1, 15));
        assert_eq!(
            parse_date("2024-01-15").unwrap(),
            NaiveDate::from_ymd_opt(2024, 1, 15).unwrap().and_hms_opt(0, 0, 0).unwrap()
        );
        assert!(matches!(parse_date("15/01/2024"), Err(VersionError::InvalidDate(_))));
    }

    #[test]
    fn test_open_missing_file_is_empty() {
        let dir = TempDir::new().unwrap();

        let history = VersionHistory::open(dir.path().join("versions.yaml")).unwrap();

        assert!(history.versions().is_empty());
        assert!(matches!(history.current(), Err(VersionError::Empty)));
    }

    #[test]
    fn test_open_without_versions_key_is_empty() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("versions.yaml");
        std::fs::write(&path, "project: site\n").unwrap();

        let history = VersionHistory::open(&path).unwrap();

        assert!(history.versions().is_empty());
    }

    #[test]
    fn test_open_reads_entries() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("versions.yaml");
        std::fs::write(
            &path,
            r#"
versions:
- version: 1.1.0
  date: "2024-03-01"
  changes: [Dark mode]
  author: Site Team
- version: 1.0.0
  date: "2024-01-15T10:00:00"
  changes: [Initial release]
  author: Site Team
"#,
        )
        .unwrap();

        let history = VersionHistory::open(&path).unwrap();

        assert_eq!(history.versions().len(), 2);
        assert_eq!(history.current().unwrap().version(), &Version::new(1, 1, 0));
        assert_eq!(history.get("1.0.0").unwrap().release_date(), date(2024, 1, 15));
        assert!(matches!(history.get("0.9.0"), Err(VersionError::NotFound(_))));
    }

    #[test]
    fn test_open_rejects_invalid_entry() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("versions.yaml");
        std::fs::write(
            &path,
            "versions:\n- version: 1.0.0\n  date: '2024-01-15'\n  changes: []\n  author: me\n",
        )
        .unwrap();

        let err = VersionHistory::open(&path).unwrap_err();

        assert!(matches!(err, VersionError::InvalidEntry { index: 0, .. }));
    }

    #[test]
    fn test_add_persists_newest_first() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("versions.yaml");
        let mut history = VersionHistory::open(&path).unwrap();

        history.add(info("1.0.0")).unwrap();
        history.add(info("1.2.0-beta.1")).unwrap();
        history.add(info("1.2.0")).unwrap();

        let written = std::fs::read_to_string(&path).unwrap();
        let first = written.find("1.2.0\n").unwrap();
        let beta = written.find("1.2.0-beta.1").unwrap();
        let oldest = written.find("1.0.0").unwrap();
        assert!(first < beta && beta < oldest);
        assert!(written.starts_with("versions:\n- version: 1.2.0\n  date: "));
        assert!(written.contains("2024-01-15T10:00:00"));

        let reopened = VersionHistory::open(&path).unwrap();
        assert_eq!(reopened.versions().len(), 3);
        assert_eq!(reopened.current().unwrap().version().to_string(), "1.2.0");
    }

    #[test]
    fn test_add_rejects_duplicate_and_older() {
        let dir = TempDir::new().unwrap();
        let mut history = VersionHistory::open(dir.path().join("versions.yaml")).unwrap();
        history.add(info("2.0.0")).unwrap();

        assert!(matches!(history.add(info("2.0.0")), Err(VersionError::Duplicate(_))));
        assert!(matches!(history.add(info("1.9.9")), Err(VersionError::NotNewer { .. })));
        assert_eq!(history.versions().len(), 1);
    }

    #[test]
    fn test_add_ignores_build_metadata_for_precedence() {
        let dir = TempDir::new().unwrap();
        let mut history = VersionHistory::open(dir.path().join("versions.yaml")).unwrap();
        history.add(info("1.0.0+a")).unwrap();

        let err = history.add(info("1.0.0+b")).unwrap_err();

        assert!(matches!(err, VersionError::NotNewer { .. }));
        assert_eq!(history.versions().len(), 1);
        assert_eq!(history.current().unwrap().version().to_string(), "1.0.0+a");
    }

    #[test]
    fn test_prerelease_precedence() {
        let dir = TempDir::new().unwrap();
        let mut history = VersionHistory::open(dir.path().join("versions.yaml")).unwrap();

        for version in ["1.0.0-alpha", "1.0.0-alpha.1", "1.0.0-beta.2", "1.0.0-beta.11", "1.0.0"] {
            history.add(info(version)).unwrap();
        }

        assert!(matches!(
            history.add(info("1.0.0-rc.1")),
            Err(VersionError::NotNewer { .. })
        ));
        assert_eq!(history.current().unwrap().version().to_string(), "1.0.0");
    }

    #[test]
    fn test_rejects_malformed_versions() {
        for bad in ["1.2", "1.2.3.4", "01.2.3", "1.2.x", "1.2.3-", "1.2.3-01", ""] {
            assert!(
                matches!(
                    VersionInfo::new(bad, date(2024, 1, 1), vec!["c".into()], "me"),
                    Err(VersionError::InvalidVersion { .. })
                ),
                "{bad} should be rejected"
            );
        }
    }

    #[test]
    fn test_failed_write_leaves_history_unchanged() {
        let dir = TempDir::new().unwrap();
        let mut history = VersionHistory::open(dir.path().join("missing/versions.yaml")).unwrap();

        let err = history.add(info("1.0.0")).unwrap_err();

        assert!(matches!(err, VersionError::WriteError { .. }));
        assert!(history.versions().is_empty());
    }
}
