//! Cross-platform application paths and output file naming

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

/// Which export a file holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputKind {
    /// One row per attempted trial.
    Raw,
    /// Stay/switch rows for behavioural analysis.
    StayAnalysis,
}

impl OutputKind {
    fn tag(self) -> &'static str {
        match self {
            OutputKind::Raw => "raw",
            OutputKind::StayAnalysis => "tf",
        }
    }
}

/// `twostep-<kind>[-tut]-<subject>-block-<block>.csv`
pub fn output_file_name(kind: OutputKind, subject_id: &str, block: u32, tutorial: bool) -> String {
    let tut = if tutorial { "-tut" } else { "" };
    format!("twostep-{}{}-{}-block-{}.csv", kind.tag(), tut, subject_id, block)
}

#[derive(Debug, Clone)]
pub struct AppPaths {
    data_dir: PathBuf,
}

impl AppPaths {
    /// Uses the OS data directory, creating it if needed.
    pub fn new() -> io::Result<Self> {
        let base = dirs::data_dir().ok_or_else(|| {
            io::Error::new(io::ErrorKind::NotFound, "could not determine data directory")
        })?;
        Self::at(base.join("twostep"))
    }

    pub fn at(data_dir: impl Into<PathBuf>) -> io::Result<Self> {
        let data_dir = data_dir.into();
        fs::create_dir_all(&data_dir)?;
        Ok(Self { data_dir })
    }

    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }

    pub fn config_file(&self) -> PathBuf {
        self.data_dir.join("config.json")
    }

    pub fn output_file(&self, kind: OutputKind, subject_id: &str, block: u32, tutorial: bool) -> PathBuf {
        self.data_dir
            .join(output_file_name(kind, subject_id, block, tutorial))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn output_names_follow_block_convention() {
        assert_eq!(
            output_file_name(OutputKind::Raw, "s01", 1, false),
            "twostep-raw-s01-block-1.csv"
        );
        assert_eq!(
            output_file_name(OutputKind::StayAnalysis, "s01", 2, true),
            "twostep-tf-tut-s01-block-2.csv"
        );
    }

    #[test]
    fn at_creates_directory() {
        let dir = std::env::temp_dir().join(format!("twostep-paths-{}", std::process::id()));
        let paths = AppPaths::at(&dir).unwrap();
        assert!(paths.data_dir().is_dir());
        assert_eq!(paths.config_file(), dir.join("config.json"));
        assert_eq!(
            paths.output_file(OutputKind::Raw, "x", 3, false),
            dir.join("twostep-raw-x-block-3.csv")
        );
        let _ = fs::remove_dir_all(&dir);
    }
}
