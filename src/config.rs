//! Run configuration resolved from CLI flags and environment

use crate::column::ColumnSpec;
use crate::error::{RulesError, RulesResult};
use serde::Serialize;
use std::path::{Path, PathBuf};

/// Rules files looked up in the base directory, in order of preference
pub const RULES_CANDIDATES: [&str; 2] = ["rules.xls", "rules.xlsx"];

/// Trigger column used when a rule leaves `Regex_Column` blank
pub const DEFAULT_TRIGGER_COLUMN: &str = "H";

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RunConfig {
    pub rules_path: PathBuf,
    /// Relative input and output paths are resolved against this directory
    pub base_dir: PathBuf,
    pub trigger_column: ColumnSpec,
    pub dry_run: bool,
}

impl RunConfig {
    pub fn new(rules_path: PathBuf, base_dir: PathBuf) -> Self {
        Self {
            rules_path,
            base_dir,
            trigger_column: ColumnSpec::Letter(DEFAULT_TRIGGER_COLUMN.to_string()),
            dry_run: false,
        }
    }

    /// Build the configuration from optional user input.
    ///
    /// Without `base_dir` the executable's directory is used. Without
    /// `rules` the base directory is searched for `rules.xls`, then
    /// `rules.xlsx`.
    pub fn resolve(
        rules: Option<PathBuf>,
        base_dir: Option<PathBuf>,
        trigger_column: &str,
        dry_run: bool,
    ) -> RulesResult<Self> {
        let base_dir = match base_dir {
            Some(dir) => dir,
            None => executable_dir()?,
        };

        let rules_path = match rules {
            Some(path) => path,
            None => discover_rules(&base_dir)?,
        };

        Ok(Self {
            rules_path,
            base_dir,
            trigger_column: ColumnSpec::parse(trigger_column)?,
            dry_run,
        })
    }

    pub fn with_trigger_column(mut self, spec: ColumnSpec) -> Self {
        self.trigger_column = spec;
        self
    }

    pub fn with_dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }

    /// Resolve a rules-table file name against the base directory
    pub fn resolve_path(&self, file: &str) -> PathBuf {
        self.base_dir.join(file.trim())
    }
}

/// Directory holding the running executable
pub fn executable_dir() -> RulesResult<PathBuf> {
    let exe = std::env::current_exe()?;
    Ok(exe
        .parent()
        .map(Path::to_path_buf)
        .unwrap_or_else(|| PathBuf::from(".")))
}

/// First rules file present in `dir`
pub fn discover_rules(dir: &Path) -> RulesResult<PathBuf> {
    RULES_CANDIDATES
        .iter()
        .map(|name| dir.join(name))
        .find(|path| path.is_file())
        .ok_or_else(|| {
            RulesError::RulesTable(format!(
                "no {} found in {}",
                RULES_CANDIDATES.join(" or "),
                dir.display()
            ))
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_discover_prefers_xls() {
        let dir = TempDir::new().unwrap();
        assert!(matches!(
            discover_rules(dir.path()),
            Err(RulesError::RulesTable(_))
        ));

        fs::write(dir.path().join("rules.xlsx"), b"").unwrap();
        assert_eq!(discover_rules(dir.path()).unwrap(), dir.path().join("rules.xlsx"));

        fs::write(dir.path().join("rules.xls"), b"").unwrap();
        assert_eq!(discover_rules(dir.path()).unwrap(), dir.path().join("rules.xls"));
    }

    #[test]
    fn test_resolve_with_explicit_values() {
        let dir = TempDir::new().unwrap();
        let config = RunConfig::resolve(
            Some(PathBuf::from("my-rules.xlsx")),
            Some(dir.path().to_path_buf()),
            "code",
            true,
        )
        .unwrap();

        assert_eq!(config.rules_path, PathBuf::from("my-rules.xlsx"));
        assert_eq!(config.trigger_column, ColumnSpec::HeaderName("code".into()));
        assert!(config.dry_run);
        assert_eq!(config.resolve_path(" data.xls "), dir.path().join("data.xls"));
    }

    #[test]
    fn test_resolve_errors() {
        let dir = TempDir::new().unwrap();
        assert!(matches!(
            RunConfig::resolve(None, Some(dir.path().to_path_buf()), "H", false),
            Err(RulesError::RulesTable(_))
        ));
        fs::write(dir.path().join("rules.xls"), b"").unwrap();
        assert!(matches!(
            RunConfig::resolve(None, Some(dir.path().to_path_buf()), " ", false),
            Err(RulesError::MalformedColumnSpec { .. })
        ));
    }
}
