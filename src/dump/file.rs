use chrono::NaiveDateTime;
use std::path::{Path, PathBuf};

pub const DUMP_PREFIX: &str = "dump";
pub const DUMP_EXTENSION: &str = "sql";
pub const TIMESTAMP_FORMAT: &str = "%Y%m%d%H%M%S";

/// Naming of a dump file inside the output directory.
///
/// The name is `<prefix><separator><suffix>.<extension>`; an empty prefix
/// or suffix drops the separator, both empty means no name at all.
#[derive(Debug, Clone)]
pub struct DumpFile {
    pub separator: String,
    pub prefix: String,
    pub suffix: String,
    pub extension: String,
    pub directory: PathBuf,
}

impl DumpFile {
    /// `dump-<YYYYmmddHHMMSS>.sql` in `directory`.
    pub fn timestamped(directory: &Path, at: NaiveDateTime) -> Self {
        Self {
            separator: "-".to_string(),
            prefix: DUMP_PREFIX.to_string(),
            suffix: at.format(TIMESTAMP_FORMAT).to_string(),
            extension: DUMP_EXTENSION.to_string(),
            directory: directory.to_path_buf(),
        }
    }

    pub fn file_name(&self) -> Option<String> {
        match (self.prefix.is_empty(), self.suffix.is_empty()) {
            (true, true) => None,
            (true, false) => Some(format!("{}.{}", self.suffix, self.extension)),
            (false, true) => Some(format!("{}.{}", self.prefix, self.extension)),
            (false, false) => Some(format!(
                "{}{}{}.{}",
                self.prefix, self.separator, self.suffix, self.extension
            )),
        }
    }

    pub fn path(&self) -> Option<PathBuf> {
        if self.directory.as_os_str().is_empty() {
            return None;
        }
        self.file_name().map(|n| self.directory.join(n))
    }
}
