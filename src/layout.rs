// layout.rs - Output directory tree of a campaign

use std::fmt;
use std::fs;
use std::path::{Path, PathBuf, MAIN_SEPARATOR};

use tracing::info;

use crate::context::Context;
use crate::error::{Error, Result};
use crate::template::Template;

/// The four directories every campaign writes into (or references).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DirectoryRole {
    Macros,
    Data,
    Jobs,
    Logs,
}

impl DirectoryRole {
    pub const ALL: [DirectoryRole; 4] = [
        DirectoryRole::Macros,
        DirectoryRole::Data,
        DirectoryRole::Jobs,
        DirectoryRole::Logs,
    ];

    /// Directory name on disk.
    pub fn dir_name(self) -> &'static str {
        match self {
            DirectoryRole::Macros => "macs",
            DirectoryRole::Data   => "data",
            DirectoryRole::Jobs   => "jobs",
            DirectoryRole::Logs   => "logs",
        }
    }

    /// Name under which the directory is exposed to templates.
    pub fn context_key(self) -> &'static str {
        match self {
            DirectoryRole::Macros => "macs_path",
            DirectoryRole::Data   => "data_path",
            DirectoryRole::Jobs   => "jobs_path",
            DirectoryRole::Logs   => "logs_path",
        }
    }
}

impl fmt::Display for DirectoryRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.dir_name())
    }
}

/// Resolved output directories for one run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputLayout {
    pub macros: PathBuf,
    pub data:   PathBuf,
    pub jobs:   PathBuf,
    pub logs:   PathBuf,
}

impl OutputLayout {
    /// All four directories directly under `root`.
    pub fn under(root: &Path) -> Self {
        Self {
            macros: root.join(DirectoryRole::Macros.dir_name()),
            data:   root.join(DirectoryRole::Data.dir_name()),
            jobs:   root.join(DirectoryRole::Jobs.dir_name()),
            logs:   root.join(DirectoryRole::Logs.dir_name()),
        }
    }

    /// Render the campaign path template (e.g. `ELsim/photo/{region}`)
    /// against the campaign parameters and place it under `data_root`.
    pub fn resolve(data_root: &Path, path_template: &str, params: &Context) -> Result<Self> {
        let tpl = Template::parse("campaign path", path_template)?;
        let sub = tpl.render(params)?;
        Ok(Self::under(&data_root.join(sub)))
    }

    pub fn dir(&self, role: DirectoryRole) -> &Path {
        match role {
            DirectoryRole::Macros => &self.macros,
            DirectoryRole::Data   => &self.data,
            DirectoryRole::Jobs   => &self.jobs,
            DirectoryRole::Logs   => &self.logs,
        }
    }

    pub fn paths(&self) -> [&Path; 4] {
        DirectoryRole::ALL.map(|r| self.dir(r))
    }

    /// Expose the directories as `macs_path`, `data_path`, ... with a
    /// trailing separator, so templates may write `{data_path}{datafile}`.
    pub fn context(&self) -> Context {
        let mut ctx = Context::new();
        for role in DirectoryRole::ALL {
            let dir = format!("{}{}", self.dir(role).display(), MAIN_SEPARATOR);
            ctx.set(role.context_key(), dir);
        }
        ctx
    }
}

/// Create every path (and missing parents) that does not exist yet.
pub fn ensure_directories<P: AsRef<Path>>(paths: &[P]) -> Result<()> {
    for path in paths {
        let path = path.as_ref();
        if path.is_dir() {
            continue;
        }
        info!(path = %path.display(), "creating directory");
        fs::create_dir_all(path).map_err(|source| Error::DirectoryCreateFailed {
            path: path.to_path_buf(),
            source,
        })?;
    }
    Ok(())
}
