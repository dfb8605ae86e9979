//! Finding the helper executable.

use std::io;
use std::path::{Path, PathBuf};

use crate::config::HelperConfig;

const SIBLING_DIR: &str = "NativeBridge";
const NATIVE_DIR: &str = "native";

/// What to execute and where.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HelperLaunch {
    pub program: PathBuf,
    pub args: Vec<String>,
    pub working_dir: Option<PathBuf>,
}

/// Searches a fixed list of directories relative to a base directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HelperLocator {
    base_dir: PathBuf,
    executable: String,
}

impl HelperLocator {
    pub fn new(base_dir: impl Into<PathBuf>, executable: impl Into<String>) -> Self {
        Self {
            base_dir: base_dir.into(),
            executable: executable.into(),
        }
    }

    pub fn from_current_dir(executable: impl Into<String>) -> io::Result<Self> {
        Ok(Self::new(std::env::current_dir()?, executable))
    }

    /// Search order: sibling `NativeBridge`, local `native`, then the base itself.
    pub fn candidates(&self) -> Vec<PathBuf> {
        let sibling = match self.base_dir.parent() {
            Some(parent) => parent.join(SIBLING_DIR),
            None => self.base_dir.join("..").join(SIBLING_DIR),
        };
        vec![
            sibling.join(&self.executable),
            self.base_dir.join(NATIVE_DIR).join(&self.executable),
            self.base_dir.join(&self.executable),
        ]
    }

    /// First candidate that exists as a regular file.
    pub fn resolve(&self) -> Option<PathBuf> {
        self.candidates().into_iter().find(|path| path.is_file())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HelperSource {
    Search {
        locator: HelperLocator,
        args: Vec<String>,
    },
    Fixed(HelperLaunch),
}

impl HelperSource {
    pub fn from_config(config: &HelperConfig) -> io::Result<Self> {
        if let Some(command) = &config.command {
            return Ok(HelperSource::Fixed(HelperLaunch {
                program: command.clone(),
                args: config.args.clone(),
                working_dir: parent_dir(command),
            }));
        }

        Ok(HelperSource::Search {
            locator: HelperLocator::from_current_dir(config.executable.clone())?,
            args: config.args.clone(),
        })
    }

    /// Resolves to a launch, or the candidates that were tried.
    pub fn launch(&self) -> Result<HelperLaunch, Vec<PathBuf>> {
        match self {
            HelperSource::Fixed(launch) => Ok(launch.clone()),
            HelperSource::Search { locator, args } => match locator.resolve() {
                Some(program) => Ok(HelperLaunch {
                    working_dir: parent_dir(&program),
                    program,
                    args: args.clone(),
                }),
                None => Err(locator.candidates()),
            },
        }
    }
}

fn parent_dir(program: &Path) -> Option<PathBuf> {
    program
        .parent()
        .filter(|dir| !dir.as_os_str().is_empty())
        .map(Path::to_path_buf)
}
