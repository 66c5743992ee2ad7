//! This module provides the on-disk storage of the task lists
//!
//! The active list and the archive are two pretty-printed JSON arrays.
//! Files are replaced atomically, so that a crash never leaves a half-written list behind.

use std::io::Write;
use std::path::{Path, PathBuf};

use tempfile::NamedTempFile;

use crate::error::{Error, Result};
use crate::task::Task;

/// File name of the active list
pub const TASKS_FILE: &str = "tasks.json";
/// File name of the archive list
pub const ARCHIVE_FILE: &str = "archive.json";


/// The folder that holds the task files
#[derive(Clone, Debug, PartialEq)]
pub struct Cache {
    folder: PathBuf,
}

impl Cache {
    pub fn new<P: Into<PathBuf>>(folder: P) -> Self {
        Self { folder: folder.into() }
    }

    pub fn folder(&self) -> &Path {
        &self.folder
    }

    fn tasks_file(&self) -> PathBuf {
        self.folder.join(TASKS_FILE)
    }

    fn archive_file(&self) -> PathBuf {
        self.folder.join(ARCHIVE_FILE)
    }

    /// Read the active list. A missing file is an empty list
    pub fn load_active(&self) -> Result<Vec<Task>> {
        load_from(&self.tasks_file())
    }

    /// Read the archive list. A missing file is an empty list
    pub fn load_archive(&self) -> Result<Vec<Task>> {
        load_from(&self.archive_file())
    }

    pub fn save_active(&self, tasks: &[Task]) -> Result<()> {
        self.save_to(&self.tasks_file(), tasks)
    }

    pub fn save_archive(&self, tasks: &[Task]) -> Result<()> {
        self.save_to(&self.archive_file(), tasks)
    }

    /// Write to a temporary file in the same folder, then rename it over the target
    fn save_to(&self, path: &Path, tasks: &[Task]) -> Result<()> {
        std::fs::create_dir_all(&self.folder)?;

        let mut file = NamedTempFile::new_in(&self.folder)?;
        serde_json::to_writer_pretty(&mut file, tasks)?;
        file.write_all(b"\n")?;
        file.as_file().sync_all()?;
        file.persist(path).map_err(|err| Error::Io(err.error))?;

        log::debug!("Saved {} tasks to {:?}", tasks.len(), path);
        Ok(())
    }
}

fn load_from(path: &Path) -> Result<Vec<Task>> {
    let content = match std::fs::read_to_string(path) {
        Ok(content) => content,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
            log::debug!("{:?} does not exist yet", path);
            return Ok(Vec::new());
        },
        Err(err) => return Err(err.into()),
    };
    if content.trim().is_empty() {
        return Ok(Vec::new());
    }

    let values: Vec<serde_json::Value> = serde_json::from_str(&content)
        .map_err(|err| Error::Parse(format!("{:?} is not a JSON array of tasks: {}", path, err)))?;

    let mut tasks = Vec::with_capacity(values.len());
    for (index, value) in values.into_iter().enumerate() {
        match serde_json::from_value::<Task>(value) {
            Ok(task) => tasks.push(task),
            Err(err) => log::warn!("Skipping item #{} of {:?}: {}", index, path, err),
        }
    }
    Ok(tasks)
}
