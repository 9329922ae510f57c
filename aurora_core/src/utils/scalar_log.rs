//! Training progress log.
//!
//! One `progress.csv` per run directory with `step,tag,value` rows: episode
//! returns as they finish and the PPO losses once per iteration. A resumed
//! run appends to the same file.

use std::fs::{self, File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use crate::error::Result;

pub const PROGRESS_FILE: &str = "progress.csv";
const HEADER: &str = "step,tag,value";

pub struct ScalarLog {
    path: PathBuf,
    writer: BufWriter<File>,
}

impl ScalarLog {
    pub fn create(run_dir: &Path) -> Result<Self> {
        fs::create_dir_all(run_dir)?;
        let path = run_dir.join(PROGRESS_FILE);
        let file = OpenOptions::new().create(true).append(true).open(&path)?;
        let empty = file.metadata()?.len() == 0;
        let mut writer = BufWriter::new(file);
        if empty {
            writeln!(writer, "{}", HEADER)?;
        }
        Ok(Self { path, writer })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn record(&mut self, step: u64, tag: &str, value: f64) -> Result<()> {
        writeln!(self.writer, "{},{},{}", step, tag, value)?;
        Ok(())
    }

    pub fn flush(&mut self) -> Result<()> {
        self.writer.flush()?;
        Ok(())
    }
}
