use image::RgbImage;
use serde::{Deserialize, Serialize};
use std::fs::{self, File, OpenOptions};
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};
use tracing::info;

use crate::error::Result;
use crate::logging::sink::MetricSink;

pub const SCALARS_FILE: &str = "scalars.jsonl";
pub const IMAGES_FILE: &str = "images.jsonl";
pub const IMAGES_DIR: &str = "images";

/// One line of `scalars.jsonl`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScalarRecord {
    pub tag: String,
    pub step: u64,
    pub value: f64,
    pub wall_time: f64,
}

/// One line of `images.jsonl`. `path` is relative to the run directory.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImageRecord {
    pub tag: String,
    pub step: u64,
    pub index: usize,
    pub path: String,
    pub width: u32,
    pub height: u32,
    pub wall_time: f64,
}

/// File-backed event log: one directory per run holding JSON-lines scalar
/// and image indexes plus the PNG files themselves.
pub struct EventLogWriter {
    run_dir: PathBuf,
    scalars: BufWriter<File>,
    images: BufWriter<File>,
}

impl EventLogWriter {
    /// Opens a fresh run directory `<log_dir>/<unix_seconds>_<pid>`.
    pub fn create(log_dir: impl AsRef<Path>) -> Result<EventLogWriter> {
        let run = format!("{}_{}", unix_seconds(), std::process::id());
        EventLogWriter::open(log_dir.as_ref().join(run))
    }

    /// Opens (or continues appending to) the run stored in `run_dir`.
    pub fn open(run_dir: impl Into<PathBuf>) -> Result<EventLogWriter> {
        let run_dir = run_dir.into();
        fs::create_dir_all(run_dir.join(IMAGES_DIR))?;
        let append = |name: &str| -> Result<BufWriter<File>> {
            let file = OpenOptions::new().create(true).append(true).open(run_dir.join(name))?;
            Ok(BufWriter::new(file))
        };
        let scalars = append(SCALARS_FILE)?;
        let images = append(IMAGES_FILE)?;
        info!(run_dir = %run_dir.display(), "event log opened");
        Ok(EventLogWriter { run_dir, scalars, images })
    }

    pub fn run_dir(&self) -> &Path {
        &self.run_dir
    }
}

impl MetricSink for EventLogWriter {
    fn add_scalar(&mut self, tag: &str, value: f64, step: u64) -> Result<()> {
        let record = ScalarRecord { tag: tag.to_owned(), step, value, wall_time: wall_time() };
        serde_json::to_writer(&mut self.scalars, &record)?;
        self.scalars.write_all(b"\n")?;
        Ok(())
    }

    fn add_images(&mut self, tag: &str, images: &[RgbImage], step: u64) -> Result<()> {
        let dir = Path::new(IMAGES_DIR).join(sanitize_tag(tag));
        fs::create_dir_all(self.run_dir.join(&dir))?;
        for (index, img) in images.iter().enumerate() {
            let rel = dir.join(format!("step_{step}_{index}.png"));
            img.save(self.run_dir.join(&rel))?;
            let record = ImageRecord {
                tag: tag.to_owned(),
                step,
                index,
                path: rel.to_string_lossy().replace('\\', "/"),
                width: img.width(),
                height: img.height(),
                wall_time: wall_time(),
            };
            serde_json::to_writer(&mut self.images, &record)?;
            self.images.write_all(b"\n")?;
        }
        Ok(())
    }

    fn flush(&mut self) -> Result<()> {
        self.scalars.flush()?;
        self.images.flush()?;
        Ok(())
    }
}

/// Directory-safe form of a tag, distinct for distinct tags.
///
/// ASCII letters, digits and `-` pass through; `_` becomes `__` and every
/// other byte becomes `_` plus two lowercase hex digits, so
/// `Loss/train` is `Loss_2ftrain` and `Loss_train` is `Loss__train`.
pub fn sanitize_tag(tag: &str) -> String {
    let mut out = String::with_capacity(tag.len());
    for b in tag.bytes() {
        match b {
            b'a'..=b'z' | b'A'..=b'Z' | b'0'..=b'9' | b'-' => out.push(b as char),
            b'_' => out.push_str("__"),
            _ => out.push_str(&format!("_{b:02x}")),
        }
    }
    out
}

/// Run directory names under `log_dir`, oldest first.
pub fn list_runs(log_dir: impl AsRef<Path>) -> Result<Vec<String>> {
    let mut runs = Vec::new();
    for entry in fs::read_dir(log_dir)? {
        let entry = entry?;
        if entry.path().join(SCALARS_FILE).is_file() {
            runs.push(entry.file_name().to_string_lossy().into_owned());
        }
    }
    runs.sort();
    Ok(runs)
}

pub fn read_scalars(run_dir: impl AsRef<Path>) -> Result<Vec<ScalarRecord>> {
    read_lines(&run_dir.as_ref().join(SCALARS_FILE))
}

pub fn read_image_index(run_dir: impl AsRef<Path>) -> Result<Vec<ImageRecord>> {
    read_lines(&run_dir.as_ref().join(IMAGES_FILE))
}

fn read_lines<T: for<'de> Deserialize<'de>>(path: &Path) -> Result<Vec<T>> {
    if !path.exists() {
        return Ok(Vec::new());
    }
    let reader = BufReader::new(File::open(path)?);
    let mut out = Vec::new();
    for line in reader.lines() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        out.push(serde_json::from_str(&line)?);
    }
    Ok(out)
}

fn unix_seconds() -> u64 {
    SystemTime::now().duration_since(UNIX_EPOCH).map(|d| d.as_secs()).unwrap_or(0)
}

fn wall_time() -> f64 {
    SystemTime::now().duration_since(UNIX_EPOCH).map(|d| d.as_secs_f64()).unwrap_or(0.0)
}
