use image::RgbImage;
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard};

use crate::error::Result;

/// Append-only store for named scalar and image series.
///
/// Observations are keyed by `(tag, step)`. Write failures are fatal to the
/// run; implementations must not swallow them.
pub trait MetricSink {
    fn add_scalar(&mut self, tag: &str, value: f64, step: u64) -> Result<()>;

    fn add_images(&mut self, tag: &str, images: &[RgbImage], step: u64) -> Result<()>;

    fn flush(&mut self) -> Result<()> {
        Ok(())
    }
}

/// One logged scalar observation.
#[derive(Debug, Clone, PartialEq)]
pub struct ScalarPoint {
    pub step: u64,
    pub value: f64,
}

/// One logged image collection: how many images arrived at which step.
#[derive(Debug, Clone, PartialEq)]
pub struct ImagePoint {
    pub step: u64,
    pub count: usize,
    pub width: u32,
    pub height: u32,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct MemoryLog {
    pub scalars: BTreeMap<String, Vec<ScalarPoint>>,
    pub images: BTreeMap<String, Vec<ImagePoint>>,
    pub flushes: usize,
}

/// In-process sink. Clones share the same log, so a test can keep one
/// handle and hand the other to the trainer.
#[derive(Debug, Clone, Default)]
pub struct MemorySink {
    log: Arc<Mutex<MemoryLog>>,
}

impl MemorySink {
    pub fn new() -> Self {
        MemorySink::default()
    }

    fn lock(&self) -> MutexGuard<'_, MemoryLog> {
        // A panicking writer leaves the log itself intact.
        self.log.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn snapshot(&self) -> MemoryLog {
        self.lock().clone()
    }

    /// Values of `tag` in the order they were logged.
    pub fn scalar_series(&self, tag: &str) -> Vec<ScalarPoint> {
        self.lock().scalars.get(tag).cloned().unwrap_or_default()
    }

    pub fn image_steps(&self, tag: &str) -> Vec<u64> {
        self.lock()
            .images
            .get(tag)
            .map(|points| points.iter().map(|p| p.step).collect())
            .unwrap_or_default()
    }
}

impl MetricSink for MemorySink {
    fn add_scalar(&mut self, tag: &str, value: f64, step: u64) -> Result<()> {
        self.lock().scalars.entry(tag.to_owned()).or_default().push(ScalarPoint { step, value });
        Ok(())
    }

    fn add_images(&mut self, tag: &str, images: &[RgbImage], step: u64) -> Result<()> {
        let (width, height) = images.first().map(|img| img.dimensions()).unwrap_or((0, 0));
        self.lock().images.entry(tag.to_owned()).or_default().push(ImagePoint {
            step,
            count: images.len(),
            width,
            height,
        });
        Ok(())
    }

    fn flush(&mut self) -> Result<()> {
        self.lock().flushes += 1;
        Ok(())
    }
}
