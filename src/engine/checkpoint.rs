use std::path::PathBuf;
use tracing::warn;

/// Called when a run reaches a labelled point of interest.
pub trait CheckpointHook: Send + Sync {
    /// Whether the engine should capture a screenshot to pass along.
    fn wants_screenshot(&self) -> bool {
        false
    }

    fn reached(&self, label: &str, screenshot: Option<&[u8]>);
}

/// Writes `debug_<label>.png` into a directory at every checkpoint.
#[derive(Debug, Clone)]
pub struct ScreenshotDir {
    dir: PathBuf,
}

impl ScreenshotDir {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn path_for(&self, label: &str) -> PathBuf {
        self.dir.join(format!("debug_{}.png", label))
    }
}

impl CheckpointHook for ScreenshotDir {
    fn wants_screenshot(&self) -> bool {
        true
    }

    fn reached(&self, label: &str, screenshot: Option<&[u8]>) {
        let Some(png) = screenshot else {
            return;
        };
        let path = self.path_for(label);
        let written = std::fs::create_dir_all(&self.dir).and_then(|_| std::fs::write(&path, png));
        if let Err(e) = written {
            warn!("could not save {}: {}", path.display(), e);
        }
    }
}
