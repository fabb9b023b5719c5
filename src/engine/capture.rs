//! Popup and download capture.
//!
//! Both snapshot what exists before firing the trigger, then poll for
//! something new, so an event that fires immediately is never missed.

use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::time::{sleep, Instant};
use tracing::{debug, info};

use super::{Engine, RunState};
use crate::config::steps::{ExpectDownloadStep, ExpectPopupStep};
use crate::driver::Driver;
use crate::{Error, Result};

/// Suffixes browsers use while a download is still being written.
const PARTIAL_SUFFIXES: &[&str] = &["crdownload", "part", "tmp", "download"];

impl<D: Driver> Engine<D> {
    pub(super) async fn expect_popup(&mut self, s: &ExpectPopupStep) -> Result<()> {
        self.state = RunState::PopupSwitch;
        let timeout = self.timeouts.step(s.timeout_ms);
        let before: HashSet<String> = self
            .driver
            .pages()
            .await?
            .into_iter()
            .map(|p| p.id)
            .collect();

        self.interact(&s.trigger).await?;
        self.state = RunState::PopupSwitch;

        let deadline = Instant::now() + timeout;
        let popup = loop {
            let fresh = self
                .driver
                .pages()
                .await?
                .into_iter()
                .find(|p| !before.contains(&p.id) && !p.is_blank());
            if let Some(page) = fresh {
                break page;
            }
            if Instant::now() >= deadline {
                return Err(Error::Timeout(format!(
                    "no new window after {} within {}ms",
                    s.trigger.describe(),
                    timeout.as_millis()
                )));
            }
            sleep(self.timeouts.poll()).await;
        };

        info!("popup opened: {}", popup.url);
        self.driver.switch_to(&popup).await?;
        self.driver.wait_for_load(timeout).await
    }

    pub(super) async fn expect_download(&mut self, s: &ExpectDownloadStep) -> Result<()> {
        self.state = RunState::DownloadWait;
        let timeout = self.timeouts.download(s.timeout_ms);
        let watch = self.downloads.watch_dir().to_path_buf();
        std::fs::create_dir_all(&watch)?;
        std::fs::create_dir_all(&self.downloads.dir)?;

        self.driver.set_download_dir(&watch).await?;
        let before = snapshot(&watch)?;

        self.interact(&s.trigger).await?;
        self.state = RunState::DownloadWait;

        let found = wait_for_file(&watch, &before, timeout, self.timeouts.poll()).await?;
        let target = self.downloads.dir.join(&s.save_as);
        move_file(&found, &target)?;
        info!("download saved as {}", target.display());
        self.saved.push(target);
        Ok(())
    }

    /// Remove earlier downloads so the next capture cannot pick them up.
    /// An empty list means the configured spreadsheet extensions.
    pub(super) fn clear_downloads(&self, extensions: &[String]) -> Result<usize> {
        let extensions = if extensions.is_empty() {
            self.downloads.extensions.as_slice()
        } else {
            extensions
        };
        let mut dirs = vec![self.downloads.dir.as_path()];
        if self.downloads.watch_dir() != self.downloads.dir {
            dirs.push(self.downloads.watch_dir());
        }

        let mut removed = 0;
        for dir in dirs {
            if !dir.is_dir() {
                continue;
            }
            for entry in std::fs::read_dir(dir)? {
                let path = entry?.path();
                if path.is_file() && has_extension(&path, extensions) {
                    debug!("removing {}", path.display());
                    std::fs::remove_file(&path)?;
                    removed += 1;
                }
            }
        }
        Ok(removed)
    }
}

fn has_extension(path: &Path, extensions: &[String]) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .is_some_and(|ext| extensions.iter().any(|want| want.eq_ignore_ascii_case(ext)))
}

fn is_partial(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .is_some_and(|ext| PARTIAL_SUFFIXES.iter().any(|p| p.eq_ignore_ascii_case(ext)))
}

/// Files currently in `dir`.
fn snapshot(dir: &Path) -> Result<HashSet<PathBuf>> {
    let mut files = HashSet::new();
    for entry in std::fs::read_dir(dir)? {
        let path = entry?.path();
        if path.is_file() {
            files.insert(path);
        }
    }
    Ok(files)
}

/// Wait for a new, complete file in `dir`: not in `before`, not a partial
/// download, non-empty, and the same size on two consecutive polls.
async fn wait_for_file(
    dir: &Path,
    before: &HashSet<PathBuf>,
    timeout: Duration,
    poll: Duration,
) -> Result<PathBuf> {
    let deadline = Instant::now() + timeout;
    let mut sizes: HashMap<PathBuf, u64> = HashMap::new();

    loop {
        for path in snapshot(dir)? {
            if before.contains(&path) || is_partial(&path) {
                continue;
            }
            let size = std::fs::metadata(&path).map(|m| m.len()).unwrap_or(0);
            if size > 0 && sizes.get(&path) == Some(&size) {
                debug!("download complete: {} ({} bytes)", path.display(), size);
                return Ok(path);
            }
            sizes.insert(path, size);
        }

        if Instant::now() >= deadline {
            return Err(Error::Timeout(format!(
                "no download finished in {} within {}ms",
                dir.display(),
                timeout.as_millis()
            )));
        }
        sleep(poll).await;
    }
}

fn move_file(from: &Path, to: &Path) -> Result<()> {
    if from == to {
        return Ok(());
    }
    if to.exists() {
        std::fs::remove_file(to)?;
    }
    // rename fails across filesystems
    if std::fs::rename(from, to).is_err() {
        std::fs::copy(from, to)?;
        std::fs::remove_file(from)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_downloads_ignored() {
        assert!(is_partial(Path::new("Rentas.xlsx.crdownload")));
        assert!(is_partial(Path::new("report.part")));
        assert!(!is_partial(Path::new("Rentas_2025-05.xlsx")));
    }

    #[test]
    fn test_extension_match_is_case_insensitive() {
        let wanted = vec!["xlsx".to_string(), "xls".to_string()];
        assert!(has_extension(Path::new("a/REPORTE.XLSX"), &wanted));
        assert!(has_extension(Path::new("old.xls"), &wanted));
        assert!(!has_extension(Path::new("notes.txt"), &wanted));
        assert!(!has_extension(Path::new("no_extension"), &wanted));
    }

    #[tokio::test(start_paused = true)]
    async fn test_wait_for_file_skips_existing() {
        let tmp = tempfile::tempdir().unwrap();
        std::fs::write(tmp.path().join("old.xlsx"), b"old").unwrap();
        let before = snapshot(tmp.path()).unwrap();
        std::fs::write(tmp.path().join("consulta.xlsx.crdownload"), b"partial").unwrap();
        std::fs::write(tmp.path().join("consulta.xlsx"), b"new data").unwrap();

        let found = wait_for_file(
            tmp.path(),
            &before,
            Duration::from_secs(5),
            Duration::from_millis(250),
        )
        .await
        .unwrap();
        assert_eq!(found, tmp.path().join("consulta.xlsx"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_wait_for_file_times_out() {
        let tmp = tempfile::tempdir().unwrap();
        let before = snapshot(tmp.path()).unwrap();
        let err = wait_for_file(
            tmp.path(),
            &before,
            Duration::from_secs(2),
            Duration::from_millis(250),
        )
        .await
        .unwrap_err();
        assert!(matches!(err, Error::Timeout(_)));
    }

    #[test]
    fn test_move_file_replaces_target() {
        let tmp = tempfile::tempdir().unwrap();
        let from = tmp.path().join("consulta.xlsx");
        let to = tmp.path().join("Rentas_2025-05.xlsx");
        std::fs::write(&from, b"new").unwrap();
        std::fs::write(&to, b"stale").unwrap();
        move_file(&from, &to).unwrap();
        assert!(!from.exists());
        assert_eq!(std::fs::read(&to).unwrap(), b"new");
    }
}
