//! Target sources: where the list of URLs to probe comes from.
//!
//! The file format is one URL per line. Blank lines and lines starting
//! with `//` or `#` are skipped, as are lines that are not absolute URLs.

use std::collections::HashSet;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use tracing::{debug, info, warn};

use reachgrid_core::Target;

use crate::error::SourceResult;

/// Supplies the current ordered list of unique targets.
pub trait TargetSource: Send + Sync {
    fn current_targets(&self) -> Arc<[Target]>;
}

/// Parse target file contents, keeping first-seen order.
pub fn parse_targets(input: &str) -> Vec<Target> {
    let mut seen = HashSet::new();
    input
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with("//") && !line.starts_with('#'))
        .filter_map(|line| {
            let target = Target::parse(line);
            if target.is_none() {
                debug!(line, "skipping line that is not an absolute URL");
            }
            target
        })
        .filter(|target| seen.insert(target.clone()))
        .collect()
}

/// A fixed target list.
pub struct StaticTargets {
    targets: Arc<[Target]>,
}

impl StaticTargets {
    pub fn new(targets: Vec<Target>) -> Self {
        Self {
            targets: targets.into(),
        }
    }

    pub fn from_text(input: &str) -> Self {
        Self::new(parse_targets(input))
    }

    pub fn empty() -> Self {
        Self::new(Vec::new())
    }
}

impl TargetSource for StaticTargets {
    fn current_targets(&self) -> Arc<[Target]> {
        self.targets.clone()
    }
}

/// Targets read from a text file and re-read whenever the file changes.
///
/// A filesystem watcher only raises a dirty flag; the file is re-parsed
/// lazily by the next caller of [`current_targets`](TargetSource::current_targets).
pub struct FileTargets {
    path: PathBuf,
    dirty: Arc<AtomicBool>,
    cached: Mutex<Arc<[Target]>>,
    _watcher: Option<RecommendedWatcher>,
}

impl FileTargets {
    /// Open a target file and start watching it for changes.
    ///
    /// The file does not have to exist yet; until it does, the target list
    /// is empty. Its parent directory must exist.
    pub fn watch(path: impl Into<PathBuf>) -> SourceResult<Self> {
        let path = path.into();
        let dirty = Arc::new(AtomicBool::new(true));
        let watcher = spawn_watcher(&path, dirty.clone())?;
        info!(path = %path.display(), "watching target file");
        Ok(Self {
            path,
            dirty,
            cached: Mutex::new(Vec::<Target>::new().into()),
            _watcher: Some(watcher),
        })
    }

    /// Open a target file without a watcher. Changes are only picked up
    /// after [`mark_dirty`](Self::mark_dirty).
    pub fn unwatched(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            dirty: Arc::new(AtomicBool::new(true)),
            cached: Mutex::new(Vec::<Target>::new().into()),
            _watcher: None,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Force a re-read on the next access.
    pub fn mark_dirty(&self) {
        self.dirty.store(true, Ordering::Release);
    }

    fn load(&self, previous: &Arc<[Target]>) -> Arc<[Target]> {
        match std::fs::read_to_string(&self.path) {
            Ok(text) => {
                let targets = parse_targets(&text);
                info!(
                    path = %self.path.display(),
                    count = targets.len(),
                    "target file reloaded"
                );
                targets.into()
            }
            Err(e) if e.kind() == ErrorKind::NotFound => {
                warn!(path = %self.path.display(), "target file missing, no targets");
                Vec::<Target>::new().into()
            }
            Err(e) => {
                warn!(path = %self.path.display(), error = %e, "target file unreadable, keeping previous list");
                previous.clone()
            }
        }
    }
}

impl TargetSource for FileTargets {
    fn current_targets(&self) -> Arc<[Target]> {
        let mut cached = self.cached.lock().expect("target cache lock");
        if self.dirty.swap(false, Ordering::AcqRel) {
            *cached = self.load(&cached);
        }
        cached.clone()
    }
}

/// Watch the file's directory so that editors replacing the file
/// (write to temp, rename over) are still noticed.
fn spawn_watcher(path: &Path, dirty: Arc<AtomicBool>) -> SourceResult<RecommendedWatcher> {
    let file_name = path.file_name().map(|n| n.to_os_string());
    let dir = match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
        _ => PathBuf::from("."),
    };

    let mut watcher = notify::recommended_watcher(move |res: notify::Result<Event>| match res {
        Ok(event) => {
            if matches!(event.kind, EventKind::Access(_)) {
                return;
            }
            let touches_file = event
                .paths
                .iter()
                .any(|p| p.file_name().map(|n| n.to_os_string()) == file_name);
            if touches_file {
                dirty.store(true, Ordering::Release);
            }
        }
        Err(e) => warn!(error = %e, "target file watcher error"),
    })?;
    watcher.watch(&dir, RecursiveMode::NonRecursive)?;
    Ok(watcher)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::{Duration, Instant};

    #[test]
    fn parse_skips_comments_blanks_and_junk() {
        let text = "
// https://commented.example
# https://hashed.example
https://a.example/

   https://b.example/path?q=1
not a url
https://a.example/
";
        let targets = parse_targets(text);
        let urls: Vec<&str> = targets.iter().map(|t| t.as_str()).collect();
        assert_eq!(urls, vec!["https://a.example/", "https://b.example/path?q=1"]);
    }

    #[test]
    fn static_targets_are_fixed() {
        let source = StaticTargets::from_text("https://a.example\nhttps://b.example\n");
        assert_eq!(source.current_targets().len(), 2);
        assert!(StaticTargets::empty().current_targets().is_empty());
    }

    #[test]
    fn missing_file_yields_empty_list() {
        let dir = tempfile::tempdir().unwrap();
        let source = FileTargets::unwatched(dir.path().join("urls.txt"));
        assert!(source.current_targets().is_empty());
    }

    #[test]
    fn reload_only_after_mark_dirty() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("urls.txt");
        std::fs::write(&path, "https://a.example\n").unwrap();

        let source = FileTargets::unwatched(&path);
        assert_eq!(source.current_targets().len(), 1);

        std::fs::write(&path, "https://a.example\nhttps://b.example\n").unwrap();
        assert_eq!(source.current_targets().len(), 1);

        source.mark_dirty();
        assert_eq!(source.current_targets().len(), 2);
    }

    #[test]
    fn watcher_picks_up_changes() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("urls.txt");
        std::fs::write(&path, "https://a.example\n").unwrap();

        let source = FileTargets::watch(&path).unwrap();
        assert_eq!(source.current_targets().len(), 1);

        std::fs::write(&path, "https://a.example\nhttps://b.example\nhttps://c.example\n")
            .unwrap();

        let deadline = Instant::now() + Duration::from_secs(5);
        while source.current_targets().len() != 3 && Instant::now() < deadline {
            std::thread::sleep(Duration::from_millis(20));
        }
        assert_eq!(source.current_targets().len(), 3);
    }
}
