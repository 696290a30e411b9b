//! Filesystem watching for the data directory.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use tokio::sync::mpsc;
use tracing::debug;

use crate::catalog::Collection;

/// Events emitted by [`SourceWatcher`].
#[derive(Debug)]
pub enum WatchEvent {
    /// A collection's backing file was created, modified, or removed.
    Changed(Collection),
    /// The watcher reported an error.
    Error(anyhow::Error),
}

/// Watches a data directory and reports collection file changes.
///
/// Dropping the watcher stops the notifications.
pub struct SourceWatcher {
    _watcher: RecommendedWatcher,
    root: PathBuf,
}

impl SourceWatcher {
    /// Start watching `root`, sending events to `sender`.
    pub fn spawn(root: impl AsRef<Path>, sender: mpsc::Sender<WatchEvent>) -> Result<Self> {
        let root = root.as_ref().to_path_buf();
        let mut watcher = notify::recommended_watcher(move |res: notify::Result<Event>| {
            let events = match res {
                Ok(event) => changed_collections(&event),
                Err(err) => vec![WatchEvent::Error(err.into())],
            };
            for event in events {
                if sender.blocking_send(event).is_err() {
                    debug!("watch receiver dropped");
                    return;
                }
            }
        })
        .context("failed to create filesystem watcher")?;
        watcher
            .watch(&root, RecursiveMode::NonRecursive)
            .with_context(|| format!("failed to watch {}", root.display()))?;
        Ok(Self {
            _watcher: watcher,
            root,
        })
    }

    /// Directory being watched.
    pub fn root(&self) -> &Path {
        &self.root
    }
}

fn changed_collections(event: &Event) -> Vec<WatchEvent> {
    if !matches!(
        event.kind,
        EventKind::Create(_) | EventKind::Modify(_) | EventKind::Remove(_)
    ) {
        return Vec::new();
    }
    let mut changed: Vec<Collection> = event
        .paths
        .iter()
        .filter_map(|path| Collection::from_path(path))
        .collect();
    changed.dedup();
    changed.into_iter().map(WatchEvent::Changed).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use notify::event::{AccessKind, CreateKind, ModifyKind};

    fn event(kind: EventKind, paths: &[&str]) -> Event {
        paths
            .iter()
            .fold(Event::new(kind), |event, path| event.add_path(PathBuf::from(path)))
    }

    #[test]
    fn reports_collection_file_writes() {
        let events = changed_collections(&event(
            EventKind::Modify(ModifyKind::Any),
            &["/data/leaderboard.json", "/data/leaderboard.json", "/data/notes.md"],
        ));
        assert_eq!(events.len(), 1);
        assert!(matches!(events[0], WatchEvent::Changed(Collection::Leaderboard)));

        let events = changed_collections(&event(
            EventKind::Create(CreateKind::File),
            &["/data/statistics.json"],
        ));
        assert!(matches!(events[0], WatchEvent::Changed(Collection::Statistics)));
    }

    #[test]
    fn ignores_reads() {
        let events = changed_collections(&event(
            EventKind::Access(AccessKind::Any),
            &["/data/achievements.json"],
        ));
        assert!(events.is_empty());
    }
}
