use authz::PolicyStoreDelegate;
use notify::{Config, Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::error::Result;
use crate::policy_sync::reconcile_policy_file;

/// Re-applies the predefined policy file whenever it changes.
///
/// Dropping the handle stops watching.
pub struct PolicyFileWatcher {
    _watcher: RecommendedWatcher,
    task: JoinHandle<()>,
}

impl PolicyFileWatcher {
    /// Watches the file's directory, so editors that replace the file on save
    /// are still seen. Must be called inside a tokio runtime.
    pub fn start(delegate: Arc<PolicyStoreDelegate>, path: PathBuf) -> Result<Self> {
        let (tx, mut rx) = mpsc::unbounded_channel();

        let mut watcher = RecommendedWatcher::new(
            move |res: std::result::Result<Event, notify::Error>| match res {
                Ok(event) => {
                    let _ = tx.send(event);
                }
                Err(err) => warn!("Policy file watch error: {}", err),
            },
            Config::default().with_poll_interval(Duration::from_secs(1)),
        )?;

        let directory = path
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .unwrap_or_else(|| Path::new("."))
            .to_path_buf();
        watcher.watch(&directory, RecursiveMode::NonRecursive)?;
        info!("Watching policy file {:?}", path);

        let task = tokio::spawn(async move {
            while let Some(event) = rx.recv().await {
                if !is_policy_file_event(&event, &path) {
                    continue;
                }
                debug!("Policy file event: {:?}", event);
                match reconcile_policy_file(&delegate, Some(&path)).await {
                    Ok(report) => info!("Reloaded policy file {:?}: {:?}", path, report),
                    Err(err) => error!(
                        "Failed to reload policy file {:?}, keeping previous rules: {}",
                        path, err
                    ),
                }
            }
        });

        Ok(Self {
            _watcher: watcher,
            task,
        })
    }
}

impl Drop for PolicyFileWatcher {
    fn drop(&mut self) {
        self.task.abort();
    }
}

/// True for creations and writes of the watched file.
pub(crate) fn is_policy_file_event(event: &Event, path: &Path) -> bool {
    matches!(event.kind, EventKind::Modify(_) | EventKind::Create(_))
        && event
            .paths
            .iter()
            .any(|p| p.file_name().is_some() && p.file_name() == path.file_name())
}
