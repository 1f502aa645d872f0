//! Re-testing skeletons when their files change.
//!
//! Notifications are coalesced per path: each change (re)arms a pending
//! re-test for that path which fires once the path has been quiet for the
//! debounce delay. A fired re-test resets the owning skeleton, runs it over
//! the files it owns and reports it.

use crate::errors::{HarnessError, HarnessResult};
use crate::loader;
use crate::report::{self, ReportRow};
use crate::session::Session;
use crate::skeleton::SkeletonId;
use notify::event::{ModifyKind, RenameMode};
use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::mpsc::{self, RecvTimeoutError};
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// Idle wait between checks when nothing is pending.
const IDLE_POLL: Duration = Duration::from_secs(1);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MonitorState {
    Idle,
    Processing(SkeletonId),
}

/// A filesystem notification reduced to what the monitor acts on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChangeEvent {
    Changed(PathBuf),
    Renamed { from: PathBuf, to: Option<PathBuf> },
}

/// Map a notify event; removals, access and metadata-only events are dropped.
pub fn change_events(event: Event) -> Vec<ChangeEvent> {
    let Event { kind, paths, .. } = event;
    match kind {
        EventKind::Modify(ModifyKind::Name(RenameMode::Both)) => {
            let mut paths = paths.into_iter();
            match paths.next() {
                Some(from) => vec![ChangeEvent::Renamed {
                    from,
                    to: paths.next(),
                }],
                None => Vec::new(),
            }
        }
        EventKind::Modify(ModifyKind::Name(_)) => paths
            .into_iter()
            .map(|from| ChangeEvent::Renamed { from, to: None })
            .collect(),
        EventKind::Modify(ModifyKind::Metadata(_)) => Vec::new(),
        EventKind::Create(_) | EventKind::Modify(_) => {
            paths.into_iter().map(ChangeEvent::Changed).collect()
        }
        _ => Vec::new(),
    }
}

/// Pending re-tests keyed by relative path, each with its own deadline.
#[derive(Debug)]
pub struct Debouncer {
    delay: Duration,
    pending: HashMap<String, Instant>,
}

impl Debouncer {
    pub fn new(delay: Duration) -> Self {
        Self {
            delay,
            pending: HashMap::new(),
        }
    }

    /// Arm (or re-arm) the task for `key`. Returns `true` when an earlier
    /// pending task was replaced.
    pub fn schedule(&mut self, key: String, now: Instant) -> bool {
        self.pending.insert(key, now + self.delay).is_some()
    }

    pub fn cancel(&mut self, key: &str) -> bool {
        self.pending.remove(key).is_some()
    }

    pub fn next_deadline(&self) -> Option<Instant> {
        self.pending.values().min().copied()
    }

    /// Remove and return every key whose deadline has passed, oldest first.
    pub fn drain_ready(&mut self, now: Instant) -> Vec<String> {
        let mut ready: Vec<(Instant, String)> = self
            .pending
            .iter()
            .filter(|(_, deadline)| **deadline <= now)
            .map(|(key, deadline)| (*deadline, key.clone()))
            .collect();
        ready.sort();
        for (_, key) in &ready {
            self.pending.remove(key);
        }
        ready.into_iter().map(|(_, key)| key).collect()
    }

    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }
}

/// Drives re-tests for one session.
pub struct Monitor<'a, F> {
    session: &'a Session,
    root: PathBuf,
    debouncer: Debouncer,
    state: MonitorState,
    on_report: F,
}

impl<'a, F> Monitor<'a, F>
where
    F: FnMut(SkeletonId, &[ReportRow]),
{
    pub fn new(session: &'a Session, on_report: F) -> Self {
        let root = session
            .root()
            .canonicalize()
            .unwrap_or_else(|_| session.root().to_path_buf());
        Self {
            session,
            root,
            debouncer: Debouncer::new(session.config().debounce()),
            state: MonitorState::Idle,
            on_report,
        }
    }

    pub fn state(&self) -> MonitorState {
        self.state
    }

    pub fn pending(&self) -> usize {
        self.debouncer.len()
    }

    fn key(&self, path: &Path) -> String {
        let base = if path.starts_with(&self.root) {
            self.root.as_path()
        } else {
            self.session.root()
        };
        loader::relative_key(base, path)
    }

    /// Record a notification. Only owned paths arm a re-test; renames of
    /// owned paths are logged and otherwise ignored.
    pub fn handle(&mut self, event: ChangeEvent, now: Instant) {
        match event {
            ChangeEvent::Changed(path) => {
                let key = self.key(&path);
                if self.session.owner_of(&key).is_none() {
                    return;
                }
                if self.debouncer.schedule(key.clone(), now) {
                    debug!(file = %key, "change coalesced");
                }
            }
            ChangeEvent::Renamed { from, to } => {
                let key = self.key(&from);
                if self.session.owner_of(&key).is_some() {
                    let to = to.map(|p| self.key(&p)).unwrap_or_default();
                    info!(from = %key, to = %to, "owned file renamed; ownership is now stale");
                }
            }
        }
    }

    /// Re-test every skeleton whose pending path has gone quiet. Returns the
    /// skeletons processed, in order.
    pub fn process_ready(&mut self, now: Instant) -> Vec<SkeletonId> {
        let mut processed = Vec::new();
        for key in self.debouncer.drain_ready(now) {
            let Some(id) = self.session.owner_of(&key) else {
                continue;
            };
            if processed.contains(&id) {
                continue;
            }

            self.state = MonitorState::Processing(id);
            info!(file = %key, skeleton = id.0, "detected change");
            self.session.retest(id);
            if let Some(skeleton) = self.session.skeleton(id) {
                let rows = report::skeleton_rows(&skeleton.lock());
                (self.on_report)(id, &rows);
            }
            self.state = MonitorState::Idle;
            processed.push(id);
        }
        processed
    }

    /// Watch the root recursively until the notification channel closes.
    pub fn run(mut self) -> HarnessResult<()> {
        let (tx, rx) = mpsc::channel::<notify::Result<Event>>();
        let mut watcher: RecommendedWatcher = notify::recommended_watcher(move |event| {
            if tx.send(event).is_err() {
                debug!("watch event dropped because the monitor stopped");
            }
        })
        .map_err(|e| HarnessError::Watch(e.to_string()))?;
        watcher
            .watch(&self.root, RecursiveMode::Recursive)
            .map_err(|e| HarnessError::Watch(e.to_string()))?;
        info!(root = %self.root.display(), "watching for changes");

        loop {
            let timeout = self
                .debouncer
                .next_deadline()
                .map_or(IDLE_POLL, |deadline| deadline.saturating_duration_since(Instant::now()));

            match rx.recv_timeout(timeout) {
                Ok(event) => self.accept(event),
                Err(RecvTimeoutError::Timeout) => {}
                Err(RecvTimeoutError::Disconnected) => break,
            }
            while let Ok(event) = rx.try_recv() {
                self.accept(event);
            }

            self.process_ready(Instant::now());
        }
        Ok(())
    }

    fn accept(&mut self, event: notify::Result<Event>) {
        match event {
            Ok(event) => {
                let now = Instant::now();
                for change in change_events(event) {
                    self.handle(change, now);
                }
            }
            Err(err) => warn!(error = %err, "watch error"),
        }
    }
}
