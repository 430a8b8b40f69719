//! Parsed-file cache shared between evaluations.
//!
//! Entries are held weakly so a file nobody references can be collected. A
//! small strong "hot" list keeps the most recently used files alive. With
//! auto-reload on, an entry whose file changed on disk since it was parsed
//! is replaced on the next lookup.

use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Weak};
use std::time::SystemTime;

use dashmap::DashMap;
use parking_lot::Mutex;

use crate::error::ProjectError;
use crate::imports::absolute_path;
use crate::xml::ProjectRootElement;

pub const DEFAULT_HOT_CAPACITY: usize = 50;

#[derive(Debug)]
struct CacheEntry {
    element: Weak<ProjectRootElement>,
    last_write_time: Option<SystemTime>,
}

#[derive(Debug)]
pub struct ProjectRootElementCache {
    entries: DashMap<PathBuf, CacheEntry>,
    hot: Mutex<VecDeque<Arc<ProjectRootElement>>>,
    hot_capacity: usize,
    auto_reload: bool,
}

impl Default for ProjectRootElementCache {
    fn default() -> Self {
        Self::new(false)
    }
}

impl ProjectRootElementCache {
    pub fn new(auto_reload: bool) -> Self {
        Self::with_capacity(auto_reload, DEFAULT_HOT_CAPACITY)
    }

    pub fn with_capacity(auto_reload: bool, hot_capacity: usize) -> Self {
        Self { entries: DashMap::new(), hot: Mutex::new(VecDeque::new()), hot_capacity, auto_reload }
    }

    pub fn auto_reload(&self) -> bool {
        self.auto_reload
    }

    /// The cached tree for `path`, loading it on a miss.
    ///
    /// Concurrent misses may parse the same file twice; only one result is
    /// published and every caller receives it.
    pub fn get(&self, path: impl AsRef<Path>) -> Result<Arc<ProjectRootElement>, ProjectError> {
        let key = absolute_path(path.as_ref());
        if let Some(element) = self.try_get(&key) {
            return Ok(element);
        }

        tracing::trace!(path = %key.display(), "project cache miss");
        let loaded = Arc::new(ProjectRootElement::from_file(&key)?);
        let element = {
            let mut entry = self.entries.entry(key).or_insert_with(|| CacheEntry {
                element: Weak::new(),
                last_write_time: None,
            });
            match entry.element.upgrade() {
                Some(existing) if existing.last_write_time() == loaded.last_write_time() => existing,
                _ => {
                    entry.element = Arc::downgrade(&loaded);
                    entry.last_write_time = loaded.last_write_time();
                    loaded
                }
            }
        };
        self.touch(&element);
        Ok(element)
    }

    /// The cached tree for `path` without loading. Collected entries, and
    /// stale ones under auto-reload, report `None`.
    pub fn try_get(&self, path: impl AsRef<Path>) -> Option<Arc<ProjectRootElement>> {
        let key = absolute_path(path.as_ref());
        let (element, cached_time) = {
            let entry = self.entries.get(&key)?;
            (entry.element.upgrade(), entry.last_write_time)
        };
        let Some(element) = element else {
            self.entries.remove_if(&key, |_, e| e.element.strong_count() == 0);
            return None;
        };
        if self.auto_reload && cached_time.is_some() && current_write_time(&key) != cached_time {
            tracing::debug!(path = %key.display(), "project file changed on disk; dropping cached tree");
            self.forget(&key, &element);
            return None;
        }
        self.touch(&element);
        Some(element)
    }

    /// Register an in-memory tree. Trees without a path cannot be cached.
    pub fn add_entry(&self, element: Arc<ProjectRootElement>) -> bool {
        let Some(path) = element.full_path() else {
            return false;
        };
        self.entries.insert(
            path.to_path_buf(),
            CacheEntry { element: Arc::downgrade(&element), last_write_time: element.last_write_time() },
        );
        self.touch(&element);
        true
    }

    pub fn remove(&self, path: impl AsRef<Path>) -> Option<Arc<ProjectRootElement>> {
        let key = absolute_path(path.as_ref());
        let (_, entry) = self.entries.remove(&key)?;
        let element = entry.element.upgrade()?;
        self.hot.lock().retain(|e| !Arc::ptr_eq(e, &element));
        Some(element)
    }

    /// Drop the strong hot list and any entry that is no longer alive.
    pub fn evict_hot_entries(&self) {
        self.hot.lock().clear();
        self.entries.retain(|_, e| e.element.strong_count() > 0);
    }

    pub fn clear(&self) {
        self.hot.lock().clear();
        self.entries.clear();
    }

    /// Number of entries still alive.
    pub fn len(&self) -> usize {
        self.entries.iter().filter(|e| e.element.strong_count() > 0).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn hot_len(&self) -> usize {
        self.hot.lock().len()
    }

    /// Drop the entry for `key` only if it still holds `observed`; a tree
    /// stored by another caller in the meantime stays.
    fn forget(&self, key: &Path, observed: &Arc<ProjectRootElement>) -> bool {
        self.entries.remove_if(key, |_, e| std::ptr::eq(e.element.as_ptr(), Arc::as_ptr(observed))).is_some()
    }

    fn touch(&self, element: &Arc<ProjectRootElement>) {
        if self.hot_capacity == 0 {
            return;
        }
        let mut hot = self.hot.lock();
        if let Some(pos) = hot.iter().position(|e| Arc::ptr_eq(e, element)) {
            hot.remove(pos);
        }
        hot.push_front(Arc::clone(element));
        hot.truncate(self.hot_capacity);
    }
}

fn current_write_time(path: &Path) -> Option<SystemTime> {
    std::fs::metadata(path).and_then(|m| m.modified()).ok()
}
