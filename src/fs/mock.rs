// src/fs/mock.rs

use super::{FileSystem, FileTimes};
use crate::types::{Timestamp, now_secs};
use anyhow::{Result, anyhow};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

#[derive(Debug, Clone)]
pub enum MockEntry {
    File {
        content: Vec<u8>,
        mtime: Timestamp,
        atime: Timestamp,
    },
    Dir {
        children: Vec<String>, // List of child names
        mtime: Timestamp,
    },
}

impl MockEntry {
    fn times(&self) -> FileTimes {
        match self {
            MockEntry::File {
                content,
                mtime,
                atime,
            } => FileTimes {
                mtime: *mtime,
                atime: *atime,
                len: content.len() as u64,
                is_dir: false,
            },
            MockEntry::Dir { mtime, .. } => FileTimes {
                mtime: *mtime,
                atime: *mtime,
                len: 0,
                is_dir: true,
            },
        }
    }
}

/// In-memory filesystem that tracks mtime/atime so engine tests can tell
/// real modifications apart from access-only notifications.
#[derive(Debug, Clone, Default)]
pub struct MockFileSystem {
    files: Arc<Mutex<HashMap<PathBuf, MockEntry>>>,
}

fn parent_of(path: &Path) -> Option<&Path> {
    let parent = path.parent()?;
    if parent.as_os_str().is_empty() {
        Some(Path::new("."))
    } else {
        Some(parent)
    }
}

impl MockFileSystem {
    pub fn new() -> Self {
        let mut files = HashMap::new();
        // Ensure root exists
        files.insert(
            PathBuf::from("/"),
            MockEntry::Dir {
                children: Vec::new(),
                mtime: now_secs(),
            },
        );

        Self {
            files: Arc::new(Mutex::new(files)),
        }
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<PathBuf, MockEntry>> {
        self.files.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn add_file(&self, path: impl AsRef<Path>, content: impl Into<Vec<u8>>) {
        let now = now_secs();
        let path = path.as_ref().to_path_buf();
        let mut files = self.lock();
        files.insert(
            path.clone(),
            MockEntry::File {
                content: content.into(),
                mtime: now,
                atime: now,
            },
        );
        Self::link_into_parent(&mut files, &path, now);
    }

    pub fn add_dir(&self, path: impl AsRef<Path>) {
        let now = now_secs();
        let mut files = self.lock();
        Self::ensure_dir_entry(&mut files, path.as_ref(), now);
    }

    /// Override the timestamps of an existing entry. Directories only carry
    /// an mtime, so `atime` is ignored for them.
    pub fn set_times(&self, path: impl AsRef<Path>, new_mtime: Timestamp, new_atime: Timestamp) {
        let mut files = self.lock();
        match files.get_mut(path.as_ref()) {
            Some(MockEntry::File { mtime, atime, .. }) => {
                *mtime = new_mtime;
                *atime = new_atime;
            }
            Some(MockEntry::Dir { mtime, .. }) => *mtime = new_mtime,
            None => {}
        }
    }

    pub fn paths(&self) -> Vec<PathBuf> {
        let mut all: Vec<PathBuf> = self.lock().keys().cloned().collect();
        all.sort();
        all
    }

    fn link_into_parent(files: &mut HashMap<PathBuf, MockEntry>, path: &Path, now: Timestamp) {
        let Some(parent) = parent_of(path) else {
            return;
        };
        if parent == path {
            return;
        }
        Self::ensure_dir_entry(files, parent, now);
        let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
            return;
        };
        if let Some(MockEntry::Dir { children, mtime }) = files.get_mut(parent) {
            if !children.iter().any(|c| c == name) {
                children.push(name.to_string());
                *mtime = now;
            }
        }
    }

    fn unlink_from_parent(files: &mut HashMap<PathBuf, MockEntry>, path: &Path) {
        let Some(parent) = parent_of(path) else {
            return;
        };
        let now = now_secs();
        let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
            return;
        };
        if let Some(MockEntry::Dir { children, mtime }) = files.get_mut(parent) {
            children.retain(|c| c != name);
            *mtime = now;
        }
    }

    fn ensure_dir_entry(files: &mut HashMap<PathBuf, MockEntry>, path: &Path, now: Timestamp) {
        if files.contains_key(path) {
            return;
        }
        files.insert(
            path.to_path_buf(),
            MockEntry::Dir {
                children: Vec::new(),
                mtime: now,
            },
        );
        Self::link_into_parent(files, path, now);
    }

    fn remove_tree(files: &mut HashMap<PathBuf, MockEntry>, path: &Path) {
        files.retain(|p, _| !p.starts_with(path));
        Self::unlink_from_parent(files, path);
    }
}

impl FileSystem for MockFileSystem {
    fn read_to_string(&self, path: &Path) -> Result<String> {
        let files = self.lock();
        match files.get(path) {
            Some(MockEntry::File { content, .. }) => {
                String::from_utf8(content.clone()).map_err(|e| anyhow!("Invalid UTF-8: {}", e))
            }
            Some(MockEntry::Dir { .. }) => Err(anyhow!("Is a directory: {:?}", path)),
            None => Err(anyhow!("File not found: {:?}", path)),
        }
    }

    fn write(&self, path: &Path, contents: &[u8]) -> Result<()> {
        self.add_file(path, contents);
        Ok(())
    }

    fn append(&self, path: &Path, contents: &[u8]) -> Result<()> {
        let now = now_secs();
        let mut files = self.lock();
        match files.get_mut(path) {
            Some(MockEntry::File { content, mtime, .. }) => {
                content.extend_from_slice(contents);
                *mtime = now;
                Ok(())
            }
            Some(MockEntry::Dir { .. }) => Err(anyhow!("Is a directory: {:?}", path)),
            None => {
                files.insert(
                    path.to_path_buf(),
                    MockEntry::File {
                        content: contents.to_vec(),
                        mtime: now,
                        atime: now,
                    },
                );
                Self::link_into_parent(&mut files, path, now);
                Ok(())
            }
        }
    }

    fn exists(&self, path: &Path) -> bool {
        self.lock().contains_key(path)
    }

    fn is_file(&self, path: &Path) -> bool {
        matches!(self.lock().get(path), Some(MockEntry::File { .. }))
    }

    fn is_dir(&self, path: &Path) -> bool {
        matches!(self.lock().get(path), Some(MockEntry::Dir { .. }))
    }

    fn metadata(&self, path: &Path) -> Result<FileTimes> {
        self.lock()
            .get(path)
            .map(MockEntry::times)
            .ok_or_else(|| anyhow!("File not found: {:?}", path))
    }

    fn read_dir(&self, path: &Path) -> Result<Vec<PathBuf>> {
        let files = self.lock();
        match files.get(path) {
            Some(MockEntry::Dir { children, .. }) => {
                Ok(children.iter().map(|name| path.join(name)).collect())
            }
            _ => Err(anyhow!("Not a directory or not found: {:?}", path)),
        }
    }

    fn create_dir_all(&self, path: &Path) -> Result<()> {
        self.add_dir(path);
        Ok(())
    }

    fn remove_file(&self, path: &Path) -> Result<()> {
        let mut files = self.lock();
        match files.get(path) {
            Some(MockEntry::File { .. }) => {
                files.remove(path);
                Self::unlink_from_parent(&mut files, path);
                Ok(())
            }
            Some(MockEntry::Dir { .. }) => Err(anyhow!("Is a directory: {:?}", path)),
            None => Err(anyhow!("File not found: {:?}", path)),
        }
    }

    fn remove_dir_all(&self, path: &Path) -> Result<()> {
        let mut files = self.lock();
        if !matches!(files.get(path), Some(MockEntry::Dir { .. })) {
            return Err(anyhow!("Not a directory or not found: {:?}", path));
        }
        Self::remove_tree(&mut files, path);
        Ok(())
    }

    fn rename(&self, from: &Path, to: &Path) -> Result<()> {
        let now = now_secs();
        let mut files = self.lock();
        if !files.contains_key(from) {
            return Err(anyhow!("File not found: {:?}", from));
        }
        let moved: Vec<(PathBuf, MockEntry)> = files
            .iter()
            .filter(|(p, _)| p.starts_with(from))
            .map(|(p, e)| (p.clone(), e.clone()))
            .collect();
        Self::remove_tree(&mut files, from);
        for (old, entry) in moved {
            let Ok(rest) = old.strip_prefix(from) else {
                continue;
            };
            let new = if rest.as_os_str().is_empty() {
                to.to_path_buf()
            } else {
                to.join(rest)
            };
            files.insert(new, entry);
        }
        Self::link_into_parent(&mut files, to, now);
        Ok(())
    }

    fn copy(&self, from: &Path, to: &Path) -> Result<()> {
        let content = match self.lock().get(from) {
            Some(MockEntry::File { content, .. }) => content.clone(),
            Some(MockEntry::Dir { .. }) => return Err(anyhow!("Is a directory: {:?}", from)),
            None => return Err(anyhow!("File not found: {:?}", from)),
        };
        self.add_file(to, content);
        Ok(())
    }

    fn touch(&self, path: &Path) -> Result<()> {
        let now = now_secs();
        {
            let mut files = self.lock();
            if let Some(MockEntry::File { mtime, .. } | MockEntry::Dir { mtime, .. }) =
                files.get_mut(path)
            {
                *mtime = now;
                return Ok(());
            }
        }
        self.add_file(path, Vec::new());
        Ok(())
    }
}
