//! Inode table: the kernel speaks inodes, the dispatcher speaks paths.
//!
//! Numbers are assigned on first lookup and kept for the life of the mount;
//! the root is always inode 1. Rename rewrites the affected subtree's
//! paths, unlink/rmdir drop the entry.

use std::sync::atomic::{AtomicU64, Ordering};

use dashmap::DashMap;
use dashmap::mapref::entry::Entry;

/// Inode number of the mount root (`/`).
pub const ROOT_INODE: u64 = 1;

/// Bidirectional inode ↔ mount-path map.
#[derive(Debug)]
pub struct InodeTable {
    by_ino: DashMap<u64, String>,
    by_path: DashMap<String, u64>,
    next: AtomicU64,
}

impl InodeTable {
    #[must_use]
    pub fn new() -> Self {
        let table = Self {
            by_ino: DashMap::new(),
            by_path: DashMap::new(),
            next: AtomicU64::new(ROOT_INODE + 1),
        };
        table.by_ino.insert(ROOT_INODE, "/".to_string());
        table.by_path.insert("/".to_string(), ROOT_INODE);
        table
    }

    /// Mount path of a known inode.
    #[must_use]
    pub fn path_of(&self, ino: u64) -> Option<String> {
        self.by_ino.get(&ino).map(|p| p.clone())
    }

    /// Inode for `path`, assigning a fresh one on first sight.
    pub fn get_or_assign(&self, path: &str) -> u64 {
        match self.by_path.entry(path.to_string()) {
            Entry::Occupied(entry) => *entry.get(),
            Entry::Vacant(entry) => {
                let ino = self.next.fetch_add(1, Ordering::Relaxed);
                entry.insert(ino);
                self.by_ino.insert(ino, path.to_string());
                ino
            }
        }
    }

    /// Drop a path after unlink/rmdir.
    ///
    /// Only the path-to-inode direction is removed: an open descriptor may
    /// still release through the old inode, which keeps resolving to the
    /// (now stale) path. A later file at the same path gets a fresh inode.
    pub fn remove_path(&self, path: &str) {
        self.by_path.remove(path);
    }

    /// Rewrite `from` (and, for directories, its whole subtree) to `to`.
    pub fn rename(&self, from: &str, to: &str) {
        // An overwritten destination loses its mapping first.
        self.remove_path(to);

        let descendant_prefix = format!("{from}/");
        let mut moves: Vec<(String, u64)> = Vec::new();
        for entry in self.by_path.iter() {
            if entry.key() == from || entry.key().starts_with(&descendant_prefix) {
                moves.push((entry.key().clone(), *entry.value()));
            }
        }
        for (old_path, ino) in moves {
            let new_path = format!("{to}{}", &old_path[from.len()..]);
            self.by_path.remove(&old_path);
            self.by_path.insert(new_path.clone(), ino);
            self.by_ino.insert(ino, new_path);
        }
    }
}

impl Default for InodeTable {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn root_is_inode_one() {
        let table = InodeTable::new();
        assert_eq!(table.path_of(ROOT_INODE).unwrap(), "/");
        assert_eq!(table.get_or_assign("/"), ROOT_INODE);
    }

    #[test]
    fn assignment_is_stable() {
        let table = InodeTable::new();
        let a = table.get_or_assign("/a");
        let b = table.get_or_assign("/b");
        assert_ne!(a, b);
        assert_eq!(table.get_or_assign("/a"), a);
        assert_eq!(table.path_of(a).unwrap(), "/a");
    }

    #[test]
    fn remove_retires_the_path_but_not_the_inode() {
        let table = InodeTable::new();
        let a = table.get_or_assign("/a");
        table.remove_path("/a");
        // Open descriptors can still resolve the dead inode for release.
        assert_eq!(table.path_of(a).unwrap(), "/a");
        // A new file at the same path is a new inode.
        assert_ne!(table.get_or_assign("/a"), a);
    }

    #[test]
    fn rename_rewrites_subtree() {
        let table = InodeTable::new();
        let dir = table.get_or_assign("/dir");
        let file = table.get_or_assign("/dir/file");
        let deep = table.get_or_assign("/dir/sub/deep");
        let other = table.get_or_assign("/dirty"); // prefix, not a descendant

        table.rename("/dir", "/moved");

        assert_eq!(table.path_of(dir).unwrap(), "/moved");
        assert_eq!(table.path_of(file).unwrap(), "/moved/file");
        assert_eq!(table.path_of(deep).unwrap(), "/moved/sub/deep");
        assert_eq!(table.path_of(other).unwrap(), "/dirty");
        assert_eq!(table.get_or_assign("/moved/file"), file);
    }

    #[test]
    fn rename_over_existing_destination() {
        let table = InodeTable::new();
        let src = table.get_or_assign("/src");
        let dst = table.get_or_assign("/dst");

        table.rename("/src", "/dst");
        assert_eq!(table.path_of(src).unwrap(), "/dst");
        assert!(table.path_of(dst).is_none());
        assert_eq!(table.get_or_assign("/dst"), src);
    }
}
