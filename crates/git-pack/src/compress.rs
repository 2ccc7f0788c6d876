//! Delta base selection for pack writing.
//!
//! Entries are sorted so that objects likely to resemble each other (same
//! type, same file name, similar size) end up next to each other, then walked
//! from the back through a small window of recently loaded objects. Each new
//! object is tried as a delta against every other object in the window and
//! keeps the smallest delta that passes the size and depth limits.

use std::cell::OnceCell;

use crate::delta::{Delta, DeltaIndex};
use crate::store::ObjectSource;
use crate::write::{DeltaChoice, PackEntry};
use crate::{type_code, PackError, PackOptions};

/// Objects smaller than this are never deltified.
pub const MIN_DELTA_SIZE: usize = 50;

/// Objects larger than this are never deltified.
pub const MAX_DELTA_SIZE: usize = 0x2000_0000;

/// Default number of candidate bases kept in the window.
pub const WINDOW_SIZE: usize = 8;

/// Default longest delta chain.
pub const MAX_DEPTH: usize = 50;

struct Slot {
    entry: usize,
    data: Vec<u8>,
    index: OnceCell<DeltaIndex>,
}

impl Slot {
    fn index(&self) -> &DeltaIndex {
        self.index.get_or_init(|| DeltaIndex::new(&self.data))
    }
}

/// Ring of recently loaded objects; the delta index of a slot is built the
/// first time it serves as a base.
pub struct Window {
    slots: Vec<Option<Slot>>,
    next: usize,
}

impl Window {
    pub fn new(size: usize) -> Self {
        Self {
            slots: (0..size.max(1)).map(|_| None).collect(),
            next: 0,
        }
    }

    /// Insert, evicting the oldest slot. Returns the slot position.
    fn push(&mut self, entry: usize, data: Vec<u8>) -> usize {
        let pos = self.next;
        self.slots[pos] = Some(Slot {
            entry,
            data,
            index: OnceCell::new(),
        });
        self.next = (pos + 1) % self.slots.len();
        pos
    }

    /// Occupied slots other than `exclude`, most recent first.
    fn others(&self, exclude: usize) -> impl Iterator<Item = &Slot> {
        let len = self.slots.len();
        (1..len).filter_map(move |back| self.slots[(exclude + len - back) % len].as_ref())
    }

    fn get(&self, pos: usize) -> Option<&Slot> {
        self.slots[pos].as_ref()
    }
}

/// Picks delta bases for a list of pack entries.
pub struct Compressor<'a, S: ObjectSource + ?Sized> {
    source: &'a S,
    window_size: usize,
    max_depth: usize,
}

impl<'a, S: ObjectSource + ?Sized> Compressor<'a, S> {
    pub fn new(source: &'a S, options: &PackOptions) -> Self {
        Self {
            source,
            window_size: options.window_size,
            max_depth: options.max_depth,
        }
    }

    /// Annotate `entries` with deltas and depths. Returns how many entries
    /// ended up as deltas.
    ///
    /// A chosen base always comes earlier in processing order than its
    /// target, so the result never contains a cycle.
    pub fn compress(&self, entries: &mut [PackEntry]) -> Result<usize, PackError> {
        if self.window_size == 0 || self.max_depth == 0 {
            return Ok(0);
        }
        let mut order: Vec<usize> = (0..entries.len())
            .filter(|&i| (MIN_DELTA_SIZE..=MAX_DELTA_SIZE).contains(&entries[i].size))
            .collect();
        order.sort_by(|&a, &b| sort_key(&entries[a]).cmp(&sort_key(&entries[b])));

        let mut window = Window::new(self.window_size);
        let mut deltas = 0;
        for &idx in order.iter().rev() {
            let raw = self
                .source
                .load_raw(&entries[idx].oid)?
                .ok_or(PackError::MissingObject(entries[idx].oid))?;
            let pos = window.push(idx, raw.data);
            let Some(target) = window.get(pos) else {
                continue;
            };
            for base in window.others(pos) {
                self.try_delta(entries, target, base);
            }
            if entries[idx].delta.is_some() {
                deltas += 1;
            }
        }
        tracing::debug!(entries = entries.len(), candidates = order.len(), deltas, "delta search done");
        Ok(deltas)
    }

    fn try_delta(&self, entries: &mut [PackEntry], target: &Slot, base: &Slot) {
        let t = &entries[target.entry];
        let b = &entries[base.entry];
        if t.obj_type != b.obj_type || b.depth >= self.max_depth {
            return;
        }

        let (budget, ref_depth) = match &t.delta {
            Some(choice) => (choice.delta.size(), t.depth),
            None => ((t.size / 2).saturating_sub(20), 1),
        };
        let max_size = budget * (self.max_depth - b.depth)
            / (self.max_depth + 1).saturating_sub(ref_depth).max(1);
        if max_size == 0 {
            return;
        }
        if t.size > b.size && t.size - b.size >= max_size {
            return;
        }
        if t.size < b.size / 32 {
            return;
        }

        let delta = Delta::with_index(base.index(), &base.data, &target.data);
        if delta.size() > max_size {
            return;
        }
        if let Some(current) = &t.delta {
            if delta.size() == current.delta.size() && b.depth + 1 >= t.depth {
                return;
            }
        }

        tracing::trace!(
            target = %t.oid,
            base = %b.oid,
            delta = delta.size(),
            size = t.size,
            "delta accepted"
        );
        let base_oid = b.oid;
        let depth = b.depth + 1;
        let t = &mut entries[target.entry];
        t.delta = Some(DeltaChoice {
            base: base.entry,
            base_oid,
            delta,
        });
        t.depth = depth;
    }
}

/// (type, file name, directory, size)
fn sort_key(entry: &PackEntry) -> (u8, &str, &str, usize) {
    let path = entry.path.as_deref().unwrap_or("");
    let (dir, name) = match path.rfind('/') {
        Some(i) => (&path[..i], &path[i + 1..]),
        None => ("", path),
    };
    (type_code(entry.obj_type), name, dir, entry.size)
}

#[cfg(test)]
mod tests {
    use git_object::{ObjectType, RawObject};

    use super::*;
    use crate::store::MemoryStore;

    fn add(store: &mut MemoryStore, data: Vec<u8>, path: &str) -> PackEntry {
        let size = data.len();
        let oid = store.insert(RawObject::new(ObjectType::Blob, data)).unwrap();
        PackEntry::new(oid, ObjectType::Blob, size, Some(path.to_string()))
    }

    fn text(lines: usize, tweak: &str) -> Vec<u8> {
        let mut out = String::new();
        for i in 0..lines {
            out.push_str(&format!("line {i} of a file that changes a little\n"));
        }
        out.push_str(tweak);
        out.into_bytes()
    }

    #[test]
    fn near_identical_blobs_become_a_delta() {
        let mut store = MemoryStore::new();
        let mut entries = vec![
            add(&mut store, text(40, "v1\n"), "src/main.rs"),
            add(&mut store, text(40, "version two\n"), "src/main.rs"),
        ];
        let deltas = Compressor::new(&store, &PackOptions::default())
            .compress(&mut entries)
            .unwrap();
        assert_eq!(deltas, 1);

        let (target, base) = if entries[0].delta.is_some() { (0, 1) } else { (1, 0) };
        let choice = entries[target].delta.as_ref().unwrap();
        assert_eq!(choice.base, base);
        assert_eq!(choice.base_oid, entries[base].oid);
        assert!(choice.delta.size() < entries[target].size / 2);
        assert_eq!(entries[target].depth, 1);
        assert_eq!(entries[base].depth, 0);
    }

    #[test]
    fn small_and_mixed_type_objects_are_left_alone() {
        let mut store = MemoryStore::new();
        let tiny_a = add(&mut store, b"tiny".to_vec(), "a");
        let tiny_b = add(&mut store, b"tiny!".to_vec(), "a");
        let blob = add(&mut store, text(20, ""), "t");
        let tree_data = text(20, "");
        let tree_oid = store
            .insert(RawObject::new(ObjectType::Tree, tree_data.clone()))
            .unwrap();
        let tree = PackEntry::new(tree_oid, ObjectType::Tree, tree_data.len(), None);

        let mut entries = vec![tiny_a, tiny_b, blob, tree];
        let deltas = Compressor::new(&store, &PackOptions::default())
            .compress(&mut entries)
            .unwrap();
        assert_eq!(deltas, 0);
        assert!(entries.iter().all(|e| e.delta.is_none() && e.depth == 0));
    }

    #[test]
    fn depth_limit_is_respected() {
        let mut store = MemoryStore::new();
        let mut entries: Vec<PackEntry> = (0..6)
            .map(|i| add(&mut store, text(30 + i, ""), "same/name"))
            .collect();
        let options = PackOptions {
            max_depth: 2,
            ..PackOptions::default()
        };
        Compressor::new(&store, &options).compress(&mut entries).unwrap();
        assert!(entries.iter().all(|e| e.depth <= 2));
        for e in &entries {
            if let Some(choice) = &e.delta {
                assert_eq!(e.depth, entries[choice.base].depth + 1);
            }
        }
    }

    #[test]
    fn zero_window_disables_deltas() {
        let mut store = MemoryStore::new();
        let mut entries = vec![
            add(&mut store, text(40, "a"), "f"),
            add(&mut store, text(40, "b"), "f"),
        ];
        let options = PackOptions {
            window_size: 0,
            ..PackOptions::default()
        };
        assert_eq!(Compressor::new(&store, &options).compress(&mut entries).unwrap(), 0);
    }

    #[test]
    fn sort_key_splits_path() {
        let entry = PackEntry::new(
            git_hash::ObjectId::NULL,
            ObjectType::Blob,
            10,
            Some("a/b/c.txt".into()),
        );
        assert_eq!(sort_key(&entry), (3, "c.txt", "a/b", 10));
    }
}
