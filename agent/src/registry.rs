use std::sync::atomic::{AtomicU8, Ordering};

use parking_lot::Mutex;

/// Category group enabled for the recording mode.
pub const ENABLED_FOR_RECORDING: u8 = 1 << 0;
/// Category group enabled by an event callback. Reserved.
pub const ENABLED_FOR_EVENT_CALLBACK: u8 = 1 << 2;
/// Category group enabled for ETW export. Reserved.
pub const ENABLED_FOR_ETW_EXPORT: u8 = 1 << 3;

struct CategoryEntry {
    name: String,
    flag: AtomicU8,
}

/// Interning table mapping category group strings to flag bytes.
///
/// Entries are leaked on creation, so a flag byte's address and its group
/// string stay valid for the rest of the process even as the table grows.
/// Trace call sites read the flag byte without synchronization; config
/// changes rewrite it under the registry lock, and a read racing a change
/// sees either the old byte or the new one.
pub struct CategoryRegistry {
    entries: Mutex<Vec<&'static CategoryEntry>>,
}

impl CategoryRegistry {
    pub fn new() -> Self {
        CategoryRegistry {
            entries: Mutex::new(Vec::new()),
        }
    }

    /// Returns the flag byte for `group`, creating the entry with the
    /// given initial enablement on first sight.
    pub fn intern(&self, group: &str, enabled: bool) -> &'static AtomicU8 {
        let mut entries = self.entries.lock();
        if let Some(entry) = entries.iter().copied().find(|e| e.name == group) {
            return &entry.flag;
        }
        let entry: &'static CategoryEntry = Box::leak(Box::new(CategoryEntry {
            name: group.to_owned(),
            flag: AtomicU8::new(if enabled { ENABLED_FOR_RECORDING } else { 0 }),
        }));
        entries.push(entry);
        &entry.flag
    }

    /// Reverse lookup from a flag byte to the group string owning it.
    pub fn group_name(&self, flag: &AtomicU8) -> Option<&'static str> {
        self.entries
            .lock()
            .iter()
            .copied()
            .find(|e| std::ptr::eq(&e.flag, flag))
            .map(|e| e.name.as_str())
    }

    /// Recomputes every flag byte in place from `enabled`.
    pub fn update_all<F>(&self, enabled: F)
    where
        F: Fn(&str) -> bool,
    {
        for entry in self.entries.lock().iter() {
            let flag = if enabled(&entry.name) {
                ENABLED_FOR_RECORDING
            } else {
                0
            };
            entry.flag.store(flag, Ordering::Relaxed);
        }
    }
}

impl Default for CategoryRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn interned_flag_addresses_are_stable() {
        let registry = CategoryRegistry::new();
        let first = registry.intern("v8", true);
        for i in 0..100 {
            registry.intern(&format!("filler-{i}"), false);
        }
        let again = registry.intern("v8", false);
        assert!(std::ptr::eq(first, again));
        // A second intern does not rewrite the existing flag.
        assert_eq!(again.load(Ordering::Relaxed), ENABLED_FOR_RECORDING);
    }

    #[test]
    fn group_name_resolves_the_owning_entry() {
        let registry = CategoryRegistry::new();
        let v8 = registry.intern("v8", true);
        let node = registry.intern("node", false);
        assert_eq!(registry.group_name(v8), Some("v8"));
        assert_eq!(registry.group_name(node), Some("node"));

        let foreign = AtomicU8::new(0);
        assert_eq!(registry.group_name(&foreign), None);
    }

    #[test]
    fn update_all_rewrites_flags_in_place() {
        let registry = CategoryRegistry::new();
        let v8 = registry.intern("v8", true);
        let node = registry.intern("node", false);

        registry.update_all(|group| group == "node");
        assert_eq!(v8.load(Ordering::Relaxed), 0);
        assert_eq!(node.load(Ordering::Relaxed), ENABLED_FOR_RECORDING);

        registry.update_all(|_| false);
        assert_eq!(node.load(Ordering::Relaxed), 0);
    }
}
