//! The resolver's global definition table: FNV-1a hashed buckets, each
//! walked linearly to find or insert an entry, resized once the table grows
//! past a 0.75 load factor.

use crate::object_view::Linkage;

const INITIAL_CAPACITY: usize = 16;
const MAX_LOAD_FACTOR: f64 = 0.75;

fn fnv1a(bytes: &[u8]) -> u64 {
    const OFFSET_BASIS: u64 = 0xcbf2_9ce4_8422_2325;
    const PRIME: u64 = 0x0000_0100_0000_01b3;
    let mut hash = OFFSET_BASIS;
    for &b in bytes {
        hash ^= b as u64;
        hash = hash.wrapping_mul(PRIME);
    }
    hash
}

#[derive(Clone, Debug)]
pub struct Entry {
    pub name: String,
    pub object_index: usize,
    pub symbol_index: usize,
    pub linkage: Linkage,
}

/// Definitions seen so far, keyed by name. Doesn't own the object views
/// whose symbols it indexes.
pub struct SymbolTable {
    buckets: Vec<Vec<Entry>>,
    len: usize,
}

impl SymbolTable {
    pub fn new() -> Self {
        SymbolTable { buckets: (0..INITIAL_CAPACITY).map(|_| Vec::new()).collect(), len: 0 }
    }

    fn bucket_of(&self, name: &str) -> usize {
        (fnv1a(name.as_bytes()) % self.buckets.len() as u64) as usize
    }

    pub fn get(&self, name: &str) -> Option<&Entry> {
        self.buckets[self.bucket_of(name)].iter().find(|e| e.name == name)
    }

    /// Insert or update the definition of `name`, applying the override
    /// rule: a `Global` definition replaces a prior `Weak` one; a `Weak`
    /// definition never replaces anything. Returns the prior definition's
    /// object index when this insert is a duplicate `Global` definition.
    pub fn insert(
        &mut self,
        name: &str,
        object_index: usize,
        symbol_index: usize,
        linkage: Linkage,
    ) -> Result<(), usize> {
        let idx = self.bucket_of(name);
        if let Some(existing) = self.buckets[idx].iter_mut().find(|e| e.name == name) {
            return match (existing.linkage, linkage) {
                (Linkage::Weak, Linkage::Global) => {
                    existing.object_index = object_index;
                    existing.symbol_index = symbol_index;
                    existing.linkage = Linkage::Global;
                    Ok(())
                }
                (Linkage::Global, Linkage::Weak) => Ok(()),
                (Linkage::Weak, Linkage::Weak) => Ok(()),
                (Linkage::Global, Linkage::Global) => Err(existing.object_index),
            };
        }

        self.buckets[idx].push(Entry {
            name: name.to_string(),
            object_index,
            symbol_index,
            linkage,
        });
        self.len += 1;
        self.maybe_grow();
        Ok(())
    }

    fn maybe_grow(&mut self) {
        if self.len as f64 / self.buckets.len() as f64 <= MAX_LOAD_FACTOR {
            return;
        }
        let new_capacity = self.buckets.len() * 2;
        let mut new_buckets: Vec<Vec<Entry>> = (0..new_capacity).map(|_| Vec::new()).collect();
        for entry in self.buckets.drain(..).flatten() {
            let idx = (fnv1a(entry.name.as_bytes()) % new_capacity as u64) as usize;
            new_buckets[idx].push(entry);
        }
        self.buckets = new_buckets;
    }
}

impl Default for SymbolTable {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn weak_yields_to_global_either_order() {
        let mut t = SymbolTable::new();
        assert!(t.insert("foo", 0, 0, Linkage::Weak).is_ok());
        assert!(t.insert("foo", 1, 0, Linkage::Global).is_ok());
        assert_eq!(t.get("foo").unwrap().object_index, 1);

        let mut t = SymbolTable::new();
        assert!(t.insert("bar", 0, 0, Linkage::Global).is_ok());
        assert!(t.insert("bar", 1, 0, Linkage::Weak).is_ok());
        assert_eq!(t.get("bar").unwrap().object_index, 0);
    }

    #[test]
    fn two_global_definitions_conflict() {
        let mut t = SymbolTable::new();
        t.insert("foo", 0, 0, Linkage::Global).unwrap();
        let err = t.insert("foo", 1, 0, Linkage::Global).unwrap_err();
        assert_eq!(err, 0);
    }

    #[test]
    fn grows_past_load_factor_without_losing_entries() {
        let mut t = SymbolTable::new();
        for i in 0..64 {
            t.insert(&format!("sym_{i}"), 0, i, Linkage::Global).unwrap();
        }
        for i in 0..64 {
            assert_eq!(t.get(&format!("sym_{i}")).unwrap().symbol_index, i);
        }
    }
}
