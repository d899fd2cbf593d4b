//! Layout descriptors for operators and vectors
//!
//! A [`Map`] records how many entries a vector space has globally and how many
//! of them live in this process. Operators and vectors are compatible when both
//! counts agree; the data itself is never redistributed by the hierarchy.

/// Distribution of a vector space across processes
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Map {
    global_len: usize,
    local_len: usize,
}

impl Map {
    /// Map whose entries are all owned locally
    pub fn contiguous(len: usize) -> Self {
        Self {
            global_len: len,
            local_len: len,
        }
    }

    /// Map owning `local_len` of `global_len` entries
    ///
    /// # Panics
    ///
    /// Panics if `local_len > global_len`.
    pub fn new(global_len: usize, local_len: usize) -> Self {
        assert!(
            local_len <= global_len,
            "local length {local_len} exceeds global length {global_len}"
        );
        Self {
            global_len,
            local_len,
        }
    }

    /// Number of entries across all processes
    pub fn global_len(&self) -> usize {
        self.global_len
    }

    /// Number of entries owned here
    pub fn local_len(&self) -> usize {
        self.local_len
    }

    /// Whether vectors laid out by `self` and `other` can be combined
    pub fn is_compatible(&self, other: &Map) -> bool {
        self.global_len == other.global_len && self.local_len == other.local_len
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_contiguous_is_compatible_with_itself() {
        let map = Map::contiguous(7);
        assert!(map.is_compatible(&Map::new(7, 7)));
        assert!(!map.is_compatible(&Map::contiguous(6)));
    }

    #[test]
    fn test_partial_ownership() {
        let map = Map::new(10, 4);
        assert_eq!(map.global_len(), 10);
        assert_eq!(map.local_len(), 4);
        assert!(!map.is_compatible(&Map::contiguous(10)));
    }

    #[test]
    #[should_panic]
    fn test_local_larger_than_global() {
        let _ = Map::new(3, 4);
    }
}
