use std::fmt;
use std::hash::{Hash, Hasher};

use im::Vector as ImVector;

use crate::error::IndexError;

// ============================================================================
// Persistent Vector
// ============================================================================

/// Immutable indexed sequence with structural sharing.
///
/// Backed by `im::Vector` (an RRB tree), so `conj`, `update` and `get` are
/// `O(log n)` and every "modification" returns a new vector that shares the
/// untouched nodes of the original. Nothing in the API exposes whether two
/// vectors share storage.
#[derive(Clone)]
pub struct PersistentVector<T: Clone> {
    elements: ImVector<T>,
}

impl<T: Clone> PersistentVector<T> {
    pub fn new() -> Self {
        PersistentVector {
            elements: ImVector::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.elements.len()
    }

    pub fn is_empty(&self) -> bool {
        self.elements.is_empty()
    }

    /// Return a new vector with `item` appended.
    pub fn conj(&self, item: T) -> Self {
        let mut elements = self.elements.clone();
        elements.push_back(item);
        PersistentVector { elements }
    }

    /// Element at `index`, or `IndexError` outside `[0, len)`.
    pub fn get(&self, index: usize) -> Result<&T, IndexError> {
        self.elements.get(index).ok_or(IndexError {
            index: index as i64,
            len: self.elements.len(),
        })
    }

    /// Return a new vector differing from this one only at `index`.
    pub fn update(&self, index: usize, item: T) -> Result<Self, IndexError> {
        if index >= self.elements.len() {
            return Err(IndexError {
                index: index as i64,
                len: self.elements.len(),
            });
        }
        Ok(PersistentVector {
            elements: self.elements.update(index, item),
        })
    }

    /// Return a new vector without the last element, or `None` when empty.
    pub fn pop(&self) -> Option<Self> {
        if self.elements.is_empty() {
            return None;
        }
        let mut elements = self.elements.clone();
        elements.pop_back();
        Some(PersistentVector { elements })
    }

    pub fn last(&self) -> Option<&T> {
        self.elements.back()
    }

    pub fn iter(&self) -> impl Iterator<Item = &T> {
        self.elements.iter()
    }
}

impl<T: Clone> Default for PersistentVector<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Clone> FromIterator<T> for PersistentVector<T> {
    fn from_iter<I: IntoIterator<Item = T>>(iter: I) -> Self {
        PersistentVector {
            elements: iter.into_iter().collect(),
        }
    }
}

impl<T: Clone + PartialEq> PartialEq for PersistentVector<T> {
    fn eq(&self, other: &Self) -> bool {
        self.elements == other.elements
    }
}

impl<T: Clone + Eq> Eq for PersistentVector<T> {}

impl<T: Clone + Hash> Hash for PersistentVector<T> {
    fn hash<H: Hasher>(&self, state: &mut H) {
        state.write_usize(self.elements.len());
        for elem in &self.elements {
            elem.hash(state);
        }
    }
}

impl<T: Clone + fmt::Debug> fmt::Debug for PersistentVector<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.elements.iter()).finish()
    }
}
