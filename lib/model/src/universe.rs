//! Interned universes and bitset subsets over them.
//!
//! A [Universe] assigns stable, dense ids to every element (variables, triple patterns) seen
//! while planning a query. Every plan node describes its variables and triples as a [Subset] of
//! the *same* universe, so that set algebra between nodes reduces to block-wise bit operations.
//!
//! Universes are built with a [UniverseBuilder] and frozen into an `Arc<Universe<_>>` before
//! planning starts. A frozen universe is never mutated again, which makes concurrent lookups
//! safe without any locking.

use crate::error::UniverseMismatchError;
use fixedbitset::FixedBitSet;
use rustc_hash::FxHashMap;
use std::fmt::{Debug, Formatter};
use std::hash::{Hash, Hasher};
use std::sync::Arc;

/// An append-only interning table. Ids are assigned in insertion order and never reused.
#[derive(Debug)]
pub struct UniverseBuilder<T> {
    items: Vec<T>,
    ids: FxHashMap<T, usize>,
}

impl<T: Clone + Eq + Hash> UniverseBuilder<T> {
    /// Creates an empty [UniverseBuilder].
    pub fn new() -> Self {
        Self {
            items: Vec::new(),
            ids: FxHashMap::default(),
        }
    }

    /// Interns `item` and returns its id. Interning the same item twice returns the same id.
    pub fn intern(&mut self, item: T) -> usize {
        if let Some(id) = self.ids.get(&item) {
            return *id;
        }
        let id = self.items.len();
        self.ids.insert(item.clone(), id);
        self.items.push(item);
        id
    }

    /// Freezes the table.
    pub fn build(self) -> Arc<Universe<T>> {
        Arc::new(Universe {
            items: self.items,
            ids: self.ids,
        })
    }
}

impl<T: Clone + Eq + Hash> Default for UniverseBuilder<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Clone + Eq + Hash> Extend<T> for UniverseBuilder<T> {
    fn extend<I: IntoIterator<Item = T>>(&mut self, iter: I) {
        for item in iter {
            self.intern(item);
        }
    }
}

/// A frozen interning table.
pub struct Universe<T> {
    items: Vec<T>,
    ids: FxHashMap<T, usize>,
}

impl<T: Clone + Eq + Hash> Universe<T> {
    /// Returns the number of interned elements.
    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Returns the element with the given `id`.
    pub fn get(&self, id: usize) -> Option<&T> {
        self.items.get(id)
    }

    /// Returns the id of `item` if it is part of this universe.
    pub fn id_of(&self, item: &T) -> Option<usize> {
        self.ids.get(item).copied()
    }

    /// Iterates the elements in id order.
    pub fn iter(&self) -> impl Iterator<Item = &T> {
        self.items.iter()
    }

    /// Creates an empty subset of this universe.
    pub fn empty_subset(self: &Arc<Self>) -> Subset<T> {
        Subset {
            universe: Arc::clone(self),
            bits: FixedBitSet::with_capacity(self.len()),
        }
    }

    /// Creates a subset holding every element of this universe.
    pub fn full_subset(self: &Arc<Self>) -> Subset<T> {
        let mut bits = FixedBitSet::with_capacity(self.len());
        bits.insert_range(..);
        Subset {
            universe: Arc::clone(self),
            bits,
        }
    }

    /// Creates a subset of the given `items`. Items that are not part of the universe are
    /// ignored.
    pub fn subset<'a>(self: &Arc<Self>, items: impl IntoIterator<Item = &'a T>) -> Subset<T>
    where
        T: 'a,
    {
        let mut result = self.empty_subset();
        for item in items {
            result.insert(item);
        }
        result
    }
}

impl<T: Debug> Debug for Universe<T> {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_list().entries(self.items.iter()).finish()
    }
}

/// A set of elements of a shared [Universe], stored as a bitset of their ids.
///
/// The bitset always spans the whole universe, so equal subsets have equal bitsets.
///
/// Operations between two subsets require both to stem from the same universe object. This is
/// checked with a debug assertion on the hot paths and can be verified explicitly with
/// [Subset::check_universe].
pub struct Subset<T> {
    universe: Arc<Universe<T>>,
    bits: FixedBitSet,
}

impl<T: Clone + Eq + Hash> Subset<T> {
    /// Returns the universe of this subset.
    pub fn universe(&self) -> &Arc<Universe<T>> {
        &self.universe
    }

    /// Returns the raw ids.
    pub fn bits(&self) -> &FixedBitSet {
        &self.bits
    }

    /// Consumes the subset and returns the raw ids.
    pub fn into_bits(self) -> FixedBitSet {
        self.bits
    }

    /// Returns an error if `other` does not share this subset's universe.
    pub fn check_universe(&self, other: &Subset<T>) -> Result<(), UniverseMismatchError> {
        if Arc::ptr_eq(&self.universe, &other.universe) {
            Ok(())
        } else {
            Err(UniverseMismatchError)
        }
    }

    pub fn len(&self) -> usize {
        self.bits.count_ones(..)
    }

    pub fn is_empty(&self) -> bool {
        self.bits.is_clear()
    }

    pub fn contains(&self, item: &T) -> bool {
        self.universe
            .id_of(item)
            .is_some_and(|id| self.bits.contains(id))
    }

    /// Inserts `item`. Returns false if the item is already present or not part of the universe.
    pub fn insert(&mut self, item: &T) -> bool {
        match self.universe.id_of(item) {
            Some(id) => !self.bits.put(id),
            None => false,
        }
    }

    /// Iterates the elements in id order.
    pub fn iter(&self) -> impl Iterator<Item = &T> + '_ {
        self.bits.ones().filter_map(|id| self.universe.get(id))
    }

    /// Collects the elements into a vector (in id order).
    pub fn to_vec(&self) -> Vec<T> {
        self.iter().cloned().collect()
    }

    pub fn union_with(&mut self, other: &Subset<T>) {
        self.debug_check(other);
        self.bits.union_with(&other.bits);
    }

    pub fn intersect_with(&mut self, other: &Subset<T>) {
        self.debug_check(other);
        self.bits.intersect_with(&other.bits);
    }

    pub fn difference_with(&mut self, other: &Subset<T>) {
        self.debug_check(other);
        self.bits.difference_with(&other.bits);
    }

    #[must_use]
    pub fn union(&self, other: &Subset<T>) -> Subset<T> {
        let mut result = self.clone();
        result.union_with(other);
        result
    }

    #[must_use]
    pub fn intersection(&self, other: &Subset<T>) -> Subset<T> {
        let mut result = self.clone();
        result.intersect_with(other);
        result
    }

    #[must_use]
    pub fn difference(&self, other: &Subset<T>) -> Subset<T> {
        let mut result = self.clone();
        result.difference_with(other);
        result
    }

    pub fn is_subset(&self, other: &Subset<T>) -> bool {
        self.debug_check(other);
        self.bits.is_subset(&other.bits)
    }

    pub fn is_superset(&self, other: &Subset<T>) -> bool {
        other.is_subset(self)
    }

    pub fn is_disjoint(&self, other: &Subset<T>) -> bool {
        self.debug_check(other);
        self.bits.is_disjoint(&other.bits)
    }

    pub fn intersects(&self, other: &Subset<T>) -> bool {
        !self.is_disjoint(other)
    }

    fn debug_check(&self, other: &Subset<T>) {
        debug_assert!(
            Arc::ptr_eq(&self.universe, &other.universe),
            "Subsets of different universes must not be combined"
        );
    }
}

impl<T> Clone for Subset<T> {
    fn clone(&self) -> Self {
        Self {
            universe: Arc::clone(&self.universe),
            bits: self.bits.clone(),
        }
    }
}

impl<T> PartialEq for Subset<T> {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.universe, &other.universe) && self.bits == other.bits
    }
}

impl<T> Eq for Subset<T> {}

impl<T> Hash for Subset<T> {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.bits.hash(state);
    }
}

impl<T: Debug> Debug for Subset<T> {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_set()
            .entries(self.bits.ones().filter_map(|id| self.universe.items.get(id)))
            .finish()
    }
}
