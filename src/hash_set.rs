use core::borrow::Borrow;
use core::fmt::Debug;
use core::hash::BuildHasher;
use core::hash::Hash;

use crate::alloc::Global;
use crate::alloc::TableAlloc;
use crate::hash_table;
use crate::hash_table::HashTable;

/// A hash set of values of type `T`, built on the open-addressing
/// [`HashTable`].
///
/// Shares the map's storage scheme and capacity policy; elements are
/// stored directly in the slot array. [`add`] follows first-insert-wins
/// semantics: adding an element equal to one already present keeps the
/// stored element and returns `false`.
///
/// [`add`]: HashSet::add
///
/// ## Example
///
/// ```rust
/// use probe_hash::DefaultHashBuilder;
/// use probe_hash::HashSet;
///
/// let mut set: HashSet<&str, DefaultHashBuilder> = HashSet::new();
/// assert!(set.add("alpha"));
/// assert!(!set.add("alpha"));
/// assert!(set.contains(&"alpha"));
/// assert!(set.remove(&"alpha"));
/// assert!(set.is_empty());
/// ```
pub struct HashSet<T, S, A: TableAlloc = Global> {
    table: HashTable<T, A>,
    hash_builder: S,
}

impl<T, S> HashSet<T, S>
where
    S: Default,
{
    /// Creates an empty set with a default hasher and the global
    /// allocator. Does not allocate until the first insert.
    pub fn new() -> Self {
        Self::with_hasher(S::default())
    }

    /// Creates a set that can hold at least `capacity` elements without
    /// resizing, with a default hasher and the global allocator.
    pub fn with_capacity(capacity: usize) -> Self {
        Self::with_capacity_and_hasher(capacity, S::default())
    }
}

impl<T, S> HashSet<T, S> {
    /// Creates an empty set with the given hasher.
    pub fn with_hasher(hash_builder: S) -> Self {
        Self {
            table: HashTable::new(),
            hash_builder,
        }
    }

    /// Creates a set that can hold at least `capacity` elements without
    /// resizing, with the given hasher.
    pub fn with_capacity_and_hasher(capacity: usize, hash_builder: S) -> Self {
        Self {
            table: HashTable::with_capacity(capacity),
            hash_builder,
        }
    }
}

impl<T, S, A: TableAlloc> HashSet<T, S, A> {
    /// Creates an empty set with the given hasher and allocator.
    pub fn with_hasher_in(hash_builder: S, alloc: A) -> Self {
        Self {
            table: HashTable::new_in(alloc),
            hash_builder,
        }
    }

    /// Creates a set that can hold at least `capacity` elements without
    /// resizing, with the given hasher and allocator.
    pub fn with_capacity_and_hasher_in(capacity: usize, hash_builder: S, alloc: A) -> Self {
        Self {
            table: HashTable::with_capacity_in(capacity, alloc),
            hash_builder,
        }
    }

    /// Returns the number of elements in the set.
    pub fn len(&self) -> usize {
        self.table.len()
    }

    /// Returns `true` if the set contains no elements.
    pub fn is_empty(&self) -> bool {
        self.table.is_empty()
    }

    /// Returns the current slot count. Always `0` or of the form
    /// `2^k - 1`.
    pub fn capacity(&self) -> usize {
        self.table.capacity()
    }

    /// Returns the number of elements that can still be added before the
    /// next growth.
    pub fn slack(&self) -> usize {
        self.table.slack()
    }

    /// Removes all elements, keeping the allocated capacity.
    pub fn clear(&mut self) {
        self.table.clear();
    }

    /// Exchanges the contents of two sets in O(1), hashers included.
    pub fn swap(&mut self, other: &mut Self) {
        core::mem::swap(self, other);
    }

    /// Returns a reference to the set's hasher.
    pub fn hasher(&self) -> &S {
        &self.hash_builder
    }

    /// Returns an iterator over the set's elements in slot-index order.
    pub fn iter(&self) -> Iter<'_, T, A> {
        Iter {
            inner: self.table.iter(),
        }
    }
}

impl<T, S, A> HashSet<T, S, A>
where
    T: Hash + Eq,
    S: BuildHasher,
    A: TableAlloc,
{
    fn hash_value<Q>(&self, value: &Q) -> u64
    where
        Q: Hash + ?Sized,
    {
        self.hash_builder.hash_one(value)
    }

    /// Adds an element if no equal element is present.
    ///
    /// Returns `true` if the element was inserted. If an equal element
    /// already exists the set is unchanged and `false` is returned: the
    /// stored element is never replaced.
    pub fn add(&mut self, value: T) -> bool {
        let hash = self.hash_value(&value);
        match self.table.entry(hash, |stored| *stored == value) {
            hash_table::Entry::Occupied(_) => false,
            hash_table::Entry::Vacant(entry) => {
                entry.insert(value);
                true
            }
        }
    }

    /// Returns `true` if the set contains an element equal to `value`.
    pub fn contains<Q>(&self, value: &Q) -> bool
    where
        T: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        self.get(value).is_some()
    }

    /// Returns a reference to the stored element equal to `value`, if
    /// any.
    pub fn get<Q>(&self, value: &Q) -> Option<&T>
    where
        T: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        let hash = self.hash_value(value);
        self.table.find(hash, |stored| stored.borrow() == value)
    }

    /// Removes the element equal to `value`, if present.
    ///
    /// Returns `true` if an element was removed; removing an absent
    /// element is not an error. The vacated slot becomes a tombstone and
    /// the set never shrinks on removal.
    pub fn remove<Q>(&mut self, value: &Q) -> bool
    where
        T: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        self.take(value).is_some()
    }

    /// Removes and returns the stored element equal to `value`, if any.
    pub fn take<Q>(&mut self, value: &Q) -> Option<T>
    where
        T: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        let hash = self.hash_value(value);
        self.table.remove(hash, |stored| stored.borrow() == value)
    }

    /// Ensures the set can hold at least `count` elements in total
    /// without resizing. Never shrinks.
    pub fn reserve(&mut self, count: usize) {
        self.table.reserve(count);
    }

    /// Rebuilds or grows the set's slot array; see [`HashTable::rehash`]
    /// for the exact policy. `rehash(0)` shrinks to fit and purges
    /// tombstones.
    pub fn rehash(&mut self, capacity: usize) {
        self.table.rehash(capacity);
    }

    /// Returns `true` if the two sets have no elements in common.
    pub fn is_disjoint(&self, other: &Self) -> bool {
        if self.len() <= other.len() {
            self.iter().all(|v| !other.contains(v))
        } else {
            other.iter().all(|v| !self.contains(v))
        }
    }

    /// Returns `true` if every element of `self` is in `other`.
    pub fn is_subset(&self, other: &Self) -> bool {
        self.len() <= other.len() && self.iter().all(|v| other.contains(v))
    }

    /// Returns `true` if every element of `other` is in `self`.
    pub fn is_superset(&self, other: &Self) -> bool {
        other.is_subset(self)
    }
}

impl<T, S> Default for HashSet<T, S>
where
    S: Default,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<T, S, A> Debug for HashSet<T, S, A>
where
    T: Debug,
    A: TableAlloc,
{
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_set().entries(self.iter()).finish()
    }
}

impl<T, S, A> Clone for HashSet<T, S, A>
where
    T: Clone,
    S: Clone,
    A: TableAlloc + Clone,
{
    fn clone(&self) -> Self {
        Self {
            table: self.table.clone(),
            hash_builder: self.hash_builder.clone(),
        }
    }
}

impl<T, S, A> PartialEq for HashSet<T, S, A>
where
    T: Hash + Eq,
    S: BuildHasher,
    A: TableAlloc,
{
    fn eq(&self, other: &Self) -> bool {
        self.len() == other.len() && self.iter().all(|v| other.contains(v))
    }
}

impl<T, S, A> Eq for HashSet<T, S, A>
where
    T: Hash + Eq,
    S: BuildHasher,
    A: TableAlloc,
{
}

impl<T, S> FromIterator<T> for HashSet<T, S>
where
    T: Hash + Eq,
    S: BuildHasher + Default,
{
    /// Collects elements with first-insert-wins semantics: for duplicate
    /// elements the earliest is kept.
    fn from_iter<I: IntoIterator<Item = T>>(iter: I) -> Self {
        let iter = iter.into_iter();
        let mut set = Self::with_capacity_and_hasher(iter.size_hint().0, S::default());
        set.extend(iter);
        set
    }
}

impl<T, S, A> Extend<T> for HashSet<T, S, A>
where
    T: Hash + Eq,
    S: BuildHasher,
    A: TableAlloc,
{
    fn extend<I: IntoIterator<Item = T>>(&mut self, iter: I) {
        for value in iter {
            self.add(value);
        }
    }
}

/// An iterator over a set's elements.
pub struct Iter<'a, T, A: TableAlloc = Global> {
    inner: hash_table::Iter<'a, T, A>,
}

impl<'a, T, A: TableAlloc> Iterator for Iter<'a, T, A> {
    type Item = &'a T;

    fn next(&mut self) -> Option<Self::Item> {
        self.inner.next()
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.inner.size_hint()
    }
}

impl<T, A: TableAlloc> ExactSizeIterator for Iter<'_, T, A> {}

impl<T, A: TableAlloc> core::iter::FusedIterator for Iter<'_, T, A> {}

/// An owning iterator over a set's elements.
pub struct IntoIter<T, A: TableAlloc = Global> {
    inner: hash_table::IntoIter<T, A>,
}

impl<T, A: TableAlloc> Iterator for IntoIter<T, A> {
    type Item = T;

    fn next(&mut self) -> Option<Self::Item> {
        self.inner.next()
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.inner.size_hint()
    }
}

impl<T, A: TableAlloc> ExactSizeIterator for IntoIter<T, A> {}

impl<T, A: TableAlloc> core::iter::FusedIterator for IntoIter<T, A> {}

impl<T, S, A: TableAlloc> IntoIterator for HashSet<T, S, A> {
    type Item = T;
    type IntoIter = IntoIter<T, A>;

    fn into_iter(self) -> Self::IntoIter {
        IntoIter {
            inner: self.table.into_iter(),
        }
    }
}

impl<'a, T, S, A: TableAlloc> IntoIterator for &'a HashSet<T, S, A> {
    type Item = &'a T;
    type IntoIter = Iter<'a, T, A>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}
