use core::borrow::Borrow;
use core::fmt::Debug;
use core::hash::BuildHasher;
use core::hash::Hash;
use core::ops::Index;

use crate::alloc::Global;
use crate::alloc::TableAlloc;
use crate::hash_table;
use crate::hash_table::HashTable;

/// A hash map keyed by `K` with values of type `V`, built on the
/// open-addressing [`HashTable`].
///
/// Key-value pairs are stored inline in the table's slot array as `(K, V)`
/// tuples; the hasher `S` is applied to keys and the resulting hash is
/// cached alongside each slot, so growing the table never re-hashes a key.
///
/// [`add`] follows first-insert-wins semantics: adding a key that is
/// already present keeps the existing value and returns `false`. Use
/// [`entry`] for in-place updates, including the `or_default` idiom for
/// counter maps.
///
/// [`add`]: HashMap::add
/// [`entry`]: HashMap::entry
///
/// ## Example
///
/// ```rust
/// use probe_hash::DefaultHashBuilder;
/// use probe_hash::HashMap;
///
/// let mut map: HashMap<&str, u32, DefaultHashBuilder> = HashMap::new();
/// assert!(map.add("alpha", 1));
/// assert!(!map.add("alpha", 99));
/// assert_eq!(map.get(&"alpha"), Some(&1));
///
/// *map.entry("beta").or_default() += 7;
/// assert_eq!(map[&"beta"], 7);
/// ```
pub struct HashMap<K, V, S, A: TableAlloc = Global> {
    table: HashTable<(K, V), A>,
    hash_builder: S,
}

impl<K, V, S> HashMap<K, V, S>
where
    S: Default,
{
    /// Creates an empty map with a default hasher and the global
    /// allocator. Does not allocate until the first insert.
    pub fn new() -> Self {
        Self::with_hasher(S::default())
    }

    /// Creates a map that can hold at least `capacity` entries without
    /// resizing, with a default hasher and the global allocator.
    pub fn with_capacity(capacity: usize) -> Self {
        Self::with_capacity_and_hasher(capacity, S::default())
    }
}

impl<K, V, S> HashMap<K, V, S> {
    /// Creates an empty map with the given hasher.
    pub fn with_hasher(hash_builder: S) -> Self {
        Self {
            table: HashTable::new(),
            hash_builder,
        }
    }

    /// Creates a map that can hold at least `capacity` entries without
    /// resizing, with the given hasher.
    pub fn with_capacity_and_hasher(capacity: usize, hash_builder: S) -> Self {
        Self {
            table: HashTable::with_capacity(capacity),
            hash_builder,
        }
    }
}

impl<K, V, S, A: TableAlloc> HashMap<K, V, S, A> {
    /// Creates an empty map with the given hasher and allocator.
    pub fn with_hasher_in(hash_builder: S, alloc: A) -> Self {
        Self {
            table: HashTable::new_in(alloc),
            hash_builder,
        }
    }

    /// Creates a map that can hold at least `capacity` entries without
    /// resizing, with the given hasher and allocator.
    pub fn with_capacity_and_hasher_in(capacity: usize, hash_builder: S, alloc: A) -> Self {
        Self {
            table: HashTable::with_capacity_in(capacity, alloc),
            hash_builder,
        }
    }

    /// Returns the number of entries in the map.
    pub fn len(&self) -> usize {
        self.table.len()
    }

    /// Returns `true` if the map contains no entries.
    pub fn is_empty(&self) -> bool {
        self.table.is_empty()
    }

    /// Returns the current slot count. Always `0` or of the form
    /// `2^k - 1`.
    pub fn capacity(&self) -> usize {
        self.table.capacity()
    }

    /// Returns the number of entries that can still be added before the
    /// next growth.
    pub fn slack(&self) -> usize {
        self.table.slack()
    }

    /// Removes all entries, keeping the allocated capacity.
    pub fn clear(&mut self) {
        self.table.clear();
    }

    /// Exchanges the contents of two maps in O(1), hashers included.
    pub fn swap(&mut self, other: &mut Self) {
        core::mem::swap(self, other);
    }

    /// Returns a reference to the map's hasher.
    pub fn hasher(&self) -> &S {
        &self.hash_builder
    }

    /// Returns an iterator over the map's entries in slot-index order.
    pub fn iter(&self) -> Iter<'_, K, V, A> {
        Iter {
            inner: self.table.iter(),
        }
    }

    /// Returns an iterator over the map's entries, with mutable
    /// references to the values.
    pub fn iter_mut(&mut self) -> IterMut<'_, K, V, A> {
        IterMut {
            inner: self.table.iter_mut(),
        }
    }

    /// Returns an iterator over the map's keys.
    pub fn keys(&self) -> Keys<'_, K, V, A> {
        Keys { inner: self.iter() }
    }

    /// Returns an iterator over the map's values.
    pub fn values(&self) -> Values<'_, K, V, A> {
        Values { inner: self.iter() }
    }

    /// Returns an iterator over the map's values, mutably.
    pub fn values_mut(&mut self) -> ValuesMut<'_, K, V, A> {
        ValuesMut {
            inner: self.iter_mut(),
        }
    }
}

impl<K, V, S, A> HashMap<K, V, S, A>
where
    K: Hash + Eq,
    S: BuildHasher,
    A: TableAlloc,
{
    fn hash_key<Q>(&self, key: &Q) -> u64
    where
        Q: Hash + ?Sized,
    {
        self.hash_builder.hash_one(key)
    }

    /// Adds a key-value pair if the key is absent.
    ///
    /// Returns `true` if the pair was inserted. If the key is already
    /// present the map is unchanged and `false` is returned: the first
    /// insert wins, later adds never overwrite.
    ///
    /// # Examples
    ///
    /// ```rust
    /// # use probe_hash::DefaultHashBuilder;
    /// # use probe_hash::HashMap;
    /// #
    /// let mut map: HashMap<u32, &str, DefaultHashBuilder> = HashMap::new();
    /// assert!(map.add(1, "first"));
    /// assert!(!map.add(1, "second"));
    /// assert_eq!(map.get(&1), Some(&"first"));
    /// ```
    pub fn add(&mut self, key: K, value: V) -> bool {
        let hash = self.hash_key(&key);
        match self.table.entry(hash, |(k, _)| *k == key) {
            hash_table::Entry::Occupied(_) => false,
            hash_table::Entry::Vacant(entry) => {
                entry.insert((key, value));
                true
            }
        }
    }

    /// Gets the entry for a key, for in-place access and insertion.
    ///
    /// This is the map's substitute for an indexing insert: a vacant
    /// entry's [`or_insert`]/[`or_default`] construct the value exactly
    /// once, and an occupied entry exposes the existing value without
    /// replacing it.
    ///
    /// [`or_insert`]: Entry::or_insert
    /// [`or_default`]: Entry::or_default
    ///
    /// # Examples
    ///
    /// ```rust
    /// # use probe_hash::DefaultHashBuilder;
    /// # use probe_hash::HashMap;
    /// #
    /// let mut counts: HashMap<char, u32, DefaultHashBuilder> = HashMap::new();
    /// for c in "abracadabra".chars() {
    ///     *counts.entry(c).or_default() += 1;
    /// }
    /// assert_eq!(counts[&'a'], 5);
    /// assert_eq!(counts[&'b'], 2);
    /// ```
    pub fn entry(&mut self, key: K) -> Entry<'_, K, V, A> {
        let hash = self.hash_key(&key);
        match self.table.entry(hash, |(k, _)| *k == key) {
            hash_table::Entry::Occupied(entry) => Entry::Occupied(OccupiedEntry { entry }),
            hash_table::Entry::Vacant(entry) => Entry::Vacant(VacantEntry { entry, key }),
        }
    }

    /// Returns a reference to the value for `key`, or `None` if absent.
    pub fn get<Q>(&self, key: &Q) -> Option<&V>
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        let hash = self.hash_key(key);
        self.table
            .find(hash, |(k, _)| k.borrow() == key)
            .map(|(_, v)| v)
    }

    /// Returns the stored key-value pair for `key`, or `None` if absent.
    pub fn get_key_value<Q>(&self, key: &Q) -> Option<(&K, &V)>
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        let hash = self.hash_key(key);
        self.table
            .find(hash, |(k, _)| k.borrow() == key)
            .map(|(k, v)| (k, v))
    }

    /// Returns a mutable reference to the value for `key`, or `None` if
    /// absent.
    pub fn get_mut<Q>(&mut self, key: &Q) -> Option<&mut V>
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        let hash = self.hash_key(key);
        self.table
            .find_mut(hash, |(k, _)| k.borrow() == key)
            .map(|(_, v)| v)
    }

    /// Returns `true` if the map contains `key`.
    pub fn contains_key<Q>(&self, key: &Q) -> bool
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        self.get(key).is_some()
    }

    /// Removes `key` from the map, returning its value.
    ///
    /// Returns `None` if the key is absent; removing an absent key is not
    /// an error. The vacated slot becomes a tombstone and the map never
    /// shrinks on removal.
    pub fn remove<Q>(&mut self, key: &Q) -> Option<V>
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        self.remove_entry(key).map(|(_, v)| v)
    }

    /// Removes `key` from the map, returning the stored key and value.
    pub fn remove_entry<Q>(&mut self, key: &Q) -> Option<(K, V)>
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        let hash = self.hash_key(key);
        self.table.remove(hash, |(k, _)| k.borrow() == key)
    }

    /// Ensures the map can hold at least `count` entries in total without
    /// resizing. Never shrinks.
    pub fn reserve(&mut self, count: usize) {
        self.table.reserve(count);
    }

    /// Rebuilds or grows the map's slot array; see [`HashTable::rehash`]
    /// for the exact policy. `rehash(0)` shrinks to fit and purges
    /// tombstones.
    pub fn rehash(&mut self, capacity: usize) {
        self.table.rehash(capacity);
    }
}

impl<K, V, S> Default for HashMap<K, V, S>
where
    S: Default,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<K, V, S, A> Debug for HashMap<K, V, S, A>
where
    K: Debug,
    V: Debug,
    A: TableAlloc,
{
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_map().entries(self.iter()).finish()
    }
}

impl<K, V, S, A> Clone for HashMap<K, V, S, A>
where
    K: Clone,
    V: Clone,
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

impl<K, V, S, A> PartialEq for HashMap<K, V, S, A>
where
    K: Hash + Eq,
    V: PartialEq,
    S: BuildHasher,
    A: TableAlloc,
{
    fn eq(&self, other: &Self) -> bool {
        self.len() == other.len() && self.iter().all(|(k, v)| other.get(k) == Some(v))
    }
}

impl<K, V, S, A> Eq for HashMap<K, V, S, A>
where
    K: Hash + Eq,
    V: Eq,
    S: BuildHasher,
    A: TableAlloc,
{
}

impl<K, V, Q, S, A> Index<&Q> for HashMap<K, V, S, A>
where
    K: Borrow<Q> + Hash + Eq,
    Q: Hash + Eq + ?Sized,
    S: BuildHasher,
    A: TableAlloc,
{
    type Output = V;

    /// Returns a reference to the value for `key`.
    ///
    /// # Panics
    ///
    /// Panics if the key is absent. Read-only indexing never inserts; use
    /// [`entry`] for insert-if-absent access.
    ///
    /// [`entry`]: HashMap::entry
    fn index(&self, key: &Q) -> &V {
        self.get(key).expect("no entry found for key")
    }
}

impl<K, V, S> FromIterator<(K, V)> for HashMap<K, V, S>
where
    K: Hash + Eq,
    S: BuildHasher + Default,
{
    /// Collects key-value pairs with first-insert-wins semantics: for
    /// duplicate keys the earliest pair is kept.
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let iter = iter.into_iter();
        let mut map = Self::with_capacity_and_hasher(iter.size_hint().0, S::default());
        map.extend(iter);
        map
    }
}

impl<K, V, S, A> Extend<(K, V)> for HashMap<K, V, S, A>
where
    K: Hash + Eq,
    S: BuildHasher,
    A: TableAlloc,
{
    fn extend<I: IntoIterator<Item = (K, V)>>(&mut self, iter: I) {
        for (key, value) in iter {
            self.add(key, value);
        }
    }
}

/// A view into a single map entry, vacant or occupied.
///
/// Constructed by [`entry`] on [`HashMap`].
///
/// [`entry`]: HashMap::entry
pub enum Entry<'a, K, V, A: TableAlloc = Global> {
    /// The key is not present in the map.
    Vacant(VacantEntry<'a, K, V, A>),
    /// The key is present in the map.
    Occupied(OccupiedEntry<'a, K, V, A>),
}

impl<'a, K, V, A: TableAlloc> Entry<'a, K, V, A> {
    /// Inserts `default` if the entry is vacant; returns a mutable
    /// reference to the value either way. An occupied entry keeps its
    /// existing value.
    pub fn or_insert(self, default: V) -> &'a mut V {
        match self {
            Entry::Occupied(entry) => entry.into_mut(),
            Entry::Vacant(entry) => entry.insert(default),
        }
    }

    /// Inserts the value computed by `default` if the entry is vacant;
    /// the closure is not called for an occupied entry.
    pub fn or_insert_with(self, default: impl FnOnce() -> V) -> &'a mut V {
        match self {
            Entry::Occupied(entry) => entry.into_mut(),
            Entry::Vacant(entry) => entry.insert(default()),
        }
    }

    /// Inserts `V::default()` if the entry is vacant.
    pub fn or_default(self) -> &'a mut V
    where
        V: Default,
    {
        self.or_insert_with(Default::default)
    }

    /// Applies `f` to the value if the entry is occupied, then returns
    /// the entry.
    pub fn and_modify(self, f: impl FnOnce(&mut V)) -> Self {
        match self {
            Entry::Occupied(mut entry) => {
                f(entry.get_mut());
                Entry::Occupied(entry)
            }
            vacant => vacant,
        }
    }

    /// Returns a reference to the entry's key.
    pub fn key(&self) -> &K {
        match self {
            Entry::Occupied(entry) => entry.key(),
            Entry::Vacant(entry) => entry.key(),
        }
    }
}

/// A view into a vacant map entry.
pub struct VacantEntry<'a, K, V, A: TableAlloc = Global> {
    entry: hash_table::VacantEntry<'a, (K, V), A>,
    key: K,
}

impl<'a, K, V, A: TableAlloc> VacantEntry<'a, K, V, A> {
    /// Returns a reference to the key that would be inserted.
    pub fn key(&self) -> &K {
        &self.key
    }

    /// Takes ownership of the key without inserting.
    pub fn into_key(self) -> K {
        self.key
    }

    /// Inserts a value and returns a mutable reference to it.
    pub fn insert(self, value: V) -> &'a mut V {
        let (_, v) = self.entry.insert((self.key, value));
        v
    }
}

/// A view into an occupied map entry.
pub struct OccupiedEntry<'a, K, V, A: TableAlloc = Global> {
    entry: hash_table::OccupiedEntry<'a, (K, V), A>,
}

impl<'a, K, V, A: TableAlloc> OccupiedEntry<'a, K, V, A> {
    /// Returns a reference to the stored key.
    pub fn key(&self) -> &K {
        &self.entry.get().0
    }

    /// Gets a reference to the stored value.
    pub fn get(&self) -> &V {
        &self.entry.get().1
    }

    /// Gets a mutable reference to the stored value.
    pub fn get_mut(&mut self) -> &mut V {
        &mut self.entry.get_mut().1
    }

    /// Converts the entry into a mutable reference with the map's borrow
    /// lifetime.
    pub fn into_mut(self) -> &'a mut V {
        &mut self.entry.into_mut().1
    }

    /// Removes the entry, leaving a tombstone, and returns the value.
    pub fn remove(self) -> V {
        self.entry.remove().1
    }

    /// Removes the entry, leaving a tombstone, and returns the key and
    /// value.
    pub fn remove_entry(self) -> (K, V) {
        self.entry.remove()
    }
}

/// An iterator over a map's entries.
pub struct Iter<'a, K, V, A: TableAlloc = Global> {
    inner: hash_table::Iter<'a, (K, V), A>,
}

impl<'a, K, V, A: TableAlloc> Iterator for Iter<'a, K, V, A> {
    type Item = (&'a K, &'a V);

    fn next(&mut self) -> Option<Self::Item> {
        self.inner.next().map(|(k, v)| (k, v))
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.inner.size_hint()
    }
}

impl<K, V, A: TableAlloc> ExactSizeIterator for Iter<'_, K, V, A> {}

impl<K, V, A: TableAlloc> core::iter::FusedIterator for Iter<'_, K, V, A> {}

/// A mutable iterator over a map's entries. Keys stay shared; mutating a
/// key would strand the entry in its slot.
pub struct IterMut<'a, K, V, A: TableAlloc = Global> {
    inner: hash_table::IterMut<'a, (K, V), A>,
}

impl<'a, K, V, A: TableAlloc> Iterator for IterMut<'a, K, V, A> {
    type Item = (&'a K, &'a mut V);

    fn next(&mut self) -> Option<Self::Item> {
        self.inner.next().map(|(k, v)| (&*k, v))
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.inner.size_hint()
    }
}

impl<K, V, A: TableAlloc> ExactSizeIterator for IterMut<'_, K, V, A> {}

impl<K, V, A: TableAlloc> core::iter::FusedIterator for IterMut<'_, K, V, A> {}

/// An iterator over a map's keys.
pub struct Keys<'a, K, V, A: TableAlloc = Global> {
    inner: Iter<'a, K, V, A>,
}

impl<'a, K, V, A: TableAlloc> Iterator for Keys<'a, K, V, A> {
    type Item = &'a K;

    fn next(&mut self) -> Option<Self::Item> {
        self.inner.next().map(|(k, _)| k)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.inner.size_hint()
    }
}

impl<K, V, A: TableAlloc> ExactSizeIterator for Keys<'_, K, V, A> {}

impl<K, V, A: TableAlloc> core::iter::FusedIterator for Keys<'_, K, V, A> {}

/// An iterator over a map's values.
pub struct Values<'a, K, V, A: TableAlloc = Global> {
    inner: Iter<'a, K, V, A>,
}

impl<'a, K, V, A: TableAlloc> Iterator for Values<'a, K, V, A> {
    type Item = &'a V;

    fn next(&mut self) -> Option<Self::Item> {
        self.inner.next().map(|(_, v)| v)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.inner.size_hint()
    }
}

impl<K, V, A: TableAlloc> ExactSizeIterator for Values<'_, K, V, A> {}

impl<K, V, A: TableAlloc> core::iter::FusedIterator for Values<'_, K, V, A> {}

/// A mutable iterator over a map's values.
pub struct ValuesMut<'a, K, V, A: TableAlloc = Global> {
    inner: IterMut<'a, K, V, A>,
}

impl<'a, K, V, A: TableAlloc> Iterator for ValuesMut<'a, K, V, A> {
    type Item = &'a mut V;

    fn next(&mut self) -> Option<Self::Item> {
        self.inner.next().map(|(_, v)| v)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.inner.size_hint()
    }
}

impl<K, V, A: TableAlloc> ExactSizeIterator for ValuesMut<'_, K, V, A> {}

impl<K, V, A: TableAlloc> core::iter::FusedIterator for ValuesMut<'_, K, V, A> {}

/// An owning iterator over a map's entries.
pub struct IntoIter<K, V, A: TableAlloc = Global> {
    inner: hash_table::IntoIter<(K, V), A>,
}

impl<K, V, A: TableAlloc> Iterator for IntoIter<K, V, A> {
    type Item = (K, V);

    fn next(&mut self) -> Option<Self::Item> {
        self.inner.next()
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.inner.size_hint()
    }
}

impl<K, V, A: TableAlloc> ExactSizeIterator for IntoIter<K, V, A> {}

impl<K, V, A: TableAlloc> core::iter::FusedIterator for IntoIter<K, V, A> {}

impl<K, V, S, A: TableAlloc> IntoIterator for HashMap<K, V, S, A> {
    type Item = (K, V);
    type IntoIter = IntoIter<K, V, A>;

    fn into_iter(self) -> Self::IntoIter {
        IntoIter {
            inner: self.table.into_iter(),
        }
    }
}

impl<'a, K, V, S, A: TableAlloc> IntoIterator for &'a HashMap<K, V, S, A> {
    type Item = (&'a K, &'a V);
    type IntoIter = Iter<'a, K, V, A>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

impl<'a, K, V, S, A: TableAlloc> IntoIterator for &'a mut HashMap<K, V, S, A> {
    type Item = (&'a K, &'a mut V);
    type IntoIter = IterMut<'a, K, V, A>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter_mut()
    }
}
