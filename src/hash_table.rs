use core::alloc::Layout;
use core::fmt::Debug;
use core::marker::PhantomData;
use core::mem::MaybeUninit;
use core::ptr::NonNull;

use crate::alloc::Global;
use crate::alloc::TableAlloc;

/// Tag value marking a slot that has never held an element (or was wiped
/// by a rebuild). Terminates probe sequences.
const EMPTY: u8 = 0x80;

/// Tag value marking a slot whose element was removed. Does not terminate
/// probe sequences: a key inserted past this slot must stay reachable.
const TOMBSTONE: u8 = 0x81;

/// Tag value marking a slot holding an initialized hash and payload.
const OCCUPIED: u8 = 0x01;

/// Smallest non-zero capacity. Capacities are always `2^k - 1` with
/// `k >= 2`: 3, 7, 15, 31, ...
const MIN_CAPACITY: usize = 3;

/// Maximum number of live elements the table accepts at `capacity` before
/// an insert triggers growth.
///
/// For `capacity = 2^k - 1` this equals `floor(capacity * 7/8) + 1`: since
/// `7 * (2^k - 1) ≡ 1 (mod 8)`, the ceiling and floor of `7c/8` differ by
/// exactly one, and the policy uses the ceiling. Capacity 3 holds 3
/// elements, 7 holds 7, 15 holds 14, 31 holds 28, 255 holds 224.
#[inline(always)]
fn max_load(capacity: usize) -> usize {
    capacity - capacity / 8
}

/// Smallest capacity of the form `2^k - 1` with at least `n` slots.
///
/// Used by positive `rehash` requests, which name a slot count.
#[inline(always)]
fn capacity_at_least(n: usize) -> usize {
    if n == 0 {
        return 0;
    }
    let pow = n
        .checked_add(1)
        .and_then(usize::checked_next_power_of_two)
        .expect("capacity overflow");
    (pow - 1).max(MIN_CAPACITY)
}

/// Smallest capacity of the form `2^k - 1` whose load ceiling admits `n`
/// live elements.
///
/// Used by the insert growth trigger, `reserve`, and the `rehash(0)`
/// shrink, which all reason in elements rather than slots. `n == 0`
/// maps to the unallocated empty table.
#[inline(always)]
fn capacity_for(n: usize) -> usize {
    if n == 0 {
        return 0;
    }
    let mut capacity = MIN_CAPACITY;
    while max_load(capacity) < n {
        capacity = capacity
            .checked_mul(2)
            .and_then(|c| c.checked_add(1))
            .expect("capacity overflow");
    }
    capacity
}

/// Deterministic linear probe sequence over the slot array.
///
/// Starts at `hash mod capacity` and walks forward with wraparound. The
/// sequence is bounded at `capacity` steps: small capacities permit a 100%
/// full table, where no `EMPTY` tag exists to terminate the walk.
struct Probe {
    index: usize,
    remaining: usize,
    capacity: usize,
}

impl Probe {
    #[inline(always)]
    fn new(hash: u64, capacity: usize) -> Self {
        debug_assert!(capacity > 0);
        Probe {
            index: (hash % capacity as u64) as usize,
            remaining: capacity,
            capacity,
        }
    }

    #[inline(always)]
    fn next(&mut self) -> Option<usize> {
        if self.remaining == 0 {
            return None;
        }
        self.remaining -= 1;
        let index = self.index;
        self.index += 1;
        if self.index == self.capacity {
            self.index = 0;
        }
        Some(index)
    }
}

/// Result of probing for an insertion position.
enum InsertSlot {
    /// The key is already present at this index.
    Existing(usize),
    /// The key is absent; the first tombstone-or-empty slot seen along the
    /// probe sequence, or `None` if the table has no free slot.
    Free(Option<usize>),
}

#[derive(Debug)]
struct DataLayout {
    layout: Layout,
    tags_offset: usize,
    hashes_offset: usize,
    slots_offset: usize,
}

impl DataLayout {
    fn new<V>(capacity: usize) -> Self {
        let slots_layout =
            Layout::array::<MaybeUninit<V>>(capacity).expect("allocation size overflow");
        let hashes_layout =
            Layout::array::<MaybeUninit<u64>>(capacity).expect("allocation size overflow");
        let tags_layout = Layout::array::<u8>(capacity).expect("allocation size overflow");

        let (layout, slots_offset) = Layout::new::<()>()
            .extend(slots_layout)
            .expect("allocation size overflow");
        let (layout, hashes_offset) = layout
            .extend(hashes_layout)
            .expect("allocation size overflow");
        let (layout, tags_offset) = layout
            .extend(tags_layout)
            .expect("allocation size overflow");

        DataLayout {
            layout,
            tags_offset,
            hashes_offset,
            slots_offset,
        }
    }
}

/// An open-addressing hash table with linear probing and tombstone
/// deletion.
///
/// `HashTable<V, A>` stores values of type `V` in a single contiguous slot
/// array obtained from the allocator `A`. Unlike standard hash maps, every
/// operation takes the precomputed 64-bit hash and an equality predicate,
/// which keeps the engine independent of any particular hasher.
///
/// Capacities are always of the form `2^k - 1` and the table grows before
/// an insert would push the live count past the 7/8 load ceiling. Removal
/// leaves a tombstone; tombstones are reused by later inserts and purged
/// only by a full rebuild ([`rehash`]).
///
/// Inserting a value whose key is already present never overwrites the
/// stored payload; the entry API hands back the existing element instead.
///
/// [`rehash`]: HashTable::rehash
///
/// ## Example
///
/// ```rust
/// # use core::hash::Hash;
/// # use core::hash::Hasher;
/// #
/// # use probe_hash::hash_table::HashTable;
/// # use siphasher::sip::SipHasher;
/// #
/// # fn hash_u64(n: u64) -> u64 {
/// #     let mut hasher = SipHasher::new();
/// #     n.hash(&mut hasher);
/// #     hasher.finish()
/// # }
/// #
/// let mut table: HashTable<(u64, &str)> = HashTable::new();
/// let hash = hash_u64(7);
///
/// match table.entry(hash, |&(k, _)| k == 7) {
///     probe_hash::hash_table::Entry::Vacant(entry) => {
///         entry.insert((7, "seven"));
///     }
///     probe_hash::hash_table::Entry::Occupied(_) => unreachable!(),
/// }
///
/// assert_eq!(table.find(hash, |&(k, _)| k == 7), Some(&(7, "seven")));
/// ```
pub struct HashTable<V, A: TableAlloc = Global> {
    layout: DataLayout,
    base: NonNull<u8>,
    capacity: usize,
    live: usize,
    tombstones: usize,
    alloc: A,
    _phantom: PhantomData<V>,
}

impl<V> HashTable<V> {
    /// Creates an empty table using the global allocator.
    ///
    /// Does not allocate until the first insert.
    pub fn new() -> Self {
        Self::new_in(Global)
    }

    /// Creates a table that can hold at least `capacity` elements without
    /// resizing, using the global allocator.
    ///
    /// # Examples
    ///
    /// ```rust
    /// # use probe_hash::hash_table::HashTable;
    /// #
    /// let table: HashTable<u64> = HashTable::with_capacity(100);
    /// assert!(table.slack() >= 100);
    /// ```
    pub fn with_capacity(capacity: usize) -> Self {
        Self::with_capacity_in(capacity, Global)
    }
}

impl<V> Default for HashTable<V> {
    fn default() -> Self {
        Self::new()
    }
}

impl<V, A: TableAlloc> HashTable<V, A> {
    /// Creates an empty table using the given allocator.
    ///
    /// The allocator is called once per structural resize, never per
    /// element. `&A` implements [`TableAlloc`], so a borrowed allocator
    /// (for instance an instrumented one) can be injected directly.
    pub fn new_in(alloc: A) -> Self {
        Self {
            layout: DataLayout::new::<V>(0),
            base: NonNull::dangling(),
            capacity: 0,
            live: 0,
            tombstones: 0,
            alloc,
            _phantom: PhantomData,
        }
    }

    /// Creates a table that can hold at least `capacity` elements without
    /// resizing, using the given allocator.
    pub fn with_capacity_in(capacity: usize, alloc: A) -> Self {
        let mut table = Self::new_in(alloc);
        if capacity > 0 {
            table.rebuild(capacity_for(capacity));
        }
        table
    }

    fn tags_ptr(&self) -> NonNull<[u8]> {
        // SAFETY: The allocation is valid and sized for `capacity` tags;
        // for the unallocated table both offset and length are zero.
        unsafe {
            NonNull::slice_from_raw_parts(
                self.base.add(self.layout.tags_offset).cast(),
                self.capacity,
            )
        }
    }

    fn hashes_ptr(&self) -> NonNull<[MaybeUninit<u64>]> {
        // SAFETY: The allocation is valid and sized for `capacity` hashes.
        unsafe {
            NonNull::slice_from_raw_parts(
                self.base.add(self.layout.hashes_offset).cast(),
                self.capacity,
            )
        }
    }

    fn slots_ptr(&self) -> NonNull<[MaybeUninit<V>]> {
        // SAFETY: The allocation is valid and sized for `capacity` slots.
        unsafe {
            NonNull::slice_from_raw_parts(
                self.base.add(self.layout.slots_offset).cast(),
                self.capacity,
            )
        }
    }

    /// Reads the tag at `index`.
    ///
    /// # Safety
    ///
    /// The caller must ensure `index` is less than `capacity`.
    #[inline(always)]
    unsafe fn tag(&self, index: usize) -> u8 {
        // SAFETY: Caller ensures `index` is within the tags array.
        unsafe { *self.tags_ptr().as_ref().get_unchecked(index) }
    }

    /// Writes the tag at `index`.
    ///
    /// # Safety
    ///
    /// The caller must ensure `index` is less than `capacity`.
    #[inline(always)]
    unsafe fn set_tag(&mut self, index: usize, tag: u8) {
        // SAFETY: Caller ensures `index` is within the tags array.
        unsafe {
            *self.tags_ptr().as_mut().get_unchecked_mut(index) = tag;
        }
    }

    /// Walks the probe sequence looking for an occupied slot matching
    /// `hash` and `eq`. Stops with "absent" at the first `EMPTY` tag;
    /// tombstones are skipped, never terminal.
    fn locate(&self, hash: u64, eq: impl Fn(&V) -> bool) -> Option<usize> {
        if self.live == 0 {
            return None;
        }

        let mut probe = Probe::new(hash, self.capacity);
        while let Some(index) = probe.next() {
            // SAFETY: Probe indices are always within `capacity`; occupied
            // slots hold initialized hashes and payloads.
            unsafe {
                match self.tag(index) {
                    EMPTY => return None,
                    TOMBSTONE => {}
                    _ => {
                        if self.hashes_ptr().as_ref().get_unchecked(index).assume_init_read()
                            == hash
                            && eq(self.slots_ptr().as_ref().get_unchecked(index).assume_init_ref())
                        {
                            return Some(index);
                        }
                    }
                }
            }
        }

        None
    }

    /// Walks the full probe sequence for an insert: an occupied match wins
    /// immediately, otherwise the first tombstone-or-empty slot seen is
    /// remembered as the insertion target. The walk cannot stop at the
    /// first tombstone because a matching key may live past it.
    fn locate_for_insert(&self, hash: u64, eq: impl Fn(&V) -> bool) -> InsertSlot {
        if self.capacity == 0 {
            return InsertSlot::Free(None);
        }

        let mut first_free = None;
        let mut probe = Probe::new(hash, self.capacity);
        while let Some(index) = probe.next() {
            // SAFETY: Probe indices are always within `capacity`; occupied
            // slots hold initialized hashes and payloads.
            unsafe {
                match self.tag(index) {
                    EMPTY => return InsertSlot::Free(Some(first_free.unwrap_or(index))),
                    TOMBSTONE => {
                        if first_free.is_none() {
                            first_free = Some(index);
                        }
                    }
                    _ => {
                        if self.hashes_ptr().as_ref().get_unchecked(index).assume_init_read()
                            == hash
                            && eq(self.slots_ptr().as_ref().get_unchecked(index).assume_init_ref())
                        {
                            return InsertSlot::Existing(index);
                        }
                    }
                }
            }
        }

        InsertSlot::Free(first_free)
    }

    /// Finds the first empty slot along the probe sequence for `hash`.
    ///
    /// Only called on tables known to be absent the key and to have at
    /// least one empty slot (immediately after a rebuild).
    fn first_empty(&self, hash: u64) -> usize {
        let mut probe = Probe::new(hash, self.capacity);
        while let Some(index) = probe.next() {
            // SAFETY: Probe indices are always within `capacity`.
            if unsafe { self.tag(index) } == EMPTY {
                return index;
            }
        }
        unreachable!("rebuilt table has no empty slot")
    }

    /// Rebuilds the slot array at `new_capacity`, re-probing every
    /// occupied slot's cached hash against the new capacity.
    ///
    /// Performs exactly one allocation and at most one free regardless of
    /// element count. Payloads move bitwise; the old buffer is freed
    /// without running destructors for moved-out contents. Tombstones do
    /// not survive a rebuild.
    fn rebuild(&mut self, new_capacity: usize) {
        debug_assert!(new_capacity == 0 || new_capacity >= self.live);
        debug_assert!(new_capacity == 0 || (new_capacity + 1).is_power_of_two());

        let new_layout = DataLayout::new::<V>(new_capacity);
        let new_base = if new_layout.layout.size() == 0 {
            NonNull::dangling()
        } else {
            let base = self.alloc.allocate(new_layout.layout);
            // SAFETY: Freshly allocated buffer; the tags range lies within
            // it.
            unsafe {
                core::ptr::write_bytes(
                    base.as_ptr().add(new_layout.tags_offset),
                    EMPTY,
                    new_capacity,
                );
            }
            base
        };

        let old_layout = core::mem::replace(&mut self.layout, new_layout);
        let old_base = core::mem::replace(&mut self.base, new_base);
        let old_capacity = core::mem::replace(&mut self.capacity, new_capacity);
        self.tombstones = 0;

        if old_layout.layout.size() == 0 {
            return;
        }

        // SAFETY: The old buffer stays valid until freed below; occupied
        // slots hold initialized hashes and payloads. Values and hashes
        // are moved bitwise into the new buffer; only the new table will
        // drop them.
        unsafe {
            if self.live > 0 {
                let old_tags: NonNull<[u8]> = NonNull::slice_from_raw_parts(
                    old_base.add(old_layout.tags_offset).cast(),
                    old_capacity,
                );
                let old_hashes: NonNull<[MaybeUninit<u64>]> = NonNull::slice_from_raw_parts(
                    old_base.add(old_layout.hashes_offset).cast(),
                    old_capacity,
                );
                let old_slots: NonNull<[MaybeUninit<V>]> = NonNull::slice_from_raw_parts(
                    old_base.add(old_layout.slots_offset).cast(),
                    old_capacity,
                );

                for (index, &tag) in old_tags.as_ref().iter().enumerate() {
                    if tag != OCCUPIED {
                        continue;
                    }

                    let hash = old_hashes.as_ref().get_unchecked(index).assume_init_read();
                    let target = self.first_empty(hash);
                    core::ptr::copy_nonoverlapping(
                        old_slots.as_ref().get_unchecked(index).as_ptr(),
                        self.slots_ptr().as_mut().get_unchecked_mut(target).as_mut_ptr(),
                        1,
                    );
                    self.hashes_ptr()
                        .as_mut()
                        .get_unchecked_mut(target)
                        .write(hash);
                    self.set_tag(target, OCCUPIED);
                }
            }

            self.alloc.free(old_base, old_layout.layout);
        }
    }

    /// Gets an entry for the given hash and equality predicate.
    ///
    /// Returns [`Entry::Occupied`] if a matching element is present — the
    /// stored payload is never overwritten — and [`Entry::Vacant`]
    /// otherwise. The growth check runs only when the insert would create
    /// a new occupied slot: a hit on an existing element never allocates.
    ///
    /// # Examples
    ///
    /// ```rust
    /// # use core::hash::Hash;
    /// # use core::hash::Hasher;
    /// #
    /// # use probe_hash::hash_table::Entry;
    /// # use probe_hash::hash_table::HashTable;
    /// # use siphasher::sip::SipHasher;
    /// #
    /// # fn hash_u64(n: u64) -> u64 {
    /// #     let mut hasher = SipHasher::new();
    /// #     n.hash(&mut hasher);
    /// #     hasher.finish()
    /// # }
    /// #
    /// let mut table: HashTable<u64> = HashTable::new();
    /// let hash = hash_u64(1);
    ///
    /// match table.entry(hash, |&v| v == 1) {
    ///     Entry::Vacant(entry) => {
    ///         entry.insert(1);
    ///     }
    ///     Entry::Occupied(_) => unreachable!(),
    /// }
    ///
    /// // A second entry for the same key reports the existing element.
    /// assert!(matches!(
    ///     table.entry(hash, |&v| v == 1),
    ///     Entry::Occupied(_)
    /// ));
    /// ```
    pub fn entry(&mut self, hash: u64, eq: impl Fn(&V) -> bool) -> Entry<'_, V, A> {
        match self.locate_for_insert(hash, eq) {
            InsertSlot::Existing(index) => Entry::Occupied(OccupiedEntry { table: self, index }),
            InsertSlot::Free(slot) => {
                let index = match slot {
                    Some(index) if self.live < max_load(self.capacity) => index,
                    _ => {
                        self.rebuild(capacity_for(self.live + 1));
                        self.first_empty(hash)
                    }
                };
                Entry::Vacant(VacantEntry {
                    table: self,
                    hash,
                    index,
                })
            }
        }
    }

    /// Finds a value by hash and equality predicate.
    ///
    /// Returns `None` for an absent key; absence is not an error. Remains
    /// correct under fully colliding hashes, degrading to a linear scan.
    ///
    /// # Examples
    ///
    /// ```rust
    /// # use probe_hash::hash_table::HashTable;
    /// #
    /// let mut table: HashTable<u64> = HashTable::new();
    /// table.entry(42, |&v| v == 9).or_insert(9);
    ///
    /// assert_eq!(table.find(42, |&v| v == 9), Some(&9));
    /// assert_eq!(table.find(42, |&v| v == 10), None);
    /// ```
    #[inline]
    pub fn find(&self, hash: u64, eq: impl Fn(&V) -> bool) -> Option<&V> {
        let index = self.locate(hash, eq)?;
        // SAFETY: `locate` only returns occupied, in-bounds indices.
        Some(unsafe { self.slots_ptr().as_ref().get_unchecked(index).assume_init_ref() })
    }

    /// Finds a value by hash and equality predicate, returning a mutable
    /// reference.
    #[inline]
    pub fn find_mut(&mut self, hash: u64, eq: impl Fn(&V) -> bool) -> Option<&mut V> {
        let index = self.locate(hash, eq)?;
        // SAFETY: `locate` only returns occupied, in-bounds indices.
        Some(unsafe {
            self.slots_ptr()
                .as_mut()
                .get_unchecked_mut(index)
                .assume_init_mut()
        })
    }

    /// Removes and returns a value by hash and equality predicate.
    ///
    /// The slot is marked as a tombstone so probe sequences that passed
    /// through it still find their keys; the slot becomes empty again only
    /// on the next rebuild. Removing an absent key is a no-op. The table
    /// never shrinks on removal.
    ///
    /// # Examples
    ///
    /// ```rust
    /// # use probe_hash::hash_table::HashTable;
    /// #
    /// let mut table: HashTable<u64> = HashTable::new();
    /// table.entry(3, |&v| v == 3).or_insert(3);
    ///
    /// assert_eq!(table.remove(3, |&v| v == 3), Some(3));
    /// assert_eq!(table.remove(3, |&v| v == 3), None);
    /// ```
    pub fn remove(&mut self, hash: u64, eq: impl Fn(&V) -> bool) -> Option<V> {
        let index = self.locate(hash, eq)?;
        // SAFETY: `locate` only returns occupied, in-bounds indices; the
        // payload is read out before the tag flips to tombstone.
        unsafe {
            let value = self.slots_ptr().as_ref().get_unchecked(index).assume_init_read();
            self.set_tag(index, TOMBSTONE);
            self.live -= 1;
            self.tombstones += 1;
            Some(value)
        }
    }

    /// Ensures the table can hold at least `count` elements in total
    /// without resizing.
    ///
    /// Grows immediately if the required capacity exceeds the current one;
    /// otherwise does nothing. Never shrinks.
    pub fn reserve(&mut self, count: usize) {
        let target = capacity_for(count);
        if target > self.capacity {
            self.rebuild(target);
        }
    }

    /// Rebuilds or grows the table to a requested slot count.
    ///
    /// - `capacity == 0`: shrink to fit — rebuild at the smallest
    ///   `2^k - 1` whose load ceiling admits the current element count,
    ///   even when that equals the current capacity (this purges
    ///   tombstones). An empty table deallocates entirely.
    /// - `0 < capacity <= self.capacity()`: no-op; the policy never
    ///   shrinks on a positive request.
    /// - `capacity > self.capacity()`: grow to the smallest
    ///   `2^k - 1 >= capacity` exactly.
    ///
    /// # Examples
    ///
    /// ```rust
    /// # use probe_hash::hash_table::HashTable;
    /// #
    /// let mut table: HashTable<u64> = HashTable::new();
    /// for v in 0..3 {
    ///     table.entry(v, |&x| x == v).or_insert(v);
    /// }
    ///
    /// table.rehash(255);
    /// assert_eq!(table.capacity(), 255);
    ///
    /// table.rehash(0);
    /// assert_eq!(table.capacity(), 3);
    /// assert_eq!(table.len(), 3);
    /// ```
    pub fn rehash(&mut self, capacity: usize) {
        if capacity == 0 {
            self.rebuild(capacity_for(self.live));
        } else if capacity > self.capacity {
            self.rebuild(capacity_at_least(capacity));
        }
    }

    /// Returns the number of live elements.
    pub fn len(&self) -> usize {
        self.live
    }

    /// Returns `true` if the table contains no elements.
    pub fn is_empty(&self) -> bool {
        self.live == 0
    }

    /// Returns the current slot count.
    ///
    /// Always `0` or of the form `2^k - 1` (3, 7, 15, 31, ...).
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Returns the number of elements that can still be inserted before
    /// the next growth.
    pub fn slack(&self) -> usize {
        max_load(self.capacity) - self.live
    }

    /// Exchanges the contents of two tables in O(1).
    ///
    /// Only ownership of the buffers and the bookkeeping counters moves;
    /// no element is touched.
    pub fn swap(&mut self, other: &mut Self) {
        core::mem::swap(self, other);
    }

    /// Removes all elements, keeping the allocated capacity.
    pub fn clear(&mut self) {
        if self.capacity == 0 {
            return;
        }

        // SAFETY: Occupied slots hold initialized payloads; the tags range
        // lies within the allocation.
        unsafe {
            if core::mem::needs_drop::<V>() && self.live > 0 {
                for index in 0..self.capacity {
                    if self.tag(index) == OCCUPIED {
                        self.slots_ptr()
                            .as_mut()
                            .get_unchecked_mut(index)
                            .assume_init_drop();
                    }
                }
            }
            core::ptr::write_bytes(
                self.base.as_ptr().add(self.layout.tags_offset),
                EMPTY,
                self.capacity,
            );
        }

        self.live = 0;
        self.tombstones = 0;
    }

    /// Returns an iterator over all values in slot-index order.
    ///
    /// The order is an emergent property of the hashing scheme, not a
    /// guarantee; dense integer keys under an identity hasher happen to
    /// come out ascending.
    pub fn iter(&self) -> Iter<'_, V, A> {
        Iter {
            table: self,
            index: 0,
            remaining: self.live,
        }
    }

    /// Returns an iterator yielding mutable references to all values.
    pub fn iter_mut(&mut self) -> IterMut<'_, V, A> {
        IterMut {
            tags: self.tags_ptr(),
            slots: self.slots_ptr(),
            index: 0,
            remaining: self.live,
            _marker: PhantomData,
        }
    }

    #[cfg(test)]
    pub(crate) fn tombstone_count(&self) -> usize {
        self.tombstones
    }

    /// Recounts the tag array and checks the bookkeeping counters and
    /// capacity shape against it. Test-only.
    #[cfg(test)]
    pub(crate) fn check_invariants(&self) {
        assert!(self.capacity == 0 || (self.capacity + 1).is_power_of_two());
        assert!(self.capacity == 0 || self.capacity >= MIN_CAPACITY);
        assert!(self.live <= max_load(self.capacity));
        assert!(self.live + self.tombstones <= self.capacity);

        let mut occupied = 0;
        let mut tombstones = 0;
        for index in 0..self.capacity {
            // SAFETY: `index` is within the tags array.
            match unsafe { self.tag(index) } {
                EMPTY => {}
                TOMBSTONE => tombstones += 1,
                _ => occupied += 1,
            }
        }
        assert_eq!(occupied, self.live);
        assert_eq!(tombstones, self.tombstones);
    }
}

impl<V, A: TableAlloc> Debug for HashTable<V, A> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("HashTable")
            .field("len", &self.live)
            .field("capacity", &self.capacity)
            .field("tombstones", &self.tombstones)
            .finish()
    }
}

impl<V, A> Clone for HashTable<V, A>
where
    V: Clone,
    A: TableAlloc + Clone,
{
    fn clone(&self) -> Self {
        let mut new_table = Self::new_in(self.alloc.clone());
        if self.capacity == 0 {
            return new_table;
        }
        new_table.rebuild(self.capacity);

        // SAFETY: Both tables have the same capacity; source occupied
        // slots hold initialized hashes and payloads. Each destination tag
        // is written only after its payload, so a panicking `clone` leaves
        // the new table droppable (cloned-so-far elements are dropped via
        // their tags, nothing uninitialized is tagged occupied).
        unsafe {
            for index in 0..self.capacity {
                match self.tag(index) {
                    EMPTY => {}
                    TOMBSTONE => {
                        new_table.set_tag(index, TOMBSTONE);
                        new_table.tombstones += 1;
                    }
                    _ => {
                        let value = self.slots_ptr().as_ref().get_unchecked(index).assume_init_ref();
                        let hash = self.hashes_ptr().as_ref().get_unchecked(index).assume_init_read();
                        new_table
                            .slots_ptr()
                            .as_mut()
                            .get_unchecked_mut(index)
                            .write(value.clone());
                        new_table
                            .hashes_ptr()
                            .as_mut()
                            .get_unchecked_mut(index)
                            .write(hash);
                        new_table.set_tag(index, OCCUPIED);
                        new_table.live += 1;
                    }
                }
            }
        }

        debug_assert_eq!(new_table.live, self.live);
        new_table
    }
}

impl<V, A: TableAlloc> Drop for HashTable<V, A> {
    fn drop(&mut self) {
        // SAFETY: Occupied slots hold initialized payloads; the allocation
        // is valid and was obtained from `self.alloc`.
        unsafe {
            if core::mem::needs_drop::<V>() && self.live > 0 {
                for index in 0..self.capacity {
                    if self.tag(index) == OCCUPIED {
                        self.slots_ptr()
                            .as_mut()
                            .get_unchecked_mut(index)
                            .assume_init_drop();
                    }
                }
            }

            if self.layout.layout.size() != 0 {
                self.alloc.free(self.base, self.layout.layout);
            }
        }
    }
}

/// A view into a single table slot for a probed key, vacant or occupied.
///
/// Constructed by [`entry`] on [`HashTable`].
///
/// [`entry`]: HashTable::entry
pub enum Entry<'a, V, A: TableAlloc = Global> {
    /// The key is not present in the table.
    Vacant(VacantEntry<'a, V, A>),
    /// The key is present in the table.
    Occupied(OccupiedEntry<'a, V, A>),
}

impl<'a, V, A: TableAlloc> Entry<'a, V, A> {
    /// Inserts `default` if the entry is vacant; returns a mutable
    /// reference to the stored value either way. An occupied entry keeps
    /// its existing payload.
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

    /// Applies `f` to the existing value, if any, without inserting.
    pub fn and_modify(self, f: impl FnOnce(&mut V)) -> Option<&'a mut V> {
        match self {
            Entry::Occupied(entry) => {
                let value = entry.into_mut();
                f(value);
                Some(value)
            }
            Entry::Vacant(_) => None,
        }
    }
}

/// A view into a vacant table slot.
///
/// Created by [`entry`] on [`HashTable`] when the probed key is absent.
///
/// [`entry`]: HashTable::entry
pub struct VacantEntry<'a, V, A: TableAlloc = Global> {
    table: &'a mut HashTable<V, A>,
    hash: u64,
    index: usize,
}

impl<'a, V, A: TableAlloc> VacantEntry<'a, V, A> {
    /// Inserts a value into the slot and returns a mutable reference to
    /// it.
    ///
    /// The payload is constructed exactly once, in place. Reusing a
    /// tombstone slot converts it back to occupied.
    pub fn insert(self, value: V) -> &'a mut V {
        // SAFETY: `index` was chosen by the insert probe (or post-growth
        // empty scan): in bounds and not occupied.
        unsafe {
            if self.table.tag(self.index) == TOMBSTONE {
                self.table.tombstones -= 1;
            }
            self.table.set_tag(self.index, OCCUPIED);
            self.table
                .hashes_ptr()
                .as_mut()
                .get_unchecked_mut(self.index)
                .write(self.hash);
            self.table.live += 1;
            self.table
                .slots_ptr()
                .as_mut()
                .get_unchecked_mut(self.index)
                .write(value)
        }
    }
}

/// A view into an occupied table slot.
///
/// Created by [`entry`] on [`HashTable`] when the probed key is present.
///
/// [`entry`]: HashTable::entry
pub struct OccupiedEntry<'a, V, A: TableAlloc = Global> {
    table: &'a mut HashTable<V, A>,
    index: usize,
}

impl<'a, V, A: TableAlloc> OccupiedEntry<'a, V, A> {
    /// Gets a reference to the stored value.
    pub fn get(&self) -> &V {
        // SAFETY: `index` was validated as occupied during the lookup.
        unsafe {
            self.table
                .slots_ptr()
                .as_ref()
                .get_unchecked(self.index)
                .assume_init_ref()
        }
    }

    /// Gets a mutable reference to the stored value.
    pub fn get_mut(&mut self) -> &mut V {
        // SAFETY: `index` was validated as occupied during the lookup.
        unsafe {
            self.table
                .slots_ptr()
                .as_mut()
                .get_unchecked_mut(self.index)
                .assume_init_mut()
        }
    }

    /// Converts the entry into a mutable reference with the table's
    /// borrow lifetime.
    pub fn into_mut(self) -> &'a mut V {
        // SAFETY: `index` was validated as occupied during the lookup.
        unsafe {
            self.table
                .slots_ptr()
                .as_mut()
                .get_unchecked_mut(self.index)
                .assume_init_mut()
        }
    }

    /// Removes the entry, leaving a tombstone, and returns the value.
    pub fn remove(self) -> V {
        // SAFETY: `index` was validated as occupied during the lookup; the
        // payload is read out before the tag flips.
        unsafe {
            let value = self
                .table
                .slots_ptr()
                .as_ref()
                .get_unchecked(self.index)
                .assume_init_read();
            self.table.set_tag(self.index, TOMBSTONE);
            self.table.live -= 1;
            self.table.tombstones += 1;
            value
        }
    }
}

/// An iterator over the values in a [`HashTable`].
///
/// Walks the slot array in index order, skipping empty and tombstone
/// slots. Created by [`iter`] on [`HashTable`].
///
/// [`iter`]: HashTable::iter
pub struct Iter<'a, V, A: TableAlloc = Global> {
    table: &'a HashTable<V, A>,
    index: usize,
    remaining: usize,
}

impl<'a, V, A: TableAlloc> Iterator for Iter<'a, V, A> {
    type Item = &'a V;

    fn next(&mut self) -> Option<Self::Item> {
        if self.remaining == 0 {
            return None;
        }

        // SAFETY: While `remaining > 0` an occupied slot exists at or past
        // `index`; the shared borrow rules out structural mutation.
        unsafe {
            loop {
                let index = self.index;
                self.index += 1;
                if self.table.tag(index) == OCCUPIED {
                    self.remaining -= 1;
                    return Some(
                        self.table
                            .slots_ptr()
                            .as_ref()
                            .get_unchecked(index)
                            .assume_init_ref(),
                    );
                }
            }
        }
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        (self.remaining, Some(self.remaining))
    }
}

impl<V, A: TableAlloc> ExactSizeIterator for Iter<'_, V, A> {}

impl<V, A: TableAlloc> core::iter::FusedIterator for Iter<'_, V, A> {}

/// A mutable iterator over the values in a [`HashTable`].
///
/// Created by [`iter_mut`] on [`HashTable`].
///
/// [`iter_mut`]: HashTable::iter_mut
pub struct IterMut<'a, V, A: TableAlloc = Global> {
    tags: NonNull<[u8]>,
    slots: NonNull<[MaybeUninit<V>]>,
    index: usize,
    remaining: usize,
    _marker: PhantomData<(&'a mut HashTable<V, A>, &'a mut V)>,
}

impl<'a, V, A: TableAlloc> Iterator for IterMut<'a, V, A> {
    type Item = &'a mut V;

    fn next(&mut self) -> Option<Self::Item> {
        if self.remaining == 0 {
            return None;
        }

        // SAFETY: While `remaining > 0` an occupied slot exists at or past
        // `index`; the exclusive borrow on the table keeps the pointers
        // valid, and each occupied slot is yielded at most once.
        unsafe {
            loop {
                let index = self.index;
                self.index += 1;
                if *self.tags.as_ref().get_unchecked(index) == OCCUPIED {
                    self.remaining -= 1;
                    return Some(
                        self.slots
                            .as_mut()
                            .get_unchecked_mut(index)
                            .assume_init_mut(),
                    );
                }
            }
        }
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        (self.remaining, Some(self.remaining))
    }
}

impl<V, A: TableAlloc> ExactSizeIterator for IterMut<'_, V, A> {}

impl<V, A: TableAlloc> core::iter::FusedIterator for IterMut<'_, V, A> {}

/// An owning iterator over the values of a [`HashTable`].
///
/// Created by the `IntoIterator` implementation on [`HashTable`].
pub struct IntoIter<V, A: TableAlloc = Global> {
    table: HashTable<V, A>,
    index: usize,
}

impl<V, A: TableAlloc> Iterator for IntoIter<V, A> {
    type Item = V;

    fn next(&mut self) -> Option<Self::Item> {
        if self.table.live == 0 {
            return None;
        }

        // SAFETY: While `live > 0` an occupied slot exists at or past
        // `index`. Each yielded slot's tag is cleared before the value is
        // returned, so the table's `Drop` never double-drops.
        unsafe {
            loop {
                let index = self.index;
                self.index += 1;
                if self.table.tag(index) == OCCUPIED {
                    self.table.set_tag(index, EMPTY);
                    self.table.live -= 1;
                    return Some(
                        self.table
                            .slots_ptr()
                            .as_ref()
                            .get_unchecked(index)
                            .assume_init_read(),
                    );
                }
            }
        }
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        (self.table.live, Some(self.table.live))
    }
}

impl<V, A: TableAlloc> ExactSizeIterator for IntoIter<V, A> {}

impl<V, A: TableAlloc> core::iter::FusedIterator for IntoIter<V, A> {}

impl<V, A: TableAlloc> IntoIterator for HashTable<V, A> {
    type Item = V;
    type IntoIter = IntoIter<V, A>;

    fn into_iter(self) -> Self::IntoIter {
        IntoIter {
            table: self,
            index: 0,
        }
    }
}

impl<'a, V, A: TableAlloc> IntoIterator for &'a HashTable<V, A> {
    type Item = &'a V;
    type IntoIter = Iter<'a, V, A>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

impl<'a, V, A: TableAlloc> IntoIterator for &'a mut HashTable<V, A> {
    type Item = &'a mut V;
    type IntoIter = IterMut<'a, V, A>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter_mut()
    }
}

#[cfg(test)]
mod tests {
    use alloc_crate::rc::Rc;
    use alloc_crate::string::String;
    use alloc_crate::string::ToString;
    use alloc_crate::vec::Vec;
    use core::cell::Cell;
    use core::hash::Hasher;

    use rand::TryRngCore;
    use rand::rngs::OsRng;
    use siphasher::sip::SipHasher;

    use super::*;

    struct HashState {
        k0: u64,
        k1: u64,
    }

    impl HashState {
        fn default() -> Self {
            let mut rng = OsRng;
            Self {
                k0: rng.try_next_u64().unwrap(),
                k1: rng.try_next_u64().unwrap(),
            }
        }

        fn build_hasher(&self) -> SipHasher {
            SipHasher::new_with_keys(self.k0, self.k1)
        }
    }

    fn hash_key(state: &HashState, key: u64) -> u64 {
        let mut h = state.build_hasher();
        h.write_u64(key);
        h.finish()
    }

    #[derive(Debug, PartialEq, Eq, Clone)]
    struct Item {
        key: u64,
        value: i32,
    }

    struct CountingAlloc {
        allocs: Cell<usize>,
        frees: Cell<usize>,
    }

    impl CountingAlloc {
        fn new() -> Self {
            Self {
                allocs: Cell::new(0),
                frees: Cell::new(0),
            }
        }
    }

    // SAFETY: Delegates to `Global`, only adding counters.
    unsafe impl TableAlloc for CountingAlloc {
        fn allocate(&self, layout: Layout) -> NonNull<u8> {
            self.allocs.set(self.allocs.get() + 1);
            Global.allocate(layout)
        }

        unsafe fn free(&self, ptr: NonNull<u8>, layout: Layout) {
            self.frees.set(self.frees.get() + 1);
            // SAFETY: Same contract as `Global::free`.
            unsafe { Global.free(ptr, layout) }
        }
    }

    #[test]
    fn capacity_policy_boundaries() {
        assert_eq!(capacity_at_least(0), 0);
        assert_eq!(capacity_at_least(1), 3);
        assert_eq!(capacity_at_least(3), 3);
        assert_eq!(capacity_at_least(4), 7);
        assert_eq!(capacity_at_least(7), 7);
        assert_eq!(capacity_at_least(8), 15);
        assert_eq!(capacity_at_least(255), 255);
        assert_eq!(capacity_at_least(256), 511);

        assert_eq!(capacity_for(0), 0);
        assert_eq!(capacity_for(1), 3);
        assert_eq!(capacity_for(3), 3);
        assert_eq!(capacity_for(4), 7);
        assert_eq!(capacity_for(7), 7);
        assert_eq!(capacity_for(8), 15);
        assert_eq!(capacity_for(14), 15);
        assert_eq!(capacity_for(15), 31);
        assert_eq!(capacity_for(128), 255);
        assert_eq!(capacity_for(224), 255);
        assert_eq!(capacity_for(225), 511);

        // The load ceiling sits one element above the naive floor(7c/8)
        // for every 2^k - 1 capacity.
        for capacity in [3usize, 7, 15, 31, 63, 127, 255, 511] {
            assert_eq!(max_load(capacity), capacity * 7 / 8 + 1);
        }
    }

    #[test]
    fn empty_table_allocates_nothing() {
        let alloc = CountingAlloc::new();
        {
            let mut table: HashTable<Item, _> = HashTable::new_in(&alloc);
            assert_eq!(table.len(), 0);
            assert!(table.is_empty());
            assert_eq!(table.capacity(), 0);
            assert_eq!(table.slack(), 0);
            assert!(table.find(1, |v| v.key == 1).is_none());
            assert!(table.remove(1, |v| v.key == 1).is_none());
        }
        assert_eq!(alloc.allocs.get(), 0);
        assert_eq!(alloc.frees.get(), 0);
    }

    #[test]
    fn insert_and_find() {
        let state = HashState::default();
        let mut table: HashTable<Item> = HashTable::new();

        for k in 0..50u64 {
            let hash = hash_key(&state, k);
            match table.entry(hash, |v| v.key == k) {
                Entry::Vacant(v) => {
                    v.insert(Item {
                        key: k,
                        value: k as i32 * 3,
                    });
                }
                Entry::Occupied(_) => unreachable!(),
            }
        }
        table.check_invariants();
        assert_eq!(table.len(), 50);

        for k in 0..50u64 {
            let hash = hash_key(&state, k);
            let found = table.find(hash, |v| v.key == k).unwrap();
            assert_eq!(found.value, k as i32 * 3);
        }

        let miss = hash_key(&state, 999);
        assert!(table.find(miss, |v| v.key == 999).is_none());
    }

    #[test]
    fn duplicate_entry_reports_existing() {
        let state = HashState::default();
        let mut table: HashTable<Item> = HashTable::new();
        let hash = hash_key(&state, 42);

        table
            .entry(hash, |v| v.key == 42)
            .or_insert(Item { key: 42, value: 7 });

        match table.entry(hash, |v| v.key == 42) {
            Entry::Occupied(occ) => assert_eq!(occ.get().value, 7),
            Entry::Vacant(_) => panic!("should be occupied"),
        }

        // or_insert on a hit leaves the first payload in place.
        let stored = table
            .entry(hash, |v| v.key == 42)
            .or_insert(Item { key: 42, value: 11 });
        assert_eq!(stored.value, 7);
        assert_eq!(table.len(), 1);
    }

    #[test]
    fn find_mut_and_modify() {
        let state = HashState::default();
        let mut table: HashTable<Item> = HashTable::new();
        for k in 0..5u64 {
            let hash = hash_key(&state, k);
            table.entry(hash, |v| v.key == k).or_insert(Item { key: k, value: 1 });
        }

        for k in 0..5u64 {
            let hash = hash_key(&state, k);
            if let Some(v) = table.find_mut(hash, |v| v.key == k) {
                v.value += 9;
            }
        }
        for k in 0..5u64 {
            let hash = hash_key(&state, k);
            assert_eq!(table.find(hash, |v| v.key == k).unwrap().value, 10);
        }
    }

    #[test]
    fn remove_marks_tombstone_and_probe_continues() {
        // All keys share one hash: removal of an early slot must not hide
        // keys that probed past it.
        let mut table: HashTable<Item> = HashTable::new();
        for k in 0..5u64 {
            table.entry(0, |v| v.key == k).or_insert(Item {
                key: k,
                value: k as i32,
            });
        }
        let capacity = table.capacity();

        let removed = table.remove(0, |v| v.key == 1).unwrap();
        assert_eq!(removed.key, 1);
        assert_eq!(table.tombstone_count(), 1);
        table.check_invariants();

        for k in [0u64, 2, 3, 4] {
            assert_eq!(table.find(0, |v| v.key == k).unwrap().key, k);
        }
        assert!(table.find(0, |v| v.key == 1).is_none());

        // Re-adding reuses the tombstone: no growth, tombstone gone.
        table.entry(0, |v| v.key == 1).or_insert(Item { key: 1, value: 1 });
        assert_eq!(table.capacity(), capacity);
        assert_eq!(table.tombstone_count(), 0);
        assert_eq!(table.len(), 5);
        table.check_invariants();
    }

    #[test]
    fn growth_sequence_and_load_ceiling() {
        let state = HashState::default();
        let mut table: HashTable<Item> = HashTable::new();
        let mut seen = Vec::new();

        for k in 0..200u64 {
            let hash = hash_key(&state, k);
            table.entry(hash, |v| v.key == k).or_insert(Item {
                key: k,
                value: k as i32,
            });

            let capacity = table.capacity();
            assert!((capacity + 1).is_power_of_two());
            assert!(table.len() <= max_load(capacity));
            if seen.last() != Some(&capacity) {
                seen.push(capacity);
            }
        }

        assert_eq!(seen, [3, 7, 15, 31, 63, 127, 255]);
        table.check_invariants();
    }

    #[test]
    fn full_small_table_lookup_terminates() {
        // Capacity 3 admits 3 live elements: zero empty slots, so an
        // absent-key probe must terminate by exhaustion.
        let mut table: HashTable<Item> = HashTable::new();
        for k in 0..3u64 {
            table.entry(k, |v| v.key == k).or_insert(Item {
                key: k,
                value: k as i32,
            });
        }
        assert_eq!(table.capacity(), 3);
        assert_eq!(table.slack(), 0);

        assert!(table.find(7, |v| v.key == 7).is_none());
        assert!(table.remove(7, |v| v.key == 7).is_none());

        table.entry(3, |v| v.key == 3).or_insert(Item { key: 3, value: 3 });
        assert_eq!(table.capacity(), 7);
        table.check_invariants();
    }

    #[test]
    fn rehash_zero_shrinks_to_fit() {
        let state = HashState::default();
        let mut table: HashTable<Item> = HashTable::with_capacity(100);
        assert!(table.capacity() > 3);

        for k in 0..3u64 {
            let hash = hash_key(&state, k);
            table.entry(hash, |v| v.key == k).or_insert(Item {
                key: k,
                value: k as i32 * 11,
            });
        }

        table.rehash(0);
        assert_eq!(table.capacity(), 3);
        assert_eq!(table.len(), 3);
        for k in 0..3u64 {
            let hash = hash_key(&state, k);
            assert_eq!(table.find(hash, |v| v.key == k).unwrap().value, k as i32 * 11);
        }
        table.check_invariants();
    }

    #[test]
    fn rehash_grows_to_exact_capacity() {
        let state = HashState::default();
        let mut table: HashTable<Item> = HashTable::new();
        for k in 0..3u64 {
            let hash = hash_key(&state, k);
            table.entry(hash, |v| v.key == k).or_insert(Item {
                key: k,
                value: k as i32,
            });
        }
        assert_eq!(table.capacity(), 3);

        table.rehash(255);
        assert_eq!(table.capacity(), 255);
        assert_eq!(table.len(), 3);

        // Positive requests at or below the current capacity are no-ops.
        table.rehash(255);
        assert_eq!(table.capacity(), 255);
        table.rehash(10);
        assert_eq!(table.capacity(), 255);

        // Non 2^k - 1 requests round up.
        table.rehash(300);
        assert_eq!(table.capacity(), 511);
        table.check_invariants();
    }

    #[test]
    fn rehash_zero_purges_tombstones() {
        let state = HashState::default();
        let mut table: HashTable<Item> = HashTable::new();
        for k in 0..30u64 {
            let hash = hash_key(&state, k);
            table.entry(hash, |v| v.key == k).or_insert(Item {
                key: k,
                value: k as i32,
            });
        }
        for k in (0..30u64).step_by(2) {
            let hash = hash_key(&state, k);
            table.remove(hash, |v| v.key == k);
        }
        assert_eq!(table.tombstone_count(), 15);

        table.rehash(0);
        assert_eq!(table.tombstone_count(), 0);
        assert_eq!(table.len(), 15);
        assert_eq!(table.capacity(), 31);
        for k in (1..30u64).step_by(2) {
            let hash = hash_key(&state, k);
            assert_eq!(table.find(hash, |v| v.key == k).unwrap().key, k);
        }
        table.check_invariants();
    }

    #[test]
    fn rehash_zero_on_empty_table_deallocates() {
        let alloc = CountingAlloc::new();
        let mut table: HashTable<Item, _> = HashTable::with_capacity_in(50, &alloc);
        assert_eq!(alloc.allocs.get(), 1);

        table.rehash(0);
        assert_eq!(table.capacity(), 0);
        assert_eq!(alloc.allocs.get(), 1);
        assert_eq!(alloc.frees.get(), 1);

        // Dropping an unallocated table frees nothing further.
        drop(table);
        assert_eq!(alloc.frees.get(), 1);
    }

    #[test]
    fn reserve_prevents_reallocation() {
        let state = HashState::default();
        let alloc = CountingAlloc::new();
        let mut table: HashTable<Item, _> = HashTable::new_in(&alloc);

        table.reserve(100);
        assert_eq!(alloc.allocs.get(), 1);
        assert!(table.slack() >= 100);

        for k in 0..100u64 {
            let hash = hash_key(&state, k);
            table.entry(hash, |v| v.key == k).or_insert(Item {
                key: k,
                value: k as i32,
            });
        }
        assert_eq!(alloc.allocs.get(), 1);

        // Reserving below the current headroom is a no-op.
        table.reserve(50);
        assert_eq!(alloc.allocs.get(), 1);
    }

    #[test]
    fn one_allocation_pair_per_rebuild() {
        let state = HashState::default();
        let alloc = CountingAlloc::new();
        let mut table: HashTable<Item, _> = HashTable::new_in(&alloc);

        for k in 0..8u64 {
            let hash = hash_key(&state, k);
            table.entry(hash, |v| v.key == k).or_insert(Item {
                key: k,
                value: k as i32,
            });
        }

        // Growth path: 0 -> 3 -> 7 -> 15. The first allocation has no
        // prior buffer to free.
        assert_eq!(table.capacity(), 15);
        assert_eq!(alloc.allocs.get(), 3);
        assert_eq!(alloc.frees.get(), 2);

        drop(table);
        assert_eq!(alloc.frees.get(), 3);
    }

    #[test]
    fn add_remove_add_round_trip_never_allocates() {
        let state = HashState::default();
        let alloc = CountingAlloc::new();
        let mut table: HashTable<Item, _> = HashTable::new_in(&alloc);

        for k in 0..6u64 {
            let hash = hash_key(&state, k);
            table.entry(hash, |v| v.key == k).or_insert(Item {
                key: k,
                value: k as i32,
            });
        }
        let len = table.len();
        let allocs = alloc.allocs.get();

        for _ in 0..10 {
            let hash = hash_key(&state, 2);
            let removed = table.remove(hash, |v| v.key == 2).unwrap();
            table.entry(hash, |v| v.key == 2).or_insert(removed);
        }

        assert_eq!(table.len(), len);
        assert_eq!(alloc.allocs.get(), allocs);
        table.check_invariants();
    }

    #[test]
    fn explicit_collision_degrades_to_linear() {
        let mut table: HashTable<Item> = HashTable::new();
        for k in 0..65u64 {
            match table.entry(0, |v| v.key == k) {
                Entry::Vacant(v) => {
                    v.insert(Item {
                        key: k,
                        value: k as i32,
                    });
                }
                Entry::Occupied(_) => unreachable!(),
            }
        }

        assert_eq!(table.len(), 65);
        for k in 0..65u64 {
            assert_eq!(table.find(0, |v| v.key == k).unwrap().value, k as i32);
        }

        // Remove every other key, then confirm no cross-contamination.
        for k in (0..65u64).step_by(2) {
            assert_eq!(table.remove(0, |v| v.key == k).unwrap().key, k);
        }
        for k in 0..65u64 {
            let found = table.find(0, |v| v.key == k);
            if k % 2 == 0 {
                assert!(found.is_none());
            } else {
                assert_eq!(found.unwrap().key, k);
            }
        }
        table.check_invariants();
    }

    #[test]
    fn iterator_skips_tombstones() {
        let state = HashState::default();
        let mut table: HashTable<Item> = HashTable::new();
        for k in 0..20u64 {
            let hash = hash_key(&state, k);
            table.entry(hash, |v| v.key == k).or_insert(Item {
                key: k,
                value: k as i32,
            });
        }
        for k in (0..20u64).step_by(4) {
            let hash = hash_key(&state, k);
            table.remove(hash, |v| v.key == k);
        }

        let iter = table.iter();
        assert_eq!(iter.len(), 15);
        let mut keys: Vec<u64> = iter.map(|v| v.key).collect();
        keys.sort_unstable();
        assert_eq!(keys, (0..20u64).filter(|k| k % 4 != 0).collect::<Vec<_>>());
    }

    #[test]
    fn iter_mut_modifies_in_place() {
        let state = HashState::default();
        let mut table: HashTable<Item> = HashTable::new();
        for k in 0..10u64 {
            let hash = hash_key(&state, k);
            table.entry(hash, |v| v.key == k).or_insert(Item { key: k, value: 0 });
        }

        for v in table.iter_mut() {
            v.value = v.key as i32 + 1;
        }
        for k in 0..10u64 {
            let hash = hash_key(&state, k);
            assert_eq!(table.find(hash, |v| v.key == k).unwrap().value, k as i32 + 1);
        }
    }

    #[test]
    fn into_iter_yields_everything_once() {
        let state = HashState::default();
        let mut table: HashTable<Item> = HashTable::new();
        for k in 0..25u64 {
            let hash = hash_key(&state, k);
            table.entry(hash, |v| v.key == k).or_insert(Item {
                key: k,
                value: k as i32,
            });
        }

        let mut keys: Vec<u64> = table.into_iter().map(|v| v.key).collect();
        keys.sort_unstable();
        assert_eq!(keys, (0..25u64).collect::<Vec<_>>());
    }

    #[test]
    fn clear_keeps_capacity() {
        let state = HashState::default();
        let mut table: HashTable<String> = HashTable::new();
        for k in 0..10u64 {
            let hash = hash_key(&state, k);
            table
                .entry(hash, |v| v.parse::<u64>() == Ok(k))
                .or_insert(k.to_string());
        }
        let capacity = table.capacity();

        table.clear();
        assert_eq!(table.len(), 0);
        assert_eq!(table.capacity(), capacity);
        assert_eq!(table.tombstone_count(), 0);
        table.check_invariants();
    }

    #[test]
    fn clone_is_independent() {
        let state = HashState::default();
        let mut table: HashTable<Item> = HashTable::new();
        for k in 0..12u64 {
            let hash = hash_key(&state, k);
            table.entry(hash, |v| v.key == k).or_insert(Item {
                key: k,
                value: k as i32,
            });
        }
        let hash = hash_key(&state, 3);
        table.remove(hash, |v| v.key == 3);

        let cloned = table.clone();
        assert_eq!(cloned.len(), table.len());
        assert_eq!(cloned.capacity(), table.capacity());
        cloned.check_invariants();

        drop(table);
        for k in (0..12u64).filter(|&k| k != 3) {
            let hash = hash_key(&state, k);
            assert_eq!(cloned.find(hash, |v| v.key == k).unwrap().key, k);
        }
    }

    #[test]
    fn swap_exchanges_contents() {
        let state = HashState::default();
        let mut a: HashTable<Item> = HashTable::new();
        let mut b: HashTable<Item> = HashTable::new();
        for k in 0..4u64 {
            let hash = hash_key(&state, k);
            a.entry(hash, |v| v.key == k).or_insert(Item {
                key: k,
                value: 1,
            });
        }
        for k in 10..12u64 {
            let hash = hash_key(&state, k);
            b.entry(hash, |v| v.key == k).or_insert(Item {
                key: k,
                value: 2,
            });
        }

        a.swap(&mut b);
        assert_eq!(a.len(), 2);
        assert_eq!(b.len(), 4);
        let hash = hash_key(&state, 10);
        assert_eq!(a.find(hash, |v| v.key == 10).unwrap().value, 2);
        let hash = hash_key(&state, 0);
        assert_eq!(b.find(hash, |v| v.key == 0).unwrap().value, 1);
    }

    #[test]
    fn drop_runs_destructors_for_live_elements_only() {
        let drops = Rc::new(Cell::new(0usize));

        struct Tracked {
            key: u64,
            drops: Rc<Cell<usize>>,
        }

        impl Drop for Tracked {
            fn drop(&mut self) {
                self.drops.set(self.drops.get() + 1);
            }
        }

        let state = HashState::default();
        let mut table: HashTable<Tracked> = HashTable::new();
        for k in 0..10u64 {
            let hash = hash_key(&state, k);
            table.entry(hash, |v| v.key == k).or_insert(Tracked {
                key: k,
                drops: Rc::clone(&drops),
            });
        }

        let hash = hash_key(&state, 4);
        drop(table.remove(hash, |v| v.key == 4));
        assert_eq!(drops.get(), 1);

        drop(table);
        assert_eq!(drops.get(), 10);
    }

    #[test]
    #[cfg_attr(miri, ignore)]
    fn insert_many() {
        let state = HashState::default();
        let mut table: HashTable<Item> = HashTable::new();
        for k in 0..100000u64 {
            let hash = hash_key(&state, k);
            match table.entry(hash, |v| v.key == k) {
                Entry::Vacant(v) => {
                    v.insert(Item {
                        key: k,
                        value: k as i32,
                    });
                }
                Entry::Occupied(_) => unreachable!(),
            }
        }

        assert_eq!(table.len(), 100000);
        table.check_invariants();
        for k in 0..100000u64 {
            let hash = hash_key(&state, k);
            assert_eq!(table.find(hash, |v| v.key == k).unwrap().value, k as i32);
        }
    }
}
