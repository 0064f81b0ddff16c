use core::alloc::Layout;
use core::ptr::NonNull;

use alloc_crate::alloc::handle_alloc_error;

/// The allocation contract consumed by [`HashTable`].
///
/// The table requests one buffer per structural resize and returns it with
/// exactly one matching [`free`] call; it never allocates per element. The
/// table guarantees it only calls [`allocate`] with non-zero-sized layouts
/// and only passes [`free`] a pointer previously returned by [`allocate`]
/// on the same allocator with the same layout.
///
/// Allocation failure is fatal: implementations must not return; they
/// should divert to [`handle_alloc_error`] (or abort) instead, so the
/// table is never observed in a partially relocated state.
///
/// [`HashTable`]: crate::hash_table::HashTable
/// [`allocate`]: TableAlloc::allocate
/// [`free`]: TableAlloc::free
///
/// # Safety
///
/// `allocate` must return a pointer that is valid for reads and writes of
/// `layout.size()` bytes, aligned to `layout.align()`, and exclusively
/// owned by the caller until passed back to `free`.
pub unsafe trait TableAlloc {
    /// Allocates a buffer for the given layout.
    ///
    /// `layout` is guaranteed to have a non-zero size. Must not return on
    /// failure.
    fn allocate(&self, layout: Layout) -> NonNull<u8>;

    /// Frees a buffer previously returned by [`allocate`].
    ///
    /// [`allocate`]: TableAlloc::allocate
    ///
    /// # Safety
    ///
    /// `ptr` must have been returned by a call to `allocate` on this
    /// allocator with the same `layout`, and must not be used after this
    /// call.
    unsafe fn free(&self, ptr: NonNull<u8>, layout: Layout);
}

/// The default allocator, delegating to the registered global allocator.
///
/// This is a zero-sized type; tables using it carry no per-instance
/// allocator state.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct Global;

// SAFETY: Delegates directly to the global allocator, which satisfies the
// trait contract; null returns divert to `handle_alloc_error`.
unsafe impl TableAlloc for Global {
    fn allocate(&self, layout: Layout) -> NonNull<u8> {
        debug_assert!(layout.size() != 0);
        // SAFETY: The layout is non-zero-sized per the trait contract.
        unsafe {
            let raw = alloc_crate::alloc::alloc(layout);
            if raw.is_null() {
                handle_alloc_error(layout);
            }
            NonNull::new_unchecked(raw)
        }
    }

    unsafe fn free(&self, ptr: NonNull<u8>, layout: Layout) {
        // SAFETY: Caller guarantees `ptr` came from `allocate` with this
        // layout.
        unsafe {
            alloc_crate::alloc::dealloc(ptr.as_ptr(), layout);
        }
    }
}

// SAFETY: Forwarding preserves the underlying allocator's guarantees. This
// impl is what lets a table borrow an instrumented allocator for its
// lifetime instead of owning it.
unsafe impl<A> TableAlloc for &A
where
    A: TableAlloc,
{
    fn allocate(&self, layout: Layout) -> NonNull<u8> {
        (**self).allocate(layout)
    }

    unsafe fn free(&self, ptr: NonNull<u8>, layout: Layout) {
        // SAFETY: Same contract as the underlying allocator.
        unsafe { (**self).free(ptr, layout) }
    }
}
