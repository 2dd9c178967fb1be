// Byte-addressable view over shared memory with the plain, ordered, and
// atomic accessors the append protocol needs.
use std::alloc::{alloc_zeroed, dealloc, Layout};
use std::ptr::{self, NonNull};
use std::sync::atomic::{AtomicU32, Ordering};

use crate::segment::CACHE_LINE_LENGTH;

/// A `Copy` view over a fixed-capacity region of externally managed memory.
///
/// Many producers and readers share one region, so every accessor takes
/// `&self`; mutation goes through raw pointers and the atomic accessors
/// carry the orderings the publication protocol relies on.
///
/// The plain multi-byte accessors read and write little-endian, for wire
/// fields. The atomic accessors are native-endian: they operate on
/// in-memory protocol state (the tail counter, the length publication
/// field), and byte-swapping does not commute with `fetch_add` once a
/// carry crosses a byte boundary.
#[derive(Clone, Copy, Debug)]
pub struct AtomicBuffer {
    ptr: NonNull<u8>,
    capacity: usize,
}

// Safety: all mutation is either to spans a caller has exclusively reserved
// via the tail protocol or through the atomic accessors.
unsafe impl Send for AtomicBuffer {}
unsafe impl Sync for AtomicBuffer {}

impl AtomicBuffer {
    /// Wrap raw memory.
    ///
    /// # Safety
    /// - `ptr` must be valid for reads and writes of `capacity` bytes for as
    ///   long as any copy of the returned view is in use
    /// - `ptr` must be at least 4-byte aligned so the atomic accessors can
    ///   operate on aligned offsets
    pub unsafe fn wrap(ptr: NonNull<u8>, capacity: usize) -> Self {
        debug_assert!(ptr.as_ptr() as usize % 4 == 0);
        Self { ptr, capacity }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn put_bytes(&self, offset: usize, src: &[u8]) {
        self.bounds_check(offset, src.len());
        unsafe {
            ptr::copy_nonoverlapping(src.as_ptr(), self.ptr.as_ptr().add(offset), src.len());
        }
    }

    pub fn get_bytes(&self, offset: usize, dst: &mut [u8]) {
        self.bounds_check(offset, dst.len());
        unsafe {
            ptr::copy_nonoverlapping(self.ptr.as_ptr().add(offset), dst.as_mut_ptr(), dst.len());
        }
    }

    pub fn put_u8(&self, offset: usize, value: u8) {
        self.bounds_check(offset, 1);
        unsafe { self.ptr.as_ptr().add(offset).write(value) }
    }

    pub fn get_u8(&self, offset: usize) -> u8 {
        self.bounds_check(offset, 1);
        unsafe { self.ptr.as_ptr().add(offset).read() }
    }

    pub fn put_u16(&self, offset: usize, value: u16) {
        self.put_bytes(offset, &value.to_le_bytes());
    }

    pub fn get_u16(&self, offset: usize) -> u16 {
        let mut bytes = [0u8; 2];
        self.get_bytes(offset, &mut bytes);
        u16::from_le_bytes(bytes)
    }

    pub fn put_u32(&self, offset: usize, value: u32) {
        self.put_bytes(offset, &value.to_le_bytes());
    }

    pub fn get_u32(&self, offset: usize) -> u32 {
        let mut bytes = [0u8; 4];
        self.get_bytes(offset, &mut bytes);
        u32::from_le_bytes(bytes)
    }

    /// Release-ordered store of a native-endian u32. The publication write:
    /// every plain write made before it is visible to a reader that observes
    /// the stored value with [`get_u32_volatile`](Self::get_u32_volatile).
    pub fn put_u32_ordered(&self, offset: usize, value: u32) {
        self.atomic_u32(offset).store(value, Ordering::Release);
    }

    /// Acquire-ordered load of a native-endian u32.
    pub fn get_u32_volatile(&self, offset: usize) -> u32 {
        self.atomic_u32(offset).load(Ordering::Acquire)
    }

    /// Relaxed load of a native-endian u32. Atomic but carries no ordering;
    /// for reading protocol state outside a publication handshake.
    pub fn get_u32_relaxed(&self, offset: usize) -> u32 {
        self.atomic_u32(offset).load(Ordering::Relaxed)
    }

    /// Atomic fetch-and-add on a native-endian u32, returning the previous
    /// value. The sole cross-producer reservation primitive.
    pub fn get_and_add_u32(&self, offset: usize, delta: u32) -> u32 {
        self.atomic_u32(offset).fetch_add(delta, Ordering::AcqRel)
    }

    /// Raw mutable view of a span, for in-place encoding.
    ///
    /// # Safety
    /// The caller must hold exclusive write access to
    /// `[offset, offset + len)`, e.g. by having reserved it through the tail
    /// protocol and not yet published it.
    pub unsafe fn slice_mut(&self, offset: usize, len: usize) -> &mut [u8] {
        self.bounds_check(offset, len);
        unsafe { std::slice::from_raw_parts_mut(self.ptr.as_ptr().add(offset), len) }
    }

    fn atomic_u32(&self, offset: usize) -> &AtomicU32 {
        self.bounds_check(offset, 4);
        debug_assert!(offset % 4 == 0, "atomic access at unaligned offset {offset}");
        unsafe { &*(self.ptr.as_ptr().add(offset) as *const AtomicU32) }
    }

    #[inline]
    fn bounds_check(&self, offset: usize, len: usize) {
        debug_assert!(
            offset.checked_add(len).is_some_and(|end| end <= self.capacity),
            "access [{offset}, +{len}) out of bounds for capacity {}",
            self.capacity
        );
    }
}

/// Owned, zeroed, cache-line-aligned heap memory backing an
/// [`AtomicBuffer`]. Used by in-process producers and tests; mapped
/// segments get their views from [`crate::region::Segment`] instead.
pub struct AlignedBuffer {
    ptr: NonNull<u8>,
    layout: Layout,
}

unsafe impl Send for AlignedBuffer {}
unsafe impl Sync for AlignedBuffer {}

impl AlignedBuffer {
    pub fn zeroed(capacity: usize) -> Self {
        assert!(capacity > 0);
        let layout = Layout::from_size_align(capacity, CACHE_LINE_LENGTH)
            .expect("capacity fits an aligned layout");
        let raw = unsafe { alloc_zeroed(layout) };
        let ptr = NonNull::new(raw).expect("allocation succeeded");
        Self { ptr, layout }
    }

    /// View over the whole allocation, valid while `self` lives.
    pub fn buffer(&self) -> AtomicBuffer {
        unsafe { AtomicBuffer::wrap(self.ptr, self.layout.size()) }
    }
}

impl Drop for AlignedBuffer {
    fn drop(&mut self) {
        unsafe { dealloc(self.ptr.as_ptr(), self.layout) }
    }
}
