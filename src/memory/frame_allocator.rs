use alloc::vec::Vec;
use core::sync::atomic::{AtomicBool, Ordering};
use crate::arch::multiboot2::structures::{MemoryMapEntry, MemoryMapIter};
use crate::memory::{Frame, FrameAllocator, PAGE_SIZE};

/// Capacity of the free list before a kernel heap exists to back a growable one. Sized well
/// above anything the boot path itself frees (TemporaryPage teardown, guard-page unmap).
const INLINE_CAPACITY: usize = 64;

static HEAP_READY: AtomicBool = AtomicBool::new(false);

/// Called once `memory::heap::init_heap` has run; lets the frame allocator's free list switch
/// from its fixed inline array to a heap-backed `Vec` on its next growth.
pub fn mark_heap_ready() {
    HEAP_READY.store(true, Ordering::Release);
}

/// Physical frame allocator over a Multiboot2 memory map. Bump-allocates forward through
/// available regions, skipping frames reserved by the kernel image or the multiboot info blob,
/// and reuses freed frames LIFO before ever advancing the bump cursor again.
pub struct FrameStack {
    next_free_frame: Frame,
    current_area: Option<&'static MemoryMapEntry>,
    areas: MemoryMapIter,

    kernel_start: Frame,
    kernel_end: Frame,
    multiboot_start: Frame,
    multiboot_end: Frame,

    inline_free: [Option<Frame>; INLINE_CAPACITY],
    inline_len: usize,
    overflow_free: Option<Vec<Frame>>,
}

impl FrameAllocator for FrameStack {
    fn allocate_frame(&mut self) -> Option<Frame> {
        if let Some(overflow) = self.overflow_free.as_mut() {
            if let Some(frame) = overflow.pop() {
                return Some(frame);
            }
        }

        if self.inline_len > 0 {
            self.inline_len -= 1;
            return self.inline_free[self.inline_len].take();
        }

        self.allocate_fresh_frame()
    }

    fn deallocate_frame(&mut self, frame: Frame) {
        if let Some(overflow) = self.overflow_free.as_mut() {
            overflow.push(frame);
            return;
        }

        if self.inline_len < INLINE_CAPACITY {
            self.inline_free[self.inline_len] = Some(frame);
            self.inline_len += 1;
            return;
        }

        // Inline capacity exhausted. Once the heap exists this allocator graduates to a
        // heap-backed free list that grows by doubling the way `Vec` always does; before that,
        // running out here is a boot-time invariant violation.
        assert!(
            HEAP_READY.load(Ordering::Acquire),
            "frame free list exhausted before the heap was available"
        );

        let mut overflow = Vec::with_capacity(INLINE_CAPACITY * 2);
        overflow.extend(self.inline_free[..self.inline_len].iter_mut().map(|f| f.take().unwrap()));
        overflow.push(frame);
        self.inline_len = 0;
        self.overflow_free = Some(overflow);
    }
}

impl FrameStack {
    pub fn new(
        kernel_start: usize,
        kernel_end: usize,
        multiboot_start: usize,
        multiboot_end: usize,
        memory_map: MemoryMapIter,
    ) -> FrameStack {
        let mut allocator = FrameStack {
            next_free_frame: Frame::containing_address(0),
            current_area: None,
            areas: memory_map,
            kernel_start: Frame::containing_address(kernel_start),
            kernel_end: Frame::containing_address(kernel_end),
            multiboot_start: Frame::containing_address(multiboot_start),
            multiboot_end: Frame::containing_address(multiboot_end),
            inline_free: [None; INLINE_CAPACITY],
            inline_len: 0,
            overflow_free: None,
        };

        allocator.choose_next_area();
        allocator
    }

    fn allocate_fresh_frame(&mut self) -> Option<Frame> {
        let area = self.current_area?;
        let frame = self.next_free_frame;

        let current_area_last_frame = {
            let address = area.base_addr + area.size - 1;
            Frame::containing_address(address as usize)
        };

        if frame > current_area_last_frame {
            self.choose_next_area();
        } else if frame >= self.kernel_start && frame <= self.kernel_end {
            self.next_free_frame = Frame::from_number(self.kernel_end.number() + 1);
        } else if frame >= self.multiboot_start && frame <= self.multiboot_end {
            self.next_free_frame = Frame::from_number(self.multiboot_end.number() + 1);
        } else {
            self.next_free_frame = Frame::from_number(frame.number() + 1);
            return Some(frame);
        }

        self.allocate_fresh_frame()
    }

    fn choose_next_area(&mut self) {
        self.current_area = self
            .areas
            .clone()
            .filter(|area| {
                let address = area.base_addr + area.size - 1;
                Frame::containing_address(address as usize) >= self.next_free_frame
            })
            .min_by_key(|area| area.base_addr);

        if let Some(area) = self.current_area {
            let start_frame = Frame::containing_address(area.base_addr as usize);
            if self.next_free_frame < start_frame {
                self.next_free_frame = start_frame;
            }
        }
    }

    /// Rebases every raw pointer this allocator holds into the low half by `offset` — called
    /// once, right before the higher-half jump, so nothing here still points below KERNEL_OFFSET
    /// once the low mapping is torn down.
    pub fn rebase_high(&mut self, offset: usize) {
        self.areas.current_entry = (self.areas.current_entry as usize).wrapping_add(offset) as *const _;
        self.areas.last_entry = (self.areas.last_entry as usize).wrapping_add(offset) as *const _;

        if let Some(area) = self.current_area {
            let rebased = (area as *const MemoryMapEntry as usize) + offset;
            self.current_area = Some(unsafe { &*(rebased as *const MemoryMapEntry) });
        }
    }
}

const _: () = assert!(PAGE_SIZE == 4096);
