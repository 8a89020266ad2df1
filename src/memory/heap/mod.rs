pub(crate) mod block_allocator;

use alloc::boxed::Box;
use alloc::vec::Vec;
use crate::memory::FrameAllocator;
use crate::memory::heap::block_allocator::BlockAllocator;
use crate::memory::paging::entry::EntryFlags;
use crate::memory::paging::mapper::Mapper;
use crate::memory::paging::{Page, VirtualAddress, KERNEL_OFFSET};
use crate::info;

pub const HEAP_START: usize = KERNEL_OFFSET + 0x0100_0000;
pub const HEAP_SIZE: usize = 100 * 1024;

#[global_allocator]
static ALLOCATOR: Locked<BlockAllocator> = Locked::new(BlockAllocator::new());

pub(crate) struct Locked<A> {
    inner: spin::Mutex<A>,
}

impl<A> Locked<A> {
    pub const fn new(inner: A) -> Self {
        Locked { inner: spin::Mutex::new(inner) }
    }

    pub fn lock(&self) -> spin::MutexGuard<A> {
        self.inner.lock()
    }
}

/// Maps the kernel heap range and hands it to the global allocator. Runs while still on the low
/// identity alias, before the higher-half jump, but `HEAP_START` is already a high address —
/// that's fine, mapping a page doesn't require executing through it.
pub fn init_heap<A>(mapper: &mut Mapper, frame_allocator: &mut A)
where
    A: FrameAllocator,
{
    let page_range = {
        let heap_start: VirtualAddress = HEAP_START;
        let heap_end: VirtualAddress = heap_start + HEAP_SIZE - 1;
        let heap_start_page = Page::containing_address(heap_start);
        let heap_end_page = Page::containing_address(heap_end);
        Page::range_inclusive(heap_start_page, heap_end_page)
    };

    for page in page_range {
        let frame = frame_allocator.allocate_frame().expect("frame allocation failed");
        let flags = EntryFlags::PRESENT | EntryFlags::WRITABLE | EntryFlags::NO_EXECUTE;
        mapper.map_to(page, frame, flags, frame_allocator);
    }

    unsafe {
        ALLOCATOR.lock().init(HEAP_START, HEAP_SIZE);
    }

    crate::memory::frame_allocator::mark_heap_ready();

    info!("mm: heap at {:#x}, {} KiB", HEAP_START, HEAP_SIZE / 1024);
}

#[cfg(test)]
pub fn exercise_heap() {
    {
        let a = Box::new(41);
        let b = Box::new(13);
        assert_eq!(*a, 41);
        assert_eq!(*b, 13);
    }

    {
        let n = 1000;
        let mut vec = Vec::new();
        for i in 0..n {
            vec.push(i);
        }
        assert_eq!(vec.iter().sum::<u64>(), (n - 1) * n / 2);
    }
}
