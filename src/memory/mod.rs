pub mod frame_allocator;
pub mod heap;
pub mod paging;

use core::ops::DerefMut;
use crate::arch::multiboot2::BootInformation;
use crate::memory::frame_allocator::FrameStack;
use crate::memory::heap::init_heap;
use crate::memory::paging::{ActivePageTable, PhysicalAddress};
use crate::serial_println;

use self::paging::remap_kernel;

pub const PAGE_SIZE: usize = 4096;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct Frame {
    number: usize,
}

impl Frame {
    pub fn containing_address(address: usize) -> Frame {
        Frame { number: address / PAGE_SIZE }
    }

    pub fn from_number(number: usize) -> Frame {
        Frame { number }
    }

    pub fn number(&self) -> usize {
        self.number
    }

    pub fn start_address(&self) -> PhysicalAddress {
        self.number * PAGE_SIZE
    }

    pub fn range_inclusive(start: Frame, end: Frame) -> FrameIter {
        FrameIter { start, end }
    }
}

pub struct FrameIter {
    start: Frame,
    end: Frame,
}

impl Iterator for FrameIter {
    type Item = Frame;

    fn next(&mut self) -> Option<Frame> {
        if self.start <= self.end {
            let frame = self.start;
            self.start.number += 1;
            Some(frame)
        } else {
            None
        }
    }
}

pub trait FrameAllocator {
    fn allocate_frame(&mut self) -> Option<Frame>;
    fn deallocate_frame(&mut self, frame: Frame);
}

/// Brings the kernel up from the identity-mapped, low-half state the boot trampoline leaves it
/// in to the fully remapped, higher-half, heap-backed state the rest of the kernel runs in.
/// Returns the frame allocator so later subsystems (process heaps, user page mapping) can keep
/// handing out frames from the same pool.
pub fn init(boot_info: &'static BootInformation) -> FrameStack {
    let memory_map = boot_info.memory_map_tag().expect("memory map tag required");
    let elf_sections = boot_info.elf_sections_tag().expect("elf sections tag required");

    let kernel_start = elf_sections.section_headers().filter(|s| s.is_allocated()).map(|s| s.start_address()).min().expect("no kernel sections");
    let kernel_end = elf_sections.section_headers().filter(|s| s.is_allocated()).map(|s| s.end_address()).max().expect("no kernel sections");

    let multiboot_start = boot_info.start_address();
    let multiboot_end = boot_info.end_address();

    serial_println!(
        "mm: kernel [{:#x}, {:#x}), multiboot [{:#x}, {:#x})",
        kernel_start, kernel_end, multiboot_start, multiboot_end
    );

    let mut frame_allocator = FrameStack::new(
        kernel_start,
        kernel_end,
        multiboot_start,
        multiboot_end,
        memory_map.entries(),
    );

    let mut active_table = remap_kernel(&mut frame_allocator, boot_info);
    init_heap(active_table.deref_mut(), &mut frame_allocator);
    frame_allocator.rebase_high(paging::KERNEL_OFFSET);

    unsafe {
        paging::jump_to_higher_half();
    }

    paging::unmap_low_half(&mut active_table, boot_info);

    frame_allocator
}
