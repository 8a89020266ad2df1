//! Ring-3 transition and the single process this kernel ever runs. There is no scheduler: one
//! process is built immediately before dropping into user mode and lives until the machine halts.

use core::sync::atomic::{AtomicU64, Ordering};
use spin::Mutex;
use crate::interrupts::global_descriptor_table::jump_to_user_mode;
use crate::memory::heap::Locked;
use crate::memory::heap::block_allocator::BlockAllocator;
use crate::memory::paging::entry::EntryFlags;
use crate::memory::paging::{ActivePageTable, Page, VirtualAddress};
use crate::memory::FrameAllocator;
use crate::{info, warn};

pub const USER_HEAP_START: VirtualAddress = 0xB000_0000;
pub const USER_HEAP_SIZE: usize = 8 * 1024 * 1024;
pub const USER_STACK_TOP: VirtualAddress = 0xC000_0000;
pub const USER_STACK_SIZE: usize = 2 * 1024 * 1024;

static NEXT_PROCESS_ID: AtomicU64 = AtomicU64::new(0);

/// The process currently executing in ring 3. Observed from the syscall dispatcher, which runs
/// at ring 0 but on behalf of whatever this points at.
pub static ACTIVE_PROCESS: Mutex<Option<Process>> = Mutex::new(None);

pub struct Process {
    pub id: u64,
    pub heap: Locked<BlockAllocator>,
}

impl Process {
    fn new() -> Self {
        let heap = Locked::new(BlockAllocator::new());
        unsafe {
            heap.lock().init(USER_HEAP_START, USER_HEAP_SIZE);
        }

        Process {
            id: NEXT_PROCESS_ID.fetch_add(1, Ordering::Relaxed),
            heap,
        }
    }
}

/// Maps the user heap and stack, marks the page containing `entry_point` as user-accessible, and
/// transitions to ring 3. Never returns.
///
/// The entry point page is the kernel's own code page reused in place rather than a copy loaded
/// into user-only memory — a known hole carried over from the system this was distilled from.
/// Marking it USER means any ring-3 code that can compute a kernel code address can fetch from
/// it; a correct implementation would copy the user program into a page the kernel itself never
/// executes from. Preserved here rather than silently fixed.
pub fn spawn_user_program<A>(
    active_table: &mut ActivePageTable,
    frame_allocator: &mut A,
    entry_point: VirtualAddress,
) -> !
where
    A: FrameAllocator,
{
    warn!("process: user entry point reuses a kernel code page; ring-3 code can read all of kernel .text");

    map_range(active_table, frame_allocator, USER_HEAP_START, USER_HEAP_SIZE);
    map_range(active_table, frame_allocator, USER_STACK_TOP - USER_STACK_SIZE, USER_STACK_SIZE);

    active_table.mark_user_accessible(Page::containing_address(entry_point));

    let process = Process::new();
    info!("process: spawning process {} at entry {:#x}", process.id, entry_point);
    *ACTIVE_PROCESS.lock() = Some(process);

    jump_to_user_mode(entry_point as u64, USER_STACK_TOP as u64);
}

fn map_range<A>(active_table: &mut ActivePageTable, frame_allocator: &mut A, start: VirtualAddress, size: usize)
where
    A: FrameAllocator,
{
    let start_page = Page::containing_address(start);
    let end_page = Page::containing_address(start + size - 1);

    for page in Page::range_inclusive(start_page, end_page) {
        let flags = EntryFlags::PRESENT | EntryFlags::WRITABLE | EntryFlags::USER | EntryFlags::NO_EXECUTE;
        active_table.map(page, flags, frame_allocator);
    }
}
