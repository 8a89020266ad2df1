use crate::memory::{Frame, FrameAllocator};
use crate::memory::paging::{ActivePageTable, Page, VirtualAddress};
use crate::memory::paging::entry::EntryFlags;
use crate::memory::paging::table::{Level1, Table};

/// A single virtual page reserved for mapping whatever physical frame the caller needs to touch
/// next, used while building an `InactivePageTable` the active table isn't allowed to see yet.
/// Carries its own 3-frame allocator so mapping it never recurses into the real one, which may
/// itself be in the middle of being edited.
pub struct TemporaryPage {
    page: Page,
    allocator: TinyAllocator,
}

impl TemporaryPage {
    pub fn new<A>(page: Page, allocator: &mut A) -> TemporaryPage
    where
        A: FrameAllocator,
    {
        TemporaryPage {
            page,
            allocator: TinyAllocator::new(allocator),
        }
    }

    /// Maps this temporary page to `frame` in the active table and returns its start address.
    pub fn map(&mut self, frame: Frame, active_table: &mut ActivePageTable) -> VirtualAddress {
        assert!(
            active_table.translate_page(self.page).is_none(),
            "temporary page is already mapped"
        );
        active_table.map_to(self.page, frame, EntryFlags::WRITABLE, &mut self.allocator);
        self.page.start_address()
    }

    pub fn unmap(&mut self, active_table: &mut ActivePageTable) {
        active_table.unmap(self.page, &mut self.allocator)
    }

    /// Maps a page-table frame through this temporary page and reinterprets it as a `Table<Level1>`
    /// handle — valid for any level, since every level has the same 4 KiB / 512-entry layout.
    pub fn map_table_frame(&mut self, frame: Frame, active_table: &mut ActivePageTable) -> &mut Table<Level1> {
        unsafe { &mut *(self.map(frame, active_table) as *mut Table<Level1>) }
    }
}

struct TinyAllocator([Option<Frame>; 3]);

impl TinyAllocator {
    fn new<A>(allocator: &mut A) -> TinyAllocator
    where
        A: FrameAllocator,
    {
        let mut next = || allocator.allocate_frame();
        let frames = [
            Some(next().expect("could not allocate frame")),
            Some(next().expect("could not allocate frame")),
            Some(next().expect("could not allocate frame")),
        ];
        TinyAllocator(frames)
    }
}

impl FrameAllocator for TinyAllocator {
    fn allocate_frame(&mut self) -> Option<Frame> {
        for frame_option in &mut self.0 {
            if frame_option.is_some() {
                return frame_option.take();
            }
        }
        None
    }

    fn deallocate_frame(&mut self, frame: Frame) {
        for frame_option in &mut self.0 {
            if frame_option.is_none() {
                *frame_option = Some(frame);
                return;
            }
        }
        panic!("tiny allocator can hold only 3 frames");
    }
}
