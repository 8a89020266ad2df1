use core::ptr::Unique;
use crate::memory::{Frame, FrameAllocator, PAGE_SIZE};
use crate::memory::paging::{ENTRY_COUNT, Page, PhysicalAddress, VirtualAddress};
use crate::memory::paging::entry::EntryFlags;
use crate::memory::paging::table::{Level4, P4, Table};

pub struct Mapper {
    p4: Unique<Table<Level4>>,
}

impl Mapper {
    /// Safe only while `P4` genuinely resolves through the recursive mapping, i.e. while this
    /// is the currently active table.
    pub unsafe fn new() -> Mapper {
        Mapper {
            p4: Unique::new_unchecked(P4),
        }
    }

    pub fn p4(&self) -> &Table<Level4> {
        unsafe { self.p4.as_ref() }
    }

    pub fn p4_mut(&mut self) -> &mut Table<Level4> {
        unsafe { self.p4.as_mut() }
    }

    /// Translates a virtual address to the physical address it is mapped to, `None` if unmapped.
    pub fn translate(&self, virtual_address: VirtualAddress) -> Option<PhysicalAddress> {
        let offset = virtual_address % PAGE_SIZE;
        self.translate_page(Page::containing_address(virtual_address))
            .map(|frame| frame.number() * PAGE_SIZE + offset)
    }

    pub fn translate_page(&self, page: Page) -> Option<Frame> {
        let p3 = self.p4().next_table(page.p4_index());

        let huge_page = || {
            p3.and_then(|p3| {
                let p3_entry = &p3[page.p3_index()];
                // 1 GiB page?
                if let Some(start_frame) = p3_entry.pointed_frame() {
                    if p3_entry.flags().contains(EntryFlags::HUGE) {
                        assert_eq!(start_frame.number() % (ENTRY_COUNT * ENTRY_COUNT), 0);
                        return Some(Frame::from_number(
                            start_frame.number() + page.p2_index() * ENTRY_COUNT + page.p1_index(),
                        ));
                    }
                }
                if let Some(p2) = p3.next_table(page.p3_index()) {
                    let p2_entry = &p2[page.p2_index()];
                    // 2 MiB page?
                    if let Some(start_frame) = p2_entry.pointed_frame() {
                        if p2_entry.flags().contains(EntryFlags::HUGE) {
                            assert_eq!(start_frame.number() % ENTRY_COUNT, 0);
                            return Some(Frame::from_number(start_frame.number() + page.p1_index()));
                        }
                    }
                }
                None
            })
        };

        p3.and_then(|p3| p3.next_table(page.p3_index()))
            .and_then(|p2| p2.next_table(page.p2_index()))
            .and_then(|p1| p1[page.p1_index()].pointed_frame())
            .or_else(huge_page)
    }

    /// Maps `page` to `frame` with `flags`. `PRESENT` is always forced on. The target P1 entry
    /// must currently be unused.
    pub fn map_to<A>(&mut self, page: Page, frame: Frame, flags: EntryFlags, allocator: &mut A)
    where
        A: FrameAllocator,
    {
        let p4 = self.p4_mut();
        let p3 = p4.next_table_create(page.p4_index(), allocator);
        let p2 = p3.next_table_create(page.p3_index(), allocator);
        let p1 = p2.next_table_create(page.p2_index(), allocator);

        assert!(p1[page.p1_index()].is_unused());
        p1[page.p1_index()].set(frame, flags | EntryFlags::PRESENT);
    }

    pub fn map<A>(&mut self, page: Page, flags: EntryFlags, allocator: &mut A) -> Frame
    where
        A: FrameAllocator,
    {
        let frame = allocator.allocate_frame().expect("out of memory");
        self.map_to(page, frame.clone(), flags, allocator);
        frame
    }

    pub fn identity_map<A>(&mut self, frame: Frame, flags: EntryFlags, allocator: &mut A)
    where
        A: FrameAllocator,
    {
        let page = Page::containing_address(frame.start_address());
        self.map_to(page, frame, flags, allocator);
    }

    /// As `identity_map`, but a no-op if the page is already mapped — used when double-mapping
    /// overlapping ranges (e.g. a multiboot frame that a kernel section already covers).
    pub fn identity_map_if_unmapped<A>(&mut self, frame: Frame, flags: EntryFlags, allocator: &mut A)
    where
        A: FrameAllocator,
    {
        let page = Page::containing_address(frame.start_address());
        if self.translate_page(page).is_none() {
            self.map_to(page, frame, flags, allocator);
        }
    }

    /// Sets the USER bit on every present entry from P4 down to the P1 entry covering `page`,
    /// without altering which frame is mapped. Used only to grant ring-3 access to an
    /// already-mapped kernel page — see the open question on this in DESIGN.md.
    pub fn mark_user_accessible(&mut self, page: Page) {
        let p4 = self.p4_mut();
        let p4_entry_flags = p4[page.p4_index()].flags();
        let p4_frame = p4[page.p4_index()].pointed_frame().expect("p3 not present");
        p4[page.p4_index()].set(p4_frame, p4_entry_flags | EntryFlags::USER);

        let p3 = p4.next_table_mut(page.p4_index()).expect("p3 not present");
        let p3_entry_flags = p3[page.p3_index()].flags();
        let p3_frame = p3[page.p3_index()].pointed_frame().expect("p2 not present");
        p3[page.p3_index()].set(p3_frame, p3_entry_flags | EntryFlags::USER);

        let p2 = p3.next_table_mut(page.p3_index()).expect("p2 not present");
        let p2_entry_flags = p2[page.p2_index()].flags();
        let p2_frame = p2[page.p2_index()].pointed_frame().expect("p1 not present");
        p2[page.p2_index()].set(p2_frame, p2_entry_flags | EntryFlags::USER);

        let p1 = p2.next_table_mut(page.p2_index()).expect("p1 not present");
        let p1_entry_flags = p1[page.p1_index()].flags();
        let p1_frame = p1[page.p1_index()].pointed_frame().expect("page not present");
        p1[page.p1_index()].set(p1_frame, p1_entry_flags | EntryFlags::USER);
    }

    /// Unmaps `page`, deallocating its frame through `allocator`. Fatal if `page` isn't mapped.
    pub fn unmap<A>(&mut self, page: Page, allocator: &mut A)
    where
        A: FrameAllocator,
    {
        assert!(self.translate(page.start_address()).is_some());

        let p1 = self
            .p4_mut()
            .next_table_mut(page.p4_index())
            .and_then(|p3| p3.next_table_mut(page.p3_index()))
            .and_then(|p2| p2.next_table_mut(page.p2_index()))
            .expect("mapping code does not support huge pages");
        let frame = p1[page.p1_index()].pointed_frame().unwrap();
        p1[page.p1_index()].set_unused();

        use x86_64::instructions::tlb;
        use x86_64::VirtAddr;
        tlb::flush(VirtAddr::new(page.start_address() as u64));

        allocator.deallocate_frame(frame);
    }

    /// As `unmap`, but leaves the frame allocated — used to tear down the guard page left behind
    /// by the higher-half jump, whose backing frame is the soon-discarded low identity mapping.
    pub fn unmap_no_dealloc(&mut self, page: Page) {
        if self.translate(page.start_address()).is_none() {
            return;
        }

        if let Some(p1) = self
            .p4_mut()
            .next_table_mut(page.p4_index())
            .and_then(|p3| p3.next_table_mut(page.p3_index()))
            .and_then(|p2| p2.next_table_mut(page.p2_index()))
        {
            p1[page.p1_index()].set_unused();
        } else {
            self.p4_mut()[page.p4_index()].set_unused();
        }

        use x86_64::instructions::tlb;
        use x86_64::VirtAddr;
        tlb::flush(VirtAddr::new(page.start_address() as u64));
    }
}
