use core::arch::asm;
use core::ops::{Deref, DerefMut};
use x86_64::registers::control::{Cr0, Cr0Flags};
use x86_64::registers::model_specific::{Efer, EferFlags};
use crate::arch::multiboot2::BootInformation;
use crate::memory::{Frame, FrameAllocator, PAGE_SIZE};
use crate::memory::paging::entry::EntryFlags;
use crate::memory::paging::temporary_page::TemporaryPage;
use crate::memory::paging::mapper::Mapper;
use crate::{info, ok, serial_println};

pub mod entry;
pub mod table;
pub mod temporary_page;
pub mod mapper;

const ENTRY_COUNT: usize = 512;

pub type PhysicalAddress = usize;
pub type VirtualAddress = usize;

/// P4 slot 510; everything at or above this address is the kernel's higher half.
pub const KERNEL_OFFSET: usize = 0xFFFF_8000_0000_0000;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct Page {
    number: usize,
}

impl Page {
    /// Returns the page containing a virtual address. Panics on an address inside the
    /// non-canonical hole, same as the CPU would fault dereferencing one.
    pub fn containing_address(address: VirtualAddress) -> Page {
        assert!(
            !(0x0000_8000_0000_0000..0xffff_8000_0000_0000).contains(&address),
            "invalid address: {:#x}",
            address
        );

        Page { number: address / PAGE_SIZE }
    }

    pub fn range_inclusive(start: Page, end: Page) -> PageIter {
        PageIter { start, end }
    }

    pub fn start_address(&self) -> usize {
        self.number * PAGE_SIZE
    }

    fn p4_index(&self) -> usize {
        (self.number >> 27) & 0o777
    }
    fn p3_index(&self) -> usize {
        (self.number >> 18) & 0o777
    }
    fn p2_index(&self) -> usize {
        (self.number >> 9) & 0o777
    }
    fn p1_index(&self) -> usize {
        self.number & 0o777
    }
}

pub struct PageIter {
    start: Page,
    end: Page,
}

impl Iterator for PageIter {
    type Item = Page;

    fn next(&mut self) -> Option<Page> {
        if self.start <= self.end {
            let page = self.start;
            self.start.number += 1;
            Some(page)
        } else {
            None
        }
    }
}

pub struct ActivePageTable {
    mapper: Mapper,
}

impl Deref for ActivePageTable {
    type Target = Mapper;

    fn deref(&self) -> &Mapper {
        &self.mapper
    }
}

impl DerefMut for ActivePageTable {
    fn deref_mut(&mut self) -> &mut Mapper {
        &mut self.mapper
    }
}

impl ActivePageTable {
    /// Safe only when the currently loaded CR3 is recursively self-mapped at slot 511, which the
    /// boot trampoline guarantees from the first instruction executed in long mode.
    unsafe fn new() -> ActivePageTable {
        ActivePageTable { mapper: Mapper::new() }
    }

    /// Public handle onto whatever P4 is live in CR3 right now. Safe to call anywhere after
    /// `memory::init` has run, since the recursive self-map at slot 511 is a standing invariant
    /// of every address space this kernel ever installs.
    pub fn current() -> ActivePageTable {
        unsafe { ActivePageTable::new() }
    }

    /// Runs `f` against `inactive_table` instead of `self`, by temporarily overwriting this
    /// table's recursive slot to point at `inactive_table`. Any `map_to`/`unmap` performed
    /// inside `f` lands in the inactive table; the real active mapping is untouched.
    pub fn with<F>(&mut self, inactive_table: &mut InactivePageTable, temporary_page: &mut TemporaryPage, f: F)
    where
        F: FnOnce(&mut Mapper),
    {
        {
            use x86_64::instructions::tlb;

            let backup = Frame::containing_address(current_cr3());

            // map temporary_page to current p4 table
            let p4_table = temporary_page.map_table_frame(backup.clone(), self);

            // overwrite recursive mapping
            self.p4_mut()[511].set(inactive_table.p4_frame.clone(), EntryFlags::PRESENT | EntryFlags::WRITABLE);
            tlb::flush_all();

            // execute f in the new context
            f(self);

            p4_table[511].set(backup, EntryFlags::PRESENT | EntryFlags::WRITABLE);
            tlb::flush_all();
        }

        temporary_page.unmap(self);
    }

    /// Exchanges CR3 with `new_table`'s frame, returning an `InactivePageTable` wrapping the
    /// frame that was active before the call.
    pub fn switch(&mut self, new_table: InactivePageTable) -> InactivePageTable {
        let old_table = InactivePageTable {
            p4_frame: Frame::containing_address(current_cr3()),
        };

        unsafe {
            asm!("mov cr3, {}", in(reg) new_table.p4_frame.start_address() as u64, options(nostack, preserves_flags));
        }

        old_table
    }
}

fn current_cr3() -> usize {
    unsafe {
        let value: usize;
        asm!("mov {}, cr3", out(reg) value, options(nomem, nostack, preserves_flags));
        value
    }
}

pub struct InactivePageTable {
    p4_frame: Frame,
}

impl InactivePageTable {
    /// Zeroes `frame` and installs its own recursive self-map, by briefly mapping it through
    /// `temporary_page` in the currently active table.
    pub fn new(frame: Frame, active_table: &mut ActivePageTable, temporary_page: &mut TemporaryPage) -> InactivePageTable {
        {
            let table = temporary_page.map_table_frame(frame.clone(), active_table);
            table.zero();
            table[511].set(frame.clone(), EntryFlags::PRESENT | EntryFlags::WRITABLE);
        }

        temporary_page.unmap(active_table);
        InactivePageTable { p4_frame: frame }
    }
}

/// Builds a fresh address space that double-maps the kernel at its identity address and at
/// `KERNEL_OFFSET` plus that address, then switches to it, leaving a guard page where the old
/// P4 used to live. Does not perform the higher-half jump itself or unmap the low half — see
/// `jump_to_higher_half` and `unmap_low_half`, both driven from `memory::init`.
pub fn remap_kernel<A>(allocator: &mut A, boot_info: &BootInformation) -> ActivePageTable
where
    A: FrameAllocator,
{
    unsafe {
        Efer::update(|flags| *flags |= EferFlags::NO_EXECUTE_ENABLE);
        Cr0::update(|flags| *flags |= Cr0Flags::WRITE_PROTECT);
    }

    info!("mm: remapping kernel to higher half...");

    let mut temporary_page = TemporaryPage::new(Page { number: 0xcafebabe }, allocator);

    let mut active_table = unsafe { ActivePageTable::new() };
    let mut new_table = {
        let frame = allocator.allocate_frame().expect("no more frames");
        InactivePageTable::new(frame, &mut active_table, &mut temporary_page)
    };

    active_table.with(&mut new_table, &mut temporary_page, |mapper| {
        let elf_sections = boot_info.elf_sections_tag().expect("elf sections tag required");

        for section in elf_sections.section_headers() {
            if !section.is_allocated() {
                continue;
            }

            assert_eq!(section.start_address() % PAGE_SIZE, 0, "sections need to be page aligned");

            let flags = EntryFlags::from_elf_section_flags(section);
            let start_frame = Frame::containing_address(section.start_address());
            let end_frame = Frame::containing_address(section.end_address() - 1);

            for frame in Frame::range_inclusive(start_frame, end_frame) {
                mapper.identity_map(frame, flags, allocator);

                let high_page = Page::containing_address(frame.start_address() + KERNEL_OFFSET);
                mapper.map_to(high_page, frame, flags, allocator);
            }
        }

        // Double-map the multiboot info blob read-only; a kernel section covering the same
        // frame has already been mapped above.
        let multiboot_start = Frame::containing_address(boot_info.start_address());
        let multiboot_end = Frame::containing_address(boot_info.end_address() - 1);
        for frame in Frame::range_inclusive(multiboot_start, multiboot_end) {
            mapper.identity_map_if_unmapped(frame, EntryFlags::PRESENT, allocator);

            let high_page = Page::containing_address(frame.start_address() + KERNEL_OFFSET);
            if mapper.translate_page(high_page).is_none() {
                mapper.map_to(high_page, frame, EntryFlags::PRESENT, allocator);
            }
        }

        let vga_frame = Frame::containing_address(0xb8000);
        mapper.identity_map_if_unmapped(vga_frame, EntryFlags::WRITABLE, allocator);
        let vga_high_page = Page::containing_address(0xb8000 + KERNEL_OFFSET);
        if mapper.translate_page(vga_high_page).is_none() {
            mapper.map_to(vga_high_page, vga_frame, EntryFlags::WRITABLE, allocator);
        }
    });

    let old_table = active_table.switch(new_table);

    let old_p4_page = Page::containing_address(old_table.p4_frame.start_address());
    active_table.unmap(old_p4_page, allocator);

    ok!("mm: guard page at {:#x}", old_p4_page.start_address());
    serial_println!("mm: kernel double-mapped at identity and +{:#x}", KERNEL_OFFSET);

    active_table
}

/// Moves execution onto the high alias of the currently running code: rebases RSP/RBP by
/// `KERNEL_OFFSET` and jumps to a label immediately following, whose own address is recomputed
/// through the same offset. Both aliases point at the identical physical frame, so the jump only
/// changes which virtual address RIP is fetched through; everything already on the stack stays
/// valid because the stack itself moved with it. Must only run after `remap_kernel` has
/// double-mapped the code currently executing and the stack currently in use.
#[inline(never)]
pub unsafe fn jump_to_higher_half() {
    asm!(
        "add rsp, {offset}",
        "add rbp, {offset}",
        "lea rax, [rip + 2f]",
        "add rax, {offset}",
        "jmp rax",
        "2:",
        offset = in(reg) KERNEL_OFFSET as u64,
        out("rax") _,
    );
}

/// Removes the identity half of the double mapping, leaving only the higher-half view. Must run
/// only after `jump_to_higher_half` has already moved RIP and RSP onto the high alias.
pub fn unmap_low_half(active_table: &mut ActivePageTable, boot_info: &BootInformation) {
    let elf_sections = boot_info.elf_sections_tag().expect("elf sections tag required");

    for section in elf_sections.section_headers() {
        if !section.is_allocated() {
            continue;
        }

        let start_frame = Frame::containing_address(section.start_address());
        let end_frame = Frame::containing_address(section.end_address() - 1);
        for frame in Frame::range_inclusive(start_frame, end_frame) {
            active_table.unmap_no_dealloc(Page::containing_address(frame.start_address()));
        }
    }

    let multiboot_start = Frame::containing_address(boot_info.start_address());
    let multiboot_end = Frame::containing_address(boot_info.end_address() - 1);
    for frame in Frame::range_inclusive(multiboot_start, multiboot_end) {
        active_table.unmap_no_dealloc(Page::containing_address(frame.start_address()));
    }

    active_table.unmap_no_dealloc(Page::containing_address(0xb8000));

    use x86_64::instructions::tlb;
    tlb::flush_all();

    info!("mm: unmapped low half, now running entirely above {:#x}", KERNEL_OFFSET);
}
