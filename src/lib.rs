#![allow(internal_features)]
#![allow(dead_code)]
#![feature(lang_items)]
#![feature(ptr_internals)]
#![feature(panic_info_message)]
#![feature(abi_x86_interrupt)]
#![feature(naked_functions)]
#![no_std]
#![cfg_attr(test, no_main)]
#![feature(custom_test_frameworks)]
#![test_runner(crate::test_runner)]
#![reexport_test_harness_main = "test_main"]

extern crate alloc;
extern crate rlibc;

use core::panic::PanicInfo;
use crate::{error, info, serial_println};

pub mod arch;
pub mod drivers;
pub mod interrupts;
pub mod keyboard;
pub mod memory;
pub mod process;
pub mod serial;
pub mod syscall;
pub mod user_program;
pub mod utils;
pub mod vga_buffer;

pub use utils::tests::{exit_qemu, QemuExitCode};

/// Entered from `boot.asm`'s `long_mode_start` with the multiboot2 info pointer in `rdi`, per the
/// System V calling convention. Brings up memory, interrupts, and the PS/2 keyboard, then drops
/// into the one ring-3 process this kernel ever runs. Never returns.
#[no_mangle]
pub extern "C" fn kernel_main(multiboot_info_addr: usize) -> ! {
    vga_buffer::clear_screen();
    serial_println!("hallway: booting");
    info!("hallway: booting, multiboot info at {:#x}", multiboot_info_addr);

    let boot_info = unsafe { arch::multiboot2::load(multiboot_info_addr) };

    if let Some(cmdline) = boot_info.command_line_tag() {
        info!("boot: command line {:?}", cmdline.as_str());
    }
    if let Some(name) = boot_info.boot_loader_name_tag() {
        info!("boot: loaded by {:?}", name.as_str());
    }

    let mut frame_allocator = memory::init(boot_info);
    interrupts::global_descriptor_table::GlobalDescriptorTable::init();
    interrupts::InterruptController::init_interrupts();

    if let Some(keyboard) = drivers::ps2::init_ps2_controller() {
        keyboard.enable_scanning();
        interrupts::INTERRUPT_CONTROLLER.lock().enable_keyboard_interrupts();
    }

    #[cfg(test)]
    test_main();

    let mut active_table = memory::paging::ActivePageTable::current();
    process::spawn_user_program(&mut active_table, &mut frame_allocator, user_program::demo_entry as usize)
}

#[cfg(not(test))]
#[panic_handler]
fn panic(info: &PanicInfo) -> ! {
    vga_buffer::print_header(vga_buffer::MessageType::Error);
    error!("{}", info);
    serial_println!("PANIC: {}", info);

    halt_forever()
}

#[cfg(test)]
#[panic_handler]
fn panic(info: &PanicInfo) -> ! {
    test_panic_handler(info)
}

fn halt_forever() -> ! {
    loop {
        unsafe { core::arch::asm!("cli", "hlt") };
    }
}

pub fn test_runner(tests: &[&dyn utils::tests::Testable]) {
    serial_println!("running {} tests", tests.len());
    for test in tests {
        test.run();
    }
    exit_qemu(QemuExitCode::Success);
}

pub fn test_panic_handler(info: &PanicInfo) -> ! {
    serial_println!("[failed]\n");
    serial_println!("error: {}", info);
    exit_qemu(QemuExitCode::Failure)
}

#[lang = "eh_personality"]
#[no_mangle]
pub extern "C" fn eh_personality() {}
