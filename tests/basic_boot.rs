#![no_std]
#![no_main]

use core::panic::PanicInfo;

use hallway::{exit_qemu, serial_println, test_panic_handler, QemuExitCode};

#[no_mangle]
pub extern "C" fn _start() -> ! {
    serial_println!("basic_boot: starting");

    test_serial_output();
    test_arithmetic();
    test_heap_constants();

    serial_println!("basic_boot: all tests passed");
    exit_qemu(QemuExitCode::Success)
}

#[panic_handler]
fn panic(info: &PanicInfo) -> ! {
    test_panic_handler(info)
}

fn test_serial_output() {
    serial_println!("test_serial_output: reachable over COM1");
}

fn test_arithmetic() {
    let x = 2 + 2;
    assert_eq!(x, 4);
}

fn test_heap_constants() {
    assert!(hallway::process::USER_HEAP_SIZE > 0);
    assert_eq!(hallway::process::USER_HEAP_START % 4096, 0);
}
