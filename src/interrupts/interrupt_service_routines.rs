use core::arch::asm;
use core::fmt;
use core::fmt::Formatter;
use x86_64::registers::control::Cr2;
use crate::{error, keyboard};

pub type HandlerFuncWithoutErrCode = extern "x86-interrupt" fn(InterruptStackFrame);
pub type HandlerFuncWithErrCode = extern "x86-interrupt" fn(InterruptStackFrame, error_code: u64);

#[repr(C)]
pub struct InterruptStackFrame {
    instruction_pointer: u64,
    code_segment: u64,
    cpu_flags: u64,
    stack_pointer: u64,
    stack_segment: u64,
}

impl fmt::Debug for InterruptStackFrame {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.debug_struct("InterruptStackFrame")
            .field("instruction_pointer", &format_args!("0x{:X}", self.instruction_pointer))
            .field("code_segment", &format_args!("0x{:X}", self.code_segment))
            .field("cpu_flags", &format_args!("{:b}", self.cpu_flags))
            .field("stack_pointer", &format_args!("0x{:X}", self.stack_pointer))
            .field("stack_segment", &format_args!("0x{:X}", self.stack_segment))
            .finish()
    }
}

/// No scheduler exists to take over for a faulted task, so every unrecoverable exception parks
/// the core here instead of returning into whatever state caused it.
fn halt_forever() -> ! {
    loop {
        unsafe { asm!("cli", "hlt") };
    }
}

pub extern "x86-interrupt" fn division_error_handler(stack_frame: InterruptStackFrame) {
    error!("division error\n{:#?}", stack_frame);
    halt_forever();
}

pub extern "x86-interrupt" fn debug_handler(stack_frame: InterruptStackFrame) {
    error!("debug exception\n{:#?}", stack_frame);
}

pub extern "x86-interrupt" fn non_maskable_interrupt_handler(stack_frame: InterruptStackFrame) {
    error!("non-maskable interrupt\n{:#?}", stack_frame);
}

pub extern "x86-interrupt" fn breakpoint_handler(stack_frame: InterruptStackFrame) {
    error!("breakpoint\n{:#?}", stack_frame);
}

pub extern "x86-interrupt" fn overflow_handler(stack_frame: InterruptStackFrame) {
    error!("overflow\n{:#?}", stack_frame);
    halt_forever();
}

pub extern "x86-interrupt" fn bound_range_exceeded_handler(stack_frame: InterruptStackFrame) {
    error!("bound range exceeded\n{:#?}", stack_frame);
    halt_forever();
}

pub extern "x86-interrupt" fn invalid_opcode_handler(stack_frame: InterruptStackFrame) {
    error!("invalid opcode\n{:#?}", stack_frame);
    halt_forever();
}

pub extern "x86-interrupt" fn device_not_available_handler(stack_frame: InterruptStackFrame) {
    error!("device not available\n{:#?}", stack_frame);
    halt_forever();
}

pub extern "x86-interrupt" fn double_fault_handler(stack_frame: InterruptStackFrame, error_code: u64) {
    error!("double fault, error code {:#x}\n{:#?}", error_code, stack_frame);
    halt_forever();
}

pub extern "x86-interrupt" fn invalid_tss_handler(stack_frame: InterruptStackFrame, error_code: u64) {
    error!("invalid tss, error code {:#x}\n{:#?}", error_code, stack_frame);
    halt_forever();
}

pub extern "x86-interrupt" fn segment_not_present_handler(stack_frame: InterruptStackFrame, error_code: u64) {
    error!("segment not present, error code {:#x}\n{:#?}", error_code, stack_frame);
    halt_forever();
}

pub extern "x86-interrupt" fn stack_segment_fault_handler(stack_frame: InterruptStackFrame, error_code: u64) {
    error!("stack segment fault, error code {:#x}\n{:#?}", error_code, stack_frame);
    halt_forever();
}

pub extern "x86-interrupt" fn general_protection_fault_handler(stack_frame: InterruptStackFrame, error_code: u64) {
    error!("general protection fault, error code {:#x}\n{:#?}", error_code, stack_frame);
    halt_forever();
}

pub extern "x86-interrupt" fn page_fault_handler(stack_frame: InterruptStackFrame, error_code: u64) {
    let faulting_address = Cr2::read();
    error!(
        "page fault accessing {:?}, error code {:#x}\n{:#?}",
        faulting_address, error_code, stack_frame
    );
    halt_forever();
}

pub extern "x86-interrupt" fn x87_floating_point_exception_handler(stack_frame: InterruptStackFrame) {
    error!("x87 floating point exception\n{:#?}", stack_frame);
    halt_forever();
}

pub extern "x86-interrupt" fn alignment_check_handler(stack_frame: InterruptStackFrame, error_code: u64) {
    error!("alignment check, error code {:#x}\n{:#?}", error_code, stack_frame);
    halt_forever();
}

pub extern "x86-interrupt" fn machine_check_handler(stack_frame: InterruptStackFrame) {
    error!("machine check\n{:#?}", stack_frame);
    halt_forever();
}

pub extern "x86-interrupt" fn simd_floating_point_exception_handler(stack_frame: InterruptStackFrame) {
    error!("SIMD floating point exception\n{:#?}", stack_frame);
    halt_forever();
}

pub extern "x86-interrupt" fn virtualization_exception_handler(stack_frame: InterruptStackFrame) {
    error!("virtualization exception\n{:#?}", stack_frame);
    halt_forever();
}

pub extern "x86-interrupt" fn control_protection_exception_handler(stack_frame: InterruptStackFrame, error_code: u64) {
    error!("control protection exception, error code {:#x}\n{:#?}", error_code, stack_frame);
    halt_forever();
}

pub extern "x86-interrupt" fn hypervisor_injection_exception_handler(stack_frame: InterruptStackFrame) {
    error!("hypervisor injection exception\n{:#?}", stack_frame);
}

pub extern "x86-interrupt" fn vmm_communication_exception_handler(stack_frame: InterruptStackFrame, error_code: u64) {
    error!("VMM communication exception, error code {:#x}\n{:#?}", error_code, stack_frame);
    halt_forever();
}

pub extern "x86-interrupt" fn security_exception_handler(stack_frame: InterruptStackFrame, error_code: u64) {
    error!("security exception, error code {:#x}\n{:#?}", error_code, stack_frame);
    halt_forever();
}

const MASTER_PIC_COMMAND_ADDRESS: u16 = 0x20;
const SLAVE_PIC_COMMAND_ADDRESS: u16 = 0xA0;
const PIC_EOI: u8 = 0x20;

fn send_eoi(irq: u8) {
    use crate::arch::x86_64::port_manager::outb;

    unsafe {
        if irq >= 8 {
            outb(PIC_EOI, SLAVE_PIC_COMMAND_ADDRESS);
        }
        outb(PIC_EOI, MASTER_PIC_COMMAND_ADDRESS);
    }
}

macro_rules! irq_handler {
    ($name:ident, $irq:expr, $body:expr) => {
        pub extern "x86-interrupt" fn $name(_stack_frame: InterruptStackFrame) {
            $body;
            send_eoi($irq);
        }
    };
}

irq_handler!(irq0_handler, 0, ()); // timer: no scheduler hooked up yet
irq_handler!(irq1_handler, 1, {
    let scancode: u8 = unsafe {
        let value: u8;
        asm!("in al, 0x60", out("al") value, options(nomem, nostack));
        value
    };
    keyboard::push_scancode(scancode);
});
irq_handler!(irq2_handler, 2, ()); // cascade, never fires directly
irq_handler!(irq3_handler, 3, ());
irq_handler!(irq4_handler, 4, ());
irq_handler!(irq5_handler, 5, ());
irq_handler!(irq6_handler, 6, ());
irq_handler!(irq7_handler, 7, ());
irq_handler!(irq8_handler, 8, ());
irq_handler!(irq9_handler, 9, ());
irq_handler!(irq10_handler, 10, ());
irq_handler!(irq11_handler, 11, ());
irq_handler!(irq12_handler, 12, ());
irq_handler!(irq13_handler, 13, ());
irq_handler!(irq14_handler, 14, ());
irq_handler!(irq15_handler, 15, ());
