//! Scan Code Set 1 to ASCII translation and the ring buffer IRQ1 feeds raw scancodes into.
//! `drivers::ps2` owns the controller/device handshake; this module only ever sees bytes once
//! they've already come off the wire.

use core::sync::atomic::{AtomicBool, Ordering};
use conquer_once::spin::OnceCell;
use crossbeam_queue::ArrayQueue;
use crate::warn;

const QUEUE_CAPACITY: usize = 256;
const RELEASE_MASK: u8 = 0x80;
const LEFT_SHIFT: u8 = 0x2A;
const RIGHT_SHIFT: u8 = 0x36;

static SCANCODE_QUEUE: OnceCell<ArrayQueue<u8>> = OnceCell::uninit();
static SHIFT_HELD: AtomicBool = AtomicBool::new(false);

/// Must run once, before interrupts are enabled, so `push_scancode` never races an uninitialized
/// queue.
pub fn init_queue() {
    SCANCODE_QUEUE
        .try_init_once(|| ArrayQueue::new(QUEUE_CAPACITY))
        .expect("keyboard queue initialized twice");
}

/// Called from the IRQ1 handler. Never blocks; a full queue just drops the oldest input.
pub fn push_scancode(scancode: u8) {
    match SCANCODE_QUEUE.try_get() {
        Ok(queue) => {
            if queue.push(scancode).is_err() {
                warn!("keyboard: queue full, dropping scancode {:#x}", scancode);
            }
        }
        Err(_) => warn!("keyboard: scancode dropped, queue not initialized"),
    }
}

pub fn can_read_char() -> bool {
    SCANCODE_QUEUE.try_get().map(|queue| !queue.is_empty()).unwrap_or(false)
}

/// Drains scancodes until a translatable key-down event is found or the queue runs dry. Shift
/// make/break codes and any byte that maps to nothing consume input without producing a char.
pub fn read_char() -> Option<char> {
    let queue = SCANCODE_QUEUE.try_get().ok()?;

    while let Some(scancode) = queue.pop() {
        if let Some(c) = translate(scancode) {
            return Some(c);
        }
    }

    None
}

fn translate(scancode: u8) -> Option<char> {
    let released = scancode & RELEASE_MASK != 0;
    let code = scancode & !RELEASE_MASK;

    if code == LEFT_SHIFT || code == RIGHT_SHIFT {
        SHIFT_HELD.store(!released, Ordering::Relaxed);
        return None;
    }

    if released {
        return None;
    }

    let table = if SHIFT_HELD.load(Ordering::Relaxed) { &SHIFTED } else { &UNSHIFTED };
    table[code as usize]
}

#[rustfmt::skip]
static UNSHIFTED: [Option<char>; 128] = [
    /* 0x00 */ None,       Some('\x1b'), Some('1'), Some('2'),
    /* 0x04 */ Some('3'),  Some('4'),    Some('5'), Some('6'),
    /* 0x08 */ Some('7'),  Some('8'),    Some('9'), Some('0'),
    /* 0x0c */ Some('-'),  Some('='),    Some('\x08'), Some('\t'),
    /* 0x10 */ Some('q'),  Some('w'),    Some('e'), Some('r'),
    /* 0x14 */ Some('t'),  Some('y'),    Some('u'), Some('i'),
    /* 0x18 */ Some('o'),  Some('p'),    Some('['), Some(']'),
    /* 0x1c */ Some('\n'), None,         Some('a'), Some('s'),
    /* 0x20 */ Some('d'),  Some('f'),    Some('g'), Some('h'),
    /* 0x24 */ Some('j'),  Some('k'),    Some('l'), Some(';'),
    /* 0x28 */ Some('\''), Some('`'),    None,      Some('\\'),
    /* 0x2c */ Some('z'),  Some('x'),    Some('c'), Some('v'),
    /* 0x30 */ Some('b'),  Some('n'),    Some('m'), Some(','),
    /* 0x34 */ Some('.'),  Some('/'),    None,      Some('*'),
    /* 0x38 */ None,       Some(' '),    None,      None,
    /* 0x3c */ None,       None,         None,      None,
    /* 0x40 */ None,       None,         None,      None,
    /* 0x44 */ None,       None,         None,      None,
    /* 0x48 */ None,       None,         None,      Some('-'),
    /* 0x4c */ None,       None,         None,      Some('+'),
    /* 0x50 */ None,       None,         None,      None,
    /* 0x54 */ None,       None,         None,      None,
    /* 0x58 */ None,       None,         None,      None,
    /* 0x5c */ None,       None,         None,      None,
    /* 0x60 */ None,       None,         None,      None,
    /* 0x64 */ None,       None,         None,      None,
    /* 0x68 */ None,       None,         None,      None,
    /* 0x6c */ None,       None,         None,      None,
    /* 0x70 */ None,       None,         None,      None,
    /* 0x74 */ None,       None,         None,      None,
    /* 0x78 */ None,       None,         None,      None,
    /* 0x7c */ None,       None,         None,      None,
];

#[rustfmt::skip]
static SHIFTED: [Option<char>; 128] = [
    /* 0x00 */ None,       Some('\x1b'), Some('!'), Some('@'),
    /* 0x04 */ Some('#'),  Some('$'),    Some('%'), Some('^'),
    /* 0x08 */ Some('&'),  Some('*'),    Some('('), Some(')'),
    /* 0x0c */ Some('_'),  Some('+'),    Some('\x08'), Some('\t'),
    /* 0x10 */ Some('Q'),  Some('W'),    Some('E'), Some('R'),
    /* 0x14 */ Some('T'),  Some('Y'),    Some('U'), Some('I'),
    /* 0x18 */ Some('O'),  Some('P'),    Some('{'), Some('}'),
    /* 0x1c */ Some('\n'), None,         Some('A'), Some('S'),
    /* 0x20 */ Some('D'),  Some('F'),    Some('G'), Some('H'),
    /* 0x24 */ Some('J'),  Some('K'),    Some('L'), Some(':'),
    /* 0x28 */ Some('"'),  Some('~'),    None,      Some('|'),
    /* 0x2c */ Some('Z'),  Some('X'),    Some('C'), Some('V'),
    /* 0x30 */ Some('B'),  Some('N'),    Some('M'), Some('<'),
    /* 0x34 */ Some('>'),  Some('?'),    None,      Some('*'),
    /* 0x38 */ None,       Some(' '),    None,      None,
    /* 0x3c */ None,       None,         None,      None,
    /* 0x40 */ None,       None,         None,      None,
    /* 0x44 */ None,       None,         None,      None,
    /* 0x48 */ None,       None,         None,      Some('-'),
    /* 0x4c */ None,       None,         None,      Some('+'),
    /* 0x50 */ None,       None,         None,      None,
    /* 0x54 */ None,       None,         None,      None,
    /* 0x58 */ None,       None,         None,      None,
    /* 0x5c */ None,       None,         None,      None,
    /* 0x60 */ None,       None,         None,      None,
    /* 0x64 */ None,       None,         None,      None,
    /* 0x68 */ None,       None,         None,      None,
    /* 0x6c */ None,       None,         None,      None,
    /* 0x70 */ None,       None,         None,      None,
    /* 0x74 */ None,       None,         None,      None,
    /* 0x78 */ None,       None,         None,      None,
    /* 0x7c */ None,       None,         None,      None,
];
