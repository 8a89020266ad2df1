pub mod keyboard;

use lazy_static::lazy_static;
use spin::Mutex;
use crate::info;
use crate::arch::x86_64::port_manager::Port;
use crate::arch::x86_64::port_manager::ReadWriteStatus::*;
use crate::drivers::ps2::keyboard::PS2Keyboard;
use crate::drivers::ps2::PS2ControllerCommand::*;
use crate::drivers::ps2::PS2DeviceCommand::*;
use crate::drivers::ps2::PS2Port::*;
use crate::utils::bitutils::is_nth_bit_set;

const DATA_PORT_ADDRESS: u16 = 0x60;
const STATUS_REGISTER_ADDRESS: u16 = 0x64;
const COMMAND_REGISTER_ADDRESS: u16 = 0x64;

lazy_static! {
    pub static ref DATA_PORT: Mutex<Port<u8>> = Mutex::new(Port::new(DATA_PORT_ADDRESS, ReadWrite));
    pub static ref STATUS_REGISTER: Mutex<Port<u8>> = Mutex::new(Port::new(STATUS_REGISTER_ADDRESS, ReadOnly));
    pub static ref COMMAND_REGISTER: Mutex<Port<u8>> = Mutex::new(Port::new(COMMAND_REGISTER_ADDRESS, WriteOnly));
}

#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum PS2Port {
    FirstPS2Port,
    SecondPS2Port,
}

#[repr(u8)]
#[derive(Debug, Copy, Clone)]
enum PS2ControllerCommand {
    ReadByteZero = 0x20,
    DisableSecondPS2 = 0xA7,
    EnableSecondPS2 = 0xA8,
    TestSecondPS2 = 0xA9,
    TestPS2Controller = 0xAA,
    TestFirstPS2 = 0xAB,
    DisableFirstPS2 = 0xAD,
    EnableFirstPS2 = 0xAE,
    WriteToSecondPs2InputBuffer = 0xD4,
}

#[repr(u8)]
#[derive(Debug, Copy, Clone)]
pub enum PS2DeviceCommand {
    SelfTestSuccessful = 0xAA,
    Identify = 0xF2,
    ACK = 0xFA,
    Reset = 0xFF,
}

/// Shared handshake logic for talking to whatever is plugged into a PS/2 port. The only concrete
/// device this kernel models is `keyboard::PS2Keyboard`; a second-port mouse is out of scope.
pub trait PS2Device {
    fn port(&self) -> PS2Port;

    fn read_byte(&self) -> u8 {
        while !is_nth_bit_set(STATUS_REGISTER.lock().read().unwrap(), 0) {}

        DATA_PORT.lock().read().unwrap()
    }

    fn write_byte(&self, command: u8) {
        match self.port() {
            FirstPS2Port => {
                while is_nth_bit_set(STATUS_REGISTER.lock().read().unwrap(), 1) {}
                DATA_PORT.lock().write(command).unwrap();
            }
            SecondPS2Port => {
                COMMAND_REGISTER.lock().write(WriteToSecondPs2InputBuffer as u8).unwrap();
                while is_nth_bit_set(STATUS_REGISTER.lock().read().unwrap(), 1) {}
                DATA_PORT.lock().write(command).unwrap();
            }
        }

        let response = self.read_byte();
        assert_eq!(response, ACK as u8);
    }
}

#[derive(Debug, Copy, Clone)]
pub struct GenericPS2Device {
    port: PS2Port,
}

impl PS2Device for GenericPS2Device {
    fn port(&self) -> PS2Port {
        self.port
    }
}

struct PS2ControllerDevices {
    first: Option<GenericPS2Device>,
    second: Option<GenericPS2Device>,
}

/// Runs the standard PS/2 controller bring-up sequence and returns the keyboard if one was
/// found on either port. A second-port mouse, if present, is left disabled.
pub fn init_ps2_controller() -> Option<PS2Keyboard> {
    info!("ps2: initializing controller...");

    disable_ps2_devices();
    flush_output_buffer();
    set_config_byte();
    controller_self_test();
    let is_dual_channel = dual_channel_check();
    let devices = interface_test(is_dual_channel);
    enable_devices(&devices);
    reset_devices(&devices);

    let keyboard = devices
        .first
        .as_ref()
        .and_then(detect_keyboard)
        .or_else(|| devices.second.as_ref().and_then(detect_keyboard));

    if keyboard.is_some() {
        info!("ps2: keyboard detected");
    }

    keyboard
}

fn disable_ps2_devices() {
    COMMAND_REGISTER.lock().write(DisableFirstPS2 as u8).unwrap();
    COMMAND_REGISTER.lock().write(DisableSecondPS2 as u8).unwrap();
}

fn flush_output_buffer() {
    DATA_PORT.lock().read().unwrap();
}

fn set_config_byte() {
    let config_byte = send_command_for_response(ReadByteZero);
    update_config_byte(config_byte & !0b0010_0011);
}

fn controller_self_test() {
    let config_byte = send_command_for_response(ReadByteZero);
    let response = send_command_for_response(TestPS2Controller);
    assert_eq!(response, 0x55);

    update_config_byte(config_byte);
}

fn dual_channel_check() -> bool {
    COMMAND_REGISTER.lock().write(EnableSecondPS2 as u8).unwrap();

    let config_byte = send_command_for_response(ReadByteZero);
    let dual_channel_bit = config_byte & (1 << 5) != 0;

    if dual_channel_bit {
        COMMAND_REGISTER.lock().write(DisableSecondPS2 as u8).unwrap();
    }

    !dual_channel_bit
}

fn interface_test(is_dual_channel: bool) -> PS2ControllerDevices {
    let first_response = send_command_for_response(TestFirstPS2);
    let first = if first_response == 0 { Some(GenericPS2Device { port: FirstPS2Port }) } else { None };

    let second = if is_dual_channel {
        let second_response = send_command_for_response(TestSecondPS2);
        if second_response == 0 { Some(GenericPS2Device { port: SecondPS2Port }) } else { None }
    } else {
        None
    };

    PS2ControllerDevices { first, second }
}

fn enable_devices(devices: &PS2ControllerDevices) {
    let mut enable_mask = 0u8;

    if devices.first.is_some() {
        COMMAND_REGISTER.lock().write(EnableFirstPS2 as u8).unwrap();
        enable_mask |= 0b01;
    }

    if devices.second.is_some() {
        COMMAND_REGISTER.lock().write(EnableSecondPS2 as u8).unwrap();
        enable_mask |= 0b10;
    }

    let config_byte = send_command_for_response(ReadByteZero);
    update_config_byte(config_byte | enable_mask);
}

fn reset_devices(devices: &PS2ControllerDevices) {
    if let Some(device) = devices.first.as_ref() {
        device.write_byte(Reset as u8);
        assert_eq!(device.read_byte(), SelfTestSuccessful as u8);
    }

    if let Some(device) = devices.second.as_ref() {
        device.write_byte(Reset as u8);
        assert_eq!(device.read_byte(), SelfTestSuccessful as u8);
    }
}

fn detect_keyboard(device: &GenericPS2Device) -> Option<PS2Keyboard> {
    device.write_byte(Identify as u8);

    let first_byte = device.read_byte();
    let second_byte = device.read_byte();

    match (first_byte, second_byte) {
        (0xAB, 0x41) | (0xAB, 0xC1) => Some(PS2Keyboard::new(device.port())),
        _ => None,
    }
}

fn send_command_for_response(command: PS2ControllerCommand) -> u8 {
    COMMAND_REGISTER.lock().write(command as u8).unwrap();
    wait_for_output_buffer();
    DATA_PORT.lock().read().unwrap()
}

fn update_config_byte(config_byte: u8) {
    DATA_PORT.lock().write(config_byte).unwrap();
    wait_for_output_buffer();
}

fn wait_for_output_buffer() {
    while STATUS_REGISTER.lock().read().unwrap() & 1 == 0 {}
}
