use log::{debug, trace, warn};
use serde::{Deserialize, Serialize};

use super::super::controller::Controller;
use super::super::error::Error;

const NUM_CHANNELS: usize = 5;

const TX_BUFFER_SIZE: usize = 64;

// Port 3 bits
const STATUS_DEVICE_PRESENT: u8 = 1 << 2;
const STATUS_CLOCK: u8 = 1 << 3;

const CMD_INFO: u8 = 0x00;
const CMD_CONTROLLER_STATE: u8 = 0x01;
const CMD_WRITE_ACCESSORY: u8 = 0x03;

const CONTROLLER_IDENTIFIER: u16 = 0x0500;
const CONTROLLER_NO_PAK: u8 = 1 << 1;

#[derive(Clone, Copy, Debug, Deserialize, PartialEq, Serialize)]
enum Device {
    None,
    Controller,
}

#[derive(Clone, Copy, Deserialize, PartialEq, Serialize)]
enum State {
    ReceiveCommand,
    ReceiveData,
}

#[derive(Deserialize, Serialize)]
pub struct Joybus {
    channels: [Device; NUM_CHANNELS],
    current_channel: usize,

    tx_pointer: usize,
    data_size: usize,
    tx_buffer: Box<[u8]>,

    first_access: bool,

    state: State,
}

impl Joybus {
    pub fn new() -> Joybus {
        let mut channels = [Device::None; NUM_CHANNELS];
        channels[0] = Device::Controller;

        Joybus {
            channels,
            current_channel: 0,

            tx_pointer: 0,
            data_size: 0,
            tx_buffer: vec![0; TX_BUFFER_SIZE].into_boxed_slice(),

            first_access: true,

            state: State::ReceiveCommand,
        }
    }

    pub fn reset(&mut self) {
        *self = Joybus::new();
    }

    fn reset_tx_buffer(&mut self) {
        self.tx_pointer = 0;
        self.data_size = 0;

        self.tx_buffer.fill(0);
    }

    fn prepare_receive_data(&mut self, length: usize) {
        self.data_size = self.tx_pointer + length;

        self.state = State::ReceiveData;
    }

    pub fn read_channel(&self) -> u8 {
        self.current_channel as u8
    }

    pub fn read_error(&self) -> u8 {
        0
    }

    pub fn read_status(&self) -> u8 {
        let mut present = 0;
        if self.channels[self.current_channel] != Device::None {
            present = STATUS_DEVICE_PRESENT;
        }

        STATUS_CLOCK | present
    }

    /// Response bytes leave the buffer one nibble at a time, high first.
    pub fn read_receive(&mut self) -> u8 {
        let data = if self.first_access {
            self.tx_buffer[self.tx_pointer] >> 4
        } else {
            let data = self.tx_buffer[self.tx_pointer] & 0xf;
            self.tx_pointer += 1;

            data
        };

        self.first_access = !self.first_access;

        data
    }

    pub fn write_channel(&mut self, data: u8) -> Result<(), Error> {
        let channel = data as usize;

        if channel >= NUM_CHANNELS {
            return Err(Error::Unimplemented(format!(
                "joybus channel {} select",
                channel
            )));
        }

        trace!("[JOYBUS] Channel {} selected", channel);

        self.current_channel = channel;
        self.first_access = true;

        self.reset_tx_buffer();

        self.state = State::ReceiveCommand;

        Ok(())
    }

    pub fn write_control(&mut self, data: u8) {
        warn!("[JOYBUS] Control write (data = 0x{:x})", data);
    }

    pub fn write_error(&mut self, data: u8) {
        warn!("[JOYBUS] Error write (data = 0x{:x})", data);
    }

    /// Command bytes arrive one nibble at a time, high first. A command
    /// dispatches once its final byte completes.
    pub fn write_transmit(&mut self, data: u8, controller: &Controller) -> Result<(), Error> {
        if self.tx_pointer >= TX_BUFFER_SIZE {
            return Err(Error::Unimplemented(String::from("joybus TX overrun")));
        }

        if self.first_access {
            self.tx_buffer[self.tx_pointer] = data << 4;

            self.first_access = false;
            return Ok(());
        }

        self.tx_buffer[self.tx_pointer] |= data & 0xf;
        self.tx_pointer += 1;

        self.first_access = true;

        match self.state {
            State::ReceiveCommand => self.do_command(controller)?,
            State::ReceiveData => {
                if self.tx_pointer == self.data_size {
                    let command = self.tx_buffer[0];
                    match command {
                        CMD_WRITE_ACCESSORY => self.cmd_write_accessory(),
                        _ => {
                            return Err(Error::Unimplemented(format!(
                                "joybus command 0x{:02x} data phase",
                                command
                            )))
                        }
                    }
                }
            }
        }

        Ok(())
    }

    fn do_command(&mut self, controller: &Controller) -> Result<(), Error> {
        let command = self.tx_buffer[0];

        match command {
            CMD_INFO => self.cmd_info(),
            CMD_CONTROLLER_STATE => self.cmd_controller_state(controller),
            // Two address bytes, 32 data bytes.
            CMD_WRITE_ACCESSORY => self.prepare_receive_data(34),
            _ => {
                return Err(Error::Unimplemented(format!(
                    "joybus command 0x{:02x} (channel = {})",
                    command, self.current_channel
                )))
            }
        }

        Ok(())
    }

    fn cmd_info(&mut self) {
        debug!("[JOYBUS] Info (channel = {})", self.current_channel);

        self.reset_tx_buffer();

        match self.channels[self.current_channel] {
            Device::Controller => {
                self.tx_buffer[0..2].copy_from_slice(&CONTROLLER_IDENTIFIER.to_be_bytes());
                self.tx_buffer[2] = CONTROLLER_NO_PAK;
            }
            Device::None => {}
        }

        self.first_access = true;
    }

    fn cmd_controller_state(&mut self, controller: &Controller) {
        debug!("[JOYBUS] Controller State (channel = {})", self.current_channel);

        self.reset_tx_buffer();

        match self.channels[self.current_channel] {
            Device::Controller => {
                self.tx_buffer[0..2].copy_from_slice(&controller.buttons().to_be_bytes());
                self.tx_buffer[2] = controller.stick_x as u8;
                self.tx_buffer[3] = controller.stick_y as u8;
            }
            Device::None => {}
        }

        self.first_access = true;
    }

    fn cmd_write_accessory(&mut self) {
        debug!(
            "[JOYBUS] Write Controller Accessory (channel = {})",
            self.current_channel
        );

        let crc = Joybus::calculate_crc(&self.tx_buffer[3..36]);

        self.reset_tx_buffer();

        self.tx_buffer[0] = crc;
        self.first_access = true;

        self.state = State::ReceiveCommand;
    }

    fn calculate_crc(data: &[u8]) -> u8 {
        const POLYNOMIAL: u8 = 0x85;

        let mut crc: u8 = 0;
        for i in 0..=32 {
            for j in (0..8).rev() {
                let mask = if (crc & 0x80) != 0 { POLYNOMIAL } else { 0 };

                crc <<= 1;

                if i != 32 && (data[i] & (1 << j)) != 0 {
                    crc |= 1;
                }

                crc ^= mask;
            }
        }

        crc
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn transmit_byte(joybus: &mut Joybus, controller: &Controller, byte: u8) {
        joybus.write_transmit(byte >> 4, controller).unwrap();
        joybus.write_transmit(byte & 0xf, controller).unwrap();
    }

    fn receive_byte(joybus: &mut Joybus) -> u8 {
        (joybus.read_receive() << 4) | joybus.read_receive()
    }

    #[test]
    fn info_reports_a_standard_controller() {
        let mut joybus = Joybus::new();
        let controller = Controller::new();

        joybus.write_channel(0).unwrap();
        transmit_byte(&mut joybus, &controller, 0x00);

        assert_eq!(receive_byte(&mut joybus), 0x05);
        assert_eq!(receive_byte(&mut joybus), 0x00);
        assert_eq!(receive_byte(&mut joybus), CONTROLLER_NO_PAK);
        assert_eq!(joybus.read_status(), STATUS_CLOCK | STATUS_DEVICE_PRESENT);
    }

    #[test]
    fn controller_state_reflects_the_host_pad() {
        let mut joybus = Joybus::new();
        let mut controller = Controller::new();

        controller.button_a = true;
        controller.button_start = true;
        controller.stick_x = 17;
        controller.stick_y = -5;

        joybus.write_channel(0).unwrap();
        transmit_byte(&mut joybus, &controller, 0x01);

        assert_eq!(receive_byte(&mut joybus), 0x90);
        assert_eq!(receive_byte(&mut joybus), 0x00);
        assert_eq!(receive_byte(&mut joybus), 17);
        assert_eq!(receive_byte(&mut joybus), 0xfb);
    }

    #[test]
    fn empty_channels_report_no_device() {
        let mut joybus = Joybus::new();

        joybus.write_channel(1).unwrap();
        assert_eq!(joybus.read_status(), STATUS_CLOCK);

        assert!(joybus.write_channel(5).is_err());
    }
}
