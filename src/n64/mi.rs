use log::{debug, info, trace, warn};
use serde::{Deserialize, Serialize};

use super::error::Error;

const VERSION: u32 = 0x0202_0102;

const INTERRUPT_MASK: u32 = 0x3f;

#[derive(Clone, Copy, Debug)]
pub enum InterruptSource {
    Sp = 0,
    Si = 1,
    Ai = 2,
    Vi = 3,
    Pi = 4,
    Dp = 5,
}

/// Decodes the two-bit "no change / clear / set" field the RCP uses on most
/// of its control registers.
pub fn write_toggle(current: bool, field: u32) -> bool {
    match field & 3 {
        0 | 3 => current,
        1 => false,
        2 => true,
        _ => unreachable!(),
    }
}

#[derive(Deserialize, Serialize)]
struct Mode {
    repeat_count: u32,

    repeat_mode: bool,
    ebus_mode: bool,
    upper_mode: bool,
}

impl Mode {
    pub fn new() -> Mode {
        Mode {
            repeat_count: 1,

            repeat_mode: false,
            ebus_mode: false,
            upper_mode: false,
        }
    }

    pub fn read(&self) -> u32 {
        let mut value = 0;

        value |= self.repeat_count.wrapping_sub(1) & 0x7f;
        value |= (self.repeat_mode as u32) << 7;
        value |= (self.ebus_mode as u32) << 8;
        value |= (self.upper_mode as u32) << 9;

        value
    }

    pub fn write(&mut self, value: u32) {
        self.repeat_count = (value & 0x7f) + 1;

        self.repeat_mode = write_toggle(self.repeat_mode, value >> 7);
        self.ebus_mode = write_toggle(self.ebus_mode, value >> 9);
        self.upper_mode = write_toggle(self.upper_mode, value >> 12);

        if self.repeat_mode {
            warn!("[MI] Repeat mode enabled (repeat count = {})", self.repeat_count);
        }
    }
}

#[derive(Deserialize, Serialize)]
pub struct Mi {
    mode: Mode,
    interrupt: u32,
    mask: u32,

    cpu_line: bool,
}

impl Mi {
    pub fn new() -> Mi {
        Mi {
            mode: Mode::new(),
            interrupt: 0,
            mask: 0,

            cpu_line: false,
        }
    }

    pub fn reset(&mut self) {
        self.mode = Mode::new();
        self.interrupt = 0;
        self.mask = 0;
        self.cpu_line = false;
    }

    /// State of the aggregated external interrupt line into the CPU.
    pub fn cpu_line(&self) -> bool {
        self.cpu_line
    }

    pub fn interrupt(&self) -> u32 {
        self.interrupt
    }

    pub fn request_interrupt(&mut self, source: InterruptSource) {
        trace!("[MI] {:?} interrupt requested", source);

        self.interrupt |= 1 << source as u32;

        self.update_cpu_line();
    }

    pub fn clear_interrupt(&mut self, source: InterruptSource) {
        self.interrupt &= !(1 << source as u32);

        self.update_cpu_line();
    }

    fn update_cpu_line(&mut self) {
        self.cpu_line = (self.interrupt & self.mask & INTERRUPT_MASK) != 0;
    }

    pub fn read_io(&self, offset: u32) -> Result<u32, Error> {
        match offset {
            0x00 => Ok(self.mode.read()),
            0x04 => Ok(VERSION),
            0x08 => Ok(self.interrupt),
            0x0c => Ok(self.mask),
            _ => Err(Error::UnknownIoRead {
                address: 0x0430_0000 + offset,
            }),
        }
    }

    pub fn write_io(&mut self, offset: u32, data: u32) -> Result<(), Error> {
        match offset {
            0x00 => {
                info!("[MI] MODE write (data = 0x{:08x})", data);

                self.mode.write(data);
            }
            0x0c => {
                debug!("[MI] MASK write (data = 0x{:08x})", data);

                for source in 0..6 {
                    let enable = (self.mask & (1 << source)) != 0;
                    let enable = write_toggle(enable, data >> (2 * source));

                    self.mask = (self.mask & !(1 << source)) | ((enable as u32) << source);
                }

                self.update_cpu_line();
            }
            _ => {
                return Err(Error::UnknownIoWrite {
                    address: 0x0430_0000 + offset,
                    data,
                })
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pending_follows_mask() {
        let mut mi = Mi::new();

        mi.request_interrupt(InterruptSource::Pi);
        assert!(!mi.cpu_line());

        // MASK write: set PI enable (2-bit field at bits 9:8, value 2 = set)
        mi.write_io(0x0c, 2 << 8).unwrap();
        assert!(mi.cpu_line());

        mi.clear_interrupt(InterruptSource::Pi);
        assert!(!mi.cpu_line());

        mi.request_interrupt(InterruptSource::Pi);
        assert!(mi.cpu_line());

        // Clear the mask bit again: line drops even though the source pends.
        mi.write_io(0x0c, 1 << 8).unwrap();
        assert!(!mi.cpu_line());
        assert_eq!(mi.read_io(0x08).unwrap(), 1 << 4);
    }

    #[test]
    fn every_source_toggles_its_own_line() {
        use InterruptSource::*;

        for (i, source) in [Sp, Si, Ai, Vi, Pi, Dp].into_iter().enumerate() {
            let mut mi = Mi::new();

            mi.write_io(0x0c, 2 << (2 * i)).unwrap();

            mi.request_interrupt(source);
            assert!(mi.cpu_line());

            mi.clear_interrupt(source);
            assert!(!mi.cpu_line());
        }
    }
}
