use log::{debug, info};
use serde::{Deserialize, Serialize};

use super::error::Error;
use super::mi::{InterruptSource, Mi};

pub const FORMAT_BLANK: u32 = 0;
pub const FORMAT_RGBA5551: u32 = 2;
pub const FORMAT_RGBA8888: u32 = 3;

const DEFAULT_HALFLINES: u32 = 525;

#[derive(Deserialize, Serialize)]
pub struct Vi {
    control: u32,
    origin: u32,
    width: u32,
    intr: u32,
    current: u32,
    burst: u32,
    vsync: u32,
    hsync: u32,
    leap: u32,
    hstart: u32,
    vstart: u32,
    vburst: u32,
    xscale: u32,
    yscale: u32,
}

impl Vi {
    pub fn new() -> Vi {
        Vi {
            control: 0,
            origin: 0,
            width: 0,
            intr: 0,
            current: 0,
            burst: 0,
            vsync: 0,
            hsync: 0,
            leap: 0,
            hstart: 0,
            vstart: 0,
            vburst: 0,
            xscale: 0,
            yscale: 0,
        }
    }

    pub fn reset(&mut self) {
        *self = Vi::new();
    }

    pub fn format(&self) -> u32 {
        self.control & 3
    }

    pub fn origin(&self) -> u32 {
        self.origin & 0x00ff_ffff
    }

    pub fn width(&self) -> u32 {
        self.width & 0xfff
    }

    /// Framebuffer height for the active width, per the resolution table.
    pub fn height(&self) -> u32 {
        match self.width() {
            640 => 512,
            _ => 256,
        }
    }

    fn halflines(&self) -> u32 {
        match self.vsync & 0x3ff {
            0 => DEFAULT_HALFLINES,
            halflines => halflines,
        }
    }

    /// Advances the beam by one halfline. Returns true when the field wraps
    /// and the framebuffer is ready to present.
    pub fn tick_halfline(&mut self, mi: &mut Mi) -> bool {
        self.current += 1;

        if self.current >= self.halflines() {
            self.current = 0;
        }

        if self.current == (self.intr & 0x3ff) {
            mi.request_interrupt(InterruptSource::Vi);
        }

        self.current == 0
    }

    pub fn read_io(&self, offset: u32) -> Result<u32, Error> {
        match offset {
            0x00 => Ok(self.control),
            0x04 => Ok(self.origin),
            0x08 => Ok(self.width),
            0x0c => Ok(self.intr),
            0x10 => Ok(self.current & 0x3ff),
            0x18 => Ok(self.vsync),
            _ => Err(Error::UnknownIoRead {
                address: 0x0440_0000 + offset,
            }),
        }
    }

    pub fn write_io(&mut self, offset: u32, data: u32, mi: &mut Mi) -> Result<(), Error> {
        match offset {
            0x00 => {
                info!("[VI] CONTROL write (data = 0x{:08x})", data);

                self.control = data;
            }
            0x04 => {
                debug!("[VI] ORIGIN write (data = 0x{:08x})", data);

                self.origin = data;
            }
            0x08 => {
                info!("[VI] WIDTH write (data = 0x{:08x})", data);

                self.width = data;
            }
            0x0c => self.intr = data,
            0x10 => mi.clear_interrupt(InterruptSource::Vi),
            0x14 => self.burst = data,
            0x18 => self.vsync = data,
            0x1c => self.hsync = data,
            0x20 => self.leap = data,
            0x24 => self.hstart = data,
            0x28 => self.vstart = data,
            0x2c => self.vburst = data,
            0x30 => self.xscale = data,
            0x34 => self.yscale = data,
            _ => {
                return Err(Error::UnknownIoWrite {
                    address: 0x0440_0000 + offset,
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
    fn halfline_interrupt_and_wrap() {
        let mut vi = Vi::new();
        let mut mi = Mi::new();

        // Enable the VI interrupt source, raster interrupt on halfline 2.
        mi.write_io(0x0c, 2 << 6).unwrap();
        vi.write_io(0x0c, 2, &mut mi).unwrap();
        vi.write_io(0x18, 4, &mut mi).unwrap();

        assert!(!vi.tick_halfline(&mut mi));
        assert!(!vi.tick_halfline(&mut mi));
        assert!(mi.cpu_line());

        // CURRENT write acknowledges the interrupt.
        vi.write_io(0x10, 0, &mut mi).unwrap();
        assert!(!mi.cpu_line());

        assert!(!vi.tick_halfline(&mut mi));
        assert!(vi.tick_halfline(&mut mi));
        assert_eq!(vi.read_io(0x10).unwrap(), 0);
    }

    #[test]
    fn height_follows_width() {
        let mut vi = Vi::new();
        let mut mi = Mi::new();

        vi.write_io(0x08, 320, &mut mi).unwrap();
        assert_eq!(vi.height(), 256);

        vi.write_io(0x08, 640, &mut mi).unwrap();
        assert_eq!(vi.height(), 512);
    }
}
