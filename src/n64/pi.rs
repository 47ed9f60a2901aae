use log::{debug, info};
use serde::{Deserialize, Serialize};

use super::error::Error;
use super::mi::{InterruptSource, Mi};

#[derive(Clone, Copy, Deserialize, Serialize)]
struct Domain {
    latch: u32,
    pulse_width: u32,
    page_size: u32,
    release: u32,
}

impl Domain {
    pub fn new() -> Domain {
        Domain {
            latch: 0,
            pulse_width: 0,
            page_size: 0,
            release: 0,
        }
    }
}

#[derive(Deserialize, Serialize)]
pub struct Pi {
    dramaddr: u32,
    cartaddr: u32,
    wrlen: u32,

    dma_busy: bool,
    io_busy: bool,
    error: bool,

    dom: [Domain; 2],
}

impl Pi {
    pub fn new() -> Pi {
        Pi {
            dramaddr: 0,
            cartaddr: 0,
            wrlen: 0,

            dma_busy: false,
            io_busy: false,
            error: false,

            dom: [Domain::new(); 2],
        }
    }

    pub fn reset(&mut self) {
        *self = Pi::new();
    }

    fn status(&self) -> u32 {
        (self.dma_busy as u32) | ((self.io_busy as u32) << 1) | ((self.error as u32) << 2)
    }

    /// Cartridge to RDRAM block copy. Both backings hold the guest byte
    /// image, so the transfer is a straight byte copy.
    fn do_dma_to_ram(&mut self, mi: &mut Mi, ram: &mut [u8], cart: &[u8]) {
        let cartaddr = (self.cartaddr & 0x0fff_ffff) as usize;
        let dramaddr = (self.dramaddr & 0x00ff_ffff) as usize;
        let len = (self.wrlen & 0x00ff_ffff) as usize + 1;

        debug!(
            "[PI] DMA to RAM (cart address = 0x{:08x}, DRAM address = 0x{:08x}, length = {})",
            cartaddr, dramaddr, len
        );

        ram[dramaddr..dramaddr + len].copy_from_slice(&cart[cartaddr..cartaddr + len]);

        self.dma_busy = false;

        mi.request_interrupt(InterruptSource::Pi);
    }

    pub fn read_io(&self, offset: u32) -> Result<u32, Error> {
        match offset {
            0x00 => Ok(self.dramaddr),
            0x04 => Ok(self.cartaddr),
            0x10 => Ok(self.status()),
            0x14 => Ok(self.dom[0].latch),
            0x18 => Ok(self.dom[0].pulse_width),
            0x1c => Ok(self.dom[0].page_size),
            0x20 => Ok(self.dom[0].release),
            0x24 => Ok(self.dom[1].latch),
            0x28 => Ok(self.dom[1].pulse_width),
            0x2c => Ok(self.dom[1].page_size),
            0x30 => Ok(self.dom[1].release),
            _ => Err(Error::UnknownIoRead {
                address: 0x0460_0000 + offset,
            }),
        }
    }

    pub fn write_io(
        &mut self,
        offset: u32,
        data: u32,
        mi: &mut Mi,
        ram: &mut [u8],
        cart: &[u8],
    ) -> Result<(), Error> {
        match offset {
            0x00 => {
                debug!("[PI] DRAMADDR write (data = 0x{:08x})", data);

                self.dramaddr = data & 0x00ff_ffff;
            }
            0x04 => {
                debug!("[PI] CARTADDR write (data = 0x{:08x})", data);

                self.cartaddr = data;
            }
            0x0c => {
                self.wrlen = data & 0x00ff_ffff;

                self.do_dma_to_ram(mi, ram, cart);
            }
            0x10 => {
                if (data & 1) != 0 {
                    info!("[PI] DMA controller reset");
                }

                if (data & 2) != 0 {
                    mi.clear_interrupt(InterruptSource::Pi);
                }
            }
            0x14 => self.dom[0].latch = data & 0xff,
            0x18 => self.dom[0].pulse_width = data & 0xff,
            0x1c => self.dom[0].page_size = data & 0xf,
            0x20 => self.dom[0].release = data & 3,
            0x24 => self.dom[1].latch = data & 0xff,
            0x28 => self.dom[1].pulse_width = data & 0xff,
            0x2c => self.dom[1].page_size = data & 0xf,
            0x30 => self.dom[1].release = data & 3,
            _ => {
                return Err(Error::UnknownIoWrite {
                    address: 0x0460_0000 + offset,
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
    fn cart_dma_copies_bytes_and_interrupts() {
        let mut pi = Pi::new();
        let mut mi = Mi::new();

        let cart: Vec<u8> = (0u32..256).map(|i| i as u8).collect();
        let mut ram = vec![0u8; 0x1000];

        pi.write_io(0x00, 0x100, &mut mi, &mut ram, &cart).unwrap();
        pi.write_io(0x04, 0x1000_0000, &mut mi, &mut ram, &cart).unwrap();
        pi.write_io(0x0c, 63, &mut mi, &mut ram, &cart).unwrap();

        assert_eq!(&ram[0x100..0x140], &cart[0..64]);
        assert_eq!(mi.interrupt() & (1 << 4), 1 << 4);
        assert_eq!(pi.read_io(0x10).unwrap() & 1, 0);

        // Acknowledge through STATUS.
        pi.write_io(0x10, 2, &mut mi, &mut ram, &cart).unwrap();
        assert_eq!(mi.interrupt() & (1 << 4), 0);
    }
}
