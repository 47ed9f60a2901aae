use log::debug;
use serde::{Deserialize, Serialize};

use super::error::Error;
use super::mi::{InterruptSource, Mi};
use super::pif::Pif;

#[derive(Clone, Copy, Debug, Deserialize, PartialEq, Serialize)]
pub enum SiDirection {
    FromPif,
    ToPif,
}

#[derive(Deserialize, Serialize)]
pub struct Si {
    dramaddr: u32,
    rd64b: u32,
    wr64b: u32,

    dma_busy: bool,

    /// Transfer posted by the CPU, executed when the PIF next halts.
    pending: Option<SiDirection>,
}

impl Si {
    pub fn new() -> Si {
        Si {
            dramaddr: 0,
            rd64b: 0,
            wr64b: 0,

            dma_busy: false,

            pending: None,
        }
    }

    pub fn reset(&mut self) {
        *self = Si::new();
    }

    pub fn take_pending(&mut self) -> Option<SiDirection> {
        self.pending.take()
    }

    fn status(&self) -> u32 {
        self.dma_busy as u32
    }

    fn start_dma(&mut self, direction: SiDirection, pif: &mut Pif) {
        debug!(
            "[SI] DMA {:?} requested (DRAM address = 0x{:08x})",
            direction, self.dramaddr
        );

        self.dma_busy = true;
        self.pending = Some(direction);

        pif.set_interrupt_a();
        pif.set_rcp_port(direction == SiDirection::FromPif, true);
    }

    /// Runs the posted 64-byte transfer against the PIF mailbox. Both sides
    /// hold the guest byte image, so the copy is byte-for-byte.
    pub fn do_dma(&mut self, direction: SiDirection, mi: &mut Mi, pif: &mut Pif, ram: &mut [u8]) {
        let dramaddr = (self.dramaddr & 0x00ff_ffff) as usize;

        match direction {
            SiDirection::FromPif => {
                let pifaddr = ((self.rd64b << 2) & 0x3f) as usize;

                debug!(
                    "[SI] DMA from PIF (DRAM address = 0x{:08x}, PIF RAM address = 0x{:02x})",
                    dramaddr, pifaddr
                );

                ram[dramaddr..dramaddr + 64].copy_from_slice(&pif.ram()[pifaddr..pifaddr + 64]);
            }
            SiDirection::ToPif => {
                let pifaddr = ((self.wr64b << 2) & 0x3f) as usize;

                debug!(
                    "[SI] DMA to PIF (DRAM address = 0x{:08x}, PIF RAM address = 0x{:02x})",
                    dramaddr, pifaddr
                );

                pif.ram_mut()[pifaddr..pifaddr + 64].copy_from_slice(&ram[dramaddr..dramaddr + 64]);
            }
        }

        self.dma_busy = false;
        self.dramaddr += 64;

        pif.set_interrupt_a();

        mi.request_interrupt(InterruptSource::Si);
    }

    pub fn read_io(&self, offset: u32) -> Result<u32, Error> {
        match offset {
            0x00 => Ok(self.dramaddr),
            0x18 => Ok(self.status()),
            _ => Err(Error::UnknownIoRead {
                address: 0x0480_0000 + offset,
            }),
        }
    }

    pub fn write_io(
        &mut self,
        offset: u32,
        data: u32,
        mi: &mut Mi,
        pif: &mut Pif,
    ) -> Result<(), Error> {
        match offset {
            0x00 => self.dramaddr = data & 0x00ff_ffff,
            0x04 => {
                self.rd64b = (data >> 2) & 0x3fff_ffff;

                self.start_dma(SiDirection::FromPif, pif);
            }
            0x10 => {
                self.wr64b = (data >> 2) & 0x3fff_ffff;

                self.start_dma(SiDirection::ToPif, pif);
            }
            0x18 => mi.clear_interrupt(InterruptSource::Si),
            _ => {
                return Err(Error::UnknownIoWrite {
                    address: 0x0480_0000 + offset,
                    data,
                })
            }
        }

        Ok(())
    }
}
