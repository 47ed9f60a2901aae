use log::{debug, trace};
use serde::{Deserialize, Serialize};

use super::error::Error;
use super::mi::{write_toggle, InterruptSource, Mi};

const SPADDR_MASK: u32 = 0x0000_1ff8;
const RAMADDR_MASK: u32 = 0x00ff_fff8;
const LEN_MASK: u32 = 0xff8f_fff8;

const SIG_NUM: u32 = 8;

/// SP transfer length register: 64-bit elements per row, row count, and the
/// RDRAM element skip between rows.
#[derive(Clone, Copy)]
struct Len(u32);

impl Len {
    pub fn length(&self) -> usize {
        ((self.0 >> 3) & 0x1ff) as usize + 1
    }

    pub fn count(&self) -> usize {
        ((self.0 >> 12) & 0xff) as usize + 1
    }

    pub fn skip(&self) -> usize {
        ((self.0 >> 23) & 0x1ff) as usize
    }
}

#[derive(Deserialize, Serialize)]
pub struct Sp {
    spaddr: u32,
    ramaddr: u32,
    rdlen: u32,
    wrlen: u32,

    halted: bool,
    broke: bool,
    single_step: bool,
    interrupt_on_break: bool,
    sig: u8,

    semaphore: bool,
}

impl Sp {
    pub fn new() -> Sp {
        Sp {
            spaddr: 0,
            ramaddr: 0,
            rdlen: 0,
            wrlen: 0,

            halted: true,
            broke: false,
            single_step: false,
            interrupt_on_break: false,
            sig: 0,

            semaphore: false,
        }
    }

    pub fn reset(&mut self) {
        *self = Sp::new();
    }

    pub fn is_halted(&self) -> bool {
        self.halted
    }

    /// BREAK from the RSP: halt and latch the broke flag.
    pub fn do_break(&mut self, mi: &mut Mi) {
        self.halted = true;
        self.broke = true;

        if self.interrupt_on_break {
            mi.request_interrupt(InterruptSource::Sp);
        }
    }

    fn status(&self) -> u32 {
        let mut value = 0;

        value |= self.halted as u32;
        value |= (self.broke as u32) << 1;
        value |= (self.single_step as u32) << 5;
        value |= (self.interrupt_on_break as u32) << 6;
        value |= (self.sig as u32) << 7;

        value
    }

    fn spaddr_index(&self) -> usize {
        ((self.spaddr >> 3) & 0x1ff) as usize
    }

    fn is_imem(&self) -> bool {
        (self.spaddr & 0x1000) != 0
    }

    /// Block DMA between RDRAM and RSP local memory in 64-bit elements. The
    /// local address wraps modulo 4 KiB; the RDRAM side skips between rows.
    fn do_dma(
        &mut self,
        to_rsp: bool,
        len: Len,
        ram: &mut [u8],
        dmem: &mut [u8],
        imem: &mut [u8],
    ) {
        let spmem = if self.is_imem() { imem } else { dmem };

        let length = len.length();
        let count = len.count();
        let skip = len.skip();

        let mut spaddr = self.spaddr_index();
        let mut dram = ((self.ramaddr >> 3) & 0x1f_ffff) as usize;

        trace!(
            "[SP] DMA {} RSP {} (RSP address = 0x{:03x}, DRAM address = 0x{:08x}, length = {}, count = {}, skip = {})",
            if to_rsp { "to" } else { "from" },
            if self.is_imem() { "IMEM" } else { "DMEM" },
            8 * spaddr,
            8 * dram,
            length,
            count,
            skip
        );

        for _ in 0..count {
            for _ in 0..length {
                if to_rsp {
                    spmem[8 * spaddr..8 * spaddr + 8]
                        .copy_from_slice(&ram[8 * dram..8 * dram + 8]);
                } else {
                    ram[8 * dram..8 * dram + 8]
                        .copy_from_slice(&spmem[8 * spaddr..8 * spaddr + 8]);
                }

                spaddr = (spaddr + 1) & 0x1ff;
                dram += 1;
            }

            dram += skip;
        }

        // Final register values as the hardware leaves them.
        let start = ((self.ramaddr >> 3) & 0x1f_ffff) as usize;
        let end = start + (count - 1) * (length + skip) + length;

        self.ramaddr = (end as u32) << 3;
        self.spaddr = (self.spaddr & 0x1000) | ((spaddr as u32) << 3);
    }

    pub fn read_io(&mut self, offset: u32) -> Result<u32, Error> {
        match offset {
            0x00 => Ok(self.spaddr),
            0x04 => Ok(self.ramaddr),
            0x08 => Ok(self.rdlen),
            0x0c => Ok(self.wrlen),
            0x10 => Ok(self.status()),
            0x14 => Ok(0),
            0x18 => Ok(0),
            0x1c => {
                let value = self.semaphore as u32;

                self.semaphore = true;

                Ok(value)
            }
            _ => Err(Error::UnknownIoRead {
                address: 0x0404_0000 + offset,
            }),
        }
    }

    pub fn write_io(
        &mut self,
        offset: u32,
        data: u32,
        mi: &mut Mi,
        ram: &mut [u8],
        dmem: &mut [u8],
        imem: &mut [u8],
    ) -> Result<(), Error> {
        match offset {
            0x00 => self.spaddr = data & SPADDR_MASK,
            0x04 => self.ramaddr = data & RAMADDR_MASK,
            0x08 => {
                self.rdlen = data & LEN_MASK;

                self.do_dma(true, Len(self.rdlen), ram, dmem, imem);

                self.rdlen = 0xff8;
            }
            0x0c => {
                self.wrlen = data & LEN_MASK;

                self.do_dma(false, Len(self.wrlen), ram, dmem, imem);

                self.wrlen = 0xff8;
            }
            0x10 => {
                debug!("[SP] STATUS write (data = 0x{:08x})", data);

                self.halted = write_toggle(self.halted, data);

                if (data & (1 << 2)) != 0 {
                    self.broke = false;
                }

                match (data >> 3) & 3 {
                    0 | 3 => {}
                    1 => mi.clear_interrupt(InterruptSource::Sp),
                    2 => mi.request_interrupt(InterruptSource::Sp),
                    _ => unreachable!(),
                }

                self.single_step = write_toggle(self.single_step, data >> 5);
                self.interrupt_on_break = write_toggle(self.interrupt_on_break, data >> 7);

                for signal in 0..SIG_NUM {
                    let set = (self.sig & (1 << signal)) != 0;
                    let set = write_toggle(set, data >> (9 + 2 * signal));

                    self.sig = (self.sig & !(1 << signal)) | ((set as u8) << signal);
                }
            }
            0x1c => self.semaphore = (data & 1) != 0,
            _ => {
                return Err(Error::UnknownIoWrite {
                    address: 0x0404_0000 + offset,
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
    fn dmem_dma_round_trips() {
        let mut sp = Sp::new();
        let mut mi = Mi::new();

        let mut ram = vec![0u8; 0x1000];
        let mut dmem = vec![0u8; 0x1000];
        let mut imem = vec![0u8; 0x1000];

        for (i, byte) in dmem.iter_mut().enumerate() {
            *byte = i as u8;
        }

        // DMEM -> RAM: length 32 bytes, count 1, skip 0.
        sp.write_io(0x00, 0, &mut mi, &mut ram, &mut dmem, &mut imem).unwrap();
        sp.write_io(0x04, 0x200, &mut mi, &mut ram, &mut dmem, &mut imem).unwrap();
        sp.write_io(0x0c, 31, &mut mi, &mut ram, &mut dmem, &mut imem).unwrap();

        assert_eq!(&ram[0x200..0x220], &dmem[0..0x20]);

        // RAM -> DMEM at a different local address: bytes survive the trip.
        sp.write_io(0x00, 0x100, &mut mi, &mut ram, &mut dmem, &mut imem).unwrap();
        sp.write_io(0x04, 0x200, &mut mi, &mut ram, &mut dmem, &mut imem).unwrap();
        sp.write_io(0x08, 31, &mut mi, &mut ram, &mut dmem, &mut imem).unwrap();

        assert_eq!(dmem[0x100..0x120], dmem[0..0x20]);

        // Post-DMA register values.
        assert_eq!(sp.read_io(0x04).unwrap(), 0x220);
        assert_eq!(sp.read_io(0x08).unwrap(), 0xff8);
    }

    #[test]
    fn status_write_toggles_and_break() {
        let mut sp = Sp::new();
        let mut mi = Mi::new();

        let mut ram = vec![0u8; 8];
        let mut dmem = vec![0u8; 8];
        let mut imem = vec![0u8; 8];

        assert!(sp.is_halted());

        // Clear halt, enable interrupt-on-break.
        sp.write_io(0x10, 1 | (2 << 7), &mut mi, &mut ram, &mut dmem, &mut imem).unwrap();
        assert!(!sp.is_halted());

        mi.write_io(0x0c, 2).unwrap();
        sp.do_break(&mut mi);
        assert!(sp.is_halted());
        assert!(mi.cpu_line());
        assert_eq!(sp.read_io(0x10).unwrap() & 3, 3);

        // Acknowledge: clear broke and the interrupt.
        sp.write_io(0x10, (1 << 2) | (1 << 3), &mut mi, &mut ram, &mut dmem, &mut imem).unwrap();
        assert!(!mi.cpu_line());
        assert_eq!(sp.read_io(0x10).unwrap() & 3, 1);
    }

    #[test]
    fn semaphore_is_test_and_set() {
        let mut sp = Sp::new();

        assert_eq!(sp.read_io(0x1c).unwrap(), 0);
        assert_eq!(sp.read_io(0x1c).unwrap(), 1);
    }
}
