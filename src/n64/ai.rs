use byteorder::{BigEndian, ByteOrder};
use log::{debug, info};
use serde::{Deserialize, Serialize};

use super::error::Error;
use super::mi::{InterruptSource, Mi};
use super::CPU_FREQUENCY;

#[derive(Clone, Copy, Deserialize, Serialize)]
struct AiDma {
    dramaddr: u32,
    length: u32,
}

impl AiDma {
    pub fn new() -> AiDma {
        AiDma {
            dramaddr: 0,
            length: 0,
        }
    }
}

#[derive(Deserialize, Serialize)]
pub struct Ai {
    dma: [AiDma; 2],
    active_dmas: u32,

    dma_enable: bool,
    dacrate: u32,
    bitrate: u32,

    current_samples: u32,
}

impl Ai {
    pub fn new() -> Ai {
        Ai {
            dma: [AiDma::new(); 2],
            active_dmas: 0,

            dma_enable: false,
            dacrate: 0,
            bitrate: 0,

            current_samples: 0,
        }
    }

    pub fn reset(&mut self) {
        *self = Ai::new();
    }

    pub fn is_enabled(&self) -> bool {
        self.dma_enable
    }

    /// Left/right pair most recently pulled from RDRAM, packed as the guest
    /// wrote it (left in the high half).
    pub fn samples(&self) -> u32 {
        self.current_samples
    }

    /// CPU cycles between two DAC samples at the current DACRATE.
    fn sample_cycles(&self) -> i64 {
        let cycles = (CPU_FREQUENCY / 4 / (self.dacrate as i64 + 1)).max(1);

        (cycles as f64 * 1.037) as i64
    }

    fn status(&self) -> u32 {
        let busy = self.active_dmas > 0;
        let full = self.active_dmas > 1;

        let mut value = 0;

        value |= full as u32;
        value |= (self.dma_enable as u32) << 25;
        value |= (busy as u32) << 30;
        value |= (full as u32) << 31;

        value
    }

    pub fn read_io(&self, offset: u32) -> Result<u32, Error> {
        match offset {
            0x04 => Ok(self.dma[0].length << 3),
            0x0c => Ok(self.status()),
            _ => Err(Error::UnknownIoRead {
                address: 0x0450_0000 + offset,
            }),
        }
    }

    /// Returns the delay until the first sample event when the write starts
    /// the DMA engine.
    pub fn write_io(&mut self, offset: u32, data: u32, mi: &mut Mi) -> Result<Option<i64>, Error> {
        match offset {
            0x00 => {
                debug!("[AI] DRAMADDR write (data = 0x{:08x})", data);

                if self.active_dmas < 2 {
                    self.dma[self.active_dmas as usize].dramaddr = (data >> 3) & 0x1f_ffff;
                }
            }
            0x04 => {
                debug!("[AI] LENGTH write (data = 0x{:08x})", data);

                if self.active_dmas < 2 && data != 0 {
                    self.dma[self.active_dmas as usize].length = (data >> 3) & 0x7fff;

                    self.active_dmas += 1;

                    if self.active_dmas == 1 && self.dma_enable {
                        mi.request_interrupt(InterruptSource::Ai);

                        return Ok(Some(self.sample_cycles()));
                    }
                }
            }
            0x08 => {
                info!("[AI] CONTROL write (data = 0x{:08x})", data);

                self.dma_enable = (data & 1) != 0;

                if !self.dma_enable {
                    self.current_samples = 0;
                }
            }
            0x0c => mi.clear_interrupt(InterruptSource::Ai),
            0x10 => {
                info!("[AI] DACRATE write (data = 0x{:08x})", data);

                self.dacrate = data & 0x3fff;
            }
            0x14 => self.bitrate = data & 0x3fff,
            _ => {
                return Err(Error::UnknownIoWrite {
                    address: 0x0450_0000 + offset,
                    data,
                })
            }
        }

        Ok(None)
    }

    /// Pulls one sample pair out of RDRAM and advances the active DMA.
    /// Returns the delay until the next sample while the engine stays busy.
    pub fn do_sample(&mut self, mi: &mut Mi, ram: &[u8]) -> Option<i64> {
        let paddr = (self.dma[0].dramaddr as usize) << 3;

        self.current_samples = BigEndian::read_u32(&ram[paddr..]);

        self.dma[0].dramaddr += 1;
        self.dma[0].length -= 1;

        if self.dma[0].length == 0 {
            if self.active_dmas > 1 {
                self.dma[0] = self.dma[1];

                mi.request_interrupt(InterruptSource::Ai);
            }

            self.active_dmas -= 1;
        }

        if self.dma[0].length != 0 {
            Some(self.sample_cycles())
        } else {
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn double_buffered_dma_drains_and_interrupts() {
        let mut ai = Ai::new();
        let mut mi = Mi::new();
        let mut ram = vec![0u8; 64].into_boxed_slice();

        BigEndian::write_u32(&mut ram[0..], 0x1111_2222);
        BigEndian::write_u32(&mut ram[8..], 0x3333_4444);

        ai.write_io(0x08, 1, &mut mi).unwrap();
        ai.write_io(0x10, 4, &mut mi).unwrap();

        // First descriptor: one sample at DRAM 0.
        ai.write_io(0x00, 0, &mut mi).unwrap();
        let delay = ai.write_io(0x04, 8, &mut mi).unwrap();
        assert!(delay.is_some());
        assert_eq!(ai.read_io(0x0c).unwrap() >> 30 & 1, 1);

        // Queue a second descriptor: the engine reports full.
        ai.write_io(0x00, 8, &mut mi).unwrap();
        ai.write_io(0x04, 8, &mut mi).unwrap();
        assert_eq!(ai.read_io(0x0c).unwrap() >> 31, 1);

        // First sample drains buffer 0 and swaps in the queued descriptor.
        mi.clear_interrupt(InterruptSource::Ai);
        assert!(ai.do_sample(&mut mi, &ram).is_some());
        assert_eq!(ai.samples(), 0x1111_2222);
        assert_eq!(mi.interrupt() & (1 << 2), 1 << 2);

        // Second sample drains everything; the engine reports idle.
        assert!(ai.do_sample(&mut mi, &ram).is_none());
        assert_eq!(ai.samples(), 0x3333_4444);
        assert_eq!(ai.read_io(0x0c).unwrap() >> 30 & 1, 0);
    }
}
