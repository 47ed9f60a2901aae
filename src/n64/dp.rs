use log::debug;
use serde::{Deserialize, Serialize};

use super::error::Error;
use super::mi::{write_toggle, Mi};
use super::rdp::Rdp;

#[derive(Deserialize, Serialize)]
pub struct Dp {
    start: u32,
    end: u32,

    xbus: bool,
    freeze: bool,
    flush: bool,
    tmem_busy: bool,
    pipe_busy: bool,
    buf_busy: bool,
}

impl Dp {
    pub fn new() -> Dp {
        Dp {
            start: 0,
            end: 0,

            xbus: false,
            freeze: false,
            flush: false,
            tmem_busy: false,
            pipe_busy: false,
            buf_busy: false,
        }
    }

    pub fn reset(&mut self) {
        *self = Dp::new();
    }

    fn status(&self) -> u32 {
        let mut value = 0;

        value |= self.xbus as u32;
        value |= (self.freeze as u32) << 1;
        value |= (self.flush as u32) << 2;
        value |= (self.tmem_busy as u32) << 4;
        value |= (self.pipe_busy as u32) << 5;
        value |= (self.buf_busy as u32) << 6;

        value
    }

    pub fn read_io(&self, offset: u32) -> Result<u32, Error> {
        match offset {
            0x00 => Ok(self.start),
            0x04 => Ok(self.end),
            // Command fetch is instant: CURRENT tracks END.
            0x08 => Ok(self.end),
            0x0c => Ok(self.status()),
            _ => Err(Error::UnknownIoRead {
                address: 0x0410_0000 + offset,
            }),
        }
    }

    pub fn write_io(
        &mut self,
        offset: u32,
        data: u32,
        mi: &mut Mi,
        rdp: &mut Rdp,
        ram: &mut [u8],
    ) -> Result<(), Error> {
        match offset {
            0x00 => {
                debug!("[DP] START write (data = 0x{:08x})", data);

                self.start = data & 0x00ff_ffff;
            }
            0x04 => {
                self.end = data & 0x00ff_ffff;

                self.start = rdp.process_command_list(self.start, self.end, mi, ram)?;
            }
            0x0c => {
                self.xbus = write_toggle(self.xbus, data);
                self.freeze = write_toggle(self.freeze, data >> 2);
                self.flush = write_toggle(self.flush, data >> 4);

                if (data & (1 << 6)) != 0 {
                    self.tmem_busy = false;
                }

                if (data & (1 << 7)) != 0 {
                    self.pipe_busy = false;
                }

                if (data & (1 << 8)) != 0 {
                    self.buf_busy = false;
                }
            }
            _ => {
                return Err(Error::UnknownIoWrite {
                    address: 0x0410_0000 + offset,
                    data,
                })
            }
        }

        Ok(())
    }
}
