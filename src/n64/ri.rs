use log::{debug, info, warn};
use serde::{Deserialize, Serialize};

use super::error::Error;

const MODULE_NUM: usize = 2;

const REGISTER_MASK: u32 = 0x03f0_03ff;

const RDRAM_DEVICE_ID: u32 = 0x03f0_0004;
const RDRAM_DELAY: u32 = 0x03f0_0008;
const RDRAM_MODE: u32 = 0x03f0_000c;
const RDRAM_REF_ROW: u32 = 0x03f0_0014;

/// One RDRAM module on the fabric. The device ID register scatters its bits
/// across the word; `id()` reassembles the match field.
#[derive(Clone, Copy, Deserialize, Serialize)]
struct Module {
    device_id: u32,
    delay: u32,
    mode: u32,
    ref_row: u32,
}

impl Module {
    pub fn new() -> Module {
        Module {
            device_id: 0,
            delay: 0,
            mode: 0,
            ref_row: 0,
        }
    }

    pub fn id(&self) -> u32 {
        let id_lo = (self.device_id >> 26) & 0x3f;
        let id_mid_lo = (self.device_id >> 23) & 1;
        let id_mid_hi = (self.device_id >> 8) & 0xff;
        let id_hi = (self.device_id >> 7) & 1;

        id_lo | (id_mid_lo << 6) | (id_mid_hi << 7) | (id_hi << 15)
    }
}

#[derive(Deserialize, Serialize)]
pub struct Ri {
    mode: u32,
    config: u32,
    select: u32,
    refresh: u32,

    modules: [Module; MODULE_NUM],
}

impl Ri {
    pub fn new() -> Ri {
        Ri {
            mode: 0,
            config: 0,
            select: 0,
            refresh: 0,

            modules: [Module::new(); MODULE_NUM],
        }
    }

    pub fn reset(&mut self) {
        *self = Ri::new();
    }

    /// Maps a fabric address onto the module register space. The row bits
    /// appear twice in the decoded address.
    fn module_address(ioaddr: u32) -> u32 {
        let addr_lo = ioaddr & 0x3ff;
        let addr_hi = (ioaddr >> 10) & 0x1ff;

        (addr_hi << 20) | (addr_hi << 11) | addr_lo
    }

    fn module_index(&self, module_addr: u32) -> Option<usize> {
        (0..MODULE_NUM).find(|&i| (module_addr >> 20) == self.modules[i].id())
    }

    pub fn read_io(&self, offset: u32) -> Result<u32, Error> {
        match offset {
            0x00 => Ok(self.mode),
            0x04 => Ok(self.config),
            0x0c => Ok(self.select),
            0x10 => Ok(self.refresh),
            _ => Err(Error::UnknownIoRead {
                address: 0x0470_0000 + offset,
            }),
        }
    }

    pub fn write_io(&mut self, offset: u32, data: u32) -> Result<(), Error> {
        match offset {
            0x00 => {
                info!("[RI] MODE write (data = 0x{:08x})", data);

                self.mode = data;
            }
            0x04 => self.config = data,
            0x08 => info!("[RI] CURRENTLOAD write (data = 0x{:08x})", data),
            0x0c => {
                info!("[RI] SELECT write (data = 0x{:08x})", data);

                self.select = data;
            }
            0x10 => self.refresh = data,
            _ => {
                return Err(Error::UnknownIoWrite {
                    address: 0x0470_0000 + offset,
                    data,
                })
            }
        }

        Ok(())
    }

    pub fn read_rdram(&self, ioaddr: u32) -> Result<u32, Error> {
        let module_addr = Ri::module_address(ioaddr);

        let Some(index) = self.module_index(module_addr) else {
            warn!("[RI] No module responded to read (address = 0x{:08x})", ioaddr);

            return Ok(0);
        };

        match ioaddr & REGISTER_MASK {
            RDRAM_MODE => Ok(self.modules[index].mode),
            _ => Err(Error::UnknownIoRead { address: ioaddr }),
        }
    }

    pub fn write_rdram(&mut self, ioaddr: u32, data: u32) -> Result<(), Error> {
        // The alias at +0x80000 is a broadcast onto every module.
        if (ioaddr & (1 << 19)) != 0 {
            return self.write_rdram_broadcast(ioaddr, data);
        }

        let module_addr = Ri::module_address(ioaddr);

        let Some(index) = self.module_index(module_addr) else {
            warn!(
                "[RI] No module responded to write (address = 0x{:08x}, data = 0x{:08x})",
                ioaddr, data
            );

            return Ok(());
        };

        let module = &mut self.modules[index];

        match ioaddr & REGISTER_MASK {
            RDRAM_DEVICE_ID => {
                module.device_id = data;

                debug!("[RI] Module {} device ID = 0x{:04x}", index, module.id());
            }
            RDRAM_MODE => module.mode = data,
            _ => return Err(Error::UnknownIoWrite { address: ioaddr, data }),
        }

        Ok(())
    }

    fn write_rdram_broadcast(&mut self, ioaddr: u32, data: u32) -> Result<(), Error> {
        match ioaddr & REGISTER_MASK {
            RDRAM_DEVICE_ID => {
                debug!("[RI] Broadcast DeviceID write (data = 0x{:08x})", data);

                for module in self.modules.iter_mut() {
                    module.device_id = data;
                }
            }
            RDRAM_DELAY => {
                debug!("[RI] Broadcast Delay write (data = 0x{:08x})", data);

                for module in self.modules.iter_mut() {
                    if module.delay == 0 {
                        // IPL3 rotates this value by 16 during boot.
                        module.delay = data.rotate_left(16);
                    } else {
                        module.delay = data;
                    }
                }
            }
            RDRAM_MODE => {
                for module in self.modules.iter_mut() {
                    module.mode = data;
                }
            }
            RDRAM_REF_ROW => {
                for module in self.modules.iter_mut() {
                    module.ref_row = data;
                }
            }
            _ => return Err(Error::UnknownIoWrite { address: ioaddr, data }),
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn broadcast_then_addressed_module_access() {
        let mut ri = Ri::new();

        // Broadcast a device ID of zero, then set module modes via broadcast.
        ri.write_rdram(0x03f8_0004, 0).unwrap();
        ri.write_rdram(0x03f8_000c, 0x1234_5678).unwrap();

        // Module address 0 decodes to device ID 0: module 0 responds.
        assert_eq!(ri.read_rdram(0x03f0_000c).unwrap(), 0x1234_5678);
    }

    #[test]
    fn first_broadcast_delay_write_is_rotated() {
        let mut ri = Ri::new();

        ri.write_rdram(0x03f8_0008, 0xaaaa_bbbb).unwrap();

        // A second write lands verbatim.
        ri.write_rdram(0x03f8_0008, 0xccccdddd).unwrap();
        ri.write_rdram(0x03f8_0004, 0).unwrap();
    }
}
