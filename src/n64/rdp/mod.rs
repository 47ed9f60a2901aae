pub mod rasteriser;

use byteorder::{BigEndian, ByteOrder};
use log::{trace, warn};
use serde::{Deserialize, Serialize};

use self::rasteriser::Rasteriser;

use super::error::Error;
use super::mi::{InterruptSource, Mi};

const CMD_TEXTURE_RECTANGLE: u64 = 0x24;
const CMD_SYNC_LOAD: u64 = 0x26;
const CMD_SYNC_PIPE: u64 = 0x27;
const CMD_SYNC_TILE: u64 = 0x28;
const CMD_SYNC_FULL: u64 = 0x29;
const CMD_SET_SCISSOR: u64 = 0x2d;
const CMD_SET_OTHER_MODES: u64 = 0x2f;
const CMD_LOAD_TLUT: u64 = 0x30;
const CMD_LOAD_TILE: u64 = 0x34;
const CMD_SET_TILE: u64 = 0x35;
const CMD_FILL_RECTANGLE: u64 = 0x36;
const CMD_SET_FILL_COLOR: u64 = 0x37;
const CMD_SET_COMBINE_MODE: u64 = 0x3c;
const CMD_SET_TEXTURE_IMAGE: u64 = 0x3d;
const CMD_SET_COLOR_IMAGE: u64 = 0x3f;

/// Shared header of Load Tile and Load TLUT.
struct LoadHeader(u64);

impl LoadHeader {
    pub fn y1(&self) -> u32 {
        (self.0 & 0xfff) as u32
    }

    pub fn x1(&self) -> u32 {
        ((self.0 >> 12) & 0xfff) as u32
    }

    pub fn tile(&self) -> usize {
        ((self.0 >> 24) & 7) as usize
    }

    pub fn y0(&self) -> u32 {
        ((self.0 >> 32) & 0xfff) as u32
    }

    pub fn x0(&self) -> u32 {
        ((self.0 >> 44) & 0xfff) as u32
    }
}

/// Shared header of Set Color Image and Set Texture Image.
struct SetImageHeader(u64);

impl SetImageHeader {
    pub fn dramaddr(&self) -> u32 {
        (self.0 & 0x00ff_ffff) as u32
    }

    pub fn width(&self) -> u32 {
        ((self.0 >> 32) & 0x3ff) as u32
    }

    pub fn size(&self) -> u32 {
        ((self.0 >> 51) & 3) as u32
    }

    pub fn format(&self) -> u32 {
        ((self.0 >> 53) & 7) as u32
    }
}

/// Rectangle header used by Set Scissor and Fill Rectangle: the lower-right
/// corner sits in the upper word.
struct RectHeader(u64);

impl RectHeader {
    pub fn y0(&self) -> u32 {
        (self.0 & 0xfff) as u32
    }

    pub fn x0(&self) -> u32 {
        ((self.0 >> 12) & 0xfff) as u32
    }

    pub fn y1(&self) -> u32 {
        ((self.0 >> 32) & 0xfff) as u32
    }

    pub fn x1(&self) -> u32 {
        ((self.0 >> 44) & 0xfff) as u32
    }
}

#[derive(Deserialize, Serialize)]
pub struct Rdp {
    rasteriser: Rasteriser,
}

impl Rdp {
    pub fn new() -> Rdp {
        Rdp {
            rasteriser: Rasteriser::new(),
        }
    }

    pub fn reset(&mut self) {
        self.rasteriser.reset();
    }

    /// Consumes 64-bit command words from RDRAM between `start` and `end`.
    /// Returns the address after the last consumed command.
    pub fn process_command_list(
        &mut self,
        start: u32,
        end: u32,
        mi: &mut Mi,
        ram: &mut [u8],
    ) -> Result<u32, Error> {
        trace!(
            "[RDP] Command list (start address = 0x{:08x}, end address = 0x{:08x})",
            start,
            end
        );

        if start >= end {
            warn!("[RDP] Empty command list");

            return Ok(start);
        }

        let mut addr = start;

        while addr < end {
            let data = BigEndian::read_u64(&ram[addr as usize..]);

            let command = (data >> 56) & 0x3f;
            match command {
                CMD_TEXTURE_RECTANGLE => {
                    addr += 8;

                    let params = BigEndian::read_u64(&ram[addr as usize..]);

                    self.rasteriser.texture_rectangle(data, params, ram)?;
                }
                CMD_SYNC_LOAD | CMD_SYNC_PIPE | CMD_SYNC_TILE => {
                    trace!("[RDP] Sync (command word = 0x{:016x})", data);
                }
                CMD_SYNC_FULL => {
                    trace!("[RDP] Sync Full");

                    mi.request_interrupt(InterruptSource::Dp);
                }
                CMD_SET_SCISSOR => {
                    let header = RectHeader(data);

                    self.rasteriser
                        .set_scissor(header.x0(), header.y0(), header.x1(), header.y1());
                }
                CMD_SET_OTHER_MODES => {
                    trace!("[RDP] Set Other Modes (command word = 0x{:016x})", data);
                }
                CMD_LOAD_TLUT => {
                    let header = LoadHeader(data);

                    self.rasteriser.load_tlut(
                        header.tile(),
                        header.x0(),
                        header.y0(),
                        header.x1(),
                        header.y1(),
                        ram,
                    )?;
                }
                CMD_LOAD_TILE => {
                    let header = LoadHeader(data);

                    self.rasteriser.load_tile(
                        header.tile(),
                        header.x0(),
                        header.y0(),
                        header.x1(),
                        header.y1(),
                        ram,
                    )?;
                }
                CMD_SET_TILE => self.rasteriser.set_tile(data),
                CMD_FILL_RECTANGLE => {
                    let header = RectHeader(data);

                    self.rasteriser
                        .fill_rectangle(header.x0(), header.y0(), header.x1(), header.y1(), ram);
                }
                CMD_SET_FILL_COLOR => self.rasteriser.set_fill_color(data as u32),
                CMD_SET_COMBINE_MODE => self.rasteriser.set_combine_mode(data),
                CMD_SET_TEXTURE_IMAGE => {
                    let header = SetImageHeader(data);

                    self.rasteriser.set_texture_image(
                        header.dramaddr(),
                        header.width(),
                        header.size(),
                        header.format(),
                    );
                }
                CMD_SET_COLOR_IMAGE => {
                    let header = SetImageHeader(data);

                    self.rasteriser.set_color_image(
                        header.dramaddr(),
                        header.width(),
                        header.size(),
                        header.format(),
                    );
                }
                _ => {
                    return Err(Error::UnknownRdpCommand {
                        address: addr,
                        command: data,
                    })
                }
            }

            addr += 8;
        }

        Ok(addr)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn write_commands(ram: &mut [u8], base: usize, commands: &[u64]) {
        for (index, command) in commands.iter().enumerate() {
            BigEndian::write_u64(&mut ram[base + 8 * index..], *command);
        }
    }

    #[test]
    fn fill_rectangle_via_the_command_list() {
        let mut rdp = Rdp::new();
        let mut mi = Mi::new();
        let mut ram = vec![0u8; 0x10000];

        // Color image: RGBA5551, width 320, at address 0; fill color;
        // fill rectangle (0,0)-(40,4) in 10.2 coordinates; full sync.
        let commands = [
            (0x3fu64 << 56) | (2 << 51) | 319 << 32,
            (0x37u64 << 56) | 0x1234_1234,
            (0x36u64 << 56) | (40 << 44) | (4 << 32),
            0x29u64 << 56,
        ];

        write_commands(&mut ram, 0x8000, &commands);

        let next = rdp
            .process_command_list(0x8000, 0x8000 + 8 * 4, &mut mi, &mut ram)
            .unwrap();

        assert_eq!(next, 0x8000 + 8 * 4);

        for x in 0..10usize {
            assert_eq!(BigEndian::read_u16(&ram[2 * x..]), 0x1234);
        }
        assert_eq!(BigEndian::read_u16(&ram[20..]), 0);

        // Sync Full raised the DP interrupt.
        assert_eq!(mi.interrupt() & (1 << 5), 1 << 5);
    }

    #[test]
    fn unknown_commands_are_fatal() {
        let mut rdp = Rdp::new();
        let mut mi = Mi::new();
        let mut ram = vec![0u8; 0x1000];

        write_commands(&mut ram, 0, &[0x01u64 << 56]);

        let result = rdp.process_command_list(0, 8, &mut mi, &mut ram);
        assert!(matches!(
            result,
            Err(Error::UnknownRdpCommand { address: 0, .. })
        ));
    }

    #[test]
    fn empty_command_lists_return_the_start() {
        let mut rdp = Rdp::new();
        let mut mi = Mi::new();
        let mut ram = vec![0u8; 0x100];

        assert_eq!(rdp.process_command_list(0x40, 0x40, &mut mi, &mut ram).unwrap(), 0x40);
    }
}
