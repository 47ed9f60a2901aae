use byteorder::{BigEndian, ByteOrder};
use serde::{Deserialize, Serialize};

use super::ai::Ai;
use super::dp::Dp;
use super::error::Error;
use super::mi::Mi;
use super::pi::Pi;
use super::pif::{Pif, PifStep};
use super::rdp::Rdp;
use super::ri::Ri;
use super::rsp::Rsp;
use super::scheduler::EventType;
use super::si::Si;
use super::sp::Sp;
use super::vi::Vi;

pub const BOOT_ROM_SIZE: usize = 0x7c0;

const RAM_SIZE: usize = 0x80_0000;
const DMEM_SIZE: usize = 0x1000;
const IMEM_SIZE: usize = 0x1000;

const PAGE_SHIFT: u32 = 12;
const PAGE_SIZE: u32 = 1 << PAGE_SHIFT;
const PAGE_MASK: u32 = PAGE_SIZE - 1;

// 31-bit physical address space
const NUM_PAGES: usize = 1 << 19;

const BASE_RAM: u32 = 0x0000_0000;
const BASE_DMEM: u32 = 0x0400_0000;
const BASE_IMEM: u32 = 0x0400_1000;
const BASE_CART: u32 = 0x1000_0000;
const BASE_BOOT_ROM: u32 = 0x1fc0_0000;
const BASE_PIF_RAM: u32 = 0x1fc0_07c0;

#[derive(Clone, Copy, Deserialize, Serialize)]
enum Region {
    Ram,
    Dmem,
    Imem,
    Cart,
}

/// The physical bus: page-backed memories fronted by a software page table,
/// with unmapped pages falling through to the 1 MiB-granular I/O dispatch.
#[derive(Deserialize, Serialize)]
pub struct Bus {
    #[serde(skip)]
    page_table: Vec<Option<(Region, u32)>>,

    ram: Box<[u8]>,
    dmem: Box<[u8]>,
    imem: Box<[u8]>,

    #[serde(skip)]
    cart: Box<[u8]>,
    #[serde(skip)]
    boot_rom: Box<[u8]>,

    rsp: Rsp,
    rdp: Rdp,

    mi: Mi,
    vi: Vi,
    ai: Ai,
    pi: Pi,
    ri: Ri,
    si: Si,
    sp: Sp,
    dp: Dp,

    pif: Pif,

    // Scheduler requests raised from inside bus writes; the system drains
    // these at the quantum boundary.
    pending_events: Vec<(EventType, i32, i64)>,
}

impl Bus {
    pub fn new(boot_rom: Box<[u8]>, pif_rom: Box<[u8]>, cart: Box<[u8]>) -> Bus {
        let mut bus = Bus {
            page_table: Vec::new(),

            ram: vec![0; RAM_SIZE].into_boxed_slice(),
            dmem: vec![0; DMEM_SIZE].into_boxed_slice(),
            imem: vec![0; IMEM_SIZE].into_boxed_slice(),

            cart,
            boot_rom,

            rsp: Rsp::new(),
            rdp: Rdp::new(),

            mi: Mi::new(),
            vi: Vi::new(),
            ai: Ai::new(),
            pi: Pi::new(),
            ri: Ri::new(),
            si: Si::new(),
            sp: Sp::new(),
            dp: Dp::new(),

            pif: Pif::new(pif_rom),

            pending_events: Vec::new(),
        };

        bus.map_pages();

        bus
    }

    /// Rebuilds the page table; required after construction and after a
    /// save-state load.
    pub fn map_pages(&mut self) {
        self.page_table = vec![None; NUM_PAGES];

        self.map(BASE_RAM, RAM_SIZE as u32, Region::Ram);
        self.map(BASE_DMEM, DMEM_SIZE as u32, Region::Dmem);
        self.map(BASE_IMEM, IMEM_SIZE as u32, Region::Imem);
        self.map(BASE_CART, self.cart.len() as u32 & !PAGE_MASK, Region::Cart);
    }

    fn map(&mut self, base: u32, size: u32, region: Region) {
        let first = (base >> PAGE_SHIFT) as usize;
        let count = (size >> PAGE_SHIFT) as usize;

        for page in 0..count {
            self.page_table[first + page] = Some((region, (page as u32) << PAGE_SHIFT));
        }
    }

    pub fn reset(&mut self) {
        self.ram.fill(0);
        self.dmem.fill(0);
        self.imem.fill(0);

        self.rsp.reset();
        self.rdp.reset();

        self.mi.reset();
        self.vi.reset();
        self.ai.reset();
        self.pi.reset();
        self.ri.reset();
        self.si.reset();
        self.sp.reset();
        self.dp.reset();

        self.pif.reset();

        self.pending_events.clear();
    }

    pub fn reload_host_files(&mut self, boot_rom: Box<[u8]>, pif_rom: Box<[u8]>, cart: Box<[u8]>) {
        self.boot_rom = boot_rom;
        self.cart = cart;
        self.pif.set_rom(pif_rom);

        self.map_pages();
    }

    pub fn mi(&self) -> &Mi {
        &self.mi
    }

    pub fn vi(&self) -> &Vi {
        &self.vi
    }

    pub fn ai(&self) -> &Ai {
        &self.ai
    }

    pub fn pif(&mut self) -> &mut Pif {
        &mut self.pif
    }

    pub fn ram(&self) -> &[u8] {
        &self.ram
    }

    pub fn take_pending_events(&mut self) -> Vec<(EventType, i32, i64)> {
        std::mem::take(&mut self.pending_events)
    }

    fn page_entry(&self, paddr: u32) -> Option<(Region, u32)> {
        self.page_table
            .get((paddr >> PAGE_SHIFT) as usize)
            .copied()
            .flatten()
    }

    fn backing(&self, region: Region) -> &[u8] {
        match region {
            Region::Ram => &self.ram,
            Region::Dmem => &self.dmem,
            Region::Imem => &self.imem,
            Region::Cart => &self.cart,
        }
    }

    fn backing_mut(&mut self, region: Region) -> &mut [u8] {
        match region {
            Region::Ram => &mut self.ram,
            Region::Dmem => &mut self.dmem,
            Region::Imem => &mut self.imem,
            Region::Cart => &mut self.cart,
        }
    }

    fn boot_rom_offset(paddr: u32) -> Option<usize> {
        if (BASE_BOOT_ROM..BASE_BOOT_ROM + BOOT_ROM_SIZE as u32).contains(&paddr) {
            Some((paddr - BASE_BOOT_ROM) as usize)
        } else {
            None
        }
    }

    fn pif_ram_offset(paddr: u32) -> Option<usize> {
        if (BASE_PIF_RAM..BASE_PIF_RAM + super::pif::RAM_SIZE as u32).contains(&paddr) {
            Some((paddr - BASE_PIF_RAM) as usize)
        } else {
            None
        }
    }

    pub fn read8(&mut self, paddr: u32) -> Result<u8, Error> {
        if let Some((region, base)) = self.page_entry(paddr) {
            return Ok(self.backing(region)[(base | (paddr & PAGE_MASK)) as usize]);
        }

        if let Some(offset) = Bus::boot_rom_offset(paddr) {
            return Ok(self.boot_rom[offset]);
        }

        if let Some(offset) = Bus::pif_ram_offset(paddr) {
            return Ok(self.pif.ram()[offset]);
        }

        Err(Error::UnmappedRead {
            address: paddr,
            size: 8,
        })
    }

    pub fn read16(&mut self, paddr: u32) -> Result<u16, Error> {
        if let Some((region, base)) = self.page_entry(paddr) {
            let index = (base | (paddr & PAGE_MASK)) as usize;

            return Ok(BigEndian::read_u16(&self.backing(region)[index..]));
        }

        if let Some(offset) = Bus::boot_rom_offset(paddr) {
            return Ok(BigEndian::read_u16(&self.boot_rom[offset..]));
        }

        if let Some(offset) = Bus::pif_ram_offset(paddr) {
            return Ok(BigEndian::read_u16(&self.pif.ram()[offset..]));
        }

        Err(Error::UnmappedRead {
            address: paddr,
            size: 16,
        })
    }

    pub fn read32(&mut self, paddr: u32) -> Result<u32, Error> {
        if let Some((region, base)) = self.page_entry(paddr) {
            let index = (base | (paddr & PAGE_MASK)) as usize;

            return Ok(BigEndian::read_u32(&self.backing(region)[index..]));
        }

        if let Some(offset) = Bus::boot_rom_offset(paddr) {
            return Ok(BigEndian::read_u32(&self.boot_rom[offset..]));
        }

        if let Some(offset) = Bus::pif_ram_offset(paddr) {
            return Ok(BigEndian::read_u32(&self.pif.ram()[offset..]));
        }

        self.read_io(paddr)
    }

    pub fn read64(&mut self, paddr: u32) -> Result<u64, Error> {
        if let Some((region, base)) = self.page_entry(paddr) {
            let index = (base | (paddr & PAGE_MASK)) as usize;

            return Ok(BigEndian::read_u64(&self.backing(region)[index..]));
        }

        if let Some(offset) = Bus::boot_rom_offset(paddr) {
            return Ok(BigEndian::read_u64(&self.boot_rom[offset..]));
        }

        // The bus fragments wider accesses onto the 32-bit PIF port.
        if Bus::pif_ram_offset(paddr).is_some() {
            let hi = self.read32(paddr)? as u64;
            let lo = self.read32(paddr + 4)? as u64;

            return Ok((hi << 32) | lo);
        }

        Err(Error::UnmappedRead {
            address: paddr,
            size: 64,
        })
    }

    pub fn write8(&mut self, paddr: u32, data: u8) -> Result<(), Error> {
        if let Some((region, base)) = self.page_entry(paddr) {
            self.backing_mut(region)[(base | (paddr & PAGE_MASK)) as usize] = data;

            return Ok(());
        }

        if let Some(offset) = Bus::pif_ram_offset(paddr) {
            self.pif.ram_mut()[offset] = data;

            return Ok(());
        }

        Err(Error::UnmappedWrite {
            address: paddr,
            data: data as u64,
            size: 8,
        })
    }

    pub fn write16(&mut self, paddr: u32, data: u16) -> Result<(), Error> {
        if let Some((region, base)) = self.page_entry(paddr) {
            let index = (base | (paddr & PAGE_MASK)) as usize;

            BigEndian::write_u16(&mut self.backing_mut(region)[index..], data);

            return Ok(());
        }

        if let Some(offset) = Bus::pif_ram_offset(paddr) {
            BigEndian::write_u16(&mut self.pif.ram_mut()[offset..], data);

            return Ok(());
        }

        Err(Error::UnmappedWrite {
            address: paddr,
            data: data as u64,
            size: 16,
        })
    }

    pub fn write32(&mut self, paddr: u32, data: u32) -> Result<(), Error> {
        if let Some((region, base)) = self.page_entry(paddr) {
            let index = (base | (paddr & PAGE_MASK)) as usize;

            BigEndian::write_u32(&mut self.backing_mut(region)[index..], data);

            return Ok(());
        }

        if let Some(offset) = Bus::pif_ram_offset(paddr) {
            BigEndian::write_u32(&mut self.pif.ram_mut()[offset..], data);

            return Ok(());
        }

        self.write_io(paddr, data)
    }

    pub fn write64(&mut self, paddr: u32, data: u64) -> Result<(), Error> {
        if let Some((region, base)) = self.page_entry(paddr) {
            let index = (base | (paddr & PAGE_MASK)) as usize;

            BigEndian::write_u64(&mut self.backing_mut(region)[index..], data);

            return Ok(());
        }

        if Bus::pif_ram_offset(paddr).is_some() {
            self.write32(paddr, (data >> 32) as u32)?;
            self.write32(paddr + 4, data as u32)?;

            return Ok(());
        }

        Err(Error::UnmappedWrite {
            address: paddr,
            data,
            size: 64,
        })
    }

    fn read_io(&mut self, paddr: u32) -> Result<u32, Error> {
        match paddr >> 20 {
            0x03f => self.ri.read_rdram(paddr),
            0x040 => match paddr & 0x000f_ffff {
                offset @ 0x40000..=0x4001f => self.sp.read_io(offset - 0x40000),
                0x80000 => Ok(0),
                _ => Err(Error::UnknownIoRead { address: paddr }),
            },
            0x041 => self.dp.read_io(paddr & 0xff),
            0x043 => self.mi.read_io(paddr & 0xff),
            0x044 => self.vi.read_io(paddr & 0xff),
            0x045 => self.ai.read_io(paddr & 0xff),
            0x046 => self.pi.read_io(paddr & 0xff),
            0x047 => self.ri.read_io(paddr & 0xff),
            0x048 => self.si.read_io(paddr & 0xff),
            _ => Err(Error::UnmappedRead {
                address: paddr,
                size: 32,
            }),
        }
    }

    fn write_io(&mut self, paddr: u32, data: u32) -> Result<(), Error> {
        match paddr >> 20 {
            0x03f => self.ri.write_rdram(paddr, data),
            0x040 => match paddr & 0x000f_ffff {
                offset @ 0x40000..=0x4001f => self.sp.write_io(
                    offset - 0x40000,
                    data,
                    &mut self.mi,
                    &mut self.ram,
                    &mut self.dmem,
                    &mut self.imem,
                ),
                0x80000 => {
                    self.rsp.set_pc(data);

                    Ok(())
                }
                _ => Err(Error::UnknownIoWrite {
                    address: paddr,
                    data,
                }),
            },
            0x041 => self
                .dp
                .write_io(paddr & 0xff, data, &mut self.mi, &mut self.rdp, &mut self.ram),
            0x043 => self.mi.write_io(paddr & 0xff, data),
            0x044 => self.vi.write_io(paddr & 0xff, data, &mut self.mi),
            0x045 => {
                if let Some(delay) = self.ai.write_io(paddr & 0xff, data, &mut self.mi)? {
                    self.pending_events.push((EventType::AiSample, 0, delay));
                }

                Ok(())
            }
            0x046 => self.pi.write_io(
                paddr & 0xff,
                data,
                &mut self.mi,
                &mut self.ram,
                &self.cart,
            ),
            0x047 => self.ri.write_io(paddr & 0xff, data),
            0x048 => self
                .si
                .write_io(paddr & 0xff, data, &mut self.mi, &mut self.pif),
            _ => Err(Error::UnmappedWrite {
                address: paddr,
                data: data as u64,
                size: 32,
            }),
        }
    }

    /// Runs the RSP for up to `cycles` instructions; the core sits idle
    /// while the SP halt bit is set.
    pub fn tick_rsp(&mut self, cycles: i64) -> Result<(), Error> {
        for _ in 0..cycles {
            if self.sp.is_halted() {
                break;
            }

            self.rsp.step(
                &mut self.dmem,
                &mut self.imem,
                &mut self.sp,
                &mut self.dp,
                &mut self.rdp,
                &mut self.mi,
                &mut self.ram,
            )?;
        }

        Ok(())
    }

    /// Runs the PIF for up to `cycles` instructions. Standby exits the loop
    /// early; a HALT executes the SI transfer posted against the mailbox.
    pub fn tick_pif(&mut self, cycles: i64) -> Result<(), Error> {
        for _ in 0..cycles {
            match self.pif.step()? {
                PifStep::Ran => {}
                PifStep::Standby => break,
                PifStep::Halted => {
                    if let Some(direction) = self.si.take_pending() {
                        self.si
                            .do_dma(direction, &mut self.mi, &mut self.pif, &mut self.ram);
                    }
                }
            }
        }

        Ok(())
    }

    pub fn do_ai_sample(&mut self) -> Option<i64> {
        self.ai.do_sample(&mut self.mi, &self.ram)
    }

    pub fn tick_vi_halfline(&mut self) -> bool {
        self.vi.tick_halfline(&mut self.mi)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bus() -> Bus {
        let mut cart = vec![0u8; 0x2000];
        for (i, byte) in cart.iter_mut().enumerate() {
            *byte = i as u8;
        }

        Bus::new(
            vec![0; BOOT_ROM_SIZE].into_boxed_slice(),
            vec![0; super::super::pif::ROM_SIZE].into_boxed_slice(),
            cart.into_boxed_slice(),
        )
    }

    #[test]
    fn same_size_round_trips_in_page_backed_regions() {
        let mut bus = bus();

        for base in [0x0000_1000u32, 0x0400_0100, 0x0400_1100] {
            bus.write8(base, 0xab).unwrap();
            assert_eq!(bus.read8(base).unwrap(), 0xab);

            bus.write16(base + 0x10, 0x1234).unwrap();
            assert_eq!(bus.read16(base + 0x10).unwrap(), 0x1234);

            bus.write32(base + 0x20, 0xdead_beef).unwrap();
            assert_eq!(bus.read32(base + 0x20).unwrap(), 0xdead_beef);

            bus.write64(base + 0x30, 0x0123_4567_89ab_cdef).unwrap();
            assert_eq!(bus.read64(base + 0x30).unwrap(), 0x0123_4567_89ab_cdef);
        }
    }

    #[test]
    fn guest_byte_image_is_big_endian() {
        let mut bus = bus();

        bus.write32(0x100, 0x0011_2233).unwrap();

        assert_eq!(bus.read8(0x100).unwrap(), 0x00);
        assert_eq!(bus.read8(0x101).unwrap(), 0x11);
        assert_eq!(bus.read8(0x102).unwrap(), 0x22);
        assert_eq!(bus.read8(0x103).unwrap(), 0x33);
        assert_eq!(bus.read16(0x102).unwrap(), 0x2233);
    }

    #[test]
    fn cartridge_pages_are_mapped() {
        let mut bus = bus();

        assert_eq!(bus.read8(0x1000_0004).unwrap(), 4);
        assert_eq!(bus.read32(0x1000_0004).unwrap(), 0x0405_0607);
    }

    #[test]
    fn unmapped_accesses_fail() {
        let mut bus = bus();

        assert!(matches!(
            bus.read32(0x0800_0000),
            Err(Error::UnmappedRead { .. })
        ));
        assert!(matches!(
            bus.write32(0x0800_0000, 0),
            Err(Error::UnmappedWrite { .. })
        ));
        assert!(matches!(
            bus.read32(0x0420_0000),
            Err(Error::UnknownIoRead { .. })
        ));
    }

    #[test]
    fn pif_ram_fragments_through_the_32_bit_port() {
        let mut bus = bus();

        bus.write64(0x1fc0_07c0, 0x1122_3344_5566_7788).unwrap();

        assert_eq!(bus.read32(0x1fc0_07c0).unwrap(), 0x1122_3344);
        assert_eq!(bus.read32(0x1fc0_07c4).unwrap(), 0x5566_7788);
        assert_eq!(bus.read64(0x1fc0_07c0).unwrap(), 0x1122_3344_5566_7788);
        assert_eq!(bus.read8(0x1fc0_07c1).unwrap(), 0x22);
    }

    #[test]
    fn mi_version_register_reads() {
        let mut bus = bus();

        assert_eq!(bus.read32(0x0430_0004).unwrap(), 0x0202_0102);
    }

    #[test]
    fn sp_dma_round_trips_through_the_bus() {
        let mut bus = bus();

        for i in 0..32u32 {
            bus.write8(0x0400_0000 + i, i as u8).unwrap();
        }

        // DMEM -> RAM -> DMEM, length 32 bytes.
        bus.write32(0x0404_0000, 0).unwrap();
        bus.write32(0x0404_0004, 0x2000).unwrap();
        bus.write32(0x0404_000c, 31).unwrap();

        bus.write32(0x0404_0000, 0x800).unwrap();
        bus.write32(0x0404_0004, 0x2000).unwrap();
        bus.write32(0x0404_0008, 31).unwrap();

        for i in 0..32u32 {
            assert_eq!(bus.read8(0x0400_0800 + i).unwrap(), i as u8);
        }
    }
}
