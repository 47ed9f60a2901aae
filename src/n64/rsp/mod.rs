pub mod vu;

use serde::{Deserialize, Serialize};

use self::vu::VectorUnit;

use super::cpu::ops::Instruction;
use super::dp::Dp;
use super::error::Error;
use super::mi::Mi;
use super::rdp::Rdp;
use super::sp::Sp;

const PC_MASK: u32 = 0xfff;

#[derive(Deserialize, Serialize)]
pub struct Rsp {
    regs: [u32; 32],

    pc: u32,
    npc: u32,
    cpc: u32,

    vu: VectorUnit,
}

impl Rsp {
    pub fn new() -> Rsp {
        Rsp {
            regs: [0; 32],

            pc: 0,
            npc: 4,
            cpc: 0,

            vu: VectorUnit::new(),
        }
    }

    pub fn reset(&mut self) {
        self.regs = [0; 32];
        self.set_pc(0);
        self.vu = VectorUnit::new();
    }

    fn reg(&self, index: usize) -> u32 {
        self.regs[index]
    }

    fn set_reg(&mut self, index: usize, value: u32) {
        self.regs[index] = value;
        self.regs[0] = 0;
    }

    pub fn set_pc(&mut self, addr: u32) {
        self.pc = addr & PC_MASK & !3;
        self.npc = self.pc.wrapping_add(4) & PC_MASK;
    }

    fn branch(&mut self, target: u32, condition: bool, link: usize) {
        let ra = self.npc;
        self.set_reg(link, ra);

        if condition {
            self.npc = target & PC_MASK;
        }
    }

    fn read8(&self, dmem: &[u8], addr: u32) -> u8 {
        dmem[(addr & 0xfff) as usize]
    }

    fn read16(&self, dmem: &[u8], addr: u32) -> u16 {
        let hi = self.read8(dmem, addr) as u16;
        let lo = self.read8(dmem, addr.wrapping_add(1)) as u16;

        (hi << 8) | lo
    }

    fn read32(&self, dmem: &[u8], addr: u32) -> u32 {
        let hi = self.read16(dmem, addr) as u32;
        let lo = self.read16(dmem, addr.wrapping_add(2)) as u32;

        (hi << 16) | lo
    }

    fn write8(&self, dmem: &mut [u8], addr: u32, value: u8) {
        dmem[(addr & 0xfff) as usize] = value;
    }

    fn write16(&self, dmem: &mut [u8], addr: u32, value: u16) {
        self.write8(dmem, addr, (value >> 8) as u8);
        self.write8(dmem, addr.wrapping_add(1), value as u8);
    }

    fn write32(&self, dmem: &mut [u8], addr: u32, value: u32) {
        self.write16(dmem, addr, (value >> 16) as u16);
        self.write16(dmem, addr.wrapping_add(2), value as u32 as u16);
    }

    fn fetch(&mut self, imem: &[u8]) -> u32 {
        let index = (self.cpc & PC_MASK & !3) as usize;

        let mut word = 0u32;
        for i in 0..4 {
            word = (word << 8) | imem[index + i] as u32;
        }

        word
    }

    /// One RSP instruction. The caller checks the halt bit between steps.
    #[allow(clippy::too_many_arguments)]
    pub fn step(
        &mut self,
        dmem: &mut [u8],
        imem: &mut [u8],
        sp: &mut Sp,
        dp: &mut Dp,
        rdp: &mut Rdp,
        mi: &mut Mi,
        ram: &mut [u8],
    ) -> Result<(), Error> {
        self.cpc = self.pc;

        let word = self.fetch(imem);
        let i = Instruction(word);

        self.pc = self.npc & PC_MASK;
        self.npc = self.npc.wrapping_add(4) & PC_MASK;

        let branch_base = self.pc;
        let imm_se = (word & 0xffff) as i16 as i32 as u32;

        match i.opcode() {
            0x00 => match i.function() {
                0x00 => {
                    let v = self.reg(i.rt()) << i.shift();
                    self.set_reg(i.rd(), v);
                }
                0x02 => {
                    let v = self.reg(i.rt()) >> i.shift();
                    self.set_reg(i.rd(), v);
                }
                0x03 => {
                    let v = (self.reg(i.rt()) as i32 >> i.shift()) as u32;
                    self.set_reg(i.rd(), v);
                }
                0x04 => {
                    let v = self.reg(i.rt()) << (self.reg(i.rs()) & 0x1f);
                    self.set_reg(i.rd(), v);
                }
                0x06 => {
                    let v = self.reg(i.rt()) >> (self.reg(i.rs()) & 0x1f);
                    self.set_reg(i.rd(), v);
                }
                0x07 => {
                    let v = (self.reg(i.rt()) as i32 >> (self.reg(i.rs()) & 0x1f)) as u32;
                    self.set_reg(i.rd(), v);
                }
                0x08 => {
                    let target = self.reg(i.rs()) & !3;
                    self.branch(target, true, 0);
                }
                0x09 => {
                    let target = self.reg(i.rs()) & !3;
                    self.branch(target, true, i.rd());
                }
                0x0d => sp.do_break(mi),
                0x20 | 0x21 => {
                    let v = self.reg(i.rs()).wrapping_add(self.reg(i.rt()));
                    self.set_reg(i.rd(), v);
                }
                0x22 | 0x23 => {
                    let v = self.reg(i.rs()).wrapping_sub(self.reg(i.rt()));
                    self.set_reg(i.rd(), v);
                }
                0x24 => {
                    let v = self.reg(i.rs()) & self.reg(i.rt());
                    self.set_reg(i.rd(), v);
                }
                0x25 => {
                    let v = self.reg(i.rs()) | self.reg(i.rt());
                    self.set_reg(i.rd(), v);
                }
                0x26 => {
                    let v = self.reg(i.rs()) ^ self.reg(i.rt());
                    self.set_reg(i.rd(), v);
                }
                0x27 => {
                    let v = !(self.reg(i.rs()) | self.reg(i.rt()));
                    self.set_reg(i.rd(), v);
                }
                0x2a => {
                    let v = ((self.reg(i.rs()) as i32) < (self.reg(i.rt()) as i32)) as u32;
                    self.set_reg(i.rd(), v);
                }
                0x2b => {
                    let v = (self.reg(i.rs()) < self.reg(i.rt())) as u32;
                    self.set_reg(i.rd(), v);
                }
                _ => {
                    return Err(Error::UnknownRspOpcode {
                        pc: self.cpc,
                        instruction: word,
                    })
                }
            },
            0x01 => {
                let target = branch_base.wrapping_add(imm_se << 2);

                match i.rt() {
                    0x00 => {
                        let condition = (self.reg(i.rs()) as i32) < 0;
                        self.branch(target, condition, 0);
                    }
                    0x01 => {
                        let condition = (self.reg(i.rs()) as i32) >= 0;
                        self.branch(target, condition, 0);
                    }
                    0x10 => {
                        let condition = (self.reg(i.rs()) as i32) < 0;
                        self.branch(target, condition, 31);
                    }
                    0x11 => {
                        let condition = (self.reg(i.rs()) as i32) >= 0;
                        self.branch(target, condition, 31);
                    }
                    _ => {
                        return Err(Error::UnknownRspOpcode {
                            pc: self.cpc,
                            instruction: word,
                        })
                    }
                }
            }
            0x02 => self.branch(i.target() << 2, true, 0),
            0x03 => self.branch(i.target() << 2, true, 31),
            0x04 => {
                let target = branch_base.wrapping_add(imm_se << 2);
                let condition = self.reg(i.rs()) == self.reg(i.rt());

                self.branch(target, condition, 0);
            }
            0x05 => {
                let target = branch_base.wrapping_add(imm_se << 2);
                let condition = self.reg(i.rs()) != self.reg(i.rt());

                self.branch(target, condition, 0);
            }
            0x06 => {
                let target = branch_base.wrapping_add(imm_se << 2);
                let condition = (self.reg(i.rs()) as i32) <= 0;

                self.branch(target, condition, 0);
            }
            0x07 => {
                let target = branch_base.wrapping_add(imm_se << 2);
                let condition = (self.reg(i.rs()) as i32) > 0;

                self.branch(target, condition, 0);
            }
            0x08 | 0x09 => {
                let v = self.reg(i.rs()).wrapping_add(imm_se);
                self.set_reg(i.rt(), v);
            }
            0x0a => {
                let v = ((self.reg(i.rs()) as i32) < imm_se as i32) as u32;
                self.set_reg(i.rt(), v);
            }
            0x0b => {
                let v = (self.reg(i.rs()) < imm_se) as u32;
                self.set_reg(i.rt(), v);
            }
            0x0c => {
                let v = self.reg(i.rs()) & i.imm();
                self.set_reg(i.rt(), v);
            }
            0x0d => {
                let v = self.reg(i.rs()) | i.imm();
                self.set_reg(i.rt(), v);
            }
            0x0e => {
                let v = self.reg(i.rs()) ^ i.imm();
                self.set_reg(i.rt(), v);
            }
            0x0f => self.set_reg(i.rt(), i.imm() << 16),
            0x10 => match i.rs() {
                // MFC0/MTC0 address the SP and DP register files.
                0x00 => {
                    let v = if i.rd() < 8 {
                        sp.read_io(4 * i.rd() as u32)?
                    } else if i.rd() < 16 {
                        dp.read_io(4 * (i.rd() as u32 - 8))?
                    } else {
                        return Err(Error::UnknownRspOpcode {
                            pc: self.cpc,
                            instruction: word,
                        });
                    };

                    self.set_reg(i.rt(), v);
                }
                0x04 => {
                    let v = self.reg(i.rt());

                    if i.rd() < 8 {
                        sp.write_io(4 * i.rd() as u32, v, mi, ram, dmem, imem)?;
                    } else if i.rd() < 16 {
                        dp.write_io(4 * (i.rd() as u32 - 8), v, mi, rdp, ram)?;
                    } else {
                        return Err(Error::UnknownRspOpcode {
                            pc: self.cpc,
                            instruction: word,
                        });
                    }
                }
                _ => {
                    return Err(Error::UnknownRspOpcode {
                        pc: self.cpc,
                        instruction: word,
                    })
                }
            },
            0x12 => self.execute_cop2(word)?,
            0x20 => {
                let addr = self.reg(i.rs()).wrapping_add(imm_se);
                let v = self.read8(dmem, addr) as i8 as i32 as u32;

                self.set_reg(i.rt(), v);
            }
            0x21 => {
                let addr = self.reg(i.rs()).wrapping_add(imm_se);
                let v = self.read16(dmem, addr) as i16 as i32 as u32;

                self.set_reg(i.rt(), v);
            }
            0x23 => {
                let addr = self.reg(i.rs()).wrapping_add(imm_se);
                let v = self.read32(dmem, addr);

                self.set_reg(i.rt(), v);
            }
            0x24 => {
                let addr = self.reg(i.rs()).wrapping_add(imm_se);
                let v = self.read8(dmem, addr) as u32;

                self.set_reg(i.rt(), v);
            }
            0x25 => {
                let addr = self.reg(i.rs()).wrapping_add(imm_se);
                let v = self.read16(dmem, addr) as u32;

                self.set_reg(i.rt(), v);
            }
            0x28 => {
                let addr = self.reg(i.rs()).wrapping_add(imm_se);
                self.write8(dmem, addr, self.reg(i.rt()) as u8);
            }
            0x29 => {
                let addr = self.reg(i.rs()).wrapping_add(imm_se);
                self.write16(dmem, addr, self.reg(i.rt()) as u16);
            }
            0x2b => {
                let addr = self.reg(i.rs()).wrapping_add(imm_se);
                self.write32(dmem, addr, self.reg(i.rt()));
            }
            0x32 => self.execute_vu_load(word, dmem)?,
            0x3a => self.execute_vu_store(word, dmem)?,
            _ => {
                return Err(Error::UnknownRspOpcode {
                    pc: self.cpc,
                    instruction: word,
                })
            }
        }

        Ok(())
    }

    fn execute_cop2(&mut self, word: u32) -> Result<(), Error> {
        let i = Instruction(word);

        let op = i.rs();

        if op >= 0x10 {
            let vd = word as usize >> 6 & 0x1f;
            let vs = i.rd();
            let vt = i.rt();
            let broadcast_mod = (word >> 21) as usize & 0xf;

            match word & 0x3f {
                0x00 => self.vu.vmulf(vd, vs, vt, broadcast_mod),
                0x08 => self.vu.vmacf(vd, vs, vt, broadcast_mod),
                0x2c => self.vu.vxor(vd, vs, vt, broadcast_mod),
                _ => {
                    return Err(Error::UnknownRspOpcode {
                        pc: self.cpc,
                        instruction: word,
                    })
                }
            }

            return Ok(());
        }

        let element = (word as usize >> 7) & 0xf;

        match op {
            0x00 => {
                let v = self.vu.lane(i.rd(), element >> 1) as i16 as i32 as u32;
                self.set_reg(i.rt(), v);
            }
            0x04 => {
                let v = self.reg(i.rt()) as u16;
                self.vu.set_lane(i.rd(), element >> 1, v);
            }
            _ => {
                return Err(Error::UnknownRspOpcode {
                    pc: self.cpc,
                    instruction: word,
                })
            }
        }

        Ok(())
    }

    fn execute_vu_load(&mut self, word: u32, dmem: &[u8]) -> Result<(), Error> {
        let i = Instruction(word);

        let base = i.rs();
        let vt = i.rt();

        let opcode = (word >> 11) & 0x1f;
        let element = (word as usize >> 7) & 0xf;

        match opcode {
            // LDV: eight bytes, element-addressed
            0x03 => {
                let offset = ((word as i32) << 25) >> 22;
                let mut addr = self.reg(base).wrapping_add(offset as u32) & 0xfff;

                let last_element = (element + 7).min(15);

                for e in element..=last_element {
                    let byte = self.read8(dmem, addr);
                    self.vu.set_byte(vt, e, byte);

                    addr = addr.wrapping_add(1);
                }
            }
            // LQV: up to the end of the 16-byte line
            0x04 => {
                let offset = ((word as i32) << 25) >> 21;
                let addr = self.reg(base).wrapping_add(offset as u32) & 0xfff;

                let mut index = 0;
                while addr + index <= (addr & 0xff0) + 15 {
                    let byte = self.read8(dmem, addr + index);
                    self.vu
                        .set_byte(vt, (element + index as usize) & 15, byte);

                    index += 1;
                }
            }
            _ => {
                return Err(Error::UnknownRspOpcode {
                    pc: self.cpc,
                    instruction: word,
                })
            }
        }

        Ok(())
    }

    fn execute_vu_store(&mut self, word: u32, dmem: &mut [u8]) -> Result<(), Error> {
        let i = Instruction(word);

        let base = i.rs();
        let vt = i.rt();

        let opcode = (word >> 11) & 0x1f;
        let element = (word as usize >> 7) & 0xf;

        match opcode {
            // SSV: a single lane
            0x01 => {
                let offset = ((word as i32) << 25) >> 24;
                let addr = self.reg(base).wrapping_add(offset as u32) & 0xfff;

                self.write16(dmem, addr, self.vu.lane(vt, element >> 1));
            }
            // SDV: eight bytes
            0x03 => {
                let offset = ((word as i32) << 25) >> 22;
                let addr = self.reg(base).wrapping_add(offset as u32) & 0xfff;

                for index in 0..8 {
                    let byte = self.vu.byte(vt, (element + index) & 15);
                    self.write8(dmem, addr.wrapping_add(index as u32), byte);
                }
            }
            // SQV: up to the end of the 16-byte line
            0x04 => {
                let offset = ((word as i32) << 25) >> 21;
                let addr = self.reg(base).wrapping_add(offset as u32) & 0xfff;

                let mut index = 0;
                while addr + index <= (addr & 0xff0) + 15 {
                    let byte = self.vu.byte(vt, (element + index as usize) & 15);
                    self.write8(dmem, addr + index, byte);

                    index += 1;
                }
            }
            _ => {
                return Err(Error::UnknownRspOpcode {
                    pc: self.cpc,
                    instruction: word,
                })
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parts() -> (Sp, Dp, Rdp, Mi, Vec<u8>, Vec<u8>, Vec<u8>) {
        (
            Sp::new(),
            Dp::new(),
            Rdp::new(),
            Mi::new(),
            vec![0u8; 0x1000],
            vec![0u8; 0x1000],
            vec![0u8; 0x10000],
        )
    }

    fn load_program(imem: &mut [u8], program: &[u32]) {
        for (index, word) in program.iter().enumerate() {
            imem[4 * index..4 * index + 4].copy_from_slice(&word.to_be_bytes());
        }
    }

    #[test]
    fn branch_has_one_visible_delay_slot() {
        let mut rsp = Rsp::new();

        let (mut sp, mut dp, mut rdp, mut mi, mut dmem, mut imem, mut ram) = parts();

        // beq r0, r0, +2; ori r1, r0, 1 (delay slot); ori r2, r0, 2
        // (skipped); target: ori r3, r0, 3
        load_program(
            &mut imem,
            &[0x1000_0002, 0x3401_0001, 0x3402_0002, 0x3403_0003],
        );

        for _ in 0..3 {
            rsp.step(&mut dmem, &mut imem, &mut sp, &mut dp, &mut rdp, &mut mi, &mut ram)
                .unwrap();
        }

        assert_eq!(rsp.reg(1), 1);
        assert_eq!(rsp.reg(2), 0);
        assert_eq!(rsp.reg(3), 3);
    }

    #[test]
    fn pc_wraps_inside_imem() {
        let mut rsp = Rsp::new();

        rsp.set_pc(0xffc);
        assert_eq!(rsp.npc, 0);
    }

    #[test]
    fn break_halts_the_core() {
        let mut rsp = Rsp::new();

        let (mut sp, mut dp, mut rdp, mut mi, mut dmem, mut imem, mut ram) = parts();

        load_program(&mut imem, &[0x0000_000d]);

        // Un-halt first, as the host CPU would.
        sp.write_io(0x10, 1, &mut mi, &mut ram, &mut dmem, &mut []).unwrap();
        assert!(!sp.is_halted());

        rsp.step(&mut dmem, &mut imem, &mut sp, &mut dp, &mut rdp, &mut mi, &mut ram)
            .unwrap();

        assert!(sp.is_halted());
        assert_eq!(sp.read_io(0x10).unwrap() & 2, 2);
    }

    #[test]
    fn dmem_access_is_big_endian_and_wraps() {
        let mut rsp = Rsp::new();
        let mut dmem = vec![0u8; 0x1000];

        rsp.write32(&mut dmem, 0xffe, 0x1122_3344);

        assert_eq!(dmem[0xffe], 0x11);
        assert_eq!(dmem[0xfff], 0x22);
        assert_eq!(dmem[0x000], 0x33);
        assert_eq!(dmem[0x001], 0x44);

        assert_eq!(rsp.read32(&dmem, 0xffe), 0x1122_3344);
    }

    #[test]
    fn ldv_and_sdv_round_trip_through_dmem() {
        let mut rsp = Rsp::new();

        let (mut sp, mut dp, mut rdp, mut mi, mut dmem, mut imem, mut ram) = parts();

        for (index, byte) in dmem[0x20..0x28].iter_mut().enumerate() {
            *byte = 0xa0 + index as u8;
        }

        // ldv v1[0], 0x20(r0); sdv v1[0], 0x40(r0)
        load_program(&mut imem, &[0xc801_1804, 0xe801_1808]);

        for _ in 0..2 {
            rsp.step(&mut dmem, &mut imem, &mut sp, &mut dp, &mut rdp, &mut mi, &mut ram)
                .unwrap();
        }

        assert_eq!(dmem[0x40..0x48], dmem[0x20..0x28]);
    }
}
