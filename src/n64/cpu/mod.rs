pub mod cop0;
pub mod fpu;
pub mod ops;

use serde::{Deserialize, Serialize};

use self::cop0::{Cop0, Exception};
use self::fpu::Fpu;
use self::ops::Operation;

use super::bus::Bus;
use super::error::Error;

const ADDR_RESET_VECTOR: u64 = 0xffff_ffff_bfc0_0000;
const ADDR_EXCEPTION_VECTOR: u64 = 0xffff_ffff_8000_0180;

#[derive(Deserialize, Serialize)]
pub struct Cpu {
    regs: [u64; 32],

    hi: u64,
    lo: u64,

    pc: u64,
    npc: u64,
    cpc: u64,

    delay_slot: [bool; 2],

    ll_bit: bool,

    cop0: Cop0,
    fpu: Fpu,
}

impl Cpu {
    pub fn new() -> Cpu {
        Cpu {
            regs: [0; 32],

            hi: 0,
            lo: 0,

            pc: 0,
            npc: 0,
            cpc: 0,

            delay_slot: [false; 2],

            ll_bit: false,

            cop0: Cop0::new(),
            fpu: Fpu::new(),
        }
    }

    pub fn reset(&mut self) {
        self.regs = [0; 32];
        self.hi = 0;
        self.lo = 0;

        self.pc = ADDR_RESET_VECTOR;
        self.npc = self.pc.wrapping_add(4);
        self.cpc = self.pc;

        self.delay_slot = [false; 2];
        self.ll_bit = false;

        self.cop0.reset();
        self.fpu.reset();
    }

    pub fn reg(&self, index: usize) -> u64 {
        self.regs[index]
    }

    fn set_reg(&mut self, index: usize, value: u64) {
        self.regs[index] = value;
        self.regs[0] = 0;
    }

    fn set_reg32(&mut self, index: usize, value: u32) {
        self.set_reg(index, value as i32 as i64 as u64);
    }

    pub fn set_pc(&mut self, addr: u64) {
        self.pc = addr;
        self.npc = addr.wrapping_add(4);
    }

    pub fn cop0(&mut self) -> &mut Cop0 {
        &mut self.cop0
    }

    pub fn run(&mut self, bus: &mut Bus, cycles: i64) -> Result<(), Error> {
        for _ in 0..cycles {
            self.step(bus)?;
        }

        Ok(())
    }

    pub fn step(&mut self, bus: &mut Bus) -> Result<(), Error> {
        self.delay_slot[0] = self.delay_slot[1];
        self.delay_slot[1] = false;

        self.cpc = self.pc;

        // The aggregated MI line feeds Cause.IP2; the interrupt itself is
        // taken lazily at the next instruction boundary.
        let line = bus.mi().cpu_line();
        self.cop0.set_external_interrupt(line);

        if self.cop0.interrupt_pending() {
            self.raise_exception(Exception::Interrupt);
            self.cop0.tick_counter();

            return Ok(());
        }

        if self.pc & 3 != 0 {
            self.raise_exception(Exception::AddrLoad);
            self.cop0.tick_counter();

            return Ok(());
        }

        let paddr = self.translate_address(self.pc)?;
        let word = bus.read32(paddr)?;

        self.pc = self.npc;
        self.npc = self.npc.wrapping_add(4);

        let op = Operation::from(word);

        self.execute(op, word, bus)?;

        self.cop0.tick_counter();

        Ok(())
    }

    fn translate_address(&self, vaddr: u64) -> Result<u32, Error> {
        let addr = vaddr as u32;

        // Only the unmapped KSEG0/KSEG1 windows are supported.
        if (0x8000_0000..0xc000_0000).contains(&addr) {
            Ok(addr & 0x1fff_ffff)
        } else {
            Err(Error::UnimplementedTlbAccess { vaddr })
        }
    }

    fn branch(
        &mut self,
        target: u64,
        condition: bool,
        link: usize,
        likely: bool,
    ) -> Result<(), Error> {
        if self.delay_slot[0] {
            return Err(Error::BranchInDelaySlot { pc: self.cpc });
        }

        let ra = self.npc;
        self.set_reg(link, ra);

        self.delay_slot[1] = true;

        if condition {
            self.npc = target;
        } else if likely {
            // Annul the delay slot.
            self.pc = self.npc;
            self.npc = self.pc.wrapping_add(4);

            self.delay_slot[1] = false;
        }

        Ok(())
    }

    fn raise_exception(&mut self, exception: Exception) {
        self.raise_exception_coprocessor(exception, 0);
    }

    fn raise_exception_coprocessor(&mut self, exception: Exception, coprocessor: u8) {
        let mut epc = self.cpc;
        let mut bd = false;

        if self.delay_slot[0] {
            epc = epc.wrapping_sub(4);
            bd = true;
        }

        self.cop0.enter_exception(exception, epc, bd, coprocessor);

        self.delay_slot = [false; 2];

        self.pc = ADDR_EXCEPTION_VECTOR;
        self.npc = self.pc.wrapping_add(4);
    }

    fn execute(&mut self, op: Operation, word: u32, bus: &mut Bus) -> Result<(), Error> {
        use self::Operation::*;

        if op.uses_cop1() && !self.cop0.is_coprocessor_usable(1) {
            self.raise_exception_coprocessor(Exception::CoprocessorUnusable, 1);

            return Ok(());
        }

        let fr = self.cop0.is_large_fpu_register_file();

        match op {
            Sll(rd, rt, sa) => {
                let v = (self.reg(rt) as u32) << sa;
                self.set_reg32(rd, v);
            }
            Srl(rd, rt, sa) => {
                let v = (self.reg(rt) as u32) >> sa;
                self.set_reg32(rd, v);
            }
            Sra(rd, rt, sa) => {
                let v = ((self.reg(rt) as i64) >> sa) as u32;
                self.set_reg32(rd, v);
            }
            Sllv(rd, rt, rs) => {
                let v = (self.reg(rt) as u32) << (self.reg(rs) & 0x1f);
                self.set_reg32(rd, v);
            }
            Srlv(rd, rt, rs) => {
                let v = (self.reg(rt) as u32) >> (self.reg(rs) & 0x1f);
                self.set_reg32(rd, v);
            }
            Srav(rd, rt, rs) => {
                let v = ((self.reg(rt) as i64) >> (self.reg(rs) & 0x1f)) as u32;
                self.set_reg32(rd, v);
            }
            Jr(rs) => {
                let target = self.reg(rs);
                self.branch(target, true, 0, false)?;
            }
            Jalr(rd, rs) => {
                let target = self.reg(rs);
                self.branch(target, true, rd, false)?;
            }
            Syscall => self.raise_exception(Exception::Syscall),
            Break => self.raise_exception(Exception::Breakpoint),
            Mfhi(rd) => {
                let hi = self.hi;
                self.set_reg(rd, hi);
            }
            Mthi(rs) => self.hi = self.reg(rs),
            Mflo(rd) => {
                let lo = self.lo;
                self.set_reg(rd, lo);
            }
            Mtlo(rs) => self.lo = self.reg(rs),
            Dsllv(rd, rt, rs) => {
                let v = self.reg(rt) << (self.reg(rs) & 0x3f);
                self.set_reg(rd, v);
            }
            Dsrlv(rd, rt, rs) => {
                let v = self.reg(rt) >> (self.reg(rs) & 0x3f);
                self.set_reg(rd, v);
            }
            Dsrav(rd, rt, rs) => {
                let v = ((self.reg(rt) as i64) >> (self.reg(rs) & 0x3f)) as u64;
                self.set_reg(rd, v);
            }
            Mult(rs, rt) => {
                let a = self.reg(rs) as i32 as i64;
                let b = self.reg(rt) as i32 as i64;

                let result = (a * b) as u64;

                self.lo = result as i32 as i64 as u64;
                self.hi = (result >> 32) as i32 as i64 as u64;
            }
            Multu(rs, rt) => {
                let a = self.reg(rs) as u32 as u64;
                let b = self.reg(rt) as u32 as u64;

                let result = a * b;

                self.lo = result as i32 as i64 as u64;
                self.hi = (result >> 32) as i32 as i64 as u64;
            }
            Div(rs, rt) => {
                let n = self.reg(rs) as i32;
                let d = self.reg(rt) as i32;

                if d == 0 {
                    self.hi = n as i64 as u64;
                    self.lo = if n >= 0 { u64::MAX } else { 1 };
                } else if n == i32::MIN && d == -1 {
                    self.hi = 0;
                    self.lo = i32::MIN as i64 as u64;
                } else {
                    self.hi = (n % d) as i64 as u64;
                    self.lo = (n / d) as i64 as u64;
                }
            }
            Divu(rs, rt) => {
                let n = self.reg(rs) as u32;
                let d = self.reg(rt) as u32;

                if d == 0 {
                    self.hi = n as i32 as i64 as u64;
                    self.lo = u64::MAX;
                } else {
                    self.hi = (n % d) as i32 as i64 as u64;
                    self.lo = (n / d) as i32 as i64 as u64;
                }
            }
            Dmult(rs, rt) => {
                let result = (self.reg(rs) as i64 as i128) * (self.reg(rt) as i64 as i128);

                self.lo = result as u64;
                self.hi = (result >> 64) as u64;
            }
            Dmultu(rs, rt) => {
                let result = (self.reg(rs) as u128) * (self.reg(rt) as u128);

                self.lo = result as u64;
                self.hi = (result >> 64) as u64;
            }
            Ddiv(rs, rt) => {
                let n = self.reg(rs) as i64;
                let d = self.reg(rt) as i64;

                if d == 0 {
                    self.hi = n as u64;
                    self.lo = if n >= 0 { u64::MAX } else { 1 };
                } else if n == i64::MIN && d == -1 {
                    self.hi = 0;
                    self.lo = i64::MIN as u64;
                } else {
                    self.hi = (n % d) as u64;
                    self.lo = (n / d) as u64;
                }
            }
            Ddivu(rs, rt) => {
                let n = self.reg(rs);
                let d = self.reg(rt);

                if d == 0 {
                    self.hi = n;
                    self.lo = u64::MAX;
                } else {
                    self.hi = n % d;
                    self.lo = n / d;
                }
            }
            Add(rd, rs, rt) => {
                let (v, overflow) = (self.reg(rs) as i32).overflowing_add(self.reg(rt) as i32);

                if overflow {
                    self.raise_exception(Exception::Overflow);
                } else {
                    self.set_reg32(rd, v as u32);
                }
            }
            Addu(rd, rs, rt) => {
                let v = (self.reg(rs) as u32).wrapping_add(self.reg(rt) as u32);
                self.set_reg32(rd, v);
            }
            Sub(rd, rs, rt) => {
                let (v, overflow) = (self.reg(rs) as i32).overflowing_sub(self.reg(rt) as i32);

                if overflow {
                    self.raise_exception(Exception::Overflow);
                } else {
                    self.set_reg32(rd, v as u32);
                }
            }
            Subu(rd, rs, rt) => {
                let v = (self.reg(rs) as u32).wrapping_sub(self.reg(rt) as u32);
                self.set_reg32(rd, v);
            }
            And(rd, rs, rt) => {
                let v = self.reg(rs) & self.reg(rt);
                self.set_reg(rd, v);
            }
            Or(rd, rs, rt) => {
                let v = self.reg(rs) | self.reg(rt);
                self.set_reg(rd, v);
            }
            Xor(rd, rs, rt) => {
                let v = self.reg(rs) ^ self.reg(rt);
                self.set_reg(rd, v);
            }
            Nor(rd, rs, rt) => {
                let v = !(self.reg(rs) | self.reg(rt));
                self.set_reg(rd, v);
            }
            Slt(rd, rs, rt) => {
                let v = ((self.reg(rs) as i64) < (self.reg(rt) as i64)) as u64;
                self.set_reg(rd, v);
            }
            Sltu(rd, rs, rt) => {
                let v = (self.reg(rs) < self.reg(rt)) as u64;
                self.set_reg(rd, v);
            }
            Dadd(rd, rs, rt) => {
                let (v, overflow) = (self.reg(rs) as i64).overflowing_add(self.reg(rt) as i64);

                if overflow {
                    self.raise_exception(Exception::Overflow);
                } else {
                    self.set_reg(rd, v as u64);
                }
            }
            Daddu(rd, rs, rt) => {
                let v = self.reg(rs).wrapping_add(self.reg(rt));
                self.set_reg(rd, v);
            }
            Dsub(rd, rs, rt) => {
                let (v, overflow) = (self.reg(rs) as i64).overflowing_sub(self.reg(rt) as i64);

                if overflow {
                    self.raise_exception(Exception::Overflow);
                } else {
                    self.set_reg(rd, v as u64);
                }
            }
            Dsubu(rd, rs, rt) => {
                let v = self.reg(rs).wrapping_sub(self.reg(rt));
                self.set_reg(rd, v);
            }
            Dsll(rd, rt, sa) => {
                let v = self.reg(rt) << sa;
                self.set_reg(rd, v);
            }
            Dsrl(rd, rt, sa) => {
                let v = self.reg(rt) >> sa;
                self.set_reg(rd, v);
            }
            Dsra(rd, rt, sa) => {
                let v = ((self.reg(rt) as i64) >> sa) as u64;
                self.set_reg(rd, v);
            }
            Dsll32(rd, rt, sa) => {
                let v = self.reg(rt) << (sa + 32);
                self.set_reg(rd, v);
            }
            Dsrl32(rd, rt, sa) => {
                let v = self.reg(rt) >> (sa + 32);
                self.set_reg(rd, v);
            }
            Dsra32(rd, rt, sa) => {
                let v = ((self.reg(rt) as i64) >> (sa + 32)) as u64;
                self.set_reg(rd, v);
            }

            Bltz(rs, offset) => {
                let target = self.pc.wrapping_add(offset << 2);
                let condition = (self.reg(rs) as i64) < 0;

                self.branch(target, condition, 0, false)?;
            }
            Bgez(rs, offset) => {
                let target = self.pc.wrapping_add(offset << 2);
                let condition = (self.reg(rs) as i64) >= 0;

                self.branch(target, condition, 0, false)?;
            }
            Bltzl(rs, offset) => {
                let target = self.pc.wrapping_add(offset << 2);
                let condition = (self.reg(rs) as i64) < 0;

                self.branch(target, condition, 0, true)?;
            }
            Bgezl(rs, offset) => {
                let target = self.pc.wrapping_add(offset << 2);
                let condition = (self.reg(rs) as i64) >= 0;

                self.branch(target, condition, 0, true)?;
            }
            Bltzal(rs, offset) => {
                let target = self.pc.wrapping_add(offset << 2);
                let condition = (self.reg(rs) as i64) < 0;

                self.branch(target, condition, 31, false)?;
            }
            Bgezal(rs, offset) => {
                let target = self.pc.wrapping_add(offset << 2);
                let condition = (self.reg(rs) as i64) >= 0;

                self.branch(target, condition, 31, false)?;
            }

            J(target) => {
                let target = (self.pc & 0xffff_ffff_f000_0000) | ((target as u64) << 2);
                self.branch(target, true, 0, false)?;
            }
            Jal(target) => {
                let target = (self.pc & 0xffff_ffff_f000_0000) | ((target as u64) << 2);
                self.branch(target, true, 31, false)?;
            }
            Beq(rs, rt, offset) => {
                let target = self.pc.wrapping_add(offset << 2);
                let condition = self.reg(rs) == self.reg(rt);

                self.branch(target, condition, 0, false)?;
            }
            Bne(rs, rt, offset) => {
                let target = self.pc.wrapping_add(offset << 2);
                let condition = self.reg(rs) != self.reg(rt);

                self.branch(target, condition, 0, false)?;
            }
            Blez(rs, offset) => {
                let target = self.pc.wrapping_add(offset << 2);
                let condition = (self.reg(rs) as i64) <= 0;

                self.branch(target, condition, 0, false)?;
            }
            Bgtz(rs, offset) => {
                let target = self.pc.wrapping_add(offset << 2);
                let condition = (self.reg(rs) as i64) > 0;

                self.branch(target, condition, 0, false)?;
            }
            Beql(rs, rt, offset) => {
                let target = self.pc.wrapping_add(offset << 2);
                let condition = self.reg(rs) == self.reg(rt);

                self.branch(target, condition, 0, true)?;
            }
            Bnel(rs, rt, offset) => {
                let target = self.pc.wrapping_add(offset << 2);
                let condition = self.reg(rs) != self.reg(rt);

                self.branch(target, condition, 0, true)?;
            }
            Blezl(rs, offset) => {
                let target = self.pc.wrapping_add(offset << 2);
                let condition = (self.reg(rs) as i64) <= 0;

                self.branch(target, condition, 0, true)?;
            }
            Bgtzl(rs, offset) => {
                let target = self.pc.wrapping_add(offset << 2);
                let condition = (self.reg(rs) as i64) > 0;

                self.branch(target, condition, 0, true)?;
            }

            Addi(rt, rs, imm) => {
                let (v, overflow) = (self.reg(rs) as i32).overflowing_add(imm as i32);

                if overflow {
                    self.raise_exception(Exception::Overflow);
                } else {
                    self.set_reg32(rt, v as u32);
                }
            }
            Addiu(rt, rs, imm) => {
                let v = (self.reg(rs).wrapping_add(imm)) as u32;
                self.set_reg32(rt, v);
            }
            Slti(rt, rs, imm) => {
                let v = ((self.reg(rs) as i64) < (imm as i64)) as u64;
                self.set_reg(rt, v);
            }
            Sltiu(rt, rs, imm) => {
                let v = (self.reg(rs) < imm) as u64;
                self.set_reg(rt, v);
            }
            Andi(rt, rs, imm) => {
                let v = self.reg(rs) & imm as u64;
                self.set_reg(rt, v);
            }
            Ori(rt, rs, imm) => {
                let v = self.reg(rs) | imm as u64;
                self.set_reg(rt, v);
            }
            Xori(rt, rs, imm) => {
                let v = self.reg(rs) ^ imm as u64;
                self.set_reg(rt, v);
            }
            Lui(rt, imm) => self.set_reg32(rt, imm << 16),
            Daddi(rt, rs, imm) => {
                let (v, overflow) = (self.reg(rs) as i64).overflowing_add(imm as i64);

                if overflow {
                    self.raise_exception(Exception::Overflow);
                } else {
                    self.set_reg(rt, v as u64);
                }
            }
            Daddiu(rt, rs, imm) => {
                let v = self.reg(rs).wrapping_add(imm);
                self.set_reg(rt, v);
            }

            Lb(rt, rs, offset) => {
                let vaddr = self.reg(rs).wrapping_add(offset);
                let paddr = self.translate_address(vaddr)?;

                let v = bus.read8(paddr)? as i8 as i64 as u64;
                self.set_reg(rt, v);
            }
            Lbu(rt, rs, offset) => {
                let vaddr = self.reg(rs).wrapping_add(offset);
                let paddr = self.translate_address(vaddr)?;

                let v = bus.read8(paddr)? as u64;
                self.set_reg(rt, v);
            }
            Lh(rt, rs, offset) => {
                let vaddr = self.reg(rs).wrapping_add(offset);

                if vaddr & 1 != 0 {
                    self.raise_exception(Exception::AddrLoad);
                    return Ok(());
                }

                let paddr = self.translate_address(vaddr)?;

                let v = bus.read16(paddr)? as i16 as i64 as u64;
                self.set_reg(rt, v);
            }
            Lhu(rt, rs, offset) => {
                let vaddr = self.reg(rs).wrapping_add(offset);

                if vaddr & 1 != 0 {
                    self.raise_exception(Exception::AddrLoad);
                    return Ok(());
                }

                let paddr = self.translate_address(vaddr)?;

                let v = bus.read16(paddr)? as u64;
                self.set_reg(rt, v);
            }
            Lw(rt, rs, offset) => {
                let vaddr = self.reg(rs).wrapping_add(offset);

                if vaddr & 3 != 0 {
                    self.raise_exception(Exception::AddrLoad);
                    return Ok(());
                }

                let paddr = self.translate_address(vaddr)?;

                let v = bus.read32(paddr)?;
                self.set_reg32(rt, v);
            }
            Lwu(rt, rs, offset) => {
                let vaddr = self.reg(rs).wrapping_add(offset);

                if vaddr & 3 != 0 {
                    self.raise_exception(Exception::AddrLoad);
                    return Ok(());
                }

                let paddr = self.translate_address(vaddr)?;

                let v = bus.read32(paddr)? as u64;
                self.set_reg(rt, v);
            }
            Ld(rt, rs, offset) => {
                let vaddr = self.reg(rs).wrapping_add(offset);

                if vaddr & 7 != 0 {
                    self.raise_exception(Exception::AddrLoad);
                    return Ok(());
                }

                let paddr = self.translate_address(vaddr)?;

                let v = bus.read64(paddr)?;
                self.set_reg(rt, v);
            }
            Sb(rt, rs, offset) => {
                let vaddr = self.reg(rs).wrapping_add(offset);
                let paddr = self.translate_address(vaddr)?;

                bus.write8(paddr, self.reg(rt) as u8)?;
            }
            Sh(rt, rs, offset) => {
                let vaddr = self.reg(rs).wrapping_add(offset);

                if vaddr & 1 != 0 {
                    self.raise_exception(Exception::AddrStore);
                    return Ok(());
                }

                let paddr = self.translate_address(vaddr)?;

                bus.write16(paddr, self.reg(rt) as u16)?;
            }
            Sw(rt, rs, offset) => {
                let vaddr = self.reg(rs).wrapping_add(offset);

                if vaddr & 3 != 0 {
                    self.raise_exception(Exception::AddrStore);
                    return Ok(());
                }

                let paddr = self.translate_address(vaddr)?;

                bus.write32(paddr, self.reg(rt) as u32)?;
            }
            Sd(rt, rs, offset) => {
                let vaddr = self.reg(rs).wrapping_add(offset);

                if vaddr & 7 != 0 {
                    self.raise_exception(Exception::AddrStore);
                    return Ok(());
                }

                let paddr = self.translate_address(vaddr)?;

                bus.write64(paddr, self.reg(rt))?;
            }
            Cache => {}

            Mfc0(rd, rt) => {
                let v = self.cop0.read(rd);
                self.set_reg32(rt, v);
            }
            Mtc0(rd, rt) => {
                let v = self.reg(rt) as u32;
                self.cop0.write(rd, v);
            }
            Tlbwi => log::warn!("[CPU] TLBWI instruction"),
            Eret => {
                if self.cop0.error_level() {
                    return Err(Error::Unimplemented(String::from("return from Error")));
                }

                self.cop0.leave_exception();

                self.pc = self.cop0.epc();
                self.npc = self.pc.wrapping_add(4);

                self.delay_slot = [false; 2];
                self.ll_bit = false;
            }

            Mfc1(fs, rt) => {
                let v = self.fpu.read32(fs, fr);
                self.set_reg32(rt, v);
            }
            Dmfc1(fs, rt) => {
                let v = self.fpu.read64(fs, fr);
                self.set_reg(rt, v);
            }
            Mtc1(fs, rt) => {
                let v = self.reg(rt) as u32;
                self.fpu.write32(fs, v, fr);
            }
            Dmtc1(fs, rt) => {
                let v = self.reg(rt);
                self.fpu.write64(fs, v, fr);
            }
            Cfc1(fs, rt) => {
                let v = self.fpu.read_control(fs);
                self.set_reg32(rt, v);
            }
            Ctc1(fs, rt) => {
                let v = self.reg(rt) as u32;
                self.fpu.write_control(fs, v);
            }
            Bc1(condition, likely, offset) => {
                let target = self.pc.wrapping_add(offset << 2);
                let taken = self.fpu.condition() == condition;

                self.branch(target, taken, 0, likely)?;
            }
            Lwc1(ft, rs, offset) => {
                let vaddr = self.reg(rs).wrapping_add(offset);

                if vaddr & 3 != 0 {
                    self.raise_exception(Exception::AddrLoad);
                    return Ok(());
                }

                let paddr = self.translate_address(vaddr)?;

                let v = bus.read32(paddr)?;
                self.fpu.write32(ft, v, fr);
            }
            Ldc1(ft, rs, offset) => {
                let vaddr = self.reg(rs).wrapping_add(offset);

                if vaddr & 7 != 0 {
                    self.raise_exception(Exception::AddrLoad);
                    return Ok(());
                }

                let paddr = self.translate_address(vaddr)?;

                let v = bus.read64(paddr)?;
                self.fpu.write64(ft, v, fr);
            }
            Swc1(ft, rs, offset) => {
                let vaddr = self.reg(rs).wrapping_add(offset);

                if vaddr & 3 != 0 {
                    self.raise_exception(Exception::AddrStore);
                    return Ok(());
                }

                let paddr = self.translate_address(vaddr)?;

                bus.write32(paddr, self.fpu.read32(ft, fr))?;
            }
            Sdc1(ft, rs, offset) => {
                let vaddr = self.reg(rs).wrapping_add(offset);

                if vaddr & 7 != 0 {
                    self.raise_exception(Exception::AddrStore);
                    return Ok(());
                }

                let paddr = self.translate_address(vaddr)?;

                bus.write64(paddr, self.fpu.read64(ft, fr))?;
            }

            FAdd(fmt, fd, fs, ft) => self.fpu.add(fmt, fd, fs, ft, fr)?,
            FSub(fmt, fd, fs, ft) => self.fpu.sub(fmt, fd, fs, ft, fr)?,
            FMul(fmt, fd, fs, ft) => self.fpu.mul(fmt, fd, fs, ft, fr)?,
            FDiv(fmt, fd, fs, ft) => self.fpu.div(fmt, fd, fs, ft, fr)?,
            FMov(fmt, fd, fs) => self.fpu.mov(fmt, fd, fs, fr)?,
            FTruncW(fmt, fd, fs) => self.fpu.trunc_w(fmt, fd, fs, fr)?,
            FCvtS(fmt, fd, fs) => self.fpu.cvt_s(fmt, fd, fs, fr)?,
            FCvtD(fmt, fd, fs) => self.fpu.cvt_d(fmt, fd, fs, fr)?,
            FCvtW(fmt, fd, fs) => self.fpu.cvt_w(fmt, fd, fs, fr)?,
            FCompare(fmt, fs, ft, condition) => self.fpu.compare(fmt, fs, ft, condition, fr)?,

            Unknown(_) => {
                return Err(Error::UnknownOpcode {
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

    const RAM_BASE: u64 = 0xffff_ffff_8000_1000;

    fn cpu_with_program(program: &[u32]) -> (Cpu, Bus) {
        let mut bus = Bus::new(
            vec![0; super::super::bus::BOOT_ROM_SIZE].into_boxed_slice(),
            vec![0; super::super::pif::ROM_SIZE].into_boxed_slice(),
            vec![0; 0x1000].into_boxed_slice(),
        );

        for (index, word) in program.iter().enumerate() {
            bus.write32(0x1000 + 4 * index as u32, *word).unwrap();
        }

        let mut cpu = Cpu::new();
        cpu.reset();
        cpu.set_pc(RAM_BASE);

        (cpu, bus)
    }

    #[test]
    fn register_zero_is_hardwired() {
        // addiu r0, r0, 0x1234; ori r1, r0, 1
        let (mut cpu, mut bus) = cpu_with_program(&[0x2400_1234, 0x3401_0001]);

        cpu.run(&mut bus, 2).unwrap();

        assert_eq!(cpu.reg(0), 0);
        assert_eq!(cpu.reg(1), 1);
    }

    #[test]
    fn nop_only_advances_the_pc() {
        let (mut cpu, mut bus) = cpu_with_program(&[0x0000_0000]);

        cpu.step(&mut bus).unwrap();

        assert_eq!(cpu.pc, RAM_BASE + 4);
        assert!(cpu.regs.iter().all(|&r| r == 0));
        assert_eq!(cpu.hi, 0);
        assert_eq!(cpu.lo, 0);
    }

    #[test]
    fn immediate_results_sign_extend() {
        // lui r1, 0x8000; addiu r2, r0, -1
        let (mut cpu, mut bus) = cpu_with_program(&[0x3c01_8000, 0x2402_ffff]);

        cpu.run(&mut bus, 2).unwrap();

        assert_eq!(cpu.reg(1), 0xffff_ffff_8000_0000);
        assert_eq!(cpu.reg(2), 0xffff_ffff_ffff_ffff);
    }

    #[test]
    fn boot_style_lui_ori_sequence() {
        // lui r1, 0; ori r1, r1, 0x1234 -- the cartridge fast-path pattern.
        let (mut cpu, mut bus) = cpu_with_program(&[0x3c01_0000, 0x3421_1234]);

        cpu.run(&mut bus, 2).unwrap();

        assert_eq!(cpu.reg(1), 0x1234);
    }

    #[test]
    fn taken_branch_executes_its_delay_slot() {
        // beq r0, r0, +2; ori r1, r0, 1; ori r2, r0, 2 (skipped);
        // ori r3, r0, 3 (target)
        let (mut cpu, mut bus) = cpu_with_program(&[
            0x1000_0002,
            0x3401_0001,
            0x3402_0002,
            0x3403_0003,
        ]);

        cpu.run(&mut bus, 3).unwrap();

        assert_eq!(cpu.reg(1), 1);
        assert_eq!(cpu.reg(2), 0);
        assert_eq!(cpu.reg(3), 3);
    }

    #[test]
    fn not_taken_likely_branch_annuls_the_delay_slot() {
        // beql r0, r1, +2 with r1 != 0: not taken, the delay slot is
        // annulled and PC+8 executes next.
        let (mut cpu, mut bus) = cpu_with_program(&[
            0x3401_0001, // ori r1, r0, 1
            0x5001_0002, // beql r0, r1, +2
            0x3402_0002, // ori r2, r0, 2 (annulled)
            0x3403_0003, // ori r3, r0, 3
        ]);

        cpu.run(&mut bus, 3).unwrap();

        assert_eq!(cpu.reg(2), 0);
        assert_eq!(cpu.reg(3), 3);
    }

    #[test]
    fn jal_links_past_the_delay_slot() {
        // jal 0x80001010; nop
        let (mut cpu, mut bus) = cpu_with_program(&[0x0c00_0404, 0x0000_0000]);

        cpu.run(&mut bus, 2).unwrap();

        assert_eq!(cpu.reg(31), RAM_BASE + 8);
        assert_eq!(cpu.pc, 0xffff_ffff_8000_1010);
    }

    #[test]
    fn division_edge_cases() {
        let (mut cpu, mut bus) = cpu_with_program(&[
            0x3401_0007, // ori r1, r0, 7
            0x0020_001a, // div r1, r0 (divide by zero, positive)
            0x0000_0000,
        ]);

        cpu.run(&mut bus, 2).unwrap();

        assert_eq!(cpu.lo, u64::MAX);
        assert_eq!(cpu.hi, 7);

        // INT_MIN / -1 saturates.
        let (mut cpu, mut bus) = cpu_with_program(&[
            0x3c01_8000, // lui r1, 0x8000
            0x2402_ffff, // addiu r2, r0, -1
            0x0022_001a, // div r1, r2
        ]);

        cpu.run(&mut bus, 3).unwrap();

        assert_eq!(cpu.lo, 0xffff_ffff_8000_0000);
        assert_eq!(cpu.hi, 0);
    }

    #[test]
    fn add_overflow_raises_and_skips_the_writeback() {
        let (mut cpu, mut bus) = cpu_with_program(&[
            0x3c01_7fff, // lui r1, 0x7fff
            0x3421_ffff, // ori r1, r1, 0xffff
            0x3402_0001, // ori r2, r0, 1
            0x0022_1820, // add r3, r1, r2
        ]);

        cpu.run(&mut bus, 4).unwrap();

        assert_eq!(cpu.reg(3), 0);
        assert_eq!(cpu.pc, 0xffff_ffff_8000_0180);

        // Cause holds the overflow code, EPC the faulting instruction.
        assert_eq!((cpu.cop0.read(13) >> 2) & 0x1f, 12);
        assert_eq!(cpu.cop0.read(14), 0x8000_100c);
    }

    #[test]
    fn sixty_four_bit_shifts() {
        let (mut cpu, mut bus) = cpu_with_program(&[
            0x3401_0001, // ori r1, r0, 1
            0x0001_0ffc, // dsll32 r1, r1, 31
            0x0001_17ff, // dsra32 r2, r1, 31
        ]);

        cpu.run(&mut bus, 3).unwrap();

        assert_eq!(cpu.reg(1), 0x8000_0000_0000_0000);
        assert_eq!(cpu.reg(2), 0xffff_ffff_ffff_ffff);
    }

    #[test]
    fn counter_interrupt_fires_after_the_crossing() {
        let (mut cpu, mut bus) = cpu_with_program(&[0x0000_0000; 0x100]);

        // Compare = 0x10, IM7 | IE.
        cpu.cop0.write(11, 0x10);
        cpu.cop0.write(12, 1 | (1 << 15));

        cpu.run(&mut bus, 64).unwrap();

        assert_ne!(cpu.cop0.read(13) & (1 << 15), 0);

        // The next boundary takes the interrupt.
        cpu.step(&mut bus).unwrap();

        assert_eq!(cpu.pc, 0xffff_ffff_8000_0180);
        assert_eq!((cpu.cop0.read(13) >> 2) & 0x1f, 0);
        assert_eq!(cpu.cop0.read(14), (RAM_BASE + 4 * 64) as u32);
    }

    #[test]
    fn eret_returns_to_the_epc() {
        let (mut cpu, mut bus) = cpu_with_program(&[0x0000_000c]); // syscall

        cpu.step(&mut bus).unwrap();

        assert_eq!(cpu.pc, 0xffff_ffff_8000_0180);
        assert_eq!((cpu.cop0.read(13) >> 2) & 0x1f, 8);

        // Place an eret at the vector.
        bus.write32(0x180, 0x4200_0018).unwrap();

        cpu.step(&mut bus).unwrap();

        assert_eq!(cpu.pc, RAM_BASE);
        assert!(!cpu.cop0.exception_level());
    }

    #[test]
    fn coprocessor_unusable_without_cu1() {
        // mtc1 r0, f0 with CU1 clear
        let (mut cpu, mut bus) = cpu_with_program(&[0x4480_0000]);

        cpu.step(&mut bus).unwrap();

        assert_eq!(cpu.pc, 0xffff_ffff_8000_0180);
        assert_eq!((cpu.cop0.read(13) >> 2) & 0x1f, 11);
        assert_eq!((cpu.cop0.read(13) >> 28) & 3, 1);
    }

    #[test]
    fn branch_in_delay_slot_is_fatal() {
        let (mut cpu, mut bus) = cpu_with_program(&[
            0x1000_0002, // beq r0, r0, +2
            0x1000_0002, // beq in the delay slot
        ]);

        cpu.step(&mut bus).unwrap();
        assert!(matches!(
            cpu.step(&mut bus),
            Err(Error::BranchInDelaySlot { .. })
        ));
    }

    #[test]
    fn unknown_instructions_are_fatal() {
        let (mut cpu, mut bus) = cpu_with_program(&[0xffff_ffff]);

        assert!(matches!(
            cpu.step(&mut bus),
            Err(Error::UnknownOpcode { .. })
        ));
    }

    #[test]
    fn tlb_mapped_regions_are_fatal() {
        let (mut cpu, mut bus) = cpu_with_program(&[0x0000_0000]);

        cpu.set_pc(0x0000_1000);

        assert!(matches!(
            cpu.step(&mut bus),
            Err(Error::UnimplementedTlbAccess { .. })
        ));
    }
}
