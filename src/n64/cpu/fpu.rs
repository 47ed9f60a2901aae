use log::{debug, warn};
use serde::{Deserialize, Serialize};

use super::super::error::Error;
use super::ops::FpuFormat;

const FPR_NUM: usize = 32;
const FPR_MASK: usize = FPR_NUM - 2;

const CONDITION_LESS_THAN: u32 = 1 << 0;
const CONDITION_EQUAL: u32 = 1 << 1;
const CONDITION_UNORDERED: u32 = 1 << 2;
const CONDITION_SIGNALING: u32 = 1 << 3;

const ROUND_NEAREST: u32 = 0;
const ROUND_TOWARD_ZERO: u32 = 1;
const ROUND_TOWARD_POSITIVE: u32 = 2;
const ROUND_TOWARD_NEGATIVE: u32 = 3;

#[derive(Deserialize, Serialize)]
struct Control {
    rounding_mode: u32,
    flags: u32,
    enables: u32,
    cause: u32,
    condition: bool,
    flush_enable: bool,
}

impl Control {
    pub fn new() -> Control {
        Control {
            rounding_mode: 0,
            flags: 0,
            enables: 0,
            cause: 0,
            condition: false,
            flush_enable: false,
        }
    }

    pub fn read(&self) -> u32 {
        self.rounding_mode
            | (self.flags & 0x1f) << 2
            | (self.enables & 0x1f) << 7
            | (self.cause & 0x3f) << 12
            | (self.condition as u32) << 23
            | (self.flush_enable as u32) << 24
    }

    pub fn write(&mut self, value: u32) {
        self.rounding_mode = value & 3;
        self.flags = (value >> 2) & 0x1f;
        self.enables = (value >> 7) & 0x1f;
        self.cause = (value >> 12) & 0x3f;
        self.condition = (value & (1 << 23)) != 0;
        self.flush_enable = (value & (1 << 24)) != 0;
    }
}

/// The FPU register file: 32 64-bit slots whose view depends on Status.FR.
/// With the small file, odd single indices alias the upper word of the even
/// slot below them.
#[derive(Deserialize, Serialize)]
pub struct Fpu {
    fprs: [u64; FPR_NUM],

    control: Control,
}

impl Fpu {
    pub fn new() -> Fpu {
        Fpu {
            fprs: [0; FPR_NUM],

            control: Control::new(),
        }
    }

    pub fn reset(&mut self) {
        *self = Fpu::new();
    }

    pub fn condition(&self) -> bool {
        self.control.condition
    }

    pub fn read32(&self, index: usize, fr: bool) -> u32 {
        if fr {
            self.fprs[index] as u32
        } else if (index & 1) != 0 {
            (self.fprs[index & FPR_MASK] >> 32) as u32
        } else {
            self.fprs[index] as u32
        }
    }

    pub fn read64(&self, index: usize, fr: bool) -> u64 {
        if fr {
            self.fprs[index]
        } else {
            self.fprs[index & FPR_MASK]
        }
    }

    pub fn write32(&mut self, index: usize, data: u32, fr: bool) {
        if fr {
            self.fprs[index] = (self.fprs[index] & 0xffff_ffff_0000_0000) | data as u64;
        } else if (index & 1) != 0 {
            let slot = index & FPR_MASK;

            self.fprs[slot] = (self.fprs[slot] & 0xffff_ffff) | ((data as u64) << 32);
        } else {
            self.fprs[index] = (self.fprs[index] & 0xffff_ffff_0000_0000) | data as u64;
        }
    }

    pub fn write64(&mut self, index: usize, data: u64, fr: bool) {
        if fr {
            self.fprs[index] = data;
        } else {
            self.fprs[index & FPR_MASK] = data;
        }
    }

    pub fn read_control(&self, index: usize) -> u32 {
        match index {
            0 => 0x0a00,
            31 => self.control.read(),
            _ => {
                warn!("[FPU] Unimplemented control register {} read", index);

                0
            }
        }
    }

    pub fn write_control(&mut self, index: usize, data: u32) {
        match index {
            31 => {
                self.control.write(data);

                debug!("[FPU] Rounding mode = {}", self.control.rounding_mode);
            }
            _ => warn!(
                "[FPU] Unimplemented control register {} write (data = 0x{:08x})",
                index, data
            ),
        }
    }

    fn single(&self, index: usize, fr: bool) -> f32 {
        f32::from_bits(self.read32(index, fr))
    }

    fn double(&self, index: usize, fr: bool) -> f64 {
        f64::from_bits(self.read64(index, fr))
    }

    fn set_single(&mut self, index: usize, value: f32, fr: bool) {
        self.write32(index, value.to_bits(), fr);
    }

    fn set_double(&mut self, index: usize, value: f64, fr: bool) {
        self.write64(index, value.to_bits(), fr);
    }

    pub fn add(&mut self, fmt: FpuFormat, fd: usize, fs: usize, ft: usize, fr: bool) -> Result<(), Error> {
        match fmt {
            FpuFormat::Single => {
                let v = self.single(fs, fr) + self.single(ft, fr);
                self.set_single(fd, v, fr);
            }
            FpuFormat::Double => {
                let v = self.double(fs, fr) + self.double(ft, fr);
                self.set_double(fd, v, fr);
            }
            _ => return Err(Error::Unimplemented(format!("ADD.{:?}", fmt))),
        }

        Ok(())
    }

    pub fn sub(&mut self, fmt: FpuFormat, fd: usize, fs: usize, ft: usize, fr: bool) -> Result<(), Error> {
        match fmt {
            FpuFormat::Single => {
                let v = self.single(fs, fr) - self.single(ft, fr);
                self.set_single(fd, v, fr);
            }
            FpuFormat::Double => {
                let v = self.double(fs, fr) - self.double(ft, fr);
                self.set_double(fd, v, fr);
            }
            _ => return Err(Error::Unimplemented(format!("SUB.{:?}", fmt))),
        }

        Ok(())
    }

    pub fn mul(&mut self, fmt: FpuFormat, fd: usize, fs: usize, ft: usize, fr: bool) -> Result<(), Error> {
        match fmt {
            FpuFormat::Single => {
                let v = self.single(fs, fr) * self.single(ft, fr);
                self.set_single(fd, v, fr);
            }
            FpuFormat::Double => {
                let v = self.double(fs, fr) * self.double(ft, fr);
                self.set_double(fd, v, fr);
            }
            _ => return Err(Error::Unimplemented(format!("MUL.{:?}", fmt))),
        }

        Ok(())
    }

    pub fn div(&mut self, fmt: FpuFormat, fd: usize, fs: usize, ft: usize, fr: bool) -> Result<(), Error> {
        match fmt {
            FpuFormat::Single => {
                let v = self.single(fs, fr) / self.single(ft, fr);
                self.set_single(fd, v, fr);
            }
            FpuFormat::Double => {
                let v = self.double(fs, fr) / self.double(ft, fr);
                self.set_double(fd, v, fr);
            }
            _ => return Err(Error::Unimplemented(format!("DIV.{:?}", fmt))),
        }

        Ok(())
    }

    pub fn mov(&mut self, fmt: FpuFormat, fd: usize, fs: usize, fr: bool) -> Result<(), Error> {
        match fmt {
            FpuFormat::Single => {
                let v = self.read32(fs, fr);
                self.write32(fd, v, fr);
            }
            FpuFormat::Double => {
                let v = self.read64(fs, fr);
                self.write64(fd, v, fr);
            }
            _ => return Err(Error::Unimplemented(format!("MOV.{:?}", fmt))),
        }

        Ok(())
    }

    /// Truncation ignores the rounding-mode field: the hardware opcode
    /// always rounds toward zero.
    pub fn trunc_w(&mut self, fmt: FpuFormat, fd: usize, fs: usize, fr: bool) -> Result<(), Error> {
        let data = match fmt {
            FpuFormat::Single => self.single(fs, fr).trunc() as i32 as u32,
            FpuFormat::Double => self.double(fs, fr).trunc() as i32 as u32,
            _ => return Err(Error::Unimplemented(format!("TRUNC.W.{:?}", fmt))),
        };

        self.write32(fd, data, fr);

        Ok(())
    }

    pub fn cvt_s(&mut self, fmt: FpuFormat, fd: usize, fs: usize, fr: bool) -> Result<(), Error> {
        let data = match fmt {
            FpuFormat::Double => self.double(fs, fr) as f32,
            FpuFormat::Word => self.read32(fs, fr) as i32 as f32,
            _ => return Err(Error::Unimplemented(format!("CVT.S.{:?}", fmt))),
        };

        self.set_single(fd, data, fr);

        Ok(())
    }

    pub fn cvt_d(&mut self, fmt: FpuFormat, fd: usize, fs: usize, fr: bool) -> Result<(), Error> {
        let data = match fmt {
            FpuFormat::Single => self.single(fs, fr) as f64,
            FpuFormat::Word => self.read32(fs, fr) as i32 as f64,
            _ => return Err(Error::Unimplemented(format!("CVT.D.{:?}", fmt))),
        };

        self.set_double(fd, data, fr);

        Ok(())
    }

    pub fn cvt_w(&mut self, fmt: FpuFormat, fd: usize, fs: usize, fr: bool) -> Result<(), Error> {
        let value = match fmt {
            FpuFormat::Single => self.single(fs, fr) as f64,
            FpuFormat::Double => self.double(fs, fr),
            _ => return Err(Error::Unimplemented(format!("CVT.W.{:?}", fmt))),
        };

        let data = match self.control.rounding_mode {
            ROUND_NEAREST => value.round(),
            ROUND_TOWARD_ZERO => value.trunc(),
            ROUND_TOWARD_POSITIVE => value.ceil(),
            ROUND_TOWARD_NEGATIVE => value.floor(),
            _ => unreachable!(),
        } as i32 as u32;

        self.write32(fd, data, fr);

        Ok(())
    }

    /// C.cond.fmt: the 4-bit selector picks less-than/equal/unordered, with
    /// bit 3 requesting a signaling compare.
    pub fn compare(&mut self, fmt: FpuFormat, fs: usize, ft: usize, condition: u32, fr: bool) -> Result<(), Error> {
        let (a, b) = match fmt {
            FpuFormat::Single => (self.single(fs, fr) as f64, self.single(ft, fr) as f64),
            FpuFormat::Double => (self.double(fs, fr), self.double(ft, fr)),
            _ => return Err(Error::Unimplemented(format!("C.cond.{:?}", fmt))),
        };

        let mut flags = 0;

        if a.is_nan() || b.is_nan() {
            if (condition & CONDITION_SIGNALING) != 0 {
                warn!("[FPU] Unhandled Invalid Operation exception");
            }

            flags |= CONDITION_UNORDERED;
        } else {
            if a < b {
                flags |= CONDITION_LESS_THAN;
            }

            if a == b {
                flags |= CONDITION_EQUAL;
            }
        }

        self.control.condition = (condition & flags) != 0;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn small_register_file_pairs_singles() {
        let mut fpu = Fpu::new();

        fpu.write32(0, 0x1111_1111, false);
        fpu.write32(1, 0x2222_2222, false);

        // Odd index aliases the upper half of the even slot.
        assert_eq!(fpu.read64(0, false), 0x2222_2222_1111_1111);
        assert_eq!(fpu.read64(1, false), 0x2222_2222_1111_1111);

        // The large file gives every index its own slot.
        fpu.write32(1, 0x3333_3333, true);
        assert_eq!(fpu.read32(1, true), 0x3333_3333);
        assert_eq!(fpu.read32(0, true), 0x1111_1111);
    }

    #[test]
    fn single_to_double_and_back_is_identity() {
        let mut fpu = Fpu::new();

        for value in [0.0f32, 1.5, -2.25, 1.0e20, -3.5e-20, f32::MAX] {
            fpu.write32(2, value.to_bits(), false);

            fpu.cvt_d(FpuFormat::Single, 4, 2, false).unwrap();
            fpu.cvt_s(FpuFormat::Double, 6, 4, false).unwrap();

            assert_eq!(fpu.read32(6, false), value.to_bits());
        }
    }

    #[test]
    fn trunc_rounds_toward_zero_regardless_of_mode() {
        let mut fpu = Fpu::new();

        // Rounding mode: toward negative infinity.
        fpu.write_control(31, 3);

        fpu.write32(2, (-1.7f32).to_bits(), false);
        fpu.trunc_w(FpuFormat::Single, 4, 2, false).unwrap();

        assert_eq!(fpu.read32(4, false), (-1i32) as u32);
    }

    #[test]
    fn compare_handles_nan_as_unordered() {
        let mut fpu = Fpu::new();

        fpu.write32(2, 1.0f32.to_bits(), false);
        fpu.write32(4, f32::NAN.to_bits(), false);

        // c.eq: NaN is not equal.
        fpu.compare(FpuFormat::Single, 2, 4, CONDITION_EQUAL, false).unwrap();
        assert!(!fpu.condition());

        // c.ueq: unordered-or-equal holds.
        fpu.compare(
            FpuFormat::Single,
            2,
            4,
            CONDITION_EQUAL | CONDITION_UNORDERED,
            false,
        )
        .unwrap();
        assert!(fpu.condition());

        // c.lt on ordered operands.
        fpu.write32(4, 2.0f32.to_bits(), false);
        fpu.compare(FpuFormat::Single, 2, 4, CONDITION_LESS_THAN, false).unwrap();
        assert!(fpu.condition());
    }

    #[test]
    fn arithmetic_in_both_precisions() {
        let mut fpu = Fpu::new();

        fpu.write32(2, 6.0f32.to_bits(), false);
        fpu.write32(4, 1.5f32.to_bits(), false);

        fpu.div(FpuFormat::Single, 6, 2, 4, false).unwrap();
        assert_eq!(f32::from_bits(fpu.read32(6, false)), 4.0);

        fpu.write64(8, 6.25f64.to_bits(), false);
        fpu.write64(10, 0.25f64.to_bits(), false);

        fpu.mul(FpuFormat::Double, 12, 8, 10, false).unwrap();
        assert_eq!(f64::from_bits(fpu.read64(12, false)), 1.5625);
    }
}
