#[derive(Clone, Copy)]
pub struct Instruction(pub u32);

impl Instruction {
    pub fn opcode(&self) -> usize {
        ((self.0 >> 26) & 0x3f) as usize
    }

    pub fn rs(&self) -> usize {
        ((self.0 >> 21) & 0x1f) as usize
    }

    pub fn rt(&self) -> usize {
        ((self.0 >> 16) & 0x1f) as usize
    }

    pub fn rd(&self) -> usize {
        ((self.0 >> 11) & 0x1f) as usize
    }

    pub fn shift(&self) -> usize {
        ((self.0 >> 6) & 0x1f) as usize
    }

    pub fn imm(&self) -> u32 {
        self.0 & 0xffff
    }

    pub fn imm_se(&self) -> u64 {
        (self.0 & 0xffff) as i16 as i64 as u64
    }

    pub fn function(&self) -> usize {
        (self.0 & 0x3f) as usize
    }

    pub fn target(&self) -> u32 {
        self.0 & 0x3ff_ffff
    }
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub enum FpuFormat {
    Single,
    Double,
    Word,
    Long,
}

#[derive(Clone, Copy)]
pub enum Operation {
    Sll(usize, usize, usize),
    Srl(usize, usize, usize),
    Sra(usize, usize, usize),
    Sllv(usize, usize, usize),
    Srlv(usize, usize, usize),
    Srav(usize, usize, usize),
    Jr(usize),
    Jalr(usize, usize),
    Syscall,
    Break,
    Mfhi(usize),
    Mthi(usize),
    Mflo(usize),
    Mtlo(usize),
    Dsllv(usize, usize, usize),
    Dsrlv(usize, usize, usize),
    Dsrav(usize, usize, usize),
    Mult(usize, usize),
    Multu(usize, usize),
    Div(usize, usize),
    Divu(usize, usize),
    Dmult(usize, usize),
    Dmultu(usize, usize),
    Ddiv(usize, usize),
    Ddivu(usize, usize),
    Add(usize, usize, usize),
    Addu(usize, usize, usize),
    Sub(usize, usize, usize),
    Subu(usize, usize, usize),
    And(usize, usize, usize),
    Or(usize, usize, usize),
    Xor(usize, usize, usize),
    Nor(usize, usize, usize),
    Slt(usize, usize, usize),
    Sltu(usize, usize, usize),
    Dadd(usize, usize, usize),
    Daddu(usize, usize, usize),
    Dsub(usize, usize, usize),
    Dsubu(usize, usize, usize),
    Dsll(usize, usize, usize),
    Dsrl(usize, usize, usize),
    Dsra(usize, usize, usize),
    Dsll32(usize, usize, usize),
    Dsrl32(usize, usize, usize),
    Dsra32(usize, usize, usize),

    Bltz(usize, u64),
    Bgez(usize, u64),
    Bltzl(usize, u64),
    Bgezl(usize, u64),
    Bltzal(usize, u64),
    Bgezal(usize, u64),

    J(u32),
    Jal(u32),
    Beq(usize, usize, u64),
    Bne(usize, usize, u64),
    Blez(usize, u64),
    Bgtz(usize, u64),
    Beql(usize, usize, u64),
    Bnel(usize, usize, u64),
    Blezl(usize, u64),
    Bgtzl(usize, u64),

    Addi(usize, usize, u64),
    Addiu(usize, usize, u64),
    Slti(usize, usize, u64),
    Sltiu(usize, usize, u64),
    Andi(usize, usize, u32),
    Ori(usize, usize, u32),
    Xori(usize, usize, u32),
    Lui(usize, u32),
    Daddi(usize, usize, u64),
    Daddiu(usize, usize, u64),

    Lb(usize, usize, u64),
    Lh(usize, usize, u64),
    Lw(usize, usize, u64),
    Lbu(usize, usize, u64),
    Lhu(usize, usize, u64),
    Lwu(usize, usize, u64),
    Ld(usize, usize, u64),
    Sb(usize, usize, u64),
    Sh(usize, usize, u64),
    Sw(usize, usize, u64),
    Sd(usize, usize, u64),
    Cache,

    Mfc0(usize, usize),
    Mtc0(usize, usize),
    Tlbwi,
    Eret,

    Mfc1(usize, usize),
    Dmfc1(usize, usize),
    Mtc1(usize, usize),
    Dmtc1(usize, usize),
    Cfc1(usize, usize),
    Ctc1(usize, usize),
    Bc1(bool, bool, u64),
    Lwc1(usize, usize, u64),
    Ldc1(usize, usize, u64),
    Swc1(usize, usize, u64),
    Sdc1(usize, usize, u64),

    FAdd(FpuFormat, usize, usize, usize),
    FSub(FpuFormat, usize, usize, usize),
    FMul(FpuFormat, usize, usize, usize),
    FDiv(FpuFormat, usize, usize, usize),
    FMov(FpuFormat, usize, usize),
    FTruncW(FpuFormat, usize, usize),
    FCvtS(FpuFormat, usize, usize),
    FCvtD(FpuFormat, usize, usize),
    FCvtW(FpuFormat, usize, usize),
    FCompare(FpuFormat, usize, usize, u32),

    Unknown(u32),
}

impl Operation {
    /// True for every operation that touches the FPU, for the
    /// coprocessor-unusable check.
    pub fn uses_cop1(&self) -> bool {
        use self::Operation::*;

        matches!(
            self,
            Mfc1(..)
                | Dmfc1(..)
                | Mtc1(..)
                | Dmtc1(..)
                | Cfc1(..)
                | Ctc1(..)
                | Bc1(..)
                | Lwc1(..)
                | Ldc1(..)
                | Swc1(..)
                | Sdc1(..)
                | FAdd(..)
                | FSub(..)
                | FMul(..)
                | FDiv(..)
                | FMov(..)
                | FTruncW(..)
                | FCvtS(..)
                | FCvtD(..)
                | FCvtW(..)
                | FCompare(..)
        )
    }
}

fn decode_cop1(i: Instruction) -> Operation {
    use self::Operation::*;

    let fmt = match i.rs() {
        0x10 => FpuFormat::Single,
        0x11 => FpuFormat::Double,
        0x14 => FpuFormat::Word,
        0x15 => FpuFormat::Long,
        0x00 => return Mfc1(i.rd(), i.rt()),
        0x01 => return Dmfc1(i.rd(), i.rt()),
        0x02 => return Cfc1(i.rd(), i.rt()),
        0x04 => return Mtc1(i.rd(), i.rt()),
        0x05 => return Dmtc1(i.rd(), i.rt()),
        0x06 => return Ctc1(i.rd(), i.rt()),
        0x08 => {
            let condition = (i.rt() & 1) != 0;
            let likely = (i.rt() & 2) != 0;

            return Bc1(condition, likely, i.imm_se());
        }
        _ => return Unknown(i.0),
    };

    let fd = i.shift();
    let fs = i.rd();
    let ft = i.rt();

    match i.function() {
        0x00 => FAdd(fmt, fd, fs, ft),
        0x01 => FSub(fmt, fd, fs, ft),
        0x02 => FMul(fmt, fd, fs, ft),
        0x03 => FDiv(fmt, fd, fs, ft),
        0x06 => FMov(fmt, fd, fs),
        0x0d => FTruncW(fmt, fd, fs),
        0x20 => FCvtS(fmt, fd, fs),
        0x21 => FCvtD(fmt, fd, fs),
        0x24 => FCvtW(fmt, fd, fs),
        0x30..=0x3f => FCompare(fmt, fs, ft, (i.function() & 0xf) as u32),
        _ => Unknown(i.0),
    }
}

impl From<u32> for Operation {
    fn from(word: u32) -> Operation {
        use self::Operation::*;

        let i = Instruction(word);

        match i.opcode() {
            0x00 => match i.function() {
                0x00 => Sll(i.rd(), i.rt(), i.shift()),
                0x02 => Srl(i.rd(), i.rt(), i.shift()),
                0x03 => Sra(i.rd(), i.rt(), i.shift()),
                0x04 => Sllv(i.rd(), i.rt(), i.rs()),
                0x06 => Srlv(i.rd(), i.rt(), i.rs()),
                0x07 => Srav(i.rd(), i.rt(), i.rs()),
                0x08 => Jr(i.rs()),
                0x09 => Jalr(i.rd(), i.rs()),
                0x0c => Syscall,
                0x0d => Break,
                0x10 => Mfhi(i.rd()),
                0x11 => Mthi(i.rs()),
                0x12 => Mflo(i.rd()),
                0x13 => Mtlo(i.rs()),
                0x14 => Dsllv(i.rd(), i.rt(), i.rs()),
                0x16 => Dsrlv(i.rd(), i.rt(), i.rs()),
                0x17 => Dsrav(i.rd(), i.rt(), i.rs()),
                0x18 => Mult(i.rs(), i.rt()),
                0x19 => Multu(i.rs(), i.rt()),
                0x1a => Div(i.rs(), i.rt()),
                0x1b => Divu(i.rs(), i.rt()),
                0x1c => Dmult(i.rs(), i.rt()),
                0x1d => Dmultu(i.rs(), i.rt()),
                0x1e => Ddiv(i.rs(), i.rt()),
                0x1f => Ddivu(i.rs(), i.rt()),
                0x20 => Add(i.rd(), i.rs(), i.rt()),
                0x21 => Addu(i.rd(), i.rs(), i.rt()),
                0x22 => Sub(i.rd(), i.rs(), i.rt()),
                0x23 => Subu(i.rd(), i.rs(), i.rt()),
                0x24 => And(i.rd(), i.rs(), i.rt()),
                0x25 => Or(i.rd(), i.rs(), i.rt()),
                0x26 => Xor(i.rd(), i.rs(), i.rt()),
                0x27 => Nor(i.rd(), i.rs(), i.rt()),
                0x2a => Slt(i.rd(), i.rs(), i.rt()),
                0x2b => Sltu(i.rd(), i.rs(), i.rt()),
                0x2c => Dadd(i.rd(), i.rs(), i.rt()),
                0x2d => Daddu(i.rd(), i.rs(), i.rt()),
                0x2e => Dsub(i.rd(), i.rs(), i.rt()),
                0x2f => Dsubu(i.rd(), i.rs(), i.rt()),
                0x38 => Dsll(i.rd(), i.rt(), i.shift()),
                0x3a => Dsrl(i.rd(), i.rt(), i.shift()),
                0x3b => Dsra(i.rd(), i.rt(), i.shift()),
                0x3c => Dsll32(i.rd(), i.rt(), i.shift()),
                0x3e => Dsrl32(i.rd(), i.rt(), i.shift()),
                0x3f => Dsra32(i.rd(), i.rt(), i.shift()),
                _ => Unknown(word),
            },
            0x01 => match i.rt() {
                0x00 => Bltz(i.rs(), i.imm_se()),
                0x01 => Bgez(i.rs(), i.imm_se()),
                0x02 => Bltzl(i.rs(), i.imm_se()),
                0x03 => Bgezl(i.rs(), i.imm_se()),
                0x10 => Bltzal(i.rs(), i.imm_se()),
                0x11 => Bgezal(i.rs(), i.imm_se()),
                _ => Unknown(word),
            },
            0x02 => J(i.target()),
            0x03 => Jal(i.target()),
            0x04 => Beq(i.rs(), i.rt(), i.imm_se()),
            0x05 => Bne(i.rs(), i.rt(), i.imm_se()),
            0x06 => Blez(i.rs(), i.imm_se()),
            0x07 => Bgtz(i.rs(), i.imm_se()),
            0x08 => Addi(i.rt(), i.rs(), i.imm_se()),
            0x09 => Addiu(i.rt(), i.rs(), i.imm_se()),
            0x0a => Slti(i.rt(), i.rs(), i.imm_se()),
            0x0b => Sltiu(i.rt(), i.rs(), i.imm_se()),
            0x0c => Andi(i.rt(), i.rs(), i.imm()),
            0x0d => Ori(i.rt(), i.rs(), i.imm()),
            0x0e => Xori(i.rt(), i.rs(), i.imm()),
            0x0f => Lui(i.rt(), i.imm()),
            0x10 => match i.rs() {
                0x00 => Mfc0(i.rd(), i.rt()),
                0x04 => Mtc0(i.rd(), i.rt()),
                0x10..=0x1f => match i.function() {
                    0x02 => Tlbwi,
                    0x18 => Eret,
                    _ => Unknown(word),
                },
                _ => Unknown(word),
            },
            0x11 => decode_cop1(i),
            0x14 => Beql(i.rs(), i.rt(), i.imm_se()),
            0x15 => Bnel(i.rs(), i.rt(), i.imm_se()),
            0x16 => Blezl(i.rs(), i.imm_se()),
            0x17 => Bgtzl(i.rs(), i.imm_se()),
            0x18 => Daddi(i.rt(), i.rs(), i.imm_se()),
            0x19 => Daddiu(i.rt(), i.rs(), i.imm_se()),
            0x20 => Lb(i.rt(), i.rs(), i.imm_se()),
            0x21 => Lh(i.rt(), i.rs(), i.imm_se()),
            0x23 => Lw(i.rt(), i.rs(), i.imm_se()),
            0x24 => Lbu(i.rt(), i.rs(), i.imm_se()),
            0x25 => Lhu(i.rt(), i.rs(), i.imm_se()),
            0x27 => Lwu(i.rt(), i.rs(), i.imm_se()),
            0x28 => Sb(i.rt(), i.rs(), i.imm_se()),
            0x29 => Sh(i.rt(), i.rs(), i.imm_se()),
            0x2b => Sw(i.rt(), i.rs(), i.imm_se()),
            0x2f => Cache,
            0x31 => Lwc1(i.rt(), i.rs(), i.imm_se()),
            0x35 => Ldc1(i.rt(), i.rs(), i.imm_se()),
            0x37 => Ld(i.rt(), i.rs(), i.imm_se()),
            0x39 => Swc1(i.rt(), i.rs(), i.imm_se()),
            0x3d => Sdc1(i.rt(), i.rs(), i.imm_se()),
            0x3f => Sd(i.rt(), i.rs(), i.imm_se()),
            _ => Unknown(word),
        }
    }
}
