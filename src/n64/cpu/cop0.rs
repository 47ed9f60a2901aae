use log::warn;
use serde::{Deserialize, Serialize};

const CONFIG_DEFAULT: u32 = 0x6e460;
const CONFIG_WRITE_MASK: u32 = 0x0f00_800f;

const COUNT_MASK: u64 = 0x1_ffff_ffff;

const MODE_KERNEL: u8 = 0;

#[derive(Clone, Copy, Debug, PartialEq)]
pub enum Exception {
    Interrupt = 0,
    AddrLoad = 4,
    AddrStore = 5,
    Syscall = 8,
    Breakpoint = 9,
    Reserved = 10,
    CoprocessorUnusable = 11,
    Overflow = 12,
}

#[derive(Deserialize, Serialize)]
struct Status {
    interrupt_enable: bool,
    exception_level: bool,
    error_level: bool,
    mode: u8,
    user_extended: bool,
    supervisor_extended: bool,
    kernel_extended: bool,
    interrupt_mask: u8,
    de: bool,
    ce: bool,
    condition: bool,
    soft_reset: bool,
    tlb_shutdown: bool,
    boot_exception_vectors: bool,
    instruction_trace: bool,
    reverse_endian: bool,
    fr: bool,
    low_power: bool,
    coprocessor_usable: [bool; 4],
}

impl Status {
    pub fn new() -> Status {
        Status {
            interrupt_enable: false,
            exception_level: false,
            error_level: false,
            mode: 0,
            user_extended: false,
            supervisor_extended: false,
            kernel_extended: false,
            interrupt_mask: 0,
            de: false,
            ce: false,
            condition: false,
            soft_reset: false,
            tlb_shutdown: false,
            boot_exception_vectors: false,
            instruction_trace: false,
            reverse_endian: false,
            fr: false,
            low_power: false,
            coprocessor_usable: [false; 4],
        }
    }

    pub fn reset(&mut self) {
        *self = Status::new();

        self.mode = MODE_KERNEL;
        self.boot_exception_vectors = true;
    }

    pub fn read(&self) -> u32 {
        (self.interrupt_enable as u32)
            | (self.exception_level as u32) << 1
            | (self.error_level as u32) << 2
            | (self.mode as u32 & 3) << 3
            | (self.user_extended as u32) << 5
            | (self.supervisor_extended as u32) << 6
            | (self.kernel_extended as u32) << 7
            | (self.interrupt_mask as u32) << 8
            | (self.de as u32) << 16
            | (self.ce as u32) << 17
            | (self.condition as u32) << 18
            | (self.soft_reset as u32) << 20
            | (self.tlb_shutdown as u32) << 21
            | (self.boot_exception_vectors as u32) << 22
            | (self.instruction_trace as u32) << 24
            | (self.reverse_endian as u32) << 25
            | (self.fr as u32) << 26
            | (self.low_power as u32) << 27
            | (self.coprocessor_usable[0] as u32) << 28
            | (self.coprocessor_usable[1] as u32) << 29
            | (self.coprocessor_usable[2] as u32) << 30
            | (self.coprocessor_usable[3] as u32) << 31
    }

    pub fn write(&mut self, value: u32) {
        self.interrupt_enable = (value & 1) != 0;
        self.exception_level = (value & (1 << 1)) != 0;
        self.error_level = (value & (1 << 2)) != 0;
        self.mode = ((value >> 3) & 3) as u8;
        self.user_extended = (value & (1 << 5)) != 0;
        self.supervisor_extended = (value & (1 << 6)) != 0;
        self.kernel_extended = (value & (1 << 7)) != 0;
        self.interrupt_mask = (value >> 8) as u8;
        self.de = (value & (1 << 16)) != 0;
        self.ce = (value & (1 << 17)) != 0;
        self.condition = (value & (1 << 18)) != 0;
        self.soft_reset = (value & (1 << 20)) != 0;
        self.tlb_shutdown = (value & (1 << 21)) != 0;
        self.boot_exception_vectors = (value & (1 << 22)) != 0;
        self.instruction_trace = (value & (1 << 24)) != 0;
        self.reverse_endian = (value & (1 << 25)) != 0;
        self.fr = (value & (1 << 26)) != 0;
        self.low_power = (value & (1 << 27)) != 0;
        self.coprocessor_usable[0] = (value & (1 << 28)) != 0;
        self.coprocessor_usable[1] = (value & (1 << 29)) != 0;
        self.coprocessor_usable[2] = (value & (1 << 30)) != 0;
        self.coprocessor_usable[3] = (value & (1 << 31)) != 0;
    }
}

#[derive(Deserialize, Serialize)]
struct Cause {
    exception_code: u8,
    interrupt_pending: u8,
    coprocessor_error: u8,
    branch_delay: bool,
}

impl Cause {
    pub fn new() -> Cause {
        Cause {
            exception_code: 0,
            interrupt_pending: 0,
            coprocessor_error: 0,
            branch_delay: false,
        }
    }

    pub fn read(&self) -> u32 {
        ((self.exception_code as u32 & 0x1f) << 2)
            | (self.interrupt_pending as u32) << 8
            | (self.coprocessor_error as u32 & 3) << 28
            | (self.branch_delay as u32) << 31
    }

    pub fn write(&mut self, value: u32) {
        // Only the two software interrupt bits are writable.
        self.interrupt_pending &= !3;
        self.interrupt_pending |= ((value >> 8) & 3) as u8;
    }
}

#[derive(Deserialize, Serialize)]
pub struct Cop0 {
    status: Status,
    cause: Cause,
    epc: u64,
    config: u32,

    // 33-bit counter fed by a divide-by-two of the CPU clock.
    count: u64,
    divider: bool,
    compare: u32,
}

impl Cop0 {
    pub fn new() -> Cop0 {
        Cop0 {
            status: Status::new(),
            cause: Cause::new(),
            epc: 0,
            config: CONFIG_DEFAULT,

            count: 0,
            divider: false,
            compare: 0,
        }
    }

    pub fn reset(&mut self) {
        self.status.reset();
        self.cause = Cause::new();
        self.epc = 0;
        self.config = CONFIG_DEFAULT;
        self.count = 0;
        self.divider = false;
        self.compare = 0;
    }

    /// Charges one CPU cycle to the counter; sets IP7 when Count[32:1]
    /// crosses Compare.
    pub fn tick_counter(&mut self) {
        self.divider = !self.divider;

        if self.divider {
            return;
        }

        self.count = (self.count + 1) & COUNT_MASK;

        if ((self.count >> 1) as u32) == self.compare {
            self.cause.interrupt_pending |= 0x80;
        }
    }

    pub fn interrupt_pending(&self) -> bool {
        self.status.interrupt_enable
            && !self.status.exception_level
            && !self.status.error_level
            && (self.cause.interrupt_pending & self.status.interrupt_mask) != 0
    }

    pub fn set_external_interrupt(&mut self, asserted: bool) {
        if asserted {
            self.cause.interrupt_pending |= 1 << 2;
        } else {
            self.cause.interrupt_pending &= !(1 << 2);
        }
    }

    pub fn is_coprocessor_usable(&self, coprocessor: usize) -> bool {
        if coprocessor == 0 && self.status.mode == MODE_KERNEL {
            return true;
        }

        self.status.coprocessor_usable[coprocessor]
    }

    pub fn is_large_fpu_register_file(&self) -> bool {
        self.status.fr
    }

    pub fn exception_level(&self) -> bool {
        self.status.exception_level
    }

    pub fn error_level(&self) -> bool {
        self.status.error_level
    }

    pub fn epc(&self) -> u64 {
        self.epc
    }

    pub fn enter_exception(&mut self, exception: Exception, epc: u64, bd: bool, coprocessor: u8) {
        self.cause.exception_code = exception as u8;
        self.cause.coprocessor_error = coprocessor;

        if !self.status.exception_level {
            self.epc = epc;
            self.cause.branch_delay = bd;
        }

        self.status.exception_level = true;
    }

    pub fn leave_exception(&mut self) {
        self.status.exception_level = false;
    }

    pub fn read(&self, index: usize) -> u32 {
        match index {
            9 => (self.count >> 1) as u32,
            11 => self.compare,
            12 => self.status.read(),
            13 => self.cause.read(),
            14 => self.epc as u32,
            16 => self.config,
            0 | 2 | 3 | 5 | 10 | 28 | 29 => {
                warn!("[COP0] TLB register {} read", index);

                0
            }
            _ => {
                warn!("[COP0] Unimplemented register {} read", index);

                0
            }
        }
    }

    pub fn write(&mut self, index: usize, value: u32) {
        match index {
            9 => {
                self.count = ((value as u64) << 1) & COUNT_MASK;
                self.divider = false;
            }
            11 => {
                self.compare = value;
                self.cause.interrupt_pending &= !0x80;
            }
            12 => self.status.write(value),
            13 => self.cause.write(value),
            14 => self.epc = value as i32 as i64 as u64,
            16 => self.config = (value & CONFIG_WRITE_MASK) | (self.config & !CONFIG_WRITE_MASK),
            0 | 2 | 3 | 5 | 10 | 28 | 29 => {
                warn!("[COP0] TLB register {} write (data = 0x{:08x})", index, value)
            }
            _ => warn!(
                "[COP0] Unimplemented register {} write (data = 0x{:08x})",
                index, value
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counter_crossing_compare_sets_ip7() {
        let mut cop0 = Cop0::new();

        cop0.write(11, 0x10);

        // 64 CPU cycles: the 33-bit counter reaches 0x20, Count[32:1] 0x10.
        for _ in 0..64 {
            cop0.tick_counter();
        }

        assert_eq!(cop0.read(9), 0x10);
        assert_eq!(cop0.read(13) & (1 << 15), 1 << 15);
    }

    #[test]
    fn compare_write_clears_ip7() {
        let mut cop0 = Cop0::new();

        cop0.write(11, 1);

        for _ in 0..4 {
            cop0.tick_counter();
        }

        assert_ne!(cop0.read(13) & (1 << 15), 0);

        cop0.write(11, 0x100);
        assert_eq!(cop0.read(13) & (1 << 15), 0);
    }

    #[test]
    fn interrupts_gate_on_ie_exl_and_mask() {
        let mut cop0 = Cop0::new();

        cop0.set_external_interrupt(true);
        assert!(!cop0.interrupt_pending());

        // IE on, IM2 on.
        cop0.write(12, 1 | (1 << 10));
        assert!(cop0.interrupt_pending());

        cop0.enter_exception(Exception::Interrupt, 0x8000_0000, false, 0);
        assert!(!cop0.interrupt_pending());

        cop0.leave_exception();
        assert!(cop0.interrupt_pending());

        cop0.set_external_interrupt(false);
        assert!(!cop0.interrupt_pending());
    }

    #[test]
    fn config_writes_are_masked() {
        let mut cop0 = Cop0::new();

        cop0.write(16, 0xffff_ffff);
        assert_eq!(cop0.read(16), CONFIG_WRITE_MASK | (CONFIG_DEFAULT & !CONFIG_WRITE_MASK));
    }
}
