use thiserror::Error;

/// Fatal emulation faults. Guest-visible faults (overflow, address error,
/// syscall) take the guest exception vector instead and never appear here.
#[derive(Debug, Error)]
pub enum Error {
    #[error("[BUS] read{size} from unmapped address 0x{address:08x}")]
    UnmappedRead { address: u32, size: u32 },

    #[error("[BUS] write{size} to unmapped address 0x{address:08x} (data = 0x{data:x})")]
    UnmappedWrite { address: u32, data: u64, size: u32 },

    #[error("[BUS] read from unrecognised I/O register 0x{address:08x}")]
    UnknownIoRead { address: u32 },

    #[error("[BUS] write to unrecognised I/O register 0x{address:08x} (data = 0x{data:08x})")]
    UnknownIoWrite { address: u32, data: u32 },

    #[error("[CPU] unknown instruction 0x{instruction:08x} at 0x{pc:016x}")]
    UnknownOpcode { pc: u64, instruction: u32 },

    #[error("[CPU] access to TLB mapped region (address = 0x{vaddr:016x})")]
    UnimplementedTlbAccess { vaddr: u64 },

    #[error("[CPU] branch in delay slot at 0x{pc:016x}")]
    BranchInDelaySlot { pc: u64 },

    #[error("[RSP] unknown instruction 0x{instruction:08x} at 0x{pc:03x}")]
    UnknownRspOpcode { pc: u32, instruction: u32 },

    #[error("[RDP] unknown command 0x{command:016x} at 0x{address:08x}")]
    UnknownRdpCommand { address: u32, command: u64 },

    #[error("[PIF] unknown instruction 0x{opcode:02x} at 0x{pc:03x}")]
    UnknownPifOpcode { pc: u16, opcode: u8 },

    #[error("[PIF] return stack {0}")]
    PifStackFault(&'static str),

    #[error("unimplemented: {0}")]
    Unimplemented(String),
}
