use crate::DebugError;

use serde::Serialize;

/// Reads the sandboxed target's linear memory on behalf of the debugger.
///
/// The actual I/O lives with the embedder; failures are surfaced with the
/// proxy's own message and are never retried here.
pub trait MemoryProxy {
    /// Read up to `buffer.len()` bytes starting at `address`, returning the
    /// number of bytes read.
    fn read_memory(&mut self, address: u64, buffer: &mut [u8]) -> Result<usize, DebugError>;
}

/// Description of a register exposed by the sandboxed snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct RegisterInfo {
    /// Register name.
    pub name: &'static str,
    /// Width of the register in bytes.
    pub size_in_bytes: usize,
}

/// The only register the snapshot exposes: a 4 byte program counter holding
/// the code offset the sandboxed execution paused at.
pub const PC_REGISTER: RegisterInfo = RegisterInfo {
    name: "PC",
    size_in_bytes: 4,
};

/// Information about one stack frame of the synthetic snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct FrameInfo {
    /// The program counter: the code offset execution paused at.
    pub pc: u64,
    /// Canonical frame address. The snapshot has no real call stack, so none
    /// exists.
    pub cfa: Option<u64>,
    /// The synthetic frame is presented as the frame execution stopped in.
    pub behaves_like_zeroth_frame: bool,
}

/// A paused sandboxed execution presented as if it were a live, stopped
/// process with a single thread and a single frame.
pub struct SandboxProcess {
    proxy: Box<dyn MemoryProxy>,
    frame_offset: u64,
}

impl SandboxProcess {
    /// Create a snapshot around `proxy`, paused at code offset `frame_offset`.
    pub fn new(proxy: Box<dyn MemoryProxy>, frame_offset: u64) -> Self {
        Self {
            proxy,
            frame_offset,
        }
    }

    /// Read target memory through the proxy.
    pub fn read_memory(&mut self, address: u64, buffer: &mut [u8]) -> Result<usize, DebugError> {
        self.proxy.read_memory(address, buffer)
    }

    /// The single stopped thread.
    ///
    /// Present only while execution is paused inside a function; a zero code
    /// offset means there is nothing on the stack to present.
    pub fn thread(&self) -> Option<SandboxThread> {
        (self.frame_offset > 0).then(|| SandboxThread {
            frame_offset: self.frame_offset,
        })
    }
}

/// The synthetic thread of a [`SandboxProcess`].
pub struct SandboxThread {
    frame_offset: u64,
}

impl SandboxThread {
    /// The unwinder for this thread.
    pub fn unwinder(&self) -> SandboxUnwind {
        SandboxUnwind {
            frame_offset: self.frame_offset,
        }
    }
}

/// Unwinder producing the snapshot's single synthetic frame.
///
/// No memory-based unwinding takes place; the frame is fabricated from the
/// paused code offset alone.
pub struct SandboxUnwind {
    frame_offset: u64,
}

impl SandboxUnwind {
    /// The synthetic stack is always exactly one frame deep.
    pub fn frame_count(&self) -> u32 {
        1
    }

    /// Frame information for `index`; only frame 0 exists.
    pub fn frame_info(&self, index: u32) -> Option<FrameInfo> {
        (index == 0).then(|| FrameInfo {
            pc: self.frame_offset,
            cfa: None,
            behaves_like_zeroth_frame: true,
        })
    }

    /// The register context shared by every query against this frame.
    pub fn registers(&self) -> SandboxRegisters {
        SandboxRegisters {
            frame_offset: self.frame_offset,
        }
    }
}

/// Register context exposing only [`PC_REGISTER`].
pub struct SandboxRegisters {
    frame_offset: u64,
}

impl SandboxRegisters {
    /// Number of registers in this context.
    pub fn register_count(&self) -> usize {
        1
    }

    /// Describe the register at `index`; only index 0 exists.
    pub fn register_info(&self, index: usize) -> Option<RegisterInfo> {
        (index == 0).then_some(PC_REGISTER)
    }

    /// Read the register at `index`. The program counter reads as the paused
    /// code offset.
    pub fn read_register(&self, index: usize) -> Option<u32> {
        (index == 0).then_some(self.frame_offset as u32)
    }
}
