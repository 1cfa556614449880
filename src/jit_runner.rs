/// In-process execution of generated code
///
/// A code image moves through two memory states: a writable anonymous
/// mapping the image is copied into, then an executable mapping produced
/// by flipping the page protection. The states are separate types, so a
/// region is never writable and executable at once, and unmapping happens
/// on drop of whichever state is live.
use crate::codegen::{CodeImage, EntrySignature};
use crate::sizing::{page_aligned_size, page_size};
use memmap2::{Mmap, MmapMut};
use std::io;
use std::mem;

/// Errors from the OS memory-mapping layer
#[derive(Debug)]
pub enum RegionError {
    /// The OS refused to create the anonymous mapping
    Allocation(io::Error),
    /// The OS refused the write -> execute protection flip
    Protection(io::Error),
}

pub fn format_region_error(error: &RegionError) -> String {
    match error {
        RegionError::Allocation(e) => {
            format!("Failed to allocate memory for machine code: {}", e)
        }
        RegionError::Protection(e) => format!("Failed to make memory executable: {}", e),
    }
}

/// Freshly mapped anonymous memory: private, zero-filled, write-enabled
pub struct WritableRegion {
    map: MmapMut,
}

impl WritableRegion {
    /// Map `size` bytes of anonymous private memory
    ///
    /// `size` must be a positive page multiple (see `sizing`); anything
    /// else is a caller bug.
    pub fn acquire(size: usize) -> Result<WritableRegion, RegionError> {
        assert!(
            size > 0 && size % page_size() == 0,
            "region size must be a positive page multiple"
        );
        let map = MmapMut::map_anon(size).map_err(RegionError::Allocation)?;
        Ok(WritableRegion { map })
    }

    /// Copy `bytes` to the start of the region
    pub fn populate(&mut self, bytes: &[u8]) {
        assert!(
            bytes.len() <= self.map.len(),
            "code image larger than its region"
        );
        self.map[..bytes.len()].copy_from_slice(bytes);
    }

    /// Flip the region from writable to executable
    ///
    /// Write permission is removed in the same transition. On failure the
    /// mapping has already been returned to the OS; no executable state
    /// ever exists for it.
    pub fn make_executable(self) -> Result<ExecutableRegion, RegionError> {
        let map = self.map.make_exec().map_err(RegionError::Protection)?;
        Ok(ExecutableRegion { map })
    }

    pub fn size(&self) -> usize {
        self.map.len()
    }
}

/// Execute-enabled mapping holding a finished code image
pub struct ExecutableRegion {
    map: Mmap,
}

impl ExecutableRegion {
    pub fn as_ptr(&self) -> *const u8 {
        self.map.as_ptr()
    }
}

/// Result of invoking a generated entry point
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecOutcome {
    /// The generated code performed the write itself
    Printed,
    /// The generated code returned a status; printing is the caller's job
    Returned(i32),
}

/// Call the generated code at the region's base address, exactly once
///
/// This is the one place the type system is overruled: the base address
/// is reinterpreted as a function of the image's declared signature.
/// Every byte behind that pointer was produced by this crate's own
/// templates, never by external input.
pub fn invoke(region: &ExecutableRegion, signature: EntrySignature) -> ExecOutcome {
    match signature {
        EntrySignature::Procedure => {
            let func: extern "C" fn() = unsafe { mem::transmute(region.as_ptr()) };
            func();
            ExecOutcome::Printed
        }
        EntrySignature::StatusReturn => {
            let func: extern "C" fn() -> i32 = unsafe { mem::transmute(region.as_ptr()) };
            ExecOutcome::Returned(func())
        }
    }
}

/// Map, populate, protect, and run a composed image
///
/// The region is unmapped on every path out of this function, error
/// paths included.
pub fn run_image(image: &CodeImage) -> Result<ExecOutcome, RegionError> {
    let mut region = WritableRegion::acquire(page_aligned_size(image.as_code().len()))?;
    region.populate(image.as_code());
    let region = region.make_executable()?;
    Ok(invoke(&region, image.signature()))
}
