use super::template::{self, CodeImage, CodeTemplate, CodegenError, ProgramShape};

/// Supported target platforms (architecture + OS)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Target {
    X86_64Linux,
    X86_64MacOS,
    Arm64Linux,
    Arm64MacOS,
}

/// Calling convention of a generated entry point
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntrySignature {
    /// `extern "C" fn()` - prints through its own system call
    Procedure,
    /// `extern "C" fn() -> i32` - returns a status, the caller prints
    StatusReturn,
}

impl Target {
    /// Human-readable platform label for the console
    pub fn label(&self) -> &'static str {
        match self {
            Target::X86_64Linux => "Linux x86-64",
            Target::X86_64MacOS => "macOS x86-64",
            Target::Arm64Linux => "Linux ARM64",
            Target::Arm64MacOS => "Apple Silicon ARM64",
        }
    }

    /// Signature the generated entry point must be called with
    pub fn signature(&self) -> EntrySignature {
        match CodeTemplate::for_target(*self).shape {
            ProgramShape::Syscall { .. } => EntrySignature::Procedure,
            ProgramShape::ReturnOnly => EntrySignature::StatusReturn,
        }
    }

    /// Compose the code image that prints `message` on this target
    ///
    /// # Arguments
    /// * `message` - UTF-8 text the generated code will write to stdout
    ///
    /// # Returns
    /// * The finished image, or an error if the message length does not
    ///   fit the target's length field
    pub fn compile(&self, message: &str) -> Result<CodeImage, CodegenError> {
        template::compose(*self, message)
    }
}

/// Detect the host target platform
///
/// One profile is fixed per build; there is no runtime dispatch. A build
/// for any other (architecture, OS) pair is rejected outright below.
#[cfg(all(target_os = "linux", target_arch = "x86_64"))]
pub fn detect_host_target() -> Target {
    Target::X86_64Linux
}

#[cfg(all(target_os = "macos", target_arch = "x86_64"))]
pub fn detect_host_target() -> Target {
    Target::X86_64MacOS
}

#[cfg(all(target_os = "linux", target_arch = "aarch64"))]
pub fn detect_host_target() -> Target {
    Target::Arm64Linux
}

#[cfg(all(target_os = "macos", target_arch = "aarch64"))]
pub fn detect_host_target() -> Target {
    Target::Arm64MacOS
}

#[cfg(not(any(
    all(target_os = "linux", target_arch = "x86_64"),
    all(target_os = "macos", target_arch = "x86_64"),
    all(target_os = "linux", target_arch = "aarch64"),
    all(target_os = "macos", target_arch = "aarch64"),
)))]
compile_error!("Unsupported platform: greetjit only targets Linux/macOS on x86-64/ARM64");
