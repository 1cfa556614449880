/// Code generation module - one fixed program shape per target
///
/// This module selects the instruction template for the build's
/// (architecture, OS) pair, embeds the runtime-computed message length
/// into it, and lays the message text out directly after the code so the
/// template's position-relative load resolves to the first text byte.
///
/// Supported targets:
/// - x86-64 Linux (System V ABI, Linux syscalls)
/// - x86-64 macOS (System V ABI, BSD syscall class)
/// - ARM64 Linux (AAPCS64, Linux syscalls)
/// - ARM64 macOS (no syscall; status-returning stub)
///
/// ## Module Structure
/// - `api`: target profiles, host detection, entry signatures
/// - `template`: instruction templates, length patching, image composition
mod api;
mod template;

// Re-export public API
pub use api::{detect_host_target, EntrySignature, Target};
pub use template::{format_codegen_error, CodeImage, CodegenError};
