/// Fixed machine-code templates and length patching
///
/// Each target gets exactly one program shape: set up a
/// `write(1, text, len)` system call and return, or (Apple Silicon) set a
/// status register and return. The message text is appended directly
/// after the instruction block, so the position-relative address baked
/// into each syscall template must equal the distance from that
/// instruction to the end of the block. Changing a template's length
/// invalidates that displacement.
use super::api::{EntrySignature, Target};

/// Linux x86-64: sys_write is 1, arguments in rdi/rsi/rdx
const X86_64_LINUX_CODE: &[u8] = &[
    0x48, 0xc7, 0xc0, 0x01, 0x00, 0x00, 0x00, // mov rax, 1
    0x48, 0xc7, 0xc7, 0x01, 0x00, 0x00, 0x00, // mov rdi, 1
    0x48, 0x8d, 0x35, 0x0a, 0x00, 0x00, 0x00, // lea rsi, [rip+10]
    0x48, 0xc7, 0xc2, 0x00, 0x00, 0x00, 0x00, // mov rdx, 0 (patched)
    0x0f, 0x05, // syscall
    0xc3, // ret
];

/// macOS x86-64: same ABI, BSD syscall class makes write 0x02000004
const X86_64_MACOS_CODE: &[u8] = &[
    0x48, 0xc7, 0xc0, 0x04, 0x00, 0x00, 0x02, // mov rax, 0x02000004
    0x48, 0xc7, 0xc7, 0x01, 0x00, 0x00, 0x00, // mov rdi, 1
    0x48, 0x8d, 0x35, 0x0a, 0x00, 0x00, 0x00, // lea rsi, [rip+10]
    0x48, 0xc7, 0xc2, 0x00, 0x00, 0x00, 0x00, // mov rdx, 0 (patched)
    0x0f, 0x05, // syscall
    0xc3, // ret
];

/// Linux ARM64: sys_write is 64 in x8, arguments in x0/x1/x2
const ARM64_LINUX_CODE: &[u8] = &[
    0x20, 0x00, 0x80, 0xd2, // mov x0, #1
    0xa1, 0x00, 0x00, 0x10, // adr x1, #20
    0x02, 0x00, 0x80, 0xd2, // mov x2, #0 (patched)
    0x08, 0x08, 0x80, 0xd2, // mov x8, #64
    0x01, 0x00, 0x00, 0xd4, // svc #0
    0xc0, 0x03, 0x5f, 0xd6, // ret
];

/// Apple Silicon: system calls from unsigned JIT pages are restricted,
/// so the stub only reports success and the host prints the text
const ARM64_MACOS_CODE: &[u8] = &[
    0x00, 0x00, 0x80, 0xd2, // mov x0, #0
    0xc0, 0x03, 0x5f, 0xd6, // ret
];

/// Byte offset of the `mov rdx, imm32` immediate in both x86-64 templates
const X86_64_LENGTH_OFFSET: usize = 24;

/// Byte offset of the `mov x2` instruction word in the Linux ARM64 template
const ARM64_LENGTH_OFFSET: usize = 8;

/// `movz x2, #0` - the instruction word the length is encoded into
const ARM64_LENGTH_BASE_WORD: u32 = 0xd2800002;

/// Where and how a template embeds the message length
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LengthField {
    /// Little-endian u32 immediate (x86-64 `mov rdx, imm32`)
    Imm32 { offset: usize },
    /// imm16 field (bits 5..21) of an AArch64 `movz`; the whole
    /// instruction word is rewritten so the destination register and
    /// opcode bits survive the patch
    MovzImm16 { offset: usize, base_word: u32 },
}

/// Errors raised while composing a code image
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CodegenError {
    /// The message does not fit the target's length field
    MessageTooLong { len: usize, max: usize },
}

pub fn format_codegen_error(error: &CodegenError) -> String {
    match error {
        CodegenError::MessageTooLong { len, max } => {
            format!(
                "Message is {} bytes but the length field holds at most {}",
                len, max
            )
        }
    }
}

impl LengthField {
    /// Largest message length the field can encode
    pub fn max_len(&self) -> usize {
        match self {
            LengthField::Imm32 { .. } => u32::MAX as usize,
            LengthField::MovzImm16 { .. } => u16::MAX as usize,
        }
    }

    /// Overwrite the length field inside an instruction block
    ///
    /// A field that falls outside the block means the template and its
    /// descriptor disagree; that is an internal bug, not a recoverable
    /// condition.
    pub fn patch(&self, code: &mut [u8], len: usize) -> Result<(), CodegenError> {
        if len > self.max_len() {
            return Err(CodegenError::MessageTooLong {
                len,
                max: self.max_len(),
            });
        }

        match *self {
            LengthField::Imm32 { offset } => {
                assert!(
                    offset + 4 <= code.len(),
                    "length field outside instruction block"
                );
                code[offset..offset + 4].copy_from_slice(&(len as u32).to_le_bytes());
            }
            LengthField::MovzImm16 { offset, base_word } => {
                assert!(
                    offset + 4 <= code.len(),
                    "length field outside instruction block"
                );
                let word = base_word | (((len as u32) & 0xffff) << 5);
                code[offset..offset + 4].copy_from_slice(&word.to_le_bytes());
            }
        }

        Ok(())
    }

    /// Read the length back out of a patched block by the same rule
    pub fn decode(&self, code: &[u8]) -> usize {
        match *self {
            LengthField::Imm32 { offset } => u32::from_le_bytes([
                code[offset],
                code[offset + 1],
                code[offset + 2],
                code[offset + 3],
            ]) as usize,
            LengthField::MovzImm16 { offset, .. } => {
                let word = u32::from_le_bytes([
                    code[offset],
                    code[offset + 1],
                    code[offset + 2],
                    code[offset + 3],
                ]);
                ((word >> 5) & 0xffff) as usize
            }
        }
    }
}

/// The two program shapes a template can take
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProgramShape {
    /// `write(1, text, len)` through the platform syscall; the text bytes
    /// are appended after the instruction block
    Syscall { length_field: LengthField },
    /// Set a status register and return; nothing reads the text, so none
    /// is appended
    ReturnOnly,
}

/// One target's fixed instruction bytes plus its patch descriptor
#[derive(Debug, Clone, Copy)]
pub struct CodeTemplate {
    pub code: &'static [u8],
    pub shape: ProgramShape,
}

impl CodeTemplate {
    pub fn for_target(target: Target) -> CodeTemplate {
        match target {
            Target::X86_64Linux => CodeTemplate {
                code: X86_64_LINUX_CODE,
                shape: ProgramShape::Syscall {
                    length_field: LengthField::Imm32 {
                        offset: X86_64_LENGTH_OFFSET,
                    },
                },
            },
            Target::X86_64MacOS => CodeTemplate {
                code: X86_64_MACOS_CODE,
                shape: ProgramShape::Syscall {
                    length_field: LengthField::Imm32 {
                        offset: X86_64_LENGTH_OFFSET,
                    },
                },
            },
            Target::Arm64Linux => CodeTemplate {
                code: ARM64_LINUX_CODE,
                shape: ProgramShape::Syscall {
                    length_field: LengthField::MovzImm16 {
                        offset: ARM64_LENGTH_OFFSET,
                        base_word: ARM64_LENGTH_BASE_WORD,
                    },
                },
            },
            Target::Arm64MacOS => CodeTemplate {
                code: ARM64_MACOS_CODE,
                shape: ProgramShape::ReturnOnly,
            },
        }
    }
}

/// Finished code-plus-data image, ready to map and execute
///
/// Immutable once composed; `compose` is the only constructor.
#[derive(Debug)]
pub struct CodeImage {
    code: Vec<u8>,
    signature: EntrySignature,
}

impl CodeImage {
    pub fn as_code(&self) -> &[u8] {
        &self.code
    }

    pub fn signature(&self) -> EntrySignature {
        self.signature
    }
}

/// Compose the executable image for `target`
///
/// Patches the message length into the template, then appends the text
/// bytes the generated code reads. The no-syscall shape takes neither.
pub fn compose(target: Target, message: &str) -> Result<CodeImage, CodegenError> {
    let template = CodeTemplate::for_target(target);
    let mut code = template.code.to_vec();

    if let ProgramShape::Syscall { length_field } = template.shape {
        length_field.patch(&mut code, message.len())?;
        code.extend_from_slice(message.as_bytes());
    }

    Ok(CodeImage {
        code,
        signature: target.signature(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    const SYSCALL_TARGETS: [Target; 3] = [
        Target::X86_64Linux,
        Target::X86_64MacOS,
        Target::Arm64Linux,
    ];

    /// Resolve the `lea rsi, [rip+disp32]` operand of an x86-64 template
    /// to the block-relative address it points at
    fn x86_lea_target(code: &[u8]) -> usize {
        let disp = i32::from_le_bytes([code[17], code[18], code[19], code[20]]);
        // rip is the address of the instruction after the lea (offset 21)
        21 + disp as usize
    }

    /// Resolve the `adr x1, #imm` operand of the Linux ARM64 template
    fn arm64_adr_target(code: &[u8]) -> usize {
        let word = u32::from_le_bytes([code[4], code[5], code[6], code[7]]);
        let immlo = (word >> 29) & 0b11;
        let immhi = (word >> 5) & 0x7ffff;
        // adr computes from its own address (offset 4)
        4 + ((immhi << 2) | immlo) as usize
    }

    fn length_field(target: Target) -> LengthField {
        match CodeTemplate::for_target(target).shape {
            ProgramShape::Syscall { length_field } => length_field,
            ProgramShape::ReturnOnly => panic!("target has no length field"),
        }
    }

    #[test]
    fn template_lengths_are_fixed() {
        assert_eq!(X86_64_LINUX_CODE.len(), 31);
        assert_eq!(X86_64_MACOS_CODE.len(), 31);
        assert_eq!(ARM64_LINUX_CODE.len(), 24);
        assert_eq!(ARM64_MACOS_CODE.len(), 8);
    }

    #[test]
    fn imm32_round_trips_through_patch_and_decode() {
        let field = length_field(Target::X86_64Linux);
        for len in [0usize, 1, 255, 65535, u32::MAX as usize] {
            let mut code = X86_64_LINUX_CODE.to_vec();
            field.patch(&mut code, len).expect("patch failed");
            assert_eq!(field.decode(&code), len);
        }
    }

    #[test]
    fn movz_round_trips_through_patch_and_decode() {
        let field = length_field(Target::Arm64Linux);
        for len in [0usize, 1, 255, 65535] {
            let mut code = ARM64_LINUX_CODE.to_vec();
            field.patch(&mut code, len).expect("patch failed");
            assert_eq!(field.decode(&code), len);
        }
    }

    #[test]
    fn movz_rejects_lengths_past_sixteen_bits() {
        let field = length_field(Target::Arm64Linux);
        let mut code = ARM64_LINUX_CODE.to_vec();
        assert_eq!(
            field.patch(&mut code, 65536),
            Err(CodegenError::MessageTooLong {
                len: 65536,
                max: 65535
            })
        );
        // the block is untouched on the error path
        assert_eq!(code, ARM64_LINUX_CODE);
    }

    #[test]
    fn movz_patch_preserves_register_and_opcode_bits() {
        let field = length_field(Target::Arm64Linux);
        let mut code = ARM64_LINUX_CODE.to_vec();
        field.patch(&mut code, 0xffff).expect("patch failed");
        let word = u32::from_le_bytes([code[8], code[9], code[10], code[11]]);
        assert_eq!(word & 0x1f, 2); // destination stays x2
        assert_eq!(word & 0xffe0_0000, ARM64_LENGTH_BASE_WORD & 0xffe0_0000);
    }

    #[test]
    #[should_panic(expected = "length field outside instruction block")]
    fn patching_a_truncated_block_fails_fast() {
        let field = length_field(Target::X86_64Linux);
        let mut code = vec![0u8; 8];
        let _ = field.patch(&mut code, 12);
    }

    #[test]
    fn syscall_images_append_the_text_after_the_code() {
        for target in SYSCALL_TARGETS {
            let template = CodeTemplate::for_target(target);
            let image = compose(target, "Hello, Ada!\n").expect("compose failed");
            assert_eq!(image.as_code().len(), template.code.len() + 12);
            assert_eq!(&image.as_code()[template.code.len()..], b"Hello, Ada!\n");
            assert_eq!(length_field(target).decode(image.as_code()), 12);
        }
    }

    #[test]
    fn empty_name_greeting_patches_nine_bytes() {
        for target in SYSCALL_TARGETS {
            let template = CodeTemplate::for_target(target);
            let image = compose(target, "Hello, !\n").expect("compose failed");
            assert_eq!(image.as_code().len(), template.code.len() + 9);
            assert_eq!(length_field(target).decode(image.as_code()), 9);
        }
    }

    #[test]
    fn return_only_image_carries_no_text() {
        let image = compose(Target::Arm64MacOS, "Hello, Ada!\n").expect("compose failed");
        assert_eq!(image.as_code(), ARM64_MACOS_CODE);

        let long = "x".repeat(100_000);
        let image = compose(Target::Arm64MacOS, &long).expect("compose failed");
        assert_eq!(image.as_code(), ARM64_MACOS_CODE);
    }

    #[test]
    fn x86_relative_loads_land_on_the_first_text_byte() {
        assert_eq!(x86_lea_target(X86_64_LINUX_CODE), X86_64_LINUX_CODE.len());
        assert_eq!(x86_lea_target(X86_64_MACOS_CODE), X86_64_MACOS_CODE.len());
    }

    #[test]
    fn arm64_relative_load_lands_on_the_first_text_byte() {
        assert_eq!(arm64_adr_target(ARM64_LINUX_CODE), ARM64_LINUX_CODE.len());
    }

    #[test]
    fn oversized_message_is_refused_not_truncated() {
        let long = "x".repeat(70_000);
        let error = compose(Target::Arm64Linux, &long).unwrap_err();
        assert_eq!(
            error,
            CodegenError::MessageTooLong {
                len: 70_000,
                max: 65535
            }
        );
    }
}
