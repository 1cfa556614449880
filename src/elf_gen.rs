/// Standalone executable generation (Linux x86-64, ELF format)
///
/// Wraps a composed code image in a minimal static ELF executable. The
/// image's text addressing is rip-relative, so it runs unchanged at the
/// fixed load address; a small entry stub calls it and then exits.
use std::fs::File;
use std::io::{Result as IoResult, Write};

/// Entry stub: call the image, then exit(0)
///   0-4:   call (rel32 to the image, right after the stub)
///   5-6:   xor edi, edi
///   7-13:  mov rax, 60
///   14-15: syscall
const ENTRY_STUB_SIZE: usize = 16;

/// Write an executable that prints the image's message and exits 0
pub fn generate_elf_executable(image_code: &[u8], output_path: &str) -> IoResult<()> {
    let mut file = File::create(output_path)?;

    let elf_data = create_minimal_elf(image_code);
    file.write_all(&elf_data)?;

    Ok(())
}

fn create_minimal_elf(image_code: &[u8]) -> Vec<u8> {
    let mut elf = Vec::new();

    // ========== ELF Header (64 bytes) ==========
    // e_ident
    elf.extend_from_slice(&[0x7f, 0x45, 0x4c, 0x46]); // ELF magic
    elf.push(2); // EI_CLASS: 64-bit
    elf.push(1); // EI_DATA: little endian
    elf.push(1); // EI_VERSION: current
    elf.push(0); // EI_OSABI: System V
    elf.extend_from_slice(&[0; 8]); // EI_PAD: padding

    // e_type, e_machine, e_version
    elf.extend_from_slice(&2u16.to_le_bytes()); // ET_EXEC
    elf.extend_from_slice(&62u16.to_le_bytes()); // EM_X86_64
    elf.extend_from_slice(&1u32.to_le_bytes()); // EV_CURRENT

    // Addresses and offsets
    let entry_point = 0x401000u64;
    let ph_offset = 64u64; // Right after ELF header

    elf.extend_from_slice(&entry_point.to_le_bytes()); // e_entry
    elf.extend_from_slice(&ph_offset.to_le_bytes()); // e_phoff
    elf.extend_from_slice(&0u64.to_le_bytes()); // e_shoff (no sections)
    elf.extend_from_slice(&0u32.to_le_bytes()); // e_flags
    elf.extend_from_slice(&64u16.to_le_bytes()); // e_ehsize
    elf.extend_from_slice(&56u16.to_le_bytes()); // e_phentsize
    elf.extend_from_slice(&1u16.to_le_bytes()); // e_phnum
    elf.extend_from_slice(&0u16.to_le_bytes()); // e_shentsize
    elf.extend_from_slice(&0u16.to_le_bytes()); // e_shnum
    elf.extend_from_slice(&0u16.to_le_bytes()); // e_shstrndx

    // ========== Program Header: Code Segment (56 bytes) ==========
    let code_file_offset = 0x1000u64; // Start code at page boundary
    let code_vaddr = 0x401000u64;
    let total_code_size = (ENTRY_STUB_SIZE + image_code.len()) as u64;

    elf.extend_from_slice(&1u32.to_le_bytes()); // p_type: PT_LOAD
    elf.extend_from_slice(&5u32.to_le_bytes()); // p_flags: PF_X | PF_R
    elf.extend_from_slice(&code_file_offset.to_le_bytes()); // p_offset
    elf.extend_from_slice(&code_vaddr.to_le_bytes()); // p_vaddr
    elf.extend_from_slice(&code_vaddr.to_le_bytes()); // p_paddr
    elf.extend_from_slice(&total_code_size.to_le_bytes()); // p_filesz
    elf.extend_from_slice(&total_code_size.to_le_bytes()); // p_memsz
    elf.extend_from_slice(&0x1000u64.to_le_bytes()); // p_align

    // Pad to code offset (0x1000)
    while elf.len() < code_file_offset as usize {
        elf.push(0);
    }

    // ========== Entry stub ==========
    // The image starts right after the stub, so the call target is the
    // stub size itself.
    let image_call_offset = (ENTRY_STUB_SIZE - 5) as i32;

    elf.push(0xe8); // call image
    elf.extend_from_slice(&image_call_offset.to_le_bytes());
    elf.extend_from_slice(&[0x31, 0xff]); // xor edi, edi
    elf.extend_from_slice(&[0x48, 0xc7, 0xc0, 0x3c, 0x00, 0x00, 0x00]); // mov rax, 60
    elf.extend_from_slice(&[0x0f, 0x05]); // syscall

    // ========== Code image ==========
    elf.extend_from_slice(image_code);

    elf
}
