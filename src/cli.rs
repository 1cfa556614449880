/// Top-level flows: JIT-and-run and standalone executable emission
use crate::codegen::{detect_host_target, format_codegen_error, Target};
use crate::elf_gen::generate_elf_executable;
use crate::hex_dump::format_machine_code;
use crate::jit_runner::{format_region_error, run_image, ExecOutcome};
use std::io;
use std::process::Command;

/// Build the greeting message the generated code will print
pub fn greeting_for(name: &str) -> String {
    format!("Hello, {}!\n", name)
}

/// Prompt for and read the user's name from stdin
///
/// Only the trailing line break is stripped; an empty line (or EOF) is a
/// valid empty name.
pub fn read_name() -> Result<String, String> {
    println!("What is your name?");

    let mut input = String::new();
    io::stdin()
        .read_line(&mut input)
        .map_err(|e| format!("Failed to read input: {}", e))?;

    while input.ends_with('\n') || input.ends_with('\r') {
        input.pop();
    }

    Ok(input)
}

/// Compile the greeting for the host target, show it, map it, run it
pub fn run_greeting(name: &str) -> Result<(), String> {
    let target = detect_host_target();
    let greeting = greeting_for(name);

    println!("Platform detected: {}", target.label());
    if target == Target::Arm64MacOS {
        println!(
            "Note: Using simplified JIT approach due to system call security restrictions on Apple Silicon."
        );
    }

    let image = target
        .compile(&greeting)
        .map_err(|e| format_codegen_error(&e))?;

    println!("\nMachine code generated:");
    print!("{}", format_machine_code(image.as_code()));
    println!();

    let outcome = run_image(&image).map_err(|e| format_region_error(&e))?;

    if let ExecOutcome::Returned(status) = outcome {
        println!("JIT executed successfully (returned: {})", status);
        print!("{}", greeting);
    }

    Ok(())
}

/// Write the greeting program out as a standalone executable
///
/// Only the Linux x86-64 profile has an executable format wired up;
/// emission for any other host is a reported error, not a fallback.
pub fn emit_greeting_executable(name: &str, output_path: &str) -> Result<(), String> {
    let target = detect_host_target();
    if target != Target::X86_64Linux {
        return Err(format!(
            "Executable emission is only supported on Linux x86-64 (host is {})",
            target.label()
        ));
    }

    let greeting = greeting_for(name);
    let image = target
        .compile(&greeting)
        .map_err(|e| format_codegen_error(&e))?;

    generate_elf_executable(image.as_code(), output_path)
        .map_err(|e| format!("Failed to write executable: {}", e))?;

    Command::new("chmod")
        .args(["+x", output_path])
        .output()
        .map_err(|e| format!("Failed to chmod executable: {}", e))?;

    Ok(())
}
