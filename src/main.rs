mod cli;
mod codegen;
mod elf_gen;
mod hex_dump;
mod jit_runner;
mod sizing;

use cli::{emit_greeting_executable, read_name, run_greeting};
use std::env;
use std::process;

fn main() {
    let args: Vec<String> = env::args().collect();

    if args.len() == 3 && args[1] == "--emit" {
        let output_file = &args[2];

        match read_name().and_then(|name| emit_greeting_executable(&name, output_file)) {
            Ok(()) => println!("Successfully wrote executable '{}'", output_file),
            Err(e) => fail(&e),
        }
    } else if args.len() == 1 {
        if let Err(e) = read_name().and_then(|name| run_greeting(&name)) {
            fail(&e);
        }
    } else {
        println!("Usage:");
        println!("  greetjit                 - JIT the greeting and run it in process");
        println!("  greetjit --emit <out>    - Write the greeting program as an executable");
    }
}

fn fail(message: &str) -> ! {
    eprintln!("Error: {}", message);
    process::exit(1);
}
