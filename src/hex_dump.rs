/// Hex rendering of generated machine code
///
/// Two-digit bytes, space separated, seven to a line.

/// Format `bytes` for the console dump
pub fn format_machine_code(bytes: &[u8]) -> String {
    let mut out = String::new();
    for (index, byte) in bytes.iter().enumerate() {
        out.push_str(&format!("{:02x} ", byte));
        if (index + 1) % 7 == 0 {
            out.push('\n');
        }
    }
    out
}
