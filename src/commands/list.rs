//! List commands implementation

use crate::programmers;
use picflash_core::chip;

/// List all programmers compiled into this build
pub fn list_programmers() {
    print!("{}", programmers::programmer_help());
}

/// List all supported chips
pub fn list_chips() {
    println!("Supported chips:");
    println!();
    println!("{:<10} {:>8} {:>6} {:>8}", "Name", "Words", "Bits", "Config");
    println!("{}", "-".repeat(36));

    for chip in chip::CHIPS {
        println!(
            "{:<10} {:>8} {:>6} {:>#8x}",
            format!("pic{}", chip.name),
            chip.program_words,
            chip.word_bits,
            chip.config_addr
        );
    }
}
