//! Stanford Research SR830 lock-in amplifier
//!
//! Outputs `x`, `y`, `r`, `theta` are read with `OUTP? n`; the reference
//! frequency and sine amplitude are settable; four auxiliary outputs
//! (`dac1..dac4`, ±10.5 V) and four auxiliary inputs (`adc1..adc4`).

use crate::adapters::Transport;
use crate::instrument::table::{CommandTable, TableInstrument, VariableSpec};

/// Model name
pub const MODEL: &str = "SR830";

/// Command table of the SR830
pub fn command_table() -> CommandTable {
    let mut table = CommandTable::new()
        .with(VariableSpec::read_only("x", "OUTP? 1").unit("V"))
        .with(VariableSpec::read_only("y", "OUTP? 2").unit("V"))
        .with(VariableSpec::read_only("r", "OUTP? 3").unit("V"))
        .with(VariableSpec::read_only("theta", "OUTP? 4").unit("deg"))
        .with(VariableSpec::read_write("freq", "FREQ?", "FREQ {val}").unit("Hz"))
        .with(VariableSpec::read_write("amp", "SLVL?", "SLVL {val}").unit("V"));

    for channel in 1..=4 {
        table.insert(
            VariableSpec::read_write(
                &format!("dac{channel}"),
                &format!("AUXV? {channel}"),
                &format!("AUXV {channel},{{val}}"),
            )
            .unit("V"),
        );
    }
    for channel in 1..=4 {
        table.insert(VariableSpec::read_only(&format!("adc{channel}"), &format!("OAUX? {channel}")).unit("V"));
    }
    table
}

/// Wrap an open transport.
pub fn connect(id: &str, transport: Box<dyn Transport>) -> TableInstrument {
    TableInstrument::new(id, MODEL, transport, command_table()).with_identify("*IDN?")
}
