//! Keithley 2000 digital multimeter. All variables are measurements.

use crate::adapters::Transport;
use crate::instrument::table::{CommandTable, ResponseParse, TableInstrument, VariableSpec};

/// Model name
pub const MODEL: &str = "Keithley 2000";

/// Command table of the 2000
pub fn command_table() -> CommandTable {
    let measurement = |name: &str, command: &str, unit: &str| {
        VariableSpec::read_only(name, command)
            .parse(ResponseParse::FirstNumber)
            .unit(unit)
    };

    CommandTable::new()
        .with(measurement("dcv", ":MEAS:VOLT:DC?", "V"))
        .with(measurement("acv", ":MEAS:VOLT:AC?", "V"))
        .with(measurement("dci", ":MEAS:CURR:DC?", "A"))
        .with(measurement("aci", ":MEAS:CURR:AC?", "A"))
        .with(measurement("res", ":MEAS:RES?", "Ohm"))
}

/// Wrap an open transport.
pub fn connect(id: &str, transport: Box<dyn Transport>) -> TableInstrument {
    TableInstrument::new(id, MODEL, transport, command_table()).with_identify("*IDN?")
}
