//! Keithley 2400 SourceMeter
//!
//! Protocol: SCPI over GPIB, RS-232 or LAN adapters.
//!
//! | variable | access | command |
//! |---|---|---|
//! | `dcv` | rw | `:SOUR:VOLT:LEV` |
//! | `dci` | rw | `:SOUR:CURR:LEV` |
//! | `meas_v` | r | `:MEAS:VOLT?` (field 0 of the reading) |
//! | `meas_i` | r | `:MEAS:CURR?` (field 1 of the reading) |
//! | `output` | rw | `:OUTP` (0/1) |
//!
//! With the default `:FORM:ELEM` a measurement reply carries five fields
//! (voltage, current, resistance, timestamp, status), hence the field parsers.

use crate::adapters::Transport;
use crate::instrument::table::{CommandTable, ResponseParse, TableInstrument, VariableSpec};

/// Model name reported by [`crate::instrument::Instrument::model`]
pub const MODEL: &str = "Keithley 2400";

/// Command table of the 2400
pub fn command_table() -> CommandTable {
    CommandTable::new()
        .with(VariableSpec::read_write("dcv", ":SOUR:VOLT:LEV?", ":SOUR:VOLT:LEV {val}").unit("V"))
        .with(VariableSpec::read_write("dci", ":SOUR:CURR:LEV?", ":SOUR:CURR:LEV {val}").unit("A"))
        .with(
            VariableSpec::read_only("meas_v", ":MEAS:VOLT?")
                .parse(ResponseParse::Field(0))
                .unit("V"),
        )
        .with(
            VariableSpec::read_only("meas_i", ":MEAS:CURR?")
                .parse(ResponseParse::Field(1))
                .unit("A"),
        )
        .with(VariableSpec::read_write("output", ":OUTP?", ":OUTP {val}").parse(ResponseParse::Switch))
}

/// Wrap an open transport.
pub fn connect(id: &str, transport: Box<dyn Transport>) -> TableInstrument {
    TableInstrument::new(id, MODEL, transport, command_table()).with_identify("*IDN?")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::MockTransport;
    use crate::instrument::{Access, Instrument};

    #[tokio::test]
    async fn source_and_measure() {
        let mock = MockTransport::new()
            .with_reply(":SOUR:VOLT:LEV?", "+2.000000E+00")
            .with_reply(
                ":MEAS:CURR?",
                "+2.000000E+00,+1.000000E-06,+9.910000E+37,+1.234500E+03,+2.150800E+04",
            )
            .with_reply(":OUTP?", "1");
        let smu = connect("smu", Box::new(mock.clone()));

        assert_eq!(smu.read("dcv").await.unwrap(), 2.0);
        assert_eq!(smu.read("meas_i").await.unwrap(), 1.0e-6);
        assert_eq!(smu.read("output").await.unwrap(), 1.0);
        smu.write("dcv", -0.5).await.unwrap();
        smu.write("output", 0.0).await.unwrap();

        let sent = mock.sent();
        assert_eq!(sent[3], ":SOUR:VOLT:LEV -0.5");
        assert_eq!(sent[4], ":OUTP 0");
    }

    #[test]
    fn movable_variables() {
        let smu = connect("smu", Box::new(MockTransport::new()));
        assert!(smu.can_move("dcv"));
        assert!(smu.can_move("dci"));
        assert!(!smu.can_move("meas_i"));
        assert_eq!(smu.variable("meas_v").unwrap().access, Access::ReadOnly);
        assert_eq!(smu.model(), MODEL);
    }
}
