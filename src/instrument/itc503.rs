//! Oxford Instruments ITC503 temperature controller (ISOBUS over RS-232)
//!
//! Protocol Overview:
//! - Terminator: CR (`\r`) both ways
//! - Every command is answered; replies echo the command letter
//!   (`R1` → `R+0004.21`, `T4.2` → `T`)
//! - `C3` switches the controller to remote & unlocked and must be sent first

use crate::adapters::Transport;
use crate::instrument::table::{CommandTable, ResponseParse, TableInstrument, VariableSpec};
use anyhow::Result;

/// Model name
pub const MODEL: &str = "Oxford ITC503";

/// Command table of the ITC503
pub fn command_table() -> CommandTable {
    let sensor = |name: &str, command: &str| {
        VariableSpec::read_only(name, command)
            .parse(ResponseParse::Prefixed)
            .unit("K")
    };

    CommandTable::new()
        .with(sensor("temp1", "R1"))
        .with(sensor("temp2", "R2"))
        .with(sensor("temp3", "R3"))
        .with(
            VariableSpec::read_write("setpoint", "R0", "T{val}")
                .parse(ResponseParse::Prefixed)
                .acknowledged()
                .unit("K"),
        )
        .with(
            VariableSpec::read_only("heater", "R5")
                .parse(ResponseParse::Prefixed)
                .unit("%"),
        )
}

/// Wrap an open transport and switch the controller to remote mode.
pub async fn connect(id: &str, transport: Box<dyn Transport>) -> Result<TableInstrument> {
    let instrument = TableInstrument::new(id, MODEL, transport, command_table()).with_identify("V");
    instrument.send("C3", true).await?;
    Ok(instrument)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::MockTransport;
    use crate::instrument::Instrument;

    fn mock() -> MockTransport {
        MockTransport::new()
            .with_reply("C3", "C")
            .with_reply("R1", "R+0004.21")
            .with_reply("T4.5", "T")
            .with_reply("V", "ITC503 Version 1.10 (c) OXFORD 1997")
    }

    #[tokio::test]
    async fn enters_remote_mode_on_connect() {
        let mock = mock();
        let _itc = connect("itc", Box::new(mock.clone())).await.unwrap();
        assert_eq!(mock.sent(), vec!["C3"]);
    }

    #[tokio::test]
    async fn reads_prefixed_replies_and_consumes_acks() {
        let mock = mock();
        let itc = connect("itc", Box::new(mock.clone())).await.unwrap();

        assert_eq!(itc.read("temp1").await.unwrap(), 4.21);
        itc.write("setpoint", 4.5).await.unwrap();
        assert!(itc.identify().await.unwrap().starts_with("ITC503"));
        assert_eq!(mock.sent(), vec!["C3", "R1", "T4.5", "V"]);
    }
}
