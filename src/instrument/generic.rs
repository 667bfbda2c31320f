//! Config-defined instruments.
//!
//! A `type = "generic"` instrument declares its command table in the config file,
//! so a new device that speaks line-based ASCII needs no new driver code:
//!
//! ```toml
//! [[instruments]]
//! id = "magnet"
//! type = "generic"
//! transport = { kind = "serial", port = "/dev/ttyUSB1", baud_rate = 9600 }
//! [instruments.options]
//! model = "Magnet PSU"
//! identify = "*IDN?"
//! init = ["SYST:REM"]
//! [instruments.options.variables.field]
//! read = "FIELD?"
//! write = "FIELD {val}"
//! unit = "T"
//! [instruments.options.variables.current]
//! read = "MEAS:CURR?"
//! parse = "first_number"
//! ```

use crate::adapters::Transport;
use crate::error::LabError;
use crate::instrument::table::{CommandTable, ResponseParse, TableInstrument, VariableSpec};
use anyhow::Result;
use serde::Deserialize;
use std::collections::BTreeMap;

/// `options` table of a generic instrument
#[derive(Debug, Clone, Deserialize)]
pub struct GenericOptions {
    /// Model name shown in listings
    #[serde(default = "default_model")]
    pub model: String,
    /// Identification query
    #[serde(default)]
    pub identify: Option<String>,
    /// Commands sent once after connecting
    #[serde(default)]
    pub init: Vec<String>,
    /// Variables by name
    pub variables: BTreeMap<String, GenericVariable>,
}

/// One variable of a generic instrument
#[derive(Debug, Clone, Deserialize)]
pub struct GenericVariable {
    /// Query command
    #[serde(default)]
    pub read: Option<String>,
    /// Set command template with `{val}`
    #[serde(default)]
    pub write: Option<String>,
    /// Reply parser (number, first_number, field:N, prefixed, switch)
    #[serde(default)]
    pub parse: Option<String>,
    /// Device answers set commands
    #[serde(default)]
    pub ack: bool,
    /// Physical unit
    #[serde(default)]
    pub unit: Option<String>,
}

fn default_model() -> String {
    "Generic".to_string()
}

impl GenericOptions {
    /// Deserialize from the `options` value of an instrument definition
    pub fn from_value(id: &str, options: &toml::Value) -> Result<Self, LabError> {
        options.clone().try_into().map_err(|e: toml::de::Error| {
            LabError::Configuration(format!("Instrument '{}': invalid options: {}", id, e))
        })
    }

    /// Build the command table
    pub fn command_table(&self, id: &str) -> Result<CommandTable, LabError> {
        let mut table = CommandTable::new();
        for (name, variable) in &self.variables {
            if variable.read.is_none() && variable.write.is_none() {
                return Err(LabError::Configuration(format!(
                    "Instrument '{}': variable '{}' needs a read or write command",
                    id, name
                )));
            }
            let parse = match &variable.parse {
                Some(parse) => parse.parse::<ResponseParse>().map_err(|e| {
                    LabError::Configuration(format!("Instrument '{}', variable '{}': {}", id, name, e))
                })?,
                None => ResponseParse::FirstNumber,
            };
            table.insert(VariableSpec {
                name: name.clone(),
                read: variable.read.clone(),
                write: variable.write.clone(),
                parse,
                acknowledged: variable.ack,
                unit: variable.unit.clone(),
            });
        }
        Ok(table)
    }
}

/// Build a generic instrument and send its init commands.
pub async fn connect(
    id: &str,
    transport: Box<dyn Transport>,
    options: &toml::Value,
) -> Result<TableInstrument> {
    let options = GenericOptions::from_value(id, options)?;
    let table = options.command_table(id)?;
    let mut instrument = TableInstrument::new(id, &options.model, transport, table);
    if let Some(identify) = &options.identify {
        instrument = instrument.with_identify(identify);
    }
    for command in &options.init {
        instrument.send(command, false).await?;
    }
    Ok(instrument)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::MockTransport;
    use crate::instrument::{Access, Instrument};

    fn options() -> toml::Value {
        toml::from_str(
            r#"
            model = "Magnet PSU"
            init = ["SYST:REM"]
            [variables.field]
            read = "FIELD?"
            write = "FIELD {val}"
            parse = "number"
            unit = "T"
            [variables.current]
            read = "MEAS:CURR?"
            "#,
        )
        .unwrap()
    }

    #[tokio::test]
    async fn builds_from_options() {
        let mock = MockTransport::new()
            .with_reply("FIELD?", "0.5")
            .with_reply("MEAS:CURR?", "I=12.5A");
        let magnet = connect("magnet", Box::new(mock.clone()), &options())
            .await
            .unwrap();

        assert_eq!(magnet.model(), "Magnet PSU");
        assert_eq!(magnet.variable("field").unwrap().access, Access::ReadWrite);
        assert_eq!(magnet.read("current").await.unwrap(), 12.5);
        magnet.write("field", 1.0).await.unwrap();
        assert_eq!(mock.sent(), vec!["SYST:REM", "MEAS:CURR?", "FIELD 1"]);
    }

    #[test]
    fn rejects_variable_without_commands() {
        let value: toml::Value = toml::from_str("[variables.empty]\nunit = \"V\"").unwrap();
        let options = GenericOptions::from_value("x", &value).unwrap();
        assert!(matches!(
            options.command_table("x"),
            Err(LabError::Configuration(_))
        ));
    }

    #[test]
    fn rejects_unknown_parser() {
        let value: toml::Value =
            toml::from_str("[variables.v]\nread = \"V?\"\nparse = \"hex\"").unwrap();
        let options = GenericOptions::from_value("x", &value).unwrap();
        assert!(options.command_table("x").is_err());
    }

    #[test]
    fn variables_are_required() {
        let value: toml::Value = toml::from_str("model = \"x\"").unwrap();
        assert!(GenericOptions::from_value("x", &value).is_err());
    }
}
