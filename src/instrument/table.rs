//! Command-table driven instruments.
//!
//! Most lab instruments map a variable onto one query command and one set command.
//! A [`CommandTable`] lists those commands; [`TableInstrument`] sends them over a
//! [`Transport`] and parses the replies.
//!
//! Set commands are `strfmt` templates with a `{val}` placeholder:
//!
//! ```text
//! dcv:  read ":SOUR:VOLT:LEV?"   write ":SOUR:VOLT:LEV {val}"
//! dac1: read "AUXV? 1"           write "AUXV 1,{val}"
//! ```

use crate::adapters::Transport;
use crate::error::LabError;
use crate::instrument::{format_setpoint, Access, Instrument, Variable};
use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::HashMap;
use std::str::FromStr;
use strfmt::strfmt;
use tokio::sync::Mutex;
use tracing::{debug, trace};

#[allow(clippy::expect_used)]
static NUMBER_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"[-+]?(?:\d+\.?\d*|\.\d+)(?:[eE][-+]?\d+)?").expect("number pattern is valid")
});

/// How to turn a reply line into a number.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseParse {
    /// The whole (trimmed) reply is a number
    Number,
    /// First number found anywhere in the reply (`+1.234E-03VDC`)
    FirstNumber,
    /// Field `n` (zero based) of a comma separated reply
    Field(usize),
    /// Reply starts with an echoed command letter (Oxford ISOBUS: `R+0004.21`)
    Prefixed,
    /// `ON`/`OFF` or `1`/`0`
    Switch,
}

impl ResponseParse {
    /// Parse `response`; `None` if it does not contain a number in the expected shape.
    pub fn parse(self, response: &str) -> Option<f64> {
        let trimmed = response.trim();
        match self {
            ResponseParse::Number => trimmed.parse().ok(),
            ResponseParse::FirstNumber => NUMBER_RE
                .find(trimmed)
                .and_then(|m| m.as_str().parse().ok()),
            ResponseParse::Field(index) => trimmed
                .split(',')
                .nth(index)
                .and_then(|field| field.trim().parse().ok()),
            ResponseParse::Prefixed => {
                let mut chars = trimmed.chars();
                match chars.next() {
                    Some(c) if c.is_ascii_alphabetic() => chars.as_str().trim().parse().ok(),
                    _ => trimmed.parse().ok(),
                }
            }
            ResponseParse::Switch => match trimmed.to_ascii_uppercase().as_str() {
                "ON" => Some(1.0),
                "OFF" => Some(0.0),
                other => other.parse().ok(),
            },
        }
    }
}

impl FromStr for ResponseParse {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let lower = s.trim().to_ascii_lowercase();
        match lower.as_str() {
            "number" => Ok(ResponseParse::Number),
            "first_number" => Ok(ResponseParse::FirstNumber),
            "prefixed" => Ok(ResponseParse::Prefixed),
            "switch" => Ok(ResponseParse::Switch),
            _ => match lower.strip_prefix("field:") {
                Some(index) => index
                    .parse()
                    .map(ResponseParse::Field)
                    .map_err(|_| format!("Invalid field index in '{}'", s)),
                None => Err(format!(
                    "Unknown response parser '{}'. Use number, first_number, field:N, prefixed or switch",
                    s
                )),
            },
        }
    }
}

/// Commands behind one variable.
#[derive(Debug, Clone, PartialEq)]
pub struct VariableSpec {
    /// Variable name
    pub name: String,
    /// Query command
    pub read: Option<String>,
    /// Set command template (`{val}` is replaced by the value)
    pub write: Option<String>,
    /// Reply parser for `read`
    pub parse: ResponseParse,
    /// The device answers set commands, and the answer must be consumed
    pub acknowledged: bool,
    /// Physical unit
    pub unit: Option<String>,
}

impl VariableSpec {
    /// Measurement-only variable
    pub fn read_only(name: &str, read: &str) -> Self {
        Self {
            name: name.to_string(),
            read: Some(read.to_string()),
            write: None,
            parse: ResponseParse::Number,
            acknowledged: false,
            unit: None,
        }
    }

    /// Setting that can be queried back
    pub fn read_write(name: &str, read: &str, write: &str) -> Self {
        Self {
            write: Some(write.to_string()),
            ..Self::read_only(name, read)
        }
    }

    /// Setting without a query command
    pub fn write_only(name: &str, write: &str) -> Self {
        Self {
            name: name.to_string(),
            read: None,
            write: Some(write.to_string()),
            parse: ResponseParse::Number,
            acknowledged: false,
            unit: None,
        }
    }

    /// Use a different reply parser
    pub fn parse(mut self, parse: ResponseParse) -> Self {
        self.parse = parse;
        self
    }

    /// Set the unit
    pub fn unit(mut self, unit: &str) -> Self {
        self.unit = Some(unit.to_string());
        self
    }

    /// Mark set commands as answered by the device
    pub fn acknowledged(mut self) -> Self {
        self.acknowledged = true;
        self
    }

    /// Access mode derived from the available commands
    pub fn access(&self) -> Access {
        match (self.read.is_some(), self.write.is_some()) {
            (true, true) => Access::ReadWrite,
            (false, true) => Access::WriteOnly,
            _ => Access::ReadOnly,
        }
    }

    /// Render the set command for `value`
    pub fn render_write(&self, value: f64) -> Result<String> {
        let template = self
            .write
            .as_ref()
            .ok_or_else(|| anyhow!("Variable '{}' has no set command", self.name))?;
        let mut context = HashMap::new();
        context.insert("val".to_string(), format_setpoint(value));
        strfmt(template, &context)
            .map_err(|e| anyhow!("Failed to format command for '{}': {}", self.name, e))
    }
}

/// Ordered set of variable specs.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CommandTable {
    variables: Vec<VariableSpec>,
}

impl CommandTable {
    /// Empty table
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a variable (replaces an existing one with the same name)
    pub fn with(mut self, spec: VariableSpec) -> Self {
        self.insert(spec);
        self
    }

    /// Add a variable (replaces an existing one with the same name)
    pub fn insert(&mut self, spec: VariableSpec) {
        match self.variables.iter_mut().find(|v| v.name == spec.name) {
            Some(existing) => *existing = spec,
            None => self.variables.push(spec),
        }
    }

    /// Look up a variable spec
    pub fn get(&self, name: &str) -> Option<&VariableSpec> {
        self.variables.iter().find(|v| v.name == name)
    }

    /// All specs in declaration order
    pub fn specs(&self) -> &[VariableSpec] {
        &self.variables
    }

    /// Number of variables
    pub fn len(&self) -> usize {
        self.variables.len()
    }

    /// Whether the table is empty
    pub fn is_empty(&self) -> bool {
        self.variables.is_empty()
    }
}

/// Instrument driven by a [`CommandTable`].
pub struct TableInstrument {
    id: String,
    model: String,
    transport: Mutex<Box<dyn Transport>>,
    table: CommandTable,
    identify_command: Option<String>,
}

impl TableInstrument {
    /// Wrap an open transport
    pub fn new(id: &str, model: &str, transport: Box<dyn Transport>, table: CommandTable) -> Self {
        Self {
            id: id.to_string(),
            model: model.to_string(),
            transport: Mutex::new(transport),
            table,
            identify_command: None,
        }
    }

    /// Set the identification query (usually `*IDN?`)
    pub fn with_identify(mut self, command: &str) -> Self {
        self.identify_command = Some(command.to_string());
        self
    }

    /// The command table
    pub fn table(&self) -> &CommandTable {
        &self.table
    }

    /// Send a raw command; with `acknowledged` the reply is read and returned.
    pub async fn send(&self, command: &str, acknowledged: bool) -> Result<Option<String>> {
        let mut transport = self.transport.lock().await;
        trace!(device = %self.id, command, "sending");
        if acknowledged {
            let reply = transport
                .query(command)
                .await
                .with_context(|| format!("{}: '{}' failed", self.id, command))?;
            Ok(Some(reply))
        } else {
            transport
                .write(command)
                .await
                .with_context(|| format!("{}: '{}' failed", self.id, command))?;
            Ok(None)
        }
    }

    /// Send a raw query and return the reply
    pub async fn query(&self, command: &str) -> Result<String> {
        self.send(command, true)
            .await?
            .ok_or_else(|| anyhow!("{}: no reply to '{}'", self.id, command))
    }

    fn spec(&self, variable: &str) -> Result<&VariableSpec, LabError> {
        self.table
            .get(variable)
            .ok_or_else(|| LabError::UnknownVariable {
                device: self.id.clone(),
                variable: variable.to_string(),
            })
    }
}

#[async_trait]
impl Instrument for TableInstrument {
    fn id(&self) -> &str {
        &self.id
    }

    fn model(&self) -> &str {
        &self.model
    }

    fn variables(&self) -> Vec<Variable> {
        self.table
            .specs()
            .iter()
            .map(|spec| Variable {
                name: spec.name.clone(),
                access: spec.access(),
                unit: spec.unit.clone(),
            })
            .collect()
    }

    async fn read(&self, variable: &str) -> Result<f64> {
        let spec = self.spec(variable)?;
        let command = spec.read.as_ref().ok_or_else(|| LabError::NotReadable {
            device: self.id.clone(),
            variable: variable.to_string(),
        })?;

        let response = self.query(command).await?;
        let value = spec
            .parse
            .parse(&response)
            .ok_or_else(|| LabError::InvalidResponse {
                device: self.id.clone(),
                response: response.clone(),
            })?;
        debug!(device = %self.id, variable, value, "read");
        Ok(value)
    }

    async fn write(&self, variable: &str, value: f64) -> Result<()> {
        let spec = self.spec(variable)?;
        if spec.write.is_none() {
            return Err(LabError::NotWritable {
                device: self.id.clone(),
                variable: variable.to_string(),
            }
            .into());
        }
        let command = spec.render_write(value)?;
        self.send(&command, spec.acknowledged).await?;
        debug!(device = %self.id, variable, value, "write");
        Ok(())
    }

    async fn identify(&self) -> Result<String> {
        match &self.identify_command {
            Some(command) => self.query(command).await,
            None => anyhow::bail!("Identification not supported by {}", self.model),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::MockTransport;

    fn table() -> CommandTable {
        CommandTable::new()
            .with(VariableSpec::read_write("dcv", ":SOUR:VOLT?", ":SOUR:VOLT {val}").unit("V"))
            .with(VariableSpec::read_only("meas_i", ":MEAS:CURR?").parse(ResponseParse::Field(1)))
            .with(VariableSpec::write_only("zero", "ZERO {val}"))
    }

    #[test]
    fn parsers() {
        assert_eq!(ResponseParse::Number.parse(" 1.5E-3 "), Some(1.5e-3));
        assert_eq!(ResponseParse::Number.parse("ERR"), None);
        assert_eq!(ResponseParse::FirstNumber.parse("+1.234E-03VDC"), Some(1.234e-3));
        assert_eq!(ResponseParse::FirstNumber.parse("no digits"), None);
        assert_eq!(
            ResponseParse::Field(1).parse("+1.0E+00,+2.5E-06,+9.91E+37"),
            Some(2.5e-6)
        );
        assert_eq!(ResponseParse::Field(7).parse("1,2"), None);
        assert_eq!(ResponseParse::Prefixed.parse("R+0004.21"), Some(4.21));
        assert_eq!(ResponseParse::Prefixed.parse("-3.5"), Some(-3.5));
        assert_eq!(ResponseParse::Switch.parse("ON"), Some(1.0));
        assert_eq!(ResponseParse::Switch.parse("0"), Some(0.0));
    }

    #[test]
    fn parser_names() {
        assert_eq!("number".parse::<ResponseParse>(), Ok(ResponseParse::Number));
        assert_eq!("Field:3".parse::<ResponseParse>(), Ok(ResponseParse::Field(3)));
        assert_eq!("prefixed".parse::<ResponseParse>(), Ok(ResponseParse::Prefixed));
        assert!("field:x".parse::<ResponseParse>().is_err());
        assert!("magic".parse::<ResponseParse>().is_err());
    }

    #[test]
    fn access_follows_commands() {
        let table = table();
        assert_eq!(table.get("dcv").unwrap().access(), Access::ReadWrite);
        assert_eq!(table.get("meas_i").unwrap().access(), Access::ReadOnly);
        assert_eq!(table.get("zero").unwrap().access(), Access::WriteOnly);
    }

    #[test]
    fn insert_replaces_by_name() {
        let mut table = table();
        table.insert(VariableSpec::read_only("dcv", "VOLT?"));
        assert_eq!(table.len(), 3);
        assert_eq!(table.get("dcv").unwrap().access(), Access::ReadOnly);
    }

    #[test]
    fn renders_set_command() {
        let spec = VariableSpec::read_write("dac1", "AUXV? 1", "AUXV 1,{val}");
        assert_eq!(spec.render_write(0.25).unwrap(), "AUXV 1,0.25");
        assert_eq!(spec.render_write(2.0).unwrap(), "AUXV 1,2");
        assert!(VariableSpec::read_only("x", "X?").render_write(1.0).is_err());
    }

    #[tokio::test]
    async fn reads_and_writes_through_transport() {
        let mock = MockTransport::new()
            .with_reply(":SOUR:VOLT?", "+1.500000E+00")
            .with_reply(":MEAS:CURR?", "+1.5E+00,+3.0E-06,+9.91E+37,+1.0E+03,+2.1E+04");
        let instrument = TableInstrument::new("k", "Test", Box::new(mock.clone()), table());

        assert_eq!(instrument.read("dcv").await.unwrap(), 1.5);
        assert_eq!(instrument.read("meas_i").await.unwrap(), 3.0e-6);
        instrument.write("dcv", 2.5).await.unwrap();

        assert_eq!(
            mock.sent(),
            vec![":SOUR:VOLT?", ":MEAS:CURR?", ":SOUR:VOLT 2.5"]
        );
    }

    #[tokio::test]
    async fn access_violations_are_lab_errors() {
        let instrument =
            TableInstrument::new("k", "Test", Box::new(MockTransport::new()), table());

        let err = instrument.write("meas_i", 1.0).await.unwrap_err();
        assert!(matches!(
            err.downcast_ref::<LabError>(),
            Some(LabError::NotWritable { .. })
        ));

        let err = instrument.read("zero").await.unwrap_err();
        assert!(matches!(
            err.downcast_ref::<LabError>(),
            Some(LabError::NotReadable { .. })
        ));

        let err = instrument.read("nope").await.unwrap_err();
        assert!(matches!(
            err.downcast_ref::<LabError>(),
            Some(LabError::UnknownVariable { .. })
        ));
    }

    #[tokio::test]
    async fn garbage_reply_is_invalid_response() {
        let mock = MockTransport::new().with_reply(":SOUR:VOLT?", "OVERFLOW");
        let instrument = TableInstrument::new("k", "Test", Box::new(mock), table());
        let err = instrument.read("dcv").await.unwrap_err();
        assert!(matches!(
            err.downcast_ref::<LabError>(),
            Some(LabError::InvalidResponse { .. })
        ));
    }

    #[tokio::test]
    async fn identify_needs_a_command() {
        let mock = MockTransport::new().with_reply("*IDN?", "ACME,1,2,3");
        let plain = TableInstrument::new("a", "Test", Box::new(mock.clone()), table());
        assert!(plain.identify().await.is_err());

        let with_idn =
            TableInstrument::new("b", "Test", Box::new(mock), table()).with_identify("*IDN?");
        assert_eq!(with_idn.identify().await.unwrap(), "ACME,1,2,3");
    }
}
