use std::fmt::Display;

use serde::Deserialize;
use serde_json::{Number, Value};
use thiserror::Error;

/// The latest decoded packet for one meter.
/// `meter_id` is always the normalized `Message.ID` of `packet`, which is
/// also the key the record is cached under.
#[derive(Debug, Clone, PartialEq)]
pub struct SensorRecord {
    pub meter_id: String,
    pub meter_type: Option<String>,
    pub consumption: Option<Number>,

    /// The complete decoded packet, kept for callers needing fields beyond
    /// consumption and type.
    pub packet: Value,
}

#[derive(Error, Debug)]
pub enum SensorRecordError {
    /// The line is not JSON at all.
    #[error("Decoder line is not valid JSON. Error: {0}")]
    InvalidJson(serde_json::Error),

    /// The line is JSON but lacks the nested message or its identifier.
    #[error("Decoder packet has an unexpected shape. Error: {0}")]
    UnexpectedShape(serde_json::Error),
}

#[derive(Deserialize)]
struct Envelope {
    #[serde(rename = "Type", default)]
    meter_type: Option<Value>,
    #[serde(rename = "Message")]
    message: Message,
}

#[derive(Deserialize)]
struct Message {
    #[serde(rename = "ID")]
    id: MeterId,
    #[serde(rename = "Consumption", default)]
    consumption: Option<Value>,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum MeterId {
    Text(String),
    Number(Number),
}

impl From<MeterId> for String {
    fn from(value: MeterId) -> Self {
        match value {
            MeterId::Text(text) => text,
            MeterId::Number(number) => number.to_string(),
        }
    }
}

impl SensorRecord {
    /// The nested `Message` object: type specific fields plus consumption.
    pub fn message(&self) -> Option<&Value> {
        self.packet.get("Message")
    }
}

impl TryFrom<&str> for SensorRecord {
    type Error = SensorRecordError;

    /// Parse one line of decoder output.
    fn try_from(line: &str) -> Result<Self, Self::Error> {
        let packet: Value = serde_json::from_str(line).map_err(SensorRecordError::InvalidJson)?;
        let envelope =
            Envelope::deserialize(&packet).map_err(SensorRecordError::UnexpectedShape)?;

        let consumption = match envelope.message.consumption {
            Some(Value::Number(number)) => Some(number),
            _ => None,
        };

        // Strings are kept as is, any other kind of value as its JSON text.
        let meter_type = match envelope.meter_type {
            None | Some(Value::Null) => None,
            Some(Value::String(text)) => Some(text),
            Some(other) => Some(other.to_string()),
        };

        Ok(SensorRecord {
            meter_id: envelope.message.id.into(),
            meter_type,
            consumption,
            packet,
        })
    }
}

impl Display for SensorRecord {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "(SensorRecord: meter_id={}, meter_type={}, consumption={})",
            self.meter_id,
            self.meter_type.as_deref().unwrap_or("?"),
            self.consumption
                .as_ref()
                .map(|c| c.to_string())
                .unwrap_or_else(|| "?".into())
        )
    }
}
