use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Result of a Server List Ping: the status payload plus the measured
/// ping/pong round trip.
#[derive(Serialize, Deserialize, Debug)]
pub struct SlpStatus {
    pub payload: PingPayload,
    pub latency: Duration,
}

#[derive(Serialize, Deserialize, Debug)]
pub struct PingPayload {
    pub version: VersionPayload,
    pub players: PlayersPayload,
    #[serde(default, with = "description_serde")]
    pub description: String,
}

mod description_serde {
    use serde::{Deserialize, Deserializer, Serializer};
    use serde_json::Value;

    pub fn serialize<S>(value: &String, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(value)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<String, D::Error>
    where
        D: Deserializer<'de>,
    {
        let value = Value::deserialize(deserializer)?;
        let mut text = String::new();
        flatten(&value, &mut text);
        Ok(text)
    }

    // chat component: {"text": "...", "extra": [...]} or a bare string
    fn flatten(value: &Value, out: &mut String) {
        match value {
            Value::String(s) => out.push_str(s),
            Value::Object(obj) => {
                if let Some(text) = obj.get("text").and_then(Value::as_str) {
                    out.push_str(text);
                }
                if let Some(Value::Array(extra)) = obj.get("extra") {
                    extra.iter().for_each(|v| flatten(v, out));
                }
            }
            Value::Array(parts) => parts.iter().for_each(|v| flatten(v, out)),
            _ => {}
        }
    }
}

#[derive(Serialize, Deserialize, Debug)]
pub struct VersionPayload {
    pub protocol: i32,
    pub name: String,
}

#[derive(Serialize, Deserialize, Debug)]
pub struct PlayersPayload {
    pub max: i32,
    pub online: i32,
    #[serde(default)]
    pub sample: Vec<PlayerSample>,
}

#[derive(Serialize, Deserialize, Debug)]
pub struct PlayerSample {
    pub name: String,
    pub id: uuid::Uuid,
}
