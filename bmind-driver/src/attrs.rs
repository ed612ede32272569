use serde::{Deserialize, Serialize};

/// Named byte-blob configuration value. Owned by exactly one driver and
/// unique by name within it
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Config {
    pub id: String,
    pub driver_id: String,
    pub name: String,
    pub value: Vec<u8>,
    pub hidden: bool,
}

impl Config {
    pub fn new(driver_id: &str, name: &str) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            driver_id: driver_id.to_string(),
            name: name.to_string(),
            value: Vec::new(),
            hidden: false,
        }
    }
}

/// Named byte-blob status value reported by a driver, unique by name
/// within it
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Indicator {
    pub id: String,
    pub driver_id: String,
    pub name: String,
    pub value: Vec<u8>,
    pub enabled: bool,
    pub hidden: bool,
}

impl Indicator {
    pub fn new(driver_id: &str, name: &str) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            driver_id: driver_id.to_string(),
            name: name.to_string(),
            value: Vec::new(),
            enabled: true,
            hidden: false,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Control {
    pub id: String,
    pub driver_id: String,
    pub name: String,
    pub enabled: bool,
    pub hidden: bool,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum SubjectKind {
    #[default]
    Unknown,
    MqttTopic,
}

/// Named descriptor of an external data source a driver consumes, e.g. a
/// broker topic
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Subject {
    #[serde(rename = "type")]
    pub kind: SubjectKind,
    pub id: String,
    pub driver_id: String,
    pub name: String,
    pub value: Vec<u8>,
    pub enabled: bool,
}

impl Subject {
    pub fn new(driver_id: &str, name: &str) -> Self {
        Self {
            kind: SubjectKind::Unknown,
            id: uuid::Uuid::new_v4().to_string(),
            driver_id: driver_id.to_string(),
            name: name.to_string(),
            value: Vec::new(),
            enabled: true,
        }
    }

    pub fn mqtt_topic(driver_id: &str, name: &str, topic: &str) -> Self {
        let mut subject = Self::new(driver_id, name);
        subject.kind = SubjectKind::MqttTopic;
        subject.value = topic.as_bytes().to_vec();
        subject
    }

    /// Topic string for broker-topic subjects, `None` otherwise
    pub fn topic(&self) -> Option<String> {
        if self.kind != SubjectKind::MqttTopic {
            return None;
        }
        String::from_utf8(self.value.clone()).ok()
    }
}
