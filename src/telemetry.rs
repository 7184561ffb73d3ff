//!
//! Entities, metric sets and inventory in the format read by the
//! infrastructure agent (protocol version 3).
//!
use crate::{Error, Result};
use serde::ser::SerializeMap;
use serde::Serialize;
use std::collections::BTreeMap;

const PROTOCOL_VERSION: &str = "3";

/// Everything collected in one cycle
#[derive(Debug, Clone, Serialize)]
pub struct Integration {
    name: String,
    protocol_version: &'static str,
    integration_version: String,
    #[serde(rename = "data")]
    entities: Vec<Entity>,
}

impl Integration {
    /// Create an integration without entities
    #[must_use]
    pub fn new(name: &str, version: &str) -> Self {
        Self {
            name: name.to_string(),
            protocol_version: PROTOCOL_VERSION,
            integration_version: version.to_string(),
            entities: Vec::new(),
        }
    }

    /// Add an entity
    pub fn add_entity(&mut self, entity: Entity) {
        self.entities.push(entity);
    }

    /// All entities
    #[must_use]
    pub fn entities(&self) -> &[Entity] {
        &self.entities
    }

    /// Look up an entity by name and type
    #[must_use]
    pub fn entity(&self, name: &str, entity_type: &str) -> Option<&Entity> {
        self.entities
            .iter()
            .find(|e| e.name == name && e.entity_type == entity_type)
    }
}

/// A monitored object, the cluster or one of its databases
#[derive(Debug, Clone)]
pub struct Entity {
    name: String,
    entity_type: String,
    metric_sets: Vec<MetricSet>,
    inventory: BTreeMap<String, BTreeMap<String, String>>,
}

impl Entity {
    /// Create an entity, the name must not be empty
    pub fn new(name: &str, entity_type: &str) -> Result<Self> {
        if name.is_empty() {
            return Err(Error::precondition("entity name must not be empty"));
        }
        if entity_type.is_empty() {
            return Err(Error::precondition("entity type must not be empty"));
        }
        Ok(Self {
            name: name.to_string(),
            entity_type: entity_type.to_string(),
            metric_sets: Vec::new(),
            inventory: BTreeMap::new(),
        })
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub fn entity_type(&self) -> &str {
        &self.entity_type
    }

    /// Add an empty metric set
    pub fn new_metric_set(&mut self, event_type: &str) -> &mut MetricSet {
        let set = MetricSet {
            event_type: event_type.to_string(),
            display_name: self.name.clone(),
            entity_name: format!("{}:{}", self.entity_type, self.name),
            metrics: BTreeMap::new(),
        };
        let ix = self.metric_sets.len();
        self.metric_sets.push(set);
        &mut self.metric_sets[ix]
    }

    #[must_use]
    pub fn metric_sets(&self) -> &[MetricSet] {
        &self.metric_sets
    }

    /// Set the `field` of inventory item `key`
    pub fn set_inventory_item(&mut self, key: &str, field: &str, value: &str) {
        self.inventory
            .entry(key.to_string())
            .or_default()
            .insert(field.to_string(), value.to_string());
    }

    #[must_use]
    pub fn inventory_item(&self, key: &str, field: &str) -> Option<&str> {
        self.inventory
            .get(key)
            .and_then(|item| item.get(field))
            .map(String::as_str)
    }
}

impl Serialize for Entity {
    fn serialize<S>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        #[derive(Serialize)]
        struct Metadata<'a> {
            name: &'a str,
            #[serde(rename = "type")]
            entity_type: &'a str,
            id_attributes: &'a [String],
        }

        let mut map = serializer.serialize_map(Some(4))?;
        map.serialize_entry(
            "entity",
            &Metadata {
                name: &self.name,
                entity_type: &self.entity_type,
                id_attributes: &[],
            },
        )?;
        map.serialize_entry("metrics", &self.metric_sets)?;
        map.serialize_entry("inventory", &self.inventory)?;
        map.serialize_entry("events", &[] as &[String])?;
        map.end()
    }
}

/// Named gauges of one event type
#[derive(Debug, Clone)]
pub struct MetricSet {
    event_type: String,
    display_name: String,
    entity_name: String,
    metrics: BTreeMap<String, f64>,
}

impl MetricSet {
    /// Set a gauge, NaN and infinite values are rejected
    pub fn set_gauge(&mut self, name: &str, value: f64) -> Result<()> {
        if name.is_empty() {
            return Err(Error::precondition("metric name must not be empty"));
        }
        if !value.is_finite() {
            return Err(Error::Precondition(format!(
                "{} of {} is not a finite number: {}",
                name, self.display_name, value
            )));
        }
        self.metrics.insert(name.to_string(), value);
        Ok(())
    }

    #[must_use]
    pub fn event_type(&self) -> &str {
        &self.event_type
    }

    #[must_use]
    pub fn get(&self, name: &str) -> Option<f64> {
        self.metrics.get(name).copied()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.metrics.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.metrics.is_empty()
    }
}

impl Serialize for MetricSet {
    fn serialize<S>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        let mut map = serializer.serialize_map(Some(self.metrics.len() + 3))?;
        map.serialize_entry("event_type", &self.event_type)?;
        map.serialize_entry("displayName", &self.display_name)?;
        map.serialize_entry("entityName", &self.entity_name)?;
        for (name, value) in &self.metrics {
            map.serialize_entry(name, value)?;
        }
        map.end()
    }
}

/// Hands the collected telemetry over to the agent
pub trait Publisher {
    fn publish(&mut self, integration: &Integration) -> Result<()>;
}

/// Writes the integration as a single JSON document
pub struct JsonPublisher<W: std::io::Write> {
    writer: W,
    pretty: bool,
}

impl JsonPublisher<std::io::Stdout> {
    /// Publish on stdout, where the agent reads it
    #[must_use]
    pub fn stdout() -> Self {
        Self::new(std::io::stdout())
    }
}

impl<W: std::io::Write> JsonPublisher<W> {
    pub fn new(writer: W) -> Self {
        Self {
            writer,
            pretty: false,
        }
    }

    /// Indent the output
    #[must_use]
    pub fn pretty(self) -> Self {
        Self {
            pretty: true,
            ..self
        }
    }

    pub fn into_inner(self) -> W {
        self.writer
    }
}

impl<W: std::io::Write> Publisher for JsonPublisher<W> {
    fn publish(&mut self, integration: &Integration) -> Result<()> {
        if self.pretty {
            serde_json::to_writer_pretty(&mut self.writer, integration)?;
        } else {
            serde_json::to_writer(&mut self.writer, integration)?;
        }
        self.writer.write_all(b"\n")?;
        self.writer.flush()?;
        tracing::debug!("Published {} entities", integration.entities().len());
        Ok(())
    }
}
