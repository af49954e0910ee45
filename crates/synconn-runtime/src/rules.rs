//! Pathway rules: which connections to create and how to configure them
//!
//! Rules come from TOML `[[connection]]` tables and are applied in file
//! order, from the most general pathway to the most specific one.
//!
//! ```toml
//! [[connection]]
//! name = "L4 to L2"
//! source = "Layer4"
//! destination = "Layer2"
//! weight = 0.5
//! synapse_configure = "%s.tau_d_AMPA = 2"
//! ```

use crate::error::{ConnectionError, Result};

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;
use synconn_index::ConnectionRecord;
use toml::Value;

/// A property assignment applied to matching connections
#[derive(Debug, Clone, PartialEq)]
pub enum ConfigureAction {
    /// Netcon weight scale factor
    Weight(f64),
    /// Spontaneous minis rate
    SpontMinis(f64),
    /// Synapse configuration snippet, appended
    SynapseConfigure(String),
    /// Mechanism replacing the default synapse model
    ModOverride(String),
}

type PropertyParser = fn(&Value) -> Option<ConfigureAction>;

/// Property name -> action constructor
const PROPERTY_SETTERS: &[(&str, PropertyParser)] = &[
    ("weight", parse_weight),
    ("spont_minis", parse_spont_minis),
    ("synapse_configure", parse_synapse_configure),
    ("mod_override", parse_mod_override),
];

fn as_f64(value: &Value) -> Option<f64> {
    match value {
        Value::Float(f) => Some(*f),
        Value::Integer(i) => Some(*i as f64),
        _ => None,
    }
}

fn parse_weight(value: &Value) -> Option<ConfigureAction> {
    as_f64(value).map(ConfigureAction::Weight)
}

fn parse_spont_minis(value: &Value) -> Option<ConfigureAction> {
    as_f64(value).map(ConfigureAction::SpontMinis)
}

fn parse_synapse_configure(value: &Value) -> Option<ConfigureAction> {
    value.as_str().map(|s| ConfigureAction::SynapseConfigure(s.to_string()))
}

fn parse_mod_override(value: &Value) -> Option<ConfigureAction> {
    value.as_str().map(|s| ConfigureAction::ModOverride(s.to_string()))
}

impl ConfigureAction {
    /// Build the action for a named property
    pub fn from_property(name: &str, value: &Value) -> Result<Self> {
        let (_, parser) = PROPERTY_SETTERS
            .iter()
            .find(|(property, _)| *property == name)
            .ok_or_else(|| ConnectionError::configuration(format!("Unknown connection property {}", name)))?;
        parser(value).ok_or_else(|| {
            ConnectionError::configuration(format!("Invalid value for {}: {}", name, value))
        })
    }

    /// Property name of the action
    pub fn property_name(&self) -> &'static str {
        match self {
            Self::Weight(_) => "weight",
            Self::SpontMinis(_) => "spont_minis",
            Self::SynapseConfigure(_) => "synapse_configure",
            Self::ModOverride(_) => "mod_override",
        }
    }

    /// Apply to a connection record
    pub fn apply(&self, record: &mut ConnectionRecord) {
        match self {
            Self::Weight(w) => record.weight_factor = *w,
            Self::SpontMinis(rate) => record.minis_spont_rate = Some(*rate),
            Self::SynapseConfigure(cfg) => record.add_synapse_configuration(cfg.clone()),
            Self::ModOverride(name) => record.mod_override = Some(name.clone()),
        }
    }
}

/// Updates pushed to connections that are already instantiated
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LiveUpdate {
    /// New netcon weight
    pub weight: Option<f64>,
    /// Synapse configuration snippet
    pub synapse_configure: Option<String>,
    /// Named synapse parameter assignments, e.g. conductance
    pub synapse_params: Vec<(String, f64)>,
}

impl LiveUpdate {
    /// Whether nothing would change
    pub fn is_empty(&self) -> bool {
        self.weight.is_none() && self.synapse_configure.is_none() && self.synapse_params.is_empty()
    }
}

/// One pathway rule
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConnectionRule {
    /// Rule name, for logging
    pub name: String,
    /// Source target name
    pub source: String,
    /// Destination target name
    pub destination: String,
    /// Restrict creation to this synapse type
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub synapse_type: Option<i32>,
    /// Apply to instantiated connections at this time instead of at build
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub delay: Option<f64>,
    /// Whether this rule creates connections
    #[serde(default)]
    pub create: bool,
    /// Property assignments
    #[serde(flatten)]
    pub properties: BTreeMap<String, Value>,
}

impl ConnectionRule {
    /// Rule between two targets with no properties
    pub fn new(name: impl Into<String>, source: impl Into<String>, destination: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            source: source.into(),
            destination: destination.into(),
            synapse_type: None,
            delay: None,
            create: false,
            properties: BTreeMap::new(),
        }
    }

    /// Add a property assignment
    pub fn with_property(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.properties.insert(name.into(), value.into());
        self
    }

    /// Whether the rule applies to instantiated connections
    pub fn is_delayed(&self) -> bool {
        self.delay.is_some()
    }

    /// Parsed property actions
    pub fn configure_actions(&self) -> Result<Vec<ConfigureAction>> {
        self.properties
            .iter()
            .map(|(name, value)| ConfigureAction::from_property(name, value))
            .collect()
    }

    /// The live update a delayed rule performs
    pub fn live_update(&self) -> Result<LiveUpdate> {
        let mut update = LiveUpdate::default();
        for action in self.configure_actions()? {
            match action {
                ConfigureAction::Weight(w) => update.weight = Some(w),
                ConfigureAction::SynapseConfigure(cfg) => update.synapse_configure = Some(cfg),
                other => log::warn!(
                    "Rule {}: {} cannot be applied to instantiated connections",
                    self.name,
                    other.property_name()
                ),
            }
        }
        Ok(update)
    }
}

/// An ordered list of pathway rules
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ConnectionRules {
    /// Rules in application order
    #[serde(default, rename = "connection")]
    pub rules: Vec<ConnectionRule>,
}

impl ConnectionRules {
    /// Parse rules from TOML text, validating every property
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let rules: Self = toml::from_str(content)?;
        for rule in &rules.rules {
            rule.configure_actions()?;
        }
        Ok(rules)
    }

    /// Load rules from a TOML file
    pub fn load_from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml_str(&content)
    }

    /// Rules that create connections
    pub fn creation_rules(&self) -> impl Iterator<Item = &ConnectionRule> {
        self.rules.iter().filter(|rule| rule.create)
    }

    /// Rules applied while building
    pub fn immediate_rules(&self) -> impl Iterator<Item = &ConnectionRule> {
        self.rules.iter().filter(|rule| !rule.is_delayed())
    }

    /// Rules applied to instantiated connections later on
    pub fn delayed_rules(&self) -> impl Iterator<Item = &ConnectionRule> {
        self.rules.iter().filter(|rule| rule.is_delayed())
    }
}
