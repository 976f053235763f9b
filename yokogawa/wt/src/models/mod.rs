//! Compiled-in model descriptors.
//!
//! Every supported meter is described by one static [`ModelDescriptor`]. Code outside this module
//! never branches on the model, it reads the tables instead.

use std::fmt::Display;

use crate::{
    IntegrationState, data_item::DataItemDescriptor, error::PowerMeterError,
    property::PropertyDescriptor,
};

mod wt210;
mod wt310;

pub use wt210::WT210;
pub use wt310::{WT33X, WT310};

/// Supported model families.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ModelKind {
    /// Yokogawa WT210.
    Wt210,
    /// Yokogawa WT310 and WT310HC.
    Wt310,
    /// Yokogawa WT330 series (WT332, WT333), element 1 only.
    Wt33x,
}

impl ModelKind {
    /// Descriptor of this model.
    pub fn descriptor(&self) -> &'static ModelDescriptor {
        match self {
            ModelKind::Wt210 => &WT210,
            ModelKind::Wt310 => &WT310,
            ModelKind::Wt33x => &WT33X,
        }
    }

    /// Find the model from a name such as `wt310` or `WT333`.
    pub fn from_name(name: &str) -> Option<Self> {
        let name = name.trim().to_ascii_lowercase();
        [ModelKind::Wt210, ModelKind::Wt310, ModelKind::Wt33x]
            .into_iter()
            .find(|kind| kind.descriptor().aliases.contains(&name.as_str()))
    }

    /// Find the model from an `*IDN?` response.
    ///
    /// Returns `Ok(None)` if the response does not name a WT model at all, which is the case for
    /// the WT210: it reports a numeric model code instead of its name.
    pub fn from_identity(identity: &str) -> Result<Option<Self>, PowerMeterError> {
        let Some(model) = identity.split(',').nth(1).map(|m| m.trim().to_ascii_lowercase()) else {
            return Ok(None);
        };
        if let Some(kind) = Self::from_name(&model) {
            return Ok(Some(kind));
        }
        let by_prefix = [ModelKind::Wt210, ModelKind::Wt310, ModelKind::Wt33x]
            .into_iter()
            .find(|kind| kind.descriptor().aliases.iter().any(|a| model.starts_with(a)));
        if by_prefix.is_some() {
            return Ok(by_prefix);
        }
        if model.starts_with("wt") {
            return Err(PowerMeterError::UnknownModel(model));
        }
        Ok(None)
    }

    /// Whether commands of the two models are interchangeable.
    pub fn compatible_with(&self, other: ModelKind) -> bool {
        self.descriptor().read_plan == other.descriptor().read_plan
    }
}

impl Display for ModelKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.descriptor().name)
    }
}

/// Resolve a model name into its descriptor.
pub fn resolve(name: &str) -> Result<&'static ModelDescriptor, PowerMeterError> {
    ModelKind::from_name(name)
        .map(|kind| kind.descriptor())
        .ok_or_else(|| PowerMeterError::UnknownModel(name.to_string()))
}

/// How data items are selected and read.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadPlan {
    /// Items occupy numbered output slots, each slot is queried on its own.
    Indexed {
        /// Sets the number of slots, e.g. `:NUM:NORM:NUM`.
        count: &'static str,
        /// Slot assignment prefix, the slot number follows directly, e.g. `:NUM:NORM:ITEM`.
        item: &'static str,
        /// Slot query, the slot number is the argument, e.g. `:NUM:NORM:VAL?`.
        value: &'static str,
        /// Element argument appended to per-element items.
        element: &'static str,
    },
    /// Items are switched on or off, all selected items are read with one query in table order.
    Selected {
        /// Switch prefix, the wire name follows directly, e.g. `:MEAS:ITEM:`.
        item: &'static str,
        /// Query returning all selected values, e.g. `:MEAS:VAL?`.
        value: &'static str,
    },
}

/// How the integration state is observed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StateCheck {
    /// A status query whose answer is mapped onto [`IntegrationState`].
    Query {
        /// The status query.
        query: &'static str,
        /// Response token to state.
        states: &'static [(&'static str, IntegrationState)],
    },
    /// No status query exists. The named property is written with its current value: the meter
    /// refuses that while integrating, and accepts it otherwise.
    RewriteProperty(&'static str),
}

/// Integration commands of a model.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IntegrationCommands {
    /// Start command.
    pub start: &'static str,
    /// Stop command.
    pub stop: &'static str,
    /// Reset command.
    pub reset: &'static str,
    /// How the state is observed.
    pub state: StateCheck,
}

/// Everything the engine knows about one model.
#[derive(Debug)]
pub struct ModelDescriptor {
    /// Model family.
    pub kind: ModelKind,
    /// Display name.
    pub name: &'static str,
    /// Names accepted by [`resolve`], lower case.
    pub aliases: &'static [&'static str],
    /// Properties in listing order.
    pub properties: &'static [PropertyDescriptor],
    /// Data items in listing order.
    pub data_items: &'static [DataItemDescriptor],
    /// Maximum number of measured items per read.
    pub max_items: usize,
    /// Item selection and read commands.
    pub read_plan: ReadPlan,
    /// Integration commands.
    pub integration: IntegrationCommands,
    /// Commands sent after the common session setup.
    pub init_commands: &'static [&'static str],
    /// Properties applied by a configuring factory reset.
    pub defaults: &'static [(&'static str, &'static str)],
}

impl ModelDescriptor {
    /// Look up a property.
    pub fn property(&self, name: &str) -> Option<&'static PropertyDescriptor> {
        self.properties.iter().find(|p| p.name == name)
    }

    /// Look up a data item by its code.
    pub fn data_item(&self, code: &str) -> Option<&'static DataItemDescriptor> {
        self.data_items.iter().find(|d| d.code == code)
    }

    /// All property names.
    pub fn list_properties(&self) -> Vec<&'static str> {
        self.properties.iter().map(|p| p.name).collect()
    }

    /// Readable properties, in listing order.
    pub fn readable_properties(&self) -> Vec<&'static PropertyDescriptor> {
        self.properties.iter().filter(|p| p.readable).collect()
    }

    /// Writable properties, in listing order.
    pub fn writable_properties(&self) -> Vec<&'static PropertyDescriptor> {
        self.properties.iter().filter(|p| p.writable).collect()
    }

    /// All data item codes.
    pub fn list_data_items(&self) -> Vec<&'static str> {
        self.data_items.iter().map(|d| d.code).collect()
    }

    /// Allowed values of a property, as shown to the user and used for validation.
    pub fn list_allowed_values(&self, name: &str) -> Result<Vec<String>, PowerMeterError> {
        self.property(name)
            .map(|p| p.allowed_values())
            .ok_or_else(|| {
                crate::error::ValidationError::UnsupportedProperty(name.to_string()).into()
            })
    }
}
