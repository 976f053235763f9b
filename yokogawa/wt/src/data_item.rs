//! Data items the meters can report, and their conversion to unitful readings.

use std::{fmt::Display, time::Duration};

use measurements::{Angle, Current, Energy, Frequency, Power, Voltage};

/// Physical quantity of a data item.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Quantity {
    /// Volts.
    Voltage,
    /// Amperes.
    Current,
    /// Watts.
    ActivePower,
    /// Volt-amperes.
    ApparentPower,
    /// Volt-amperes reactive.
    ReactivePower,
    /// Dimensionless power factor.
    PowerFactor,
    /// Degrees.
    PhaseAngle,
    /// Hertz.
    Frequency,
    /// Watt-hours.
    WattHours,
    /// Ampere-hours.
    AmpereHours,
    /// Joules.
    Joules,
    /// Seconds.
    Seconds,
    /// Seconds since the Unix epoch.
    Timestamp,
    /// Result of the meter's math function, unit depends on the function.
    Math,
}

impl Quantity {
    /// Unit label.
    pub fn unit(&self) -> &'static str {
        match self {
            Quantity::Voltage => "V",
            Quantity::Current => "A",
            Quantity::ActivePower => "W",
            Quantity::ApparentPower => "VA",
            Quantity::ReactivePower => "var",
            Quantity::PowerFactor => "",
            Quantity::PhaseAngle => "deg",
            Quantity::Frequency => "Hz",
            Quantity::WattHours => "Wh",
            Quantity::AmpereHours => "Ah",
            Quantity::Joules => "J",
            Quantity::Seconds | Quantity::Timestamp => "s",
            Quantity::Math => "",
        }
    }
}

/// Where the value of a data item comes from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ItemSource {
    /// Queried from the meter. `per_element` items take the input element as argument.
    Instrument {
        /// Item name on the wire.
        wire: &'static str,
        /// Needs the element number when selected.
        per_element: bool,
    },
    /// Local wall clock time at sample time.
    Timestamp,
    /// Energy per interval, active power times the update interval.
    Energy,
}

/// Description of one data item.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DataItemDescriptor {
    /// Code used on the command line, e.g. `V` or `Lambda`.
    pub code: &'static str,
    /// Description for listings.
    pub description: &'static str,
    /// Physical quantity.
    pub quantity: Quantity,
    /// Decimal places kept in CSV output.
    pub precision: u32,
    /// Source of the value.
    pub source: ItemSource,
}

impl DataItemDescriptor {
    /// An item queried from the meter.
    pub const fn measured(
        code: &'static str,
        description: &'static str,
        quantity: Quantity,
        precision: u32,
        wire: &'static str,
    ) -> Self {
        Self {
            code,
            description,
            quantity,
            precision,
            source: ItemSource::Instrument {
                wire,
                per_element: true,
            },
        }
    }

    /// An item queried from the meter that is not tied to an input element.
    pub const fn global(mut self) -> Self {
        if let ItemSource::Instrument { wire, .. } = self.source {
            self.source = ItemSource::Instrument {
                wire,
                per_element: false,
            };
        }
        self
    }

    /// Wire name, for items queried from the meter.
    pub fn wire(&self) -> Option<&'static str> {
        match self.source {
            ItemSource::Instrument { wire, .. } => Some(wire),
            _ => None,
        }
    }

    /// Whether the meter has to be asked for this item.
    pub fn is_measured(&self) -> bool {
        matches!(self.source, ItemSource::Instrument { .. })
    }

    /// Unit label.
    pub fn unit(&self) -> &'static str {
        self.quantity.unit()
    }

    /// Convert a raw value of this item into a unitful reading.
    pub fn reading(&self, value: f64) -> Reading {
        match self.quantity {
            Quantity::Voltage => Reading::Voltage(Voltage::from_volts(value)),
            Quantity::Current => Reading::Current(Current::from_amperes(value)),
            Quantity::ActivePower | Quantity::ApparentPower | Quantity::ReactivePower => {
                Reading::Power(Power::from_watts(value))
            }
            Quantity::PhaseAngle => Reading::Angle(Angle::from_degrees(value)),
            Quantity::Frequency => Reading::Frequency(Frequency::from_hertz(value)),
            Quantity::WattHours => Reading::Energy(Energy::from_joules(value * 3600.0)),
            Quantity::Joules => Reading::Energy(Energy::from_joules(value)),
            Quantity::PowerFactor
            | Quantity::AmpereHours
            | Quantity::Seconds
            | Quantity::Timestamp
            | Quantity::Math => Reading::Scalar(value, self.unit()),
        }
    }
}

/// The local timestamp item `T`.
pub const TIMESTAMP: DataItemDescriptor = DataItemDescriptor {
    code: "T",
    description: "time stamp (seconds since the Unix epoch)",
    quantity: Quantity::Timestamp,
    precision: 3,
    source: ItemSource::Timestamp,
};

/// The local energy item `J`, computed from `P`.
pub const ENERGY: DataItemDescriptor = DataItemDescriptor {
    code: "J",
    description: "energy consumed during the last interval",
    quantity: Quantity::Joules,
    precision: 4,
    source: ItemSource::Energy,
};

/// Energy in joules at an active power of `watts` held for `interval`.
pub fn energy_joules(watts: f64, interval: Duration) -> f64 {
    (Power::from_watts(watts) * interval).as_joules()
}

/// A reading with its unit.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Reading {
    /// Voltage reading.
    Voltage(Voltage),
    /// Current reading.
    Current(Current),
    /// Active, apparent or reactive power.
    Power(Power),
    /// Phase angle.
    Angle(Angle),
    /// Frequency.
    Frequency(Frequency),
    /// Energy.
    Energy(Energy),
    /// Anything without a dedicated type, with its unit label.
    Scalar(f64, &'static str),
}

impl Display for Reading {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Reading::Voltage(v) => write!(f, "{v}"),
            Reading::Current(v) => write!(f, "{v}"),
            Reading::Power(v) => write!(f, "{v}"),
            Reading::Angle(v) => write!(f, "{v}"),
            Reading::Frequency(v) => write!(f, "{v}"),
            Reading::Energy(v) => write!(f, "{v}"),
            Reading::Scalar(v, "") => write!(f, "{v}"),
            Reading::Scalar(v, unit) => write!(f, "{v} {unit}"),
        }
    }
}
