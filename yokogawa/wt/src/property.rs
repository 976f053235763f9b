//! Property descriptors and their value domains.
//!
//! The [`Domain`] of a property is used for validating user input, for listing the allowed
//! values, and for decoding responses, so all three always agree.

use std::fmt::Display;

use crate::error::ValidationError;

/// Tolerance factor for comparing numeric input against allowed values.
pub const NUMERIC_TOLERANCE: f64 = 1e-9;

/// One allowed token of an enumerated property.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Choice {
    /// Name shown to and typed by the user.
    pub name: &'static str,
    /// Spelling on the wire.
    pub wire: &'static str,
}

impl Choice {
    /// Create a new choice.
    pub const fn new(name: &'static str, wire: &'static str) -> Self {
        Self { name, wire }
    }
}

/// Value domain of a property.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Domain {
    /// Enumerated tokens.
    Tokens(&'static [Choice]),
    /// Numbers, given by their canonical spelling.
    Numbers(&'static [&'static str]),
    /// `on` or `off`.
    Switch,
    /// Whole seconds from 0 to `max`, sent as `h,m,s`.
    Seconds {
        /// Largest allowed value.
        max: u64,
    },
    /// Free text, only for read-only properties.
    Text,
}

impl Domain {
    /// The allowed values in the order they are shown to the user.
    pub fn allowed_values(&self) -> Vec<String> {
        match self {
            Domain::Tokens(choices) => choices.iter().map(|c| c.name.to_string()).collect(),
            Domain::Numbers(numbers) => numbers.iter().map(|n| n.to_string()).collect(),
            Domain::Switch => vec!["on".to_string(), "off".to_string()],
            Domain::Seconds { max } => vec![format!("0-{max}")],
            Domain::Text => vec![],
        }
    }

    /// Check raw user input and turn it into a [`Value`]. `None` if the input is not allowed.
    pub fn validate(&self, raw: &str) -> Option<Value> {
        let raw = raw.trim();
        match self {
            Domain::Tokens(choices) => choices
                .iter()
                .find(|c| c.name.eq_ignore_ascii_case(raw))
                .map(|c| Value::Token(c.name)),
            Domain::Numbers(numbers) => {
                let value = parse_finite(raw)?;
                numbers
                    .iter()
                    .filter_map(|n| n.parse::<f64>().ok())
                    .find(|allowed| numbers_equal(value, *allowed))
                    .map(Value::Number)
            }
            Domain::Switch => {
                if raw.eq_ignore_ascii_case("on") {
                    Some(Value::Switch(true))
                } else if raw.eq_ignore_ascii_case("off") {
                    Some(Value::Switch(false))
                } else {
                    None
                }
            }
            Domain::Seconds { max } => raw
                .parse::<u64>()
                .ok()
                .filter(|secs| secs <= max)
                .map(Value::Seconds),
            Domain::Text => None,
        }
    }
}

fn parse_finite(raw: &str) -> Option<f64> {
    raw.parse::<f64>().ok().filter(|v| v.is_finite())
}

/// Equality used for numeric domains: `|a - b| <= 1e-9 * max(1, |b|)`.
pub fn numbers_equal(a: f64, b: f64) -> bool {
    (a - b).abs() <= NUMERIC_TOLERANCE * b.abs().max(1.0)
}

/// Which part of a response holds the property value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseShape {
    /// The whole response.
    Plain,
    /// The n-th comma separated field, counted from 0.
    Field(usize),
}

/// How a property value gets written.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteMode {
    /// `<command> <value>`.
    Direct,
    /// The value is one field of the composite setting of property `whole`, which the meter only
    /// accepts as a whole. The setting is read, the field replaced, and the setting written back.
    Field {
        /// The property holding the whole setting.
        whole: &'static str,
    },
    /// Every token stands for a `;` separated list of `<header> <argument>` steps, each sent below
    /// the property command. The query answers the step arguments in the same order.
    Steps,
    /// A measurement range. [`AUTO`] switches the auto range property `auto` on, any number
    /// switches it off and selects the range. The smallest range is only available with crest
    /// factor 6 and the largest only with crest factor 3, as read from property `crest_factor`.
    Range {
        /// The auto range switch.
        auto: &'static str,
        /// The crest factor property.
        crest_factor: &'static str,
    },
}

/// Token of [`WriteMode::Range`] properties that selects the auto range.
pub const AUTO: &str = "auto";

/// Description of one settable or readable meter property.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PropertyDescriptor {
    /// Name, e.g. `interval`.
    pub name: &'static str,
    /// Short description for listings.
    pub description: &'static str,
    /// Command header, e.g. `:SAMP:RATE`.
    pub command: &'static str,
    /// Value domain.
    pub domain: Domain,
    /// Location of the value in the response.
    pub response: ResponseShape,
    /// How values are written.
    pub write: WriteMode,
    /// Can be read.
    pub readable: bool,
    /// Can be written.
    pub writable: bool,
}

impl PropertyDescriptor {
    /// A readable and writable property.
    pub const fn read_write(
        name: &'static str,
        description: &'static str,
        command: &'static str,
        domain: Domain,
    ) -> Self {
        Self {
            name,
            description,
            command,
            domain,
            response: ResponseShape::Plain,
            write: WriteMode::Direct,
            readable: true,
            writable: true,
        }
    }

    /// A read-only property.
    pub const fn read_only(
        name: &'static str,
        description: &'static str,
        command: &'static str,
        domain: Domain,
    ) -> Self {
        Self {
            response: ResponseShape::Plain,
            readable: true,
            writable: false,
            ..Self::read_write(name, description, command, domain)
        }
    }

    /// Read the value from the given field of a composite response.
    pub const fn field(mut self, index: usize) -> Self {
        self.response = ResponseShape::Field(index);
        self
    }

    /// Write through the composite setting of property `whole`.
    pub const fn part_of(mut self, whole: &'static str) -> Self {
        self.write = WriteMode::Field { whole };
        self
    }

    /// Write every token as a sequence of sub-commands.
    pub const fn steps(mut self) -> Self {
        self.write = WriteMode::Steps;
        self
    }

    /// A measurement range with an auto range switch and crest factor limits.
    pub const fn range(mut self, auto: &'static str, crest_factor: &'static str) -> Self {
        self.write = WriteMode::Range { auto, crest_factor };
        self
    }

    /// The values accepted by [`validate`](Self::validate), in the order they are shown.
    pub fn allowed_values(&self) -> Vec<String> {
        let mut values = self.domain.allowed_values();
        if matches!(self.write, WriteMode::Range { .. }) {
            values.insert(0, AUTO.to_string());
        }
        values
    }

    /// Validate `raw` against the domain.
    pub fn validate(&self, raw: &str) -> Result<Value, ValidationError> {
        if !self.writable {
            return Err(ValidationError::NotWritable(self.name.to_string()));
        }
        if matches!(self.write, WriteMode::Range { .. }) && raw.trim().eq_ignore_ascii_case(AUTO) {
            return Ok(Value::Token(AUTO));
        }
        self.domain
            .validate(raw)
            .ok_or_else(|| ValidationError::InvalidValue {
                property: self.name.to_string(),
                value: raw.to_string(),
                allowed: self.allowed_values(),
            })
    }
}

/// A typed property value.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    /// Number.
    Number(f64),
    /// On or off.
    Switch(bool),
    /// Enumerated token, holds the user facing name.
    Token(&'static str),
    /// Whole seconds.
    Seconds(u64),
    /// Free text.
    Text(String),
}

impl Value {
    /// Equality under the property domain rules, numbers compare with tolerance.
    pub fn matches(&self, other: &Value) -> bool {
        match (self, other) {
            (Value::Number(a), Value::Number(b)) => numbers_equal(*a, *b),
            _ => self == other,
        }
    }

    /// The number, if this is a numeric value.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Number(v) => Some(*v),
            Value::Seconds(s) => Some(*s as f64),
            _ => None,
        }
    }
}

impl Display for Value {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Value::Number(v) => write!(f, "{v}"),
            Value::Switch(true) => write!(f, "on"),
            Value::Switch(false) => write!(f, "off"),
            Value::Token(name) => write!(f, "{name}"),
            Value::Seconds(s) => write!(f, "{s}"),
            Value::Text(t) => write!(f, "{t}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const RATES: Domain = Domain::Numbers(&["0.1", "0.25", "0.5", "1", "2", "5"]);

    #[test]
    fn whole_number_input_for_rational_domain() {
        for raw in ["5", "5.0", "5.00", "+5", "5e0", " 5 "] {
            assert_eq!(Some(Value::Number(5.0)), RATES.validate(raw), "{raw}");
        }
        assert_eq!(Some(Value::Number(0.25)), RATES.validate(".25"));
    }

    #[test]
    fn near_misses_are_rejected() {
        for raw in ["5.001", "3", "inf", "NaN", "five", ""] {
            assert_eq!(None, RATES.validate(raw), "{raw}");
        }
    }

    #[test]
    fn tolerance_scales_with_magnitude() {
        assert!(numbers_equal(600.0000001, 600.0));
        assert!(!numbers_equal(600.001, 600.0));
        assert!(numbers_equal(0.0025 + 1e-12, 0.0025));
    }

    #[test]
    fn ranges_accept_auto() {
        const RANGES: Domain = Domain::Numbers(&["7.5", "15", "300"]);
        let prop = PropertyDescriptor::read_write("voltage-range", "voltage range", ":VOLT:RANG", RANGES)
            .range("voltage-auto-range", "crest-factor");
        assert_eq!(vec!["auto", "7.5", "15", "300"], prop.allowed_values());
        assert_eq!(Ok(Value::Token(AUTO)), prop.validate("AUTO"));
        assert_eq!(Ok(Value::Number(15.0)), prop.validate("15"));

        let plain = PropertyDescriptor::read_write("voltage-range", "voltage range", ":VOLT:RANG", RANGES);
        assert!(plain.validate("auto").is_err());
    }

    #[test]
    fn seconds_domain_bounds() {
        let domain = Domain::Seconds { max: 36_000_000 };
        assert_eq!(Some(Value::Seconds(0)), domain.validate("0"));
        assert_eq!(Some(Value::Seconds(36_000_000)), domain.validate("36000000"));
        assert_eq!(None, domain.validate("36000001"));
        assert_eq!(None, domain.validate("-1"));
        assert_eq!(vec!["0-36000000".to_string()], domain.allowed_values());
    }
}
