//! Encoding of property commands and decoding of meter responses.
//!
//! Nothing in here knows about a specific model, all spelling comes from the descriptors.

use crate::{
    error::ProtocolError,
    property::{Choice, Domain, PropertyDescriptor, ResponseShape, Value, WriteMode},
};

/// Numbers at or above this value are reported by the meters when no data is available.
pub const NO_DATA_THRESHOLD: f64 = 9.9e37;

/// Error queue query.
pub const ERROR_QUERY: &str = ":STAT:ERR?";

/// Build the command for a query (`value` is `None`) or a mutation of a property.
pub fn encode(descriptor: &PropertyDescriptor, value: Option<&Value>) -> String {
    match value {
        None => format!("{}?", descriptor.command),
        Some(value) => format!("{} {}", descriptor.command, wire_value(&descriptor.domain, value)),
    }
}

/// Build the commands writing a [`WriteMode::Steps`] token, one per step.
pub fn encode_steps(descriptor: &PropertyDescriptor, value: &Value) -> Vec<String> {
    wire_value(&descriptor.domain, value)
        .split(';')
        .map(|step| format!("{}:{}", descriptor.command, step.trim()))
        .collect()
}

/// Build the command writing `value` into field `index` of the composite setting of `whole`,
/// keeping the other fields of its `current` value. `None` if the setting has no such field.
pub fn encode_field(
    whole: &PropertyDescriptor,
    current: &Value,
    index: usize,
    part: &PropertyDescriptor,
    value: &Value,
) -> Option<String> {
    let mut fields: Vec<String> = wire_value(&whole.domain, current)
        .split(',')
        .map(str::to_string)
        .collect();
    *fields.get_mut(index)? = wire_value(&part.domain, value);
    Some(format!("{} {}", whole.command, fields.join(",")))
}

fn wire_value(domain: &Domain, value: &Value) -> String {
    match (domain, value) {
        (Domain::Tokens(choices), Value::Token(name)) => choices
            .iter()
            .find(|c| c.name == *name)
            .map(|c| c.wire.to_string())
            .unwrap_or_else(|| name.to_string()),
        (_, Value::Switch(true)) => "ON".to_string(),
        (_, Value::Switch(false)) => "OFF".to_string(),
        (_, Value::Seconds(secs)) => {
            format!("{},{},{}", secs / 3600, (secs % 3600) / 60, secs % 60)
        }
        (_, other) => other.to_string(),
    }
}

/// Decode the response to a property query.
pub fn decode(descriptor: &PropertyDescriptor, raw: &str) -> Result<Value, ProtocolError> {
    let malformed = || malformed(descriptor.command, raw);
    let part = match descriptor.response {
        ResponseShape::Plain => raw.trim(),
        ResponseShape::Field(index) => raw.split(',').nth(index).ok_or_else(malformed)?.trim(),
    };

    match descriptor.domain {
        Domain::Numbers(_) => decode_number(descriptor.command, part).map(Value::Number),
        Domain::Switch => decode_switch(part).ok_or_else(malformed),
        Domain::Tokens(choices) if descriptor.write == WriteMode::Steps => match_steps(choices, part)
            .map(|c| Value::Token(c.name))
            .ok_or_else(malformed),
        Domain::Tokens(choices) => match_token(choices, part)
            .map(|c| Value::Token(c.name))
            .ok_or_else(malformed),
        Domain::Seconds { .. } => decode_hms(part).map(Value::Seconds).ok_or_else(malformed),
        Domain::Text => Ok(Value::Text(part.trim_matches('"').to_string())),
    }
}

/// Decode one number. Values of [`NO_DATA_THRESHOLD`] and above become NaN.
pub fn decode_number(command: &str, raw: &str) -> Result<f64, ProtocolError> {
    let raw = raw.trim();
    if raw.eq_ignore_ascii_case("nan") {
        return Ok(f64::NAN);
    }
    let value: f64 = raw.parse().map_err(|_| malformed(command, raw))?;
    if !value.is_finite() {
        return Err(malformed(command, raw));
    }
    if value >= NO_DATA_THRESHOLD {
        Ok(f64::NAN)
    } else {
        Ok(value)
    }
}

/// Decode a comma separated list of exactly `expected` numbers.
pub fn decode_numbers(command: &str, raw: &str, expected: usize) -> Result<Vec<f64>, ProtocolError> {
    let values = raw
        .split(',')
        .map(|part| decode_number(command, part))
        .collect::<Result<Vec<_>, _>>()
        .map_err(|_| malformed(command, raw))?;
    if values.len() != expected {
        return Err(malformed(command, raw));
    }
    Ok(values)
}

fn decode_switch(raw: &str) -> Option<Value> {
    if let Ok(number) = raw.parse::<i64>() {
        return Some(Value::Switch(number != 0));
    }
    if raw.eq_ignore_ascii_case("on") {
        Some(Value::Switch(true))
    } else if raw.eq_ignore_ascii_case("off") {
        Some(Value::Switch(false))
    } else {
        None
    }
}

/// Find the choice a response token stands for.
///
/// The meters answer either with the short or with the long form of a token depending on their
/// verbosity setting, so an exact match wins, otherwise every comma separated field of the
/// response has to be an abbreviation of the wire token or the other way around.
pub fn match_token<'a>(choices: &'a [Choice], raw: &str) -> Option<&'a Choice> {
    let raw = raw.trim();
    choices
        .iter()
        .find(|c| c.wire.eq_ignore_ascii_case(raw))
        .or_else(|| choices.iter().find(|c| abbreviates(c.wire, raw)))
}

/// Find the [`WriteMode::Steps`] choice a response stands for.
///
/// The response holds the step arguments separated by `;`. Each has to match its step exactly or
/// by abbreviation, and the choice with the most exact matches wins.
pub fn match_steps<'a>(choices: &'a [Choice], raw: &str) -> Option<&'a Choice> {
    let parts: Vec<&str> = raw.split(';').map(str::trim).collect();
    let mut best: Option<(usize, &Choice)> = None;
    for choice in choices {
        let args: Vec<&str> = choice
            .wire
            .split(';')
            .map(|step| step.trim().split_once(' ').map_or("", |(_, arg)| arg.trim()))
            .collect();
        if args.len() != parts.len() {
            continue;
        }
        let mut exact = 0;
        let matched = args.iter().zip(&parts).all(|(arg, part)| {
            if arg.eq_ignore_ascii_case(part) {
                exact += 1;
                true
            } else {
                abbreviates(arg, part)
            }
        });
        if matched && best.is_none_or(|(most, _)| exact > most) {
            best = Some((exact, choice));
        }
    }
    best.map(|(_, choice)| choice)
}

pub(crate) fn abbreviates(wire: &str, raw: &str) -> bool {
    let wire_fields: Vec<&str> = wire.split(',').collect();
    let raw_fields: Vec<&str> = raw.split(',').map(str::trim).collect();
    wire_fields.len() == raw_fields.len()
        && wire_fields.iter().zip(&raw_fields).all(|(w, r)| {
            let (w, r) = (w.to_ascii_uppercase(), r.to_ascii_uppercase());
            !r.is_empty() && (w.starts_with(&r) || r.starts_with(&w))
        })
}

fn decode_hms(raw: &str) -> Option<u64> {
    let fields = raw
        .split(',')
        .map(|f| f.trim().parse::<u64>().ok())
        .collect::<Option<Vec<_>>>()?;
    match fields.as_slice() {
        [h, m, s] => Some(h * 3600 + m * 60 + s),
        _ => None,
    }
}

/// Decode an error queue response such as `0,"No error"` into code and message.
pub fn decode_error(raw: &str) -> Result<(i32, String), ProtocolError> {
    let (code, message) = raw
        .split_once(',')
        .ok_or_else(|| malformed(ERROR_QUERY, raw))?;
    let code = code
        .trim()
        .parse::<i32>()
        .map_err(|_| malformed(ERROR_QUERY, raw))?;
    Ok((code, describe_error(code, message.trim().trim_matches('"'))))
}

/// Message for an instrument error code. Integration conflicts get a readable explanation.
pub fn describe_error(code: i32, message: &str) -> String {
    match code {
        813 => "the integration is not in the 'reset' state".to_string(),
        842 => "the integration is already in the 'start' state".to_string(),
        844 => "the integration is not in the 'start' state".to_string(),
        845 => "the integration timer is 0 while integration is in continuous mode".to_string(),
        _ => message.to_string(),
    }
}

fn malformed(command: &str, raw: &str) -> ProtocolError {
    ProtocolError::MalformedResponse {
        command: command.to_string(),
        response: raw.to_string(),
    }
}
