//! Property validation, encoding and decoding against a scripted meter.

use rstest::*;

use yokogawa_wt::{
    ModelKind, PowerMeter, PowerMeterError, ValidationError, Value, codec,
    property::{Domain, PropertyDescriptor, WriteMode},
};
use yokolink::LoopbackInterface;

const NO_ERROR: &str = "0,\"No error\"";

fn crt_meter(host2inst: Vec<String>, inst2host: Vec<String>, kind: ModelKind) -> PowerMeter<LoopbackInterface> {
    PowerMeter::new(LoopbackInterface::new(host2inst, inst2host, "\n"), kind)
}

/// User input to try for a property, with the response a meter would give after storing it.
fn samples(prop: &PropertyDescriptor) -> Vec<(String, String)> {
    match prop.domain {
        Domain::Tokens(choices) => choices
            .iter()
            .map(|c| (c.name.to_string(), c.wire.to_string()))
            .collect(),
        Domain::Numbers(numbers) => numbers
            .iter()
            .map(|n| {
                let value: f64 = n.parse().unwrap();
                (n.to_string(), format!("{value:E}"))
            })
            .collect(),
        Domain::Switch => vec![
            ("on".to_string(), "1".to_string()),
            ("off".to_string(), "0".to_string()),
        ],
        Domain::Seconds { max } => [0, 3661, max]
            .iter()
            .map(|s| (s.to_string(), format!("{},{},{}", s / 3600, (s % 3600) / 60, s % 60)))
            .collect(),
        Domain::Text => vec![],
    }
}

#[rstest]
#[case(ModelKind::Wt310)]
#[case(ModelKind::Wt33x)]
#[case(ModelKind::Wt210)]
fn set_then_get_returns_the_value(#[case] kind: ModelKind) {
    let direct = kind
        .descriptor()
        .writable_properties()
        .into_iter()
        .filter(|p| p.write == WriteMode::Direct);
    for prop in direct {
        for (input, response) in samples(prop) {
            let value = prop.domain.validate(&input).unwrap();
            let set_cmd = codec::encode(prop, Some(&value));
            let get_cmd = codec::encode(prop, None);
            let mut meter = crt_meter(
                vec![set_cmd, codec::ERROR_QUERY.to_string(), get_cmd],
                vec![NO_ERROR.to_string(), response],
                kind,
            );

            let set = meter.set_property(prop.name, &input).unwrap();
            let got = meter.get_property(prop.name).unwrap();
            assert!(set.matches(&got), "{}: set {set}, got {got}", prop.name);
        }
    }
}

#[rstest]
#[case("interval", "3")]
#[case("interval", "0.3")]
#[case("current-range", "0.3")]
#[case("math", "auto")]
#[case("measurement-mode", "ac")]
#[case("hold", "yes")]
#[case("integration-timer", "36000001")]
#[case("integration-timer", "1.5")]
fn invalid_value_lists_allowed_values(#[case] name: &str, #[case] raw: &str) {
    let mut meter = crt_meter(vec![], vec![], ModelKind::Wt310);
    let expected = meter.list_allowed_values(name).unwrap();
    match meter.set_property(name, raw) {
        Err(PowerMeterError::Validation(ValidationError::InvalidValue {
            property,
            value,
            allowed,
        })) => {
            assert_eq!(name, property);
            assert_eq!(raw, value);
            assert_eq!(expected, allowed);
        }
        other => panic!("unexpected result {other:?}"),
    }
}

#[rstest]
#[case("5")]
#[case("5.0")]
#[case("5e0")]
fn whole_number_input_is_normalized(#[case] raw: &str) {
    let mut meter = crt_meter(
        vec![":SAMP:RATE 5".to_string(), codec::ERROR_QUERY.to_string()],
        vec![NO_ERROR.to_string()],
        ModelKind::Wt310,
    );
    assert_eq!(Value::Number(5.0), meter.set_property("interval", raw).unwrap());
}

#[rstest]
fn integration_timer_is_sent_as_hms() {
    let mut meter = crt_meter(
        vec![":INTEG:TIM 1,1,1".to_string(), codec::ERROR_QUERY.to_string()],
        vec![NO_ERROR.to_string()],
        ModelKind::Wt310,
    );
    assert_eq!(Value::Seconds(3661), meter.set_property("integration-timer", "3661").unwrap());
}

#[rstest]
fn unsupported_and_read_only_are_rejected_before_io() {
    let mut meter = crt_meter(vec![], vec![], ModelKind::Wt210);
    assert!(matches!(
        meter.set_property("keys-locking", "on"),
        Err(PowerMeterError::Validation(ValidationError::UnsupportedProperty(_)))
    ));
    assert!(matches!(
        meter.set_property("wiring-system", "P1W2"),
        Err(PowerMeterError::Validation(ValidationError::NotWritable(_)))
    ));
    assert!(matches!(
        meter.get_property("no-such-thing"),
        Err(PowerMeterError::Validation(ValidationError::UnsupportedProperty(_)))
    ));
}

#[rstest]
fn instrument_error_after_set() {
    let mut meter = crt_meter(
        vec![":INTEG:MODE CONT".to_string(), codec::ERROR_QUERY.to_string()],
        vec!["813,\"Execution error\"".to_string()],
        ModelKind::Wt310,
    );
    match meter.set_property("integration-mode", "continuous") {
        Err(PowerMeterError::Instrument {
            command,
            code,
            message,
        }) => {
            assert_eq!(":INTEG:MODE CONT", command);
            assert_eq!(813, code);
            assert_eq!("the integration is not in the 'reset' state", message);
        }
        other => panic!("unexpected result {other:?}"),
    }
}

#[rstest]
fn composite_response_fields() {
    let mut meter = crt_meter(
        vec![
            ":CONF:AVER:TYPE?".to_string(),
            ":CONF:AVER:TYPE?".to_string(),
            ":CONF:AVER:TYPE?".to_string(),
        ],
        vec!["EXP,16".to_string(), "EXP,16".to_string(), "EXP,16".to_string()],
        ModelKind::Wt210,
    );
    assert_eq!(Value::Token("exponent"), meter.get_property("smoothing-type").unwrap());
    assert_eq!(Value::Number(16.0), meter.get_property("smoothing-factor").unwrap());
    assert_eq!(Value::Token("exponent,16"), meter.get_property("smoothing").unwrap());
}

#[rstest]
fn text_and_no_data_responses() {
    let mut meter = crt_meter(
        vec!["*IDN?".to_string(), ":SAMP:RATE?".to_string()],
        vec!["YOKOGAWA,WT310,C2PH13047V,F1.03".to_string(), "9.91E+37".to_string()],
        ModelKind::Wt310,
    );
    assert_eq!(
        Value::Text("YOKOGAWA,WT310,C2PH13047V,F1.03".to_string()),
        meter.get_property("id").unwrap()
    );
    match meter.get_property("interval").unwrap() {
        Value::Number(v) => assert!(v.is_nan()),
        other => panic!("unexpected value {other:?}"),
    }
}

#[rstest]
#[case(ModelKind::Wt310)]
#[case(ModelKind::Wt210)]
fn listings_follow_capabilities(#[case] kind: ModelKind) {
    let model = kind.descriptor();
    let readable: Vec<_> = model.readable_properties().iter().map(|p| p.name).collect();
    let writable: Vec<_> = model.writable_properties().iter().map(|p| p.name).collect();
    let all = model.list_properties();

    assert_eq!(
        all.iter().filter(|n| model.property(n).unwrap().readable).count(),
        readable.len()
    );
    let in_order: Vec<_> = all.iter().copied().filter(|n| readable.contains(n)).collect();
    assert_eq!(in_order, readable);
    assert!(readable.contains(&"id"));
    assert!(!writable.contains(&"id"));
    assert!(writable.contains(&"interval"));
}

#[rstest]
#[case("smoothing-factor", "32", "LIN,8", ":CONF:AVER:TYPE LINEAR,32", "LIN,32")]
#[case("smoothing-type", "exponent", "LIN,16", ":CONF:AVER:TYPE EXPONENT,16", "EXP,16")]
#[case("smoothing-type", "linear", "LINEAR,64", ":CONF:AVER:TYPE LINEAR,64", "LINEAR,64")]
fn wt210_smoothing_fields_keep_the_other_field(
    #[case] name: &str,
    #[case] input: &str,
    #[case] before: &str,
    #[case] sent: &str,
    #[case] after: &str,
) {
    let mut meter = crt_meter(
        vec![
            ":CONF:AVER:TYPE?".to_string(),
            sent.to_string(),
            codec::ERROR_QUERY.to_string(),
            ":CONF:AVER:TYPE?".to_string(),
        ],
        vec![before.to_string(), NO_ERROR.to_string(), after.to_string()],
        ModelKind::Wt210,
    );
    let set = meter.set_property(name, input).unwrap();
    let got = meter.get_property(name).unwrap();
    assert!(set.matches(&got), "set {set}, got {got}");
}

#[rstest]
#[case("cfi", &[":MATH:TYPE CFAC", ":MATH:CFAC A,1"], "CFACTOR;A,1")]
#[case("divb", &[":MATH:TYPE ARIT", ":MATH:ARIT DIVB"], "ARITHMETIC;DIVB")]
#[case("div", &[":MATH:TYPE ARIT", ":MATH:ARIT DIV"], "ARITHMETIC;DIV")]
#[case("avw", &[":MATH:TYPE AVER", ":MATH:AVER W,1"], "AVERAGE;W,1")]
fn wt210_math_is_set_in_steps(#[case] input: &'static str, #[case] steps: &[&str], #[case] response: &str) {
    let mut host2inst = Vec::new();
    let mut inst2host = Vec::new();
    for step in steps {
        host2inst.extend([step.to_string(), codec::ERROR_QUERY.to_string()]);
        inst2host.push(NO_ERROR.to_string());
    }
    host2inst.push(":MATH?".to_string());
    inst2host.push(response.to_string());
    let mut meter = crt_meter(host2inst, inst2host, ModelKind::Wt210);

    assert_eq!(Value::Token(input), meter.set_property("math", input).unwrap());
    assert_eq!(Value::Token(input), meter.get_property("math").unwrap());
}

#[rstest]
fn wt210_math_step_failure_stops_the_write() {
    let mut meter = crt_meter(
        vec![":MATH:TYPE ARIT".to_string(), codec::ERROR_QUERY.to_string()],
        vec!["100,\"Command error\"".to_string()],
        ModelKind::Wt210,
    );
    assert!(matches!(
        meter.set_property("math", "add"),
        Err(PowerMeterError::Instrument { code: 100, .. })
    ));
}

#[rstest]
#[case(ModelKind::Wt310, "current-range", ":INP:CURR:AUTO ON")]
#[case(ModelKind::Wt210, "voltage-range", ":CONF:VOLT:AUTO ON")]
fn auto_range_turns_the_auto_range_on(#[case] kind: ModelKind, #[case] name: &str, #[case] sent: &str) {
    let mut meter = crt_meter(
        vec![sent.to_string(), codec::ERROR_QUERY.to_string()],
        vec![NO_ERROR.to_string()],
        kind,
    );
    assert_eq!(Value::Token("auto"), meter.set_property(name, "Auto").unwrap());
    assert_eq!("auto", meter.list_allowed_values(name).unwrap()[0]);
}

#[rstest]
fn range_turns_the_auto_range_off() {
    let mut meter = crt_meter(
        vec![
            ":INP:VOLT:AUTO OFF".to_string(),
            codec::ERROR_QUERY.to_string(),
            ":INP:VOLT:RANG 150".to_string(),
            codec::ERROR_QUERY.to_string(),
            ":INP:VOLT:RANG?".to_string(),
        ],
        vec![NO_ERROR.to_string(), NO_ERROR.to_string(), "150.0E+00".to_string()],
        ModelKind::Wt310,
    );
    assert_eq!(Value::Number(150.0), meter.set_property("voltage-range", "150").unwrap());
    assert_eq!(Value::Number(150.0), meter.get_property("voltage-range").unwrap());
}

#[rstest]
#[case("voltage-range", "7.5", "3")]
#[case("current-range", "20", "6")]
#[case("current-range", "0.0025", "3")]
fn outer_ranges_need_their_crest_factor(#[case] name: &str, #[case] range: &str, #[case] crest_factor: &str) {
    let mut meter = crt_meter(
        vec![":INP:CFAC?".to_string()],
        vec![crest_factor.to_string()],
        ModelKind::Wt310,
    );
    match meter.set_property(name, range) {
        Err(PowerMeterError::InvalidState(message)) => {
            assert!(message.contains(&format!("crest factor is {crest_factor}")), "{message}");
        }
        other => panic!("unexpected result {other:?}"),
    }
}

#[rstest]
#[case("voltage-range", "7.5", "6", ":INP:VOLT")]
#[case("voltage-range", "600", "3", ":INP:VOLT")]
#[case("current-range", "20", "3", ":INP:CURR")]
fn outer_ranges_with_matching_crest_factor(
    #[case] name: &str,
    #[case] range: &str,
    #[case] crest_factor: &str,
    #[case] prefix: &str,
) {
    let mut meter = crt_meter(
        vec![
            ":INP:CFAC?".to_string(),
            format!("{prefix}:AUTO OFF"),
            codec::ERROR_QUERY.to_string(),
            format!("{prefix}:RANG {range}"),
            codec::ERROR_QUERY.to_string(),
        ],
        vec![crest_factor.to_string(), NO_ERROR.to_string(), NO_ERROR.to_string()],
        ModelKind::Wt310,
    );
    let expected: f64 = range.parse().unwrap();
    assert_eq!(Value::Number(expected), meter.set_property(name, range).unwrap());
}
