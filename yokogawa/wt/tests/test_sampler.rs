//! The read loop against scripted meters.

use std::time::{Duration, Instant};

use measurements::test_utils::almost_eq;
use rstest::*;

use yokogawa_wt::{
    CancelToken, ModelKind, PowerMeter, PowerMeterError, ReadBounds, Reading, Sampler, StopReason,
    ValidationError,
};
use yokolink::LoopbackInterface;

const NO_ERROR: &str = "0,\"No error\"";

fn crt_meter(host2inst: Vec<String>, inst2host: Vec<String>, kind: ModelKind) -> PowerMeter<LoopbackInterface> {
    PowerMeter::new(LoopbackInterface::new(host2inst, inst2host, "\n"), kind)
}

/// Script for reading `P` and `V` from a WT310 for `rows` rows.
fn wt310_pv_script(interval: &str, rows: usize) -> (Vec<String>, Vec<String>) {
    let mut host2inst = vec![":SAMP:RATE?".to_string()];
    let mut inst2host = vec![interval.to_string()];
    if rows > 0 {
        host2inst.extend(
            [":NUM:NORM:NUM 2", ":NUM:NORM:ITEM1 P,1", ":NUM:NORM:ITEM2 U,1", ":STAT:ERR?"]
                .map(String::from),
        );
        inst2host.push(NO_ERROR.to_string());
    }
    for _ in 0..rows {
        host2inst.push(":NUM:NORM:VAL? 1".to_string());
        host2inst.push(":NUM:NORM:VAL? 2".to_string());
        inst2host.push("15.40E+00".to_string());
        inst2host.push("231.96E+00".to_string());
    }
    (host2inst, inst2host)
}

fn collect(sampler: &mut Sampler<LoopbackInterface>) -> Vec<Vec<(&'static str, f64)>> {
    sampler.by_ref().map(|row| row.unwrap().values().to_vec()).collect()
}

#[rstest]
fn zero_count_does_no_io() {
    let meter = crt_meter(vec![], vec![], ModelKind::Wt310);
    let bounds = ReadBounds {
        count: Some(0),
        ..Default::default()
    };
    let mut sampler = meter.sampler(&["T", "P", "V"], bounds, true, CancelToken::new()).unwrap();
    assert!(sampler.next().is_none());
    assert_eq!(Some(StopReason::CountReached), sampler.stop_reason());
}

#[rstest]
#[case(1)]
#[case(2)]
#[case(5)]
fn count_yields_exactly_n_rows(#[case] rows: usize) {
    let (host2inst, inst2host) = wt310_pv_script("1.0E-01", rows);
    let meter = crt_meter(host2inst, inst2host, ModelKind::Wt310);
    let bounds = ReadBounds {
        count: Some(rows),
        ..Default::default()
    };
    let mut sampler = meter.sampler(&["P", "V"], bounds, false, CancelToken::new()).unwrap();

    let got = collect(&mut sampler);
    assert_eq!(vec![vec![("P", 15.4), ("V", 231.96)]; rows], got);
    assert_eq!(Some(StopReason::CountReached), sampler.stop_reason());
    assert!(sampler.next().is_none());
    assert_eq!(Duration::from_millis(100), sampler.interval());
}

#[rstest]
fn rows_follow_the_interval() {
    let (host2inst, inst2host) = wt310_pv_script("1.0E-01", 3);
    let meter = crt_meter(host2inst, inst2host, ModelKind::Wt310);
    let bounds = ReadBounds {
        count: Some(3),
        ..Default::default()
    };
    let sampler = meter.sampler(&["P", "V"], bounds, false, CancelToken::new()).unwrap();
    let start = Instant::now();
    assert_eq!(3, sampler.count());
    assert!(start.elapsed() >= Duration::from_millis(200));
}

#[rstest]
fn duration_bounds_the_read() {
    let (host2inst, inst2host) = wt310_pv_script("2.5E-01", 3);
    let meter = crt_meter(host2inst, inst2host, ModelKind::Wt310);
    let bounds = ReadBounds {
        duration: Some(Duration::from_millis(650)),
        ..Default::default()
    };
    let mut sampler = meter.sampler(&["P", "V"], bounds, false, CancelToken::new()).unwrap();
    let start = Instant::now();
    assert_eq!(3, collect(&mut sampler).len());
    assert_eq!(Some(StopReason::DurationElapsed), sampler.stop_reason());
    assert!(start.elapsed() < Duration::from_millis(650) + Duration::from_millis(250));
}

#[rstest]
fn integration_gate_stops_when_finished() {
    let host2inst: Vec<String> = [
        ":SAMP:RATE?",
        ":INTEG:STAT?",
        ":NUM:NORM:NUM 1",
        ":NUM:NORM:ITEM1 WH,1",
        ":STAT:ERR?",
        ":NUM:NORM:VAL? 1",
        ":INTEG:STAT?",
        ":NUM:NORM:VAL? 1",
        ":INTEG:STAT?",
    ]
    .map(String::from)
    .to_vec();
    let inst2host: Vec<String> = ["1.0E-01", "START", NO_ERROR, "1.0E-03", "START", "2.0E-03", "TIMEUP"]
        .map(String::from)
        .to_vec();

    let meter = crt_meter(host2inst, inst2host, ModelKind::Wt310);
    let mut sampler = meter
        .sampler(&["Wh"], ReadBounds::default(), true, CancelToken::new())
        .unwrap();
    assert_eq!(vec![vec![("Wh", 0.001)], vec![("Wh", 0.002)]], collect(&mut sampler));
    assert_eq!(Some(StopReason::IntegrationFinished), sampler.stop_reason());
}

#[rstest]
fn gate_is_dropped_when_integration_is_not_running() {
    let host2inst: Vec<String> = [
        ":SAMP:RATE?",
        ":INTEG:STAT?",
        ":NUM:NORM:NUM 1",
        ":NUM:NORM:ITEM1 TIME",
        ":STAT:ERR?",
        ":NUM:NORM:VAL? 1",
    ]
    .map(String::from)
    .to_vec();
    let inst2host: Vec<String> = ["1.0E-01", "RESET", NO_ERROR, "0.0E+00"]
        .map(String::from)
        .to_vec();
    let meter = crt_meter(host2inst, inst2host, ModelKind::Wt310);
    let bounds = ReadBounds {
        count: Some(1),
        ..Default::default()
    };
    let mut sampler = meter.sampler(&["Time"], bounds, true, CancelToken::new()).unwrap();
    assert_eq!(vec![vec![("Time", 0.0)]], collect(&mut sampler));
    assert!(!sampler.integration_gate());
}

#[rstest]
fn energy_is_power_times_interval() {
    let host2inst: Vec<String> = [
        ":SAMP:RATE?",
        ":NUM:NORM:NUM 1",
        ":NUM:NORM:ITEM1 P,1",
        ":STAT:ERR?",
        ":NUM:NORM:VAL? 1",
    ]
    .map(String::from)
    .to_vec();
    let inst2host: Vec<String> = ["5.0E-01", NO_ERROR, "1.0E+01"].map(String::from).to_vec();
    let meter = crt_meter(host2inst, inst2host, ModelKind::Wt310);
    let bounds = ReadBounds {
        count: Some(1),
        ..Default::default()
    };
    let mut sampler = meter.sampler(&["J", "P"], bounds, false, CancelToken::new()).unwrap();
    assert_eq!(vec![vec![("J", 5.0), ("P", 10.0)]], collect(&mut sampler));
}

#[rstest]
fn rows_convert_to_unitful_readings() {
    let (host2inst, inst2host) = wt310_pv_script("5.0E-01", 1);
    let meter = crt_meter(host2inst, inst2host, ModelKind::Wt310);
    let bounds = ReadBounds {
        count: Some(1),
        ..Default::default()
    };
    let mut sampler = meter.sampler(&["P", "V", "J"], bounds, false, CancelToken::new()).unwrap();
    let row = sampler.next().unwrap().unwrap();

    let readings = row.readings(ModelKind::Wt310.descriptor());
    let codes: Vec<_> = readings.iter().map(|(code, _)| *code).collect();
    assert_eq!(vec!["P", "V", "J"], codes);
    match readings[0].1 {
        Reading::Power(p) => assert!(almost_eq(p.as_watts(), 15.4)),
        other => panic!("unexpected reading {other:?}"),
    }
    match readings[1].1 {
        Reading::Voltage(v) => assert!(almost_eq(v.as_volts(), 231.96)),
        other => panic!("unexpected reading {other:?}"),
    }
    match readings[2].1 {
        Reading::Energy(e) => assert!(almost_eq(e.as_joules(), 7.7)),
        other => panic!("unexpected reading {other:?}"),
    }
}

#[rstest]
fn wt210_reads_all_items_at_once() {
    let model = ModelKind::Wt210.descriptor();
    let mut host2inst = vec![":SAMP:RATE?".to_string()];
    for item in model.data_items.iter().filter_map(|d| d.wire()) {
        let state = if item == "V" || item == "W" { "ON" } else { "OFF" };
        host2inst.push(format!(":MEAS:ITEM:{item} {state}"));
    }
    host2inst.push(":STAT:ERR?".to_string());
    host2inst.push(":MEAS:VAL?".to_string());
    let inst2host: Vec<String> = ["1.0E-01", NO_ERROR, "231.96E+00,15.40E+00"]
        .map(String::from)
        .to_vec();

    let meter = crt_meter(host2inst, inst2host, ModelKind::Wt210);
    let bounds = ReadBounds {
        count: Some(1),
        ..Default::default()
    };
    let mut sampler = meter.sampler(&["P", "V"], bounds, false, CancelToken::new()).unwrap();
    assert_eq!(vec![vec![("P", 15.4), ("V", 231.96)]], collect(&mut sampler));
}

#[rstest]
fn no_data_is_nan() {
    let host2inst: Vec<String> = [
        ":SAMP:RATE?",
        ":NUM:NORM:NUM 1",
        ":NUM:NORM:ITEM1 FU,1",
        ":STAT:ERR?",
        ":NUM:NORM:VAL? 1",
    ]
    .map(String::from)
    .to_vec();
    let inst2host: Vec<String> = ["1.0E-01", NO_ERROR, "9.91E+37"].map(String::from).to_vec();
    let meter = crt_meter(host2inst, inst2host, ModelKind::Wt310);
    let bounds = ReadBounds {
        count: Some(1),
        ..Default::default()
    };
    let mut sampler = meter.sampler(&["Fv"], bounds, false, CancelToken::new()).unwrap();
    let row = sampler.next().unwrap().unwrap();
    assert!(row.get("Fv").unwrap().is_nan());
}

#[rstest]
fn malformed_value_ends_the_read() {
    let host2inst: Vec<String> = [
        ":SAMP:RATE?",
        ":NUM:NORM:NUM 1",
        ":NUM:NORM:ITEM1 P,1",
        ":STAT:ERR?",
        ":NUM:NORM:VAL? 1",
    ]
    .map(String::from)
    .to_vec();
    let inst2host: Vec<String> = ["1.0E-01", NO_ERROR, "garbage"].map(String::from).to_vec();
    let meter = crt_meter(host2inst, inst2host, ModelKind::Wt310);
    let mut sampler = meter
        .sampler(&["P"], ReadBounds::default(), false, CancelToken::new())
        .unwrap();
    assert!(matches!(sampler.next(), Some(Err(PowerMeterError::Protocol(_)))));
    assert!(sampler.next().is_none());
    assert_eq!(Some(StopReason::Failed), sampler.stop_reason());
}

#[rstest]
fn cancelled_read_stops_before_io() {
    let meter = crt_meter(vec![], vec![], ModelKind::Wt310);
    let cancel = CancelToken::new();
    cancel.cancel();
    let mut sampler = meter.sampler(&["P"], ReadBounds::default(), false, cancel).unwrap();
    assert!(sampler.next().is_none());
    assert_eq!(Some(StopReason::Cancelled), sampler.stop_reason());
}

#[rstest]
fn cancel_during_the_wait_ends_the_read() {
    let (host2inst, inst2host) = wt310_pv_script("2.0E+00", 1);
    let meter = crt_meter(host2inst, inst2host, ModelKind::Wt310);
    let cancel = CancelToken::new();
    let mut sampler = meter.sampler(&["P", "V"], ReadBounds::default(), false, cancel.clone()).unwrap();

    let first = sampler.next().unwrap().unwrap();
    assert_eq!(&[("P", 15.4), ("V", 231.96)], first.values());

    let canceller = std::thread::spawn(move || {
        std::thread::sleep(Duration::from_millis(200));
        cancel.cancel();
    });
    let start = Instant::now();
    assert!(sampler.next().is_none());
    let waited = start.elapsed();
    canceller.join().unwrap();

    assert!(waited >= Duration::from_millis(150), "{waited:?}");
    assert!(waited < Duration::from_secs(1), "{waited:?}");
    assert_eq!(Some(StopReason::Cancelled), sampler.stop_reason());
    assert!(sampler.next().is_none());
}

#[rstest]
#[case(vec![], ValidationError::MissingValue)]
#[case(vec!["X"], ValidationError::UnsupportedItem("X".to_string()))]
#[case(
    vec!["V", "I", "P", "S", "Q", "Lambda", "Phi", "Fv", "Fi", "Wh", "Ah"],
    ValidationError::TooManyItems { requested: 11, max: 10 }
)]
fn items_are_validated(#[case] items: Vec<&str>, #[case] expected: ValidationError) {
    let meter = crt_meter(vec![], vec![], ModelKind::Wt310);
    match meter.sampler(&items, ReadBounds::default(), false, CancelToken::new()) {
        Err(PowerMeterError::Validation(err)) => assert_eq!(expected, err),
        Err(other) => panic!("unexpected error {other:?}"),
        Ok(_) => panic!("items were accepted"),
    }
}

#[rstest]
fn energy_and_power_share_one_slot() {
    let meter = crt_meter(vec![], vec![], ModelKind::Wt310);
    let items = ["T", "P", "J", "V", "I", "S", "Q", "Lambda", "Phi", "Fv", "Fi", "Wh"];
    assert!(meter.sampler(&items, ReadBounds::default(), false, CancelToken::new()).is_ok());
}

#[cfg(unix)]
#[rstest]
fn read_ends_when_the_program_exits() {
    let meter = crt_meter(vec![":SAMP:RATE?".to_string()], vec!["1.0E-01".to_string()], ModelKind::Wt310);
    let bounds = ReadBounds {
        command: Some(std::process::Command::new("true")),
        ..Default::default()
    };
    let mut sampler = meter.sampler(&["T"], bounds, false, CancelToken::new()).unwrap();
    let rows = collect(&mut sampler);
    assert!(rows.iter().all(|row| row.len() == 1 && row[0].0 == "T"));
    assert_eq!(Some(StopReason::ProcessExited), sampler.stop_reason());
    assert!(sampler.child_exit_status().unwrap().success());
}

#[rstest]
fn program_that_cannot_start() {
    let meter = crt_meter(vec![":SAMP:RATE?".to_string()], vec!["1.0E-01".to_string()], ModelKind::Wt310);
    let bounds = ReadBounds {
        command: Some(std::process::Command::new("/nonexistent/yokotool-test-program")),
        ..Default::default()
    };
    let mut sampler = meter.sampler(&["T"], bounds, false, CancelToken::new()).unwrap();
    match sampler.next() {
        Some(Err(PowerMeterError::ChildProcess { program, .. })) => {
            assert_eq!("/nonexistent/yokotool-test-program", program);
        }
        other => panic!("unexpected result {other:?}"),
    }
}
