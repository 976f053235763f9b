//! Test cases for the LoopbackInterface.

use std::time::Duration;

use rstest::*;

use yokolink::{InstrumentError, InstrumentInterface, LoopbackInterface, NO_RESPONSE};

fn crt_lbk(from_host: Vec<&str>, from_inst: Vec<&str>) -> LoopbackInterface {
    LoopbackInterface::new(from_host, from_inst, "\n")
}

/// Create a loopback interface that contains no commands.
#[fixture]
fn emp_lbk() -> LoopbackInterface {
    crt_lbk(vec![], vec![])
}

#[rstest]
fn finalize_test(mut emp_lbk: LoopbackInterface) {
    emp_lbk.finalize();
}

#[rstest]
#[case(vec!["cmd"], vec![])]
#[case(vec![], vec!["resp"])]
#[case(vec!["cmd"], vec!["resp"])]
#[should_panic]
fn finalize_test_panic(#[case] from_host: Vec<&str>, #[case] from_inst: Vec<&str>) {
    let mut lbk = crt_lbk(from_host, from_inst);
    lbk.finalize();
}

#[rstest]
fn sendcmd() {
    let mut lbk = crt_lbk(vec!["*CLS", ":COMM:HEAD OFF"], vec![]);
    lbk.sendcmd("*CLS").unwrap();
    assert_eq!(1, lbk.remaining_commands());
    lbk.sendcmd(":COMM:HEAD OFF").unwrap();
    assert_eq!(0, lbk.remaining_commands());
}

#[rstest]
#[should_panic]
fn sendcmd_mismatch() {
    let mut lbk = crt_lbk(vec![":SAMP:RATE?"], vec![]);
    let _ = lbk.sendcmd(":SAMP:HOLD?");
}

#[rstest]
fn query() {
    let mut lbk = crt_lbk(vec![":SAMP:RATE?", ":INTEG:STAT?"], vec!["0.25", "STOP"]);
    assert_eq!("0.25", lbk.query(":SAMP:RATE?").unwrap());
    assert_eq!("STOP", lbk.query(":INTEG:STAT?").unwrap());
}

#[rstest]
fn query_crlf() {
    let mut lbk = LoopbackInterface::new(vec!["*IDN?"], vec!["YOKOGAWA,WT310"], "\r\n");
    lbk.set_terminator("\r\n");
    assert_eq!("YOKOGAWA,WT310", lbk.query("*IDN?").unwrap());
}

#[rstest]
fn query_no_response_times_out() {
    let mut lbk = crt_lbk(vec![":SAMP:RATE?"], vec![NO_RESPONSE])
        .with_timeout(Duration::from_millis(100));
    match lbk.query(":SAMP:RATE?") {
        Err(InstrumentError::TimeoutQuery { query, timeout }) => {
            assert_eq!(":SAMP:RATE?", query);
            assert_eq!(Duration::from_millis(100), timeout);
        }
        other => panic!("Expected query timeout, got {other:?}"),
    }
}

#[rstest]
fn terminator(mut emp_lbk: LoopbackInterface) {
    assert_eq!("\n", emp_lbk.get_terminator());
    emp_lbk.set_terminator("\r\n");
    assert_eq!("\r\n", emp_lbk.get_terminator());
}
