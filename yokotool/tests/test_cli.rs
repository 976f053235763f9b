//! Command line and server request parsing.

use std::{path::PathBuf, time::Duration};

use clap::Parser;
use rstest::*;

use yokotool::{
    cli::{Cli, Command, DEFAULT_PORT, split_devspec},
    protocol::{IntegrationAction, Message, ReadArgs, Request, error_reply, parse_line},
};

fn args(line: &str) -> Vec<String> {
    line.split_whitespace().map(String::from).collect()
}

#[rstest]
#[case("yokotool info", None, "yokotool info")]
#[case("yokotool /dev/usbtmc0 info", Some("/dev/usbtmc0"), "yokotool info")]
#[case("yokotool lab get interval", Some("lab"), "yokotool get interval")]
#[case("yokotool --pmtype wt310 lab info", Some("lab"), "yokotool --pmtype wt310 info")]
#[case("yokotool -d --baudrate 9600 /dev/ttyUSB0 read P", Some("/dev/ttyUSB0"), "yokotool -d --baudrate 9600 read P")]
#[case("yokotool read P,V", None, "yokotool read P,V")]
fn devspec_is_taken_out(#[case] line: &str, #[case] devspec: Option<&str>, #[case] rest: &str) {
    assert_eq!((devspec.map(String::from), args(rest)), split_devspec(args(line)));
}

#[rstest]
fn global_options_after_the_command() {
    let cli = Cli::try_parse_from(args("yokotool get interval --pmtype wt210 -d")).unwrap();
    assert!(cli.debug);
    assert_eq!(Some("wt210".to_string()), cli.pmtype);
    assert!(matches!(
        cli.command,
        Command::Meter(Request::Get { list: false, property: Some(_) })
    ));
}

#[rstest]
fn read_options() {
    let cli = Cli::try_parse_from(args(
        "yokotool read T,P,V --count 10 --time 4m30s --no-header -o out.csv -c sleep 5",
    ))
    .unwrap();
    let read = match cli.command {
        Command::Meter(Request::Read(read)) => read,
        other => panic!("not a read: {other:?}"),
    };
    assert_eq!(
        ReadArgs {
            items: args("T P V"),
            count: Some(10),
            time: Some(Duration::from_secs(270)),
            no_header: true,
            output: Some(PathBuf::from("out.csv")),
            command: args("sleep 5"),
            ..Default::default()
        },
        read
    );
}

#[rstest]
fn serve_defaults() {
    let cli = Cli::try_parse_from(args("yokotool serve")).unwrap();
    match cli.command {
        Command::Serve { port, bind } => {
            assert_eq!(DEFAULT_PORT, port);
            assert_eq!("127.0.0.1", bind);
        }
        other => panic!("unexpected command {other:?}"),
    }
}

#[rstest]
#[case("yokotool read --time 5x")]
#[case("yokotool frobnicate")]
#[case("yokotool integration")]
fn invalid_command_lines(#[case] line: &str) {
    assert!(Cli::try_parse_from(args(line)).is_err());
}

#[rstest]
#[case("", Message::Empty)]
#[case("   ", Message::Empty)]
#[case("quit", Message::Quit)]
#[case("info", Message::Request(Request::Info))]
#[case("factory-reset --configure", Message::Request(Request::FactoryReset { configure: true }))]
#[case(
    "integration wait --timeout 1m",
    Message::Request(Request::Integration {
        action: IntegrationAction::Wait { timeout: Some(Duration::from_secs(60)) },
    })
)]
fn server_lines(#[case] line: &str, #[case] expected: Message) {
    assert_eq!(Ok(expected), parse_line(line));
}

#[rstest]
#[case("read P -c true")]
#[case("read P -o /tmp/out.csv")]
#[case("serve")]
#[case("bogus")]
fn server_rejects(#[case] line: &str) {
    let message = parse_line(line).unwrap_err();
    assert!(!message.is_empty());
    assert!(!message.contains('\n'));
}

#[rstest]
fn error_reply_is_one_line() {
    assert_eq!("ERROR first second", error_reply("first\nsecond"));
}
