//! Yokogawa WT310, WT310HC and the WT330 series (first input element only).

use crate::{
    IntegrationState,
    data_item::{DataItemDescriptor as Item, ENERGY, Quantity as Q, TIMESTAMP},
    models::{IntegrationCommands, ModelDescriptor, ModelKind, ReadPlan, StateCheck},
    property::{Choice, Domain, PropertyDescriptor as Prop},
};

// Domains shared with the WT210.
pub(crate) const INTERVALS: Domain = Domain::Numbers(&["0.1", "0.25", "0.5", "1", "2", "5"]);
pub(crate) const CURRENT_RANGES: Domain = Domain::Numbers(&[
    "0.0025", "0.005", "0.01", "0.02", "0.05", "0.1", "0.2", "0.5", "1", "2", "5", "10", "20",
]);
pub(crate) const VOLTAGE_RANGES: Domain =
    Domain::Numbers(&["7.5", "15", "30", "60", "75", "150", "300", "600"]);
pub(crate) const CREST_FACTORS: Domain = Domain::Numbers(&["3", "6"]);
pub(crate) const MEASUREMENT_MODES: Domain = Domain::Tokens(&[
    Choice::new("rms", "RMS"),
    Choice::new("vmean", "VMEAN"),
    Choice::new("dc", "DC"),
]);
pub(crate) const SYNC_SOURCES: Domain = Domain::Tokens(&[
    Choice::new("voltage", "VOLT"),
    Choice::new("current", "CURR"),
    Choice::new("off", "OFF"),
]);
pub(crate) const SMOOTHING_TYPES: Domain = Domain::Tokens(&[
    Choice::new("linear", "LINEAR"),
    Choice::new("exponent", "EXPONENT"),
]);
pub(crate) const SMOOTHING_FACTORS: Domain = Domain::Numbers(&["8", "16", "32", "64"]);
pub(crate) const INTEGRATION_MODES: Domain = Domain::Tokens(&[
    Choice::new("normal", "NORM"),
    Choice::new("continuous", "CONT"),
]);
pub(crate) const INTEGRATION_TIMER: Domain = Domain::Seconds { max: 36_000_000 };

const MATH_FUNCTIONS: Domain = Domain::Tokens(&[
    Choice::new("cfv", "CFU1"),
    Choice::new("cfi", "CFI1"),
    Choice::new("add", "ADD"),
    Choice::new("sub", "SUB"),
    Choice::new("mul", "MUL"),
    Choice::new("div", "DIV"),
    Choice::new("diva", "DIVA"),
    Choice::new("divb", "DIVB"),
    Choice::new("avw", "AVW1"),
]);

const PROPERTIES: &[Prop] = &[
    Prop::read_only("id", "device ID", "*IDN", Domain::Text),
    Prop::read_only("installed-opts", "installed options", "*OPT", Domain::Text),
    Prop::read_only("wiring-system", "wiring system", ":INP:WIR", Domain::Text),
    Prop::read_write("interval", "data update interval (seconds)", ":SAMP:RATE", INTERVALS),
    Prop::read_write("hold", "output data display hold", ":SAMP:HOLD", Domain::Switch),
    Prop::read_write("current-range", "current range (amperes)", ":INP:CURR:RANG", CURRENT_RANGES)
        .range("current-auto-range", "crest-factor"),
    Prop::read_write("voltage-range", "voltage range (volts)", ":INP:VOLT:RANG", VOLTAGE_RANGES)
        .range("voltage-auto-range", "crest-factor"),
    Prop::read_write("current-auto-range", "current auto range", ":INP:CURR:AUTO", Domain::Switch),
    Prop::read_write("voltage-auto-range", "voltage auto range", ":INP:VOLT:AUTO", Domain::Switch),
    Prop::read_write("crest-factor", "crest factor", ":INP:CFAC", CREST_FACTORS),
    Prop::read_write("measurement-mode", "measurement mode", ":INP:MODE", MEASUREMENT_MODES),
    Prop::read_write("sync-source", "measurement synchronization source", ":INP:SYNC", SYNC_SOURCES),
    Prop::read_write("line-filter", "line filter", ":INP:FILT:LINE", Domain::Switch),
    Prop::read_write("freq-filter", "frequency filter", ":INP:FILT:FREQ", Domain::Switch),
    Prop::read_write("max-hold", "maximum value hold", ":MEAS:MHOL", Domain::Switch),
    Prop::read_write("smoothing-status", "smoothing", ":MEAS:AVER:STAT", Domain::Switch),
    Prop::read_write("smoothing-type", "smoothing type", ":MEAS:AVER:TYPE", SMOOTHING_TYPES),
    Prop::read_write("smoothing-factor", "smoothing factor", ":MEAS:AVER:COUN", SMOOTHING_FACTORS),
    Prop::read_write("math", "math function", ":MATH", MATH_FUNCTIONS),
    Prop::read_write("keys-locking", "front panel keys lock", ":SYST:KLOC", Domain::Switch),
    Prop::read_write("remote-mode", "remote mode", ":COMM:REM", Domain::Switch),
    Prop::read_write("local-mode", "local mode lock-out", ":COMM:LOCK", Domain::Switch),
    Prop::read_write("integration-mode", "integration mode", ":INTEG:MODE", INTEGRATION_MODES),
    Prop::read_write("integration-timer", "integration timer (seconds)", ":INTEG:TIM", INTEGRATION_TIMER),
];

const DATA_ITEMS: &[Item] = &[
    Item::measured("V", "voltage", Q::Voltage, 4, "U"),
    Item::measured("I", "current", Q::Current, 6, "I"),
    Item::measured("P", "active power", Q::ActivePower, 4, "P"),
    Item::measured("S", "apparent power", Q::ApparentPower, 4, "S"),
    Item::measured("Q", "reactive power", Q::ReactivePower, 4, "Q"),
    Item::measured("Lambda", "power factor", Q::PowerFactor, 4, "LAMBDA"),
    Item::measured("Phi", "phase difference", Q::PhaseAngle, 2, "PHI"),
    Item::measured("Fv", "voltage frequency", Q::Frequency, 4, "FU"),
    Item::measured("Fi", "current frequency", Q::Frequency, 4, "FI"),
    Item::measured("Wh", "watt-hours", Q::WattHours, 6, "WH"),
    Item::measured("Whp", "positive watt-hours", Q::WattHours, 6, "WHP"),
    Item::measured("Whm", "negative watt-hours", Q::WattHours, 6, "WHM"),
    Item::measured("Ah", "ampere-hours", Q::AmpereHours, 6, "AH"),
    Item::measured("Ahp", "positive ampere-hours", Q::AmpereHours, 6, "AHP"),
    Item::measured("Ahm", "negative ampere-hours", Q::AmpereHours, 6, "AHM"),
    Item::measured("Vmax", "maximum voltage", Q::Voltage, 4, "UPPEAK"),
    Item::measured("Imax", "maximum current", Q::Current, 6, "IPPEAK"),
    Item::measured("Time", "integration time", Q::Seconds, 0, "TIME").global(),
    Item::measured("Math", "value computed by the math function", Q::Math, 4, "MATH").global(),
    Item::measured("Vmin", "minimum voltage", Q::Voltage, 4, "UMPEAK"),
    Item::measured("Imin", "minimum current", Q::Current, 6, "IMPEAK"),
    Item::measured("Pmax", "maximum power", Q::ActivePower, 4, "PPPEAK"),
    Item::measured("Pmin", "minimum power", Q::ActivePower, 4, "PMPEAK"),
    Item::measured("Vrange", "voltage range", Q::Voltage, 4, "URANGE"),
    Item::measured("Irange", "current range", Q::Current, 4, "IRANGE"),
    TIMESTAMP,
    ENERGY,
];

const READ_PLAN: ReadPlan = ReadPlan::Indexed {
    count: ":NUM:NORM:NUM",
    item: ":NUM:NORM:ITEM",
    value: ":NUM:NORM:VAL?",
    element: ",1",
};

const INTEGRATION: IntegrationCommands = IntegrationCommands {
    start: ":INTEG:STAR",
    stop: ":INTEG:STOP",
    reset: ":INTEG:RES",
    state: StateCheck::Query {
        query: ":INTEG:STAT?",
        states: &[
            ("START", IntegrationState::Running),
            ("STOP", IntegrationState::Stopped),
            ("RESET", IntegrationState::Idle),
            ("TIMEUP", IntegrationState::Finished),
            ("ERROR", IntegrationState::Finished),
        ],
    },
};

const INIT_COMMANDS: &[&str] = &[":NUM:FORM ASCII", ":SYST:COMM:COMM WT300", ":COMM:VERB ON"];

pub(crate) const DEFAULTS: &[(&str, &str)] = &[
    ("current-auto-range", "on"),
    ("voltage-auto-range", "on"),
    ("smoothing-status", "off"),
    ("integration-mode", "normal"),
    ("integration-timer", "0"),
];

const WT310_FAMILY: ModelDescriptor = ModelDescriptor {
    kind: ModelKind::Wt310,
    name: "Yokogawa WT310",
    aliases: &["wt310", "wt310hc"],
    properties: PROPERTIES,
    data_items: DATA_ITEMS,
    max_items: 10,
    read_plan: READ_PLAN,
    integration: INTEGRATION,
    init_commands: INIT_COMMANDS,
    defaults: DEFAULTS,
};

/// Yokogawa WT310 and WT310HC.
pub static WT310: ModelDescriptor = WT310_FAMILY;

/// Yokogawa WT330 series. Only the first input element is used.
pub static WT33X: ModelDescriptor = ModelDescriptor {
    kind: ModelKind::Wt33x,
    name: "Yokogawa WT33x",
    aliases: &["wt330", "wt332", "wt333"],
    ..WT310_FAMILY
};
