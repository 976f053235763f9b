//! Yokogawa WT210.
//!
//! The WT210 reports the smoothing type and factor in one response and sets both with one
//! command, selects a math function in two steps, and has no integration state query.

use crate::{
    data_item::{DataItemDescriptor as Item, ENERGY, Quantity as Q, TIMESTAMP},
    models::{
        IntegrationCommands, ModelDescriptor, ModelKind, ReadPlan, StateCheck,
        wt310::{
            CREST_FACTORS, CURRENT_RANGES, DEFAULTS, INTEGRATION_MODES, INTEGRATION_TIMER,
            INTERVALS, MEASUREMENT_MODES, SMOOTHING_FACTORS, SMOOTHING_TYPES, SYNC_SOURCES,
            VOLTAGE_RANGES,
        },
    },
    property::{Choice, Domain, PropertyDescriptor as Prop},
};

const SMOOTHING: Domain = Domain::Tokens(&[
    Choice::new("linear,8", "LINEAR,8"),
    Choice::new("linear,16", "LINEAR,16"),
    Choice::new("linear,32", "LINEAR,32"),
    Choice::new("linear,64", "LINEAR,64"),
    Choice::new("exponent,8", "EXPONENT,8"),
    Choice::new("exponent,16", "EXPONENT,16"),
    Choice::new("exponent,32", "EXPONENT,32"),
    Choice::new("exponent,64", "EXPONENT,64"),
]);

/// The math type first, then the function of that type.
const MATH_FUNCTIONS: Domain = Domain::Tokens(&[
    Choice::new("cfv", "TYPE CFAC;CFAC V,1"),
    Choice::new("cfi", "TYPE CFAC;CFAC A,1"),
    Choice::new("add", "TYPE ARIT;ARIT ADD"),
    Choice::new("sub", "TYPE ARIT;ARIT SUB"),
    Choice::new("mul", "TYPE ARIT;ARIT MUL"),
    Choice::new("div", "TYPE ARIT;ARIT DIV"),
    Choice::new("diva", "TYPE ARIT;ARIT DIVA"),
    Choice::new("divb", "TYPE ARIT;ARIT DIVB"),
    Choice::new("avw", "TYPE AVER;AVER W,1"),
]);

const PROPERTIES: &[Prop] = &[
    Prop::read_only("id", "device ID", "*IDN", Domain::Text),
    Prop::read_only("installed-opts", "installed options", "*OPT", Domain::Text),
    Prop::read_only("wiring-system", "wiring system", ":CONF:WIR", Domain::Text),
    Prop::read_write("interval", "data update interval (seconds)", ":SAMP:RATE", INTERVALS),
    Prop::read_write("hold", "output data display hold", ":SAMP:HOLD", Domain::Switch),
    Prop::read_write("current-range", "current range (amperes)", ":CONF:CURR:RANG", CURRENT_RANGES)
        .range("current-auto-range", "crest-factor"),
    Prop::read_write("voltage-range", "voltage range (volts)", ":CONF:VOLT:RANG", VOLTAGE_RANGES)
        .range("voltage-auto-range", "crest-factor"),
    Prop::read_write("current-auto-range", "current auto range", ":CONF:CURR:AUTO", Domain::Switch),
    Prop::read_write("voltage-auto-range", "voltage auto range", ":CONF:VOLT:AUTO", Domain::Switch),
    Prop::read_write("crest-factor", "crest factor", ":CONF:CFAC", CREST_FACTORS),
    Prop::read_write("measurement-mode", "measurement mode", ":CONF:MODE", MEASUREMENT_MODES),
    Prop::read_write("sync-source", "measurement synchronization source", ":CONF:SYNC", SYNC_SOURCES),
    Prop::read_write("line-filter", "line filter", ":CONF:LFILT", Domain::Switch),
    Prop::read_write("freq-filter", "frequency filter", ":CONF:FILT", Domain::Switch),
    Prop::read_write("max-hold", "maximum value hold", ":CONF:MHOL", Domain::Switch),
    Prop::read_write("smoothing-status", "smoothing", ":CONF:AVER:STAT", Domain::Switch),
    Prop::read_write("smoothing-type", "smoothing type", ":CONF:AVER:TYPE", SMOOTHING_TYPES)
        .field(0)
        .part_of("smoothing"),
    Prop::read_write("smoothing-factor", "smoothing factor", ":CONF:AVER:TYPE", SMOOTHING_FACTORS)
        .field(1)
        .part_of("smoothing"),
    Prop::read_write("smoothing", "smoothing type and factor", ":CONF:AVER:TYPE", SMOOTHING),
    Prop::read_write("math", "math function", ":MATH", MATH_FUNCTIONS).steps(),
    Prop::read_write("remote-mode", "remote mode", ":COMM:REM", Domain::Switch),
    Prop::read_write("local-mode", "local mode lock-out", ":COMM:LOCK", Domain::Switch),
    Prop::read_write("integration-mode", "integration mode", ":INTEG:MODE", INTEGRATION_MODES),
    Prop::read_write("integration-timer", "integration timer (seconds)", ":INTEG:TIM", INTEGRATION_TIMER),
];

const DATA_ITEMS: &[Item] = &[
    Item::measured("V", "voltage", Q::Voltage, 4, "V"),
    Item::measured("I", "current", Q::Current, 6, "A"),
    Item::measured("P", "active power", Q::ActivePower, 4, "W"),
    Item::measured("S", "apparent power", Q::ApparentPower, 4, "VA"),
    Item::measured("Q", "reactive power", Q::ReactivePower, 4, "VAR"),
    Item::measured("Lambda", "power factor", Q::PowerFactor, 4, "PF"),
    Item::measured("Phi", "phase difference", Q::PhaseAngle, 2, "DEGREE"),
    Item::measured("Fv", "voltage frequency", Q::Frequency, 4, "VHZ"),
    Item::measured("Fi", "current frequency", Q::Frequency, 4, "AHZ"),
    Item::measured("Wh", "watt-hours", Q::WattHours, 6, "WH"),
    Item::measured("Whp", "positive watt-hours", Q::WattHours, 6, "WHP"),
    Item::measured("Whm", "negative watt-hours", Q::WattHours, 6, "WHM"),
    Item::measured("Ah", "ampere-hours", Q::AmpereHours, 6, "AH"),
    Item::measured("Ahp", "positive ampere-hours", Q::AmpereHours, 6, "AHP"),
    Item::measured("Ahm", "negative ampere-hours", Q::AmpereHours, 6, "AHM"),
    Item::measured("Vmax", "maximum voltage", Q::Voltage, 4, "VPK"),
    Item::measured("Imax", "maximum current", Q::Current, 6, "APK"),
    Item::measured("Time", "integration time", Q::Seconds, 0, "TIME").global(),
    Item::measured("Math", "value computed by the math function", Q::Math, 4, "MATH").global(),
    TIMESTAMP,
    ENERGY,
];

/// Yokogawa WT210.
pub static WT210: ModelDescriptor = ModelDescriptor {
    kind: ModelKind::Wt210,
    name: "Yokogawa WT210",
    aliases: &["wt210"],
    properties: PROPERTIES,
    data_items: DATA_ITEMS,
    max_items: 19,
    read_plan: ReadPlan::Selected {
        item: ":MEAS:ITEM:",
        value: ":MEAS:VAL?",
    },
    integration: IntegrationCommands {
        start: ":INTEG:STAR",
        stop: ":INTEG:STOP",
        reset: ":INTEG:RES",
        state: StateCheck::RewriteProperty("line-filter"),
    },
    init_commands: &[":COMM:REM ON"],
    defaults: DEFAULTS,
};
