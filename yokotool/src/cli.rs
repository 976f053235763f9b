//! Command line arguments.

use clap::{CommandFactory, Parser, Subcommand};

use crate::protocol::Request;

/// Default command server port.
pub const DEFAULT_PORT: u16 = 5025;

/// Options that take a value, the value is never a device specification.
const VALUE_OPTIONS: &[&str] = &["--pmtype", "--baudrate"];

/// Control Yokogawa WT210 and WT310 family power meters.
#[derive(Debug, Parser)]
#[command(
    name = "yokotool",
    version,
    override_usage = "yokotool [DEVSPEC] [OPTIONS] <COMMAND>",
    after_help = "DEVSPEC is a device node such as /dev/usbtmc0 or /dev/ttyUSB0, or the name of a \
                  section in /etc/yokotool.toml or ~/.yokotool.toml. Without it the 'default' \
                  section is used.",
    disable_help_subcommand = true
)]
pub struct Cli {
    /// Power meter type: wt210, wt310, wt310hc, wt330, wt332 or wt333. Detected if not given.
    #[arg(long, global = true, value_name = "TYPE")]
    pub pmtype: Option<String>,
    /// Serial baud rate, selects a serial link.
    #[arg(long, global = true)]
    pub baudrate: Option<u32>,
    /// Print debug messages.
    #[arg(short = 'd', long, global = true)]
    pub debug: bool,
    /// What to do.
    #[command(subcommand)]
    pub command: Command,
}

/// Top level commands.
#[derive(Debug, Subcommand)]
pub enum Command {
    /// A power meter command.
    #[command(flatten)]
    Meter(Request),
    /// Serve power meter commands over TCP, one request per line.
    Serve {
        /// TCP port.
        #[arg(long, default_value_t = DEFAULT_PORT)]
        port: u16,
        /// Address to listen on.
        #[arg(long, default_value = "127.0.0.1")]
        bind: String,
    },
}

/// Take the device specification out of the arguments.
///
/// It is the first positional argument before the command. Returns it together with the
/// remaining arguments, which can be parsed with [`Cli`].
pub fn split_devspec(args: Vec<String>) -> (Option<String>, Vec<String>) {
    let cli = Cli::command();
    let is_command = |arg: &str| {
        cli.get_subcommands()
            .any(|sub| sub.get_name() == arg || sub.get_all_aliases().any(|a| a == arg))
    };

    let mut idx = 1;
    while idx < args.len() {
        let arg = args[idx].as_str();
        if VALUE_OPTIONS.contains(&arg) {
            idx += 2;
        } else if arg.starts_with('-') {
            idx += 1;
        } else if is_command(arg) {
            break;
        } else {
            let mut args = args;
            let devspec = args.remove(idx);
            return (Some(devspec), args);
        }
    }
    (None, args)
}
