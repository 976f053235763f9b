//! The `yokotool` command line tool and command server for Yokogawa WT210/WT310 family power
//! meters.
//!
//! The binary is a thin layer over this crate: [`cli`] parses the arguments, [`config`] finds
//! the device, [`connect`] opens the session and [`handler`] runs the command. [`server`]
//! accepts the same commands over TCP, see [`protocol`].

#![warn(missing_docs)]

pub mod cli;
pub mod config;
pub mod connect;
pub mod duration;
pub mod handler;
pub mod logging;
pub mod protocol;
pub mod server;
