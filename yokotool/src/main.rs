use std::{env, io, process::ExitCode};

use anyhow::Context;
use clap::Parser;
use tokio::net::TcpListener;
use tracing::{debug, info};
use yokogawa_wt::CancelToken;
use yokotool::{
    cli::{Cli, Command, split_devspec},
    config::{self, DevSpec, DeviceConfig},
    connect::connect,
    handler::{self, Outcome, WriterSink},
    logging,
    server::{self, SessionGate},
};

/// Exit code after Ctrl+C.
const INTERRUPTED: u8 = 130;

#[tokio::main]
async fn main() -> ExitCode {
    let (devspec, args) = split_devspec(env::args().collect());
    let cli = Cli::parse_from(args);
    logging::init(cli.debug);

    match run(devspec, cli).await {
        Ok(code) => code,
        Err(err) => {
            eprintln!("yokotool: error: {err:#}");
            ExitCode::FAILURE
        }
    }
}

async fn run(devspec: Option<String>, cli: Cli) -> anyhow::Result<ExitCode> {
    let overrides = DeviceConfig {
        devnode: None,
        baudrate: cli.baudrate,
        pmtype: cli.pmtype,
    };
    let devspec = devspec.as_deref().map(DevSpec::parse);
    let settings = config::resolve(devspec.as_ref(), overrides, &config::default_paths())
        .context("invalid configuration")?;
    debug!(?settings, "device settings");

    let mut meter = tokio::task::spawn_blocking(move || connect(&settings)).await??;

    match cli.command {
        Command::Serve { port, bind } => {
            let listener = TcpListener::bind((bind.as_str(), port))
                .await
                .with_context(|| format!("cannot listen on {bind}:{port}"))?;
            tokio::select! {
                result = server::serve(listener, SessionGate::new(meter)) => result?,
                _ = tokio::signal::ctrl_c() => info!("shutting down"),
            }
            Ok(ExitCode::SUCCESS)
        }
        Command::Meter(request) => {
            let cancel = CancelToken::new();
            let watcher = {
                let cancel = cancel.clone();
                tokio::spawn(async move {
                    if tokio::signal::ctrl_c().await.is_ok() {
                        cancel.cancel();
                    }
                })
            };
            let task_cancel = cancel.clone();
            let outcome = tokio::task::spawn_blocking(move || {
                let mut sink = WriterSink::new(io::stdout());
                handler::execute(&mut meter, &request, &mut sink, &task_cancel)
            })
            .await?;
            watcher.abort();

            match outcome {
                Ok(Outcome::Interrupted) => Ok(interrupted()),
                Err(_) if cancel.is_cancelled() => Ok(interrupted()),
                Ok(Outcome::ProgramFailed(code)) => Ok(ExitCode::from(u8::try_from(code).unwrap_or(1))),
                Ok(Outcome::Done) => Ok(ExitCode::SUCCESS),
                Err(err) => Err(err.into()),
            }
        }
    }
}

fn interrupted() -> ExitCode {
    eprintln!("Interrupted, exiting");
    ExitCode::from(INTERRUPTED)
}
