//! The TCP command server.
//!
//! Every connection gets its own task. Requests from all connections share one power meter
//! session through a [`SessionGate`], so each request runs to completion before the next one
//! starts talking to the meter. A request that cannot get the session in time is answered with
//! an error instead of queueing behind a streaming read.

use std::{
    io,
    net::SocketAddr,
    sync::{Arc, Mutex, TryLockError},
    thread,
    time::{Duration, Instant},
};

use tokio::{
    io::{AsyncBufReadExt, AsyncWrite, AsyncWriteExt, BufReader},
    net::{TcpListener, TcpStream},
    sync::mpsc,
};
use tracing::{debug, error, info, warn};
use yokogawa_wt::{CancelToken, PowerMeter};
use yokolink::InstrumentInterface;

use crate::{
    handler::{self, ReplySink},
    protocol::{Message, OK, Request, error_reply, parse_line},
};

/// Lines buffered between the meter and a slow client.
const REPLY_BUFFER: usize = 64;

/// How long a request waits for a session that another connection is using.
pub const BUSY_WAIT: Duration = Duration::from_secs(2);

/// Reply to a request that did not get the session within the busy wait.
pub const BUSY: &str = "session busy, another connection is using the power meter";

const GATE_POLL: Duration = Duration::from_millis(10);

/// Exclusive access to one power meter session.
///
/// A request holds the session until it completes, a streaming `read` until its bound is hit
/// or its client goes away. Requests from other connections wait up to the busy wait and are
/// then refused.
pub struct SessionGate<T: InstrumentInterface> {
    meter: Arc<Mutex<PowerMeter<T>>>,
    busy_wait: Duration,
}

impl<T: InstrumentInterface> Clone for SessionGate<T> {
    fn clone(&self) -> Self {
        Self {
            meter: self.meter.clone(),
            busy_wait: self.busy_wait,
        }
    }
}

impl<T: InstrumentInterface> SessionGate<T> {
    /// Wrap a session, with [`BUSY_WAIT`].
    pub fn new(meter: PowerMeter<T>) -> Self {
        Self {
            meter: Arc::new(Mutex::new(meter)),
            busy_wait: BUSY_WAIT,
        }
    }

    /// Change how long a request waits for the session.
    pub fn with_busy_wait(mut self, busy_wait: Duration) -> Self {
        self.busy_wait = busy_wait;
        self
    }

    /// Run `f` while holding the session. Returns `None` if the session did not become free
    /// within the busy wait.
    pub fn try_run<R>(&self, f: impl FnOnce(&mut PowerMeter<T>) -> R) -> Option<R> {
        let deadline = Instant::now() + self.busy_wait;
        loop {
            match self.meter.try_lock() {
                Ok(mut meter) => return Some(f(&mut meter)),
                Err(TryLockError::Poisoned(poisoned)) => return Some(f(&mut poisoned.into_inner())),
                Err(TryLockError::WouldBlock) if Instant::now() >= deadline => return None,
                Err(TryLockError::WouldBlock) => thread::sleep(GATE_POLL),
            }
        }
    }
}

/// Sends reply lines from the blocking request to the connection task.
struct ChannelSink {
    tx: mpsc::Sender<String>,
    cancel: CancelToken,
}

impl ReplySink for ChannelSink {
    fn line(&mut self, line: &str) -> io::Result<()> {
        self.tx.blocking_send(line.to_string()).map_err(|_| {
            self.cancel.cancel();
            io::Error::new(io::ErrorKind::BrokenPipe, "client disconnected")
        })
    }
}

/// Accept connections on `listener` and serve them until the task is dropped.
pub async fn serve<T>(listener: TcpListener, gate: SessionGate<T>) -> io::Result<()>
where
    T: InstrumentInterface + Send + 'static,
{
    info!(addr = %listener.local_addr()?, "command server listening");
    loop {
        match listener.accept().await {
            Ok((socket, addr)) => {
                let gate = gate.clone();
                tokio::spawn(async move {
                    if let Err(err) = handle_client(socket, addr, gate).await {
                        warn!(%addr, %err, "client error");
                    }
                });
            }
            Err(err) => error!(%err, "accept failed"),
        }
    }
}

async fn handle_client<T>(socket: TcpStream, addr: SocketAddr, gate: SessionGate<T>) -> io::Result<()>
where
    T: InstrumentInterface + Send + 'static,
{
    info!(%addr, "client connected");
    let (reader, mut writer) = socket.into_split();
    let mut lines = BufReader::new(reader).lines();

    while let Some(line) = lines.next_line().await? {
        debug!(%addr, line, "request");
        match parse_line(&line) {
            Ok(Message::Empty) => {}
            Ok(Message::Quit) => break,
            Ok(Message::Request(request)) => run_request(request, &gate, &mut writer).await?,
            Err(message) => write_line(&mut writer, &error_reply(&message)).await?,
        }
    }

    info!(%addr, "client disconnected");
    Ok(())
}

/// Run one request on a blocking thread and forward its output lines as they come.
async fn run_request<T, W>(request: Request, gate: &SessionGate<T>, writer: &mut W) -> io::Result<()>
where
    T: InstrumentInterface + Send + 'static,
    W: AsyncWrite + Unpin,
{
    let (tx, mut rx) = mpsc::channel(REPLY_BUFFER);
    let cancel = CancelToken::new();
    let mut sink = ChannelSink {
        tx,
        cancel: cancel.clone(),
    };
    let gate = gate.clone();
    let task_cancel = cancel.clone();
    let task = tokio::task::spawn_blocking(move || {
        gate.try_run(|meter| handler::execute(meter, &request, &mut sink, &task_cancel))
    });

    while let Some(line) = rx.recv().await {
        if let Err(err) = write_line(writer, &line).await {
            cancel.cancel();
            drop(rx);
            let _ = task.await;
            return Err(err);
        }
    }

    let reply = match task.await {
        Ok(Some(Ok(_))) => OK.to_string(),
        Ok(Some(Err(err))) => error_reply(&err.to_string()),
        Ok(None) => {
            debug!("session busy");
            error_reply(BUSY)
        }
        Err(err) => {
            error!(%err, "request task failed");
            error_reply("internal error")
        }
    };
    write_line(writer, &reply).await
}

async fn write_line<W: AsyncWrite + Unpin>(writer: &mut W, line: &str) -> io::Result<()> {
    writer.write_all(line.as_bytes()).await?;
    writer.write_all(b"\n").await?;
    writer.flush().await
}
