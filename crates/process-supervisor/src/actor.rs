//! The task that owns one supervised process.
//!
//! All state transitions happen here. Callers talk to it through a control
//! channel and observe it through the shared state and the status stream.

use async_channel::{Receiver, Sender};
use async_process::{Child, Stdio};
use chrono::Utc;
use futures::channel::oneshot;
use futures_lite::future;
use futures_lite::io::{AsyncRead, AsyncReadExt};
use rotate_log::{LoggerFactory, Sink};
use smol::Task;
use std::future::Future;
use std::io::{self, Write};
use std::pin::Pin;
use std::sync::Arc;

use crate::command::Command;
use crate::error::{Error, Result};
use crate::options::Options;
use crate::platform;
use crate::process::ExitStatus;
use crate::state::StateWriter;
use crate::status::{Status, StatusBroadcast};

/// Requests from a [`Handle`](crate::Handle), tagged with the launch they
/// were made against so a stale request cannot touch a newer instance.
pub(crate) enum Control {
    Restart {
        launch: u64,
        reply: oneshot::Sender<()>,
    },
    Stop {
        launch: u64,
    },
}

pub(crate) type Shutdown = Pin<Box<dyn Future<Output = ()> + Send>>;

pub(crate) struct Supervisor {
    options: Options,
    state: StateWriter,
    status: StatusBroadcast,
    control: Receiver<Control>,
    shutdown: Shutdown,
    done: Sender<()>,
    /// The running instance was signalled by us
    terminating: bool,
    /// The shutdown future has fired
    cancelled: bool,
}

/// One spawned child and everything tied to its lifetime
struct Instance {
    child: Child,
    pumps: Vec<Task<()>>,
    loggers: LoggerFactory,
}

impl Instance {
    /// Wait for the output pumps to drain and pending archives to be
    /// written, then close this run's writers
    async fn release(mut self) {
        for pump in self.pumps.drain(..) {
            pump.await;
        }
        self.loggers.compressed().await;
        if let Err(e) = self.loggers.close() {
            tracing::warn!(error = %e, "Failed to close process logs");
        }
    }
}

enum Event {
    Exited(io::Result<std::process::ExitStatus>),
    Control(Control),
    Shutdown,
}

enum Outcome {
    /// Old instance is gone; launch again and then answer the caller
    Restart(oneshot::Sender<()>),
    Exited,
}

impl Supervisor {
    pub(crate) fn new(
        options: Options,
        state: StateWriter,
        status: StatusBroadcast,
        control: Receiver<Control>,
        shutdown: Shutdown,
        done: Sender<()>,
    ) -> Self {
        Self {
            options,
            state,
            status,
            control,
            shutdown,
            done,
            terminating: false,
            cancelled: false,
        }
    }

    /// Drive the process until it stops for good. `started` fires once the
    /// first launch has either produced a running child or failed.
    pub(crate) async fn run(mut self, started: oneshot::Sender<()>) {
        let mut waiter = Some(started);
        loop {
            let mut instance = match self.launch().await {
                Ok(instance) => instance,
                Err(e) => {
                    tracing::warn!(command = %self.command_line(), error = %e, "Failed to launch process");
                    self.state.update(|s| s.error = Some(Arc::new(e)));
                    self.finish();
                    notify(waiter.take());
                    return;
                }
            };
            notify(waiter.take());

            let outcome = self.supervise(&mut instance).await;
            instance.release().await;
            match outcome {
                Outcome::Restart(reply) => waiter = Some(reply),
                Outcome::Exited => {
                    self.finish();
                    return;
                }
            }
        }
    }

    async fn launch(&mut self) -> Result<Instance> {
        self.terminating = false;
        self.state.update(|s| {
            s.pid = None;
            s.exit = None;
            s.error = None;
            s.stopped_at = None;
            s.started_at = Some(Utc::now());
            s.launches += 1;
        });
        self.publish(Status::Starting);
        if self.cancelled {
            return Err(Error::Cancelled);
        }

        let mut command = self.options.command();
        self.state.update(|s| s.command = command.to_string());
        if command.get_program().is_empty() {
            return Err(Error::spawn_failed("no executable configured"));
        }

        let mut loggers = LoggerFactory::new();
        match self.spawn(&mut command, &mut loggers) {
            Ok((child, pumps)) => Ok(Instance {
                child,
                pumps,
                loggers,
            }),
            Err(e) => {
                if let Err(close) = loggers.close() {
                    tracing::warn!(error = %close, "Failed to close process logs");
                }
                Err(e)
            }
        }
    }

    fn spawn(
        &mut self,
        command: &mut Command,
        loggers: &mut LoggerFactory,
    ) -> Result<(Child, Vec<Task<()>>)> {
        let (stdout, stderr) = match &self.options.logger {
            Some(config) => (
                loggers.create([config.stdout.as_ref(), Some(&config.combined)])?,
                loggers.create([config.stderr.as_ref(), Some(&config.combined)])?,
            ),
            None => (None, None),
        };

        for hook in &self.options.pre_start {
            hook(command).map_err(|source| Error::PreStart { source })?;
        }

        let mut cmd = command.prepare();
        cmd.stdin(Stdio::null())
            .stdout(piped_if(stdout.is_some()))
            .stderr(piped_if(stderr.is_some()));

        let mut child = cmd.spawn().map_err(|e| {
            Error::spawn_failed(format!("{}: {}", command.get_program().to_string_lossy(), e))
        })?;

        let mut pumps = Vec::new();
        if let (Some(sink), Some(out)) = (stdout, child.stdout.take()) {
            pumps.push(smol::spawn(pump(out, sink, "stdout")));
        }
        if let (Some(sink), Some(err)) = (stderr, child.stderr.take()) {
            pumps.push(smol::spawn(pump(err, sink, "stderr")));
        }

        let pid = child.id();
        let line = command.to_string();
        tracing::info!(pid, command = %line, "Process started");
        self.state.update(|s| {
            s.pid = Some(pid);
            s.command = line;
        });
        self.publish(Status::Running);
        Ok((child, pumps))
    }

    async fn supervise(&mut self, instance: &mut Instance) -> Outcome {
        loop {
            match self.next_event(&mut instance.child).await {
                Event::Control(Control::Stop { launch }) => {
                    if self.accepts(launch) {
                        self.publish(Status::Stopping);
                        self.terminate(&mut instance.child);
                    }
                }
                Event::Control(Control::Restart { launch, reply }) => {
                    if !self.accepts(launch) {
                        continue;
                    }
                    self.publish(Status::Restarting);
                    self.terminate(&mut instance.child);
                    match instance.child.status().await {
                        Ok(status) => tracing::debug!(code = ?status.code(), "Process exited for restart"),
                        Err(e) => tracing::warn!(error = %e, "Failed to reap process during restart"),
                    }
                    return Outcome::Restart(reply);
                }
                Event::Shutdown => {
                    tracing::debug!("Shutdown requested");
                    self.cancelled = true;
                    self.terminate(&mut instance.child);
                }
                Event::Exited(result) => {
                    self.record_exit(result);
                    return Outcome::Exited;
                }
            }
        }
    }

    /// Wait for whichever happens first: exit, a control request or
    /// shutdown. Exit wins ties.
    async fn next_event(&mut self, child: &mut Child) -> Event {
        let control = &self.control;
        let shutdown = &mut self.shutdown;
        let cancelled = self.cancelled;

        let exited = async { Event::Exited(child.status().await) };
        let request = async {
            match control.recv().await {
                Ok(request) => Event::Control(request),
                // Every handle is gone; only exit or shutdown can end us now
                Err(_) => future::pending().await,
            }
        };
        let shutdown = async move {
            if cancelled {
                future::pending::<()>().await;
            }
            shutdown.await;
            Event::Shutdown
        };

        future::or(exited, future::or(request, shutdown)).await
    }

    fn accepts(&self, launch: u64) -> bool {
        self.state
            .read(|s| s.status == Status::Running && s.launches == launch)
    }

    fn terminate(&mut self, child: &mut Child) {
        self.terminating = true;
        if let Err(e) = platform::terminate(child) {
            tracing::warn!(pid = child.id(), error = %e, "Failed to signal process, killing it");
            let _ = child.kill();
        }
    }

    fn record_exit(&mut self, result: io::Result<std::process::ExitStatus>) {
        let requested = self.terminating;
        match result {
            Ok(status) => {
                let exit = ExitStatus::from(status);
                tracing::info!(code = ?exit.code, requested, "Process exited");
                self.state.update(|s| {
                    s.exit = Some(exit);
                    if !requested {
                        s.error = Error::from_exit(&exit).map(Arc::new);
                    }
                });
            }
            Err(e) => {
                tracing::warn!(error = %e, "Failed to wait for process");
                self.state.update(|s| s.error = Some(Arc::new(Error::Io(e))));
            }
        }
    }

    /// Enter the terminal state and release everyone waiting on it
    fn finish(&mut self) {
        self.state.update(|s| s.stopped_at = Some(Utc::now()));
        self.publish(Status::Stopped);
        self.status.close();
        self.done.close();
    }

    fn publish(&mut self, status: Status) {
        self.state.update(|s| s.status = status);
        tracing::debug!(status = %status, "Status changed");
        self.status.publish(status);
    }

    fn command_line(&self) -> String {
        self.state.read(|s| s.command.clone())
    }
}

fn notify(waiter: Option<oneshot::Sender<()>>) {
    if let Some(waiter) = waiter {
        let _ = waiter.send(());
    }
}

fn piped_if(capture: bool) -> Stdio {
    if capture { Stdio::piped() } else { Stdio::null() }
}

/// Copy a child's pipe into its sink until EOF.
///
/// A failing sink is reported once per failure streak; the pipe keeps being
/// drained so the child never blocks on a full pipe.
async fn pump<R>(mut reader: R, mut sink: Sink, stream: &'static str)
where
    R: AsyncRead + Unpin,
{
    let mut buf = vec![0u8; 8 * 1024];
    let mut failing = false;
    loop {
        let n = match reader.read(&mut buf).await {
            Ok(0) => break,
            Ok(n) => n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => {
                tracing::debug!(stream, error = %e, "Output pipe closed with error");
                break;
            }
        };
        match sink.write_all(&buf[..n]) {
            Ok(()) => failing = false,
            Err(e) => {
                if !failing {
                    tracing::warn!(stream, error = %e, "Failed to write process output");
                }
                failing = true;
            }
        }
    }
    let _ = sink.flush();
}
