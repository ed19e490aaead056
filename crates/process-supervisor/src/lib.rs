//! Supervision of one long-lived child process
//!
//! [`run`] launches a process described by [`Options`] and hands back a
//! [`Handle`] to restart it, stop it, wait for it and watch its [`Status`].
//! The child's output streams go to rotating, compressed log files built by
//! [`rotate_log`].
//!
//! ```no_run
//! use process_supervisor::{Options, run};
//!
//! smol::block_on(async {
//!     let handle = run(Options::new("sleep").arg("100")).await;
//!     handle.restart().await;
//!     handle.stop();
//!     handle.wait().await;
//! });
//! ```

#![warn(missing_docs)]

mod actor;
pub mod command;
pub mod duration;
pub mod env;
pub mod error;
mod handle;
pub mod options;
mod platform;
pub mod process;
pub mod state;
pub mod status;
pub mod template;

pub use command::Command;
pub use error::{Error, HookError, Result};
pub use handle::{Handle, run, run_until};
pub use options::{Options, PreStartHook};
pub use process::ExitStatus;
pub use state::ProcessState;
pub use status::{STATUS_CAPACITY, Status};

pub use rotate_log::{LoggerConfig, Passthrough, RotateOptions};
