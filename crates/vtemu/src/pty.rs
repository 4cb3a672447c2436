//! Child launch on a pseudo-terminal.

use std::os::fd::OwnedFd;
use std::os::unix::process::CommandExt;
use std::process::Command;

use nix::pty::{ForkptyResult, Winsize, forkpty};
use nix::sys::termios::Termios;
use nix::unistd::Pid;

/// The parent's handle on a spawned child.
pub struct Child {
    pub master: OwnedFd,
    pub pid: Pid,
}

/// Fork the command onto a fresh pseudo-terminal.
///
/// The slave side inherits `termios` (the user's current modes, plus
/// any selected output speed) and `winsize` (the emulated geometry).
/// When a terminal type is being emulated the child's `TERM` is set to
/// it. Does not return in the child: on exec failure the child reports
/// and exits 1.
///
/// # Errors
///
/// Returns the underlying `forkpty` failure.
pub fn spawn(
    argv: &[String],
    term_type: Option<&str>,
    termios: &Termios,
    winsize: &Winsize,
) -> nix::Result<Child> {
    // Single-threaded at this point, which is what makes forking safe.
    let fork = unsafe { forkpty(Some(winsize), Some(termios)) }?;
    match fork {
        ForkptyResult::Parent { child, master } => {
            tracing::debug!(pid = child.as_raw(), "child spawned");
            Ok(Child { master, pid: child })
        }
        ForkptyResult::Child => {
            let mut command = Command::new(&argv[0]);
            command.args(&argv[1..]);
            if let Some(term) = term_type {
                command.env("TERM", term);
            }
            let err = command.exec();
            eprintln!("vtemu: {}: {err}", argv[0]);
            std::process::exit(1);
        }
    }
}
