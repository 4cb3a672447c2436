//! Emulate a legacy terminal on top of an xterm.
//!
//! The child command runs on a pseudo-terminal sized and typed for the
//! emulated terminal; this process sits in between, translating the
//! child's termcap-described control sequences into xterm ones,
//! pacing output to a line speed, and offering a small `~` escape
//! surface for in-session control.

#![warn(clippy::pedantic)]

mod cli;
mod input;
mod output;
mod pty;
mod screen;
mod session;

use std::io;
use std::os::fd::AsFd;

use clap::Parser;
use nix::pty::Winsize;
use nix::sys::termios::{cfsetospeed, tcgetattr};
use tracing_subscriber::EnvFilter;
use vtcap::Entry;
use vttrans::TermProfile;

use crate::cli::{Cli, OutputSpeed};
use crate::session::Session;

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(io::stderr)
        .init();

    let cli = Cli::parse();
    match run(&cli) {
        Ok(code) => std::process::exit(code),
        Err(err) => {
            eprintln!("vtemu: {err}");
            std::process::exit(1);
        }
    }
}

fn run(cli: &Cli) -> Result<i32, Box<dyn std::error::Error>> {
    if let Some(cps) = cli.cps
        && cps < 5
    {
        return Err("cps must be >= 5".into());
    }
    let speed = cli.cps.map(cli::snap_speed);

    let stdin = io::stdin();
    // The child's line inherits the user's current modes.
    let mut termios = tcgetattr(stdin.as_fd())?;
    let host = screen::host_winsize(stdin.as_fd())?;

    let profile = match &cli.term_type {
        Some(term) => {
            let entry = Entry::open(term)?;
            Some(TermProfile::load(term, &entry, host.ws_row)?)
        }
        None => None,
    };

    // The kernel's window size matches the emulated terminal.
    let winsize = profile.as_ref().map_or(host, |p| Winsize {
        ws_row: p.lines,
        ws_col: p.cols,
        ws_xpixel: 0,
        ws_ypixel: 0,
    });

    if let Some(speed) = speed {
        cfsetospeed(&mut termios, speed.baud)?;
    }

    let child = pty::spawn(
        &cli.command,
        cli.term_type.as_deref(),
        &termios,
        &winsize,
    )?;

    let session = Session::new(
        child.master,
        child.pid,
        profile.as_ref(),
        speed.map(OutputSpeed::delay),
        cli.resize_window,
    );
    Ok(session.run()?)
}
