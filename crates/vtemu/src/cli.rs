//! Command-line surface and output-speed selection.

use std::time::Duration;

use clap::Parser;
use nix::sys::termios::BaudRate;

/// Emulate a legacy terminal on top of an xterm.
///
/// The child command runs on a pseudo-terminal sized to the emulated
/// terminal's geometry; its output is translated from the legacy
/// terminal's control language into xterm sequences. The in-session
/// escape character is `~` at the start of a line.
#[derive(Debug, Parser)]
#[command(name = "vtemu", version)]
pub struct Cli {
    /// Output characters per second, minimum 5 (default: no delay).
    #[arg(short = 'c', value_name = "CPS")]
    pub cps: Option<u32>,

    /// Resize the host terminal instead of setting a scroll region.
    #[arg(short = 'r')]
    pub resize_window: bool,

    /// Emulated terminal type (default: no emulation).
    #[arg(short = 't', value_name = "TERMTYPE")]
    pub term_type: Option<String>,

    /// Command to run on the pseudo-terminal.
    #[arg(
        trailing_var_arg = true,
        allow_hyphen_values = true,
        default_value = "bash"
    )]
    pub command: Vec<String>,
}

/// A selected output rate: the character rate used by the per-byte
/// throttle and the matching termios speed for the child's line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OutputSpeed {
    pub cps: u32,
    pub baud: BaudRate,
}

impl OutputSpeed {
    /// Nanoseconds-per-byte delay implied by this rate.
    #[must_use]
    pub fn delay(self) -> Duration {
        Duration::from_nanos(1_000_000_000 / u64::from(self.cps))
    }
}

/// Character rates of the classic line speeds. A requested rate snaps
/// up to the next entry; anything beyond the table pegs at the top.
const SPEEDS: &[(u32, BaudRate)] = &[
    (5, BaudRate::B50),
    (8, BaudRate::B75),
    (10, BaudRate::B110),
    (13, BaudRate::B134),
    (15, BaudRate::B150),
    (20, BaudRate::B200),
    (30, BaudRate::B300),
    (60, BaudRate::B600),
    (120, BaudRate::B1200),
    (180, BaudRate::B1800),
    (240, BaudRate::B2400),
    (480, BaudRate::B4800),
    (960, BaudRate::B9600),
    (1920, BaudRate::B19200),
    (3840, BaudRate::B38400),
    (5760, BaudRate::B57600),
    (11520, BaudRate::B115200),
];

/// Snap a requested characters-per-second rate onto the speed table.
#[must_use]
pub fn snap_speed(cps: u32) -> OutputSpeed {
    let &(cps, baud) = SPEEDS
        .iter()
        .find(|&&(table_cps, _)| cps <= table_cps)
        .unwrap_or(&SPEEDS[SPEEDS.len() - 1]);
    OutputSpeed { cps, baud }
}
