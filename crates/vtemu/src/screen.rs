//! Host screen-mode management.
//!
//! Entering a session puts the host terminal into raw mode and
//! constrains the visible region to the emulated geometry, either by
//! resizing the window outright or by setting a scroll region (plus
//! DEC margins when the widths differ). Leaving undoes all of it.
//! Restoration is idempotent so the cleanup path may run it again
//! after a signal.

use std::io;
use std::os::fd::{AsFd, AsRawFd, BorrowedFd};

use nix::fcntl::{FcntlArg, OFlag, fcntl};
use nix::pty::Winsize;
use nix::sys::termios::{
    SetArg, Termios, cfmakeraw, tcgetattr, tcsetattr,
};

const ANSI_CLEAR: &str = "\x1b[H\x1b[2J";
const DEC_AUTOWRAP_ON: &str = "\x1b[?7h";
const DEC_AUTOWRAP_OFF: &str = "\x1b[?7l";
const DEC_MARGINS_ON: &str = "\x1b[?69h";
const DEC_MARGINS_OFF: &str = "\x1b[?69l";

nix::ioctl_read_bad!(tiocgwinsz, libc::TIOCGWINSZ, Winsize);

/// The host terminal's current size.
///
/// # Errors
///
/// Returns the `ioctl` failure (stdin not a terminal, typically).
pub fn host_winsize(fd: BorrowedFd<'_>) -> io::Result<Winsize> {
    let mut ws = Winsize {
        ws_row: 0,
        ws_col: 0,
        ws_xpixel: 0,
        ws_ypixel: 0,
    };
    unsafe { tiocgwinsz(fd.as_raw_fd(), &raw mut ws) }?;
    Ok(ws)
}

/// Geometry constraints for an emulated terminal.
#[derive(Debug, Clone, Copy)]
pub struct Emulated {
    pub lines: u16,
    pub cols: u16,
    pub auto_margins: bool,
    /// Resize the host window instead of using a scroll region.
    pub resize_window: bool,
}

/// Saved host terminal state plus what was done to it.
pub struct ScreenMode {
    saved_termios: Termios,
    saved_flags: Option<OFlag>,
    saved_winsize: Option<Winsize>,
    emulated: Option<Emulated>,
    entered: bool,
}

impl ScreenMode {
    /// Switch the host terminal into session mode: raw input,
    /// non-blocking stdin, and the emulated screen constraints.
    ///
    /// # Errors
    ///
    /// Returns terminal attribute or write failures. Whatever was
    /// applied before the failure has already been undone.
    pub fn enter(
        stdin: BorrowedFd<'_>,
        stdout: BorrowedFd<'_>,
        emulated: Option<Emulated>,
    ) -> io::Result<ScreenMode> {
        let saved_termios = tcgetattr(stdin)?;
        let mut mode = ScreenMode {
            saved_termios,
            saved_flags: None,
            saved_winsize: None,
            emulated,
            entered: true,
        };
        // From here on, a failure restores through `leave`.
        match mode.apply(stdin, stdout) {
            Ok(()) => Ok(mode),
            Err(err) => {
                mode.leave(stdin, stdout);
                Err(err)
            }
        }
    }

    fn apply(
        &mut self,
        stdin: BorrowedFd<'_>,
        stdout: BorrowedFd<'_>,
    ) -> io::Result<()> {
        let mut raw = self.saved_termios.clone();
        cfmakeraw(&mut raw);
        tcsetattr(stdin, SetArg::TCSANOW, &raw)?;

        let bits = fcntl(stdin.as_raw_fd(), FcntlArg::F_GETFL)?;
        let flags = OFlag::from_bits_retain(bits);
        self.saved_flags = Some(flags);
        fcntl(
            stdin.as_raw_fd(),
            FcntlArg::F_SETFL(flags | OFlag::O_NONBLOCK),
        )?;

        if let Some(emu) = self.emulated {
            let host = host_winsize(stdin)?;
            self.saved_winsize = Some(host);

            let mut seq = String::new();
            if emu.resize_window {
                seq.push_str(&format!(
                    "\x1b[8;{};{}t",
                    emu.lines, emu.cols
                ));
            } else {
                seq.push_str(&format!("\x1b[;{}r", emu.lines));
                seq.push_str(ANSI_CLEAR);
                if emu.cols != host.ws_col {
                    seq.push_str(DEC_MARGINS_ON);
                    seq.push_str(&format!("\x1b[1;{}s", emu.cols));
                }
            }
            if !emu.auto_margins {
                seq.push_str(DEC_AUTOWRAP_OFF);
            }
            write_all(stdout, seq.as_bytes())?;
        }
        Ok(())
    }

    /// Restore the host terminal. Safe to call more than once.
    pub fn leave(&mut self, stdin: BorrowedFd<'_>, stdout: BorrowedFd<'_>) {
        if !self.entered {
            return;
        }
        self.entered = false;

        if let (Some(emu), Some(host)) = (self.emulated, self.saved_winsize)
        {
            let mut seq = String::new();
            if emu.resize_window {
                seq.push_str(&format!(
                    "\x1b[8;{};{}t",
                    host.ws_row, host.ws_col
                ));
            } else {
                seq.push_str(&format!("\x1b[r\x1b[{}H", emu.lines));
                if emu.cols != host.ws_col {
                    seq.push_str(DEC_MARGINS_OFF);
                }
            }
            if !emu.auto_margins {
                seq.push_str(DEC_AUTOWRAP_ON);
            }
            let _ = write_all(stdout, seq.as_bytes());
        }

        if let Some(flags) = self.saved_flags {
            let _ =
                fcntl(stdin.as_raw_fd(), FcntlArg::F_SETFL(flags));
        }
        let _ = tcsetattr(stdin, SetArg::TCSANOW, &self.saved_termios);
    }

    /// Re-apply session mode after a suspend.
    ///
    /// # Errors
    ///
    /// Same failure modes as [`ScreenMode::enter`].
    pub fn reenter(
        &mut self,
        stdin: BorrowedFd<'_>,
        stdout: BorrowedFd<'_>,
    ) -> io::Result<()> {
        let fresh = ScreenMode::enter(stdin, stdout, self.emulated)?;
        *self = fresh;
        Ok(())
    }
}

impl Drop for ScreenMode {
    fn drop(&mut self) {
        // Restoration happens explicitly on the cleanup paths; this is
        // the backstop for early returns. `leave` is idempotent.
        let stdin = unsafe { BorrowedFd::borrow_raw(libc::STDIN_FILENO) };
        let stdout = unsafe { BorrowedFd::borrow_raw(libc::STDOUT_FILENO) };
        self.leave(stdin, stdout);
    }
}

/// Write the whole buffer to a raw descriptor.
///
/// # Errors
///
/// Propagates the underlying write failure; a zero-length write is
/// reported as `WriteZero`.
pub fn write_all(fd: BorrowedFd<'_>, mut buf: &[u8]) -> io::Result<()> {
    while !buf.is_empty() {
        match nix::unistd::write(fd.as_fd(), buf) {
            Ok(0) => {
                return Err(io::Error::new(
                    io::ErrorKind::WriteZero,
                    "write returned zero",
                ));
            }
            Ok(n) => buf = &buf[n..],
            Err(nix::errno::Errno::EINTR) => {}
            Err(e) => return Err(e.into()),
        }
    }
    Ok(())
}
