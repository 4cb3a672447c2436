//! The session event loop.
//!
//! A single poll(2) loop multiplexes the child pty and the user's
//! keyboard, with a third, transient concern: streaming a file into
//! the child while the pty master is writable. Signals only mark a
//! flag; all cleanup happens in the main flow, where restoring the
//! host terminal is safe.

use std::io;
use std::os::fd::{AsFd, AsRawFd, OwnedFd};
use std::sync::atomic::{AtomicI32, Ordering};
use std::time::Duration;

use nix::errno::Errno;
use nix::poll::{PollFd, PollFlags, PollTimeout, poll};
use nix::sys::signal::{
    SaFlags, SigAction, SigHandler, SigSet, SigmaskHow, Signal, kill,
    sigaction, sigprocmask,
};
use nix::unistd::Pid;
use vttrans::TermProfile;

use crate::input::{Command, LineDiscipline};
use crate::output::{
    FileSender, OutputPump, PumpStatus, Recorder, SendProgress,
};
use crate::screen::{Emulated, ScreenMode, write_all};

const HELP: &str = "vtemu commands, recognized after a newline:\r\n\
    ~~      send a single ~ to the child\r\n\
    ~? ~h   this help\r\n\
    ~. ~q   exit\r\n\
    ~^Z     suspend\r\n\
    ~r FILE send FILE to the child\r\n\
    ~w FILE record child output (untranslated) to FILE\r\n\
    ~w      stop recording\r\n";

/// Which signal asked the session to die; 0 when none has.
static EXIT_SIGNAL: AtomicI32 = AtomicI32::new(0);

extern "C" fn note_signal(sig: libc::c_int) {
    EXIT_SIGNAL.store(sig, Ordering::SeqCst);
}

pub struct Session<'p> {
    master: OwnedFd,
    child: Pid,
    profile: Option<&'p TermProfile>,
    delay: Option<Duration>,
    resize_window: bool,
}

enum LoopExit {
    /// `~.` or pty EOF.
    Normal,
    /// A fatal I/O failure.
    Failed(io::Error),
    /// SIGCHLD or SIGTERM arrived.
    Signaled(i32),
}

impl<'p> Session<'p> {
    #[must_use]
    pub fn new(
        master: OwnedFd,
        child: Pid,
        profile: Option<&'p TermProfile>,
        delay: Option<Duration>,
        resize_window: bool,
    ) -> Self {
        Session { master, child, profile, delay, resize_window }
    }

    /// Run the session to completion and restore the host terminal.
    ///
    /// Returns the process exit code.
    ///
    /// # Errors
    ///
    /// Only setup failures (raw mode, signal installation) surface as
    /// errors; once the loop runs, failures feed the cleanup path and
    /// the exit code instead.
    pub fn run(self) -> io::Result<i32> {
        let stdin = io::stdin();
        let stdout = io::stdout();

        install_exit_handler()?;

        let emulated = self.profile.map(|p| Emulated {
            lines: p.lines,
            cols: p.cols,
            auto_margins: p.auto_margins,
            resize_window: self.resize_window,
        });
        let mut screen =
            ScreenMode::enter(stdin.as_fd(), stdout.as_fd(), emulated)?;

        write_all(
            stdout.as_fd(),
            b"vtemu: escape character is ~\r\n",
        )?;

        let mut pump = OutputPump::new(
            self.profile.map(TermProfile::translator),
            self.delay,
        );
        let mut discipline =
            LineDiscipline::new(self.profile.map(|p| p.arrows.clone()));
        let mut recorder = Recorder::default();
        let mut sender = FileSender::default();

        let exit = self.poll_loop(
            &stdin,
            &stdout,
            &mut screen,
            &mut pump,
            &mut discipline,
            &mut recorder,
            &mut sender,
        );

        // Stop recording, restore the user's terminal.
        let _ = write_all(stdout.as_fd(), b"\r\n");
        if recorder.stop() {
            let _ = write_all(stdout.as_fd(), b"Recording stopped\r\n");
        }
        screen.leave(stdin.as_fd(), stdout.as_fd());

        // Make sure the child is gone before the master closes.
        let _ = kill(self.child, Signal::SIGTERM);

        match exit {
            LoopExit::Normal => Ok(0),
            LoopExit::Failed(err) => {
                eprintln!("vtemu: {err}");
                Ok(1)
            }
            LoopExit::Signaled(sig) => {
                let name = Signal::try_from(sig)
                    .map_or("unknown signal", Signal::as_str);
                eprintln!("vtemu: {name}");
                Ok(1)
            }
        }
    }

    #[allow(clippy::too_many_arguments, clippy::too_many_lines)]
    fn poll_loop(
        &self,
        stdin: &io::Stdin,
        stdout: &io::Stdout,
        screen: &mut ScreenMode,
        pump: &mut OutputPump<'_>,
        discipline: &mut LineDiscipline,
        recorder: &mut Recorder,
        sender: &mut FileSender,
    ) -> LoopExit {
        loop {
            let sig = EXIT_SIGNAL.load(Ordering::SeqCst);
            if sig != 0 {
                return LoopExit::Signaled(sig);
            }

            let mut master_events = PollFlags::POLLIN;
            if sender.active() {
                master_events |= PollFlags::POLLOUT;
            }
            let mut fds = [
                PollFd::new(self.master.as_fd(), master_events),
                PollFd::new(stdin.as_fd(), PollFlags::POLLIN),
            ];
            match poll(&mut fds, PollTimeout::NONE) {
                Ok(_) => {}
                Err(Errno::EINTR) => continue,
                Err(err) => return LoopExit::Failed(err.into()),
            }
            let master_ready = fds[0].revents().unwrap_or(PollFlags::empty());
            let stdin_ready = fds[1].revents().unwrap_or(PollFlags::empty());

            // Output from the child?
            if master_ready
                .intersects(PollFlags::POLLIN | PollFlags::POLLERR)
            {
                match pump.handle(
                    self.master.as_fd(),
                    stdout.as_fd(),
                    recorder,
                ) {
                    Ok(PumpStatus::Continue) => {}
                    Ok(PumpStatus::Eof) => return LoopExit::Normal,
                    Err(err) => return LoopExit::Failed(err),
                }
            }

            if !sender.active() {
                if stdin_ready
                    .intersects(PollFlags::POLLIN | PollFlags::POLLERR)
                {
                    match self.handle_input(
                        stdin, stdout, screen, discipline, recorder,
                        sender,
                    ) {
                        Ok(true) => {}
                        Ok(false) => return LoopExit::Normal,
                        Err(err) => return LoopExit::Failed(err),
                    }
                }
                continue;
            }

            // A send is in flight: any user keystroke cancels it.
            if stdin_ready
                .intersects(PollFlags::POLLIN | PollFlags::POLLERR)
            {
                sender.cancel();
                let _ = write_all(
                    stdout.as_fd(),
                    b"\r\nUser terminated file send.\r\n",
                );
                continue;
            }

            // Child ready for more of the file?
            if master_ready.contains(PollFlags::POLLOUT) {
                match sender.pump(self.master.as_fd()) {
                    Ok(SendProgress::Sent) => {}
                    Ok(SendProgress::Done(message)) => {
                        if let Some(message) = message {
                            let _ = write_all(
                                stdout.as_fd(),
                                message.as_bytes(),
                            );
                        }
                    }
                    Err(err) => {
                        let _ = write_all(
                            stdout.as_fd(),
                            format!(
                                "\r\nWrite to child failed: {err}.\r\n"
                            )
                            .as_bytes(),
                        );
                        return LoopExit::Failed(err);
                    }
                }
            }
        }
    }

    /// Drain one stdin readable event through the line discipline.
    ///
    /// Returns false when the session should end (`~.` or stdin EOF).
    fn handle_input(
        &self,
        stdin: &io::Stdin,
        stdout: &io::Stdout,
        screen: &mut ScreenMode,
        discipline: &mut LineDiscipline,
        recorder: &mut Recorder,
        sender: &mut FileSender,
    ) -> io::Result<bool> {
        let mut buf = [0u8; 128];
        let count = match nix::unistd::read(stdin.as_fd().as_raw_fd(), &mut buf) {
            Ok(0) => return Ok(false),
            Ok(n) => n,
            Err(Errno::EAGAIN) => return Ok(true),
            Err(err) => return Err(err.into()),
        };

        let mut to_child = Vec::new();
        let mut echo = Vec::new();
        let mut commands = Vec::new();
        for &byte in &buf[..count] {
            if let Some(cmd) = discipline.feed(byte, &mut to_child, &mut echo)
            {
                commands.push(cmd);
            }
        }

        // Flush before dispatching, so command output lands after the
        // echoes it follows.
        if !to_child.is_empty() {
            write_all(self.master.as_fd(), &to_child)?;
        }
        if !echo.is_empty() {
            write_all(stdout.as_fd(), &echo)?;
        }

        for command in commands {
            tracing::debug!(?command, "escape command");
            match command {
                Command::Help => {
                    write_all(stdout.as_fd(), HELP.as_bytes())?;
                }
                Command::Quit => {
                    if recorder.stop() {
                        write_all(
                            stdout.as_fd(),
                            b"Recording stopped\r\n",
                        )?;
                    }
                    write_all(stdout.as_fd(), b"exiting\r\n")?;
                    return Ok(false);
                }
                Command::Suspend => {
                    self.suspend(stdin, stdout, screen)?;
                }
                Command::SendFile(path) => {
                    let message = sender.start(&path);
                    write_all(stdout.as_fd(), message.as_bytes())?;
                }
                Command::Record(path) => {
                    let message = recorder.control(&path);
                    write_all(stdout.as_fd(), message.as_bytes())?;
                }
                Command::Unrecognized(_) => {
                    write_all(
                        stdout.as_fd(),
                        b"vtemu: unrecognized command, ~? for help\r\n",
                    )?;
                }
            }
        }
        Ok(true)
    }

    /// `~^Z`: hand the terminal back and stop our process group.
    /// SIGCHLD stays blocked across the stop so a child death during
    /// the suspension is seen by the loop, not lost mid-handoff.
    fn suspend(
        &self,
        stdin: &io::Stdin,
        stdout: &io::Stdout,
        screen: &mut ScreenMode,
    ) -> io::Result<()> {
        screen.leave(stdin.as_fd(), stdout.as_fd());

        let mut chld = SigSet::empty();
        chld.add(Signal::SIGCHLD);
        sigprocmask(SigmaskHow::SIG_BLOCK, Some(&chld), None)?;
        let stop = kill(Pid::from_raw(0), Signal::SIGTSTP);
        // Execution resumes here on `fg`.
        sigprocmask(SigmaskHow::SIG_UNBLOCK, Some(&chld), None)?;
        stop?;

        screen.reenter(stdin.as_fd(), stdout.as_fd())?;
        Ok(())
    }
}

fn install_exit_handler() -> io::Result<()> {
    let action = SigAction::new(
        SigHandler::Handler(note_signal),
        SaFlags::empty(),
        SigSet::empty(),
    );
    unsafe {
        sigaction(Signal::SIGCHLD, &action)?;
        sigaction(Signal::SIGTERM, &action)?;
    }
    Ok(())
}
