//! Terminal-type validation and loading.
//!
//! Turns a termcap entry into a [`TermProfile`]: a compiled parse
//! table plus the handful of globals the session needs (geometry,
//! auto-margin and Hazeltine flags, arrow-key bindings). All
//! validation happens here, before the session starts; every failure
//! names the capability that caused it.

use std::fmt;

use vtcap::{CapName, Caps};

use crate::dump;
use crate::table::{Action, ParseTable, TableError};
use crate::translate::{Screen, Translator};

const ANSI_HOME: &str = "\x1b[H";
const ANSI_LEFT: &str = "\x1b[D";
const ANSI_BOLD: &str = "\x1b[1m";
const ANSI_INVERSE: &str = "\x1b[7m";
const ANSI_SCROLL_UP: &str = "\x1b[S";

/// Error validating or loading a terminal type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SetupError {
    /// A capability this emulation cannot express is present.
    Unsupported(CapName),
    /// Standout glitch widths above one cell are not supported.
    GlitchTooBig,
    /// An underline glitch without a standout glitch is not supported.
    UnderlineWithoutStandout,
    /// The entry has no usable column count.
    BadColumns,
    /// A capability value failed to compile into the parse table.
    Cap { name: CapName, source: TableError },
}

impl fmt::Display for SetupError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SetupError::Unsupported(cap) => {
                write!(f, "Termcap '{cap}' capability is unsupported")
            }
            SetupError::GlitchTooBig => {
                write!(f, "Termcap 'sg' capability > 1 is unsupported")
            }
            SetupError::UnderlineWithoutStandout => {
                write!(
                    f,
                    "Termcap 'ug' without 'sg' capability is unsupported"
                )
            }
            SetupError::BadColumns => {
                write!(f, "Columns not valid in termcap entry")
            }
            SetupError::Cap { name, source } => {
                write!(
                    f,
                    "Termcap '{name}' capability unsupported: {source}"
                )
            }
        }
    }
}

impl std::error::Error for SetupError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            SetupError::Cap { source, .. } => Some(source),
            _ => None,
        }
    }
}

/// The standard capability bindings. The two replacement variants
/// select between plain terminals and magic-cookie (`sg` = 1)
/// terminals; `None` marks a capability the emulation cannot express.
struct TermCapBinding {
    name: [u8; 2],
    action: Action,
    rep: [Option<&'static str>; 2],
}

macro_rules! plain {
    ($rep:literal) => {
        [Some($rep), Some($rep)]
    };
}

/// Magic-cookie terminals leave a hole before attribute resets.
macro_rules! lead_cookie {
    ($rep:literal) => {
        [Some($rep), Some(concat!("»", $rep))]
    };
}

/// Magic-cookie terminals leave a hole after attribute sets.
macro_rules! trail_cookie {
    ($rep:literal) => {
        [Some($rep), Some(concat!($rep, "«"))]
    };
}

macro_rules! bindings {
    ($($name:literal, $action:ident, $rep:expr;)*) => {
        &[$(TermCapBinding {
            name: *$name,
            action: Action::$action,
            rep: $rep,
        },)*]
    };
}

static TCAPS: &[TermCapBinding] = bindings![
    b"al", Fmt,    plain!("\x1b[L");        // ANSI insert line
    b"bc", Fmt,    plain!("\x08");
    b"bl", Fmt,    plain!("\x07");
    b"bt", Fmt,    plain!("\x1b[Z");        // ANSI reverse tab
    b"cd", Fmt,    plain!("\x1b[J");
    b"ce", Fmt,    plain!("\x1b[K");
    b"cl", Fmt,    plain!("\x1b[H\x1b[2J");
    b"cm", Fmt2,   plain!("\x1b[%d;%dH");
    b"cr", Fmt,    plain!("\r");
    b"cs", Ignore, [None, None];            // scroll regions unsupported
    b"dc", Fmt,    plain!("\x1b[P");
    b"dl", Fmt,    plain!("\x1b[M");
    b"do", Fmt,    plain!("\n");
    b"ds", Fmt,    plain!("");              // ignore
    b"ei", Fmt,    plain!("\x1b[4l");
    b"fs", Fmt,    plain!("\x1b\\");        // DEC string terminator
    b"ic", Fmt,    plain!("\x1b[@");
    b"im", Fmt,    plain!("\x1b[4h");
    b"ke", Fmt,    plain!("");              // ignore
    b"ks", Fmt,    plain!("");              // ignore
    b"ll", Ll,     plain!("\x1b[%dH");
    b"mb", Fmt,    plain!("\x1b[5m");       // ANSI blink
    b"mh", Fmt,    plain!("\x1b[2m");       // ANSI faint
    b"me", Fmt,    lead_cookie!("\x1b[m");
    b"mr", Fmt,    trail_cookie!("\x1b[7m");
    b"nd", Fmt,    plain!("\x1b[C");
    b"rc", Fmt,    plain!("\x1b8");         // DEC restore cursor
    b"sc", Fmt,    plain!("\x1b7");         // DEC save cursor
    b"se", Fmt,    lead_cookie!("\x1b[m");
    b"ta", Fmt,    plain!("\t");
    b"ts", Stline, plain!("\x1b]0;");       // xterm set title
    b"ue", Fmt,    lead_cookie!("\x1b[m");
    b"up", Fmt,    plain!("\x1b[A");
    b"us", Fmt,    trail_cookie!("\x1b[4m");
    b"ve", Fmt,    plain!("");              // ignore
    b"vi", Fmt,    plain!("");              // ignore
    b"vs", Fmt,    plain!("");              // ignore
];

/// Arrow capabilities, in up/down/right/left order.
const ARROW_CAPS: [[u8; 2]; 4] = [*b"ku", *b"kd", *b"kr", *b"kl"];

/// A loaded and validated terminal type.
#[derive(Debug, Clone, PartialEq)]
pub struct TermProfile {
    pub name: String,
    pub table: ParseTable,
    pub cols: u16,
    pub lines: u16,
    /// The terminal wraps at the right margin on its own (`am`).
    pub auto_margins: bool,
    /// Hazeltine `~`-forbidden glitch (`hz`).
    pub hazeltine: bool,
    /// Bytes to send to the child for up/down/right/left arrows.
    pub arrows: [Vec<u8>; 4],
}

impl TermProfile {
    /// Validate `term`'s capabilities and compile its parse table.
    ///
    /// `fallback_rows` supplies the line count when the entry has no
    /// usable `li` capability (the host's current height).
    ///
    /// # Errors
    ///
    /// Returns a [`SetupError`] naming the capability that made the
    /// terminal unusable.
    #[allow(clippy::too_many_lines)]
    pub fn load(
        term: &str,
        caps: &impl Caps,
        fallback_rows: u16,
    ) -> Result<TermProfile, SetupError> {
        let mut table = ParseTable::new();
        table.init_printable();

        // Boolean capabilities.
        let auto_margins = caps.flag_cap(CapName::new(*b"am"));
        if caps.flag_cap(CapName::new(*b"bs")) {
            table.set_print(0x08, CapName::new(*b"bs"));
        }
        let hazeltine = caps.flag_cap(CapName::new(*b"hz"));
        if hazeltine {
            table.set_ignore(b'~');
        }
        if caps.flag_cap(CapName::new(*b"os")) {
            // Overstrike output cannot be reproduced on an xterm.
            return Err(SetupError::Unsupported(CapName::new(*b"os")));
        }
        if caps.flag_cap(CapName::new(*b"pt")) {
            table.set_print(b'\t', CapName::new(*b"pt"));
        }
        if caps.flag_cap(CapName::new(*b"x7")) {
            // CDC 713 glitch: ETX and DEL draw symbols.
            table.set_fmt(0x03, CapName::new(*b"x7"), "▲");
            table.set_fmt(0x7f, CapName::new(*b"x7"), "■");
        }

        // Numeric capabilities.
        let cols = caps.num_cap(CapName::new(*b"co")).unwrap_or(0);
        let cols = u16::try_from(cols).ok().filter(|&c| c > 0);
        let Some(cols) = cols else {
            return Err(SetupError::BadColumns);
        };
        let lines = caps
            .num_cap(CapName::new(*b"li"))
            .and_then(|l| u16::try_from(l).ok())
            .filter(|&l| l > 0)
            .unwrap_or(fallback_rows);

        let glitch = match caps.num_cap(CapName::new(*b"sg")) {
            Some(n) if n > 1 => return Err(SetupError::GlitchTooBig),
            Some(n) if n > 0 => 1,
            _ => 0,
        };
        if glitch == 0 && caps.num_cap(CapName::new(*b"ug")).unwrap_or(0) > 0
        {
            return Err(SetupError::UnderlineWithoutStandout);
        }

        // String capabilities.
        for binding in TCAPS {
            let name = CapName::new(binding.name);
            let Some(value) = caps.string_cap(name) else {
                continue;
            };
            let Some(rep) = binding.rep[glitch] else {
                return Err(SetupError::Unsupported(name));
            };
            install(&mut table, name, &value, binding.action, rep)?;
        }

        // Home differs from cursor-motion-to-origin? Bind it.
        if let Some(ho) = caps.string_cap(CapName::new(*b"ho")) {
            let origin = caps
                .string_cap(CapName::new(*b"cm"))
                .and_then(|cm| tgoto_home(&cm));
            if origin.as_deref() != Some(&ho[..]) {
                install(
                    &mut table,
                    CapName::new(*b"ho"),
                    &ho,
                    Action::Fmt,
                    ANSI_HOME,
                )?;
            }
        }

        // Cursor-left not already covered by backspace or `bc`?
        if let Some(le) = caps.string_cap(CapName::new(*b"le")) {
            let bs_covers = caps.flag_cap(CapName::new(*b"bs"))
                && le == b"\x08";
            let bc_covers =
                caps.string_cap(CapName::new(*b"bc")).as_deref()
                    == Some(&le[..]);
            if !bs_covers && !bc_covers {
                install(
                    &mut table,
                    CapName::new(*b"le"),
                    &le,
                    Action::Fmt,
                    ANSI_LEFT,
                )?;
            }
        }

        // Scroll-forward distinct from newline and cursor-down?
        if let Some(sf) = caps.string_cap(CapName::new(*b"sf")) {
            let do_covers =
                caps.string_cap(CapName::new(*b"do")).as_deref()
                    == Some(&sf[..]);
            if sf != b"\n" && !do_covers {
                install(
                    &mut table,
                    CapName::new(*b"sf"),
                    &sf,
                    Action::Fmt,
                    ANSI_SCROLL_UP,
                )?;
            }
        }

        // Bold distinct from inverse?
        if let Some(md) = caps.string_cap(CapName::new(*b"md")) {
            let mr_covers =
                caps.string_cap(CapName::new(*b"mr")).as_deref()
                    == Some(&md[..]);
            if !mr_covers {
                let rep = if glitch == 1 {
                    concat!("\x1b[1m", "«")
                } else {
                    ANSI_BOLD
                };
                install(
                    &mut table,
                    CapName::new(*b"md"),
                    &md,
                    Action::Fmt,
                    rep,
                )?;
            }
        }

        // Standout distinct from all of bold, inverse, underline?
        if let Some(so) = caps.string_cap(CapName::new(*b"so")) {
            let covered = [*b"md", *b"mr", *b"us"].iter().any(|other| {
                caps.string_cap(CapName::new(*other)).as_deref()
                    == Some(&so[..])
            });
            if !covered {
                let rep = if glitch == 1 {
                    concat!("\x1b[7m", "«")
                } else {
                    ANSI_INVERSE
                };
                install(
                    &mut table,
                    CapName::new(*b"so"),
                    &so,
                    Action::Fmt,
                    rep,
                )?;
            }
        }

        // Arrow keys, for the input remapping path.
        let mut arrows: [Vec<u8>; 4] = Default::default();
        for (slot, name) in arrows.iter_mut().zip(ARROW_CAPS) {
            if let Some(value) = caps.string_cap(CapName::new(name)) {
                *slot = value;
            }
        }

        let profile = TermProfile {
            name: term.to_string(),
            table,
            cols,
            lines,
            auto_margins,
            hazeltine,
            arrows,
        };
        tracing::debug!(
            term,
            cols,
            lines,
            auto_margins,
            hazeltine,
            "terminal type loaded"
        );
        tracing::trace!("parse table:\r\n{}", dump::render(&profile.table));
        Ok(profile)
    }

    /// The geometry and quirks the translator needs.
    #[must_use]
    pub fn screen(&self) -> Screen {
        Screen {
            lines: i32::from(self.lines),
            cols: i32::from(self.cols),
            hazeltine: self.hazeltine,
        }
    }

    /// A fresh translation cursor over this profile's table.
    #[must_use]
    pub fn translator(&self) -> Translator<'_> {
        Translator::new(&self.table, self.screen())
    }
}

fn install(
    table: &mut ParseTable,
    name: CapName,
    value: &[u8],
    action: Action,
    rep: &'static str,
) -> Result<(), SetupError> {
    table
        .install(name, value, action, rep)
        .map_err(|source| SetupError::Cap { name, source })
}

/// The byte string `cm` would produce for row 0, column 0, computed
/// without the `up`/`le` shortcuts a real tgoto may take. `\200`
/// stands in for NUL so the result remains a C-style string.
fn tgoto_home(fmt: &[u8]) -> Option<Vec<u8>> {
    let mut out = Vec::new();
    let mut a1: u32 = 0;
    let mut a2: u32 = 0;
    let mut bytes = fmt.iter().copied().peekable();

    while let Some(c) = bytes.next() {
        if c != b'%' || bytes.peek() == Some(&b'%') {
            out.push(c);
            if c == b'%' {
                bytes.next();
            }
            continue;
        }

        match bytes.next() {
            Some(b'+') => {
                a1 += u32::from(bytes.next()?);
                #[allow(clippy::cast_possible_truncation)]
                out.push(if a1 == 0 { 0o200 } else { a1 as u8 });
            }
            Some(b'.') => {
                #[allow(clippy::cast_possible_truncation)]
                out.push(if a1 == 0 { 0o200 } else { a1 as u8 });
            }
            Some(b'2') => out.extend_from_slice(format!("{a1:02}").as_bytes()),
            Some(b'3') => out.extend_from_slice(format!("{a1:03}").as_bytes()),
            Some(b'd') => out.extend_from_slice(format!("{a1}").as_bytes()),
            Some(b'i') => {
                a1 += 1;
                a2 += 1;
                continue;
            }
            Some(b'r') => {
                std::mem::swap(&mut a1, &mut a2);
                continue;
            }
            _ => return None, // truncated or unknown format
        }

        a1 = a2; // next argument becomes current
    }

    Some(out)
}
