//! Access to the system termcap database.
//!
//! This is a thin, safe façade over the classic `tgetent`/`tgetstr`/
//! `tgetnum`/`tgetflag` API exposed by the system terminfo library.
//! It is intentionally very bare bones and only implements the subset
//! of termcap functionality the emulator needs: looking up one entry
//! and fetching capabilities from it.
//!
//! The C library keeps the looked-up entry in process-global state, so
//! an [`Entry`] holds a process-wide lock for as long as it is alive.

#![warn(clippy::pedantic)]

use std::ffi::CStr;
use std::fmt;
use std::sync::{Mutex, MutexGuard};

/// Size of the buffer handed to `tgetent`, per the termcap contract.
const TBUF_SIZE: usize = 2048;

/// Private module exposing the system termcap ffi.
mod sys {
    use libc::{c_char, c_int};

    unsafe extern "C" {
        /// Looks up the termcap entry for `name`, filling `bp`.
        /// Returns 1 on success, 0 if the terminal is unknown, and a
        /// negative value if no termcap database could be opened.
        pub fn tgetent(bp: *mut c_char, name: *const c_char) -> c_int;

        /// Fetches a string capability identified by the first two
        /// characters of `id`. A null return means not present.
        pub fn tgetstr(
            id: *const c_char,
            area: *mut *mut c_char,
        ) -> *mut c_char;

        /// Fetches a numeric capability. `-1` means not present.
        pub fn tgetnum(id: *const c_char) -> c_int;

        /// Checks for the presence of a boolean capability.
        pub fn tgetflag(id: *const c_char) -> c_int;
    }
}

/// The two-letter name of a termcap capability.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CapName(pub [u8; 2]);

impl CapName {
    #[must_use]
    pub const fn new(name: [u8; 2]) -> Self {
        Self(name)
    }

    /// The name as a nul-terminated buffer suitable for the C API.
    #[allow(clippy::cast_possible_wrap)]
    fn to_c(self) -> [libc::c_char; 3] {
        let [a, b] = self.0;
        [a as libc::c_char, b as libc::c_char, 0]
    }
}

impl fmt::Display for CapName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for b in self.0 {
            if b.is_ascii_graphic() {
                write!(f, "{}", b as char)?;
            } else {
                write!(f, "\\{b:03o}")?;
            }
        }
        Ok(())
    }
}

impl From<[u8; 2]> for CapName {
    fn from(name: [u8; 2]) -> Self {
        Self(name)
    }
}

/// Error looking up a terminal entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CapError {
    /// The termcap database itself could not be found or opened.
    NoDatabase,
    /// The terminal type is not present in the database.
    UnknownTerminal(String),
    /// The terminal name contains an interior nul byte.
    BadName(String),
}

impl fmt::Display for CapError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CapError::NoDatabase => {
                write!(f, "No termcap file found, try setting TERMPATH")
            }
            CapError::UnknownTerminal(term) => {
                write!(
                    f,
                    "Terminal type '{term}' not found in termcap database"
                )
            }
            CapError::BadName(term) => {
                write!(f, "'{term}' is not a valid terminal type name")
            }
        }
    }
}

impl std::error::Error for CapError {}

/// A source of termcap capabilities.
///
/// [`Entry`] implements this against the live database; tests implement
/// it with in-memory maps. String values are returned with any leading
/// padding specifier already stripped.
pub trait Caps {
    /// Fetch a string capability, stripped of padding.
    fn string_cap(&self, name: CapName) -> Option<Vec<u8>>;

    /// Fetch a numeric capability.
    fn num_cap(&self, name: CapName) -> Option<i32>;

    /// Check a boolean capability.
    fn flag_cap(&self, name: CapName) -> bool;
}

/// Serializes access to the C library's process-global entry state.
static TERMCAP_LOCK: Mutex<()> = Mutex::new(());

/// One looked-up termcap entry.
///
/// Holds the global termcap lock; keep it alive only as long as
/// capability lookups are needed.
pub struct Entry {
    raw: Vec<u8>,
    _lock: MutexGuard<'static, ()>,
}

impl Entry {
    /// Look up the termcap entry for `term`.
    ///
    /// # Errors
    ///
    /// Returns [`CapError::NoDatabase`] when no termcap database is
    /// reachable and [`CapError::UnknownTerminal`] when the type is not
    /// listed in it.
    pub fn open(term: &str) -> Result<Entry, CapError> {
        if term.as_bytes().contains(&0) {
            return Err(CapError::BadName(term.to_string()));
        }
        let lock = TERMCAP_LOCK.lock().expect("termcap lock poisoned");

        let mut name: Vec<u8> = term.as_bytes().to_vec();
        name.push(0);
        let mut tbuf = vec![0u8; TBUF_SIZE];

        let rv = unsafe {
            sys::tgetent(
                tbuf.as_mut_ptr().cast::<libc::c_char>(),
                name.as_ptr().cast::<libc::c_char>(),
            )
        };
        match rv {
            rv if rv < 0 => Err(CapError::NoDatabase),
            0 => Err(CapError::UnknownTerminal(term.to_string())),
            _ => {
                let end =
                    tbuf.iter().position(|&b| b == 0).unwrap_or(tbuf.len());
                tbuf.truncate(end);
                tracing::debug!(term, entry_len = tbuf.len(), "tgetent ok");
                Ok(Entry {
                    raw: tbuf,
                    _lock: lock,
                })
            }
        }
    }

    /// The raw entry text as returned by `tgetent`.
    #[must_use]
    pub fn raw(&self) -> &[u8] {
        &self.raw
    }
}

impl Caps for Entry {
    fn string_cap(&self, name: CapName) -> Option<Vec<u8>> {
        let id = name.to_c();
        let ptr = unsafe { sys::tgetstr(id.as_ptr(), std::ptr::null_mut()) };
        if ptr.is_null() {
            return None;
        }
        // termcap forbids raw nul inside terminal sequences, so the
        // terminating nul is the end of the value.
        let value = unsafe { CStr::from_ptr(ptr) }.to_bytes();
        Some(strip_padding(value).to_vec())
    }

    fn num_cap(&self, name: CapName) -> Option<i32> {
        let id = name.to_c();
        match unsafe { sys::tgetnum(id.as_ptr()) } {
            -1 => None,
            n => Some(n),
        }
    }

    fn flag_cap(&self, name: CapName) -> bool {
        let id = name.to_c();
        unsafe { sys::tgetflag(id.as_ptr()) != 0 }
    }
}

/// Skip the padding specifier that may prefix a string capability:
/// digits, an optional `.` with at most one fractional digit, and an
/// optional `*` for per-line padding.
#[must_use]
pub fn strip_padding(value: &[u8]) -> &[u8] {
    let mut rest = value;
    if !rest.first().is_some_and(u8::is_ascii_digit) {
        return value;
    }
    while rest.first().is_some_and(u8::is_ascii_digit) {
        rest = &rest[1..];
    }
    if rest.first() == Some(&b'.') {
        rest = &rest[1..];
        if rest.first().is_some_and(u8::is_ascii_digit) {
            rest = &rest[1..];
        }
    }
    if rest.first() == Some(&b'*') {
        rest = &rest[1..];
    }
    rest
}
