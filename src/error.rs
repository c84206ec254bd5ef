pub use failure::{Backtrace, Context, Fail};
use std::error::Error as StdError;
use std::fmt::{self, Display};

/// Placeholder for when we have no description for an error
const NO_DESCRIPTION: &str = "(no description)";

/// Error types used by this library
#[derive(Debug)]
pub struct Error<T>
where
    T: Copy + Display + Fail + PartialEq + Eq,
{
    inner: Context<T>,
    description: Option<String>,
}

impl<T> Error<T>
where
    T: Copy + Display + Fail + PartialEq + Eq,
{
    /// Create a new error type from its kind
    pub fn new(kind: T, description: Option<String>) -> Self {
        Self {
            inner: Context::new(kind),
            description,
        }
    }

    /// Obtain the error's `Kind`
    pub fn kind(&self) -> T {
        *self.inner.get_context()
    }
}

impl<T> Display for Error<T>
where
    T: Copy + Display + Fail + PartialEq + Eq,
{
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self.description {
            None => Display::fmt(&self.inner, f),
            Some(ref desc) => if desc == NO_DESCRIPTION {
                Display::fmt(&self.inner, f)
            } else {
                write!(f, "{}: {}", &self.inner, desc)
            },
        }
    }
}

impl<T> StdError for Error<T>
where
    T: Copy + Display + Fail + PartialEq + Eq,
{
    /// Obtain the error's description
    fn description(&self) -> &str {
        match self.description {
            Some(ref s) => s,
            None => NO_DESCRIPTION,
        }
    }
}

/// Errors reported by the card or the SAM through a response status word
pub type ProtocolError = Error<ProtocolErrorKind>;

/// Kinds of errors reported by the card or the SAM.
///
/// Every command owns a status-word table mapping each expected SW to one
/// of these kinds; the table entry's message plus the command name and the
/// raw SW are carried in the error description.
#[derive(Copy, Clone, Eq, PartialEq, Debug, Fail)]
pub enum ProtocolErrorKind {
    /// A parameter of the command (CLA, INS, P1/P2, Lc) was rejected
    #[fail(display = "illegal parameter")]
    IllegalParameter,

    /// The addressed file, record or counter does not exist or has the
    /// wrong type for the command
    #[fail(display = "data access error")]
    DataAccess,

    /// Access conditions not fulfilled (e.g. no secure session open)
    #[fail(display = "access forbidden")]
    AccessForbidden,

    /// Security context of the command refused (wrong key, no session)
    #[fail(display = "security context refused")]
    SecurityContext,

    /// Security data (MAC, cryptogram) refused by the card or the SAM
    #[fail(display = "security data refused")]
    SecurityData,

    /// The session modifications buffer is exhausted
    #[fail(display = "session buffer overflow")]
    SessionBufferOverflow,

    /// The card terminated the command (DF invalidated, busy)
    #[fail(display = "command terminated by the card")]
    Terminated,

    /// PIN presentation refused
    #[fail(display = "PIN refused (blocked: {})", blocked)]
    Pin {
        /// The presentation counter reached zero and the PIN is blocked
        blocked: bool,
    },

    /// Status word absent from the command's status table
    #[fail(display = "unknown status word 0x{:04x}", sw)]
    UnknownStatus {
        /// The unexpected status word
        sw: u16,
    },

    /// The response data length does not match the expected `Le`
    #[fail(display = "unexpected response length")]
    UnexpectedResponseLength,

    /// A value decoded from a response lies outside its legal range
    #[fail(display = "data out of bounds")]
    DataOutOfBounds,

    /// A value passed to a command encoder lies outside its legal range
    #[fail(display = "illegal argument")]
    IllegalArgument,
}

/// Create a new error (of a given kind) with a formatted message
macro_rules! err {
    ($kind:expr, $msg:expr) => {
        ::error::Error::new($kind, Some($msg.to_string()))
    };
    ($kind:expr, $fmt:expr, $($arg:tt)+) => {
        err!($kind, &format!($fmt, $($arg)+))
    };
}

/// Create and return an error with a formatted message
macro_rules! fail {
    ($kind:expr, $msg:expr) => {
        return Err(err!($kind, $msg).into())
    };
    ($kind:expr, $fmt:expr, $($arg:tt)+) => {
        fail!($kind, &format!($fmt, $($arg)+))
    };
}

/// Assert a condition is true, returning an error type with a formatted message if not
macro_rules! ensure {
    ($cond:expr, $kind:expr, $msg:expr) => {
        if !($cond) {
            return Err(err!($kind, $msg).into());
        }
    };
    ($cond:expr, $kind:expr, $fmt:expr, $($arg:tt)+) => {
        if !($cond) {
            return Err(err!($kind, $fmt, $($arg)+).into());
        }
    };
}
