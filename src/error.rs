use std::{error, fmt, result};

/// Short form to compose Error values.
///
/// Here are few possible ways:
///
/// ```ignore
/// use crate::Error;
/// err_at!(ResourceFail, msg: "limit {}", limit)
/// ```
///
/// ```ignore
/// use crate::Error;
/// err_at!(IOError, fd.read(buf))
/// ```
///
/// ```ignore
/// use crate::Error;
/// err_at!(IOError, fd.read(buf), "temp-block read failed")
/// ```
#[macro_export]
macro_rules! err_at {
    ($v:ident, msg: $($arg:expr),+) => {{
        let prefix = format!("{}:{}", file!(), line!());
        Err($crate::Error::$v(prefix, format!($($arg),+)))
    }};
    ($v:ident, $e:expr) => {{
        match $e {
            Ok(val) => Ok(val),
            Err(err) => {
                let prefix = format!("{}:{}", file!(), line!());
                Err($crate::Error::$v(prefix, format!("{}", err)))
            }
        }
    }};
    ($v:ident, $e:expr, $($arg:expr),+) => {{
        match $e {
            Ok(val) => Ok(val),
            Err(err) => {
                let prefix = format!("{}:{}", file!(), line!());
                let msg = format!($($arg),+);
                Err($crate::Error::$v(prefix, format!("{} {}", err, msg)))
            }
        }
    }};
}

/// Error variants that can be returned by this package's API.
///
/// Each variant carries a prefix, typically identifying the error
/// location, and a message describing the error condition.
#[derive(Clone, Debug, PartialEq)]
pub enum Error {
    /// Internal invariant violated, non-recoverable.
    Fatal(String, String),
    /// Malformed plan JSON, wire tuple or recovery message.
    DecodeFail(String, String),
    /// Numeric value too large for the destination type.
    Overflow(String, String),
    /// Numeric value too small for the destination type.
    Underflow(String, String),
    /// Variable-length value longer than the declared column width.
    WidthMismatch(String, String),
    /// Unique-index collision, partition mismatch or null-in-not-null.
    ConstraintFail(String, String),
    /// Temp-table memory limit or similar resource budget exceeded.
    ResourceFail(String, String),
    /// Cooperative cancellation observed at a loop boundary.
    Interrupted(String, String),
    /// Caller supplied an argument outside this API's contract.
    InvalidInput(String, String),
    /// Conversion between rust types failed.
    FailConvert(String, String),
    /// Error from std::io APIs.
    IOError(String, String),
    /// Key is missing from the index.
    KeyAbsent(String, String),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter) -> result::Result<(), fmt::Error> {
        use Error::*;

        match self {
            Fatal(p, m) => write!(f, "Fatal:{} {}", p, m),
            DecodeFail(p, m) => write!(f, "DecodeFail:{} {}", p, m),
            Overflow(p, m) => write!(f, "Overflow:{} {}", p, m),
            Underflow(p, m) => write!(f, "Underflow:{} {}", p, m),
            WidthMismatch(p, m) => write!(f, "WidthMismatch:{} {}", p, m),
            ConstraintFail(p, m) => write!(f, "ConstraintFail:{} {}", p, m),
            ResourceFail(p, m) => write!(f, "ResourceFail:{} {}", p, m),
            Interrupted(p, m) => write!(f, "Interrupted:{} {}", p, m),
            InvalidInput(p, m) => write!(f, "InvalidInput:{} {}", p, m),
            FailConvert(p, m) => write!(f, "FailConvert:{} {}", p, m),
            IOError(p, m) => write!(f, "IOError:{} {}", p, m),
            KeyAbsent(p, m) => write!(f, "KeyAbsent:{} {}", p, m),
        }
    }
}

impl error::Error for Error {}

impl Error {
    /// Wire code written into the exception buffer. Zero is reserved
    /// for "no error".
    pub fn code(&self) -> i32 {
        use Error::*;

        match self {
            DecodeFail(_, _) => 2,
            Overflow(_, _) | Underflow(_, _) | WidthMismatch(_, _) => 3,
            ConstraintFail(_, _) => 4,
            ResourceFail(_, _) => 5,
            Interrupted(_, _) => 6,
            IOError(_, _) => 7,
            Fatal(_, _) | InvalidInput(_, _) | FailConvert(_, _) | KeyAbsent(_, _) => 1,
        }
    }

    /// Whether this error came from a numeric/width cast. Index-scan
    /// key setup consumes these and adjusts the scan instead of
    /// unwinding, refer to the index-scan executor.
    pub fn is_cast_failure(&self) -> bool {
        matches!(
            self,
            Error::Overflow(_, _) | Error::Underflow(_, _) | Error::WidthMismatch(_, _)
        )
    }
}
