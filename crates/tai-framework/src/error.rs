use std::borrow::Cow;

use tracing::{debug, error, warn};

// Base of the per-attribute "not supported" code range.
const ATTR_NOT_SUPPORTED_BASE: i32 = 0x0005_0000;
// Base of the per-attribute "invalid value" code range.
const INVALID_ATTR_VALUE_BASE: i32 = 0x0002_0000;
// Width of a per-attribute code range.
const ATTR_RANGE: usize = 0xFFFF;

/// All possible error kinds.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum ErrorKind {
    /// The attribute is not part of the object schema.
    NotSupported,
    /// The value was rejected, or a read-only attribute was written.
    InvalidValue,
    /// A mandatory creation attribute is absent.
    MandatoryMissing,
    /// The object or device location is already registered.
    AlreadyExists,
    /// The object is not registered.
    NotFound,
    /// The object still has live children.
    InUse,
    /// The attribute has no value and no default.
    Uninitialized,
    /// The caller-provided list is too small.
    BufferOverflow,
    /// A payload could not be allocated.
    NoMemory,
    /// A creation parameter is out of range.
    InvalidParameter,
    /// The object identifier has an unexpected type.
    InvalidObjectId,
    /// A hook declined to act; treated as success by the attribute store.
    NotExecuted,
    /// Internal failure.
    Failure,
}

impl ErrorKind {
    pub(crate) const fn description(self) -> &'static str {
        match self {
            Self::NotSupported => "Not Supported",
            Self::InvalidValue => "Invalid Value",
            Self::MandatoryMissing => "Mandatory Attribute Missing",
            Self::AlreadyExists => "Item Already Exists",
            Self::NotFound => "Item Not Found",
            Self::InUse => "Object In Use",
            Self::Uninitialized => "Uninitialized",
            Self::BufferOverflow => "Buffer Overflow",
            Self::NoMemory => "No Memory",
            Self::InvalidParameter => "Invalid Parameter",
            Self::InvalidObjectId => "Invalid Object Id",
            Self::NotExecuted => "Not Executed",
            Self::Failure => "Failure",
        }
    }

    const fn code(self) -> i32 {
        match self {
            Self::Failure => -0x0001,
            Self::NotSupported => -0x0002,
            Self::NoMemory => -0x0003,
            Self::BufferOverflow => -0x0006,
            Self::InvalidParameter => -0x0005,
            Self::MandatoryMissing => -0x000C,
            Self::AlreadyExists => -0x0008,
            Self::NotFound => -0x0009,
            Self::InUse => -0x000B,
            Self::Uninitialized => -0x000E,
            Self::InvalidObjectId => -0x0011,
            Self::NotExecuted => -0x0015,
            Self::InvalidValue => -0x0012,
        }
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.description().fmt(f)
    }
}

/// A framework error.
///
/// Errors raised while processing a batch of attributes carry the position
/// of the offending attribute in the caller's list.
#[derive(Clone, PartialEq)]
pub struct Error {
    kind: ErrorKind,
    description: Cow<'static, str>,
    index: Option<usize>,
}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.format(f)
    }
}

impl std::fmt::Debug for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.format(f)
    }
}

impl Error {
    /// Creates an [`Error`] from an [`ErrorKind`] and a description.
    ///
    /// Rejected attributes are logged as warnings, unset values and short
    /// lists only at debug level.
    #[inline]
    pub fn new(kind: ErrorKind, description: impl Into<Cow<'static, str>>) -> Self {
        let description = description.into();
        match kind {
            ErrorKind::NotExecuted => {}
            ErrorKind::Uninitialized | ErrorKind::BufferOverflow => {
                debug!("{}", description.as_ref());
            }
            ErrorKind::NotSupported | ErrorKind::InvalidValue => {
                warn!("{}", description.as_ref());
            }
            _ => error!("{}", description.as_ref()),
        }
        Self {
            kind,
            description,
            index: None,
        }
    }

    // Error handed over to a fallback hook, which may still resolve it.
    pub(crate) fn unlogged(kind: ErrorKind, description: impl Into<Cow<'static, str>>) -> Self {
        Self {
            kind,
            description: description.into(),
            index: None,
        }
    }

    /// Attaches the position of the offending attribute.
    #[must_use]
    #[inline]
    pub fn at(mut self, index: usize) -> Self {
        self.index = Some(index);
        self
    }

    /// Returns the [`ErrorKind`].
    #[must_use]
    pub const fn kind(&self) -> ErrorKind {
        self.kind
    }

    /// Returns the position of the offending attribute, if any.
    #[must_use]
    pub const fn index(&self) -> Option<usize> {
        self.index
    }

    /// Returns the error description.
    #[must_use]
    pub fn description(&self) -> &str {
        &self.description
    }

    /// Returns the numeric status code.
    ///
    /// Attribute errors fold the attribute position into their range, so a
    /// caller can map a batch failure back to the offending entry.
    #[must_use]
    pub fn code(&self) -> i32 {
        let base = match self.kind {
            ErrorKind::NotSupported => ATTR_NOT_SUPPORTED_BASE,
            ErrorKind::InvalidValue => INVALID_ATTR_VALUE_BASE,
            kind => return kind.code(),
        };
        match self.index {
            #[allow(clippy::cast_possible_truncation, clippy::cast_possible_wrap)]
            Some(index) => -(base + index.min(ATTR_RANGE) as i32),
            None => self.kind.code(),
        }
    }

    fn format(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.kind, self.description)?;
        if let Some(index) = self.index {
            write!(f, " (attribute #{index})")?;
        }
        Ok(())
    }
}

impl From<tai::error::Error> for Error {
    fn from(e: tai::error::Error) -> Self {
        let kind = match e.kind() {
            tai::error::ErrorKind::BufferOverflow => ErrorKind::BufferOverflow,
            tai::error::ErrorKind::NoMemory => ErrorKind::NoMemory,
            tai::error::ErrorKind::InvalidValue => ErrorKind::InvalidValue,
            tai::error::ErrorKind::NotSupported => ErrorKind::NotSupported,
            tai::error::ErrorKind::Serialization => ErrorKind::Failure,
        };
        Self::new(kind, e.description().to_owned())
    }
}

impl From<std::io::Error> for Error {
    fn from(e: std::io::Error) -> Self {
        Self::new(ErrorKind::Failure, e.to_string())
    }
}

impl std::error::Error for Error {}

/// A specialized [`Result`] type for [`Error`].
pub type Result<T> = std::result::Result<T, Error>;
