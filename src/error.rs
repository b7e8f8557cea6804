/// A malformed If header. Grammar and semantic violations carry enough
/// context to name the offending token and the one that was expected.
#[derive(Debug, PartialEq)]
pub enum HeaderError {
    Unexpected {
        saw: String,
        expected: &'static str,
    },
    MissingResourceUri,
    UnterminatedQuote,
    EmptyHeader,
    EmptyTerm,
    EmptyCondition,
    DuplicateFactor(String),
    DuplicateResource(String),
}
impl std::fmt::Display for HeaderError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Unexpected { saw, expected } => {
                write!(f, "error parsing If header: saw: {} expected: {}", saw, expected)
            }
            Self::MissingResourceUri => {
                write!(f, "error parsing If header: missing resource URI after <")
            }
            Self::UnterminatedQuote => {
                write!(f, "error parsing If header: unterminated quoted string")
            }
            Self::EmptyHeader => write!(f, "error parsing If header: list is empty"),
            Self::EmptyTerm => {
                write!(f, "error parsing If header: missing state token or entity tag")
            }
            Self::EmptyCondition => {
                write!(f, "a condition must hold at least one term")
            }
            Self::DuplicateFactor(factor) => {
                write!(f, "error parsing If header: duplicate entry in list: {}", factor)
            }
            Self::DuplicateResource(uri) => {
                write!(f, "{} cannot be specified more than once in an If header", uri)
            }
        }
    }
}
impl std::error::Error for HeaderError {}

/// A property name that does not follow the WebDAV naming rules.
#[derive(Debug, PartialEq)]
pub enum NameError {
    MissingDavPrefix(String),
    SeparatorInLocalName(String),
}
impl std::fmt::Display for NameError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::MissingDavPrefix(name) => write!(f, "property name lacks DAV: prefix: {}", name),
            Self::SeparatorInLocalName(name) => {
                write!(f, "local property name contains ':': {}", name)
            }
        }
    }
}
impl std::error::Error for NameError {}

/// A malformed multistatus / lock-discovery document, or any fault
/// encountered while reading or writing the XML wire form.
#[derive(Debug)]
pub enum ParsingError {
    Recoverable,
    MissingChild,
    WrongToken,
    InvalidValue,
    DuplicateProperty,
    DuplicateHref,
    Utf8Error(std::str::Utf8Error),
    QuickXml(quick_xml::Error),
    Int(std::num::ParseIntError),
    Eof,
}
impl std::fmt::Display for ParsingError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Recoverable => write!(f, "Recoverable"),
            Self::MissingChild => write!(f, "Missing child"),
            Self::WrongToken => write!(f, "Wrong token"),
            Self::InvalidValue => write!(f, "Invalid value"),
            Self::DuplicateProperty => write!(f, "Duplicate property in a response"),
            Self::DuplicateHref => write!(f, "Duplicate href in a response"),
            Self::Utf8Error(_) => write!(f, "Utf8 error"),
            Self::QuickXml(_) => write!(f, "Quick XML error"),
            Self::Int(_) => write!(f, "Number parsing error"),
            Self::Eof => write!(f, "Found EOF while expecting data"),
        }
    }
}
impl std::error::Error for ParsingError {}
impl From<quick_xml::Error> for ParsingError {
    fn from(value: quick_xml::Error) -> Self {
        Self::QuickXml(value)
    }
}
impl From<quick_xml::events::attributes::AttrError> for ParsingError {
    fn from(value: quick_xml::events::attributes::AttrError) -> Self {
        Self::QuickXml(value.into())
    }
}
impl From<std::str::Utf8Error> for ParsingError {
    fn from(value: std::str::Utf8Error) -> Self {
        Self::Utf8Error(value)
    }
}
impl From<std::num::ParseIntError> for ParsingError {
    fn from(value: std::num::ParseIntError) -> Self {
        Self::Int(value)
    }
}

/// Why `MultiStatus::active_lock_for` could not look for a lock.
#[derive(Debug, PartialEq)]
pub enum LockDiscoveryError {
    /// The lock method failed, lock information is not trustworthy.
    NotOk,
    /// The first response is not a property response.
    NoPropertyResponse,
    /// The first property response carries no lockdiscovery property.
    NoLockDiscovery,
}
impl std::fmt::Display for LockDiscoveryError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::NotOk => write!(f, "can't access lock information, lock method failed"),
            Self::NoPropertyResponse => {
                write!(f, "multistatus doesn't contain a property response")
            }
            Self::NoLockDiscovery => {
                write!(f, "property response doesn't contain a lockdiscovery property")
            }
        }
    }
}
impl std::error::Error for LockDiscoveryError {}
