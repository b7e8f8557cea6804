use chrono::{DateTime, FixedOffset, Utc};

use super::error::{LockDiscoveryError, NameError, ParsingError};

/// RFC 2518 lockscope XML Element
///
/// ```xmlschema
/// <!ELEMENT lockscope (exclusive | shared) >
/// ```
#[derive(Debug, PartialEq, Clone)]
pub enum LockScope {
    Exclusive,
    Shared,
}
impl Default for LockScope {
    fn default() -> Self {
        Self::Exclusive
    }
}

/// RFC 2518 locktype XML Element
///
/// ```xmlschema
/// <!ELEMENT locktype (write) >
/// ```
#[derive(Debug, PartialEq, Clone)]
pub enum LockType {
    Write,
}
impl Default for LockType {
    fn default() -> Self {
        Self::Write
    }
}

/// RFC 2518 Depth header values applicable to a lock: a lock covers
/// either the resource alone or the resource and everything below it.
#[derive(Debug, PartialEq, Clone)]
pub enum Depth {
    Shallow,
    Deep,
}
impl Default for Depth {
    fn default() -> Self {
        Self::Deep
    }
}
impl std::fmt::Display for Depth {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Shallow => write!(f, "0"),
            Self::Deep => write!(f, "infinity"),
        }
    }
}
impl std::str::FromStr for Depth {
    type Err = ParsingError;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "0" => Ok(Self::Shallow),
            d if d.eq_ignore_ascii_case("infinity") => Ok(Self::Deep),
            _ => Err(ParsingError::InvalidValue),
        }
    }
}

/// RFC 2518 TimeType, the duration a lock is granted for.
#[derive(Debug, PartialEq, Clone)]
pub enum Timeout {
    Infinite,
    Seconds(u64),
}
impl Default for Timeout {
    fn default() -> Self {
        Self::Infinite
    }
}
impl Timeout {
    /// The instant a lock granted at `now` with this timeout lapses.
    /// A duration too large to represent behaves like no expiration;
    /// the value comes off the wire, it must never abort the client.
    pub fn expiration_from(&self, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
        match self {
            Self::Infinite => None,
            Self::Seconds(secs) => {
                let delta = i64::try_from(*secs)
                    .ok()
                    .and_then(chrono::Duration::try_seconds)?;
                now.checked_add_signed(delta)
            }
        }
    }
}
impl std::fmt::Display for Timeout {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Infinite => write!(f, "Infinite"),
            Self::Seconds(secs) => write!(f, "Second-{}", secs),
        }
    }
}
impl std::str::FromStr for Timeout {
    type Err = ParsingError;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if s.eq_ignore_ascii_case("Infinite") {
            return Ok(Self::Infinite);
        }
        match s.strip_prefix("Second-") {
            Some(secs) => Ok(Self::Seconds(secs.parse()?)),
            None => Err(ParsingError::InvalidValue),
        }
    }
}

/// RFC 2518 owner XML Element, the lock creator's self-description.
/// Servers echo it back verbatim; clients that sent structured content
/// get `Unknown` back from us since we only keep scalar owners.
#[derive(Debug, PartialEq, Clone)]
pub enum Owner {
    Txt(String),
    Href(Href),
    Unknown,
}

/// RFC 2518 href XML Element
///
/// ```xmlschema
/// <!ELEMENT href (#PCDATA)>
/// ```
#[derive(Debug, PartialEq, Clone)]
pub struct Href(pub String);

/// RFC 2518 locktoken XML Element
///
/// ```xmlschema
/// <!ELEMENT locktoken (href+) >
/// ```
#[derive(Debug, PartialEq, Clone)]
pub struct LockToken(pub Href);

/// The authenticated principal a lock was granted to. Not part of the
/// RFC 2518 DTD, some servers include it in activelock to let clients
/// tell their own locks apart.
#[derive(Debug, PartialEq, Clone)]
pub struct Principal(pub String);

/// RFC 2518 responsedescription XML Element
#[derive(Debug, PartialEq, Clone)]
pub struct ResponseDescription(pub String);

/// A status code as carried by status XML elements, e.g.
/// `HTTP/1.1 200 OK`.
#[derive(Debug, PartialEq, Clone, Copy)]
pub struct Status(pub http::StatusCode);
impl Status {
    /// Informational and success classes count as ok.
    pub fn is_ok(&self) -> bool {
        self.0.as_u16() < 300
    }
}

/// RFC 2518 activelock XML Element, one granted lock on a resource.
///
/// The expiration instant is derived from the timeout whenever the
/// timeout is set, it never comes off the wire.
#[derive(Debug, Clone)]
pub struct ActiveLock {
    scope: LockScope,
    lock_type: LockType,
    depth: Depth,
    timeout: Timeout,
    expiration: Option<DateTime<Utc>>,
    owner: Option<Owner>,
    lock_token: Option<String>,
    principal: Option<String>,
}
impl Default for ActiveLock {
    fn default() -> Self {
        Self {
            scope: LockScope::default(),
            lock_type: LockType::default(),
            depth: Depth::default(),
            timeout: Timeout::default(),
            expiration: None,
            owner: None,
            lock_token: None,
            principal: None,
        }
    }
}
impl ActiveLock {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn scope(&self) -> &LockScope {
        &self.scope
    }
    pub fn set_scope(&mut self, scope: LockScope) {
        self.scope = scope;
    }

    pub fn lock_type(&self) -> &LockType {
        &self.lock_type
    }
    pub fn set_lock_type(&mut self, lock_type: LockType) {
        self.lock_type = lock_type;
    }

    pub fn depth(&self) -> &Depth {
        &self.depth
    }
    pub fn set_depth(&mut self, depth: Depth) {
        self.depth = depth;
    }

    pub fn timeout(&self) -> &Timeout {
        &self.timeout
    }

    /// Setting the timeout recomputes the expiration instant from the
    /// current time, so a decoded lock is never stale.
    pub fn set_timeout(&mut self, timeout: Timeout) {
        self.expiration = timeout.expiration_from(Utc::now());
        self.timeout = timeout;
    }

    pub fn expiration(&self) -> Option<DateTime<Utc>> {
        self.expiration
    }

    pub fn owner(&self) -> Option<&Owner> {
        self.owner.as_ref()
    }
    pub fn set_owner(&mut self, owner: Owner) {
        self.owner = Some(owner);
    }

    pub fn lock_token(&self) -> Option<&str> {
        self.lock_token.as_deref()
    }
    pub fn set_lock_token(&mut self, token: impl Into<String>) {
        self.lock_token = Some(token.into());
    }

    pub fn principal(&self) -> Option<&str> {
        self.principal.as_deref()
    }
    pub fn set_principal(&mut self, principal: impl Into<String>) {
        self.principal = Some(principal.into());
    }
}
/// Expiration is excluded: two locks decoded from the same document at
/// different instants still compare equal.
impl PartialEq for ActiveLock {
    fn eq(&self, other: &Self) -> bool {
        self.scope == other.scope
            && self.lock_type == other.lock_type
            && self.depth == other.depth
            && self.timeout == other.timeout
            && self.owner == other.owner
            && self.lock_token == other.lock_token
            && self.principal == other.principal
    }
}

/// A WebDAV property name, a namespace plus a local name.
///
/// Properties in the DAV: namespace concatenate to names like
/// `DAV:getetag`; other namespaces join with a `:` separator.
#[derive(Debug, PartialEq, Eq, Hash, Clone)]
pub struct PropertyName {
    ns: String,
    local: String,
}
impl PropertyName {
    pub fn new(ns: &str, local: &str) -> Result<Self, NameError> {
        if local.contains(':') {
            return Err(NameError::SeparatorInLocalName(local.into()));
        }
        Ok(Self {
            ns: ns.into(),
            local: local.into(),
        })
    }

    /// A name in the DAV: namespace. `local` must not contain `:`.
    pub fn dav(local: &str) -> Self {
        debug_assert!(!local.contains(':'), "local name contains ':'");
        Self {
            ns: super::xml::DAV_URN.into(),
            local: local.into(),
        }
    }

    pub fn ns(&self) -> &str {
        &self.ns
    }
    pub fn local(&self) -> &str {
        &self.local
    }
}
impl std::fmt::Display for PropertyName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.ns.ends_with(':') {
            write!(f, "{}{}", self.ns, self.local)
        } else {
            write!(f, "{}:{}", self.ns, self.local)
        }
    }
}
impl std::str::FromStr for PropertyName {
    type Err = NameError;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.strip_prefix(super::xml::DAV_URN) {
            Some(local) => Self::new(super::xml::DAV_URN, local),
            None => Err(NameError::MissingDavPrefix(s.into())),
        }
    }
}

/// What a property element held. Generic XML content is out of scope:
/// lockdiscovery is decoded structurally, anything else keeps its
/// leading text or degrades to `Empty`.
#[derive(Debug, PartialEq, Clone)]
pub enum PropContent {
    Empty,
    Text(String),
    LockDiscovery(Vec<ActiveLock>),
}

/// One property as carried by a propstat: its content plus the status
/// the server reported for it.
#[derive(Debug, PartialEq, Clone)]
pub struct PropertyValue {
    pub content: PropContent,
    pub status: Status,
}
impl PropertyValue {
    pub fn ok(content: PropContent) -> Self {
        Self {
            content,
            status: Status(http::StatusCode::OK),
        }
    }
}

/// A response element carrying one status for one or more resources.
///
/// ```xmlschema
/// <!ELEMENT response (href, ((href*, status)|(propstat+)), responsedescription?) >
/// ```
/// This is the `(href*, status)` side.
#[derive(Debug, PartialEq, Clone)]
pub struct MethodResponse {
    resource: String,
    aliases: Vec<String>,
    status: Status,
    description: Option<String>,
}
impl MethodResponse {
    pub fn new(resource: impl Into<String>, status: Status) -> Self {
        Self {
            resource: resource.into(),
            aliases: Vec::new(),
            status,
            description: None,
        }
    }

    pub fn resource(&self) -> &str {
        &self.resource
    }

    /// Additional hrefs sharing this status. A URL may appear only once
    /// in a response.
    pub fn add_alias(&mut self, href: impl Into<String>) -> Result<(), ParsingError> {
        let href = href.into();
        if self.resource == href || self.aliases.contains(&href) {
            return Err(ParsingError::DuplicateHref);
        }
        self.aliases.push(href);
        Ok(())
    }
    pub fn aliases(&self) -> &[String] {
        &self.aliases
    }

    pub fn status(&self) -> Status {
        self.status
    }

    pub fn description(&self) -> Option<&str> {
        self.description.as_deref()
    }
    pub fn set_description(&mut self, description: impl Into<String>) {
        self.description = Some(description.into());
    }

    pub fn is_ok(&self) -> bool {
        self.status.is_ok()
    }
}

/// A response element carrying per-property statuses for one resource,
/// the `(propstat+)` side of the DTD. Properties keep their insertion
/// order; the propstat grouping only exists on the wire.
#[derive(Debug, PartialEq, Clone)]
pub struct PropertyResponse {
    resource: String,
    properties: Vec<(PropertyName, PropertyValue)>,
    description: Option<String>,
}
impl PropertyResponse {
    pub fn new(resource: impl Into<String>) -> Self {
        Self {
            resource: resource.into(),
            properties: Vec::new(),
            description: None,
        }
    }

    pub fn resource(&self) -> &str {
        &self.resource
    }

    /// A property name may appear only once in a response.
    pub fn add_property(
        &mut self,
        name: PropertyName,
        value: PropertyValue,
    ) -> Result<(), ParsingError> {
        if self.properties.iter().any(|(n, _)| *n == name) {
            return Err(ParsingError::DuplicateProperty);
        }
        self.properties.push((name, value));
        Ok(())
    }

    /// Insert or replace.
    pub fn set_property(&mut self, name: PropertyName, value: PropertyValue) {
        match self.properties.iter_mut().find(|(n, _)| *n == name) {
            Some((_, v)) => *v = value,
            None => self.properties.push((name, value)),
        }
    }

    pub fn remove_property(&mut self, name: &PropertyName) {
        self.properties.retain(|(n, _)| n != name);
    }

    pub fn property(&self, name: &PropertyName) -> Option<&PropertyValue> {
        self.properties
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, v)| v)
    }

    pub fn properties(&self) -> impl Iterator<Item = &(PropertyName, PropertyValue)> {
        self.properties.iter()
    }

    pub fn description(&self) -> Option<&str> {
        self.description.as_deref()
    }
    pub fn set_description(&mut self, description: impl Into<String>) {
        self.description = Some(description.into());
    }

    /// Ok when every property came back with a success status.
    pub fn is_ok(&self) -> bool {
        self.properties.iter().all(|(_, v)| v.status.is_ok())
    }

    fn text_property(&self, local: &str) -> Option<&str> {
        match self.property(&PropertyName::dav(local))?.content {
            PropContent::Text(ref s) => Some(s.as_str()),
            _ => None,
        }
    }

    /// DAV:creationdate, an RFC 3339 date. A malformed value is logged
    /// and reported as absent.
    pub fn creation_date(&self) -> Option<DateTime<FixedOffset>> {
        let raw = self.text_property("creationdate")?;
        match DateTime::parse_from_rfc3339(raw.trim()) {
            Ok(date) => Some(date),
            Err(_) => {
                tracing::warn!(value = raw, "malformed creationdate property");
                None
            }
        }
    }

    /// DAV:getlastmodified, an RFC 2822/1123 date. A malformed value is
    /// logged and reported as absent.
    pub fn last_modified(&self) -> Option<DateTime<FixedOffset>> {
        let raw = self.text_property("getlastmodified")?;
        match DateTime::parse_from_rfc2822(raw.trim()) {
            Ok(date) => Some(date),
            Err(_) => {
                tracing::warn!(value = raw, "malformed getlastmodified property");
                None
            }
        }
    }

    /// DAV:getcontentlength. A malformed value is logged and reported
    /// as absent.
    pub fn content_length(&self) -> Option<u64> {
        let raw = self.text_property("getcontentlength")?;
        match raw.trim().parse() {
            Ok(len) => Some(len),
            Err(_) => {
                tracing::warn!(value = raw, "malformed getcontentlength property");
                None
            }
        }
    }

    pub fn content_type(&self) -> Option<&str> {
        self.text_property("getcontenttype")
    }

    pub fn content_language(&self) -> Option<&str> {
        self.text_property("getcontentlanguage")
    }

    pub fn display_name(&self) -> Option<&str> {
        self.text_property("displayname")
    }

    pub fn etag(&self) -> Option<&str> {
        self.text_property("getetag")
    }

    /// The locks carried by the DAV:lockdiscovery property, if present.
    pub fn lock_discovery(&self) -> Option<&[ActiveLock]> {
        match self.property(&PropertyName::dav("lockdiscovery"))?.content {
            PropContent::LockDiscovery(ref locks) => Some(locks.as_slice()),
            _ => None,
        }
    }
}

/// RFC 2518 response XML Element, either side of the DTD alternative.
#[derive(Debug, PartialEq, Clone)]
pub enum Response {
    Method(MethodResponse),
    Property(PropertyResponse),
}
impl Response {
    pub fn resource(&self) -> &str {
        match self {
            Self::Method(m) => m.resource(),
            Self::Property(p) => p.resource(),
        }
    }

    pub fn description(&self) -> Option<&str> {
        match self {
            Self::Method(m) => m.description(),
            Self::Property(p) => p.description(),
        }
    }

    pub fn is_ok(&self) -> bool {
        match self {
            Self::Method(m) => m.is_ok(),
            Self::Property(p) => p.is_ok(),
        }
    }
}

/// RFC 2518 multistatus XML Element
///
/// ```xmlschema
/// <!ELEMENT multistatus (response+, responsedescription?) >
/// ```
#[derive(Debug, PartialEq, Clone, Default)]
pub struct MultiStatus {
    responses: Vec<Response>,
    description: Option<String>,
}
impl MultiStatus {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_response(&mut self, response: Response) {
        self.responses.push(response);
    }

    pub fn responses(&self) -> &[Response] {
        &self.responses
    }

    pub fn description(&self) -> Option<&str> {
        self.description.as_deref()
    }
    pub fn set_description(&mut self, description: impl Into<String>) {
        self.description = Some(description.into());
    }

    /// Append every response of `other`, keeping order.
    pub fn merge(&mut self, other: MultiStatus) {
        self.responses.extend(other.responses);
    }

    pub fn remove_response(&mut self, response: &Response) {
        self.responses.retain(|r| r != response);
    }

    /// Drop every response that reports success, keeping only failures
    /// worth surfacing.
    pub fn retain_errors(&mut self) {
        self.responses.retain(|r| !r.is_ok());
    }

    /// Ok when no method response carries a failure status. Property
    /// responses do not weigh in, partial property failures are normal.
    pub fn is_ok(&self) -> bool {
        self.responses.iter().all(|r| match r {
            Response::Method(m) => m.is_ok(),
            Response::Property(_) => true,
        })
    }

    /// The lock granted to `principal` according to the first response's
    /// lockdiscovery property. When a server reports several, the last
    /// one listed wins.
    pub fn active_lock_for(
        &self,
        principal: &str,
    ) -> Result<Option<ActiveLock>, LockDiscoveryError> {
        if !self.is_ok() {
            return Err(LockDiscoveryError::NotOk);
        }
        let locks = match self.responses.first() {
            Some(Response::Property(p)) => p
                .lock_discovery()
                .ok_or(LockDiscoveryError::NoLockDiscovery)?,
            _ => return Err(LockDiscoveryError::NoPropertyResponse),
        };

        let mut found = None;
        for lock in locks {
            if lock.principal() == Some(principal) {
                found = Some(lock.clone());
            }
        }
        Ok(found)
    }
}
