use quick_xml::events::Event;

use super::error::ParsingError;
use super::types::*;
use super::xml::{IRead, QRead, Reader, DAV_URN};

// Reads every multistatus variation a server may produce: the
// `(href*, status)` and `(propstat+)` sides of the response DTD, and
// lockdiscovery property content down to each activelock.

/// An element holding nothing but text, e.g. href or principal. A
/// self-closed element yields the empty string.
async fn text_element(xml: &mut Reader<impl IRead>, key: &str) -> Result<String, ParsingError> {
    xml.open(DAV_URN, key).await?;
    let txt = match xml.parent_has_child() {
        true => xml.tag_string().await?,
        false => String::new(),
    };
    xml.close().await?;
    Ok(txt)
}

impl QRead<Href> for Href {
    async fn qread(xml: &mut Reader<impl IRead>) -> Result<Self, ParsingError> {
        Ok(Href(text_element(xml, "href").await?))
    }
}

impl QRead<ResponseDescription> for ResponseDescription {
    async fn qread(xml: &mut Reader<impl IRead>) -> Result<Self, ParsingError> {
        Ok(ResponseDescription(
            text_element(xml, "responsedescription").await?,
        ))
    }
}

impl QRead<Principal> for Principal {
    async fn qread(xml: &mut Reader<impl IRead>) -> Result<Self, ParsingError> {
        Ok(Principal(text_element(xml, "principal").await?))
    }
}

impl QRead<Status> for Status {
    async fn qread(xml: &mut Reader<impl IRead>) -> Result<Self, ParsingError> {
        // status lines look like `HTTP/1.1 423 Locked`
        let line = text_element(xml, "status").await?;
        let code = line
            .split_whitespace()
            .nth(1)
            .ok_or(ParsingError::InvalidValue)?
            .parse::<u16>()?;
        let status = http::StatusCode::from_u16(code).map_err(|_| ParsingError::InvalidValue)?;
        Ok(Status(status))
    }
}

impl QRead<Depth> for Depth {
    async fn qread(xml: &mut Reader<impl IRead>) -> Result<Self, ParsingError> {
        text_element(xml, "depth").await?.parse()
    }
}

impl QRead<Timeout> for Timeout {
    async fn qread(xml: &mut Reader<impl IRead>) -> Result<Self, ParsingError> {
        text_element(xml, "timeout").await?.parse()
    }
}

impl QRead<LockScope> for LockScope {
    async fn qread(xml: &mut Reader<impl IRead>) -> Result<Self, ParsingError> {
        xml.open(DAV_URN, "lockscope").await?;
        let mut scope = None;
        loop {
            let mut dirty = false;
            if xml.maybe_open(DAV_URN, "exclusive").await?.is_some() {
                scope = Some(LockScope::Exclusive);
                xml.close().await?;
                dirty = true;
            } else if xml.maybe_open(DAV_URN, "shared").await?.is_some() {
                scope = Some(LockScope::Shared);
                xml.close().await?;
                dirty = true;
            }
            if !dirty {
                match xml.peek() {
                    Event::End(_) => break,
                    _ => {
                        xml.skip().await?;
                    }
                }
            }
        }
        xml.close().await?;
        scope.ok_or(ParsingError::MissingChild)
    }
}

impl QRead<LockType> for LockType {
    async fn qread(xml: &mut Reader<impl IRead>) -> Result<Self, ParsingError> {
        xml.open(DAV_URN, "locktype").await?;
        let mut lock_type = None;
        loop {
            let mut dirty = false;
            if xml.maybe_open(DAV_URN, "write").await?.is_some() {
                lock_type = Some(LockType::Write);
                xml.close().await?;
                dirty = true;
            }
            if !dirty {
                match xml.peek() {
                    Event::End(_) => break,
                    _ => {
                        xml.skip().await?;
                    }
                }
            }
        }
        xml.close().await?;
        lock_type.ok_or(ParsingError::MissingChild)
    }
}

impl QRead<Owner> for Owner {
    async fn qread(xml: &mut Reader<impl IRead>) -> Result<Self, ParsingError> {
        xml.open(DAV_URN, "owner").await?;
        let mut owner = Owner::Unknown;
        while xml.parent_has_child() {
            match xml.peek() {
                Event::Text(_) | Event::CData(_) => {
                    let txt = xml.tag_string().await?;
                    if matches!(owner, Owner::Unknown) && !txt.trim().is_empty() {
                        owner = Owner::Txt(txt.trim().into());
                    }
                }
                Event::Start(_) | Event::Empty(_) => match Href::qread(xml).await {
                    Ok(href) => owner = Owner::Href(href),
                    Err(ParsingError::Recoverable) => {
                        xml.skip().await?;
                    }
                    Err(e) => return Err(e),
                },
                Event::End(_) => break,
                _ => {
                    xml.skip().await?;
                }
            }
        }
        xml.close().await?;
        Ok(owner)
    }
}

impl QRead<LockToken> for LockToken {
    async fn qread(xml: &mut Reader<impl IRead>) -> Result<Self, ParsingError> {
        xml.open(DAV_URN, "locktoken").await?;
        if !xml.parent_has_child() {
            xml.close().await?;
            return Err(ParsingError::MissingChild);
        }
        let href = xml.find::<Href>().await?;
        xml.close().await?;
        Ok(LockToken(href))
    }
}

impl QRead<ActiveLock> for ActiveLock {
    async fn qread(xml: &mut Reader<impl IRead>) -> Result<Self, ParsingError> {
        xml.open(DAV_URN, "activelock").await?;
        let (mut scope, mut lock_type, mut depth) = (None, None, None);
        let (mut owner, mut timeout, mut lock_token, mut principal) = (None, None, None, None);

        loop {
            let mut dirty = false;
            xml.maybe_read::<LockScope>(&mut scope, &mut dirty).await?;
            xml.maybe_read::<LockType>(&mut lock_type, &mut dirty).await?;
            xml.maybe_read::<Depth>(&mut depth, &mut dirty).await?;
            xml.maybe_read::<Owner>(&mut owner, &mut dirty).await?;
            xml.maybe_read::<Timeout>(&mut timeout, &mut dirty).await?;
            xml.maybe_read::<LockToken>(&mut lock_token, &mut dirty)
                .await?;
            xml.maybe_read::<Principal>(&mut principal, &mut dirty)
                .await?;

            if !dirty {
                match xml.peek() {
                    Event::End(_) => break,
                    _ => {
                        xml.skip().await?;
                    }
                }
            }
        }
        xml.close().await?;

        match (scope, lock_type, depth) {
            (Some(scope), Some(lock_type), Some(depth)) => {
                let mut lock = ActiveLock::new();
                lock.set_scope(scope);
                lock.set_lock_type(lock_type);
                lock.set_depth(depth);
                lock.set_timeout(timeout.unwrap_or_default());
                if let Some(owner) = owner {
                    lock.set_owner(owner);
                }
                if let Some(LockToken(Href(token))) = lock_token {
                    lock.set_lock_token(token);
                }
                if let Some(Principal(principal)) = principal {
                    lock.set_principal(principal);
                }
                Ok(lock)
            }
            _ => Err(ParsingError::MissingChild),
        }
    }
}

/// The children of a prop element. Lockdiscovery is decoded
/// structurally; any other property keeps its text content, or
/// degrades to `Empty` when it holds none or only child elements.
async fn prop(
    xml: &mut Reader<impl IRead>,
) -> Result<Vec<(PropertyName, PropContent)>, ParsingError> {
    let mut props = Vec::new();
    while let Some((ns, local)) = xml.open_any().await? {
        let content = if ns == DAV_URN && local == "lockdiscovery" {
            PropContent::LockDiscovery(xml.collect::<ActiveLock>().await?)
        } else if xml.parent_has_child() {
            let text = xml.tag_string().await?;
            match text.trim().is_empty() {
                true => PropContent::Empty,
                false => PropContent::Text(text),
            }
        } else {
            PropContent::Empty
        };
        xml.close().await?;

        let name = PropertyName::new(&ns, &local).map_err(|_| ParsingError::InvalidValue)?;
        props.push((name, content));
    }
    Ok(props)
}

async fn propstat(
    xml: &mut Reader<impl IRead>,
) -> Result<(Status, Vec<(PropertyName, PropContent)>), ParsingError> {
    let mut status = None;
    let mut props = None;

    loop {
        let mut dirty = false;
        xml.maybe_read::<Status>(&mut status, &mut dirty).await?;
        if !dirty && xml.maybe_open(DAV_URN, "prop").await?.is_some() {
            props = Some(prop(xml).await?);
            xml.close().await?;
            dirty = true;
        }
        if !dirty {
            match xml.peek() {
                Event::End(_) => break,
                _ => {
                    xml.skip().await?;
                }
            }
        }
    }

    match (status, props) {
        (Some(status), Some(props)) => Ok((status, props)),
        _ => Err(ParsingError::MissingChild),
    }
}

impl QRead<Response> for Response {
    async fn qread(xml: &mut Reader<impl IRead>) -> Result<Self, ParsingError> {
        xml.open(DAV_URN, "response").await?;
        let mut hrefs: Vec<Href> = Vec::new();
        let mut status: Option<Status> = None;
        let mut description: Option<ResponseDescription> = None;
        let mut propstats: Vec<(Status, Vec<(PropertyName, PropContent)>)> = Vec::new();

        loop {
            let mut dirty = false;
            xml.maybe_push::<Href>(&mut hrefs, &mut dirty).await?;
            xml.maybe_read::<Status>(&mut status, &mut dirty).await?;
            xml.maybe_read::<ResponseDescription>(&mut description, &mut dirty)
                .await?;
            if !dirty && xml.maybe_open(DAV_URN, "propstat").await?.is_some() {
                propstats.push(propstat(xml).await?);
                xml.close().await?;
                dirty = true;
            }
            if !dirty {
                match xml.peek() {
                    Event::End(_) => break,
                    _ => {
                        xml.skip().await?;
                    }
                }
            }
        }
        xml.close().await?;

        let mut hrefs = hrefs.into_iter();
        let resource = hrefs.next().ok_or(ParsingError::MissingChild)?.0;

        if !propstats.is_empty() {
            let mut response = PropertyResponse::new(resource);
            for (status, props) in propstats {
                for (name, content) in props {
                    response.add_property(name, PropertyValue { content, status })?;
                }
            }
            if let Some(ResponseDescription(d)) = description {
                response.set_description(d);
            }
            return Ok(Response::Property(response));
        }

        match status {
            Some(status) => {
                let mut response = MethodResponse::new(resource, status);
                for Href(alias) in hrefs {
                    response.add_alias(alias)?;
                }
                if let Some(ResponseDescription(d)) = description {
                    response.set_description(d);
                }
                Ok(Response::Method(response))
            }
            None => Err(ParsingError::MissingChild),
        }
    }
}

impl QRead<MultiStatus> for MultiStatus {
    async fn qread(xml: &mut Reader<impl IRead>) -> Result<Self, ParsingError> {
        xml.open(DAV_URN, "multistatus").await?;
        let mut responses = Vec::new();
        let mut description: Option<ResponseDescription> = None;

        loop {
            let mut dirty = false;
            xml.maybe_push::<Response>(&mut responses, &mut dirty)
                .await?;
            xml.maybe_read::<ResponseDescription>(&mut description, &mut dirty)
                .await?;
            if !dirty {
                match xml.peek() {
                    Event::End(_) => break,
                    _ => {
                        xml.skip().await?;
                    }
                }
            }
        }
        xml.close().await?;

        let mut multistatus = MultiStatus::new();
        for response in responses {
            multistatus.add_response(response);
        }
        if let Some(ResponseDescription(d)) = description {
            multistatus.set_description(d);
        }
        Ok(multistatus)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::xml::Node;
    use chrono::Utc;
    use quick_xml::reader::NsReader;

    async fn deserialize<T: Node<T>>(src: &str) -> T {
        let mut rdr = Reader::new(NsReader::from_reader(src.as_bytes()))
            .await
            .unwrap();
        rdr.find().await.unwrap()
    }

    #[tokio::test]
    async fn method_responses() {
        let src = r#"<?xml version="1.0" encoding="utf-8" ?>
<D:multistatus xmlns:D="DAV:">
    <D:response>
        <D:href>http://www.example.com/container/resource3</D:href>
        <D:status>HTTP/1.1 423 Locked</D:status>
    </D:response>
    <D:response>
        <D:href>http://www.example.com/container/resource4</D:href>
        <D:href>http://www.example.com/container/resource5</D:href>
        <D:status>HTTP/1.1 403 Forbidden</D:status>
    </D:response>
    <D:responsedescription>Copied with errors</D:responsedescription>
</D:multistatus>"#;

        let got = deserialize::<MultiStatus>(src).await;
        assert_eq!(got.responses().len(), 2);
        assert_eq!(got.description(), Some("Copied with errors"));
        assert!(!got.is_ok());

        let Response::Method(first) = &got.responses()[0] else {
            panic!("expected a method response");
        };
        assert_eq!(first.resource(), "http://www.example.com/container/resource3");
        assert_eq!(first.status().0, http::StatusCode::LOCKED);

        let Response::Method(second) = &got.responses()[1] else {
            panic!("expected a method response");
        };
        assert_eq!(
            second.aliases(),
            &["http://www.example.com/container/resource5".to_string()]
        );
    }

    #[tokio::test]
    async fn property_response_with_mixed_statuses() {
        let src = r#"<?xml version="1.0" encoding="utf-8" ?>
<D:multistatus xmlns:D="DAV:">
    <D:response>
        <D:href>/container/front.html</D:href>
        <D:propstat>
            <D:prop>
                <D:displayname>Example HTML resource</D:displayname>
                <D:getcontentlength>4525</D:getcontentlength>
                <D:resourcetype><D:collection/></D:resourcetype>
            </D:prop>
            <D:status>HTTP/1.1 200 OK</D:status>
        </D:propstat>
        <D:propstat>
            <D:prop>
                <D:getcontentlanguage/>
            </D:prop>
            <D:status>HTTP/1.1 404 Not Found</D:status>
        </D:propstat>
    </D:response>
</D:multistatus>"#;

        let got = deserialize::<MultiStatus>(src).await;
        let Response::Property(resp) = &got.responses()[0] else {
            panic!("expected a property response");
        };
        assert_eq!(resp.resource(), "/container/front.html");
        assert_eq!(resp.display_name(), Some("Example HTML resource"));
        assert_eq!(resp.content_length(), Some(4525));
        assert!(!resp.is_ok());

        // structured content other than lockdiscovery degrades to Empty
        assert_eq!(
            resp.property(&PropertyName::dav("resourcetype")).unwrap().content,
            PropContent::Empty
        );
        let lang = resp.property(&PropertyName::dav("getcontentlanguage")).unwrap();
        assert_eq!(lang.status.0, http::StatusCode::NOT_FOUND);
        assert_eq!(lang.content, PropContent::Empty);
    }

    #[tokio::test]
    async fn foreign_namespace_property() {
        let src = r#"<?xml version="1.0" encoding="utf-8" ?>
<D:multistatus xmlns:D="DAV:" xmlns:R="http://ns.example.com/boxschema/">
    <D:response>
        <D:href>/file</D:href>
        <D:propstat>
            <D:prop>
                <R:author>J. Hacker</R:author>
            </D:prop>
            <D:status>HTTP/1.1 200 OK</D:status>
        </D:propstat>
    </D:response>
</D:multistatus>"#;

        let got = deserialize::<MultiStatus>(src).await;
        let Response::Property(resp) = &got.responses()[0] else {
            panic!("expected a property response");
        };
        let name = PropertyName::new("http://ns.example.com/boxschema/", "author").unwrap();
        assert_eq!(
            resp.property(&name).unwrap().content,
            PropContent::Text("J. Hacker".into())
        );
    }

    #[tokio::test]
    async fn full_activelock() {
        let src = r#"<?xml version="1.0" encoding="utf-8" ?>
<D:activelock xmlns:D="DAV:">
    <D:lockscope><D:exclusive/></D:lockscope>
    <D:locktype><D:write/></D:locktype>
    <D:depth>0</D:depth>
    <D:owner><D:href>http://example.org/~ejw/contact.html</D:href></D:owner>
    <D:timeout>Second-604800</D:timeout>
    <D:locktoken>
        <D:href>urn:uuid:e71d4fae-5dec-22d6-fea5-00a0c91e6be4</D:href>
    </D:locktoken>
    <D:principal>ejw</D:principal>
</D:activelock>"#;

        let before = Utc::now();
        let got = deserialize::<ActiveLock>(src).await;
        assert_eq!(*got.scope(), LockScope::Exclusive);
        assert_eq!(*got.lock_type(), LockType::Write);
        assert_eq!(*got.depth(), Depth::Shallow);
        assert_eq!(
            got.owner(),
            Some(&Owner::Href(Href(
                "http://example.org/~ejw/contact.html".into()
            )))
        );
        assert_eq!(*got.timeout(), Timeout::Seconds(604800));
        assert_eq!(
            got.lock_token(),
            Some("urn:uuid:e71d4fae-5dec-22d6-fea5-00a0c91e6be4")
        );
        assert_eq!(got.principal(), Some("ejw"));

        // expiration is derived at decode time, not read off the wire
        let expiration = got.expiration().unwrap();
        assert!(expiration >= before + chrono::Duration::seconds(604800));
    }

    #[tokio::test]
    async fn activelock_without_scope_is_rejected() {
        let src = r#"<?xml version="1.0" encoding="utf-8" ?>
<D:activelock xmlns:D="DAV:">
    <D:locktype><D:write/></D:locktype>
    <D:depth>infinity</D:depth>
</D:activelock>"#;

        let mut rdr = Reader::new(NsReader::from_reader(src.as_bytes()))
            .await
            .unwrap();
        assert!(matches!(
            rdr.find::<ActiveLock>().await,
            Err(ParsingError::MissingChild)
        ));
    }

    #[tokio::test]
    async fn lock_discovery_keeps_the_last_matching_lock() {
        let src = r#"<?xml version="1.0" encoding="utf-8" ?>
<D:multistatus xmlns:D="DAV:">
    <D:response>
        <D:href>/shared/report.doc</D:href>
        <D:propstat>
            <D:prop>
                <D:lockdiscovery>
                    <D:activelock>
                        <D:lockscope><D:shared/></D:lockscope>
                        <D:locktype><D:write/></D:locktype>
                        <D:depth>0</D:depth>
                        <D:timeout>Infinite</D:timeout>
                        <D:locktoken><D:href>urn:lock:1</D:href></D:locktoken>
                        <D:principal>p</D:principal>
                    </D:activelock>
                    <D:activelock>
                        <D:lockscope><D:shared/></D:lockscope>
                        <D:locktype><D:write/></D:locktype>
                        <D:depth>0</D:depth>
                        <D:timeout>Infinite</D:timeout>
                        <D:locktoken><D:href>urn:lock:2</D:href></D:locktoken>
                        <D:principal>p</D:principal>
                    </D:activelock>
                </D:lockdiscovery>
            </D:prop>
            <D:status>HTTP/1.1 200 OK</D:status>
        </D:propstat>
    </D:response>
</D:multistatus>"#;

        let got = deserialize::<MultiStatus>(src).await;
        let lock = got.active_lock_for("p").unwrap().unwrap();
        assert_eq!(lock.lock_token(), Some("urn:lock:2"));
        assert_eq!(got.active_lock_for("q").unwrap(), None);
    }

    #[tokio::test]
    async fn unknown_elements_are_skipped() {
        let src = r#"<?xml version="1.0" encoding="utf-8" ?>
<D:multistatus xmlns:D="DAV:" xmlns:X="http://example.com/ext">
    <X:preamble>ignore me</X:preamble>
    <D:response>
        <D:href>/doc</D:href>
        <X:note><X:inner/></X:note>
        <D:status>HTTP/1.1 200 OK</D:status>
    </D:response>
</D:multistatus>"#;

        let got = deserialize::<MultiStatus>(src).await;
        assert_eq!(got.responses().len(), 1);
        assert!(got.is_ok());
    }

    #[tokio::test]
    async fn response_without_href_is_rejected() {
        let src = r#"<?xml version="1.0" encoding="utf-8" ?>
<D:response xmlns:D="DAV:">
    <D:status>HTTP/1.1 200 OK</D:status>
</D:response>"#;

        let mut rdr = Reader::new(NsReader::from_reader(src.as_bytes()))
            .await
            .unwrap();
        assert!(matches!(
            rdr.find::<Response>().await,
            Err(ParsingError::MissingChild)
        ));
    }

    #[tokio::test]
    async fn duplicate_property_is_rejected() {
        let src = r#"<?xml version="1.0" encoding="utf-8" ?>
<D:response xmlns:D="DAV:">
    <D:href>/doc</D:href>
    <D:propstat>
        <D:prop><D:getetag>zzyzx</D:getetag></D:prop>
        <D:status>HTTP/1.1 200 OK</D:status>
    </D:propstat>
    <D:propstat>
        <D:prop><D:getetag/></D:prop>
        <D:status>HTTP/1.1 404 Not Found</D:status>
    </D:propstat>
</D:response>"#;

        let mut rdr = Reader::new(NsReader::from_reader(src.as_bytes()))
            .await
            .unwrap();
        assert!(matches!(
            rdr.find::<Response>().await,
            Err(ParsingError::DuplicateProperty)
        ));
    }
}
