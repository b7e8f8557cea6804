use quick_xml::events::{BytesText, Event};
use quick_xml::Error as QError;

use super::types::*;
use super::xml::{IWrite, QWrite, Writer, DAV_URN};

// Serialization of the multistatus document and everything it carries.
// Elements in the DAV: namespace use the D: prefix declared on the
// root; property names in other namespaces declare their namespace
// inline.

async fn text_element(
    xml: &mut Writer<impl IWrite>,
    key: &str,
    content: &str,
) -> Result<(), QError> {
    let start = xml.create_dav_element(key);
    let end = start.to_end();
    xml.q.write_event_async(Event::Start(start.clone())).await?;
    xml.q
        .write_event_async(Event::Text(BytesText::new(content)))
        .await?;
    xml.q.write_event_async(Event::End(end)).await
}

impl QWrite for Href {
    async fn qwrite(&self, xml: &mut Writer<impl IWrite>) -> Result<(), QError> {
        text_element(xml, "href", &self.0).await
    }
}

impl QWrite for ResponseDescription {
    async fn qwrite(&self, xml: &mut Writer<impl IWrite>) -> Result<(), QError> {
        text_element(xml, "responsedescription", &self.0).await
    }
}

impl QWrite for Principal {
    async fn qwrite(&self, xml: &mut Writer<impl IWrite>) -> Result<(), QError> {
        text_element(xml, "principal", &self.0).await
    }
}

impl QWrite for Status {
    async fn qwrite(&self, xml: &mut Writer<impl IWrite>) -> Result<(), QError> {
        let line = format!(
            "HTTP/1.1 {} {}",
            self.0.as_u16(),
            self.0.canonical_reason().unwrap_or("Unknown")
        );
        text_element(xml, "status", &line).await
    }
}

impl QWrite for Depth {
    async fn qwrite(&self, xml: &mut Writer<impl IWrite>) -> Result<(), QError> {
        text_element(xml, "depth", &self.to_string()).await
    }
}

impl QWrite for Timeout {
    async fn qwrite(&self, xml: &mut Writer<impl IWrite>) -> Result<(), QError> {
        text_element(xml, "timeout", &self.to_string()).await
    }
}

impl QWrite for LockScope {
    async fn qwrite(&self, xml: &mut Writer<impl IWrite>) -> Result<(), QError> {
        let start = xml.create_dav_element("lockscope");
        let end = start.to_end();
        xml.q.write_event_async(Event::Start(start.clone())).await?;
        let inner = match self {
            Self::Exclusive => xml.create_dav_element("exclusive"),
            Self::Shared => xml.create_dav_element("shared"),
        };
        xml.q.write_event_async(Event::Empty(inner)).await?;
        xml.q.write_event_async(Event::End(end)).await
    }
}

impl QWrite for LockType {
    async fn qwrite(&self, xml: &mut Writer<impl IWrite>) -> Result<(), QError> {
        let start = xml.create_dav_element("locktype");
        let end = start.to_end();
        xml.q.write_event_async(Event::Start(start.clone())).await?;
        let inner = match self {
            Self::Write => xml.create_dav_element("write"),
        };
        xml.q.write_event_async(Event::Empty(inner)).await?;
        xml.q.write_event_async(Event::End(end)).await
    }
}

impl QWrite for Owner {
    async fn qwrite(&self, xml: &mut Writer<impl IWrite>) -> Result<(), QError> {
        let start = xml.create_dav_element("owner");
        match self {
            Self::Unknown => xml.q.write_event_async(Event::Empty(start)).await,
            Self::Txt(txt) => {
                let end = start.to_end();
                xml.q.write_event_async(Event::Start(start.clone())).await?;
                xml.q
                    .write_event_async(Event::Text(BytesText::new(txt)))
                    .await?;
                xml.q.write_event_async(Event::End(end)).await
            }
            Self::Href(href) => {
                let end = start.to_end();
                xml.q.write_event_async(Event::Start(start.clone())).await?;
                href.qwrite(xml).await?;
                xml.q.write_event_async(Event::End(end)).await
            }
        }
    }
}

impl QWrite for LockToken {
    async fn qwrite(&self, xml: &mut Writer<impl IWrite>) -> Result<(), QError> {
        let start = xml.create_dav_element("locktoken");
        let end = start.to_end();
        xml.q.write_event_async(Event::Start(start.clone())).await?;
        self.0.qwrite(xml).await?;
        xml.q.write_event_async(Event::End(end)).await
    }
}

impl QWrite for ActiveLock {
    async fn qwrite(&self, xml: &mut Writer<impl IWrite>) -> Result<(), QError> {
        let start = xml.create_dav_element("activelock");
        let end = start.to_end();
        xml.q.write_event_async(Event::Start(start.clone())).await?;

        self.scope().qwrite(xml).await?;
        self.lock_type().qwrite(xml).await?;
        self.depth().qwrite(xml).await?;
        if let Some(owner) = self.owner() {
            owner.qwrite(xml).await?;
        }
        self.timeout().qwrite(xml).await?;
        if let Some(token) = self.lock_token() {
            LockToken(Href(token.into())).qwrite(xml).await?;
        }
        if let Some(principal) = self.principal() {
            Principal(principal.into()).qwrite(xml).await?;
        }

        xml.q.write_event_async(Event::End(end)).await
    }
}

async fn property(
    xml: &mut Writer<impl IWrite>,
    name: &PropertyName,
    content: &PropContent,
) -> Result<(), QError> {
    let start = match name.ns() {
        DAV_URN => xml.create_dav_element(name.local()),
        ns => xml.create_foreign_element(ns, name.local()),
    };
    match content {
        PropContent::Empty => xml.q.write_event_async(Event::Empty(start)).await,
        PropContent::Text(text) => {
            let end = start.to_end();
            xml.q.write_event_async(Event::Start(start.clone())).await?;
            xml.q
                .write_event_async(Event::Text(BytesText::new(text)))
                .await?;
            xml.q.write_event_async(Event::End(end)).await
        }
        PropContent::LockDiscovery(locks) => {
            let end = start.to_end();
            xml.q.write_event_async(Event::Start(start.clone())).await?;
            for lock in locks {
                lock.qwrite(xml).await?;
            }
            xml.q.write_event_async(Event::End(end)).await
        }
    }
}

impl QWrite for MethodResponse {
    async fn qwrite(&self, xml: &mut Writer<impl IWrite>) -> Result<(), QError> {
        let start = xml.create_dav_element("response");
        let end = start.to_end();
        xml.q.write_event_async(Event::Start(start.clone())).await?;

        Href(self.resource().into()).qwrite(xml).await?;
        for alias in self.aliases() {
            Href(alias.clone()).qwrite(xml).await?;
        }
        self.status().qwrite(xml).await?;
        if let Some(description) = self.description() {
            ResponseDescription(description.into()).qwrite(xml).await?;
        }

        xml.q.write_event_async(Event::End(end)).await
    }
}

impl QWrite for PropertyResponse {
    async fn qwrite(&self, xml: &mut Writer<impl IWrite>) -> Result<(), QError> {
        let start = xml.create_dav_element("response");
        let end = start.to_end();
        xml.q.write_event_async(Event::Start(start.clone())).await?;

        Href(self.resource().into()).qwrite(xml).await?;

        // one propstat per distinct status, groups in first-seen order
        let mut groups: Vec<(Status, Vec<(&PropertyName, &PropContent)>)> = Vec::new();
        for (name, value) in self.properties() {
            match groups.iter_mut().find(|(s, _)| *s == value.status) {
                Some((_, members)) => members.push((name, &value.content)),
                None => groups.push((value.status, vec![(name, &value.content)])),
            }
        }
        if groups.is_empty() {
            groups.push((Status(http::StatusCode::OK), Vec::new()));
        }

        for (status, members) in groups {
            let propstat = xml.create_dav_element("propstat");
            let propstat_end = propstat.to_end();
            xml.q
                .write_event_async(Event::Start(propstat.clone()))
                .await?;

            let prop = xml.create_dav_element("prop");
            if members.is_empty() {
                xml.q.write_event_async(Event::Empty(prop)).await?;
            } else {
                let prop_end = prop.to_end();
                xml.q.write_event_async(Event::Start(prop.clone())).await?;
                for (name, content) in members {
                    property(xml, name, content).await?;
                }
                xml.q.write_event_async(Event::End(prop_end)).await?;
            }

            status.qwrite(xml).await?;
            xml.q.write_event_async(Event::End(propstat_end)).await?;
        }

        if let Some(description) = self.description() {
            ResponseDescription(description.into()).qwrite(xml).await?;
        }

        xml.q.write_event_async(Event::End(end)).await
    }
}

impl QWrite for Response {
    async fn qwrite(&self, xml: &mut Writer<impl IWrite>) -> Result<(), QError> {
        match self {
            Self::Method(m) => m.qwrite(xml).await,
            Self::Property(p) => p.qwrite(xml).await,
        }
    }
}

impl QWrite for MultiStatus {
    async fn qwrite(&self, xml: &mut Writer<impl IWrite>) -> Result<(), QError> {
        let start = xml.create_dav_element("multistatus");
        let end = start.to_end();
        xml.q.write_event_async(Event::Start(start.clone())).await?;

        for response in self.responses() {
            response.qwrite(xml).await?;
        }
        if let Some(description) = self.description() {
            ResponseDescription(description.into()).qwrite(xml).await?;
        }

        xml.q.write_event_async(Event::End(end)).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ParsingError;
    use crate::xml::{Node, Reader};
    use quick_xml::reader::NsReader;
    use tokio::io::AsyncWriteExt;

    async fn serialize(elem: &impl QWrite) -> String {
        let mut buffer = Vec::new();
        let mut tokio_buffer = tokio::io::BufWriter::new(&mut buffer);
        let q = quick_xml::writer::Writer::new_with_indent(&mut tokio_buffer, b' ', 4);
        let ns_to_apply = vec![("xmlns:D".into(), "DAV:".into())];
        let mut writer = Writer { q, ns_to_apply };

        elem.qwrite(&mut writer).await.expect("xml serialization");
        tokio_buffer.flush().await.expect("tokio buffer flush");
        let got = std::str::from_utf8(buffer.as_slice()).unwrap();

        return got.into();
    }

    async fn deserialize<T: Node<T>>(src: &str) -> Result<T, ParsingError> {
        let mut rdr = Reader::new(NsReader::from_reader(src.as_bytes())).await?;
        rdr.find().await
    }

    #[tokio::test]
    async fn basic_multistatus() {
        let mut ms = MultiStatus::new();
        ms.add_response(Response::Method(MethodResponse::new(
            "http://www.example.com/container/resource3",
            Status(http::StatusCode::LOCKED),
        )));
        ms.set_description("Copied with errors");

        let got = serialize(&ms).await;
        let expected = r#"<D:multistatus xmlns:D="DAV:">
    <D:response>
        <D:href>http://www.example.com/container/resource3</D:href>
        <D:status>HTTP/1.1 423 Locked</D:status>
    </D:response>
    <D:responsedescription>Copied with errors</D:responsedescription>
</D:multistatus>"#;

        assert_eq!(got, expected);
    }

    #[tokio::test]
    async fn propstat_groups_by_status() {
        let mut resp = PropertyResponse::new("/file");
        resp.add_property(
            PropertyName::dav("displayname"),
            PropertyValue::ok(PropContent::Text("File".into())),
        )
        .unwrap();
        resp.add_property(
            PropertyName::dav("getcontentlength"),
            PropertyValue::ok(PropContent::Text("1234".into())),
        )
        .unwrap();
        resp.add_property(
            PropertyName::dav("getcontentlanguage"),
            PropertyValue {
                content: PropContent::Empty,
                status: Status(http::StatusCode::NOT_FOUND),
            },
        )
        .unwrap();
        resp.add_property(
            PropertyName::dav("getetag"),
            PropertyValue::ok(PropContent::Text("zzyzx".into())),
        )
        .unwrap();

        let got = serialize(&resp).await;
        let expected = r#"<D:response xmlns:D="DAV:">
    <D:href>/file</D:href>
    <D:propstat>
        <D:prop>
            <D:displayname>File</D:displayname>
            <D:getcontentlength>1234</D:getcontentlength>
            <D:getetag>zzyzx</D:getetag>
        </D:prop>
        <D:status>HTTP/1.1 200 OK</D:status>
    </D:propstat>
    <D:propstat>
        <D:prop>
            <D:getcontentlanguage/>
        </D:prop>
        <D:status>HTTP/1.1 404 Not Found</D:status>
    </D:propstat>
</D:response>"#;

        assert_eq!(got, expected);
        assert_eq!(got.matches("<D:propstat>").count(), 2);
    }

    #[tokio::test]
    async fn empty_property_response_still_emits_a_propstat() {
        let resp = PropertyResponse::new("/empty");
        let got = serialize(&resp).await;
        let expected = r#"<D:response xmlns:D="DAV:">
    <D:href>/empty</D:href>
    <D:propstat>
        <D:prop/>
        <D:status>HTTP/1.1 200 OK</D:status>
    </D:propstat>
</D:response>"#;

        assert_eq!(got, expected);
    }

    #[tokio::test]
    async fn activelock_with_all_children() {
        let mut lock = ActiveLock::new();
        lock.set_depth(Depth::Deep);
        lock.set_owner(Owner::Href(Href(
            "http://example.org/~ejw/contact.html".into(),
        )));
        lock.set_timeout(Timeout::Seconds(604800));
        lock.set_lock_token("urn:uuid:e71d4fae-5dec-22d6-fea5-00a0c91e6be4");
        lock.set_principal("ejw");

        let got = serialize(&lock).await;
        let expected = r#"<D:activelock xmlns:D="DAV:">
    <D:lockscope>
        <D:exclusive/>
    </D:lockscope>
    <D:locktype>
        <D:write/>
    </D:locktype>
    <D:depth>infinity</D:depth>
    <D:owner>
        <D:href>http://example.org/~ejw/contact.html</D:href>
    </D:owner>
    <D:timeout>Second-604800</D:timeout>
    <D:locktoken>
        <D:href>urn:uuid:e71d4fae-5dec-22d6-fea5-00a0c91e6be4</D:href>
    </D:locktoken>
    <D:principal>ejw</D:principal>
</D:activelock>"#;

        assert_eq!(got, expected);
    }

    #[tokio::test]
    async fn foreign_property_declares_its_namespace() {
        let mut resp = PropertyResponse::new("/file");
        resp.add_property(
            PropertyName::new("http://ns.example.com/boxschema/", "author").unwrap(),
            PropertyValue::ok(PropContent::Text("J. Hacker".into())),
        )
        .unwrap();

        let got = serialize(&resp).await;
        assert!(got.contains(r#"<author xmlns="http://ns.example.com/boxschema/">J. Hacker</author>"#));
    }

    #[tokio::test]
    async fn multistatus_round_trip() {
        let mut prop = PropertyResponse::new("/shared/report.doc");
        let mut lock = ActiveLock::new();
        lock.set_scope(LockScope::Shared);
        lock.set_depth(Depth::Shallow);
        lock.set_timeout(Timeout::Infinite);
        lock.set_lock_token("urn:lock:1");
        lock.set_principal("alice");
        prop.add_property(
            PropertyName::dav("lockdiscovery"),
            PropertyValue::ok(PropContent::LockDiscovery(vec![lock])),
        )
        .unwrap();

        let mut ms = MultiStatus::new();
        ms.add_response(Response::Property(prop));
        ms.add_response(Response::Method(MethodResponse::new(
            "/shared/other.doc",
            Status(http::StatusCode::FORBIDDEN),
        )));
        ms.set_description("mixed results");

        let txt = serialize(&ms).await;
        let got = deserialize::<MultiStatus>(&txt).await.unwrap();
        assert_eq!(got, ms);
    }
}
