//! RSS mirror adapter.
//!
//! Fetches a third-party RSS/Atom mirror of a creator's feed and turns its
//! entries into [`ItemDescriptor`]s, newest first (feed order).

use std::time::Duration;

use async_trait::async_trait;
use cw_core::{
    config::render_template, domain::ItemDescriptor, errors::Error, identity::is_web_url,
    ports::SourceAdapter, Result,
};
use quick_xml::events::{attributes::Attributes, BytesStart, Event};
use quick_xml::Reader;

const USER_AGENT: &str = "Mozilla/5.0";

#[derive(Clone, Debug)]
pub struct RssMirrorSource {
    url_template: String,
    http: reqwest::Client,
}

impl RssMirrorSource {
    pub fn new(url_template: impl Into<String>, timeout: Duration) -> Result<Self> {
        let http = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .timeout(timeout)
            .build()
            .map_err(|e| Error::External(format!("rss client build error: {e}")))?;
        Ok(Self {
            url_template: url_template.into(),
            http,
        })
    }

    pub fn feed_url(&self, handle: &str) -> String {
        render_template(&self.url_template, handle)
    }
}

#[async_trait]
impl SourceAdapter for RssMirrorSource {
    fn name(&self) -> &str {
        "rss"
    }

    async fn list_latest(&self, handle: &str, limit: usize) -> Result<Vec<ItemDescriptor>> {
        let url = self.feed_url(handle);
        tracing::debug!(%url, "fetching rss mirror");

        let resp = self
            .http
            .get(&url)
            .send()
            .await
            .map_err(|e| Error::External(format!("rss request error: {e}")))?;

        if !resp.status().is_success() {
            let status = resp.status();
            let body = resp.text().await.unwrap_or_default();
            return Err(Error::External(format!(
                "rss mirror returned {status} {}",
                body.chars().take(200).collect::<String>()
            )));
        }

        let body = resp
            .text()
            .await
            .map_err(|e| Error::External(format!("rss body error: {e}")))?;

        Ok(parse_feed(&body, limit))
    }
}

#[derive(Default)]
struct EntryAccum {
    title: String,
    link: String,
    guid: String,
}

impl EntryAccum {
    fn into_item(self) -> Option<ItemDescriptor> {
        let url = [self.link.trim(), self.guid.trim()]
            .into_iter()
            .find(|u| is_web_url(u))?;
        Some(ItemDescriptor::new(url, self.title.trim()))
    }
}

/// Atom `<link>`: take `href` unless the link is explicitly not the alternate.
fn atom_href(attrs: Attributes) -> Option<String> {
    let mut href = None;
    let mut alternate = true;
    for attr in attrs.flatten() {
        let val = match attr.unescape_value() {
            Ok(v) => v.into_owned(),
            Err(_) => continue,
        };
        match attr.key.local_name().as_ref() {
            b"href" => href = Some(val),
            b"rel" => alternate = val == "alternate",
            _ => {}
        }
    }
    href.filter(|h| alternate && !h.is_empty())
}

struct FeedParser {
    items: Vec<ItemDescriptor>,
    accum: EntryAccum,
    current_tag: String,
    in_entry: bool,
}

impl FeedParser {
    fn new() -> Self {
        Self {
            items: Vec::new(),
            accum: EntryAccum::default(),
            current_tag: String::new(),
            in_entry: false,
        }
    }

    fn tag(e: &BytesStart<'_>) -> String {
        String::from_utf8_lossy(e.local_name().as_ref()).to_string()
    }

    fn handle_start(&mut self, e: &BytesStart<'_>) {
        let tag = Self::tag(e);
        match tag.as_str() {
            "item" | "entry" => {
                self.in_entry = true;
                self.accum = EntryAccum::default();
            }
            "link" if self.in_entry => {
                if let Some(href) = atom_href(e.attributes()) {
                    if self.accum.link.is_empty() {
                        self.accum.link = href;
                    }
                }
                self.current_tag = tag;
            }
            _ if self.in_entry => self.current_tag = tag,
            _ => {}
        }
    }

    fn handle_empty(&mut self, e: &BytesStart<'_>) {
        if self.in_entry && Self::tag(e) == "link" && self.accum.link.is_empty() {
            if let Some(href) = atom_href(e.attributes()) {
                self.accum.link = href;
            }
        }
    }

    fn handle_text(&mut self, text: &str) {
        if !self.in_entry {
            return;
        }
        match self.current_tag.as_str() {
            "title" => self.accum.title.push_str(text),
            // RSS carries the link as text; Atom already took it from href.
            "link" if self.accum.link.trim().is_empty() => self.accum.link = text.to_string(),
            "guid" | "id" => self.accum.guid.push_str(text),
            _ => {}
        }
    }

    fn handle_end(&mut self, local_name: &[u8]) {
        match local_name {
            b"item" | b"entry" if self.in_entry => {
                let finished = std::mem::take(&mut self.accum);
                if let Some(item) = finished.into_item() {
                    self.items.push(item);
                }
                self.in_entry = false;
                self.current_tag.clear();
            }
            _ => self.current_tag.clear(),
        }
    }
}

/// Parse an RSS 2.0 or Atom document. Malformed trailing XML keeps what was
/// parsed so far.
pub fn parse_feed(xml: &str, limit: usize) -> Vec<ItemDescriptor> {
    let mut reader = Reader::from_str(xml);
    let mut parser = FeedParser::new();

    while parser.items.len() < limit {
        match reader.read_event() {
            Ok(Event::Start(ref e)) => parser.handle_start(e),
            Ok(Event::Empty(ref e)) => parser.handle_empty(e),
            Ok(Event::Text(ref e)) => {
                let text = e.unescape().unwrap_or_default();
                parser.handle_text(&text);
            }
            Ok(Event::CData(e)) => {
                let raw = e.into_inner();
                parser.handle_text(&String::from_utf8_lossy(&raw));
            }
            Ok(Event::End(ref e)) => parser.handle_end(e.local_name().as_ref()),
            Ok(Event::Eof) => break,
            Err(e) => {
                tracing::warn!("rss parse stopped early: {e}");
                break;
            }
            _ => {}
        }
    }

    parser.items
}

#[cfg(test)]
mod tests {
    use super::*;

    const RSS: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<rss version="2.0">
  <channel>
    <title>creator - TikTok</title>
    <link>https://www.tiktok.com/@creator</link>
    <item>
      <title><![CDATA[Dance & chill]]></title>
      <link>https://www.tiktok.com/@creator/video/300</link>
      <guid>https://www.tiktok.com/@creator/video/300</guid>
    </item>
    <item>
      <title>Fish &amp; chips</title>
      <link>https://www.tiktok.com/@creator/video/200</link>
    </item>
    <item>
      <guid isPermaLink="true">https://www.tiktok.com/@creator/video/100</guid>
    </item>
    <item>
      <title>no location at all</title>
    </item>
  </channel>
</rss>"#;

    #[test]
    fn parses_rss_items_in_feed_order() {
        let items = parse_feed(RSS, 10);
        assert_eq!(
            items,
            vec![
                ItemDescriptor::new("https://www.tiktok.com/@creator/video/300", "Dance & chill"),
                ItemDescriptor::new("https://www.tiktok.com/@creator/video/200", "Fish & chips"),
                ItemDescriptor::new("https://www.tiktok.com/@creator/video/100", ""),
            ]
        );
    }

    #[test]
    fn stops_at_limit() {
        let items = parse_feed(RSS, 1);
        assert_eq!(items.len(), 1);
        assert!(items[0].url.ends_with("/video/300"));
    }

    #[test]
    fn parses_atom_entries() {
        let atom = r#"<?xml version="1.0"?>
<feed xmlns="http://www.w3.org/2005/Atom">
  <link href="https://www.tiktok.com/@creator"/>
  <entry>
    <title type="html">first</title>
    <link rel="self" href="https://mirror.example/self/1"/>
    <link rel="alternate" href="https://www.tiktok.com/@creator/video/11"/>
  </entry>
  <entry>
    <title>second</title>
    <link href="https://www.tiktok.com/@creator/video/10"></link>
  </entry>
</feed>"#;
        let items = parse_feed(atom, 10);
        assert_eq!(
            items,
            vec![
                ItemDescriptor::new("https://www.tiktok.com/@creator/video/11", "first"),
                ItemDescriptor::new("https://www.tiktok.com/@creator/video/10", "second"),
            ]
        );
    }

    #[test]
    fn non_http_links_are_dropped() {
        let rss = r#"<rss><channel>
  <item><title>opt</title><link>--exec=touch /tmp/owned</link></item>
  <item><title>local</title><link>file:///etc/passwd</link></item>
  <item><title>rel</title><link>/@creator/video/5</link></item>
  <item><title>ok</title><link>https://www.tiktok.com/@creator/video/4</link></item>
</channel></rss>"#;
        let items = parse_feed(rss, 10);
        assert_eq!(
            items,
            vec![ItemDescriptor::new(
                "https://www.tiktok.com/@creator/video/4",
                "ok"
            )]
        );
    }

    #[test]
    fn garbage_yields_nothing() {
        assert!(parse_feed("<html><body>rate limited</body></html>", 5).is_empty());
        assert!(parse_feed("", 5).is_empty());
    }

    #[test]
    fn truncated_document_keeps_complete_items() {
        let cut = &RSS[..RSS.find("<title>Fish").unwrap()];
        let items = parse_feed(cut, 10);
        assert_eq!(items.len(), 1);
    }

    #[test]
    fn feed_url_renders_handle() {
        let src = RssMirrorSource::new(
            "https://rsshub.app/tiktok/user/{handle}",
            Duration::from_secs(5),
        )
        .unwrap();
        assert_eq!(
            src.feed_url("creator"),
            "https://rsshub.app/tiktok/user/creator"
        );
        assert_eq!(src.name(), "rss");
    }
}
