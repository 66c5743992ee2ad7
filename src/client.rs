//! This module provides a client to connect to a CalDAV server

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use minidom::Element;
use reqwest::header::CONTENT_TYPE;
use reqwest::{Method, Response, StatusCode};
use url::Url;

use crate::clock::{Clock, SystemClock};
use crate::config::Config;
use crate::error::{Error, Result};
use crate::task::Task;
use crate::traits::{CollectionState, TaskRemote};
use crate::utils::{extract_blocks, find_elems, xml_escape, xml_unescape, CALDAV_NS};

/// How long a single HTTP request may take
pub const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

static MKCALENDAR_BODY: &str = r#"<?xml version="1.0" encoding="utf-8" ?>
<C:mkcalendar xmlns:D="DAV:" xmlns:C="urn:ietf:params:xml:ns:caldav">
  <D:set>
    <D:prop>
      <D:displayname>{displayname}</D:displayname>
      <C:supported-calendar-component-set>
        <C:comp name="VTODO"/>
      </C:supported-calendar-component-set>
    </D:prop>
  </D:set>
</C:mkcalendar>
"#;

static TASKS_BODY: &str = r#"<?xml version="1.0" encoding="utf-8" ?>
<C:calendar-query xmlns:D="DAV:" xmlns:C="urn:ietf:params:xml:ns:caldav">
  <D:prop>
    <D:getetag/>
    <C:calendar-data/>
  </D:prop>
  <C:filter>
    <C:comp-filter name="VCALENDAR">
      <C:comp-filter name="VTODO"/>
    </C:comp-filter>
  </C:filter>
</C:calendar-query>
"#;


/// A CalDAV client bound to a single task collection.
///
/// It keeps no state between requests, apart from the connection pool of its `reqwest::Client`.
pub struct Client {
    http: reqwest::Client,
    username: String,
    password: String,
    collection_name: String,
    collection_url: Url,
    clock: Arc<dyn Clock>,
}

impl std::fmt::Debug for Client {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Client")
            .field("username", &self.username)
            .field("collection_url", &self.collection_url.as_str())
            .finish()
    }
}

impl Client {
    /// Create a client. This does not start a connection
    ///
    /// The collection lives at `<url>/<username>/<collection>/`.
    pub fn new<S: AsRef<str>, T: ToString, U: ToString, V: ToString>(url: S, username: T, password: U, collection: V) -> Result<Self> {
        let username = username.to_string();
        let collection_name = collection.to_string();
        let collection_url = Url::parse(&format!("{}/{}/{}/",
            url.as_ref().trim_end_matches('/'), username, collection_name))?;

        let http = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()?;

        Ok(Self {
            http,
            username,
            password: password.to_string(),
            collection_name,
            collection_url,
            clock: Arc::new(SystemClock),
        })
    }

    /// Create a client from the sync settings, or `None` when sync is disabled
    pub fn from_config(config: &Config) -> Result<Option<Self>> {
        match config.sync_credentials()? {
            None => Ok(None),
            Some(credentials) => Self::new(credentials.url, credentials.username, credentials.password, &config.collection).map(Some),
        }
    }

    /// Use another time source for the `DTSTAMP` of uploaded items and the defaults of parsed ones
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn collection_url(&self) -> &Url {
        &self.collection_url
    }

    /// The URL of the `.ics` resource of a task
    pub fn task_url(&self, task_id: &str) -> Result<Url> {
        Ok(self.collection_url.join(&format!("{}.ics", task_id))?)
    }

    fn request(&self, method: &[u8], url: &Url) -> Result<reqwest::RequestBuilder> {
        let method = Method::from_bytes(method)
            .map_err(|err| Error::Network(format!("cannot create HTTP method: {}", err)))?;

        log::debug!("{} {}", method, url);
        Ok(self.http
            .request(method, url.as_str())
            .basic_auth(self.username.clone(), Some(self.password.clone())))
    }

    /// The REPORT response body
    async fn report(&self) -> Result<String> {
        let res = self.request(b"REPORT", &self.collection_url)?
            .header("Depth", 1)
            .header(CONTENT_TYPE, "application/xml")
            .body(TASKS_BODY)
            .send()
            .await?;

        let res = expect_status(res, &[StatusCode::OK, StatusCode::MULTI_STATUS], "REPORT").await?;
        Ok(res.text().await?)
    }
}

/// Turns an unexpected status into an error that carries the status and the body
async fn expect_status(res: Response, accepted: &[StatusCode], operation: &str) -> Result<Response> {
    let status = res.status();
    if accepted.contains(&status) {
        return Ok(res);
    }
    let body = res.text().await.unwrap_or_default();
    Err(Error::Network(format!("{} failed with status {}: {}", operation, status, body)))
}


#[async_trait]
impl TaskRemote for Client {
    async fn probe(&self) -> Result<CollectionState> {
        let res = self.request(b"PROPFIND", &self.collection_url)?
            .header("Depth", 0)
            .send()
            .await?;

        match res.status() {
            StatusCode::OK | StatusCode::MULTI_STATUS => Ok(CollectionState::Present),
            StatusCode::NOT_FOUND => Ok(CollectionState::Missing),
            status => {
                let body = res.text().await.unwrap_or_default();
                Err(Error::Network(format!("PROPFIND failed with status {}: {}", status, body)))
            },
        }
    }

    async fn create_collection(&self) -> Result<()> {
        let body = MKCALENDAR_BODY.replace("{displayname}", &xml_escape(&self.collection_name));
        let res = self.request(b"MKCALENDAR", &self.collection_url)?
            .header(CONTENT_TYPE, "application/xml")
            .body(body)
            .send()
            .await?;

        expect_status(res, &[StatusCode::OK, StatusCode::CREATED], "MKCALENDAR").await?;
        log::info!("Created collection {}", self.collection_url);
        Ok(())
    }

    async fn list_tasks(&self) -> Result<Vec<Task>> {
        let body = self.report().await?;
        let now = self.clock.now();

        let mut tasks = Vec::new();
        for ical in extract_calendar_data(&body) {
            match crate::ical::parse(&ical, now) {
                Ok(task) => tasks.push(task),
                Err(err) => log::warn!("Skipping a remote item that cannot be parsed: {}", err),
            }
        }
        log::debug!("REPORT returned {} tasks", tasks.len());
        Ok(tasks)
    }

    async fn put_task(&self, task: &Task) -> Result<()> {
        let url = self.task_url(task.id())?;
        let ical = crate::ical::build_from(task, &self.clock.now());

        let res = self.request(b"PUT", &url)?
            .header(CONTENT_TYPE, "text/calendar; charset=utf-8")
            .body(ical)
            .send()
            .await?;

        expect_status(res, &[StatusCode::OK, StatusCode::CREATED, StatusCode::NO_CONTENT], "PUT").await?;
        Ok(())
    }

    async fn delete_task(&self, task_id: &str) -> Result<()> {
        let url = self.task_url(task_id)?;
        let res = self.request(b"DELETE", &url)?
            .send()
            .await?;

        expect_status(res, &[StatusCode::OK, StatusCode::NO_CONTENT, StatusCode::NOT_FOUND], "DELETE").await?;
        Ok(())
    }
}


/// Returns the iCal payloads contained in a REPORT response.
///
/// `calendar-data` elements are matched by namespace, whatever their prefix.
/// Bodies that are not well-formed XML (or that have no such element) are scanned for raw iCal blocks instead.
pub fn extract_calendar_data(body: &str) -> Vec<String> {
    let from_xml: Vec<String> = match body.parse::<Element>() {
        Ok(root) => find_elems(&root, "calendar-data", CALDAV_NS)
            .iter()
            .map(|el| el.text())
            .filter(|text| text.trim().is_empty() == false)
            .collect(),
        Err(err) => {
            log::debug!("REPORT response is not valid XML ({}), scanning it as text", err);
            Vec::new()
        },
    };

    if from_xml.is_empty() == false || body.contains("BEGIN:VTODO") == false {
        return from_xml;
    }

    let mut blocks = extract_blocks(body, "VCALENDAR");
    if blocks.is_empty() {
        blocks = extract_blocks(body, "VTODO");
    }
    blocks.iter().map(|block| xml_unescape(block)).collect()
}


#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn urls() {
        let client = Client::new("https://dav.example.com/dav/calendars/", "alice", "pwd", "cbratasks").unwrap();
        assert_eq!(client.collection_url().as_str(), "https://dav.example.com/dav/calendars/alice/cbratasks/");
        assert_eq!(client.task_url("1234").unwrap().as_str(), "https://dav.example.com/dav/calendars/alice/cbratasks/1234.ics");

        assert!(Client::new("not an url", "alice", "pwd", "cbratasks").is_err());
    }

    #[test]
    fn calendar_data_with_any_prefix() {
        for prefix in &["C", "cal", "ns0"] {
            let body = format!(r#"<?xml version="1.0"?>
<d:multistatus xmlns:d="DAV:" xmlns:{p}="urn:ietf:params:xml:ns:caldav">
  <d:response>
    <d:href>/alice/cbratasks/a.ics</d:href>
    <d:propstat><d:prop>
      <d:getetag>"1"</d:getetag>
      <{p}:calendar-data>BEGIN:VCALENDAR&#13;
BEGIN:VTODO&#13;
UID:a&#13;
SUMMARY:Fish &amp; chips&#13;
END:VTODO&#13;
END:VCALENDAR&#13;
</{p}:calendar-data>
    </d:prop></d:propstat>
  </d:response>
</d:multistatus>"#, p = prefix);

            let found = extract_calendar_data(&body);
            assert_eq!(found.len(), 1, "prefix {}", prefix);
            assert!(found[0].contains("SUMMARY:Fish & chips\r\n"));
        }
    }

    #[test]
    fn empty_multistatus() {
        let body = r#"<d:multistatus xmlns:d="DAV:"/>"#;
        assert!(extract_calendar_data(body).is_empty());
    }

    #[test]
    fn text_fallback() {
        let body = "<broken><calendar-data>BEGIN:VCALENDAR\nBEGIN:VTODO\nUID:a\nSUMMARY:A &lt;b&gt;\nEND:VTODO\nEND:VCALENDAR\n\
                    </calendar-data><calendar-data>BEGIN:VCALENDAR\nBEGIN:VTODO\nUID:b\nSUMMARY:B\nEND:VTODO\nEND:VCALENDAR";
        let found = extract_calendar_data(body);
        assert_eq!(found.len(), 2);
        assert!(found[0].contains("SUMMARY:A <b>"));
        assert!(found[1].contains("UID:b"));

        let bare = "garbage BEGIN:VTODO\nUID:c\nSUMMARY:C\nEND:VTODO garbage";
        assert_eq!(extract_calendar_data(bare), vec!["BEGIN:VTODO\nUID:c\nSUMMARY:C\nEND:VTODO".to_string()]);
    }
}
