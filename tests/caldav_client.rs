//! Tests of the CalDAV client against a fake server running in-process

use std::sync::{Arc, Mutex};

use axum::extract::State;
use axum::http::{HeaderMap, Method, StatusCode, Uri};
use axum::Router;
use chrono::{Duration, Utc};

use cbra_tasks::client::Client;
use cbra_tasks::task::{ListName, Task};
use cbra_tasks::traits::{CollectionState, TaskRemote};
use cbra_tasks::{Config, Error, NewTask, Store};

const USERNAME: &str = "alice";
const PASSWORD: &str = "secret";
/// `alice:secret`
const AUTHORIZATION: &str = "Basic YWxpY2U6c2VjcmV0";
const COLLECTION_PATH: &str = "/dav/alice/cbratasks/";


#[derive(Clone, Debug)]
struct Recorded {
    method: String,
    path: String,
    depth: Option<String>,
    content_type: Option<String>,
    body: String,
}

#[derive(Default)]
struct FakeServer {
    collection_exists: bool,
    /// (path, iCal content), in server order
    items: Vec<(String, String)>,
    /// Namespace prefix used for `calendar-data` in REPORT responses
    caldav_prefix: String,
    /// Status returned to PROPFIND instead of the regular answer
    propfind_status: Option<StatusCode>,
    requests: Vec<Recorded>,
}

type Shared = Arc<Mutex<FakeServer>>;

fn header(headers: &HeaderMap, name: &str) -> Option<String> {
    headers.get(name).and_then(|v| v.to_str().ok()).map(|v| v.to_string())
}

fn xml_escape(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('\r', "&#13;")
}

async fn handle(State(state): State<Shared>, method: Method, uri: Uri, headers: HeaderMap, body: String) -> (StatusCode, String) {
    let mut server = state.lock().unwrap();
    let path = uri.path().to_string();
    server.requests.push(Recorded {
        method: method.as_str().to_string(),
        path: path.clone(),
        depth: header(&headers, "depth"),
        content_type: header(&headers, "content-type"),
        body: body.clone(),
    });

    if header(&headers, "authorization").as_deref() != Some(AUTHORIZATION) {
        return (StatusCode::UNAUTHORIZED, String::new());
    }

    if path == COLLECTION_PATH {
        return match method.as_str() {
            "PROPFIND" => match (server.propfind_status, server.collection_exists) {
                (Some(status), _) => (status, "something went wrong".to_string()),
                (None, true) => (StatusCode::MULTI_STATUS, format!(
                    r#"<d:multistatus xmlns:d="DAV:"><d:response><d:href>{}</d:href></d:response></d:multistatus>"#, COLLECTION_PATH)),
                (None, false) => (StatusCode::NOT_FOUND, String::new()),
            },
            "MKCALENDAR" => {
                server.collection_exists = true;
                (StatusCode::CREATED, String::new())
            },
            "REPORT" if server.collection_exists => {
                let prefix = if server.caldav_prefix.is_empty() { "C".to_string() } else { server.caldav_prefix.clone() };
                let mut response = format!(r#"<?xml version="1.0" encoding="utf-8"?>
<d:multistatus xmlns:d="DAV:" xmlns:{p}="urn:ietf:params:xml:ns:caldav">"#, p = prefix);
                for (href, ical) in &server.items {
                    response.push_str(&format!(r#"
  <d:response>
    <d:href>{href}</d:href>
    <d:propstat>
      <d:prop><d:getetag>"1"</d:getetag><{p}:calendar-data>{data}</{p}:calendar-data></d:prop>
      <d:status>HTTP/1.1 200 OK</d:status>
    </d:propstat>
  </d:response>"#, href = href, p = prefix, data = xml_escape(ical)));
                }
                response.push_str("\n</d:multistatus>\n");
                (StatusCode::MULTI_STATUS, response)
            },
            _ => (StatusCode::NOT_FOUND, String::new()),
        };
    }

    if path.starts_with(COLLECTION_PATH) && path.ends_with(".ics") {
        return match method.as_str() {
            "PUT" if server.collection_exists => {
                match server.items.iter_mut().find(|(href, _)| href == &path) {
                    Some(item) => {
                        item.1 = body;
                        (StatusCode::NO_CONTENT, String::new())
                    },
                    None => {
                        server.items.push((path, body));
                        (StatusCode::CREATED, String::new())
                    },
                }
            },
            "PUT" => (StatusCode::CONFLICT, String::new()),
            "DELETE" => {
                let len_before = server.items.len();
                server.items.retain(|(href, _)| href != &path);
                if server.items.len() == len_before {
                    (StatusCode::NOT_FOUND, String::new())
                } else {
                    (StatusCode::NO_CONTENT, String::new())
                }
            },
            _ => (StatusCode::METHOD_NOT_ALLOWED, String::new()),
        };
    }

    (StatusCode::NOT_FOUND, String::new())
}

/// Starts a fake server, and returns its base URL
async fn start_server(state: Shared) -> String {
    let _ = env_logger::builder().is_test(true).try_init();

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let app = Router::new().fallback(handle).with_state(state);
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    format!("http://{}/dav/", addr)
}

fn new_server() -> Shared {
    Arc::new(Mutex::new(FakeServer::default()))
}

fn requests(state: &Shared) -> Vec<Recorded> {
    state.lock().unwrap().requests.clone()
}

fn sample_task() -> Task {
    let created = Utc::now() - Duration::days(2);
    let mut task = Task::new("Call, mom", ListName::Remote, created).unwrap();
    let now = Utc::now();
    task.set_note(Some("line1\nline2".to_string()), now);
    task.set_tags(vec!["urgent".to_string()], now);
    task.set_due_date(Some(cbra_tasks::due::end_of_day(now.date_naive()).unwrap()), now);
    task.toggle_completion(now);
    task
}


#[tokio::test]
async fn wire_contract() {
    let state = new_server();
    let url = start_server(state.clone()).await;
    let client = Client::new(&url, USERNAME, PASSWORD, "cbratasks").unwrap();

    assert_eq!(client.probe().await.unwrap(), CollectionState::Missing);
    client.ensure_collection().await.unwrap();
    assert_eq!(client.probe().await.unwrap(), CollectionState::Present);

    let task = sample_task();
    client.put_task(&task).await.unwrap();
    let listed = client.list_tasks().await.unwrap();
    assert_eq!(listed, vec![task.clone()]);

    client.delete_task(task.id()).await.unwrap();
    assert!(client.list_tasks().await.unwrap().is_empty());
    // Deleting a missing item is fine
    client.delete_task(task.id()).await.unwrap();

    let reqs = requests(&state);
    let methods: Vec<&str> = reqs.iter().map(|r| r.method.as_str()).collect();
    assert_eq!(methods, vec!["PROPFIND", "PROPFIND", "MKCALENDAR", "PROPFIND", "PUT", "REPORT", "DELETE", "REPORT", "DELETE"]);

    assert_eq!(reqs[0].path, COLLECTION_PATH);
    assert_eq!(reqs[0].depth.as_deref(), Some("0"));

    let mkcalendar = &reqs[2];
    assert_eq!(mkcalendar.content_type.as_deref(), Some("application/xml"));
    assert!(mkcalendar.body.contains("<D:displayname>cbratasks</D:displayname>"));
    assert!(mkcalendar.body.contains(r#"<C:comp name="VTODO"/>"#));

    let put = &reqs[4];
    assert_eq!(put.path, format!("{}{}.ics", COLLECTION_PATH, task.id()));
    assert_eq!(put.content_type.as_deref(), Some("text/calendar; charset=utf-8"));
    assert!(put.body.contains("SUMMARY:Call\\, mom\r\n"));
    assert!(put.body.contains("DESCRIPTION:line1\\nline2\r\n"));
    assert!(put.body.contains("CATEGORIES:urgent\r\n"));
    assert!(put.body.contains("STATUS:COMPLETED\r\n"));
    let due = cbra_tasks::ical::format_date_time(task.due_date().unwrap());
    assert!(put.body.contains(&format!("DUE:{}\r\n", due)));

    let report = &reqs[5];
    assert_eq!(report.depth.as_deref(), Some("1"));
    assert_eq!(report.content_type.as_deref(), Some("application/xml"));
    assert!(report.body.contains("calendar-query"));
    assert!(report.body.contains(r#"<C:comp-filter name="VTODO"/>"#));
}

#[tokio::test]
async fn calendar_data_with_any_namespace_prefix() {
    for prefix in &["C", "cal", "ns0"] {
        let state = new_server();
        let url = start_server(state.clone()).await;
        let client = Client::new(&url, USERNAME, PASSWORD, "cbratasks").unwrap();
        {
            let mut server = state.lock().unwrap();
            server.collection_exists = true;
            server.caldav_prefix = prefix.to_string();
        }

        let task = sample_task();
        client.put_task(&task).await.unwrap();
        assert_eq!(client.list_tasks().await.unwrap(), vec![task], "prefix {}", prefix);
    }
}

#[tokio::test]
async fn unparseable_items_are_skipped() {
    let state = new_server();
    let url = start_server(state.clone()).await;
    {
        let mut server = state.lock().unwrap();
        server.collection_exists = true;
        server.items.push((format!("{}bad.ics", COLLECTION_PATH),
            "BEGIN:VCALENDAR\r\nVERSION:2.0\r\nBEGIN:VTODO\r\nUID:bad\r\nEND:VTODO\r\nEND:VCALENDAR\r\n".to_string()));
        server.items.push((format!("{}good.ics", COLLECTION_PATH),
            "BEGIN:VCALENDAR\r\nVERSION:2.0\r\nBEGIN:VTODO\r\nUID:good\r\nSUMMARY:Fish & chips <tonight>\r\nEND:VTODO\r\nEND:VCALENDAR\r\n".to_string()));
    }

    let client = Client::new(&url, USERNAME, PASSWORD, "cbratasks").unwrap();
    let tasks = client.list_tasks().await.unwrap();
    assert_eq!(tasks.len(), 1);
    assert_eq!(tasks[0].id(), "good");
    assert_eq!(tasks[0].title(), "Fish & chips <tonight>");
}

#[tokio::test]
async fn unexpected_statuses_are_errors() {
    let state = new_server();
    let url = start_server(state.clone()).await;
    let client = Client::new(&url, USERNAME, PASSWORD, "cbratasks").unwrap();

    state.lock().unwrap().propfind_status = Some(StatusCode::INTERNAL_SERVER_ERROR);
    match client.probe().await {
        Err(Error::Network(msg)) => assert!(msg.contains("500") && msg.contains("something went wrong")),
        other => panic!("unexpected result {:?}", other),
    }

    // REPORT on a collection that does not exist
    assert!(matches!(client.list_tasks().await, Err(Error::Network(_))));
    // PUT into a collection that does not exist
    assert!(matches!(client.put_task(&sample_task()).await, Err(Error::Network(_))));

    let intruder = Client::new(&url, USERNAME, "wrong password", "cbratasks").unwrap();
    state.lock().unwrap().propfind_status = None;
    assert!(matches!(intruder.probe().await, Err(Error::Network(_))));
}

#[tokio::test]
async fn missing_collection_during_sync() {
    let state = new_server();
    let url = start_server(state.clone()).await;

    let dir = tempfile::tempdir().unwrap();
    let mut config = Config::with_data_dir(dir.path());
    config.sync.enabled = true;
    config.sync.url = Some(url);
    config.sync.username = Some(USERNAME.to_string());
    config.sync.password = Some(PASSWORD.to_string());

    // Tasks created while offline
    let offline = Store::open_with(&config, None, Arc::new(cbra_tasks::SystemClock)).unwrap();
    offline.add(NewTask::new("Local")).await.unwrap();
    let shared = offline.add(NewTask::new("Shared").list_name(ListName::Remote)).await.unwrap();
    drop(offline);

    let store = Store::open(&config).unwrap();
    let before = store.all_tasks().await;
    let report = store.sync().await.unwrap();

    assert_eq!(report.pushed, 1);
    assert_eq!(report.pulled, 0);
    assert_eq!(store.all_tasks().await, before);

    let methods: Vec<String> = requests(&state).into_iter().map(|r| r.method).collect();
    assert_eq!(methods, vec!["PROPFIND", "MKCALENDAR", "REPORT", "PUT"]);
    let server = state.lock().unwrap();
    assert_eq!(server.items.len(), 1);
    assert_eq!(server.items[0].0, format!("{}{}.ics", COLLECTION_PATH, shared.id()));
}

#[tokio::test]
async fn uploads_are_stamped_with_the_store_clock() {
    let state = new_server();
    let url = start_server(state.clone()).await;

    let dir = tempfile::tempdir().unwrap();
    let mut config = Config::with_data_dir(dir.path());
    config.sync.enabled = true;
    config.sync.url = Some(url);
    config.sync.username = Some(USERNAME.to_string());
    config.sync.password = Some(PASSWORD.to_string());

    let frozen = chrono::TimeZone::with_ymd_and_hms(&Utc, 2030, 1, 2, 3, 4, 5).unwrap();
    let store = Store::open_with_clock(&config, Arc::new(cbra_tasks::MockClock::new(frozen))).unwrap();
    let task = store.add(NewTask::new("Stamped").list_name(ListName::Remote)).await.unwrap();
    assert_eq!(task.created_at(), &frozen);

    let stamp = cbra_tasks::ical::format_date_time(&frozen);
    let server = state.lock().unwrap();
    assert_eq!(server.items.len(), 1);
    assert!(server.items[0].1.contains(&format!("DTSTAMP:{}\r\n", stamp)));
}
