use http::Extensions;
use paste::paste;
use reqwest::{Client, Request, Response, StatusCode};
use std::sync::{
    atomic::{AtomicU32, Ordering},
    Arc,
};
use std::time::Duration;
use storage_pipeline::{ClientBuilder, ClientWithMiddleware, Error, Middleware, Next, Scope};
use storage_retry::{RetryMiddleware, RetryOptions, RetryPolicyKind};
use wiremock::{
    matchers::{method, path, query_param},
    Mock, MockServer, Respond, ResponseTemplate,
};

use crate::helpers::SimpleServer;

/// Answers `status_code` until the `succeed_on`-th call, which gets a 200.
pub struct RetryResponder(Arc<AtomicU32>, u32, u16);

impl RetryResponder {
    fn new(succeed_on: u32, status_code: u16) -> Self {
        Self(Arc::new(AtomicU32::new(0)), succeed_on, status_code)
    }
}

impl Respond for RetryResponder {
    fn respond(&self, _request: &wiremock::Request) -> ResponseTemplate {
        let calls = self.0.fetch_add(1, Ordering::SeqCst) + 1;
        if calls >= self.1 {
            ResponseTemplate::new(200)
        } else {
            ResponseTemplate::new(self.2)
        }
    }
}

/// Counts the attempts that reach the network and checks each one is bounded by a scope.
#[derive(Clone, Default)]
struct AttemptCounter(Arc<AtomicU32>);

impl AttemptCounter {
    fn get(&self) -> u32 {
        self.0.load(Ordering::SeqCst)
    }
}

#[async_trait::async_trait]
impl Middleware for AttemptCounter {
    async fn handle(
        &self,
        req: Request,
        extensions: &mut Extensions,
        next: Next<'_>,
    ) -> storage_pipeline::Result<Response> {
        assert!(extensions.get::<Scope>().is_some(), "attempt without scope");
        self.0.fetch_add(1, Ordering::SeqCst);
        next.run(req, extensions).await
    }
}

fn fast_retries(max_tries: u32) -> RetryOptions {
    RetryOptions {
        policy: RetryPolicyKind::Exponential,
        max_tries,
        try_timeout: Duration::from_secs(5),
        retry_delay: Duration::from_millis(10),
        max_retry_delay: Duration::from_millis(50),
        secondary_host: None,
    }
}

fn client(options: RetryOptions) -> ClientWithMiddleware {
    ClientBuilder::new(Client::builder().build().unwrap())
        .with(RetryMiddleware::new(options).unwrap())
        .build()
}

macro_rules! assert_retry_succeeds_inner {
    ($x:tt, $name:ident, $status:expr, $tries:tt, $exact:tt, $responder:expr) => {
        #[tokio::test]
        async fn $name() {
            let server = MockServer::start().await;
            Mock::given(method("GET"))
                .and(path("/container/blob"))
                .respond_with($responder)
                .expect($exact)
                .mount(&server)
                .await;

            let resp = client(fast_retries($tries))
                .get(format!("{}/container/blob", server.uri()))
                .send()
                .await
                .expect("call failed");

            assert_eq!(resp.status(), $status);
        }
    };
}

macro_rules! assert_retry_succeeds {
    ($x:tt, $status:expr) => {
        paste! {
            assert_retry_succeeds_inner!($x, [<assert_retry_succeeds_on_ $x>], $status, 3, 3, RetryResponder::new(3_u32, $x));
        }
    };
}

macro_rules! assert_no_retry {
    ($x:tt, $status:expr) => {
        paste! {
            assert_retry_succeeds_inner!($x, [<assert_no_retry_on_ $x>], $status, 3, 1, ResponseTemplate::new($x));
        }
    };
}

// 2xx.
assert_no_retry!(200, StatusCode::OK);
assert_no_retry!(201, StatusCode::CREATED);
assert_no_retry!(202, StatusCode::ACCEPTED);
assert_no_retry!(204, StatusCode::NO_CONTENT);
assert_no_retry!(206, StatusCode::PARTIAL_CONTENT);

// 3xx.
assert_no_retry!(304, StatusCode::NOT_MODIFIED);

// 4xx.
assert_no_retry!(400, StatusCode::BAD_REQUEST);
assert_no_retry!(401, StatusCode::UNAUTHORIZED);
assert_no_retry!(403, StatusCode::FORBIDDEN);
assert_no_retry!(404, StatusCode::NOT_FOUND);
assert_no_retry!(405, StatusCode::METHOD_NOT_ALLOWED);
assert_retry_succeeds!(408, StatusCode::OK);
assert_no_retry!(409, StatusCode::CONFLICT);
assert_no_retry!(412, StatusCode::PRECONDITION_FAILED);
assert_no_retry!(413, StatusCode::PAYLOAD_TOO_LARGE);
assert_no_retry!(416, StatusCode::RANGE_NOT_SATISFIABLE);
assert_retry_succeeds!(429, StatusCode::OK);

// 5xx.
assert_retry_succeeds!(500, StatusCode::OK);
assert_no_retry!(501, StatusCode::NOT_IMPLEMENTED);
assert_retry_succeeds!(502, StatusCode::OK);
assert_retry_succeeds!(503, StatusCode::OK);
assert_retry_succeeds!(504, StatusCode::OK);
assert_no_retry!(505, StatusCode::HTTP_VERSION_NOT_SUPPORTED);
assert_no_retry!(507, StatusCode::INSUFFICIENT_STORAGE);

// Four tries, all of them failing: the last response is handed back.
assert_retry_succeeds_inner!(
    500,
    assert_maximum_tries_is_not_exceeded,
    StatusCode::INTERNAL_SERVER_ERROR,
    4,
    4,
    ResponseTemplate::new(500)
);

#[tokio::test]
async fn assert_timeout_query_param_is_sent() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/container"))
        .and(query_param("restype", "container"))
        .and(query_param("timeout", "5"))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&server)
        .await;

    let resp = client(fast_retries(3))
        .get(format!("{}/container?restype=container&timeout=600", server.uri()))
        .send()
        .await
        .expect("call failed");

    assert_eq!(resp.status(), 200);
}

#[tokio::test]
async fn assert_read_fails_over_to_secondary() {
    let primary = MockServer::start().await;
    let secondary = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/container/blob"))
        .respond_with(ResponseTemplate::new(503))
        .expect(1)
        .mount(&primary)
        .await;
    Mock::given(method("GET"))
        .and(path("/container/blob"))
        .respond_with(ResponseTemplate::new(200).set_body_string("from secondary"))
        .expect(1)
        .mount(&secondary)
        .await;

    let resp = client(RetryOptions {
        secondary_host: Some(secondary.address().to_string()),
        ..fast_retries(4)
    })
    .get(format!("{}/container/blob", primary.uri()))
    .send()
    .await
    .expect("call failed");

    assert_eq!(resp.status(), 200);
    assert_eq!(resp.text().await.unwrap(), "from secondary");
}

#[tokio::test]
async fn assert_secondary_not_found_falls_back_to_primary() {
    let primary = MockServer::start().await;
    let secondary = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/container/blob"))
        .respond_with(RetryResponder::new(3, 503))
        .expect(3)
        .mount(&primary)
        .await;
    Mock::given(method("GET"))
        .and(path("/container/blob"))
        .respond_with(ResponseTemplate::new(404))
        .expect(1)
        .mount(&secondary)
        .await;

    let resp = client(RetryOptions {
        secondary_host: Some(secondary.address().to_string()),
        ..fast_retries(5)
    })
    .get(format!("{}/container/blob", primary.uri()))
    .send()
    .await
    .expect("call failed");

    assert_eq!(resp.status(), 200);
}

#[tokio::test]
async fn assert_writes_stay_on_primary() {
    let primary = MockServer::start().await;
    let secondary = MockServer::start().await;
    Mock::given(method("PUT"))
        .and(path("/container/blob"))
        .respond_with(ResponseTemplate::new(503))
        .expect(3)
        .mount(&primary)
        .await;
    Mock::given(method("PUT"))
        .respond_with(ResponseTemplate::new(201))
        .expect(0)
        .mount(&secondary)
        .await;

    let resp = client(RetryOptions {
        secondary_host: Some(secondary.address().to_string()),
        ..fast_retries(3)
    })
    .put(format!("{}/container/blob", primary.uri()))
    .body("payload")
    .send()
    .await
    .expect("call failed");

    assert_eq!(resp.status(), 503);
}

/// Delays the first `slow` responses by `delay`.
pub struct SlowResponder(Arc<AtomicU32>, u32, Duration);

impl SlowResponder {
    fn new(slow: u32, delay: Duration) -> Self {
        Self(Arc::new(AtomicU32::new(0)), slow, delay)
    }
}

impl Respond for SlowResponder {
    fn respond(&self, _request: &wiremock::Request) -> ResponseTemplate {
        let calls = self.0.fetch_add(1, Ordering::SeqCst) + 1;
        if calls > self.1 {
            ResponseTemplate::new(200)
        } else {
            ResponseTemplate::new(200).set_delay(self.2)
        }
    }
}

#[tokio::test]
async fn assert_retry_on_try_timeout() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/container/blob"))
        .and(query_param("timeout", "1"))
        .respond_with(SlowResponder::new(1, Duration::from_secs(2)))
        .expect(2)
        .mount(&server)
        .await;

    let resp = client(RetryOptions {
        try_timeout: Duration::from_millis(200),
        ..fast_retries(3)
    })
    .get(format!("{}/container/blob", server.uri()))
    .send()
    .await
    .expect("call failed");

    assert_eq!(resp.status(), 200);
}

#[tokio::test]
async fn assert_caller_deadline_is_not_retried() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/container/blob"))
        .respond_with(SlowResponder::new(u32::MAX, Duration::from_secs(2)))
        .mount(&server)
        .await;
    let counter = AttemptCounter::default();
    let client = ClientBuilder::new(Client::new())
        .with(RetryMiddleware::new(fast_retries(4)).unwrap())
        .with(counter.clone())
        .build();

    let err = client
        .get(format!("{}/container/blob", server.uri()))
        .scope(Scope::with_timeout(Duration::from_millis(200)))
        .send()
        .await
        .unwrap_err();

    assert!(matches!(err, Error::Scope(_)), "{err}");
    assert!(err.is_timeout());
    assert_eq!(counter.get(), 1);
}

#[tokio::test]
async fn assert_retry_on_connection_refused() {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let counter = AttemptCounter::default();
    let client = ClientBuilder::new(Client::new())
        .with(RetryMiddleware::new(fast_retries(3)).unwrap())
        .with(counter.clone())
        .build();

    let err = client
        .get(format!("http://{addr}/container/blob"))
        .send()
        .await
        .unwrap_err();

    assert!(err.is_connect(), "{err}");
    assert_eq!(counter.get(), 3);
}

#[tokio::test]
async fn assert_retry_on_incomplete_message() {
    // "HTTP/1.1" alone is well formed up to that point but misses mandatory parts, which
    // hyper reports as IncompleteMessage.
    let incomplete_message = "HTTP/1.1";
    let complete_message = "HTTP/1.1 200 OK\r\ncontent-length: 0\r\n\r\n";

    let simple_server = SimpleServer::new(
        "127.0.0.1",
        None,
        vec![
            incomplete_message.to_string(),
            incomplete_message.to_string(),
            complete_message.to_string(),
        ],
    )
    .await
    .expect("Error when creating a simple server");

    let uri = simple_server.uri();

    tokio::spawn(simple_server.start());

    let resp = client(fast_retries(3))
        .get(format!("{uri}/container/blob"))
        .send()
        .await
        .expect("call failed");

    assert_eq!(resp.status(), 200);
}
