use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use http::{HeaderMap, HeaderValue, Method};
use sha2::Digest;
use url::Url;

use gatepass_rs::{
    CHALLENGE_HEADER, DeviceProfile, GateClient, HostEnvironment, HttpTransport, PowChallenge,
    PowSolver, REASON_HEADER, REQUEST_ID_HEADER, SOLUTION_HEADER, TransportError,
    TransportResponse, VISITOR_ID_HEADER, decode_solution, encode_challenge, verify_solution,
};

const SERVICE_URL: &str = "https://api.example.com/session";

#[derive(Debug, Clone)]
struct RecordedCall {
    method: Method,
    url: Url,
    headers: HeaderMap,
    body: Option<Vec<u8>>,
}

struct ScriptedResponse {
    status: u16,
    headers: HeaderMap,
}

/// Scripted transport: answers the identify endpoint with 200 and pops the
/// scripted queue for everything else.
struct StubTransport {
    scripted: Mutex<Vec<ScriptedResponse>>,
    calls: Mutex<Vec<RecordedCall>>,
}

impl StubTransport {
    fn new(scripted: Vec<ScriptedResponse>) -> Arc<Self> {
        Arc::new(Self {
            scripted: Mutex::new(scripted.into_iter().rev().collect()),
            calls: Mutex::new(Vec::new()),
        })
    }

    fn service_calls(&self) -> Vec<RecordedCall> {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .filter(|call| call.url.path() != "/identify")
            .cloned()
            .collect()
    }

    fn identify_calls(&self) -> usize {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .filter(|call| call.url.path() == "/identify")
            .count()
    }
}

#[async_trait]
impl HttpTransport for StubTransport {
    async fn send(
        &self,
        method: &Method,
        url: &Url,
        headers: &HeaderMap,
        body: Option<&[u8]>,
    ) -> Result<TransportResponse, TransportError> {
        self.calls.lock().unwrap().push(RecordedCall {
            method: method.clone(),
            url: url.clone(),
            headers: headers.clone(),
            body: body.map(|b| b.to_vec()),
        });

        if url.path() == "/identify" {
            return Ok(TransportResponse {
                status: 200,
                headers: HeaderMap::new(),
                body: Bytes::new(),
                url: url.clone(),
            });
        }

        let next = self
            .scripted
            .lock()
            .unwrap()
            .pop()
            .expect("no scripted response left");
        Ok(TransportResponse {
            status: next.status,
            headers: next.headers,
            body: Bytes::new(),
            url: url.clone(),
        })
    }
}

fn ok() -> ScriptedResponse {
    ScriptedResponse {
        status: 200,
        headers: HeaderMap::new(),
    }
}

fn locked(challenge: &PowChallenge, reason: &str) -> ScriptedResponse {
    let mut headers = HeaderMap::new();
    headers.insert(
        CHALLENGE_HEADER,
        HeaderValue::from_str(&encode_challenge(challenge)).unwrap(),
    );
    if !reason.is_empty() {
        headers.insert(REASON_HEADER, HeaderValue::from_str(reason).unwrap());
    }
    ScriptedResponse {
        status: 423,
        headers,
    }
}

fn locked_raw(header_value: &str) -> ScriptedResponse {
    let mut headers = HeaderMap::new();
    headers.insert(CHALLENGE_HEADER, HeaderValue::from_str(header_value).unwrap());
    ScriptedResponse {
        status: 423,
        headers,
    }
}

fn challenge(difficulty: u32) -> PowChallenge {
    PowChallenge {
        nonce: "abc".into(),
        difficulty,
        timestamp: 1_700_000_000,
        ttl: 60,
    }
}

fn test_environment() -> Arc<HostEnvironment> {
    Arc::new(HostEnvironment::with_profile(DeviceProfile::chrome_desktop()))
}

fn quiet_client(transport: Arc<StubTransport>) -> GateClient {
    GateClient::builder()
        .with_transport(transport)
        .with_environment(test_environment())
        .disable_identify()
        .build()
        .unwrap()
}

#[tokio::test]
async fn attaches_identity_headers_to_requests() {
    let transport = StubTransport::new(vec![ok()]);
    let client = quiet_client(transport.clone());

    let response = client.get(SERVICE_URL).await.unwrap();
    assert_eq!(response.status(), 200);

    let calls = transport.service_calls();
    assert_eq!(calls.len(), 1);
    let visitor_id = calls[0].headers.get(VISITOR_ID_HEADER).unwrap();
    assert_eq!(visitor_id.to_str().unwrap().len(), 20);
    assert!(calls[0].headers.contains_key(REQUEST_ID_HEADER));
}

#[tokio::test]
async fn solves_challenge_and_replays_exactly_once() {
    let challenge = challenge(8);
    let transport = StubTransport::new(vec![locked(&challenge, "too many requests"), ok()]);
    let client = quiet_client(transport.clone());

    let response = client
        .post(SERVICE_URL, b"payload".to_vec())
        .await
        .unwrap();
    assert_eq!(response.status(), 200);
    assert!(!response.is_locked());

    let calls = transport.service_calls();
    assert_eq!(calls.len(), 2);

    let replay = &calls[1];
    assert_eq!(replay.method, Method::POST);
    assert_eq!(replay.url.as_str(), SERVICE_URL);
    // Body captured before the first send is resent verbatim.
    assert_eq!(replay.body.as_deref(), Some(b"payload".as_slice()));
    assert!(replay.headers.contains_key(VISITOR_ID_HEADER));

    let encoded = replay.headers.get(SOLUTION_HEADER).unwrap().to_str().unwrap();
    let solution = decode_solution(encoded).unwrap();
    assert!(verify_solution(&challenge, &solution));

    // Independent check of the difficulty target on the raw digest.
    let digest = hex::encode(sha2::Sha256::digest(
        format!("abc:{}", solution.counter).as_bytes(),
    ));
    assert!(digest.starts_with("00"));
}

#[tokio::test]
async fn malformed_challenge_passes_the_lock_through() {
    let transport = StubTransport::new(vec![locked_raw("not base64")]);
    let client = quiet_client(transport.clone());

    let response = client.get(SERVICE_URL).await.unwrap();
    assert_eq!(response.status(), 423);
    assert!(response.is_locked());
    // No replay was attempted.
    assert_eq!(transport.service_calls().len(), 1);
}

#[tokio::test]
async fn missing_challenge_header_passes_the_lock_through() {
    let transport = StubTransport::new(vec![ScriptedResponse {
        status: 423,
        headers: HeaderMap::new(),
    }]);
    let client = quiet_client(transport.clone());

    let response = client.get(SERVICE_URL).await.unwrap();
    assert_eq!(response.status(), 423);
    assert_eq!(transport.service_calls().len(), 1);
}

#[tokio::test]
async fn a_second_lock_is_returned_without_another_cycle() {
    let challenge = challenge(4);
    let transport = StubTransport::new(vec![
        locked(&challenge, "slow down"),
        locked(&challenge, "slow down"),
    ]);
    let client = quiet_client(transport.clone());

    let response = client.get(SERVICE_URL).await.unwrap();
    // The replay's 423 surfaces as-is; never two solves per request.
    assert_eq!(response.status(), 423);
    assert_eq!(transport.service_calls().len(), 2);
}

#[tokio::test]
async fn auto_solve_can_be_disabled() {
    let challenge = challenge(4);
    let transport = StubTransport::new(vec![locked(&challenge, "")]);
    let client = GateClient::builder()
        .with_transport(transport.clone())
        .with_environment(test_environment())
        .disable_identify()
        .disable_auto_solve()
        .build()
        .unwrap();

    let response = client.get(SERVICE_URL).await.unwrap();
    assert_eq!(response.status(), 423);
    assert_eq!(transport.service_calls().len(), 1);
}

#[tokio::test]
async fn solver_exhaustion_fails_open_and_fires_callback_once() {
    let challenge = challenge(32);
    let transport = StubTransport::new(vec![locked(&challenge, "")]);
    let failures = Arc::new(Mutex::new(Vec::new()));
    let sink = failures.clone();
    let client = GateClient::builder()
        .with_transport(transport.clone())
        .with_environment(test_environment())
        .disable_identify()
        .with_solver(PowSolver::new().with_max_iterations(50))
        .on_challenge_failed(move |error| sink.lock().unwrap().push(error.to_string()))
        .build()
        .unwrap();

    let response = client.get(SERVICE_URL).await.unwrap();
    assert_eq!(response.status(), 423);
    assert_eq!(transport.service_calls().len(), 1);

    let failures = failures.lock().unwrap();
    assert_eq!(failures.len(), 1);
    assert!(failures[0].contains("took too long"));
}

#[tokio::test]
async fn challenge_callbacks_fire_in_order() {
    let challenge = challenge(8);
    let transport = StubTransport::new(vec![locked(&challenge, "too many requests"), ok()]);
    let log = Arc::new(Mutex::new(Vec::new()));
    let received_log = log.clone();
    let solved_log = log.clone();
    let client = GateClient::builder()
        .with_transport(transport.clone())
        .with_environment(test_environment())
        .disable_identify()
        .on_challenge_received(move |reason| {
            received_log
                .lock()
                .unwrap()
                .push(format!("received:{reason}"));
        })
        .on_challenge_solved(move |_solve_time| {
            solved_log.lock().unwrap().push("solved".to_string());
        })
        .build()
        .unwrap();

    let response = client.get(SERVICE_URL).await.unwrap();
    assert_eq!(response.status(), 200);
    assert_eq!(
        *log.lock().unwrap(),
        vec!["received:too many requests".to_string(), "solved".to_string()]
    );
}

#[tokio::test]
async fn identify_report_goes_out_once_per_session() {
    let transport = StubTransport::new(vec![ok(), ok()]);
    let client = GateClient::builder()
        .with_transport(transport.clone())
        .with_environment(test_environment())
        .with_identify_url("https://collector.example")
        .build()
        .unwrap();

    client.get(SERVICE_URL).await.unwrap();
    client.get(SERVICE_URL).await.unwrap();
    // The report is deferred; give the background task room to land.
    tokio::time::sleep(Duration::from_millis(400)).await;

    assert_eq!(transport.identify_calls(), 1);
    assert_eq!(transport.service_calls().len(), 2);
}

#[tokio::test]
async fn new_session_reports_identity_again() {
    let transport = StubTransport::new(vec![ok(), ok()]);
    let client = GateClient::builder()
        .with_transport(transport.clone())
        .with_environment(test_environment())
        .build()
        .unwrap();

    client.get(SERVICE_URL).await.unwrap();
    tokio::time::sleep(Duration::from_millis(400)).await;
    assert_eq!(transport.identify_calls(), 1);

    client.new_session();
    client.get(SERVICE_URL).await.unwrap();
    tokio::time::sleep(Duration::from_millis(400)).await;
    assert_eq!(transport.identify_calls(), 2);
}

#[tokio::test]
async fn metrics_track_the_challenge_cycle() {
    let challenge = challenge(8);
    let transport = StubTransport::new(vec![locked(&challenge, ""), ok()]);
    let client = quiet_client(transport.clone());

    client.get(SERVICE_URL).await.unwrap();

    let stats = client.metrics().unwrap();
    assert_eq!(stats.total_requests, 1);
    assert_eq!(stats.locked_responses, 1);
    assert_eq!(stats.challenges_solved, 1);
    assert_eq!(stats.challenges_failed, 0);
    assert!(stats.average_solve_time.is_some());
}
