//! End-to-end dispatch tests against a mock Events API.

use build_notify::notifiers::pagerduty::USER_AGENT_VALUE;
use build_notify::{
    Build, BuildStatus, ConfigError, DeliveryError, Notifier, NotifierConfig, PagerDutyNotifier,
    StaticSecretResolver,
};
use serde_json::{json, Value};
use std::io::Write;
use std::sync::{Arc, Mutex};
use wiremock::matchers::{header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

const RESOURCE: &str = "projects/p1/secrets/pagerduty/versions/latest";

fn config_yaml(filter: &str, delivery: &str) -> String {
    format!(
        r#"
apiVersion: cloud-build-notifiers/v1
kind: PagerDutyNotifier
metadata:
  name: test-notifier
spec:
  notification:
    filter: "{filter}"
    delivery:
{delivery}
  secrets:
    - name: pd
      value: {RESOURCE}
"#
    )
}

const DELIVERY: &str = "      incidentTitle: Build failed
      integrationKey:
        secretRef: pd";

fn secrets() -> StaticSecretResolver {
    StaticSecretResolver::new().with_secret(RESOURCE, "routing-123")
}

fn build(status: BuildStatus) -> Build {
    Build {
        id: "b1".to_string(),
        project_id: "p1".to_string(),
        status,
        log_url: "https://logs/b1".to_string(),
        ..Build::default()
    }
}

/// Log sink shared with a test subscriber.
#[derive(Clone, Default)]
struct LogBuffer(Arc<Mutex<Vec<u8>>>);

impl LogBuffer {
    fn contents(&self) -> String {
        String::from_utf8(self.0.lock().unwrap().clone()).unwrap()
    }
}

impl Write for LogBuffer {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.0.lock().unwrap().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}

async fn configured_notifier(server: &MockServer, filter: &str) -> PagerDutyNotifier {
    let config = NotifierConfig::from_yaml(&config_yaml(filter, DELIVERY)).unwrap();
    let mut notifier = PagerDutyNotifier::with_client(reqwest::Client::new())
        .with_endpoint(format!("{}/v2/enqueue", server.uri()));
    notifier.set_up(&config, &secrets()).await.unwrap();
    notifier
}

#[tokio::test]
async fn test_matching_build_posts_one_incident() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/v2/enqueue"))
        .and(header("content-type", "application/json"))
        .and(header("user-agent", USER_AGENT_VALUE))
        .respond_with(ResponseTemplate::new(201))
        .expect(1)
        .mount(&server)
        .await;

    let notifier = configured_notifier(&server, "status==FAILURE").await;
    notifier
        .send_notification(&build(BuildStatus::Failure))
        .await
        .unwrap();

    let requests = server.received_requests().await.unwrap();
    assert_eq!(requests.len(), 1);

    let body: Value = serde_json::from_slice(&requests[0].body).unwrap();
    assert_eq!(body["payload"]["summary"], "Build failed");
    assert_eq!(body["payload"]["severity"], "critical");
    assert_eq!(
        body["payload"]["source"],
        "https://console.cloud.google.com/cloud-build/builds/b1?project=p1"
    );
    assert_eq!(body["routing_key"], "routing-123");
    assert_eq!(body["event_action"], "trigger");
    assert_eq!(
        body["links"],
        json!([{"href": "https://logs/b1", "text": "Failing build logs"}])
    );

    let raw = String::from_utf8(requests[0].body.clone()).unwrap();
    assert!(raw.contains(r#""summary":"Build failed""#));
    assert!(raw.contains(r#"/builds/b1?project=p1""#));
    assert!(raw.contains(r#""href":"https://logs/b1""#));
}

#[tokio::test]
async fn test_non_matching_build_sends_nothing() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(201))
        .expect(0)
        .mount(&server)
        .await;

    let notifier = configured_notifier(&server, "build.status == Build.Status.FAILURE").await;
    for status in [BuildStatus::Success, BuildStatus::Working, BuildStatus::Cancelled] {
        notifier.send_notification(&build(status)).await.unwrap();
    }

    assert!(server.received_requests().await.unwrap().is_empty());
}

#[tokio::test]
async fn test_server_error_is_not_a_failure() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/v2/enqueue"))
        .respond_with(ResponseTemplate::new(500).set_body_string("boom"))
        .expect(1)
        .mount(&server)
        .await;

    let logs = LogBuffer::default();
    let writer = logs.clone();
    let subscriber = tracing_subscriber::fmt()
        .with_writer(move || writer.clone())
        .with_ansi(false)
        .with_max_level(tracing::Level::WARN)
        .finish();
    let _guard = tracing::subscriber::set_default(subscriber);

    let notifier = configured_notifier(&server, "status == FAILURE").await;
    let result = notifier.send_notification(&build(BuildStatus::Failure)).await;
    assert!(result.is_ok());

    let output = logs.contents();
    assert!(output.contains("WARN"), "{output}");
    assert!(
        output.contains("Got a non-OK response status from PagerDuty"),
        "{output}"
    );
    assert!(output.contains("500"), "{output}");
    assert!(output.contains("boom"), "{output}");
    assert!(!output.contains("routing-123"), "{output}");
}

#[tokio::test]
async fn test_accepted_status_is_still_ok() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(202).set_body_json(json!({
            "status": "success",
            "message": "Event processed",
            "dedup_key": "abc"
        })))
        .expect(1)
        .mount(&server)
        .await;

    let notifier = configured_notifier(&server, "true").await;
    assert!(notifier
        .send_notification(&build(BuildStatus::Success))
        .await
        .is_ok());
}

#[tokio::test]
async fn test_transport_failure_is_delivery_error() {
    // Reserve a port and release it so nothing is listening there.
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);
    let endpoint = format!("http://{addr}/v2/enqueue");

    let config = NotifierConfig::from_yaml(&config_yaml("true", DELIVERY)).unwrap();
    let mut notifier = PagerDutyNotifier::new().with_endpoint(endpoint);
    notifier.set_up(&config, &secrets()).await.unwrap();

    let result = notifier.send_notification(&build(BuildStatus::Failure)).await;
    assert!(matches!(result, Err(DeliveryError::Http(_))));
}

#[tokio::test]
async fn test_setup_requires_string_incident_title() {
    let delivery = "      integrationKey:
        secretRef: pd";
    let config = NotifierConfig::from_yaml(&config_yaml("true", delivery)).unwrap();

    let mut notifier = PagerDutyNotifier::new();
    let result = notifier.set_up(&config, &secrets()).await;
    assert!(matches!(result, Err(ConfigError::Delivery(_))));
    assert!(!notifier.is_configured());

    let delivery = "      incidentTitle: [not, a, string]
      integrationKey:
        secretRef: pd";
    let config = NotifierConfig::from_yaml(&config_yaml("true", delivery)).unwrap();
    let result = notifier.set_up(&config, &secrets()).await;
    assert!(matches!(result, Err(ConfigError::Delivery(_))));
}

#[tokio::test]
async fn test_setup_fails_on_unresolvable_secret() {
    let config = NotifierConfig::from_yaml(&config_yaml("true", DELIVERY)).unwrap();

    let mut notifier = PagerDutyNotifier::new();
    let result = notifier.set_up(&config, &StaticSecretResolver::new()).await;
    assert!(matches!(result, Err(ConfigError::Secret { .. })));

    let delivery = "      incidentTitle: Build failed
      integrationKey:
        secretRef: undeclared";
    let config = NotifierConfig::from_yaml(&config_yaml("true", delivery)).unwrap();
    let result = notifier.set_up(&config, &secrets()).await;
    assert!(matches!(result, Err(ConfigError::SecretNotDeclared(_))));

    assert!(!notifier.is_configured());
}
