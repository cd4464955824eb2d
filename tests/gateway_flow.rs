use axum::body::Body;
use axum::http::{Request, StatusCode};
use futures::{SinkExt, StreamExt};
use im_gateway::breaker::CircuitBreakers;
use im_gateway::bus::{BusConsumer, MemoryBroker};
use im_gateway::config::Config;
use im_gateway::gateway::{build_router, serve, AppState, ExternalServices};
use im_gateway::balancer::LoadMonitor;
use im_gateway::rpc::MockBackends;
use im_gateway::session::HEARTBEAT_FRAME;
use im_gateway::store::MemoryStore;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::Notify;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};
use tower::ServiceExt;

type Client = WebSocketStream<MaybeTlsStream<TcpStream>>;

struct Harness {
    state: Arc<AppState>,
    backends: Arc<MockBackends>,
    broker: MemoryBroker,
}

fn harness(config: Config) -> Harness {
    let backends = Arc::new(MockBackends::new());
    let broker = MemoryBroker::new(64);
    let breakers = Arc::new(CircuitBreakers::new(config.breakers.clone()));
    let state = AppState::new(
        config,
        ExternalServices {
            store: Arc::new(MemoryStore::new()),
            backends: backends.clone(),
            publisher: Arc::new(broker.publisher()),
            breakers,
            monitor: Arc::new(LoadMonitor::new()),
        },
    )
    .unwrap();
    Harness {
        state: Arc::new(state),
        backends,
        broker,
    }
}

async fn connect(addr: std::net::SocketAddr) -> Client {
    let mut request = format!("ws://{}/ws", addr).into_client_request().unwrap();
    request
        .headers_mut()
        .insert("Authorization", "Bearer test-token".parse().unwrap());
    let (client, _) = tokio_tungstenite::connect_async(request).await.unwrap();
    client
}

/// Next text frame that is not a heartbeat
async fn next_frame(client: &mut Client) -> String {
    loop {
        let message = tokio::time::timeout(Duration::from_secs(5), client.next())
            .await
            .expect("timed out waiting for a frame")
            .expect("connection closed")
            .unwrap();
        if let Message::Text(text) = message {
            if text != HEARTBEAT_FRAME {
                return text;
            }
        }
    }
}

async fn request(client: &mut Client, frame: &str) -> String {
    client.send(Message::Text(frame.to_string())).await.unwrap();
    next_frame(client).await
}

#[tokio::test]
async fn message_is_stored_published_and_pushed_to_recipient() {
    let harness = harness(Config::default());
    harness.backends.add_user("alice", "pw-a");
    harness.backends.add_user("bob", "pw-b");

    let shutdown = Arc::new(Notify::new());
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(serve(listener, harness.state.clone(), shutdown.clone()));

    let consumer = BusConsumer::new(
        Arc::new(harness.broker.subscribe()),
        harness.state.sessions.clone(),
        &harness.state.config.bus,
    );
    let consumer_shutdown = shutdown.clone();
    tokio::spawn(async move { consumer.run(consumer_shutdown).await });

    let mut alice = connect(addr).await;
    let mut bob = connect(addr).await;
    assert_eq!(request(&mut alice, "login|alice|pw-a").await, "welcome|alice");
    assert_eq!(request(&mut bob, "login|bob|pw-b").await, "welcome|bob");

    alice
        .send(Message::Text("sendMessage|alice|bob|hello|there".to_string()))
        .await
        .unwrap();

    assert_eq!(next_frame(&mut bob).await, "New message from alice: hello|there");

    let mut alice_frames = vec![next_frame(&mut alice).await, next_frame(&mut alice).await];
    alice_frames.sort();
    assert_eq!(
        alice_frames,
        vec![
            "Message to bob sent: hello|there".to_string(),
            "ok|sendMessage|bob".to_string(),
        ]
    );

    let sent = harness.backends.sent_messages();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].content, "hello|there");

    shutdown.notify_waiters();
}

#[tokio::test]
async fn sending_before_login_is_rejected() {
    let harness = harness(Config::default());
    let shutdown = Arc::new(Notify::new());
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(serve(listener, harness.state.clone(), shutdown.clone()));

    let mut client = connect(addr).await;
    let reply = request(&mut client, "sendMessage|alice|bob|hi").await;
    assert!(reply.starts_with("error|UNAUTHENTICATED|"), "{}", reply);

    let reply = request(&mut client, "bogus").await;
    assert!(reply.starts_with("error|INVALID_INPUT|"), "{}", reply);

    assert!(harness.backends.sent_messages().is_empty());
    shutdown.notify_waiters();
}

#[tokio::test]
async fn binary_frames_get_an_error_and_the_connection_stays_usable() {
    let harness = harness(Config::default());
    harness.backends.add_user("alice", "pw-a");
    let shutdown = Arc::new(Notify::new());
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(serve(listener, harness.state.clone(), shutdown.clone()));

    let mut client = connect(addr).await;
    client.send(Message::Binary(vec![1, 2, 3])).await.unwrap();
    let reply = next_frame(&mut client).await;
    assert!(reply.starts_with("error|INVALID_INPUT|"), "{}", reply);

    assert_eq!(request(&mut client, "login|alice|pw-a").await, "welcome|alice");
    shutdown.notify_waiters();
}

#[tokio::test]
async fn load_reports_feed_the_monitor() {
    let harness = harness(Config::default());
    let app = build_router(harness.state.clone());

    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/report_load")
                .header("content-type", "application/json")
                .body(Body::from(r#"{"endpoint":"10.0.0.7:50052","load":37}"#))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(harness.state.monitor.get_load("10.0.0.7:50052"), 37);

    let response = app
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/report_load")
                .body(Body::from("endpoint=10.0.0.7"))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(harness.state.monitor.get_load("10.0.0.7:50052"), 37);
}
