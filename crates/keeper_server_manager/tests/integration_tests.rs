use keeper_server_manager::{
    Allocation, ApiProvider, MockApiProvider, PelicanClient, PowerSignal, ServerDetails,
    ServerManagerError, ServerState, ServerVariable,
};

use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;

fn game_details(port: u16) -> ServerDetails {
    ServerDetails {
        uuid: String::new(),
        allocations: vec![Allocation {
            ip: "127.0.0.1".to_string(),
            ip_alias: None,
            port,
            is_default: true,
        }],
        variables: vec![ServerVariable {
            env_variable: "RCON_PORT".to_string(),
            server_value: Some((port + 10).to_string()),
        }],
    }
}

#[tokio::test]
async fn test_mock_lists_and_resolves() {
    let mock_api = MockApiProvider::new()
        .with_server("a1b2", "Valheim", ServerState::Running, game_details(2456))
        .with_server("c3d4", "Rust", ServerState::Offline, game_details(28015));

    let servers = mock_api.list_servers().await.unwrap();
    assert_eq!(servers.len(), 2);

    let details = mock_api.get_server_details("a1b2").await.unwrap();
    assert_eq!(details.uuid, "a1b2");
    assert_eq!(details.resolve_port("", "RCON_PORT"), 2466);
    assert_eq!(details.resolve_port("SERVER_PORT + 1", "QUERY_PORT"), 2457);

    let resources = mock_api.get_server_resources("c3d4").await.unwrap();
    assert_eq!(resources.current_state, ServerState::Offline);
    assert_eq!(mock_api.metadata_calls(), 2);
}

#[tokio::test]
async fn test_mock_stop_records_signal() {
    let mock_api =
        MockApiProvider::new().with_server("a1b2", "Valheim", ServerState::Running, game_details(2456));

    mock_api.stop_server("a1b2").await.unwrap();

    let resources = mock_api.get_server_resources("a1b2").await.unwrap();
    assert_eq!(resources.current_state, ServerState::Stopping);
    assert_eq!(
        mock_api.power_signals(),
        vec![("a1b2".to_string(), PowerSignal::Stop)]
    );
    assert!(mock_api.stop_server("missing").await.is_err());
}

#[tokio::test]
async fn test_mock_failures_are_parse_errors() {
    let mock_api =
        MockApiProvider::new().with_server("a1b2", "Valheim", ServerState::Running, game_details(2456));
    mock_api.set_server_failing("a1b2", true);

    let err = mock_api.get_server_details("a1b2").await.unwrap_err();
    assert!(matches!(err, ServerManagerError::ParseError(_)));

    mock_api.set_server_failing("a1b2", false);
    assert!(mock_api.get_server_details("a1b2").await.is_ok());
}

#[derive(Debug, Clone)]
struct SeenRequest {
    request_line: String,
    authorization: String,
    body: String,
}

/// Minimal HTTP/1.1 responder: one request per connection.
async fn fake_panel(
    routes: Vec<(&'static str, u16, &'static str)>,
) -> (String, Arc<Mutex<Vec<SeenRequest>>>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let base_url = format!("http://{}", listener.local_addr().unwrap());
    let seen = Arc::new(Mutex::new(Vec::new()));
    let recorded = seen.clone();

    tokio::spawn(async move {
        loop {
            let Ok((mut stream, _)) = listener.accept().await else {
                break;
            };
            let mut raw = Vec::new();
            let mut buf = [0u8; 4096];
            let header_end = loop {
                let n = stream.read(&mut buf).await.unwrap();
                if n == 0 {
                    break None;
                }
                raw.extend_from_slice(&buf[..n]);
                if let Some(pos) = raw.windows(4).position(|w| w == b"\r\n\r\n") {
                    break Some(pos + 4);
                }
            };
            let Some(header_end) = header_end else {
                continue;
            };

            let head = String::from_utf8_lossy(&raw[..header_end]).to_string();
            let header = |name: &str| {
                head.lines()
                    .find_map(|line| {
                        let (key, value) = line.split_once(':')?;
                        key.eq_ignore_ascii_case(name).then(|| value.trim().to_string())
                    })
                    .unwrap_or_default()
            };
            let content_length: usize = header("content-length").parse().unwrap_or(0);
            while raw.len() < header_end + content_length {
                let n = stream.read(&mut buf).await.unwrap();
                if n == 0 {
                    break;
                }
                raw.extend_from_slice(&buf[..n]);
            }

            let request_line = head.lines().next().unwrap_or_default().to_string();
            let path = request_line.split(' ').nth(1).unwrap_or_default().to_string();
            recorded.lock().unwrap().push(SeenRequest {
                request_line: request_line.clone(),
                authorization: header("authorization"),
                body: String::from_utf8_lossy(&raw[header_end..]).to_string(),
            });

            let (status, body) = routes
                .iter()
                .find(|(prefix, _, _)| path.starts_with(prefix))
                .map(|(_, status, body)| (*status, *body))
                .unwrap_or((404, "{}"));
            let response = format!(
                "HTTP/1.1 {} X\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
                status,
                body.len(),
                body
            );
            stream.write_all(response.as_bytes()).await.unwrap();
            let _ = stream.shutdown().await;
        }
    });

    (base_url, seen)
}

#[tokio::test]
async fn test_pelican_client_paths_and_tokens() {
    let (base_url, seen) = fake_panel(vec![
        (
            "/api/application/servers",
            200,
            r#"{"object":"list","data":[{"object":"server","attributes":{"id":1,"uuid":"a1b2","name":"Valheim"}}],"meta":{"pagination":{"current_page":1,"total_pages":1}}}"#,
        ),
        (
            "/api/client/servers/a1b2/resources",
            200,
            r#"{"object":"stats","attributes":{"current_state":"running","is_suspended":false,"resources":{"memory_bytes":1}}}"#,
        ),
        (
            "/api/client/servers/a1b2/power",
            204,
            "",
        ),
        (
            "/api/client/servers/a1b2",
            200,
            r#"{"object":"server","attributes":{"uuid":"a1b2","relationships":{"allocations":{"data":[{"attributes":{"ip":"10.0.0.2","port":2456,"is_default":true}}]},"variables":{"data":[{"attributes":{"env_variable":"QUERY_PORT","server_value":"2457"}}]}}}}"#,
        ),
        ("/api/client/servers/broken", 200, ""),
    ])
    .await;

    let client = PelicanClient::new(&base_url, "ptlc_client", "ptla_app");

    let servers = client.list_servers().await.unwrap();
    assert_eq!(servers[0].name, "Valheim");

    let resources = client.get_server_resources("a1b2").await.unwrap();
    assert_eq!(resources.current_state, ServerState::Running);

    let details = client.get_server_details("a1b2").await.unwrap();
    assert_eq!(details.resolve_port("", "QUERY_PORT"), 2457);

    client
        .send_power_signal("a1b2", PowerSignal::Stop)
        .await
        .unwrap();

    let err = client.get_server_resources("broken").await.unwrap_err();
    assert!(matches!(err, ServerManagerError::ParseError(_)));

    let err = client.get_server_resources("zzzz").await.unwrap_err();
    assert!(matches!(err, ServerManagerError::ApiError(_)));

    tokio::time::sleep(Duration::from_millis(20)).await;
    let seen = seen.lock().unwrap().clone();
    assert!(seen[0].request_line.starts_with("GET /api/application/servers?page=1"));
    assert_eq!(seen[0].authorization, "Bearer ptla_app");
    assert_eq!(seen[1].authorization, "Bearer ptlc_client");
    assert!(
        seen[2]
            .request_line
            .starts_with("GET /api/client/servers/a1b2?include=allocations,variables")
    );
    assert!(seen[3].request_line.starts_with("POST /api/client/servers/a1b2/power"));
    assert_eq!(seen[3].body, r#"{"signal":"stop"}"#);
}
