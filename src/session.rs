//! Request sequences run against an open client.

use crate::config::Config;
use crate::messages;
use dmcc_client::{Client, ClientError};
use dmcc_protocol::InvokeId;
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

/// Session errors.
#[derive(Debug, Error)]
pub enum SessionError {
    #[error("cannot read request template '{}': {}", .0.display(), .1)]
    Template(PathBuf, #[source] std::io::Error),

    #[error(transparent)]
    Client(#[from] ClientError),
}

const SESSION_IDS: [InvokeId; 5] = [
    InvokeId::new(*b"0001"),
    InvokeId::new(*b"0002"),
    InvokeId::new(*b"0003"),
    InvokeId::new(*b"0004"),
    InvokeId::new(*b"0005"),
];

/// One request and what came back for it.
#[derive(Debug, Clone)]
pub struct Exchange {
    pub name: &'static str,
    pub invoke_id: InvokeId,
    pub response: Option<String>,
}

/// Sends one request and waits for its response.
pub async fn exchange(
    client: &Client,
    name: &'static str,
    invoke_id: InvokeId,
    payload: &str,
    timeout: Duration,
) -> Result<Exchange, SessionError> {
    tracing::info!("Sending {} (invoke_id={})", name, invoke_id);
    client.send(payload, invoke_id).await?;

    let response = client.read(invoke_id, timeout).await;
    match response {
        Some(ref body) => tracing::debug!("{} response:\n{}", name, body),
        None => tracing::warn!("No {} response within {:?}", name, timeout),
    }

    Ok(Exchange {
        name,
        invoke_id,
        response,
    })
}

/// Runs the sample session: application session, device id, monitor start,
/// snapshot, monitor stop.
///
/// A missing response is recorded and the session moves on; send failures
/// end the session.
pub async fn run(client: &Client, config: &Config) -> Result<Vec<Exchange>, SessionError> {
    let switch = &config.switch;
    let timeout = config.session.response_timeout();
    let template_path = &config.session.app_session_template;

    let app_session = messages::load_template(template_path)
        .map_err(|e| SessionError::Template(template_path.clone(), e))?;

    let mut exchanges = Vec::with_capacity(5);

    exchanges.push(
        exchange(
            client,
            "StartApplicationSession",
            SESSION_IDS[0],
            &app_session,
            timeout,
        )
        .await?,
    );

    exchanges.push(
        exchange(
            client,
            "GetDeviceId",
            SESSION_IDS[1],
            &messages::get_device_id(&switch.switch_name, &switch.extension),
            timeout,
        )
        .await?,
    );

    let monitor = exchange(
        client,
        "MonitorStart",
        SESSION_IDS[2],
        &messages::monitor_start(
            &switch.switch_conn_name,
            &switch.switch_name,
            &switch.extension,
        ),
        timeout,
    )
    .await?;
    let cross_ref_id = monitor
        .response
        .as_deref()
        .and_then(messages::monitor_cross_ref_id)
        .map(str::to_owned);
    exchanges.push(monitor);

    exchanges.push(
        exchange(
            client,
            "SnapshotDevice",
            SESSION_IDS[3],
            &messages::snapshot_device(
                &switch.switch_conn_name,
                &switch.switch_name,
                &switch.extension,
            ),
            timeout,
        )
        .await?,
    );

    let cross_ref_id = cross_ref_id.unwrap_or_else(|| {
        tracing::info!(
            "No monitorCrossRefID learned, using {}",
            messages::DEFAULT_MONITOR_CROSS_REF_ID
        );
        messages::DEFAULT_MONITOR_CROSS_REF_ID.to_string()
    });
    exchanges.push(
        exchange(
            client,
            "MonitorStop",
            SESSION_IDS[4],
            &messages::monitor_stop(&cross_ref_id),
            timeout,
        )
        .await?,
    );

    Ok(exchanges)
}

#[cfg(test)]
mod tests {
    use super::*;
    use dmcc_client::ConnectionConfig;
    use dmcc_protocol::{encode, Decoder, Frame};
    use std::io::Write;
    use tokio::io::{AsyncReadExt, AsyncWriteExt, DuplexStream};

    fn test_client() -> (Client, DuplexStream) {
        let (client_side, peer) = tokio::io::duplex(256 * 1024);
        let config = ConnectionConfig::new("127.0.0.1", 4722)
            .with_read_timeout(Duration::from_millis(100))
            .with_poll_interval(Duration::from_millis(20));
        (Client::from_stream(client_side, config), peer)
    }

    fn test_config(template: &std::path::Path) -> Config {
        let mut config = Config::default();
        config.switch.switch_name = "192.168.1.32".into();
        config.switch.extension = "12345".into();
        config.session.app_session_template = template.to_path_buf();
        config.session.response_timeout_secs = 1;
        config
    }

    /// Answers every request; MonitorStart gets a cross-ref id, `skip` is ignored.
    async fn fake_server(mut peer: DuplexStream, skip: Option<&'static str>) -> Vec<Frame> {
        let mut decoder = Decoder::new();
        let mut buf = [0u8; 8192];
        let mut seen = Vec::new();

        loop {
            while let Some(frame) = decoder.decode_frame().unwrap() {
                let body = frame.payload_str().unwrap().to_string();
                let reply = if body.contains("<MonitorStart") {
                    "<MonitorStartResponse><monitorCrossRefID>77</monitorCrossRefID></MonitorStartResponse>"
                } else {
                    "<Ack/>"
                };
                let skipped = skip.is_some_and(|s| body.contains(s));
                if !skipped {
                    peer.write_all(&encode(frame.invoke_id, reply).unwrap())
                        .await
                        .unwrap();
                }
                seen.push(frame);
            }
            let n = peer.read(&mut buf).await.unwrap();
            if n == 0 {
                return seen;
            }
            decoder.extend(&buf[..n]);
        }
    }

    #[tokio::test]
    async fn test_full_session() {
        let mut template = tempfile::NamedTempFile::new().unwrap();
        write!(template, "<StartApplicationSession/>").unwrap();

        let (client, peer) = test_client();
        let server = tokio::spawn(fake_server(peer, None));

        let exchanges = run(&client, &test_config(template.path())).await.unwrap();
        client.shutdown().await.unwrap();
        let frames = server.await.unwrap();

        let names: Vec<_> = exchanges.iter().map(|e| e.name).collect();
        assert_eq!(
            names,
            [
                "StartApplicationSession",
                "GetDeviceId",
                "MonitorStart",
                "SnapshotDevice",
                "MonitorStop"
            ]
        );
        let ids: Vec<_> = exchanges.iter().map(|e| e.invoke_id.to_string()).collect();
        assert_eq!(ids, ["0001", "0002", "0003", "0004", "0005"]);
        assert!(exchanges.iter().all(|e| e.response.is_some()));

        assert_eq!(frames.len(), 5);
        assert_eq!(frames[0].payload_str().unwrap(), "<StartApplicationSession/>");
        let stop = frames[4].payload_str().unwrap();
        assert!(stop.contains("<monitorCrossRefID>77</monitorCrossRefID>"));
    }

    #[tokio::test]
    async fn test_missing_response_does_not_abort() {
        let mut template = tempfile::NamedTempFile::new().unwrap();
        write!(template, "<StartApplicationSession/>").unwrap();

        let (client, peer) = test_client();
        let server = tokio::spawn(fake_server(peer, Some("<MonitorStart")));

        let exchanges = run(&client, &test_config(template.path())).await.unwrap();
        client.shutdown().await.unwrap();
        let frames = server.await.unwrap();

        assert_eq!(exchanges.len(), 5);
        assert!(exchanges[2].response.is_none());
        assert!(exchanges[4].response.is_some());

        // Falls back to the fixed cross-ref id.
        let stop = frames[4].payload_str().unwrap();
        assert!(stop.contains("<monitorCrossRefID>1111111</monitorCrossRefID>"));
    }

    #[tokio::test]
    async fn test_missing_template() {
        let (client, _peer) = test_client();
        let config = test_config(std::path::Path::new("/nonexistent/appsession.xml"));

        let err = run(&client, &config).await.unwrap_err();
        assert!(matches!(err, SessionError::Template(..)));
        assert!(err.to_string().contains("appsession.xml"));

        client.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn test_send_on_closed_client_ends_session() {
        let mut template = tempfile::NamedTempFile::new().unwrap();
        write!(template, "<StartApplicationSession/>").unwrap();

        let (client, _peer) = test_client();
        client.shutdown().await.unwrap();

        let err = run(&client, &test_config(template.path())).await.unwrap_err();
        assert!(matches!(
            err,
            SessionError::Client(ClientError::NotConnected)
        ));
    }
}
