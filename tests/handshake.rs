use std::io;
use std::sync::Arc;

use rustls::pki_types::ServerName;
use rustls::{ClientConfig, ServerConfig};
use testca::RootAuthority;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::task::JoinHandle;
use tokio_rustls::{TlsAcceptor, TlsConnector};

const REQUEST: &[u8] = b"ping";
const RESPONSE: &[u8] = b"pong";

/// Accepts one connection, reads a request and answers it.
async fn serve_once(config: ServerConfig) -> (u16, JoinHandle<io::Result<Vec<u8>>>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    let acceptor = TlsAcceptor::from(Arc::new(config));

    let handle = tokio::spawn(async move {
        let (stream, _) = listener.accept().await?;
        let mut tls = acceptor.accept(stream).await?;
        let mut request = vec![0u8; REQUEST.len()];
        tls.read_exact(&mut request).await?;
        tls.write_all(RESPONSE).await?;
        tls.shutdown().await?;
        Ok::<_, io::Error>(request)
    });
    (port, handle)
}

/// Connects, sends the request and reads the answer until the server closes.
async fn exchange(config: ClientConfig, port: u16, server_name: &'static str) -> io::Result<Vec<u8>> {
    let connector = TlsConnector::from(Arc::new(config));
    let stream = TcpStream::connect(("127.0.0.1", port)).await?;
    let server_name = ServerName::try_from(server_name)
        .map_err(|e| io::Error::new(io::ErrorKind::InvalidInput, e))?;
    let mut tls = connector.connect(server_name, stream).await?;
    tls.write_all(REQUEST).await?;
    let mut response = Vec::new();
    tls.read_to_end(&mut response).await?;
    Ok(response)
}

/// Tests a full handshake and data exchange against a localhost server certificate.
#[tokio::test]
async fn localhost_round_trip() {
    let ca = RootAuthority::generate().unwrap();
    let server = ca.issue_localhost_server_certificate().unwrap();

    for server_name in ["localhost", "127.0.0.1"] {
        let (port, handle) = serve_once(server.server_tls_config().unwrap()).await;
        let response = exchange(ca.client_tls_config().unwrap(), port, server_name)
            .await
            .unwrap();
        assert_eq!(response, RESPONSE);
        assert_eq!(handle.await.unwrap().unwrap(), REQUEST);
    }
}

/// Tests that a client trusting a different authority rejects the server, and that the
/// server observes the failed handshake too.
#[tokio::test]
async fn foreign_root_rejected() {
    let ca = RootAuthority::generate().unwrap();
    let other = RootAuthority::generate().unwrap();
    let server = ca.issue_localhost_server_certificate().unwrap();

    let (port, handle) = serve_once(server.server_tls_config().unwrap()).await;
    let result = exchange(other.client_tls_config().unwrap(), port, "localhost").await;
    assert!(result.is_err());
    assert!(handle.await.unwrap().is_err());
}

/// Tests that a name missing from the SANs fails verification.
#[tokio::test]
async fn unknown_name_rejected() {
    let ca = RootAuthority::generate().unwrap();
    let server = ca.issue_localhost_server_certificate().unwrap();

    let (port, handle) = serve_once(server.server_tls_config().unwrap()).await;
    let result = exchange(ca.client_tls_config().unwrap(), port, "example.com").await;
    assert!(result.is_err());
    assert!(handle.await.unwrap().is_err());
}

/// Tests mutual TLS with both certificates issued by the same authority.
#[tokio::test]
async fn mutual_tls_round_trip() {
    let ca = RootAuthority::generate().unwrap();
    let pool = ca.trust_pool();
    let server = ca.issue_localhost_server_certificate().unwrap();
    let client = ca.issue_localhost_client_certificate().unwrap();

    let (port, handle) = serve_once(server.mutual_server_tls_config(&pool).unwrap()).await;
    let response = exchange(client.client_tls_config(&pool).unwrap(), port, "localhost")
        .await
        .unwrap();
    assert_eq!(response, RESPONSE);
    assert_eq!(handle.await.unwrap().unwrap(), REQUEST);
}

/// Tests that a server requiring client certificates turns away an anonymous client and a
/// client issued by another authority.
#[tokio::test]
async fn mutual_tls_requires_trusted_client() {
    let ca = RootAuthority::generate().unwrap();
    let other = RootAuthority::generate().unwrap();
    let pool = ca.trust_pool();
    let server = ca.issue_localhost_server_certificate().unwrap();
    let stranger = other.issue_localhost_client_certificate().unwrap();

    let clients = [
        ca.client_tls_config().unwrap(),
        stranger.client_tls_config(&pool).unwrap(),
    ];
    for client in clients {
        let (port, handle) = serve_once(server.mutual_server_tls_config(&pool).unwrap()).await;
        // TLS 1.3 clients finish before the server checks their certificate, so the
        // rejection may only surface on the first read.
        let result = exchange(client, port, "localhost").await;
        assert!(result.is_err());
        assert!(handle.await.unwrap().is_err());
    }
}
