//! Shared utilities for integration testing.

use std::net::SocketAddr;

use cinp_client::CinpClient;
use cinp_server::config::{ServerConfig, UserConfig};
use cinp_server::lifecycle::Shutdown;
use cinp_server::transaction::MemoryStore;
use cinp_server::{demo, HttpServer};
use tokio::net::TcpListener;
use tokio::task::JoinHandle;

/// A library server on an ephemeral port.
pub struct TestServer {
    pub addr: SocketAddr,
    shutdown: Shutdown,
    handle: JoinHandle<Result<(), std::io::Error>>,
}

impl TestServer {
    pub fn client(&self) -> CinpClient {
        CinpClient::new(&format!("http://{}", self.addr), "/api/").unwrap()
    }

    pub fn client_as(&self, auth_id: &str, auth_token: &str) -> CinpClient {
        let mut client = self.client();
        client.set_auth(Some((auth_id.to_string(), auth_token.to_string())));
        client
    }

    pub async fn stop(self) {
        self.shutdown.trigger();
        self.handle.await.unwrap().unwrap();
    }
}

pub fn test_config() -> ServerConfig {
    let mut config = ServerConfig::default();
    config.listener.bind_address = "127.0.0.1:0".to_string();
    config.auth.users = vec![
        UserConfig {
            id: "alice".into(),
            token: "secret".into(),
            superuser: false,
        },
        UserConfig {
            id: "admin".into(),
            token: "hunter2".into(),
            superuser: true,
        },
    ];
    config
}

/// Start the library catalog on an ephemeral port.
pub async fn start_server(config: ServerConfig) -> TestServer {
    let store = MemoryStore::new();
    let catalog = demo::build_catalog(&config.protocol, &store).unwrap();
    let dispatcher = cinp_server::dispatcher(&config, catalog);

    let listener = TcpListener::bind(&config.listener.bind_address).await.unwrap();
    let addr = listener.local_addr().unwrap();

    let shutdown = Shutdown::new();
    let server = HttpServer::new(&config, dispatcher);
    let handle = tokio::spawn(server.run(listener, shutdown.wait()));

    TestServer {
        addr,
        shutdown,
        handle,
    }
}
