// tests/common/mod.rs
#![allow(dead_code)]

use hyper::service::{make_service_fn, service_fn};
use hyper::{Body, Response, Server};
use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tcp_load_balancer::config::{
    BackendConfig, Config, GeneralConfig, HealthCheckConfig, MetricsConfig, RetryConfig,
};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;

/// TCP echo server that counts accepted connections.
pub async fn spawn_echo_backend() -> (SocketAddr, Arc<AtomicUsize>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let accepted = Arc::new(AtomicUsize::new(0));

    let counter = accepted.clone();
    tokio::spawn(async move {
        loop {
            let (mut socket, _) = match listener.accept().await {
                Ok(conn) => conn,
                Err(_) => return,
            };
            counter.fetch_add(1, Ordering::SeqCst);

            tokio::spawn(async move {
                let mut buf = [0u8; 1024];
                loop {
                    match socket.read(&mut buf).await {
                        Ok(0) | Err(_) => return,
                        Ok(n) => {
                            if socket.write_all(&buf[..n]).await.is_err() {
                                return;
                            }
                        }
                    }
                }
            });
        }
    });

    (addr, accepted)
}

/// HTTP server answering 200 on every path.
pub fn spawn_health_server(listener: std::net::TcpListener) -> SocketAddr {
    listener.set_nonblocking(true).unwrap();
    let addr = listener.local_addr().unwrap();

    let make_svc = make_service_fn(|_conn| async {
        Ok::<_, Infallible>(service_fn(|_req| async {
            Ok::<_, Infallible>(Response::new(Body::from("OK")))
        }))
    });
    let server = Server::from_tcp(listener).unwrap().serve(make_svc);
    tokio::spawn(server);

    addr
}

/// An address nothing listens on right now.
pub fn reserve_addr() -> SocketAddr {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    listener.local_addr().unwrap()
}

pub fn config(backends: Vec<BackendConfig>, strategy: &str) -> Config {
    Config {
        general: GeneralConfig {
            bind_address: reserve_addr().to_string(),
            log_level: "debug".to_string(),
            max_connections: 0,
            connection_timeout_ms: 1_000,
        },
        backend_servers: backends,
        strategy: strategy.to_string(),
        health_check: HealthCheckConfig {
            interval_ms: 100,
            timeout_ms: 1_000,
            ..HealthCheckConfig::default()
        },
        retry: RetryConfig {
            max_attempts: 2,
            backoff_base_ms: 1,
            backoff_max_ms: 5,
        },
        metrics: MetricsConfig::default(),
    }
}

pub async fn wait_until(timeout: Duration, mut condition: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        if condition() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    condition()
}
