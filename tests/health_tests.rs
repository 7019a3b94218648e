// tests/health_tests.rs
mod common;

use common::{config, reserve_addr, spawn_health_server, wait_until};
use std::time::Duration;
use tcp_load_balancer::config::BackendConfig;
use tcp_load_balancer::{App, StartupError};
use tokio::net::TcpListener;

#[tokio::test]
async fn test_bootstrap_and_recovery() {
    let up1 = spawn_health_server(std::net::TcpListener::bind("127.0.0.1:0").unwrap());
    let up2 = spawn_health_server(std::net::TcpListener::bind("127.0.0.1:0").unwrap());
    let late = reserve_addr();

    let cfg = config(
        vec![
            BackendConfig::new(up1.to_string(), 1),
            BackendConfig::new(late.to_string(), 1),
            BackendConfig::new(up2.to_string(), 1),
        ],
        "RoundRobin",
    );

    let app = App::bootstrap(cfg).await.unwrap();
    let registry = app.context().registry.clone();
    assert_eq!(registry.alive_count(), 2);
    assert!(!registry.get_backend(1).unwrap().is_alive());

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let server = tokio::spawn(app.serve(listener));

    spawn_health_server(std::net::TcpListener::bind(late).unwrap());

    assert!(wait_until(Duration::from_secs(5), || registry.alive_count() == 3).await);
    assert!(registry.get_backend(1).unwrap().is_alive());

    server.abort();
}

#[tokio::test]
async fn test_startup_aborts_when_all_backends_down() {
    let cfg = config(
        vec![
            BackendConfig::new(reserve_addr().to_string(), 1),
            BackendConfig::new(reserve_addr().to_string(), 1),
        ],
        "LeastConnections",
    );
    let bind_address = cfg.general.bind_address.clone();

    let err = match App::bootstrap(cfg).await {
        Ok(_) => panic!("bootstrap must fail when no backend is alive"),
        Err(e) => e,
    };
    assert!(matches!(
        err.downcast_ref::<StartupError>(),
        Some(StartupError::NoLiveBackends(2))
    ));

    // the proxy address was never bound
    assert!(std::net::TcpListener::bind(&bind_address).is_ok());
}

#[tokio::test]
async fn test_invalid_config_aborts_startup() {
    let mut cfg = config(vec![BackendConfig::new("127.0.0.1:1", 1)], "Random");
    cfg.health_check.enabled = false;
    assert!(App::bootstrap(cfg).await.is_err());
}
