//! Plugin server
//!
//! Speaks the go-plugin side of the launch protocol: the provider binds a
//! local port, announces it on stdout with the handshake line and then serves
//! the tfplugin6 gRPC service until Terraform terminates it.

use std::collections::HashMap;
use std::io::{self, Write};
use std::net::{Ipv4Addr, SocketAddr};

use serde::Serialize;
use tokio::net::TcpListener;
use tokio_stream::wrappers::TcpListenerStream;
use tonic::transport::Server;
use tracing::{info, warn};

use crate::config::{ServeConfig, CORE_PROTOCOL_VERSION};
use crate::provider::WodataProvider;
use crate::tfplugin6::provider_server::ProviderServer;

/// Printed when the binary is started by hand instead of by Terraform
pub const NOT_LAUNCHED_BY_TERRAFORM: &str = "This binary is a plugin. These are not meant to be executed directly.\n\
Please execute the program that consumes these plugins, which will\n\
load any plugins automatically";

/// go-plugin handshake line announcing where the gRPC server listens.
///
/// Format: `CORE|APP|NETWORK|ADDR|PROTOCOL|SERVER_CERT`. The certificate
/// field stays empty because the server does not speak TLS.
pub fn handshake_line(protocol_version: u32, addr: SocketAddr) -> String {
    format!(
        "{}|{}|tcp|{}|grpc|",
        CORE_PROTOCOL_VERSION, protocol_version, addr
    )
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "PascalCase")]
struct ReattachConfig {
    protocol: &'static str,
    protocol_version: u32,
    pid: u32,
    test: bool,
    addr: ReattachAddr,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "PascalCase")]
struct ReattachAddr {
    network: &'static str,
    string: String,
}

/// JSON value for TF_REATTACH_PROVIDERS pointing Terraform at this process
pub fn reattach_providers(
    provider_address: &str,
    protocol_version: u32,
    addr: SocketAddr,
    pid: u32,
) -> serde_json::Result<String> {
    let mut providers = HashMap::new();
    providers.insert(
        provider_address.to_string(),
        ReattachConfig {
            protocol: "grpc",
            protocol_version,
            pid,
            test: true,
            addr: ReattachAddr {
                network: "tcp",
                string: addr.to_string(),
            },
        },
    );
    serde_json::to_string(&providers)
}

/// Bind a loopback listener, inside the port range when one is given
pub async fn bind(port_range: Option<(u16, u16)>) -> io::Result<TcpListener> {
    let Some((min, max)) = port_range else {
        return TcpListener::bind((Ipv4Addr::LOCALHOST, 0)).await;
    };

    let mut last_err = None;
    for port in min..=max {
        match TcpListener::bind((Ipv4Addr::LOCALHOST, port)).await {
            Ok(listener) => return Ok(listener),
            Err(e) => last_err = Some(e),
        }
    }

    Err(last_err.unwrap_or_else(|| {
        io::Error::new(
            io::ErrorKind::AddrNotAvailable,
            format!("no free port between {} and {}", min, max),
        )
    }))
}

/// Serve the provider on an already bound listener until `shutdown` resolves
pub async fn serve_listener<F>(listener: TcpListener, shutdown: F) -> anyhow::Result<()>
where
    F: std::future::Future<Output = ()>,
{
    Server::builder()
        .add_service(ProviderServer::new(WodataProvider::new()))
        .serve_with_incoming_shutdown(TcpListenerStream::new(listener), shutdown)
        .await?;
    Ok(())
}

/// Run the plugin: bind, announce, serve
pub async fn serve(config: ServeConfig) -> anyhow::Result<()> {
    let protocol_version = config.negotiate_protocol()?;
    let listener = bind(config.port_range).await?;
    let addr = listener.local_addr()?;

    info!("Provider listening on {}", addr);

    let mut stdout = io::stdout();
    if config.debug {
        let reattach = reattach_providers(
            &config.provider_address,
            protocol_version,
            addr,
            std::process::id(),
        )?;
        writeln!(
            stdout,
            "Provider started. To attach Terraform CLI, set the TF_REATTACH_PROVIDERS environment variable with the following:\n\n\tTF_REATTACH_PROVIDERS='{}'\n",
            reattach
        )?;
    } else {
        writeln!(stdout, "{}", handshake_line(protocol_version, addr))?;
    }
    stdout.flush()?;

    info!("Handshake sent, starting gRPC server");

    serve_listener(listener, shutdown_signal(config.debug)).await?;

    info!("Provider shutdown complete");
    Ok(())
}

/// Resolves when the process should stop serving.
///
/// Under Terraform, SIGINT reaches the whole process group; Terraform answers
/// it with StopProvider and later kills the plugin itself, so only SIGTERM
/// ends a managed provider. In debug mode Ctrl-C stops it.
async fn shutdown_signal(debug: bool) {
    let interrupt = async {
        if !debug {
            return std::future::pending::<()>().await;
        }
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!("Failed to listen for Ctrl-C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                warn!("Failed to listen for SIGTERM: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = interrupt => {}
        _ = terminate => {}
    }

    info!("Received shutdown signal");
}
