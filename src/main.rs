//! `osclink` command line client.
//!
//! Streams live preview, uploads firmware and polls asynchronous commands.

mod cli;

use std::{process::ExitCode, sync::Arc, time::Duration};

use clap::Parser;
use cli::{AuthArgs, Cli, Command};
use osclink::{
    ClientError,
    auth::{DigestAuthenticator, DigestCredential},
    command::{CommandClient, CommandPoller, CommandResponse},
    config::PreviewConfig,
    endpoint::Endpoint,
    preview::PreviewSession,
    transport::TcpConnector,
    upload::FirmwareUploader,
};
use tokio_util::sync::CancellationToken;

#[tokio::main]
async fn main() -> ExitCode {
    // Applications embedding the library should install their own subscriber.
    tracing_subscriber::fmt::init();

    let cli = Cli::parse();
    if let Some(addr) = cli.metrics_addr {
        install_metrics(addr);
    }
    let authenticator = authenticator(&cli.auth);

    match run(cli.command, authenticator).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("error: {err}");
            ExitCode::FAILURE
        }
    }
}

#[cfg(feature = "metrics")]
fn install_metrics(addr: std::net::SocketAddr) {
    if let Err(err) = metrics_exporter_prometheus::PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()
    {
        tracing::warn!(%addr, error = %err, "failed to start the metrics listener");
    }
}

#[cfg(not(feature = "metrics"))]
fn install_metrics(addr: std::net::SocketAddr) {
    tracing::warn!(%addr, "built without the metrics feature; ignoring --metrics-addr");
}

fn authenticator(auth: &AuthArgs) -> Option<Arc<DigestAuthenticator>> {
    let username = auth.username.clone()?;
    let credential = DigestCredential::new(username, auth.password.clone());
    Some(Arc::new(DigestAuthenticator::new(credential)))
}

async fn run(
    command: Command,
    authenticator: Option<Arc<DigestAuthenticator>>,
) -> Result<(), ClientError> {
    match command {
        Command::Preview {
            endpoint,
            frames,
            out,
        } => {
            let mut session = PreviewSession::new(
                TcpConnector::default(),
                Endpoint::parse(&endpoint)?,
                PreviewConfig::default(),
            );
            if let Some(auth) = authenticator {
                session = session.with_authenticator(auth);
            }
            let cancel = session.cancellation_token();
            tokio::spawn(cancel_on_ctrl_c(cancel));

            let mut count = 0u64;
            while let Some(frame) = session.next_frame().await? {
                count += 1;
                match &out {
                    Some(dir) => {
                        let path = dir.join(format!("frame-{count:05}.jpg"));
                        tokio::fs::write(&path, frame.payload()).await?;
                    }
                    None => println!("frame {count}: {} bytes", frame.length()),
                }
                if frames.is_some_and(|limit| count >= limit) {
                    session.stop().await;
                }
            }
            println!("{count} frames received");
            Ok(())
        }
        Command::Upload {
            endpoint,
            api_path,
            files,
        } => {
            let mut uploader = FirmwareUploader::tcp(Endpoint::parse(&endpoint)?);
            if let Some(auth) = authenticator {
                uploader = uploader.with_authenticator(auth);
            }
            let mut report = |percent: u8| println!("upload {percent}%");
            let response = uploader
                .update_firmware(&api_path, &files, Some(&mut report))
                .await?;
            print_response(&response)
        }
        Command::ConvertStatus {
            endpoint,
            id,
            interval_ms,
        } => {
            let mut client = CommandClient::new(TcpConnector::default(), Endpoint::parse(&endpoint)?);
            if let Some(auth) = authenticator {
                client = client.with_authenticator(auth);
            }
            let poller = CommandPoller::new(Duration::from_millis(interval_ms));
            tokio::spawn(cancel_on_ctrl_c(poller.cancellation_token()));

            let initial = client.status(&id).await?;
            let done = poller
                .poll_with_progress(&client, initial, |completion| {
                    println!("progress {:.0}%", completion * 100.0);
                })
                .await?;
            print_response(&done)
        }
    }
}

async fn cancel_on_ctrl_c(token: CancellationToken) {
    tokio::select! {
        () = token.cancelled() => {}
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("interrupted");
            token.cancel();
        }
    }
}

fn print_response(response: &CommandResponse) -> Result<(), ClientError> {
    println!("{}", serde_json::to_string_pretty(response)?);
    Ok(())
}
