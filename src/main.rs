//! DrowsyLive - real-time drowsiness monitoring client
//!
//! Streams webcam frames to the detection backend and reports the verdicts
//! on the console. Operator commands are read line by line from stdin.

#![forbid(unsafe_code)]

use drowsylive::alert::{self, AlertNotifier};
use drowsylive::backend::HttpBackend;
use drowsylive::camera;
use drowsylive::controller::{self, Controller};
use drowsylive::events::Command;
use drowsylive::media::MediaSource;
use drowsylive::render;
use drowsylive::ClientConfig;
use std::io::BufRead;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};
use tracing_subscriber::EnvFilter;

#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();
    info!("Starting drowsylive client");

    let config = ClientConfig::from_env();
    debug!("Client config: {:?}", config);

    let backend = Arc::new(HttpBackend::new(&config.base_url));
    info!("Backend: {}", backend.base_url());
    let media = MediaSource::new(camera::default_driver(config.capture.camera_index), config.capture.clone());
    let notifier = AlertNotifier::new(alert::default_player("drowsylive"));

    let (controller, events) = Controller::new(&config, backend, Box::new(media), notifier);

    tokio::spawn(render::run_console(controller.subscribe()));
    if let Some(path) = config.annotated_frame_path.clone() {
        info!("Writing annotated frames to {}", path.display());
        tokio::spawn(render::run_frame_writer(controller.subscribe(), path));
    }

    let (command_tx, command_rx) = mpsc::channel::<Command>(16);
    let control = tokio::spawn(controller::run(controller, command_rx, events));

    println!("Commands: start, stop, reset, health, config <json>, quit");
    let mut lines = spawn_stdin_reader();

    loop {
        tokio::select! {
            line = lines.recv() => {
                let Some(line) = line else {
                    info!("Input closed");
                    break;
                };
                let line = line.trim();
                if line.is_empty() {
                    continue;
                }
                if line.eq_ignore_ascii_case("quit") || line.eq_ignore_ascii_case("exit") {
                    break;
                }
                match Command::parse(line) {
                    Ok(command) => {
                        if command_tx.send(command).await.is_err() {
                            warn!("Controller is gone");
                            break;
                        }
                    }
                    Err(hint) => println!("{}", hint),
                }
            }
            _ = tokio::signal::ctrl_c() => {
                info!("Interrupted");
                break;
            }
        }
    }

    // Closing the command channel stops the controller and releases the camera
    drop(command_tx);
    control.await?;

    info!("Shutting down");
    Ok(())
}

/// Read stdin on a plain thread so a pending read never holds up shutdown.
fn spawn_stdin_reader() -> mpsc::UnboundedReceiver<String> {
    let (tx, rx) = mpsc::unbounded_channel();
    std::thread::Builder::new()
        .name("stdin".to_string())
        .spawn(move || {
            for line in std::io::stdin().lock().lines() {
                match line {
                    Ok(line) => {
                        if tx.send(line).is_err() {
                            break;
                        }
                    }
                    Err(e) => {
                        warn!("Failed to read stdin: {}", e);
                        break;
                    }
                }
            }
        })
        .map(|_| ())
        .unwrap_or_else(|e| warn!("Could not start stdin reader: {}", e));
    rx
}
