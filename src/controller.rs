//! Capture-and-streaming control loop
//!
//! The controller is the only writer of [`UiState`]. Operator commands,
//! timer ticks and the results of spawned requests are all handled on the
//! controller's own task, one at a time, and every change is published as
//! a fresh immutable snapshot on a watch channel.
//!
//! Ticks never wait for earlier requests: each tick spawns its own round
//! trip and the response is applied whenever it arrives, so the displayed
//! detection is always the most recently *arrived* one. Results carry the
//! session and reset generation they were dispatched under and are dropped
//! if that session is no longer running or a reset has landed since.

use crate::alert::AlertNotifier;
use crate::backend::Backend;
use crate::config::ClientConfig;
use crate::events::{Command, Dispatch, Event};
use crate::media::FrameSource;
use crate::reducer;
use crate::state::{Notice, UiState};
use crate::tdbg;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio::time::{interval, Interval, MissedTickBehavior};
use tracing::{debug, error, info, warn};

pub struct Controller {
    backend: Arc<dyn Backend>,
    media: Box<dyn FrameSource>,
    notifier: AlertNotifier,
    frame_interval: Duration,
    stats_interval: Duration,

    state: Arc<UiState>,
    state_tx: watch::Sender<Arc<UiState>>,
    events_tx: mpsc::UnboundedSender<Event>,

    /// Id of the running session, if any
    session: Option<u64>,
    next_session: u64,
    /// Successful resets so far
    generation: u64,
    next_notice: u64,
    frames_in_flight: usize,
}

impl Controller {
    /// Build a controller and the receiver its background results arrive on.
    pub fn new(
        config: &ClientConfig,
        backend: Arc<dyn Backend>,
        media: Box<dyn FrameSource>,
        notifier: AlertNotifier,
    ) -> (Self, mpsc::UnboundedReceiver<Event>) {
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let state = Arc::new(UiState::default());
        let (state_tx, _) = watch::channel(state.clone());

        let controller = Self {
            backend,
            media,
            notifier,
            frame_interval: config.frame_interval,
            stats_interval: config.stats_interval,
            state,
            state_tx,
            events_tx,
            session: None,
            next_session: 1,
            generation: 0,
            next_notice: 1,
            frames_in_flight: 0,
        };
        (controller, events_rx)
    }

    /// New receiver of state snapshots.
    pub fn subscribe(&self) -> watch::Receiver<Arc<UiState>> {
        self.state_tx.subscribe()
    }

    pub fn state(&self) -> Arc<UiState> {
        self.state.clone()
    }

    pub fn session(&self) -> Option<u64> {
        self.session
    }

    /// Tag for a request leaving now, or `None` when no session is running.
    pub fn dispatch(&self) -> Option<Dispatch> {
        self.session.map(|session| Dispatch {
            session,
            generation: self.generation,
        })
    }

    pub fn is_running(&self) -> bool {
        self.session.is_some()
    }

    /// Frame requests of the running session that have not come back yet.
    pub fn frames_in_flight(&self) -> usize {
        self.frames_in_flight
    }

    pub fn alert_sounding(&self) -> bool {
        self.notifier.is_sounding()
    }

    /// One-shot startup work: connectivity probe and configuration fetch.
    pub fn bootstrap(&self) {
        self.spawn_request(self.backend.health(), Event::Health);
        self.spawn_request(self.backend.config(), Event::Config);
    }

    pub fn handle_command(&mut self, command: Command) {
        debug!("Command: {:?}", command);
        match command {
            Command::Start => self.start_session(),
            Command::Stop => self.stop_session(),
            Command::Reset => self.spawn_request(self.backend.reset(), Event::ResetDone),
            Command::UpdateConfig(patch) => {
                self.spawn_request(self.backend.update_config(patch), Event::ConfigUpdated)
            }
            Command::CheckHealth => self.spawn_request(self.backend.health(), Event::Health),
        }
    }

    pub fn handle_event(&mut self, event: Event) {
        match event {
            Event::Health(Ok(_)) => {
                if !self.state.connected {
                    info!("Backend reachable");
                    self.update(|s| s.connected = true);
                }
            }
            Event::Health(Err(e)) => {
                warn!("Health check failed: {}", e);
                if self.state.connected {
                    self.update(|s| s.connected = false);
                }
            }
            Event::Config(Ok(config)) => {
                info!(
                    "Backend config: EAR threshold {}, {} consecutive frames, window {}",
                    config.ear_threshold, config.consecutive_frames, config.window_size
                );
                self.replace(reducer::reduce_config(&self.state, config));
            }
            Event::Config(Err(e)) => warn!("Config fetch failed: {}", e),
            Event::ConfigUpdated(Ok(config)) => {
                let next = reducer::reduce_config(&self.state, config);
                self.replace(next);
                self.notify("Configuration updated");
            }
            Event::ConfigUpdated(Err(e)) => {
                warn!("Config update failed: {}", e);
                self.notify(format!("Configuration update failed: {}", e));
            }
            Event::Frame { dispatch, result } => {
                let session = dispatch.session;
                if self.session != Some(session) {
                    debug!(session, "Discarding frame result from a finished session");
                    return;
                }
                self.frames_in_flight = self.frames_in_flight.saturating_sub(1);
                if dispatch.generation != self.generation {
                    debug!(session, "Discarding frame result dispatched before a reset");
                    return;
                }
                match result {
                    Ok(result) => {
                        tdbg!("frame result: {} ({} in flight)", result.status, self.frames_in_flight);
                        let reduction =
                            reducer::reduce_detection(&self.state, self.notifier.is_sounding(), result);
                        self.replace(reduction.state);
                        if reduction.fire_alert {
                            self.notifier.sound();
                        }
                    }
                    Err(e) => warn!(session, status = ?e.status(), "Frame dropped: {}", e),
                }
            }
            Event::Stats { dispatch, result } => {
                let session = dispatch.session;
                if self.dispatch() != Some(dispatch) {
                    debug!(session, "Discarding stats from a finished session or from before a reset");
                    return;
                }
                match result {
                    Ok(stats) => self.replace(reducer::reduce_stats(&self.state, stats)),
                    Err(e) => warn!(session, "Stats poll failed: {}", e),
                }
            }
            Event::ResetDone(Ok(())) => {
                // Anything still in flight carries pre-reset counters
                self.generation += 1;
                info!(generation = self.generation, "Statistics reset");
                let next = reducer::reduce_reset(&self.state);
                self.replace(next);
                self.notify("Statistics reset");
            }
            Event::ResetDone(Err(e)) => {
                warn!("Reset failed: {}", e);
                self.notify(format!("Reset failed: {}", e));
            }
        }
    }

    /// One cadence tick: capture now, send in the background.
    pub fn on_tick(&mut self) {
        let Some(dispatch) = self.dispatch() else {
            return;
        };
        let Some(snapshot) = self.media.snapshot() else {
            debug!("No frame available yet, skipping tick");
            return;
        };

        self.frames_in_flight += 1;
        tdbg!("dispatch frame ({} KB, {} in flight)", snapshot.jpeg.len() / 1024, self.frames_in_flight);
        self.spawn_request(self.backend.process_frame(snapshot), move |result| Event::Frame {
            dispatch,
            result,
        });
    }

    pub fn on_stats_tick(&mut self) {
        if let Some(dispatch) = self.dispatch() {
            self.spawn_request(self.backend.stats(), move |result| Event::Stats { dispatch, result });
        }
    }

    /// Stop any session and release the camera.
    pub fn shutdown(&mut self) {
        self.stop_session();
        self.media.release();
    }

    fn start_session(&mut self) {
        if self.session.is_some() {
            debug!("Session already running");
            return;
        }
        if !self.state.connected {
            warn!("Start refused, backend not connected");
            self.notify("Backend is not reachable; run `health` to check again");
            return;
        }

        if let Err(e) = self.media.acquire() {
            error!("Cannot start session: {}", e);
            self.notify(format!("Cannot start: {}", e));
            return;
        }

        let session = self.next_session;
        self.next_session += 1;
        self.session = Some(session);
        self.frames_in_flight = 0;
        info!(session, "Session started");
        self.update(|s| s.running = true);
    }

    fn stop_session(&mut self) {
        self.media.release();
        if let Some(session) = self.session.take() {
            info!(session, in_flight = self.frames_in_flight, "Session stopped");
            self.update(|s| s.running = false);
        }
    }

    fn spawn_request<T, F>(&self, request: futures_util::future::BoxFuture<'static, T>, wrap: F)
    where
        T: Send + 'static,
        F: FnOnce(T) -> Event + Send + 'static,
    {
        let events = self.events_tx.clone();
        tokio::spawn(async move {
            let outcome = request.await;
            // The controller may already be gone at shutdown
            let _ = events.send(wrap(outcome));
        });
    }

    fn notify(&mut self, text: impl Into<String>) {
        let notice = Notice {
            id: self.next_notice,
            text: text.into(),
        };
        self.next_notice += 1;
        self.update(|s| s.notice = Some(notice));
    }

    fn update(&mut self, change: impl FnOnce(&mut UiState)) {
        let mut next = (*self.state).clone();
        change(&mut next);
        self.replace(next);
    }

    fn replace(&mut self, next: UiState) {
        self.state = Arc::new(next);
        self.state_tx.send_replace(self.state.clone());
    }
}

/// Drive the controller until the command channel closes.
pub async fn run(
    mut controller: Controller,
    mut commands: mpsc::Receiver<Command>,
    mut events: mpsc::UnboundedReceiver<Event>,
) {
    info!("Controller started");
    controller.bootstrap();

    let mut cadence: Option<Interval> = None;
    let mut stats: Option<Interval> = None;
    let mut timers_for: Option<u64> = None;

    loop {
        tokio::select! {
            command = commands.recv() => match command {
                Some(command) => controller.handle_command(command),
                None => {
                    info!("Command channel closed");
                    break;
                }
            },
            Some(event) = events.recv() => controller.handle_event(event),
            _ = next_tick(&mut cadence) => controller.on_tick(),
            _ = next_tick(&mut stats) => controller.on_stats_tick(),
        }

        // Timers belong to exactly one session; dropping them cancels any pending tick
        if controller.session() != timers_for {
            timers_for = controller.session();
            if timers_for.is_some() {
                cadence = Some(periodic(controller.frame_interval));
                stats = Some(periodic(controller.stats_interval));
            } else {
                cadence = None;
                stats = None;
            }
        }
    }

    controller.shutdown();
    info!("Controller stopped");
}

fn periodic(period: Duration) -> Interval {
    let mut timer = interval(period);
    timer.set_missed_tick_behavior(MissedTickBehavior::Skip);
    timer
}

async fn next_tick(timer: &mut Option<Interval>) {
    match timer {
        Some(timer) => {
            timer.tick().await;
        }
        None => std::future::pending::<()>().await,
    }
}
