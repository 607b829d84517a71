//! Alert tone synthesis and playback
//!
//! The notifier plays at most one tone at a time. While a tone is playing the
//! notifier reports itself as sounding and refuses to start another one;
//! the flag clears when playback finishes (or fails), re-arming it.

#[cfg(feature = "pulse")]
use libpulse_binding::sample::{Format, Spec};
#[cfg(feature = "pulse")]
use libpulse_binding::stream::Direction;
#[cfg(feature = "pulse")]
use libpulse_simple_binding::Simple;

use crate::error::{Error, Result};
use std::f32::consts::PI;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

pub const TONE_FREQUENCY_HZ: f32 = 800.0;
pub const TONE_DURATION: Duration = Duration::from_millis(500);
pub const SAMPLE_RATE: u32 = 44_100;

/// Gain at the start and at the end of the exponential fade
const START_GAIN: f32 = 0.3;
const END_GAIN: f32 = 0.01;

/// Mono 16-bit PCM buffer.
#[derive(Debug, Clone)]
pub struct Tone {
    pub samples: Vec<i16>,
    pub sample_rate: u32,
}

impl Tone {
    /// 800 Hz sine fading from 0.3 to 0.01 of full scale over half a second.
    pub fn alert() -> Self {
        synthesize(TONE_FREQUENCY_HZ, TONE_DURATION, SAMPLE_RATE)
    }

    pub fn duration(&self) -> Duration {
        Duration::from_secs_f64(self.samples.len() as f64 / self.sample_rate as f64)
    }

    /// S16LE byte stream
    pub fn to_le_bytes(&self) -> Vec<u8> {
        self.samples.iter().flat_map(|s| s.to_le_bytes()).collect()
    }
}

pub fn synthesize(frequency: f32, duration: Duration, sample_rate: u32) -> Tone {
    let count = (duration.as_secs_f32() * sample_rate as f32).round() as usize;
    let last = count.saturating_sub(1).max(1) as f32;
    let ratio = END_GAIN / START_GAIN;

    let samples = (0..count)
        .map(|i| {
            let t = i as f32 / sample_rate as f32;
            let gain = START_GAIN * ratio.powf(i as f32 / last);
            ((2.0 * PI * frequency * t).sin() * gain * i16::MAX as f32) as i16
        })
        .collect();

    Tone {
        samples,
        sample_rate,
    }
}

/// Blocking audio output. `play` returns once the tone has finished.
pub trait TonePlayer: Send + Sync {
    fn play(&self, tone: &Tone) -> Result<()>;
}

/// Plays through the PulseAudio simple API.
#[cfg(feature = "pulse")]
pub struct PulsePlayer {
    app_name: String,
}

#[cfg(feature = "pulse")]
impl PulsePlayer {
    /// Open and close a playback stream once to make sure the server is there.
    pub fn probe(app_name: &str) -> Result<Self> {
        let player = Self {
            app_name: app_name.to_string(),
        };
        player.open(SAMPLE_RATE)?;
        Ok(player)
    }

    fn open(&self, rate: u32) -> Result<Simple> {
        let spec = Spec {
            format: Format::S16le,
            channels: 1,
            rate,
        };
        Simple::new(
            None, // default server
            &self.app_name,
            Direction::Playback,
            None, // default sink
            "alert",
            &spec,
            None, // default channel map
            None, // default buffering
        )
        .map_err(|e| Error::AudioUnavailable(e.to_string()))
    }
}

#[cfg(feature = "pulse")]
impl TonePlayer for PulsePlayer {
    fn play(&self, tone: &Tone) -> Result<()> {
        let simple = self.open(tone.sample_rate)?;
        simple
            .write(&tone.to_le_bytes())
            .map_err(|e| Error::AudioUnavailable(e.to_string()))?;
        simple
            .drain()
            .map_err(|e| Error::AudioUnavailable(e.to_string()))
    }
}

/// The platform player, or `None` when no audio output can be opened.
pub fn default_player(app_name: &str) -> Option<Arc<dyn TonePlayer>> {
    match open_default_player(app_name) {
        Ok(player) => {
            info!("Alert audio ready");
            Some(player)
        }
        Err(e) => {
            warn!("Alerts will be silent: {}", e);
            None
        }
    }
}

#[cfg(feature = "pulse")]
fn open_default_player(app_name: &str) -> Result<Arc<dyn TonePlayer>> {
    Ok(Arc::new(PulsePlayer::probe(app_name)?))
}

#[cfg(not(feature = "pulse"))]
fn open_default_player(_app_name: &str) -> Result<Arc<dyn TonePlayer>> {
    Err(Error::AudioUnavailable(
        "audio output not compiled in (enable the `pulse` feature)".to_string(),
    ))
}

/// Clears the sounding flag even if playback panics.
struct SoundingGuard(Arc<AtomicBool>);

impl Drop for SoundingGuard {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

pub struct AlertNotifier {
    player: Option<Arc<dyn TonePlayer>>,
    tone: Arc<Tone>,
    sounding: Arc<AtomicBool>,
}

impl AlertNotifier {
    pub fn new(player: Option<Arc<dyn TonePlayer>>) -> Self {
        Self::with_tone(player, Tone::alert())
    }

    pub fn with_tone(player: Option<Arc<dyn TonePlayer>>, tone: Tone) -> Self {
        Self {
            player,
            tone: Arc::new(tone),
            sounding: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Notifier without audio output; every alert is a no-op
    pub fn silent() -> Self {
        Self::new(None)
    }

    pub fn is_available(&self) -> bool {
        self.player.is_some()
    }

    pub fn is_sounding(&self) -> bool {
        self.sounding.load(Ordering::Acquire)
    }

    /// Start the tone in the background.
    ///
    /// Returns `None` when nothing was started: no audio output, or a tone
    /// is still playing.
    pub fn sound(&self) -> Option<JoinHandle<()>> {
        let Some(player) = self.player.clone() else {
            debug!("Alert skipped, no audio output");
            return None;
        };

        if self
            .sounding
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            debug!("Alert skipped, previous tone still sounding");
            return None;
        }

        let tone = self.tone.clone();
        let guard = SoundingGuard(self.sounding.clone());
        info!("🔔 Playing drowsiness alert");

        Some(tokio::task::spawn_blocking(move || {
            let _guard = guard;
            if let Err(e) = player.play(&tone) {
                warn!("Alert tone failed: {}", e);
            }
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fakes::GatedPlayer;

    fn peak(samples: &[i16]) -> i32 {
        samples.iter().map(|s| (*s as i32).abs()).max().unwrap_or(0)
    }

    #[test]
    fn test_alert_tone_shape() {
        let tone = Tone::alert();
        assert_eq!(tone.samples.len(), 22_050);
        assert_eq!(tone.duration(), Duration::from_millis(500));
        assert_eq!(tone.samples[0], 0);

        // One 800 Hz period is ~55 samples at 44.1 kHz
        let full_scale = i16::MAX as f32;
        assert!(peak(&tone.samples[..110]) as f32 >= 0.28 * full_scale);
        assert!(peak(&tone.samples[tone.samples.len() - 110..]) as f32 <= 0.011 * full_scale + 1.0);
        assert_eq!(tone.to_le_bytes().len(), 44_100);
    }

    #[tokio::test]
    async fn test_second_alert_suppressed_while_sounding() {
        let (player, gate) = GatedPlayer::new();
        let notifier = AlertNotifier::new(Some(player.clone()));

        let first = notifier.sound().expect("first alert should play");
        assert!(notifier.is_sounding());
        assert!(notifier.sound().is_none());

        gate.send(()).unwrap();
        first.await.unwrap();
        assert!(!notifier.is_sounding());
        assert_eq!(player.plays(), 1);

        let again = notifier.sound().expect("notifier should re-arm");
        gate.send(()).unwrap();
        again.await.unwrap();
        assert_eq!(player.plays(), 2);
    }

    #[tokio::test]
    async fn test_failed_playback_rearms() {
        struct Broken;
        impl TonePlayer for Broken {
            fn play(&self, _tone: &Tone) -> Result<()> {
                Err(Error::AudioUnavailable("sink vanished".to_string()))
            }
        }

        let notifier = AlertNotifier::new(Some(Arc::new(Broken)));
        notifier.sound().unwrap().await.unwrap();
        assert!(!notifier.is_sounding());
    }

    #[test]
    fn test_silent_notifier_is_noop() {
        let notifier = AlertNotifier::silent();
        assert!(!notifier.is_available());
        assert!(notifier.sound().is_none());
        assert!(!notifier.is_sounding());
    }
}
