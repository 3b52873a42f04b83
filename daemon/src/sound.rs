/// Audible cue for priority notifications.
use std::io::Write;

/// Plays a short cue. Must return immediately and never report failure.
pub trait SoundPlayer: Send + Sync + 'static {
    fn play(&self);
}

/// Rings the terminal bell on stderr.
pub struct TerminalBell;

impl SoundPlayer for TerminalBell {
    fn play(&self) {
        let mut err = std::io::stderr().lock();
        let _ = err.write_all(b"\x07");
        let _ = err.flush();
    }
}

/// Short sine tone on the default output device.
#[cfg(feature = "rodio")]
pub struct ToneCue {
    pub frequency: f32,
    pub duration: std::time::Duration,
    /// 0.0 – 1.0
    pub volume: f32,
}

#[cfg(feature = "rodio")]
impl Default for ToneCue {
    fn default() -> Self {
        Self {
            frequency: 880.0,
            duration: std::time::Duration::from_millis(180),
            volume: 0.4,
        }
    }
}

#[cfg(feature = "rodio")]
impl SoundPlayer for ToneCue {
    fn play(&self) {
        let (frequency, duration, volume) = (self.frequency, self.duration, self.volume);
        std::thread::spawn(move || {
            use rodio::source::{SineWave, Source};
            use rodio::{OutputStream, Sink};

            let Ok((_stream, stream_handle)) = OutputStream::try_default() else {
                tracing::debug!("[sound] No audio output device");
                return;
            };
            let Ok(sink) = Sink::try_new(&stream_handle) else {
                return;
            };

            sink.set_volume(volume);
            sink.append(SineWave::new(frequency).take_duration(duration));
            sink.sleep_until_end();
        });
    }
}

/// The cue this build plays by default.
pub fn default_player() -> std::sync::Arc<dyn SoundPlayer> {
    #[cfg(feature = "rodio")]
    {
        std::sync::Arc::new(ToneCue::default())
    }
    #[cfg(not(feature = "rodio"))]
    {
        std::sync::Arc::new(TerminalBell)
    }
}
