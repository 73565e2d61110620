use classwatch_core::PlayerControl;
use parking_lot::Mutex;

/// Stand-in for a video element: a playhead that moves only when told to.
#[derive(Debug)]
pub struct SimulatedPlayer {
    duration: f64,
    state: Mutex<PlayerState>,
}

#[derive(Debug, Default)]
struct PlayerState {
    position: f64,
    playing: bool,
}

impl SimulatedPlayer {
    pub fn new(duration: f64) -> Self {
        Self {
            duration: duration.max(0.0),
            state: Mutex::new(PlayerState::default()),
        }
    }

    pub fn duration(&self) -> f64 {
        self.duration
    }

    pub fn position(&self) -> f64 {
        self.state.lock().position
    }

    pub fn pause(&self) {
        self.state.lock().playing = false;
    }

    /// Move the playhead forward by `seconds` of media time when playing.
    pub fn advance(&self, seconds: f64) -> f64 {
        let mut state = self.state.lock();
        if state.playing {
            state.position = (state.position + seconds).min(self.duration);
        }
        state.position
    }

    /// Played fraction in `[0, 1]`.
    pub fn played(&self) -> f64 {
        if self.duration > 0.0 {
            self.position() / self.duration
        } else {
            0.0
        }
    }
}

impl PlayerControl for SimulatedPlayer {
    fn seek_to(&self, position: f64) {
        self.state.lock().position = position.clamp(0.0, self.duration);
    }

    fn play(&self) {
        self.state.lock().playing = true;
    }
}
