//! Song lifecycle derived from loudness
//!
//! A song starts when the room gets loud, is confirmed once it stays loud,
//! and ends after a sustained quiet spell. All changes go through one guarded
//! setter so that an external transition table can veto them.

use std::fmt;

/// Where the room is in the song lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum SongState {
    #[default]
    Intermission,
    Starting,
    Ongoing,
    Ending,
}

impl SongState {
    pub const ALL: [SongState; 4] = [
        SongState::Intermission,
        SongState::Starting,
        SongState::Ongoing,
        SongState::Ending,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            SongState::Intermission => "Intermission",
            SongState::Starting => "Starting",
            SongState::Ongoing => "Ongoing",
            SongState::Ending => "Ending",
        }
    }

    fn index(self) -> usize {
        self as usize
    }
}

impl fmt::Display for SongState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Table of allowed song state transitions
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StateTransitions {
    allowed: [[bool; 4]; 4],
}

impl StateTransitions {
    /// Table that allows nothing but self-transitions
    pub fn empty() -> Self {
        Self {
            allowed: [[false; 4]; 4],
        }
    }

    /// Default lifecycle: Intermission → Starting → Ongoing → Ending →
    /// Intermission, plus Ending → Starting and Starting → Intermission
    pub fn lifecycle() -> Self {
        use SongState::*;
        let mut table = Self::empty();
        table.allow(Intermission, Starting);
        table.allow(Starting, Ongoing);
        table.allow(Starting, Intermission);
        table.allow(Ongoing, Ending);
        table.allow(Ending, Intermission);
        table.allow(Ending, Starting);
        table
    }

    /// Build a table from a predicate over every pair of distinct states
    pub fn from_fn(mut allowed: impl FnMut(SongState, SongState) -> bool) -> Self {
        let mut table = Self::empty();
        for from in SongState::ALL {
            for to in SongState::ALL {
                if from != to && allowed(from, to) {
                    table.allow(from, to);
                }
            }
        }
        table
    }

    pub fn allow(&mut self, from: SongState, to: SongState) {
        self.allowed[from.index()][to.index()] = true;
    }

    /// Self-transitions are always allowed
    pub fn is_allowed(&self, from: SongState, to: SongState) -> bool {
        from == to || self.allowed[from.index()][to.index()]
    }
}

impl Default for StateTransitions {
    fn default() -> Self {
        Self::lifecycle()
    }
}

/// Loudness hysteresis parameters
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SongStateConfig {
    /// RMS above which a block counts as loud
    pub amplitude_threshold: f32,
    /// Seconds of continuous loudness that confirm a song
    pub start_duration: f64,
    /// Seconds of quiet that end a song, and that end the Ending phase
    pub end_duration: f64,
}

impl Default for SongStateConfig {
    fn default() -> Self {
        Self {
            amplitude_threshold: 0.02,
            start_duration: 2.0,
            end_duration: 3.0,
        }
    }
}

/// Loud/quiet hysteresis state machine
#[derive(Debug, Clone)]
pub struct SongStateMachine {
    config: SongStateConfig,
    transitions: StateTransitions,
    state: SongState,
    state_since: f64,
    loud_since: Option<f64>,
    last_loud: Option<f64>,
    rejected: u64,
}

impl SongStateMachine {
    pub fn new(config: SongStateConfig) -> Self {
        Self::with_transitions(config, StateTransitions::lifecycle())
    }

    pub fn with_transitions(config: SongStateConfig, transitions: StateTransitions) -> Self {
        Self {
            config,
            transitions,
            state: SongState::Intermission,
            state_since: 0.0,
            loud_since: None,
            last_loud: None,
            rejected: 0,
        }
    }

    pub fn state(&self) -> SongState {
        self.state
    }

    pub fn config(&self) -> &SongStateConfig {
        &self.config
    }

    /// Replace the transition table (e.g. one derived from the scenario graph)
    pub fn set_transitions(&mut self, transitions: StateTransitions) {
        self.transitions = transitions;
    }

    /// Number of transition requests rejected by the table
    pub fn rejected_transitions(&self) -> u64 {
        self.rejected
    }

    /// Whether a block with this RMS counts as loud
    pub fn is_loud(&self, rms: f32) -> bool {
        rms > self.config.amplitude_threshold
    }

    /// Feed the RMS of the block observed at `now`; returns true if the state changed
    pub fn update(&mut self, rms: f32, now: f64) -> bool {
        let loud = self.is_loud(rms);
        if loud {
            self.last_loud = Some(now);
            self.loud_since.get_or_insert(now);
        } else {
            self.loud_since = None;
        }

        let next = match self.state {
            SongState::Intermission if loud => Some(SongState::Starting),
            SongState::Starting => {
                // Quiet keeps waiting here, it never cancels the song
                let confirmed = self
                    .loud_since
                    .map_or(false, |since| now - since >= self.config.start_duration);
                confirmed.then_some(SongState::Ongoing)
            }
            SongState::Ongoing if !loud => {
                let last_loud = self.last_loud.unwrap_or(self.state_since);
                (now - last_loud > self.config.end_duration).then_some(SongState::Ending)
            }
            SongState::Ending if loud => Some(SongState::Starting),
            SongState::Ending => (now - self.state_since >= self.config.end_duration)
                .then_some(SongState::Intermission),
            _ => None,
        };

        match next {
            Some(next) => self.set_state(next, now),
            None => false,
        }
    }

    /// Move to `next` if the transition table allows it.
    ///
    /// Returns true if the state changed. Rejected requests are logged and
    /// counted; the current state is kept.
    pub fn set_state(&mut self, next: SongState, now: f64) -> bool {
        if next == self.state {
            return false;
        }
        if !self.transitions.is_allowed(self.state, next) {
            self.rejected += 1;
            tracing::warn!(from = %self.state, to = %next, "rejected song state transition");
            return false;
        }

        tracing::info!(from = %self.state, to = %next, at = now, "song state changed");
        self.state = next;
        self.state_since = now;
        true
    }
}

impl Default for SongStateMachine {
    fn default() -> Self {
        Self::new(SongStateConfig::default())
    }
}
