//! Lighting scenarios and the graph of legal transitions between them
//!
//! Every scenario is a fixed preset: steady channel values per fixture
//! group, transient effects fired by musical events, a smoke cadence and the
//! scenarios it may move to. The graph is built once and only read after.

use std::collections::BTreeMap;
use std::fmt;

use beatrig_analysis::{SongState, StateTransitions};
use beatrig_dmx::groups::{
    KARAOKE_LIGHTS, MOVING_HEAD, OVERHEAD_EFFECTS, SMOKE_MACHINE, STAGE_LIGHT, UV,
};
use beatrig_dmx::{Channel, ChannelUpdate};

/// Handle of a scenario in the graph
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub enum ScenarioKind {
    #[default]
    Intermission,
    SongStart,
    SongOngoing,
    Slow,
    Jazz,
    Pop,
    Rock,
    Metal,
    SongEnding,
}

impl ScenarioKind {
    pub const ALL: [ScenarioKind; 9] = [
        ScenarioKind::Intermission,
        ScenarioKind::SongStart,
        ScenarioKind::SongOngoing,
        ScenarioKind::Slow,
        ScenarioKind::Jazz,
        ScenarioKind::Pop,
        ScenarioKind::Rock,
        ScenarioKind::Metal,
        ScenarioKind::SongEnding,
    ];

    /// Genre scenarios, slowest first
    pub const GENRES: [ScenarioKind; 5] = [
        ScenarioKind::Slow,
        ScenarioKind::Jazz,
        ScenarioKind::Pop,
        ScenarioKind::Rock,
        ScenarioKind::Metal,
    ];

    pub fn label(&self) -> &'static str {
        match self {
            ScenarioKind::Intermission => "Intermission",
            ScenarioKind::SongStart => "Song Start",
            ScenarioKind::SongOngoing => "Song Ongoing",
            ScenarioKind::Slow => "Slow",
            ScenarioKind::Jazz => "Jazz",
            ScenarioKind::Pop => "Pop",
            ScenarioKind::Rock => "Rock",
            ScenarioKind::Metal => "Metal",
            ScenarioKind::SongEnding => "Song Ending",
        }
    }

    pub fn is_genre(&self) -> bool {
        Self::GENRES.contains(self)
    }

    /// Scenario for a genre classifier label (case-insensitive)
    pub fn from_genre_label(label: &str) -> Option<ScenarioKind> {
        match label.trim().to_ascii_lowercase().as_str() {
            "rock" => Some(ScenarioKind::Rock),
            "metal" => Some(ScenarioKind::Metal),
            "pop" | "disco" | "hiphop" | "reggae" | "country" => Some(ScenarioKind::Pop),
            "jazz" | "blues" => Some(ScenarioKind::Jazz),
            "classical" | "ambient" => Some(ScenarioKind::Slow),
            _ => None,
        }
    }

    /// Scenario shown while the song is in `state`
    pub fn for_state(state: SongState, last_genre: Option<ScenarioKind>) -> ScenarioKind {
        match state {
            SongState::Intermission => ScenarioKind::Intermission,
            SongState::Starting => ScenarioKind::SongStart,
            SongState::Ongoing => last_genre.unwrap_or(ScenarioKind::SongOngoing),
            SongState::Ending => ScenarioKind::SongEnding,
        }
    }

    fn index(self) -> usize {
        self as usize
    }
}

impl fmt::Display for ScenarioKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Musical events that can fire transient effects
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum EventKind {
    Beat,
    Chorus,
    SnareHit,
    Timer,
}

/// A temporary override of a group's channels
#[derive(Debug, Clone, PartialEq)]
pub struct TransientEffect {
    pub group: &'static str,
    pub update: ChannelUpdate,
    /// Seconds before the group's steady values are restored
    pub duration: f64,
}

/// Smoke machine timing
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SmokeCadence {
    /// Minimum seconds between the start of two bursts
    pub gap: f64,
    /// Seconds the fog stays on
    pub burst: f64,
}

impl Default for SmokeCadence {
    fn default() -> Self {
        Self {
            gap: 30.0,
            burst: 3.0,
        }
    }
}

/// One node of the scenario graph
#[derive(Debug, Clone)]
pub struct Scenario {
    pub kind: ScenarioKind,
    /// BPM range `[low, high)` this genre covers
    pub bpm_range: Option<(f32, f32)>,
    /// Steady channel values per group, applied in order
    pub steady: Vec<(&'static str, ChannelUpdate)>,
    pub effects: BTreeMap<EventKind, Vec<TransientEffect>>,
    /// None keeps the smoke machine off
    pub smoke: Option<SmokeCadence>,
    /// Period of the `Timer` event, if any
    pub timer_period: Option<f64>,
    pub successors: Vec<ScenarioKind>,
    pub predecessors: Vec<ScenarioKind>,
}

impl Scenario {
    fn new(kind: ScenarioKind) -> Self {
        Self {
            kind,
            bpm_range: None,
            steady: Vec::new(),
            effects: BTreeMap::new(),
            smoke: Some(SmokeCadence::default()),
            timer_period: None,
            successors: Vec::new(),
            predecessors: Vec::new(),
        }
    }

    fn bpm(mut self, low: f32, high: f32) -> Self {
        self.bpm_range = Some((low, high));
        self
    }

    fn steady(mut self, group: &'static str, update: ChannelUpdate) -> Self {
        self.steady.push((group, update));
        self
    }

    fn on(mut self, event: EventKind, group: &'static str, update: ChannelUpdate, duration: f64) -> Self {
        self.effects.entry(event).or_default().push(TransientEffect {
            group,
            update,
            duration,
        });
        self
    }

    fn smoke(mut self, smoke: Option<SmokeCadence>) -> Self {
        self.smoke = smoke;
        self
    }

    fn timer(mut self, period: f64) -> Self {
        self.timer_period = Some(period);
        self
    }

    /// Steady update for a group
    pub fn steady_for(&self, group: &str) -> Option<&ChannelUpdate> {
        self.steady
            .iter()
            .find(|(g, _)| *g == group)
            .map(|(_, update)| update)
    }

    /// Effects fired by an event, empty if none
    pub fn effects_for(&self, event: EventKind) -> &[TransientEffect] {
        self.effects.get(&event).map_or(&[], Vec::as_slice)
    }

    pub fn covers_bpm(&self, bpm: f32) -> bool {
        self.bpm_range
            .map_or(false, |(low, high)| bpm >= low && bpm < high)
    }
}

fn rgb(r: i32, g: i32, b: i32) -> ChannelUpdate {
    ChannelUpdate::from([(Channel::Red, r), (Channel::Green, g), (Channel::Blue, b)])
}

fn dimmer(value: i32) -> ChannelUpdate {
    ChannelUpdate::from([(Channel::Dimmer, value)])
}

/// Moving head pointed at the performer
fn on_artist(r: i32, g: i32, b: i32, w: i32) -> ChannelUpdate {
    rgb(r, g, b)
        .with(Channel::White, w)
        .with(Channel::Pan, 0x8000)
        .with(Channel::Tilt, 0x3000)
        .with(Channel::Dimmer, 255)
        .with(Channel::Shutter, 255)
}

/// Moving head sweeping the audience
fn on_audience(dim: i32) -> ChannelUpdate {
    ChannelUpdate::new()
        .with(Channel::White, 255)
        .with(Channel::Pan, 0x8000)
        .with(Channel::Tilt, 0xA000)
        .with(Channel::Dimmer, dim)
        .with(Channel::Shutter, 255)
}

fn house_lights(level: i32) -> ChannelUpdate {
    ChannelUpdate::from([
        (Channel::WarmWhite, level),
        (Channel::ColdWhite, level / 2),
        (Channel::Amber, level / 3),
        (Channel::Dimmer, level),
    ])
}

/// Static graph of scenarios indexed by [`ScenarioKind`]
#[derive(Debug, Clone)]
pub struct ScenarioGraph {
    scenarios: Vec<Scenario>,
}

impl ScenarioGraph {
    /// The venue's scenario set
    pub fn standard() -> Self {
        use EventKind::*;
        use ScenarioKind::*;

        let in_song: Vec<ScenarioKind> = [SongOngoing]
            .into_iter()
            .chain(ScenarioKind::GENRES)
            .collect();

        let mut scenarios = vec![
            Scenario::new(Intermission)
                .steady(STAGE_LIGHT, house_lights(255))
                .steady(MOVING_HEAD, on_audience(0))
                .steady(OVERHEAD_EFFECTS, rgb(0, 0, 80).with(Channel::Dimmer, 60))
                .steady(KARAOKE_LIGHTS, rgb(120, 60, 0).with(Channel::Dimmer, 80))
                .steady(UV, dimmer(0))
                .smoke(None),
            Scenario::new(SongStart)
                .steady(STAGE_LIGHT, house_lights(0))
                .steady(MOVING_HEAD, on_artist(0, 0, 0, 255))
                .steady(OVERHEAD_EFFECTS, rgb(0, 0, 0).with(Channel::White, 120).with(Channel::Dimmer, 120))
                .steady(KARAOKE_LIGHTS, rgb(0, 0, 0).with(Channel::Dimmer, 0))
                .steady(UV, dimmer(0))
                .on(Beat, OVERHEAD_EFFECTS, dimmer(255), 0.15),
            Scenario::new(SongOngoing)
                .steady(STAGE_LIGHT, house_lights(0))
                .steady(MOVING_HEAD, on_artist(0, 0, 0, 255))
                .steady(OVERHEAD_EFFECTS, rgb(255, 140, 0).with(Channel::Dimmer, 160))
                .steady(KARAOKE_LIGHTS, rgb(80, 40, 0).with(Channel::Dimmer, 100))
                .steady(UV, dimmer(0))
                .on(Beat, OVERHEAD_EFFECTS, dimmer(255), 0.15)
                .on(Chorus, KARAOKE_LIGHTS, rgb(255, 255, 255).with(Channel::Dimmer, 255), 1.0),
            Scenario::new(Slow)
                .bpm(0.0, 80.0)
                .steady(STAGE_LIGHT, house_lights(0))
                .steady(MOVING_HEAD, on_artist(40, 0, 255, 80))
                .steady(OVERHEAD_EFFECTS, rgb(60, 0, 200).with(Channel::Dimmer, 90))
                .steady(KARAOKE_LIGHTS, rgb(0, 0, 120).with(Channel::Dimmer, 60))
                .steady(UV, dimmer(120).with(Channel::Uv, 200))
                .on(Beat, OVERHEAD_EFFECTS, rgb(120, 0, 255).with(Channel::Dimmer, 140), 0.4)
                .on(Chorus, KARAOKE_LIGHTS, rgb(180, 180, 255).with(Channel::Dimmer, 160), 2.0)
                .on(Timer, UV, dimmer(255).with(Channel::Uv, 255), 2.0)
                .smoke(Some(SmokeCadence { gap: 45.0, burst: 3.0 }))
                .timer(8.0),
            Scenario::new(Jazz)
                .bpm(80.0, 100.0)
                .steady(STAGE_LIGHT, house_lights(0))
                .steady(MOVING_HEAD, on_artist(255, 120, 0, 120))
                .steady(OVERHEAD_EFFECTS, rgb(255, 100, 0).with(Channel::Dimmer, 120))
                .steady(KARAOKE_LIGHTS, rgb(200, 80, 0).with(Channel::Dimmer, 90))
                .steady(UV, dimmer(0))
                .on(Beat, OVERHEAD_EFFECTS, rgb(255, 160, 40).with(Channel::Dimmer, 200), 0.2)
                .on(Chorus, MOVING_HEAD, on_artist(255, 255, 255, 255), 1.0),
            Scenario::new(Pop)
                .bpm(100.0, 130.0)
                .steady(STAGE_LIGHT, house_lights(0))
                .steady(MOVING_HEAD, on_artist(255, 0, 180, 80))
                .steady(OVERHEAD_EFFECTS, rgb(0, 200, 255).with(Channel::Dimmer, 150))
                .steady(KARAOKE_LIGHTS, rgb(255, 0, 200).with(Channel::Dimmer, 120))
                .steady(UV, dimmer(80).with(Channel::Uv, 120))
                .on(Beat, OVERHEAD_EFFECTS, rgb(255, 0, 200).with(Channel::Dimmer, 255), 0.15)
                .on(Chorus, KARAOKE_LIGHTS, rgb(255, 255, 255).with(Channel::Dimmer, 255), 0.8)
                .on(SnareHit, UV, dimmer(255).with(Channel::Uv, 255), 0.1),
            Scenario::new(Rock)
                .bpm(130.0, 160.0)
                .steady(STAGE_LIGHT, house_lights(0))
                .steady(MOVING_HEAD, on_artist(255, 0, 0, 60))
                .steady(OVERHEAD_EFFECTS, rgb(255, 0, 0).with(Channel::Dimmer, 170))
                .steady(KARAOKE_LIGHTS, rgb(255, 40, 0).with(Channel::Dimmer, 120))
                .steady(UV, dimmer(0))
                .on(Beat, OVERHEAD_EFFECTS, rgb(255, 255, 255).with(Channel::Dimmer, 255), 0.1)
                .on(Chorus, KARAOKE_LIGHTS, rgb(255, 255, 255).with(Channel::Dimmer, 255), 0.8)
                .on(SnareHit, MOVING_HEAD, on_artist(255, 255, 255, 255).with(Channel::Shutter, 200), 0.1),
            Scenario::new(Metal)
                .bpm(160.0, f32::INFINITY)
                .steady(STAGE_LIGHT, house_lights(0))
                .steady(MOVING_HEAD, on_artist(255, 0, 0, 0))
                .steady(OVERHEAD_EFFECTS, rgb(200, 0, 0).with(Channel::Dimmer, 180))
                .steady(KARAOKE_LIGHTS, rgb(255, 0, 0).with(Channel::Dimmer, 150))
                .steady(UV, dimmer(0))
                .on(Beat, OVERHEAD_EFFECTS, rgb(255, 255, 255).with(Channel::Dimmer, 255).with(Channel::Strobe, 200), 0.08)
                .on(SnareHit, KARAOKE_LIGHTS, rgb(255, 255, 255).with(Channel::Dimmer, 255), 0.08)
                .on(Timer, UV, dimmer(255).with(Channel::Uv, 255).with(Channel::Strobe, 180), 1.0)
                .smoke(Some(SmokeCadence { gap: 20.0, burst: 3.0 }))
                .timer(4.0),
            Scenario::new(SongEnding)
                .steady(STAGE_LIGHT, house_lights(180))
                .steady(MOVING_HEAD, on_audience(255))
                .steady(OVERHEAD_EFFECTS, rgb(0, 0, 0).with(Channel::White, 80).with(Channel::Dimmer, 80))
                .steady(KARAOKE_LIGHTS, rgb(0, 0, 0).with(Channel::Dimmer, 0))
                .steady(UV, dimmer(0))
                .smoke(None),
        ];

        // Transition sets
        for scenario in &mut scenarios {
            let (successors, predecessors) = match scenario.kind {
                Intermission => (vec![SongStart], vec![SongEnding]),
                SongStart => (in_song.clone(), vec![Intermission, SongEnding]),
                SongEnding => (vec![Intermission, SongStart], in_song.clone()),
                _ => {
                    let mut successors = in_song.clone();
                    successors.push(SongEnding);
                    let mut predecessors = vec![SongStart];
                    predecessors.extend(in_song.iter().copied());
                    (successors, predecessors)
                }
            };
            scenario.successors = successors;
            scenario.predecessors = predecessors;
        }

        Self { scenarios }
    }

    pub fn get(&self, kind: ScenarioKind) -> &Scenario {
        &self.scenarios[kind.index()]
    }

    pub fn scenarios(&self) -> &[Scenario] {
        &self.scenarios
    }

    /// `from → to` is legal if each side lists the other; self-transitions always are
    pub fn can_transition(&self, from: ScenarioKind, to: ScenarioKind) -> bool {
        from == to
            || (self.get(from).successors.contains(&to) && self.get(to).predecessors.contains(&from))
    }

    /// Genre scenario whose BPM range covers `bpm`; None for unknown tempo
    pub fn for_bpm(&self, bpm: f32) -> Option<ScenarioKind> {
        if !(bpm > 0.0) {
            return None;
        }
        self.scenarios
            .iter()
            .find(|s| s.covers_bpm(bpm))
            .map(|s| s.kind)
    }

    /// Song state transitions allowed by the graph.
    ///
    /// A state change is legal if the scenarios shown in the two states may
    /// follow each other.
    pub fn state_transitions(&self) -> StateTransitions {
        StateTransitions::from_fn(|from, to| {
            self.can_transition(
                ScenarioKind::for_state(from, None),
                ScenarioKind::for_state(to, None),
            )
        })
    }

    /// Group driven by the smoke machine
    pub fn smoke_group(&self) -> &'static str {
        SMOKE_MACHINE
    }
}

impl Default for ScenarioGraph {
    fn default() -> Self {
        Self::standard()
    }
}
