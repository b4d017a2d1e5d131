//! Scenario director
//!
//! Turns the per-block detection results into lighting: picks the scenario
//! for the song state and genre, fires and expires transient effects, runs
//! the smoke machine and feeds the VU dimmer. All of its state lives on the
//! analysis worker thread.

use std::collections::BTreeMap;
use std::sync::Arc;

use beatrig_analysis::{DetectionResult, SongState};
use beatrig_dmx::{groups, Channel, ChannelUpdate, DmxHandle};

use crate::dimmer::{DimmerSignal, VuDimmer};
use crate::error::ShowError;
use crate::genre::{GenreClassifier, GenreService};
use crate::scenario::{EventKind, ScenarioGraph, ScenarioKind};

#[derive(Debug, Clone)]
pub struct DirectorConfig {
    /// Group whose dimmer follows the VU
    pub overhead_group: String,
    pub smoke_group: String,
    /// Seconds of song audio handed to the classifier
    pub classify_window: f64,
    /// Seconds to wait after a failed classification
    pub classify_retry: f64,
    /// Seconds a request may stay unanswered before it counts as failed
    pub classify_timeout: f64,
    pub sample_rate: u32,
}

impl Default for DirectorConfig {
    fn default() -> Self {
        Self {
            overhead_group: groups::OVERHEAD_EFFECTS.to_string(),
            smoke_group: groups::SMOKE_MACHINE.to_string(),
            classify_window: 5.0,
            classify_retry: 10.0,
            classify_timeout: 30.0,
            sample_rate: 44100,
        }
    }
}

/// Where genre classification stands for the current song
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub enum ClassificationStatus {
    /// Buffering audio
    #[default]
    Idle,
    Pending,
    Done,
    /// Failed; buffering restarts at this time
    RetryAt(f64),
}

/// Everything the director remembers between blocks
#[derive(Debug, Clone, Default)]
pub struct ShowRuntimeState {
    pub current_scenario: ScenarioKind,
    /// Group → time its transient effect expires
    pub active_effects: BTreeMap<String, f64>,
    pub smoke_on: bool,
    pub smoke_until: Option<f64>,
    pub last_smoke: Option<f64>,
    pub smoothed_dimmer: f32,
    /// Incremented on every song start
    pub song_id: u64,
    pub song_state: SongState,
    pub song_started: Option<f64>,
    /// Scenario from the classifier label, if it named a known genre
    pub classified_genre: Option<ScenarioKind>,
    pub last_genre: Option<ScenarioKind>,
    pub classification: ClassificationStatus,
    pub classify_buffer: Vec<f32>,
    pub buffer_started: Option<f64>,
    /// When the pending request is given up
    pub classify_deadline: Option<f64>,
    pub last_timer: Option<f64>,
    pub chorus_was_on: bool,
    pub illegal_transitions: u64,
}

pub struct ScenarioDirector {
    config: DirectorConfig,
    graph: ScenarioGraph,
    dmx: DmxHandle,
    genre: Option<GenreService>,
    dimmer: VuDimmer,
    signal: DimmerSignal,
    state: ShowRuntimeState,
}

impl ScenarioDirector {
    pub fn new(config: DirectorConfig, graph: ScenarioGraph, dmx: DmxHandle) -> Self {
        Self {
            config,
            graph,
            dmx,
            genre: None,
            dimmer: VuDimmer::default(),
            signal: DimmerSignal::new(),
            state: ShowRuntimeState::default(),
        }
    }

    /// Use a genre model; without one the genre comes from the BPM alone
    pub fn with_classifier(mut self, classifier: Arc<dyn GenreClassifier>) -> Self {
        self.genre = Some(GenreService::new(classifier));
        self
    }

    pub fn dimmer_signal(&self) -> DimmerSignal {
        self.signal.clone()
    }

    pub fn graph(&self) -> &ScenarioGraph {
        &self.graph
    }

    pub fn state(&self) -> &ShowRuntimeState {
        &self.state
    }

    pub fn current_scenario(&self) -> ScenarioKind {
        self.state.current_scenario
    }

    /// Light the rig for the current scenario
    pub fn start(&mut self) {
        self.apply_steady();
        self.set_smoke(false);
        self.signal.set_held(true);
        tracing::info!(scenario = %self.state.current_scenario, "show started");
    }

    /// React to one analysed block
    pub fn process(&mut self, samples: &[f32], result: &DetectionResult, now: f64) {
        self.expire(now);
        self.drain_classification(now);

        if result.state_changed {
            self.on_state_change(result.state, now);
        }
        self.state.song_state = result.state;

        self.buffer_for_classification(samples, now);

        if result.beat_detected {
            self.on_beat(result.bpm, now);
        }

        if result.is_chorus && !self.state.chorus_was_on {
            tracing::debug!("chorus");
            self.fire(EventKind::Chorus, now);
        }
        self.state.chorus_was_on = result.is_chorus;

        if result.snare_hit {
            self.fire(EventKind::SnareHit, now);
        }
        self.run_timer(now);

        self.state.smoothed_dimmer = self.dimmer.update(result.vu);
        self.signal.publish(self.state.smoothed_dimmer);
        self.sync_dimmer_hold();
    }

    /// Guarded scenario change.
    ///
    /// Entering a scenario clears transient effects and applies its steady
    /// values. Illegal transitions are counted and leave everything as is.
    pub fn set_scenario(&mut self, next: ScenarioKind, now: f64) -> Result<(), ShowError> {
        let current = self.state.current_scenario;
        if next == current {
            return Ok(());
        }
        if !self.graph.can_transition(current, next) {
            self.state.illegal_transitions += 1;
            tracing::warn!(from = %current, to = %next, "rejected scenario transition");
            return Err(ShowError::IllegalTransition {
                from: current,
                to: next,
            });
        }

        tracing::info!(from = %current, to = %next, "scenario change");
        self.state.current_scenario = next;
        self.state.active_effects.clear();
        self.state.last_timer = Some(now);
        self.apply_steady();
        if self.graph.get(next).smoke.is_none() {
            self.set_smoke(false);
        }
        self.sync_dimmer_hold();
        Ok(())
    }

    fn on_state_change(&mut self, song_state: SongState, now: f64) {
        if song_state == SongState::Starting {
            self.state.song_id += 1;
            self.state.song_started = Some(now);
            self.state.classified_genre = None;
            self.state.last_genre = None;
            self.state.classification = ClassificationStatus::Idle;
            self.state.classify_deadline = None;
            self.state.classify_buffer.clear();
            self.state.buffer_started = Some(now);
            if let Some(genre) = &self.genre {
                genre.cancel_pending();
            }
            tracing::info!(song_id = self.state.song_id, "song started");
        }

        let target = ScenarioKind::for_state(song_state, self.state.last_genre);
        let before = self.state.current_scenario;
        let cleared: Vec<String> = self.state.active_effects.keys().cloned().collect();
        self.state.active_effects.clear();
        // Rejections are logged and counted by set_scenario
        let _ = self.set_scenario(target, now);
        if self.state.current_scenario == before {
            // No steady values were applied, so undo the cleared effects
            for group in cleared {
                self.restore(&group);
            }
        }
    }

    fn drain_classification(&mut self, now: f64) {
        let Some(genre) = &self.genre else {
            return;
        };
        for outcome in genre.drain() {
            if outcome.song_id != self.state.song_id {
                tracing::debug!(
                    song_id = outcome.song_id,
                    current = self.state.song_id,
                    "discarding stale classification"
                );
                continue;
            }
            match outcome.result {
                Ok(label) if !label.trim().is_empty() => {
                    self.state.classified_genre = ScenarioKind::from_genre_label(&label);
                    self.state.classification = ClassificationStatus::Done;
                    self.state.classify_deadline = None;
                    match self.state.classified_genre {
                        Some(kind) => tracing::info!(%label, scenario = %kind, "genre classified"),
                        None => tracing::info!(%label, "unmapped genre, using BPM"),
                    }
                }
                Ok(_) => {
                    tracing::warn!("classifier not confident, retrying");
                    self.schedule_retry(now);
                }
                Err(e) => {
                    tracing::warn!(error = %e, "classification failed, retrying");
                    self.schedule_retry(now);
                }
            }
        }

        let overdue = self.state.classification == ClassificationStatus::Pending
            && self.state.classify_deadline.map_or(false, |deadline| now >= deadline);
        if overdue {
            if let Some(genre) = &self.genre {
                genre.cancel_pending();
            }
            tracing::warn!(song_id = self.state.song_id, "classification timed out, retrying");
            self.schedule_retry(now);
        }
    }

    fn schedule_retry(&mut self, now: f64) {
        self.state.classification = ClassificationStatus::RetryAt(now + self.config.classify_retry);
        self.state.classify_deadline = None;
        self.state.classify_buffer.clear();
        self.state.buffer_started = None;
    }

    fn buffer_for_classification(&mut self, samples: &[f32], now: f64) {
        let Some(genre) = &self.genre else {
            return;
        };
        if !matches!(self.state.song_state, SongState::Starting | SongState::Ongoing) {
            return;
        }
        match self.state.classification {
            ClassificationStatus::Idle => {}
            ClassificationStatus::RetryAt(at) if now >= at => {
                self.state.classification = ClassificationStatus::Idle;
                self.state.buffer_started = Some(now);
            }
            _ => return,
        }

        let window = self.config.classify_window;
        let capacity = (window * self.config.sample_rate as f64) as usize;
        let room = capacity.saturating_sub(self.state.classify_buffer.len());
        self.state
            .classify_buffer
            .extend_from_slice(&samples[..samples.len().min(room)]);
        let started = *self.state.buffer_started.get_or_insert(now);

        if self.state.classify_buffer.len() < capacity && now - started < window {
            return;
        }
        let audio = std::mem::take(&mut self.state.classify_buffer);
        match genre.request(self.state.song_id, audio, self.config.sample_rate) {
            Ok(_) => {
                self.state.classification = ClassificationStatus::Pending;
                self.state.classify_deadline = Some(now + self.config.classify_timeout);
            }
            Err(e) => {
                tracing::warn!(error = %e, "could not start classification");
                self.schedule_retry(now);
            }
        }
    }

    fn on_beat(&mut self, bpm: f32, now: f64) {
        tracing::debug!(bpm, "beat");
        let genre = self.state.classified_genre.or_else(|| self.graph.for_bpm(bpm));
        if let Some(genre) = genre {
            if self.state.last_genre != Some(genre) || self.state.current_scenario != genre {
                self.state.last_genre = Some(genre);
                if self.state.song_state == SongState::Ongoing {
                    // Rejections are logged and counted by set_scenario
                    let _ = self.set_scenario(genre, now);
                }
            }
        }

        self.fire(EventKind::Beat, now);

        let Some(cadence) = self.graph.get(self.state.current_scenario).smoke else {
            return;
        };
        let gap_elapsed = self
            .state
            .last_smoke
            .map_or(true, |last| now - last >= cadence.gap);
        if !self.state.smoke_on && gap_elapsed {
            self.set_smoke(true);
            self.state.last_smoke = Some(now);
            self.state.smoke_until = Some(now + cadence.burst);
        }
    }

    fn run_timer(&mut self, now: f64) {
        let Some(period) = self.graph.get(self.state.current_scenario).timer_period else {
            return;
        };
        let last = *self.state.last_timer.get_or_insert(now);
        if now - last >= period {
            self.state.last_timer = Some(now);
            self.fire(EventKind::Timer, now);
        }
    }

    /// Apply the current scenario's effects for an event
    fn fire(&mut self, event: EventKind, now: f64) {
        let effects = self
            .graph
            .get(self.state.current_scenario)
            .effects_for(event)
            .to_vec();
        for effect in &effects {
            let until = now + effect.duration;
            let expiry = self
                .state
                .active_effects
                .entry(effect.group.to_string())
                .or_insert(until);
            *expiry = expiry.max(until);
        }
        // The hold must be up before the flash reaches the rig
        self.sync_dimmer_hold();
        for effect in &effects {
            self.dmx.apply(effect.group, &effect.update);
            tracing::debug!(?event, group = effect.group, duration = effect.duration, "effect");
        }
    }

    fn expire(&mut self, now: f64) {
        let expired: Vec<String> = self
            .state
            .active_effects
            .iter()
            .filter(|(_, until)| **until <= now)
            .map(|(group, _)| group.clone())
            .collect();
        for group in expired {
            self.state.active_effects.remove(&group);
            self.restore(&group);
        }

        if self.state.smoke_on && self.state.smoke_until.map_or(true, |until| until <= now) {
            self.set_smoke(false);
        }
    }

    /// Put a group back to the current scenario's steady values
    fn restore(&self, group: &str) {
        match self.graph.get(self.state.current_scenario).steady_for(group) {
            Some(update) => {
                self.dmx.apply(group, update);
            }
            None => tracing::debug!(group, "no steady values to restore"),
        }
    }

    fn apply_steady(&self) {
        let scenario = self.graph.get(self.state.current_scenario);
        self.dmx.with_rig(|rig| {
            for (group, update) in &scenario.steady {
                rig.apply(group, update);
            }
        });
        self.dmx.update();
    }

    fn set_smoke(&mut self, on: bool) {
        let level = if on { 255 } else { 0 };
        self.dmx.apply(
            &self.config.smoke_group,
            &ChannelUpdate::from([(Channel::Fog, level)]),
        );
        if on != self.state.smoke_on {
            tracing::info!(on, "smoke");
        }
        self.state.smoke_on = on;
        if !on {
            self.state.smoke_until = None;
        }
    }

    /// The VU only drives the dimmer during a song with no effect on the group
    fn sync_dimmer_hold(&self) {
        let in_song = matches!(self.state.song_state, SongState::Starting | SongState::Ongoing);
        let overridden = self
            .state
            .active_effects
            .contains_key(&self.config.overhead_group);
        self.signal.set_held(!in_song || overridden);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::genre::tests::FixedClassifier;
    use crate::genre::ClassifyOutcome;
    use beatrig_dmx::{DmxDispatcher, NullPort, Rig};
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::thread;
    use std::time::{Duration, Instant};

    fn director() -> (DmxDispatcher, ScenarioDirector) {
        let dispatcher = DmxDispatcher::new(Rig::standard(), Box::new(NullPort), 44);
        let mut director =
            ScenarioDirector::new(DirectorConfig::default(), ScenarioGraph::standard(), dispatcher.handle());
        director.start();
        (dispatcher, director)
    }

    fn changed(state: SongState) -> DetectionResult {
        DetectionResult {
            state,
            state_changed: true,
            vu: 0.1,
            ..Default::default()
        }
    }

    fn steady(state: SongState) -> DetectionResult {
        DetectionResult {
            state,
            vu: 0.1,
            ..Default::default()
        }
    }

    fn beat(bpm: f32) -> DetectionResult {
        DetectionResult {
            beat_detected: true,
            bpm,
            ..steady(SongState::Ongoing)
        }
    }

    fn into_song(director: &mut ScenarioDirector) {
        let block = vec![0.0; 512];
        director.process(&block, &changed(SongState::Starting), 0.0);
        director.process(&block, &changed(SongState::Ongoing), 2.0);
    }

    /// Address of a channel on the first fixture of a group
    fn address(dispatcher: &DmxDispatcher, group: &str, channel: Channel) -> u16 {
        dispatcher
            .handle()
            .with_rig(|rig| rig.group(group).next().and_then(|f| f.address(channel)))
            .unwrap()
    }

    #[test]
    fn test_state_changes_pick_scenarios() {
        let (_dispatcher, mut director) = director();
        let block = vec![0.0; 512];
        assert_eq!(director.current_scenario(), ScenarioKind::Intermission);

        director.process(&block, &changed(SongState::Starting), 0.0);
        assert_eq!(director.current_scenario(), ScenarioKind::SongStart);
        assert_eq!(director.state().song_id, 1);

        director.process(&block, &changed(SongState::Ongoing), 2.0);
        assert_eq!(director.current_scenario(), ScenarioKind::SongOngoing);

        director.process(&block, &changed(SongState::Ending), 10.0);
        assert_eq!(director.current_scenario(), ScenarioKind::SongEnding);

        director.process(&block, &changed(SongState::Intermission), 13.0);
        assert_eq!(director.current_scenario(), ScenarioKind::Intermission);
    }

    #[test]
    fn test_beats_at_100_bpm_select_pop() {
        let (_dispatcher, mut director) = director();
        into_song(&mut director);

        director.process(&[], &beat(100.0), 3.0);
        assert_eq!(director.current_scenario(), ScenarioKind::Pop);
        assert_eq!(director.state().last_genre, Some(ScenarioKind::Pop));
    }

    #[test]
    fn test_genre_waits_for_ongoing() {
        let (_dispatcher, mut director) = director();
        director.process(&[], &changed(SongState::Starting), 0.0);
        director.process(
            &[],
            &DetectionResult {
                beat_detected: true,
                bpm: 140.0,
                ..steady(SongState::Starting)
            },
            0.5,
        );
        assert_eq!(director.current_scenario(), ScenarioKind::SongStart);
        assert_eq!(director.state().last_genre, Some(ScenarioKind::Rock));

        director.process(&[], &changed(SongState::Ongoing), 2.0);
        assert_eq!(director.current_scenario(), ScenarioKind::Rock);
    }

    #[test]
    fn test_song_start_clears_genre() {
        let (_dispatcher, mut director) = director();
        into_song(&mut director);
        director.process(&[], &beat(150.0), 3.0);
        assert_eq!(director.current_scenario(), ScenarioKind::Rock);

        director.process(&[], &changed(SongState::Ending), 10.0);
        director.process(&[], &changed(SongState::Starting), 11.0);
        assert_eq!(director.current_scenario(), ScenarioKind::SongStart);
        assert_eq!(director.state().last_genre, None);
        assert_eq!(director.state().classified_genre, None);
        assert_eq!(director.state().song_id, 2);
    }

    #[test]
    fn test_illegal_transition_is_rejected() {
        let (_dispatcher, mut director) = director();
        let err = director.set_scenario(ScenarioKind::Metal, 0.0).unwrap_err();
        assert!(matches!(
            err,
            ShowError::IllegalTransition {
                from: ScenarioKind::Intermission,
                to: ScenarioKind::Metal
            }
        ));
        assert_eq!(director.current_scenario(), ScenarioKind::Intermission);
        assert_eq!(director.state().illegal_transitions, 1);

        assert!(director.set_scenario(ScenarioKind::Intermission, 0.0).is_ok());
        assert!(director.set_scenario(ScenarioKind::SongStart, 0.0).is_ok());
    }

    #[test]
    fn test_effect_expires_back_to_steady() {
        let (dispatcher, mut director) = director();
        into_song(&mut director);
        director.process(&[], &beat(100.0), 3.0);
        let handle = dispatcher.handle();
        let red = address(&dispatcher, groups::OVERHEAD_EFFECTS, Channel::Red);

        // Pop beat flash is magenta, steady overhead is cyan
        assert_eq!(handle.frame().get(red), 255);
        assert!(director.state().active_effects.contains_key(groups::OVERHEAD_EFFECTS));
        assert!(director.dimmer_signal().is_held());

        director.process(&[], &steady(SongState::Ongoing), 3.1);
        assert_eq!(handle.frame().get(red), 255);

        director.process(&[], &steady(SongState::Ongoing), 3.2);
        assert_eq!(handle.frame().get(red), 0);
        assert!(director.state().active_effects.is_empty());
        assert!(!director.dimmer_signal().is_held());
    }

    #[test]
    fn test_smoke_cadence() {
        let (dispatcher, mut director) = director();
        into_song(&mut director);
        let handle = dispatcher.handle();
        let fog = address(&dispatcher, groups::SMOKE_MACHINE, Channel::Fog);

        director.process(&[], &beat(100.0), 3.0);
        assert!(director.state().smoke_on);
        assert_eq!(handle.frame().get(fog), 255);

        director.process(&[], &steady(SongState::Ongoing), 6.0);
        assert!(!director.state().smoke_on);
        assert_eq!(handle.frame().get(fog), 0);

        // Gap not yet elapsed
        director.process(&[], &beat(100.0), 20.0);
        assert!(!director.state().smoke_on);

        director.process(&[], &beat(100.0), 33.0);
        assert!(director.state().smoke_on);

        // Song end turns it off at once
        director.process(&[], &changed(SongState::Ending), 34.0);
        assert!(!director.state().smoke_on);
    }

    #[test]
    fn test_chorus_fires_on_rising_edge() {
        let (dispatcher, mut director) = director();
        into_song(&mut director);
        let handle = dispatcher.handle();
        let red = address(&dispatcher, groups::KARAOKE_LIGHTS, Channel::Red);
        let chorus = DetectionResult {
            is_chorus: true,
            ..steady(SongState::Ongoing)
        };

        director.process(&[], &chorus, 3.0);
        assert_eq!(handle.frame().get(red), 255);
        director.process(&[], &chorus, 4.5);
        // Held chorus does not fire again, so the flash expired
        assert_eq!(handle.frame().get(red), 80);
    }

    #[test]
    fn test_timer_effects() {
        let (_dispatcher, mut director) = director();
        into_song(&mut director);
        director.process(&[], &beat(60.0), 3.0);
        assert_eq!(director.current_scenario(), ScenarioKind::Slow);

        director.process(&[], &steady(SongState::Ongoing), 10.0);
        assert!(!director.state().active_effects.contains_key(groups::UV));
        director.process(&[], &steady(SongState::Ongoing), 11.0);
        assert!(director.state().active_effects.contains_key(groups::UV));
    }

    #[test]
    fn test_dimmer_follows_vu_during_song() {
        let (_dispatcher, mut director) = director();
        director.process(&[], &steady(SongState::Intermission), 0.0);
        assert!(director.dimmer_signal().is_held());

        into_song(&mut director);
        let signal = director.dimmer_signal();
        assert!(!signal.is_held());
        assert!(signal.level() > 0.0);
        assert_eq!(signal.level(), director.state().smoothed_dimmer);
    }

    fn wait_for(director: &mut ScenarioDirector, now: f64, until: impl Fn(&ShowRuntimeState) -> bool) -> bool {
        let deadline = Instant::now() + Duration::from_secs(2);
        while Instant::now() < deadline {
            director.process(&[], &steady(SongState::Ongoing), now);
            if until(director.state()) {
                return true;
            }
            thread::sleep(Duration::from_millis(5));
        }
        false
    }

    #[test]
    fn test_classifier_label_picks_genre() {
        let (dispatcher, _) = director();
        let mut director = ScenarioDirector::new(
            DirectorConfig::default(),
            ScenarioGraph::standard(),
            dispatcher.handle(),
        )
        .with_classifier(FixedClassifier::label("metal"));
        director.start();

        director.process(&vec![0.1; 44100 * 5], &changed(SongState::Starting), 0.0);
        director.process(&[], &changed(SongState::Ongoing), 2.0);
        assert_eq!(director.state().classification, ClassificationStatus::Pending);

        assert!(wait_for(&mut director, 3.0, |s| s.classification == ClassificationStatus::Done));
        assert_eq!(director.state().classified_genre, Some(ScenarioKind::Metal));

        // Classifier wins over the BPM table
        director.process(&[], &beat(100.0), 4.0);
        assert_eq!(director.current_scenario(), ScenarioKind::Metal);
    }

    #[test]
    fn test_stale_classification_is_ignored() {
        let (dispatcher, _) = director();
        let classifier = Arc::new(FixedClassifier {
            answer: Ok("metal".to_string()),
            delay: Duration::from_millis(50),
        });
        let mut director = ScenarioDirector::new(
            DirectorConfig::default(),
            ScenarioGraph::standard(),
            dispatcher.handle(),
        )
        .with_classifier(classifier);
        director.start();

        let block = vec![0.1; 44100 * 5];
        director.process(&block, &changed(SongState::Starting), 0.0);
        assert_eq!(director.state().classification, ClassificationStatus::Pending);

        // Next song starts before the first answer arrives
        director.process(&[], &changed(SongState::Ongoing), 2.0);
        director.process(&[], &changed(SongState::Ending), 3.0);
        director.process(&[], &changed(SongState::Starting), 4.0);
        director.process(&[], &changed(SongState::Ongoing), 6.0);
        thread::sleep(Duration::from_millis(200));

        director.process(&[], &beat(100.0), 7.0);
        assert_eq!(director.state().song_id, 2);
        assert_eq!(director.state().classified_genre, None);
        assert_eq!(director.current_scenario(), ScenarioKind::Pop);
    }

    #[test]
    fn test_failed_classification_retries() {
        let (dispatcher, _) = director();
        let classifier = Arc::new(FixedClassifier {
            answer: Ok(String::new()),
            delay: Duration::ZERO,
        });
        let mut director = ScenarioDirector::new(
            DirectorConfig::default(),
            ScenarioGraph::standard(),
            dispatcher.handle(),
        )
        .with_classifier(classifier);
        director.start();

        director.process(&vec![0.1; 44100 * 5], &changed(SongState::Starting), 0.0);
        assert!(wait_for(&mut director, 1.0, |s| matches!(
            s.classification,
            ClassificationStatus::RetryAt(_)
        )));
        assert_eq!(director.state().classification, ClassificationStatus::RetryAt(11.0));

        director.process(&vec![0.1; 512], &steady(SongState::Ongoing), 11.0);
        assert_eq!(director.state().classification, ClassificationStatus::Idle);
        assert_eq!(director.state().classify_buffer.len(), 512);
    }

    #[test]
    fn test_state_change_into_same_scenario_restores_effects() {
        let (dispatcher, mut director) = director();
        into_song(&mut director);
        let handle = dispatcher.handle();
        let red = address(&dispatcher, groups::KARAOKE_LIGHTS, Channel::Red);
        let chorus = DetectionResult {
            is_chorus: true,
            ..steady(SongState::Ongoing)
        };

        director.process(&[], &chorus, 3.0);
        assert_eq!(handle.frame().get(red), 255);

        // Reported again while already in Song Ongoing
        director.process(&[], &changed(SongState::Ongoing), 3.2);
        assert_eq!(director.current_scenario(), ScenarioKind::SongOngoing);
        assert!(director.state().active_effects.is_empty());
        assert_eq!(handle.frame().get(red), 80);
    }

    #[test]
    fn test_flash_survives_dimmer_hook() {
        let (dispatcher, mut director) = director();
        let handle = dispatcher.handle();
        let dimmer = address(&dispatcher, groups::OVERHEAD_EFFECTS, Channel::Dimmer);
        let mut hook = director.dimmer_signal().pre_send_hook(groups::OVERHEAD_EFFECTS);

        let running = Arc::new(AtomicBool::new(true));
        let hook_running = running.clone();
        let hook_handle = handle.clone();
        let sender = thread::spawn(move || {
            while hook_running.load(Ordering::Relaxed) {
                hook(&hook_handle);
            }
        });

        into_song(&mut director);
        for i in 0..200 {
            let t = 3.0 + i as f64;
            // Flash expired, the dimmer follows the VU again
            let vu = if i % 2 == 0 { 0.05 } else { 0.25 };
            director.process(&[], &DetectionResult { vu, ..steady(SongState::Ongoing) }, t);
            assert!(!director.dimmer_signal().is_held());

            director.process(&[], &beat(100.0), t + 0.5);
            assert_eq!(handle.frame().get(dimmer), 255, "flash {i}");
        }

        running.store(false, Ordering::Relaxed);
        sender.join().unwrap();
    }

    #[test]
    fn test_unanswered_classification_times_out() {
        let (dispatcher, _) = director();
        let classifier = Arc::new(FixedClassifier {
            answer: Ok("metal".to_string()),
            delay: Duration::from_millis(500),
        });
        let config = DirectorConfig {
            classify_timeout: 1.0,
            ..DirectorConfig::default()
        };
        let mut director = ScenarioDirector::new(config, ScenarioGraph::standard(), dispatcher.handle())
            .with_classifier(classifier);
        director.start();

        director.process(&vec![0.1; 44100 * 5], &changed(SongState::Starting), 0.0);
        assert_eq!(director.state().classification, ClassificationStatus::Pending);
        assert_eq!(director.state().classify_deadline, Some(1.0));

        director.process(&[], &steady(SongState::Starting), 1.5);
        assert_eq!(director.state().classification, ClassificationStatus::RetryAt(11.5));
        assert_eq!(director.state().classify_deadline, None);

        // The late answer belongs to a cancelled request
        thread::sleep(Duration::from_millis(800));
        director.process(&[], &steady(SongState::Starting), 2.0);
        assert_eq!(director.state().classified_genre, None);
        assert_eq!(director.state().classification, ClassificationStatus::RetryAt(11.5));
    }

    #[test]
    fn test_outcome_for_old_song_is_discarded() {
        let (dispatcher, _) = director();
        let mut director = ScenarioDirector::new(
            DirectorConfig::default(),
            ScenarioGraph::standard(),
            dispatcher.handle(),
        )
        .with_classifier(FixedClassifier::label("metal"));
        director.start();
        into_song(&mut director);
        assert_eq!(director.state().song_id, 1);

        let service = director.genre.as_ref().unwrap();
        service.deliver(ClassifyOutcome {
            song_id: 0,
            result: Ok("metal".to_string()),
        });
        director.process(&[], &steady(SongState::Ongoing), 3.0);
        assert_eq!(director.state().classified_genre, None);
        assert_eq!(director.state().classification, ClassificationStatus::Idle);

        let service = director.genre.as_ref().unwrap();
        service.deliver(ClassifyOutcome {
            song_id: 1,
            result: Ok("metal".to_string()),
        });
        director.process(&[], &steady(SongState::Ongoing), 3.1);
        assert_eq!(director.state().classified_genre, Some(ScenarioKind::Metal));
        assert_eq!(director.state().classification, ClassificationStatus::Done);
    }
}
