//! Show lifecycle: wires detector, director, worker and DMX sender together

use std::sync::Arc;

use beatrig_analysis::BeatDetector;
use beatrig_dmx::{DmxDispatcher, DmxHandle};

use crate::director::{DirectorConfig, ScenarioDirector};
use crate::error::ShowError;
use crate::genre::GenreClassifier;
use crate::scenario::ScenarioGraph;
use crate::worker::{audio_queue, AnalysisWorker, AudioSender};

/// A running show
pub struct Show {
    audio: AudioSender,
    worker: AnalysisWorker,
    dispatcher: DmxDispatcher,
}

impl Show {
    /// Light the rig and start the DMX sender and the analysis worker.
    ///
    /// The song state machine only takes transitions the scenario graph
    /// allows.
    pub fn start(
        mut dispatcher: DmxDispatcher,
        mut detector: BeatDetector,
        config: DirectorConfig,
        classifier: Option<Arc<dyn GenreClassifier>>,
    ) -> Result<Self, ShowError> {
        let graph = ScenarioGraph::standard();
        detector.set_transitions(graph.state_transitions());

        let overhead = config.overhead_group.clone();
        let mut director = ScenarioDirector::new(config, graph, dispatcher.handle());
        if let Some(classifier) = classifier {
            director = director.with_classifier(classifier);
        }
        director.start();

        dispatcher.start(Some(director.dimmer_signal().pre_send_hook(overhead)));

        let (audio, rx) = audio_queue();
        let worker = AnalysisWorker::spawn(detector, director, rx)?;
        tracing::info!("show running");
        Ok(Self {
            audio,
            worker,
            dispatcher,
        })
    }

    /// Producer for the audio input
    pub fn audio(&self) -> AudioSender {
        self.audio.clone()
    }

    pub fn dmx(&self) -> DmxHandle {
        self.dispatcher.handle()
    }

    pub fn blocks_processed(&self) -> u64 {
        self.worker.blocks_processed()
    }

    pub fn dropped_blocks(&self) -> u64 {
        self.audio.dropped()
    }

    /// Stop accepting audio, join the worker, then stop the DMX sender
    pub fn shutdown(mut self) {
        self.stop();
    }

    fn stop(&mut self) {
        if !self.worker.is_running() && !self.dispatcher.is_running() {
            return;
        }
        self.audio.close();
        self.worker.stop();
        self.dispatcher.stop();
        let dmx = self.dispatcher.handle();
        tracing::info!(
            blocks = self.worker.blocks_processed(),
            dropped = self.audio.dropped(),
            frames = dmx.frames_sent(),
            send_errors = dmx.send_errors(),
            "show stopped"
        );
    }
}

impl Drop for Show {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::worker::AudioBlock;
    use beatrig_analysis::{DetectorConfig, TuningStore};
    use beatrig_dmx::{Channel, RecordingPort, Rig};
    use std::thread;
    use std::time::{Duration, Instant};

    #[test]
    fn test_loud_input_lights_the_song() {
        let port = RecordingPort::new();
        let dispatcher = DmxDispatcher::new(Rig::standard(), Box::new(port.clone()), 200);
        let detector = BeatDetector::new(DetectorConfig::default(), TuningStore::in_memory());
        let show = Show::start(dispatcher, detector, DirectorConfig::default(), None).unwrap();

        let dimmer = show
            .dmx()
            .with_rig(|rig| {
                rig.group(beatrig_dmx::groups::MOVING_HEAD)
                    .next()
                    .and_then(|f| f.address(Channel::Dimmer))
            })
            .unwrap();
        assert_eq!(show.dmx().frame().get(dimmer), 0);

        let audio = show.audio();
        let blocks = 44100 * 3 / 512;
        for i in 0..blocks {
            let samples = (0..512)
                .map(|n| {
                    let t = (i * 512 + n) as f32 / 44100.0;
                    (2.0 * std::f32::consts::PI * 220.0 * t).sin() * 0.3
                })
                .collect();
            let block = AudioBlock {
                samples,
                timestamp: (i * 512) as f64 / 44100.0,
            };
            while !audio.push(block.clone()) {
                thread::sleep(Duration::from_millis(1));
            }
        }

        let deadline = Instant::now() + Duration::from_secs(10);
        while show.blocks_processed() < blocks as u64 && Instant::now() < deadline {
            thread::sleep(Duration::from_millis(5));
        }
        assert_eq!(show.blocks_processed(), blocks as u64);
        assert_eq!(show.dmx().frame().get(dimmer), 255);

        while port.last().map_or(true, |u| u.get(dimmer) != 255) && Instant::now() < deadline {
            thread::sleep(Duration::from_millis(5));
        }
        assert_eq!(port.last().unwrap().get(dimmer), 255);

        let handle = show.dmx();
        show.shutdown();
        assert!(handle.frames_sent() >= 2);
        assert!(!audio.push(AudioBlock {
            samples: vec![0.0; 512],
            timestamp: 10.0,
        }));
    }
}
