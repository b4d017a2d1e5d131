//! VU-driven overhead dimmer
//!
//! The worker smooths the block VU into a dimmer level and publishes it; the
//! DMX sender thread picks it up right before each frame.

use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;

use beatrig_dmx::{Channel, ChannelUpdate, DmxHandle, PreSend};

/// Dimmer level while the room is quiet
pub const DIMMER_FLOOR: f32 = 0.0;
/// Dimmer level at full scale
pub const DIMMER_CEILING: f32 = 255.0;
/// VU at or below this leaves the dimmer at the floor
pub const PULSE_THRESHOLD: f32 = 0.02;
/// VU that drives the dimmer to the ceiling
pub const VU_FULL: f32 = 0.3;
/// Weight of the previous level in the smoothing
pub const SMOOTHING: f32 = 0.8;

/// Map a block VU to a dimmer level.
///
/// Logarithmic between the pulse threshold and full scale, so quiet passages
/// still move the lights.
pub fn vu_to_level(vu: f32) -> f32 {
    if !(vu > PULSE_THRESHOLD) {
        return DIMMER_FLOOR;
    }
    let ratio = ((vu - PULSE_THRESHOLD) / (VU_FULL - PULSE_THRESHOLD)).clamp(0.0, 1.0);
    let curve = (1.0 + 9.0 * ratio).ln() / 10f32.ln();
    (DIMMER_FLOOR + (DIMMER_CEILING - DIMMER_FLOOR) * curve).clamp(DIMMER_FLOOR, DIMMER_CEILING)
}

/// Exponentially smoothed dimmer level
#[derive(Debug, Clone)]
pub struct VuDimmer {
    alpha: f32,
    smoothed: f32,
}

impl VuDimmer {
    pub fn new(alpha: f32) -> Self {
        Self {
            alpha: alpha.clamp(0.0, 1.0),
            smoothed: DIMMER_FLOOR,
        }
    }

    /// Fold one block VU into the level and return it
    pub fn update(&mut self, vu: f32) -> f32 {
        self.smoothed = self.smoothed * self.alpha + vu_to_level(vu) * (1.0 - self.alpha);
        self.smoothed
    }

    pub fn level(&self) -> f32 {
        self.smoothed
    }

    pub fn reset(&mut self) {
        self.smoothed = DIMMER_FLOOR;
    }
}

impl Default for VuDimmer {
    fn default() -> Self {
        Self::new(SMOOTHING)
    }
}

struct SignalInner {
    level_bits: AtomicU32,
    held: AtomicBool,
}

/// Latest dimmer level, shared between the worker and the DMX sender
#[derive(Clone)]
pub struct DimmerSignal {
    inner: Arc<SignalInner>,
}

impl DimmerSignal {
    /// New signal, held until the first publish
    pub fn new() -> Self {
        Self {
            inner: Arc::new(SignalInner {
                level_bits: AtomicU32::new(DIMMER_FLOOR.to_bits()),
                held: AtomicBool::new(true),
            }),
        }
    }

    pub fn publish(&self, level: f32) {
        self.inner.level_bits.store(level.to_bits(), Ordering::Relaxed);
    }

    pub fn level(&self) -> f32 {
        f32::from_bits(self.inner.level_bits.load(Ordering::Relaxed))
    }

    /// While held, the level is not pushed to the fixtures
    pub fn set_held(&self, held: bool) {
        self.inner.held.store(held, Ordering::SeqCst);
    }

    pub fn is_held(&self) -> bool {
        self.inner.held.load(Ordering::SeqCst)
    }

    /// Hook for [`DmxDispatcher::start`](beatrig_dmx::DmxDispatcher::start)
    /// writing the level to `group`'s dimmer when it moved by a full unit.
    pub fn pre_send_hook(&self, group: impl Into<String>) -> PreSend {
        let signal = self.clone();
        let group = group.into();
        let mut pusher = DimmerPusher::default();
        Box::new(move |handle: &DmxHandle| {
            // Hold check and write under one rig lock
            let pushed = handle.with_rig(|rig| match pusher.next(&signal) {
                Some(level) => {
                    rig.apply(&group, &ChannelUpdate::from([(Channel::Dimmer, level as i32)]));
                    true
                }
                None => false,
            });
            if pushed {
                handle.update();
            }
        })
    }
}

impl Default for DimmerSignal {
    fn default() -> Self {
        Self::new()
    }
}

/// Decides which published levels are worth a DMX write
#[derive(Debug, Default)]
struct DimmerPusher {
    last_pushed: Option<f32>,
}

impl DimmerPusher {
    fn next(&mut self, signal: &DimmerSignal) -> Option<u8> {
        if signal.is_held() {
            // Whatever overrode the group owns it now; push again on release
            self.last_pushed = None;
            return None;
        }
        let level = signal.level();
        let moved = self
            .last_pushed
            .map_or(true, |last| (level - last).abs() >= 1.0);
        if !moved {
            return None;
        }
        self.last_pushed = Some(level);
        Some(level.round().clamp(0.0, 255.0) as u8)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use beatrig_dmx::{groups, DmxDispatcher, NullPort, Rig};

    #[test]
    fn test_vu_to_level_log_scale() {
        let zero = vu_to_level(0.0);
        let full = vu_to_level(VU_FULL);
        let above = vu_to_level(VU_FULL * 2.0);
        let low = vu_to_level(VU_FULL / 10.0);
        let mid = vu_to_level(VU_FULL / 2.0);

        assert_eq!(zero, DIMMER_FLOOR);
        assert_eq!(full, DIMMER_CEILING);
        assert_eq!(above, DIMMER_CEILING);
        assert!(zero < low && low < mid && mid < full);
    }

    #[test]
    fn test_vu_to_level_floor_and_monotonic() {
        assert_eq!(vu_to_level(PULSE_THRESHOLD), DIMMER_FLOOR);
        assert_eq!(vu_to_level(-1.0), DIMMER_FLOOR);
        assert_eq!(vu_to_level(f32::NAN), DIMMER_FLOOR);

        let mut previous = DIMMER_FLOOR;
        for i in 0..=500 {
            let level = vu_to_level(i as f32 * 0.001);
            assert!(level >= previous);
            assert!((DIMMER_FLOOR..=DIMMER_CEILING).contains(&level));
            previous = level;
        }
    }

    #[test]
    fn test_smoothing() {
        let mut dimmer = VuDimmer::default();
        let first = dimmer.update(VU_FULL);
        assert!((first - DIMMER_CEILING * 0.2).abs() < 1e-3);
        for _ in 0..100 {
            dimmer.update(VU_FULL);
        }
        assert!((dimmer.level() - DIMMER_CEILING).abs() < 0.1);
        dimmer.reset();
        assert_eq!(dimmer.level(), DIMMER_FLOOR);
    }

    #[test]
    fn test_pusher_needs_a_full_unit() {
        let signal = DimmerSignal::new();
        let mut pusher = DimmerPusher::default();
        assert_eq!(pusher.next(&signal), None);

        signal.set_held(false);
        signal.publish(100.0);
        assert_eq!(pusher.next(&signal), Some(100));
        signal.publish(100.6);
        assert_eq!(pusher.next(&signal), None);
        signal.publish(101.2);
        assert_eq!(pusher.next(&signal), Some(101));

        signal.set_held(true);
        signal.publish(150.0);
        assert_eq!(pusher.next(&signal), None);
        signal.set_held(false);
        signal.publish(150.2);
        assert_eq!(pusher.next(&signal), Some(150));
    }

    #[test]
    fn test_hook_writes_group_dimmer() {
        let dispatcher = DmxDispatcher::new(Rig::standard(), Box::new(NullPort), 44);
        let handle = dispatcher.handle();
        let signal = DimmerSignal::new();
        let mut hook = signal.pre_send_hook(groups::OVERHEAD_EFFECTS);

        signal.set_held(false);
        signal.publish(200.0);
        hook(&handle);
        // Dimmer of the first overhead par (start 28, offset 7)
        assert_eq!(handle.frame().get(35), 200);
    }

    #[test]
    fn test_hook_leaves_held_group_alone() {
        let dispatcher = DmxDispatcher::new(Rig::standard(), Box::new(NullPort), 44);
        let handle = dispatcher.handle();
        let signal = DimmerSignal::new();
        let mut hook = signal.pre_send_hook(groups::OVERHEAD_EFFECTS);

        signal.publish(120.0);
        handle.apply(
            groups::OVERHEAD_EFFECTS,
            &ChannelUpdate::from([(Channel::Dimmer, 255)]),
        );
        hook(&handle);
        assert_eq!(handle.frame().get(35), 255);

        signal.set_held(false);
        hook(&handle);
        assert_eq!(handle.frame().get(35), 120);
    }
}
