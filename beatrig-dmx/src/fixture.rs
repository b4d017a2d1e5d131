//! A fixture patched at a start address
//!
//! Values are kept per logical channel. Color channels a model lacks are
//! approximated with the emitters it does have; other missing channels are
//! an error.

use crate::channel::Channel;
use crate::error::{DmxError, Result};
use crate::profile::{FixtureKind, FixtureProfile};
use crate::universe::{Universe, UNIVERSE_SIZE};
use crate::update::{ChannelUpdate, Color};

const UV_CELLS: [Channel; 4] = [Channel::Uv1, Channel::Uv2, Channel::Uv3, Channel::Uv4];

fn clamp_byte(value: i32) -> u8 {
    value.clamp(0, 255) as u8
}

/// A fixture instance with its current channel values
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Fixture {
    kind: FixtureKind,
    start_address: u16,
    values: Vec<u8>,
}

impl Fixture {
    /// Patch a fixture at `start_address` (1-based)
    pub fn new(kind: FixtureKind, start_address: u16) -> Result<Self> {
        let footprint = kind.profile().footprint();
        let last = start_address as usize + footprint - 1;
        if start_address == 0 || last > UNIVERSE_SIZE {
            return Err(DmxError::InvalidAddress {
                kind: kind.to_string(),
                address: start_address,
            });
        }
        Ok(Self {
            kind,
            start_address,
            values: vec![0; footprint],
        })
    }

    pub fn kind(&self) -> FixtureKind {
        self.kind
    }

    pub fn profile(&self) -> &'static FixtureProfile {
        self.kind.profile()
    }

    pub fn start_address(&self) -> u16 {
        self.start_address
    }

    pub fn has(&self, channel: Channel) -> bool {
        self.profile().offset(channel).is_some()
    }

    /// Absolute DMX address of a channel
    pub fn address(&self, channel: Channel) -> Option<u16> {
        self.profile()
            .offset(channel)
            .map(|offset| self.start_address + offset as u16)
    }

    /// Current value of a channel, 0 if the fixture lacks it
    pub fn get_channel(&self, channel: Channel) -> u8 {
        self.profile()
            .offset(channel)
            .map_or(0, |offset| self.values[offset])
    }

    /// Set one channel, approximating color channels the model lacks
    pub fn set_channel(&mut self, channel: Channel, value: i32) -> Result<()> {
        let value = clamp_byte(value);
        if self.write(channel, value) || self.approximate(channel, value) {
            Ok(())
        } else {
            Err(DmxError::UnknownChannel(channel))
        }
    }

    /// Set every color emitter, skipping those that cannot be approximated
    pub fn set_color(&mut self, color: Color) {
        for (channel, value) in color.channels() {
            let _ = self.set_channel(channel, value as i32);
        }
    }

    pub fn set_dimmer(&mut self, value: i32) -> Result<()> {
        if self.write(Channel::Dimmer, clamp_byte(value)) {
            Ok(())
        } else {
            Err(DmxError::UnknownChannel(Channel::Dimmer))
        }
    }

    /// Set the strobe, or the shutter on models without one
    pub fn set_strobe(&mut self, value: i32) -> Result<()> {
        let value = clamp_byte(value);
        if self.write(Channel::Strobe, value) || self.write(Channel::Shutter, value) {
            Ok(())
        } else {
            Err(DmxError::UnknownChannel(Channel::Strobe))
        }
    }

    /// Move the fixture.
    ///
    /// Positions are 16-bit and split across coarse/fine channels when the
    /// model has them, otherwise they saturate at 255.
    pub fn set_pan_tilt(&mut self, pan: i32, tilt: i32) -> Result<()> {
        self.set_axis(Channel::Pan, Channel::PanFine, pan)?;
        self.set_axis(Channel::Tilt, Channel::TiltFine, tilt)
    }

    fn set_axis(&mut self, coarse: Channel, fine: Channel, position: i32) -> Result<()> {
        if !self.has(coarse) {
            return Err(DmxError::UnknownChannel(coarse));
        }
        let position = position.clamp(0, u16::MAX as i32) as u16;
        if self.has(fine) {
            self.write(coarse, (position >> 8) as u8);
            self.write(fine, (position & 0xFF) as u8);
        } else {
            self.write(coarse, position.min(255) as u8);
        }
        Ok(())
    }

    /// Apply a sparse update, skipping channels the fixture cannot take
    pub fn apply(&mut self, update: &ChannelUpdate) {
        if update.has_position() {
            let pan = update.get(Channel::Pan).unwrap_or(0);
            let tilt = update.get(Channel::Tilt).unwrap_or(0);
            if let Err(e) = self.set_pan_tilt(pan, tilt) {
                tracing::trace!(fixture = %self.kind, error = %e, "skipped position");
            }
        }
        for (channel, value) in update.iter() {
            if matches!(channel, Channel::Pan | Channel::Tilt) {
                continue;
            }
            if let Err(e) = self.set_channel(channel, value) {
                tracing::trace!(fixture = %self.kind, error = %e, "skipped channel");
            }
        }
    }

    /// Set every channel to zero
    pub fn reset(&mut self) {
        self.values.iter_mut().for_each(|v| *v = 0);
    }

    /// Values keyed by absolute DMX address
    pub fn frame(&self) -> Vec<(u16, u8)> {
        self.values
            .iter()
            .enumerate()
            .map(|(offset, &value)| (self.start_address + offset as u16, value))
            .collect()
    }

    /// Write this fixture's values into a universe
    pub fn write_into(&self, universe: &mut Universe) {
        for (address, value) in self.frame() {
            universe.set(address, value);
        }
    }

    /// Write a channel the model has; false if it lacks it
    fn write(&mut self, channel: Channel, value: u8) -> bool {
        match self.profile().offset(channel) {
            Some(offset) => {
                self.values[offset] = value;
                true
            }
            None => false,
        }
    }

    fn approximate(&mut self, channel: Channel, value: u8) -> bool {
        match channel {
            c if c.is_white() => {
                if self.write(Channel::White, value) {
                    return true;
                }
                if self.has_all(&[Channel::Red, Channel::Green, Channel::Blue]) {
                    self.write(Channel::Red, value);
                    self.write(Channel::Green, value);
                    self.write(Channel::Blue, value);
                    return true;
                }
                if c == Channel::White && self.has_all(&[Channel::WarmWhite, Channel::ColdWhite]) {
                    self.write(Channel::WarmWhite, value);
                    self.write(Channel::ColdWhite, value);
                    return true;
                }
                false
            }
            Channel::Amber => {
                if self.has_all(&[Channel::Red, Channel::Green]) {
                    // Mostly red, half green
                    self.write(Channel::Red, value);
                    self.write(Channel::Green, value / 2);
                    return true;
                }
                false
            }
            Channel::Uv => {
                if self.has_all(&UV_CELLS) {
                    for cell in UV_CELLS {
                        self.write(cell, value);
                    }
                    return true;
                }
                false
            }
            _ => false,
        }
    }

    fn has_all(&self, channels: &[Channel]) -> bool {
        channels.iter().all(|&c| self.has(c))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_set_channel_clamps() {
        let mut fixture = Fixture::new(FixtureKind::LumiPar7Utri3, 10).unwrap();
        fixture.set_channel(Channel::Red, 300).unwrap();
        fixture.set_channel(Channel::Green, -5).unwrap();
        assert_eq!(fixture.get_channel(Channel::Red), 255);
        assert_eq!(fixture.get_channel(Channel::Green), 0);
    }

    #[test]
    fn test_unknown_channel_is_error() {
        let mut fixture = Fixture::new(FixtureKind::LumiPar7Utri3, 1).unwrap();
        assert!(matches!(
            fixture.set_channel(Channel::Fog, 255),
            Err(DmxError::UnknownChannel(Channel::Fog))
        ));
        assert!(fixture.set_dimmer(10).is_err());
        assert!(fixture.set_strobe(10).is_err());
        assert!(fixture.set_pan_tilt(0, 0).is_err());
    }

    #[test]
    fn test_white_falls_back_to_rgb() {
        let mut fixture = Fixture::new(FixtureKind::LumiPar7Utri3, 1).unwrap();
        fixture.set_channel(Channel::White, 200).unwrap();
        assert_eq!(fixture.frame(), vec![(1, 200), (2, 200), (3, 200)]);
    }

    #[test]
    fn test_white_prefers_white_channel() {
        let mut fixture = Fixture::new(FixtureKind::LumiPar12UqPro4, 1).unwrap();
        fixture.set_channel(Channel::WarmWhite, 90).unwrap();
        assert_eq!(fixture.get_channel(Channel::White), 90);
        assert_eq!(fixture.get_channel(Channel::Red), 0);
    }

    #[test]
    fn test_white_on_warm_cold_fixture() {
        let mut fixture = Fixture::new(FixtureKind::LumiPar12Uaw5, 1).unwrap();
        fixture.set_channel(Channel::White, 120).unwrap();
        assert_eq!(fixture.get_channel(Channel::WarmWhite), 120);
        assert_eq!(fixture.get_channel(Channel::ColdWhite), 120);
    }

    #[test]
    fn test_amber_approximation() {
        let mut fixture = Fixture::new(FixtureKind::LumiPar7Utri8, 1).unwrap();
        fixture.set_channel(Channel::Amber, 200).unwrap();
        assert_eq!(fixture.get_channel(Channel::Red), 200);
        assert_eq!(fixture.get_channel(Channel::Green), 100);
        assert_eq!(fixture.get_channel(Channel::Blue), 0);
    }

    #[test]
    fn test_set_color_ignores_missing() {
        let mut fixture = Fixture::new(FixtureKind::LumiPar12Uaw5, 1).unwrap();
        fixture.set_color(Color::rgb(255, 0, 0).with_amber(180));
        assert_eq!(fixture.get_channel(Channel::Amber), 180);

        let mut uv = Fixture::new(FixtureKind::PartyParUv7, 1).unwrap();
        uv.set_color(Color::default().with_uv(255));
        assert_eq!(uv.get_channel(Channel::Uv3), 255);
    }

    #[test]
    fn test_pan_tilt_fine_split() {
        let mut head = Fixture::new(FixtureKind::PixieWash13, 1).unwrap();
        head.set_pan_tilt(0x1234, 0xABCD).unwrap();
        assert_eq!(head.get_channel(Channel::Pan), 0x12);
        assert_eq!(head.get_channel(Channel::PanFine), 0x34);
        assert_eq!(head.get_channel(Channel::Tilt), 0xAB);
        assert_eq!(head.get_channel(Channel::TiltFine), 0xCD);

        head.set_pan_tilt(-10, 100_000).unwrap();
        assert_eq!(head.get_channel(Channel::Pan), 0);
        assert_eq!(head.get_channel(Channel::Tilt), 0xFF);
        assert_eq!(head.get_channel(Channel::TiltFine), 0xFF);
    }

    #[test]
    fn test_strobe_falls_back_to_shutter() {
        let mut head = Fixture::new(FixtureKind::PixieWash13, 1).unwrap();
        head.set_strobe(77).unwrap();
        assert_eq!(head.get_channel(Channel::Shutter), 77);
    }

    #[test]
    fn test_apply_and_frame_addresses() {
        let mut head = Fixture::new(FixtureKind::PixieWash13, 100).unwrap();
        let update = ChannelUpdate::new()
            .with(Channel::Pan, 0x8000)
            .with(Channel::Dimmer, 255)
            .with(Channel::Fog, 255);
        head.apply(&update);
        let frame = head.frame();
        assert_eq!(frame.len(), 13);
        assert_eq!(frame[0], (100, 0x80));
        assert_eq!(frame[6], (106, 255));

        let mut universe = Universe::new();
        head.write_into(&mut universe);
        assert_eq!(universe.get(106), 255);

        head.reset();
        assert!(head.frame().iter().all(|&(_, v)| v == 0));
    }

    #[test]
    fn test_address_must_fit() {
        assert!(Fixture::new(FixtureKind::PixieWash13, 0).is_err());
        assert!(Fixture::new(FixtureKind::PixieWash13, 500).is_ok());
        assert!(Fixture::new(FixtureKind::PixieWash13, 501).is_err());
    }
}
