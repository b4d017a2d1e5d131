//! Sparse channel updates applied to fixtures

use std::collections::BTreeMap;

use crate::channel::Channel;

/// Sparse set of logical channel values.
///
/// Values are clamped when written to a fixture, so pan and tilt can carry
/// 16-bit positions.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChannelUpdate {
    values: BTreeMap<Channel, i32>,
}

impl ChannelUpdate {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style insert
    pub fn with(mut self, channel: Channel, value: i32) -> Self {
        self.values.insert(channel, value);
        self
    }

    pub fn set(&mut self, channel: Channel, value: i32) {
        self.values.insert(channel, value);
    }

    pub fn get(&self, channel: Channel) -> Option<i32> {
        self.values.get(&channel).copied()
    }

    pub fn contains(&self, channel: Channel) -> bool {
        self.values.contains_key(&channel)
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = (Channel, i32)> + '_ {
        self.values.iter().map(|(&c, &v)| (c, v))
    }

    /// Whether the update moves the fixture
    pub fn has_position(&self) -> bool {
        self.contains(Channel::Pan) || self.contains(Channel::Tilt)
    }
}

impl FromIterator<(Channel, i32)> for ChannelUpdate {
    fn from_iter<I: IntoIterator<Item = (Channel, i32)>>(iter: I) -> Self {
        Self {
            values: iter.into_iter().collect(),
        }
    }
}

impl<const N: usize> From<[(Channel, i32); N]> for ChannelUpdate {
    fn from(values: [(Channel, i32); N]) -> Self {
        values.into_iter().collect()
    }
}

/// RGB plus the extra emitters a fixture may have
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Color {
    pub red: u8,
    pub green: u8,
    pub blue: u8,
    pub white: u8,
    pub amber: u8,
    pub uv: u8,
}

impl Color {
    pub const fn rgb(red: u8, green: u8, blue: u8) -> Self {
        Self {
            red,
            green,
            blue,
            white: 0,
            amber: 0,
            uv: 0,
        }
    }

    pub const fn with_white(mut self, white: u8) -> Self {
        self.white = white;
        self
    }

    pub const fn with_amber(mut self, amber: u8) -> Self {
        self.amber = amber;
        self
    }

    pub const fn with_uv(mut self, uv: u8) -> Self {
        self.uv = uv;
        self
    }

    /// Channel/value pairs in the order they are written
    pub fn channels(&self) -> [(Channel, u8); 6] {
        [
            (Channel::Red, self.red),
            (Channel::Green, self.green),
            (Channel::Blue, self.blue),
            (Channel::White, self.white),
            (Channel::Amber, self.amber),
            (Channel::Uv, self.uv),
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builder_and_lookup() {
        let update = ChannelUpdate::new()
            .with(Channel::Red, 255)
            .with(Channel::Dimmer, 128);
        assert_eq!(update.get(Channel::Red), Some(255));
        assert_eq!(update.get(Channel::Blue), None);
        assert_eq!(update.len(), 2);
        assert!(!update.has_position());
    }

    #[test]
    fn test_from_array() {
        let update = ChannelUpdate::from([(Channel::Pan, 32768), (Channel::Tilt, 1000)]);
        assert!(update.has_position());
        let channels: Vec<Channel> = update.iter().map(|(c, _)| c).collect();
        assert_eq!(channels, vec![Channel::Pan, Channel::Tilt]);
    }
}
