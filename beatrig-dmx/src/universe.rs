//! 512-channel DMX universe buffer

/// Number of channels in one DMX512 universe
pub const UNIVERSE_SIZE: usize = 512;

/// One universe of channel values. Channels are addressed 1-512.
#[derive(Clone, PartialEq, Eq)]
pub struct Universe {
    data: [u8; UNIVERSE_SIZE],
}

impl Universe {
    pub fn new() -> Self {
        Self {
            data: [0; UNIVERSE_SIZE],
        }
    }

    /// Set a channel; addresses outside 1-512 are ignored
    pub fn set(&mut self, channel: u16, value: u8) {
        if let Some(slot) = Self::index(channel).map(|i| &mut self.data[i]) {
            *slot = value;
        }
    }

    /// Value of a channel, 0 for addresses outside 1-512
    pub fn get(&self, channel: u16) -> u8 {
        Self::index(channel).map_or(0, |i| self.data[i])
    }

    pub fn as_bytes(&self) -> &[u8; UNIVERSE_SIZE] {
        &self.data
    }

    pub fn clear(&mut self) {
        self.data = [0; UNIVERSE_SIZE];
    }

    fn index(channel: u16) -> Option<usize> {
        let channel = channel as usize;
        (1..=UNIVERSE_SIZE).contains(&channel).then(|| channel - 1)
    }
}

impl Default for Universe {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for Universe {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // Only list channels that are on
        let active: Vec<(usize, u8)> = self
            .data
            .iter()
            .enumerate()
            .filter(|(_, &v)| v != 0)
            .map(|(i, &v)| (i + 1, v))
            .collect();
        f.debug_struct("Universe").field("active", &active).finish()
    }
}
