//! The patched rig: fixtures and the named groups they belong to

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use crate::error::{DmxError, Result};
use crate::fixture::Fixture;
use crate::profile::FixtureKind;
use crate::universe::Universe;
use crate::update::ChannelUpdate;

/// Group names used by the built-in venue rig
pub mod groups {
    pub const MOVING_HEAD: &str = "Moving Head";
    pub const STAGE_LIGHT: &str = "Stage Light";
    pub const OVERHEAD_EFFECTS: &str = "Overhead Effects";
    pub const KARAOKE_LIGHTS: &str = "Karaoke Lights";
    pub const UV: &str = "UV";
    pub const SMOKE_MACHINE: &str = "Smoke Machine";
}

/// One line of a rig description
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RigEntry {
    pub kind: FixtureKind,
    pub start_address: u16,
    pub group: Option<String>,
}

impl RigEntry {
    pub fn new(kind: FixtureKind, start_address: u16, group: Option<&str>) -> Self {
        Self {
            kind,
            start_address,
            group: group.map(str::to_string),
        }
    }

    /// Parse rig lines of the form `kind, start_address[, group]`.
    ///
    /// Blank lines and `#` comments are skipped.
    pub fn parse_all(content: &str) -> Result<Vec<RigEntry>> {
        let mut entries = Vec::new();
        for (index, raw) in content.lines().enumerate() {
            let line = raw.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            let syntax = |message: String| DmxError::RigSyntax {
                line: index + 1,
                message,
            };

            let mut fields = line.splitn(3, ',').map(str::trim);
            let kind = fields
                .next()
                .unwrap_or_default()
                .parse::<FixtureKind>()
                .map_err(|e| syntax(e.to_string()))?;
            let address = fields
                .next()
                .ok_or_else(|| syntax("missing start address".to_string()))?;
            let start_address = address
                .parse::<u16>()
                .map_err(|_| syntax(format!("invalid start address '{address}'")))?;
            let group = fields.next().filter(|g| !g.is_empty());

            entries.push(RigEntry::new(kind, start_address, group));
        }
        Ok(entries)
    }
}

/// Patched fixtures plus group membership
#[derive(Debug, Clone, Default)]
pub struct Rig {
    fixtures: Vec<Fixture>,
    groups: BTreeMap<String, Vec<usize>>,
}

impl Rig {
    pub fn from_entries(entries: &[RigEntry]) -> Result<Self> {
        let mut rig = Rig::default();
        for entry in entries {
            let fixture = Fixture::new(entry.kind, entry.start_address)?;
            rig.add(fixture, entry.group.as_deref());
        }
        Ok(rig)
    }

    /// Load a rig description file
    pub fn load(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)?;
        Self::from_entries(&RigEntry::parse_all(&content)?)
    }

    /// The venue rig the show was designed for
    pub fn standard() -> Self {
        let mut rig = Rig::default();
        for entry in Self::standard_entries() {
            // Every standard address fits in the universe
            if let Ok(fixture) = Fixture::new(entry.kind, entry.start_address) {
                rig.add(fixture, entry.group.as_deref());
            }
        }
        rig
    }

    pub fn standard_entries() -> Vec<RigEntry> {
        use groups::*;
        vec![
            RigEntry::new(FixtureKind::PixieWash13, 1, Some(MOVING_HEAD)),
            RigEntry::new(FixtureKind::LumiPar12Uaw5, 14, Some(STAGE_LIGHT)),
            RigEntry::new(FixtureKind::LumiPar12Uaw5, 21, Some(STAGE_LIGHT)),
            RigEntry::new(FixtureKind::LumiPar12UqPro9, 28, Some(OVERHEAD_EFFECTS)),
            RigEntry::new(FixtureKind::LumiPar12UqPro9, 37, Some(OVERHEAD_EFFECTS)),
            RigEntry::new(FixtureKind::LumiPar7Utri8, 46, Some(KARAOKE_LIGHTS)),
            RigEntry::new(FixtureKind::LumiPar12UqPro4, 54, Some(KARAOKE_LIGHTS)),
            RigEntry::new(FixtureKind::PartyParUv7, 58, Some(UV)),
            RigEntry::new(FixtureKind::GenericFog4, 65, Some(SMOKE_MACHINE)),
        ]
    }

    /// Add a fixture, optionally to a group
    pub fn add(&mut self, fixture: Fixture, group: Option<&str>) {
        let index = self.fixtures.len();
        self.fixtures.push(fixture);
        if let Some(group) = group {
            self.groups.entry(group.to_string()).or_default().push(index);
        }
    }

    pub fn fixtures(&self) -> &[Fixture] {
        &self.fixtures
    }

    pub fn group_names(&self) -> impl Iterator<Item = &str> {
        self.groups.keys().map(String::as_str)
    }

    pub fn has_group(&self, group: &str) -> bool {
        self.groups.contains_key(group)
    }

    /// Fixtures of a group, empty for unknown groups
    pub fn group(&self, group: &str) -> impl Iterator<Item = &Fixture> {
        self.groups
            .get(group)
            .into_iter()
            .flatten()
            .filter_map(|&i| self.fixtures.get(i))
    }

    /// Apply an update to every fixture of a group; returns how many were touched
    pub fn apply(&mut self, group: &str, update: &ChannelUpdate) -> usize {
        let Some(indices) = self.groups.get(group) else {
            tracing::debug!(group, "update for unknown group");
            return 0;
        };
        for &i in indices {
            if let Some(fixture) = self.fixtures.get_mut(i) {
                fixture.apply(update);
            }
        }
        indices.len()
    }

    /// Reset every fixture to zero
    pub fn reset(&mut self) {
        self.fixtures.iter_mut().for_each(Fixture::reset);
    }

    /// Merge all fixtures into one universe; later fixtures win on overlap
    pub fn frame(&self) -> Universe {
        let mut universe = Universe::new();
        for fixture in &self.fixtures {
            fixture.write_into(&mut universe);
        }
        universe
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::channel::Channel;

    #[test]
    fn test_standard_rig() {
        let rig = Rig::standard();
        assert_eq!(rig.fixtures().len(), 9);
        assert_eq!(rig.group(groups::STAGE_LIGHT).count(), 2);
        assert_eq!(rig.group(groups::SMOKE_MACHINE).count(), 1);
        assert_eq!(rig.group("Lasers").count(), 0);

        // No two fixtures overlap
        let mut used = [false; 513];
        for fixture in rig.fixtures() {
            for (address, _) in fixture.frame() {
                assert!(!used[address as usize], "address {address} patched twice");
                used[address as usize] = true;
            }
        }
    }

    #[test]
    fn test_parse_rig_file() {
        let content = "# venue\n\npixiewash-13ch, 1, Moving Head\nlumipar-7utri-3ch,20\n";
        let entries = RigEntry::parse_all(content).unwrap();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].group.as_deref(), Some("Moving Head"));
        assert_eq!(entries[1].start_address, 20);
        assert_eq!(entries[1].group, None);
    }

    #[test]
    fn test_parse_errors_name_the_line() {
        let err = RigEntry::parse_all("pixiewash-13ch, 1\nlaser, 5").unwrap_err();
        assert!(matches!(err, DmxError::RigSyntax { line: 2, .. }));
        let err = RigEntry::parse_all("pixiewash-13ch, one").unwrap_err();
        assert!(matches!(err, DmxError::RigSyntax { line: 1, .. }));
        assert!(RigEntry::parse_all("pixiewash-13ch").is_err());
    }

    #[test]
    fn test_apply_group_and_frame() {
        let mut rig = Rig::standard();
        let touched = rig.apply(
            groups::OVERHEAD_EFFECTS,
            &ChannelUpdate::from([(Channel::Red, 255), (Channel::Dimmer, 200)]),
        );
        assert_eq!(touched, 2);
        assert_eq!(rig.apply("Lasers", &ChannelUpdate::new()), 0);

        let frame = rig.frame();
        // Red and dimmer of both overhead pars (start 28 and 37)
        assert_eq!(frame.get(28), 255);
        assert_eq!(frame.get(35), 200);
        assert_eq!(frame.get(37), 255);
        assert_eq!(frame.get(44), 200);
        assert_eq!(frame.get(1), 0);

        rig.reset();
        assert_eq!(rig.frame(), Universe::new());
    }

    #[test]
    fn test_invalid_address_in_entries() {
        let entries = vec![RigEntry::new(FixtureKind::PixieWash13, 510, None)];
        assert!(matches!(
            Rig::from_entries(&entries),
            Err(DmxError::InvalidAddress { .. })
        ));
    }
}
