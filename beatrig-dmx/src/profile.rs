//! Fixture profiles: channel layouts of the supported devices

use std::fmt;
use std::str::FromStr;

use crate::channel::Channel;
use crate::error::DmxError;

/// Channel layout of a fixture model
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FixtureProfile {
    pub name: &'static str,
    pub manufacturer: &'static str,
    /// Channels in address order, the index is the offset from the start address
    pub channels: &'static [Channel],
}

impl FixtureProfile {
    /// Offset of `channel` from the start address
    pub fn offset(&self, channel: Channel) -> Option<usize> {
        self.channels.iter().position(|&c| c == channel)
    }

    pub fn footprint(&self) -> usize {
        self.channels.len()
    }
}

use Channel::*;

static PIXIE_WASH_13: FixtureProfile = FixtureProfile {
    name: "PixieWash 13ch",
    manufacturer: "Prolights",
    channels: &[
        Pan,
        PanFine,
        Tilt,
        TiltFine,
        PanTiltSpeed,
        Special,
        Dimmer,
        Shutter,
        Red,
        Green,
        Blue,
        White,
        ColorMacros,
    ],
};

static LUMIPAR_12UAW5_7: FixtureProfile = FixtureProfile {
    name: "LumiPar 12UAW5 7ch",
    manufacturer: "Prolights",
    channels: &[Amber, ColdWhite, WarmWhite, Strobe, Programs, Dimmer, DimmerCurve],
};

static LUMIPAR_12UQPRO_4: FixtureProfile = FixtureProfile {
    name: "LumiPar 12UQPro 4ch",
    manufacturer: "Prolights",
    channels: &[Red, Green, Blue, White],
};

static LUMIPAR_12UQPRO_9: FixtureProfile = FixtureProfile {
    name: "LumiPar 12UQPro 9ch",
    manufacturer: "Prolights",
    channels: &[
        Red,
        Green,
        Blue,
        White,
        ColorMacros,
        Strobe,
        Programs,
        Dimmer,
        DimmerCurve,
    ],
};

static LUMIPAR_7UTRI_3: FixtureProfile = FixtureProfile {
    name: "LumiPar 7UTRI 3ch",
    manufacturer: "Prolights",
    channels: &[Red, Green, Blue],
};

static LUMIPAR_7UTRI_8: FixtureProfile = FixtureProfile {
    name: "LumiPar 7UTRI 8ch",
    manufacturer: "Prolights",
    channels: &[Red, Green, Blue, ColorMacros, Strobe, Programs, Dimmer, DimmerSpeed],
};

static PARTY_PAR_UV_7: FixtureProfile = FixtureProfile {
    name: "PartyPar UV 7ch",
    manufacturer: "Fuzzix",
    channels: &[Dimmer, Uv1, Uv2, Uv3, Uv4, Strobe, Macro],
};

static GENERIC_FOG_4: FixtureProfile = FixtureProfile {
    name: "Generic fog 4ch",
    manufacturer: "WhatSoftware",
    channels: &[Fog, Reserved2, Reserved3, Reserved4],
};

/// Supported fixture models
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FixtureKind {
    PixieWash13,
    LumiPar12Uaw5,
    LumiPar12UqPro4,
    LumiPar12UqPro9,
    LumiPar7Utri3,
    LumiPar7Utri8,
    PartyParUv7,
    GenericFog4,
}

impl FixtureKind {
    pub const ALL: [FixtureKind; 8] = [
        FixtureKind::PixieWash13,
        FixtureKind::LumiPar12Uaw5,
        FixtureKind::LumiPar12UqPro4,
        FixtureKind::LumiPar12UqPro9,
        FixtureKind::LumiPar7Utri3,
        FixtureKind::LumiPar7Utri8,
        FixtureKind::PartyParUv7,
        FixtureKind::GenericFog4,
    ];

    pub fn profile(&self) -> &'static FixtureProfile {
        match self {
            FixtureKind::PixieWash13 => &PIXIE_WASH_13,
            FixtureKind::LumiPar12Uaw5 => &LUMIPAR_12UAW5_7,
            FixtureKind::LumiPar12UqPro4 => &LUMIPAR_12UQPRO_4,
            FixtureKind::LumiPar12UqPro9 => &LUMIPAR_12UQPRO_9,
            FixtureKind::LumiPar7Utri3 => &LUMIPAR_7UTRI_3,
            FixtureKind::LumiPar7Utri8 => &LUMIPAR_7UTRI_8,
            FixtureKind::PartyParUv7 => &PARTY_PAR_UV_7,
            FixtureKind::GenericFog4 => &GENERIC_FOG_4,
        }
    }

    /// Identifier used in rig files
    pub fn id(&self) -> &'static str {
        match self {
            FixtureKind::PixieWash13 => "pixiewash-13ch",
            FixtureKind::LumiPar12Uaw5 => "lumipar-12uaw5-7ch",
            FixtureKind::LumiPar12UqPro4 => "lumipar-12uqpro-4ch",
            FixtureKind::LumiPar12UqPro9 => "lumipar-12uqpro-9ch",
            FixtureKind::LumiPar7Utri3 => "lumipar-7utri-3ch",
            FixtureKind::LumiPar7Utri8 => "lumipar-7utri-8ch",
            FixtureKind::PartyParUv7 => "partypar-uv-7ch",
            FixtureKind::GenericFog4 => "generic-fog-4ch",
        }
    }
}

impl fmt::Display for FixtureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.id())
    }
}

impl FromStr for FixtureKind {
    type Err = DmxError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim();
        FixtureKind::ALL
            .iter()
            .copied()
            .find(|k| k.id().eq_ignore_ascii_case(wanted))
            .ok_or_else(|| DmxError::UnknownFixture(wanted.to_string()))
    }
}
