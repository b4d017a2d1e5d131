//! Logical fixture channels

use std::fmt;
use std::str::FromStr;

use crate::error::DmxError;

/// A logical channel a fixture may expose
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Channel {
    Pan,
    PanFine,
    Tilt,
    TiltFine,
    PanTiltSpeed,
    Special,
    Dimmer,
    DimmerCurve,
    DimmerSpeed,
    Shutter,
    Strobe,
    Red,
    Green,
    Blue,
    White,
    WarmWhite,
    ColdWhite,
    Amber,
    Uv,
    Uv1,
    Uv2,
    Uv3,
    Uv4,
    ColorMacros,
    Programs,
    Macro,
    Fog,
    Reserved2,
    Reserved3,
    Reserved4,
}

impl Channel {
    pub const ALL: [Channel; 30] = [
        Channel::Pan,
        Channel::PanFine,
        Channel::Tilt,
        Channel::TiltFine,
        Channel::PanTiltSpeed,
        Channel::Special,
        Channel::Dimmer,
        Channel::DimmerCurve,
        Channel::DimmerSpeed,
        Channel::Shutter,
        Channel::Strobe,
        Channel::Red,
        Channel::Green,
        Channel::Blue,
        Channel::White,
        Channel::WarmWhite,
        Channel::ColdWhite,
        Channel::Amber,
        Channel::Uv,
        Channel::Uv1,
        Channel::Uv2,
        Channel::Uv3,
        Channel::Uv4,
        Channel::ColorMacros,
        Channel::Programs,
        Channel::Macro,
        Channel::Fog,
        Channel::Reserved2,
        Channel::Reserved3,
        Channel::Reserved4,
    ];

    /// Snake-case name used in rig and log output
    pub fn name(&self) -> &'static str {
        match self {
            Channel::Pan => "pan",
            Channel::PanFine => "pan_fine",
            Channel::Tilt => "tilt",
            Channel::TiltFine => "tilt_fine",
            Channel::PanTiltSpeed => "pan_tilt_speed",
            Channel::Special => "special",
            Channel::Dimmer => "dimmer",
            Channel::DimmerCurve => "dimmer_curve",
            Channel::DimmerSpeed => "dimmer_speed",
            Channel::Shutter => "shutter",
            Channel::Strobe => "strobe",
            Channel::Red => "red",
            Channel::Green => "green",
            Channel::Blue => "blue",
            Channel::White => "white",
            Channel::WarmWhite => "warm_white",
            Channel::ColdWhite => "cold_white",
            Channel::Amber => "amber",
            Channel::Uv => "uv",
            Channel::Uv1 => "uv1",
            Channel::Uv2 => "uv2",
            Channel::Uv3 => "uv3",
            Channel::Uv4 => "uv4",
            Channel::ColorMacros => "color_macros",
            Channel::Programs => "programs",
            Channel::Macro => "macro",
            Channel::Fog => "fog",
            Channel::Reserved2 => "reserved_2",
            Channel::Reserved3 => "reserved_3",
            Channel::Reserved4 => "reserved_4",
        }
    }

    /// Whether this is one of the white channels
    pub fn is_white(&self) -> bool {
        matches!(self, Channel::White | Channel::WarmWhite | Channel::ColdWhite)
    }
}

impl fmt::Display for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Channel {
    type Err = DmxError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim();
        Channel::ALL
            .iter()
            .copied()
            .find(|c| c.name().eq_ignore_ascii_case(wanted))
            .ok_or_else(|| DmxError::UnknownChannelName(wanted.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_name_roundtrip() {
        for channel in Channel::ALL {
            assert_eq!(channel.name().parse::<Channel>().unwrap(), channel);
        }
    }

    #[test]
    fn test_parse_is_case_insensitive() {
        assert_eq!("Warm_White".parse::<Channel>().unwrap(), Channel::WarmWhite);
        assert!(" fog ".parse::<Channel>().is_ok());
        assert!(matches!(
            "laser".parse::<Channel>(),
            Err(DmxError::UnknownChannelName(name)) if name == "laser"
        ));
    }
}
