use std::{fmt, sync::OnceLock};

use regex::Regex;

use super::constants::EOS_PREFIX;
use crate::common::types::CueNumber;

static CUE_FIRE_PATTERN: OnceLock<Regex> = OnceLock::new();

fn cue_fire_pattern() -> &'static Regex {
    CUE_FIRE_PATTERN.get_or_init(|| {
        Regex::new(r"^/eos/out/event/cue/(\d+)/(\d+(?:\.\d+)?)(?:/.*)?$")
            .expect("static cue pattern is valid")
    })
}

/// Parses `/eos/out/event/cue/<list>/<number>[/...]` into list and cue.
pub fn parse_cue_fire(address: &str) -> Option<(u32, CueNumber)> {
    let caps = cue_fire_pattern().captures(address)?;
    let list = caps[1].parse().ok()?;
    let cue = CueNumber::parse(&caps[2])?;
    Some((list, cue))
}

/// Roots `address` at `/eos` unless it already is.
pub fn with_prefix(address: &str) -> String {
    if address == EOS_PREFIX || address.starts_with("/eos/") {
        return address.to_owned();
    }
    let trimmed = address.trim_start_matches('/');
    format!("{}/{}", EOS_PREFIX, trimmed)
}

/// What a parameter command addresses.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Target {
    Channel(u32),
    Group(u32),
}

impl fmt::Display for Target {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Channel(n) => write!(f, "chan/{}", n),
            Self::Group(n) => write!(f, "group/{}", n),
        }
    }
}

pub fn fire_address(list: u32, cue: &CueNumber) -> String {
    format!("{}/cue/{}/{}/fire", EOS_PREFIX, list, cue)
}

pub fn record_command(cue: &CueNumber, label: Option<&str>) -> String {
    match label.map(str::trim).filter(|l| !l.is_empty()) {
        Some(label) => format!("Record Cue {} Label {} Enter", cue, label),
        None => format!("Record Cue {} Enter", cue),
    }
}

pub fn intensity_address(channel: u32) -> String {
    format!("{}/chan/{}/at", EOS_PREFIX, channel)
}

pub fn color_address(target: Target) -> String {
    format!("{}/{}/param/red/green/blue", EOS_PREFIX, target)
}

pub fn param_address(target: Target, param: &str) -> String {
    format!("{}/{}/param/{}", EOS_PREFIX, target, param)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_cue_fire_events() {
        assert_eq!(
            parse_cue_fire("/eos/out/event/cue/1/5/fire"),
            Some((1, CueNumber::from(5)))
        );
        assert_eq!(
            parse_cue_fire("/eos/out/event/cue/2/12.5"),
            Some((2, CueNumber::parse("12.5").unwrap()))
        );
        assert_eq!(parse_cue_fire("/eos/out/event/cue/1"), None);
        assert_eq!(parse_cue_fire("/eos/out/active/cue/1/5"), None);
        assert_eq!(parse_cue_fire("/eos/out/event/cue/x/5/fire"), None);
    }

    #[test]
    fn prefix_is_applied_once() {
        assert_eq!(with_prefix("/eos/ping"), "/eos/ping");
        assert_eq!(with_prefix("/chan/1/at"), "/eos/chan/1/at");
        assert_eq!(with_prefix("key/go_0"), "/eos/key/go_0");
        assert_eq!(with_prefix("/eosx"), "/eos/eosx");
    }

    #[test]
    fn outbound_templates() {
        let cue = CueNumber::from(7);
        assert_eq!(fire_address(1, &cue), "/eos/cue/1/7/fire");
        assert_eq!(
            record_command(&cue, Some("Opening")),
            "Record Cue 7 Label Opening Enter"
        );
        assert_eq!(record_command(&cue, Some("  ")), "Record Cue 7 Enter");
        assert_eq!(intensity_address(12), "/eos/chan/12/at");
        assert_eq!(
            color_address(Target::Group(3)),
            "/eos/group/3/param/red/green/blue"
        );
        assert_eq!(
            param_address(Target::Channel(4), "zoom"),
            "/eos/chan/4/param/zoom"
        );
    }
}
