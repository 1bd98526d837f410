//! Motion primitives and the primitive file format
//!
//! One primitive per line, `#` starts a comment:
//!
//! ```text
//! units degrees
//! short_distance joint_0=5 joint_1=-5
//! long_distance  joint_0=10 ; joint_0=20
//! snap_to_xyz     enabled=true thresh=0.2
//! snap_to_rpy     enabled=false thresh=0.2
//! snap_to_xyz_rpy enabled=true thresh=0.05
//! short_distance_amp enabled=true thresh=0.2
//! ```
//!
//! Joints not named on a waypoint keep a zero delta. `units` affects the
//! delta lines that follow it; thresholds are never converted.

use std::collections::HashMap;
use std::fmt;
use std::path::Path;

use crate::common::{LatticeError, LatticeResult, RobotState};
use crate::utils::angles::to_radians;

/// Kind of a motion primitive
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MotionPrimitiveType {
    ShortDistance,
    LongDistance,
    SnapToXyz,
    SnapToRpy,
    SnapToXyzRpy,
}

impl MotionPrimitiveType {
    pub const ALL: [MotionPrimitiveType; 5] = [
        MotionPrimitiveType::ShortDistance,
        MotionPrimitiveType::LongDistance,
        MotionPrimitiveType::SnapToXyz,
        MotionPrimitiveType::SnapToRpy,
        MotionPrimitiveType::SnapToXyzRpy,
    ];

    pub fn tag(&self) -> &'static str {
        match self {
            MotionPrimitiveType::ShortDistance => "short_distance",
            MotionPrimitiveType::LongDistance => "long_distance",
            MotionPrimitiveType::SnapToXyz => "snap_to_xyz",
            MotionPrimitiveType::SnapToRpy => "snap_to_rpy",
            MotionPrimitiveType::SnapToXyzRpy => "snap_to_xyz_rpy",
        }
    }

    pub fn from_tag(tag: &str) -> Option<Self> {
        Self::ALL.iter().copied().find(|t| t.tag() == tag)
    }

    pub fn is_snap(&self) -> bool {
        matches!(
            self,
            MotionPrimitiveType::SnapToXyz
                | MotionPrimitiveType::SnapToRpy
                | MotionPrimitiveType::SnapToXyzRpy
        )
    }
}

impl fmt::Display for MotionPrimitiveType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.tag())
    }
}

/// A typed primitive; `action` holds joint deltas relative to the parent
/// state, one entry per waypoint, and is empty for snap primitives.
#[derive(Debug, Clone, PartialEq)]
pub struct MotionPrimitive {
    pub kind: MotionPrimitiveType,
    pub action: Vec<RobotState>,
}

/// Adaptive activation of a primitive type
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AdaptiveSetting {
    pub enabled: bool,
    /// Goal distance at or below which the type becomes eligible
    pub thresh: f64,
}

impl Default for AdaptiveSetting {
    fn default() -> Self {
        Self {
            enabled: false,
            thresh: 0.2,
        }
    }
}

/// Everything read from one primitive file
#[derive(Debug, Clone, Default)]
pub struct PrimitiveSet {
    pub primitives: Vec<MotionPrimitive>,
    pub adaptive: HashMap<MotionPrimitiveType, AdaptiveSetting>,
}

fn load_error(line_no: usize, msg: impl fmt::Display) -> LatticeError {
    LatticeError::Load(format!("primitive file line {}: {}", line_no, msg))
}

fn parse_bool(line_no: usize, value: &str) -> LatticeResult<bool> {
    match value {
        "true" | "1" | "yes" => Ok(true),
        "false" | "0" | "no" => Ok(false),
        _ => Err(load_error(line_no, format!("invalid boolean '{}'", value))),
    }
}

fn parse_f64(line_no: usize, value: &str) -> LatticeResult<f64> {
    value
        .parse::<f64>()
        .ok()
        .filter(|v| v.is_finite())
        .ok_or_else(|| load_error(line_no, format!("invalid number '{}'", value)))
}

fn split_key_value(line_no: usize, token: &str) -> LatticeResult<(&str, &str)> {
    token
        .split_once('=')
        .ok_or_else(|| load_error(line_no, format!("expected key=value, found '{}'", token)))
}

fn parse_adaptive(line_no: usize, fields: &[&str]) -> LatticeResult<AdaptiveSetting> {
    let mut setting = AdaptiveSetting {
        enabled: true,
        ..AdaptiveSetting::default()
    };
    for token in fields {
        let (key, value) = split_key_value(line_no, token)?;
        match key {
            "enabled" => setting.enabled = parse_bool(line_no, value)?,
            "thresh" => setting.thresh = parse_f64(line_no, value)?,
            _ => return Err(load_error(line_no, format!("unknown field '{}'", key))),
        }
    }
    Ok(setting)
}

fn parse_waypoints(
    line_no: usize,
    rest: &str,
    joint_names: &[String],
    scale: f64,
) -> LatticeResult<Vec<RobotState>> {
    let mut waypoints = Vec::new();
    for chunk in rest.split(';') {
        let tokens: Vec<&str> = chunk.split_whitespace().collect();
        if tokens.is_empty() {
            return Err(load_error(line_no, "empty waypoint"));
        }
        let mut delta = vec![0.0; joint_names.len()];
        for token in tokens {
            let (name, value) = split_key_value(line_no, token)?;
            let index = joint_names.iter().position(|j| j == name).ok_or_else(|| {
                LatticeError::Config(format!(
                    "primitive file line {}: joint '{}' has no discretization entry",
                    line_no, name
                ))
            })?;
            delta[index] = parse_f64(line_no, value)? * scale;
        }
        waypoints.push(delta);
    }
    Ok(waypoints)
}

/// Parse primitive file contents against the discretized joint names
pub fn parse_primitive_file(text: &str, joint_names: &[String]) -> LatticeResult<PrimitiveSet> {
    let mut set = PrimitiveSet::default();
    let mut scale = 1.0;

    for (i, raw) in text.lines().enumerate() {
        let line_no = i + 1;
        let line = raw.split('#').next().unwrap_or("").trim();
        if line.is_empty() {
            continue;
        }
        let (tag, rest) = match line.split_once(char::is_whitespace) {
            Some((tag, rest)) => (tag, rest.trim()),
            None => (line, ""),
        };
        let fields: Vec<&str> = rest.split_whitespace().collect();

        if tag == "units" {
            scale = match fields.as_slice() {
                ["radians"] => 1.0,
                ["degrees"] => to_radians(1.0),
                _ => return Err(load_error(line_no, format!("invalid units '{}'", rest))),
            };
            continue;
        }
        if tag == "short_distance_amp" {
            let setting = parse_adaptive(line_no, &fields)?;
            set.adaptive.insert(MotionPrimitiveType::ShortDistance, setting);
            continue;
        }

        let kind = MotionPrimitiveType::from_tag(tag)
            .ok_or_else(|| load_error(line_no, format!("unknown primitive type '{}'", tag)))?;
        if kind.is_snap() {
            let setting = parse_adaptive(line_no, &fields)?;
            set.adaptive.insert(kind, setting);
            if !set.primitives.iter().any(|p| p.kind == kind) {
                set.primitives.push(MotionPrimitive { kind, action: Vec::new() });
            }
        } else {
            let action = parse_waypoints(line_no, rest, joint_names, scale)?;
            set.primitives.push(MotionPrimitive { kind, action });
        }
    }

    Ok(set)
}

/// Read and parse a primitive file
pub fn load_primitive_file<P: AsRef<Path>>(path: P, joint_names: &[String]) -> LatticeResult<PrimitiveSet> {
    let path = path.as_ref();
    let text = std::fs::read_to_string(path).map_err(|e| {
        LatticeError::Load(format!("failed to read primitive file '{}': {}", path.display(), e))
    })?;
    parse_primitive_file(&text, joint_names)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn joints() -> Vec<String> {
        vec!["j1".to_string(), "j2".to_string()]
    }

    #[test]
    fn test_parse_delta_primitives() {
        let text = "\
# arm primitives
short_distance j1=0.1
long_distance j1=0.2 j2=-0.2 ; j1=0.4 j2=-0.4
";
        let set = parse_primitive_file(text, &joints()).unwrap();
        assert_eq!(set.primitives.len(), 2);
        assert_eq!(set.primitives[0].kind, MotionPrimitiveType::ShortDistance);
        assert_eq!(set.primitives[0].action, vec![vec![0.1, 0.0]]);
        assert_eq!(set.primitives[1].action.len(), 2);
        assert_eq!(set.primitives[1].action[1], vec![0.4, -0.4]);
    }

    #[test]
    fn test_parse_degrees() {
        let text = "units degrees\nshort_distance j2=90\n";
        let set = parse_primitive_file(text, &joints()).unwrap();
        assert!((set.primitives[0].action[0][1] - std::f64::consts::FRAC_PI_2).abs() < 1e-12);
    }

    #[test]
    fn test_parse_adaptive_settings() {
        let text = "\
snap_to_xyz enabled=true thresh=0.3
snap_to_rpy enabled=false
short_distance_amp thresh=0.1
";
        let set = parse_primitive_file(text, &joints()).unwrap();
        assert_eq!(set.primitives.len(), 2);
        let xyz = set.adaptive[&MotionPrimitiveType::SnapToXyz];
        assert!(xyz.enabled);
        assert!((xyz.thresh - 0.3).abs() < 1e-12);
        assert!(!set.adaptive[&MotionPrimitiveType::SnapToRpy].enabled);
        let short = set.adaptive[&MotionPrimitiveType::ShortDistance];
        assert!(short.enabled);
        assert!((short.thresh - 0.1).abs() < 1e-12);
    }

    #[test]
    fn test_unknown_joint_is_config_error() {
        let err = parse_primitive_file("short_distance j3=0.1\n", &joints()).unwrap_err();
        assert!(matches!(err, LatticeError::Config(_)));
    }

    #[test]
    fn test_malformed_lines_are_load_errors() {
        for text in [
            "warp_drive j1=0.1\n",
            "short_distance j1=abc\n",
            "short_distance j1\n",
            "short_distance\n",
            "snap_to_xyz enabled=maybe\n",
            "units furlongs\n",
        ] {
            let err = parse_primitive_file(text, &joints()).unwrap_err();
            assert!(matches!(err, LatticeError::Load(_)), "{:?} for {:?}", err, text);
        }
    }

    #[test]
    fn test_missing_file_is_load_error() {
        let err = load_primitive_file("/nonexistent/prims.txt", &joints()).unwrap_err();
        assert!(matches!(err, LatticeError::Load(_)));
    }

    #[test]
    fn test_type_tags_roundtrip() {
        for kind in MotionPrimitiveType::ALL {
            assert_eq!(MotionPrimitiveType::from_tag(kind.tag()), Some(kind));
        }
        assert_eq!(format!("{}", MotionPrimitiveType::SnapToXyzRpy), "snap_to_xyz_rpy");
    }
}
