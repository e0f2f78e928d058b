// Tunable lobby constants, plus the TOML layer that overrides them at start-up.

use std::path::Path;

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};

// Canvas
pub const CANVAS_WIDTH: f32 = 600.0;
pub const CANVAS_HEIGHT: f32 = 600.0;

// Pals
pub const PAL_RADIUS: f32 = 20.0;
pub const OFFLINE_RADIUS_FACTOR: f32 = 0.5;
pub const PAL_REPULSION: f32 = 1.0;

// Groups
pub const MAX_GROUP_RADIUS: f32 = 70.0;
pub const GROUP_AGE_STEP: f32 = 3.0;
pub const GROUP_INITIAL_AGE: f32 = 1.0;
pub const GROUP_REPULSION: f32 = 1.0;
pub const CROWDING_RADIUS_BUDGET: f32 = 400.0;
pub const NONMEMBER_REACH: f32 = 2.0;
pub const NONMEMBER_FALLOFF: f32 = 1.0 / 10_000.0;
pub const GROUP_RECOIL: f32 = 0.01;
pub const SERVO_GAIN: f32 = 0.05;

// Integration
pub const VELOCITY_LIMIT: f32 = 3.0;
pub const DAMPING: f32 = 0.98;
pub const WALL_EXPONENT: i32 = 9;
pub const WALL_SCALE: f32 = 0.25;

// Simulation
pub const FIXED_DT: f32 = 1.0 / 60.0;
pub const RECONCILE_INTERVAL: u64 = 30;

// Demo feed
pub const DEMO_PAL_COUNT: usize = 24;
pub const DEMO_ACTIVITY_COUNT: usize = 4;
pub const DEMO_SHUFFLE_INTERVAL: u64 = 240;

/// How a member's angular slot on the group perimeter is chosen.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SlotPolicy {
    /// Slot fixed at join time; leaving members free their slot without moving others.
    Stable,
    /// Slot follows the live index in the member list, so departures rotate the ring.
    LiveIndex,
}

impl SlotPolicy {
    pub fn label(self) -> &'static str {
        match self {
            SlotPolicy::Stable => "stable",
            SlotPolicy::LiveIndex => "live index",
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct CanvasConfig {
    pub width: f32,
    pub height: f32,
}

impl Default for CanvasConfig {
    fn default() -> Self {
        Self {
            width: CANVAS_WIDTH,
            height: CANVAS_HEIGHT,
        }
    }
}

/// Numerical constants of the per-tick update.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PhysicsParams {
    pub pal_radius: f32,
    pub offline_radius_factor: f32,
    pub pal_repulsion: f32,
    pub group_repulsion: f32,
    pub pal_velocity_limit: f32,
    pub group_velocity_limit: f32,
    pub damping: f32,
    pub wall_exponent: i32,
    pub wall_scale: f32,
    pub servo_gain: f32,
    pub nonmember_reach: f32,
    pub nonmember_falloff: f32,
    pub group_recoil: f32,
}

impl Default for PhysicsParams {
    fn default() -> Self {
        Self {
            pal_radius: PAL_RADIUS,
            offline_radius_factor: OFFLINE_RADIUS_FACTOR,
            pal_repulsion: PAL_REPULSION,
            group_repulsion: GROUP_REPULSION,
            pal_velocity_limit: VELOCITY_LIMIT,
            group_velocity_limit: VELOCITY_LIMIT,
            damping: DAMPING,
            wall_exponent: WALL_EXPONENT,
            wall_scale: WALL_SCALE,
            servo_gain: SERVO_GAIN,
            nonmember_reach: NONMEMBER_REACH,
            nonmember_falloff: NONMEMBER_FALLOFF,
            group_recoil: GROUP_RECOIL,
        }
    }
}

impl PhysicsParams {
    pub fn validate(&self) -> Result<()> {
        if self.pal_radius <= 0.0 || self.offline_radius_factor <= 0.0 {
            bail!("pal radius must be positive");
        }
        if self.pal_velocity_limit <= 0.0 || self.group_velocity_limit <= 0.0 {
            bail!("velocity limits must be positive");
        }
        if !(self.damping > 0.0 && self.damping <= 1.0) {
            bail!("damping must lie in (0, 1], got {}", self.damping);
        }
        // An even exponent would push edge circles outward on one side.
        if self.wall_exponent % 2 == 0 {
            bail!("wall_exponent must be odd, got {}", self.wall_exponent);
        }
        Ok(())
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GroupParams {
    pub max_radius: f32,
    pub initial_age: f32,
    pub age_step: f32,
    /// Total radius shared between all live groups; `None` disables the crowding cap.
    pub crowding_budget: Option<f32>,
    pub slot_policy: SlotPolicy,
    pub reconcile_interval: u64,
}

impl Default for GroupParams {
    fn default() -> Self {
        Self {
            max_radius: MAX_GROUP_RADIUS,
            initial_age: GROUP_INITIAL_AGE,
            age_step: GROUP_AGE_STEP,
            crowding_budget: Some(CROWDING_RADIUS_BUDGET),
            slot_policy: SlotPolicy::Stable,
            reconcile_interval: RECONCILE_INTERVAL,
        }
    }
}

impl GroupParams {
    pub fn validate(&self) -> Result<()> {
        if self.max_radius <= 0.0 || self.initial_age <= 0.0 {
            bail!("group radius and initial age must be positive");
        }
        if self.age_step < 0.0 {
            bail!("group age_step must not be negative");
        }
        if matches!(self.crowding_budget, Some(b) if b <= 0.0) {
            bail!("crowding_budget must be positive when set");
        }
        Ok(())
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct FeedConfig {
    pub demo_pals: usize,
    pub demo_activities: usize,
    pub demo_shuffle_interval: u64,
    /// Directory that relative avatar/background paths are resolved against.
    pub asset_root: Option<String>,
}

impl Default for FeedConfig {
    fn default() -> Self {
        Self {
            demo_pals: DEMO_PAL_COUNT,
            demo_activities: DEMO_ACTIVITY_COUNT,
            demo_shuffle_interval: DEMO_SHUFFLE_INTERVAL,
            asset_root: None,
        }
    }
}

/// Top-level configuration, loaded from `lobby.toml` or built from defaults.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct LobbyConfig {
    pub canvas: CanvasConfig,
    pub physics: PhysicsParams,
    pub groups: GroupParams,
    pub feed: FeedConfig,
}

impl LobbyConfig {
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config file '{}'", path.display()))?;
        Self::from_toml(&text).with_context(|| format!("invalid config '{}'", path.display()))
    }

    pub fn from_toml(text: &str) -> Result<Self> {
        let config: LobbyConfig = toml::from_str(text).context("failed to parse TOML")?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.canvas.width <= 0.0 || self.canvas.height <= 0.0 {
            bail!("canvas extent must be positive");
        }
        self.physics.validate()?;
        self.groups.validate()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_toml_yields_defaults() {
        let config = LobbyConfig::from_toml("").unwrap();
        assert_eq!(config.canvas.width, CANVAS_WIDTH);
        assert_eq!(config.physics, PhysicsParams::default());
        assert_eq!(config.groups.slot_policy, SlotPolicy::Stable);
    }

    #[test]
    fn partial_sections_override_only_named_fields() {
        let text = r#"
            [physics]
            damping = 0.9

            [groups]
            slot_policy = "live_index"
            crowding_budget = 300.0
        "#;
        let config = LobbyConfig::from_toml(text).unwrap();
        assert_eq!(config.physics.damping, 0.9);
        assert_eq!(config.physics.pal_radius, PAL_RADIUS);
        assert_eq!(config.groups.slot_policy, SlotPolicy::LiveIndex);
        assert_eq!(config.groups.crowding_budget, Some(300.0));
    }

    #[test]
    fn even_wall_exponent_is_rejected() {
        let err = LobbyConfig::from_toml("[physics]\nwall_exponent = 8\n").unwrap_err();
        assert!(format!("{err:#}").contains("wall_exponent"));
    }

    #[test]
    fn damping_above_one_is_rejected() {
        assert!(LobbyConfig::from_toml("[physics]\ndamping = 1.5\n").is_err());
    }

    #[test]
    fn section_checks_run_on_their_own() {
        let physics = PhysicsParams {
            damping: 5.0,
            ..PhysicsParams::default()
        };
        assert!(physics.validate().is_err());
        let groups = GroupParams {
            crowding_budget: Some(0.0),
            ..GroupParams::default()
        };
        assert!(groups.validate().is_err());
        assert!(PhysicsParams::default().validate().is_ok());
        assert!(GroupParams::default().validate().is_ok());
    }

    #[test]
    fn load_reports_missing_file_path() {
        let err = LobbyConfig::load("/nonexistent/palroom/lobby.toml").unwrap_err();
        assert!(format!("{err:#}").contains("/nonexistent/palroom/lobby.toml"));
    }
}
