use std::path::Path;

use anyhow::{bail, Context, Result};
use log::info;
use macroquad::prelude::*;
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};

use crate::arena::{Arena, Id};
use crate::canvas::Canvas;
use crate::circle::Circle;
use crate::cluster::{Activity, ActivityCache, ClusterEngine, Group};
use crate::config::{GroupParams, PhysicsParams};
use crate::pal::{DisplayStatus, Pal, PalRegistry, PalState};
use crate::world::SimulationWorld;

const SAVE_VERSION: u32 = 1;

// Serde-friendly wrapper types for macroquad primitives and arena handles.

#[derive(Clone, Serialize, Deserialize)]
struct SerdVec2 {
    x: f32,
    y: f32,
}

impl From<Vec2> for SerdVec2 {
    fn from(v: Vec2) -> Self {
        Self { x: v.x, y: v.y }
    }
}

impl From<SerdVec2> for Vec2 {
    fn from(v: SerdVec2) -> Self {
        vec2(v.x, v.y)
    }
}

#[derive(Clone, Copy, Serialize, Deserialize)]
struct SerdId {
    index: u32,
    generation: u32,
}

impl<T> From<Id<T>> for SerdId {
    fn from(id: Id<T>) -> Self {
        Self {
            index: id.index,
            generation: id.generation,
        }
    }
}

impl SerdId {
    fn to_id<T>(self) -> Id<T> {
        Id::new(self.index, self.generation)
    }
}

#[derive(Clone, Serialize, Deserialize)]
struct SerdCircle {
    pos: SerdVec2,
    velocity: SerdVec2,
    radius: f32,
    tangible: bool,
}

impl From<&Circle> for SerdCircle {
    fn from(c: &Circle) -> Self {
        Self {
            pos: c.pos.into(),
            velocity: c.velocity.into(),
            radius: c.radius,
            tangible: c.tangible,
        }
    }
}

impl From<SerdCircle> for Circle {
    fn from(c: SerdCircle) -> Self {
        Circle::restored(c.pos.into(), c.velocity.into(), c.radius, c.tangible)
    }
}

#[derive(Clone, Serialize, Deserialize)]
enum SerdPalState {
    Free,
    Pending(String),
    Member { group: SerdId, slot: usize },
}

#[derive(Clone, Serialize, Deserialize)]
struct SerdPal {
    identity: String,
    avatar_url: Option<String>,
    status: DisplayStatus,
    activity: Option<String>,
    state: SerdPalState,
    circle: SerdCircle,
}

#[derive(Clone, Serialize, Deserialize)]
struct SerdGroup {
    activity: String,
    members: Vec<SerdId>,
    slots: Vec<Option<SerdId>>,
    age: f32,
    circle: SerdCircle,
    background_url: Option<String>,
}

#[derive(Serialize, Deserialize)]
struct SaveState {
    version: u32,
    canvas: (f32, f32),
    physics: PhysicsParams,
    group_params: GroupParams,

    pals: Vec<Option<SerdPal>>,
    pal_generations: Vec<u32>,
    pal_order: Vec<SerdId>,

    groups: Vec<Option<SerdGroup>>,
    group_generations: Vec<u32>,

    activities: Vec<Activity>,

    rng: ChaCha8Rng,
    tick_count: u64,
}

impl SaveState {
    fn from_world(world: &SimulationWorld) -> Self {
        let pals = world
            .pals
            .arena
            .slots
            .iter()
            .map(|slot| {
                slot.as_ref().map(|p| SerdPal {
                    identity: p.identity.clone(),
                    avatar_url: p.avatar_url.clone(),
                    status: p.status,
                    activity: p.activity.clone(),
                    state: match &p.state {
                        PalState::Free => SerdPalState::Free,
                        PalState::Pending(key) => SerdPalState::Pending(key.clone()),
                        PalState::Member { group, slot } => SerdPalState::Member {
                            group: (*group).into(),
                            slot: *slot,
                        },
                    },
                    circle: (&p.circle).into(),
                })
            })
            .collect();

        let groups = world
            .clusters
            .groups
            .slots
            .iter()
            .map(|slot| {
                slot.as_ref().map(|g| SerdGroup {
                    activity: g.activity.clone(),
                    members: g.members.iter().map(|&m| m.into()).collect(),
                    slots: g.slots.iter().map(|s| s.map(SerdId::from)).collect(),
                    age: g.age,
                    circle: (&g.circle).into(),
                    background_url: g.background_url.clone(),
                })
            })
            .collect();

        Self {
            version: SAVE_VERSION,
            canvas: (world.canvas.width, world.canvas.height),
            physics: world.physics.clone(),
            group_params: world.clusters.params.clone(),
            pals,
            pal_generations: world.pals.arena.generations.clone(),
            pal_order: world.pals.ids().into_iter().map(SerdId::from).collect(),
            groups,
            group_generations: world.clusters.groups.generations.clone(),
            activities: world.clusters.activities.sorted().into_iter().cloned().collect(),
            rng: world.rng.clone(),
            tick_count: world.tick_count,
        }
    }

    fn restore(self) -> Result<SimulationWorld> {
        if self.version != SAVE_VERSION {
            bail!("unsupported save version {} (expected {SAVE_VERSION})", self.version);
        }
        let (width, height) = self.canvas;
        if width <= 0.0 || height <= 0.0 {
            bail!("saved canvas extent must be positive");
        }
        self.physics.validate().context("saved physics parameters are invalid")?;
        self.group_params.validate().context("saved group parameters are invalid")?;

        let pal_slots: Vec<Option<Pal>> = self
            .pals
            .into_iter()
            .map(|slot| {
                slot.map(|p| Pal {
                    identity: p.identity,
                    avatar_url: p.avatar_url,
                    status: p.status,
                    activity: p.activity,
                    state: match p.state {
                        SerdPalState::Free => PalState::Free,
                        SerdPalState::Pending(key) => PalState::Pending(key),
                        SerdPalState::Member { group, slot } => PalState::Member {
                            group: group.to_id(),
                            slot,
                        },
                    },
                    circle: p.circle.into(),
                })
            })
            .collect();
        let Some(pal_arena) = Arena::from_parts(pal_slots, self.pal_generations) else {
            bail!("pal slot table and generations disagree in length");
        };
        let order = self.pal_order.into_iter().map(SerdId::to_id).collect();
        let pals = PalRegistry::from_parts(pal_arena, order);

        let group_slots: Vec<Option<Group>> = self
            .groups
            .into_iter()
            .map(|slot| {
                slot.map(|g| Group {
                    activity: g.activity,
                    members: g.members.into_iter().map(SerdId::to_id).collect(),
                    slots: g.slots.into_iter().map(|s| s.map(SerdId::to_id)).collect(),
                    age: g.age,
                    circle: g.circle.into(),
                    background_url: g.background_url,
                })
            })
            .collect();
        let Some(group_arena) = Arena::from_parts(group_slots, self.group_generations) else {
            bail!("group slot table and generations disagree in length");
        };

        // Every member must point back at the group that lists it.
        for (group_id, group) in group_arena.iter() {
            if group.members.is_empty() {
                bail!("group '{}' has no members", group.activity);
            }
            for &member in &group.members {
                match pals.get(member) {
                    Some(pal) if pal.state.group() == Some(group_id) => {}
                    _ => bail!("group '{}' lists a pal that is not its member", group.activity),
                }
            }
        }
        for (pal_id, pal) in pals.iter() {
            if let Some(group_id) = pal.state.group() {
                if !group_arena.get(group_id).is_some_and(|g| g.contains(pal_id)) {
                    bail!("pal {} claims a group that does not list it", pal.identity);
                }
            }
        }

        let mut activities = ActivityCache::default();
        for activity in self.activities {
            activities.insert(activity);
        }

        Ok(SimulationWorld {
            canvas: Canvas::new(width, height),
            physics: self.physics,
            pals,
            clusters: ClusterEngine::from_parts(group_arena, activities, self.group_params),
            pointer: None,
            rng: self.rng,
            tick_count: self.tick_count,
            paused: false,
        })
    }
}

/// Save the lobby state to a file.
pub fn save_to_file<P: AsRef<Path>>(world: &SimulationWorld, path: P) -> Result<()> {
    let path = path.as_ref();
    let state = SaveState::from_world(world);
    let bytes = bincode::serialize(&state).context("failed to serialize lobby state")?;
    std::fs::write(path, bytes).with_context(|| format!("failed to write '{}'", path.display()))?;
    info!("saved {} pals, {} groups to {}", world.pals.len(), world.clusters.groups.len(), path.display());
    Ok(())
}

/// Load lobby state from a file.
pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<SimulationWorld> {
    let path = path.as_ref();
    let bytes = std::fs::read(path).with_context(|| format!("failed to read '{}'", path.display()))?;
    let state: SaveState = bincode::deserialize(&bytes)
        .with_context(|| format!("'{}' is not a lobby save", path.display()))?;
    let world = state
        .restore()
        .with_context(|| format!("'{}' is inconsistent", path.display()))?;
    info!("loaded {} pals, {} groups from {} (tick {})", world.pals.len(), world.clusters.groups.len(), path.display(), world.tick_count);
    Ok(world)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{LobbyConfig, SlotPolicy};
    use crate::feed::PalSnapshot;
    use std::time::{SystemTime, UNIX_EPOCH};

    fn temp_file(name: &str) -> std::path::PathBuf {
        let nanos = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap()
            .as_nanos();
        std::env::temp_dir().join(format!("{}_{}.bin", name, nanos))
    }

    fn snap(name: &str, activity: Option<&str>) -> PalSnapshot {
        PalSnapshot {
            name: name.into(),
            avatar_url: Some(format!("avatars/{name}.png")),
            status: DisplayStatus::Idle,
            activity: activity.map(str::to_string),
        }
    }

    fn busy_world() -> SimulationWorld {
        let mut world = SimulationWorld::new(&LobbyConfig::default(), 21);
        world.apply_activity_metadata(&[Activity {
            id: "a".into(),
            name: "Alpha".into(),
            background_url: None,
        }]);
        world.apply_pal_snapshot(&[
            snap("p1", Some("a")),
            snap("p2", Some("a")),
            snap("p3", Some("a")),
            snap("p4", None),
            snap("p5", Some("unknown")),
        ]);
        world.remove_pals(&["p2".to_string()]);
        for _ in 0..45 {
            world.tick();
        }
        world
    }

    #[test]
    fn round_trip_preserves_groups_and_states() {
        let world = busy_world();
        let path = temp_file("palroom_roundtrip");
        save_to_file(&world, &path).unwrap();
        let restored = load_from_file(&path).unwrap();
        let _ = std::fs::remove_file(&path);

        assert_eq!(restored.tick_count, world.tick_count);
        assert_eq!(restored.pals.len(), 4);
        let names = |w: &SimulationWorld| -> Vec<String> {
            w.pals.iter().map(|(_, p)| p.identity.clone()).collect()
        };
        assert_eq!(names(&restored), names(&world));

        let gid = world.clusters.group_for("a").unwrap();
        let rgid = restored.clusters.group_for("a").unwrap();
        let (g, rg) = (world.clusters.groups.get(gid).unwrap(), restored.clusters.groups.get(rgid).unwrap());
        assert_eq!(rg.members, g.members);
        assert_eq!(rg.slots, g.slots);
        assert_eq!(rg.age, g.age);

        for (id, pal) in world.pals.iter() {
            let other = restored.pals.get(id).unwrap();
            assert_eq!(other.state, pal.state);
            assert_eq!(other.circle.pos, pal.circle.pos);
            assert_eq!(other.circle.tangible, pal.circle.tangible);
        }
        assert_eq!(restored.unresolved_activities(), vec!["unknown".to_string()]);
    }

    #[test]
    fn restored_world_continues_identically() {
        let mut world = busy_world();
        let path = temp_file("palroom_continue");
        save_to_file(&world, &path).unwrap();
        let mut restored = load_from_file(&path).unwrap();
        let _ = std::fs::remove_file(&path);

        // Fresh joins draw from the rng, so both copies must spawn the new group at the same spot.
        let batch = [snap("p6", Some("b"))];
        let metadata = [Activity {
            id: "b".into(),
            name: "Beta".into(),
            background_url: None,
        }];
        for w in [&mut world, &mut restored] {
            w.apply_pal_snapshot(&batch);
            w.apply_activity_metadata(&metadata);
        }
        for _ in 0..30 {
            world.tick();
            restored.tick();
        }
        for (id, pal) in world.pals.iter() {
            let other = restored.pals.get(id).unwrap();
            assert!((other.circle.pos - pal.circle.pos).length() < 1e-3, "{}", pal.identity);
        }
    }

    #[test]
    fn slot_policy_and_params_survive() {
        let mut world = busy_world();
        world.set_slot_policy(SlotPolicy::LiveIndex);
        let path = temp_file("palroom_policy");
        save_to_file(&world, &path).unwrap();
        let restored = load_from_file(&path).unwrap();
        let _ = std::fs::remove_file(&path);
        assert_eq!(restored.clusters.params.slot_policy, SlotPolicy::LiveIndex);
        assert_eq!(restored.physics, world.physics);
    }

    #[test]
    fn garbage_bytes_fail_to_load() {
        let path = temp_file("palroom_garbage");
        std::fs::write(&path, b"definitely not bincode").unwrap();
        let result = load_from_file(&path);
        let _ = std::fs::remove_file(&path);
        assert!(result.is_err());
    }

    #[test]
    fn missing_file_names_the_path() {
        let Err(err) = load_from_file("/nonexistent/palroom/save.bin") else {
            panic!("load should fail");
        };
        assert!(format!("{err:#}").contains("save.bin"));
    }

    fn reload_error(world: &SimulationWorld, name: &str) -> String {
        let path = temp_file(name);
        save_to_file(world, &path).unwrap();
        let result = load_from_file(&path);
        let _ = std::fs::remove_file(&path);
        let Err(err) = result else {
            panic!("load of {name} should fail");
        };
        format!("{err:#}")
    }

    #[test]
    fn damping_out_of_range_is_refused_on_load() {
        let mut world = busy_world();
        world.physics.damping = 5.0;
        assert!(reload_error(&world, "palroom_damping").contains("damping"));
    }

    #[test]
    fn even_wall_exponent_is_refused_on_load() {
        let mut world = busy_world();
        world.physics.wall_exponent = 8;
        assert!(reload_error(&world, "palroom_walls").contains("wall_exponent"));
    }

    #[test]
    fn bad_group_params_are_refused_on_load() {
        let mut world = busy_world();
        world.clusters.params.crowding_budget = Some(-1.0);
        assert!(reload_error(&world, "palroom_budget").contains("crowding_budget"));
    }

    #[test]
    fn empty_group_is_refused_on_load() {
        let mut world = busy_world();
        let gid = world.clusters.group_for("a").unwrap();
        world.clusters.groups.get_mut(gid).unwrap().members.clear();
        assert!(reload_error(&world, "palroom_empty").contains("has no members"));
    }
}
