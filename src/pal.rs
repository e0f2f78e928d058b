use std::collections::HashMap;

use log::debug;
use macroquad::prelude::*;
use serde::{Deserialize, Serialize};

use crate::arena::{Arena, Id};
use crate::canvas::Canvas;
use crate::circle::Circle;
use crate::cluster::Group;
use crate::config::PhysicsParams;
use crate::feed::PalSnapshot;

pub type PalId = Id<Pal>;
pub type GroupId = Id<Group>;

/// Presence as reported by the feed: 0 = offline, 1 = idle, 2 = online.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub enum DisplayStatus {
    Offline,
    Idle,
    Online,
}

impl DisplayStatus {
    pub fn label(self) -> &'static str {
        match self {
            DisplayStatus::Offline => "offline",
            DisplayStatus::Idle => "idle",
            DisplayStatus::Online => "online",
        }
    }

    pub fn radius(self, params: &PhysicsParams) -> f32 {
        match self {
            DisplayStatus::Offline => params.pal_radius * params.offline_radius_factor,
            DisplayStatus::Idle | DisplayStatus::Online => params.pal_radius,
        }
    }
}

impl TryFrom<u8> for DisplayStatus {
    type Error = String;

    fn try_from(code: u8) -> Result<Self, Self::Error> {
        match code {
            0 => Ok(DisplayStatus::Offline),
            1 => Ok(DisplayStatus::Idle),
            2 => Ok(DisplayStatus::Online),
            other => Err(format!("unknown status code {other}")),
        }
    }
}

impl From<DisplayStatus> for u8 {
    fn from(status: DisplayStatus) -> u8 {
        match status {
            DisplayStatus::Offline => 0,
            DisplayStatus::Idle => 1,
            DisplayStatus::Online => 2,
        }
    }
}

/// Where a pal sits in the clustering state machine.
#[derive(Clone, Debug, PartialEq)]
pub enum PalState {
    /// No activity; tangible and free floating.
    Free,
    /// Has an activity key whose metadata hasn't arrived yet; still free floating.
    Pending(String),
    /// Riding the perimeter of a group at the given slot; intangible.
    Member { group: GroupId, slot: usize },
}

impl PalState {
    /// The state a non-member pal should be in for the given activity.
    pub fn unassigned(activity: Option<&str>) -> Self {
        match activity {
            Some(key) => PalState::Pending(key.to_string()),
            None => PalState::Free,
        }
    }

    pub fn group(&self) -> Option<GroupId> {
        match self {
            PalState::Member { group, .. } => Some(*group),
            _ => None,
        }
    }
}

#[derive(Clone, Debug)]
pub struct Pal {
    pub identity: String,
    pub avatar_url: Option<String>,
    pub status: DisplayStatus,
    pub activity: Option<String>,
    pub state: PalState,
    pub circle: Circle,
}

impl Pal {
    pub fn from_snapshot(snapshot: &PalSnapshot, pos: Vec2, params: &PhysicsParams) -> Self {
        Self {
            identity: snapshot.name.clone(),
            avatar_url: snapshot.avatar_url.clone(),
            status: snapshot.status,
            activity: snapshot.activity.clone(),
            state: PalState::unassigned(snapshot.activity.as_deref()),
            circle: Circle::new(pos, snapshot.status.radius(params)),
        }
    }

    /// Status changes resize the circle immediately.
    pub fn set_status(&mut self, status: DisplayStatus, params: &PhysicsParams) {
        self.status = status;
        self.circle.radius = status.radius(params);
    }

    /// Record a new activity. Members keep their slot until the next reconciliation.
    pub fn set_activity(&mut self, activity: Option<String>) {
        self.activity = activity;
        if !matches!(self.state, PalState::Member { .. }) {
            self.state = PalState::unassigned(self.activity.as_deref());
        }
    }

    pub fn is_member(&self) -> bool {
        matches!(self.state, PalState::Member { .. })
    }
}

/// Result of folding one snapshot entry into the registry.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SnapshotOutcome {
    Created(PalId),
    Updated(PalId),
    Unchanged(PalId),
}

/// Owner of every pal, keyed by identity and iterated in first-seen order.
#[derive(Default)]
pub struct PalRegistry {
    pub arena: Arena<Pal>,
    order: Vec<PalId>,
    by_identity: HashMap<String, PalId>,
}

impl PalRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a new pal or update the existing one with the same identity in place.
    pub fn apply_snapshot(
        &mut self,
        snapshot: &PalSnapshot,
        canvas: &Canvas,
        params: &PhysicsParams,
        rng: &mut impl ::rand::Rng,
    ) -> SnapshotOutcome {
        if let Some(&id) = self.by_identity.get(&snapshot.name) {
            let Some(pal) = self.arena.get_mut(id) else {
                return SnapshotOutcome::Unchanged(id);
            };
            let mut changed = false;
            if pal.status != snapshot.status {
                debug!("{}: {} -> {}", pal.identity, pal.status.label(), snapshot.status.label());
                pal.set_status(snapshot.status, params);
                changed = true;
            }
            if pal.activity != snapshot.activity {
                debug!("{}: activity {:?} -> {:?}", pal.identity, pal.activity, snapshot.activity);
                pal.set_activity(snapshot.activity.clone());
                changed = true;
            }
            if snapshot.avatar_url.is_some() && pal.avatar_url != snapshot.avatar_url {
                pal.avatar_url = snapshot.avatar_url.clone();
                changed = true;
            }
            return if changed {
                SnapshotOutcome::Updated(id)
            } else {
                SnapshotOutcome::Unchanged(id)
            };
        }

        let radius = snapshot.status.radius(params);
        let pos = canvas.random_interior(params.pal_radius.max(radius), rng);
        let id = self.arena.insert(Pal::from_snapshot(snapshot, pos, params));
        self.order.push(id);
        self.by_identity.insert(snapshot.name.clone(), id);
        debug!("new pal {} ({})", snapshot.name, snapshot.status.label());
        SnapshotOutcome::Created(id)
    }

    /// Drop a pal from the registry. Group membership is the caller's concern.
    pub fn remove(&mut self, identity: &str) -> Option<(PalId, Pal)> {
        let id = self.by_identity.remove(identity)?;
        self.order.retain(|&other| other != id);
        self.arena.remove(id).map(|pal| (id, pal))
    }

    pub fn find(&self, identity: &str) -> Option<PalId> {
        self.by_identity.get(identity).copied()
    }

    pub fn get(&self, id: PalId) -> Option<&Pal> {
        self.arena.get(id)
    }

    pub fn get_mut(&mut self, id: PalId) -> Option<&mut Pal> {
        self.arena.get_mut(id)
    }

    /// Ids in first-seen order.
    pub fn ids(&self) -> Vec<PalId> {
        self.order.clone()
    }

    /// Pals in first-seen order.
    pub fn iter(&self) -> impl Iterator<Item = (PalId, &Pal)> {
        self.order
            .iter()
            .filter_map(move |&id| self.arena.get(id).map(|pal| (id, pal)))
    }

    pub fn len(&self) -> usize {
        self.arena.len()
    }

    pub fn is_empty(&self) -> bool {
        self.arena.is_empty()
    }

    /// Rebuild from persisted parts; entries in `order` that don't resolve are dropped.
    pub fn from_parts(arena: Arena<Pal>, order: Vec<PalId>) -> Self {
        let order: Vec<PalId> = order.into_iter().filter(|&id| arena.contains(id)).collect();
        let by_identity = order
            .iter()
            .filter_map(|&id| arena.get(id).map(|pal| (pal.identity.clone(), id)))
            .collect();
        Self {
            arena,
            order,
            by_identity,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ::rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;

    fn snapshot(name: &str, status: DisplayStatus, activity: Option<&str>) -> PalSnapshot {
        PalSnapshot {
            name: name.to_string(),
            avatar_url: None,
            status,
            activity: activity.map(str::to_string),
        }
    }

    fn setup() -> (PalRegistry, Canvas, PhysicsParams, ChaCha8Rng) {
        (
            PalRegistry::new(),
            Canvas::new(600.0, 600.0),
            PhysicsParams::default(),
            ChaCha8Rng::seed_from_u64(3),
        )
    }

    #[test]
    fn reapplying_identical_snapshot_keeps_one_pal() {
        let (mut reg, canvas, params, mut rng) = setup();
        let snap = snapshot("ana", DisplayStatus::Online, Some("game:1"));

        let first = reg.apply_snapshot(&snap, &canvas, &params, &mut rng);
        let second = reg.apply_snapshot(&snap, &canvas, &params, &mut rng);

        let SnapshotOutcome::Created(id) = first else {
            panic!("expected creation, got {first:?}");
        };
        assert_eq!(second, SnapshotOutcome::Unchanged(id));
        assert_eq!(reg.len(), 1);
    }

    #[test]
    fn status_change_resizes_immediately() {
        let (mut reg, canvas, params, mut rng) = setup();
        reg.apply_snapshot(&snapshot("bo", DisplayStatus::Online, None), &canvas, &params, &mut rng);
        let id = reg.find("bo").unwrap();
        assert_eq!(reg.get(id).unwrap().circle.radius, params.pal_radius);

        let outcome = reg.apply_snapshot(&snapshot("bo", DisplayStatus::Offline, None), &canvas, &params, &mut rng);
        assert_eq!(outcome, SnapshotOutcome::Updated(id));
        assert_eq!(
            reg.get(id).unwrap().circle.radius,
            params.pal_radius * params.offline_radius_factor
        );
    }

    #[test]
    fn update_keeps_position_and_velocity() {
        let (mut reg, canvas, params, mut rng) = setup();
        reg.apply_snapshot(&snapshot("cy", DisplayStatus::Idle, None), &canvas, &params, &mut rng);
        let id = reg.find("cy").unwrap();
        reg.get_mut(id).unwrap().circle.velocity = vec2(1.0, 1.0);
        let pos = reg.get(id).unwrap().circle.pos;

        reg.apply_snapshot(&snapshot("cy", DisplayStatus::Online, Some("x")), &canvas, &params, &mut rng);
        let pal = reg.get(id).unwrap();
        assert_eq!(pal.circle.pos, pos);
        assert_eq!(pal.circle.velocity, vec2(1.0, 1.0));
        assert_eq!(pal.state, PalState::Pending("x".into()));
    }

    #[test]
    fn iteration_follows_first_seen_order_after_removal() {
        let (mut reg, canvas, params, mut rng) = setup();
        for name in ["a", "b", "c"] {
            reg.apply_snapshot(&snapshot(name, DisplayStatus::Online, None), &canvas, &params, &mut rng);
        }
        assert!(reg.remove("a").is_some());
        reg.apply_snapshot(&snapshot("d", DisplayStatus::Online, None), &canvas, &params, &mut rng);

        let names: Vec<&str> = reg.iter().map(|(_, p)| p.identity.as_str()).collect();
        assert_eq!(names, vec!["b", "c", "d"]);
        assert!(reg.find("a").is_none());
    }

    #[test]
    fn status_codes_round_trip_through_u8() {
        for code in 0u8..=2 {
            let status = DisplayStatus::try_from(code).unwrap();
            assert_eq!(u8::from(status), code);
        }
        assert!(DisplayStatus::try_from(3).is_err());
    }

    #[test]
    fn activity_change_on_member_defers_state_change() {
        let mut pal = Pal::from_snapshot(
            &snapshot("m", DisplayStatus::Online, Some("k")),
            Vec2::ZERO,
            &PhysicsParams::default(),
        );
        pal.state = PalState::Member { group: Id::new(0, 0), slot: 0 };
        pal.set_activity(None);
        assert!(pal.is_member());

        pal.state = PalState::Free;
        pal.set_activity(Some("z".into()));
        assert_eq!(pal.state, PalState::Pending("z".into()));
    }
}
