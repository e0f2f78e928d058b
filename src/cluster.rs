use std::collections::HashMap;
use std::f32::consts::TAU;

use log::{debug, info};
use macroquad::prelude::*;
use serde::{Deserialize, Serialize};

use crate::arena::Arena;
use crate::canvas::Canvas;
use crate::circle::Circle;
use crate::config::{GroupParams, SlotPolicy};
use crate::pal::{GroupId, PalId, PalRegistry, PalState};

/// Descriptive metadata for an activity key.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Activity {
    pub id: String,
    pub name: String,
    #[serde(default, rename = "backgroundURL", alias = "background_url")]
    pub background_url: Option<String>,
}

/// Activity metadata by id. Entries are refreshed on re-delivery and never evicted.
#[derive(Default)]
pub struct ActivityCache {
    entries: HashMap<String, Activity>,
}

impl ActivityCache {
    /// Returns true when the id was not known before.
    pub fn insert(&mut self, activity: Activity) -> bool {
        self.entries.insert(activity.id.clone(), activity).is_none()
    }

    pub fn get(&self, id: &str) -> Option<&Activity> {
        self.entries.get(id)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.entries.contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// All entries sorted by id, for stable output.
    pub fn sorted(&self) -> Vec<&Activity> {
        let mut all: Vec<&Activity> = self.entries.values().collect();
        all.sort_by(|a, b| a.id.cmp(&b.id));
        all
    }
}

/// A bubble of pals sharing one activity key.
#[derive(Clone, Debug)]
pub struct Group {
    pub activity: String,
    /// Members in join order.
    pub members: Vec<PalId>,
    /// Perimeter slots handed out at join time; `None` marks a freed slot.
    pub slots: Vec<Option<PalId>>,
    pub age: f32,
    pub circle: Circle,
    pub background_url: Option<String>,
}

impl Group {
    pub fn new(activity: &Activity, pos: Vec2, initial_age: f32) -> Self {
        Self {
            activity: activity.id.clone(),
            members: Vec::new(),
            slots: Vec::new(),
            age: initial_age,
            circle: Circle::new(pos, initial_age),
            background_url: activity.background_url.clone(),
        }
    }

    /// Bubble radius: grows with age, capped by `max_radius` and the crowding cap.
    pub fn radius(&self, max_radius: f32, crowd_cap: Option<f32>) -> f32 {
        let r = self.age.min(max_radius);
        match crowd_cap {
            Some(cap) => r.min(cap),
            None => r,
        }
    }

    pub fn contains(&self, pal: PalId) -> bool {
        self.members.contains(&pal)
    }

    /// Append a member and return its slot under `policy`.
    fn join(&mut self, pal: PalId, policy: SlotPolicy) -> usize {
        self.members.push(pal);
        let stable = match self.slots.iter().position(Option::is_none) {
            Some(free) => {
                self.slots[free] = Some(pal);
                free
            }
            None => {
                self.slots.push(Some(pal));
                self.slots.len() - 1
            }
        };
        match policy {
            SlotPolicy::Stable => stable,
            SlotPolicy::LiveIndex => self.members.len() - 1,
        }
    }

    fn leave(&mut self, pal: PalId) -> bool {
        let before = self.members.len();
        self.members.retain(|&m| m != pal);
        for slot in self.slots.iter_mut() {
            if *slot == Some(pal) {
                *slot = None;
            }
        }
        while matches!(self.slots.last(), Some(None)) {
            self.slots.pop();
        }
        self.members.len() != before
    }

    /// Slot of `pal` under `policy`, if it is a member.
    pub fn slot_of(&self, pal: PalId, policy: SlotPolicy) -> Option<usize> {
        match policy {
            SlotPolicy::Stable => self.slots.iter().position(|&s| s == Some(pal)),
            SlotPolicy::LiveIndex => self.members.iter().position(|&m| m == pal),
        }
    }

    /// Number of evenly spaced positions on the perimeter.
    pub fn slot_count(&self, policy: SlotPolicy) -> usize {
        match policy {
            SlotPolicy::Stable => self.slots.len(),
            SlotPolicy::LiveIndex => self.members.len(),
        }
    }

    /// Point on the perimeter for `slot` of `count` at the given radius.
    pub fn slot_target(&self, slot: usize, count: usize, radius: f32) -> Vec2 {
        let count = count.max(1);
        let angle = TAU * slot as f32 / count as f32;
        self.circle.pos + Vec2::from_angle(angle) * radius
    }
}

/// What a reconciliation pass changed.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ReconcileReport {
    pub created: Vec<GroupId>,
    pub destroyed: Vec<String>,
    pub joined: Vec<PalId>,
    pub left: Vec<PalId>,
}

impl ReconcileReport {
    pub fn is_empty(&self) -> bool {
        self.created.is_empty() && self.destroyed.is_empty() && self.joined.is_empty() && self.left.is_empty()
    }
}

/// Sole owner of the group collection and the activity cache.
pub struct ClusterEngine {
    pub groups: Arena<Group>,
    by_activity: HashMap<String, GroupId>,
    pub activities: ActivityCache,
    pub params: GroupParams,
}

impl ClusterEngine {
    pub fn new(params: GroupParams) -> Self {
        Self {
            groups: Arena::new(),
            by_activity: HashMap::new(),
            activities: ActivityCache::default(),
            params,
        }
    }

    pub fn group_for(&self, activity: &str) -> Option<GroupId> {
        self.by_activity.get(activity).copied()
    }

    /// Per-group radius cap from sharing the crowding budget among live groups.
    pub fn crowd_cap(&self) -> Option<f32> {
        let count = self.groups.len().max(1) as f32;
        self.params.crowding_budget.map(|budget| budget / count)
    }

    /// Bring group membership in line with every pal's current activity.
    ///
    /// Pals with a resolvable activity join (or found) its group in first-seen
    /// order; members whose activity moved on are released, and groups left
    /// empty are destroyed on the spot.
    pub fn reconcile(
        &mut self,
        pals: &mut PalRegistry,
        canvas: &Canvas,
        rng: &mut impl ::rand::Rng,
    ) -> ReconcileReport {
        let mut report = ReconcileReport::default();
        let policy = self.params.slot_policy;

        for pal_id in pals.ids() {
            let Some(pal) = pals.get_mut(pal_id) else {
                continue;
            };
            let Some(key) = pal.activity.clone() else {
                continue;
            };
            if pal.state.group().is_some_and(|g| self.groups.contains(g)) {
                continue;
            }
            let Some(activity) = self.activities.get(&key) else {
                if pal.state != PalState::Pending(key.clone()) {
                    debug!("{} waiting on unresolved activity {key}", pal.identity);
                }
                pal.state = PalState::Pending(key);
                continue;
            };

            let group_id = match self.by_activity.get(&key) {
                Some(&id) => id,
                None => {
                    let pos = canvas.random_interior(self.params.max_radius, rng);
                    let group = Group::new(activity, pos, self.params.initial_age);
                    let id = self.groups.insert(group);
                    self.by_activity.insert(key.clone(), id);
                    info!("group '{}' formed around {}", activity.name, pal.identity);
                    report.created.push(id);
                    id
                }
            };
            let Some(group) = self.groups.get_mut(group_id) else {
                continue;
            };
            let slot = group.join(pal_id, policy);
            pal.state = PalState::Member { group: group_id, slot };
            pal.circle.tangible = false;
            debug!("{} joined '{}' at slot {}", pal.identity, key, slot);
            report.joined.push(pal_id);
        }

        for group_id in self.groups.ids() {
            let Some(group) = self.groups.get(group_id) else {
                continue;
            };
            let leaving: Vec<PalId> = group
                .members
                .iter()
                .copied()
                .filter(|&m| match pals.get(m) {
                    Some(pal) => pal.activity.as_deref() != Some(group.activity.as_str()),
                    None => true,
                })
                .collect();
            for pal_id in leaving {
                self.release(group_id, pal_id, pals);
                report.left.push(pal_id);
            }
            if let Some(activity) = self.destroy_if_empty(group_id) {
                report.destroyed.push(activity);
            }
        }

        report
    }

    /// Take a pal out of a group, restoring it to free-floating.
    fn release(&mut self, group_id: GroupId, pal_id: PalId, pals: &mut PalRegistry) {
        let policy = self.params.slot_policy;
        let Some(group) = self.groups.get_mut(group_id) else {
            return;
        };
        if !group.leave(pal_id) {
            return;
        }
        if let Some(pal) = pals.get_mut(pal_id) {
            debug!("{} left '{}'", pal.identity, group.activity);
            pal.state = PalState::unassigned(pal.activity.as_deref());
            pal.circle.tangible = true;
        }
        if policy == SlotPolicy::LiveIndex {
            renumber(group_id, group, policy, pals);
        }
    }

    fn destroy_if_empty(&mut self, group_id: GroupId) -> Option<String> {
        if !self.groups.get(group_id)?.members.is_empty() {
            return None;
        }
        let group = self.groups.remove(group_id)?;
        self.by_activity.remove(&group.activity);
        info!("group '{}' dissolved", group.activity);
        Some(group.activity)
    }

    /// Detach a pal that is leaving the registry; returns the destroyed group's key, if any.
    pub fn forget_pal(&mut self, pal_id: PalId, pals: &mut PalRegistry) -> Option<String> {
        let group_id = pals.get(pal_id)?.state.group()?;
        self.release(group_id, pal_id, pals);
        self.destroy_if_empty(group_id)
    }

    /// Switch slot policy and reassign every member's slot accordingly.
    pub fn set_slot_policy(&mut self, policy: SlotPolicy, pals: &mut PalRegistry) {
        if self.params.slot_policy == policy {
            return;
        }
        self.params.slot_policy = policy;
        for (group_id, group) in self.groups.iter_mut() {
            renumber(group_id, group, policy, pals);
        }
    }

    /// Rebuild the activity index after loading groups from a save.
    pub fn from_parts(
        groups: Arena<Group>,
        activities: ActivityCache,
        params: GroupParams,
    ) -> Self {
        let by_activity = groups
            .iter()
            .map(|(id, g)| (g.activity.clone(), id))
            .collect();
        Self {
            groups,
            by_activity,
            activities,
            params,
        }
    }
}

fn renumber(group_id: GroupId, group: &Group, policy: SlotPolicy, pals: &mut PalRegistry) {
    for &member in &group.members {
        let Some(slot) = group.slot_of(member, policy) else {
            continue;
        };
        if let Some(pal) = pals.get_mut(member) {
            pal.state = PalState::Member { group: group_id, slot };
        }
    }
}
