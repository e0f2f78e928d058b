use ::rand::SeedableRng;
use log::{debug, info, trace};
use macroquad::prelude::*;
use rand_chacha::ChaCha8Rng;

use crate::canvas::Canvas;
use crate::circle::Circle;
use crate::cluster::{Activity, ClusterEngine, ReconcileReport};
use crate::config::{LobbyConfig, PhysicsParams, SlotPolicy};
use crate::feed::{FeedMessage, PalSnapshot};
use crate::force;
use crate::pal::{PalRegistry, PalState, SnapshotOutcome};

/// All lobby state: pals, groups, activity cache and pointer.
///
/// Feed updates go through the `apply_*` hooks between ticks; [`tick`](Self::tick)
/// advances the physics by one step.
pub struct SimulationWorld {
    pub canvas: Canvas,
    pub physics: PhysicsParams,
    pub pals: PalRegistry,
    pub clusters: ClusterEngine,
    pub pointer: Option<Vec2>,
    pub rng: ChaCha8Rng,
    pub tick_count: u64,
    pub paused: bool,
}

impl SimulationWorld {
    pub fn new(config: &LobbyConfig, seed: u64) -> Self {
        Self {
            canvas: Canvas::new(config.canvas.width, config.canvas.height),
            physics: config.physics.clone(),
            pals: PalRegistry::new(),
            clusters: ClusterEngine::new(config.groups.clone()),
            pointer: None,
            rng: ChaCha8Rng::seed_from_u64(seed),
            tick_count: 0,
            paused: false,
        }
    }

    /// Insert or update pals by identity, then re-run clustering.
    pub fn apply_pal_snapshot(&mut self, snapshots: &[PalSnapshot]) -> ReconcileReport {
        let mut created = 0;
        let mut updated = 0;
        for snapshot in snapshots {
            match self
                .pals
                .apply_snapshot(snapshot, &self.canvas, &self.physics, &mut self.rng)
            {
                SnapshotOutcome::Created(_) => created += 1,
                SnapshotOutcome::Updated(_) => updated += 1,
                SnapshotOutcome::Unchanged(_) => {}
            }
        }
        if created + updated > 0 {
            debug!("pal snapshot: {created} new, {updated} changed, {} total", self.pals.len());
        }
        self.reconcile()
    }

    /// Cache activity metadata, then re-run clustering so pending pals can group.
    pub fn apply_activity_metadata(&mut self, activities: &[Activity]) -> ReconcileReport {
        for activity in activities {
            if self.clusters.activities.insert(activity.clone()) {
                debug!("activity {} -> '{}'", activity.id, activity.name);
            }
        }
        self.reconcile()
    }

    /// Drop pals by identity, dissolving groups they leave empty.
    pub fn remove_pals(&mut self, identities: &[String]) {
        for identity in identities {
            let Some(id) = self.pals.find(identity) else {
                continue;
            };
            self.clusters.forget_pal(id, &mut self.pals);
            if self.pals.remove(identity).is_some() {
                debug!("pal {identity} removed");
            }
        }
    }

    /// Pointer in canvas coordinates, or `None` when it is off the canvas.
    pub fn set_pointer_position(&mut self, pointer: Option<Vec2>) {
        self.pointer = pointer;
    }

    pub fn apply_feed(&mut self, msg: FeedMessage) {
        match msg {
            FeedMessage::Pals(snapshots) => {
                self.apply_pal_snapshot(&snapshots);
            }
            FeedMessage::Activities(activities) => {
                self.apply_activity_metadata(&activities);
            }
            FeedMessage::Remove(identities) => self.remove_pals(&identities),
            FeedMessage::Msg(text) => info!("feed: {text}"),
        }
    }

    pub fn reconcile(&mut self) -> ReconcileReport {
        let report = self
            .clusters
            .reconcile(&mut self.pals, &self.canvas, &mut self.rng);
        if !report.is_empty() {
            debug!(
                "reconcile: +{} groups, -{} groups, {} joined, {} left",
                report.created.len(),
                report.destroyed.len(),
                report.joined.len(),
                report.left.len()
            );
        }
        report
    }

    pub fn set_slot_policy(&mut self, policy: SlotPolicy) {
        self.clusters.set_slot_policy(policy, &mut self.pals);
    }

    /// Activity keys carried by pals but missing from the cache, in first-seen order.
    pub fn unresolved_activities(&self) -> Vec<String> {
        let mut keys: Vec<String> = Vec::new();
        for (_, pal) in self.pals.iter() {
            if let Some(key) = &pal.activity {
                if !self.clusters.activities.contains(key) && !keys.contains(key) {
                    keys.push(key.clone());
                }
            }
        }
        keys
    }

    /// Every avatar and background reference the renderer may ask for.
    pub fn image_urls(&self) -> Vec<String> {
        let pals = self.pals.iter().filter_map(|(_, p)| p.avatar_url.clone());
        let groups = self
            .clusters
            .groups
            .iter()
            .filter_map(|(_, g)| g.background_url.clone());
        pals.chain(groups).collect()
    }

    /// Advance one step:
    /// 1. pal/pal and pal/pointer repulsion among tangible pals,
    /// 2. group/group and group/pointer repulsion,
    /// 3. group aging, non-member push-out and member perimeter servo,
    /// 4. wall push, clamp, move and damp for every circle.
    pub fn tick(&mut self) {
        let p = &self.physics;

        {
            let mut circles: Vec<&mut Circle> = self
                .pals
                .arena
                .iter_mut()
                .map(|(_, pal)| &mut pal.circle)
                .collect();
            force::repel_all(&mut circles, self.pointer, p.pal_repulsion);
        }
        {
            let mut circles: Vec<&mut Circle> = self
                .clusters
                .groups
                .iter_mut()
                .map(|(_, group)| &mut group.circle)
                .collect();
            force::repel_all(&mut circles, self.pointer, p.group_repulsion);
        }

        let max_radius = self.clusters.params.max_radius;
        let age_step = self.clusters.params.age_step;
        let policy = self.clusters.params.slot_policy;
        let crowd_cap = self.clusters.crowd_cap();
        for (group_id, group) in self.clusters.groups.iter_mut() {
            group.age += age_step;
            let radius = group.radius(max_radius, crowd_cap);
            group.circle.radius = radius;
            let slot_count = group.slot_count(policy);

            for (_, pal) in self.pals.arena.iter_mut() {
                match pal.state {
                    PalState::Member { group: g, slot } if g == group_id => {
                        let target = group.slot_target(slot, slot_count, radius);
                        pal.circle.set_servo((target - pal.circle.pos) * p.servo_gain);
                        pal.circle.tangible = false;
                    }
                    _ => force::repel_overlap(
                        &mut group.circle,
                        &mut pal.circle,
                        p.nonmember_reach,
                        p.nonmember_falloff,
                        p.group_recoil,
                    ),
                }
            }
        }

        for (_, pal) in self.pals.arena.iter_mut() {
            force::repel_from_walls(&mut pal.circle, &self.canvas, p.wall_exponent, p.wall_scale);
            force::integrate(&mut pal.circle, p.pal_velocity_limit, p.damping);
        }
        for (_, group) in self.clusters.groups.iter_mut() {
            force::repel_from_walls(&mut group.circle, &self.canvas, p.wall_exponent, p.wall_scale);
            force::integrate(&mut group.circle, p.group_velocity_limit, p.damping);
        }

        self.tick_count += 1;
        trace!("tick {} ({} pals, {} groups)", self.tick_count, self.pals.len(), self.clusters.groups.len());

        let interval = self.clusters.params.reconcile_interval;
        if interval > 0 && self.tick_count % interval == 0 {
            self.reconcile();
        }
    }
}
