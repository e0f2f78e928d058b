use egui;

use crate::config::{GroupParams, SlotPolicy, CROWDING_RADIUS_BUDGET};
use crate::pal::PalState;
use crate::world::SimulationWorld;

/// Panel visibility plus requests the main loop picks up after drawing.
pub struct UiState {
    pub show_panel: bool,
    pub step_requested: bool,
    pub save_requested: bool,
    pub load_requested: bool,
    /// Budget restored when the crowding cap is switched back on.
    pub crowding_budget: f32,
}

impl UiState {
    pub fn new(groups: &GroupParams) -> Self {
        Self {
            show_panel: true,
            step_requested: false,
            save_requested: false,
            load_requested: false,
            crowding_budget: groups.crowding_budget.unwrap_or(CROWDING_RADIUS_BUDGET),
        }
    }
}

fn set_crowding(params: &mut GroupParams, remembered: &mut f32, on: bool) {
    if let Some(budget) = params.crowding_budget {
        *remembered = budget;
    }
    params.crowding_budget = on.then_some(*remembered);
}

/// Draw all egui UI panels.
pub fn draw_ui(world: &mut SimulationWorld, ui_state: &mut UiState, feed_label: &str) {
    egui_macroquad::ui(|ctx| {
        if ui_state.show_panel {
            draw_lobby_panel(ctx, world, ui_state, feed_label);
        }
    });

    egui_macroquad::draw();
}

fn draw_lobby_panel(
    ctx: &egui::Context,
    world: &mut SimulationWorld,
    ui_state: &mut UiState,
    feed_label: &str,
) {
    egui::Window::new("Lobby")
        .default_pos(egui::pos2(16.0, 150.0))
        .default_width(260.0)
        .resizable(true)
        .show(ctx, |ui| {
            ui.horizontal(|ui| {
                let pause_label = if world.paused { "Play" } else { "Pause" };
                if ui.button(pause_label).clicked() {
                    world.paused = !world.paused;
                }
                if ui.add_enabled(world.paused, egui::Button::new("Step")).clicked() {
                    ui_state.step_requested = true;
                }
                if ui.button("Save").clicked() {
                    ui_state.save_requested = true;
                }
                if ui.button("Load").clicked() {
                    ui_state.load_requested = true;
                }
            });
            ui.label(
                egui::RichText::new(feed_label)
                    .small()
                    .color(egui::Color32::from_rgb(150, 170, 185)),
            );

            ui.separator();
            ui.label("Perimeter slots");
            let mut policy = world.clusters.params.slot_policy;
            ui.horizontal(|ui| {
                for option in [SlotPolicy::Stable, SlotPolicy::LiveIndex] {
                    ui.radio_value(&mut policy, option, option.label());
                }
            });
            if policy != world.clusters.params.slot_policy {
                world.set_slot_policy(policy);
            }
            let mut crowding = world.clusters.params.crowding_budget.is_some();
            if ui.checkbox(&mut crowding, "Crowding cap").changed() {
                set_crowding(&mut world.clusters.params, &mut ui_state.crowding_budget, crowding);
            }

            ui.separator();
            ui.label(format!("Known activities: {}", world.clusters.activities.len()));
            egui::CollapsingHeader::new(format!("Groups ({})", world.clusters.groups.len()))
                .default_open(true)
                .show(ui, |ui| {
                    for (_, group) in world.clusters.groups.iter() {
                        let name = world
                            .clusters
                            .activities
                            .get(&group.activity)
                            .map_or(group.activity.as_str(), |a| a.name.as_str());
                        ui.label(format!(
                            "{name}: {} members, r {:.0}",
                            group.members.len(),
                            group.circle.radius
                        ));
                    }
                });

            egui::CollapsingHeader::new(format!("Pals ({})", world.pals.len())).show(ui, |ui| {
                egui::ScrollArea::vertical().max_height(220.0).show(ui, |ui| {
                    for (_, pal) in world.pals.iter() {
                        let placement = match &pal.state {
                            PalState::Free => "free".to_string(),
                            PalState::Pending(key) => format!("waiting on {key}"),
                            PalState::Member { slot, .. } => format!(
                                "{} #{slot}",
                                pal.activity.as_deref().unwrap_or("?")
                            ),
                        };
                        ui.label(format!("{} ({}) {}", pal.identity, pal.status.label(), placement));
                    }
                });
            });

            let unresolved = world.unresolved_activities();
            if !unresolved.is_empty() {
                ui.separator();
                ui.label(
                    egui::RichText::new(format!("Unresolved: {}", unresolved.join(", ")))
                        .color(egui::Color32::from_rgb(230, 190, 90)),
                );
            }
        });
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn crowding_toggle_restores_configured_budget() {
        let mut params = GroupParams {
            crowding_budget: Some(300.0),
            ..GroupParams::default()
        };
        let mut ui_state = UiState::new(&params);
        set_crowding(&mut params, &mut ui_state.crowding_budget, false);
        assert_eq!(params.crowding_budget, None);
        set_crowding(&mut params, &mut ui_state.crowding_budget, true);
        assert_eq!(params.crowding_budget, Some(300.0));
    }

    #[test]
    fn disabled_cap_falls_back_to_default_budget() {
        let mut params = GroupParams {
            crowding_budget: None,
            ..GroupParams::default()
        };
        let mut ui_state = UiState::new(&params);
        set_crowding(&mut params, &mut ui_state.crowding_budget, true);
        assert_eq!(params.crowding_budget, Some(CROWDING_RADIUS_BUDGET));
    }
}
