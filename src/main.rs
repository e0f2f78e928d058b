use std::path::PathBuf;

use anyhow::Result;
use clap::Parser;
use log::{error, info};
use macroquad::prelude::*;

mod arena;
mod canvas;
mod circle;
mod cluster;
mod config;
mod feed;
mod force;
mod pal;
mod renderer;
mod save_load;
mod textures;
mod ui;
mod viewport;
mod world;

use config::LobbyConfig;
use feed::{DemoFeed, FeedSource, LineFeed};
use textures::TextureCache;
use ui::UiState;
use viewport::Viewport;
use world::SimulationWorld;

/// Force-directed lobby of pals that cluster around shared activities.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Optional path to a lobby.toml overriding the built-in defaults
    #[arg(long)]
    config: Option<PathBuf>,

    /// JSON-lines feed to replay (`-` reads stdin)
    #[arg(long, conflicts_with = "demo")]
    feed: Option<String>,

    /// Run the seeded demo feed (the default when no feed is given)
    #[arg(long)]
    demo: bool,

    /// Seed for spawn positions and the demo feed
    #[arg(long, default_value_t = 42)]
    seed: u64,

    /// Save file used by Ctrl+S / Ctrl+L
    #[arg(long, default_value = "palroom_save.bin")]
    save: PathBuf,
}

fn window_conf() -> Conf {
    Conf {
        window_title: "palroom".to_string(),
        window_width: 1100,
        window_height: 760,
        window_resizable: true,
        high_dpi: true,
        ..Default::default()
    }
}

const CANVAS_MARGIN: f32 = 24.0;

fn setup(args: &Args) -> Result<(LobbyConfig, Box<dyn FeedSource>)> {
    let config = match &args.config {
        Some(path) => {
            let config = LobbyConfig::load(path)?;
            info!("loaded config from {}", path.display());
            config
        }
        None => LobbyConfig::default(),
    };

    let feed: Box<dyn FeedSource> = match (&args.feed, args.demo) {
        (Some(path), false) => Box::new(LineFeed::open(path)?),
        _ => Box::new(DemoFeed::new(&config.feed, args.seed)),
    };
    info!("feed: {}", feed.describe());
    Ok((config, feed))
}

#[macroquad::main(window_conf)]
async fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = Args::parse();

    let (lobby, mut feed) = match setup(&args) {
        Ok(parts) => parts,
        Err(e) => {
            error!("{e:#}");
            return;
        }
    };
    let feed_label = feed.describe();

    let mut world = SimulationWorld::new(&lobby, args.seed);
    let mut textures = TextureCache::new(lobby.feed.asset_root.as_ref().map(PathBuf::from));
    let mut ui_state = UiState::new(&lobby.groups);
    let mut accumulator = 0.0f64;
    let dt = config::FIXED_DT as f64;

    loop {
        let frame_time = get_frame_time() as f64;
        accumulator += frame_time.min(0.1);

        // Feed batches land between ticks, never inside one.
        let batches = feed.poll(world.tick_count);
        if !batches.is_empty() {
            for msg in batches {
                world.apply_feed(msg);
            }
            textures.request_all(world.image_urls());
        }
        textures.poll();

        let viewport = Viewport::fit(&world.canvas, vec2(screen_width(), screen_height()), CANVAS_MARGIN);
        let mut egui_wants_pointer = false;
        egui_macroquad::cfg(|ctx| {
            egui_wants_pointer = ctx.wants_pointer_input();
        });
        let pointer = if egui_wants_pointer {
            None
        } else {
            viewport.canvas_pointer(&world.canvas, Vec2::from(mouse_position()))
        };
        world.set_pointer_position(pointer);

        if !world.paused {
            while accumulator >= dt {
                world.tick();
                accumulator -= dt;
            }
        } else {
            accumulator = 0.0;
            if ui_state.step_requested {
                world.tick();
            }
        }
        ui_state.step_requested = false;

        if is_key_pressed(KeyCode::Space) {
            world.paused = !world.paused;
        }
        if is_key_pressed(KeyCode::Tab) {
            ui_state.show_panel = !ui_state.show_panel;
        }

        // Save/Load (Ctrl+S / Ctrl+L)
        if is_key_down(KeyCode::LeftControl) || is_key_down(KeyCode::RightControl) {
            if is_key_pressed(KeyCode::S) {
                ui_state.save_requested = true;
            }
            if is_key_pressed(KeyCode::L) {
                ui_state.load_requested = true;
            }
        }
        if std::mem::take(&mut ui_state.save_requested) {
            if let Err(e) = save_load::save_to_file(&world, &args.save) {
                error!("save failed: {e:#}");
            }
        }
        if std::mem::take(&mut ui_state.load_requested) {
            match save_load::load_from_file(&args.save) {
                Ok(loaded) => {
                    world = loaded;
                    textures.request_all(world.image_urls());
                }
                Err(e) => error!("load failed: {e:#}"),
            }
        }

        let alpha = if !world.paused {
            (accumulator / dt) as f32
        } else {
            1.0
        };

        renderer::draw(&world, &textures, &viewport, alpha, &feed_label);
        ui::draw_ui(&mut world, &mut ui_state, &feed_label);

        next_frame().await;
    }
}
