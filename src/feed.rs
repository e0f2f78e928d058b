// Data feeds: wire types plus the sources that deliver them between ticks.

use std::fs::File;
use std::io::{self, BufRead, BufReader, Read};
use std::sync::mpsc::{self, Receiver};
use std::thread;

use anyhow::{Context, Result};
use log::{info, warn};
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};

use crate::cluster::Activity;
use crate::config::FeedConfig;
use crate::pal::DisplayStatus;

/// One pal as reported by a presence source.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PalSnapshot {
    pub name: String,
    #[serde(default, rename = "avatarURL", alias = "avatar_url")]
    pub avatar_url: Option<String>,
    pub status: DisplayStatus,
    #[serde(default)]
    pub activity: Option<String>,
}

/// A batch delivered by a feed. Each batch is applied atomically between ticks.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "msg", rename_all = "lowercase")]
pub enum FeedMessage {
    Pals(Vec<PalSnapshot>),
    Activities(Vec<Activity>),
    Remove(Vec<String>),
    Msg(String),
}

/// Parse one JSON line; blank lines and `#` comments yield `None`.
pub fn parse_line(line: &str) -> Result<Option<FeedMessage>> {
    let trimmed = line.trim();
    if trimmed.is_empty() || trimmed.starts_with('#') {
        return Ok(None);
    }
    let msg = serde_json::from_str(trimmed).context("malformed feed message")?;
    Ok(Some(msg))
}

pub trait FeedSource {
    /// Everything that arrived since the last poll. Never blocks.
    fn poll(&mut self, tick: u64) -> Vec<FeedMessage>;

    fn describe(&self) -> String;
}

/// JSON-lines feed read from a file or stdin on a background thread.
pub struct LineFeed {
    rx: Receiver<FeedMessage>,
    label: String,
}

impl LineFeed {
    /// Open `path` (`-` for stdin) and start streaming it.
    pub fn open(path: &str) -> Result<Self> {
        let (reader, label): (Box<dyn Read + Send>, String) = if path == "-" {
            (Box::new(io::stdin()), "stdin".to_string())
        } else {
            let file = File::open(path).with_context(|| format!("failed to open feed '{path}'"))?;
            (Box::new(file), path.to_string())
        };
        Ok(Self::spawn(BufReader::new(reader), label))
    }

    pub fn spawn<R: BufRead + Send + 'static>(reader: R, label: String) -> Self {
        let (tx, rx) = mpsc::channel();
        let thread_label = label.clone();
        thread::spawn(move || {
            let mut delivered = 0usize;
            for (lineno, line) in reader.lines().enumerate() {
                let line = match line {
                    Ok(line) => line,
                    Err(e) => {
                        warn!("feed {thread_label}: read error: {e}");
                        break;
                    }
                };
                match parse_line(&line) {
                    Ok(Some(msg)) => {
                        if tx.send(msg).is_err() {
                            return;
                        }
                        delivered += 1;
                    }
                    Ok(None) => {}
                    Err(e) => warn!("feed {thread_label}:{}: {e:#}", lineno + 1),
                }
            }
            info!("feed {thread_label} finished after {delivered} messages");
        });
        Self { rx, label }
    }
}

impl FeedSource for LineFeed {
    fn poll(&mut self, _tick: u64) -> Vec<FeedMessage> {
        self.rx.try_iter().collect()
    }

    fn describe(&self) -> String {
        format!("line feed ({})", self.label)
    }
}

const DEMO_NAMES: [&str; 16] = [
    "ash", "birch", "cedar", "dune", "ember", "fern", "glade", "haze",
    "iris", "juniper", "kestrel", "lark", "moss", "nova", "onyx", "pike",
];

/// Seeded stand-in for real presence sources: a small lobby whose pals
/// periodically wander between a handful of activities.
pub struct DemoFeed {
    rng: ChaCha8Rng,
    pals: Vec<PalSnapshot>,
    activities: Vec<Activity>,
    shuffle_interval: u64,
    next_shuffle: u64,
    shuffles: u64,
    started: bool,
}

impl DemoFeed {
    pub fn new(config: &FeedConfig, seed: u64) -> Self {
        let mut rng = ChaCha8Rng::seed_from_u64(seed);
        let activities: Vec<Activity> = (0..config.demo_activities)
            .map(|i| Activity {
                id: format!("demo:{i}"),
                name: format!("Activity {}", i + 1),
                background_url: None,
            })
            .collect();
        let pals = (0..config.demo_pals)
            .map(|i| {
                let base = DEMO_NAMES[i % DEMO_NAMES.len()];
                let name = if i < DEMO_NAMES.len() {
                    base.to_string()
                } else {
                    format!("{base}{}", i / DEMO_NAMES.len())
                };
                PalSnapshot {
                    name,
                    avatar_url: None,
                    status: random_status(&mut rng),
                    activity: None,
                }
            })
            .collect();
        Self {
            rng,
            pals,
            activities,
            shuffle_interval: config.demo_shuffle_interval.max(1),
            next_shuffle: 0,
            shuffles: 0,
            started: false,
        }
    }

    fn shuffle(&mut self) {
        let keys = self.activities.len();
        for pal in self.pals.iter_mut() {
            if self.rng.gen::<f32>() > 0.35 {
                continue;
            }
            pal.status = random_status(&mut self.rng);
            pal.activity = if pal.status == DisplayStatus::Offline || keys == 0 || self.rng.gen::<f32>() < 0.3 {
                None
            } else {
                Some(self.activities[self.rng.gen_range(0..keys)].id.clone())
            };
        }
        self.shuffles += 1;
    }
}

impl FeedSource for DemoFeed {
    fn poll(&mut self, tick: u64) -> Vec<FeedMessage> {
        let mut out = Vec::new();
        if !self.started {
            self.started = true;
            // The last activity's metadata is held back so its pals wait in Pending for a while.
            let known = self.activities.len().saturating_sub(1);
            out.push(FeedMessage::Activities(self.activities[..known].to_vec()));
        }
        if tick >= self.next_shuffle {
            self.shuffle();
            self.next_shuffle = tick + self.shuffle_interval;
            if self.shuffles == 3 {
                if let Some(last) = self.activities.last() {
                    out.push(FeedMessage::Activities(vec![last.clone()]));
                }
            }
            out.push(FeedMessage::Pals(self.pals.clone()));
        }
        out
    }

    fn describe(&self) -> String {
        format!("demo feed ({} pals, {} activities)", self.pals.len(), self.activities.len())
    }
}

fn random_status(rng: &mut impl Rng) -> DisplayStatus {
    match rng.gen_range(0..10) {
        0..=1 => DisplayStatus::Offline,
        2..=3 => DisplayStatus::Idle,
        _ => DisplayStatus::Online,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;
    use std::time::{Duration, Instant};

    #[test]
    fn parses_pal_batch_with_wire_field_names() {
        let line = r#"{"type":"pals","msg":[{"name":"ana","avatarURL":"a.png","status":2,"activity":"game:7"},{"name":"bo","status":0}]}"#;
        let msg = parse_line(line).unwrap().unwrap();
        let FeedMessage::Pals(pals) = msg else {
            panic!("expected pals, got {msg:?}");
        };
        assert_eq!(pals[0].avatar_url.as_deref(), Some("a.png"));
        assert_eq!(pals[0].status, DisplayStatus::Online);
        assert_eq!(pals[0].activity.as_deref(), Some("game:7"));
        assert_eq!(pals[1].status, DisplayStatus::Offline);
        assert!(pals[1].activity.is_none());
    }

    #[test]
    fn parses_activity_batch() {
        let line = r#"{"type":"activities","msg":[{"id":"game:7","name":"Deep Rock","backgroundURL":"bg/7.jpg"}]}"#;
        let msg = parse_line(line).unwrap().unwrap();
        assert_eq!(
            msg,
            FeedMessage::Activities(vec![Activity {
                id: "game:7".into(),
                name: "Deep Rock".into(),
                background_url: Some("bg/7.jpg".into()),
            }])
        );
    }

    #[test]
    fn out_of_range_status_is_rejected() {
        let line = r#"{"type":"pals","msg":[{"name":"x","status":7}]}"#;
        assert!(parse_line(line).is_err());
    }

    #[test]
    fn blank_and_comment_lines_are_skipped() {
        assert!(parse_line("   ").unwrap().is_none());
        assert!(parse_line("# recorded 2024-05-01").unwrap().is_none());
    }

    #[test]
    fn line_feed_skips_bad_lines_and_keeps_going() {
        let input = concat!(
            r#"{"type":"msg","msg":"hello"}"#, "\n",
            "not json\n",
            r#"{"type":"remove","msg":["ana"]}"#, "\n",
        );
        let mut feed = LineFeed::spawn(Cursor::new(input.to_string()), "test".into());

        let deadline = Instant::now() + Duration::from_secs(5);
        let mut got = Vec::new();
        while got.len() < 2 && Instant::now() < deadline {
            got.extend(feed.poll(0));
            thread::sleep(Duration::from_millis(5));
        }
        assert_eq!(
            got,
            vec![
                FeedMessage::Msg("hello".into()),
                FeedMessage::Remove(vec!["ana".into()]),
            ]
        );
    }

    #[test]
    fn demo_feed_is_deterministic_per_seed() {
        let config = FeedConfig::default();
        let mut a = DemoFeed::new(&config, 9);
        let mut b = DemoFeed::new(&config, 9);
        for tick in [0, 1, config.demo_shuffle_interval, 2 * config.demo_shuffle_interval] {
            assert_eq!(a.poll(tick), b.poll(tick));
        }
    }

    #[test]
    fn demo_feed_withholds_one_activity_at_start() {
        let config = FeedConfig::default();
        let mut feed = DemoFeed::new(&config, 1);
        let first = feed.poll(0);
        let FeedMessage::Activities(known) = &first[0] else {
            panic!("expected activities first");
        };
        assert_eq!(known.len(), config.demo_activities - 1);
        assert!(matches!(first.last(), Some(FeedMessage::Pals(p)) if p.len() == config.demo_pals));
        assert!(feed.poll(1).is_empty());
    }
}
