use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use log::{debug, info};
use pagestrip_core::{
    BlankRenderer, EditRecord, ImageCollection, ImagePreference, PageRef, PageSize, Rotation,
    StaticPage, StripConfig,
};
use pagestrip_scheduler::{CycleState, InlineExecutor};
use serde::Serialize;
use std::ffi::OsString;
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::Arc;
use std::time::{Duration, Instant};

#[derive(Debug, Parser)]
#[command(name = "pagestrip")]
#[command(about = "Page thumbnail strip driver")]
pub struct Cli {
    /// Log at debug level unless RUST_LOG says otherwise.
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Configuration file (defaults to the per-user config path).
    #[arg(long, global = true, value_name = "FILE")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Build a strip of synthetic pages, apply edits and print its state as JSON.
    Simulate {
        /// Number of pages to start with.
        #[arg(long, default_value_t = 10)]
        pages: usize,
        /// Edit to apply, in order; may be repeated.
        ///
        /// insert:INDEX:COUNT, remove:I,J, move:I,J:DELTA, rotate:I,J:DEGREES,
        /// zoom:OFFSET, visible:FIRST:LAST, select:I,J, undo, redraw, clear
        #[arg(long = "op", value_name = "OP")]
        ops: Vec<Op>,
        /// Render on the calling thread instead of the worker pool.
        #[arg(long)]
        inline: bool,
        /// Seconds to wait for background rendering to settle.
        #[arg(long, default_value_t = 10)]
        timeout: u64,
    },
    /// Render a thumbnail PNG for a synthetic page.
    RenderThumb {
        /// Page width in points.
        #[arg(long, default_value_t = 612.0)]
        width: f32,
        /// Page height in points.
        #[arg(long, default_value_t = 792.0)]
        height: f32,
        /// Extra clockwise rotation in degrees.
        #[arg(long, default_value_t = 0, allow_hyphen_values = true)]
        rotation: i32,
        /// Index into the configured item sizes.
        #[arg(long)]
        size_index: Option<usize>,
        #[arg(long)]
        output: PathBuf,
    },
    /// Print the effective configuration as JSON.
    Config {
        /// Also write it to this file.
        #[arg(long, value_name = "FILE")]
        write: Option<PathBuf>,
    },
    /// Print CLI version.
    Version,
}

/// One scripted edit for `simulate`
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Op {
    Insert { index: usize, count: usize },
    Remove(Vec<usize>),
    Move { indices: Vec<usize>, delta: isize },
    Rotate { indices: Vec<usize>, degrees: i32 },
    Zoom(isize),
    Visible { first: i64, last: i64 },
    Select(Vec<usize>),
    Undo,
    Redraw,
    Clear,
}

impl FromStr for Op {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let parts: Vec<&str> = s.split(':').collect();
        let op = match parts.as_slice() {
            ["insert", index, count] => Op::Insert {
                index: parse_number(index)?,
                count: parse_number(count)?,
            },
            ["remove", indices] => Op::Remove(parse_list(indices)?),
            ["move", indices, delta] => Op::Move {
                indices: parse_list(indices)?,
                delta: parse_number(delta)?,
            },
            ["rotate", indices, degrees] => Op::Rotate {
                indices: parse_list(indices)?,
                degrees: parse_number(degrees)?,
            },
            ["zoom", offset] => Op::Zoom(parse_number(offset)?),
            ["visible", first, last] => Op::Visible {
                first: parse_number(first)?,
                last: parse_number(last)?,
            },
            ["select", indices] => Op::Select(parse_list(indices)?),
            ["undo"] => Op::Undo,
            ["redraw"] => Op::Redraw,
            ["clear"] => Op::Clear,
            _ => return Err(format!("unrecognized op `{s}`")),
        };
        Ok(op)
    }
}

fn parse_number<T: FromStr>(raw: &str) -> Result<T, String> {
    raw.trim()
        .parse()
        .map_err(|_| format!("`{raw}` is not a valid number"))
}

fn parse_list(raw: &str) -> Result<Vec<usize>, String> {
    raw.split(',').map(parse_number).collect()
}

#[derive(Debug, Serialize)]
struct SimulateOutput {
    item_size: u32,
    visible: [usize; 2],
    items: Vec<ItemOutput>,
    selected: Vec<usize>,
    fill: FillOutput,
    cache: CacheOutput,
}

#[derive(Debug, Serialize)]
struct ItemOutput {
    index: usize,
    label: String,
    width: u32,
    height: u32,
    rotation: i32,
    cached: bool,
}

#[derive(Debug, Serialize)]
struct FillOutput {
    state: String,
    started: u64,
    completed: u64,
    cancelled: u64,
}

#[derive(Debug, Serialize)]
struct CacheOutput {
    entries: usize,
    scheduled: u64,
    created: u64,
    failed: u64,
    discarded: u64,
    evicted: u64,
}

pub fn run<I, T>(args: I) -> Result<()>
where
    I: IntoIterator<Item = T>,
    T: Into<OsString> + Clone,
{
    let cli = Cli::parse_from(args);
    init_logging(cli.verbose);

    let config = StripConfig::load(cli.config.as_deref()).context("failed to load configuration")?;
    debug!("effective configuration: {:?}", config);

    match cli.command {
        Commands::Simulate {
            pages,
            ops,
            inline,
            timeout,
        } => run_simulate(&config, pages, &ops, inline, Duration::from_secs(timeout)),
        Commands::RenderThumb {
            width,
            height,
            rotation,
            size_index,
            output,
        } => run_render_thumb(
            &config,
            PageSize::new(width, height),
            rotation,
            size_index,
            &output,
        ),
        Commands::Config { write } => run_config(&config, write.as_deref()),
        Commands::Version => {
            println!("{}", env!("CARGO_PKG_VERSION"));
            Ok(())
        }
    }
}

fn init_logging(verbose: bool) {
    let default_level = if verbose { "debug" } else { "warn" };
    // A second run in the same process keeps the first logger.
    let env = env_logger::Env::default().default_filter_or(default_level);
    let _ = env_logger::Builder::from_env(env)
        .format_timestamp(None)
        .try_init();
}

fn synthetic_pages(prefix: &str, start: usize, count: usize) -> Vec<PageRef> {
    (start..start + count)
        .map(|n| {
            // Every fifth page is landscape to exercise both aspect ratios.
            let size = if n % 5 == 4 {
                PageSize::letter().rotated(Rotation::CW_90)
            } else {
                PageSize::letter()
            };
            StaticPage::new(format!("{prefix}{}", n + 1), size).into_ref()
        })
        .collect()
}

fn run_simulate(
    config: &StripConfig,
    pages: usize,
    ops: &[Op],
    inline: bool,
    timeout: Duration,
) -> Result<()> {
    let renderer = Arc::new(BlankRenderer::default());
    let mut strip = if inline {
        ImageCollection::new(
            renderer,
            Arc::new(InlineExecutor),
            ImagePreference::from_config(config),
        )
    } else {
        ImageCollection::from_config(config, renderer).context("failed to start render pool")?
    };

    strip.add(synthetic_pages("P", 0, pages));
    strip.set_visible_range(0, pages as i64);

    let mut history: Vec<EditRecord> = Vec::new();
    let mut inserted = 0;
    for op in ops {
        debug!("applying {:?}", op);
        let record = match op {
            Op::Insert { index, count } => {
                let record = strip.insert(*index, synthetic_pages("N", inserted, *count));
                inserted += count;
                record
            }
            Op::Remove(indices) => strip.remove(indices),
            Op::Move { indices, delta } => strip.move_items(indices, *delta),
            Op::Rotate { indices, degrees } => strip.rotate(indices, *degrees),
            Op::Zoom(offset) => {
                strip.zoom(*offset);
                None
            }
            Op::Visible { first, last } => {
                strip.set_visible_range(*first, *last);
                None
            }
            Op::Select(indices) => {
                for &index in indices {
                    strip.set_selected(index, true);
                }
                None
            }
            Op::Undo => {
                match history.pop() {
                    Some(record) => {
                        strip.apply(&record.inverse);
                    }
                    None => bail!("nothing to undo"),
                }
                None
            }
            Op::Redraw => {
                strip.redraw();
                None
            }
            Op::Clear => {
                strip.clear();
                history.clear();
                None
            }
        };
        history.extend(record);
        strip.dispatch_events();
    }

    settle(&mut strip, timeout)?;

    let range = strip.visible_range();
    let fill = strip.fill_stats();
    let cache = strip.cache().stats();
    let output = SimulateOutput {
        item_size: strip.preference().item_size(),
        visible: [range.start, range.end],
        items: strip
            .iter()
            .map(|item| ItemOutput {
                index: item.index(),
                label: item.label(),
                width: item.width(),
                height: item.height(),
                rotation: item.rotation().degrees(),
                cached: strip.cache().contains(&item.id()),
            })
            .collect(),
        selected: strip.selected_indices(),
        fill: FillOutput {
            state: format!("{:?}", strip.fill_state()).to_lowercase(),
            started: fill.started,
            completed: fill.completed,
            cancelled: fill.cancelled,
        },
        cache: CacheOutput {
            entries: cache.entries,
            scheduled: cache.scheduled,
            created: cache.created,
            failed: cache.failed,
            discarded: cache.discarded,
            evicted: cache.evicted,
        },
    };

    println!("{}", serde_json::to_string_pretty(&output)?);
    strip.close();
    Ok(())
}

/// Wait for the latest fill and every render it started
fn settle(strip: &mut ImageCollection, timeout: Duration) -> Result<()> {
    let deadline = Instant::now() + timeout;
    let state = strip.wait_for_fill(timeout);
    if !state.is_finished() && state != CycleState::Idle {
        bail!("background fill did not finish within {:?}", timeout);
    }
    while strip.cache().inflight_len() > 0 {
        if Instant::now() >= deadline {
            bail!("rendering did not finish within {:?}", timeout);
        }
        std::thread::sleep(Duration::from_millis(5));
    }
    let dispatched = strip.dispatch_events();
    info!("settled with {} notifications", dispatched);
    Ok(())
}

fn run_render_thumb(
    config: &StripConfig,
    size: PageSize,
    rotation: i32,
    size_index: Option<usize>,
    output: &Path,
) -> Result<()> {
    if !size.is_valid() {
        bail!("page size must be positive, got {}x{}", size.width, size.height);
    }

    let mut preference = ImagePreference::from_config(config);
    if let Some(index) = size_index {
        preference.set_item_size_index(index);
    }

    let mut strip = ImageCollection::new(
        Arc::new(BlankRenderer::default()),
        Arc::new(InlineExecutor),
        preference,
    );
    strip.add(vec![StaticPage::new("page", size).into_ref()]);
    strip.rotate(&[0], rotation);
    strip.set_visible_range(0, 1);

    let thumbnail = strip.thumbnail(0).context("failed to render thumbnail")?;

    if let Some(parent) = output.parent() {
        fs::create_dir_all(parent)?;
    }
    thumbnail
        .save_png(output)
        .with_context(|| format!("failed to write image to {}", output.display()))?;

    println!("{}", output.display());
    Ok(())
}

fn run_config(config: &StripConfig, write: Option<&Path>) -> Result<()> {
    if let Some(path) = write {
        config
            .save_to_file(path)
            .with_context(|| format!("failed to write configuration to {}", path.display()))?;
    }
    println!("{}", serde_json::to_string_pretty(config)?);
    Ok(())
}
