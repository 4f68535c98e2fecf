use std::{
    fs::File,
    io::BufReader,
    path::{Path, PathBuf},
};

use anyhow::Context as _;
use clap::{Parser, Subcommand};
use reelgraph::{
    EngineConfig, EngineResult, Filter, Frame, Image, ImageFormat, ImageRequest, Modality,
    Playlist, Position, Producer, Profile, Tractor, Transition, TransitionProcess, Whence, keys,
};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "reelgraph", version)]
struct Cli {
    #[command(subcommand)]
    cmd: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Print the clip table of every track and the timeline edit points.
    Inspect(InspectArgs),
    /// Print which source each track contributes per frame.
    Harvest(HarvestArgs),
    /// Write the composed image of one frame as a PNG.
    Frame(FrameArgs),
}

#[derive(Parser, Debug)]
struct InspectArgs {
    /// Input project JSON.
    #[arg(long = "in")]
    in_path: PathBuf,
}

#[derive(Parser, Debug)]
struct HarvestArgs {
    /// Input project JSON.
    #[arg(long = "in")]
    in_path: PathBuf,

    /// First frame to pull.
    #[arg(long, default_value_t = 0)]
    from: Position,

    /// Number of frames to pull (defaults to the rest of the timeline).
    #[arg(long)]
    count: Option<Position>,
}

#[derive(Parser, Debug)]
struct FrameArgs {
    /// Input project JSON.
    #[arg(long = "in")]
    in_path: PathBuf,

    /// Frame index (0-based).
    #[arg(long)]
    frame: Position,

    /// Output PNG path.
    #[arg(long)]
    out: PathBuf,

    /// Output width (defaults to the profile width).
    #[arg(long)]
    width: Option<u32>,

    /// Output height (defaults to the profile height).
    #[arg(long)]
    height: Option<u32>,
}

/// Project file: a stack of tracks composed bottom to top.
#[derive(Debug, serde::Deserialize)]
#[serde(deny_unknown_fields)]
struct Project {
    #[serde(default)]
    profile: Option<Profile>,
    tracks: Vec<TrackDef>,
    #[serde(default)]
    transitions: Vec<TransitionDef>,
    #[serde(default)]
    filters: Vec<FilterDef>,
}

#[derive(Debug, serde::Deserialize)]
#[serde(deny_unknown_fields)]
struct TrackDef {
    clips: Vec<ClipDef>,
    /// Dissolves between neighbouring clips, by index of the first clip.
    #[serde(default)]
    mixes: Vec<MixDef>,
}

#[derive(Debug, serde::Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case", deny_unknown_fields)]
enum ClipDef {
    Colour {
        rgb: [u8; 3],
        length: Position,
        #[serde(default)]
        label: Option<String>,
    },
    Blank {
        length: Position,
    },
}

#[derive(Debug, serde::Deserialize)]
#[serde(deny_unknown_fields)]
struct MixDef {
    clip: usize,
    length: Position,
}

#[derive(Debug, serde::Deserialize)]
#[serde(deny_unknown_fields)]
struct TransitionDef {
    a_track: i32,
    b_track: i32,
    #[serde(rename = "in", default)]
    in_point: Position,
    #[serde(default)]
    out: Position,
}

#[derive(Debug, serde::Deserialize)]
#[serde(deny_unknown_fields)]
struct FilterDef {
    track: i32,
    brightness: i16,
    #[serde(rename = "in", default)]
    in_point: Position,
    #[serde(default)]
    out: Position,
}

/// The graph built from a project.
struct Timeline {
    tractor: Tractor,
    tracks: Vec<Playlist>,
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    match cli.cmd {
        Command::Inspect(args) => cmd_inspect(args),
        Command::Harvest(args) => cmd_harvest(args),
        Command::Frame(args) => cmd_frame(args),
    }
}

fn read_project_json(path: &Path) -> anyhow::Result<Project> {
    let f = File::open(path).with_context(|| format!("open project '{}'", path.display()))?;
    let r = BufReader::new(f);
    let project: Project = serde_json::from_reader(r).with_context(|| "parse project JSON")?;
    Ok(project)
}

fn load(path: &Path) -> anyhow::Result<Timeline> {
    let project = read_project_json(path)?;
    let mut config = EngineConfig::from_env()?;
    if let Some(profile) = project.profile.clone() {
        config.profile = profile;
    }
    reelgraph::engine::init(config)?;
    build(&project)
}

fn build(project: &Project) -> anyhow::Result<Timeline> {
    anyhow::ensure!(!project.tracks.is_empty(), "project has no tracks");
    let tractor = Tractor::new();
    let mut tracks = Vec::with_capacity(project.tracks.len());
    for (index, def) in project.tracks.iter().enumerate() {
        let playlist = build_track(def).with_context(|| format!("build track {index}"))?;
        tractor
            .set_track(playlist.producer(), index)
            .with_context(|| format!("connect track {index}"))?;
        tracks.push(playlist);
    }

    let field = tractor
        .field()
        .context("tractor without a field (bug)")?;
    for def in &project.filters {
        let filter = brightness_filter(def.brightness);
        filter.set_in_and_out(def.in_point, def.out);
        field
            .plant_filter(&filter, def.track)
            .with_context(|| format!("plant filter on track {}", def.track))?;
    }
    for def in &project.transitions {
        let transition = Transition::with_process(Dissolve);
        transition.set_in_and_out(def.in_point, def.out);
        field
            .plant_transition(&transition, def.a_track, def.b_track)
            .with_context(|| {
                format!("plant transition {} -> {}", def.a_track, def.b_track)
            })?;
    }
    Ok(Timeline { tractor, tracks })
}

fn build_track(def: &TrackDef) -> EngineResult<Playlist> {
    let playlist = Playlist::new();
    for clip in &def.clips {
        match clip {
            ClipDef::Colour { rgb, length, label } => {
                let label = label
                    .clone()
                    .unwrap_or_else(|| format!("#{:02x}{:02x}{:02x}", rgb[0], rgb[1], rgb[2]));
                playlist.append(&colour_producer(*rgb, *length, &label))?;
            }
            ClipDef::Blank { length } => playlist.blank(length - 1)?,
        }
    }
    // Later mixes first so earlier clip indexes stay put.
    let mut mixes: Vec<&MixDef> = def.mixes.iter().collect();
    mixes.sort_by(|a, b| b.clip.cmp(&a.clip));
    for mix in mixes {
        let transition = Transition::with_process(Dissolve);
        playlist.mix(mix.clip, mix.length, Some(&transition))?;
    }
    Ok(playlist)
}

/// Generator producing a flat colour.
fn colour_producer(rgb: [u8; 3], length: Position, label: &str) -> Producer {
    let producer = Producer::with_hook(move |p: &Producer, _index: i32| -> EngineResult<Frame> {
        let profile = p.service().profile();
        let frame = Frame::new(Some(p.service()));
        frame.push_get_image(move |_f: &Frame, req: &mut ImageRequest| {
            let width = if req.width == 0 { profile.width } else { req.width };
            let height = if req.height == 0 { profile.height } else { req.height };
            let pixels = width as usize * height as usize;
            let image = match req.format {
                ImageFormat::Rgb24a => {
                    let px = [rgb[0], rgb[1], rgb[2], 255];
                    Image::new(ImageFormat::Rgb24a, width, height, px.repeat(pixels))
                }
                _ => Image::new(ImageFormat::Rgb24, width, height, rgb.repeat(pixels)),
            };
            Ok(image)
        });
        Ok(frame)
    });
    let props = producer.properties();
    props.set(keys::LENGTH, length);
    props.set(keys::OUT, length - 1);
    props.set("meta.label", label);
    producer
}

fn brightness_filter(amount: i16) -> Filter {
    Filter::with_process(move |_filter: &Filter, frame: Frame| {
        frame.push_get_image(move |f: &Frame, req: &mut ImageRequest| {
            let image = f.get_image(*req)?;
            let data = image
                .data
                .iter()
                .map(|&b| (i16::from(b) + amount).clamp(0, 255) as u8)
                .collect();
            Ok(Image::new(image.format, image.width, image.height, data))
        });
        frame
    })
}

/// Cross-fade from the a frame to the b frame over the transition window.
struct Dissolve;

impl TransitionProcess for Dissolve {
    fn modality(&self) -> Modality {
        Modality::Video
    }

    fn process(&self, transition: &Transition, a: Frame, b: Frame) -> Frame {
        let mix = transition.progress(&a);
        a.push_get_image(move |f: &Frame, req: &mut ImageRequest| {
            let lower = f.get_image(*req)?;
            let upper = b.get_image(ImageRequest::new(lower.format, lower.width, lower.height))?;
            if upper.data.len() != lower.data.len() {
                return Ok(lower);
            }
            let data = lower
                .data
                .iter()
                .zip(upper.data.iter())
                .map(|(&l, &u)| (f64::from(l) * (1.0 - mix) + f64::from(u) * mix).round() as u8)
                .collect();
            Ok(Image::new(lower.format, lower.width, lower.height, data))
        });
        a
    }
}

fn describe(frame: &Frame) -> String {
    let props = frame.properties();
    let mut label = match props.get_str("meta.label") {
        Some(label) if !frame.is_test_card() => label,
        _ => "blank".to_string(),
    };
    let hide = props.get_int(keys::HIDE);
    if hide != 0 {
        label.push_str(&format!(" (hide {hide})"));
    }
    label
}

fn cmd_inspect(args: InspectArgs) -> anyhow::Result<()> {
    let timeline = load(&args.in_path)?;
    let length = timeline.tractor.producer().get_length();
    println!("length {length}");

    for (index, playlist) in timeline.tracks.iter().enumerate() {
        println!("track {index}: {} entries, length {}", playlist.count(), playlist.producer().get_length());
        for clip in 0..playlist.count() {
            let info = playlist.get_clip_info(clip)?;
            let kind = if playlist.clip_is_mix(clip) {
                "mix".to_string()
            } else if playlist.is_blank(clip) {
                "blank".to_string()
            } else {
                info.producer
                    .properties()
                    .get_str("meta.label")
                    .unwrap_or_else(|| "clip".to_string())
            };
            println!(
                "  {clip:>3} start {:>6} count {:>6} in {:>6} out {:>6} {kind}",
                info.start, info.frame_count, info.frame_in, info.frame_out
            );
        }
    }

    let multitrack = timeline
        .tractor
        .multitrack()
        .context("tractor without a multitrack (bug)")?;
    let mut points = Vec::new();
    for index in 0.. {
        let point = multitrack.clip(Whence::Start, index);
        if points.last() == Some(&point) {
            break;
        }
        points.push(point);
        if point >= length {
            break;
        }
    }
    let points: Vec<String> = points.iter().map(Position::to_string).collect();
    println!("edit points {}", points.join(" "));
    Ok(())
}

fn cmd_harvest(args: HarvestArgs) -> anyhow::Result<()> {
    let timeline = load(&args.in_path)?;
    let producer = timeline.tractor.producer();
    let length = producer.get_length();
    let count = args.count.unwrap_or(length - args.from).max(0);
    let id = timeline.tractor.id();

    producer.seek(args.from);
    for _ in 0..count {
        let frame = producer.get_frame(0);
        let props = frame.properties();
        let mut sources = Vec::new();
        for track in 0.. {
            let Some(pulled) = props.get_frame(&format!("mlt_tractor {id}_{track}")) else {
                break;
            };
            if pulled.properties().flag(keys::LAST_TRACK) {
                break;
            }
            sources.push(format!("t{track} {}", describe(&pulled)));
        }
        println!("{:>6} | {}", frame.position(), sources.join(" | "));
    }
    Ok(())
}

fn cmd_frame(args: FrameArgs) -> anyhow::Result<()> {
    let timeline = load(&args.in_path)?;
    let producer = timeline.tractor.producer();
    let length = producer.get_length();
    anyhow::ensure!(
        (0..length).contains(&args.frame),
        "frame {} is outside the timeline (length {length})",
        args.frame
    );

    let profile = timeline.tractor.service().profile();
    let width = args.width.unwrap_or(profile.width);
    let height = args.height.unwrap_or(profile.height);

    producer.seek(args.frame);
    let frame = producer.get_frame(0);
    let image = frame
        .get_image(ImageRequest::new(ImageFormat::Rgb24, width, height))
        .with_context(|| format!("compose frame {}", args.frame))?;

    if let Some(parent) = args.out.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("create output dir '{}'", parent.display()))?;
    }

    anyhow::ensure!(
        image.format == ImageFormat::Rgb24,
        "frame {} composed as {}, expected rgb24",
        args.frame,
        image.format.name()
    );
    let pixels = image
        .pixels()
        .with_context(|| format!("compose frame {}", args.frame))?;

    image::save_buffer_with_format(
        &args.out,
        pixels,
        image.width,
        image.height,
        image::ColorType::Rgb8,
        image::ImageFormat::Png,
    )
    .with_context(|| format!("write png '{}'", args.out.display()))?;

    eprintln!("wrote {}", args.out.display());
    Ok(())
}
