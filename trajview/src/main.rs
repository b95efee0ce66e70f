//! Trajview Playback CLI
//!
//! Replay recorded trajectories from a dataset file, on screen or
//! into a video file.

use std::path::PathBuf;

use clap::Parser;
use tracing::{error, Level};
use tracing_subscriber::FmtSubscriber;
use trajview::{playback_dataset, Collaborators, PlaybackOptions};
use trajview_env::JsonDataset;

#[derive(Parser, Debug)]
#[command(name = "trajview")]
#[command(about = "Replay recorded trajectories as video or on screen", long_about = None)]
struct Args {
    /// Path to the dataset file
    #[arg(long)]
    dataset: PathBuf,

    /// Only replay the episode subset registered under this filter key
    #[arg(long)]
    filter_key: Option<String>,

    /// Stop after this many episodes
    #[arg(short = 'n', long = "count")]
    n: Option<usize>,

    /// Replay recorded observations instead of simulating
    #[arg(long)]
    use_obs: bool,

    /// Replay recorded actions open-loop instead of loading states
    #[arg(long)]
    use_actions: bool,

    /// Render playback to the on-screen viewer
    #[arg(long)]
    render: bool,

    /// Write playback frames to this video file
    #[arg(long)]
    video_path: Option<PathBuf>,

    /// Write one frame every this many steps
    #[arg(long, default_value = "5")]
    video_skip: usize,

    /// Camera/sensor names to render, left to right
    #[arg(long, num_args = 1..)]
    render_image_names: Option<Vec<String>>,

    /// Only show the initial frame of each episode
    #[arg(long)]
    first: bool,

    /// Verbose output
    #[arg(short, long)]
    verbose: bool,
}

fn main() {
    let args = Args::parse();

    let level = if args.verbose { Level::DEBUG } else { Level::INFO };
    let subscriber = FmtSubscriber::builder().with_max_level(level).finish();
    tracing::subscriber::set_global_default(subscriber)
        .expect("Failed to set tracing subscriber");

    let dataset = match JsonDataset::open(&args.dataset) {
        Ok(dataset) => dataset,
        Err(e) => {
            error!("failed to open dataset {}: {}", args.dataset.display(), e);
            std::process::exit(1);
        }
    };

    let opts = PlaybackOptions {
        filter_key: args.filter_key,
        count: args.n,
        use_obs: args.use_obs,
        use_actions: args.use_actions,
        render: args.render,
        video_path: args.video_path,
        video_skip: args.video_skip,
        image_names: args.render_image_names,
        first: args.first,
    };

    match playback_dataset(&dataset, &Collaborators::default(), &opts) {
        Ok(summary) => match serde_json::to_string_pretty(&summary) {
            Ok(json) => println!("{}", json),
            Err(e) => error!("failed to serialize run summary: {}", e),
        },
        Err(e) => {
            error!("playback failed: {}", e);
            std::process::exit(1);
        }
    }
}
