mod demo;

use anyhow::{Context, Result, anyhow, bail};
use demo::DemoEstimator;
use pose_pipeline::{
    ConsoleDisplay, ControlCommand, ControlInterpreter, FeedbackBus, FrameDisplay, FrameHeader,
    GoalHandler, GoalId, GoalRequest, ImageMessage, Orchestrator, PipelineConfig, RunStatus,
    SharedState, SnapshotDisplay, StreamHandler,
};
use std::env;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::thread;
use std::time::Duration;
use tokio::sync::broadcast::error::RecvError;
use tracing_subscriber::EnvFilter;

const USAGE: &str =
    "Usage: pose_runner <frames_dir> [--config <file>] [--goal <image>] [--out <dir>] [--fps <n>]";

struct Args {
    frames_dir: PathBuf,
    config: Option<PathBuf>,
    goal: Option<PathBuf>,
    out: Option<PathBuf>,
    /// Delay between fed frames.
    period: Duration,
}

impl Args {
    fn parse(mut raw: impl Iterator<Item = String>) -> Result<Option<Self>> {
        let mut frames_dir = None;
        let mut args = Args {
            frames_dir: PathBuf::new(),
            config: None,
            goal: None,
            out: None,
            period: Duration::from_secs_f64(1.0 / 15.0),
        };
        while let Some(arg) = raw.next() {
            let mut value = |flag: &str| raw.next().with_context(|| format!("{flag} needs a value"));
            match arg.as_str() {
                "-h" | "--help" => return Ok(None),
                "--config" => args.config = Some(value("--config")?.into()),
                "--goal" => args.goal = Some(value("--goal")?.into()),
                "--out" => args.out = Some(value("--out")?.into()),
                "--fps" => {
                    let fps: f64 = value("--fps")?.parse().context("--fps must be a number")?;
                    if fps.is_nan() || fps <= 0.0 {
                        bail!("--fps must be positive");
                    }
                    args.period = Duration::try_from_secs_f64(1.0 / fps)
                        .with_context(|| format!("--fps {fps} is too low"))?;
                }
                flag if flag.starts_with("--") => bail!("unknown option {flag}"),
                _ if frames_dir.is_none() => frames_dir = Some(PathBuf::from(&arg)),
                _ => bail!("unexpected argument {arg}"),
            }
        }
        let Some(frames_dir) = frames_dir else {
            return Ok(None);
        };
        args.frames_dir = frames_dir;
        Ok(Some(args))
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // --- 1. Logging & Argument Parsing ---
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    let Some(args) = Args::parse(env::args().skip(1))? else {
        println!("{USAGE}");
        return Ok(());
    };

    let mut config = match &args.config {
        Some(path) => PipelineConfig::from_file(path)?,
        None => PipelineConfig::load()?,
    };
    if let Some(out) = &args.out {
        config.display.snapshot_dir = Some(out.clone());
    }

    let frames = list_frames(&args.frames_dir)?;
    if frames.is_empty() {
        bail!("no png or jpeg frames found in {}", args.frames_dir.display());
    }
    tracing::info!(count = frames.len(), dir = %args.frames_dir.display(), "frames found");

    // --- 2. Pipeline Initialization ---
    let shared = SharedState::new(config.pipeline.start_armed);
    let bus = FeedbackBus::new(config.feedback.capacity);
    let display: Box<dyn FrameDisplay> = match &config.display.snapshot_dir {
        Some(dir) => Box::new(
            SnapshotDisplay::new(dir, config.display.snapshot_every)
                .with_context(|| format!("cannot create {}", dir.display()))?,
        ),
        None => Box::new(ConsoleDisplay::new(config.display.console_output)),
    };
    let orchestrator = Orchestrator::new(
        config.clone(),
        shared.clone(),
        Box::new(DemoEstimator::new()),
        bus.clone(),
    )?
    .with_display(display);

    let control = ControlInterpreter::new(
        shared.clone(),
        config.control.target.clone(),
        config.control.stop_match,
    );
    control.handle(&ControlCommand::new(&config.control.target, "estimate", ""));

    // --- 3. Outputs ---
    let printer = spawn_printer(&bus);
    drop(bus);

    let handle = orchestrator.handle();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("interrupt received, finishing in-flight work");
            handle.shutdown();
        }
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("second interrupt, aborting");
            handle.abort();
        }
    });

    // --- 4. Inputs ---
    if let Some(path) = &args.goal {
        let goals = GoalHandler::new(shared.clone());
        let image = read_message(path, 0)?;
        goals
            .on_goal(GoalRequest {
                id: GoalId::from("cli-goal"),
                image,
            })
            .with_context(|| format!("goal image {} rejected", path.display()))?;
    }
    let feeder = spawn_feeder(
        StreamHandler::new(shared.clone()),
        shared.status.clone(),
        frames,
        args.period,
    );

    // --- 5. Main Loop ---
    let summary = orchestrator.run().await?;
    shared.status.stop();
    let fed = feeder.join().map_err(|_| anyhow!("frame feeder panicked"))?;
    printer.await.context("feedback printer failed")?;

    tracing::info!(
        fed,
        iterations = summary.iterations,
        stop = ?summary.stop,
        "processing complete"
    );
    Ok(())
}

fn list_frames(dir: &Path) -> Result<Vec<PathBuf>> {
    let mut frames = Vec::new();
    for entry in std::fs::read_dir(dir).with_context(|| format!("cannot read {}", dir.display()))? {
        let path = entry?.path();
        if encoding_for(&path).is_some() {
            frames.push(path);
        }
    }
    frames.sort();
    Ok(frames)
}

fn encoding_for(path: &Path) -> Option<&'static str> {
    match image::ImageFormat::from_path(path).ok()? {
        image::ImageFormat::Png => Some("png"),
        image::ImageFormat::Jpeg => Some("jpeg"),
        _ => None,
    }
}

fn read_message(path: &Path, seq: u64) -> Result<ImageMessage> {
    let encoding = encoding_for(path).with_context(|| format!("{} is not png or jpeg", path.display()))?;
    let data = std::fs::read(path).with_context(|| format!("cannot read {}", path.display()))?;
    Ok(ImageMessage {
        header: FrameHeader::new(seq, path.display().to_string()),
        width: 0,
        height: 0,
        encoding: encoding.to_string(),
        step: 0,
        data,
    })
}

/// Plays the frames into the stream handler at a fixed rate, then lets the
/// pipeline drain the last frames before clearing `running`.
fn spawn_feeder(
    stream: StreamHandler,
    status: Arc<RunStatus>,
    frames: Vec<PathBuf>,
    period: Duration,
) -> thread::JoinHandle<usize> {
    thread::spawn(move || {
        let mut fed = 0;
        for (i, path) in frames.iter().enumerate() {
            if !status.is_running() {
                break;
            }
            match read_message(path, i as u64 + 1) {
                Ok(msg) => {
                    if stream.on_frame(&msg) {
                        fed += 1;
                    }
                }
                Err(err) => tracing::warn!(%err, "skipping frame"),
            }
            thread::sleep(period);
        }
        thread::sleep(period.saturating_mul(3));
        status.stop();
        fed
    })
}

/// Prints feedback and goal results as JSON lines on stdout.
fn spawn_printer(bus: &FeedbackBus) -> tokio::task::JoinHandle<()> {
    let mut feedback = bus.feedback_tx.subscribe();
    let mut goals = bus.goals_tx.subscribe();
    tokio::spawn(async move {
        loop {
            let line = tokio::select! {
                msg = feedback.recv() => match msg {
                    Ok(fb) => serde_json::json!({ "feedback": fb }),
                    Err(RecvError::Lagged(skipped)) => {
                        tracing::warn!(skipped, "feedback printer lagging");
                        continue;
                    }
                    Err(RecvError::Closed) => break,
                },
                msg = goals.recv() => match msg {
                    Ok(result) => serde_json::json!({ "goal_result": result }),
                    Err(RecvError::Lagged(skipped)) => {
                        tracing::warn!(skipped, "goal printer lagging");
                        continue;
                    }
                    Err(RecvError::Closed) => break,
                },
            };
            println!("{line}");
        }
    })
}
