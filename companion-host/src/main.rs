//! Native-messaging host: reads framed requests from the browser on stdin,
//! drives the download engine, and pumps events back out on stdout.
//!
//! stdout belongs to the extension; all logging goes to stderr.

use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use futures::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tokio_util::codec::{FramedRead, FramedWrite};
use tracing::{debug, error, info, warn};
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

use downloader::{
    EncoderAdapter, EngineConfig, EventSinks, HelperConfig, HttpFetcher, Scheduler,
};
use nm_codec::{Frame, Message, NativeMessageCodec};

const VERSION: &str = env!("CARGO_PKG_VERSION");

#[derive(Debug, Parser)]
#[command(name = "companion-host", version, about = "Companion download host")]
struct Args {
    /// Directory finished downloads land in. Defaults to the user's
    /// download directory.
    #[arg(long)]
    download_dir: Option<PathBuf>,

    /// Maximum simultaneously active downloads.
    #[arg(long, default_value_t = 3)]
    max_concurrent: usize,

    /// Explicit encoder binary, probed before the standard locations.
    #[arg(long)]
    ffmpeg: Option<PathBuf>,

    /// External extractor for delegated downloads.
    #[arg(long, default_value = "yt-dlp")]
    ytdlp: PathBuf,

    #[arg(short, long)]
    verbose: bool,

    /// The browser passes its extension origin (and on Windows a window
    /// handle) as positional arguments; accept and ignore them.
    #[arg(hide = true, trailing_var_arg = true)]
    origin: Vec<String>,
}

#[tokio::main]
async fn main() {
    let args = Args::parse();
    init_logging(args.verbose);

    if let Err(e) = run(args).await {
        error!("host terminated: {e}");
        std::process::exit(1);
    }
}

fn init_logging(verbose: bool) {
    let filter = if verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };
    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(std::io::stderr).with_target(false))
        .init();
}

async fn run(args: Args) -> Result<(), Box<dyn std::error::Error>> {
    let download_dir = args
        .download_dir
        .or_else(dirs::download_dir)
        .unwrap_or_else(|| PathBuf::from("."));
    tokio::fs::create_dir_all(&download_dir).await?;
    info!(download_dir = %download_dir.display(), version = VERSION, "companion host starting");

    let encoder = EncoderAdapter::discover(args.ffmpeg.as_deref())
        .await
        .map(Arc::new);
    let encoder_available = encoder.is_some();

    // Single writer task: everything that goes to the extension funnels
    // through this channel, keeping frames whole on the wire.
    let (tx, mut rx) = mpsc::unbounded_channel::<Message>();
    let writer = tokio::spawn(async move {
        let mut framed = FramedWrite::new(tokio::io::stdout(), NativeMessageCodec::default());
        while let Some(message) = rx.recv().await {
            if let Err(e) = framed.send(message).await {
                error!("failed to write frame: {e}");
                break;
            }
        }
    });

    let config = EngineConfig::new(&download_dir)
        .with_max_concurrent(args.max_concurrent)
        .with_helper(HelperConfig::new(args.ytdlp));
    let fetcher = Arc::new(HttpFetcher::new(&config.http)?);
    let sinks = {
        let progress_tx = tx.clone();
        let complete_tx = tx.clone();
        let error_tx = tx.clone();
        EventSinks::new(
            Arc::new(move |id, progress, status| {
                let _ = progress_tx.send(Message::progress(id, progress.clone(), status));
            }),
            Arc::new(move |id, path| {
                let _ = complete_tx.send(Message::complete(id, path.display().to_string()));
            }),
            Arc::new(move |id, err| {
                let _ = error_tx.send(Message::error(id, err.to_string()));
            }),
        )
    };
    let scheduler = Scheduler::new(config, fetcher, encoder, sinks);

    let _ = tx.send(Message::app_status(encoder_available, VERSION));

    let mut frames = FramedRead::new(tokio::io::stdin(), NativeMessageCodec::default());
    while let Some(frame) = frames.next().await {
        match frame {
            Ok(Frame::Message(message)) => handle_message(*message, &scheduler, &tx),
            Ok(Frame::Malformed { len, reason }) => {
                warn!(len, reason, "malformed frame from extension");
            }
            Err(e) => {
                error!("transport read error: {e}");
                break;
            }
        }
    }

    info!("extension closed the pipe, shutting down");
    drop(tx);
    let _ = writer.await;
    Ok(())
}

fn handle_message(
    message: Message,
    scheduler: &Arc<Scheduler>,
    tx: &mpsc::UnboundedSender<Message>,
) {
    match message {
        Message::Ping { .. } => {
            let _ = tx.send(Message::pong(VERSION));
        }
        Message::DownloadRequest {
            stream,
            quality,
            audio,
            output_dir,
            ..
        } => {
            let id = scheduler.start_download_to(
                stream,
                quality,
                audio,
                output_dir.map(PathBuf::from),
            );
            debug!(job_id = %id, "download request accepted");
        }
        Message::DownloadCancel { job_id, .. } => scheduler.cancel_download(&job_id),
        Message::GetDownloads { .. } => {
            let _ = tx.send(Message::downloads_list(scheduler.get_downloads()));
        }
        Message::StreamDetected { stream, .. } => {
            // Detection is extension-side state; the host just acknowledges
            // it in the log for diagnostics.
            debug!(stream_id = %stream.id, stream_type = ?stream.stream_type, "stream detected");
        }
        other => {
            debug!(message_type = ?other, "ignoring host-bound message");
        }
    }
}
