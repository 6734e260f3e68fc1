use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use tracing::{info, warn};
use walkmat_session::{MultiPortSession, SessionConfig};
use walkmat_transport::ReplayOpener;

use crate::cmd::config::{apply_overrides, build_session_config};
use crate::cmd::{parse_duration, CaptureArgs};
use crate::exit::{session_error, CliError, CliResult, INTERNAL, SUCCESS, TRANSPORT_ERROR};
use crate::output::{print_combined, print_device_status, OutputFormat};

const RECV_POLL: Duration = Duration::from_millis(100);

pub fn run(args: CaptureArgs, format: OutputFormat) -> CliResult<i32> {
    let deadline = match &args.duration {
        Some(raw) => Some(Instant::now() + parse_duration(raw)?),
        None => None,
    };
    let config = load_config(&args)?;

    let mut session = if args.replay {
        MultiPortSession::new(config, ReplayOpener::default())
    } else {
        MultiPortSession::serial(config)
    };

    let running = Arc::new(AtomicBool::new(true));
    install_ctrlc_handler(running.clone())?;

    session
        .connect()
        .map_err(|err| session_error("connect failed", err))?;
    info!(
        mode = %session.config().mode,
        ports = session.config().ports.len(),
        "capture started"
    );

    let mut printed = 0u64;
    let mut link_lost = false;
    let mut code = SUCCESS;

    while running.load(Ordering::SeqCst) {
        if args.count.is_some_and(|count| printed >= count) {
            break;
        }
        if deadline.is_some_and(|d| Instant::now() >= d) {
            break;
        }

        match session.recv_timeout(RECV_POLL) {
            Ok(Some(frame)) => {
                print_combined(&frame, format, args.hex);
                printed += 1;
            }
            Ok(None) if !session.is_connected() => {
                // One more empty poll after the link drops lets the merger
                // flush the round it was working on.
                if link_lost {
                    if !args.replay {
                        warn!("sensor link lost");
                        code = TRANSPORT_ERROR;
                    }
                    break;
                }
                link_lost = true;
            }
            Ok(None) => {}
            Err(err) => {
                session.disconnect();
                return Err(session_error("capture failed", err));
            }
        }
    }

    let status = session.device_status();
    let dropped = session.frames_dropped();
    session.disconnect();
    info!(frames = printed, dropped, "capture finished");

    if matches!(format, OutputFormat::Table | OutputFormat::Pretty) {
        print_device_status(&status, format);
    }

    Ok(code)
}

fn load_config(args: &CaptureArgs) -> CliResult<SessionConfig> {
    let Some(path) = &args.config else {
        return build_session_config(&args.session);
    };

    let mut config = SessionConfig::load(path)
        .map_err(|err| session_error(&format!("config {}", path.display()), err))?;
    if let Some(mode) = args.session.mode {
        config.mode = mode;
        config.array_size = config.expected_array_size();
    }
    apply_overrides(&mut config, &args.session);
    config
        .validate()
        .map_err(|err| session_error("invalid session", err))?;
    Ok(config)
}

fn install_ctrlc_handler(running: Arc<AtomicBool>) -> CliResult<()> {
    ctrlc::set_handler(move || {
        running.store(false, Ordering::SeqCst);
    })
    .map_err(|err| CliError::new(INTERNAL, format!("signal handler setup failed: {err}")))
}
