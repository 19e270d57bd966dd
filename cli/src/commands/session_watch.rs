//! Live view of a running session and its Ctrl-C handling.

use indicatif::ProgressBar;
use outpost_common::{SessionEvent, StageName};
use tokio::sync::mpsc::UnboundedReceiver;
use tracing::warn;

use crate::app::AppContext;
use crate::application::CancelToken;
use crate::output::{Renderer, progress};

/// Render events until the session finishes. The first Ctrl-C requests a
/// cancellation at the next stage boundary, the second abandons the session.
pub(super) async fn observe(
    app: &AppContext,
    renderer: &Renderer<'_>,
    mut events: UnboundedReceiver<SessionEvent>,
    cancel: &CancelToken,
    abandon: &CancelToken,
) {
    let pb = app
        .show_progress()
        .then(|| progress::spinner(&format!("{}...", StageName::Connecting.label())));
    let mut watch_signals = true;

    loop {
        tokio::select! {
            event = events.recv() => {
                let Some(event) = event else { break };
                with_spinner(pb.as_ref(), || {
                    if let Err(e) = renderer.render_event(&event) {
                        warn!(error = %e, "could not render event");
                    }
                });
                match &event {
                    SessionEvent::Stage { stage, .. } => {
                        if let (Some(pb), Some(next)) = (&pb, stage.next()) {
                            pb.set_message(format!("{}...", next.label()));
                        }
                    }
                    SessionEvent::Finished { status, .. } => {
                        if let Some(pb) = &pb {
                            if status.is_success() {
                                progress::finish_ok(pb, "All stages finished");
                            } else {
                                progress::finish_error(pb, "Session stopped");
                            }
                        }
                        break;
                    }
                }
            }
            signal = tokio::signal::ctrl_c(), if watch_signals => {
                match signal {
                    Ok(()) if cancel.is_cancelled() => {
                        watch_signals = false;
                        if let Some(pb) = &pb {
                            progress::finish_error(pb, "Session interrupted");
                        }
                        app.output.warn("Stopping now; the current step did not finish.");
                        abandon.cancel();
                    }
                    Ok(()) => {
                        cancel.cancel();
                        with_spinner(pb.as_ref(), || {
                            app.output.warn(
                                "Cancelling after the current step... (Ctrl-C again to stop now)",
                            );
                        });
                    }
                    Err(e) => {
                        warn!(error = %e, "cannot listen for Ctrl-C");
                        watch_signals = false;
                    }
                }
            }
        }
    }
}

fn with_spinner(pb: Option<&ProgressBar>, print: impl FnOnce()) {
    match pb {
        Some(pb) => pb.suspend(print),
        None => print(),
    }
}
