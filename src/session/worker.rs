//! The task that runs one session.

use std::sync::{Arc, Mutex};

use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::sync::broadcast::error::RecvError;
use tokio::sync::{broadcast, mpsc, watch};
use tracing::{debug, info, warn};

use super::SessionStatus;
use crate::dispatch::{Control, Dispatcher};
use crate::host::HostEvent;

/// Read lines from `input` and evaluate them until the stream ends, `quit`
/// is entered, or the session is shut down.
///
/// Host events and control messages are handled between lines. Lines are
/// evaluated strictly in order. `finished` is set once the session is closed.
pub(crate) async fn run(
    mut dispatcher: Dispatcher,
    input: Box<dyn AsyncRead + Unpin + Send>,
    mut control: mpsc::UnboundedReceiver<Control>,
    events: broadcast::Receiver<HostEvent>,
    status: Arc<Mutex<SessionStatus>>,
    finished: watch::Sender<bool>,
) {
    let id = dispatcher.context().id().clone();
    let mut lines = BufReader::new(input).lines();
    let mut events = Some(events);

    loop {
        tokio::select! {
            biased;

            event = next_event(&mut events) => dispatcher.on_host_event(&event),

            Some(message) = control.recv() => {
                if !dispatcher.on_control(message) {
                    debug!("Session {} shut down", id);
                    break;
                }
            }

            line = lines.next_line() => match line {
                Ok(Some(line)) => {
                    dispatcher.evaluate(&line).await;
                    if dispatcher.close_requested() {
                        info!("Session {} quit", id);
                        break;
                    }
                }
                Ok(None) => {
                    info!("Session {} input closed", id);
                    break;
                }
                Err(e) => {
                    warn!("Session {} input failed: {}", id, e);
                    break;
                }
            },
        }
    }

    {
        let mut status = status.lock().unwrap_or_else(|e| e.into_inner());
        if let Err(e) = status.transition_to(id.as_str(), SessionStatus::Closed) {
            debug!("{}", e);
        }
    }
    drop(dispatcher);
    finished.send_replace(true);
}

/// The next host event, or pending forever once the channel has closed.
async fn next_event(events: &mut Option<broadcast::Receiver<HostEvent>>) -> HostEvent {
    loop {
        let Some(rx) = events.as_mut() else {
            return std::future::pending().await;
        };
        match rx.recv().await {
            Ok(event) => return event,
            Err(RecvError::Lagged(skipped)) => {
                warn!("Skipped {} host events", skipped);
            }
            Err(RecvError::Closed) => *events = None,
        }
    }
}
