// src/scheduler.rs
//
// Drives a Session from a tokio interval. Each tick runs on the blocking
// pool because a Modbus poll waits on the port for up to the port timeout.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};

use crate::io::SessionState;
use crate::sessions::{Session, SessionError};

pub struct SessionRunner {
    session: Arc<Mutex<Session>>,
    cancel: Arc<AtomicBool>,
    task: Option<JoinHandle<()>>,
}

impl SessionRunner {
    pub fn new(session: Session) -> Self {
        let cancel = session.cancel_handle();
        Self {
            session: Arc::new(Mutex::new(session)),
            cancel,
            task: None,
        }
    }

    /// Shared handle for sending data or inspecting state while running.
    pub fn session(&self) -> Arc<Mutex<Session>> {
        self.session.clone()
    }

    /// True while the tick task is alive
    pub fn is_running(&self) -> bool {
        self.task.as_ref().is_some_and(|t| !t.is_finished())
    }

    /// Start the session and spawn the tick task. Must be called from within
    /// a tokio runtime.
    pub fn start(&mut self) -> Result<(), SessionError> {
        let (period, name) = {
            let mut session = self.session.lock().map_err(|_| SessionError::InvalidState {
                operation: "start",
                state: SessionState::Failed,
            })?;
            session.start()?;
            (
                session.config().tick_interval(),
                session.config().port.port_name.clone(),
            )
        };

        let session = self.session.clone();
        let cancel = self.cancel.clone();

        self.task = Some(tokio::spawn(async move {
            let mut timer = interval(period);
            timer.set_missed_tick_behavior(MissedTickBehavior::Delay);

            tlog!("[Runner:{}] Tick task started, every {:?}", name, period);

            loop {
                timer.tick().await;

                if cancel.load(Ordering::Relaxed) {
                    break;
                }

                let session = session.clone();
                let active = tokio::task::spawn_blocking(move || match session.lock() {
                    Ok(mut session) => {
                        session.tick();
                        session.state().is_active()
                    }
                    Err(_) => false,
                })
                .await
                .unwrap_or(false);

                if !active {
                    break;
                }
            }

            tlog!("[Runner:{}] Tick task finished", name);
        }));

        Ok(())
    }

    /// Send user data from async code. The session lock can be held by a tick
    /// waiting on the port, so it is taken on the blocking pool.
    pub async fn send(&self, text: &str) -> Result<(), SessionError> {
        let session = self.session.clone();
        let text = text.to_string();
        tokio::task::spawn_blocking(move || match session.lock() {
            Ok(mut session) => session.send(&text),
            Err(_) => Err(SessionError::InvalidState {
                operation: "send",
                state: SessionState::Failed,
            }),
        })
        .await
        .unwrap_or(Err(SessionError::InvalidState {
            operation: "send",
            state: SessionState::Failed,
        }))
    }

    /// Current session state, read on the blocking pool. A poisoned lock
    /// reads as Failed.
    pub async fn state(&self) -> SessionState {
        let session = self.session.clone();
        tokio::task::spawn_blocking(move || {
            session
                .lock()
                .map(|s| s.state())
                .unwrap_or(SessionState::Failed)
        })
        .await
        .unwrap_or(SessionState::Failed)
    }

    /// Abort any waiting poll, wait for the tick task, then stop the session.
    pub async fn stop(&mut self) {
        self.cancel.store(true, Ordering::SeqCst);

        if let Some(task) = self.task.take() {
            let _ = task.await;
        }

        let session = self.session.clone();
        let _ = tokio::task::spawn_blocking(move || {
            if let Ok(mut session) = session.lock() {
                session.stop();
            }
        })
        .await;
    }
}
