use std::time::Duration;

use tokio::process::{Child, Command};
use tokio_util::sync::CancellationToken;

use crate::config::ModelHostConfig;
use crate::events::EventBus;

const SUPERVISE_INTERVAL: Duration = Duration::from_secs(10);
const RESTART_COOLDOWN: Duration = Duration::from_secs(60);
const MAX_RESTART_ATTEMPTS: u32 = 5;
const MAX_BACKOFF: Duration = Duration::from_secs(300);

/// Restart bookkeeping for the supervised child. Rapid restarts (within
/// the cooldown) count up; past the attempt budget the next start backs
/// off exponentially. A run stable for twice the cooldown resets the
/// counter.
#[derive(Debug)]
struct RestartPolicy {
    attempts: u32,
    last_start: Option<std::time::Instant>,
}

impl RestartPolicy {
    fn new() -> Self {
        Self {
            attempts: 0,
            last_start: None,
        }
    }

    /// Delay to wait before the next start, given the restart history.
    fn next_delay(&mut self) -> Duration {
        if let Some(last_start) = self.last_start {
            let elapsed = last_start.elapsed();
            if elapsed >= RESTART_COOLDOWN * 2 {
                self.attempts = 0;
            } else if elapsed < RESTART_COOLDOWN {
                self.attempts += 1;
            }
        }

        if self.attempts > MAX_RESTART_ATTEMPTS {
            let exponent = self.attempts.saturating_sub(MAX_RESTART_ATTEMPTS - 1).min(16);
            let backoff = Duration::from_secs(2u64.saturating_pow(exponent));
            backoff.min(MAX_BACKOFF)
        } else {
            Duration::ZERO
        }
    }

    fn record_start(&mut self) {
        self.last_start = Some(std::time::Instant::now());
    }
}

/// Supervisor for the optional local model server (an OpenAI-shape child
/// process on a fixed port). Every 10 s: if the server should be running
/// and its port is free, (re)start it, subject to the restart policy.
pub struct ModelHostSupervisor {
    config: ModelHostConfig,
    events: EventBus,
}

impl ModelHostSupervisor {
    pub fn new(config: ModelHostConfig, events: EventBus) -> Self {
        Self { config, events }
    }

    pub fn spawn(self, cancel: CancellationToken) -> tokio::task::JoinHandle<()> {
        tokio::spawn(async move {
            if !self.config.enabled || self.config.command.is_none() {
                tracing::info!("Model host disabled");
                return;
            }

            tracing::info!(port = self.config.port, "Model host supervisor started");
            let mut policy = RestartPolicy::new();
            let mut child: Option<Child> = None;

            loop {
                tokio::select! {
                    _ = cancel.cancelled() => {
                        if let Some(mut running) = child.take() {
                            if let Err(error) = running.kill().await {
                                tracing::warn!(error = %error, "Failed to kill model host child");
                            } else {
                                tracing::info!("Model host child terminated");
                            }
                        }
                        break;
                    }
                    _ = tokio::time::sleep(SUPERVISE_INTERVAL) => {}
                }

                // Reap a child that exited on its own.
                if let Some(running) = child.as_mut() {
                    match running.try_wait() {
                        Ok(Some(status)) => {
                            tracing::warn!(%status, "Model host child exited");
                            child = None;
                        }
                        Ok(None) => {}
                        Err(error) => {
                            tracing::warn!(error = %error, "Failed to poll model host child");
                        }
                    }
                }

                if port_in_use(self.config.port).await {
                    continue;
                }

                let delay = policy.next_delay();
                if delay > Duration::ZERO {
                    tracing::warn!(
                        backoff_secs = delay.as_secs(),
                        "Model host restarting too fast, backing off"
                    );
                    tokio::select! {
                        _ = cancel.cancelled() => continue,
                        _ = tokio::time::sleep(delay) => {}
                    }
                }

                match self.start_child() {
                    Ok(started) => {
                        policy.record_start();
                        child = Some(started);
                        self.events
                            .system_status("model-host-started", "local model server launched");
                    }
                    Err(error) => {
                        tracing::error!(error = %error, "Failed to start model host child");
                        self.events.error_occurred(
                            "model_host_start_failed",
                            &error.to_string(),
                            serde_json::json!({ "port": self.config.port }),
                        );
                    }
                }
            }
        })
    }

    fn start_child(&self) -> std::io::Result<Child> {
        let command_line = self
            .config
            .command
            .as_deref()
            .expect("caller checked command presence");
        let mut parts = command_line.split_whitespace();
        let program = parts.next().unwrap_or(command_line);

        let mut command = Command::new(program);
        command
            .args(parts)
            .arg("--port")
            .arg(self.config.port.to_string())
            .stdin(std::process::Stdio::null())
            .stdout(std::process::Stdio::null())
            .stderr(std::process::Stdio::inherit())
            .kill_on_drop(true);
        if let Some(hf_endpoint) = &self.config.hf_endpoint {
            command.env("HF_ENDPOINT", hf_endpoint);
        }

        let child = command.spawn()?;
        tracing::info!(pid = child.id(), port = self.config.port, "Spawned model host child");
        Ok(child)
    }
}

async fn port_in_use(port: u16) -> bool {
    tokio::time::timeout(
        Duration::from_secs(1),
        tokio::net::TcpStream::connect(("127.0.0.1", port)),
    )
    .await
    .map(|result| result.is_ok())
    .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_starts_have_no_delay() {
        let mut policy = RestartPolicy::new();
        assert_eq!(policy.next_delay(), Duration::ZERO);
        policy.record_start();
    }

    #[test]
    fn rapid_restarts_eventually_back_off() {
        let mut policy = RestartPolicy::new();
        let mut delayed = false;
        for _ in 0..10 {
            let delay = policy.next_delay();
            policy.record_start();
            if delay > Duration::ZERO {
                delayed = true;
                assert!(delay <= MAX_BACKOFF);
            }
        }
        assert!(delayed, "expected backoff after repeated rapid restarts");
    }

    #[test]
    fn backoff_is_capped() {
        let mut policy = RestartPolicy::new();
        policy.attempts = 40;
        policy.last_start = Some(std::time::Instant::now());
        let delay = policy.next_delay();
        assert!(delay <= MAX_BACKOFF);
    }
}
