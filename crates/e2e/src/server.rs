//! Dev server management - attaching to or spawning the editor's dev server

use std::path::PathBuf;
use std::process::{Child, Command, Stdio};
use std::time::Duration;
use tokio::time::sleep;
use tracing::{info, warn};

use crate::error::{E2eError, E2eResult};

/// Handle to the dev server the browser talks to
pub struct DevServer {
    child: Option<Child>,
    url: String,
}

impl DevServer {
    /// Attach to a running server, or spawn one when a command is configured
    pub async fn start(config: ServerConfig) -> E2eResult<Self> {
        let child = match &config.command {
            Some(command) => Some(spawn_command(command, &config)?),
            None => None,
        };

        let server = DevServer {
            child,
            url: config.url.clone(),
        };

        server.wait_until_reachable(config.startup_timeout).await?;

        info!("Dev server is up at {}", server.url);
        Ok(server)
    }

    /// Poll the server URL until it answers
    async fn wait_until_reachable(&self, timeout_duration: Duration) -> E2eResult<()> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(2))
            .build()?;

        let start = std::time::Instant::now();
        let mut attempts = 0;

        loop {
            attempts += 1;

            match client.get(&self.url).send().await {
                Ok(resp) if resp.status().is_success() => {
                    return Ok(());
                }
                Ok(resp) => {
                    warn!("Dev server returned {}", resp.status());
                }
                Err(e) => {
                    if attempts == 1 {
                        info!("Waiting for dev server at {}...", self.url);
                    }
                    // Connection refused is expected while the server is starting
                    if !e.is_connect() {
                        warn!("Dev server check error: {}", e);
                    }
                }
            }

            if start.elapsed() >= timeout_duration {
                break;
            }
            sleep(Duration::from_millis(250)).await;
        }

        Err(E2eError::ServerUnreachable {
            url: self.url.clone(),
            attempts,
        })
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    /// Whether this handle owns the server process
    pub fn is_spawned(&self) -> bool {
        self.child.is_some()
    }

    /// Stop the server if we started it
    pub fn stop(&mut self) -> E2eResult<()> {
        let Some(mut child) = self.child.take() else {
            return Ok(());
        };
        info!("Stopping dev server (pid: {})", child.id());

        // Try graceful shutdown first
        #[cfg(unix)]
        {
            use nix::sys::signal::{kill, Signal};
            use nix::unistd::Pid;

            let pid = Pid::from_raw(child.id() as i32);
            if kill(pid, Signal::SIGTERM).is_ok() {
                std::thread::sleep(Duration::from_millis(500));
            }
        }

        // Force kill if still running
        let _ = child.kill();
        let _ = child.wait();

        Ok(())
    }
}

impl Drop for DevServer {
    fn drop(&mut self) {
        let _ = self.stop();
    }
}

fn spawn_command(command: &str, config: &ServerConfig) -> E2eResult<Child> {
    let mut parts = command.split_whitespace();
    let program = parts
        .next()
        .ok_or_else(|| E2eError::ServerStartup("empty dev server command".to_string()))?;

    info!("Spawning dev server: {} (in {})", command, config.working_dir.display());

    Command::new(program)
        .args(parts)
        .current_dir(&config.working_dir)
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .spawn()
        .map_err(|e| E2eError::ServerStartup(format!("Failed to spawn '{}': {}", command, e)))
}

/// Configuration for the dev server
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// URL the editor is served from
    pub url: String,

    /// Command that starts the server (None = already running)
    pub command: Option<String>,

    /// Directory the command runs in
    pub working_dir: PathBuf,

    /// Timeout for the server to answer
    pub startup_timeout: Duration,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            url: "http://localhost:8080".to_string(),
            command: None,
            working_dir: PathBuf::from("."),
            startup_timeout: Duration::from_secs(30),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_unreachable_server_reports_attempts() {
        // Bind then drop to get a port nothing listens on
        let port = std::net::TcpListener::bind("127.0.0.1:0")
            .unwrap()
            .local_addr()
            .unwrap()
            .port();

        let result = DevServer::start(ServerConfig {
            url: format!("http://127.0.0.1:{}/", port),
            startup_timeout: Duration::from_millis(300),
            ..Default::default()
        })
        .await;

        match result {
            Err(E2eError::ServerUnreachable { attempts, .. }) => assert!(attempts >= 1),
            Err(other) => panic!("unexpected error: {}", other),
            Ok(_) => panic!("nothing should be listening"),
        }
    }

    #[tokio::test]
    async fn test_empty_command_is_rejected() {
        let result = DevServer::start(ServerConfig {
            command: Some("   ".to_string()),
            ..Default::default()
        })
        .await;
        assert!(matches!(result, Err(E2eError::ServerStartup(_))));
    }
}
