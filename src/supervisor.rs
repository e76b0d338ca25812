//! Lifecycle of the external lighting server process.
//!
//! The supervisor launches the server as a detached child, polls its network
//! endpoint with a bounded [`RetryPolicy`], and can kill and relaunch it.
//! It never retries indefinitely: the caller decides what an exhausted retry
//! means.

use std::{process::Stdio, time::Duration};

use async_trait::async_trait;
use log::{debug, error, info, warn};
use tokio::process::{Child, Command};

use crate::{
    config::ServerCfg,
    drivers::openrgb::device_io,
    error::{Result, RgbError},
    gateway::Endpoint,
    retry::RetryPolicy,
};

/// Supervisor's view of the lighting server.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServerState {
    NotStarted,
    Starting,
    Healthy,
    Unreachable,
}

/// What the control loop may ask of the server supervisor.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ServerControl: Send {
    /// Launches the server if it is not reachable and waits for it.
    ///
    /// One probe runs before launching so a server that is already up is
    /// left alone. After a launch the server gets `startup_attempts` further
    /// probes, so a server that never comes up is probed
    /// `1 + startup_attempts` times. Returns false once those are exhausted.
    async fn ensure_running(&mut self) -> bool;

    /// Best-effort terminate followed by [`ServerControl::ensure_running`].
    async fn restart(&mut self) -> bool;

    fn state(&self) -> ServerState;
}

/// Starts and stops the server process.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ServerProcess: Send {
    async fn launch(&mut self) -> Result<()>;
    async fn terminate(&mut self) -> Result<()>;
}

/// Cheap check that the server accepts connections.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ReachabilityProbe: Send + Sync {
    async fn probe(&self) -> Result<()>;
}

/// Server launched from a configured command line.
///
/// The child is not killed on drop, so the server keeps running after the
/// daemon exits.
#[derive(Debug)]
pub struct CommandServer {
    program: String,
    args: Vec<String>,
    process_name: String,
    child: Option<Child>,
}

impl CommandServer {
    pub fn from_cfg(cfg: &ServerCfg) -> Self {
        Self {
            program: cfg.program.clone(),
            args: cfg.args.clone(),
            process_name: cfg.process_name.clone(),
            child: None,
        }
    }

    fn reap(&mut self) {
        if let Some(child) = self.child.as_mut() {
            if let Ok(Some(status)) = child.try_wait() {
                debug!("Previous server process exited with {status}");
                self.child = None;
            }
        }
    }
}

#[async_trait]
impl ServerProcess for CommandServer {
    async fn launch(&mut self) -> Result<()> {
        self.reap();

        let mut cmd = Command::new(&self.program);
        cmd.args(&self.args)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null());
        #[cfg(unix)]
        cmd.process_group(0);

        let child = cmd.spawn().map_err(|e| {
            RgbError::ServerLifecycle(format!("failed to launch {}: {e}", self.program))
        })?;
        info!(
            "Launched {} (pid {})",
            self.program,
            child.id().map_or_else(|| "?".to_string(), |id| id.to_string())
        );
        self.child = Some(child);
        Ok(())
    }

    async fn terminate(&mut self) -> Result<()> {
        if let Some(mut child) = self.child.take() {
            if let Err(e) = child.kill().await {
                warn!("Failed to kill server child process: {e}");
            }
        }

        // The server may have been started by someone else.
        let status = Command::new("pkill")
            .arg("-f")
            .arg(&self.process_name)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()
            .await
            .map_err(|e| RgbError::ServerLifecycle(format!("pkill failed to run: {e}")))?;

        match status.code() {
            Some(0) => info!("Terminated processes matching '{}'", self.process_name),
            Some(1) => debug!("No process matching '{}'", self.process_name),
            _ => {
                return Err(RgbError::ServerLifecycle(format!(
                    "pkill -f {} exited with {status}",
                    self.process_name
                )));
            }
        }
        Ok(())
    }
}

/// Probes reachability with a plain TCP connect.
#[derive(Debug, Clone)]
pub struct TcpProbe {
    endpoint: Endpoint,
    timeout: Duration,
}

impl TcpProbe {
    pub fn new(endpoint: Endpoint, timeout: Duration) -> Self {
        Self { endpoint, timeout }
    }
}

#[async_trait]
impl ReachabilityProbe for TcpProbe {
    async fn probe(&self) -> Result<()> {
        device_io::connect(&self.endpoint, self.timeout)
            .await
            .map(drop)
    }
}

pub struct ServerSupervisor {
    process: Box<dyn ServerProcess>,
    probe: Box<dyn ReachabilityProbe>,
    policy: RetryPolicy,
    state: ServerState,
}

impl ServerSupervisor {
    pub fn new(
        process: Box<dyn ServerProcess>,
        probe: Box<dyn ReachabilityProbe>,
        policy: RetryPolicy,
    ) -> Self {
        Self {
            process,
            probe,
            policy,
            state: ServerState::NotStarted,
        }
    }

    pub fn from_cfg(cfg: &ServerCfg) -> Self {
        let endpoint = Endpoint::new(cfg.host.clone(), cfg.port);
        let timeout = Duration::from_millis(cfg.io_timeout_ms);
        Self::new(
            Box::new(CommandServer::from_cfg(cfg)),
            Box::new(TcpProbe::new(endpoint, timeout)),
            RetryPolicy::from_cfg(cfg),
        )
    }
}

#[async_trait]
impl ServerControl for ServerSupervisor {
    async fn ensure_running(&mut self) -> bool {
        if self.probe.probe().await.is_ok() {
            debug!("OpenRGB server already reachable");
            self.state = ServerState::Healthy;
            return true;
        }

        self.state = ServerState::Starting;
        info!("Starting OpenRGB server...");
        if let Err(e) = self.process.launch().await {
            error!("Failed to start OpenRGB server: {e}");
            self.state = ServerState::Unreachable;
            return false;
        }

        let probe = &self.probe;
        match self.policy.run("OpenRGB server", |_| probe.probe()).await {
            Ok(()) => {
                info!("OpenRGB server started successfully");
                self.state = ServerState::Healthy;
                true
            }
            Err(e) => {
                error!(
                    "Failed to connect to OpenRGB server after {} attempts: {e}",
                    self.policy.max_attempts
                );
                self.state = ServerState::Unreachable;
                false
            }
        }
    }

    async fn restart(&mut self) -> bool {
        info!("Restarting OpenRGB server");
        if let Err(e) = self.process.terminate().await {
            warn!("Could not stop OpenRGB server, it may already be gone: {e}");
        }
        self.state = ServerState::NotStarted;
        // Let the old process release its port before probing.
        tokio::time::sleep(self.policy.backoff).await;
        self.ensure_running().await
    }

    fn state(&self) -> ServerState {
        self.state
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mockall::Sequence;
    use pretty_assertions::assert_eq;

    fn refused() -> RgbError {
        RgbError::Connection(std::io::Error::from(std::io::ErrorKind::ConnectionRefused))
    }

    fn policy() -> RetryPolicy {
        RetryPolicy::new(10, Duration::from_secs(1))
    }

    #[tokio::test(start_paused = true)]
    async fn reachable_server_is_not_launched() {
        let mut process = MockServerProcess::new();
        process.expect_launch().never();
        let mut probe = MockReachabilityProbe::new();
        probe.expect_probe().times(1).returning(|| Ok(()));

        let mut supervisor = ServerSupervisor::new(Box::new(process), Box::new(probe), policy());
        assert!(supervisor.ensure_running().await);
        assert_eq!(supervisor.state(), ServerState::Healthy);
    }

    #[tokio::test(start_paused = true)]
    async fn server_becoming_reachable_is_healthy() {
        let mut seq = Sequence::new();
        let mut probe = MockReachabilityProbe::new();
        probe
            .expect_probe()
            .times(3)
            .in_sequence(&mut seq)
            .returning(|| Err(refused()));
        probe
            .expect_probe()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|| Ok(()));
        let mut process = MockServerProcess::new();
        process.expect_launch().times(1).returning(|| Ok(()));

        let mut supervisor = ServerSupervisor::new(Box::new(process), Box::new(probe), policy());
        assert!(supervisor.ensure_running().await);
        assert_eq!(supervisor.state(), ServerState::Healthy);
    }

    #[tokio::test(start_paused = true)]
    async fn exhausted_attempts_report_failure() {
        let mut probe = MockReachabilityProbe::new();
        // Initial check plus ten polls after launch.
        probe.expect_probe().times(11).returning(|| Err(refused()));
        let mut process = MockServerProcess::new();
        process.expect_launch().times(1).returning(|| Ok(()));

        let mut supervisor = ServerSupervisor::new(Box::new(process), Box::new(probe), policy());
        assert!(!supervisor.ensure_running().await);
        assert_eq!(supervisor.state(), ServerState::Unreachable);
    }

    #[tokio::test(start_paused = true)]
    async fn launch_failure_is_reported() {
        let mut probe = MockReachabilityProbe::new();
        probe.expect_probe().times(1).returning(|| Err(refused()));
        let mut process = MockServerProcess::new();
        process
            .expect_launch()
            .times(1)
            .returning(|| Err(RgbError::ServerLifecycle("no such file".into())));

        let mut supervisor = ServerSupervisor::new(Box::new(process), Box::new(probe), policy());
        assert!(!supervisor.ensure_running().await);
        assert_eq!(supervisor.state(), ServerState::Unreachable);
    }

    #[tokio::test(start_paused = true)]
    async fn restart_survives_termination_failure() {
        let mut seq = Sequence::new();
        let mut process = MockServerProcess::new();
        process
            .expect_terminate()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|| Err(RgbError::ServerLifecycle("pkill missing".into())));
        process
            .expect_launch()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|| Ok(()));

        let mut probe_seq = Sequence::new();
        let mut probe = MockReachabilityProbe::new();
        probe
            .expect_probe()
            .times(1)
            .in_sequence(&mut probe_seq)
            .returning(|| Err(refused()));
        probe
            .expect_probe()
            .times(1)
            .in_sequence(&mut probe_seq)
            .returning(|| Ok(()));

        let mut supervisor = ServerSupervisor::new(Box::new(process), Box::new(probe), policy());
        assert!(supervisor.restart().await);
        assert_eq!(supervisor.state(), ServerState::Healthy);
    }

    #[tokio::test]
    async fn missing_program_fails_to_launch() {
        let cfg = ServerCfg {
            program: "/nonexistent/openRGB.AppImage".to_string(),
            ..ServerCfg::default()
        };
        let mut server = CommandServer::from_cfg(&cfg);
        let err = server.launch().await.unwrap_err();
        assert!(matches!(err, RgbError::ServerLifecycle(_)));
    }

    #[tokio::test]
    async fn launched_child_is_killed_on_terminate() {
        let cfg = ServerCfg {
            program: "sleep".to_string(),
            args: vec!["30".to_string()],
            process_name: "thermal-rgbd-test-no-such-process".to_string(),
            ..ServerCfg::default()
        };
        let mut server = CommandServer::from_cfg(&cfg);
        server.launch().await.unwrap();
        assert!(server.child.is_some());

        // pkill may be absent on minimal systems; the child is gone either way.
        let _ = server.terminate().await;
        assert!(server.child.is_none());
    }

    #[tokio::test]
    async fn tcp_reachability_sees_listener() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();

        let probe = TcpProbe::new(Endpoint::new("127.0.0.1", port), Duration::from_secs(1));
        assert!(probe.probe().await.is_ok());

        drop(listener);
        assert!(probe.probe().await.is_err());
    }
}
