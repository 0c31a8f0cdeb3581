//! Subcommand implementations

use std::process::ExitCode;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use anyhow::Context;
use fastlease_core::{
    AcquireParams, Clock, LeaseSnapshot, LeaseState, LockConfig, LockHandle, LockKeys, SystemClock,
};
use fastlease_store::{DirStore, LaggedMedium};
use tracing::{info, warn};

use crate::config::{Command, Configuration};

/// Exit status used when interrupted by a signal
const INTERRUPTED: u8 = 130;

const STORE_RETRY_BACKOFF: Duration = Duration::from_secs(1);

pub async fn execute(command: Command, configuration: &Configuration) -> anyhow::Result<ExitCode> {
    match command {
        Command::Hold {
            name,
            hold_ms,
            timeout_ms,
        } => hold(&name, hold_ms, timeout_ms, configuration).await,
        Command::Run {
            name,
            timeout_ms,
            command,
        } => run(&name, timeout_ms, &command, configuration).await,
        Command::Inspect { name, json } => inspect(&name, json, configuration),
        Command::Break { name } => break_lease(&name, configuration),
        Command::Simulate {
            contenders,
            rounds,
            latency_ms,
            hold_ms,
        } => {
            let report = simulate(
                contenders,
                rounds,
                Duration::from_millis(latency_ms),
                Duration::from_millis(hold_ms),
                configuration.lock_config(),
                configuration.acquire_params(),
            )
            .await?;
            println!("{}", report);
            Ok(if report.overlaps == 0 {
                ExitCode::SUCCESS
            } else {
                ExitCode::FAILURE
            })
        }
    }
}

fn open_store(configuration: &Configuration) -> anyhow::Result<DirStore> {
    let dir = configuration.store_dir();
    DirStore::open(&dir).with_context(|| format!("failed to open store at {}", dir.display()))
}

fn open_lock(name: &str, configuration: &Configuration) -> anyhow::Result<LockHandle> {
    Ok(LockHandle::builder(name)
        .config(configuration.lock_config())
        .build(open_store(configuration)?))
}

/// Wait for Ctrl+C or SIGTERM
pub async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Received Ctrl+C"),
        _ = terminate => info!("Received SIGTERM"),
    }
}

/// Acquire unless interrupted first; `Ok(false)` means interrupted
async fn acquire_interruptible(
    lock: &LockHandle,
    params: AcquireParams,
    timeout_ms: Option<u64>,
) -> anyhow::Result<bool> {
    let acquisition = async {
        loop {
            let result = match timeout_ms {
                Some(ms) => lock.acquire_timeout(params, Duration::from_millis(ms)).await,
                None => lock.acquire(params).await,
            };
            match result {
                // without a deadline, wait out transient store failures
                Err(e) if timeout_ms.is_none() && e.is_recoverable() => {
                    warn!(lock = %lock.name(), error = %e, "Acquisition failed, retrying");
                    tokio::time::sleep(STORE_RETRY_BACKOFF).await;
                }
                other => break other,
            }
        }
    };

    tokio::select! {
        result = acquisition => {
            result.with_context(|| format!("failed to acquire lock '{}'", lock.name()))?;
            Ok(true)
        }
        _ = shutdown_signal() => {
            lock.release();
            Ok(false)
        }
    }
}

async fn hold(
    name: &str,
    hold_ms: Option<u64>,
    timeout_ms: Option<u64>,
    configuration: &Configuration,
) -> anyhow::Result<ExitCode> {
    let lock = open_lock(name, configuration)?;
    if !acquire_interruptible(&lock, configuration.acquire_params(), timeout_ms).await? {
        return Ok(ExitCode::from(INTERRUPTED));
    }
    println!("acquired {} as {}", name, lock.contender_id());

    let mut teardown = lock.release_on(shutdown_signal());
    let interrupted = match hold_ms {
        Some(ms) => tokio::select! {
            _ = tokio::time::sleep(Duration::from_millis(ms)) => false,
            _ = &mut teardown => true,
        },
        None => {
            let _ = (&mut teardown).await;
            true
        }
    };
    teardown.abort();
    lock.release();
    println!("released {}", name);

    Ok(if interrupted {
        ExitCode::from(INTERRUPTED)
    } else {
        ExitCode::SUCCESS
    })
}

async fn run(
    name: &str,
    timeout_ms: Option<u64>,
    command: &[String],
    configuration: &Configuration,
) -> anyhow::Result<ExitCode> {
    let Some((program, args)) = command.split_first() else {
        anyhow::bail!("no command given");
    };

    let lock = open_lock(name, configuration)?;
    if !acquire_interruptible(&lock, configuration.acquire_params(), timeout_ms).await? {
        return Ok(ExitCode::from(INTERRUPTED));
    }
    info!(lock = %name, %program, "Running command under lock");

    let mut child = match tokio::process::Command::new(program).args(args).spawn() {
        Ok(child) => child,
        Err(e) => {
            lock.release();
            return Err(e).with_context(|| format!("failed to start '{}'", program));
        }
    };

    let status = tokio::select! {
        status = child.wait() => status,
        _ = shutdown_signal() => {
            lock.release();
            if let Err(e) = child.kill().await {
                warn!(error = %e, "Failed to stop child process");
            }
            return Ok(ExitCode::from(INTERRUPTED));
        }
    };
    lock.release();

    let status = status.with_context(|| format!("failed to wait for '{}'", program))?;
    Ok(ExitCode::from(exit_status(status.code())))
}

/// Child exit code, or 1 when it was killed by a signal
fn exit_status(code: Option<i32>) -> u8 {
    code.and_then(|code| u8::try_from(code).ok()).unwrap_or(1)
}

fn inspect(name: &str, json: bool, configuration: &Configuration) -> anyhow::Result<ExitCode> {
    let store = open_store(configuration)?;
    let snapshot = LockKeys::new(name).snapshot(
        &store,
        SystemClock.now_millis(),
        configuration.acquire_params().max_lock_time_ms,
    )?;

    if json {
        println!("{}", serde_json::to_string_pretty(&snapshot)?);
    } else {
        print!("{}", render_snapshot(&snapshot));
    }
    Ok(ExitCode::SUCCESS)
}

fn render_snapshot(snapshot: &LeaseSnapshot) -> String {
    let mut out = format!("lock:      {}\n", snapshot.name);
    out.push_str(&format!(
        "announced: {}\n",
        snapshot.announced.as_deref().unwrap_or("-")
    ));
    let state = match snapshot.state {
        LeaseState::Free => "free",
        LeaseState::Held => "held",
        LeaseState::Stale => "stale",
    };
    out.push_str(&format!("state:     {}\n", state));
    if let Some(lease) = &snapshot.lease {
        out.push_str(&format!("holder:    {}\n", lease.holder));
        out.push_str(&format!("age:       {} ms\n", snapshot.age_ms.unwrap_or_default()));
        if snapshot.state == LeaseState::Held {
            out.push_str(&format!(
                "expires:   in {} ms\n",
                snapshot.remaining_ms.unwrap_or_default()
            ));
        }
    }
    out
}

fn break_lease(name: &str, configuration: &Configuration) -> anyhow::Result<ExitCode> {
    let store = open_store(configuration)?;
    let keys = LockKeys::new(name);
    match keys.read_lease(&store)? {
        Some(lease) => {
            keys.clear_lease(&store)?;
            warn!(lock = %name, holder = %lease.holder, "Lease forcibly removed");
            println!("removed lease of {} held by {}", name, lease.holder);
        }
        None => println!("{} has no lease", name),
    }
    Ok(ExitCode::SUCCESS)
}

/// Outcome of a simulation run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SimulationReport {
    pub contenders: usize,
    pub entries: usize,
    /// Entries that found another contender already holding the lock
    pub overlaps: usize,
    pub latency_ms: u64,
    pub verify_delay_ms: u64,
}

impl std::fmt::Display for SimulationReport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} contenders, {} entries, {} overlaps (latency {} ms, verify delay {} ms)",
            self.contenders, self.entries, self.overlaps, self.latency_ms, self.verify_delay_ms
        )
    }
}

/// Run in-process contenders against a store with injected write latency and
/// count overlapping holds.
pub async fn simulate(
    contenders: usize,
    rounds: usize,
    latency: Duration,
    hold: Duration,
    config: LockConfig,
    params: AcquireParams,
) -> anyhow::Result<SimulationReport> {
    let medium = LaggedMedium::new(latency);
    let inside = Arc::new(AtomicUsize::new(0));
    let overlaps = Arc::new(AtomicUsize::new(0));
    let entries = Arc::new(AtomicUsize::new(0));

    info!(
        contenders,
        rounds,
        latency_ms = latency.as_millis() as u64,
        "Starting simulation"
    );

    let mut tasks = Vec::with_capacity(contenders);
    for _ in 0..contenders {
        let store = medium.view();
        let inside = inside.clone();
        let overlaps = overlaps.clone();
        let entries = entries.clone();
        tasks.push(tokio::spawn(async move {
            let lock = LockHandle::builder("simulation")
                .config(config)
                .build(store);
            for _ in 0..rounds {
                lock.acquire(params).await?;
                if inside.fetch_add(1, Ordering::SeqCst) != 0 {
                    overlaps.fetch_add(1, Ordering::SeqCst);
                }
                entries.fetch_add(1, Ordering::SeqCst);
                tokio::time::sleep(hold).await;
                inside.fetch_sub(1, Ordering::SeqCst);
                lock.release();
            }
            Ok::<_, fastlease_core::LockError>(())
        }));
    }

    for task in tasks {
        task.await.context("contender task panicked")??;
    }

    Ok(SimulationReport {
        contenders,
        entries: entries.load(Ordering::SeqCst),
        overlaps: overlaps.load(Ordering::SeqCst),
        latency_ms: latency.as_millis() as u64,
        verify_delay_ms: config.verify_delay_ms,
    })
}
