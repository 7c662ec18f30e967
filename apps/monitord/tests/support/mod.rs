//! Test doubles shared by the service tests

#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::{Result, anyhow};
use async_trait::async_trait;
use monitord::config::{Config, ConfigError, Endpoint, MonitorConfig};
use monitord::monitor::{CheckError, Checker, ProbeResponse, ReloadFn};
use monitord::storage::Storage;
use monitord::{HealthCheck, MonitorService};
use tokio::time::Instant;

/// Checker that answers from a table instead of the network
#[derive(Default)]
pub struct ScriptedChecker {
    answers: Mutex<HashMap<String, Result<u16, String>>>,
    calls: Mutex<Vec<(String, Instant)>>,
}

impl ScriptedChecker {
    pub fn answer(&self, url: &str, status_code: u16) {
        self.answers.lock().unwrap().insert(url.to_string(), Ok(status_code));
    }

    pub fn fail(&self, url: &str, message: &str) {
        self.answers.lock().unwrap().insert(url.to_string(), Err(message.to_string()));
    }

    /// When each probe of `url` was issued
    pub fn calls_for(&self, url: &str) -> Vec<Instant> {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .filter(|(called, _)| called == url)
            .map(|(_, at)| *at)
            .collect()
    }
}

#[async_trait]
impl Checker for ScriptedChecker {
    async fn check(&self, url: &str, _timeout: Duration) -> Result<ProbeResponse, CheckError> {
        self.calls.lock().unwrap().push((url.to_string(), Instant::now()));
        let answer = self.answers.lock().unwrap().get(url).cloned().unwrap_or(Ok(200));
        match answer {
            Ok(status_code) => Ok(ProbeResponse { status_code, elapsed: Duration::from_millis(7) }),
            Err(message) => Err(CheckError::Transport(message)),
        }
    }
}

/// Storage that keeps checks in memory, optionally failing or hanging
#[derive(Default)]
pub struct MemoryStorage {
    checks: Mutex<Vec<HealthCheck>>,
    failing: AtomicBool,
    hang_on: Mutex<Option<String>>,
}

impl MemoryStorage {
    pub fn checks(&self) -> Vec<HealthCheck> {
        self.checks.lock().unwrap().clone()
    }

    pub fn checks_for(&self, url: &str) -> Vec<HealthCheck> {
        self.checks().into_iter().filter(|check| check.url == url).collect()
    }

    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    /// Never return from `save_check` for `url`
    pub fn hang_on(&self, url: &str) {
        *self.hang_on.lock().unwrap() = Some(url.to_string());
    }
}

#[async_trait]
impl Storage for MemoryStorage {
    async fn save_check(&self, check: &HealthCheck) -> Result<()> {
        let hang = self.hang_on.lock().unwrap().as_deref() == Some(check.url.as_str());
        if hang {
            std::future::pending::<()>().await;
        }
        if self.failing.load(Ordering::SeqCst) {
            return Err(anyhow!("disk full"));
        }
        self.checks.lock().unwrap().push(check.clone());
        Ok(())
    }

    async fn close(&self) -> Result<()> {
        Ok(())
    }
}

/// Reload source whose next answer the test controls
#[derive(Clone)]
pub struct ReloadSource {
    next: Arc<Mutex<Option<MonitorConfig>>>,
}

impl ReloadSource {
    pub fn new(config: MonitorConfig) -> Self {
        Self { next: Arc::new(Mutex::new(Some(config))) }
    }

    pub fn set(&self, config: MonitorConfig) {
        *self.next.lock().unwrap() = Some(config);
    }

    /// Make the next reloads fail
    pub fn break_source(&self) {
        *self.next.lock().unwrap() = None;
    }

    pub fn reload_fn(&self) -> ReloadFn {
        let next = self.next.clone();
        Arc::new(move || match next.lock().unwrap().clone() {
            Some(monitor) => Ok(Config { monitor, ..Config::default() }),
            None => Err(ConfigError::ConfigPathUnavailable),
        })
    }
}

pub struct Harness {
    pub service: MonitorService,
    pub checker: Arc<ScriptedChecker>,
    pub storage: Arc<MemoryStorage>,
    pub source: ReloadSource,
}

pub fn harness(config: MonitorConfig) -> Harness {
    let checker = Arc::new(ScriptedChecker::default());
    let storage = Arc::new(MemoryStorage::default());
    let source = ReloadSource::new(config.clone());
    let service =
        MonitorService::new(storage.clone(), checker.clone(), config, source.reload_fn());

    Harness { service, checker, storage, source }
}

pub fn secs(seconds: u64) -> Duration {
    Duration::from_secs(seconds)
}

pub fn endpoint(name: &str, url: &str, interval: u64, timeout: u64) -> Endpoint {
    Endpoint::new(name, url, secs(interval), secs(timeout))
}

/// A config whose watch loop stays out of the way of the test
pub fn config(endpoints: Vec<Endpoint>) -> MonitorConfig {
    MonitorConfig::new(endpoints, secs(24 * 3600))
}
