//! Shared test doubles.

#![allow(dead_code)]

use resilient_cache::backend::{CacheBackend, InMemoryBackend};
use resilient_cache::{Error, Result};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Failure injected into every call (or one command) of a [`FlakyBackend`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Fault {
    None,
    /// Every command fails with a command-level error.
    Command,
    /// Every command fails with a connection-level error.
    Connection,
    /// Only the named command fails, with a command-level error.
    CommandOn(&'static str),
    /// Every command sleeps before answering.
    Hang(Duration),
}

/// In-memory store with switchable faults and a call counter.
#[derive(Clone)]
pub struct FlakyBackend {
    store: InMemoryBackend,
    fault: Arc<Mutex<Fault>>,
    healthy: Arc<AtomicBool>,
    calls: Arc<AtomicUsize>,
}

impl FlakyBackend {
    pub fn new() -> Self {
        Self {
            store: InMemoryBackend::new(),
            fault: Arc::new(Mutex::new(Fault::None)),
            healthy: Arc::new(AtomicBool::new(true)),
            calls: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn set_fault(&self, fault: Fault) {
        *self.fault.lock().expect("fault lock") = fault;
    }

    /// Whether the handshake (`health_check`) succeeds.
    pub fn set_healthy(&self, healthy: bool) {
        self.healthy.store(healthy, Ordering::SeqCst);
    }

    /// Commands issued so far, handshakes excluded.
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn store(&self) -> &InMemoryBackend {
        &self.store
    }

    async fn check(&self, command: &'static str) -> Result<()> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let fault = *self.fault.lock().expect("fault lock");
        match fault {
            Fault::None => Ok(()),
            Fault::Command => Err(Error::BackendError(format!("{} rejected", command))),
            Fault::Connection => Err(Error::ConnectionError("connection reset by peer".into())),
            Fault::CommandOn(target) if target == command => {
                Err(Error::BackendError(format!("{} rejected", command)))
            }
            Fault::CommandOn(_) => Ok(()),
            Fault::Hang(delay) => {
                tokio::time::sleep(delay).await;
                Ok(())
            }
        }
    }
}

impl CacheBackend for FlakyBackend {
    async fn get(&self, key: &str) -> Result<Option<String>> {
        self.check("GET").await?;
        self.store.get(key).await
    }

    async fn set(&self, key: &str, value: &str, ttl: Duration) -> Result<()> {
        self.check("SET").await?;
        self.store.set(key, value, ttl).await
    }

    async fn delete(&self, keys: &[String]) -> Result<u64> {
        self.check("DEL").await?;
        self.store.delete(keys).await
    }

    async fn exists(&self, key: &str) -> Result<bool> {
        self.check("EXISTS").await?;
        self.store.exists(key).await
    }

    async fn expire(&self, key: &str, ttl: Duration) -> Result<bool> {
        self.check("EXPIRE").await?;
        self.store.expire(key, ttl).await
    }

    async fn keys(&self, pattern: &str) -> Result<Vec<String>> {
        self.check("KEYS").await?;
        self.store.keys(pattern).await
    }

    async fn add_members(&self, set_key: &str, members: &[String]) -> Result<u64> {
        self.check("SADD").await?;
        self.store.add_members(set_key, members).await
    }

    async fn members(&self, set_key: &str) -> Result<Vec<String>> {
        self.check("SMEMBERS").await?;
        self.store.members(set_key).await
    }

    async fn flush(&self) -> Result<()> {
        self.check("FLUSH").await?;
        self.store.flush().await
    }

    async fn health_check(&self) -> Result<bool> {
        if self.healthy.load(Ordering::SeqCst) {
            Ok(true)
        } else {
            Err(Error::ConnectionError("connection refused".into()))
        }
    }

    fn provider_name(&self) -> &'static str {
        "flaky"
    }
}

pub fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}
