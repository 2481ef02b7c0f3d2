//! Random free-port selection
//!
//! Probes random ports in `[1024, max)` until one can be bound. The port is
//! released again before it is returned, so another process may still take it
//! before the launched instance binds it. Ports already handed out by this
//! allocator are skipped; once all of them are taken allocation fails.

use rand::Rng;
use std::collections::HashSet;
use std::net::{Ipv4Addr, TcpListener};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use shared::{process_debug, ProcessId};

use crate::config::DEFAULT_MAX_PORT;
use crate::error::{OrchestratorError, OrchestratorResult};

/// Lowest port ever handed out
pub const MIN_PORT: u16 = 1024;

/// Smallest accepted upper bound
pub const MIN_MAX_PORT: u16 = 2048;

const PROBE_BACKOFF: Duration = Duration::from_millis(100);

type Probe = Arc<dyn Fn(u16) -> bool + Send + Sync>;

pub struct PortAllocator {
    probe: Probe,
    used: Mutex<HashSet<u16>>,
}

impl PortAllocator {
    /// Allocator that asks the OS whether a listener can bind the port
    pub fn new() -> Self {
        Self::with_probe(can_bind)
    }

    /// Allocator with a custom free-port check
    pub fn with_probe<F>(probe: F) -> Self
    where
        F: Fn(u16) -> bool + Send + Sync + 'static,
    {
        Self {
            probe: Arc::new(probe),
            used: Mutex::new(HashSet::new()),
        }
    }

    /// Effective exclusive upper bound for a requested maximum
    pub fn upper_bound(max_port: Option<u16>) -> u16 {
        max_port.unwrap_or(DEFAULT_MAX_PORT).max(MIN_MAX_PORT)
    }

    /// Find a port in `[1024, max)` that was free at the moment of the check
    ///
    /// Busy ports are retried without limit. Fails only when this allocator
    /// has already handed out every port in the range.
    pub async fn allocate(&self, max_port: Option<u16>) -> OrchestratorResult<u16> {
        let upper = Self::upper_bound(max_port);
        let mut attempts: u64 = 0;

        loop {
            if self.used_below(upper) >= usize::from(upper - MIN_PORT) {
                return Err(OrchestratorError::PortExhausted { upper });
            }

            attempts += 1;
            let port = rand::thread_rng().gen_range(MIN_PORT..upper);

            if !self.is_used(port) && (self.probe)(port) {
                self.reserve(port);
                process_debug!(ProcessId::current(), "🔌 Allocated port {} after {} attempt(s)", port, attempts);
                return Ok(port);
            }

            tokio::time::sleep(PROBE_BACKOFF).await;
        }
    }

    /// Mark a port as taken so it is never handed out by this allocator
    pub fn reserve(&self, port: u16) {
        if let Ok(mut used) = self.used.lock() {
            used.insert(port);
        }
    }

    pub fn is_used(&self, port: u16) -> bool {
        self.used.lock().map(|used| used.contains(&port)).unwrap_or(false)
    }

    fn used_below(&self, upper: u16) -> usize {
        self.used
            .lock()
            .map(|used| used.iter().filter(|port| (MIN_PORT..upper).contains(*port)).count())
            .unwrap_or(0)
    }
}

impl Default for PortAllocator {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for PortAllocator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PortAllocator").field("used", &self.used).finish_non_exhaustive()
    }
}

/// True when a listener can bind the port on all interfaces
fn can_bind(port: u16) -> bool {
    TcpListener::bind((Ipv4Addr::UNSPECIFIED, port)).is_ok()
}
