//! Bounded connection pool with health-checked reuse.
//!
//! # Responsibilities
//! - Hand out idle connections oldest-first, evicting stale or dead ones
//! - Create connections through the factory while under `max_conns`
//! - Keep at most `max_idle` connections parked for reuse
//! - Close every parked connection on shutdown
//!
//! # Design Decisions
//! - The mutex guards state transitions only; ping, dial and close run
//!   outside it. A checkout reserves its slot under the lock and a
//!   `Reservation` gives the slot back if the I/O fails or the acquiring
//!   future is dropped. An idle connection held by a dropped reservation
//!   goes back to the front of the queue, or is closed on a spawned task
//!   when there is no room for it.
//! - `acquire` fails fast when exhausted; `acquire_timeout` is the explicit
//!   bounded-wait variant.

use std::collections::VecDeque;
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tokio::sync::Notify;
use tokio::time::Instant;

use crate::observability::metrics;
use crate::pool::{ConnectionFactory, PoolConfig, PoolError, PoolLimits};

/// A parked connection and the moment it was returned.
struct IdleEntry<C> {
    conn: C,
    returned_at: Instant,
}

impl<C> IdleEntry<C> {
    fn new(conn: C) -> Self {
        Self {
            conn,
            returned_at: Instant::now(),
        }
    }
}

struct PoolState<C> {
    /// Connections checked out, including in-flight reservations.
    open: usize,
    /// `None` once the pool has been shut down.
    idle: Option<VecDeque<IdleEntry<C>>>,
}

enum Checkout<C> {
    Idle(IdleEntry<C>),
    Create,
}

enum Release<C> {
    Pooled,
    Overflow(C),
    Closed(C),
    Foreign(C),
}

/// Point-in-time pool counters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PoolStats {
    pub idle: usize,
    pub open: usize,
    pub max_conns: usize,
    pub max_idle: usize,
}

/// A bounded pool of connections to a single address.
pub struct ConnectionPool<F: ConnectionFactory> {
    addr: String,
    limits: PoolLimits,
    factory: Arc<F>,
    state: Mutex<PoolState<F::Connection>>,
    /// Woken whenever a slot or idle connection becomes available.
    returned: Notify,
}

impl<F: ConnectionFactory> ConnectionPool<F> {
    /// Create a pool for `addr`, eagerly opening the initial connections.
    ///
    /// If any initial connection fails, the ones already opened are closed
    /// and the factory error is returned.
    pub async fn new(addr: impl Into<String>, config: PoolConfig<F>) -> Result<Self, PoolError> {
        let addr = addr.into();
        if addr.is_empty() {
            return Err(PoolError::Config("address is empty".into()));
        }

        let (limits, factory) = config.normalize()?;

        let warm = limits.init_conns.min(limits.max_idle);
        let mut idle = VecDeque::with_capacity(limits.max_idle);
        for _ in 0..warm {
            match factory.new_connection(&addr).await {
                Ok(conn) => idle.push_back(IdleEntry::new(conn)),
                Err(e) => {
                    tracing::error!(addr = %addr, error = %e, created = idle.len(), "Pool warm-up failed");
                    for entry in idle.drain(..) {
                        let _ = factory.close(entry.conn).await;
                    }
                    return Err(PoolError::Factory(e));
                }
            }
        }

        tracing::info!(
            addr = %addr,
            init_conns = limits.init_conns,
            max_conns = limits.max_conns,
            max_idle = limits.max_idle,
            idle_timeout = ?limits.idle_timeout,
            "Connection pool ready"
        );
        metrics::record_pool_idle(&addr, idle.len());

        Ok(Self {
            addr,
            limits,
            factory: Arc::new(factory),
            state: Mutex::new(PoolState {
                open: 0,
                idle: Some(idle),
            }),
            returned: Notify::new(),
        })
    }

    /// Check out a usable connection.
    ///
    /// Reuses the oldest idle connection that is neither stale nor failing
    /// its ping; otherwise creates one if under `max_conns`. Never waits for
    /// capacity: fails with [`PoolError::Exhausted`] instead.
    pub async fn acquire(&self) -> Result<F::Connection, PoolError> {
        loop {
            let (checkout, mut reservation) = self.checkout()?;
            match checkout {
                Checkout::Idle(entry) => {
                    if self.is_stale(&entry) {
                        tracing::debug!(
                            addr = %self.addr,
                            idle_for = ?entry.returned_at.elapsed(),
                            "Evicting stale idle connection"
                        );
                        metrics::record_pool_eviction(&self.addr, "stale");
                        self.close_quietly(entry.conn).await;
                        continue;
                    }

                    let pinged = self.factory.ping(reservation.hold(entry)).await;
                    let Some(entry) = reservation.take_held() else {
                        continue;
                    };

                    if let Err(e) = pinged {
                        tracing::warn!(addr = %self.addr, error = %e, "Idle connection failed health check");
                        metrics::record_pool_eviction(&self.addr, "unhealthy");
                        self.close_quietly(entry.conn).await;
                        continue;
                    }

                    reservation.commit();
                    tracing::trace!(addr = %self.addr, "Reusing idle connection");
                    metrics::record_pool_acquire(&self.addr, "idle");
                    return Ok(entry.conn);
                }
                Checkout::Create => {
                    let conn = self.factory.new_connection(&self.addr).await.map_err(|e| {
                        tracing::warn!(addr = %self.addr, error = %e, "Failed to open connection");
                        PoolError::Factory(e)
                    })?;

                    reservation.commit();
                    tracing::debug!(addr = %self.addr, "Opened new connection");
                    metrics::record_pool_acquire(&self.addr, "new");
                    return Ok(conn);
                }
            }
        }
    }

    /// Like [`acquire`](Self::acquire), but waits up to `wait` for a
    /// connection to be released when the pool is exhausted.
    pub async fn acquire_timeout(&self, wait: Duration) -> Result<F::Connection, PoolError> {
        // An unrepresentable deadline means waiting without one.
        let deadline = Instant::now().checked_add(wait);
        loop {
            let notified = self.returned.notified();
            tokio::pin!(notified);
            // Register before trying so a release in between is not missed.
            notified.as_mut().enable();

            match self.acquire().await {
                Err(PoolError::Exhausted) => match deadline {
                    Some(deadline) => {
                        if tokio::time::timeout_at(deadline, notified).await.is_err() {
                            return Err(PoolError::Exhausted);
                        }
                    }
                    None => notified.await,
                },
                other => return other,
            }
        }
    }

    /// Return a checked-out connection to the pool.
    ///
    /// Parks it if there is idle room, closes it otherwise. After shutdown
    /// the connection is closed and [`PoolError::Closed`] is returned.
    pub async fn release(&self, conn: F::Connection) -> Result<(), PoolError> {
        let outcome = {
            let mut guard = self.lock();
            let state = &mut *guard;
            match state.idle.as_mut() {
                None => {
                    state.open = state.open.saturating_sub(1);
                    Release::Closed(conn)
                }
                Some(_) if state.open == 0 => Release::Foreign(conn),
                Some(idle) => {
                    state.open -= 1;
                    if idle.len() < self.limits.max_idle {
                        idle.push_back(IdleEntry::new(conn));
                        metrics::record_pool_idle(&self.addr, idle.len());
                        Release::Pooled
                    } else {
                        Release::Overflow(conn)
                    }
                }
            }
        };
        self.returned.notify_waiters();

        match outcome {
            Release::Pooled => Ok(()),
            Release::Overflow(conn) => {
                tracing::debug!(addr = %self.addr, "Idle queue full, closing released connection");
                self.close_quietly(conn).await;
                Ok(())
            }
            Release::Closed(conn) => {
                self.close_quietly(conn).await;
                Err(PoolError::Closed)
            }
            Release::Foreign(conn) => {
                tracing::warn!(addr = %self.addr, "Released connection was not checked out");
                self.close_quietly(conn).await;
                Err(PoolError::InvalidConnection)
            }
        }
    }

    /// Close a checked-out connection instead of returning it.
    pub async fn discard(&self, conn: F::Connection) {
        {
            let mut state = self.lock();
            state.open = state.open.saturating_sub(1);
        }
        self.returned.notify_waiters();
        self.close_quietly(conn).await;
    }

    /// Close the pool and every idle connection in it.
    ///
    /// Idempotent. Checked-out connections are left to their holders.
    pub async fn shutdown(&self) -> Result<(), PoolError> {
        let drained = self.lock().idle.take();
        let Some(idle) = drained else {
            return Ok(());
        };

        tracing::info!(addr = %self.addr, idle = idle.len(), "Shutting down connection pool");
        self.returned.notify_waiters();
        for entry in idle {
            self.close_quietly(entry.conn).await;
        }
        metrics::record_pool_idle(&self.addr, 0);
        Ok(())
    }

    /// Number of idle connections.
    pub fn size(&self) -> usize {
        self.lock().idle.as_ref().map_or(0, VecDeque::len)
    }

    /// Number of checked-out connections.
    pub fn open_count(&self) -> usize {
        self.lock().open
    }

    pub fn stats(&self) -> PoolStats {
        let state = self.lock();
        PoolStats {
            idle: state.idle.as_ref().map_or(0, VecDeque::len),
            open: state.open,
            max_conns: self.limits.max_conns,
            max_idle: self.limits.max_idle,
        }
    }

    pub fn is_closed(&self) -> bool {
        self.lock().idle.is_none()
    }

    pub fn addr(&self) -> &str {
        &self.addr
    }

    pub fn limits(&self) -> PoolLimits {
        self.limits
    }

    fn checkout(&self) -> Result<(Checkout<F::Connection>, Reservation<'_, F>), PoolError> {
        let mut guard = self.lock();
        let state = &mut *guard;
        let idle = state.idle.as_mut().ok_or(PoolError::Closed)?;

        let checkout = match idle.pop_front() {
            Some(entry) => {
                metrics::record_pool_idle(&self.addr, idle.len());
                Checkout::Idle(entry)
            }
            None if state.open >= self.limits.max_conns => {
                metrics::record_pool_exhausted(&self.addr);
                return Err(PoolError::Exhausted);
            }
            None => Checkout::Create,
        };
        state.open += 1;

        Ok((
            checkout,
            Reservation {
                pool: self,
                armed: true,
                held: None,
            },
        ))
    }

    fn is_stale(&self, entry: &IdleEntry<F::Connection>) -> bool {
        !self.limits.idle_timeout.is_zero() && entry.returned_at.elapsed() > self.limits.idle_timeout
    }

    fn give_back_slot(&self) {
        {
            let mut state = self.lock();
            state.open = state.open.saturating_sub(1);
        }
        self.returned.notify_waiters();
    }

    /// Take back an idle connection whose checkout was abandoned mid-check.
    fn reclaim(&self, entry: IdleEntry<F::Connection>) {
        let orphan = {
            let mut guard = self.lock();
            let state = &mut *guard;
            state.open = state.open.saturating_sub(1);
            match state.idle.as_mut() {
                Some(idle) if idle.len() < self.limits.max_idle => {
                    idle.push_front(entry);
                    None
                }
                _ => Some(entry.conn),
            }
        };
        self.returned.notify_waiters();

        if let Some(conn) = orphan {
            self.close_detached(conn);
        }
    }

    /// Close `conn` on a spawned task, for callers that cannot await.
    fn close_detached(&self, conn: F::Connection) {
        let Ok(handle) = tokio::runtime::Handle::try_current() else {
            tracing::warn!(addr = %self.addr, "No runtime to close abandoned connection, dropping it");
            return;
        };

        let factory = Arc::clone(&self.factory);
        let addr = self.addr.clone();
        handle.spawn(async move {
            if let Err(e) = factory.close(conn).await {
                tracing::debug!(addr = %addr, error = %e, "Error closing abandoned connection");
            }
        });
    }

    async fn close_quietly(&self, conn: F::Connection) {
        if let Err(e) = self.factory.close(conn).await {
            tracing::debug!(addr = %self.addr, error = %e, "Error closing pooled connection");
        }
    }

    fn lock(&self) -> MutexGuard<'_, PoolState<F::Connection>> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl<F: ConnectionFactory> fmt::Debug for ConnectionPool<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionPool")
            .field("addr", &self.addr)
            .field("limits", &self.limits)
            .field("stats", &self.stats())
            .finish()
    }
}

/// A checked-out slot that is given back on drop unless committed.
///
/// While it holds an idle entry, dropping it returns the entry to the pool
/// instead of losing the connection.
struct Reservation<'a, F: ConnectionFactory> {
    pool: &'a ConnectionPool<F>,
    armed: bool,
    held: Option<IdleEntry<F::Connection>>,
}

impl<F: ConnectionFactory> Reservation<'_, F> {
    fn hold(&mut self, entry: IdleEntry<F::Connection>) -> &mut F::Connection {
        &mut self.held.insert(entry).conn
    }

    fn take_held(&mut self) -> Option<IdleEntry<F::Connection>> {
        self.held.take()
    }

    fn commit(mut self) {
        self.armed = false;
    }
}

impl<F: ConnectionFactory> Drop for Reservation<'_, F> {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        match self.held.take() {
            Some(entry) => self.pool.reclaim(entry),
            None => self.pool.give_back_slot(),
        }
    }
}
