use std::borrow::Cow;
use std::future::Future;
use std::sync::atomic::{AtomicI32, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;

use futures_util::FutureExt;
use futures_util::future::BoxFuture;

use serde::Serialize;

use tracing::{debug, error, info, warn};

use crate::Map;
use crate::error::{Error, ErrorKind, Result};

/// A state machine state.
///
/// States are totally ordered. Adapters may define their own states between
/// [`FsmState::WAITING_CONFIGURATION`] and [`FsmState::READY`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(transparent)]
pub struct FsmState(i32);

impl FsmState {
    /// Initial state.
    pub const INIT: Self = Self(0);
    /// The device waits for its configuration to be complete.
    pub const WAITING_CONFIGURATION: Self = Self(100);
    /// The device is ready.
    pub const READY: Self = Self(200);
    /// Terminal state.
    pub const END: Self = Self(300);

    /// Creates an adapter-defined [`FsmState`].
    #[must_use]
    pub const fn new(raw: i32) -> Self {
        Self(raw)
    }

    /// Returns the raw state value.
    #[must_use]
    pub const fn raw(self) -> i32 {
        self.0
    }
}

impl core::fmt::Display for FsmState {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match *self {
            Self::INIT => write!(f, "init"),
            Self::WAITING_CONFIGURATION => write!(f, "waiting-configuration"),
            Self::READY => write!(f, "ready"),
            Self::END => write!(f, "end"),
            Self(raw) => write!(f, "state-{raw}"),
        }
    }
}

type StateCallback = Arc<dyn Fn(FsmContext) -> BoxFuture<'static, FsmState> + Send + Sync>;
type StateChangeHook = Arc<dyn Fn(FsmState, FsmState) -> FsmState + Send + Sync>;
type ConfiguredFn = Arc<dyn Fn() -> bool + Send + Sync>;

// State shared between the loop thread and callers.
struct Shared {
    // Written by the loop thread only.
    current: AtomicI32,
    // Written by the loop thread only.
    previous: AtomicI32,
    // Pending transition requests.
    sender: flume::Sender<FsmState>,
    receiver: flume::Receiver<FsmState>,
    // Device readiness predicate.
    configured: Option<ConfiguredFn>,
}

impl Shared {
    fn state(&self) -> FsmState {
        FsmState(self.current.load(Ordering::Acquire))
    }

    fn previous_state(&self) -> FsmState {
        FsmState(self.previous.load(Ordering::Acquire))
    }

    fn transit(&self, state: FsmState) {
        if self.state() == FsmState::END {
            debug!("Ignoring transition to {state}, the state machine is over");
            return;
        }
        if self.sender.send(state).is_err() {
            warn!("Transition to {state} dropped");
        }
    }

    fn configured(&self) -> bool {
        self.configured.as_ref().is_some_and(|configured| configured())
    }
}

/// The view of a state machine given to state callbacks.
#[derive(Clone)]
pub struct FsmContext {
    shared: Arc<Shared>,
}

impl FsmContext {
    /// Returns the current state.
    #[must_use]
    pub fn state(&self) -> FsmState {
        self.shared.state()
    }

    /// Returns the previous state.
    #[must_use]
    pub fn previous_state(&self) -> FsmState {
        self.shared.previous_state()
    }

    /// Pops the oldest pending transition request, or returns the current
    /// state when none is pending.
    #[must_use]
    pub fn next_state(&self) -> FsmState {
        self.shared
            .receiver
            .try_recv()
            .unwrap_or_else(|_| self.shared.state())
    }

    /// Waits for the next transition request.
    pub async fn wait_transition(&self) -> FsmState {
        self.shared
            .receiver
            .recv_async()
            .await
            .unwrap_or(FsmState::END)
    }

    /// Whether the device is configured.
    #[must_use]
    pub fn configured(&self) -> bool {
        self.shared.configured()
    }

    /// Returns a [`FsmHandle`] to the same state machine.
    #[must_use]
    pub fn handle(&self) -> FsmHandle {
        FsmHandle {
            shared: self.shared.clone(),
        }
    }
}

/// A cheap handle to request transitions and read the state of a state
/// machine.
#[derive(Clone)]
pub struct FsmHandle {
    shared: Arc<Shared>,
}

impl FsmHandle {
    /// Returns the current state.
    ///
    /// The value may be one transition behind the loop thread.
    #[must_use]
    pub fn state(&self) -> FsmState {
        self.shared.state()
    }

    /// Returns the previous state.
    #[must_use]
    pub fn previous_state(&self) -> FsmState {
        self.shared.previous_state()
    }

    /// Requests a transition without waiting for it.
    pub fn transit(&self, state: FsmState) {
        self.shared.transit(state);
    }

    /// Whether the device is configured.
    #[must_use]
    pub fn configured(&self) -> bool {
        self.shared.configured()
    }

    /// Whether both handles refer to the same state machine.
    #[must_use]
    pub fn same(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.shared, &other.shared)
    }
}

// Callbacks driven by the loop thread.
struct Machine {
    callbacks: Map<FsmState, StateCallback>,
    state_change: Option<StateChangeHook>,
}

impl Machine {
    async fn run(self: Arc<Self>, shared: Arc<Shared>) {
        loop {
            let current = shared.state();
            let next = match self.callbacks.get(&current) {
                Some(callback) => {
                    callback(FsmContext {
                        shared: shared.clone(),
                    })
                    .await
                }
                None => {
                    debug!("No callback for {current}, ending");
                    FsmState::END
                }
            };
            let next = match &self.state_change {
                Some(hook) => hook(current, next),
                None => next,
            };
            shared.previous.store(current.raw(), Ordering::Release);
            shared.current.store(next.raw(), Ordering::Release);
            if current != next {
                info!("{current} -> {next}");
            }
            if next == FsmState::END {
                break;
            }
        }
    }
}

/// A [`Fsm`] builder.
pub struct FsmBuilder {
    name: Cow<'static, str>,
    callbacks: Map<FsmState, StateCallback>,
    state_change: Option<StateChangeHook>,
    configured: Option<ConfiguredFn>,
}

impl FsmBuilder {
    /// Creates a [`FsmBuilder`].
    ///
    /// The name is used for the loop thread.
    pub fn new(name: impl Into<Cow<'static, str>>) -> Self {
        Self {
            name: name.into(),
            callbacks: Map::default(),
            state_change: None,
            configured: None,
        }
    }

    /// Registers the callback run while in `state`.
    ///
    /// The callback returns the next state. A state without callback moves
    /// the machine to [`FsmState::END`].
    #[must_use]
    pub fn state<F, Fut>(mut self, state: FsmState, callback: F) -> Self
    where
        F: Fn(FsmContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = FsmState> + Send + 'static,
    {
        self.callbacks
            .insert(state, Arc::new(move |context| callback(context).boxed()));
        self
    }

    /// Sets the hook run on every transition.
    ///
    /// The hook receives the current and next states, and may rewrite the
    /// next state.
    #[must_use]
    pub fn state_change(
        mut self,
        hook: impl Fn(FsmState, FsmState) -> FsmState + Send + Sync + 'static,
    ) -> Self {
        self.state_change = Some(Arc::new(hook));
        self
    }

    /// Sets the device readiness predicate.
    ///
    /// Without predicate, the device is never considered configured.
    #[must_use]
    pub fn configured(mut self, configured: impl Fn() -> bool + Send + Sync + 'static) -> Self {
        self.configured = Some(Arc::new(configured));
        self
    }

    /// Builds an unstarted [`Fsm`].
    #[must_use]
    pub fn build(self) -> Fsm {
        let (sender, receiver) = flume::unbounded();
        Fsm {
            name: self.name,
            shared: Arc::new(Shared {
                current: AtomicI32::new(FsmState::INIT.raw()),
                previous: AtomicI32::new(FsmState::INIT.raw()),
                sender,
                receiver,
                configured: self.configured,
            }),
            machine: Arc::new(Machine {
                callbacks: self.callbacks,
                state_change: self.state_change,
            }),
            thread: Mutex::new(None),
        }
    }
}

/// A state machine running on its own thread.
///
/// Dropping a [`Fsm`] shuts it down.
pub struct Fsm {
    name: Cow<'static, str>,
    shared: Arc<Shared>,
    machine: Arc<Machine>,
    thread: Mutex<Option<JoinHandle<()>>>,
}

impl Fsm {
    /// Returns a [`FsmHandle`].
    #[must_use]
    pub fn handle(&self) -> FsmHandle {
        FsmHandle {
            shared: self.shared.clone(),
        }
    }

    /// Returns the current state.
    #[must_use]
    pub fn state(&self) -> FsmState {
        self.shared.state()
    }

    /// Requests a transition without waiting for it.
    pub fn transit(&self, state: FsmState) {
        self.shared.transit(state);
    }

    /// Whether the loop thread is running.
    #[must_use]
    pub fn is_running(&self) -> bool {
        self.thread
            .lock()
            .map(|thread| thread.as_ref().is_some_and(|t| !t.is_finished()))
            .unwrap_or(false)
    }

    /// Starts the loop thread.
    ///
    /// # Errors
    ///
    /// Fails if the machine was already started or already finished, or if
    /// the thread cannot be spawned.
    pub fn start(&self) -> Result<()> {
        let mut thread = self
            .thread
            .lock()
            .map_err(|_| Error::new(ErrorKind::Failure, "State machine lock poisoned"))?;

        if self.shared.state() == FsmState::END {
            return Err(Error::new(
                ErrorKind::Failure,
                format!("State machine {} is over", self.name),
            ));
        }
        if thread.is_some() {
            return Err(Error::new(
                ErrorKind::AlreadyExists,
                format!("State machine {} already started", self.name),
            ));
        }

        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_time()
            .build()?;
        let shared = self.shared.clone();
        let machine = self.machine.clone();

        let handle = std::thread::Builder::new()
            .name(format!("fsm-{}", self.name))
            .spawn(move || runtime.block_on(machine.run(shared)))?;

        info!("State machine {} started", self.name);
        *thread = Some(handle);
        Ok(())
    }

    /// Requests [`FsmState::END`] and waits for the loop thread to exit.
    ///
    /// Calling it again, or on a machine never started, does nothing.
    pub fn shutdown(&self) {
        let handle = match self.thread.lock() {
            Ok(mut thread) => thread.take(),
            Err(_) => {
                error!("State machine {} lock poisoned", self.name);
                return;
            }
        };

        let Some(handle) = handle else {
            self.shared
                .current
                .store(FsmState::END.raw(), Ordering::Release);
            return;
        };

        if self.shared.sender.send(FsmState::END).is_err() {
            warn!("State machine {} channel closed", self.name);
        }

        // The loop thread cannot join itself.
        if handle.thread().id() == std::thread::current().id() {
            return;
        }

        if handle.join().is_err() {
            error!("State machine {} panicked", self.name);
        }
        info!("State machine {} stopped", self.name);
    }
}

impl Drop for Fsm {
    fn drop(&mut self) {
        self.shutdown();
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use std::time::Duration;

    use serial_test::serial;

    use crate::testing::{init_logging, wait_until};

    use super::{FsmBuilder, FsmState};

    const CUSTOM: FsmState = FsmState::new(150);

    #[test]
    fn state_order() {
        assert!(FsmState::INIT < FsmState::WAITING_CONFIGURATION);
        assert!(FsmState::WAITING_CONFIGURATION < CUSTOM);
        assert!(CUSTOM < FsmState::READY);
        assert!(FsmState::READY < FsmState::END);
        assert_eq!(FsmState::READY.to_string(), "ready");
        assert_eq!(CUSTOM.to_string(), "state-150");
        assert_eq!(serde_json::to_value(FsmState::READY).unwrap(), serde_json::json!(200));
    }

    #[test]
    #[serial]
    fn callbacks_drive_the_loop() {
        init_logging();

        let changes = Arc::new(AtomicUsize::new(0));
        let counter = changes.clone();

        let fsm = FsmBuilder::new("drive")
            .state(FsmState::INIT, |_| async { FsmState::WAITING_CONFIGURATION })
            .state(FsmState::WAITING_CONFIGURATION, |context| async move {
                context.wait_transition().await
            })
            .state(FsmState::READY, |context| async move {
                context.wait_transition().await
            })
            .state_change(move |_, next| {
                counter.fetch_add(1, Ordering::SeqCst);
                next
            })
            .build();

        fsm.start().unwrap();
        assert!(wait_until(|| fsm.state() == FsmState::WAITING_CONFIGURATION));

        fsm.transit(FsmState::READY);
        assert!(wait_until(|| fsm.state() == FsmState::READY));
        assert_eq!(fsm.handle().previous_state(), FsmState::WAITING_CONFIGURATION);

        fsm.shutdown();
        assert_eq!(fsm.state(), FsmState::END);
        assert!(!fsm.is_running());
        assert_eq!(changes.load(Ordering::SeqCst), 3);

        // Idempotent, and a finished machine cannot be restarted.
        fsm.shutdown();
        assert!(fsm.start().is_err());
    }

    #[test]
    #[serial]
    fn missing_callback_ends() {
        let fsm = FsmBuilder::new("missing")
            .state(FsmState::INIT, |_| async { CUSTOM })
            .build();

        fsm.start().unwrap();
        assert!(wait_until(|| fsm.state() == FsmState::END));
        assert!(wait_until(|| !fsm.is_running()));
        fsm.shutdown();
    }

    #[test]
    #[serial]
    fn state_change_rewrites() {
        let fsm = FsmBuilder::new("rewrite")
            .state(FsmState::INIT, |_| async { FsmState::READY })
            .state(CUSTOM, |context| async move { context.wait_transition().await })
            .state_change(|_, next| if next == FsmState::READY { CUSTOM } else { next })
            .build();

        fsm.start().unwrap();
        assert!(wait_until(|| fsm.state() == CUSTOM));
        drop(fsm);
    }

    #[test]
    #[serial]
    fn next_state_and_configured() {
        let configured = Arc::new(AtomicBool::new(false));
        let flag = configured.clone();

        let fsm = FsmBuilder::new("polling")
            .configured(move || flag.load(Ordering::SeqCst))
            .state(FsmState::INIT, |_| async { FsmState::WAITING_CONFIGURATION })
            .state(FsmState::WAITING_CONFIGURATION, |context| async move {
                loop {
                    if context.configured() {
                        return FsmState::READY;
                    }
                    let next = context.next_state();
                    if next != context.state() {
                        return next;
                    }
                    tokio::time::sleep(Duration::from_millis(5)).await;
                }
            })
            .state(FsmState::READY, |context| async move {
                context.wait_transition().await
            })
            .build();

        let handle = fsm.handle();
        assert!(!handle.configured());
        assert!(handle.same(&fsm.handle()));

        fsm.start().unwrap();
        assert!(wait_until(|| handle.state() == FsmState::WAITING_CONFIGURATION));

        configured.store(true, Ordering::SeqCst);
        assert!(wait_until(|| handle.state() == FsmState::READY));
        assert!(handle.configured());

        fsm.shutdown();
        handle.transit(FsmState::READY);
        assert_eq!(handle.state(), FsmState::END);
    }

    #[test]
    fn unstarted_shutdown() {
        let fsm = FsmBuilder::new("unstarted").build();
        fsm.shutdown();
        assert_eq!(fsm.state(), FsmState::END);
        assert!(fsm.start().is_err());
    }
}
