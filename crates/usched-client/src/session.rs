//! Session lifecycle over an engine.

use std::{
    borrow::Cow,
    sync::{Mutex, MutexGuard, PoisonError},
};

use usched_core::{
    ConfigField, Engine, EngineError, EntryId, EntryRecord, ProtocolError, SessionConfig, UsageError,
    Verb,
};
use uuid::Uuid;

use crate::{
    ClientError, Request, ResultSet,
    channel::{ChannelKind, Channels, Run, Show, Stop},
};

struct SessionState<E> {
    engine: E,
    config: SessionConfig,
    /// Configuration changed since it was last pushed to the engine.
    dirty: bool,
    /// Usage code of a request rejected before reaching the engine.
    rejected: Option<UsageError>,
    channels: Channels,
}

/// One configured engine session.
///
/// A session exists only after the engine initialized successfully, and the
/// engine is torn down exactly once, when the session is destroyed or
/// dropped. Engine state, configuration and result channels sit behind a
/// single lock; every method holds it for its whole duration, and
/// [`Session::lock`] holds it across several steps.
pub struct Session<E: Engine> {
    id: Uuid,
    state: Mutex<SessionState<E>>,
}

impl<E: Engine> Session<E> {
    /// Initialize the engine with an empty configuration.
    ///
    /// # Errors
    /// Returns error if the engine fails to initialize.
    pub fn init(engine: E) -> Result<Self, ClientError> {
        Self::with_config(engine, SessionConfig::default())
    }

    /// Initialize the engine with a prepared configuration.
    ///
    /// # Errors
    /// Returns error if the configuration is invalid or the engine fails
    /// to initialize.
    pub fn with_config(mut engine: E, config: SessionConfig) -> Result<Self, ClientError> {
        config.validate()?;
        engine.init()?;

        let id = Uuid::new_v4();
        tracing::debug!(session = %id, remote = config.is_remote(), "Session initialized");

        Ok(Self {
            id,
            state: Mutex::new(SessionState {
                engine,
                config,
                dirty: true,
                rejected: None,
                channels: Channels::default(),
            }),
        })
    }

    /// Session identifier, for correlating logs.
    #[must_use]
    pub const fn id(&self) -> Uuid {
        self.id
    }

    /// Take the session lock for a multi-step exchange.
    ///
    /// # Errors
    /// Returns a protocol error if a previous holder panicked.
    pub fn lock(&self) -> Result<SessionGuard<'_, E>, ClientError> {
        let state = self
            .state
            .lock()
            .map_err(|_| ClientError::from(ProtocolError::Poisoned))?;
        Ok(SessionGuard { id: self.id, state })
    }

    /// Set the remote hostname used from the next request on.
    ///
    /// # Errors
    /// Returns a config error if the value is too long.
    pub fn set_hostname(&self, hostname: &str) -> Result<(), ClientError> {
        self.lock()?.set(ConfigField::Hostname, hostname)
    }

    /// Set the remote port used from the next request on.
    ///
    /// # Errors
    /// Returns a config error if the value is too long.
    pub fn set_port(&self, port: &str) -> Result<(), ClientError> {
        self.lock()?.set(ConfigField::Port, port)
    }

    /// Set the remote username used from the next request on.
    ///
    /// # Errors
    /// Returns a config error if the value is too long.
    pub fn set_username(&self, username: &str) -> Result<(), ClientError> {
        self.lock()?.set(ConfigField::Username, username)
    }

    /// Set the remote password used from the next request on.
    ///
    /// # Errors
    /// Returns a config error if the value is too long.
    pub fn set_password(&self, password: &str) -> Result<(), ClientError> {
        self.lock()?.set(ConfigField::Password, password)
    }

    /// Forward a request; see [`SessionGuard::submit`].
    ///
    /// # Errors
    /// Returns the engine failure, or a protocol error if a result is still
    /// unfreed.
    pub fn submit(&self, text: &str) -> Result<Verb, ClientError> {
        self.lock()?.submit(text)
    }

    /// Submit and collect the result in one critical section.
    ///
    /// # Errors
    /// See [`SessionGuard::request`].
    pub fn request(&self, text: &str) -> Result<ResultSet, ClientError> {
        self.lock()?.request(text)
    }

    /// IDs installed by the last run request.
    ///
    /// # Errors
    /// Returns a protocol error if the buffer is already borrowed.
    pub fn result_run(&self) -> Result<Vec<EntryId>, ClientError> {
        self.lock()?.take::<Run>()
    }

    /// IDs the last stop request tried to remove.
    ///
    /// # Errors
    /// Returns a protocol error if the buffer is already borrowed.
    pub fn result_stop(&self) -> Result<Vec<EntryId>, ClientError> {
        self.lock()?.take::<Stop>()
    }

    /// Entries matched by the last show request, in engine order.
    ///
    /// # Errors
    /// Returns a protocol error if the buffer is already borrowed or cannot
    /// be decoded.
    pub fn result_show(&self) -> Result<Vec<EntryRecord>, ClientError> {
        self.lock()?.take::<Show>()
    }

    /// Usage error code of the last request, 0 if none.
    ///
    /// # Errors
    /// Returns a protocol error if the lock is poisoned.
    pub fn usage_error(&self) -> Result<i32, ClientError> {
        Ok(self.lock()?.usage_error())
    }

    /// Tear the session down. Equivalent to dropping it.
    pub fn destroy(self) {
        drop(self);
    }
}

impl<E: Engine> Drop for Session<E> {
    fn drop(&mut self) {
        let state = self.state.get_mut().unwrap_or_else(PoisonError::into_inner);
        if let Some(verb) = state.channels.pending() {
            tracing::debug!(session = %self.id, %verb, "Freeing result on teardown");
        }
        state.channels.free_all(&mut state.engine);
        state.engine.destroy();
        tracing::debug!(session = %self.id, "Session destroyed");
    }
}

/// Exclusive access to a session.
///
/// Holding the guard keeps other threads from submitting, fetching or
/// reconfiguring until it is dropped.
pub struct SessionGuard<'a, E: Engine> {
    id: Uuid,
    state: MutexGuard<'a, SessionState<E>>,
}

impl<E: Engine> SessionGuard<'_, E> {
    /// Set one configuration field.
    ///
    /// # Errors
    /// Returns a config error if the value is too long.
    pub fn set(&mut self, field: ConfigField, value: &str) -> Result<(), ClientError> {
        self.state.config.set(field, value)?;
        self.state.dirty = true;
        tracing::debug!(session = %self.id, ?field, "Configuration updated");
        Ok(())
    }

    /// Current configuration.
    #[must_use]
    pub fn config(&self) -> &SessionConfig {
        &self.state.config
    }

    /// Forward a request and mark its result channel populated.
    ///
    /// Text after an embedded NUL is not sent. Configuration changes made
    /// since the last request are applied first.
    ///
    /// # Errors
    /// Returns a parse error for an empty request or unknown verb, a
    /// protocol error if any result buffer is still unfreed, or the
    /// engine's failure.
    pub fn submit(&mut self, text: &str) -> Result<Verb, ClientError> {
        let state = &mut *self.state;
        let request = match Request::parse(text) {
            Ok(request) => request,
            Err(e) => {
                if let EngineError::Parse { usage, .. } = &e {
                    state.rejected = Some(*usage);
                }
                return Err(e.into());
            }
        };
        let verb = request.verb();

        if let Some(pending) = state.channels.pending() {
            tracing::warn!(session = %self.id, %pending, %verb, "Submit with unfreed result");
            return Err(ProtocolError::PendingResult(pending).into());
        }

        if state.dirty {
            state.engine.configure(&state.config)?;
            state.dirty = false;
        }

        tracing::debug!(session = %self.id, %verb, "Submitting request");
        state.rejected = None;
        if let Err(e) = state.engine.request(request.as_c_str()) {
            tracing::debug!(session = %self.id, %verb, status = e.status(), "Request failed: {e}");
            return Err(e.into());
        }

        state.channels.populate(verb);
        Ok(verb)
    }

    /// Borrow the buffer of channel `K`. Must be followed by [`Self::free`].
    ///
    /// # Errors
    /// See [`crate::ResultChannel::get`].
    pub fn get<K: ChannelKind>(&mut self) -> Result<Cow<'_, [K::Item]>, ClientError> {
        let state = &mut *self.state;
        state.channels.channel::<K>().get(&mut state.engine)
    }

    /// Release the buffer of channel `K`; no-op when empty.
    pub fn free<K: ChannelKind>(&mut self) {
        let state = &mut *self.state;
        state.channels.channel::<K>().free(&mut state.engine);
    }

    /// Get, copy and free channel `K`.
    ///
    /// # Errors
    /// See [`crate::ResultChannel::get`].
    pub fn take<K: ChannelKind>(&mut self) -> Result<Vec<K::Item>, ClientError> {
        let state = &mut *self.state;
        state.channels.channel::<K>().take(&mut state.engine)
    }

    /// Submit `text` and collect the matching result.
    ///
    /// Stop requests return the IDs the engine reported.
    ///
    /// # Errors
    /// See [`Self::submit`] and [`Self::take`].
    pub fn request(&mut self, text: &str) -> Result<ResultSet, ClientError> {
        let result = match self.submit(text)? {
            Verb::Run => ResultSet::Ids(self.take::<Run>()?),
            Verb::Stop => ResultSet::Ids(self.take::<Stop>()?),
            Verb::Show => ResultSet::Records(self.take::<Show>()?),
        };
        tracing::debug!(session = %self.id, count = result.len(), "Request completed");
        Ok(result)
    }

    /// Usage error code of the last request, 0 if none.
    ///
    /// Covers requests rejected here as well as those the engine parsed.
    #[must_use]
    pub fn usage_error(&self) -> i32 {
        self.state
            .rejected
            .map_or_else(|| self.state.engine.usage_error(), UsageError::code)
    }
}
