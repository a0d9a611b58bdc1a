//! Result channels over engine-owned buffers.
//!
//! Every verb has one channel. A successful request populates it; the
//! caller then gets the buffer, copies what it needs and frees it. The
//! slice handed out by [`ResultChannel::get`] borrows the engine, so the
//! compiler rejects any use of it after [`ResultChannel::free`].

use std::{borrow::Cow, marker::PhantomData};

use usched_core::{Engine, EntryId, EntryRecord, ProtocolError, RawResult, Verb};

use crate::ClientError;

mod sealed {
    pub trait Sealed {}
}

/// Selects the verb and element type of a channel.
pub trait ChannelKind: sealed::Sealed + Sized {
    /// The verb whose results this channel carries.
    const VERB: Verb;
    /// One element of the result buffer.
    type Item: Clone;

    #[doc(hidden)]
    fn select(channels: &mut Channels) -> &mut ResultChannel<Self>;

    #[doc(hidden)]
    fn items(raw: RawResult<'_>) -> Result<Cow<'_, [Self::Item]>, ClientError>;
}

/// IDs of entries installed by a run request, in submission order.
#[derive(Debug)]
pub enum Run {}

/// IDs of entries a stop request tried to remove.
#[derive(Debug)]
pub enum Stop {}

/// Entries matched by a show request, in engine order.
#[derive(Debug)]
pub enum Show {}

impl sealed::Sealed for Run {}
impl sealed::Sealed for Stop {}
impl sealed::Sealed for Show {}

fn ids(verb: Verb, raw: RawResult<'_>) -> Result<Cow<'_, [EntryId]>, ClientError> {
    match raw {
        RawResult::Empty => Ok(Cow::Borrowed(&[])),
        RawResult::Ids(ids) => Ok(Cow::Borrowed(ids)),
        RawResult::Records(_) | RawResult::Encoded { .. } => {
            Err(ProtocolError::UnexpectedShape(verb).into())
        }
    }
}

impl ChannelKind for Run {
    const VERB: Verb = Verb::Run;
    type Item = EntryId;

    fn select(channels: &mut Channels) -> &mut ResultChannel<Self> {
        &mut channels.run
    }

    fn items(raw: RawResult<'_>) -> Result<Cow<'_, [EntryId]>, ClientError> {
        ids(Self::VERB, raw)
    }
}

impl ChannelKind for Stop {
    const VERB: Verb = Verb::Stop;
    type Item = EntryId;

    fn select(channels: &mut Channels) -> &mut ResultChannel<Self> {
        &mut channels.stop
    }

    fn items(raw: RawResult<'_>) -> Result<Cow<'_, [EntryId]>, ClientError> {
        ids(Self::VERB, raw)
    }
}

impl ChannelKind for Show {
    const VERB: Verb = Verb::Show;
    type Item = EntryRecord;

    fn select(channels: &mut Channels) -> &mut ResultChannel<Self> {
        &mut channels.show
    }

    fn items(raw: RawResult<'_>) -> Result<Cow<'_, [EntryRecord]>, ClientError> {
        match raw {
            RawResult::Empty => Ok(Cow::Borrowed(&[])),
            RawResult::Records(records) => Ok(Cow::Borrowed(records)),
            RawResult::Encoded { mut bytes, count } => {
                Ok(Cow::Owned(EntryRecord::decode_many(&mut bytes, count)?))
            }
            RawResult::Ids(_) => Err(ProtocolError::UnexpectedShape(Self::VERB).into()),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
enum ChannelState {
    #[default]
    Empty,
    Populated,
    Borrowed,
}

/// Get/free protocol for one verb's result buffer.
#[derive(Debug)]
pub struct ResultChannel<K> {
    state: ChannelState,
    _kind: PhantomData<K>,
}

impl<K> Default for ResultChannel<K> {
    fn default() -> Self {
        Self {
            state: ChannelState::Empty,
            _kind: PhantomData,
        }
    }
}

impl<K: ChannelKind> ResultChannel<K> {
    /// Whether the engine holds a buffer for this channel that was not freed.
    #[must_use]
    pub fn is_pending(&self) -> bool {
        self.state != ChannelState::Empty
    }

    pub(crate) fn populate(&mut self) {
        self.state = ChannelState::Populated;
    }

    /// Borrow the buffer produced by the last matching request.
    ///
    /// An empty channel yields an empty slice.
    ///
    /// # Errors
    /// Returns [`ProtocolError::DoubleGet`] if the buffer was already fetched
    /// and not freed, or an error if the engine buffer has the wrong shape.
    pub fn get<'e, E: Engine + ?Sized>(
        &mut self,
        engine: &'e mut E,
    ) -> Result<Cow<'e, [K::Item]>, ClientError> {
        match self.state {
            ChannelState::Empty => return Ok(Cow::Borrowed(&[])),
            ChannelState::Borrowed => {
                tracing::warn!(verb = %K::VERB, "Result fetched twice without free");
                return Err(ProtocolError::DoubleGet(K::VERB).into());
            }
            ChannelState::Populated => {}
        }

        let items = K::items(engine.result(K::VERB))?;
        self.state = ChannelState::Borrowed;
        tracing::debug!(verb = %K::VERB, count = items.len(), "Result fetched");
        Ok(items)
    }

    /// Release the buffer. Does nothing when no buffer is populated.
    pub fn free<E: Engine + ?Sized>(&mut self, engine: &mut E) {
        if self.state == ChannelState::Empty {
            return;
        }
        engine.free_result(K::VERB);
        self.state = ChannelState::Empty;
        tracing::debug!(verb = %K::VERB, "Result freed");
    }

    /// Get, copy into owned storage, then free.
    ///
    /// # Errors
    /// See [`Self::get`]. The buffer is left in place on error.
    pub fn take<E: Engine + ?Sized>(&mut self, engine: &mut E) -> Result<Vec<K::Item>, ClientError> {
        let items = self.get(engine)?.into_owned();
        self.free(engine);
        Ok(items)
    }
}

/// The three channels of one session.
#[derive(Debug, Default)]
pub struct Channels {
    run: ResultChannel<Run>,
    stop: ResultChannel<Stop>,
    show: ResultChannel<Show>,
}

impl Channels {
    /// Channel for `K`.
    pub fn channel<K: ChannelKind>(&mut self) -> &mut ResultChannel<K> {
        K::select(self)
    }

    /// First verb whose buffer has not been freed.
    #[must_use]
    pub fn pending(&self) -> Option<Verb> {
        if self.run.is_pending() {
            Some(Verb::Run)
        } else if self.stop.is_pending() {
            Some(Verb::Stop)
        } else if self.show.is_pending() {
            Some(Verb::Show)
        } else {
            None
        }
    }

    pub(crate) fn populate(&mut self, verb: Verb) {
        match verb {
            Verb::Run => self.run.populate(),
            Verb::Stop => self.stop.populate(),
            Verb::Show => self.show.populate(),
        }
    }

    /// Free every channel.
    pub fn free_all<E: Engine + ?Sized>(&mut self, engine: &mut E) {
        self.run.free(engine);
        self.stop.free(engine);
        self.show.free(engine);
    }
}
