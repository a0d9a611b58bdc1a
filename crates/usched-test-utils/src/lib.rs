//! Test doubles for uSched client code.
//!
//! [`FakeEngine`] keeps its schedule in memory and understands a small
//! subset of the request language:
//!
//! ```text
//! run '<command>' <schedule> [and in <n> <unit> ...]
//!     where <schedule> is (now | in <n> <unit>) [then every <n> <unit>] [until in <n> <unit>]
//! stop 'all' | stop '<hex id>[,<hex id>...]'
//! show 'all' | show '<hex id>[,<hex id>...]'
//! ```
//!
//! Like the native library it has a single result slot shared by every
//! verb, and it records each call in a [`Journal`] that tests can inspect
//! after the engine has been moved into a session.

use std::{
    ffi::CStr,
    sync::{
        Arc, Mutex, MutexGuard, PoisonError,
        atomic::{AtomicU32, Ordering},
    },
    time::{SystemTime, UNIX_EPOCH},
};

use bytes::{Bytes, BytesMut};
use usched_core::{
    Engine, EngineError, EntryId, EntryRecord, FixedBytes, RawResult, SessionConfig, UsageError,
    Verb,
};

/// Calls an engine received.
#[derive(Debug, Clone, Default)]
pub struct Journal {
    pub inits: usize,
    pub destroys: usize,
    /// Configuration as pushed, one element per push.
    pub configs: Vec<SessionConfig>,
    /// Request text exactly as it reached the engine.
    pub requests: Vec<String>,
    pub frees: Vec<Verb>,
}

/// Shared view of a [`FakeEngine`]'s journal.
pub type JournalHandle = Arc<Mutex<Journal>>;

/// Shared engine clock, in epoch seconds.
pub type ClockHandle = Arc<AtomicU32>;

#[derive(Debug, Default)]
enum Slot {
    #[default]
    Empty,
    Ids(Vec<EntryId>),
    Records(Vec<EntryRecord>),
    Encoded { bytes: Bytes, count: usize },
}

/// In-memory scheduling engine.
#[derive(Debug)]
pub struct FakeEngine {
    journal: JournalHandle,
    clock: ClockHandle,
    entries: Vec<EntryRecord>,
    slot: Slot,
    next_id: EntryId,
    usage_error: i32,
    username: Option<String>,
    fail_init: bool,
    transport_failure: Option<i32>,
    reverse_show: bool,
}

impl Default for FakeEngine {
    fn default() -> Self {
        Self::new()
    }
}

fn system_now() -> u32 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .ok()
        .and_then(|d| u32::try_from(d.as_secs()).ok())
        .unwrap_or(0)
}

fn rejected(usage: UsageError, offending: &str) -> EngineError {
    EngineError::Parse {
        usage,
        offending: Some(offending.to_owned()),
    }
}

fn unit_seconds(unit: &str) -> Option<u32> {
    let seconds = match unit.to_ascii_lowercase().trim_end_matches('s') {
        "second" => 1,
        "minute" => 60,
        "hour" => 3_600,
        "day" => 86_400,
        "week" => 604_800,
        _ => return None,
    };
    Some(seconds)
}

/// `<n> <unit>` as seconds.
fn interval<'a>(tokens: &mut impl Iterator<Item = &'a str>) -> Result<u32, EngineError> {
    let insufficient = || EngineError::usage(UsageError::InsufficientArgs);

    let count = tokens.next().ok_or_else(insufficient)?;
    let count: u32 = count
        .parse()
        .map_err(|_| rejected(UsageError::InvalidArgument, count))?;

    let unit = tokens.next().ok_or_else(insufficient)?;
    let scale = unit_seconds(unit).ok_or_else(|| rejected(UsageError::InvalidAdverb, unit))?;

    count
        .checked_mul(scale)
        .ok_or_else(|| rejected(UsageError::InvalidArgument, "interval overflows"))
}

fn expect_preposition(token: Option<&str>, expected: &str) -> Result<(), EngineError> {
    match token {
        None => Err(EngineError::usage(UsageError::InsufficientArgs)),
        Some(word) if word.eq_ignore_ascii_case(expected) => Ok(()),
        Some(word) => Err(rejected(UsageError::InvalidPreposition, word)),
    }
}

/// Timing of one sub-request.
#[derive(Debug, Default)]
struct Schedule {
    trigger: u32,
    step: u32,
    expire: u32,
}

/// `'all'` yields `None`; otherwise comma-separated hex IDs.
fn subject(args: &[String]) -> Result<Option<Vec<EntryId>>, EngineError> {
    let subject = match args {
        [] => return Err(EngineError::usage(UsageError::InsufficientArgs)),
        [subject] => subject,
        [_, extra, ..] => return Err(rejected(UsageError::TooManyArgs, extra)),
    };

    if subject.eq_ignore_ascii_case("all") {
        return Ok(None);
    }

    subject
        .split(',')
        .map(|id| {
            let id = id.trim();
            let digits = id.trim_start_matches("0x");
            EntryId::from_str_radix(digits, 16)
                .map_err(|_| rejected(UsageError::InvalidArgument, id))
        })
        .collect::<Result<Vec<_>, _>>()
        .map(Some)
}

impl FakeEngine {
    /// Empty engine on the system clock.
    #[must_use]
    pub fn new() -> Self {
        Self {
            journal: JournalHandle::default(),
            clock: Arc::new(AtomicU32::new(system_now())),
            entries: Vec::new(),
            slot: Slot::Empty,
            next_id: 1,
            usage_error: 0,
            username: None,
            fail_init: false,
            transport_failure: None,
            reverse_show: false,
        }
    }

    /// Pin the clock to `now` (epoch seconds).
    #[must_use]
    pub fn with_clock(self, now: u32) -> Self {
        self.clock.store(now, Ordering::SeqCst);
        self
    }

    /// Preload the schedule.
    #[must_use]
    pub fn with_entries(mut self, entries: Vec<EntryRecord>) -> Self {
        if let Some(max) = entries.iter().map(|e| e.id).max() {
            self.next_id = self.next_id.max(max + 1);
        }
        self.entries = entries;
        self
    }

    /// Make [`Engine::init`] fail.
    #[must_use]
    pub const fn fail_init(mut self) -> Self {
        self.fail_init = true;
        self
    }

    /// Make every request fail as unreachable with `code`.
    #[must_use]
    pub const fn fail_transport(mut self, code: i32) -> Self {
        self.transport_failure = Some(code);
        self
    }

    /// Report show results newest first.
    #[must_use]
    pub const fn reverse_show(mut self) -> Self {
        self.reverse_show = true;
        self
    }

    pub fn journal(&self) -> MutexGuard<'_, Journal> {
        self.journal.lock().unwrap_or_else(PoisonError::into_inner)
    }

    #[must_use]
    pub fn journal_handle(&self) -> JournalHandle {
        Arc::clone(&self.journal)
    }

    #[must_use]
    pub fn clock_handle(&self) -> ClockHandle {
        Arc::clone(&self.clock)
    }

    /// Put IDs in the result slot, as a run or stop request would.
    pub fn stage_ids(&mut self, ids: &[EntryId]) {
        self.slot = Slot::Ids(ids.to_vec());
    }

    /// Put decoded records in the result slot.
    pub fn stage_records(&mut self, records: Vec<EntryRecord>) {
        self.slot = Slot::Records(records);
    }

    /// Put raw bytes claiming `count` records in the result slot.
    pub fn stage_encoded(&mut self, bytes: impl Into<Bytes>, count: usize) {
        self.slot = Slot::Encoded {
            bytes: bytes.into(),
            count,
        };
    }

    /// Current schedule.
    #[must_use]
    pub fn entries(&self) -> &[EntryRecord] {
        &self.entries
    }

    fn now(&self) -> u32 {
        self.clock.load(Ordering::SeqCst)
    }

    fn dispatch(&mut self, text: &str) -> Result<Slot, EngineError> {
        let tokens = shlex::split(text)
            .ok_or_else(|| rejected(UsageError::InvalidArgument, "unbalanced quotes"))?;
        let (word, args) = tokens
            .split_first()
            .ok_or_else(|| EngineError::usage(UsageError::InsufficientArgs))?;
        let verb = Verb::from_word(word).ok_or_else(|| rejected(UsageError::InvalidOp, word))?;

        let now = self.now();
        self.entries.retain(|e| !e.is_expired(now));

        match verb {
            Verb::Run => self.run(args, now),
            Verb::Stop => Ok(self.stop(subject(args)?)),
            Verb::Show => self.show(subject(args)?),
        }
    }

    fn run(&mut self, args: &[String], now: u32) -> Result<Slot, EngineError> {
        let (command, rest) = args
            .split_first()
            .ok_or_else(|| EngineError::usage(UsageError::InsufficientArgs))?;
        let mut tokens = rest.iter().map(String::as_str);

        let trigger = match tokens.next() {
            None => return Err(EngineError::usage(UsageError::InsufficientArgs)),
            Some(word) if word.eq_ignore_ascii_case("now") => now,
            Some(word) if word.eq_ignore_ascii_case("in") => {
                now.saturating_add(interval(&mut tokens)?)
            }
            Some(word) => return Err(rejected(UsageError::InvalidPreposition, word)),
        };

        // Each `and` starts another entry for the same command.
        let mut current = Schedule {
            trigger,
            ..Schedule::default()
        };
        let mut schedules = Vec::new();
        while let Some(conjunction) = tokens.next() {
            match conjunction.to_ascii_lowercase().as_str() {
                "and" => {
                    expect_preposition(tokens.next(), "in")?;
                    let next = Schedule {
                        trigger: now.saturating_add(interval(&mut tokens)?),
                        ..Schedule::default()
                    };
                    schedules.push(std::mem::replace(&mut current, next));
                }
                "then" if current.step == 0 && current.expire == 0 => {
                    expect_preposition(tokens.next(), "every")?;
                    current.step = interval(&mut tokens)?;
                }
                "until" if current.expire == 0 => {
                    expect_preposition(tokens.next(), "in")?;
                    current.expire = now.saturating_add(interval(&mut tokens)?);
                }
                "then" | "until" => {
                    return Err(rejected(UsageError::UnexpectedConjunction, conjunction));
                }
                _ => return Err(rejected(UsageError::InvalidConjunction, conjunction)),
            }
        }
        schedules.push(current);

        let ids = schedules
            .into_iter()
            .map(|schedule| self.install(command, &schedule))
            .collect();
        Ok(Slot::Ids(ids))
    }

    fn install(&mut self, command: &str, schedule: &Schedule) -> EntryId {
        let id = self.next_id;
        self.next_id += 1;

        let mut entry = EntryRecord::new(id);
        entry.trigger = schedule.trigger;
        entry.step = schedule.step;
        entry.expire = schedule.expire;
        entry.subj = command.as_bytes().to_vec();
        if let Some(name) = &self.username {
            entry.username = FixedBytes::from_slice_padded(name.as_bytes()).unwrap_or_default();
        }

        tracing::debug!(id, ?schedule, "Fake engine scheduled entry");
        self.entries.push(entry);
        id
    }

    fn stop(&mut self, ids: Option<Vec<EntryId>>) -> Slot {
        let ids = ids.unwrap_or_else(|| self.entries.iter().map(|e| e.id).collect());
        self.entries.retain(|e| !ids.contains(&e.id));
        tracing::debug!(count = ids.len(), "Fake engine stopped entries");
        Slot::Ids(ids)
    }

    fn show(&self, ids: Option<Vec<EntryId>>) -> Result<Slot, EngineError> {
        let mut shown: Vec<&EntryRecord> = self
            .entries
            .iter()
            .filter(|e| ids.as_ref().is_none_or(|ids| ids.contains(&e.id)))
            .collect();
        if self.reverse_show {
            shown.reverse();
        }

        let mut bytes = BytesMut::new();
        for entry in &shown {
            entry.encode(&mut bytes).map_err(|e| EngineError::Transport {
                code: 0,
                message: e.to_string(),
            })?;
        }

        Ok(Slot::Encoded {
            bytes: bytes.freeze(),
            count: shown.len(),
        })
    }
}

impl Engine for FakeEngine {
    fn init(&mut self) -> Result<(), EngineError> {
        self.journal().inits += 1;
        if self.fail_init {
            return Err(EngineError::Transport {
                code: 111,
                message: "connection refused".into(),
            });
        }
        Ok(())
    }

    fn configure(&mut self, config: &SessionConfig) -> Result<(), EngineError> {
        self.username = config.username().map(str::to_owned);
        self.journal().configs.push(config.clone());
        Ok(())
    }

    fn request(&mut self, request: &CStr) -> Result<(), EngineError> {
        let text = request.to_string_lossy().into_owned();
        self.journal().requests.push(text.clone());

        if let Some(code) = self.transport_failure {
            return Err(EngineError::Transport {
                code,
                message: "connection refused".into(),
            });
        }

        match self.dispatch(&text) {
            Ok(slot) => {
                self.usage_error = 0;
                self.slot = slot;
                Ok(())
            }
            Err(err) => {
                if let EngineError::Parse { usage, .. } = &err {
                    self.usage_error = usage.code();
                }
                Err(err)
            }
        }
    }

    fn result(&mut self, _verb: Verb) -> RawResult<'_> {
        match &self.slot {
            Slot::Empty => RawResult::Empty,
            Slot::Ids(ids) => RawResult::Ids(ids),
            Slot::Records(records) => RawResult::Records(records),
            Slot::Encoded { bytes, count } => RawResult::Encoded {
                bytes,
                count: *count,
            },
        }
    }

    fn free_result(&mut self, verb: Verb) {
        self.slot = Slot::Empty;
        self.journal().frees.push(verb);
    }

    fn usage_error(&self) -> i32 {
        self.usage_error
    }

    fn destroy(&mut self) {
        self.slot = Slot::Empty;
        self.entries.clear();
        self.journal().destroys += 1;
    }
}
