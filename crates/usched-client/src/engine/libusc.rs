//! Engine backed by the native uSched client library.
//!
//! The library keeps all of its state in process globals, so at most one
//! [`LibuscEngine`] may exist at a time.

#![allow(unsafe_code)]

use std::{
    ffi::{CStr, CString, c_char, c_int},
    io,
    ptr,
    slice,
    sync::atomic::{AtomicBool, Ordering},
};

use usched_core::{
    ConfigField, Engine, EngineError, EntryRecord, FixedBytes, RawResult, SessionConfig,
    UsageError, Verb,
    entry::{AGREED_KEY_LEN, CONTEXT_LEN, RESERVED_LEN, SESSION_LEN, USERNAME_LEN},
};

static ACQUIRED: AtomicBool = AtomicBool::new(false);

/// In-memory entry layout of the library's show results.
#[repr(C, packed(4))]
struct RawEntry {
    id: u64,
    flags: u32,
    uid: u32,
    gid: u32,
    trigger: u32,
    step: u32,
    expire: u32,
    psize: u32,
    username: [u8; USERNAME_LEN],
    session: [u8; SESSION_LEN],
    payload: *const u8,
    subj_size: u32,
    subj: *const u8,
    reserved: [u8; RESERVED_LEN],
    context: [u8; CONTEXT_LEN],
    agreed_key: [u8; AGREED_KEY_LEN],
    nonce: u64,
}

#[link(name = "usc")]
unsafe extern "C" {
    fn usched_init() -> c_int;
    fn usched_request(req: *mut c_char) -> c_int;
    fn usched_opt_set_remote_hostname(hostname: *mut c_char) -> c_int;
    fn usched_opt_set_remote_port(port: *mut c_char) -> c_int;
    fn usched_opt_set_remote_username(username: *mut c_char) -> c_int;
    fn usched_opt_set_remote_password(password: *mut c_char) -> c_int;
    fn usched_result_get_run(entry_list: *mut *mut u64, nmemb: *mut usize);
    fn usched_result_get_stop(entry_list: *mut *mut u64, nmemb: *mut usize);
    fn usched_result_get_show(entry_list: *mut *mut RawEntry, nmemb: *mut usize);
    fn usched_result_free_run();
    fn usched_result_free_stop();
    fn usched_result_free_show();
    fn usched_usage_error() -> c_int;
    fn usched_destroy();
}

/// Engine driving `libusc`.
#[derive(Debug)]
pub struct LibuscEngine {
    /// Show results converted out of the library buffer until freed.
    staged: Vec<EntryRecord>,
}

impl LibuscEngine {
    /// Claim the process-wide library.
    ///
    /// # Errors
    /// Returns a config error if another engine already holds it.
    pub fn acquire() -> Result<Self, EngineError> {
        if ACQUIRED.swap(true, Ordering::AcqRel) {
            return Err(EngineError::Config(
                "libusc is already in use by another session".into(),
            ));
        }
        Ok(Self { staged: Vec::new() })
    }
}

impl Drop for LibuscEngine {
    fn drop(&mut self) {
        ACQUIRED.store(false, Ordering::Release);
    }
}

fn last_os_error(context: &str) -> EngineError {
    let err = io::Error::last_os_error();
    EngineError::Transport {
        code: err.raw_os_error().unwrap_or(-1),
        message: format!("{context}: {err}"),
    }
}

/// Copy one library entry into an owned record.
///
/// # Safety
/// `raw.payload` and `raw.subj` must be null or point to at least
/// `psize`/`subj_size` readable bytes.
unsafe fn to_record(raw: &RawEntry) -> EntryRecord {
    let (payload, psize) = (raw.payload, raw.psize as usize);
    let (subj, subj_size) = (raw.subj, raw.subj_size as usize);

    // SAFETY: guaranteed by the caller.
    let copy = |ptr: *const u8, len: usize| unsafe {
        if ptr.is_null() || len == 0 {
            Vec::new()
        } else {
            slice::from_raw_parts(ptr, len).to_vec()
        }
    };

    EntryRecord {
        id: raw.id,
        flags: raw.flags,
        uid: raw.uid,
        gid: raw.gid,
        trigger: raw.trigger,
        step: raw.step,
        expire: raw.expire,
        username: FixedBytes::new(raw.username),
        session: FixedBytes::new(raw.session),
        payload: copy(payload, psize),
        subj: copy(subj, subj_size),
        reserved: FixedBytes::new(raw.reserved),
        context: FixedBytes::new(raw.context),
        agreed_key: FixedBytes::new(raw.agreed_key),
        nonce: raw.nonce,
    }
}

impl Engine for LibuscEngine {
    fn init(&mut self) -> Result<(), EngineError> {
        // SAFETY: no arguments; library allocates its own state.
        if unsafe { usched_init() } < 0 {
            return Err(last_os_error("usched_init"));
        }
        Ok(())
    }

    fn configure(&mut self, config: &SessionConfig) -> Result<(), EngineError> {
        let setters: [(ConfigField, unsafe extern "C" fn(*mut c_char) -> c_int); 4] = [
            (ConfigField::Hostname, usched_opt_set_remote_hostname),
            (ConfigField::Port, usched_opt_set_remote_port),
            (ConfigField::Username, usched_opt_set_remote_username),
            (ConfigField::Password, usched_opt_set_remote_password),
        ];

        for (field, setter) in setters {
            let Some(value) = config.get(field) else {
                continue;
            };
            let value = CString::new(value)
                .map_err(|_| EngineError::Config(format!("{field:?} contains a NUL byte")))?;
            // SAFETY: the library copies the string and does not write to it.
            if unsafe { setter(value.as_ptr().cast_mut()) } < 0 {
                return Err(EngineError::Config(format!("{field:?} rejected by libusc")));
            }
        }
        Ok(())
    }

    fn request(&mut self, request: &CStr) -> Result<(), EngineError> {
        // SAFETY: the library reads the NUL-terminated string only.
        if unsafe { usched_request(request.as_ptr().cast_mut()) } == 0 {
            return Ok(());
        }

        match UsageError::from_code(self.usage_error()) {
            Some(usage) => Err(EngineError::usage(usage)),
            None => Err(last_os_error("usched_request")),
        }
    }

    fn result(&mut self, verb: Verb) -> RawResult<'_> {
        let mut nmemb: usize = 0;
        match verb {
            Verb::Run | Verb::Stop => {
                let mut ids: *mut u64 = ptr::null_mut();
                // SAFETY: out-pointers are valid for writes.
                unsafe {
                    if verb == Verb::Run {
                        usched_result_get_run(&raw mut ids, &raw mut nmemb);
                    } else {
                        usched_result_get_stop(&raw mut ids, &raw mut nmemb);
                    }
                }
                if ids.is_null() || nmemb == 0 {
                    return RawResult::Empty;
                }
                // SAFETY: the buffer holds `nmemb` IDs until the matching
                // free, which needs `&mut self` and so ends this borrow.
                RawResult::Ids(unsafe { slice::from_raw_parts(ids, nmemb) })
            }
            Verb::Show => {
                let mut entries: *mut RawEntry = ptr::null_mut();
                // SAFETY: out-pointers are valid for writes.
                unsafe { usched_result_get_show(&raw mut entries, &raw mut nmemb) };
                if entries.is_null() || nmemb == 0 {
                    return RawResult::Empty;
                }
                // SAFETY: the library hands out `nmemb` entries whose payload
                // and subject buffers match their sizes.
                self.staged = unsafe { slice::from_raw_parts(entries, nmemb) }
                    .iter()
                    .map(|raw| unsafe { to_record(raw) })
                    .collect();
                RawResult::Records(&self.staged)
            }
        }
    }

    fn free_result(&mut self, verb: Verb) {
        // SAFETY: the library tolerates freeing an empty result.
        unsafe {
            match verb {
                Verb::Run => usched_result_free_run(),
                Verb::Stop => usched_result_free_stop(),
                Verb::Show => usched_result_free_show(),
            }
        }
        if verb == Verb::Show {
            self.staged.clear();
        }
    }

    fn usage_error(&self) -> i32 {
        // SAFETY: reads library state only.
        unsafe { usched_usage_error() }
    }

    fn destroy(&mut self) {
        self.staged.clear();
        // SAFETY: called once, after every result was freed.
        unsafe { usched_destroy() };
    }
}
