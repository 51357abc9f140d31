use std::collections::HashMap;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Mutex;

/// Memoized statement totals. Entries never go stale within a generation.
pub trait CountCache: Send + Sync {
    fn get(&self, key: &str) -> Option<i64>;
    fn set(&self, key: &str, count: i64);
}

struct DummyCountCache;

struct LruState {
    entries: HashMap<String, (i64, u64)>,
    tick: u64,
}

pub struct LruCountCache {
    state: Mutex<LruState>,
    max_size: usize,
}

/// A bounded cache, or one which never keeps anything when `max_size` is 0.
pub fn count_cache(max_size: usize) -> Box<dyn CountCache> {
    if max_size == 0 {
        debug!("count cache disabled");
        Box::new(DummyCountCache {})
    } else {
        Box::new(LruCountCache::new(max_size))
    }
}

impl CountCache for DummyCountCache {
    fn get(&self, key: &str) -> Option<i64> {
        trace!("dummy get count '{}'", key);
        None
    }

    fn set(&self, key: &str, _count: i64) {
        trace!("dummy set count '{}'", key);
    }
}

impl LruCountCache {
    pub fn new(max_size: usize) -> LruCountCache {
        LruCountCache {
            state: Mutex::new(LruState {
                entries: HashMap::new(),
                tick: 0,
            }),
            max_size,
        }
    }

    pub fn len(&self) -> usize {
        match self.state.lock() {
            Ok(state) => state.entries.len(),
            Err(_) => 0,
        }
    }
}

impl CountCache for LruCountCache {
    fn get(&self, key: &str) -> Option<i64> {
        let mut state = self.state.lock().ok()?;

        state.tick += 1;
        let tick = state.tick;

        match state.entries.get_mut(key) {
            Some(entry) => {
                trace!("get count '{}' = {}", key, entry.0);
                entry.1 = tick;
                Some(entry.0)
            }
            None => None,
        }
    }

    fn set(&self, key: &str, count: i64) {
        let mut state = match self.state.lock() {
            Ok(s) => s,
            Err(_) => return,
        };

        state.tick += 1;
        let tick = state.tick;

        trace!("set count '{}' = {}", key, count);
        state.entries.insert(key.to_string(), (count, tick));

        while state.entries.len() > self.max_size {
            let oldest = state
                .entries
                .iter()
                .min_by_key(|(_, (_, last_access))| *last_access)
                .map(|(k, _)| k.clone());

            match oldest {
                Some(k) => {
                    trace!("max_size reached ({}), clearing '{}'", self.max_size, k);
                    state.entries.remove(&k);
                }
                None => break,
            }
        }
    }
}

pub trait Clock: Send + Sync {
    fn now_millis(&self) -> i64;
}

pub struct SystemClock;

impl Clock for SystemClock {
    fn now_millis(&self) -> i64 {
        chrono::Utc::now().timestamp_millis()
    }
}

/// A clock which only moves when told to.
#[derive(Default)]
pub struct ManualClock {
    now: AtomicI64,
}

impl ManualClock {
    pub fn new(now: i64) -> ManualClock {
        ManualClock {
            now: AtomicI64::new(now),
        }
    }

    pub fn advance(&self, millis: i64) {
        self.now.fetch_add(millis, Ordering::SeqCst);
    }
}

impl Clock for ManualClock {
    fn now_millis(&self) -> i64 {
        self.now.load(Ordering::SeqCst)
    }
}

/// Folder ids whose tag view was recently hidden, newest first.
pub struct HiddenFolders {
    window_millis: i64,
    entries: Mutex<Vec<(i64, String)>>,
}

impl HiddenFolders {
    pub fn new(window_millis: i64) -> HiddenFolders {
        HiddenFolders {
            window_millis,
            entries: Mutex::new(Vec::new()),
        }
    }

    fn expire(&self, entries: &mut Vec<(i64, String)>, now: i64) {
        if let Some(pos) = entries
            .iter()
            .position(|(since, _)| *since <= now - self.window_millis)
        {
            entries.truncate(pos);
        }
    }

    pub fn hide(&self, id: &str, now: i64) {
        if let Ok(mut entries) = self.entries.lock() {
            self.expire(&mut entries, now);
            entries.insert(0, (now, id.to_string()));
        }
    }

    pub fn is_hidden(&self, id: &str, now: i64) -> bool {
        let mut entries = match self.entries.lock() {
            Ok(e) => e,
            Err(_) => return false,
        };

        self.expire(&mut entries, now);

        entries.iter().any(|(_, hidden)| hidden == id)
    }
}
