use std::{cell::RefCell, collections::BTreeMap, rc::Rc};

use anyhow::bail;

pub mod fs_store;

pub use fs_store::FsStore;

// A flat key-value backing store. Chunks, meta and the index map all live in
// one of these under keys scoped by the tensor key.
pub trait Storage: std::fmt::Debug {
    fn get(&self, key: &str) -> anyhow::Result<Option<Vec<u8>>>;

    // Unconditional overwrite.
    fn set(&mut self, key: &str, value: &[u8]) -> anyhow::Result<()>;

    fn exists(&self, key: &str) -> anyhow::Result<bool> {
        Ok(self.get(key)?.is_some())
    }

    fn len(&self, key: &str) -> anyhow::Result<Option<usize>> {
        Ok(self.get(key)?.map(|v| v.len()))
    }

    // All keys starting with `prefix`, in lexicographic order.
    fn keys(&self, prefix: &str) -> anyhow::Result<Vec<String>>;
}

#[derive(Debug, Clone)]
pub enum Event {
    Get(String),
    Set(String, usize),
    Len(String),
    Exists(String),
    Keys(String),
}

impl Event {
    pub fn write_abbrev<W: std::fmt::Write>(&self, w: &mut W) -> std::fmt::Result {
        match self {
            Event::Get(key) => write!(w, "Get({})", key),
            Event::Set(key, len) => write!(w, "Set({}, {})", key, len),
            Event::Len(key) => write!(w, "Len({})", key),
            Event::Exists(key) => write!(w, "Exists({})", key),
            Event::Keys(prefix) => write!(w, "Keys({})", prefix),
        }
    }
}

#[derive(Debug, Default)]
pub struct MemoryData {
    values: BTreeMap<String, Vec<u8>>,
    events: Vec<Event>,

    // After this many operations, "crash" the store, meaning every further
    // operation fails until `recover` is called.
    time_to_crash: Option<usize>,
}

impl MemoryData {
    fn check_crashed(&self) -> anyhow::Result<()> {
        if self.time_to_crash == Some(0) {
            bail!("store is down")
        } else {
            Ok(())
        }
    }

    fn perform_op(&mut self, e: Event) -> anyhow::Result<()> {
        self.check_crashed()?;
        if let Some(x) = self.time_to_crash {
            self.time_to_crash = Some(x - 1);
        }
        self.events.push(e);
        Ok(())
    }

    pub fn schedule_crash(&mut self, ops: usize) {
        self.time_to_crash = Some(ops);
    }

    pub fn recover(&mut self) {
        self.time_to_crash = None;
    }

    pub fn iter_events(&self) -> impl Iterator<Item = &Event> {
        self.events.iter()
    }

    pub fn take_events(&mut self) -> Vec<Event> {
        std::mem::take(&mut self.events)
    }

    // Raw access that bypasses the event log and crash schedule, for tests
    // that need to tamper with stored bytes.
    pub fn raw(&self, key: &str) -> Option<&Vec<u8>> {
        self.values.get(key)
    }

    pub fn raw_set(&mut self, key: &str, value: Vec<u8>) {
        self.values.insert(key.to_owned(), value);
    }
}

// In-memory store. Clones share the same underlying data, so a test can keep
// a handle to inspect events after giving the store to an engine.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    pub data: Rc<RefCell<MemoryData>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Storage for MemoryStore {
    fn get(&self, key: &str) -> anyhow::Result<Option<Vec<u8>>> {
        let mut data = (*self.data).borrow_mut();
        data.perform_op(Event::Get(key.to_owned()))?;
        Ok(data.values.get(key).cloned())
    }

    fn set(&mut self, key: &str, value: &[u8]) -> anyhow::Result<()> {
        let mut data = (*self.data).borrow_mut();
        data.perform_op(Event::Set(key.to_owned(), value.len()))?;
        data.values.insert(key.to_owned(), value.to_vec());
        Ok(())
    }

    fn exists(&self, key: &str) -> anyhow::Result<bool> {
        let mut data = (*self.data).borrow_mut();
        data.perform_op(Event::Exists(key.to_owned()))?;
        Ok(data.values.contains_key(key))
    }

    fn len(&self, key: &str) -> anyhow::Result<Option<usize>> {
        let mut data = (*self.data).borrow_mut();
        data.perform_op(Event::Len(key.to_owned()))?;
        Ok(data.values.get(key).map(|v| v.len()))
    }

    fn keys(&self, prefix: &str) -> anyhow::Result<Vec<String>> {
        let mut data = (*self.data).borrow_mut();
        data.perform_op(Event::Keys(prefix.to_owned()))?;
        Ok(data
            .values
            .keys()
            .filter(|k| k.starts_with(prefix))
            .cloned()
            .collect())
    }
}
