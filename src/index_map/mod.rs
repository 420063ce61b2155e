use serde::{Deserialize, Serialize};

use crate::{
    error::{Error, Result},
    store::Storage,
};

const INDEX_MAP_FILENAME: &str = "index_map.json";

/// Where one sample's bytes live.
///
/// The sample occupies `start_byte..` of the first chunk in `chunk_names`,
/// every chunk in between, and `..end_byte` of the last one. Offsets are into
/// the chunk's pre-storage form (raw bytes for the chunk subject, the
/// compressed sample payload for the sample subject).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexMapEntry {
    pub chunk_names: Vec<String>,
    // Holds the sample's last chunk if it was short when this entry was
    // written; never more than one name.
    pub incomplete_chunk_names: Vec<String>,
    pub start_byte: usize,
    pub end_byte: usize,
    pub shape: Vec<usize>,
}

/// Append-only log of entries, one per sample in write order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct IndexMap {
    entries: Vec<IndexMapEntry>,
}

/// The short trailing chunk a write has to continue filling.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Continuation {
    pub chunk_name: String,
    // Bytes currently stored in that chunk.
    pub occupied: usize,
}

pub fn chunk_name(index: usize) -> String {
    format!("c{}", index)
}

pub fn parse_chunk_name(name: &str) -> Option<usize> {
    let index: usize = name.strip_prefix('c')?.parse().ok()?;
    // No padding or sign, so every index has exactly one name.
    if chunk_name(index) == name {
        Some(index)
    } else {
        None
    }
}

pub fn chunk_key(key: &str, chunk_name: &str) -> String {
    format!("{}/{}", key, chunk_name)
}

pub fn index_map_key(key: &str) -> String {
    format!("{}/{}", key, INDEX_MAP_FILENAME)
}

impl IndexMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn entries(&self) -> &[IndexMapEntry] {
        &self.entries
    }

    pub fn get(&self, index: usize) -> Option<&IndexMapEntry> {
        self.entries.get(index)
    }

    pub fn append(&mut self, entry: IndexMapEntry) {
        self.entries.push(entry);
    }

    /// The tensor's single incomplete chunk, if there is one. Only the last
    /// entry can point at it.
    pub fn incomplete_chunk(&self) -> Result<Option<&str>> {
        let last = match self.entries.last() {
            Some(last) => last,
            None => return Ok(None),
        };
        match last.incomplete_chunk_names.as_slice() {
            [] => Ok(None),
            [name] => Ok(Some(name.as_str())),
            names => Err(Error::CorruptIndexMap(format!(
                "sample {} has {} incomplete chunks {:?}",
                self.entries.len() - 1,
                names.len(),
                names
            ))),
        }
    }

    /// The index the next new chunk gets. Chunks are numbered in write
    /// order, so the highest index in use is in the last entry.
    pub fn next_chunk_index(&self) -> Result<usize> {
        let last = match self.entries.last() {
            Some(last) => last,
            None => return Ok(0),
        };
        let mut max = None;
        for name in &last.chunk_names {
            let index = parse_chunk_name(name).ok_or_else(|| {
                Error::CorruptIndexMap(format!("unrecognized chunk name {:?}", name))
            })?;
            max = std::cmp::max(max, Some(index));
        }
        match max {
            Some(max) => Ok(max + 1),
            None => Err(Error::CorruptIndexMap(format!(
                "sample {} references no chunks",
                self.entries.len() - 1
            ))),
        }
    }
}

impl From<Vec<IndexMapEntry>> for IndexMap {
    fn from(entries: Vec<IndexMapEntry>) -> Self {
        IndexMap { entries }
    }
}

pub fn has_index_map<S: Storage>(key: &str, store: &S) -> Result<bool> {
    Ok(store.exists(&index_map_key(key))?)
}

pub fn get_index_map<S: Storage>(key: &str, store: &S) -> Result<IndexMap> {
    match store.get(&index_map_key(key))? {
        Some(data) => Ok(serde_json::from_slice(&data)?),
        None => Ok(IndexMap::new()),
    }
}

pub fn set_index_map<S: Storage>(key: &str, store: &mut S, index_map: &IndexMap) -> Result<()> {
    let encoded = serde_json::to_vec(index_map)?;
    store.set(&index_map_key(key), &encoded)?;
    Ok(())
}

/// Looks up how full the incomplete chunk is. The length comes from the
/// stored chunk itself.
pub fn tail_continuation<S: Storage>(
    key: &str,
    store: &S,
    index_map: &IndexMap,
) -> Result<Option<Continuation>> {
    let name = match index_map.incomplete_chunk()? {
        Some(name) => name,
        None => return Ok(None),
    };
    let occupied = store.len(&chunk_key(key, name))?.ok_or_else(|| {
        Error::CorruptIndexMap(format!("incomplete chunk {} is missing from the store", name))
    })?;
    Ok(Some(Continuation {
        chunk_name: name.to_owned(),
        occupied,
    }))
}

#[cfg(test)]
mod test {
    use super::{
        chunk_key, get_index_map, has_index_map, parse_chunk_name, set_index_map,
        tail_continuation, IndexMap, IndexMapEntry,
    };
    use crate::{
        error::Error,
        store::{MemoryStore, Storage},
    };

    fn entry(chunks: &[&str], incomplete: &[&str]) -> IndexMapEntry {
        IndexMapEntry {
            chunk_names: chunks.iter().map(|s| s.to_string()).collect(),
            incomplete_chunk_names: incomplete.iter().map(|s| s.to_string()).collect(),
            start_byte: 0,
            end_byte: 1,
            shape: vec![1],
        }
    }

    #[test]
    fn test_chunk_names() {
        assert_eq!(Some(0), parse_chunk_name("c0"));
        assert_eq!(Some(12), parse_chunk_name("c12"));
        assert_eq!(None, parse_chunk_name("c012"));
        assert_eq!(None, parse_chunk_name("c+1"));
        assert_eq!(None, parse_chunk_name("x1"));
        assert_eq!("t/c3", chunk_key("t", "c3"));
    }

    #[test]
    fn test_next_chunk_index() {
        let mut im = IndexMap::new();
        assert_eq!(0, im.next_chunk_index().unwrap());
        im.append(entry(&["c0", "c1", "c2"], &["c2"]));
        assert_eq!(3, im.next_chunk_index().unwrap());
        im.append(entry(&["c2"], &["c2"]));
        assert_eq!(3, im.next_chunk_index().unwrap());

        im.append(entry(&["chunk"], &[]));
        assert!(matches!(
            im.next_chunk_index(),
            Err(Error::CorruptIndexMap(_))
        ));
    }

    #[test]
    fn test_tail_continuation() {
        let mut store = MemoryStore::new();
        let mut im = IndexMap::new();
        assert_eq!(None, tail_continuation("t", &store, &im).unwrap());

        im.append(entry(&["c0"], &[]));
        assert_eq!(None, tail_continuation("t", &store, &im).unwrap());

        im.append(entry(&["c1"], &["c1"]));
        // Listed as incomplete but never stored.
        assert!(matches!(
            tail_continuation("t", &store, &im),
            Err(Error::CorruptIndexMap(_))
        ));

        store.set("t/c1", &[0; 4]).unwrap();
        let c = tail_continuation("t", &store, &im).unwrap().unwrap();
        assert_eq!("c1", c.chunk_name);
        assert_eq!(4, c.occupied);

        im.append(entry(&["c2", "c3"], &["c2", "c3"]));
        assert!(matches!(
            tail_continuation("t", &store, &im),
            Err(Error::CorruptIndexMap(_))
        ));
    }

    #[test]
    fn test_persistence() {
        let mut store = MemoryStore::new();
        assert!(!has_index_map("t", &store).unwrap());
        assert!(get_index_map("t", &store).unwrap().is_empty());

        let mut im = IndexMap::new();
        im.append(entry(&["c0", "c1"], &["c1"]));
        set_index_map("t", &mut store, &im).unwrap();

        assert!(has_index_map("t", &store).unwrap());
        assert_eq!(im, get_index_map("t", &store).unwrap());
        assert_eq!(
            r#"[{"chunk_names":["c0","c1"],"incomplete_chunk_names":["c1"],"start_byte":0,"end_byte":1,"shape":[1]}]"#,
            String::from_utf8((*store.data).borrow().raw("t/index_map.json").unwrap().clone())
                .unwrap()
        );
    }
}
