use std::collections::{HashMap, VecDeque};
use std::fs::File;
use std::io::{BufRead, Read, Seek, SeekFrom, Write};
use std::sync::Mutex;

use quick_xml::events::Event;
use quick_xml::Reader;

use crate::openxml::{decode_char_escapes, local_name};
use crate::ReadError;

/// Decoded lookups kept hot for the disk-backed store.
const SPILL_CACHE_ENTRIES: usize = 64;

/// The workbook's shared-string table: an indexable, read-only
/// `index -> string` mapping.
///
/// Small tables live in memory. When caching is enabled and the source part
/// meets the configured byte threshold, the decoded strings spill to an
/// unnamed temporary file instead and are re-read per lookup, so resident
/// memory stays bounded by the offset index plus a small LRU of recent
/// entries. The file is deleted when the store is dropped.
pub struct SharedStringStore {
    backend: Backend,
}

enum Backend {
    Memory(Vec<String>),
    Spilled(SpillStore),
}

struct SpillStore {
    /// `(byte offset, byte length)` per string, in index order.
    offsets: Vec<(u64, u32)>,
    state: Mutex<SpillState>,
}

struct SpillState {
    file: File,
    cache: HashMap<usize, String>,
    recent: VecDeque<usize>,
}

impl SharedStringStore {
    pub(crate) fn empty() -> Self {
        Self {
            backend: Backend::Memory(Vec::new()),
        }
    }

    /// Build the store from the `sharedStrings` part.
    ///
    /// `spill_threshold` is the caching configuration: `Some(bytes)` spills to
    /// disk when `part_size >= bytes`, `None` always stays in memory.
    pub(crate) fn read_from<R: BufRead>(
        input: R,
        part_size: u64,
        spill_threshold: Option<u64>,
    ) -> Result<Self, ReadError> {
        let mut reader = Reader::from_reader(input);
        reader.config_mut().trim_text(false);

        let backend = if spill_threshold.is_some_and(|bytes| part_size >= bytes) {
            let mut file = tempfile::tempfile()?;
            let mut offsets = Vec::new();
            let mut position = 0u64;
            for_each_item(&mut reader, |item| {
                file.write_all(item.as_bytes())?;
                offsets.push((position, item.len() as u32));
                position += item.len() as u64;
                Ok(())
            })?;
            Backend::Spilled(SpillStore {
                offsets,
                state: Mutex::new(SpillState {
                    file,
                    cache: HashMap::new(),
                    recent: VecDeque::new(),
                }),
            })
        } else {
            let mut items = Vec::new();
            for_each_item(&mut reader, |item| {
                items.push(item);
                Ok(())
            })?;
            Backend::Memory(items)
        };

        Ok(Self { backend })
    }

    /// The string at `index`. Out-of-range lookups are `None`, not an error.
    pub fn get(&self, index: usize) -> Option<String> {
        match &self.backend {
            Backend::Memory(items) => items.get(index).cloned(),
            Backend::Spilled(spill) => spill.get(index),
        }
    }

    pub fn len(&self) -> usize {
        match &self.backend {
            Backend::Memory(items) => items.len(),
            Backend::Spilled(spill) => spill.offsets.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// True when the table lives in the on-disk spill file.
    pub fn is_spilled(&self) -> bool {
        matches!(self.backend, Backend::Spilled(_))
    }
}

impl SpillStore {
    fn get(&self, index: usize) -> Option<String> {
        let &(offset, len) = self.offsets.get(index)?;
        let mut state = self.state.lock().ok()?;

        if let Some(hit) = state.cache.get(&index) {
            return Some(hit.clone());
        }

        state.file.seek(SeekFrom::Start(offset)).ok()?;
        let mut bytes = vec![0u8; len as usize];
        state.file.read_exact(&mut bytes).ok()?;
        let text = String::from_utf8(bytes).ok()?;

        state.cache.insert(index, text.clone());
        state.recent.push_back(index);
        if state.recent.len() > SPILL_CACHE_ENTRIES {
            if let Some(evicted) = state.recent.pop_front() {
                state.cache.remove(&evicted);
            }
        }
        Some(text)
    }
}

/// Walk the `<sst>` stream, handing each decoded `<si>` entry to `sink`.
fn for_each_item<R: BufRead>(
    reader: &mut Reader<R>,
    mut sink: impl FnMut(String) -> std::io::Result<()>,
) -> Result<(), ReadError> {
    let mut buf = Vec::new();
    loop {
        match reader.read_event_into(&mut buf)? {
            Event::Start(e) if local_name(e.name().as_ref()) == b"si" => {
                let item = parse_item(reader)?;
                sink(item)?;
            }
            Event::Empty(e) if local_name(e.name().as_ref()) == b"si" => {
                sink(String::new())?;
            }
            Event::Eof => break,
            _ => {}
        }
        buf.clear();
    }
    Ok(())
}

/// Decode one `<si>`: either a `<t>` leaf or a sequence of `<r><t>` runs
/// concatenated. Phonetic guides and other subtrees contribute nothing to the
/// visible string.
fn parse_item<R: BufRead>(reader: &mut Reader<R>) -> Result<String, ReadError> {
    let mut buf = Vec::new();
    let mut out = String::new();
    loop {
        match reader.read_event_into(&mut buf)? {
            Event::Start(e) if local_name(e.name().as_ref()) == b"t" => {
                out.push_str(&read_text(reader, b"t")?);
            }
            Event::Start(e) if local_name(e.name().as_ref()) == b"r" => {
                out.push_str(&parse_run(reader)?);
            }
            Event::Start(e) => {
                reader.read_to_end_into(e.name(), &mut Vec::new())?;
            }
            Event::End(e) if local_name(e.name().as_ref()) == b"si" => break,
            Event::Eof => return Err(ReadError::Malformed("unexpected eof in <si>")),
            _ => {}
        }
        buf.clear();
    }
    Ok(out)
}

fn parse_run<R: BufRead>(reader: &mut Reader<R>) -> Result<String, ReadError> {
    let mut buf = Vec::new();
    let mut out = String::new();
    loop {
        match reader.read_event_into(&mut buf)? {
            Event::Start(e) if local_name(e.name().as_ref()) == b"t" => {
                out.push_str(&read_text(reader, b"t")?);
            }
            Event::Start(e) => {
                reader.read_to_end_into(e.name(), &mut Vec::new())?;
            }
            Event::End(e) if local_name(e.name().as_ref()) == b"r" => break,
            Event::Eof => return Err(ReadError::Malformed("unexpected eof in <r>")),
            _ => {}
        }
        buf.clear();
    }
    Ok(out)
}

fn read_text<R: BufRead>(reader: &mut Reader<R>, end_local: &[u8]) -> Result<String, ReadError> {
    let mut buf = Vec::new();
    let mut text = String::new();
    loop {
        match reader.read_event_into(&mut buf)? {
            Event::Text(e) => text.push_str(&decode_char_escapes(&e.unescape()?)),
            Event::CData(e) => {
                text.push_str(&decode_char_escapes(std::str::from_utf8(e.as_ref())?))
            }
            Event::End(e) if local_name(e.name().as_ref()) == end_local => break,
            Event::Eof => return Err(ReadError::Malformed("unexpected eof in <t>")),
            _ => {}
        }
        buf.clear();
    }
    Ok(text)
}
