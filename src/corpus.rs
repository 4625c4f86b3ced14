//! Streaming reader for MediaWiki XML dumps.
//!
//! Only `<page>` elements are of interest:
//!
//! ```text
//! <page>
//!   <title>...</title>
//!   <id>...</id>                  document id
//!   <revision>
//!     <id>...</id>                ignored
//!     <text>...</text>
//!   </revision>
//! </page>
//! ```

use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

use quick_xml::events::Event;
use quick_xml::Reader;

use crate::error::{Error, Result};
use crate::producer::RawDocument;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Field {
    Title,
    Id,
    Text,
}

#[derive(Debug, Default)]
struct PageState {
    title: String,
    id: String,
    text: String,
}

/// Iterates the pages of a dump as `RawDocument`s, one at a time.
pub struct WikiDump<R: BufRead> {
    reader: Reader<R>,
    buf: Vec<u8>,
    pages: u64,
    done: bool,
}

impl WikiDump<BufReader<File>> {
    pub fn open(path: &Path) -> Result<Self> {
        let file = File::open(path).map_err(|e| match e.kind() {
            std::io::ErrorKind::NotFound => Error::MissingFile {
                name: "dump",
                path: path.to_path_buf(),
            },
            _ => Error::ReadError("dump", e),
        })?;
        Ok(Self::from_reader(BufReader::new(file)))
    }
}

impl<R: BufRead> WikiDump<R> {
    pub fn from_reader(reader: R) -> Self {
        let mut reader = Reader::from_reader(reader);
        reader.trim_text(true);
        Self {
            reader,
            buf: Vec::new(),
            pages: 0,
            done: false,
        }
    }

    /// Number of pages read so far.
    pub fn pages(&self) -> u64 {
        self.pages
    }

    fn next_page(&mut self) -> Result<Option<RawDocument>> {
        let mut page: Option<PageState> = None;
        let mut field: Option<Field> = None;
        let mut in_revision = false;

        loop {
            self.buf.clear();
            match self.reader.read_event_into(&mut self.buf)? {
                Event::Start(e) => match e.local_name().as_ref() {
                    b"page" => page = Some(PageState::default()),
                    b"revision" => in_revision = true,
                    b"title" => field = Some(Field::Title),
                    b"id" if !in_revision => field = Some(Field::Id),
                    b"text" => field = Some(Field::Text),
                    _ => {}
                },
                Event::End(e) => match e.local_name().as_ref() {
                    b"revision" => in_revision = false,
                    b"title" | b"id" | b"text" => field = None,
                    b"page" => {
                        if let Some(state) = page.take() {
                            self.pages += 1;
                            return finish_page(state).map(Some);
                        }
                    }
                    _ => {}
                },
                Event::Text(e) => {
                    if let (Some(state), Some(target)) = (page.as_mut(), field) {
                        let text = e.unescape()?;
                        target.push_into(state, &text);
                    }
                }
                Event::CData(e) => {
                    if let (Some(state), Some(target)) = (page.as_mut(), field) {
                        target.push_into(state, &String::from_utf8_lossy(&e));
                    }
                }
                Event::Eof => {
                    if page.is_some() {
                        tracing::warn!("Dump ended inside a page");
                    }
                    return Ok(None);
                }
                _ => {}
            }
        }
    }
}

impl Field {
    fn push_into(self, state: &mut PageState, text: &str) {
        match self {
            Field::Title => state.title.push_str(text),
            Field::Id => state.id.push_str(text),
            Field::Text => state.text.push_str(text),
        }
    }
}

fn finish_page(state: PageState) -> Result<RawDocument> {
    let title: String = state
        .title
        .split(['\n', '\r'])
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .collect::<Vec<_>>()
        .join(" ");
    let id = state.id.trim().parse().map_err(|_| {
        Error::Corpus(format!("page {title:?} has invalid id {:?}", state.id))
    })?;
    Ok(RawDocument::new(id, title, state.text))
}

impl<R: BufRead> Iterator for WikiDump<R> {
    type Item = Result<RawDocument>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        match self.next_page() {
            Ok(Some(doc)) => Some(Ok(doc)),
            Ok(None) => {
                self.done = true;
                None
            }
            Err(e) => {
                self.done = true;
                Some(Err(e))
            }
        }
    }
}
