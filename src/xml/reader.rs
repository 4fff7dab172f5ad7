// ABOUTME: Parses a Departments XML document into raw department tuples
// ABOUTME: Keeps text verbatim and reports schema violations with the record index

use std::fs;
use std::io;
use std::path::Path;

use quick_xml::events::Event;
use quick_xml::Reader;

use super::{DEPARTMENT, ROOT};
use crate::error::SyncError;
use crate::model::Record;

/// One `Department` block as written in the document, before key validation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawDepartment {
    pub dep_code: String,
    pub dep_job: String,
    pub description: String,
}

impl RawDepartment {
    pub fn into_record(self) -> Result<Record, SyncError> {
        Record::new(self.dep_code, self.dep_job, self.description)
    }
}

/// Read and parse the document at `path`.
///
/// # Errors
///
/// - `SyncError::FileNotFound` if `path` does not exist
/// - `SyncError::Parse` for malformed XML, non-UTF-8 content or schema violations
/// - `SyncError::Io` for any other read failure
pub fn read_departments(path: &Path) -> Result<Vec<RawDepartment>, SyncError> {
    tracing::debug!("Reading departments document {}", path.display());

    let xml = match fs::read_to_string(path) {
        Ok(xml) => xml,
        Err(err) if err.kind() == io::ErrorKind::NotFound => {
            return Err(SyncError::FileNotFound(path.to_path_buf()))
        }
        Err(err) if err.kind() == io::ErrorKind::InvalidData => {
            return Err(SyncError::Parse {
                location: path.display().to_string(),
                message: "document is not valid UTF-8".to_string(),
            })
        }
        Err(err) => return Err(SyncError::io(path, err)),
    };

    let departments = parse(&xml).map_err(|message| SyncError::Parse {
        location: path.display().to_string(),
        message,
    })?;

    tracing::debug!(
        "Parsed {} department records from {}",
        departments.len(),
        path.display()
    );
    Ok(departments)
}

/// Parse a document held in memory.
pub fn parse_departments(xml: &str) -> Result<Vec<RawDepartment>, SyncError> {
    parse(xml).map_err(|message| SyncError::Parse {
        location: "<input>".to_string(),
        message,
    })
}

fn parse(xml: &str) -> Result<Vec<RawDepartment>, String> {
    let mut reader = Reader::from_str(xml);
    let mut parser = DocumentParser::default();

    loop {
        let position = reader.buffer_position();
        let event = reader
            .read_event()
            .map_err(|err| format!("{} (near byte {})", err, position))?;

        match event {
            Event::Start(start) => parser.open_element(start.name().as_ref())?,
            Event::Empty(start) => {
                parser.open_element(start.name().as_ref())?;
                parser.close_element()?;
            }
            Event::End(_) => parser.close_element()?,
            Event::Text(text) => {
                let text = text
                    .unescape()
                    .map_err(|err| format!("{} (near byte {})", err, position))?;
                parser.text(&text);
            }
            Event::CData(data) => {
                let data = String::from_utf8(data.into_inner().into_owned())
                    .map_err(|_| format!("CDATA is not valid UTF-8 (near byte {})", position))?;
                parser.text(&data);
            }
            Event::Eof => break,
            _ => {}
        }
    }

    parser.finish()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Field {
    DepCode,
    DepJob,
    Description,
}

impl Field {
    fn from_tag(name: &[u8]) -> Option<Self> {
        match name {
            b"DepCode" => Some(Field::DepCode),
            b"DepJob" => Some(Field::DepJob),
            b"Description" => Some(Field::Description),
            _ => None,
        }
    }

    fn tag(self) -> &'static str {
        match self {
            Field::DepCode => "DepCode",
            Field::DepJob => "DepJob",
            Field::Description => "Description",
        }
    }
}

#[derive(Debug, Default)]
struct PendingDepartment {
    dep_code: Option<String>,
    dep_job: Option<String>,
    description: Option<String>,
}

impl PendingDepartment {
    fn slot(&mut self, field: Field) -> &mut Option<String> {
        match field {
            Field::DepCode => &mut self.dep_code,
            Field::DepJob => &mut self.dep_job,
            Field::Description => &mut self.description,
        }
    }

    fn finish(self, index: usize) -> Result<RawDepartment, String> {
        let missing = |field: Field| format!("Department #{} has no <{}>", index, field.tag());
        Ok(RawDepartment {
            dep_code: self.dep_code.ok_or_else(|| missing(Field::DepCode))?,
            dep_job: self.dep_job.ok_or_else(|| missing(Field::DepJob))?,
            description: self.description.ok_or_else(|| missing(Field::Description))?,
        })
    }
}

/// Tracks the open element path while walking the event stream.
///
/// Depth 0 is the `Departments` root, depth 1 the `Department` blocks and depth 2
/// their fields. Anything else is ignored.
#[derive(Debug, Default)]
struct DocumentParser {
    open: Vec<Vec<u8>>,
    seen_root: bool,
    index: usize,
    pending: Option<PendingDepartment>,
    field: Option<(Field, String)>,
    departments: Vec<RawDepartment>,
}

impl DocumentParser {
    fn open_element(&mut self, name: &[u8]) -> Result<(), String> {
        match self.open.len() {
            0 => {
                if self.seen_root {
                    return Err("document has more than one root element".to_string());
                }
                if name != ROOT.as_bytes() {
                    return Err(format!(
                        "root element is <{}>, expected <{}>",
                        String::from_utf8_lossy(name),
                        ROOT
                    ));
                }
                self.seen_root = true;
            }
            1 if name == DEPARTMENT.as_bytes() => {
                self.index += 1;
                self.pending = Some(PendingDepartment::default());
            }
            2 => {
                if let (Some(pending), Some(field)) = (self.pending.as_mut(), Field::from_tag(name)) {
                    if pending.slot(field).is_some() {
                        return Err(format!(
                            "Department #{} has more than one <{}>",
                            self.index,
                            field.tag()
                        ));
                    }
                    self.field = Some((field, String::new()));
                }
            }
            _ => {}
        }
        self.open.push(name.to_vec());
        Ok(())
    }

    fn close_element(&mut self) -> Result<(), String> {
        self.open.pop();
        match self.open.len() {
            2 => {
                if let (Some(pending), Some((field, value))) = (self.pending.as_mut(), self.field.take()) {
                    *pending.slot(field) = Some(value);
                }
            }
            1 => {
                if let Some(pending) = self.pending.take() {
                    self.departments.push(pending.finish(self.index)?);
                }
            }
            _ => {}
        }
        Ok(())
    }

    fn text(&mut self, text: &str) {
        if let Some((_, value)) = self.field.as_mut() {
            value.push_str(text);
        }
    }

    fn finish(self) -> Result<Vec<RawDepartment>, String> {
        if let Some(name) = self.open.last() {
            return Err(format!(
                "unexpected end of document: <{}> is not closed",
                String::from_utf8_lossy(name)
            ));
        }
        if !self.seen_root {
            return Err(format!("document has no <{}> root element", ROOT));
        }
        Ok(self.departments)
    }
}
