// ABOUTME: Serializes department records into a Departments XML document
// ABOUTME: Stages output in a temp file next to the target and renames it into place

use std::fs;
use std::io::{self, BufWriter, Write};
use std::path::Path;

use quick_xml::events::{BytesDecl, BytesEnd, BytesStart, BytesText, Event};
use quick_xml::Writer;

use super::{DEPARTMENT, ROOT};
use crate::error::SyncError;
use crate::model::Record;

/// Write `records` to `path`, replacing any existing file.
///
/// The document is written to a temporary file in the same directory and renamed over
/// `path` only once it is complete, so a failed write leaves the previous file intact.
pub fn write_departments(path: &Path, records: &[Record]) -> Result<(), SyncError> {
    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };

    let mut staged = tempfile::Builder::new()
        .prefix(".dept-sync-")
        .suffix(".xml.tmp")
        .tempfile_in(dir)
        .map_err(|err| SyncError::io(path, err))?;

    {
        let mut out = BufWriter::new(staged.as_file_mut());
        write_document(&mut out, records).map_err(|err| SyncError::io(path, err))?;
        out.flush().map_err(|err| SyncError::io(path, err))?;
    }

    // A replaced file keeps its mode; a new one gets the staging file's owner-only mode
    if let Ok(existing) = fs::metadata(path) {
        staged
            .as_file()
            .set_permissions(existing.permissions())
            .map_err(|err| SyncError::io(path, err))?;
    }
    staged
        .as_file()
        .sync_all()
        .map_err(|err| SyncError::io(path, err))?;
    staged
        .persist(path)
        .map_err(|err| SyncError::io(path, err.error))?;

    tracing::debug!("Wrote {} department records to {}", records.len(), path.display());
    Ok(())
}

/// Serialize `records` as a `Departments` document into `out`.
pub fn write_document<W: Write>(out: W, records: &[Record]) -> io::Result<()> {
    let mut writer = Writer::new_with_indent(out, b' ', 2);

    emit(&mut writer, Event::Decl(BytesDecl::new("1.0", Some("UTF-8"), None)))?;
    emit(&mut writer, Event::Start(BytesStart::new(ROOT)))?;
    for record in records {
        emit(&mut writer, Event::Start(BytesStart::new(DEPARTMENT)))?;
        write_field(&mut writer, "DepCode", record.dep_code())?;
        write_field(&mut writer, "DepJob", record.dep_job())?;
        write_field(&mut writer, "Description", record.description())?;
        emit(&mut writer, Event::End(BytesEnd::new(DEPARTMENT)))?;
    }
    emit(&mut writer, Event::End(BytesEnd::new(ROOT)))?;
    writer.get_mut().write_all(b"\n")
}

fn write_field<W: Write>(writer: &mut Writer<W>, tag: &str, value: &str) -> io::Result<()> {
    emit(writer, Event::Start(BytesStart::new(tag)))?;
    emit(writer, Event::Text(BytesText::new(value)))?;
    emit(writer, Event::End(BytesEnd::new(tag)))
}

fn emit<W: Write>(writer: &mut Writer<W>, event: Event<'_>) -> io::Result<()> {
    writer.write_event(event).map_err(|err| match err {
        quick_xml::Error::Io(inner) => io::Error::new(inner.kind(), inner.to_string()),
        other => io::Error::new(io::ErrorKind::Other, other),
    })
}
