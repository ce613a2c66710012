//! Bibliographic record helpers
//!
//! Alma returns a `<bib>` document whose direct children include `<title>`
//! and the MARC21 `<record>`. The record is written next to the package
//! payload as a standalone MARCXML file.

use quick_xml::Reader;
use quick_xml::Writer;
use quick_xml::events::{BytesDecl, BytesEnd, BytesStart, BytesText, Event};
use thiserror::Error;

use crate::model::BibRecord;

/// File name of the persisted MARCXML record inside a package
pub const MARC_FILE_NAME: &str = "marc.xml";

/// Namespace stamped on the extracted record
pub const MARC_NAMESPACE: &str = "http://www.loc.gov/MARC21/slim";

#[derive(Debug, Error)]
pub enum MarcError {
    #[error("XML error: {0}")]
    Xml(String),
    #[error("No <record> element in bibliographic record {0}")]
    MissingRecord(String),
}

fn xml_error(e: impl std::fmt::Display) -> MarcError {
    MarcError::Xml(e.to_string())
}

/// Text of the `<title>` element directly under the document root
pub fn extract_title(record: &BibRecord) -> Option<String> {
    let mut reader = Reader::from_reader(record.body.as_slice());
    reader.config_mut().trim_text(true);

    let mut buf = Vec::new();
    let mut depth = 0usize;
    let mut in_title = false;
    let mut title = String::new();

    loop {
        buf.clear();
        let event = match reader.read_event_into(&mut buf) {
            Ok(event) => event,
            Err(e) => {
                tracing::warn!(catalog_id = %record.catalog_id, error = %e, "Unparsable bibliographic record");
                return None;
            }
        };

        match event {
            Event::Start(start) => {
                depth += 1;
                if depth == 2 && start.local_name().as_ref() == b"title" {
                    in_title = true;
                }
            }
            Event::End(_) => {
                if in_title && depth == 2 {
                    break;
                }
                depth = depth.saturating_sub(1);
            }
            Event::Text(text) if in_title && depth == 2 => match text.unescape() {
                Ok(value) => title.push_str(&value),
                Err(e) => {
                    tracing::warn!(error = %e, "Invalid title text");
                    return None;
                }
            },
            Event::CData(data) if in_title && depth == 2 => {
                title.push_str(&String::from_utf8_lossy(&data));
            }
            Event::Eof => break,
            _ => {}
        }
    }

    if title.is_empty() { None } else { Some(title) }
}

fn is_control_001(start: &BytesStart<'_>) -> bool {
    start
        .attributes()
        .flatten()
        .any(|attr| attr.key.as_ref() == b"tag" && attr.value.as_ref() == b"001")
}

/// Collect the events of the `<record>` child of the root, inclusive
fn record_events(record: &BibRecord) -> Result<Vec<Event<'static>>, MarcError> {
    let mut reader = Reader::from_reader(record.body.as_slice());
    let mut buf = Vec::new();
    let mut depth = 0usize;
    let mut events = Vec::new();
    let mut capturing = false;

    loop {
        buf.clear();
        let event = reader
            .read_event_into(&mut buf)
            .map_err(xml_error)?
            .into_owned();

        let mut finished = false;
        match &event {
            Event::Start(start) => {
                depth += 1;
                if !capturing && depth == 2 && start.local_name().as_ref() == b"record" {
                    capturing = true;
                }
            }
            Event::End(_) => {
                finished = capturing && depth == 2;
                depth = depth.saturating_sub(1);
            }
            Event::Eof => break,
            _ => {}
        }

        if capturing {
            events.push(event);
        }
        if finished {
            return Ok(events);
        }
    }

    Err(MarcError::MissingRecord(record.catalog_id.clone()))
}

fn write_control_field<W: std::io::Write>(
    writer: &mut Writer<W>,
    catalog_id: &str,
) -> Result<(), MarcError> {
    let mut field = BytesStart::new("controlfield");
    field.push_attribute(("tag", "001"));
    writer.write_event(Event::Start(field)).map_err(xml_error)?;
    writer
        .write_event(Event::Text(BytesText::new(catalog_id)))
        .map_err(xml_error)?;
    writer
        .write_event(Event::End(BytesEnd::new("controlfield")))
        .map_err(xml_error)?;
    Ok(())
}

/// Convert a bibliographic record into a standalone MARCXML document.
///
/// The `<record>` element gets the MARC21 slim namespace, and a `001`
/// control field carrying the catalog id is inserted after the first child
/// (the leader) when the record has none.
pub fn to_marcxml(record: &BibRecord) -> Result<Vec<u8>, MarcError> {
    let events = record_events(record)?;

    let has_001 = events.iter().any(|event| match event {
        Event::Start(start) | Event::Empty(start) => is_control_001(start),
        _ => false,
    });
    let mut needs_001 = !has_001;

    let mut writer = Writer::new(Vec::new());
    writer
        .write_event(Event::Decl(BytesDecl::new("1.0", Some("utf-8"), None)))
        .map_err(xml_error)?;
    writer
        .write_event(Event::Text(BytesText::from_escaped("\n")))
        .map_err(xml_error)?;

    // depth is relative to <record>: 1 inside the record, 2 inside a child
    let mut depth = 0usize;
    for event in events {
        match event {
            Event::Start(start) => {
                depth += 1;
                let start = if depth == 1 {
                    let mut start = start;
                    let has_xmlns = start
                        .attributes()
                        .flatten()
                        .any(|attr| attr.key.as_ref() == b"xmlns");
                    if !has_xmlns {
                        start.push_attribute(("xmlns", MARC_NAMESPACE));
                    }
                    start
                } else {
                    start
                };
                writer.write_event(Event::Start(start)).map_err(xml_error)?;
            }
            Event::End(end) => {
                if depth == 1 && needs_001 {
                    write_control_field(&mut writer, &record.catalog_id)?;
                    needs_001 = false;
                }
                writer.write_event(Event::End(end)).map_err(xml_error)?;
                depth = depth.saturating_sub(1);
                if depth == 1 && needs_001 {
                    write_control_field(&mut writer, &record.catalog_id)?;
                    needs_001 = false;
                }
            }
            Event::Empty(empty) => {
                writer.write_event(Event::Empty(empty)).map_err(xml_error)?;
                if depth == 1 && needs_001 {
                    write_control_field(&mut writer, &record.catalog_id)?;
                    needs_001 = false;
                }
            }
            other => writer.write_event(other).map_err(xml_error)?,
        }
    }

    Ok(writer.into_inner())
}
