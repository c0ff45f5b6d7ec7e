//! MXL file handler — reads compressed MusicXML (.mxl) archives.
//!
//! An .mxl file is a ZIP archive containing:
//!   - META-INF/container.xml  — declares the root MusicXML file path
//!   - <rootfile>.xml          — the actual MusicXML content
//!   - (optional) other files  — images, sounds, etc.

use std::io::{Cursor, Read};
use zip::ZipArchive;

use crate::error::{ParseError, ParsedScore};
use crate::musicxml;

/// Read and parse a .mxl file from raw bytes.
pub fn parse_mxl(data: &[u8]) -> Result<ParsedScore, ParseError> {
    let xml = extract_musicxml_from_mxl(data)?;
    musicxml::parse_musicxml(&xml)
}

/// Extract the MusicXML content string from .mxl bytes.
pub fn extract_musicxml_from_mxl(data: &[u8]) -> Result<String, ParseError> {
    let cursor = Cursor::new(data);
    let mut archive = ZipArchive::new(cursor)
        .map_err(|e| ParseError::MalformedInput(format!("failed to open MXL archive: {e}")))?;

    let root_file_path = read_container_xml(&mut archive)?;

    let mut root_file = archive.by_name(&root_file_path).map_err(|e| {
        ParseError::MalformedInput(format!(
            "root file '{root_file_path}' not found in archive: {e}"
        ))
    })?;

    let mut xml = String::new();
    root_file
        .read_to_string(&mut xml)
        .map_err(|e| ParseError::MalformedInput(format!("failed to read '{root_file_path}': {e}")))?;

    Ok(xml)
}

/// Parse META-INF/container.xml to find the root MusicXML file path.
fn read_container_xml(archive: &mut ZipArchive<Cursor<&[u8]>>) -> Result<String, ParseError> {
    let container_xml = {
        match archive.by_name("META-INF/container.xml") {
            Ok(mut container_file) => {
                let mut xml = String::new();
                container_file.read_to_string(&mut xml).map_err(|e| {
                    ParseError::MalformedInput(format!("failed to read container.xml: {e}"))
                })?;
                Some(xml)
            }
            Err(_) => None,
        }
    }; // mutable borrow of archive is released here

    if let Some(xml) = container_xml {
        let doc = roxmltree::Document::parse(&xml).map_err(|e| {
            ParseError::MalformedInput(format!("failed to parse container.xml: {e}"))
        })?;

        for node in doc.descendants() {
            if node.tag_name().name() == "rootfile" {
                if let Some(path) = node.attribute("full-path") {
                    return Ok(path.to_string());
                }
            }
        }

        return Err(ParseError::MalformedInput(
            "no rootfile found in container.xml".to_string(),
        ));
    }

    // Fallback: look for common MusicXML filenames in the archive.
    let names: Vec<String> = (0..archive.len())
        .filter_map(|i| archive.by_index(i).ok().map(|f| f.name().to_string()))
        .collect();

    for name in &names {
        if !name.starts_with("META-INF/")
            && (name.ends_with(".xml") || name.ends_with(".musicxml"))
        {
            return Ok(name.clone());
        }
    }

    Err(ParseError::NoRecoverableContent(format!(
        "no MusicXML file found in archive (files: {names:?})"
    )))
}
