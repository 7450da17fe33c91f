//! Deterministic synthesis of the `modsettings.lsx` document.
//!
//! The synthesizer consumes the aggregated per-package records plus the
//! host's ordered mod list and emits the settings document the game engine
//! parses at launch. The document is regenerated wholesale on every run,
//! built fully in memory, and written in one atomic operation; given the
//! same records and ordering, the output is byte-identical.

use std::collections::BTreeMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use quick_xml::events::{BytesDecl, BytesEnd, BytesStart, Event};
use quick_xml::Writer;
use thiserror::Error;
use tracing::debug;

use crate::host::ModEntry;
use crate::meta::PakRecord;

/// Engine schema version stamped on the document root.
pub const VERSION: (&str, &str, &str, &str) = ("4", "7", "1", "300");

/// Name of the base game's always-present content module.
pub const BUILTIN_MOD_NAME: &str = "GustavDev";

/// Fixed descriptor for the built-in module, emitted first and never
/// filtered: (attribute id, declared type, value).
const BUILTIN_DESCRIPTOR: [(&str, &str, &str); 6] = [
    ("Folder", "LSString", "GustavDev"),
    ("MD5", "LSString", ""),
    ("Name", "LSString", "GustavDev"),
    ("PublishHandle", "uint64", "0"),
    ("UUID", "guid", "28ac9ce2-2aba-8cda-b3b5-6e922f71b6b8"),
    ("Version64", "int64", "145100779997082619"),
];

/// Errors raised while synthesizing or writing the document.
#[derive(Debug, Error)]
pub enum SettingsError {
    /// XML serialization failed.
    #[error("failed to serialize settings document: {0}")]
    Xml(#[from] quick_xml::Error),

    /// The serialized document is not valid UTF-8 (cannot happen with
    /// well-formed attribute values; surfaced rather than swallowed).
    #[error("settings document is not UTF-8: {0}")]
    Utf8(#[from] std::string::FromUtf8Error),

    /// I/O failure while serializing into the in-memory buffer.
    #[error("failed to serialize settings document: {0}")]
    Io(#[from] io::Error),

    /// The output file could not be written.
    #[error("failed to write {path}: {source}")]
    Write { path: PathBuf, source: io::Error },
}

/// Synthesize the settings document.
///
/// `mods` is the host's mod list in display-priority order; `records`
/// holds the per-file metadata keyed by mod name and file name (file keys
/// are already sorted, giving the secondary sort within a mod).
///
/// A record is included iff it carries attributes and is not an
/// unpinned override (`Override=true, LoadOrder=false` packages are
/// content the engine loads natively). Only mods flagged both active and
/// order-managed contribute.
pub fn synthesize(
    mods: &[ModEntry],
    records: &BTreeMap<String, BTreeMap<String, PakRecord>>,
) -> Result<String, SettingsError> {
    let included = collect_included(mods, records);
    debug!(included = included.len(), "synthesizing settings document");

    let mut writer = Writer::new_with_indent(Vec::new(), b' ', 2);
    writer.write_event(Event::Decl(BytesDecl::new("1.0", Some("UTF-8"), None)))?;

    start(&mut writer, "save", &[])?;
    {
        let version = [
            ("major", VERSION.0),
            ("minor", VERSION.1),
            ("revision", VERSION.2),
            ("build", VERSION.3),
        ];
        empty(&mut writer, "version", &version)?;

        start(&mut writer, "region", &[("id", "ModuleSettings")])?;
        start(&mut writer, "node", &[("id", "root")])?;
        start(&mut writer, "children", &[])?;

        if !included.is_empty() {
            start(&mut writer, "node", &[("id", "ModOrder")])?;
            start(&mut writer, "children", &[])?;
            for record in &included {
                let (uuid, uuid_type) = record.uuid();
                start(&mut writer, "node", &[("id", "Module")])?;
                empty(
                    &mut writer,
                    "attribute",
                    &[("id", "UUID"), ("type", uuid_type), ("value", uuid)],
                )?;
                end(&mut writer, "node")?;
            }
            end(&mut writer, "children")?;
            end(&mut writer, "node")?;
        }

        start(&mut writer, "node", &[("id", "Mods")])?;
        start(&mut writer, "children", &[])?;

        start(&mut writer, "node", &[("id", "ModuleShortDesc")])?;
        for (id, value_type, value) in BUILTIN_DESCRIPTOR {
            empty(
                &mut writer,
                "attribute",
                &[("id", id), ("type", value_type), ("value", value)],
            )?;
        }
        end(&mut writer, "node")?;

        for record in &included {
            start(&mut writer, "node", &[("id", "ModuleShortDesc")])?;
            for (id, attribute) in &record.attributes {
                empty(
                    &mut writer,
                    "attribute",
                    &[
                        ("id", id.as_str()),
                        ("type", attribute.value_type.as_str()),
                        ("value", attribute.value.as_str()),
                    ],
                )?;
            }
            end(&mut writer, "node")?;
        }

        end(&mut writer, "children")?;
        end(&mut writer, "node")?;

        end(&mut writer, "children")?;
        end(&mut writer, "node")?;
        end(&mut writer, "region")?;
    }
    end(&mut writer, "save")?;

    let mut document = String::from_utf8(writer.into_inner())?;
    document.push('\n');
    Ok(document)
}

/// Write the document atomically: full temp file, then rename.
pub fn write_atomic(path: &Path, document: &str) -> Result<(), SettingsError> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(|e| SettingsError::Write {
            path: parent.to_path_buf(),
            source: e,
        })?;
    }

    let temp_path = path.with_extension("lsx.tmp");
    fs::write(&temp_path, document).map_err(|e| SettingsError::Write {
        path: temp_path.clone(),
        source: e,
    })?;
    fs::rename(&temp_path, path).map_err(|e| SettingsError::Write {
        path: path.to_path_buf(),
        source: e,
    })?;

    Ok(())
}

/// Apply the filtering rule and flatten the surviving records into
/// emission order: host priority first, file name second.
fn collect_included<'a>(
    mods: &'a [ModEntry],
    records: &'a BTreeMap<String, BTreeMap<String, PakRecord>>,
) -> Vec<&'a PakRecord> {
    let mut included = Vec::new();

    for entry in mods {
        if !(entry.state.active && entry.state.manages_order) {
            continue;
        }
        let Some(files) = records.get(&entry.name) else {
            continue;
        };
        for record in files.values() {
            if record.is_empty() {
                continue;
            }
            if record.override_builtin && !record.load_order {
                continue;
            }
            included.push(record);
        }
    }

    included
}

fn start<W: io::Write>(
    writer: &mut Writer<W>,
    name: &str,
    attrs: &[(&str, &str)],
) -> Result<(), SettingsError> {
    let mut element = BytesStart::new(name);
    for attr in attrs {
        element.push_attribute(*attr);
    }
    writer.write_event(Event::Start(element))?;
    Ok(())
}

fn empty<W: io::Write>(
    writer: &mut Writer<W>,
    name: &str,
    attrs: &[(&str, &str)],
) -> Result<(), SettingsError> {
    let mut element = BytesStart::new(name);
    for attr in attrs {
        element.push_attribute(*attr);
    }
    writer.write_event(Event::Empty(element))?;
    Ok(())
}

fn end<W: io::Write>(writer: &mut Writer<W>, name: &str) -> Result<(), SettingsError> {
    writer.write_event(Event::End(BytesEnd::new(name)))?;
    Ok(())
}
