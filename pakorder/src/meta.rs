//! Package metadata model and `meta.lsx` descriptor parsing.
//!
//! Every package file carries (at most) one module descriptor, an LSX
//! document whose `ModuleInfo` node declares the module's identity. This
//! module defines the cached record type for one package file and the
//! parser that pulls the whitelisted identity attributes out of a
//! descriptor.

use std::collections::BTreeMap;

use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Identity attributes collected from a module descriptor.
///
/// Anything outside this set is game semantics pakorder does not interpret.
pub const DESCRIPTOR_ATTRIBUTES: [&str; 7] = [
    "Folder",
    "MD5",
    "Name",
    "PublishHandle",
    "UUID",
    "Version64",
    "Version",
];

/// A single descriptor attribute: its value plus the type the descriptor
/// declared for it (`LSString`, `guid`, `int64`, ...).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Attribute {
    pub value: String,
    #[serde(rename = "type")]
    pub value_type: String,
}

impl Attribute {
    /// Create an attribute with an explicit declared type.
    pub fn new(value: impl Into<String>, value_type: impl Into<String>) -> Self {
        Self {
            value: value.into(),
            value_type: value_type.into(),
        }
    }
}

fn is_false(flag: &bool) -> bool {
    !*flag
}

/// Cached metadata for one package file.
///
/// The JSON form flattens the attribute map and adds `Override` /
/// `LoadOrder` bookkeeping keys when set, matching the durable cache
/// format:
///
/// ```json
/// {
///   "Folder": {"value": "MyMod", "type": "LSString"},
///   "UUID": {"value": "...", "type": "guid"},
///   "Override": true,
///   "LoadOrder": true
/// }
/// ```
///
/// A record with no attributes is the valid "empty" record written for a
/// package whose descriptor could not be extracted. Once cached it is
/// final; it is only discarded when the backing file disappears.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PakRecord {
    /// The package shadows built-in game content.
    #[serde(rename = "Override", default, skip_serializing_if = "is_false")]
    pub override_builtin: bool,

    /// The package must be pinned into the explicit load-order list even
    /// though it overrides.
    #[serde(rename = "LoadOrder", default, skip_serializing_if = "is_false")]
    pub load_order: bool,

    /// Whitelisted identity attributes keyed by attribute id.
    #[serde(flatten)]
    pub attributes: BTreeMap<String, Attribute>,
}

impl PakRecord {
    /// The empty record cached for an unextractable package.
    pub fn empty() -> Self {
        Self::default()
    }

    /// Whether this record carries no descriptor attributes.
    pub fn is_empty(&self) -> bool {
        self.attributes.is_empty()
    }

    /// Value and declared type of the UUID attribute, empty strings when
    /// the descriptor did not declare one.
    pub fn uuid(&self) -> (&str, &str) {
        match self.attributes.get("UUID") {
            Some(attr) => (&attr.value, &attr.value_type),
            None => ("", ""),
        }
    }
}

/// Errors raised while parsing a module descriptor.
#[derive(Debug, Error)]
pub enum DescriptorError {
    /// The descriptor is not well-formed XML.
    #[error("malformed descriptor: {0}")]
    Xml(#[from] quick_xml::Error),

    /// The descriptor contains no `ModuleInfo` node.
    #[error("descriptor has no ModuleInfo node")]
    ModuleInfoMissing,
}

/// The `ModuleInfo` portion of a parsed descriptor.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ModuleDescriptor {
    /// Whitelisted attributes declared directly on the `ModuleInfo` node.
    pub attributes: BTreeMap<String, Attribute>,
}

impl ModuleDescriptor {
    /// The module's declared `Folder` name, if any.
    pub fn folder(&self) -> Option<&str> {
        self.attributes.get("Folder").map(|attr| attr.value.as_str())
    }
}

/// Parse a `meta.lsx` document and collect the whitelisted attributes of
/// its `ModuleInfo` node.
///
/// Only attributes that are direct children of `ModuleInfo` count; nested
/// nodes such as `PublishVersion` declare attributes with the same ids
/// (`Version64`) that must not leak into the descriptor.
pub fn parse_meta_lsx(xml: &str) -> Result<ModuleDescriptor, DescriptorError> {
    let mut reader = Reader::from_str(xml);

    let mut descriptor = ModuleDescriptor::default();
    let mut in_module_info = false;
    let mut found = false;
    let mut depth = 0usize;

    loop {
        match reader.read_event()? {
            Event::Start(e) => {
                if in_module_info {
                    if depth == 0 && e.name().as_ref() == b"attribute" {
                        collect_attribute(&e, &mut descriptor.attributes)?;
                    }
                    depth += 1;
                } else if e.name().as_ref() == b"node"
                    && element_attr(&e, b"id")?.as_deref() == Some("ModuleInfo")
                {
                    in_module_info = true;
                    found = true;
                    depth = 0;
                }
            }
            Event::Empty(e) => {
                if in_module_info && depth == 0 && e.name().as_ref() == b"attribute" {
                    collect_attribute(&e, &mut descriptor.attributes)?;
                }
            }
            Event::End(_) => {
                if in_module_info {
                    if depth == 0 {
                        break;
                    }
                    depth -= 1;
                }
            }
            Event::Eof => break,
            _ => {}
        }
    }

    if !found {
        return Err(DescriptorError::ModuleInfoMissing);
    }

    Ok(descriptor)
}

/// Read one named XML attribute from an element, unescaped.
fn element_attr(element: &BytesStart<'_>, key: &[u8]) -> Result<Option<String>, quick_xml::Error> {
    for attr in element.attributes() {
        let attr = attr.map_err(quick_xml::Error::from)?;
        if attr.key.as_ref() == key {
            return Ok(Some(attr.unescape_value()?.into_owned()));
        }
    }
    Ok(None)
}

/// Collect one `<attribute id=".." type=".." value=".."/>` element if its
/// id is whitelisted.
fn collect_attribute(
    element: &BytesStart<'_>,
    attributes: &mut BTreeMap<String, Attribute>,
) -> Result<(), quick_xml::Error> {
    let Some(id) = element_attr(element, b"id")? else {
        return Ok(());
    };
    if !DESCRIPTOR_ATTRIBUTES.contains(&id.as_str()) {
        return Ok(());
    }

    let value = element_attr(element, b"value")?.unwrap_or_default();
    let value_type = element_attr(element, b"type")?.unwrap_or_default();
    attributes.insert(id, Attribute::new(value, value_type));
    Ok(())
}
