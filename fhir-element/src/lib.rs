//! Navigable element trees for FHIR documents.
//!
//! Documents are parsed in two stages:
//!
//! - [`parse_xml`] / [`parse_json`] produce an untyped [`SourceNode`] tree
//!   supporting children-by-name navigation only.
//! - [`TypedElement::from_source`] annotates that tree with type names using
//!   a [`SummaryProvider`]. Elements the provider cannot describe pass
//!   through untyped rather than failing the conversion.
//!
//! ## Example
//!
//! ```
//! use fhir_element::{parse_xml, TypedElement, UntypedProvider};
//!
//! let node = parse_xml(
//!     r#"<Patient xmlns="http://hl7.org/fhir"><id value="p1"/></Patient>"#,
//! )
//! .unwrap();
//! assert_eq!(node.child_text("id"), Some("p1"));
//!
//! let typed = TypedElement::from_source(&node, &UntypedProvider);
//! assert_eq!(typed.type_name.as_deref(), Some("Patient"));
//! ```

mod errors;
mod json;
mod node;
mod typed;
mod xml;

pub use errors::{ElementError, ElementResult};
pub use json::parse_json;
pub use node::SourceNode;
pub use typed::{ChildSummary, ElementScope, SummaryProvider, TypedElement, UntypedProvider};
pub use xml::parse_xml;

/// Serialization format of a document on disk.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DocumentFormat {
    Xml,
    Json,
}

impl DocumentFormat {
    /// Pick the format from a file extension; anything but `json` is XML.
    pub fn from_extension(extension: Option<&str>) -> Self {
        match extension {
            Some(ext) if ext.eq_ignore_ascii_case("json") => DocumentFormat::Json,
            _ => DocumentFormat::Xml,
        }
    }
}

/// Parse a serialized document in the given format.
pub fn parse(text: &str, format: DocumentFormat) -> ElementResult<SourceNode> {
    match format {
        DocumentFormat::Xml => parse_xml(text),
        DocumentFormat::Json => parse_json(text),
    }
}
