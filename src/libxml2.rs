//! LibXML2 FFI Wrapper Module
//!
//! Safe wrapper around the libxml2 calls needed to check mapping documents
//! against the mapping XSD.
//!
//! No mature pure-Rust XSD validator exists, so schema validation goes through
//! libxml2 directly. Mapping documents themselves are read with `quick-xml`
//! (see [`crate::xml`]); libxml2 is only used as the schema validator.
//!
//! ## Thread Safety
//!
//! - **Schema parsing** is NOT thread-safe in libxml2 and is serialized behind
//!   [`SCHEMA_PARSE_LOCK`].
//! - **Validation** is thread-safe for different documents as long as every
//!   call uses its own validation context, which [`LibXml2Wrapper`] does.
//! - Compiled schemas are read-only after parsing and shared through `Arc`.

use std::ffi::CString;
use std::marker::PhantomData;
use std::path::Path;
use std::sync::{Arc, Mutex, Once};

use libc::{c_char, c_int, c_uint};
use serde::{Deserialize, Serialize};

use crate::error::{LibXml2Error, LibXml2Result};

/// Global initialization flag for libxml2
///
/// libxml2's initialization functions are NOT thread-safe, so they run
/// exactly once behind `std::sync::Once`.
static LIBXML2_INIT: Once = Once::new();

/// Serializes `xmlSchemaParse` calls across the process.
static SCHEMA_PARSE_LOCK: Mutex<()> = Mutex::new(());

/// Suppress libxml2's own stderr reporting for in-memory parses.
const XML_PARSE_NOERROR: c_int = 1 << 5;
const XML_PARSE_NOWARNING: c_int = 1 << 6;

// Opaque libxml2 structures
#[repr(C)]
pub struct XmlSchema {
    _private: [u8; 0],
}

#[repr(C)]
pub struct XmlSchemaParserCtxt {
    _private: [u8; 0],
}

#[repr(C)]
pub struct XmlSchemaValidCtxt {
    _private: [u8; 0],
}

#[repr(C)]
pub struct XmlDoc {
    _private: [u8; 0],
}

// External libxml2 FFI declarations
#[cfg_attr(target_os = "windows", link(name = "libxml2"))]
#[cfg_attr(not(target_os = "windows"), link(name = "xml2"))]
unsafe extern "C" {
    pub fn xmlInitParser();
    pub fn xmlInitGlobals();

    // Schema parsing functions
    pub fn xmlSchemaNewMemParserCtxt(
        buffer: *const c_char,
        size: c_int,
    ) -> *mut XmlSchemaParserCtxt;

    pub fn xmlSchemaParse(ctxt: *const XmlSchemaParserCtxt) -> *mut XmlSchema;
    pub fn xmlSchemaFreeParserCtxt(ctxt: *mut XmlSchemaParserCtxt);
    pub fn xmlSchemaFree(schema: *mut XmlSchema);

    // Schema validation functions
    pub fn xmlSchemaNewValidCtxt(schema: *const XmlSchema) -> *mut XmlSchemaValidCtxt;
    pub fn xmlSchemaFreeValidCtxt(ctxt: *mut XmlSchemaValidCtxt);
    pub fn xmlSchemaValidateFile(
        ctxt: *const XmlSchemaValidCtxt,
        file_name: *const c_char,
        options: c_uint,
    ) -> c_int;
    pub fn xmlSchemaValidateDoc(ctxt: *const XmlSchemaValidCtxt, doc: *mut XmlDoc) -> c_int;

    pub fn xmlSchemaSetValidStructuredErrors(
        ctxt: *mut XmlSchemaValidCtxt,
        sherr: XmlStructuredErrorFunc,
        ctx: *mut libc::c_void,
    );

    // Document functions
    pub fn xmlReadMemory(
        buffer: *const c_char,
        size: c_int,
        url: *const c_char,
        encoding: *const c_char,
        options: c_int,
    ) -> *mut XmlDoc;
    pub fn xmlFreeDoc(doc: *mut XmlDoc);
}

#[repr(C)]
pub struct xmlError {
    pub domain: c_int,
    pub code: c_int,
    pub message: *const c_char,
    pub level: c_int,
    pub file: *const c_char,
    pub line: c_int,
    pub str1: *const c_char,
    pub str2: *const c_char,
    pub str3: *const c_char,
    pub int1: c_int,
    pub int2: c_int,
    pub ctxt: *mut libc::c_void,
    pub node: *mut libc::c_void,
}

pub type XmlStructuredErrorFunc =
    Option<unsafe extern "C" fn(user_data: *mut libc::c_void, error: *mut xmlError)>;

/// One schema violation reported by libxml2
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SchemaViolation {
    /// 1-based line in the validated document, 0 when libxml2 gave none
    pub line: usize,
    /// Message with trailing whitespace removed
    pub message: String,
}

impl SchemaViolation {
    pub fn new(line: usize, message: impl Into<String>) -> Self {
        Self {
            line,
            message: message.into(),
        }
    }
}

impl std::fmt::Display for SchemaViolation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.line > 0 {
            write!(f, "line {}: {}", self.line, self.message)
        } else {
            f.write_str(&self.message)
        }
    }
}

/// Callback for libxml2 to report validation errors (structured)
unsafe extern "C" fn structured_error_callback(user_data: *mut libc::c_void, error: *mut xmlError) {
    let violations = unsafe { &mut *(user_data as *mut Vec<SchemaViolation>) };

    if error.is_null() {
        return;
    }

    let msg_ptr = unsafe { (*error).message };
    if msg_ptr.is_null() {
        return;
    }

    let c_str = unsafe { std::ffi::CStr::from_ptr(msg_ptr) };
    let line = unsafe { (*error).line };
    violations.push(SchemaViolation {
        line: usize::try_from(line).unwrap_or(0),
        message: c_str.to_string_lossy().trim().to_string(),
    });
}

/// Thread-safe wrapper for a compiled libxml2 schema
///
/// The schema is freed once the last clone is dropped.
#[derive(Debug)]
pub struct XmlSchemaPtr {
    inner: Arc<XmlSchemaInner>,
}

#[derive(Debug)]
struct XmlSchemaInner {
    ptr: *mut XmlSchema,
    _phantom: PhantomData<XmlSchema>,
}

// Safety: libxml2 documentation states that xmlSchema structures are thread-safe for reading
// See: http://xmlsoft.org/threads.html
unsafe impl Send for XmlSchemaInner {}
unsafe impl Sync for XmlSchemaInner {}

impl XmlSchemaPtr {
    /// Create a new XmlSchemaPtr from a raw pointer
    ///
    /// # Safety
    ///
    /// The pointer must come from `xmlSchemaParse` and must not be freed elsewhere.
    pub(crate) unsafe fn from_raw(ptr: *mut XmlSchema) -> LibXml2Result<Self> {
        if ptr.is_null() {
            return Err(LibXml2Error::SchemaParseFailed);
        }

        Ok(XmlSchemaPtr {
            inner: Arc::new(XmlSchemaInner {
                ptr,
                _phantom: PhantomData,
            }),
        })
    }

    pub(crate) fn as_ptr(&self) -> *const XmlSchema {
        self.inner.ptr
    }

    /// Check if the schema pointer is valid (non-null)
    pub fn is_valid(&self) -> bool {
        !self.inner.ptr.is_null()
    }
}

impl Clone for XmlSchemaPtr {
    fn clone(&self) -> Self {
        XmlSchemaPtr {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl Drop for XmlSchemaInner {
    fn drop(&mut self) {
        if !self.ptr.is_null() {
            unsafe {
                xmlSchemaFree(self.ptr);
            }
            self.ptr = std::ptr::null_mut();
        }
    }
}

/// Validation result from libxml2
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValidationResult {
    /// Validation succeeded (return code 0)
    Valid,
    /// Validation failed with errors (return code > 0)
    Invalid {
        error_count: i32,
        violations: Vec<SchemaViolation>,
    },
    /// Internal error occurred (return code < 0)
    InternalError { code: i32 },
}

impl ValidationResult {
    /// Create ValidationResult from libxml2 return code and captured violations
    pub fn from_code(code: c_int, violations: Vec<SchemaViolation>) -> Self {
        match code {
            0 => ValidationResult::Valid,
            n if n > 0 => ValidationResult::Invalid {
                error_count: n,
                violations,
            },
            n => ValidationResult::InternalError { code: n },
        }
    }

    pub fn is_valid(&self) -> bool {
        matches!(self, ValidationResult::Valid)
    }

    pub fn is_invalid(&self) -> bool {
        matches!(self, ValidationResult::Invalid { .. })
    }

    pub fn is_error(&self) -> bool {
        matches!(self, ValidationResult::InternalError { .. })
    }

    /// Violations in the order libxml2 reported them (empty unless invalid)
    pub fn violations(&self) -> &[SchemaViolation] {
        match self {
            ValidationResult::Invalid { violations, .. } => violations,
            _ => &[],
        }
    }
}

/// Safe access to libxml2 schema parsing and validation
pub struct LibXml2Wrapper {
    _phantom: PhantomData<()>,
}

impl LibXml2Wrapper {
    /// Create a new wrapper, initializing libxml2 on first use
    pub fn new() -> Self {
        LIBXML2_INIT.call_once(|| unsafe {
            xmlInitParser();
            xmlInitGlobals();
        });

        LibXml2Wrapper {
            _phantom: PhantomData,
        }
    }

    /// Parse an XML schema from a memory buffer
    ///
    /// Calls are serialized process-wide; the libxml2 schema parser is not
    /// reentrant.
    ///
    /// # Errors
    ///
    /// Returns `LibXml2Error::SchemaParseFailed` if the schema cannot be parsed.
    /// Returns `LibXml2Error::MemoryAllocation` if the parser context cannot be created.
    pub fn parse_schema_from_memory(&self, schema_data: &[u8]) -> LibXml2Result<XmlSchemaPtr> {
        let size = c_int::try_from(schema_data.len()).map_err(|_| LibXml2Error::InvalidXml {
            details: "schema document too large".to_string(),
        })?;

        // A poisoned lock only means another parse panicked; the guard protects no data.
        let _guard = SCHEMA_PARSE_LOCK
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());

        unsafe {
            let parser_ctxt = xmlSchemaNewMemParserCtxt(schema_data.as_ptr() as *const c_char, size);

            if parser_ctxt.is_null() {
                return Err(LibXml2Error::MemoryAllocation);
            }

            let schema_ptr = xmlSchemaParse(parser_ctxt);
            xmlSchemaFreeParserCtxt(parser_ctxt);

            if schema_ptr.is_null() {
                return Err(LibXml2Error::SchemaParseFailed);
            }

            XmlSchemaPtr::from_raw(schema_ptr)
        }
    }

    /// Validate an XML file against a schema
    ///
    /// Safe to call concurrently: each call creates its own validation context.
    ///
    /// # Errors
    ///
    /// Returns `LibXml2Error::ValidationContextCreationFailed` if the context cannot be created.
    /// Returns `LibXml2Error::ValidationFailed` when libxml2 reports an internal error
    /// (for example an unreadable file).
    pub fn validate_file(
        &self,
        schema: &XmlSchemaPtr,
        file_path: &Path,
    ) -> LibXml2Result<ValidationResult> {
        let path_str = file_path
            .to_str()
            .ok_or_else(|| LibXml2Error::ValidationFailed {
                code: -1,
                file: file_path.to_path_buf(),
            })?;

        let c_path = CString::new(path_str).map_err(|_| LibXml2Error::ValidationFailed {
            code: -1,
            file: file_path.to_path_buf(),
        })?;

        let result = unsafe {
            self.with_validation_context(schema, |ctxt| {
                xmlSchemaValidateFile(ctxt, c_path.as_ptr(), 0)
            })?
        };

        if let ValidationResult::InternalError { code } = result {
            return Err(LibXml2Error::ValidationFailed {
                code,
                file: file_path.to_path_buf(),
            });
        }

        Ok(result)
    }

    /// Validate an in-memory XML document against a schema
    ///
    /// `file_name` is only used for error reporting.
    ///
    /// # Errors
    ///
    /// Returns `LibXml2Error::InvalidXml` when the content is not well-formed XML.
    pub fn validate_memory(
        &self,
        schema: &XmlSchemaPtr,
        xml_content: &[u8],
        file_name: Option<String>,
    ) -> LibXml2Result<ValidationResult> {
        let display_name = file_name.unwrap_or_else(|| "<memory>".to_string());
        let size = c_int::try_from(xml_content.len()).map_err(|_| LibXml2Error::InvalidXml {
            details: format!("{}: document too large", display_name),
        })?;

        unsafe {
            let doc = xmlReadMemory(
                xml_content.as_ptr() as *const c_char,
                size,
                std::ptr::null(),
                std::ptr::null(),
                XML_PARSE_NOERROR | XML_PARSE_NOWARNING,
            );

            if doc.is_null() {
                return Err(LibXml2Error::InvalidXml {
                    details: format!("{}: document is not well-formed", display_name),
                });
            }

            let result =
                self.with_validation_context(schema, |ctxt| xmlSchemaValidateDoc(ctxt, doc));
            xmlFreeDoc(doc);

            match result? {
                ValidationResult::InternalError { code } => Err(LibXml2Error::ValidationFailed {
                    code,
                    file: display_name.into(),
                }),
                other => Ok(other),
            }
        }
    }

    /// Run `validate` with a fresh validation context collecting structured errors
    unsafe fn with_validation_context<F>(
        &self,
        schema: &XmlSchemaPtr,
        validate: F,
    ) -> LibXml2Result<ValidationResult>
    where
        F: FnOnce(*const XmlSchemaValidCtxt) -> c_int,
    {
        unsafe {
            let valid_ctxt = xmlSchemaNewValidCtxt(schema.as_ptr());
            if valid_ctxt.is_null() {
                return Err(LibXml2Error::ValidationContextCreationFailed);
            }

            let mut violations: Vec<SchemaViolation> = Vec::new();
            let violations_ptr = &mut violations as *mut Vec<SchemaViolation> as *mut libc::c_void;

            xmlSchemaSetValidStructuredErrors(
                valid_ctxt,
                Some(structured_error_callback),
                violations_ptr,
            );

            let result_code = validate(valid_ctxt);

            xmlSchemaFreeValidCtxt(valid_ctxt);

            Ok(ValidationResult::from_code(result_code, violations))
        }
    }
}

impl Default for LibXml2Wrapper {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SIMPLE_XSD: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<xs:schema xmlns:xs="http://www.w3.org/2001/XMLSchema">
    <xs:element name="root" type="xs:string"/>
</xs:schema>"#;

    const VALID_XML: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<root>Hello World</root>"#;

    const INVALID_XML: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<root><invalid>content</invalid></root>"#;

    #[test]
    fn test_schema_parsing_success() {
        let wrapper = LibXml2Wrapper::new();

        let schema = wrapper
            .parse_schema_from_memory(SIMPLE_XSD.as_bytes())
            .unwrap();
        assert!(schema.is_valid());
    }

    #[test]
    fn test_schema_parsing_invalid_schema() {
        let wrapper = LibXml2Wrapper::new();
        let invalid_schema = b"<invalid>not a schema</invalid>";

        match wrapper.parse_schema_from_memory(invalid_schema) {
            Err(LibXml2Error::SchemaParseFailed) => (),
            other => panic!("Expected SchemaParseFailed, got {:?}", other),
        }
    }

    #[test]
    fn test_schema_parsing_empty_data() {
        let wrapper = LibXml2Wrapper::new();

        assert!(wrapper.parse_schema_from_memory(&[]).is_err());
    }

    #[test]
    fn test_validation_result_from_code() {
        assert_eq!(
            ValidationResult::from_code(0, vec![]),
            ValidationResult::Valid
        );
        assert_eq!(
            ValidationResult::from_code(2, vec![SchemaViolation::new(1, "bad")]),
            ValidationResult::Invalid {
                error_count: 2,
                violations: vec![SchemaViolation::new(1, "bad")],
            }
        );
        assert_eq!(
            ValidationResult::from_code(-1, vec![]),
            ValidationResult::InternalError { code: -1 }
        );
    }

    #[test]
    fn test_validation_result_predicates() {
        let valid = ValidationResult::Valid;
        assert!(valid.is_valid());
        assert!(!valid.is_invalid());
        assert!(valid.violations().is_empty());

        let invalid = ValidationResult::Invalid {
            error_count: 1,
            violations: vec![SchemaViolation::new(2, "oops")],
        };
        assert!(invalid.is_invalid());
        assert_eq!(invalid.violations().len(), 1);

        let error = ValidationResult::InternalError { code: -1 };
        assert!(error.is_error());
    }

    #[test]
    fn test_validate_memory_valid_document() {
        let wrapper = LibXml2Wrapper::new();
        let schema = wrapper
            .parse_schema_from_memory(SIMPLE_XSD.as_bytes())
            .unwrap();

        let result = wrapper
            .validate_memory(&schema, VALID_XML.as_bytes(), None)
            .unwrap();
        assert!(result.is_valid());
    }

    #[test]
    fn test_validate_memory_reports_line_and_message() {
        let wrapper = LibXml2Wrapper::new();
        let schema = wrapper
            .parse_schema_from_memory(SIMPLE_XSD.as_bytes())
            .unwrap();

        let result = wrapper
            .validate_memory(&schema, INVALID_XML.as_bytes(), Some("inline.xml".into()))
            .unwrap();

        assert!(result.is_invalid());
        let violations = result.violations();
        assert_eq!(violations.len(), 1);
        assert_eq!(violations[0].line, 2);
        assert!(violations[0].message.starts_with("Element 'root'"));
        assert!(!violations[0].message.ends_with('\n'));
    }

    #[test]
    fn test_validate_memory_malformed_document() {
        let wrapper = LibXml2Wrapper::new();
        let schema = wrapper
            .parse_schema_from_memory(SIMPLE_XSD.as_bytes())
            .unwrap();

        match wrapper.validate_memory(&schema, b"<root>", None) {
            Err(LibXml2Error::InvalidXml { details }) => assert!(details.contains("<memory>")),
            other => panic!("Expected InvalidXml, got {:?}", other),
        }
    }

    #[test]
    fn test_schema_ptr_cloning() {
        let wrapper = LibXml2Wrapper::new();
        let schema = wrapper
            .parse_schema_from_memory(SIMPLE_XSD.as_bytes())
            .unwrap();
        let cloned_schema = schema.clone();

        assert_eq!(schema.as_ptr(), cloned_schema.as_ptr());
    }

    #[test]
    fn test_concurrent_validation_shares_schema() {
        use rayon::prelude::*;

        let wrapper = LibXml2Wrapper::new();
        let schema = wrapper
            .parse_schema_from_memory(SIMPLE_XSD.as_bytes())
            .unwrap();

        let results: Vec<bool> = (0..16)
            .into_par_iter()
            .map(|i| {
                let content = if i % 2 == 0 { VALID_XML } else { INVALID_XML };
                wrapper
                    .validate_memory(&schema, content.as_bytes(), None)
                    .unwrap()
                    .is_valid()
            })
            .collect();

        assert_eq!(results.iter().filter(|valid| **valid).count(), 8);
    }

    #[test]
    fn test_violation_display() {
        assert_eq!(
            SchemaViolation::new(4, "Element 'x': bad").to_string(),
            "line 4: Element 'x': bad"
        );
        assert_eq!(SchemaViolation::new(0, "no line").to_string(), "no line");
    }
}
