//! Proto file scanning.
//!
//! Registration only needs to know that a package and a service are
//! declared and which `rpc` methods a service has, so the text is scanned
//! with regular expressions instead of being parsed:
//!
//! ```text
//! package testapp;
//!
//! service PersonService {
//!   rpc getPerson (PersonRequest) returns (Person) {}
//!   rpc listPeople (Empty) returns (stream Person) {}
//! }
//! ```

use std::path::{Path, PathBuf};

use regex::Regex;

use crate::error::{CondorError, Result};
use crate::transport::{MethodDescriptor, ServiceDescriptor};

const ACTION: &str = "add service";

/// A loaded proto file with comments stripped.
#[derive(Debug, Clone)]
pub struct ProtoFile {
    path: PathBuf,
    source: String,
}

impl ProtoFile {
    /// Load and validate the file at `path`.
    ///
    /// The path must exist and carry the `.proto` extension.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(CondorError::validation(
                ACTION,
                "ProtoFilePath is not a valid file path",
            ));
        }
        if path.extension().and_then(|ext| ext.to_str()) != Some("proto") {
            return Err(CondorError::validation(
                ACTION,
                "ProtoFilePath is not a valid file",
            ));
        }

        let text = std::fs::read_to_string(path)?;
        Self::from_source(path, &text)
    }

    /// Build from already-read text.
    pub fn from_source(path: impl Into<PathBuf>, text: &str) -> Result<Self> {
        let comments = Regex::new(r"(?s)/\*.*?\*/|//[^\n]*")?;
        Ok(Self {
            path: path.into(),
            source: comments.replace_all(text, "").into_owned(),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// True if the file declares `package <package>;`.
    pub fn declares_package(&self, package: &str) -> Result<bool> {
        let pattern = format!(r"\bpackage\s+{}\s*;", regex::escape(package));
        Ok(Regex::new(&pattern)?.is_match(&self.source))
    }

    /// True if the file declares `service <service> {`.
    pub fn declares_service(&self, service: &str) -> Result<bool> {
        Ok(self.service_header(service)?.is_some())
    }

    /// `rpc` methods declared in the body of `service`.
    pub fn rpc_methods(&self, service: &str) -> Result<Vec<MethodDescriptor>> {
        let Some(body_start) = self.service_header(service)? else {
            return Ok(Vec::new());
        };
        let body = block_body(&self.source[body_start..]);

        let rpc = Regex::new(
            r"\brpc\s+(\w+)\s*\(\s*(stream\s+)?[\w.]+\s*\)\s*returns\s*\(\s*(stream\s+)?[\w.]+\s*\)",
        )?;
        Ok(rpc
            .captures_iter(body)
            .filter_map(|caps| {
                Some(MethodDescriptor {
                    name: caps.get(1)?.as_str().to_string(),
                    client_streaming: caps.get(2).is_some(),
                    server_streaming: caps.get(3).is_some(),
                })
            })
            .collect())
    }

    /// Validate a fully-qualified service name against the file and
    /// describe the service.
    ///
    /// The package (everything before the last dot) is only checked when
    /// the name has one.
    pub fn describe_service(&self, full_name: &str) -> Result<ServiceDescriptor> {
        let service = match full_name.rsplit_once('.') {
            Some((package, service)) => {
                if !self.declares_package(package)? {
                    return Err(CondorError::validation(ACTION, "Package name not found"));
                }
                service
            }
            None => full_name,
        };
        if !self.declares_service(service)? {
            return Err(CondorError::validation(ACTION, "Service name not found"));
        }

        Ok(ServiceDescriptor {
            full_name: full_name.to_string(),
            methods: self.rpc_methods(service)?,
        })
    }

    /// Offset just past the opening brace of `service`'s body.
    fn service_header(&self, service: &str) -> Result<Option<usize>> {
        let pattern = format!(r"\bservice\s+{}\s*\{{", regex::escape(service));
        Ok(Regex::new(&pattern)?.find(&self.source).map(|m| m.end()))
    }
}

/// Text up to the brace closing the block whose opening brace precedes
/// `text`. Unbalanced input yields the rest of the text.
fn block_body(text: &str) -> &str {
    let mut depth = 1usize;
    for (i, c) in text.char_indices() {
        match c {
            '{' => depth += 1,
            '}' => {
                depth -= 1;
                if depth == 0 {
                    return &text[..i];
                }
            }
            _ => {}
        }
    }
    text
}
