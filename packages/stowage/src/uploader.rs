use std::fmt;

use common::UploadedFile;

/// Identity and validation rules for the files a slot accepts.
///
/// The uploader name is recorded in job payloads and, suffixed with
/// `Attachment`, as the attachment row's type discriminant.
pub trait Uploader: Send + Sync + fmt::Debug {
    fn name(&self) -> &str;

    /// Validation messages for `file`; empty when the file is acceptable.
    fn validate(&self, _file: &UploadedFile) -> Vec<String> {
        Vec::new()
    }

    fn attachment_type(&self) -> String {
        format!("{}Attachment", self.name())
    }
}

/// Uploader with optional size and MIME type limits.
#[derive(Debug, Clone)]
pub struct BasicUploader {
    name: String,
    max_size: Option<u64>,
    allowed_types: Vec<String>,
}

impl BasicUploader {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            max_size: None,
            allowed_types: Vec::new(),
        }
    }

    pub fn max_size(mut self, bytes: u64) -> Self {
        self.max_size = Some(bytes);
        self
    }

    /// Accept only these MIME types. A trailing `/*` matches a whole family.
    pub fn allow_types<I, S>(mut self, types: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.allowed_types = types.into_iter().map(Into::into).collect();
        self
    }

    fn type_allowed(&self, mime: &str) -> bool {
        self.allowed_types.iter().any(|allowed| match allowed.strip_suffix("/*") {
            Some(family) => mime
                .split_once('/')
                .is_some_and(|(prefix, _)| prefix == family),
            None => allowed == mime,
        })
    }
}

impl Default for BasicUploader {
    fn default() -> Self {
        Self::new("Default")
    }
}

impl Uploader for BasicUploader {
    fn name(&self) -> &str {
        &self.name
    }

    fn validate(&self, file: &UploadedFile) -> Vec<String> {
        let mut errors = Vec::new();

        if let Some(max) = self.max_size.filter(|max| file.size() > *max) {
            errors.push(format!("is too large (maximum is {max} bytes)"));
        }

        if !self.allowed_types.is_empty() {
            match file.mime_type() {
                Some(mime) if self.type_allowed(mime) => {}
                Some(mime) => errors.push(format!("has an unsupported type ({mime})")),
                None => errors.push("has an unknown type".to_string()),
            }
        }

        errors
    }
}
