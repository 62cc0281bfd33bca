use std::io::Write;

/// Minimal `multipart/form-data` body builder, enough for one file part and
/// a few text fields.
pub struct Multipart {
    boundary: String,
    body: Vec<u8>,
}

impl Multipart {
    pub fn new() -> Self {
        Self::with_boundary(format!("glimpse-{:016x}", rand::random::<u64>()))
    }

    pub fn with_boundary(boundary: String) -> Self {
        Self {
            boundary,
            body: Vec::new(),
        }
    }

    pub fn content_type(&self) -> String {
        format!("multipart/form-data; boundary={}", self.boundary)
    }

    pub fn text(mut self, name: &str, value: &str) -> Self {
        self.part_header(name, None, None);
        self.body.extend_from_slice(value.as_bytes());
        self.body.extend_from_slice(b"\r\n");
        self
    }

    pub fn file(mut self, name: &str, file_name: &str, mime_type: &str, bytes: &[u8]) -> Self {
        self.part_header(name, Some(file_name), Some(mime_type));
        self.body.extend_from_slice(bytes);
        self.body.extend_from_slice(b"\r\n");
        self
    }

    pub fn finish(mut self) -> Vec<u8> {
        let _ = write!(self.body, "--{}--\r\n", self.boundary);
        self.body
    }

    fn part_header(&mut self, name: &str, file_name: Option<&str>, mime_type: Option<&str>) {
        // Writing into a `Vec` cannot fail.
        let _ = write!(self.body, "--{}\r\n", self.boundary);
        let _ = write!(
            self.body,
            "Content-Disposition: form-data; name=\"{}\"",
            escape(name)
        );
        if let Some(file_name) = file_name {
            let _ = write!(self.body, "; filename=\"{}\"", escape(file_name));
        }
        self.body.extend_from_slice(b"\r\n");
        if let Some(mime_type) = mime_type {
            let _ = write!(self.body, "Content-Type: {}\r\n", mime_type);
        }
        self.body.extend_from_slice(b"\r\n");
    }
}

fn escape(value: &str) -> String {
    value
        .chars()
        .filter(|c| *c != '\r' && *c != '\n')
        .collect::<String>()
        .replace('"', "%22")
}
