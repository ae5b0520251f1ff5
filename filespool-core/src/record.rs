//! The file record carried by a `SEND_FILE` command.
//!
//! A record is fully buffered: name plus the complete content. It is
//! serialized with bincode and framed by [`SpoolCodec`](crate::SpoolCodec).

use std::ffi::OsStr;
use std::path::{Component, Path};

use serde::{Deserialize, Serialize};

use crate::error::SpoolError;

/// One file in flight.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileRecord {
    name: String,
    content: Vec<u8>,
}

impl FileRecord {
    /// A record with empty content.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            content: Vec::new(),
        }
    }

    pub fn with_content(name: impl Into<String>, content: Vec<u8>) -> Self {
        Self {
            name: name.into(),
            content,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn content(&self) -> &[u8] {
        &self.content
    }

    pub fn set_content(&mut self, content: Vec<u8>) {
        self.content = content;
    }

    /// Content length in bytes.
    pub fn size(&self) -> usize {
        self.content.len()
    }

    pub fn into_parts(self) -> (String, Vec<u8>) {
        (self.name, self.content)
    }

    /// Checks that the name is exactly one normal path component, so
    /// joining it onto a directory cannot leave that directory.
    ///
    /// Rejects empty names, `.` and `..`, names with a `/` and names
    /// with NUL. Other bytes, such as `\`, are ordinary characters.
    pub fn validate_name(&self) -> Result<(), SpoolError> {
        let name = self.name.as_str();
        let mut components = Path::new(name).components();
        let single_normal = matches!(
            (components.next(), components.next()),
            (Some(Component::Normal(part)), None) if part == OsStr::new(name)
        );
        if !single_normal || name.contains('\0') {
            return Err(SpoolError::InvalidRecordName(self.name.clone()));
        }
        Ok(())
    }

    /// Serialize to bytes.
    pub fn to_bytes(&self) -> Result<Vec<u8>, SpoolError> {
        bincode::serialize(self).map_err(|e| SpoolError::Other(e.to_string()))
    }

    /// Deserialize from bytes. The input must hold exactly one record.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, SpoolError> {
        let record: FileRecord = bincode::deserialize(bytes)?;
        let used = bincode::serialized_size(&record)?;
        if used != bytes.len() as u64 {
            return Err(SpoolError::Decode(format!(
                "record uses {used} of {} bytes",
                bytes.len()
            )));
        }
        Ok(record)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_record() {
        let f = FileRecord::new("test");
        assert_eq!(f.name(), "test");
        assert_eq!(f.size(), 0);
    }

    #[test]
    fn content_is_owned() {
        let mut f = FileRecord::new("test");
        f.set_content(b"testdata".to_vec());
        assert_eq!(f.content(), b"testdata");
        assert_eq!(f.size(), 8);
    }

    #[test]
    fn bytes_preserve_empty_and_binary_content() {
        let empty = FileRecord::new("empty");
        assert_eq!(FileRecord::from_bytes(&empty.to_bytes().unwrap()).unwrap(), empty);

        let binary = FileRecord::with_content("bin", (0..=255u8).rev().collect());
        assert_eq!(FileRecord::from_bytes(&binary.to_bytes().unwrap()).unwrap(), binary);
    }

    #[test]
    fn from_bytes_rejects_truncation_and_trailing_garbage() {
        let bytes = FileRecord::with_content("a", b"hello".to_vec())
            .to_bytes()
            .unwrap();
        assert!(matches!(
            FileRecord::from_bytes(&bytes[..bytes.len() - 1]),
            Err(SpoolError::Decode(_))
        ));

        let mut longer = bytes.clone();
        longer.push(0);
        assert!(matches!(
            FileRecord::from_bytes(&longer),
            Err(SpoolError::Decode(_))
        ));
    }

    #[test]
    fn name_validation() {
        for ok in ["spool-1700000000", ".hidden", "a..b", "file.txt", "..."] {
            assert!(FileRecord::new(ok).validate_name().is_ok(), "{ok}");
        }
        for bad in ["", ".", "..", "../etc/passwd", "a/b", "a/", "/abs", "./a", "nul\0"] {
            assert!(
                matches!(
                    FileRecord::new(bad).validate_name(),
                    Err(SpoolError::InvalidRecordName(_))
                ),
                "{bad:?}"
            );
        }
    }

    #[cfg(unix)]
    #[test]
    fn backslash_is_an_ordinary_character() {
        let record = FileRecord::new("report\\2024.txt");
        assert!(record.validate_name().is_ok());
    }
}
