//! Prefix-based detection

use std::io::Read;

use log::{debug, trace};

use super::detector::{read_up_to, DetectionResult, ProtocolDetector, ProtocolInfo};
use crate::common::{Result, TeaseError};

/// Request methods that open an HTTP/1.x request line.
const HTTP_METHODS: [&str; 9] = [
    "GET ", "HEAD ", "POST ", "PUT ", "DELETE ", "CONNECT ", "OPTIONS ", "TRACE ", "PATCH ",
];

/// Matches a connection whose first bytes equal one of a set of prefixes.
///
/// Bytes are read only while some prefix can still match, and never more
/// than the shortest remaining candidate needs.
#[derive(Debug, Clone)]
pub struct PrefixDetector {
    name: String,
    prefixes: Vec<Vec<u8>>,
}

impl PrefixDetector {
    /// Detector reporting `name` when the stream starts with any of `prefixes`.
    ///
    /// Empty prefixes are rejected; they would match every stream.
    pub fn new<I, P>(name: impl Into<String>, prefixes: I) -> Result<Self>
    where
        I: IntoIterator<Item = P>,
        P: AsRef<[u8]>,
    {
        let name = name.into();
        let prefixes: Vec<Vec<u8>> = prefixes.into_iter().map(|p| p.as_ref().to_vec()).collect();

        if prefixes.is_empty() || prefixes.iter().any(Vec::is_empty) {
            return Err(TeaseError::Detection(format!(
                "detector {} needs at least one non-empty prefix",
                name
            )));
        }
        Ok(Self { name, prefixes })
    }

    /// HTTP/1.x request detector.
    pub fn http() -> Self {
        Self {
            name: "HTTP".to_string(),
            prefixes: HTTP_METHODS.iter().map(|m| m.as_bytes().to_vec()).collect(),
        }
    }

    /// Prefixes still consistent with `seen`.
    fn candidates<'a>(&'a self, seen: &'a [u8]) -> impl Iterator<Item = &'a [u8]> + 'a {
        self.prefixes
            .iter()
            .map(Vec::as_slice)
            .filter(move |p| p.starts_with(seen) || seen.starts_with(p))
    }
}

impl ProtocolDetector for PrefixDetector {
    fn name(&self) -> &str {
        &self.name
    }

    fn detect(&self, stream: &mut dyn Read) -> Result<DetectionResult> {
        let mut seen = Vec::new();

        loop {
            if let Some(prefix) = self.prefixes.iter().find(|p| seen.starts_with(p)) {
                debug!("{} detected by prefix {:?}", self.name, String::from_utf8_lossy(prefix));
                return Ok(DetectionResult::Matched(ProtocolInfo::named(self.name.clone())));
            }

            let Some(next_len) = self.candidates(&seen).map(<[u8]>::len).min() else {
                trace!("No {} prefix matches {:02X?}", self.name, seen);
                return Ok(DetectionResult::NotMatched(format!(
                    "no {} prefix matches {:?}",
                    self.name,
                    String::from_utf8_lossy(&seen)
                )));
            };

            let before = seen.len();
            read_up_to(stream, &mut seen, next_len)?;
            if seen.len() < next_len {
                // The stream ended; decide on what arrived.
                if seen.len() == before || self.candidates(&seen).next().is_some() {
                    return Ok(DetectionResult::NeedMoreData);
                }
            }
        }
    }
}
