//! Bridge configuration.

use hostbridge_foreign::DEFAULT_MAX_STACK;

/// How host strings are represented as foreign byte strings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Encoding {
    /// ISO-8859-1. Every byte maps to one char, so foreign byte strings
    /// survive a round trip through the host unchanged. Chars above
    /// U+00FF encode as `?`.
    #[default]
    Latin1,
    /// UTF-8. Invalid sequences decode to U+FFFD.
    Utf8,
}

impl Encoding {
    pub fn encode(self, text: &str) -> Vec<u8> {
        match self {
            Encoding::Latin1 => text
                .chars()
                .map(|c| u8::try_from(u32::from(c)).unwrap_or(b'?'))
                .collect(),
            Encoding::Utf8 => text.as_bytes().to_vec(),
        }
    }

    pub fn decode(self, bytes: &[u8]) -> String {
        match self {
            Encoding::Latin1 => bytes.iter().map(|&b| char::from(b)).collect(),
            Encoding::Utf8 => String::from_utf8_lossy(bytes).into_owned(),
        }
    }
}

/// Settings fixed when a [`Bridge`](crate::Bridge) is created.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BridgeConfig {
    pub encoding: Encoding,
    /// Global name of the helper library table; `None` leaves it out.
    pub library_name: Option<String>,
    /// Free stack slots kept available beyond what a call needs.
    pub stack_reserve: usize,
    /// Stack limit of the foreign engine.
    pub max_stack: usize,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            encoding: Encoding::Latin1,
            library_name: Some("clr".to_string()),
            stack_reserve: 20,
            max_stack: DEFAULT_MAX_STACK,
        }
    }
}

impl BridgeConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_encoding(mut self, encoding: Encoding) -> Self {
        self.encoding = encoding;
        self
    }

    pub fn with_library_name(mut self, name: impl Into<String>) -> Self {
        self.library_name = Some(name.into());
        self
    }

    pub fn without_library(mut self) -> Self {
        self.library_name = None;
        self
    }

    pub fn with_stack_reserve(mut self, reserve: usize) -> Self {
        self.stack_reserve = reserve;
        self
    }

    pub fn with_max_stack(mut self, max_stack: usize) -> Self {
        self.max_stack = max_stack;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn latin1_is_bytewise() {
        let bytes: Vec<u8> = (0..=255).collect();
        let text = Encoding::Latin1.decode(&bytes);
        assert_eq!(text.chars().count(), 256);
        assert_eq!(Encoding::Latin1.encode(&text), bytes);
        assert_eq!(Encoding::Latin1.encode("a\u{20ac}"), b"a?");
    }

    #[test]
    fn utf8_round_trip() {
        let text = "caf\u{e9} \u{20ac}";
        assert_eq!(Encoding::Utf8.decode(&Encoding::Utf8.encode(text)), text);
        assert_eq!(Encoding::Utf8.decode(&[0xff]), "\u{fffd}");
    }

    #[test]
    fn builder() {
        let config = BridgeConfig::new()
            .with_encoding(Encoding::Utf8)
            .without_library()
            .with_max_stack(64);
        assert_eq!(config.encoding, Encoding::Utf8);
        assert_eq!(config.library_name, None);
        assert_eq!(config.max_stack, 64);
        assert_eq!(BridgeConfig::default().library_name.as_deref(), Some("clr"));
    }
}
