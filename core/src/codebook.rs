use crate::error::{ModemError, Result};
use log::debug;

/// Ordered character set mapped onto the interior symbols of the carrier table
///
/// Symbol 0 is the start tone and symbol `max_symbols - 1` the stop tone, so a
/// codebook holds at most `max_symbols - 2` characters. Character `i` of the
/// codebook is sent as symbol `i + 1`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Codebook {
    chars: Vec<char>,
    text: String,
    max_symbols: usize,
}

impl Codebook {
    pub fn new(text: &str, max_symbols: usize) -> Result<Self> {
        let chars: Vec<char> = text.chars().collect();
        if chars.is_empty() {
            return Err(ModemError::EmptyCodebook);
        }

        let max = max_symbols.saturating_sub(2);
        if chars.len() > max {
            return Err(ModemError::CodebookTooLong {
                len: chars.len(),
                max,
            });
        }

        for (i, ch) in chars.iter().enumerate() {
            if chars[..i].contains(ch) {
                return Err(ModemError::DuplicateCharacter(*ch));
            }
        }

        Ok(Self {
            chars,
            text: text.to_string(),
            max_symbols,
        })
    }

    pub fn len(&self) -> usize {
        self.chars.len()
    }

    pub fn is_empty(&self) -> bool {
        self.chars.is_empty()
    }

    pub fn as_str(&self) -> &str {
        &self.text
    }

    pub fn max_symbols(&self) -> usize {
        self.max_symbols
    }

    pub fn start_token(&self) -> usize {
        0
    }

    pub fn stop_token(&self) -> usize {
        self.max_symbols - 1
    }

    pub fn symbol_for(&self, ch: char) -> Option<usize> {
        self.chars.iter().position(|&c| c == ch).map(|i| i + 1)
    }

    /// Convert a message into `[START, symbols..., STOP]`.
    ///
    /// Any character missing from the codebook fails the whole conversion.
    pub fn convert(&self, text: &str) -> Result<Vec<usize>> {
        if text.is_empty() {
            return Err(ModemError::EmptyMessage);
        }

        let mut symbols = Vec::with_capacity(text.chars().count() + 2);
        symbols.push(self.start_token());
        for ch in text.chars() {
            match self.symbol_for(ch) {
                Some(symbol) => symbols.push(symbol),
                None => {
                    debug!("invalid char: {:?}", ch);
                    return Err(ModemError::UnknownCharacter(ch));
                }
            }
        }
        symbols.push(self.stop_token());

        Ok(symbols)
    }
}
